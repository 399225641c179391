//! # Error Types
//!
//! The error taxonomy shared by every Forge ERP operation.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  forge-core errors (this file)                                         │
//! │  ├── ValidationError  - Field-level input failures                     │
//! │  └── ServiceError     - code + user-facing message, what callers see   │
//! │                                                                         │
//! │  forge-db errors (separate crate)                                      │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  Flow: ValidationError ──► ServiceError ◄── DbError                    │
//! │                                │                                        │
//! │                                ▼                                        │
//! │                       Caller (UI / CLI)                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. The message on `ServiceError` is user-facing; technical detail goes
//!    to tracing, never into the message
//! 3. Errors are typed values, never panics
//! 4. Every rejected operation leaves the store unchanged

use serde::Serialize;
use thiserror::Error;

// =============================================================================
// Error Codes
// =============================================================================

/// Machine-readable outcome category for a failed operation.
///
/// ## Usage by Callers
/// The code drives programmatic handling (retry, form highlighting,
/// login redirect); the accompanying message is shown to the user as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Input failed validation before any write was attempted (400).
    InvalidInput,

    /// A unique business identifier is already taken (409).
    DuplicateEntry,

    /// The addressed entity does not exist or is soft-deleted (404).
    NotFound,

    /// The operation is not possible in the current state (422).
    /// Examples: deleting an in-use unit, activating a deleted asset.
    OperationFailed,

    /// The actor lacks the required permission (403).
    Forbidden,

    /// Unexpected infrastructure failure (500). Details are logged,
    /// never shown.
    ServerError,
}

// =============================================================================
// Service Error
// =============================================================================

/// The error every service operation returns.
///
/// Pairs a machine-readable [`ErrorCode`] with a human-readable message.
/// The message is safe to show to end users unmodified.
#[derive(Debug, Clone, Serialize, Error)]
#[error("[{code:?}] {message}")]
pub struct ServiceError {
    /// Machine-readable error code for programmatic handling
    pub code: ErrorCode,

    /// Human-readable error message for display
    pub message: String,
}

impl ServiceError {
    /// Creates a new service error.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        ServiceError {
            code,
            message: message.into(),
        }
    }

    /// Creates a not found error.
    pub fn not_found(entity: &str, id: &str) -> Self {
        ServiceError::new(ErrorCode::NotFound, format!("{} not found: {}", entity, id))
    }

    /// Creates a duplicate entry error.
    pub fn duplicate(field: &str, value: &str) -> Self {
        ServiceError::new(
            ErrorCode::DuplicateEntry,
            format!("{} '{}' already exists", field, value),
        )
    }

    /// Creates an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        ServiceError::new(ErrorCode::InvalidInput, message)
    }

    /// Creates an operation failed error.
    pub fn operation_failed(message: impl Into<String>) -> Self {
        ServiceError::new(ErrorCode::OperationFailed, message)
    }

    /// Creates a forbidden error.
    pub fn forbidden(message: impl Into<String>) -> Self {
        ServiceError::new(ErrorCode::Forbidden, message)
    }

    /// Creates a server error with a generic user-facing message.
    /// The technical detail must already be logged by the caller.
    pub fn server(message: impl Into<String>) -> Self {
        ServiceError::new(ErrorCode::ServerError, message)
    }
}

/// Converts field validation failures to service errors.
impl From<ValidationError> for ServiceError {
    fn from(err: ValidationError) -> Self {
        ServiceError::invalid_input(err.to_string())
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when user input doesn't meet requirements.
/// Used for early validation before any database work runs.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too short.
    #[error("{field} must be at least {min} characters")]
    TooShort { field: String, min: usize },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., invalid UUID, invalid characters).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results returned by service operations.
pub type ServiceResult<T> = Result<T, ServiceError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_error_messages() {
        let err = ServiceError::not_found("Asset", "a-1");
        assert_eq!(err.code, ErrorCode::NotFound);
        assert_eq!(err.message, "Asset not found: a-1");

        let err = ServiceError::duplicate("asset_code", "PUMP-004");
        assert_eq!(err.code, ErrorCode::DuplicateEntry);
        assert_eq!(err.message, "asset_code 'PUMP-004' already exists");
    }

    #[test]
    fn test_validation_error_messages() {
        let err = ValidationError::Required {
            field: "asset_code".to_string(),
        };
        assert_eq!(err.to_string(), "asset_code is required");

        let err = ValidationError::TooLong {
            field: "name".to_string(),
            max: 200,
        };
        assert_eq!(err.to_string(), "name must be at most 200 characters");
    }

    #[test]
    fn test_validation_converts_to_invalid_input() {
        let validation_err = ValidationError::MustBePositive {
            field: "quantity".to_string(),
        };
        let err: ServiceError = validation_err.into();
        assert_eq!(err.code, ErrorCode::InvalidInput);
        assert_eq!(err.message, "quantity must be positive");
    }

    #[test]
    fn test_error_code_serializes_screaming() {
        let json = serde_json::to_string(&ErrorCode::DuplicateEntry).unwrap();
        assert_eq!(json, "\"DUPLICATE_ENTRY\"");
    }
}
