//! # Validation Module
//!
//! Field-level validation rules shared by every service.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Service operation (forge-services)                           │
//! │  ├── THIS MODULE: field rules, before any database work                │
//! │  └── Cross-entity rules (referenced entity exists and is active)       │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Database (SQLite)                                            │
//! │  ├── NOT NULL constraints                                              │
//! │  └── UNIQUE constraints (backstop for racing writers)                  │
//! │                                                                         │
//! │  Defense in depth: multiple layers catch different errors              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use forge_core::validation::{validate_code, validate_quantity};
//!
//! // Validate a business code before the uniqueness check
//! validate_code("PUMP-004", "asset_code").unwrap();
//!
//! // Validate a BOM item quantity
//! validate_quantity(2.5, "quantity").unwrap();
//! ```

use crate::error::ValidationError;
use crate::{MAX_CODE_LENGTH, MAX_NAME_LENGTH, MAX_TEXT_LENGTH};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a business code (asset code, order number, role code, ...).
///
/// ## Rules
/// - Must not be empty
/// - Must be at most 50 characters
/// - Only alphanumeric characters, hyphens, underscores
///
/// ## Example
/// ```rust
/// use forge_core::validation::validate_code;
///
/// assert!(validate_code("PUMP-004", "asset_code").is_ok());
/// assert!(validate_code("", "asset_code").is_err());
/// assert!(validate_code("has space", "asset_code").is_err());
/// ```
pub fn validate_code(code: &str, field: &str) -> ValidationResult<()> {
    let code = code.trim();

    if code.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if code.len() > MAX_CODE_LENGTH {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_CODE_LENGTH,
        });
    }

    // Check for valid characters (alphanumeric, hyphen, underscore)
    if !code
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: "must contain only letters, numbers, hyphens, and underscores".to_string(),
        });
    }

    Ok(())
}

/// Validates a display name.
///
/// ## Rules
/// - Must not be empty
/// - Must be at most 200 characters
pub fn validate_name(name: &str, field: &str) -> ValidationResult<()> {
    let name = name.trim();

    if name.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if name.len() > MAX_NAME_LENGTH {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_NAME_LENGTH,
        });
    }

    Ok(())
}

/// Validates free text (descriptions, notes).
///
/// ## Rules
/// - May be empty
/// - Must be at most 2000 characters
pub fn validate_text(text: &str, field: &str) -> ValidationResult<()> {
    if text.len() > MAX_TEXT_LENGTH {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_TEXT_LENGTH,
        });
    }

    Ok(())
}

/// Validates a login username.
///
/// ## Rules
/// - 3 to 50 characters
/// - Lowercase letters, digits, dots, hyphens, underscores
pub fn validate_username(username: &str) -> ValidationResult<()> {
    let username = username.trim();

    if username.is_empty() {
        return Err(ValidationError::Required {
            field: "username".to_string(),
        });
    }

    if username.len() < 3 {
        return Err(ValidationError::TooShort {
            field: "username".to_string(),
            min: 3,
        });
    }

    if username.len() > MAX_CODE_LENGTH {
        return Err(ValidationError::TooLong {
            field: "username".to_string(),
            max: MAX_CODE_LENGTH,
        });
    }

    if !username
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '-' | '_'))
    {
        return Err(ValidationError::InvalidFormat {
            field: "username".to_string(),
            reason: "must contain only lowercase letters, digits, dots, hyphens, and underscores"
                .to_string(),
        });
    }

    Ok(())
}

/// Validates a plaintext password before hashing.
///
/// ## Rules
/// - At least 8 characters
/// - At most 128 characters
pub fn validate_password(password: &str) -> ValidationResult<()> {
    if password.len() < 8 {
        return Err(ValidationError::TooShort {
            field: "password".to_string(),
            min: 8,
        });
    }

    if password.len() > 128 {
        return Err(ValidationError::TooLong {
            field: "password".to_string(),
            max: 128,
        });
    }

    Ok(())
}

/// Validates an email address when one is given.
///
/// Deliberately shallow: one `@` with something on both sides. The
/// mail system is the real validator.
pub fn validate_email(email: &str) -> ValidationResult<()> {
    let email = email.trim();

    let mut parts = email.splitn(2, '@');
    let local = parts.next().unwrap_or("");
    let domain = parts.next().unwrap_or("");

    if local.is_empty() || domain.is_empty() || !domain.contains('.') {
        return Err(ValidationError::InvalidFormat {
            field: "email".to_string(),
            reason: "must look like name@example.com".to_string(),
        });
    }

    Ok(())
}

/// Validates a permission key ("assets:create", "*").
///
/// ## Rules
/// - Must not be empty
/// - Must be at most 100 characters
/// - Lowercase tokens with ':' separators, or the `*` wildcard
pub fn validate_permission(permission: &str) -> ValidationResult<()> {
    let permission = permission.trim();

    if permission.is_empty() {
        return Err(ValidationError::Required {
            field: "permission".to_string(),
        });
    }

    if permission.len() > 100 {
        return Err(ValidationError::TooLong {
            field: "permission".to_string(),
            max: 100,
        });
    }

    if permission == crate::PERMISSION_WILDCARD {
        return Ok(());
    }

    if !permission
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, ':' | '_' | '-'))
    {
        return Err(ValidationError::InvalidFormat {
            field: "permission".to_string(),
            reason: "must contain only lowercase tokens separated by ':'".to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a quantity (BOM component amounts, production quantities).
///
/// ## Rules
/// - Must be finite (NaN and infinities are rejected)
/// - Must be positive (> 0)
pub fn validate_quantity(qty: f64, field: &str) -> ValidationResult<()> {
    if !qty.is_finite() {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: "must be a finite number".to_string(),
        });
    }

    if qty <= 0.0 {
        return Err(ValidationError::MustBePositive {
            field: field.to_string(),
        });
    }

    Ok(())
}

/// Validates a non-negative amount (produced output, hours spent).
///
/// ## Rules
/// - Must be finite
/// - Zero is allowed
pub fn validate_non_negative(value: f64, field: &str) -> ValidationResult<()> {
    if !value.is_finite() {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: "must be a finite number".to_string(),
        });
    }

    if value < 0.0 {
        return Err(ValidationError::MustBePositive {
            field: field.to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// UUID Validators
// =============================================================================

/// Validates a UUID string format.
///
/// ## Rules
/// - Must be a valid UUID format
/// - 36 characters with hyphens: xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx
///
/// ## Example
/// ```rust
/// use forge_core::validation::validate_uuid;
///
/// assert!(validate_uuid("550e8400-e29b-41d4-a716-446655440000", "id").is_ok());
/// assert!(validate_uuid("not-a-uuid", "id").is_err());
/// ```
pub fn validate_uuid(id: &str, field: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    // Try to parse as UUID
    uuid::Uuid::parse_str(id).map_err(|_| ValidationError::InvalidFormat {
        field: field.to_string(),
        reason: "must be a valid UUID".to_string(),
    })?;

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_code() {
        // Valid codes
        assert!(validate_code("PUMP-004", "asset_code").is_ok());
        assert!(validate_code("ABC123", "asset_code").is_ok());
        assert!(validate_code("line_1", "line_code").is_ok());

        // Invalid codes
        assert!(validate_code("", "asset_code").is_err());
        assert!(validate_code("   ", "asset_code").is_err());
        assert!(validate_code("has space", "asset_code").is_err());
        assert!(validate_code(&"A".repeat(100), "asset_code").is_err());
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("Hydraulic Pump 4", "name").is_ok());
        assert!(validate_name("", "name").is_err());
        assert!(validate_name(&"A".repeat(300), "name").is_err());
    }

    #[test]
    fn test_validate_text() {
        assert!(validate_text("", "description").is_ok());
        assert!(validate_text("short note", "description").is_ok());
        assert!(validate_text(&"x".repeat(2001), "description").is_err());
    }

    #[test]
    fn test_validate_username() {
        assert!(validate_username("jdoe").is_ok());
        assert!(validate_username("j.doe-2").is_ok());

        assert!(validate_username("").is_err());
        assert!(validate_username("ab").is_err());
        assert!(validate_username("JDoe").is_err());
        assert!(validate_username("j doe").is_err());
    }

    #[test]
    fn test_validate_password() {
        assert!(validate_password("hunter22").is_ok());
        assert!(validate_password("short").is_err());
        assert!(validate_password(&"x".repeat(200)).is_err());
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email("jdoe@example.com").is_ok());
        assert!(validate_email("no-at-sign").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("jdoe@").is_err());
        assert!(validate_email("jdoe@nodot").is_err());
    }

    #[test]
    fn test_validate_permission() {
        assert!(validate_permission("assets:create").is_ok());
        assert!(validate_permission("*").is_ok());
        assert!(validate_permission("security:users:delete").is_ok());

        assert!(validate_permission("").is_err());
        assert!(validate_permission("Assets:Create").is_err());
        assert!(validate_permission("a b").is_err());
    }

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1.0, "quantity").is_ok());
        assert!(validate_quantity(0.25, "quantity").is_ok());

        assert!(validate_quantity(0.0, "quantity").is_err());
        assert!(validate_quantity(-1.0, "quantity").is_err());
        assert!(validate_quantity(f64::NAN, "quantity").is_err());
        assert!(validate_quantity(f64::INFINITY, "quantity").is_err());
    }

    #[test]
    fn test_validate_non_negative() {
        assert!(validate_non_negative(0.0, "hours_spent").is_ok());
        assert!(validate_non_negative(3.5, "hours_spent").is_ok());
        assert!(validate_non_negative(-0.1, "hours_spent").is_err());
        assert!(validate_non_negative(f64::NAN, "hours_spent").is_err());
    }

    #[test]
    fn test_validate_uuid() {
        assert!(validate_uuid("550e8400-e29b-41d4-a716-446655440000", "id").is_ok());
        assert!(validate_uuid("", "id").is_err());
        assert!(validate_uuid("not-a-uuid", "id").is_err());
        assert!(validate_uuid("123", "id").is_err());
    }
}
