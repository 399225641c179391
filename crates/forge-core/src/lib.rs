//! # forge-core: Pure Domain Model for Forge ERP
//!
//! This crate is the **heart** of Forge ERP. It contains the domain model
//! as plain data types and pure functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Forge ERP Architecture                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    Caller (UI / CLI / tests)                    │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    forge-services                               │   │
//! │  │    permissions ──► validation ──► transaction ──► audit         │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ forge-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │  status   │  │   error   │  │ validation│  │   │
//! │  │   │   Asset   │  │  Active   │  │ ErrorCode │  │   rules   │  │   │
//! │  │   │   User    │  │  Deleted  │  │  Service  │  │  checks   │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    forge-db (Database Layer)                    │   │
//! │  │         SQLite pool, generic repositories, migrations           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Entity types (Asset, Product, User, ProductionOrder, ...)
//! - [`status`] - Lifecycle status and other closed vocabularies
//! - [`error`] - Error taxonomy shared by every service operation
//! - [`validation`] - Field-level validation rules
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: Every function is deterministic - same input = same output
//! 2. **No I/O**: Database, network, file system access is FORBIDDEN here
//! 3. **String UUIDs**: Entity ids are UUID v4 strings, generated without coordination
//! 4. **Explicit Errors**: All errors are typed, never strings or panics
//!
//! ## Example Usage
//!
//! ```rust
//! use forge_core::status::EntityStatus;
//! use forge_core::validation::validate_code;
//!
//! // Lifecycle transitions are a fixed table, not ad-hoc checks
//! assert!(EntityStatus::Pending.can_transition_to(EntityStatus::Active));
//! assert!(!EntityStatus::Deleted.can_transition_to(EntityStatus::Active));
//!
//! // Field rules are plain functions usable anywhere
//! assert!(validate_code("PUMP-004", "asset_code").is_ok());
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod status;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================
// These allow users to do `use forge_core::Asset` instead of
// `use forge_core::types::Asset`

pub use error::{ErrorCode, ServiceError, ServiceResult, ValidationError};
pub use status::{AuditAction, AuditSeverity, EntityStatus, MaintenancePriority};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Role id of the built-in administrator role.
///
/// ## Why a constant?
/// The migration seeds exactly one role that can never be absent, so the
/// bootstrap path (seeding, first login) can reference it without a lookup.
pub const ADMIN_ROLE_ID: &str = "00000000-0000-0000-0000-000000000001";

/// The permission string that grants everything.
///
/// A role holding this permission passes every permission check. The
/// built-in administrator role is seeded with it.
pub const PERMISSION_WILDCARD: &str = "*";

/// Actor id recorded for mutations performed by tooling rather than a
/// logged-in user (seeding, migrations).
pub const SYSTEM_ACTOR_ID: &str = "00000000-0000-0000-0000-0000000000aa";

/// Maximum length of business codes (asset codes, SKU-like identifiers).
pub const MAX_CODE_LENGTH: usize = 50;

/// Maximum length of display names.
pub const MAX_NAME_LENGTH: usize = 200;

/// Maximum length of free-text descriptions and notes.
pub const MAX_TEXT_LENGTH: usize = 2000;
