//! # Lifecycle Status & Closed Vocabularies
//!
//! Every entity carries the same lifecycle status, and a handful of other
//! closed vocabularies (maintenance priority, audit action/severity) live
//! here with it.
//!
//! ## Status Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Entity Lifecycle                                  │
//! │                                                                         │
//! │              ┌──────────┐                                               │
//! │       ┌──────│ Pending  │──────┐                                        │
//! │       │      └────┬─────┘      │                                        │
//! │       ▼           │            ▼                                        │
//! │  ┌──────────┐     │      ┌──────────┐                                  │
//! │  │  Active  │◄────┼─────►│ Inactive │                                  │
//! │  └────┬─────┘     │      └────┬─────┘                                  │
//! │       │           ▼           │                                        │
//! │       │      ┌──────────┐     │                                        │
//! │       └─────►│ Deleted  │◄────┘        Deleted is terminal.            │
//! │              └──────────┘              No edge leaves it.              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Storage Convention
//! Statuses and priorities persist as INTEGER codes; audit vocabulary
//! persists as TEXT. The services validate transitions, the repositories
//! never do.

use serde::{Deserialize, Serialize};

// =============================================================================
// Entity Status
// =============================================================================

/// Lifecycle status shared by every entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityStatus {
    /// In normal use. Only Active entities may be referenced by others.
    Active,
    /// Temporarily out of use, still visible in listings.
    Inactive,
    /// Created but not yet released (production orders start here).
    Pending,
    /// Soft-deleted. Reads treat the entity as absent. Terminal.
    Deleted,
}

impl EntityStatus {
    /// Integer code used in the database.
    #[inline]
    pub const fn as_i64(self) -> i64 {
        match self {
            EntityStatus::Active => 1,
            EntityStatus::Inactive => 2,
            EntityStatus::Pending => 3,
            EntityStatus::Deleted => 4,
        }
    }

    /// Parses a stored integer code. Unknown codes yield `None`.
    pub const fn from_i64(code: i64) -> Option<Self> {
        match code {
            1 => Some(EntityStatus::Active),
            2 => Some(EntityStatus::Inactive),
            3 => Some(EntityStatus::Pending),
            4 => Some(EntityStatus::Deleted),
            _ => None,
        }
    }

    /// Lowercase label for messages and audit rows.
    pub const fn label(self) -> &'static str {
        match self {
            EntityStatus::Active => "active",
            EntityStatus::Inactive => "inactive",
            EntityStatus::Pending => "pending",
            EntityStatus::Deleted => "deleted",
        }
    }

    /// Whether the entity is in normal use.
    #[inline]
    pub const fn is_active(self) -> bool {
        matches!(self, EntityStatus::Active)
    }

    /// The fixed transition table.
    ///
    /// A transition to the current status is not a transition and
    /// returns `false`. Nothing leaves `Deleted`.
    pub const fn can_transition_to(self, next: EntityStatus) -> bool {
        use EntityStatus::*;
        matches!(
            (self, next),
            (Pending, Active)
                | (Pending, Inactive)
                | (Pending, Deleted)
                | (Active, Inactive)
                | (Active, Deleted)
                | (Inactive, Active)
                | (Inactive, Deleted)
        )
    }
}

impl Default for EntityStatus {
    fn default() -> Self {
        EntityStatus::Active
    }
}

// =============================================================================
// Maintenance Priority
// =============================================================================

/// Priority of a maintenance request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaintenancePriority {
    Low,
    Medium,
    High,
    /// Production-stopping. Surfaced first in every listing.
    Critical,
}

impl MaintenancePriority {
    /// Integer code used in the database.
    #[inline]
    pub const fn as_i64(self) -> i64 {
        match self {
            MaintenancePriority::Low => 1,
            MaintenancePriority::Medium => 2,
            MaintenancePriority::High => 3,
            MaintenancePriority::Critical => 4,
        }
    }

    /// Parses a stored integer code. Unknown codes yield `None`.
    pub const fn from_i64(code: i64) -> Option<Self> {
        match code {
            1 => Some(MaintenancePriority::Low),
            2 => Some(MaintenancePriority::Medium),
            3 => Some(MaintenancePriority::High),
            4 => Some(MaintenancePriority::Critical),
            _ => None,
        }
    }

    /// Lowercase label for messages and audit rows.
    pub const fn label(self) -> &'static str {
        match self {
            MaintenancePriority::Low => "low",
            MaintenancePriority::Medium => "medium",
            MaintenancePriority::High => "high",
            MaintenancePriority::Critical => "critical",
        }
    }
}

impl Default for MaintenancePriority {
    fn default() -> Self {
        MaintenancePriority::Medium
    }
}

// =============================================================================
// Audit Vocabulary
// =============================================================================

/// What kind of mutation an audit record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    Create,
    Update,
    StatusChange,
    Delete,
    Assign,
    Revoke,
    Login,
    Logout,
}

impl AuditAction {
    /// Uppercase token stored in the audit table.
    pub const fn as_str(self) -> &'static str {
        match self {
            AuditAction::Create => "CREATE",
            AuditAction::Update => "UPDATE",
            AuditAction::StatusChange => "STATUS_CHANGE",
            AuditAction::Delete => "DELETE",
            AuditAction::Assign => "ASSIGN",
            AuditAction::Revoke => "REVOKE",
            AuditAction::Login => "LOGIN",
            AuditAction::Logout => "LOGOUT",
        }
    }

    /// Parses a stored token. Unknown tokens yield `None`.
    pub fn from_str(token: &str) -> Option<Self> {
        match token {
            "CREATE" => Some(AuditAction::Create),
            "UPDATE" => Some(AuditAction::Update),
            "STATUS_CHANGE" => Some(AuditAction::StatusChange),
            "DELETE" => Some(AuditAction::Delete),
            "ASSIGN" => Some(AuditAction::Assign),
            "REVOKE" => Some(AuditAction::Revoke),
            "LOGIN" => Some(AuditAction::Login),
            "LOGOUT" => Some(AuditAction::Logout),
            _ => None,
        }
    }
}

/// How notable an audit record is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditSeverity {
    Info,
    Warning,
    Critical,
}

impl AuditSeverity {
    /// Uppercase token stored in the audit table.
    pub const fn as_str(self) -> &'static str {
        match self {
            AuditSeverity::Info => "INFO",
            AuditSeverity::Warning => "WARNING",
            AuditSeverity::Critical => "CRITICAL",
        }
    }

    /// Parses a stored token. Unknown tokens yield `None`.
    pub fn from_str(token: &str) -> Option<Self> {
        match token {
            "INFO" => Some(AuditSeverity::Info),
            "WARNING" => Some(AuditSeverity::Warning),
            "CRITICAL" => Some(AuditSeverity::Critical),
            _ => None,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_round_trip() {
        for status in [
            EntityStatus::Active,
            EntityStatus::Inactive,
            EntityStatus::Pending,
            EntityStatus::Deleted,
        ] {
            assert_eq!(EntityStatus::from_i64(status.as_i64()), Some(status));
        }
        assert_eq!(EntityStatus::from_i64(0), None);
        assert_eq!(EntityStatus::from_i64(99), None);
    }

    #[test]
    fn test_transition_table() {
        use EntityStatus::*;

        // Pending can go anywhere
        assert!(Pending.can_transition_to(Active));
        assert!(Pending.can_transition_to(Inactive));
        assert!(Pending.can_transition_to(Deleted));

        // Active and Inactive toggle, both can be deleted
        assert!(Active.can_transition_to(Inactive));
        assert!(Active.can_transition_to(Deleted));
        assert!(Inactive.can_transition_to(Active));
        assert!(Inactive.can_transition_to(Deleted));

        // Nothing re-enters Pending
        assert!(!Active.can_transition_to(Pending));
        assert!(!Inactive.can_transition_to(Pending));

        // Deleted is terminal
        assert!(!Deleted.can_transition_to(Active));
        assert!(!Deleted.can_transition_to(Inactive));
        assert!(!Deleted.can_transition_to(Pending));

        // Same-status is not a transition
        assert!(!Active.can_transition_to(Active));
        assert!(!Deleted.can_transition_to(Deleted));
    }

    #[test]
    fn test_priority_ordering() {
        assert!(MaintenancePriority::Critical > MaintenancePriority::High);
        assert!(MaintenancePriority::High > MaintenancePriority::Medium);
        assert!(MaintenancePriority::Medium > MaintenancePriority::Low);
        assert_eq!(MaintenancePriority::from_i64(4), Some(MaintenancePriority::Critical));
        assert_eq!(MaintenancePriority::from_i64(7), None);
    }

    #[test]
    fn test_audit_tokens() {
        assert_eq!(AuditAction::StatusChange.as_str(), "STATUS_CHANGE");
        assert_eq!(AuditSeverity::Warning.as_str(), "WARNING");
    }
}
