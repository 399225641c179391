//! # Actor Context
//!
//! Who is performing an operation. Every service method takes an [`Actor`]
//! as its first argument; the authorizer checks it, audit rows name it,
//! `created_by`/`updated_by` stamps record it.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use forge_core::{ADMIN_ROLE_ID, SYSTEM_ACTOR_ID};

/// The authenticated caller a service operation runs as.
///
/// Produced by `AuthService::validate_session` for real users, or by
/// [`Actor::system`] for provisioning tools.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Actor {
    /// Acting user id.
    pub user_id: String,

    /// Display name recorded in audit rows.
    pub user_name: String,

    /// Session the actor logged in under, if any.
    pub session_id: Option<String>,

    /// Roles the actor holds, resolved at session validation.
    pub role_ids: Vec<String>,
}

impl Actor {
    /// An actor with no session and no roles. Roles and session are
    /// attached with the builder methods below.
    pub fn new(user_id: impl Into<String>, user_name: impl Into<String>) -> Self {
        Actor {
            user_id: user_id.into(),
            user_name: user_name.into(),
            session_id: None,
            role_ids: Vec::new(),
        }
    }

    /// The built-in system actor used by the seed binary and migrations.
    /// Holds the administrator role, so the role authorizer grants it
    /// everything through the wildcard permission.
    pub fn system() -> Self {
        Actor {
            user_id: SYSTEM_ACTOR_ID.to_string(),
            user_name: "system".to_string(),
            session_id: None,
            role_ids: vec![ADMIN_ROLE_ID.to_string()],
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_roles(mut self, role_ids: Vec<String>) -> Self {
        self.role_ids = role_ids;
        self
    }
}

/// Generates a fresh entity id (UUID v4, hyphenated).
///
/// Ids are generated here, never by the database: offline creation must
/// not depend on a round trip.
pub fn new_entity_id() -> String {
    Uuid::new_v4().to_string()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_actor_holds_admin_role() {
        let actor = Actor::system();
        assert_eq!(actor.user_id, SYSTEM_ACTOR_ID);
        assert!(actor.role_ids.contains(&ADMIN_ROLE_ID.to_string()));
        assert!(actor.session_id.is_none());
    }

    #[test]
    fn test_new_entity_ids_are_unique() {
        let a = new_entity_id();
        let b = new_entity_id();
        assert_ne!(a, b);
        assert_eq!(a.len(), 36);
    }
}
