//! # Authorization
//!
//! Permission checks sit in front of every mutating service operation.
//! The check itself is an injected seam ([`Authorizer`]); the default
//! implementation resolves the actor's roles against the
//! `role_permissions` relation, where `*` grants everything.
//!
//! ## Check Order
//! ```text
//! mutating call
//!    │
//!    ▼
//! Authorizer::is_allowed(actor, "assets:create")
//!    │ false                         │ true
//!    ▼                               ▼
//! Forbidden, nothing written     validation → transaction → audit
//! ```

use async_trait::async_trait;
use tracing::debug;

use forge_core::{ServiceError, ServiceResult, PERMISSION_WILDCARD};
use forge_db::Database;

use crate::context::Actor;

/// Permission tokens, one `module:verb` pair per guarded operation class.
///
/// The seeded administrator role holds the `*` wildcard instead of these;
/// other roles are granted tokens individually.
pub mod permission {
    pub const CATALOG_CREATE: &str = "catalog:create";
    pub const CATALOG_UPDATE: &str = "catalog:update";
    pub const CATALOG_DELETE: &str = "catalog:delete";

    pub const ASSETS_CREATE: &str = "assets:create";
    pub const ASSETS_UPDATE: &str = "assets:update";
    pub const ASSETS_DELETE: &str = "assets:delete";

    pub const MANUFACTURING_CREATE: &str = "manufacturing:create";
    pub const MANUFACTURING_UPDATE: &str = "manufacturing:update";
    pub const MANUFACTURING_DELETE: &str = "manufacturing:delete";

    pub const MAINTENANCE_CREATE: &str = "maintenance:create";
    pub const MAINTENANCE_UPDATE: &str = "maintenance:update";
    pub const MAINTENANCE_DELETE: &str = "maintenance:delete";

    pub const SECURITY_CREATE: &str = "security:create";
    pub const SECURITY_UPDATE: &str = "security:update";
    pub const SECURITY_DELETE: &str = "security:delete";
}

/// Decides whether an actor may perform an operation.
#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn is_allowed(&self, actor: &Actor, permission: &str) -> ServiceResult<bool>;
}

/// The production authorizer: a permission is allowed when any of the
/// actor's roles holds it, or holds the `*` wildcard.
#[derive(Debug, Clone)]
pub struct RoleAuthorizer {
    db: Database,
}

impl RoleAuthorizer {
    pub fn new(db: Database) -> Self {
        RoleAuthorizer { db }
    }
}

#[async_trait]
impl Authorizer for RoleAuthorizer {
    async fn is_allowed(&self, actor: &Actor, permission: &str) -> ServiceResult<bool> {
        let grants = self.db.role_permissions();

        for role_id in &actor.role_ids {
            if grants
                .contains(self.db.pool(), role_id, PERMISSION_WILDCARD)
                .await?
            {
                return Ok(true);
            }
            if grants.contains(self.db.pool(), role_id, permission).await? {
                return Ok(true);
            }
        }

        Ok(false)
    }
}

/// Grants everything. For the seed binary and tests that are not about
/// permissions.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

#[async_trait]
impl Authorizer for AllowAll {
    async fn is_allowed(&self, _actor: &Actor, _permission: &str) -> ServiceResult<bool> {
        Ok(true)
    }
}

/// Turns a denied check into the `Forbidden` error every mutating
/// operation returns before touching the database.
pub async fn require(
    authorizer: &dyn Authorizer,
    actor: &Actor,
    permission: &str,
) -> ServiceResult<()> {
    if authorizer.is_allowed(actor, permission).await? {
        return Ok(());
    }

    debug!(user_id = %actor.user_id, permission, "Permission denied");
    Err(ServiceError::forbidden("Permission denied"))
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use forge_db::DbConfig;

    async fn test_db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    #[tokio::test]
    async fn test_admin_role_passes_via_wildcard() {
        let db = test_db().await;
        let authorizer = RoleAuthorizer::new(db);
        let actor = Actor::system();

        // The migration seeds the admin role with "*" only; any token passes.
        assert!(authorizer
            .is_allowed(&actor, permission::ASSETS_CREATE)
            .await
            .unwrap());
        assert!(authorizer
            .is_allowed(&actor, "something:unheard-of")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_actor_without_roles_is_denied() {
        let db = test_db().await;
        let authorizer = RoleAuthorizer::new(db);
        let actor = Actor::new("u-1", "No Roles");

        assert!(!authorizer
            .is_allowed(&actor, permission::ASSETS_CREATE)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_specific_grant_passes_only_that_token() {
        let db = test_db().await;
        db.role_permissions()
            .add(db.pool(), "role-ops", permission::MAINTENANCE_CREATE)
            .await
            .unwrap();

        let authorizer = RoleAuthorizer::new(db);
        let actor = Actor::new("u-2", "Ops").with_roles(vec!["role-ops".to_string()]);

        assert!(authorizer
            .is_allowed(&actor, permission::MAINTENANCE_CREATE)
            .await
            .unwrap());
        assert!(!authorizer
            .is_allowed(&actor, permission::SECURITY_DELETE)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_require_maps_denial_to_forbidden() {
        let db = test_db().await;
        let authorizer = RoleAuthorizer::new(db);
        let actor = Actor::new("u-3", "Nobody");

        let err = require(&authorizer, &actor, permission::ASSETS_DELETE)
            .await
            .unwrap_err();
        assert_eq!(err.code, forge_core::ErrorCode::Forbidden);

        let admin = Actor::system();
        assert!(require(&authorizer, &admin, permission::ASSETS_DELETE)
            .await
            .is_ok());
    }
}
