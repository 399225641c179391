//! # Cross-Entity Lookups
//!
//! The existence/activity probes behind every weak reference. When a
//! service writes an entity that points at another (`asset.location_id`,
//! `order.bom_id`, ...), it does not call the sibling service; it probes
//! the referenced table through an [`EntityLookup`] on the same
//! connection, so the check participates in the caller's transaction.
//!
//! ## Probe Ladder
//! ```text
//! fetch(id)          absent or soft-deleted  →  None
//! ensure_exists(id)  absent or soft-deleted  →  Err(NotFound)
//! ensure_active(id)  additionally not Active →  Err(OperationFailed)
//! ```

use sqlx::{Executor, Sqlite};

use forge_core::{EntityStatus, Lifecycle, ServiceError, ServiceResult};
use forge_db::repository::asset::AssetMapper;
use forge_db::repository::catalog::{LocationMapper, ProductMapper, UnitOfMeasureMapper};
use forge_db::repository::identity::{RoleMapper, UserMapper};
use forge_db::repository::manufacturing::{BillOfMaterialMapper, ProductionLineMapper};
use forge_db::{EntityMapper, Repository};

/// A typed probe into one entity table.
///
/// Zero-sized like the repository it wraps; services keep them as plain
/// fields.
pub struct EntityLookup<M: EntityMapper> {
    repo: Repository<M>,
}

impl<M> EntityLookup<M>
where
    M: EntityMapper,
    M::Entity: Lifecycle,
{
    pub const fn new() -> Self {
        EntityLookup {
            repo: Repository::new(),
        }
    }

    /// Fetches the entity, treating soft-deleted rows as absent.
    pub async fn fetch(
        &self,
        executor: impl Executor<'_, Database = Sqlite>,
        id: &str,
    ) -> ServiceResult<Option<M::Entity>> {
        let entity = self.repo.find_by_id(executor, id).await?;
        Ok(entity.filter(|e| e.status() != EntityStatus::Deleted))
    }

    /// The entity must exist (and not be soft-deleted).
    pub async fn ensure_exists(
        &self,
        executor: impl Executor<'_, Database = Sqlite>,
        id: &str,
    ) -> ServiceResult<M::Entity> {
        self.fetch(executor, id)
            .await?
            .ok_or_else(|| ServiceError::not_found(M::ENTITY_NAME, id))
    }

    /// The entity must exist and be Active.
    pub async fn ensure_active(
        &self,
        executor: impl Executor<'_, Database = Sqlite>,
        id: &str,
    ) -> ServiceResult<M::Entity> {
        let entity = self.ensure_exists(executor, id).await?;
        if !entity.status().is_active() {
            return Err(ServiceError::operation_failed(format!(
                "{} is not active: {}",
                M::ENTITY_NAME,
                id
            )));
        }
        Ok(entity)
    }
}

// Manual impls: the probe is copyable regardless of the mapper type.
impl<M: EntityMapper> Clone for EntityLookup<M> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<M: EntityMapper> Copy for EntityLookup<M> {}

impl<M: EntityMapper> Default for EntityLookup<M> {
    fn default() -> Self {
        EntityLookup {
            repo: Repository::new(),
        }
    }
}

impl<M: EntityMapper> std::fmt::Debug for EntityLookup<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityLookup")
            .field("table", &M::TABLE)
            .finish()
    }
}

// ===== Per-entity aliases =====

pub type LocationLookup = EntityLookup<LocationMapper>;
pub type UnitOfMeasureLookup = EntityLookup<UnitOfMeasureMapper>;
pub type ProductLookup = EntityLookup<ProductMapper>;
pub type AssetLookup = EntityLookup<AssetMapper>;
pub type BillOfMaterialLookup = EntityLookup<BillOfMaterialMapper>;
pub type ProductionLineLookup = EntityLookup<ProductionLineMapper>;
pub type UserLookup = EntityLookup<UserMapper>;
pub type RoleLookup = EntityLookup<RoleMapper>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use forge_core::{ErrorCode, Location, Metadata};
    use forge_db::{Database, DbConfig};

    fn sample_location(id: &str, status: EntityStatus) -> Location {
        let now = Utc::now();
        Location {
            id: id.to_string(),
            location_code: format!("loc-{}", id),
            name: "Hall".to_string(),
            parent_id: None,
            description: None,
            status,
            metadata: Metadata::new(),
            created_at: now,
            created_by: None,
            updated_at: now,
            updated_by: None,
        }
    }

    #[tokio::test]
    async fn test_probe_ladder() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.locations();
        repo.insert(db.pool(), &sample_location("l-act", EntityStatus::Active))
            .await
            .unwrap();
        repo.insert(db.pool(), &sample_location("l-off", EntityStatus::Inactive))
            .await
            .unwrap();
        repo.insert(db.pool(), &sample_location("l-del", EntityStatus::Deleted))
            .await
            .unwrap();

        let lookup = LocationLookup::new();

        // Active passes every rung.
        assert!(lookup.fetch(db.pool(), "l-act").await.unwrap().is_some());
        assert!(lookup.ensure_active(db.pool(), "l-act").await.is_ok());

        // Inactive exists but is not active.
        assert!(lookup.ensure_exists(db.pool(), "l-off").await.is_ok());
        let err = lookup.ensure_active(db.pool(), "l-off").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::OperationFailed);

        // Soft-deleted reads as absent.
        assert!(lookup.fetch(db.pool(), "l-del").await.unwrap().is_none());
        let err = lookup.ensure_exists(db.pool(), "l-del").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);

        // Missing row.
        let err = lookup.ensure_exists(db.pool(), "nope").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
    }
}
