//! # Generic Entity Repository
//!
//! One repository implementation serves every table. Per-entity code
//! shrinks to a mapper: a pair of pure functions between the entity and
//! a [`RowMap`].
//!
//! ## How the Pieces Fit
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Repository<M: EntityMapper>                        │
//! │                                                                         │
//! │   AssetMapper ───┐                                                      │
//! │   UserMapper ────┼──► to_row / from_row     (pure functions)           │
//! │   RoleMapper ────┘          │                                           │
//! │                             ▼                                           │
//! │   Repository<M>::insert ─► INSERT INTO {table} (...) VALUES (?, ...)   │
//! │   Repository<M>::find ───► SELECT * FROM {table} WHERE ... ORDER BY    │
//! │   Repository<M>::update ─► UPDATE {table} SET ... WHERE id = ?         │
//! │   Repository<M>::delete ─► DELETE FROM {table} WHERE id = ?            │
//! │                             │                                           │
//! │                             ▼                                           │
//! │              impl Executor<'_, Database = Sqlite>                       │
//! │              (the pool, or a live transaction connection)              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Filters
//! A [`Filter`] is an ordered column→value list; every entry becomes
//! `column = ?` (or `column IS NULL`), AND-joined. Column names are
//! code-supplied identifiers, never user input. An empty filter means
//! "everything" for reads and counts; [`Repository::delete_where`]
//! refuses it.
//!
//! ## Module Organization
//! - [`relation`] - pair-oriented store for join tables
//! - [`asset`], [`catalog`], [`manufacturing`], [`maintenance`],
//!   [`identity`], [`audit`] - the per-entity mappers

use std::marker::PhantomData;

use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments};
use sqlx::{Executor, Row};
use tracing::debug;

use crate::error::{DbError, DbResult};
use crate::value::{RowMap, SqlValue};

pub mod asset;
pub mod audit;
pub mod catalog;
pub mod identity;
pub mod maintenance;
pub mod manufacturing;
pub mod relation;

// =============================================================================
// Entity Mapper
// =============================================================================

/// The per-entity half of the repository: table identity plus the two
/// pure mapping functions.
///
/// ## Contract
/// - `to_row` emits every persisted column, including `id`. Optional
///   fields become present-or-NULL entries, enums become integer codes,
///   collections and metadata become serialized-JSON text.
/// - `from_row` is the tolerant inverse: missing or malformed values are
///   logged by the accessors and default-filled; a read never fails.
pub trait EntityMapper {
    /// The entity this mapper persists.
    type Entity;

    /// Table name.
    const TABLE: &'static str;

    /// Entity name used in error messages ("Asset", "User").
    const ENTITY_NAME: &'static str;

    /// ORDER BY clause for unpaged listings.
    const ORDER_BY: &'static str = "created_at";

    /// Converts an entity to its full column set.
    fn to_row(entity: &Self::Entity) -> RowMap;

    /// Rebuilds an entity from a fetched row, degrading on bad data.
    fn from_row(row: &RowMap) -> Self::Entity;
}

// =============================================================================
// Filter
// =============================================================================

/// An ordered conjunction of column comparisons.
///
/// ## Example
/// ```rust,ignore
/// let filter = Filter::new()
///     .eq("status", 1i64)
///     .eq("location_id", SqlValue::Null); // becomes "location_id IS NULL"
/// ```
#[derive(Debug, Clone, Default)]
pub struct Filter {
    entries: Vec<(String, SqlValue)>,
}

impl Filter {
    /// Creates an empty filter (matches everything on reads).
    pub fn new() -> Self {
        Filter {
            entries: Vec::new(),
        }
    }

    /// Adds an equality condition. A NULL value renders as `IS NULL`.
    pub fn eq(mut self, column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.entries.push((column.into(), value.into()));
        self
    }

    /// Whether the filter has no conditions.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of conditions.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Renders `" WHERE a = ? AND b IS NULL"`, or `""` when empty.
    pub(crate) fn where_clause(&self) -> String {
        if self.entries.is_empty() {
            return String::new();
        }

        let conditions: Vec<String> = self
            .entries
            .iter()
            .map(|(column, value)| {
                if value.is_null() {
                    format!("{} IS NULL", column)
                } else {
                    format!("{} = ?", column)
                }
            })
            .collect();

        format!(" WHERE {}", conditions.join(" AND "))
    }

    /// Binds the non-NULL values in clause order.
    pub(crate) fn bind_all<'q>(
        &self,
        mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    ) -> Query<'q, Sqlite, SqliteArguments<'q>> {
        for (_, value) in &self.entries {
            if !value.is_null() {
                query = value.bind_to(query);
            }
        }
        query
    }
}

// =============================================================================
// Repository
// =============================================================================

/// Generic repository over one table, parameterized by its mapper.
///
/// The struct carries no state: every method takes the executor to run
/// against. Pass the pool for a standalone call, or the live transaction
/// connection to join that transaction.
///
/// ## Example
/// ```rust,ignore
/// let assets = AssetRepository::new();
///
/// // Against the pool
/// let found = assets.find_by_id(db.pool(), "a-1").await?;
///
/// // Inside a transaction
/// let mut tx = db.pool().begin().await?;
/// assets.insert(&mut *tx, &asset).await?;
/// tx.commit().await?;
/// ```
pub struct Repository<M: EntityMapper> {
    _mapper: PhantomData<M>,
}

impl<M: EntityMapper> Repository<M> {
    /// Creates the repository handle. Free: the type is zero-sized.
    pub const fn new() -> Self {
        Repository {
            _mapper: PhantomData,
        }
    }

    /// Inserts one entity.
    ///
    /// ## Returns
    /// * `Ok(())` - Row inserted
    /// * `Err(DbError::UniqueViolation)` - a unique column collided
    pub async fn insert(
        &self,
        executor: impl Executor<'_, Database = Sqlite>,
        entity: &M::Entity,
    ) -> DbResult<()> {
        let row = M::to_row(entity);

        let columns: Vec<&str> = row.columns().collect();
        let placeholders = vec!["?"; columns.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            M::TABLE,
            columns.join(", "),
            placeholders
        );

        debug!(table = M::TABLE, "Inserting row");

        let mut query = sqlx::query(&sql);
        for (_, value) in row.iter() {
            query = value.bind_to(query);
        }
        query.execute(executor).await?;

        Ok(())
    }

    /// Fetches one entity by id.
    ///
    /// ## Returns
    /// * `Ok(Some(entity))` - Found
    /// * `Ok(None)` - No such row
    pub async fn find_by_id(
        &self,
        executor: impl Executor<'_, Database = Sqlite>,
        id: &str,
    ) -> DbResult<Option<M::Entity>> {
        let sql = format!("SELECT * FROM {} WHERE id = ?", M::TABLE);

        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(executor)
            .await?;

        Ok(row.map(|row| M::from_row(&RowMap::from_sqlite_row(&row))))
    }

    /// Fetches all entities matching the filter, in `M::ORDER_BY` order.
    /// An empty filter fetches the whole table.
    pub async fn find(
        &self,
        executor: impl Executor<'_, Database = Sqlite>,
        filter: &Filter,
    ) -> DbResult<Vec<M::Entity>> {
        let sql = format!(
            "SELECT * FROM {}{} ORDER BY {}",
            M::TABLE,
            filter.where_clause(),
            M::ORDER_BY
        );

        debug!(table = M::TABLE, conditions = filter.len(), "Listing rows");

        let query = filter.bind_all(sqlx::query(&sql));
        let rows = query.fetch_all(executor).await?;

        Ok(rows
            .iter()
            .map(|row| M::from_row(&RowMap::from_sqlite_row(row)))
            .collect())
    }

    /// Fetches the first entity matching the filter, if any.
    pub async fn find_one(
        &self,
        executor: impl Executor<'_, Database = Sqlite>,
        filter: &Filter,
    ) -> DbResult<Option<M::Entity>> {
        let sql = format!(
            "SELECT * FROM {}{} ORDER BY {} LIMIT 1",
            M::TABLE,
            filter.where_clause(),
            M::ORDER_BY
        );

        let query = filter.bind_all(sqlx::query(&sql));
        let row = query.fetch_optional(executor).await?;

        Ok(row.map(|row| M::from_row(&RowMap::from_sqlite_row(&row))))
    }

    /// Counts entities matching the filter. An empty filter counts the
    /// whole table.
    pub async fn count(
        &self,
        executor: impl Executor<'_, Database = Sqlite>,
        filter: &Filter,
    ) -> DbResult<i64> {
        let sql = format!(
            "SELECT COUNT(*) FROM {}{}",
            M::TABLE,
            filter.where_clause()
        );

        let query = filter.bind_all(sqlx::query(&sql));
        let row = query.fetch_one(executor).await?;

        Ok(row.try_get(0)?)
    }

    /// Updates one entity by the id carried in its row map.
    ///
    /// Writes the full column set minus `id`.
    ///
    /// ## Returns
    /// * `Ok(())` - Row updated
    /// * `Err(DbError::MissingId)` - the row map carries no usable id
    /// * `Err(DbError::NotFound)` - no row with that id
    pub async fn update(
        &self,
        executor: impl Executor<'_, Database = Sqlite>,
        entity: &M::Entity,
    ) -> DbResult<()> {
        let mut row = M::to_row(entity);

        let id = match row.remove("id") {
            Some(SqlValue::Text(id)) if !id.is_empty() => id,
            _ => {
                return Err(DbError::MissingId {
                    table: M::TABLE.to_string(),
                })
            }
        };

        let assignments: Vec<String> = row
            .columns()
            .map(|column| format!("{} = ?", column))
            .collect();
        let sql = format!(
            "UPDATE {} SET {} WHERE id = ?",
            M::TABLE,
            assignments.join(", ")
        );

        debug!(table = M::TABLE, id = %id, "Updating row");

        let mut query = sqlx::query(&sql);
        for (_, value) in row.iter() {
            query = value.bind_to(query);
        }
        query = query.bind(id.clone());

        let result = query.execute(executor).await?;
        if result.rows_affected() == 0 {
            return Err(DbError::not_found(M::ENTITY_NAME, &id));
        }

        Ok(())
    }

    /// Deletes one row by id.
    ///
    /// ## Returns
    /// * `Ok(())` - Row deleted
    /// * `Err(DbError::NotFound)` - no row with that id
    pub async fn delete(
        &self,
        executor: impl Executor<'_, Database = Sqlite>,
        id: &str,
    ) -> DbResult<()> {
        let sql = format!("DELETE FROM {} WHERE id = ?", M::TABLE);

        debug!(table = M::TABLE, id = %id, "Deleting row");

        let result = sqlx::query(&sql).bind(id).execute(executor).await?;
        if result.rows_affected() == 0 {
            return Err(DbError::not_found(M::ENTITY_NAME, id));
        }

        Ok(())
    }

    /// Deletes all rows matching the filter, returning how many went.
    ///
    /// Refuses an empty filter: reads treat "no conditions" as
    /// "everything", deletes must never inherit that meaning.
    pub async fn delete_where(
        &self,
        executor: impl Executor<'_, Database = Sqlite>,
        filter: &Filter,
    ) -> DbResult<u64> {
        if filter.is_empty() {
            return Err(DbError::EmptyFilter {
                table: M::TABLE.to_string(),
            });
        }

        let sql = format!("DELETE FROM {}{}", M::TABLE, filter.where_clause());

        debug!(table = M::TABLE, conditions = filter.len(), "Bulk delete");

        let query = filter.bind_all(sqlx::query(&sql));
        let result = query.execute(executor).await?;

        Ok(result.rows_affected())
    }
}

// Manual impls: the handle is copyable regardless of the mapper type.
impl<M: EntityMapper> Clone for Repository<M> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<M: EntityMapper> Copy for Repository<M> {}

impl<M: EntityMapper> Default for Repository<M> {
    fn default() -> Self {
        Repository::new()
    }
}

impl<M: EntityMapper> std::fmt::Debug for Repository<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository").field("table", &M::TABLE).finish()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::asset::AssetRepository;
    use super::*;
    use crate::pool::{Database, DbConfig};
    use chrono::Utc;
    use forge_core::{Asset, EntityStatus, Metadata};

    fn sample_asset(code: &str) -> Asset {
        let now = Utc::now();
        Asset {
            id: uuid::Uuid::new_v4().to_string(),
            asset_code: code.to_string(),
            name: format!("Asset {}", code),
            serial_number: None,
            asset_type: Some("pump".to_string()),
            location_id: None,
            registered_at: now,
            status: EntityStatus::Active,
            metadata: Metadata::new(),
            created_at: now,
            created_by: None,
            updated_at: now,
            updated_by: None,
        }
    }

    async fn test_db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    #[tokio::test]
    async fn test_insert_and_find_by_id() {
        let db = test_db().await;
        let repo = AssetRepository::new();

        let asset = sample_asset("PUMP-001");
        repo.insert(db.pool(), &asset).await.unwrap();

        let found = repo.find_by_id(db.pool(), &asset.id).await.unwrap().unwrap();
        assert_eq!(found.id, asset.id);
        assert_eq!(found.asset_code, "PUMP-001");
        assert_eq!(found.asset_type.as_deref(), Some("pump"));
        assert_eq!(found.status, EntityStatus::Active);
        assert_eq!(found.registered_at, asset.registered_at);

        let missing = repo.find_by_id(db.pool(), "nope").await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_find_with_filter_and_empty_filter() {
        let db = test_db().await;
        let repo = AssetRepository::new();

        let mut inactive = sample_asset("PUMP-002");
        inactive.status = EntityStatus::Inactive;
        repo.insert(db.pool(), &sample_asset("PUMP-001")).await.unwrap();
        repo.insert(db.pool(), &inactive).await.unwrap();

        // Filtered read
        let active = repo
            .find(
                db.pool(),
                &Filter::new().eq("status", EntityStatus::Active.as_i64()),
            )
            .await
            .unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].asset_code, "PUMP-001");

        // Empty filter reads everything
        let all = repo.find(db.pool(), &Filter::new()).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_null_filter_matches_is_null() {
        let db = test_db().await;
        let repo = AssetRepository::new();

        let mut located = sample_asset("PUMP-001");
        located.location_id = Some("loc-1".to_string());
        repo.insert(db.pool(), &located).await.unwrap();
        repo.insert(db.pool(), &sample_asset("PUMP-002")).await.unwrap();

        let unplaced = repo
            .find(db.pool(), &Filter::new().eq("location_id", SqlValue::Null))
            .await
            .unwrap();
        assert_eq!(unplaced.len(), 1);
        assert_eq!(unplaced[0].asset_code, "PUMP-002");
    }

    #[tokio::test]
    async fn test_count() {
        let db = test_db().await;
        let repo = AssetRepository::new();

        repo.insert(db.pool(), &sample_asset("PUMP-001")).await.unwrap();
        repo.insert(db.pool(), &sample_asset("PUMP-002")).await.unwrap();

        let total = repo.count(db.pool(), &Filter::new()).await.unwrap();
        assert_eq!(total, 2);

        let none = repo
            .count(db.pool(), &Filter::new().eq("asset_code", "ABSENT"))
            .await
            .unwrap();
        assert_eq!(none, 0);
    }

    #[tokio::test]
    async fn test_update_and_not_found() {
        let db = test_db().await;
        let repo = AssetRepository::new();

        let mut asset = sample_asset("PUMP-001");
        repo.insert(db.pool(), &asset).await.unwrap();

        asset.name = "Renamed Pump".to_string();
        asset.serial_number = Some("SN-42".to_string());
        repo.update(db.pool(), &asset).await.unwrap();

        let found = repo.find_by_id(db.pool(), &asset.id).await.unwrap().unwrap();
        assert_eq!(found.name, "Renamed Pump");
        assert_eq!(found.serial_number.as_deref(), Some("SN-42"));

        // Updating a row that does not exist is NotFound
        let ghost = sample_asset("PUMP-404");
        let err = repo.update(db.pool(), &ghost).await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_update_requires_id() {
        let db = test_db().await;
        let repo = AssetRepository::new();

        let mut asset = sample_asset("PUMP-001");
        asset.id = String::new();
        let err = repo.update(db.pool(), &asset).await.unwrap_err();
        assert!(matches!(err, DbError::MissingId { .. }));
    }

    #[tokio::test]
    async fn test_delete_and_delete_where_guard() {
        let db = test_db().await;
        let repo = AssetRepository::new();

        let asset = sample_asset("PUMP-001");
        repo.insert(db.pool(), &asset).await.unwrap();
        repo.insert(db.pool(), &sample_asset("PUMP-002")).await.unwrap();

        repo.delete(db.pool(), &asset.id).await.unwrap();
        let err = repo.delete(db.pool(), &asset.id).await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));

        // The mass-delete guard: empty filter is refused and nothing is lost
        let err = repo.delete_where(db.pool(), &Filter::new()).await.unwrap_err();
        assert!(matches!(err, DbError::EmptyFilter { .. }));
        assert_eq!(repo.count(db.pool(), &Filter::new()).await.unwrap(), 1);

        // A real filter deletes exactly the matches
        let gone = repo
            .delete_where(db.pool(), &Filter::new().eq("asset_code", "PUMP-002"))
            .await
            .unwrap();
        assert_eq!(gone, 1);
        assert_eq!(repo.count(db.pool(), &Filter::new()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_code_is_unique_violation() {
        let db = test_db().await;
        let repo = AssetRepository::new();

        repo.insert(db.pool(), &sample_asset("PUMP-001")).await.unwrap();
        let err = repo
            .insert(db.pool(), &sample_asset("PUMP-001"))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
    }

    #[tokio::test]
    async fn test_transaction_rollback_discards_insert() {
        let db = test_db().await;
        let repo = AssetRepository::new();

        let asset = sample_asset("PUMP-001");
        {
            let mut tx = db.pool().begin().await.unwrap();
            repo.insert(&mut *tx, &asset).await.unwrap();
            tx.rollback().await.unwrap();
        }
        assert!(repo.find_by_id(db.pool(), &asset.id).await.unwrap().is_none());

        // And commit keeps it
        let mut tx = db.pool().begin().await.unwrap();
        repo.insert(&mut *tx, &asset).await.unwrap();
        tx.commit().await.unwrap();
        assert!(repo.find_by_id(db.pool(), &asset.id).await.unwrap().is_some());
    }
}
