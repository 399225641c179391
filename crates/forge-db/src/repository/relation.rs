//! # Relation Store
//!
//! Data access for pure pair tables (`user_roles`, `role_permissions`).
//!
//! A pair table has no synthetic id and nothing to update: a link either
//! exists or it does not. Forcing these tables through the entity
//! repository would hand callers `find_by_id` and `update` methods that
//! can never mean anything, so they get their own type with a
//! pair-oriented surface instead.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                 RelationStore                            │
//! │                                                          │
//! │   user_roles          (user_id ──── role_id)             │
//! │   role_permissions    (role_id ──── permission)          │
//! │                                                          │
//! │   add / remove / contains          one pair              │
//! │   left_ids_for / right_ids_for     one side              │
//! │   remove_all_for_left / _right     cascade cleanup       │
//! │   remove_matching(filter)          guarded bulk delete   │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! "Left" and "right" are the table's column order: for `user_roles` the
//! left is the user, for `role_permissions` the left is the role.

use sqlx::sqlite::Sqlite;
use sqlx::{Executor, Row};
use tracing::debug;

use crate::error::{DbError, DbResult};
use crate::repository::Filter;

/// Pair-table data access. Construct via [`RelationStore::user_roles`]
/// or [`RelationStore::role_permissions`].
#[derive(Debug, Clone, Copy)]
pub struct RelationStore {
    table: &'static str,
    left_col: &'static str,
    right_col: &'static str,
}

impl RelationStore {
    /// The user↔role assignment table.
    pub const fn user_roles() -> Self {
        RelationStore {
            table: "user_roles",
            left_col: "user_id",
            right_col: "role_id",
        }
    }

    /// The role↔permission grant table.
    pub const fn role_permissions() -> Self {
        RelationStore {
            table: "role_permissions",
            left_col: "role_id",
            right_col: "permission",
        }
    }

    /// Table name, for log and error messages.
    pub const fn table(&self) -> &'static str {
        self.table
    }

    /// Links a pair. Idempotent.
    ///
    /// ## Returns
    /// * `Ok(true)` - the link was created
    /// * `Ok(false)` - it already existed
    pub async fn add(
        &self,
        executor: impl Executor<'_, Database = Sqlite>,
        left: &str,
        right: &str,
    ) -> DbResult<bool> {
        let sql = format!(
            "INSERT OR IGNORE INTO {} ({}, {}) VALUES (?, ?)",
            self.table, self.left_col, self.right_col
        );

        debug!(table = self.table, left = %left, right = %right, "Linking pair");

        let result = sqlx::query(&sql)
            .bind(left)
            .bind(right)
            .execute(executor)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Unlinks a pair.
    ///
    /// ## Returns
    /// * `Ok(true)` - the link existed and was removed
    /// * `Ok(false)` - there was nothing to remove
    pub async fn remove(
        &self,
        executor: impl Executor<'_, Database = Sqlite>,
        left: &str,
        right: &str,
    ) -> DbResult<bool> {
        let sql = format!(
            "DELETE FROM {} WHERE {} = ? AND {} = ?",
            self.table, self.left_col, self.right_col
        );

        debug!(table = self.table, left = %left, right = %right, "Unlinking pair");

        let result = sqlx::query(&sql)
            .bind(left)
            .bind(right)
            .execute(executor)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Removes every link whose left side matches. Returns how many went.
    pub async fn remove_all_for_left(
        &self,
        executor: impl Executor<'_, Database = Sqlite>,
        left: &str,
    ) -> DbResult<u64> {
        let sql = format!("DELETE FROM {} WHERE {} = ?", self.table, self.left_col);

        let result = sqlx::query(&sql).bind(left).execute(executor).await?;
        Ok(result.rows_affected())
    }

    /// Removes every link whose right side matches. Returns how many went.
    pub async fn remove_all_for_right(
        &self,
        executor: impl Executor<'_, Database = Sqlite>,
        right: &str,
    ) -> DbResult<u64> {
        let sql = format!("DELETE FROM {} WHERE {} = ?", self.table, self.right_col);

        let result = sqlx::query(&sql).bind(right).execute(executor).await?;
        Ok(result.rows_affected())
    }

    /// Whether the pair is linked.
    pub async fn contains(
        &self,
        executor: impl Executor<'_, Database = Sqlite>,
        left: &str,
        right: &str,
    ) -> DbResult<bool> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE {} = ? AND {} = ?",
            self.table, self.left_col, self.right_col
        );

        let row = sqlx::query(&sql)
            .bind(left)
            .bind(right)
            .fetch_one(executor)
            .await?;

        Ok(row.try_get::<i64, _>(0)? > 0)
    }

    /// All right-side values linked to `left`, sorted.
    pub async fn right_ids_for(
        &self,
        executor: impl Executor<'_, Database = Sqlite>,
        left: &str,
    ) -> DbResult<Vec<String>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = ? ORDER BY {}",
            self.right_col, self.table, self.left_col, self.right_col
        );

        let rows = sqlx::query(&sql).bind(left).fetch_all(executor).await?;
        rows.iter().map(|row| Ok(row.try_get(0)?)).collect()
    }

    /// All left-side values linked to `right`, sorted.
    pub async fn left_ids_for(
        &self,
        executor: impl Executor<'_, Database = Sqlite>,
        right: &str,
    ) -> DbResult<Vec<String>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = ? ORDER BY {}",
            self.left_col, self.table, self.right_col, self.left_col
        );

        let rows = sqlx::query(&sql).bind(right).fetch_all(executor).await?;
        rows.iter().map(|row| Ok(row.try_get(0)?)).collect()
    }

    /// How many links carry this right-side value.
    pub async fn count_for_right(
        &self,
        executor: impl Executor<'_, Database = Sqlite>,
        right: &str,
    ) -> DbResult<i64> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE {} = ?",
            self.table, self.right_col
        );

        let row = sqlx::query(&sql).bind(right).fetch_one(executor).await?;
        Ok(row.try_get(0)?)
    }

    /// Removes all links matching the filter. Same mass-delete guard as
    /// the entity repository: an empty filter is refused.
    pub async fn remove_matching(
        &self,
        executor: impl Executor<'_, Database = Sqlite>,
        filter: &Filter,
    ) -> DbResult<u64> {
        if filter.is_empty() {
            return Err(DbError::EmptyFilter {
                table: self.table.to_string(),
            });
        }

        let sql = format!("DELETE FROM {}{}", self.table, filter.where_clause());

        debug!(table = self.table, conditions = filter.len(), "Bulk unlink");

        let query = filter.bind_all(sqlx::query(&sql));
        let result = query.execute(executor).await?;
        Ok(result.rows_affected())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    async fn test_db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    #[tokio::test]
    async fn test_add_is_idempotent() {
        let db = test_db().await;
        let store = RelationStore::user_roles();

        assert!(store.add(db.pool(), "u-1", "r-1").await.unwrap());
        assert!(!store.add(db.pool(), "u-1", "r-1").await.unwrap());

        assert!(store.contains(db.pool(), "u-1", "r-1").await.unwrap());
        assert!(!store.contains(db.pool(), "u-1", "r-2").await.unwrap());
    }

    #[tokio::test]
    async fn test_remove_reports_whether_link_existed() {
        let db = test_db().await;
        let store = RelationStore::user_roles();

        store.add(db.pool(), "u-1", "r-1").await.unwrap();
        assert!(store.remove(db.pool(), "u-1", "r-1").await.unwrap());
        assert!(!store.remove(db.pool(), "u-1", "r-1").await.unwrap());
    }

    #[tokio::test]
    async fn test_sides_are_queried_independently() {
        let db = test_db().await;
        let store = RelationStore::user_roles();

        store.add(db.pool(), "u-1", "r-admin").await.unwrap();
        store.add(db.pool(), "u-1", "r-viewer").await.unwrap();
        store.add(db.pool(), "u-2", "r-viewer").await.unwrap();

        let roles = store.right_ids_for(db.pool(), "u-1").await.unwrap();
        assert_eq!(roles, vec!["r-admin", "r-viewer"]);

        let users = store.left_ids_for(db.pool(), "r-viewer").await.unwrap();
        assert_eq!(users, vec!["u-1", "u-2"]);

        assert_eq!(store.count_for_right(db.pool(), "r-viewer").await.unwrap(), 2);
        assert_eq!(store.count_for_right(db.pool(), "r-ghost").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_remove_all_for_each_side() {
        let db = test_db().await;
        let store = RelationStore::user_roles();

        store.add(db.pool(), "u-1", "r-1").await.unwrap();
        store.add(db.pool(), "u-1", "r-2").await.unwrap();
        store.add(db.pool(), "u-2", "r-1").await.unwrap();

        assert_eq!(store.remove_all_for_left(db.pool(), "u-1").await.unwrap(), 2);
        assert!(store.right_ids_for(db.pool(), "u-1").await.unwrap().is_empty());

        assert_eq!(store.remove_all_for_right(db.pool(), "r-1").await.unwrap(), 1);
        assert!(!store.contains(db.pool(), "u-2", "r-1").await.unwrap());
    }

    #[tokio::test]
    async fn test_remove_matching_refuses_empty_filter() {
        let db = test_db().await;
        let store = RelationStore::role_permissions();

        store.add(db.pool(), "r-1", "assets:read").await.unwrap();

        let err = store
            .remove_matching(db.pool(), &Filter::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::EmptyFilter { .. }));

        let gone = store
            .remove_matching(db.pool(), &Filter::new().eq("permission", "assets:read"))
            .await
            .unwrap();
        assert_eq!(gone, 1);
    }
}
