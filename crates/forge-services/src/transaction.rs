//! # Transaction Orchestration
//!
//! Every mutating service operation runs its writes through
//! [`TransactionRunner::run`]: begin, hand the live connection to the
//! unit of work, commit on `Ok`, roll back on `Err`.
//!
//! ## Connection Discipline
//! ```text
//! pool ──begin──► Transaction (one connection)
//!                    │
//!                    ▼
//!          work(&mut SqliteConnection)   ← every repository call in the
//!                    │                     unit of work takes this, so
//!          Ok ───────┼─────── Err          nested reads and writes join
//!           │        │         │           the same transaction
//!        commit      │      rollback
//!           └────────┴─────────┘
//!              connection back to pool on every path
//! ```
//!
//! `sqlx::Transaction` rolls back on drop, so an early `?` inside this
//! module cannot leak a dangling transaction either.

use futures::future::BoxFuture;
use sqlx::SqliteConnection;
use tracing::{debug, error};

use forge_core::ServiceResult;
use forge_db::{Database, DbError};

/// Runs units of work inside a database transaction.
#[derive(Debug, Clone)]
pub struct TransactionRunner {
    db: Database,
}

impl TransactionRunner {
    pub fn new(db: Database) -> Self {
        TransactionRunner { db }
    }

    /// Runs `work` inside a fresh transaction.
    ///
    /// The closure receives the live connection; it must do all its
    /// database calls through it. Returning `Err` rolls everything back
    /// and the error is handed to the caller unchanged.
    ///
    /// ## Arguments
    /// * `operation` - Short label for logs ("create_asset")
    /// * `work` - The unit of work, as a boxed future over the connection
    pub async fn run<T, F>(&self, operation: &str, work: F) -> ServiceResult<T>
    where
        F: for<'t> FnOnce(&'t mut SqliteConnection) -> BoxFuture<'t, ServiceResult<T>> + Send,
        T: Send,
    {
        let mut tx = self.db.pool().begin().await.map_err(DbError::from)?;
        debug!(operation, "Transaction started");

        match work(&mut *tx).await {
            Ok(value) => {
                tx.commit().await.map_err(DbError::from)?;
                debug!(operation, "Transaction committed");
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    error!(operation, error = %rollback_err, "Rollback failed");
                } else {
                    debug!(operation, error = %err, "Transaction rolled back");
                }
                Err(err)
            }
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use forge_core::{EntityStatus, Metadata, Role, ServiceError};
    use forge_db::{DbConfig, Filter};

    fn sample_role(id: &str) -> Role {
        let now = Utc::now();
        Role {
            id: id.to_string(),
            role_code: format!("code-{}", id),
            name: "Sample".to_string(),
            description: None,
            status: EntityStatus::Active,
            metadata: Metadata::new(),
            created_at: now,
            created_by: None,
            updated_at: now,
            updated_by: None,
        }
    }

    #[tokio::test]
    async fn test_commit_persists_all_writes() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let runner = TransactionRunner::new(db.clone());
        let repo = db.roles();

        runner
            .run("two_roles", move |conn| {
                Box::pin(async move {
                    repo.insert(&mut *conn, &sample_role("r-1")).await?;
                    repo.insert(&mut *conn, &sample_role("r-2")).await?;
                    Ok(())
                })
            })
            .await
            .unwrap();

        // Seed migration adds the admin role, hence the +1.
        let total = repo.count(db.pool(), &Filter::new()).await.unwrap();
        assert_eq!(total, 3);
    }

    #[tokio::test]
    async fn test_error_rolls_back_every_write() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let runner = TransactionRunner::new(db.clone());
        let repo = db.roles();

        let result: ServiceResult<()> = runner
            .run("doomed", move |conn| {
                Box::pin(async move {
                    repo.insert(&mut *conn, &sample_role("r-1")).await?;
                    Err(ServiceError::operation_failed("late failure"))
                })
            })
            .await;
        assert!(result.is_err());

        // The insert before the failure must be gone too.
        let survivors = repo
            .find(db.pool(), &Filter::new().eq("id", "r-1"))
            .await
            .unwrap();
        assert!(survivors.is_empty());
    }

    #[tokio::test]
    async fn test_connection_is_released_after_rollback() {
        // The in-memory pool holds exactly one connection. If any exit
        // path leaked it, the second run would deadlock on acquire.
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let runner = TransactionRunner::new(db.clone());
        let repo = db.roles();

        let _: ServiceResult<()> = runner
            .run("first", move |_conn| {
                Box::pin(async move { Err(ServiceError::operation_failed("boom")) })
            })
            .await;

        runner
            .run("second", move |conn| {
                Box::pin(async move {
                    repo.insert(&mut *conn, &sample_role("r-after")).await?;
                    Ok(())
                })
            })
            .await
            .unwrap();

        assert!(repo.find_by_id(db.pool(), "r-after").await.unwrap().is_some());
    }
}
