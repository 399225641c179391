//! Shared test fixtures for the service tests.

use forge_db::{Database, DbConfig};

use crate::auth::AuthConfig;
use crate::AppServices;

/// A fully wired service container on a fresh in-memory database.
///
/// Migrations have run, so the built-in administrator role exists and
/// `Actor::system()` passes every permission check.
pub(crate) async fn test_services() -> AppServices {
    let db = Database::new(DbConfig::in_memory())
        .await
        .expect("in-memory database");
    AppServices::new(db, AuthConfig::default())
}
