//! # forge-db: Database Layer for Forge ERP
//!
//! This crate provides database access for Forge ERP.
//! It uses SQLite for local storage with sqlx for async operations.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Forge ERP Data Flow                              │
//! │                                                                         │
//! │  Service operation (create_asset)                                      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     forge-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │ Repository<M>  │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │ RelationStore  │    │  (embedded)  │  │   │
//! │  │   │               │    │                │    │              │  │   │
//! │  │   │ SqlitePool    │◄───│ RowMap in/out  │    │ 001_init.sql │  │   │
//! │  │   │ Connection    │    │ Filter → WHERE │    │ 002_seed.sql │  │   │
//! │  │   │ Management    │    │                │    │              │  │   │
//! │  │   └───────────────┘    └────────────────┘    └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database                             │   │
//! │  │                  ./data/forge.db (WAL mode)                     │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`value`] - Tagged SQL values and ordered row maps
//! - [`repository`] - Generic entity repository, relation store, mappers
//!
//! ## The Executor Parameter
//!
//! Every repository method takes `impl Executor<'_, Database = Sqlite>`:
//! pass `db.pool()` for a standalone operation, or the live transaction
//! connection to make the call part of that transaction. Nested service
//! calls therefore share one connection by construction and can never
//! re-enter the pool mid-transaction.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use forge_db::{Database, DbConfig, Filter};
//!
//! // Create database with default config
//! let config = DbConfig::new("path/to/forge.db");
//! let db = Database::new(config).await?;
//!
//! // Use repositories
//! let assets = db.assets();
//! let active = assets
//!     .find(db.pool(), &Filter::new().eq("status", 1i64))
//!     .await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod value;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};
pub use value::{RowMap, SqlValue};

// Repository re-exports for convenience
pub use repository::relation::RelationStore;
pub use repository::{EntityMapper, Filter, Repository};

pub use repository::asset::AssetRepository;
pub use repository::audit::AuditLogRepository;
pub use repository::catalog::{LocationRepository, ProductRepository, UnitOfMeasureRepository};
pub use repository::identity::{RoleRepository, SessionRepository, UserRepository};
pub use repository::maintenance::{MaintenanceActivityRepository, MaintenanceRequestRepository};
pub use repository::manufacturing::{
    BillOfMaterialRepository, BomItemRepository, ProductionLineRepository,
    ProductionOrderRepository,
};
