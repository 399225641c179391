//! # forge-services: Service Layer for Forge Plant
//!
//! Every business operation of the system lives here. A service method
//! is the unit of work the application calls: it checks permissions,
//! validates input, runs the database changes in one transaction, and
//! reports to the audit trail and the event bus after commit.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Forge Plant Architecture                          │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    Embedding Application                        │   │
//! │  │        desktop shell, admin CLI, integration tests              │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ AppServices                            │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │              ★ forge-services (THIS CRATE) ★                    │   │
//! │  │                                                                 │   │
//! │  │   ┌──────────┐ ┌──────────┐ ┌────────────┐ ┌─────────────┐    │   │
//! │  │   │ catalog  │ │  asset   │ │ production │ │ maintenance │    │   │
//! │  │   │ location │ │ register │ │ lines/BOMs │ │  requests   │    │   │
//! │  │   │ uom/prod │ │          │ │   orders   │ │ activities  │    │   │
//! │  │   └──────────┘ └──────────┘ └────────────┘ └─────────────┘    │   │
//! │  │   ┌──────────┐ ┌──────────┐ ┌────────────┐ ┌─────────────┐    │   │
//! │  │   │ user/role│ │   auth   │ │   authz    │ │    audit    │    │   │
//! │  │   │ accounts │ │ sessions │ │ permission │ │    trail    │    │   │
//! │  │   └──────────┘ └──────────┘ └────────────┘ └─────────────┘    │   │
//! │  │                                                                 │   │
//! │  │   PERMISSION CHECK ──► VALIDATE ──► TRANSACT ──► AUDIT+EVENT   │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    forge-db (Database Layer)                    │   │
//! │  │          repositories, relation stores, migrations              │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`catalog`] - Locations, units of measure, products
//! - [`asset`] - The asset register
//! - [`bom`] - Bills of material and their items
//! - [`production`] - Production lines and orders
//! - [`maintenance`] - Maintenance requests and activity journals
//! - [`user`] - Accounts, roles, assignments, permission grants
//! - [`auth`] - Login, logout, session validation
//! - [`authz`] - Permission keys and the [`Authorizer`] seam
//! - [`audit`] - Best-effort audit trail writer
//! - [`events`] - In-process domain event bus
//!
//! ## The Operation Envelope
//!
//! Every mutating operation follows the same shape:
//!
//! 1. `require(authorizer, actor, permission)` - fail fast on missing rights
//! 2. Field validation from `forge_core::validation` - before any I/O
//! 3. One transaction: uniqueness probes, reference checks, writes
//! 4. After commit: audit row (best-effort) and domain event
//!
//! Reads skip steps 1 and 3: any authenticated actor may look.
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use forge_db::{Database, DbConfig};
//! use forge_services::{Actor, AppServices, AuthConfig, LocationInput};
//!
//! let db = Database::new(DbConfig::default()).await?;
//! let services = AppServices::new(db, AuthConfig::load());
//!
//! let outcome = services.auth.login("jdoe", "secret-password").await?;
//! let actor = services.auth.validate_session(&outcome.session.id).await?;
//!
//! let location = services
//!     .locations
//!     .create_location(&actor, LocationInput {
//!         location_code: "hall-a".into(),
//!         name: "Hall A".into(),
//!         parent_id: None,
//!         description: None,
//!         metadata: Default::default(),
//!     })
//!     .await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod asset;
pub mod audit;
pub mod auth;
pub mod authz;
pub mod bom;
pub mod catalog;
pub mod context;
pub mod events;
pub mod lookup;
pub mod maintenance;
pub mod password;
pub mod production;
pub mod transaction;
pub mod user;

#[cfg(test)]
pub(crate) mod testutil;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use asset::{AssetInput, AssetService};
pub use audit::{AuditEvent, AuditLogger};
pub use auth::{AuthConfig, AuthService, LoginOutcome};
pub use authz::{permission, require, AllowAll, Authorizer, RoleAuthorizer};
pub use bom::{BillOfMaterialInput, BillOfMaterialService, BomItemInput};
pub use catalog::{
    LocationInput, LocationService, ProductInput, ProductService, UnitOfMeasureInput,
    UnitOfMeasureService,
};
pub use context::{new_entity_id, Actor};
pub use events::{DomainEvent, EventBus};
pub use lookup::EntityLookup;
pub use maintenance::{MaintenanceActivityInput, MaintenanceRequestInput, MaintenanceService};
pub use password::{PasswordHasher, Sha256PasswordHasher};
pub use production::{
    ProductionLineInput, ProductionLineService, ProductionOrderInput, ProductionOrderService,
};
pub use transaction::TransactionRunner;
pub use user::{NewUser, RoleInput, RoleService, UserService, UserUpdate};

use std::sync::Arc;

use forge_db::Database;

// =============================================================================
// Service Container
// =============================================================================

/// Everything an embedding application needs, wired together once.
///
/// Cloning is cheap: the services share the pool, the event bus, and
/// the authorizer behind `Arc`s.
#[derive(Clone)]
pub struct AppServices {
    pub locations: LocationService,
    pub units_of_measure: UnitOfMeasureService,
    pub products: ProductService,
    pub assets: AssetService,
    pub bills_of_material: BillOfMaterialService,
    pub production_lines: ProductionLineService,
    pub production_orders: ProductionOrderService,
    pub maintenance: MaintenanceService,
    pub users: UserService,
    pub roles: RoleService,
    pub auth: AuthService,
    pub events: EventBus,
    pub db: Database,
}

impl AppServices {
    /// Wires the standard stack: database-backed authorization and the
    /// salted SHA-256 password hasher.
    pub fn new(db: Database, auth_config: AuthConfig) -> Self {
        let authorizer: Arc<dyn Authorizer> = Arc::new(RoleAuthorizer::new(db.clone()));
        let hasher: Arc<dyn PasswordHasher> = Arc::new(Sha256PasswordHasher);
        Self::with_parts(db, authorizer, hasher, EventBus::default(), auth_config)
    }

    /// Wires the container from explicit parts. The seam for tests and
    /// embeddings that bring their own authorizer or hasher.
    pub fn with_parts(
        db: Database,
        authorizer: Arc<dyn Authorizer>,
        hasher: Arc<dyn PasswordHasher>,
        events: EventBus,
        auth_config: AuthConfig,
    ) -> Self {
        AppServices {
            locations: LocationService::new(db.clone(), Arc::clone(&authorizer), events.clone()),
            units_of_measure: UnitOfMeasureService::new(
                db.clone(),
                Arc::clone(&authorizer),
                events.clone(),
            ),
            products: ProductService::new(db.clone(), Arc::clone(&authorizer), events.clone()),
            assets: AssetService::new(db.clone(), Arc::clone(&authorizer), events.clone()),
            bills_of_material: BillOfMaterialService::new(
                db.clone(),
                Arc::clone(&authorizer),
                events.clone(),
            ),
            production_lines: ProductionLineService::new(
                db.clone(),
                Arc::clone(&authorizer),
                events.clone(),
            ),
            production_orders: ProductionOrderService::new(
                db.clone(),
                Arc::clone(&authorizer),
                events.clone(),
            ),
            maintenance: MaintenanceService::new(
                db.clone(),
                Arc::clone(&authorizer),
                events.clone(),
            ),
            users: UserService::new(
                db.clone(),
                Arc::clone(&authorizer),
                events.clone(),
                Arc::clone(&hasher),
            ),
            roles: RoleService::new(db.clone(), Arc::clone(&authorizer), events.clone()),
            auth: AuthService::new(db.clone(), events.clone(), hasher, auth_config),
            events,
            db,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::test_services;
    use forge_core::{AuditAction, Metadata};

    #[tokio::test]
    async fn test_operations_publish_domain_events() {
        let services = test_services().await;
        let mut rx = services.events.subscribe();

        let location = services
            .locations
            .create_location(
                &Actor::system(),
                LocationInput {
                    location_code: "hall-a".to_string(),
                    name: "Hall A".to_string(),
                    parent_id: None,
                    description: None,
                    metadata: Metadata::new(),
                },
            )
            .await
            .unwrap();

        let event = rx.try_recv().unwrap();
        assert_eq!(event.entity_type, "Location");
        assert_eq!(event.entity_id, location.id);
        assert_eq!(event.action, AuditAction::Create);
    }

    #[tokio::test]
    async fn test_container_clones_share_state() {
        let services = test_services().await;
        let clone = services.clone();

        let location = services
            .locations
            .create_location(
                &Actor::system(),
                LocationInput {
                    location_code: "hall-a".to_string(),
                    name: "Hall A".to_string(),
                    parent_id: None,
                    description: None,
                    metadata: Metadata::new(),
                },
            )
            .await
            .unwrap();

        // The clone sees the same database.
        clone
            .locations
            .get_location_by_id(&Actor::system(), &location.id)
            .await
            .unwrap();
    }
}
