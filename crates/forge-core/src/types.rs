//! # Entity Types
//!
//! Every entity Forge ERP persists, as plain serializable structs.
//!
//! ## Type Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Entity Types                                    │
//! │                                                                         │
//! │  Catalog                 Manufacturing            Security              │
//! │  ─────────────           ─────────────────        ─────────────         │
//! │  Location                BillOfMaterial           User                  │
//! │  UnitOfMeasure           └─ BomItem (child)       Role                  │
//! │  Product                 ProductionLine           Session               │
//! │                          ProductionOrder          AuditRecord           │
//! │  Assets                  MaintenanceRequest                             │
//! │  ─────────────           └─ MaintenanceActivity (child)                 │
//! │  Asset                                                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Shared Contract
//! Every top-level entity carries:
//! - `id`: UUID v4 string - immutable after creation
//! - `status`: [`EntityStatus`] - transitions validated by services only
//! - `metadata`: opaque string→JSON map, persisted as a serialized column
//!   and round-tripped without interpretation
//! - `created_at`/`created_by`, `updated_at`/`updated_by` audit stamps
//!
//! Child rows (BOM items, maintenance activities) belong to exactly one
//! parent and carry only `created_at`; deleting the parent deletes them
//! first, inside the same transaction.
//!
//! ## Dual-Key Identity Pattern
//! Every entity has:
//! - `id`: UUID v4 - immutable, used for relations
//! - Business code (asset_code, order_number, username, ...) - human-readable,
//!   unique, potentially renamed

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::status::{EntityStatus, MaintenancePriority};

// =============================================================================
// Metadata
// =============================================================================

/// Opaque per-entity extension data.
///
/// Stored as one serialized JSON column. The system never interprets the
/// contents; it only guarantees the map round-trips unchanged. A BTreeMap
/// keeps serialization deterministic.
pub type Metadata = BTreeMap<String, serde_json::Value>;

// =============================================================================
// Catalog: Location
// =============================================================================

/// A physical or logical place (site, hall, rack) assets and lines live in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Business code, unique across locations.
    pub location_code: String,

    /// Display name.
    pub name: String,

    /// Optional parent location for hierarchies (weak reference).
    pub parent_id: Option<String>,

    /// Optional free-text description.
    pub description: Option<String>,

    /// Lifecycle status.
    pub status: EntityStatus,

    /// Opaque extension data.
    pub metadata: Metadata,

    pub created_at: DateTime<Utc>,
    pub created_by: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub updated_by: Option<String>,
}

// =============================================================================
// Catalog: Unit of Measure
// =============================================================================

/// A unit quantities are expressed in (piece, kilogram, litre).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitOfMeasure {
    pub id: String,

    /// Business code, unique across units ("KG", "PCS").
    pub uom_code: String,

    pub name: String,

    /// Short symbol for display ("kg", "pcs").
    pub symbol: String,

    pub status: EntityStatus,
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub created_by: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub updated_by: Option<String>,
}

// =============================================================================
// Catalog: Product
// =============================================================================

/// A material or finished good that can appear on a bill of material
/// or be the target of a production order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: String,

    /// Business code, unique across products.
    pub product_code: String,

    pub name: String,

    pub description: Option<String>,

    /// Unit the product is counted in (weak reference to UnitOfMeasure).
    pub uom_id: String,

    pub status: EntityStatus,
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub created_by: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub updated_by: Option<String>,
}

// =============================================================================
// Asset
// =============================================================================

/// A tracked piece of equipment (machine, vehicle, tool).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Asset {
    pub id: String,

    /// Business code, unique across assets.
    pub asset_code: String,

    pub name: String,

    /// Manufacturer serial number, unique when present.
    pub serial_number: Option<String>,

    /// Free-form category ("pump", "forklift").
    pub asset_type: Option<String>,

    /// Where the asset currently is (weak reference to Location).
    pub location_id: Option<String>,

    /// When the asset entered the register. Set once at creation.
    pub registered_at: DateTime<Utc>,

    pub status: EntityStatus,
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub created_by: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub updated_by: Option<String>,
}

// =============================================================================
// Manufacturing: Bill of Material
// =============================================================================

/// A recipe: which components, in which quantities, make one product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillOfMaterial {
    pub id: String,

    /// Business code, unique across BOMs.
    pub bom_code: String,

    pub name: String,

    /// The product this BOM produces (weak reference).
    pub product_id: String,

    /// Revision counter, starts at 1.
    pub revision: i64,

    pub status: EntityStatus,
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub created_by: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub updated_by: Option<String>,
}

/// One component line of a bill of material.
/// Owned by its BOM: deleting the BOM deletes its items first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BomItem {
    pub id: String,

    /// Owning BOM.
    pub bom_id: String,

    /// Component product (weak reference).
    pub product_id: String,

    /// How much of the component one unit of output needs.
    pub quantity: f64,

    /// Unit the quantity is expressed in (weak reference).
    pub uom_id: String,

    /// Display position within the BOM, 1-based.
    pub position: i64,

    /// Optional assembly note.
    pub note: Option<String>,

    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Manufacturing: Production Line
// =============================================================================

/// A line or work cell that executes production orders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductionLine {
    pub id: String,

    /// Business code, unique across lines.
    pub line_code: String,

    pub name: String,

    /// Where the line is installed (weak reference to Location).
    pub location_id: Option<String>,

    /// Nominal output per hour, in the product's unit.
    pub hourly_capacity: f64,

    /// Free-form capability tags ("welding", "packaging").
    /// Persisted as a serialized JSON column.
    pub capabilities: Vec<String>,

    pub status: EntityStatus,
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub created_by: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub updated_by: Option<String>,
}

// =============================================================================
// Manufacturing: Production Order
// =============================================================================

/// An instruction to produce a quantity of a product on a line,
/// following a BOM.
///
/// Orders are created `Pending` and released to `Active`; quantities
/// accumulate via `record_output` until completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductionOrder {
    pub id: String,

    /// Business order number, unique across orders.
    pub order_number: String,

    /// Product to produce (weak reference).
    pub product_id: String,

    /// BOM to follow; must belong to the same product (weak reference).
    pub bom_id: String,

    /// Line that executes the order (weak reference).
    pub line_id: String,

    /// Target quantity.
    pub quantity_planned: f64,

    /// Quantity produced so far.
    pub quantity_produced: f64,

    /// Planned execution window.
    pub planned_start: Option<DateTime<Utc>>,
    pub planned_end: Option<DateTime<Utc>>,

    /// Actual execution window, filled as the order runs.
    pub actual_start: Option<DateTime<Utc>>,
    pub actual_end: Option<DateTime<Utc>>,

    pub status: EntityStatus,
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub created_by: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub updated_by: Option<String>,
}

impl ProductionOrder {
    /// Quantity still to produce. Never negative.
    pub fn remaining_quantity(&self) -> f64 {
        (self.quantity_planned - self.quantity_produced).max(0.0)
    }
}

// =============================================================================
// Maintenance
// =============================================================================

/// A reported problem or planned service on an asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceRequest {
    pub id: String,

    /// Business code, unique across requests.
    pub request_code: String,

    /// Asset the work concerns (weak reference).
    pub asset_id: String,

    pub title: String,

    pub description: Option<String>,

    pub priority: MaintenancePriority,

    /// When the problem was reported.
    pub reported_at: DateTime<Utc>,

    /// When the work is planned.
    pub scheduled_for: Option<DateTime<Utc>>,

    /// When the work finished. Set by `complete_request`.
    pub completed_at: Option<DateTime<Utc>>,

    pub status: EntityStatus,
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub created_by: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub updated_by: Option<String>,
}

impl MaintenanceRequest {
    /// A request is open until it is completed or leaves the
    /// Active/Pending statuses.
    pub fn is_open(&self) -> bool {
        self.completed_at.is_none()
            && matches!(self.status, EntityStatus::Active | EntityStatus::Pending)
    }
}

/// One unit of performed work on a maintenance request.
/// Owned by its request: deleting the request deletes its activities first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceActivity {
    pub id: String,

    /// Owning request.
    pub request_id: String,

    pub description: String,

    /// User who performed the work (weak reference).
    pub performed_by: Option<String>,

    pub performed_at: DateTime<Utc>,

    pub hours_spent: f64,

    pub note: Option<String>,

    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Security: User
// =============================================================================

/// A person who can log in and operate the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,

    /// Login name, unique across users.
    pub username: String,

    /// Name shown in the UI and in audit rows.
    pub display_name: String,

    pub email: Option<String>,

    /// Salted digest of the password. Never serialized outward:
    /// audit snapshots and API payloads must not carry it.
    #[serde(skip_serializing, default)]
    pub password_hash: String,

    /// Last successful login, maintained by the auth service.
    pub last_login_at: Option<DateTime<Utc>>,

    pub status: EntityStatus,
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub created_by: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub updated_by: Option<String>,
}

// =============================================================================
// Security: Role
// =============================================================================

/// A named bundle of permissions, granted to users via the
/// user↔role relation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    pub id: String,

    /// Business code, unique across roles ("role-admin").
    pub role_code: String,

    pub name: String,

    pub description: Option<String>,

    pub status: EntityStatus,
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub created_by: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub updated_by: Option<String>,
}

// =============================================================================
// Security: Session
// =============================================================================

/// A login session. Sessions are rows, not tokens: logout and user
/// deactivation revoke them by id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Session identifier handed to the caller at login (UUID v4).
    pub id: String,

    /// The logged-in user.
    pub user_id: String,

    pub opened_at: DateTime<Utc>,

    pub expires_at: DateTime<Utc>,

    /// Set when the session is closed by logout or revocation.
    pub revoked_at: Option<DateTime<Utc>>,
}

impl Session {
    /// A session is valid until it expires or is revoked.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.revoked_at.is_none() && self.expires_at > now
    }
}

// =============================================================================
// Audit Record
// =============================================================================

/// One audit-trail row: who did what to which entity, with optional
/// serialized before/after snapshots.
///
/// Audit rows are written best-effort after the business transaction
/// commits; they are never part of it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: String,

    /// Acting user id, or [`crate::SYSTEM_ACTOR_ID`] for tooling.
    pub actor_id: String,

    /// Acting user's display name at the time of the action.
    pub actor_name: String,

    /// Session the action ran under, if any.
    pub session_id: Option<String>,

    pub action: crate::status::AuditAction,

    pub severity: crate::status::AuditSeverity,

    /// Business area ("assets", "manufacturing", "security").
    pub module: String,

    /// Finer-grained area within the module, when useful.
    pub sub_module: Option<String>,

    /// Entity type name ("Asset", "User").
    pub entity_type: String,

    pub entity_id: Option<String>,

    /// Human-readable entity label at the time of the action.
    pub entity_name: Option<String>,

    /// Serialized JSON snapshot before the mutation.
    pub before_state: Option<String>,

    /// Serialized JSON snapshot after the mutation.
    pub after_state: Option<String>,

    pub description: Option<String>,

    pub recorded_at: DateTime<Utc>,
}

// =============================================================================
// Lifecycle
// =============================================================================

/// Implemented by every entity whose life is driven by [`EntityStatus`].
///
/// Lets generic code (the existence/activity probes in the service layer)
/// read the status without knowing the concrete entity.
pub trait Lifecycle {
    /// Current lifecycle status.
    fn status(&self) -> EntityStatus;
}

impl Lifecycle for Location {
    fn status(&self) -> EntityStatus {
        self.status
    }
}

impl Lifecycle for UnitOfMeasure {
    fn status(&self) -> EntityStatus {
        self.status
    }
}

impl Lifecycle for Product {
    fn status(&self) -> EntityStatus {
        self.status
    }
}

impl Lifecycle for Asset {
    fn status(&self) -> EntityStatus {
        self.status
    }
}

impl Lifecycle for BillOfMaterial {
    fn status(&self) -> EntityStatus {
        self.status
    }
}

impl Lifecycle for ProductionLine {
    fn status(&self) -> EntityStatus {
        self.status
    }
}

impl Lifecycle for ProductionOrder {
    fn status(&self) -> EntityStatus {
        self.status
    }
}

impl Lifecycle for MaintenanceRequest {
    fn status(&self) -> EntityStatus {
        self.status
    }
}

impl Lifecycle for User {
    fn status(&self) -> EntityStatus {
        self.status
    }
}

impl Lifecycle for Role {
    fn status(&self) -> EntityStatus {
        self.status
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_production_order_remaining_quantity() {
        let now = Utc::now();
        let order = ProductionOrder {
            id: "o-1".into(),
            order_number: "PO-0001".into(),
            product_id: "p-1".into(),
            bom_id: "b-1".into(),
            line_id: "l-1".into(),
            quantity_planned: 100.0,
            quantity_produced: 40.0,
            planned_start: None,
            planned_end: None,
            actual_start: None,
            actual_end: None,
            status: EntityStatus::Active,
            metadata: Metadata::new(),
            created_at: now,
            created_by: None,
            updated_at: now,
            updated_by: None,
        };
        assert_eq!(order.remaining_quantity(), 60.0);

        let over = ProductionOrder {
            quantity_produced: 120.0,
            ..order
        };
        assert_eq!(over.remaining_quantity(), 0.0);
    }

    #[test]
    fn test_session_validity() {
        let now = Utc::now();
        let session = Session {
            id: "s-1".into(),
            user_id: "u-1".into(),
            opened_at: now,
            expires_at: now + Duration::hours(8),
            revoked_at: None,
        };
        assert!(session.is_valid_at(now));
        assert!(!session.is_valid_at(now + Duration::hours(9)));

        let revoked = Session {
            revoked_at: Some(now),
            ..session
        };
        assert!(!revoked.is_valid_at(now));
    }

    #[test]
    fn test_user_serialization_hides_password_hash() {
        let now = Utc::now();
        let user = User {
            id: "u-1".into(),
            username: "jdoe".into(),
            display_name: "J. Doe".into(),
            email: None,
            password_hash: "salt$digest".into(),
            last_login_at: None,
            status: EntityStatus::Active,
            metadata: Metadata::new(),
            created_at: now,
            created_by: None,
            updated_at: now,
            updated_by: None,
        };
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("salt$digest"));
        assert!(!json.contains("password_hash"));
    }

    #[test]
    fn test_maintenance_request_open_state() {
        let now = Utc::now();
        let mut request = MaintenanceRequest {
            id: "m-1".into(),
            request_code: "MR-0001".into(),
            asset_id: "a-1".into(),
            title: "Bearing noise".into(),
            description: None,
            priority: MaintenancePriority::High,
            reported_at: now,
            scheduled_for: None,
            completed_at: None,
            status: EntityStatus::Active,
            metadata: Metadata::new(),
            created_at: now,
            created_by: None,
            updated_at: now,
            updated_by: None,
        };
        assert!(request.is_open());

        request.completed_at = Some(now);
        assert!(!request.is_open());
    }
}
