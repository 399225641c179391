//! # Catalog Services
//!
//! Master data the rest of the system hangs off: locations, units of
//! measure, products. Plain CRUD in the standard envelope; the
//! interesting parts are the reference checks (a product needs an
//! active unit, a location may nest under an active parent) and the
//! in-use guards on physical deletes.
//!
//! ## Reference Graph
//! ```text
//! Location ◄── Location.parent_id
//!    ▲  ▲
//!    │  └────── Asset.location_id          (assets module)
//!    └───────── ProductionLine.location_id (production module)
//!
//! UnitOfMeasure ◄── Product.uom_id ◄── BillOfMaterial.product_id
//!            ▲
//!            └───── BomItem.uom_id
//! ```

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use forge_core::validation::{validate_code, validate_name, validate_text};
use forge_core::{
    AuditAction, AuditSeverity, EntityStatus, Location, Metadata, Product, ServiceError,
    ServiceResult, UnitOfMeasure,
};
use forge_db::{Database, Filter};

use crate::audit::{AuditEvent, AuditLogger};
use crate::authz::{permission, require, Authorizer};
use crate::context::{new_entity_id, Actor};
use crate::events::{DomainEvent, EventBus};
use crate::lookup::{LocationLookup, ProductLookup, UnitOfMeasureLookup};
use crate::transaction::TransactionRunner;

const MODULE: &str = "catalog";

// =============================================================================
// Input DTOs
// =============================================================================

/// Fields a caller supplies to create or update a location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationInput {
    pub location_code: String,
    pub name: String,
    pub parent_id: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

/// Fields a caller supplies to create or update a unit of measure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitOfMeasureInput {
    pub uom_code: String,
    pub name: String,
    pub symbol: String,
    #[serde(default)]
    pub metadata: Metadata,
}

/// Fields a caller supplies to create or update a product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductInput {
    pub product_code: String,
    pub name: String,
    pub description: Option<String>,
    pub uom_id: String,
    #[serde(default)]
    pub metadata: Metadata,
}

// =============================================================================
// Location Service
// =============================================================================

/// CRUD for locations, with parent nesting.
#[derive(Clone)]
pub struct LocationService {
    db: Database,
    tx: TransactionRunner,
    authorizer: Arc<dyn Authorizer>,
    audit: AuditLogger,
    events: EventBus,
    parents: LocationLookup,
}

impl LocationService {
    pub fn new(db: Database, authorizer: Arc<dyn Authorizer>, events: EventBus) -> Self {
        LocationService {
            tx: TransactionRunner::new(db.clone()),
            audit: AuditLogger::new(db.clone()),
            parents: LocationLookup::new(),
            db,
            authorizer,
            events,
        }
    }

    pub async fn create_location(
        &self,
        actor: &Actor,
        input: LocationInput,
    ) -> ServiceResult<Location> {
        require(self.authorizer.as_ref(), actor, permission::CATALOG_CREATE).await?;

        validate_code(&input.location_code, "location_code")?;
        validate_name(&input.name, "name")?;
        if let Some(description) = &input.description {
            validate_text(description, "description")?;
        }

        let repo = self.db.locations();
        let parents = self.parents;
        let created_by = actor.user_id.clone();

        let location = self
            .tx
            .run("create_location", move |conn| {
                Box::pin(async move {
                    let code = input.location_code.trim();
                    if repo
                        .find_one(&mut *conn, &Filter::new().eq("location_code", code))
                        .await?
                        .is_some()
                    {
                        return Err(ServiceError::duplicate("location_code", code));
                    }

                    if let Some(parent_id) = &input.parent_id {
                        parents.ensure_active(&mut *conn, parent_id).await?;
                    }

                    let now = Utc::now();
                    let location = Location {
                        id: new_entity_id(),
                        location_code: code.to_string(),
                        name: input.name.trim().to_string(),
                        parent_id: input.parent_id.clone(),
                        description: input.description.clone(),
                        status: EntityStatus::Active,
                        metadata: input.metadata.clone(),
                        created_at: now,
                        created_by: Some(created_by.clone()),
                        updated_at: now,
                        updated_by: Some(created_by),
                    };
                    repo.insert(&mut *conn, &location).await?;
                    Ok(location)
                })
            })
            .await?;

        self.audit
            .record(
                actor,
                AuditEvent::new(AuditAction::Create, MODULE, "Location")
                    .entity(&location.id, &location.name)
                    .after(&location),
            )
            .await;
        self.events
            .publish(DomainEvent::new("Location", &location.id, AuditAction::Create));

        info!("Created location: {} ({})", location.name, location.id);
        Ok(location)
    }

    pub async fn get_location_by_id(&self, actor: &Actor, id: &str) -> ServiceResult<Location> {
        debug!(user_id = %actor.user_id, id, "Fetching location");
        self.db
            .locations()
            .find_by_id(self.db.pool(), id)
            .await?
            .filter(|location| location.status != EntityStatus::Deleted)
            .ok_or_else(|| ServiceError::not_found("Location", id))
    }

    pub async fn get_location_by_code(&self, actor: &Actor, code: &str) -> ServiceResult<Location> {
        debug!(user_id = %actor.user_id, code, "Fetching location by code");
        self.db
            .locations()
            .find_one(self.db.pool(), &Filter::new().eq("location_code", code))
            .await?
            .filter(|location| location.status != EntityStatus::Deleted)
            .ok_or_else(|| ServiceError::not_found("Location", code))
    }

    /// Lists locations matching the filter, soft-deleted rows excluded.
    pub async fn list_locations(
        &self,
        actor: &Actor,
        filter: &Filter,
    ) -> ServiceResult<Vec<Location>> {
        debug!(user_id = %actor.user_id, conditions = filter.len(), "Listing locations");
        let locations = self.db.locations().find(self.db.pool(), filter).await?;
        Ok(locations
            .into_iter()
            .filter(|location| location.status != EntityStatus::Deleted)
            .collect())
    }

    pub async fn update_location(
        &self,
        actor: &Actor,
        id: &str,
        input: LocationInput,
    ) -> ServiceResult<Location> {
        require(self.authorizer.as_ref(), actor, permission::CATALOG_UPDATE).await?;

        validate_code(&input.location_code, "location_code")?;
        validate_name(&input.name, "name")?;
        if let Some(description) = &input.description {
            validate_text(description, "description")?;
        }

        let repo = self.db.locations();
        let lookup = self.parents;
        let id = id.to_string();
        let updated_by = actor.user_id.clone();

        let (before, after) = self
            .tx
            .run("update_location", move |conn| {
                Box::pin(async move {
                    let before = lookup.ensure_exists(&mut *conn, &id).await?;

                    let code = input.location_code.trim();
                    if let Some(taken) = repo
                        .find_one(&mut *conn, &Filter::new().eq("location_code", code))
                        .await?
                    {
                        if taken.id != before.id {
                            return Err(ServiceError::duplicate("location_code", code));
                        }
                    }

                    if let Some(parent_id) = &input.parent_id {
                        if parent_id == &before.id {
                            return Err(ServiceError::operation_failed(
                                "A location cannot be its own parent",
                            ));
                        }
                        lookup.ensure_active(&mut *conn, parent_id).await?;
                    }

                    let mut location = before.clone();
                    location.location_code = code.to_string();
                    location.name = input.name.trim().to_string();
                    location.parent_id = input.parent_id.clone();
                    location.description = input.description.clone();
                    location.metadata = input.metadata.clone();
                    location.updated_at = Utc::now();
                    location.updated_by = Some(updated_by);
                    repo.update(&mut *conn, &location).await?;

                    Ok((before, location))
                })
            })
            .await?;

        self.audit
            .record(
                actor,
                AuditEvent::new(AuditAction::Update, MODULE, "Location")
                    .entity(&after.id, &after.name)
                    .before(&before)
                    .after(&after),
            )
            .await;
        self.events
            .publish(DomainEvent::new("Location", &after.id, AuditAction::Update));

        info!("Updated location: {} ({})", after.name, after.id);
        Ok(after)
    }

    pub async fn update_location_status(
        &self,
        actor: &Actor,
        id: &str,
        next: EntityStatus,
    ) -> ServiceResult<Location> {
        require(self.authorizer.as_ref(), actor, permission::CATALOG_UPDATE).await?;

        let repo = self.db.locations();
        let lookup = self.parents;
        let id = id.to_string();
        let updated_by = actor.user_id.clone();

        let (before, after) = self
            .tx
            .run("update_location_status", move |conn| {
                Box::pin(async move {
                    let before = lookup.ensure_exists(&mut *conn, &id).await?;
                    if !before.status.can_transition_to(next) {
                        return Err(ServiceError::operation_failed(format!(
                            "Cannot change status from {} to {}",
                            before.status.label(),
                            next.label()
                        )));
                    }

                    let mut location = before.clone();
                    location.status = next;
                    location.updated_at = Utc::now();
                    location.updated_by = Some(updated_by);
                    repo.update(&mut *conn, &location).await?;
                    Ok((before, location))
                })
            })
            .await?;

        self.audit
            .record(
                actor,
                AuditEvent::new(AuditAction::StatusChange, MODULE, "Location")
                    .severity(status_change_severity(next))
                    .entity(&after.id, &after.name)
                    .description(format!(
                        "{} -> {}",
                        before.status.label(),
                        after.status.label()
                    )),
            )
            .await;
        self.events.publish(DomainEvent::new(
            "Location",
            &after.id,
            AuditAction::StatusChange,
        ));

        Ok(after)
    }

    /// Physically removes a location. Refused while anything still
    /// points at it: sublocations, assets, or production lines.
    pub async fn delete_location(&self, actor: &Actor, id: &str) -> ServiceResult<()> {
        require(self.authorizer.as_ref(), actor, permission::CATALOG_DELETE).await?;

        let repo = self.db.locations();
        let assets = self.db.assets();
        let lines = self.db.production_lines();
        let id = id.to_string();

        let deleted = self
            .tx
            .run("delete_location", move |conn| {
                Box::pin(async move {
                    let location = repo
                        .find_by_id(&mut *conn, &id)
                        .await?
                        .ok_or_else(|| ServiceError::not_found("Location", &id))?;

                    let children = repo
                        .count(&mut *conn, &Filter::new().eq("parent_id", id.as_str()))
                        .await?;
                    if children > 0 {
                        return Err(ServiceError::operation_failed(
                            "Location still has sublocations",
                        ));
                    }

                    let asset_count = assets
                        .count(&mut *conn, &Filter::new().eq("location_id", id.as_str()))
                        .await?;
                    if asset_count > 0 {
                        return Err(ServiceError::operation_failed("Location still has assets"));
                    }

                    let line_count = lines
                        .count(&mut *conn, &Filter::new().eq("location_id", id.as_str()))
                        .await?;
                    if line_count > 0 {
                        return Err(ServiceError::operation_failed(
                            "Location still has production lines",
                        ));
                    }

                    repo.delete(&mut *conn, &location.id).await?;
                    Ok(location)
                })
            })
            .await?;

        self.audit
            .record(
                actor,
                AuditEvent::new(AuditAction::Delete, MODULE, "Location")
                    .severity(AuditSeverity::Critical)
                    .entity(&deleted.id, &deleted.name)
                    .before(&deleted),
            )
            .await;
        self.events
            .publish(DomainEvent::new("Location", &deleted.id, AuditAction::Delete));

        info!("Deleted location: {} ({})", deleted.name, deleted.id);
        Ok(())
    }
}

// =============================================================================
// Unit of Measure Service
// =============================================================================

/// CRUD for units of measure.
#[derive(Clone)]
pub struct UnitOfMeasureService {
    db: Database,
    tx: TransactionRunner,
    authorizer: Arc<dyn Authorizer>,
    audit: AuditLogger,
    events: EventBus,
    units: UnitOfMeasureLookup,
}

impl UnitOfMeasureService {
    pub fn new(db: Database, authorizer: Arc<dyn Authorizer>, events: EventBus) -> Self {
        UnitOfMeasureService {
            tx: TransactionRunner::new(db.clone()),
            audit: AuditLogger::new(db.clone()),
            units: UnitOfMeasureLookup::new(),
            db,
            authorizer,
            events,
        }
    }

    pub async fn create_unit_of_measure(
        &self,
        actor: &Actor,
        input: UnitOfMeasureInput,
    ) -> ServiceResult<UnitOfMeasure> {
        require(self.authorizer.as_ref(), actor, permission::CATALOG_CREATE).await?;

        validate_code(&input.uom_code, "uom_code")?;
        validate_name(&input.name, "name")?;
        validate_code(&input.symbol, "symbol")?;

        let repo = self.db.units_of_measure();
        let created_by = actor.user_id.clone();

        let unit = self
            .tx
            .run("create_unit_of_measure", move |conn| {
                Box::pin(async move {
                    let code = input.uom_code.trim();
                    if repo
                        .find_one(&mut *conn, &Filter::new().eq("uom_code", code))
                        .await?
                        .is_some()
                    {
                        return Err(ServiceError::duplicate("uom_code", code));
                    }

                    let now = Utc::now();
                    let unit = UnitOfMeasure {
                        id: new_entity_id(),
                        uom_code: code.to_string(),
                        name: input.name.trim().to_string(),
                        symbol: input.symbol.trim().to_string(),
                        status: EntityStatus::Active,
                        metadata: input.metadata.clone(),
                        created_at: now,
                        created_by: Some(created_by.clone()),
                        updated_at: now,
                        updated_by: Some(created_by),
                    };
                    repo.insert(&mut *conn, &unit).await?;
                    Ok(unit)
                })
            })
            .await?;

        self.audit
            .record(
                actor,
                AuditEvent::new(AuditAction::Create, MODULE, "UnitOfMeasure")
                    .entity(&unit.id, &unit.name)
                    .after(&unit),
            )
            .await;
        self.events.publish(DomainEvent::new(
            "UnitOfMeasure",
            &unit.id,
            AuditAction::Create,
        ));

        info!("Created unit of measure: {} ({})", unit.name, unit.id);
        Ok(unit)
    }

    pub async fn get_unit_of_measure_by_id(
        &self,
        actor: &Actor,
        id: &str,
    ) -> ServiceResult<UnitOfMeasure> {
        debug!(user_id = %actor.user_id, id, "Fetching unit of measure");
        self.db
            .units_of_measure()
            .find_by_id(self.db.pool(), id)
            .await?
            .filter(|unit| unit.status != EntityStatus::Deleted)
            .ok_or_else(|| ServiceError::not_found("Unit of measure", id))
    }

    pub async fn get_unit_of_measure_by_code(
        &self,
        actor: &Actor,
        code: &str,
    ) -> ServiceResult<UnitOfMeasure> {
        debug!(user_id = %actor.user_id, code, "Fetching unit of measure by code");
        self.db
            .units_of_measure()
            .find_one(self.db.pool(), &Filter::new().eq("uom_code", code))
            .await?
            .filter(|unit| unit.status != EntityStatus::Deleted)
            .ok_or_else(|| ServiceError::not_found("Unit of measure", code))
    }

    pub async fn list_units_of_measure(
        &self,
        actor: &Actor,
        filter: &Filter,
    ) -> ServiceResult<Vec<UnitOfMeasure>> {
        debug!(user_id = %actor.user_id, conditions = filter.len(), "Listing units of measure");
        let units = self.db.units_of_measure().find(self.db.pool(), filter).await?;
        Ok(units
            .into_iter()
            .filter(|unit| unit.status != EntityStatus::Deleted)
            .collect())
    }

    pub async fn update_unit_of_measure(
        &self,
        actor: &Actor,
        id: &str,
        input: UnitOfMeasureInput,
    ) -> ServiceResult<UnitOfMeasure> {
        require(self.authorizer.as_ref(), actor, permission::CATALOG_UPDATE).await?;

        validate_code(&input.uom_code, "uom_code")?;
        validate_name(&input.name, "name")?;
        validate_code(&input.symbol, "symbol")?;

        let repo = self.db.units_of_measure();
        let lookup = self.units;
        let id = id.to_string();
        let updated_by = actor.user_id.clone();

        let (before, after) = self
            .tx
            .run("update_unit_of_measure", move |conn| {
                Box::pin(async move {
                    let before = lookup.ensure_exists(&mut *conn, &id).await?;

                    let code = input.uom_code.trim();
                    if let Some(taken) = repo
                        .find_one(&mut *conn, &Filter::new().eq("uom_code", code))
                        .await?
                    {
                        if taken.id != before.id {
                            return Err(ServiceError::duplicate("uom_code", code));
                        }
                    }

                    let mut unit = before.clone();
                    unit.uom_code = code.to_string();
                    unit.name = input.name.trim().to_string();
                    unit.symbol = input.symbol.trim().to_string();
                    unit.metadata = input.metadata.clone();
                    unit.updated_at = Utc::now();
                    unit.updated_by = Some(updated_by);
                    repo.update(&mut *conn, &unit).await?;

                    Ok((before, unit))
                })
            })
            .await?;

        self.audit
            .record(
                actor,
                AuditEvent::new(AuditAction::Update, MODULE, "UnitOfMeasure")
                    .entity(&after.id, &after.name)
                    .before(&before)
                    .after(&after),
            )
            .await;
        self.events.publish(DomainEvent::new(
            "UnitOfMeasure",
            &after.id,
            AuditAction::Update,
        ));

        Ok(after)
    }

    pub async fn update_unit_of_measure_status(
        &self,
        actor: &Actor,
        id: &str,
        next: EntityStatus,
    ) -> ServiceResult<UnitOfMeasure> {
        require(self.authorizer.as_ref(), actor, permission::CATALOG_UPDATE).await?;

        let repo = self.db.units_of_measure();
        let lookup = self.units;
        let id = id.to_string();
        let updated_by = actor.user_id.clone();

        let (before, after) = self
            .tx
            .run("update_unit_of_measure_status", move |conn| {
                Box::pin(async move {
                    let before = lookup.ensure_exists(&mut *conn, &id).await?;
                    if !before.status.can_transition_to(next) {
                        return Err(ServiceError::operation_failed(format!(
                            "Cannot change status from {} to {}",
                            before.status.label(),
                            next.label()
                        )));
                    }

                    let mut unit = before.clone();
                    unit.status = next;
                    unit.updated_at = Utc::now();
                    unit.updated_by = Some(updated_by);
                    repo.update(&mut *conn, &unit).await?;
                    Ok((before, unit))
                })
            })
            .await?;

        self.audit
            .record(
                actor,
                AuditEvent::new(AuditAction::StatusChange, MODULE, "UnitOfMeasure")
                    .severity(status_change_severity(next))
                    .entity(&after.id, &after.name)
                    .description(format!(
                        "{} -> {}",
                        before.status.label(),
                        after.status.label()
                    )),
            )
            .await;
        self.events.publish(DomainEvent::new(
            "UnitOfMeasure",
            &after.id,
            AuditAction::StatusChange,
        ));

        Ok(after)
    }

    /// Physically removes a unit. Refused while products or BOM items
    /// still measure in it.
    pub async fn delete_unit_of_measure(&self, actor: &Actor, id: &str) -> ServiceResult<()> {
        require(self.authorizer.as_ref(), actor, permission::CATALOG_DELETE).await?;

        let repo = self.db.units_of_measure();
        let products = self.db.products();
        let bom_items = self.db.bom_items();
        let id = id.to_string();

        let deleted = self
            .tx
            .run("delete_unit_of_measure", move |conn| {
                Box::pin(async move {
                    let unit = repo
                        .find_by_id(&mut *conn, &id)
                        .await?
                        .ok_or_else(|| ServiceError::not_found("Unit of measure", &id))?;

                    let product_count = products
                        .count(&mut *conn, &Filter::new().eq("uom_id", id.as_str()))
                        .await?;
                    if product_count > 0 {
                        return Err(ServiceError::operation_failed(
                            "Unit of measure is still used by products",
                        ));
                    }

                    let item_count = bom_items
                        .count(&mut *conn, &Filter::new().eq("uom_id", id.as_str()))
                        .await?;
                    if item_count > 0 {
                        return Err(ServiceError::operation_failed(
                            "Unit of measure is still used by bill of material items",
                        ));
                    }

                    repo.delete(&mut *conn, &unit.id).await?;
                    Ok(unit)
                })
            })
            .await?;

        self.audit
            .record(
                actor,
                AuditEvent::new(AuditAction::Delete, MODULE, "UnitOfMeasure")
                    .severity(AuditSeverity::Critical)
                    .entity(&deleted.id, &deleted.name)
                    .before(&deleted),
            )
            .await;
        self.events.publish(DomainEvent::new(
            "UnitOfMeasure",
            &deleted.id,
            AuditAction::Delete,
        ));

        info!("Deleted unit of measure: {} ({})", deleted.name, deleted.id);
        Ok(())
    }
}

// =============================================================================
// Product Service
// =============================================================================

/// CRUD for products. Every product measures in an active unit.
#[derive(Clone)]
pub struct ProductService {
    db: Database,
    tx: TransactionRunner,
    authorizer: Arc<dyn Authorizer>,
    audit: AuditLogger,
    events: EventBus,
    products: ProductLookup,
    units: UnitOfMeasureLookup,
}

impl ProductService {
    pub fn new(db: Database, authorizer: Arc<dyn Authorizer>, events: EventBus) -> Self {
        ProductService {
            tx: TransactionRunner::new(db.clone()),
            audit: AuditLogger::new(db.clone()),
            products: ProductLookup::new(),
            units: UnitOfMeasureLookup::new(),
            db,
            authorizer,
            events,
        }
    }

    pub async fn create_product(
        &self,
        actor: &Actor,
        input: ProductInput,
    ) -> ServiceResult<Product> {
        require(self.authorizer.as_ref(), actor, permission::CATALOG_CREATE).await?;

        validate_code(&input.product_code, "product_code")?;
        validate_name(&input.name, "name")?;
        if let Some(description) = &input.description {
            validate_text(description, "description")?;
        }

        let repo = self.db.products();
        let units = self.units;
        let created_by = actor.user_id.clone();

        let product = self
            .tx
            .run("create_product", move |conn| {
                Box::pin(async move {
                    let code = input.product_code.trim();
                    if repo
                        .find_one(&mut *conn, &Filter::new().eq("product_code", code))
                        .await?
                        .is_some()
                    {
                        return Err(ServiceError::duplicate("product_code", code));
                    }

                    units.ensure_active(&mut *conn, &input.uom_id).await?;

                    let now = Utc::now();
                    let product = Product {
                        id: new_entity_id(),
                        product_code: code.to_string(),
                        name: input.name.trim().to_string(),
                        description: input.description.clone(),
                        uom_id: input.uom_id.clone(),
                        status: EntityStatus::Active,
                        metadata: input.metadata.clone(),
                        created_at: now,
                        created_by: Some(created_by.clone()),
                        updated_at: now,
                        updated_by: Some(created_by),
                    };
                    repo.insert(&mut *conn, &product).await?;
                    Ok(product)
                })
            })
            .await?;

        self.audit
            .record(
                actor,
                AuditEvent::new(AuditAction::Create, MODULE, "Product")
                    .entity(&product.id, &product.name)
                    .after(&product),
            )
            .await;
        self.events
            .publish(DomainEvent::new("Product", &product.id, AuditAction::Create));

        info!("Created product: {} ({})", product.name, product.id);
        Ok(product)
    }

    pub async fn get_product_by_id(&self, actor: &Actor, id: &str) -> ServiceResult<Product> {
        debug!(user_id = %actor.user_id, id, "Fetching product");
        self.db
            .products()
            .find_by_id(self.db.pool(), id)
            .await?
            .filter(|product| product.status != EntityStatus::Deleted)
            .ok_or_else(|| ServiceError::not_found("Product", id))
    }

    pub async fn get_product_by_code(&self, actor: &Actor, code: &str) -> ServiceResult<Product> {
        debug!(user_id = %actor.user_id, code, "Fetching product by code");
        self.db
            .products()
            .find_one(self.db.pool(), &Filter::new().eq("product_code", code))
            .await?
            .filter(|product| product.status != EntityStatus::Deleted)
            .ok_or_else(|| ServiceError::not_found("Product", code))
    }

    pub async fn list_products(
        &self,
        actor: &Actor,
        filter: &Filter,
    ) -> ServiceResult<Vec<Product>> {
        debug!(user_id = %actor.user_id, conditions = filter.len(), "Listing products");
        let products = self.db.products().find(self.db.pool(), filter).await?;
        Ok(products
            .into_iter()
            .filter(|product| product.status != EntityStatus::Deleted)
            .collect())
    }

    pub async fn update_product(
        &self,
        actor: &Actor,
        id: &str,
        input: ProductInput,
    ) -> ServiceResult<Product> {
        require(self.authorizer.as_ref(), actor, permission::CATALOG_UPDATE).await?;

        validate_code(&input.product_code, "product_code")?;
        validate_name(&input.name, "name")?;
        if let Some(description) = &input.description {
            validate_text(description, "description")?;
        }

        let repo = self.db.products();
        let lookup = self.products;
        let units = self.units;
        let id = id.to_string();
        let updated_by = actor.user_id.clone();

        let (before, after) = self
            .tx
            .run("update_product", move |conn| {
                Box::pin(async move {
                    let before = lookup.ensure_exists(&mut *conn, &id).await?;

                    let code = input.product_code.trim();
                    if let Some(taken) = repo
                        .find_one(&mut *conn, &Filter::new().eq("product_code", code))
                        .await?
                    {
                        if taken.id != before.id {
                            return Err(ServiceError::duplicate("product_code", code));
                        }
                    }

                    units.ensure_active(&mut *conn, &input.uom_id).await?;

                    let mut product = before.clone();
                    product.product_code = code.to_string();
                    product.name = input.name.trim().to_string();
                    product.description = input.description.clone();
                    product.uom_id = input.uom_id.clone();
                    product.metadata = input.metadata.clone();
                    product.updated_at = Utc::now();
                    product.updated_by = Some(updated_by);
                    repo.update(&mut *conn, &product).await?;

                    Ok((before, product))
                })
            })
            .await?;

        self.audit
            .record(
                actor,
                AuditEvent::new(AuditAction::Update, MODULE, "Product")
                    .entity(&after.id, &after.name)
                    .before(&before)
                    .after(&after),
            )
            .await;
        self.events
            .publish(DomainEvent::new("Product", &after.id, AuditAction::Update));

        info!("Updated product: {} ({})", after.name, after.id);
        Ok(after)
    }

    pub async fn update_product_status(
        &self,
        actor: &Actor,
        id: &str,
        next: EntityStatus,
    ) -> ServiceResult<Product> {
        require(self.authorizer.as_ref(), actor, permission::CATALOG_UPDATE).await?;

        let repo = self.db.products();
        let lookup = self.products;
        let id = id.to_string();
        let updated_by = actor.user_id.clone();

        let (before, after) = self
            .tx
            .run("update_product_status", move |conn| {
                Box::pin(async move {
                    let before = lookup.ensure_exists(&mut *conn, &id).await?;
                    if !before.status.can_transition_to(next) {
                        return Err(ServiceError::operation_failed(format!(
                            "Cannot change status from {} to {}",
                            before.status.label(),
                            next.label()
                        )));
                    }

                    let mut product = before.clone();
                    product.status = next;
                    product.updated_at = Utc::now();
                    product.updated_by = Some(updated_by);
                    repo.update(&mut *conn, &product).await?;
                    Ok((before, product))
                })
            })
            .await?;

        self.audit
            .record(
                actor,
                AuditEvent::new(AuditAction::StatusChange, MODULE, "Product")
                    .severity(status_change_severity(next))
                    .entity(&after.id, &after.name)
                    .description(format!(
                        "{} -> {}",
                        before.status.label(),
                        after.status.label()
                    )),
            )
            .await;
        self.events.publish(DomainEvent::new(
            "Product",
            &after.id,
            AuditAction::StatusChange,
        ));

        Ok(after)
    }

    /// Physically removes a product. Refused while bills of material,
    /// BOM items, or production orders still reference it.
    pub async fn delete_product(&self, actor: &Actor, id: &str) -> ServiceResult<()> {
        require(self.authorizer.as_ref(), actor, permission::CATALOG_DELETE).await?;

        let repo = self.db.products();
        let boms = self.db.bills_of_material();
        let bom_items = self.db.bom_items();
        let orders = self.db.production_orders();
        let id = id.to_string();

        let deleted = self
            .tx
            .run("delete_product", move |conn| {
                Box::pin(async move {
                    let product = repo
                        .find_by_id(&mut *conn, &id)
                        .await?
                        .ok_or_else(|| ServiceError::not_found("Product", &id))?;

                    let bom_count = boms
                        .count(&mut *conn, &Filter::new().eq("product_id", id.as_str()))
                        .await?;
                    let item_count = bom_items
                        .count(&mut *conn, &Filter::new().eq("product_id", id.as_str()))
                        .await?;
                    if bom_count > 0 || item_count > 0 {
                        return Err(ServiceError::operation_failed(
                            "Product is still referenced by bills of material",
                        ));
                    }

                    let order_count = orders
                        .count(&mut *conn, &Filter::new().eq("product_id", id.as_str()))
                        .await?;
                    if order_count > 0 {
                        return Err(ServiceError::operation_failed(
                            "Product is still referenced by production orders",
                        ));
                    }

                    repo.delete(&mut *conn, &product.id).await?;
                    Ok(product)
                })
            })
            .await?;

        self.audit
            .record(
                actor,
                AuditEvent::new(AuditAction::Delete, MODULE, "Product")
                    .severity(AuditSeverity::Critical)
                    .entity(&deleted.id, &deleted.name)
                    .before(&deleted),
            )
            .await;
        self.events
            .publish(DomainEvent::new("Product", &deleted.id, AuditAction::Delete));

        info!("Deleted product: {} ({})", deleted.name, deleted.id);
        Ok(())
    }
}

/// Soft deletion through the status op is notable; other transitions
/// are routine.
pub(crate) fn status_change_severity(next: EntityStatus) -> AuditSeverity {
    if next == EntityStatus::Deleted {
        AuditSeverity::Warning
    } else {
        AuditSeverity::Info
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::test_services;
    use forge_core::ErrorCode;

    fn location_input(code: &str) -> LocationInput {
        LocationInput {
            location_code: code.to_string(),
            name: format!("Location {}", code),
            parent_id: None,
            description: None,
            metadata: Metadata::new(),
        }
    }

    fn uom_input(code: &str) -> UnitOfMeasureInput {
        UnitOfMeasureInput {
            uom_code: code.to_string(),
            name: format!("Unit {}", code),
            symbol: code.to_string(),
            metadata: Metadata::new(),
        }
    }

    fn product_input(code: &str, uom_id: &str) -> ProductInput {
        ProductInput {
            product_code: code.to_string(),
            name: format!("Product {}", code),
            description: None,
            uom_id: uom_id.to_string(),
            metadata: Metadata::new(),
        }
    }

    #[tokio::test]
    async fn test_create_location_defaults_and_lookup() {
        let services = test_services().await;
        let actor = Actor::system();

        let location = services
            .locations
            .create_location(&actor, location_input("hall-a"))
            .await
            .unwrap();
        assert_eq!(location.status, EntityStatus::Active);
        assert_eq!(location.created_by.as_deref(), Some(actor.user_id.as_str()));

        let fetched = services
            .locations
            .get_location_by_code(&actor, "hall-a")
            .await
            .unwrap();
        assert_eq!(fetched.id, location.id);
    }

    #[tokio::test]
    async fn test_duplicate_location_code_rejected() {
        let services = test_services().await;
        let actor = Actor::system();

        services
            .locations
            .create_location(&actor, location_input("hall-a"))
            .await
            .unwrap();
        let err = services
            .locations
            .create_location(&actor, location_input("hall-a"))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::DuplicateEntry);

        // The rejected create must leave the table untouched.
        let all = services
            .locations
            .list_locations(&actor, &Filter::new())
            .await
            .unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn test_location_parent_must_be_active() {
        let services = test_services().await;
        let actor = Actor::system();

        let parent = services
            .locations
            .create_location(&actor, location_input("site"))
            .await
            .unwrap();
        services
            .locations
            .update_location_status(&actor, &parent.id, EntityStatus::Inactive)
            .await
            .unwrap();

        let mut child = location_input("hall-b");
        child.parent_id = Some(parent.id.clone());
        let err = services
            .locations
            .create_location(&actor, child)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::OperationFailed);
    }

    #[tokio::test]
    async fn test_location_cannot_parent_itself() {
        let services = test_services().await;
        let actor = Actor::system();

        let location = services
            .locations
            .create_location(&actor, location_input("loop"))
            .await
            .unwrap();

        let mut input = location_input("loop");
        input.parent_id = Some(location.id.clone());
        let err = services
            .locations
            .update_location(&actor, &location.id, input)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::OperationFailed);
    }

    #[tokio::test]
    async fn test_product_requires_active_unit() {
        let services = test_services().await;
        let actor = Actor::system();

        let err = services
            .products
            .create_product(&actor, product_input("widget", "no-such-uom"))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);

        let unit = services
            .units_of_measure
            .create_unit_of_measure(&actor, uom_input("pc"))
            .await
            .unwrap();
        services
            .products
            .create_product(&actor, product_input("widget", &unit.id))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_unit_delete_guarded_by_products() {
        let services = test_services().await;
        let actor = Actor::system();

        let unit = services
            .units_of_measure
            .create_unit_of_measure(&actor, uom_input("kg"))
            .await
            .unwrap();
        services
            .products
            .create_product(&actor, product_input("flour", &unit.id))
            .await
            .unwrap();

        let err = services
            .units_of_measure
            .delete_unit_of_measure(&actor, &unit.id)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::OperationFailed);

        // Still there.
        services
            .units_of_measure
            .get_unit_of_measure_by_id(&actor, &unit.id)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_update_excludes_self_from_uniqueness() {
        let services = test_services().await;
        let actor = Actor::system();

        let unit = services
            .units_of_measure
            .create_unit_of_measure(&actor, uom_input("pc"))
            .await
            .unwrap();
        let product = services
            .products
            .create_product(&actor, product_input("widget", &unit.id))
            .await
            .unwrap();

        // Re-submitting the same code for the same product is fine.
        let mut input = product_input("widget", &unit.id);
        input.name = "Widget, renamed".to_string();
        let updated = services
            .products
            .update_product(&actor, &product.id, input)
            .await
            .unwrap();
        assert_eq!(updated.name, "Widget, renamed");

        // Taking another product's code is not.
        services
            .products
            .create_product(&actor, product_input("gadget", &unit.id))
            .await
            .unwrap();
        let err = services
            .products
            .update_product(&actor, &product.id, product_input("gadget", &unit.id))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::DuplicateEntry);
    }

    #[tokio::test]
    async fn test_illegal_status_transition_rejected() {
        let services = test_services().await;
        let actor = Actor::system();

        let location = services
            .locations
            .create_location(&actor, location_input("hall-c"))
            .await
            .unwrap();

        // Active -> Pending is not in the transition table.
        let err = services
            .locations
            .update_location_status(&actor, &location.id, EntityStatus::Pending)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::OperationFailed);

        // Deleted is terminal.
        services
            .locations
            .update_location_status(&actor, &location.id, EntityStatus::Deleted)
            .await
            .unwrap();
        let err = services
            .locations
            .update_location_status(&actor, &location.id, EntityStatus::Active)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn test_soft_deleted_location_absent_from_reads() {
        let services = test_services().await;
        let actor = Actor::system();

        let location = services
            .locations
            .create_location(&actor, location_input("gone"))
            .await
            .unwrap();
        services
            .locations
            .update_location_status(&actor, &location.id, EntityStatus::Deleted)
            .await
            .unwrap();

        let err = services
            .locations
            .get_location_by_id(&actor, &location.id)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);

        let listed = services
            .locations
            .list_locations(&actor, &Filter::new())
            .await
            .unwrap();
        assert!(listed.is_empty());
    }
}
