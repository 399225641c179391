//! # Production Services
//!
//! Production lines and the orders that run on them.
//!
//! ## Order Lifecycle
//! ```text
//! create ──► Pending ──release──► Active ──record_output──► (accumulates)
//!               │                   │
//!               │                   └──► Inactive (closed) / Deleted
//!               └──► Deleted (or physical delete, Pending only)
//! ```
//!
//! An order is planned against a product, a bill of material for that
//! same product, and a line. The header stays editable only while the
//! order is `Pending`; once released, only output recording and status
//! changes touch it.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use forge_core::validation::{validate_code, validate_name, validate_non_negative, validate_quantity};
use forge_core::{
    AuditAction, AuditSeverity, EntityStatus, Metadata, ProductionLine, ProductionOrder,
    ServiceError, ServiceResult,
};
use forge_db::{Database, Filter};

use crate::audit::{AuditEvent, AuditLogger};
use crate::authz::{permission, require, Authorizer};
use crate::catalog::status_change_severity;
use crate::context::{new_entity_id, Actor};
use crate::events::{DomainEvent, EventBus};
use crate::lookup::{
    BillOfMaterialLookup, LocationLookup, ProductLookup, ProductionLineLookup,
};
use crate::transaction::TransactionRunner;

const MODULE: &str = "manufacturing";

// =============================================================================
// Input DTOs
// =============================================================================

/// Fields a caller supplies to create or update a production line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductionLineInput {
    pub line_code: String,
    pub name: String,
    pub location_id: Option<String>,
    pub hourly_capacity: f64,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

/// Fields a caller supplies to create or update a production order
/// header. Quantities produced and the actual window are managed by
/// the service, not the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductionOrderInput {
    pub order_number: String,
    pub product_id: String,
    pub bom_id: String,
    pub line_id: String,
    pub quantity_planned: f64,
    pub planned_start: Option<chrono::DateTime<Utc>>,
    pub planned_end: Option<chrono::DateTime<Utc>>,
    #[serde(default)]
    pub metadata: Metadata,
}

/// Checks the tags and the planning window shared by create and update.
fn validate_line_input(input: &ProductionLineInput) -> ServiceResult<Vec<String>> {
    validate_code(&input.line_code, "line_code")?;
    validate_name(&input.name, "name")?;
    validate_non_negative(input.hourly_capacity, "hourly_capacity")?;

    let mut capabilities = Vec::with_capacity(input.capabilities.len());
    for tag in &input.capabilities {
        let tag = tag.trim();
        if tag.is_empty() {
            return Err(ServiceError::invalid_input("Capability tags must not be empty"));
        }
        capabilities.push(tag.to_string());
    }
    Ok(capabilities)
}

fn validate_order_input(input: &ProductionOrderInput) -> ServiceResult<()> {
    validate_code(&input.order_number, "order_number")?;
    validate_quantity(input.quantity_planned, "quantity_planned")?;
    if let (Some(start), Some(end)) = (input.planned_start, input.planned_end) {
        if start > end {
            return Err(ServiceError::invalid_input(
                "Planned start must not be after planned end",
            ));
        }
    }
    Ok(())
}

// =============================================================================
// Production Line Service
// =============================================================================

/// CRUD for production lines.
#[derive(Clone)]
pub struct ProductionLineService {
    db: Database,
    tx: TransactionRunner,
    authorizer: Arc<dyn Authorizer>,
    audit: AuditLogger,
    events: EventBus,
    lines: ProductionLineLookup,
    locations: LocationLookup,
}

impl ProductionLineService {
    pub fn new(db: Database, authorizer: Arc<dyn Authorizer>, events: EventBus) -> Self {
        ProductionLineService {
            tx: TransactionRunner::new(db.clone()),
            audit: AuditLogger::new(db.clone()),
            lines: ProductionLineLookup::new(),
            locations: LocationLookup::new(),
            db,
            authorizer,
            events,
        }
    }

    pub async fn create_production_line(
        &self,
        actor: &Actor,
        input: ProductionLineInput,
    ) -> ServiceResult<ProductionLine> {
        require(
            self.authorizer.as_ref(),
            actor,
            permission::MANUFACTURING_CREATE,
        )
        .await?;

        let capabilities = validate_line_input(&input)?;

        let repo = self.db.production_lines();
        let locations = self.locations;
        let created_by = actor.user_id.clone();

        let line = self
            .tx
            .run("create_production_line", move |conn| {
                Box::pin(async move {
                    let code = input.line_code.trim();
                    if repo
                        .find_one(&mut *conn, &Filter::new().eq("line_code", code))
                        .await?
                        .is_some()
                    {
                        return Err(ServiceError::duplicate("line_code", code));
                    }

                    if let Some(location_id) = &input.location_id {
                        locations.ensure_active(&mut *conn, location_id).await?;
                    }

                    let now = Utc::now();
                    let line = ProductionLine {
                        id: new_entity_id(),
                        line_code: code.to_string(),
                        name: input.name.trim().to_string(),
                        location_id: input.location_id.clone(),
                        hourly_capacity: input.hourly_capacity,
                        capabilities,
                        status: EntityStatus::Active,
                        metadata: input.metadata.clone(),
                        created_at: now,
                        created_by: Some(created_by.clone()),
                        updated_at: now,
                        updated_by: Some(created_by),
                    };
                    repo.insert(&mut *conn, &line).await?;
                    Ok(line)
                })
            })
            .await?;

        self.audit
            .record(
                actor,
                AuditEvent::new(AuditAction::Create, MODULE, "ProductionLine")
                    .entity(&line.id, &line.name)
                    .after(&line),
            )
            .await;
        self.events.publish(DomainEvent::new(
            "ProductionLine",
            &line.id,
            AuditAction::Create,
        ));

        info!("Created production line: {} ({})", line.name, line.id);
        Ok(line)
    }

    pub async fn get_production_line_by_id(
        &self,
        actor: &Actor,
        id: &str,
    ) -> ServiceResult<ProductionLine> {
        debug!(user_id = %actor.user_id, id, "Fetching production line");
        self.db
            .production_lines()
            .find_by_id(self.db.pool(), id)
            .await?
            .filter(|line| line.status != EntityStatus::Deleted)
            .ok_or_else(|| ServiceError::not_found("Production line", id))
    }

    pub async fn get_production_line_by_code(
        &self,
        actor: &Actor,
        code: &str,
    ) -> ServiceResult<ProductionLine> {
        debug!(user_id = %actor.user_id, code, "Fetching production line by code");
        self.db
            .production_lines()
            .find_one(self.db.pool(), &Filter::new().eq("line_code", code))
            .await?
            .filter(|line| line.status != EntityStatus::Deleted)
            .ok_or_else(|| ServiceError::not_found("Production line", code))
    }

    pub async fn list_production_lines(
        &self,
        actor: &Actor,
        filter: &Filter,
    ) -> ServiceResult<Vec<ProductionLine>> {
        debug!(user_id = %actor.user_id, conditions = filter.len(), "Listing production lines");
        let lines = self
            .db
            .production_lines()
            .find(self.db.pool(), filter)
            .await?;
        Ok(lines
            .into_iter()
            .filter(|line| line.status != EntityStatus::Deleted)
            .collect())
    }

    pub async fn update_production_line(
        &self,
        actor: &Actor,
        id: &str,
        input: ProductionLineInput,
    ) -> ServiceResult<ProductionLine> {
        require(
            self.authorizer.as_ref(),
            actor,
            permission::MANUFACTURING_UPDATE,
        )
        .await?;

        let capabilities = validate_line_input(&input)?;

        let repo = self.db.production_lines();
        let lookup = self.lines;
        let locations = self.locations;
        let id = id.to_string();
        let updated_by = actor.user_id.clone();

        let (before, after) = self
            .tx
            .run("update_production_line", move |conn| {
                Box::pin(async move {
                    let before = lookup.ensure_exists(&mut *conn, &id).await?;

                    let code = input.line_code.trim();
                    if let Some(taken) = repo
                        .find_one(&mut *conn, &Filter::new().eq("line_code", code))
                        .await?
                    {
                        if taken.id != before.id {
                            return Err(ServiceError::duplicate("line_code", code));
                        }
                    }

                    if let Some(location_id) = &input.location_id {
                        locations.ensure_active(&mut *conn, location_id).await?;
                    }

                    let mut line = before.clone();
                    line.line_code = code.to_string();
                    line.name = input.name.trim().to_string();
                    line.location_id = input.location_id.clone();
                    line.hourly_capacity = input.hourly_capacity;
                    line.capabilities = capabilities;
                    line.metadata = input.metadata.clone();
                    line.updated_at = Utc::now();
                    line.updated_by = Some(updated_by);
                    repo.update(&mut *conn, &line).await?;

                    Ok((before, line))
                })
            })
            .await?;

        self.audit
            .record(
                actor,
                AuditEvent::new(AuditAction::Update, MODULE, "ProductionLine")
                    .entity(&after.id, &after.name)
                    .before(&before)
                    .after(&after),
            )
            .await;
        self.events.publish(DomainEvent::new(
            "ProductionLine",
            &after.id,
            AuditAction::Update,
        ));

        Ok(after)
    }

    pub async fn update_production_line_status(
        &self,
        actor: &Actor,
        id: &str,
        next: EntityStatus,
    ) -> ServiceResult<ProductionLine> {
        require(
            self.authorizer.as_ref(),
            actor,
            permission::MANUFACTURING_UPDATE,
        )
        .await?;

        let repo = self.db.production_lines();
        let lookup = self.lines;
        let id = id.to_string();
        let updated_by = actor.user_id.clone();

        let (before, after) = self
            .tx
            .run("update_production_line_status", move |conn| {
                Box::pin(async move {
                    let before = lookup.ensure_exists(&mut *conn, &id).await?;
                    if !before.status.can_transition_to(next) {
                        return Err(ServiceError::operation_failed(format!(
                            "Cannot change status from {} to {}",
                            before.status.label(),
                            next.label()
                        )));
                    }

                    let mut line = before.clone();
                    line.status = next;
                    line.updated_at = Utc::now();
                    line.updated_by = Some(updated_by);
                    repo.update(&mut *conn, &line).await?;
                    Ok((before, line))
                })
            })
            .await?;

        self.audit
            .record(
                actor,
                AuditEvent::new(AuditAction::StatusChange, MODULE, "ProductionLine")
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
            "ProductionLine",
            &after.id,
            AuditAction::StatusChange,
        ));

        Ok(after)
    }

    /// Physically removes a line. Refused while production orders are
    /// scheduled on it.
    pub async fn delete_production_line(&self, actor: &Actor, id: &str) -> ServiceResult<()> {
        require(
            self.authorizer.as_ref(),
            actor,
            permission::MANUFACTURING_DELETE,
        )
        .await?;

        let repo = self.db.production_lines();
        let orders = self.db.production_orders();
        let id = id.to_string();

        let deleted = self
            .tx
            .run("delete_production_line", move |conn| {
                Box::pin(async move {
                    let line = repo
                        .find_by_id(&mut *conn, &id)
                        .await?
                        .ok_or_else(|| ServiceError::not_found("Production line", &id))?;

                    let order_count = orders
                        .count(&mut *conn, &Filter::new().eq("line_id", id.as_str()))
                        .await?;
                    if order_count > 0 {
                        return Err(ServiceError::operation_failed(
                            "Production line still has orders",
                        ));
                    }

                    repo.delete(&mut *conn, &line.id).await?;
                    Ok(line)
                })
            })
            .await?;

        self.audit
            .record(
                actor,
                AuditEvent::new(AuditAction::Delete, MODULE, "ProductionLine")
                    .severity(AuditSeverity::Critical)
                    .entity(&deleted.id, &deleted.name)
                    .before(&deleted),
            )
            .await;
        self.events.publish(DomainEvent::new(
            "ProductionLine",
            &deleted.id,
            AuditAction::Delete,
        ));

        info!("Deleted production line: {} ({})", deleted.name, deleted.id);
        Ok(())
    }
}

// =============================================================================
// Production Order Service
// =============================================================================

/// Production orders: planning, release, output recording.
#[derive(Clone)]
pub struct ProductionOrderService {
    db: Database,
    tx: TransactionRunner,
    authorizer: Arc<dyn Authorizer>,
    audit: AuditLogger,
    events: EventBus,
    products: ProductLookup,
    boms: BillOfMaterialLookup,
    lines: ProductionLineLookup,
}

impl ProductionOrderService {
    pub fn new(db: Database, authorizer: Arc<dyn Authorizer>, events: EventBus) -> Self {
        ProductionOrderService {
            tx: TransactionRunner::new(db.clone()),
            audit: AuditLogger::new(db.clone()),
            products: ProductLookup::new(),
            boms: BillOfMaterialLookup::new(),
            lines: ProductionLineLookup::new(),
            db,
            authorizer,
            events,
        }
    }

    /// Plans a new order. Orders start `Pending` with nothing produced;
    /// the BOM must belong to the ordered product.
    pub async fn create_production_order(
        &self,
        actor: &Actor,
        input: ProductionOrderInput,
    ) -> ServiceResult<ProductionOrder> {
        require(
            self.authorizer.as_ref(),
            actor,
            permission::MANUFACTURING_CREATE,
        )
        .await?;

        validate_order_input(&input)?;

        let repo = self.db.production_orders();
        let products = self.products;
        let boms = self.boms;
        let lines = self.lines;
        let created_by = actor.user_id.clone();

        let order = self
            .tx
            .run("create_production_order", move |conn| {
                Box::pin(async move {
                    let number = input.order_number.trim();
                    if repo
                        .find_one(&mut *conn, &Filter::new().eq("order_number", number))
                        .await?
                        .is_some()
                    {
                        return Err(ServiceError::duplicate("order_number", number));
                    }

                    products.ensure_active(&mut *conn, &input.product_id).await?;
                    let bom = boms.ensure_active(&mut *conn, &input.bom_id).await?;
                    if bom.product_id != input.product_id {
                        return Err(ServiceError::operation_failed(
                            "Bill of material does not belong to the ordered product",
                        ));
                    }
                    lines.ensure_active(&mut *conn, &input.line_id).await?;

                    let now = Utc::now();
                    let order = ProductionOrder {
                        id: new_entity_id(),
                        order_number: number.to_string(),
                        product_id: input.product_id.clone(),
                        bom_id: input.bom_id.clone(),
                        line_id: input.line_id.clone(),
                        quantity_planned: input.quantity_planned,
                        quantity_produced: 0.0,
                        planned_start: input.planned_start,
                        planned_end: input.planned_end,
                        actual_start: None,
                        actual_end: None,
                        status: EntityStatus::Pending,
                        metadata: input.metadata.clone(),
                        created_at: now,
                        created_by: Some(created_by.clone()),
                        updated_at: now,
                        updated_by: Some(created_by),
                    };
                    repo.insert(&mut *conn, &order).await?;
                    Ok(order)
                })
            })
            .await?;

        self.audit
            .record(
                actor,
                AuditEvent::new(AuditAction::Create, MODULE, "ProductionOrder")
                    .entity(&order.id, &order.order_number)
                    .after(&order),
            )
            .await;
        self.events.publish(DomainEvent::new(
            "ProductionOrder",
            &order.id,
            AuditAction::Create,
        ));

        info!(
            "Created production order: {} ({})",
            order.order_number, order.id
        );
        Ok(order)
    }

    pub async fn get_production_order_by_id(
        &self,
        actor: &Actor,
        id: &str,
    ) -> ServiceResult<ProductionOrder> {
        debug!(user_id = %actor.user_id, id, "Fetching production order");
        self.db
            .production_orders()
            .find_by_id(self.db.pool(), id)
            .await?
            .filter(|order| order.status != EntityStatus::Deleted)
            .ok_or_else(|| ServiceError::not_found("Production order", id))
    }

    pub async fn get_production_order_by_number(
        &self,
        actor: &Actor,
        number: &str,
    ) -> ServiceResult<ProductionOrder> {
        debug!(user_id = %actor.user_id, number, "Fetching production order by number");
        self.db
            .production_orders()
            .find_one(self.db.pool(), &Filter::new().eq("order_number", number))
            .await?
            .filter(|order| order.status != EntityStatus::Deleted)
            .ok_or_else(|| ServiceError::not_found("Production order", number))
    }

    pub async fn list_production_orders(
        &self,
        actor: &Actor,
        filter: &Filter,
    ) -> ServiceResult<Vec<ProductionOrder>> {
        debug!(user_id = %actor.user_id, conditions = filter.len(), "Listing production orders");
        let orders = self
            .db
            .production_orders()
            .find(self.db.pool(), filter)
            .await?;
        Ok(orders
            .into_iter()
            .filter(|order| order.status != EntityStatus::Deleted)
            .collect())
    }

    /// Updates an order header. Allowed only while the order is still
    /// `Pending`; a released order is locked to its plan.
    pub async fn update_production_order(
        &self,
        actor: &Actor,
        id: &str,
        input: ProductionOrderInput,
    ) -> ServiceResult<ProductionOrder> {
        require(
            self.authorizer.as_ref(),
            actor,
            permission::MANUFACTURING_UPDATE,
        )
        .await?;

        validate_order_input(&input)?;

        let repo = self.db.production_orders();
        let products = self.products;
        let boms = self.boms;
        let lines = self.lines;
        let id = id.to_string();
        let updated_by = actor.user_id.clone();

        let (before, after) = self
            .tx
            .run("update_production_order", move |conn| {
                Box::pin(async move {
                    let before = repo
                        .find_by_id(&mut *conn, &id)
                        .await?
                        .filter(|order| order.status != EntityStatus::Deleted)
                        .ok_or_else(|| ServiceError::not_found("Production order", &id))?;
                    if before.status != EntityStatus::Pending {
                        return Err(ServiceError::operation_failed(
                            "Only pending orders can be edited",
                        ));
                    }

                    let number = input.order_number.trim();
                    if let Some(taken) = repo
                        .find_one(&mut *conn, &Filter::new().eq("order_number", number))
                        .await?
                    {
                        if taken.id != before.id {
                            return Err(ServiceError::duplicate("order_number", number));
                        }
                    }

                    products.ensure_active(&mut *conn, &input.product_id).await?;
                    let bom = boms.ensure_active(&mut *conn, &input.bom_id).await?;
                    if bom.product_id != input.product_id {
                        return Err(ServiceError::operation_failed(
                            "Bill of material does not belong to the ordered product",
                        ));
                    }
                    lines.ensure_active(&mut *conn, &input.line_id).await?;

                    let mut order = before.clone();
                    order.order_number = number.to_string();
                    order.product_id = input.product_id.clone();
                    order.bom_id = input.bom_id.clone();
                    order.line_id = input.line_id.clone();
                    order.quantity_planned = input.quantity_planned;
                    order.planned_start = input.planned_start;
                    order.planned_end = input.planned_end;
                    order.metadata = input.metadata.clone();
                    order.updated_at = Utc::now();
                    order.updated_by = Some(updated_by);
                    repo.update(&mut *conn, &order).await?;

                    Ok((before, order))
                })
            })
            .await?;

        self.audit
            .record(
                actor,
                AuditEvent::new(AuditAction::Update, MODULE, "ProductionOrder")
                    .entity(&after.id, &after.order_number)
                    .before(&before)
                    .after(&after),
            )
            .await;
        self.events.publish(DomainEvent::new(
            "ProductionOrder",
            &after.id,
            AuditAction::Update,
        ));

        Ok(after)
    }

    /// Moves an order through its lifecycle. Releasing a pending order
    /// (`Pending -> Active`) stamps the actual start.
    pub async fn update_production_order_status(
        &self,
        actor: &Actor,
        id: &str,
        next: EntityStatus,
    ) -> ServiceResult<ProductionOrder> {
        require(
            self.authorizer.as_ref(),
            actor,
            permission::MANUFACTURING_UPDATE,
        )
        .await?;

        let repo = self.db.production_orders();
        let id = id.to_string();
        let updated_by = actor.user_id.clone();

        let (before, after) = self
            .tx
            .run("update_production_order_status", move |conn| {
                Box::pin(async move {
                    let before = repo
                        .find_by_id(&mut *conn, &id)
                        .await?
                        .filter(|order| order.status != EntityStatus::Deleted)
                        .ok_or_else(|| ServiceError::not_found("Production order", &id))?;
                    if !before.status.can_transition_to(next) {
                        return Err(ServiceError::operation_failed(format!(
                            "Cannot change status from {} to {}",
                            before.status.label(),
                            next.label()
                        )));
                    }

                    let mut order = before.clone();
                    order.status = next;
                    if before.status == EntityStatus::Pending
                        && next == EntityStatus::Active
                        && order.actual_start.is_none()
                    {
                        order.actual_start = Some(Utc::now());
                    }
                    order.updated_at = Utc::now();
                    order.updated_by = Some(updated_by);
                    repo.update(&mut *conn, &order).await?;
                    Ok((before, order))
                })
            })
            .await?;

        self.audit
            .record(
                actor,
                AuditEvent::new(AuditAction::StatusChange, MODULE, "ProductionOrder")
                    .severity(status_change_severity(next))
                    .entity(&after.id, &after.order_number)
                    .description(format!(
                        "{} -> {}",
                        before.status.label(),
                        after.status.label()
                    )),
            )
            .await;
        self.events.publish(DomainEvent::new(
            "ProductionOrder",
            &after.id,
            AuditAction::StatusChange,
        ));

        Ok(after)
    }

    /// Books produced quantity against an active order.
    ///
    /// Output accumulates; producing beyond the plan is allowed and
    /// simply leaves zero remaining. Reaching the planned quantity
    /// stamps the actual end.
    pub async fn record_output(
        &self,
        actor: &Actor,
        id: &str,
        quantity: f64,
    ) -> ServiceResult<ProductionOrder> {
        require(
            self.authorizer.as_ref(),
            actor,
            permission::MANUFACTURING_UPDATE,
        )
        .await?;

        validate_quantity(quantity, "quantity")?;

        let repo = self.db.production_orders();
        let id = id.to_string();
        let updated_by = actor.user_id.clone();

        let after = self
            .tx
            .run("record_output", move |conn| {
                Box::pin(async move {
                    let before = repo
                        .find_by_id(&mut *conn, &id)
                        .await?
                        .filter(|order| order.status != EntityStatus::Deleted)
                        .ok_or_else(|| ServiceError::not_found("Production order", &id))?;
                    if before.status != EntityStatus::Active {
                        return Err(ServiceError::operation_failed(
                            "Output can only be recorded on an active order",
                        ));
                    }

                    let now = Utc::now();
                    let mut order = before;
                    order.quantity_produced += quantity;
                    if order.actual_start.is_none() {
                        order.actual_start = Some(now);
                    }
                    if order.quantity_produced >= order.quantity_planned
                        && order.actual_end.is_none()
                    {
                        order.actual_end = Some(now);
                    }
                    order.updated_at = now;
                    order.updated_by = Some(updated_by);
                    repo.update(&mut *conn, &order).await?;
                    Ok(order)
                })
            })
            .await?;

        self.audit
            .record(
                actor,
                AuditEvent::new(AuditAction::Update, MODULE, "ProductionOrder")
                    .sub_module("output")
                    .entity(&after.id, &after.order_number)
                    .description(format!(
                        "Produced {} of {} planned",
                        after.quantity_produced, after.quantity_planned
                    )),
            )
            .await;
        self.events.publish(DomainEvent::new(
            "ProductionOrder",
            &after.id,
            AuditAction::Update,
        ));

        debug!(
            order = %after.order_number,
            produced = after.quantity_produced,
            remaining = after.remaining_quantity(),
            "Recorded output"
        );
        Ok(after)
    }

    /// Physically removes an order. Only pending orders can go; a
    /// released order carries production history and is closed through
    /// its status instead.
    pub async fn delete_production_order(&self, actor: &Actor, id: &str) -> ServiceResult<()> {
        require(
            self.authorizer.as_ref(),
            actor,
            permission::MANUFACTURING_DELETE,
        )
        .await?;

        let repo = self.db.production_orders();
        let id = id.to_string();

        let deleted = self
            .tx
            .run("delete_production_order", move |conn| {
                Box::pin(async move {
                    let order = repo
                        .find_by_id(&mut *conn, &id)
                        .await?
                        .ok_or_else(|| ServiceError::not_found("Production order", &id))?;
                    if order.status != EntityStatus::Pending {
                        return Err(ServiceError::operation_failed(
                            "Only pending orders can be deleted",
                        ));
                    }

                    repo.delete(&mut *conn, &order.id).await?;
                    Ok(order)
                })
            })
            .await?;

        self.audit
            .record(
                actor,
                AuditEvent::new(AuditAction::Delete, MODULE, "ProductionOrder")
                    .severity(AuditSeverity::Critical)
                    .entity(&deleted.id, &deleted.order_number)
                    .before(&deleted),
            )
            .await;
        self.events.publish(DomainEvent::new(
            "ProductionOrder",
            &deleted.id,
            AuditAction::Delete,
        ));

        info!(
            "Deleted production order: {} ({})",
            deleted.order_number, deleted.id
        );
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bom::BillOfMaterialInput;
    use crate::catalog::{ProductInput, UnitOfMeasureInput};
    use crate::testutil::test_services;
    use crate::AppServices;
    use forge_core::ErrorCode;

    struct Plan {
        product_id: String,
        bom_id: String,
        line_id: String,
    }

    async fn plan_fixture(services: &AppServices) -> Plan {
        let actor = Actor::system();
        let unit = services
            .units_of_measure
            .create_unit_of_measure(
                &actor,
                UnitOfMeasureInput {
                    uom_code: "pc".to_string(),
                    name: "Piece".to_string(),
                    symbol: "pc".to_string(),
                    metadata: Metadata::new(),
                },
            )
            .await
            .unwrap();
        let product = services
            .products
            .create_product(
                &actor,
                ProductInput {
                    product_code: "chair".to_string(),
                    name: "Chair".to_string(),
                    description: None,
                    uom_id: unit.id.clone(),
                    metadata: Metadata::new(),
                },
            )
            .await
            .unwrap();
        let bom = services
            .bills_of_material
            .create_bom(
                &actor,
                BillOfMaterialInput {
                    bom_code: "chair-v1".to_string(),
                    name: "Chair v1".to_string(),
                    product_id: product.id.clone(),
                    metadata: Metadata::new(),
                },
            )
            .await
            .unwrap();
        let line = services
            .production_lines
            .create_production_line(
                &actor,
                ProductionLineInput {
                    line_code: "line-1".to_string(),
                    name: "Assembly line 1".to_string(),
                    location_id: None,
                    hourly_capacity: 10.0,
                    capabilities: vec!["assembly".to_string()],
                    metadata: Metadata::new(),
                },
            )
            .await
            .unwrap();
        Plan {
            product_id: product.id,
            bom_id: bom.id,
            line_id: line.id,
        }
    }

    fn order_input(number: &str, plan: &Plan, quantity: f64) -> ProductionOrderInput {
        ProductionOrderInput {
            order_number: number.to_string(),
            product_id: plan.product_id.clone(),
            bom_id: plan.bom_id.clone(),
            line_id: plan.line_id.clone(),
            quantity_planned: quantity,
            planned_start: None,
            planned_end: None,
            metadata: Metadata::new(),
        }
    }

    #[tokio::test]
    async fn test_order_starts_pending_with_nothing_produced() {
        let services = test_services().await;
        let actor = Actor::system();
        let plan = plan_fixture(&services).await;

        let order = services
            .production_orders
            .create_production_order(&actor, order_input("po-1", &plan, 100.0))
            .await
            .unwrap();
        assert_eq!(order.status, EntityStatus::Pending);
        assert_eq!(order.quantity_produced, 0.0);
        assert!(order.actual_start.is_none());
        assert_eq!(order.remaining_quantity(), 100.0);
    }

    #[tokio::test]
    async fn test_bom_must_match_product() {
        let services = test_services().await;
        let actor = Actor::system();
        let plan = plan_fixture(&services).await;

        // A second product with its own BOM.
        let other = services
            .products
            .create_product(
                &actor,
                ProductInput {
                    product_code: "table".to_string(),
                    name: "Table".to_string(),
                    description: None,
                    uom_id: services
                        .units_of_measure
                        .get_unit_of_measure_by_code(&actor, "pc")
                        .await
                        .unwrap()
                        .id,
                    metadata: Metadata::new(),
                },
            )
            .await
            .unwrap();

        let mut input = order_input("po-1", &plan, 10.0);
        input.product_id = other.id;
        let err = services
            .production_orders
            .create_production_order(&actor, input)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::OperationFailed);
    }

    #[tokio::test]
    async fn test_release_stamps_actual_start() {
        let services = test_services().await;
        let actor = Actor::system();
        let plan = plan_fixture(&services).await;

        let order = services
            .production_orders
            .create_production_order(&actor, order_input("po-1", &plan, 10.0))
            .await
            .unwrap();

        let released = services
            .production_orders
            .update_production_order_status(&actor, &order.id, EntityStatus::Active)
            .await
            .unwrap();
        assert_eq!(released.status, EntityStatus::Active);
        assert!(released.actual_start.is_some());
    }

    #[tokio::test]
    async fn test_record_output_accumulates_and_completes() {
        let services = test_services().await;
        let actor = Actor::system();
        let plan = plan_fixture(&services).await;

        let order = services
            .production_orders
            .create_production_order(&actor, order_input("po-1", &plan, 10.0))
            .await
            .unwrap();

        // Not released yet.
        let err = services
            .production_orders
            .record_output(&actor, &order.id, 5.0)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::OperationFailed);

        services
            .production_orders
            .update_production_order_status(&actor, &order.id, EntityStatus::Active)
            .await
            .unwrap();

        let partial = services
            .production_orders
            .record_output(&actor, &order.id, 6.0)
            .await
            .unwrap();
        assert_eq!(partial.quantity_produced, 6.0);
        assert!(partial.actual_end.is_none());
        assert_eq!(partial.remaining_quantity(), 4.0);

        // Overproduction is allowed; completion stamps the actual end.
        let done = services
            .production_orders
            .record_output(&actor, &order.id, 5.0)
            .await
            .unwrap();
        assert_eq!(done.quantity_produced, 11.0);
        assert!(done.actual_end.is_some());
        assert_eq!(done.remaining_quantity(), 0.0);
    }

    #[tokio::test]
    async fn test_released_order_header_is_locked() {
        let services = test_services().await;
        let actor = Actor::system();
        let plan = plan_fixture(&services).await;

        let order = services
            .production_orders
            .create_production_order(&actor, order_input("po-1", &plan, 10.0))
            .await
            .unwrap();
        services
            .production_orders
            .update_production_order_status(&actor, &order.id, EntityStatus::Active)
            .await
            .unwrap();

        let err = services
            .production_orders
            .update_production_order(&actor, &order.id, order_input("po-1", &plan, 20.0))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::OperationFailed);
    }

    #[tokio::test]
    async fn test_only_pending_orders_can_be_deleted() {
        let services = test_services().await;
        let actor = Actor::system();
        let plan = plan_fixture(&services).await;

        let order = services
            .production_orders
            .create_production_order(&actor, order_input("po-1", &plan, 10.0))
            .await
            .unwrap();
        services
            .production_orders
            .update_production_order_status(&actor, &order.id, EntityStatus::Active)
            .await
            .unwrap();

        let err = services
            .production_orders
            .delete_production_order(&actor, &order.id)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::OperationFailed);

        let pending = services
            .production_orders
            .create_production_order(&actor, order_input("po-2", &plan, 10.0))
            .await
            .unwrap();
        services
            .production_orders
            .delete_production_order(&actor, &pending.id)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_planning_window_must_be_ordered() {
        let services = test_services().await;
        let actor = Actor::system();
        let plan = plan_fixture(&services).await;

        let mut input = order_input("po-1", &plan, 10.0);
        input.planned_start = Some(Utc::now());
        input.planned_end = Some(Utc::now() - chrono::Duration::hours(1));
        let err = services
            .production_orders
            .create_production_order(&actor, input)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidInput);
    }

    #[tokio::test]
    async fn test_empty_capability_tag_rejected() {
        let services = test_services().await;
        let actor = Actor::system();

        let err = services
            .production_lines
            .create_production_line(
                &actor,
                ProductionLineInput {
                    line_code: "line-x".to_string(),
                    name: "Line X".to_string(),
                    location_id: None,
                    hourly_capacity: 5.0,
                    capabilities: vec!["welding".to_string(), "  ".to_string()],
                    metadata: Metadata::new(),
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidInput);
    }

    #[tokio::test]
    async fn test_line_delete_guarded_by_orders() {
        let services = test_services().await;
        let actor = Actor::system();
        let plan = plan_fixture(&services).await;

        services
            .production_orders
            .create_production_order(&actor, order_input("po-1", &plan, 10.0))
            .await
            .unwrap();

        let err = services
            .production_lines
            .delete_production_line(&actor, &plan.line_id)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::OperationFailed);
    }
}
