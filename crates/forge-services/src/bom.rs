//! # Bill of Material Service
//!
//! A bill of material is a header plus owned component lines. The
//! header carries a revision counter that advances on every header
//! edit, so downstream consumers can tell "the recipe changed" without
//! diffing items.
//!
//! Items never outlive their BOM: deleting a header removes its lines
//! in the same transaction, and item operations always check that the
//! line actually belongs to the addressed BOM.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use forge_core::validation::{validate_code, validate_name, validate_quantity, validate_text};
use forge_core::{
    AuditAction, AuditSeverity, BillOfMaterial, BomItem, EntityStatus, Metadata, ServiceError,
    ServiceResult,
};
use forge_db::{Database, Filter};

use crate::audit::{AuditEvent, AuditLogger};
use crate::authz::{permission, require, Authorizer};
use crate::catalog::status_change_severity;
use crate::context::{new_entity_id, Actor};
use crate::events::{DomainEvent, EventBus};
use crate::lookup::{BillOfMaterialLookup, ProductLookup, UnitOfMeasureLookup};
use crate::transaction::TransactionRunner;

const MODULE: &str = "manufacturing";

/// Header fields for creating or updating a bill of material.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillOfMaterialInput {
    pub bom_code: String,
    pub name: String,
    pub product_id: String,
    #[serde(default)]
    pub metadata: Metadata,
}

/// One component line, as supplied by the caller.
///
/// `position` may be omitted on add; the item is then appended after
/// the existing lines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BomItemInput {
    pub product_id: String,
    pub quantity: f64,
    pub uom_id: String,
    pub position: Option<i64>,
    pub note: Option<String>,
}

/// Bills of material and their component lines.
#[derive(Clone)]
pub struct BillOfMaterialService {
    db: Database,
    tx: TransactionRunner,
    authorizer: Arc<dyn Authorizer>,
    audit: AuditLogger,
    events: EventBus,
    boms: BillOfMaterialLookup,
    products: ProductLookup,
    units: UnitOfMeasureLookup,
}

impl BillOfMaterialService {
    pub fn new(db: Database, authorizer: Arc<dyn Authorizer>, events: EventBus) -> Self {
        BillOfMaterialService {
            tx: TransactionRunner::new(db.clone()),
            audit: AuditLogger::new(db.clone()),
            boms: BillOfMaterialLookup::new(),
            products: ProductLookup::new(),
            units: UnitOfMeasureLookup::new(),
            db,
            authorizer,
            events,
        }
    }

    // ===== Headers =====

    /// Creates a bill of material at revision 1.
    pub async fn create_bom(
        &self,
        actor: &Actor,
        input: BillOfMaterialInput,
    ) -> ServiceResult<BillOfMaterial> {
        require(
            self.authorizer.as_ref(),
            actor,
            permission::MANUFACTURING_CREATE,
        )
        .await?;

        validate_code(&input.bom_code, "bom_code")?;
        validate_name(&input.name, "name")?;

        let repo = self.db.bills_of_material();
        let products = self.products;
        let created_by = actor.user_id.clone();

        let bom = self
            .tx
            .run("create_bom", move |conn| {
                Box::pin(async move {
                    let code = input.bom_code.trim();
                    if repo
                        .find_one(&mut *conn, &Filter::new().eq("bom_code", code))
                        .await?
                        .is_some()
                    {
                        return Err(ServiceError::duplicate("bom_code", code));
                    }

                    products.ensure_active(&mut *conn, &input.product_id).await?;

                    let now = Utc::now();
                    let bom = BillOfMaterial {
                        id: new_entity_id(),
                        bom_code: code.to_string(),
                        name: input.name.trim().to_string(),
                        product_id: input.product_id.clone(),
                        revision: 1,
                        status: EntityStatus::Active,
                        metadata: input.metadata.clone(),
                        created_at: now,
                        created_by: Some(created_by.clone()),
                        updated_at: now,
                        updated_by: Some(created_by),
                    };
                    repo.insert(&mut *conn, &bom).await?;
                    Ok(bom)
                })
            })
            .await?;

        self.audit
            .record(
                actor,
                AuditEvent::new(AuditAction::Create, MODULE, "BillOfMaterial")
                    .entity(&bom.id, &bom.name)
                    .after(&bom),
            )
            .await;
        self.events.publish(DomainEvent::new(
            "BillOfMaterial",
            &bom.id,
            AuditAction::Create,
        ));

        info!("Created bill of material: {} ({})", bom.name, bom.id);
        Ok(bom)
    }

    pub async fn get_bom_by_id(&self, actor: &Actor, id: &str) -> ServiceResult<BillOfMaterial> {
        debug!(user_id = %actor.user_id, id, "Fetching bill of material");
        self.db
            .bills_of_material()
            .find_by_id(self.db.pool(), id)
            .await?
            .filter(|bom| bom.status != EntityStatus::Deleted)
            .ok_or_else(|| ServiceError::not_found("Bill of material", id))
    }

    pub async fn get_bom_by_code(
        &self,
        actor: &Actor,
        code: &str,
    ) -> ServiceResult<BillOfMaterial> {
        debug!(user_id = %actor.user_id, code, "Fetching bill of material by code");
        self.db
            .bills_of_material()
            .find_one(self.db.pool(), &Filter::new().eq("bom_code", code))
            .await?
            .filter(|bom| bom.status != EntityStatus::Deleted)
            .ok_or_else(|| ServiceError::not_found("Bill of material", code))
    }

    pub async fn list_boms(
        &self,
        actor: &Actor,
        filter: &Filter,
    ) -> ServiceResult<Vec<BillOfMaterial>> {
        debug!(user_id = %actor.user_id, conditions = filter.len(), "Listing bills of material");
        let boms = self
            .db
            .bills_of_material()
            .find(self.db.pool(), filter)
            .await?;
        Ok(boms
            .into_iter()
            .filter(|bom| bom.status != EntityStatus::Deleted)
            .collect())
    }

    /// Updates the header and advances the revision counter.
    ///
    /// Repointing the BOM at a different product is refused while
    /// production orders reference it; the orders were planned against
    /// the original product.
    pub async fn update_bom(
        &self,
        actor: &Actor,
        id: &str,
        input: BillOfMaterialInput,
    ) -> ServiceResult<BillOfMaterial> {
        require(
            self.authorizer.as_ref(),
            actor,
            permission::MANUFACTURING_UPDATE,
        )
        .await?;

        validate_code(&input.bom_code, "bom_code")?;
        validate_name(&input.name, "name")?;

        let repo = self.db.bills_of_material();
        let orders = self.db.production_orders();
        let lookup = self.boms;
        let products = self.products;
        let id = id.to_string();
        let updated_by = actor.user_id.clone();

        let (before, after) = self
            .tx
            .run("update_bom", move |conn| {
                Box::pin(async move {
                    let before = lookup.ensure_exists(&mut *conn, &id).await?;

                    let code = input.bom_code.trim();
                    if let Some(taken) = repo
                        .find_one(&mut *conn, &Filter::new().eq("bom_code", code))
                        .await?
                    {
                        if taken.id != before.id {
                            return Err(ServiceError::duplicate("bom_code", code));
                        }
                    }

                    if input.product_id != before.product_id {
                        let order_count = orders
                            .count(&mut *conn, &Filter::new().eq("bom_id", id.as_str()))
                            .await?;
                        if order_count > 0 {
                            return Err(ServiceError::operation_failed(
                                "Cannot change the product of a bill of material that production orders reference",
                            ));
                        }
                        products.ensure_active(&mut *conn, &input.product_id).await?;
                    }

                    let mut bom = before.clone();
                    bom.bom_code = code.to_string();
                    bom.name = input.name.trim().to_string();
                    bom.product_id = input.product_id.clone();
                    bom.metadata = input.metadata.clone();
                    bom.revision = before.revision + 1;
                    bom.updated_at = Utc::now();
                    bom.updated_by = Some(updated_by);
                    repo.update(&mut *conn, &bom).await?;

                    Ok((before, bom))
                })
            })
            .await?;

        self.audit
            .record(
                actor,
                AuditEvent::new(AuditAction::Update, MODULE, "BillOfMaterial")
                    .entity(&after.id, &after.name)
                    .before(&before)
                    .after(&after)
                    .description(format!("Revision {} -> {}", before.revision, after.revision)),
            )
            .await;
        self.events.publish(DomainEvent::new(
            "BillOfMaterial",
            &after.id,
            AuditAction::Update,
        ));

        info!(
            "Updated bill of material: {} ({}) revision {}",
            after.name, after.id, after.revision
        );
        Ok(after)
    }

    pub async fn update_bom_status(
        &self,
        actor: &Actor,
        id: &str,
        next: EntityStatus,
    ) -> ServiceResult<BillOfMaterial> {
        require(
            self.authorizer.as_ref(),
            actor,
            permission::MANUFACTURING_UPDATE,
        )
        .await?;

        let repo = self.db.bills_of_material();
        let lookup = self.boms;
        let id = id.to_string();
        let updated_by = actor.user_id.clone();

        let (before, after) = self
            .tx
            .run("update_bom_status", move |conn| {
                Box::pin(async move {
                    let before = lookup.ensure_exists(&mut *conn, &id).await?;
                    if !before.status.can_transition_to(next) {
                        return Err(ServiceError::operation_failed(format!(
                            "Cannot change status from {} to {}",
                            before.status.label(),
                            next.label()
                        )));
                    }

                    let mut bom = before.clone();
                    bom.status = next;
                    bom.updated_at = Utc::now();
                    bom.updated_by = Some(updated_by);
                    repo.update(&mut *conn, &bom).await?;
                    Ok((before, bom))
                })
            })
            .await?;

        self.audit
            .record(
                actor,
                AuditEvent::new(AuditAction::StatusChange, MODULE, "BillOfMaterial")
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
            "BillOfMaterial",
            &after.id,
            AuditAction::StatusChange,
        ));

        Ok(after)
    }

    /// Physically removes a BOM and all of its items. Refused while
    /// production orders reference the BOM.
    pub async fn delete_bom(&self, actor: &Actor, id: &str) -> ServiceResult<()> {
        require(
            self.authorizer.as_ref(),
            actor,
            permission::MANUFACTURING_DELETE,
        )
        .await?;

        let repo = self.db.bills_of_material();
        let items = self.db.bom_items();
        let orders = self.db.production_orders();
        let id = id.to_string();

        let deleted = self
            .tx
            .run("delete_bom", move |conn| {
                Box::pin(async move {
                    let bom = repo
                        .find_by_id(&mut *conn, &id)
                        .await?
                        .ok_or_else(|| ServiceError::not_found("Bill of material", &id))?;

                    let order_count = orders
                        .count(&mut *conn, &Filter::new().eq("bom_id", id.as_str()))
                        .await?;
                    if order_count > 0 {
                        return Err(ServiceError::operation_failed(
                            "Bill of material is still referenced by production orders",
                        ));
                    }

                    // Items go first; they have no life of their own.
                    items
                        .delete_where(&mut *conn, &Filter::new().eq("bom_id", id.as_str()))
                        .await?;
                    repo.delete(&mut *conn, &bom.id).await?;
                    Ok(bom)
                })
            })
            .await?;

        self.audit
            .record(
                actor,
                AuditEvent::new(AuditAction::Delete, MODULE, "BillOfMaterial")
                    .severity(AuditSeverity::Critical)
                    .entity(&deleted.id, &deleted.name)
                    .before(&deleted),
            )
            .await;
        self.events.publish(DomainEvent::new(
            "BillOfMaterial",
            &deleted.id,
            AuditAction::Delete,
        ));

        info!("Deleted bill of material: {} ({})", deleted.name, deleted.id);
        Ok(())
    }

    // ===== Items =====

    /// Adds a component line. Without an explicit position the line is
    /// appended after the existing ones.
    pub async fn add_item(
        &self,
        actor: &Actor,
        bom_id: &str,
        input: BomItemInput,
    ) -> ServiceResult<BomItem> {
        require(
            self.authorizer.as_ref(),
            actor,
            permission::MANUFACTURING_UPDATE,
        )
        .await?;

        validate_quantity(input.quantity, "quantity")?;
        if let Some(note) = &input.note {
            validate_text(note, "note")?;
        }

        let items = self.db.bom_items();
        let boms = self.boms;
        let products = self.products;
        let units = self.units;
        let bom_id = bom_id.to_string();

        let item = self
            .tx
            .run("add_bom_item", move |conn| {
                Box::pin(async move {
                    boms.ensure_exists(&mut *conn, &bom_id).await?;
                    products.ensure_active(&mut *conn, &input.product_id).await?;
                    units.ensure_active(&mut *conn, &input.uom_id).await?;

                    let position = match input.position {
                        Some(position) => position,
                        None => {
                            let existing = items
                                .count(&mut *conn, &Filter::new().eq("bom_id", bom_id.as_str()))
                                .await?;
                            existing + 1
                        }
                    };

                    let item = BomItem {
                        id: new_entity_id(),
                        bom_id: bom_id.clone(),
                        product_id: input.product_id.clone(),
                        quantity: input.quantity,
                        uom_id: input.uom_id.clone(),
                        position,
                        note: input.note.clone(),
                        created_at: Utc::now(),
                    };
                    items.insert(&mut *conn, &item).await?;
                    Ok(item)
                })
            })
            .await?;

        self.audit
            .record(
                actor,
                AuditEvent::new(AuditAction::Update, MODULE, "BillOfMaterial")
                    .sub_module("items")
                    .entity(&item.bom_id, "")
                    .after(&item)
                    .description("Added item"),
            )
            .await;
        self.events.publish(DomainEvent::new(
            "BillOfMaterial",
            &item.bom_id,
            AuditAction::Update,
        ));

        Ok(item)
    }

    /// Replaces the fields of an existing line. The line must belong
    /// to the addressed BOM.
    pub async fn update_item(
        &self,
        actor: &Actor,
        bom_id: &str,
        item_id: &str,
        input: BomItemInput,
    ) -> ServiceResult<BomItem> {
        require(
            self.authorizer.as_ref(),
            actor,
            permission::MANUFACTURING_UPDATE,
        )
        .await?;

        validate_quantity(input.quantity, "quantity")?;
        if let Some(note) = &input.note {
            validate_text(note, "note")?;
        }

        let items = self.db.bom_items();
        let products = self.products;
        let units = self.units;
        let bom_id = bom_id.to_string();
        let item_id = item_id.to_string();

        let (before, after) = self
            .tx
            .run("update_bom_item", move |conn| {
                Box::pin(async move {
                    let before = items
                        .find_by_id(&mut *conn, &item_id)
                        .await?
                        .filter(|item| item.bom_id == bom_id)
                        .ok_or_else(|| ServiceError::not_found("Bill of material item", &item_id))?;

                    products.ensure_active(&mut *conn, &input.product_id).await?;
                    units.ensure_active(&mut *conn, &input.uom_id).await?;

                    let mut item = before.clone();
                    item.product_id = input.product_id.clone();
                    item.quantity = input.quantity;
                    item.uom_id = input.uom_id.clone();
                    if let Some(position) = input.position {
                        item.position = position;
                    }
                    item.note = input.note.clone();
                    items.update(&mut *conn, &item).await?;

                    Ok((before, item))
                })
            })
            .await?;

        self.audit
            .record(
                actor,
                AuditEvent::new(AuditAction::Update, MODULE, "BillOfMaterial")
                    .sub_module("items")
                    .entity(&after.bom_id, "")
                    .before(&before)
                    .after(&after)
                    .description("Updated item"),
            )
            .await;
        self.events.publish(DomainEvent::new(
            "BillOfMaterial",
            &after.bom_id,
            AuditAction::Update,
        ));

        Ok(after)
    }

    /// Removes one line from a BOM.
    pub async fn remove_item(
        &self,
        actor: &Actor,
        bom_id: &str,
        item_id: &str,
    ) -> ServiceResult<()> {
        require(
            self.authorizer.as_ref(),
            actor,
            permission::MANUFACTURING_UPDATE,
        )
        .await?;

        let items = self.db.bom_items();
        let bom_id = bom_id.to_string();
        let item_id = item_id.to_string();

        let removed = self
            .tx
            .run("remove_bom_item", move |conn| {
                Box::pin(async move {
                    let item = items
                        .find_by_id(&mut *conn, &item_id)
                        .await?
                        .filter(|item| item.bom_id == bom_id)
                        .ok_or_else(|| ServiceError::not_found("Bill of material item", &item_id))?;

                    items.delete(&mut *conn, &item.id).await?;
                    Ok(item)
                })
            })
            .await?;

        self.audit
            .record(
                actor,
                AuditEvent::new(AuditAction::Update, MODULE, "BillOfMaterial")
                    .sub_module("items")
                    .entity(&removed.bom_id, "")
                    .before(&removed)
                    .description("Removed item"),
            )
            .await;
        self.events.publish(DomainEvent::new(
            "BillOfMaterial",
            &removed.bom_id,
            AuditAction::Update,
        ));

        Ok(())
    }

    /// Lists the component lines of a BOM in display order.
    pub async fn items_of(&self, actor: &Actor, bom_id: &str) -> ServiceResult<Vec<BomItem>> {
        debug!(user_id = %actor.user_id, bom_id, "Listing bill of material items");
        self.boms.ensure_exists(self.db.pool(), bom_id).await?;
        let items = self
            .db
            .bom_items()
            .find(self.db.pool(), &Filter::new().eq("bom_id", bom_id))
            .await?;
        Ok(items)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ProductInput, UnitOfMeasureInput};
    use crate::testutil::test_services;
    use crate::AppServices;
    use forge_core::{ErrorCode, Product, UnitOfMeasure};

    async fn fixture(services: &AppServices) -> (UnitOfMeasure, Product) {
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
        (unit, product)
    }

    fn bom_input(code: &str, product_id: &str) -> BillOfMaterialInput {
        BillOfMaterialInput {
            bom_code: code.to_string(),
            name: format!("BOM {}", code),
            product_id: product_id.to_string(),
            metadata: Metadata::new(),
        }
    }

    #[tokio::test]
    async fn test_create_bom_starts_at_revision_one() {
        let services = test_services().await;
        let actor = Actor::system();
        let (_, product) = fixture(&services).await;

        let bom = services
            .bills_of_material
            .create_bom(&actor, bom_input("chair-v1", &product.id))
            .await
            .unwrap();
        assert_eq!(bom.revision, 1);
        assert_eq!(bom.status, EntityStatus::Active);
    }

    #[tokio::test]
    async fn test_update_bom_bumps_revision() {
        let services = test_services().await;
        let actor = Actor::system();
        let (_, product) = fixture(&services).await;

        let bom = services
            .bills_of_material
            .create_bom(&actor, bom_input("chair-v1", &product.id))
            .await
            .unwrap();

        let mut input = bom_input("chair-v1", &product.id);
        input.name = "Chair, reinforced".to_string();
        let updated = services
            .bills_of_material
            .update_bom(&actor, &bom.id, input)
            .await
            .unwrap();
        assert_eq!(updated.revision, 2);

        let again = services
            .bills_of_material
            .update_bom(&actor, &bom.id, bom_input("chair-v1", &product.id))
            .await
            .unwrap();
        assert_eq!(again.revision, 3);
    }

    #[tokio::test]
    async fn test_item_positions_append_when_unspecified() {
        let services = test_services().await;
        let actor = Actor::system();
        let (unit, product) = fixture(&services).await;

        let leg = services
            .products
            .create_product(
                &actor,
                ProductInput {
                    product_code: "leg".to_string(),
                    name: "Leg".to_string(),
                    description: None,
                    uom_id: unit.id.clone(),
                    metadata: Metadata::new(),
                },
            )
            .await
            .unwrap();

        let bom = services
            .bills_of_material
            .create_bom(&actor, bom_input("chair-v1", &product.id))
            .await
            .unwrap();

        let first = services
            .bills_of_material
            .add_item(
                &actor,
                &bom.id,
                BomItemInput {
                    product_id: leg.id.clone(),
                    quantity: 4.0,
                    uom_id: unit.id.clone(),
                    position: None,
                    note: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(first.position, 1);

        let second = services
            .bills_of_material
            .add_item(
                &actor,
                &bom.id,
                BomItemInput {
                    product_id: leg.id.clone(),
                    quantity: 1.0,
                    uom_id: unit.id.clone(),
                    position: None,
                    note: Some("seat".to_string()),
                },
            )
            .await
            .unwrap();
        assert_eq!(second.position, 2);

        let items = services
            .bills_of_material
            .items_of(&actor, &bom.id)
            .await
            .unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].id, first.id);
        assert_eq!(items[1].id, second.id);
    }

    #[tokio::test]
    async fn test_item_must_belong_to_addressed_bom() {
        let services = test_services().await;
        let actor = Actor::system();
        let (unit, product) = fixture(&services).await;

        let bom_a = services
            .bills_of_material
            .create_bom(&actor, bom_input("bom-a", &product.id))
            .await
            .unwrap();
        let bom_b = services
            .bills_of_material
            .create_bom(&actor, bom_input("bom-b", &product.id))
            .await
            .unwrap();

        let item = services
            .bills_of_material
            .add_item(
                &actor,
                &bom_a.id,
                BomItemInput {
                    product_id: product.id.clone(),
                    quantity: 1.0,
                    uom_id: unit.id.clone(),
                    position: None,
                    note: None,
                },
            )
            .await
            .unwrap();

        // Addressing the item through the wrong BOM fails.
        let err = services
            .bills_of_material
            .remove_item(&actor, &bom_b.id, &item.id)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);

        services
            .bills_of_material
            .remove_item(&actor, &bom_a.id, &item.id)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_delete_bom_removes_items() {
        let services = test_services().await;
        let actor = Actor::system();
        let (unit, product) = fixture(&services).await;

        let bom = services
            .bills_of_material
            .create_bom(&actor, bom_input("chair-v1", &product.id))
            .await
            .unwrap();
        services
            .bills_of_material
            .add_item(
                &actor,
                &bom.id,
                BomItemInput {
                    product_id: product.id.clone(),
                    quantity: 1.0,
                    uom_id: unit.id.clone(),
                    position: None,
                    note: None,
                },
            )
            .await
            .unwrap();

        services
            .bills_of_material
            .delete_bom(&actor, &bom.id)
            .await
            .unwrap();

        let orphans = services
            .db
            .bom_items()
            .count(
                services.db.pool(),
                &Filter::new().eq("bom_id", bom.id.as_str()),
            )
            .await
            .unwrap();
        assert_eq!(orphans, 0);
    }

    #[tokio::test]
    async fn test_zero_quantity_item_rejected() {
        let services = test_services().await;
        let actor = Actor::system();
        let (unit, product) = fixture(&services).await;

        let bom = services
            .bills_of_material
            .create_bom(&actor, bom_input("chair-v1", &product.id))
            .await
            .unwrap();

        let err = services
            .bills_of_material
            .add_item(
                &actor,
                &bom.id,
                BomItemInput {
                    product_id: product.id.clone(),
                    quantity: 0.0,
                    uom_id: unit.id.clone(),
                    position: None,
                    note: None,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidInput);
    }
}
