//! # Manufacturing Mappers
//!
//! Column mappings for `bills_of_material`, `bom_items`,
//! `production_lines` and `production_orders`.
//!
//! BOM items are child rows: they list in `position` order so a fetched
//! BOM reads like the printed recipe.

use chrono::DateTime;
use forge_core::{BillOfMaterial, BomItem, EntityStatus, ProductionLine, ProductionOrder};

use crate::repository::{EntityMapper, Repository};
use crate::value::RowMap;

// =============================================================================
// Bill of Material
// =============================================================================

/// Maps [`BillOfMaterial`] to and from the `bills_of_material` table.
pub struct BillOfMaterialMapper;

impl EntityMapper for BillOfMaterialMapper {
    type Entity = BillOfMaterial;

    const TABLE: &'static str = "bills_of_material";
    const ENTITY_NAME: &'static str = "Bill of material";

    fn to_row(entity: &BillOfMaterial) -> RowMap {
        let mut row = RowMap::with_capacity(11);
        row.set("id", entity.id.clone())
            .set("bom_code", entity.bom_code.clone())
            .set("name", entity.name.clone())
            .set("product_id", entity.product_id.clone())
            .set("revision", entity.revision)
            .set("status", entity.status.as_i64())
            .set_json("metadata_json", &entity.metadata)
            .set("created_at", entity.created_at)
            .set("created_by", entity.created_by.clone())
            .set("updated_at", entity.updated_at)
            .set("updated_by", entity.updated_by.clone());
        row
    }

    fn from_row(row: &RowMap) -> BillOfMaterial {
        BillOfMaterial {
            id: row.text("id").unwrap_or_default(),
            bom_code: row.text("bom_code").unwrap_or_default(),
            name: row.text("name").unwrap_or_default(),
            product_id: row.text("product_id").unwrap_or_default(),
            revision: row.int("revision").unwrap_or(1),
            status: row
                .int("status")
                .and_then(EntityStatus::from_i64)
                .unwrap_or_default(),
            metadata: row.json_as("metadata_json").unwrap_or_default(),
            created_at: row.timestamp("created_at").unwrap_or(DateTime::UNIX_EPOCH),
            created_by: row.text("created_by"),
            updated_at: row.timestamp("updated_at").unwrap_or(DateTime::UNIX_EPOCH),
            updated_by: row.text("updated_by"),
        }
    }
}

/// Repository over the `bills_of_material` table.
pub type BillOfMaterialRepository = Repository<BillOfMaterialMapper>;

// =============================================================================
// BOM Item
// =============================================================================

/// Maps [`BomItem`] to and from the `bom_items` table.
pub struct BomItemMapper;

impl EntityMapper for BomItemMapper {
    type Entity = BomItem;

    const TABLE: &'static str = "bom_items";
    const ENTITY_NAME: &'static str = "BOM item";
    const ORDER_BY: &'static str = "position";

    fn to_row(entity: &BomItem) -> RowMap {
        let mut row = RowMap::with_capacity(8);
        row.set("id", entity.id.clone())
            .set("bom_id", entity.bom_id.clone())
            .set("product_id", entity.product_id.clone())
            .set("quantity", entity.quantity)
            .set("uom_id", entity.uom_id.clone())
            .set("position", entity.position)
            .set("note", entity.note.clone())
            .set("created_at", entity.created_at);
        row
    }

    fn from_row(row: &RowMap) -> BomItem {
        BomItem {
            id: row.text("id").unwrap_or_default(),
            bom_id: row.text("bom_id").unwrap_or_default(),
            product_id: row.text("product_id").unwrap_or_default(),
            quantity: row.double("quantity").unwrap_or_default(),
            uom_id: row.text("uom_id").unwrap_or_default(),
            position: row.int("position").unwrap_or(1),
            note: row.text("note"),
            created_at: row.timestamp("created_at").unwrap_or(DateTime::UNIX_EPOCH),
        }
    }
}

/// Repository over the `bom_items` table.
pub type BomItemRepository = Repository<BomItemMapper>;

// =============================================================================
// Production Line
// =============================================================================

/// Maps [`ProductionLine`] to and from the `production_lines` table.
pub struct ProductionLineMapper;

impl EntityMapper for ProductionLineMapper {
    type Entity = ProductionLine;

    const TABLE: &'static str = "production_lines";
    const ENTITY_NAME: &'static str = "Production line";

    fn to_row(entity: &ProductionLine) -> RowMap {
        let mut row = RowMap::with_capacity(12);
        row.set("id", entity.id.clone())
            .set("line_code", entity.line_code.clone())
            .set("name", entity.name.clone())
            .set("location_id", entity.location_id.clone())
            .set("hourly_capacity", entity.hourly_capacity)
            .set_json("capabilities_json", &entity.capabilities)
            .set("status", entity.status.as_i64())
            .set_json("metadata_json", &entity.metadata)
            .set("created_at", entity.created_at)
            .set("created_by", entity.created_by.clone())
            .set("updated_at", entity.updated_at)
            .set("updated_by", entity.updated_by.clone());
        row
    }

    fn from_row(row: &RowMap) -> ProductionLine {
        ProductionLine {
            id: row.text("id").unwrap_or_default(),
            line_code: row.text("line_code").unwrap_or_default(),
            name: row.text("name").unwrap_or_default(),
            location_id: row.text("location_id"),
            hourly_capacity: row.double("hourly_capacity").unwrap_or_default(),
            capabilities: row.json_as("capabilities_json").unwrap_or_default(),
            status: row
                .int("status")
                .and_then(EntityStatus::from_i64)
                .unwrap_or_default(),
            metadata: row.json_as("metadata_json").unwrap_or_default(),
            created_at: row.timestamp("created_at").unwrap_or(DateTime::UNIX_EPOCH),
            created_by: row.text("created_by"),
            updated_at: row.timestamp("updated_at").unwrap_or(DateTime::UNIX_EPOCH),
            updated_by: row.text("updated_by"),
        }
    }
}

/// Repository over the `production_lines` table.
pub type ProductionLineRepository = Repository<ProductionLineMapper>;

// =============================================================================
// Production Order
// =============================================================================

/// Maps [`ProductionOrder`] to and from the `production_orders` table.
pub struct ProductionOrderMapper;

impl EntityMapper for ProductionOrderMapper {
    type Entity = ProductionOrder;

    const TABLE: &'static str = "production_orders";
    const ENTITY_NAME: &'static str = "Production order";

    fn to_row(entity: &ProductionOrder) -> RowMap {
        let mut row = RowMap::with_capacity(17);
        row.set("id", entity.id.clone())
            .set("order_number", entity.order_number.clone())
            .set("product_id", entity.product_id.clone())
            .set("bom_id", entity.bom_id.clone())
            .set("line_id", entity.line_id.clone())
            .set("quantity_planned", entity.quantity_planned)
            .set("quantity_produced", entity.quantity_produced)
            .set("planned_start", entity.planned_start)
            .set("planned_end", entity.planned_end)
            .set("actual_start", entity.actual_start)
            .set("actual_end", entity.actual_end)
            .set("status", entity.status.as_i64())
            .set_json("metadata_json", &entity.metadata)
            .set("created_at", entity.created_at)
            .set("created_by", entity.created_by.clone())
            .set("updated_at", entity.updated_at)
            .set("updated_by", entity.updated_by.clone());
        row
    }

    fn from_row(row: &RowMap) -> ProductionOrder {
        ProductionOrder {
            id: row.text("id").unwrap_or_default(),
            order_number: row.text("order_number").unwrap_or_default(),
            product_id: row.text("product_id").unwrap_or_default(),
            bom_id: row.text("bom_id").unwrap_or_default(),
            line_id: row.text("line_id").unwrap_or_default(),
            quantity_planned: row.double("quantity_planned").unwrap_or_default(),
            quantity_produced: row.double("quantity_produced").unwrap_or_default(),
            planned_start: row.timestamp("planned_start"),
            planned_end: row.timestamp("planned_end"),
            actual_start: row.timestamp("actual_start"),
            actual_end: row.timestamp("actual_end"),
            status: row
                .int("status")
                .and_then(EntityStatus::from_i64)
                .unwrap_or_default(),
            metadata: row.json_as("metadata_json").unwrap_or_default(),
            created_at: row.timestamp("created_at").unwrap_or(DateTime::UNIX_EPOCH),
            created_by: row.text("created_by"),
            updated_at: row.timestamp("updated_at").unwrap_or(DateTime::UNIX_EPOCH),
            updated_by: row.text("updated_by"),
        }
    }
}

/// Repository over the `production_orders` table.
pub type ProductionOrderRepository = Repository<ProductionOrderMapper>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use forge_core::Metadata;

    #[test]
    fn test_line_capabilities_survive_the_row() {
        let now = Utc::now();
        let line = ProductionLine {
            id: "l-1".into(),
            line_code: "LINE-A".into(),
            name: "Line A".into(),
            location_id: None,
            hourly_capacity: 120.0,
            capabilities: vec!["welding".into(), "packaging".into()],
            status: EntityStatus::Active,
            metadata: Metadata::new(),
            created_at: now,
            created_by: None,
            updated_at: now,
            updated_by: None,
        };

        let row = ProductionLineMapper::to_row(&line);
        assert_eq!(
            row.text("capabilities_json").as_deref(),
            Some(r#"["welding","packaging"]"#)
        );

        let back = ProductionLineMapper::from_row(&row);
        assert_eq!(back.capabilities, vec!["welding", "packaging"]);
        assert_eq!(back.hourly_capacity, 120.0);
    }

    #[test]
    fn test_order_execution_window_round_trip() {
        let now = Utc::now();
        let order = ProductionOrder {
            id: "o-1".into(),
            order_number: "PO-0001".into(),
            product_id: "p-1".into(),
            bom_id: "b-1".into(),
            line_id: "l-1".into(),
            quantity_planned: 500.0,
            quantity_produced: 120.5,
            planned_start: Some(now),
            planned_end: None,
            actual_start: Some(now),
            actual_end: None,
            status: EntityStatus::Active,
            metadata: Metadata::new(),
            created_at: now,
            created_by: None,
            updated_at: now,
            updated_by: None,
        };

        let back = ProductionOrderMapper::from_row(&ProductionOrderMapper::to_row(&order));
        assert_eq!(back.quantity_produced, 120.5);
        assert_eq!(back.planned_start, Some(now));
        assert_eq!(back.planned_end, None);
        assert_eq!(back.actual_end, None);
        assert_eq!(back.remaining_quantity(), 379.5);
    }

    #[test]
    fn test_bom_items_list_in_position_order() {
        assert_eq!(BomItemMapper::ORDER_BY, "position");

        let item = BomItem {
            id: "i-1".into(),
            bom_id: "b-1".into(),
            product_id: "p-2".into(),
            quantity: 4.0,
            uom_id: "uom-pcs".into(),
            position: 2,
            note: None,
            created_at: Utc::now(),
        };
        let back = BomItemMapper::from_row(&BomItemMapper::to_row(&item));
        assert_eq!(back.position, 2);
        assert_eq!(back.quantity, 4.0);
    }
}
