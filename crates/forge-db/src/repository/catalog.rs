//! # Catalog Mappers
//!
//! Column mappings for the reference tables: `locations`,
//! `units_of_measure`, `products`.

use chrono::DateTime;
use forge_core::{EntityStatus, Location, Product, UnitOfMeasure};

use crate::repository::{EntityMapper, Repository};
use crate::value::RowMap;

// =============================================================================
// Location
// =============================================================================

/// Maps [`Location`] to and from the `locations` table.
pub struct LocationMapper;

impl EntityMapper for LocationMapper {
    type Entity = Location;

    const TABLE: &'static str = "locations";
    const ENTITY_NAME: &'static str = "Location";

    fn to_row(entity: &Location) -> RowMap {
        let mut row = RowMap::with_capacity(11);
        row.set("id", entity.id.clone())
            .set("location_code", entity.location_code.clone())
            .set("name", entity.name.clone())
            .set("parent_id", entity.parent_id.clone())
            .set("description", entity.description.clone())
            .set("status", entity.status.as_i64())
            .set_json("metadata_json", &entity.metadata)
            .set("created_at", entity.created_at)
            .set("created_by", entity.created_by.clone())
            .set("updated_at", entity.updated_at)
            .set("updated_by", entity.updated_by.clone());
        row
    }

    fn from_row(row: &RowMap) -> Location {
        Location {
            id: row.text("id").unwrap_or_default(),
            location_code: row.text("location_code").unwrap_or_default(),
            name: row.text("name").unwrap_or_default(),
            parent_id: row.text("parent_id"),
            description: row.text("description"),
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

/// Repository over the `locations` table.
pub type LocationRepository = Repository<LocationMapper>;

// =============================================================================
// Unit of Measure
// =============================================================================

/// Maps [`UnitOfMeasure`] to and from the `units_of_measure` table.
pub struct UnitOfMeasureMapper;

impl EntityMapper for UnitOfMeasureMapper {
    type Entity = UnitOfMeasure;

    const TABLE: &'static str = "units_of_measure";
    const ENTITY_NAME: &'static str = "Unit of measure";

    fn to_row(entity: &UnitOfMeasure) -> RowMap {
        let mut row = RowMap::with_capacity(10);
        row.set("id", entity.id.clone())
            .set("uom_code", entity.uom_code.clone())
            .set("name", entity.name.clone())
            .set("symbol", entity.symbol.clone())
            .set("status", entity.status.as_i64())
            .set_json("metadata_json", &entity.metadata)
            .set("created_at", entity.created_at)
            .set("created_by", entity.created_by.clone())
            .set("updated_at", entity.updated_at)
            .set("updated_by", entity.updated_by.clone());
        row
    }

    fn from_row(row: &RowMap) -> UnitOfMeasure {
        UnitOfMeasure {
            id: row.text("id").unwrap_or_default(),
            uom_code: row.text("uom_code").unwrap_or_default(),
            name: row.text("name").unwrap_or_default(),
            symbol: row.text("symbol").unwrap_or_default(),
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

/// Repository over the `units_of_measure` table.
pub type UnitOfMeasureRepository = Repository<UnitOfMeasureMapper>;

// =============================================================================
// Product
// =============================================================================

/// Maps [`Product`] to and from the `products` table.
pub struct ProductMapper;

impl EntityMapper for ProductMapper {
    type Entity = Product;

    const TABLE: &'static str = "products";
    const ENTITY_NAME: &'static str = "Product";

    fn to_row(entity: &Product) -> RowMap {
        let mut row = RowMap::with_capacity(11);
        row.set("id", entity.id.clone())
            .set("product_code", entity.product_code.clone())
            .set("name", entity.name.clone())
            .set("description", entity.description.clone())
            .set("uom_id", entity.uom_id.clone())
            .set("status", entity.status.as_i64())
            .set_json("metadata_json", &entity.metadata)
            .set("created_at", entity.created_at)
            .set("created_by", entity.created_by.clone())
            .set("updated_at", entity.updated_at)
            .set("updated_by", entity.updated_by.clone());
        row
    }

    fn from_row(row: &RowMap) -> Product {
        Product {
            id: row.text("id").unwrap_or_default(),
            product_code: row.text("product_code").unwrap_or_default(),
            name: row.text("name").unwrap_or_default(),
            description: row.text("description"),
            uom_id: row.text("uom_id").unwrap_or_default(),
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

/// Repository over the `products` table.
pub type ProductRepository = Repository<ProductMapper>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use forge_core::Metadata;

    #[test]
    fn test_location_row_round_trip() {
        let now = Utc::now();
        let location = Location {
            id: "loc-2".into(),
            location_code: "HALL-B".into(),
            name: "Hall B".into(),
            parent_id: Some("loc-1".into()),
            description: None,
            status: EntityStatus::Active,
            metadata: Metadata::new(),
            created_at: now,
            created_by: None,
            updated_at: now,
            updated_by: None,
        };

        let back = LocationMapper::from_row(&LocationMapper::to_row(&location));
        assert_eq!(back.location_code, "HALL-B");
        assert_eq!(back.parent_id.as_deref(), Some("loc-1"));
        assert_eq!(back.description, None);
    }

    #[test]
    fn test_product_row_keeps_unit_reference() {
        let now = Utc::now();
        let product = Product {
            id: "p-1".into(),
            product_code: "WIDGET-01".into(),
            name: "Widget".into(),
            description: Some("Standard widget".into()),
            uom_id: "uom-pcs".into(),
            status: EntityStatus::Active,
            metadata: Metadata::new(),
            created_at: now,
            created_by: None,
            updated_at: now,
            updated_by: None,
        };

        let row = ProductMapper::to_row(&product);
        assert_eq!(row.text("uom_id").as_deref(), Some("uom-pcs"));

        let back = ProductMapper::from_row(&row);
        assert_eq!(back.uom_id, "uom-pcs");
        assert_eq!(back.description.as_deref(), Some("Standard widget"));
    }
}
