//! # Asset Mapper
//!
//! Column mapping for the `assets` table.

use chrono::DateTime;
use forge_core::{Asset, EntityStatus};

use crate::repository::{EntityMapper, Repository};
use crate::value::RowMap;

/// Maps [`Asset`] to and from the `assets` table.
pub struct AssetMapper;

impl EntityMapper for AssetMapper {
    type Entity = Asset;

    const TABLE: &'static str = "assets";
    const ENTITY_NAME: &'static str = "Asset";

    fn to_row(entity: &Asset) -> RowMap {
        let mut row = RowMap::with_capacity(13);
        row.set("id", entity.id.clone())
            .set("asset_code", entity.asset_code.clone())
            .set("name", entity.name.clone())
            .set("serial_number", entity.serial_number.clone())
            .set("asset_type", entity.asset_type.clone())
            .set("location_id", entity.location_id.clone())
            .set("registered_at", entity.registered_at)
            .set("status", entity.status.as_i64())
            .set_json("metadata_json", &entity.metadata)
            .set("created_at", entity.created_at)
            .set("created_by", entity.created_by.clone())
            .set("updated_at", entity.updated_at)
            .set("updated_by", entity.updated_by.clone());
        row
    }

    fn from_row(row: &RowMap) -> Asset {
        Asset {
            id: row.text("id").unwrap_or_default(),
            asset_code: row.text("asset_code").unwrap_or_default(),
            name: row.text("name").unwrap_or_default(),
            serial_number: row.text("serial_number"),
            asset_type: row.text("asset_type"),
            location_id: row.text("location_id"),
            registered_at: row
                .timestamp("registered_at")
                .unwrap_or(DateTime::UNIX_EPOCH),
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

/// Repository over the `assets` table.
pub type AssetRepository = Repository<AssetMapper>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use forge_core::Metadata;

    #[test]
    fn test_asset_row_round_trip() {
        let now = Utc::now();
        let mut metadata = Metadata::new();
        metadata.insert("warranty_until".into(), serde_json::json!("2027-06-30"));

        let asset = Asset {
            id: "a-1".into(),
            asset_code: "PUMP-001".into(),
            name: "Coolant pump".into(),
            serial_number: Some("SN-991".into()),
            asset_type: None,
            location_id: Some("loc-1".into()),
            registered_at: now,
            status: EntityStatus::Pending,
            metadata,
            created_at: now,
            created_by: Some("u-1".into()),
            updated_at: now,
            updated_by: None,
        };

        let row = AssetMapper::to_row(&asset);
        assert_eq!(row.int("status"), Some(3));
        assert!(row.get("asset_type").unwrap().is_null());

        let back = AssetMapper::from_row(&row);
        assert_eq!(back.asset_code, "PUMP-001");
        assert_eq!(back.serial_number.as_deref(), Some("SN-991"));
        assert_eq!(back.asset_type, None);
        assert_eq!(back.status, EntityStatus::Pending);
        assert_eq!(
            back.metadata.get("warranty_until"),
            Some(&serde_json::json!("2027-06-30"))
        );
        assert_eq!(back.registered_at, asset.registered_at);
    }

    #[test]
    fn test_from_row_degrades_on_missing_columns() {
        let asset = AssetMapper::from_row(&RowMap::new());
        assert_eq!(asset.id, "");
        assert_eq!(asset.status, EntityStatus::Active);
        assert!(asset.metadata.is_empty());
        assert_eq!(asset.registered_at, DateTime::UNIX_EPOCH);
    }
}
