//! # Maintenance Mappers
//!
//! Column mappings for `maintenance_requests` and
//! `maintenance_activities`.

use chrono::DateTime;
use forge_core::{EntityStatus, MaintenanceActivity, MaintenancePriority, MaintenanceRequest};

use crate::repository::{EntityMapper, Repository};
use crate::value::RowMap;

// =============================================================================
// Maintenance Request
// =============================================================================

/// Maps [`MaintenanceRequest`] to and from the `maintenance_requests`
/// table.
pub struct MaintenanceRequestMapper;

impl EntityMapper for MaintenanceRequestMapper {
    type Entity = MaintenanceRequest;

    const TABLE: &'static str = "maintenance_requests";
    const ENTITY_NAME: &'static str = "Maintenance request";

    fn to_row(entity: &MaintenanceRequest) -> RowMap {
        let mut row = RowMap::with_capacity(15);
        row.set("id", entity.id.clone())
            .set("request_code", entity.request_code.clone())
            .set("asset_id", entity.asset_id.clone())
            .set("title", entity.title.clone())
            .set("description", entity.description.clone())
            .set("priority", entity.priority.as_i64())
            .set("reported_at", entity.reported_at)
            .set("scheduled_for", entity.scheduled_for)
            .set("completed_at", entity.completed_at)
            .set("status", entity.status.as_i64())
            .set_json("metadata_json", &entity.metadata)
            .set("created_at", entity.created_at)
            .set("created_by", entity.created_by.clone())
            .set("updated_at", entity.updated_at)
            .set("updated_by", entity.updated_by.clone());
        row
    }

    fn from_row(row: &RowMap) -> MaintenanceRequest {
        MaintenanceRequest {
            id: row.text("id").unwrap_or_default(),
            request_code: row.text("request_code").unwrap_or_default(),
            asset_id: row.text("asset_id").unwrap_or_default(),
            title: row.text("title").unwrap_or_default(),
            description: row.text("description"),
            priority: row
                .int("priority")
                .and_then(MaintenancePriority::from_i64)
                .unwrap_or_default(),
            reported_at: row.timestamp("reported_at").unwrap_or(DateTime::UNIX_EPOCH),
            scheduled_for: row.timestamp("scheduled_for"),
            completed_at: row.timestamp("completed_at"),
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

/// Repository over the `maintenance_requests` table.
pub type MaintenanceRequestRepository = Repository<MaintenanceRequestMapper>;

// =============================================================================
// Maintenance Activity
// =============================================================================

/// Maps [`MaintenanceActivity`] to and from the
/// `maintenance_activities` table. Activities list in the order the
/// work was performed.
pub struct MaintenanceActivityMapper;

impl EntityMapper for MaintenanceActivityMapper {
    type Entity = MaintenanceActivity;

    const TABLE: &'static str = "maintenance_activities";
    const ENTITY_NAME: &'static str = "Maintenance activity";
    const ORDER_BY: &'static str = "performed_at";

    fn to_row(entity: &MaintenanceActivity) -> RowMap {
        let mut row = RowMap::with_capacity(8);
        row.set("id", entity.id.clone())
            .set("request_id", entity.request_id.clone())
            .set("description", entity.description.clone())
            .set("performed_by", entity.performed_by.clone())
            .set("performed_at", entity.performed_at)
            .set("hours_spent", entity.hours_spent)
            .set("note", entity.note.clone())
            .set("created_at", entity.created_at);
        row
    }

    fn from_row(row: &RowMap) -> MaintenanceActivity {
        MaintenanceActivity {
            id: row.text("id").unwrap_or_default(),
            request_id: row.text("request_id").unwrap_or_default(),
            description: row.text("description").unwrap_or_default(),
            performed_by: row.text("performed_by"),
            performed_at: row
                .timestamp("performed_at")
                .unwrap_or(DateTime::UNIX_EPOCH),
            hours_spent: row.double("hours_spent").unwrap_or_default(),
            note: row.text("note"),
            created_at: row.timestamp("created_at").unwrap_or(DateTime::UNIX_EPOCH),
        }
    }
}

/// Repository over the `maintenance_activities` table.
pub type MaintenanceActivityRepository = Repository<MaintenanceActivityMapper>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use forge_core::Metadata;

    #[test]
    fn test_request_priority_and_completion_round_trip() {
        let now = Utc::now();
        let request = MaintenanceRequest {
            id: "m-1".into(),
            request_code: "MR-0001".into(),
            asset_id: "a-1".into(),
            title: "Bearing noise".into(),
            description: Some("Grinding at high load".into()),
            priority: MaintenancePriority::Critical,
            reported_at: now,
            scheduled_for: Some(now),
            completed_at: None,
            status: EntityStatus::Active,
            metadata: Metadata::new(),
            created_at: now,
            created_by: None,
            updated_at: now,
            updated_by: None,
        };

        let row = MaintenanceRequestMapper::to_row(&request);
        assert_eq!(row.int("priority"), Some(4));

        let back = MaintenanceRequestMapper::from_row(&row);
        assert_eq!(back.priority, MaintenancePriority::Critical);
        assert_eq!(back.scheduled_for, Some(now));
        assert_eq!(back.completed_at, None);
        assert!(back.is_open());
    }

    #[test]
    fn test_unknown_priority_degrades_to_default() {
        let mut row = RowMap::new();
        row.set("id", "m-1").set("priority", 99i64);

        let back = MaintenanceRequestMapper::from_row(&row);
        assert_eq!(back.priority, MaintenancePriority::Medium);
    }

    #[test]
    fn test_activity_round_trip() {
        let now = Utc::now();
        let activity = MaintenanceActivity {
            id: "act-1".into(),
            request_id: "m-1".into(),
            description: "Replaced bearing".into(),
            performed_by: Some("u-7".into()),
            performed_at: now,
            hours_spent: 2.5,
            note: None,
            created_at: now,
        };

        let back = MaintenanceActivityMapper::from_row(&MaintenanceActivityMapper::to_row(&activity));
        assert_eq!(back.description, "Replaced bearing");
        assert_eq!(back.hours_spent, 2.5);
        assert_eq!(back.performed_by.as_deref(), Some("u-7"));
    }
}
