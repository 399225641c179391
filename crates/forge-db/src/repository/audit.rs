//! # Audit Mapper
//!
//! Column mapping for the `audit_logs` table. Listings read newest
//! first; the table is append-only by convention and nothing in the
//! service layer updates or deletes audit rows.

use chrono::DateTime;
use forge_core::{AuditAction, AuditRecord, AuditSeverity};

use crate::repository::{EntityMapper, Repository};
use crate::value::RowMap;

/// Maps [`AuditRecord`] to and from the `audit_logs` table.
pub struct AuditMapper;

impl EntityMapper for AuditMapper {
    type Entity = AuditRecord;

    const TABLE: &'static str = "audit_logs";
    const ENTITY_NAME: &'static str = "Audit record";
    const ORDER_BY: &'static str = "recorded_at DESC";

    fn to_row(entity: &AuditRecord) -> RowMap {
        let mut row = RowMap::with_capacity(15);
        row.set("id", entity.id.clone())
            .set("actor_id", entity.actor_id.clone())
            .set("actor_name", entity.actor_name.clone())
            .set("session_id", entity.session_id.clone())
            .set("action", entity.action.as_str())
            .set("severity", entity.severity.as_str())
            .set("module", entity.module.clone())
            .set("sub_module", entity.sub_module.clone())
            .set("entity_type", entity.entity_type.clone())
            .set("entity_id", entity.entity_id.clone())
            .set("entity_name", entity.entity_name.clone())
            .set("before_state", entity.before_state.clone())
            .set("after_state", entity.after_state.clone())
            .set("description", entity.description.clone())
            .set("recorded_at", entity.recorded_at);
        row
    }

    fn from_row(row: &RowMap) -> AuditRecord {
        AuditRecord {
            id: row.text("id").unwrap_or_default(),
            actor_id: row.text("actor_id").unwrap_or_default(),
            actor_name: row.text("actor_name").unwrap_or_default(),
            session_id: row.text("session_id"),
            action: row
                .text("action")
                .as_deref()
                .and_then(AuditAction::from_str)
                .unwrap_or(AuditAction::Update),
            severity: row
                .text("severity")
                .as_deref()
                .and_then(AuditSeverity::from_str)
                .unwrap_or(AuditSeverity::Info),
            module: row.text("module").unwrap_or_default(),
            sub_module: row.text("sub_module"),
            entity_type: row.text("entity_type").unwrap_or_default(),
            entity_id: row.text("entity_id"),
            entity_name: row.text("entity_name"),
            before_state: row.text("before_state"),
            after_state: row.text("after_state"),
            description: row.text("description"),
            recorded_at: row.timestamp("recorded_at").unwrap_or(DateTime::UNIX_EPOCH),
        }
    }
}

/// Repository over the `audit_logs` table.
pub type AuditLogRepository = Repository<AuditMapper>;
