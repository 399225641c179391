//! # Audit Trail
//!
//! Best-effort audit writes, decoupled from the business transaction.
//!
//! ## Ordering
//! ```text
//! business transaction ──commit──► AuditLogger::record ──► audit_logs row
//!                                        │
//!                                  failure? log a warning, keep going
//! ```
//!
//! The committed mutation is the source of truth; a lost audit row is a
//! logged degradation, never a reason to undo or fail the operation.

use chrono::Utc;
use serde::Serialize;
use tracing::warn;

use forge_core::{AuditAction, AuditRecord, AuditSeverity};
use forge_db::Database;

use crate::context::{new_entity_id, Actor};

/// What to record, assembled by the service before the write.
///
/// Built with the struct's chained setters; only action, module and
/// entity type are mandatory.
#[derive(Debug, Clone)]
pub struct AuditEvent {
    action: AuditAction,
    severity: AuditSeverity,
    module: String,
    sub_module: Option<String>,
    entity_type: String,
    entity_id: Option<String>,
    entity_name: Option<String>,
    before_state: Option<String>,
    after_state: Option<String>,
    description: Option<String>,
}

impl AuditEvent {
    pub fn new(action: AuditAction, module: &str, entity_type: &str) -> Self {
        AuditEvent {
            action,
            severity: AuditSeverity::Info,
            module: module.to_string(),
            sub_module: None,
            entity_type: entity_type.to_string(),
            entity_id: None,
            entity_name: None,
            before_state: None,
            after_state: None,
            description: None,
        }
    }

    pub fn severity(mut self, severity: AuditSeverity) -> Self {
        self.severity = severity;
        self
    }

    pub fn sub_module(mut self, sub_module: &str) -> Self {
        self.sub_module = Some(sub_module.to_string());
        self
    }

    /// Names the touched entity.
    pub fn entity(mut self, id: &str, name: &str) -> Self {
        self.entity_id = Some(id.to_string());
        self.entity_name = Some(name.to_string());
        self
    }

    /// Attaches the pre-mutation snapshot. Serialization failure drops
    /// the snapshot with a warning; the event itself still records.
    pub fn before<T: Serialize>(mut self, state: &T) -> Self {
        self.before_state = snapshot(state, "before");
        self
    }

    /// Attaches the post-mutation snapshot.
    pub fn after<T: Serialize>(mut self, state: &T) -> Self {
        self.after_state = snapshot(state, "after");
        self
    }

    pub fn description(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }
}

fn snapshot<T: Serialize>(state: &T, which: &str) -> Option<String> {
    match serde_json::to_string(state) {
        Ok(json) => Some(json),
        Err(err) => {
            warn!(which, error = %err, "Audit snapshot serialization failed");
            None
        }
    }
}

/// Writes audit rows. Cheap to clone, shared by all services.
#[derive(Debug, Clone)]
pub struct AuditLogger {
    db: Database,
}

impl AuditLogger {
    pub fn new(db: Database) -> Self {
        AuditLogger { db }
    }

    /// Records one audit row on its own pooled connection.
    ///
    /// Called after the business transaction committed. A failed insert
    /// is logged and swallowed.
    pub async fn record(&self, actor: &Actor, event: AuditEvent) {
        let record = AuditRecord {
            id: new_entity_id(),
            actor_id: actor.user_id.clone(),
            actor_name: actor.user_name.clone(),
            session_id: actor.session_id.clone(),
            action: event.action,
            severity: event.severity,
            module: event.module,
            sub_module: event.sub_module,
            entity_type: event.entity_type,
            entity_id: event.entity_id,
            entity_name: event.entity_name,
            before_state: event.before_state,
            after_state: event.after_state,
            description: event.description,
            recorded_at: Utc::now(),
        };

        if let Err(err) = self.db.audit_logs().insert(self.db.pool(), &record).await {
            warn!(
                module = %record.module,
                action = record.action.as_str(),
                error = %err,
                "Audit write failed"
            );
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
