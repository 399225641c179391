//! # Maintenance Service
//!
//! Maintenance requests against assets, each with a journal of work
//! activities.
//!
//! ## Request Lifecycle
//! ```text
//! create ──► Active (open) ──add_activity──► (journal grows)
//!               │
//!               ├─ complete_request ──► Inactive, completed_at set
//!               └─ update_request_status ──► Inactive / Deleted
//! ```
//!
//! A request targets an asset that merely has to exist; broken
//! machines are routinely Inactive, and that is exactly when the
//! maintenance crew shows up. Once completed, a request is frozen:
//! no further edits, no further activities.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use forge_core::validation::{validate_code, validate_name, validate_non_negative, validate_text};
use forge_core::{
    AuditAction, AuditSeverity, EntityStatus, MaintenanceActivity, MaintenancePriority,
    MaintenanceRequest, Metadata, ServiceError, ServiceResult,
};
use forge_db::{Database, Filter};

use crate::audit::{AuditEvent, AuditLogger};
use crate::authz::{permission, require, Authorizer};
use crate::catalog::status_change_severity;
use crate::context::{new_entity_id, Actor};
use crate::events::{DomainEvent, EventBus};
use crate::lookup::{AssetLookup, UserLookup};
use crate::transaction::TransactionRunner;

const MODULE: &str = "maintenance";

/// Fields a caller supplies to create or update a maintenance request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceRequestInput {
    pub request_code: String,
    pub asset_id: String,
    pub title: String,
    pub description: Option<String>,
    pub priority: MaintenancePriority,
    pub scheduled_for: Option<chrono::DateTime<Utc>>,
    #[serde(default)]
    pub metadata: Metadata,
}

/// One unit of work performed against a request.
///
/// `performed_at` defaults to now when omitted; back-dating an entry
/// is allowed for work logged after the fact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceActivityInput {
    pub description: String,
    pub performed_by: Option<String>,
    pub performed_at: Option<chrono::DateTime<Utc>>,
    pub hours_spent: f64,
    pub note: Option<String>,
}

/// Maintenance requests and their activity journals.
#[derive(Clone)]
pub struct MaintenanceService {
    db: Database,
    tx: TransactionRunner,
    authorizer: Arc<dyn Authorizer>,
    audit: AuditLogger,
    events: EventBus,
    assets: AssetLookup,
    users: UserLookup,
}

impl MaintenanceService {
    pub fn new(db: Database, authorizer: Arc<dyn Authorizer>, events: EventBus) -> Self {
        MaintenanceService {
            tx: TransactionRunner::new(db.clone()),
            audit: AuditLogger::new(db.clone()),
            assets: AssetLookup::new(),
            users: UserLookup::new(),
            db,
            authorizer,
            events,
        }
    }

    // ===== Requests =====

    /// Opens a maintenance request against an asset.
    pub async fn create_request(
        &self,
        actor: &Actor,
        input: MaintenanceRequestInput,
    ) -> ServiceResult<MaintenanceRequest> {
        require(
            self.authorizer.as_ref(),
            actor,
            permission::MAINTENANCE_CREATE,
        )
        .await?;

        validate_code(&input.request_code, "request_code")?;
        validate_name(&input.title, "title")?;
        if let Some(description) = &input.description {
            validate_text(description, "description")?;
        }

        let repo = self.db.maintenance_requests();
        let assets = self.assets;
        let created_by = actor.user_id.clone();

        let request = self
            .tx
            .run("create_maintenance_request", move |conn| {
                Box::pin(async move {
                    let code = input.request_code.trim();
                    if repo
                        .find_one(&mut *conn, &Filter::new().eq("request_code", code))
                        .await?
                        .is_some()
                    {
                        return Err(ServiceError::duplicate("request_code", code));
                    }

                    // The asset has to exist, not be active. Repairs
                    // target parked machines all the time.
                    assets.ensure_exists(&mut *conn, &input.asset_id).await?;

                    let now = Utc::now();
                    let request = MaintenanceRequest {
                        id: new_entity_id(),
                        request_code: code.to_string(),
                        asset_id: input.asset_id.clone(),
                        title: input.title.trim().to_string(),
                        description: input.description.clone(),
                        priority: input.priority,
                        reported_at: now,
                        scheduled_for: input.scheduled_for,
                        completed_at: None,
                        status: EntityStatus::Active,
                        metadata: input.metadata.clone(),
                        created_at: now,
                        created_by: Some(created_by.clone()),
                        updated_at: now,
                        updated_by: Some(created_by),
                    };
                    repo.insert(&mut *conn, &request).await?;
                    Ok(request)
                })
            })
            .await?;

        self.audit
            .record(
                actor,
                AuditEvent::new(AuditAction::Create, MODULE, "MaintenanceRequest")
                    .severity(request_severity(request.priority))
                    .entity(&request.id, &request.title)
                    .after(&request),
            )
            .await;
        self.events.publish(DomainEvent::new(
            "MaintenanceRequest",
            &request.id,
            AuditAction::Create,
        ));

        info!(
            "Opened maintenance request: {} ({})",
            request.title, request.id
        );
        Ok(request)
    }

    pub async fn get_request_by_id(
        &self,
        actor: &Actor,
        id: &str,
    ) -> ServiceResult<MaintenanceRequest> {
        debug!(user_id = %actor.user_id, id, "Fetching maintenance request");
        self.db
            .maintenance_requests()
            .find_by_id(self.db.pool(), id)
            .await?
            .filter(|request| request.status != EntityStatus::Deleted)
            .ok_or_else(|| ServiceError::not_found("Maintenance request", id))
    }

    pub async fn get_request_by_code(
        &self,
        actor: &Actor,
        code: &str,
    ) -> ServiceResult<MaintenanceRequest> {
        debug!(user_id = %actor.user_id, code, "Fetching maintenance request by code");
        self.db
            .maintenance_requests()
            .find_one(self.db.pool(), &Filter::new().eq("request_code", code))
            .await?
            .filter(|request| request.status != EntityStatus::Deleted)
            .ok_or_else(|| ServiceError::not_found("Maintenance request", code))
    }

    pub async fn list_requests(
        &self,
        actor: &Actor,
        filter: &Filter,
    ) -> ServiceResult<Vec<MaintenanceRequest>> {
        debug!(user_id = %actor.user_id, conditions = filter.len(), "Listing maintenance requests");
        let requests = self
            .db
            .maintenance_requests()
            .find(self.db.pool(), filter)
            .await?;
        Ok(requests
            .into_iter()
            .filter(|request| request.status != EntityStatus::Deleted)
            .collect())
    }

    /// Updates a request. Completed requests are frozen.
    pub async fn update_request(
        &self,
        actor: &Actor,
        id: &str,
        input: MaintenanceRequestInput,
    ) -> ServiceResult<MaintenanceRequest> {
        require(
            self.authorizer.as_ref(),
            actor,
            permission::MAINTENANCE_UPDATE,
        )
        .await?;

        validate_code(&input.request_code, "request_code")?;
        validate_name(&input.title, "title")?;
        if let Some(description) = &input.description {
            validate_text(description, "description")?;
        }

        let repo = self.db.maintenance_requests();
        let assets = self.assets;
        let id = id.to_string();
        let updated_by = actor.user_id.clone();

        let (before, after) = self
            .tx
            .run("update_maintenance_request", move |conn| {
                Box::pin(async move {
                    let before = repo
                        .find_by_id(&mut *conn, &id)
                        .await?
                        .filter(|request| request.status != EntityStatus::Deleted)
                        .ok_or_else(|| ServiceError::not_found("Maintenance request", &id))?;
                    if before.completed_at.is_some() {
                        return Err(ServiceError::operation_failed(
                            "Request is already completed",
                        ));
                    }

                    let code = input.request_code.trim();
                    if let Some(taken) = repo
                        .find_one(&mut *conn, &Filter::new().eq("request_code", code))
                        .await?
                    {
                        if taken.id != before.id {
                            return Err(ServiceError::duplicate("request_code", code));
                        }
                    }

                    assets.ensure_exists(&mut *conn, &input.asset_id).await?;

                    let mut request = before.clone();
                    request.request_code = code.to_string();
                    request.asset_id = input.asset_id.clone();
                    request.title = input.title.trim().to_string();
                    request.description = input.description.clone();
                    request.priority = input.priority;
                    request.scheduled_for = input.scheduled_for;
                    request.metadata = input.metadata.clone();
                    request.updated_at = Utc::now();
                    request.updated_by = Some(updated_by);
                    repo.update(&mut *conn, &request).await?;

                    Ok((before, request))
                })
            })
            .await?;

        self.audit
            .record(
                actor,
                AuditEvent::new(AuditAction::Update, MODULE, "MaintenanceRequest")
                    .entity(&after.id, &after.title)
                    .before(&before)
                    .after(&after),
            )
            .await;
        self.events.publish(DomainEvent::new(
            "MaintenanceRequest",
            &after.id,
            AuditAction::Update,
        ));

        Ok(after)
    }

    pub async fn update_request_status(
        &self,
        actor: &Actor,
        id: &str,
        next: EntityStatus,
    ) -> ServiceResult<MaintenanceRequest> {
        require(
            self.authorizer.as_ref(),
            actor,
            permission::MAINTENANCE_UPDATE,
        )
        .await?;

        let repo = self.db.maintenance_requests();
        let id = id.to_string();
        let updated_by = actor.user_id.clone();

        let (before, after) = self
            .tx
            .run("update_maintenance_request_status", move |conn| {
                Box::pin(async move {
                    let before = repo
                        .find_by_id(&mut *conn, &id)
                        .await?
                        .filter(|request| request.status != EntityStatus::Deleted)
                        .ok_or_else(|| ServiceError::not_found("Maintenance request", &id))?;
                    if !before.status.can_transition_to(next) {
                        return Err(ServiceError::operation_failed(format!(
                            "Cannot change status from {} to {}",
                            before.status.label(),
                            next.label()
                        )));
                    }

                    let mut request = before.clone();
                    request.status = next;
                    request.updated_at = Utc::now();
                    request.updated_by = Some(updated_by);
                    repo.update(&mut *conn, &request).await?;
                    Ok((before, request))
                })
            })
            .await?;

        self.audit
            .record(
                actor,
                AuditEvent::new(AuditAction::StatusChange, MODULE, "MaintenanceRequest")
                    .severity(status_change_severity(next))
                    .entity(&after.id, &after.title)
                    .description(format!(
                        "{} -> {}",
                        before.status.label(),
                        after.status.label()
                    )),
            )
            .await;
        self.events.publish(DomainEvent::new(
            "MaintenanceRequest",
            &after.id,
            AuditAction::StatusChange,
        ));

        Ok(after)
    }

    /// Closes an open request: stamps the completion time and retires
    /// it to Inactive. The journal stays readable.
    pub async fn complete_request(
        &self,
        actor: &Actor,
        id: &str,
    ) -> ServiceResult<MaintenanceRequest> {
        require(
            self.authorizer.as_ref(),
            actor,
            permission::MAINTENANCE_UPDATE,
        )
        .await?;

        let repo = self.db.maintenance_requests();
        let id = id.to_string();
        let updated_by = actor.user_id.clone();

        let completed = self
            .tx
            .run("complete_maintenance_request", move |conn| {
                Box::pin(async move {
                    let before = repo
                        .find_by_id(&mut *conn, &id)
                        .await?
                        .filter(|request| request.status != EntityStatus::Deleted)
                        .ok_or_else(|| ServiceError::not_found("Maintenance request", &id))?;
                    if !before.is_open() {
                        return Err(ServiceError::operation_failed(
                            "Request is already completed",
                        ));
                    }

                    let now = Utc::now();
                    let mut request = before;
                    request.completed_at = Some(now);
                    request.status = EntityStatus::Inactive;
                    request.updated_at = now;
                    request.updated_by = Some(updated_by);
                    repo.update(&mut *conn, &request).await?;
                    Ok(request)
                })
            })
            .await?;

        self.audit
            .record(
                actor,
                AuditEvent::new(AuditAction::Update, MODULE, "MaintenanceRequest")
                    .entity(&completed.id, &completed.title)
                    .description("Completed"),
            )
            .await;
        self.events.publish(DomainEvent::new(
            "MaintenanceRequest",
            &completed.id,
            AuditAction::Update,
        ));

        info!(
            "Completed maintenance request: {} ({})",
            completed.title, completed.id
        );
        Ok(completed)
    }

    /// Physically removes a request and its journal.
    pub async fn delete_request(&self, actor: &Actor, id: &str) -> ServiceResult<()> {
        require(
            self.authorizer.as_ref(),
            actor,
            permission::MAINTENANCE_DELETE,
        )
        .await?;

        let repo = self.db.maintenance_requests();
        let activities = self.db.maintenance_activities();
        let id = id.to_string();

        let deleted = self
            .tx
            .run("delete_maintenance_request", move |conn| {
                Box::pin(async move {
                    let request = repo
                        .find_by_id(&mut *conn, &id)
                        .await?
                        .ok_or_else(|| ServiceError::not_found("Maintenance request", &id))?;

                    // Journal entries go with their request.
                    activities
                        .delete_where(&mut *conn, &Filter::new().eq("request_id", id.as_str()))
                        .await?;
                    repo.delete(&mut *conn, &request.id).await?;
                    Ok(request)
                })
            })
            .await?;

        self.audit
            .record(
                actor,
                AuditEvent::new(AuditAction::Delete, MODULE, "MaintenanceRequest")
                    .severity(AuditSeverity::Critical)
                    .entity(&deleted.id, &deleted.title)
                    .before(&deleted),
            )
            .await;
        self.events.publish(DomainEvent::new(
            "MaintenanceRequest",
            &deleted.id,
            AuditAction::Delete,
        ));

        info!(
            "Deleted maintenance request: {} ({})",
            deleted.title, deleted.id
        );
        Ok(())
    }

    // ===== Activities =====

    /// Appends a journal entry to an open request.
    pub async fn add_activity(
        &self,
        actor: &Actor,
        request_id: &str,
        input: MaintenanceActivityInput,
    ) -> ServiceResult<MaintenanceActivity> {
        require(
            self.authorizer.as_ref(),
            actor,
            permission::MAINTENANCE_UPDATE,
        )
        .await?;

        validate_name(&input.description, "description")?;
        validate_non_negative(input.hours_spent, "hours_spent")?;
        if let Some(note) = &input.note {
            validate_text(note, "note")?;
        }

        let requests = self.db.maintenance_requests();
        let activities = self.db.maintenance_activities();
        let users = self.users;
        let request_id = request_id.to_string();

        let activity = self
            .tx
            .run("add_maintenance_activity", move |conn| {
                Box::pin(async move {
                    let request = requests
                        .find_by_id(&mut *conn, &request_id)
                        .await?
                        .filter(|request| request.status != EntityStatus::Deleted)
                        .ok_or_else(|| {
                            ServiceError::not_found("Maintenance request", &request_id)
                        })?;
                    if !request.is_open() {
                        return Err(ServiceError::operation_failed(
                            "Request is already completed",
                        ));
                    }

                    if let Some(performed_by) = &input.performed_by {
                        users.ensure_exists(&mut *conn, performed_by).await?;
                    }

                    let now = Utc::now();
                    let activity = MaintenanceActivity {
                        id: new_entity_id(),
                        request_id: request.id.clone(),
                        description: input.description.trim().to_string(),
                        performed_by: input.performed_by.clone(),
                        performed_at: input.performed_at.unwrap_or(now),
                        hours_spent: input.hours_spent,
                        note: input.note.clone(),
                        created_at: now,
                    };
                    activities.insert(&mut *conn, &activity).await?;
                    Ok(activity)
                })
            })
            .await?;

        self.audit
            .record(
                actor,
                AuditEvent::new(AuditAction::Update, MODULE, "MaintenanceRequest")
                    .sub_module("activities")
                    .entity(&activity.request_id, "")
                    .after(&activity)
                    .description("Added activity"),
            )
            .await;
        self.events.publish(DomainEvent::new(
            "MaintenanceRequest",
            &activity.request_id,
            AuditAction::Update,
        ));

        Ok(activity)
    }

    /// Lists the journal of a request in the order the work happened.
    pub async fn activities_of(
        &self,
        actor: &Actor,
        request_id: &str,
    ) -> ServiceResult<Vec<MaintenanceActivity>> {
        debug!(user_id = %actor.user_id, request_id, "Listing maintenance activities");
        self.db
            .maintenance_requests()
            .find_by_id(self.db.pool(), request_id)
            .await?
            .filter(|request| request.status != EntityStatus::Deleted)
            .ok_or_else(|| ServiceError::not_found("Maintenance request", request_id))?;

        let activities = self
            .db
            .maintenance_activities()
            .find(self.db.pool(), &Filter::new().eq("request_id", request_id))
            .await?;
        Ok(activities)
    }
}

/// Urgent problems deserve a louder audit row.
fn request_severity(priority: MaintenancePriority) -> AuditSeverity {
    match priority {
        MaintenancePriority::Critical => AuditSeverity::Warning,
        _ => AuditSeverity::Info,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::AssetInput;
    use crate::testutil::test_services;
    use crate::AppServices;
    use forge_core::{Asset, ErrorCode};

    async fn asset_fixture(services: &AppServices) -> Asset {
        services
            .assets
            .create_asset(
                &Actor::system(),
                AssetInput {
                    asset_code: "press-01".to_string(),
                    name: "Press 01".to_string(),
                    serial_number: None,
                    asset_type: Some("press".to_string()),
                    location_id: None,
                    metadata: Metadata::new(),
                },
            )
            .await
            .unwrap()
    }

    fn request_input(code: &str, asset_id: &str) -> MaintenanceRequestInput {
        MaintenanceRequestInput {
            request_code: code.to_string(),
            asset_id: asset_id.to_string(),
            title: format!("Request {}", code),
            description: None,
            priority: MaintenancePriority::Medium,
            scheduled_for: None,
            metadata: Metadata::new(),
        }
    }

    #[tokio::test]
    async fn test_request_opens_against_inactive_asset() {
        let services = test_services().await;
        let actor = Actor::system();
        let asset = asset_fixture(&services).await;

        services
            .assets
            .update_asset_status(&actor, &asset.id, EntityStatus::Inactive)
            .await
            .unwrap();

        let request = services
            .maintenance
            .create_request(&actor, request_input("mr-1", &asset.id))
            .await
            .unwrap();
        assert!(request.is_open());
        assert!(request.completed_at.is_none());
    }

    #[tokio::test]
    async fn test_activity_journal_grows_and_lists_in_order() {
        let services = test_services().await;
        let actor = Actor::system();
        let asset = asset_fixture(&services).await;

        let request = services
            .maintenance
            .create_request(&actor, request_input("mr-1", &asset.id))
            .await
            .unwrap();

        let earlier = Utc::now() - chrono::Duration::hours(3);
        services
            .maintenance
            .add_activity(
                &actor,
                &request.id,
                MaintenanceActivityInput {
                    description: "Inspected the gearbox".to_string(),
                    performed_by: None,
                    performed_at: Some(earlier),
                    hours_spent: 1.5,
                    note: None,
                },
            )
            .await
            .unwrap();
        services
            .maintenance
            .add_activity(
                &actor,
                &request.id,
                MaintenanceActivityInput {
                    description: "Replaced the seal".to_string(),
                    performed_by: None,
                    performed_at: None,
                    hours_spent: 0.5,
                    note: Some("Seal was worn through".to_string()),
                },
            )
            .await
            .unwrap();

        let journal = services
            .maintenance
            .activities_of(&actor, &request.id)
            .await
            .unwrap();
        assert_eq!(journal.len(), 2);
        assert_eq!(journal[0].description, "Inspected the gearbox");
        assert_eq!(journal[1].description, "Replaced the seal");
    }

    #[tokio::test]
    async fn test_completed_request_is_frozen() {
        let services = test_services().await;
        let actor = Actor::system();
        let asset = asset_fixture(&services).await;

        let request = services
            .maintenance
            .create_request(&actor, request_input("mr-1", &asset.id))
            .await
            .unwrap();

        let completed = services
            .maintenance
            .complete_request(&actor, &request.id)
            .await
            .unwrap();
        assert!(completed.completed_at.is_some());
        assert_eq!(completed.status, EntityStatus::Inactive);

        let err = services
            .maintenance
            .complete_request(&actor, &request.id)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::OperationFailed);

        let err = services
            .maintenance
            .add_activity(
                &actor,
                &request.id,
                MaintenanceActivityInput {
                    description: "Late entry".to_string(),
                    performed_by: None,
                    performed_at: None,
                    hours_spent: 1.0,
                    note: None,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::OperationFailed);

        let err = services
            .maintenance
            .update_request(&actor, &request.id, request_input("mr-1", &asset.id))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::OperationFailed);
    }

    #[tokio::test]
    async fn test_open_request_blocks_asset_delete() {
        let services = test_services().await;
        let actor = Actor::system();
        let asset = asset_fixture(&services).await;

        let request = services
            .maintenance
            .create_request(&actor, request_input("mr-1", &asset.id))
            .await
            .unwrap();

        let err = services
            .assets
            .delete_asset(&actor, &asset.id)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::OperationFailed);

        // Closing the request clears the path.
        services
            .maintenance
            .complete_request(&actor, &request.id)
            .await
            .unwrap();
        services.assets.delete_asset(&actor, &asset.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_request_removes_journal() {
        let services = test_services().await;
        let actor = Actor::system();
        let asset = asset_fixture(&services).await;

        let request = services
            .maintenance
            .create_request(&actor, request_input("mr-1", &asset.id))
            .await
            .unwrap();
        services
            .maintenance
            .add_activity(
                &actor,
                &request.id,
                MaintenanceActivityInput {
                    description: "Checked belts".to_string(),
                    performed_by: None,
                    performed_at: None,
                    hours_spent: 0.25,
                    note: None,
                },
            )
            .await
            .unwrap();

        services
            .maintenance
            .delete_request(&actor, &request.id)
            .await
            .unwrap();

        let orphans = services
            .db
            .maintenance_activities()
            .count(
                services.db.pool(),
                &Filter::new().eq("request_id", request.id.as_str()),
            )
            .await
            .unwrap();
        assert_eq!(orphans, 0);
    }

    #[tokio::test]
    async fn test_unknown_performer_rejected() {
        let services = test_services().await;
        let actor = Actor::system();
        let asset = asset_fixture(&services).await;

        let request = services
            .maintenance
            .create_request(&actor, request_input("mr-1", &asset.id))
            .await
            .unwrap();

        let err = services
            .maintenance
            .add_activity(
                &actor,
                &request.id,
                MaintenanceActivityInput {
                    description: "Ghost work".to_string(),
                    performed_by: Some("no-such-user".to_string()),
                    performed_at: None,
                    hours_spent: 1.0,
                    note: None,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
    }
}
