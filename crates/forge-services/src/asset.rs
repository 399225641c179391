//! # Asset Service
//!
//! The asset register: machines, vehicles, tools. Assets anchor the
//! maintenance module, so the delete guard here checks for open
//! maintenance requests rather than blindly removing history.
//!
//! Serial numbers are unique when present; assets without one coexist
//! freely.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use forge_core::validation::{validate_code, validate_name, validate_text};
use forge_core::{
    Asset, AuditAction, AuditSeverity, EntityStatus, Metadata, ServiceError, ServiceResult,
};
use forge_db::{Database, Filter};

use crate::audit::{AuditEvent, AuditLogger};
use crate::authz::{permission, require, Authorizer};
use crate::catalog::status_change_severity;
use crate::context::{new_entity_id, Actor};
use crate::events::{DomainEvent, EventBus};
use crate::lookup::{AssetLookup, LocationLookup};
use crate::transaction::TransactionRunner;

const MODULE: &str = "assets";

/// Fields a caller supplies to create or update an asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetInput {
    pub asset_code: String,
    pub name: String,
    pub serial_number: Option<String>,
    pub asset_type: Option<String>,
    pub location_id: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

/// CRUD plus status management for the asset register.
#[derive(Clone)]
pub struct AssetService {
    db: Database,
    tx: TransactionRunner,
    authorizer: Arc<dyn Authorizer>,
    audit: AuditLogger,
    events: EventBus,
    assets: AssetLookup,
    locations: LocationLookup,
}

impl AssetService {
    pub fn new(db: Database, authorizer: Arc<dyn Authorizer>, events: EventBus) -> Self {
        AssetService {
            tx: TransactionRunner::new(db.clone()),
            audit: AuditLogger::new(db.clone()),
            assets: AssetLookup::new(),
            locations: LocationLookup::new(),
            db,
            authorizer,
            events,
        }
    }

    /// Registers a new asset. The registration timestamp is set here
    /// and never changes afterwards.
    pub async fn create_asset(&self, actor: &Actor, input: AssetInput) -> ServiceResult<Asset> {
        require(self.authorizer.as_ref(), actor, permission::ASSETS_CREATE).await?;

        validate_code(&input.asset_code, "asset_code")?;
        validate_name(&input.name, "name")?;
        if let Some(serial) = &input.serial_number {
            validate_code(serial, "serial_number")?;
        }
        if let Some(asset_type) = &input.asset_type {
            validate_text(asset_type, "asset_type")?;
        }

        let repo = self.db.assets();
        let locations = self.locations;
        let created_by = actor.user_id.clone();

        let asset = self
            .tx
            .run("create_asset", move |conn| {
                Box::pin(async move {
                    let code = input.asset_code.trim();
                    if repo
                        .find_one(&mut *conn, &Filter::new().eq("asset_code", code))
                        .await?
                        .is_some()
                    {
                        return Err(ServiceError::duplicate("asset_code", code));
                    }

                    let serial_number = input
                        .serial_number
                        .as_ref()
                        .map(|serial| serial.trim().to_string());
                    if let Some(serial) = &serial_number {
                        if repo
                            .find_one(
                                &mut *conn,
                                &Filter::new().eq("serial_number", serial.as_str()),
                            )
                            .await?
                            .is_some()
                        {
                            return Err(ServiceError::duplicate("serial_number", serial));
                        }
                    }

                    if let Some(location_id) = &input.location_id {
                        locations.ensure_active(&mut *conn, location_id).await?;
                    }

                    let now = Utc::now();
                    let asset = Asset {
                        id: new_entity_id(),
                        asset_code: code.to_string(),
                        name: input.name.trim().to_string(),
                        serial_number,
                        asset_type: input.asset_type.clone(),
                        location_id: input.location_id.clone(),
                        registered_at: now,
                        status: EntityStatus::Active,
                        metadata: input.metadata.clone(),
                        created_at: now,
                        created_by: Some(created_by.clone()),
                        updated_at: now,
                        updated_by: Some(created_by),
                    };
                    repo.insert(&mut *conn, &asset).await?;
                    Ok(asset)
                })
            })
            .await?;

        self.audit
            .record(
                actor,
                AuditEvent::new(AuditAction::Create, MODULE, "Asset")
                    .entity(&asset.id, &asset.name)
                    .after(&asset),
            )
            .await;
        self.events
            .publish(DomainEvent::new("Asset", &asset.id, AuditAction::Create));

        info!("Registered asset: {} ({})", asset.name, asset.id);
        Ok(asset)
    }

    pub async fn get_asset_by_id(&self, actor: &Actor, id: &str) -> ServiceResult<Asset> {
        debug!(user_id = %actor.user_id, id, "Fetching asset");
        self.db
            .assets()
            .find_by_id(self.db.pool(), id)
            .await?
            .filter(|asset| asset.status != EntityStatus::Deleted)
            .ok_or_else(|| ServiceError::not_found("Asset", id))
    }

    pub async fn get_asset_by_code(&self, actor: &Actor, code: &str) -> ServiceResult<Asset> {
        debug!(user_id = %actor.user_id, code, "Fetching asset by code");
        self.db
            .assets()
            .find_one(self.db.pool(), &Filter::new().eq("asset_code", code))
            .await?
            .filter(|asset| asset.status != EntityStatus::Deleted)
            .ok_or_else(|| ServiceError::not_found("Asset", code))
    }

    pub async fn list_assets(&self, actor: &Actor, filter: &Filter) -> ServiceResult<Vec<Asset>> {
        debug!(user_id = %actor.user_id, conditions = filter.len(), "Listing assets");
        let assets = self.db.assets().find(self.db.pool(), filter).await?;
        Ok(assets
            .into_iter()
            .filter(|asset| asset.status != EntityStatus::Deleted)
            .collect())
    }

    /// Updates the mutable fields of an asset. The registration
    /// timestamp and status are untouched.
    pub async fn update_asset(
        &self,
        actor: &Actor,
        id: &str,
        input: AssetInput,
    ) -> ServiceResult<Asset> {
        require(self.authorizer.as_ref(), actor, permission::ASSETS_UPDATE).await?;

        validate_code(&input.asset_code, "asset_code")?;
        validate_name(&input.name, "name")?;
        if let Some(serial) = &input.serial_number {
            validate_code(serial, "serial_number")?;
        }
        if let Some(asset_type) = &input.asset_type {
            validate_text(asset_type, "asset_type")?;
        }

        let repo = self.db.assets();
        let lookup = self.assets;
        let locations = self.locations;
        let id = id.to_string();
        let updated_by = actor.user_id.clone();

        let (before, after) = self
            .tx
            .run("update_asset", move |conn| {
                Box::pin(async move {
                    let before = lookup.ensure_exists(&mut *conn, &id).await?;

                    let code = input.asset_code.trim();
                    if let Some(taken) = repo
                        .find_one(&mut *conn, &Filter::new().eq("asset_code", code))
                        .await?
                    {
                        if taken.id != before.id {
                            return Err(ServiceError::duplicate("asset_code", code));
                        }
                    }

                    let serial_number = input
                        .serial_number
                        .as_ref()
                        .map(|serial| serial.trim().to_string());
                    if let Some(serial) = &serial_number {
                        if let Some(taken) = repo
                            .find_one(
                                &mut *conn,
                                &Filter::new().eq("serial_number", serial.as_str()),
                            )
                            .await?
                        {
                            if taken.id != before.id {
                                return Err(ServiceError::duplicate("serial_number", serial));
                            }
                        }
                    }

                    if let Some(location_id) = &input.location_id {
                        locations.ensure_active(&mut *conn, location_id).await?;
                    }

                    let mut asset = before.clone();
                    asset.asset_code = code.to_string();
                    asset.name = input.name.trim().to_string();
                    asset.serial_number = serial_number;
                    asset.asset_type = input.asset_type.clone();
                    asset.location_id = input.location_id.clone();
                    asset.metadata = input.metadata.clone();
                    asset.updated_at = Utc::now();
                    asset.updated_by = Some(updated_by);
                    repo.update(&mut *conn, &asset).await?;

                    Ok((before, asset))
                })
            })
            .await?;

        self.audit
            .record(
                actor,
                AuditEvent::new(AuditAction::Update, MODULE, "Asset")
                    .entity(&after.id, &after.name)
                    .before(&before)
                    .after(&after),
            )
            .await;
        self.events
            .publish(DomainEvent::new("Asset", &after.id, AuditAction::Update));

        info!("Updated asset: {} ({})", after.name, after.id);
        Ok(after)
    }

    pub async fn update_asset_status(
        &self,
        actor: &Actor,
        id: &str,
        next: EntityStatus,
    ) -> ServiceResult<Asset> {
        require(self.authorizer.as_ref(), actor, permission::ASSETS_UPDATE).await?;

        let repo = self.db.assets();
        let lookup = self.assets;
        let id = id.to_string();
        let updated_by = actor.user_id.clone();

        let (before, after) = self
            .tx
            .run("update_asset_status", move |conn| {
                Box::pin(async move {
                    let before = lookup.ensure_exists(&mut *conn, &id).await?;
                    if !before.status.can_transition_to(next) {
                        return Err(ServiceError::operation_failed(format!(
                            "Cannot change status from {} to {}",
                            before.status.label(),
                            next.label()
                        )));
                    }

                    let mut asset = before.clone();
                    asset.status = next;
                    asset.updated_at = Utc::now();
                    asset.updated_by = Some(updated_by);
                    repo.update(&mut *conn, &asset).await?;
                    Ok((before, asset))
                })
            })
            .await?;

        self.audit
            .record(
                actor,
                AuditEvent::new(AuditAction::StatusChange, MODULE, "Asset")
                    .severity(status_change_severity(next))
                    .entity(&after.id, &after.name)
                    .description(format!(
                        "{} -> {}",
                        before.status.label(),
                        after.status.label()
                    )),
            )
            .await;
        self.events
            .publish(DomainEvent::new("Asset", &after.id, AuditAction::StatusChange));

        Ok(after)
    }

    /// Physically removes an asset. Refused while any open maintenance
    /// request still points at it; closed history does not block the
    /// removal, it just disappears with the register row's references.
    pub async fn delete_asset(&self, actor: &Actor, id: &str) -> ServiceResult<()> {
        require(self.authorizer.as_ref(), actor, permission::ASSETS_DELETE).await?;

        let repo = self.db.assets();
        let requests = self.db.maintenance_requests();
        let id = id.to_string();

        let deleted = self
            .tx
            .run("delete_asset", move |conn| {
                Box::pin(async move {
                    let asset = repo
                        .find_by_id(&mut *conn, &id)
                        .await?
                        .ok_or_else(|| ServiceError::not_found("Asset", &id))?;

                    let open = requests
                        .find(&mut *conn, &Filter::new().eq("asset_id", id.as_str()))
                        .await?
                        .into_iter()
                        .any(|request| request.is_open());
                    if open {
                        return Err(ServiceError::operation_failed(
                            "Asset still has open maintenance requests",
                        ));
                    }

                    repo.delete(&mut *conn, &asset.id).await?;
                    Ok(asset)
                })
            })
            .await?;

        self.audit
            .record(
                actor,
                AuditEvent::new(AuditAction::Delete, MODULE, "Asset")
                    .severity(AuditSeverity::Critical)
                    .entity(&deleted.id, &deleted.name)
                    .before(&deleted),
            )
            .await;
        self.events
            .publish(DomainEvent::new("Asset", &deleted.id, AuditAction::Delete));

        info!("Deleted asset: {} ({})", deleted.name, deleted.id);
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
