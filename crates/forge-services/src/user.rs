//! # User and Role Services
//!
//! Accounts, roles, and the two relations that tie security together:
//! user↔role assignments and role↔permission grants.
//!
//! ```text
//! User ──assign_role──► Role ──grant_permission──► "assets:create"
//!  │                     │
//!  │ change_password     │ built-in administrator role:
//!  │ update_user_status  │ cannot be deleted or deactivated
//!  └─ delete_user        └─ holds the "*" wildcard
//! ```
//!
//! Self-service rules: a user may change their own password, but can
//! neither deactivate nor delete their own account. Deactivating a
//! user revokes their open sessions in the same transaction, so the
//! lockout is immediate.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use forge_core::validation::{
    validate_code, validate_email, validate_name, validate_password, validate_permission,
    validate_text, validate_username, validate_uuid,
};
use forge_core::{
    AuditAction, AuditSeverity, EntityStatus, Metadata, Role, ServiceError, ServiceResult, User,
    ADMIN_ROLE_ID,
};
use forge_db::{Database, Filter};

use crate::audit::{AuditEvent, AuditLogger};
use crate::authz::{permission, require, Authorizer};
use crate::catalog::status_change_severity;
use crate::context::{new_entity_id, Actor};
use crate::events::{DomainEvent, EventBus};
use crate::lookup::{RoleLookup, UserLookup};
use crate::password::PasswordHasher;
use crate::transaction::TransactionRunner;

const MODULE: &str = "security";

// =============================================================================
// Input DTOs
// =============================================================================

/// Fields for creating a user account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub display_name: String,
    pub email: Option<String>,
    pub password: String,
    #[serde(default)]
    pub metadata: Metadata,
}

/// Fields for updating a user account. The password moves through
/// [`UserService::change_password`] only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserUpdate {
    pub username: String,
    pub display_name: String,
    pub email: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

/// Fields for creating or updating a role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleInput {
    pub role_code: String,
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

// =============================================================================
// User Service
// =============================================================================

/// Account management and role assignment.
#[derive(Clone)]
pub struct UserService {
    db: Database,
    tx: TransactionRunner,
    authorizer: Arc<dyn Authorizer>,
    audit: AuditLogger,
    events: EventBus,
    hasher: Arc<dyn PasswordHasher>,
    users: UserLookup,
    roles: RoleLookup,
}

impl UserService {
    pub fn new(
        db: Database,
        authorizer: Arc<dyn Authorizer>,
        events: EventBus,
        hasher: Arc<dyn PasswordHasher>,
    ) -> Self {
        UserService {
            tx: TransactionRunner::new(db.clone()),
            audit: AuditLogger::new(db.clone()),
            users: UserLookup::new(),
            roles: RoleLookup::new(),
            db,
            authorizer,
            events,
            hasher,
        }
    }

    pub async fn create_user(&self, actor: &Actor, input: NewUser) -> ServiceResult<User> {
        require(self.authorizer.as_ref(), actor, permission::SECURITY_CREATE).await?;

        validate_username(&input.username)?;
        validate_name(&input.display_name, "display_name")?;
        validate_password(&input.password)?;
        if let Some(email) = &input.email {
            validate_email(email)?;
        }

        let repo = self.db.users();
        let password_hash = self.hasher.hash(&input.password);
        let created_by = actor.user_id.clone();

        let user = self
            .tx
            .run("create_user", move |conn| {
                Box::pin(async move {
                    let username = input.username.trim();
                    if repo
                        .find_one(&mut *conn, &Filter::new().eq("username", username))
                        .await?
                        .is_some()
                    {
                        return Err(ServiceError::duplicate("username", username));
                    }

                    let now = Utc::now();
                    let user = User {
                        id: new_entity_id(),
                        username: username.to_string(),
                        display_name: input.display_name.trim().to_string(),
                        email: input.email.clone(),
                        password_hash,
                        last_login_at: None,
                        status: EntityStatus::Active,
                        metadata: input.metadata.clone(),
                        created_at: now,
                        created_by: Some(created_by.clone()),
                        updated_at: now,
                        updated_by: Some(created_by),
                    };
                    repo.insert(&mut *conn, &user).await?;
                    Ok(user)
                })
            })
            .await?;

        self.audit
            .record(
                actor,
                AuditEvent::new(AuditAction::Create, MODULE, "User")
                    .sub_module("users")
                    .entity(&user.id, &user.display_name)
                    .after(&user),
            )
            .await;
        self.events
            .publish(DomainEvent::new("User", &user.id, AuditAction::Create));

        info!("Created user: {} ({})", user.username, user.id);
        Ok(user)
    }

    pub async fn get_user_by_id(&self, actor: &Actor, id: &str) -> ServiceResult<User> {
        debug!(user_id = %actor.user_id, id, "Fetching user");
        self.db
            .users()
            .find_by_id(self.db.pool(), id)
            .await?
            .filter(|user| user.status != EntityStatus::Deleted)
            .ok_or_else(|| ServiceError::not_found("User", id))
    }

    pub async fn get_user_by_username(&self, actor: &Actor, username: &str) -> ServiceResult<User> {
        debug!(user_id = %actor.user_id, username, "Fetching user by username");
        self.db
            .users()
            .find_one(self.db.pool(), &Filter::new().eq("username", username))
            .await?
            .filter(|user| user.status != EntityStatus::Deleted)
            .ok_or_else(|| ServiceError::not_found("User", username))
    }

    pub async fn list_users(&self, actor: &Actor, filter: &Filter) -> ServiceResult<Vec<User>> {
        debug!(user_id = %actor.user_id, conditions = filter.len(), "Listing users");
        let users = self.db.users().find(self.db.pool(), filter).await?;
        Ok(users
            .into_iter()
            .filter(|user| user.status != EntityStatus::Deleted)
            .collect())
    }

    pub async fn update_user(
        &self,
        actor: &Actor,
        id: &str,
        input: UserUpdate,
    ) -> ServiceResult<User> {
        require(self.authorizer.as_ref(), actor, permission::SECURITY_UPDATE).await?;

        validate_username(&input.username)?;
        validate_name(&input.display_name, "display_name")?;
        if let Some(email) = &input.email {
            validate_email(email)?;
        }

        let repo = self.db.users();
        let lookup = self.users;
        let id = id.to_string();
        let updated_by = actor.user_id.clone();

        let (before, after) = self
            .tx
            .run("update_user", move |conn| {
                Box::pin(async move {
                    let before = lookup.ensure_exists(&mut *conn, &id).await?;

                    let username = input.username.trim();
                    if let Some(taken) = repo
                        .find_one(&mut *conn, &Filter::new().eq("username", username))
                        .await?
                    {
                        if taken.id != before.id {
                            return Err(ServiceError::duplicate("username", username));
                        }
                    }

                    let mut user = before.clone();
                    user.username = username.to_string();
                    user.display_name = input.display_name.trim().to_string();
                    user.email = input.email.clone();
                    user.metadata = input.metadata.clone();
                    user.updated_at = Utc::now();
                    user.updated_by = Some(updated_by);
                    repo.update(&mut *conn, &user).await?;

                    Ok((before, user))
                })
            })
            .await?;

        self.audit
            .record(
                actor,
                AuditEvent::new(AuditAction::Update, MODULE, "User")
                    .sub_module("users")
                    .entity(&after.id, &after.display_name)
                    .before(&before)
                    .after(&after),
            )
            .await;
        self.events
            .publish(DomainEvent::new("User", &after.id, AuditAction::Update));

        Ok(after)
    }

    /// Sets a new password. Users may change their own; changing
    /// someone else's requires the security update permission.
    ///
    /// The audit row deliberately carries no snapshots.
    pub async fn change_password(
        &self,
        actor: &Actor,
        id: &str,
        new_password: &str,
    ) -> ServiceResult<()> {
        if actor.user_id != id {
            require(self.authorizer.as_ref(), actor, permission::SECURITY_UPDATE).await?;
        }

        validate_password(new_password)?;

        let repo = self.db.users();
        let lookup = self.users;
        let password_hash = self.hasher.hash(new_password);
        let id = id.to_string();
        let updated_by = actor.user_id.clone();

        let user = self
            .tx
            .run("change_password", move |conn| {
                Box::pin(async move {
                    let mut user = lookup.ensure_exists(&mut *conn, &id).await?;
                    user.password_hash = password_hash;
                    user.updated_at = Utc::now();
                    user.updated_by = Some(updated_by);
                    repo.update(&mut *conn, &user).await?;
                    Ok(user)
                })
            })
            .await?;

        self.audit
            .record(
                actor,
                AuditEvent::new(AuditAction::Update, MODULE, "User")
                    .sub_module("password")
                    .entity(&user.id, &user.display_name)
                    .description("Password changed"),
            )
            .await;
        self.events
            .publish(DomainEvent::new("User", &user.id, AuditAction::Update));

        info!("Password changed for user: {}", user.username);
        Ok(())
    }

    /// Moves a user through the status lifecycle. Taking a user out of
    /// Active revokes their open sessions in the same transaction.
    pub async fn update_user_status(
        &self,
        actor: &Actor,
        id: &str,
        next: EntityStatus,
    ) -> ServiceResult<User> {
        require(self.authorizer.as_ref(), actor, permission::SECURITY_UPDATE).await?;

        if actor.user_id == id && next != EntityStatus::Active {
            return Err(ServiceError::forbidden(
                "You cannot deactivate your own account",
            ));
        }

        let repo = self.db.users();
        let sessions = self.db.sessions();
        let lookup = self.users;
        let id = id.to_string();
        let updated_by = actor.user_id.clone();

        let (before, after) = self
            .tx
            .run("update_user_status", move |conn| {
                Box::pin(async move {
                    let before = lookup.ensure_exists(&mut *conn, &id).await?;
                    if !before.status.can_transition_to(next) {
                        return Err(ServiceError::operation_failed(format!(
                            "Cannot change status from {} to {}",
                            before.status.label(),
                            next.label()
                        )));
                    }

                    let now = Utc::now();
                    let mut user = before.clone();
                    user.status = next;
                    user.updated_at = now;
                    user.updated_by = Some(updated_by);
                    repo.update(&mut *conn, &user).await?;

                    // A disabled account must not keep a live session.
                    if matches!(next, EntityStatus::Inactive | EntityStatus::Deleted) {
                        let open = sessions
                            .find(&mut *conn, &Filter::new().eq("user_id", id.as_str()))
                            .await?;
                        for mut session in open {
                            if session.revoked_at.is_none() {
                                session.revoked_at = Some(now);
                                sessions.update(&mut *conn, &session).await?;
                            }
                        }
                    }

                    Ok((before, user))
                })
            })
            .await?;

        self.audit
            .record(
                actor,
                AuditEvent::new(AuditAction::StatusChange, MODULE, "User")
                    .severity(status_change_severity(next))
                    .sub_module("users")
                    .entity(&after.id, &after.display_name)
                    .description(format!(
                        "{} -> {}",
                        before.status.label(),
                        after.status.label()
                    )),
            )
            .await;
        self.events
            .publish(DomainEvent::new("User", &after.id, AuditAction::StatusChange));

        Ok(after)
    }

    /// Physically removes a user, their role assignments, and their
    /// sessions. Self-deletion is refused.
    pub async fn delete_user(&self, actor: &Actor, id: &str) -> ServiceResult<()> {
        require(self.authorizer.as_ref(), actor, permission::SECURITY_DELETE).await?;

        if actor.user_id == id {
            return Err(ServiceError::forbidden("You cannot delete your own account"));
        }

        let repo = self.db.users();
        let sessions = self.db.sessions();
        let user_roles = self.db.user_roles();
        let id = id.to_string();

        let deleted = self
            .tx
            .run("delete_user", move |conn| {
                Box::pin(async move {
                    let user = repo
                        .find_by_id(&mut *conn, &id)
                        .await?
                        .ok_or_else(|| ServiceError::not_found("User", &id))?;

                    user_roles.remove_all_for_left(&mut *conn, &id).await?;
                    sessions
                        .delete_where(&mut *conn, &Filter::new().eq("user_id", id.as_str()))
                        .await?;
                    repo.delete(&mut *conn, &user.id).await?;
                    Ok(user)
                })
            })
            .await?;

        self.audit
            .record(
                actor,
                AuditEvent::new(AuditAction::Delete, MODULE, "User")
                    .severity(AuditSeverity::Critical)
                    .sub_module("users")
                    .entity(&deleted.id, &deleted.display_name)
                    .before(&deleted),
            )
            .await;
        self.events
            .publish(DomainEvent::new("User", &deleted.id, AuditAction::Delete));

        info!("Deleted user: {} ({})", deleted.username, deleted.id);
        Ok(())
    }

    // ===== Role assignment =====

    /// Assigns a role to a user. Idempotent; only a new assignment is
    /// audited.
    pub async fn assign_role(
        &self,
        actor: &Actor,
        user_id: &str,
        role_id: &str,
    ) -> ServiceResult<()> {
        require(self.authorizer.as_ref(), actor, permission::SECURITY_UPDATE).await?;

        validate_uuid(user_id, "user_id")?;
        validate_uuid(role_id, "role_id")?;

        let user_roles = self.db.user_roles();
        let users = self.users;
        let roles = self.roles;
        let user_id = user_id.to_string();
        let role_id = role_id.to_string();

        let (user, role, added) = self
            .tx
            .run("assign_role", move |conn| {
                Box::pin(async move {
                    let user = users.ensure_exists(&mut *conn, &user_id).await?;
                    let role = roles.ensure_active(&mut *conn, &role_id).await?;
                    let added = user_roles.add(&mut *conn, &user_id, &role_id).await?;
                    Ok((user, role, added))
                })
            })
            .await?;

        if added {
            self.audit
                .record(
                    actor,
                    AuditEvent::new(AuditAction::Assign, MODULE, "User")
                        .sub_module("roles")
                        .entity(&user.id, &user.display_name)
                        .description(format!("Assigned role {}", role.role_code)),
                )
                .await;
            self.events
                .publish(DomainEvent::new("User", &user.id, AuditAction::Assign));
            info!("Assigned role {} to user {}", role.role_code, user.username);
        }
        Ok(())
    }

    /// Removes a role from a user. Idempotent; only an actual removal
    /// is audited.
    pub async fn remove_role(
        &self,
        actor: &Actor,
        user_id: &str,
        role_id: &str,
    ) -> ServiceResult<()> {
        require(self.authorizer.as_ref(), actor, permission::SECURITY_UPDATE).await?;

        validate_uuid(user_id, "user_id")?;
        validate_uuid(role_id, "role_id")?;

        let user_roles = self.db.user_roles();
        let users = self.users;
        let user_id = user_id.to_string();
        let role_id = role_id.to_string();
        let id = role_id.clone();

        let (user, removed) = self
            .tx
            .run("remove_role", move |conn| {
                Box::pin(async move {
                    let user = users.ensure_exists(&mut *conn, &user_id).await?;
                    let removed = user_roles.remove(&mut *conn, &user_id, &id).await?;
                    Ok((user, removed))
                })
            })
            .await?;

        if removed {
            self.audit
                .record(
                    actor,
                    AuditEvent::new(AuditAction::Revoke, MODULE, "User")
                        .sub_module("roles")
                        .entity(&user.id, &user.display_name)
                        .description(format!("Removed role {}", role_id)),
                )
                .await;
            self.events
                .publish(DomainEvent::new("User", &user.id, AuditAction::Revoke));
            info!("Removed role {} from user {}", role_id, user.username);
        }
        Ok(())
    }

    /// The roles currently assigned to a user. Assignments pointing at
    /// roles that no longer exist are skipped.
    pub async fn roles_of(&self, actor: &Actor, user_id: &str) -> ServiceResult<Vec<Role>> {
        debug!(user_id = %actor.user_id, target = user_id, "Listing roles of user");
        self.users.ensure_exists(self.db.pool(), user_id).await?;

        let role_ids = self.db.user_roles().right_ids_for(self.db.pool(), user_id).await?;
        let repo = self.db.roles();
        let mut roles = Vec::with_capacity(role_ids.len());
        for role_id in role_ids {
            if let Some(role) = repo.find_by_id(self.db.pool(), &role_id).await? {
                roles.push(role);
            }
        }
        Ok(roles)
    }
}

// =============================================================================
// Role Service
// =============================================================================

/// Role management and permission grants.
#[derive(Clone)]
pub struct RoleService {
    db: Database,
    tx: TransactionRunner,
    authorizer: Arc<dyn Authorizer>,
    audit: AuditLogger,
    events: EventBus,
    roles: RoleLookup,
}

impl RoleService {
    pub fn new(db: Database, authorizer: Arc<dyn Authorizer>, events: EventBus) -> Self {
        RoleService {
            tx: TransactionRunner::new(db.clone()),
            audit: AuditLogger::new(db.clone()),
            roles: RoleLookup::new(),
            db,
            authorizer,
            events,
        }
    }

    pub async fn create_role(&self, actor: &Actor, input: RoleInput) -> ServiceResult<Role> {
        require(self.authorizer.as_ref(), actor, permission::SECURITY_CREATE).await?;

        validate_code(&input.role_code, "role_code")?;
        validate_name(&input.name, "name")?;
        if let Some(description) = &input.description {
            validate_text(description, "description")?;
        }

        let repo = self.db.roles();
        let created_by = actor.user_id.clone();

        let role = self
            .tx
            .run("create_role", move |conn| {
                Box::pin(async move {
                    let code = input.role_code.trim();
                    if repo
                        .find_one(&mut *conn, &Filter::new().eq("role_code", code))
                        .await?
                        .is_some()
                    {
                        return Err(ServiceError::duplicate("role_code", code));
                    }

                    let now = Utc::now();
                    let role = Role {
                        id: new_entity_id(),
                        role_code: code.to_string(),
                        name: input.name.trim().to_string(),
                        description: input.description.clone(),
                        status: EntityStatus::Active,
                        metadata: input.metadata.clone(),
                        created_at: now,
                        created_by: Some(created_by.clone()),
                        updated_at: now,
                        updated_by: Some(created_by),
                    };
                    repo.insert(&mut *conn, &role).await?;
                    Ok(role)
                })
            })
            .await?;

        self.audit
            .record(
                actor,
                AuditEvent::new(AuditAction::Create, MODULE, "Role")
                    .sub_module("roles")
                    .entity(&role.id, &role.name)
                    .after(&role),
            )
            .await;
        self.events
            .publish(DomainEvent::new("Role", &role.id, AuditAction::Create));

        info!("Created role: {} ({})", role.role_code, role.id);
        Ok(role)
    }

    pub async fn get_role_by_id(&self, actor: &Actor, id: &str) -> ServiceResult<Role> {
        debug!(user_id = %actor.user_id, id, "Fetching role");
        self.db
            .roles()
            .find_by_id(self.db.pool(), id)
            .await?
            .filter(|role| role.status != EntityStatus::Deleted)
            .ok_or_else(|| ServiceError::not_found("Role", id))
    }

    pub async fn get_role_by_code(&self, actor: &Actor, code: &str) -> ServiceResult<Role> {
        debug!(user_id = %actor.user_id, code, "Fetching role by code");
        self.db
            .roles()
            .find_one(self.db.pool(), &Filter::new().eq("role_code", code))
            .await?
            .filter(|role| role.status != EntityStatus::Deleted)
            .ok_or_else(|| ServiceError::not_found("Role", code))
    }

    pub async fn list_roles(&self, actor: &Actor, filter: &Filter) -> ServiceResult<Vec<Role>> {
        debug!(user_id = %actor.user_id, conditions = filter.len(), "Listing roles");
        let roles = self.db.roles().find(self.db.pool(), filter).await?;
        Ok(roles
            .into_iter()
            .filter(|role| role.status != EntityStatus::Deleted)
            .collect())
    }

    pub async fn update_role(
        &self,
        actor: &Actor,
        id: &str,
        input: RoleInput,
    ) -> ServiceResult<Role> {
        require(self.authorizer.as_ref(), actor, permission::SECURITY_UPDATE).await?;

        validate_code(&input.role_code, "role_code")?;
        validate_name(&input.name, "name")?;
        if let Some(description) = &input.description {
            validate_text(description, "description")?;
        }

        let repo = self.db.roles();
        let lookup = self.roles;
        let id = id.to_string();
        let updated_by = actor.user_id.clone();

        let (before, after) = self
            .tx
            .run("update_role", move |conn| {
                Box::pin(async move {
                    let before = lookup.ensure_exists(&mut *conn, &id).await?;

                    let code = input.role_code.trim();
                    if let Some(taken) = repo
                        .find_one(&mut *conn, &Filter::new().eq("role_code", code))
                        .await?
                    {
                        if taken.id != before.id {
                            return Err(ServiceError::duplicate("role_code", code));
                        }
                    }

                    let mut role = before.clone();
                    role.role_code = code.to_string();
                    role.name = input.name.trim().to_string();
                    role.description = input.description.clone();
                    role.metadata = input.metadata.clone();
                    role.updated_at = Utc::now();
                    role.updated_by = Some(updated_by);
                    repo.update(&mut *conn, &role).await?;

                    Ok((before, role))
                })
            })
            .await?;

        self.audit
            .record(
                actor,
                AuditEvent::new(AuditAction::Update, MODULE, "Role")
                    .sub_module("roles")
                    .entity(&after.id, &after.name)
                    .before(&before)
                    .after(&after),
            )
            .await;
        self.events
            .publish(DomainEvent::new("Role", &after.id, AuditAction::Update));

        Ok(after)
    }

    /// Moves a role through the status lifecycle. The built-in
    /// administrator role stays Active forever.
    pub async fn update_role_status(
        &self,
        actor: &Actor,
        id: &str,
        next: EntityStatus,
    ) -> ServiceResult<Role> {
        require(self.authorizer.as_ref(), actor, permission::SECURITY_UPDATE).await?;

        if id == ADMIN_ROLE_ID && next != EntityStatus::Active {
            return Err(ServiceError::operation_failed(
                "The built-in administrator role cannot be deactivated",
            ));
        }

        let repo = self.db.roles();
        let lookup = self.roles;
        let id = id.to_string();
        let updated_by = actor.user_id.clone();

        let (before, after) = self
            .tx
            .run("update_role_status", move |conn| {
                Box::pin(async move {
                    let before = lookup.ensure_exists(&mut *conn, &id).await?;
                    if !before.status.can_transition_to(next) {
                        return Err(ServiceError::operation_failed(format!(
                            "Cannot change status from {} to {}",
                            before.status.label(),
                            next.label()
                        )));
                    }

                    let mut role = before.clone();
                    role.status = next;
                    role.updated_at = Utc::now();
                    role.updated_by = Some(updated_by);
                    repo.update(&mut *conn, &role).await?;
                    Ok((before, role))
                })
            })
            .await?;

        self.audit
            .record(
                actor,
                AuditEvent::new(AuditAction::StatusChange, MODULE, "Role")
                    .severity(status_change_severity(next))
                    .sub_module("roles")
                    .entity(&after.id, &after.name)
                    .description(format!(
                        "{} -> {}",
                        before.status.label(),
                        after.status.label()
                    )),
            )
            .await;
        self.events
            .publish(DomainEvent::new("Role", &after.id, AuditAction::StatusChange));

        Ok(after)
    }

    /// Physically removes a role and its permission grants. Refused for
    /// the built-in administrator role and for roles still assigned to
    /// users.
    pub async fn delete_role(&self, actor: &Actor, id: &str) -> ServiceResult<()> {
        require(self.authorizer.as_ref(), actor, permission::SECURITY_DELETE).await?;

        if id == ADMIN_ROLE_ID {
            return Err(ServiceError::operation_failed(
                "The built-in administrator role cannot be deleted",
            ));
        }

        let repo = self.db.roles();
        let user_roles = self.db.user_roles();
        let role_permissions = self.db.role_permissions();
        let id = id.to_string();

        let deleted = self
            .tx
            .run("delete_role", move |conn| {
                Box::pin(async move {
                    let role = repo
                        .find_by_id(&mut *conn, &id)
                        .await?
                        .ok_or_else(|| ServiceError::not_found("Role", &id))?;

                    let holders = user_roles.count_for_right(&mut *conn, &id).await?;
                    if holders > 0 {
                        return Err(ServiceError::operation_failed(
                            "Role is still assigned to users",
                        ));
                    }

                    role_permissions.remove_all_for_left(&mut *conn, &id).await?;
                    repo.delete(&mut *conn, &role.id).await?;
                    Ok(role)
                })
            })
            .await?;

        self.audit
            .record(
                actor,
                AuditEvent::new(AuditAction::Delete, MODULE, "Role")
                    .severity(AuditSeverity::Critical)
                    .sub_module("roles")
                    .entity(&deleted.id, &deleted.name)
                    .before(&deleted),
            )
            .await;
        self.events
            .publish(DomainEvent::new("Role", &deleted.id, AuditAction::Delete));

        info!("Deleted role: {} ({})", deleted.role_code, deleted.id);
        Ok(())
    }

    // ===== Permission grants =====

    /// Grants a permission to a role. Idempotent.
    pub async fn grant_permission(
        &self,
        actor: &Actor,
        role_id: &str,
        permission_key: &str,
    ) -> ServiceResult<()> {
        require(self.authorizer.as_ref(), actor, permission::SECURITY_UPDATE).await?;

        validate_uuid(role_id, "role_id")?;
        validate_permission(permission_key)?;

        let role_permissions = self.db.role_permissions();
        let roles = self.roles;
        let role_id = role_id.to_string();
        let permission_key = permission_key.trim().to_string();

        let (role, granted, key) = self
            .tx
            .run("grant_permission", move |conn| {
                Box::pin(async move {
                    let role = roles.ensure_exists(&mut *conn, &role_id).await?;
                    let granted = role_permissions
                        .add(&mut *conn, &role_id, &permission_key)
                        .await?;
                    Ok((role, granted, permission_key))
                })
            })
            .await?;

        if granted {
            self.audit
                .record(
                    actor,
                    AuditEvent::new(AuditAction::Assign, MODULE, "Role")
                        .sub_module("permissions")
                        .entity(&role.id, &role.name)
                        .description(format!("Granted {}", key)),
                )
                .await;
            self.events
                .publish(DomainEvent::new("Role", &role.id, AuditAction::Assign));
            info!("Granted {} to role {}", key, role.role_code);
        }
        Ok(())
    }

    /// Revokes a permission from a role. Idempotent.
    pub async fn revoke_permission(
        &self,
        actor: &Actor,
        role_id: &str,
        permission_key: &str,
    ) -> ServiceResult<()> {
        require(self.authorizer.as_ref(), actor, permission::SECURITY_UPDATE).await?;

        validate_uuid(role_id, "role_id")?;
        validate_permission(permission_key)?;

        let role_permissions = self.db.role_permissions();
        let roles = self.roles;
        let role_id = role_id.to_string();
        let permission_key = permission_key.trim().to_string();

        let (role, revoked, key) = self
            .tx
            .run("revoke_permission", move |conn| {
                Box::pin(async move {
                    let role = roles.ensure_exists(&mut *conn, &role_id).await?;
                    let revoked = role_permissions
                        .remove(&mut *conn, &role_id, &permission_key)
                        .await?;
                    Ok((role, revoked, permission_key))
                })
            })
            .await?;

        if revoked {
            self.audit
                .record(
                    actor,
                    AuditEvent::new(AuditAction::Revoke, MODULE, "Role")
                        .sub_module("permissions")
                        .entity(&role.id, &role.name)
                        .description(format!("Revoked {}", key)),
                )
                .await;
            self.events
                .publish(DomainEvent::new("Role", &role.id, AuditAction::Revoke));
            info!("Revoked {} from role {}", key, role.role_code);
        }
        Ok(())
    }

    /// The permissions currently granted to a role, sorted.
    pub async fn permissions_of(&self, actor: &Actor, role_id: &str) -> ServiceResult<Vec<String>> {
        debug!(user_id = %actor.user_id, role_id, "Listing permissions of role");
        self.roles.ensure_exists(self.db.pool(), role_id).await?;
        let permissions = self
            .db
            .role_permissions()
            .right_ids_for(self.db.pool(), role_id)
            .await?;
        Ok(permissions)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::test_services;
    use forge_core::ErrorCode;

    fn new_user(username: &str) -> NewUser {
        NewUser {
            username: username.to_string(),
            display_name: format!("User {}", username),
            email: Some(format!("{}@example.com", username)),
            password: "correct-horse".to_string(),
            metadata: Metadata::new(),
        }
    }

    fn role_input(code: &str) -> RoleInput {
        RoleInput {
            role_code: code.to_string(),
            name: format!("Role {}", code),
            description: None,
            metadata: Metadata::new(),
        }
    }

    #[tokio::test]
    async fn test_create_user_hashes_password() {
        let services = test_services().await;
        let actor = Actor::system();

        let user = services
            .users
            .create_user(&actor, new_user("jdoe"))
            .await
            .unwrap();
        assert_ne!(user.password_hash, "correct-horse");
        assert!(user.password_hash.contains('$'));
        assert_eq!(user.status, EntityStatus::Active);
        assert!(user.last_login_at.is_none());
    }

    #[tokio::test]
    async fn test_short_password_rejected() {
        let services = test_services().await;
        let actor = Actor::system();

        let mut input = new_user("jdoe");
        input.password = "short".to_string();
        let err = services.users.create_user(&actor, input).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidInput);
    }

    #[tokio::test]
    async fn test_role_assignment_round_trip() {
        let services = test_services().await;
        let actor = Actor::system();

        let user = services
            .users
            .create_user(&actor, new_user("jdoe"))
            .await
            .unwrap();
        let role = services
            .roles
            .create_role(&actor, role_input("operator"))
            .await
            .unwrap();

        services
            .users
            .assign_role(&actor, &user.id, &role.id)
            .await
            .unwrap();
        // Assigning twice is a no-op, not an error.
        services
            .users
            .assign_role(&actor, &user.id, &role.id)
            .await
            .unwrap();

        let roles = services.users.roles_of(&actor, &user.id).await.unwrap();
        assert_eq!(roles.len(), 1);
        assert_eq!(roles[0].id, role.id);

        services
            .users
            .remove_role(&actor, &user.id, &role.id)
            .await
            .unwrap();
        let roles = services.users.roles_of(&actor, &user.id).await.unwrap();
        assert!(roles.is_empty());
    }

    #[tokio::test]
    async fn test_permission_grant_feeds_authorization() {
        let services = test_services().await;
        let admin = Actor::system();

        let user = services
            .users
            .create_user(&admin, new_user("jdoe"))
            .await
            .unwrap();
        let role = services
            .roles
            .create_role(&admin, role_input("asset-clerk"))
            .await
            .unwrap();
        services
            .roles
            .grant_permission(&admin, &role.id, permission::ASSETS_CREATE)
            .await
            .unwrap();
        services
            .users
            .assign_role(&admin, &user.id, &role.id)
            .await
            .unwrap();

        let clerk = Actor::new(user.id.clone(), user.username.clone())
            .with_roles(vec![role.id.clone()]);

        // The granted module works, others stay closed.
        services
            .assets
            .create_asset(
                &clerk,
                crate::asset::AssetInput {
                    asset_code: "press-01".to_string(),
                    name: "Press 01".to_string(),
                    serial_number: None,
                    asset_type: None,
                    location_id: None,
                    metadata: Metadata::new(),
                },
            )
            .await
            .unwrap();
        let err = services
            .roles
            .create_role(&clerk, role_input("backdoor"))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Forbidden);
    }

    #[tokio::test]
    async fn test_self_deactivation_and_self_delete_refused() {
        let services = test_services().await;
        let admin = Actor::system();

        let user = services
            .users
            .create_user(&admin, new_user("jdoe"))
            .await
            .unwrap();
        let same_user = Actor::new(user.id.clone(), user.username.clone())
            .with_roles(vec![ADMIN_ROLE_ID.to_string()]);

        let err = services
            .users
            .update_user_status(&same_user, &user.id, EntityStatus::Inactive)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Forbidden);

        let err = services
            .users
            .delete_user(&same_user, &user.id)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Forbidden);

        // Another administrator can do both.
        services
            .users
            .update_user_status(&admin, &user.id, EntityStatus::Inactive)
            .await
            .unwrap();
        services.users.delete_user(&admin, &user.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_admin_role_is_protected() {
        let services = test_services().await;
        let actor = Actor::system();

        let err = services
            .roles
            .delete_role(&actor, ADMIN_ROLE_ID)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::OperationFailed);

        let err = services
            .roles
            .update_role_status(&actor, ADMIN_ROLE_ID, EntityStatus::Inactive)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::OperationFailed);
    }

    #[tokio::test]
    async fn test_assigned_role_cannot_be_deleted() {
        let services = test_services().await;
        let actor = Actor::system();

        let user = services
            .users
            .create_user(&actor, new_user("jdoe"))
            .await
            .unwrap();
        let role = services
            .roles
            .create_role(&actor, role_input("operator"))
            .await
            .unwrap();
        services
            .users
            .assign_role(&actor, &user.id, &role.id)
            .await
            .unwrap();

        let err = services
            .roles
            .delete_role(&actor, &role.id)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::OperationFailed);

        services
            .users
            .remove_role(&actor, &user.id, &role.id)
            .await
            .unwrap();
        services.roles.delete_role(&actor, &role.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_users_change_their_own_password_only() {
        let services = test_services().await;
        let admin = Actor::system();

        let alice = services
            .users
            .create_user(&admin, new_user("alice"))
            .await
            .unwrap();
        let bob = services
            .users
            .create_user(&admin, new_user("bob"))
            .await
            .unwrap();

        let alice_actor = Actor::new(alice.id.clone(), alice.username.clone());

        // Own password: no special permission needed.
        services
            .users
            .change_password(&alice_actor, &alice.id, "brand-new-pass")
            .await
            .unwrap();

        // Someone else's: requires the security permission.
        let err = services
            .users
            .change_password(&alice_actor, &bob.id, "hijacked-pass")
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Forbidden);

        services
            .users
            .change_password(&admin, &bob.id, "admin-reset-1")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_password_change_audit_carries_no_snapshot() {
        let services = test_services().await;
        let actor = Actor::system();

        let user = services
            .users
            .create_user(&actor, new_user("jdoe"))
            .await
            .unwrap();
        services
            .users
            .change_password(&actor, &user.id, "brand-new-pass")
            .await
            .unwrap();

        let trail = services
            .db
            .audit_logs()
            .find(
                services.db.pool(),
                &Filter::new()
                    .eq("entity_id", user.id.as_str())
                    .eq("sub_module", "password"),
            )
            .await
            .unwrap();
        assert_eq!(trail.len(), 1);
        assert!(trail[0].before_state.is_none());
        assert!(trail[0].after_state.is_none());
    }
}
