//! # Authentication Service
//!
//! Login, logout, and session validation.
//!
//! ## Session Model
//! ```text
//! login ──► Session row (expires_at = now + ttl)
//!              │
//!              ├─ validate_session ──► Actor (user + roles), while valid
//!              ├─ logout            ──► revoked_at set
//!              └─ user deactivation ──► revoked_at set (user service)
//! ```
//!
//! Sessions are database rows, not signed tokens: revocation is an
//! update, and validation is a read. Login failures deliberately
//! return the same message for unknown users and wrong passwords.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use forge_core::{
    AuditAction, EntityStatus, ServiceError, ServiceResult, Session, User,
};
use forge_db::{Database, Filter};

use crate::audit::{AuditEvent, AuditLogger};
use crate::context::{new_entity_id, Actor};
use crate::events::{DomainEvent, EventBus};
use crate::password::PasswordHasher;
use crate::transaction::TransactionRunner;

const MODULE: &str = "auth";

// =============================================================================
// Configuration
// =============================================================================

/// Authentication settings.
///
/// Values come from the embedded defaults, overridden by environment
/// variables where present:
///
/// | Field               | Environment variable      |
/// |---------------------|---------------------------|
/// | `session_ttl_hours` | `FORGE_SESSION_TTL_HOURS` |
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// How long a session stays valid after login, in hours.
    #[serde(default = "default_session_ttl_hours")]
    pub session_ttl_hours: i64,
}

fn default_session_ttl_hours() -> i64 {
    8
}

impl Default for AuthConfig {
    fn default() -> Self {
        AuthConfig {
            session_ttl_hours: default_session_ttl_hours(),
        }
    }
}

impl AuthConfig {
    /// Builds the configuration from defaults and environment overrides.
    pub fn load() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(value) = std::env::var("FORGE_SESSION_TTL_HOURS") {
            match value.parse::<i64>() {
                Ok(hours) => self.session_ttl_hours = hours,
                Err(_) => warn!("Ignoring invalid FORGE_SESSION_TTL_HOURS: {}", value),
            }
        }
    }

    /// Checks the configuration for nonsensical values.
    pub fn validate(&self) -> Result<(), String> {
        if self.session_ttl_hours <= 0 {
            return Err(format!(
                "session_ttl_hours must be positive, got {}",
                self.session_ttl_hours
            ));
        }
        Ok(())
    }

    /// The session lifetime as a duration.
    pub fn session_ttl(&self) -> Duration {
        Duration::hours(self.session_ttl_hours)
    }
}

// =============================================================================
// Auth Service
// =============================================================================

/// What a successful login hands back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginOutcome {
    pub session: Session,
    pub user: User,
}

/// Login, logout, session validation.
#[derive(Clone)]
pub struct AuthService {
    db: Database,
    tx: TransactionRunner,
    audit: AuditLogger,
    events: EventBus,
    hasher: Arc<dyn PasswordHasher>,
    config: AuthConfig,
}

impl AuthService {
    pub fn new(
        db: Database,
        events: EventBus,
        hasher: Arc<dyn PasswordHasher>,
        config: AuthConfig,
    ) -> Self {
        AuthService {
            tx: TransactionRunner::new(db.clone()),
            audit: AuditLogger::new(db.clone()),
            db,
            events,
            hasher,
            config,
        }
    }

    /// Checks credentials and opens a session.
    ///
    /// Unknown usernames and wrong passwords fail identically, so the
    /// response does not reveal which accounts exist.
    pub async fn login(&self, username: &str, password: &str) -> ServiceResult<LoginOutcome> {
        let users = self.db.users();
        let sessions = self.db.sessions();
        let hasher = Arc::clone(&self.hasher);
        let ttl = self.config.session_ttl();
        let username = username.trim().to_string();
        let password = password.to_string();

        let outcome = self
            .tx
            .run("login", move |conn| {
                Box::pin(async move {
                    let user = users
                        .find_one(&mut *conn, &Filter::new().eq("username", username.as_str()))
                        .await?
                        .filter(|user| hasher.verify(&password, &user.password_hash))
                        .ok_or_else(|| {
                            ServiceError::forbidden("Invalid username or password")
                        })?;

                    if user.status != EntityStatus::Active {
                        return Err(ServiceError::forbidden("Account is disabled"));
                    }

                    let now = Utc::now();
                    let session = Session {
                        id: new_entity_id(),
                        user_id: user.id.clone(),
                        opened_at: now,
                        expires_at: now + ttl,
                        revoked_at: None,
                    };
                    sessions.insert(&mut *conn, &session).await?;

                    let mut user = user;
                    user.last_login_at = Some(now);
                    users.update(&mut *conn, &user).await?;

                    Ok(LoginOutcome { session, user })
                })
            })
            .await?;

        let actor = Actor::new(outcome.user.id.clone(), outcome.user.display_name.clone())
            .with_session(outcome.session.id.clone());
        self.audit
            .record(
                &actor,
                AuditEvent::new(AuditAction::Login, MODULE, "User")
                    .entity(&outcome.user.id, &outcome.user.display_name),
            )
            .await;
        self.events.publish(DomainEvent::new(
            "User",
            &outcome.user.id,
            AuditAction::Login,
        ));

        info!("User logged in: {}", outcome.user.username);
        Ok(outcome)
    }

    /// Closes the actor's session. Logging out of an already revoked
    /// session is a no-op.
    pub async fn logout(&self, actor: &Actor) -> ServiceResult<()> {
        let session_id = actor
            .session_id
            .clone()
            .ok_or_else(|| ServiceError::operation_failed("No active session"))?;

        let sessions = self.db.sessions();
        let id = session_id.clone();

        let revoked = self
            .tx
            .run("logout", move |conn| {
                Box::pin(async move {
                    let session = sessions
                        .find_by_id(&mut *conn, &id)
                        .await?
                        .ok_or_else(|| ServiceError::not_found("Session", &id))?;
                    if session.revoked_at.is_some() {
                        return Ok(false);
                    }

                    let mut session = session;
                    session.revoked_at = Some(Utc::now());
                    sessions.update(&mut *conn, &session).await?;
                    Ok(true)
                })
            })
            .await?;

        if revoked {
            self.audit
                .record(
                    actor,
                    AuditEvent::new(AuditAction::Logout, MODULE, "User")
                        .entity(&actor.user_id, &actor.user_name),
                )
                .await;
            self.events.publish(DomainEvent::new(
                "User",
                &actor.user_id,
                AuditAction::Logout,
            ));
            info!("User logged out: {}", actor.user_name);
        }
        Ok(())
    }

    /// Resolves a session id to an [`Actor`] with the user's current
    /// roles. Fails for expired, revoked, or unknown sessions and for
    /// disabled accounts.
    pub async fn validate_session(&self, session_id: &str) -> ServiceResult<Actor> {
        let now = Utc::now();

        let session = self
            .db
            .sessions()
            .find_by_id(self.db.pool(), session_id)
            .await?
            .filter(|session| session.is_valid_at(now))
            .ok_or_else(|| ServiceError::forbidden("Session is not valid"))?;

        let user = self
            .db
            .users()
            .find_by_id(self.db.pool(), &session.user_id)
            .await?
            .ok_or_else(|| ServiceError::forbidden("Session is not valid"))?;
        if user.status != EntityStatus::Active {
            return Err(ServiceError::forbidden("Account is disabled"));
        }

        let role_ids = self
            .db
            .user_roles()
            .right_ids_for(self.db.pool(), &user.id)
            .await?;

        debug!(user = %user.username, roles = role_ids.len(), "Validated session");
        Ok(Actor::new(user.id, user.display_name)
            .with_session(session.id)
            .with_roles(role_ids))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::test_services;
    use crate::user::NewUser;
    use forge_core::{ErrorCode, Metadata};

    async fn seeded_login(services: &crate::AppServices) -> User {
        services
            .users
            .create_user(
                &Actor::system(),
                NewUser {
                    username: "jdoe".to_string(),
                    display_name: "Jo Doe".to_string(),
                    email: None,
                    password: "correct-horse".to_string(),
                    metadata: Metadata::new(),
                },
            )
            .await
            .unwrap()
    }

    #[test]
    fn test_config_defaults_and_validation() {
        let config = AuthConfig::default();
        assert_eq!(config.session_ttl_hours, 8);
        assert!(config.validate().is_ok());

        let broken = AuthConfig {
            session_ttl_hours: 0,
        };
        assert!(broken.validate().is_err());
    }

    #[tokio::test]
    async fn test_login_opens_session_and_stamps_last_login() {
        let services = test_services().await;
        let user = seeded_login(&services).await;

        let outcome = services.auth.login("jdoe", "correct-horse").await.unwrap();
        assert_eq!(outcome.user.id, user.id);
        assert!(outcome.user.last_login_at.is_some());
        assert!(outcome.session.revoked_at.is_none());
        assert!(outcome.session.expires_at > outcome.session.opened_at);

        let actor = services
            .auth
            .validate_session(&outcome.session.id)
            .await
            .unwrap();
        assert_eq!(actor.user_id, user.id);
        assert_eq!(actor.session_id.as_deref(), Some(outcome.session.id.as_str()));
    }

    #[tokio::test]
    async fn test_wrong_password_and_unknown_user_fail_identically() {
        let services = test_services().await;
        seeded_login(&services).await;

        let wrong = services
            .auth
            .login("jdoe", "wrong-password")
            .await
            .unwrap_err();
        let unknown = services
            .auth
            .login("nobody", "correct-horse")
            .await
            .unwrap_err();

        assert_eq!(wrong.code, ErrorCode::Forbidden);
        assert_eq!(unknown.code, ErrorCode::Forbidden);
        assert_eq!(wrong.message, unknown.message);
    }

    #[tokio::test]
    async fn test_disabled_account_cannot_log_in() {
        let services = test_services().await;
        let user = seeded_login(&services).await;

        services
            .users
            .update_user_status(&Actor::system(), &user.id, EntityStatus::Inactive)
            .await
            .unwrap();

        let err = services
            .auth
            .login("jdoe", "correct-horse")
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Forbidden);
        assert_eq!(err.message, "Account is disabled");
    }

    #[tokio::test]
    async fn test_logout_revokes_and_is_idempotent() {
        let services = test_services().await;
        seeded_login(&services).await;

        let outcome = services.auth.login("jdoe", "correct-horse").await.unwrap();
        let actor = services
            .auth
            .validate_session(&outcome.session.id)
            .await
            .unwrap();

        services.auth.logout(&actor).await.unwrap();
        let err = services
            .auth
            .validate_session(&outcome.session.id)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Forbidden);

        // A second logout of the same session does nothing.
        services.auth.logout(&actor).await.unwrap();
    }

    #[tokio::test]
    async fn test_logout_without_session_fails() {
        let services = test_services().await;
        let err = services.auth.logout(&Actor::system()).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::OperationFailed);
    }

    #[tokio::test]
    async fn test_deactivation_revokes_open_sessions() {
        let services = test_services().await;
        let user = seeded_login(&services).await;

        let outcome = services.auth.login("jdoe", "correct-horse").await.unwrap();
        services
            .auth
            .validate_session(&outcome.session.id)
            .await
            .unwrap();

        services
            .users
            .update_user_status(&Actor::system(), &user.id, EntityStatus::Inactive)
            .await
            .unwrap();

        // The session died with the account.
        let err = services
            .auth
            .validate_session(&outcome.session.id)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Forbidden);
    }

    #[tokio::test]
    async fn test_expired_session_is_rejected() {
        let services = test_services().await;
        let user = seeded_login(&services).await;

        // Plant a session that expired an hour ago.
        let stale = Session {
            id: new_entity_id(),
            user_id: user.id.clone(),
            opened_at: Utc::now() - Duration::hours(10),
            expires_at: Utc::now() - Duration::hours(1),
            revoked_at: None,
        };
        services
            .db
            .sessions()
            .insert(services.db.pool(), &stale)
            .await
            .unwrap();

        let err = services
            .auth
            .validate_session(&stale.id)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Forbidden);
    }

    #[tokio::test]
    async fn test_validated_actor_carries_roles() {
        let services = test_services().await;
        let admin = Actor::system();
        let user = seeded_login(&services).await;

        let role = services
            .roles
            .create_role(
                &admin,
                crate::user::RoleInput {
                    role_code: "operator".to_string(),
                    name: "Operator".to_string(),
                    description: None,
                    metadata: Metadata::new(),
                },
            )
            .await
            .unwrap();
        services
            .users
            .assign_role(&admin, &user.id, &role.id)
            .await
            .unwrap();

        let outcome = services.auth.login("jdoe", "correct-horse").await.unwrap();
        let actor = services
            .auth
            .validate_session(&outcome.session.id)
            .await
            .unwrap();
        assert_eq!(actor.role_ids, vec![role.id]);
    }
}
