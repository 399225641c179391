//! # Identity Mappers
//!
//! Column mappings for `users`, `roles` and `sessions`.
//!
//! The user entity hides `password_hash` from serialization, but the
//! mapper is not serialization: the hash is a real column and travels
//! through the row map like any other value.

use chrono::DateTime;
use forge_core::{EntityStatus, Role, Session, User};

use crate::repository::{EntityMapper, Repository};
use crate::value::RowMap;

// =============================================================================
// User
// =============================================================================

/// Maps [`User`] to and from the `users` table.
pub struct UserMapper;

impl EntityMapper for UserMapper {
    type Entity = User;

    const TABLE: &'static str = "users";
    const ENTITY_NAME: &'static str = "User";

    fn to_row(entity: &User) -> RowMap {
        let mut row = RowMap::with_capacity(12);
        row.set("id", entity.id.clone())
            .set("username", entity.username.clone())
            .set("display_name", entity.display_name.clone())
            .set("email", entity.email.clone())
            .set("password_hash", entity.password_hash.clone())
            .set("last_login_at", entity.last_login_at)
            .set("status", entity.status.as_i64())
            .set_json("metadata_json", &entity.metadata)
            .set("created_at", entity.created_at)
            .set("created_by", entity.created_by.clone())
            .set("updated_at", entity.updated_at)
            .set("updated_by", entity.updated_by.clone());
        row
    }

    fn from_row(row: &RowMap) -> User {
        User {
            id: row.text("id").unwrap_or_default(),
            username: row.text("username").unwrap_or_default(),
            display_name: row.text("display_name").unwrap_or_default(),
            email: row.text("email"),
            password_hash: row.text("password_hash").unwrap_or_default(),
            last_login_at: row.timestamp("last_login_at"),
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

/// Repository over the `users` table.
pub type UserRepository = Repository<UserMapper>;

// =============================================================================
// Role
// =============================================================================

/// Maps [`Role`] to and from the `roles` table.
pub struct RoleMapper;

impl EntityMapper for RoleMapper {
    type Entity = Role;

    const TABLE: &'static str = "roles";
    const ENTITY_NAME: &'static str = "Role";

    fn to_row(entity: &Role) -> RowMap {
        let mut row = RowMap::with_capacity(10);
        row.set("id", entity.id.clone())
            .set("role_code", entity.role_code.clone())
            .set("name", entity.name.clone())
            .set("description", entity.description.clone())
            .set("status", entity.status.as_i64())
            .set_json("metadata_json", &entity.metadata)
            .set("created_at", entity.created_at)
            .set("created_by", entity.created_by.clone())
            .set("updated_at", entity.updated_at)
            .set("updated_by", entity.updated_by.clone());
        row
    }

    fn from_row(row: &RowMap) -> Role {
        Role {
            id: row.text("id").unwrap_or_default(),
            role_code: row.text("role_code").unwrap_or_default(),
            name: row.text("name").unwrap_or_default(),
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

/// Repository over the `roles` table.
pub type RoleRepository = Repository<RoleMapper>;

// =============================================================================
// Session
// =============================================================================

/// Maps [`Session`] to and from the `sessions` table.
///
/// Sessions have no status column and no audit stamps; validity is
/// derived from `expires_at` and `revoked_at`.
pub struct SessionMapper;

impl EntityMapper for SessionMapper {
    type Entity = Session;

    const TABLE: &'static str = "sessions";
    const ENTITY_NAME: &'static str = "Session";
    const ORDER_BY: &'static str = "opened_at";

    fn to_row(entity: &Session) -> RowMap {
        let mut row = RowMap::with_capacity(5);
        row.set("id", entity.id.clone())
            .set("user_id", entity.user_id.clone())
            .set("opened_at", entity.opened_at)
            .set("expires_at", entity.expires_at)
            .set("revoked_at", entity.revoked_at);
        row
    }

    fn from_row(row: &RowMap) -> Session {
        Session {
            id: row.text("id").unwrap_or_default(),
            user_id: row.text("user_id").unwrap_or_default(),
            opened_at: row.timestamp("opened_at").unwrap_or(DateTime::UNIX_EPOCH),
            expires_at: row.timestamp("expires_at").unwrap_or(DateTime::UNIX_EPOCH),
            revoked_at: row.timestamp("revoked_at"),
        }
    }
}

/// Repository over the `sessions` table.
pub type SessionRepository = Repository<SessionMapper>;
