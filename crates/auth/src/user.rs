//! Stored identity records.
//!
//! Users and roles are flat rows addressed by id. The user↔role association
//! lives in the store as `(UserId, RoleId)` pairs; records never hold each
//! other directly.

use chrono::{DateTime, Utc};

use rolegate_core::{Entity, RoleId, UserId};

use crate::{RoleName, SecretHash, Username};

/// A persisted user row (without its roles).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub id: UserId,
    pub username: Username,
    pub secret_hash: SecretHash,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

impl Entity for UserRecord {
    type Id = UserId;

    fn id(&self) -> UserId {
        self.id
    }
}

/// A persisted role row.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoleRecord {
    pub id: RoleId,
    pub name: RoleName,
}

impl Entity for RoleRecord {
    type Id = RoleId;

    fn id(&self) -> RoleId {
        self.id
    }
}

/// Input of an idempotent user upsert.
///
/// Roles are referenced by name only; the store resolves (or creates) each
/// role inside the same atomic write before attaching it, so an association
/// can never point at a role that is not persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub username: Username,
    pub secret_hash: SecretHash,
    pub enabled: bool,
    pub roles: Vec<RoleName>,
}
