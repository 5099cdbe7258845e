use std::sync::Arc;

use thiserror::Error;

use rolegate_auth::{NewUser, RoleName, RoleNameError, RoleRecord, UserRecord, Username};
use rolegate_core::UserId;

/// Identity store operation error.
///
/// These are **storage-side** failures. "No such user" is not one of them:
/// lookups return `Ok(None)` for absent keys.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A role name without the `ROLE_` prefix reached a write operation.
    /// Configuration bug; fatal at startup.
    #[error("invalid role name: {0}")]
    InvalidRoleName(#[from] RoleNameError),

    /// Role assignment targeted a username that has no row.
    #[error("unknown user '{0}'")]
    UnknownUser(String),

    /// The backing store could not be reached (connection refused, pool
    /// closed, lock poisoned). Nothing is retried here.
    #[error("identity store unavailable: {0}")]
    Unavailable(String),

    /// A stored row violates a domain rule (e.g. role name without prefix).
    #[error("corrupt row in {table}: {message}")]
    CorruptRow { table: &'static str, message: String },

    /// The store refused a value (too long for its column, bad encoding).
    /// Retrying the same write fails the same way.
    #[error("value rejected in {operation}: {message}")]
    Rejected { operation: String, message: String },
}

/// Result of an idempotent user upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertOutcome {
    /// The canonical user row (pre-existing or freshly created).
    pub user: UserRecord,
    /// Whether this call created the user.
    pub created: bool,
    /// Roles this call attached (empty when the user already held them all).
    pub roles_added: Vec<RoleName>,
}

/// Persistent users, roles and their association.
///
/// ## Uniqueness
///
/// `username` and role `name` are unique keys. Create-or-fetch operations are
/// atomic per key: when two callers race to create the same key, both get
/// the same canonical row back.
///
/// ## Atomicity
///
/// Every write is all-or-nothing. In particular `upsert_user_with_roles`
/// resolves or creates each role, creates the user if needed and attaches the
/// roles in one unit, so no association row can reference a role that was not
/// persisted.
///
/// ## Idempotence
///
/// Re-running an upsert never duplicates rows and never overwrites an existing
/// user's secret hash or enabled flag; it only adds missing roles.
pub trait IdentityStore: Send + Sync {
    /// Exact, case-sensitive lookup. Absence is `Ok(None)`.
    fn find_user_by_username(&self, username: &str) -> Result<Option<UserRecord>, StoreError>;

    fn find_role_by_name(&self, name: &str) -> Result<Option<RoleRecord>, StoreError>;

    /// Create the role unless it exists; return the canonical row either way.
    fn create_role_if_absent(&self, name: &str) -> Result<RoleRecord, StoreError>;

    fn upsert_user_with_roles(&self, user: NewUser) -> Result<UpsertOutcome, StoreError>;

    /// Roles associated with a user, ordered by name.
    fn roles_of(&self, user_id: UserId) -> Result<Vec<RoleRecord>, StoreError>;

    /// Attach a role (created if absent) to an existing user.
    ///
    /// Returns `false` when the user already held the role.
    fn assign_role(&self, username: &Username, role: &RoleName) -> Result<bool, StoreError>;
}

impl<S> IdentityStore for Arc<S>
where
    S: IdentityStore + ?Sized,
{
    fn find_user_by_username(&self, username: &str) -> Result<Option<UserRecord>, StoreError> {
        (**self).find_user_by_username(username)
    }

    fn find_role_by_name(&self, name: &str) -> Result<Option<RoleRecord>, StoreError> {
        (**self).find_role_by_name(name)
    }

    fn create_role_if_absent(&self, name: &str) -> Result<RoleRecord, StoreError> {
        (**self).create_role_if_absent(name)
    }

    fn upsert_user_with_roles(&self, user: NewUser) -> Result<UpsertOutcome, StoreError> {
        (**self).upsert_user_with_roles(user)
    }

    fn roles_of(&self, user_id: UserId) -> Result<Vec<RoleRecord>, StoreError> {
        (**self).roles_of(user_id)
    }

    fn assign_role(&self, username: &Username, role: &RoleName) -> Result<bool, StoreError> {
        (**self).assign_role(username, role)
    }
}
