//! Declarative identity seeding.
//!
//! Seeding is split in two steps:
//!
//! 1. [`plan_seed`] validates the desired state and diffs it against the
//!    store, producing a [`SeedPlan`] of the minimal writes.
//! 2. [`apply_seed`] executes the plan through the idempotent store
//!    operations.
//!
//! Running [`seed`] repeatedly with the same input converges: the second run
//! plans nothing. Existing users keep their secret and enabled flag; only
//! missing roles are attached.

use std::collections::{BTreeMap, BTreeSet};

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, instrument};

use rolegate_auth::{
    HashError, NewUser, RoleName, RoleNameError, SecretHasher, Username, UsernameError,
};
use rolegate_core::Entity;

use crate::identity_store::{IdentityStore, StoreError};

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("seed user '{username}' has an invalid role: {source}")]
    InvalidRoleName {
        username: String,
        #[source]
        source: RoleNameError,
    },

    #[error("invalid seed username '{username}': {source}")]
    InvalidUsername {
        username: String,
        #[source]
        source: UsernameError,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Hash(#[from] HashError),
}

fn default_enabled() -> bool {
    true
}

/// One desired user, as read from a seed document.
#[derive(Clone, Deserialize)]
pub struct SeedUser {
    pub username: String,
    pub password: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl SeedUser {
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        roles: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            enabled: true,
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }

    /// `user`/`password` with `ROLE_USER`, and `admin`/`admin` with
    /// `ROLE_ADMIN` and `ROLE_USER`.
    pub fn demo_defaults() -> Vec<SeedUser> {
        vec![
            SeedUser::new("user", "password", ["ROLE_USER"]),
            SeedUser::new("admin", "admin", ["ROLE_ADMIN", "ROLE_USER"]),
        ]
    }
}

impl core::fmt::Debug for SeedUser {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SeedUser")
            .field("username", &self.username)
            .field("enabled", &self.enabled)
            .field("roles", &self.roles)
            .finish_non_exhaustive()
    }
}

/// A user the plan will create. Holds the plaintext until apply hashes it.
#[derive(Clone, PartialEq, Eq)]
pub struct PlannedUser {
    pub username: Username,
    password: String,
    pub enabled: bool,
    pub roles: Vec<RoleName>,
}

impl core::fmt::Debug for PlannedUser {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PlannedUser")
            .field("username", &self.username)
            .field("enabled", &self.enabled)
            .field("roles", &self.roles)
            .finish_non_exhaustive()
    }
}

/// Minimal writes that bring the store to the desired state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedPlan {
    pub roles_to_create: Vec<RoleName>,
    pub users_to_create: Vec<PlannedUser>,
    pub roles_to_attach: Vec<(Username, RoleName)>,
}

impl SeedPlan {
    pub fn is_empty(&self) -> bool {
        self.roles_to_create.is_empty()
            && self.users_to_create.is_empty()
            && self.roles_to_attach.is_empty()
    }
}

/// What [`apply_seed`] actually wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub roles_created: usize,
    pub users_created: usize,
    pub roles_attached: usize,
}

struct DesiredUser<'a> {
    username: Username,
    password: &'a str,
    enabled: bool,
    roles: BTreeSet<RoleName>,
}

/// Validate every entry, then diff against the store.
///
/// Validation runs over the whole input before the store is touched, so an
/// invalid role name anywhere aborts with nothing planned. When the same
/// username appears twice, the first entry's secret and flag win and the
/// roles are merged.
#[instrument(skip_all, fields(users = users.len()), err)]
pub fn plan_seed<S>(store: &S, users: &[SeedUser]) -> Result<SeedPlan, SeedError>
where
    S: IdentityStore + ?Sized,
{
    let mut desired: BTreeMap<String, DesiredUser<'_>> = BTreeMap::new();
    for user in users {
        let username =
            Username::parse(user.username.clone()).map_err(|source| SeedError::InvalidUsername {
                username: user.username.clone(),
                source,
            })?;
        let roles = user
            .roles
            .iter()
            .map(|r| RoleName::parse(r.clone()))
            .collect::<Result<BTreeSet<_>, _>>()
            .map_err(|source| SeedError::InvalidRoleName {
                username: user.username.clone(),
                source,
            })?;

        desired
            .entry(username.as_str().to_string())
            .and_modify(|d| d.roles.extend(roles.iter().cloned()))
            .or_insert(DesiredUser {
                username,
                password: &user.password,
                enabled: user.enabled,
                roles,
            });
    }

    let mut plan = SeedPlan::default();

    let all_roles: BTreeSet<&RoleName> = desired.values().flat_map(|d| &d.roles).collect();
    for role in all_roles {
        if store.find_role_by_name(role.as_str())?.is_none() {
            plan.roles_to_create.push(role.clone());
        }
    }

    for d in desired.into_values() {
        match store.find_user_by_username(d.username.as_str())? {
            None => plan.users_to_create.push(PlannedUser {
                username: d.username,
                password: d.password.to_string(),
                enabled: d.enabled,
                roles: d.roles.into_iter().collect(),
            }),
            Some(existing) => {
                let held: BTreeSet<RoleName> = store
                    .roles_of(existing.id())?
                    .into_iter()
                    .map(|r| r.name)
                    .collect();
                for role in d.roles.difference(&held) {
                    plan.roles_to_attach.push((d.username.clone(), role.clone()));
                }
            }
        }
    }

    debug!(
        roles = plan.roles_to_create.len(),
        users = plan.users_to_create.len(),
        attachments = plan.roles_to_attach.len(),
        "seed planned"
    );
    Ok(plan)
}

/// Execute a plan. Secrets are hashed only for users being created.
///
/// Every write is idempotent, so applying a stale plan (or the same plan
/// twice) is harmless; the report counts what this call actually changed.
#[instrument(skip_all, err)]
pub fn apply_seed<S, H>(store: &S, hasher: &H, plan: SeedPlan) -> Result<SeedReport, SeedError>
where
    S: IdentityStore + ?Sized,
    H: SecretHasher + ?Sized,
{
    let mut report = SeedReport::default();

    for role in &plan.roles_to_create {
        if store.find_role_by_name(role.as_str())?.is_none() {
            store.create_role_if_absent(role.as_str())?;
            report.roles_created += 1;
        }
    }

    for user in plan.users_to_create {
        let secret_hash = hasher.hash(&user.password)?;
        let outcome = store.upsert_user_with_roles(NewUser {
            username: user.username,
            secret_hash,
            enabled: user.enabled,
            roles: user.roles,
        })?;
        if outcome.created {
            report.users_created += 1;
        }
        report.roles_attached += outcome.roles_added.len();
    }

    for (username, role) in &plan.roles_to_attach {
        if store.assign_role(username, role)? {
            report.roles_attached += 1;
        }
    }

    Ok(report)
}

/// Plan and apply in one go.
pub fn seed<S, H>(store: &S, hasher: &H, users: &[SeedUser]) -> Result<SeedReport, SeedError>
where
    S: IdentityStore + ?Sized,
    H: SecretHasher + ?Sized,
{
    let plan = plan_seed(store, users)?;
    let report = apply_seed(store, hasher, plan)?;
    info!(
        roles_created = report.roles_created,
        users_created = report.users_created,
        roles_attached = report.roles_attached,
        "identity seed applied"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use rolegate_auth::{Argon2SecretHasher, HasherConfig, SecretHash};

    use super::*;
    use crate::identity_store::InMemoryIdentityStore;

    fn hasher() -> Argon2SecretHasher {
        Argon2SecretHasher::new(HasherConfig::minimal()).unwrap()
    }

    fn role_names(store: &InMemoryIdentityStore, username: &str) -> Vec<String> {
        let user = store.find_user_by_username(username).unwrap().unwrap();
        store
            .roles_of(user.id())
            .unwrap()
            .into_iter()
            .map(|r| r.name.to_string())
            .collect()
    }

    #[test]
    fn demo_seed_creates_both_accounts() {
        let store = InMemoryIdentityStore::new();
        let report = seed(&store, &hasher(), &SeedUser::demo_defaults()).unwrap();

        assert_eq!(
            report,
            SeedReport {
                roles_created: 2,
                users_created: 2,
                roles_attached: 3,
            }
        );
        assert_eq!(role_names(&store, "user"), vec!["ROLE_USER"]);
        assert_eq!(role_names(&store, "admin"), vec!["ROLE_ADMIN", "ROLE_USER"]);
    }

    #[test]
    fn seeding_twice_changes_nothing() {
        let store = InMemoryIdentityStore::new();
        let h = hasher();
        seed(&store, &h, &SeedUser::demo_defaults()).unwrap();

        let plan = plan_seed(&store, &SeedUser::demo_defaults()).unwrap();
        assert!(plan.is_empty());

        let report = seed(&store, &h, &SeedUser::demo_defaults()).unwrap();
        assert_eq!(report, SeedReport::default());
        assert_eq!(store.user_count().unwrap(), 2);
        assert_eq!(store.role_count().unwrap(), 2);
    }

    #[test]
    fn reseeding_with_more_roles_takes_the_union() {
        let store = InMemoryIdentityStore::new();
        let h = hasher();
        seed(&store, &h, &[SeedUser::new("carol", "pw", ["ROLE_USER"])]).unwrap();

        let plan = plan_seed(&store, &[SeedUser::new("carol", "pw", ["ROLE_AUDITOR"])]).unwrap();
        assert!(plan.users_to_create.is_empty());
        assert_eq!(plan.roles_to_create.len(), 1);
        assert_eq!(plan.roles_to_attach.len(), 1);

        let report = apply_seed(&store, &h, plan).unwrap();
        assert_eq!(report.roles_attached, 1);
        assert_eq!(role_names(&store, "carol"), vec!["ROLE_AUDITOR", "ROLE_USER"]);
    }

    #[test]
    fn existing_credentials_are_never_overwritten() {
        let store = InMemoryIdentityStore::new();
        let h = hasher();
        seed(&store, &h, &[SeedUser::new("dave", "original", ["ROLE_USER"])]).unwrap();
        let before: SecretHash = store
            .find_user_by_username("dave")
            .unwrap()
            .unwrap()
            .secret_hash;

        let mut changed = SeedUser::new("dave", "replacement", ["ROLE_USER"]);
        changed.enabled = false;
        seed(&store, &h, &[changed]).unwrap();

        let after = store.find_user_by_username("dave").unwrap().unwrap();
        assert_eq!(after.secret_hash, before);
        assert!(after.enabled);
        assert_eq!(h.verify("original", &after.secret_hash), Ok(true));
    }

    #[test]
    fn invalid_role_aborts_before_any_write() {
        let store = InMemoryIdentityStore::new();
        let err = seed(
            &store,
            &hasher(),
            &[
                SeedUser::new("erin", "pw", ["ROLE_USER"]),
                SeedUser::new("frank", "pw", ["ADMIN"]),
            ],
        )
        .unwrap_err();

        assert!(matches!(
            err,
            SeedError::InvalidRoleName { ref username, .. } if username == "frank"
        ));
        assert_eq!(store.user_count().unwrap(), 0);
        assert_eq!(store.role_count().unwrap(), 0);
    }

    #[test]
    fn invalid_username_is_reported() {
        let store = InMemoryIdentityStore::new();
        let err = plan_seed(&store, &[SeedUser::new(" padded ", "pw", ["ROLE_USER"])]).unwrap_err();
        assert!(matches!(err, SeedError::InvalidUsername { .. }));
    }

    #[test]
    fn duplicate_entries_merge_roles() {
        let store = InMemoryIdentityStore::new();
        let report = seed(
            &store,
            &hasher(),
            &[
                SeedUser::new("gina", "pw", ["ROLE_USER"]),
                SeedUser::new("gina", "other", ["ROLE_ADMIN"]),
            ],
        )
        .unwrap();

        assert_eq!(report.users_created, 1);
        assert_eq!(role_names(&store, "gina"), vec!["ROLE_ADMIN", "ROLE_USER"]);
    }

    #[test]
    fn seed_document_parses_with_defaults() {
        let users: Vec<SeedUser> = serde_json::from_str(
            r#"[
                { "username": "user", "password": "password", "roles": ["ROLE_USER"] },
                { "username": "old", "password": "x", "enabled": false }
            ]"#,
        )
        .unwrap();

        assert!(users[0].enabled);
        assert!(!users[1].enabled);
        assert!(users[1].roles.is_empty());
    }

    #[test]
    fn debug_output_hides_passwords() {
        let rendered = format!("{:?}", SeedUser::new("user", "hunter2", ["ROLE_USER"]));
        assert!(!rendered.contains("hunter2"));
    }
}
