use std::collections::{BTreeSet, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;

use rolegate_auth::{NewUser, RoleName, RoleRecord, UserRecord, Username};
use rolegate_core::{Entity, RoleId, UserId};

use super::r#trait::{IdentityStore, StoreError, UpsertOutcome};

/// Flat tables plus unique indexes; the association is a set of id pairs.
#[derive(Debug, Default)]
struct Tables {
    users: HashMap<UserId, UserRecord>,
    users_by_name: HashMap<String, UserId>,
    roles: HashMap<RoleId, RoleRecord>,
    roles_by_name: HashMap<String, RoleId>,
    user_roles: BTreeSet<(UserId, RoleId)>,
}

impl Tables {
    fn role_or_insert(&mut self, name: &RoleName) -> RoleRecord {
        if let Some(id) = self.roles_by_name.get(name.as_str()) {
            if let Some(existing) = self.roles.get(id) {
                return existing.clone();
            }
        }

        let record = RoleRecord {
            id: RoleId::new(),
            name: name.clone(),
        };
        self.roles_by_name.insert(name.as_str().to_string(), record.id());
        self.roles.insert(record.id(), record.clone());
        record
    }

    fn user_by_name(&self, username: &str) -> Option<&UserRecord> {
        self.users_by_name
            .get(username)
            .and_then(|id| self.users.get(id))
    }
}

/// In-memory identity store for tests/dev.
///
/// A single `RwLock` guards all tables, so every write operation is atomic
/// and create-or-fetch is serialized per key.
#[derive(Debug, Default)]
pub struct InMemoryIdentityStore {
    tables: RwLock<Tables>,
}

impl InMemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, StoreError> {
        self.tables
            .read()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, StoreError> {
        self.tables
            .write()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))
    }

    /// Number of stored users.
    pub fn user_count(&self) -> Result<usize, StoreError> {
        Ok(self.read()?.users.len())
    }

    /// Number of stored roles.
    pub fn role_count(&self) -> Result<usize, StoreError> {
        Ok(self.read()?.roles.len())
    }
}

impl IdentityStore for InMemoryIdentityStore {
    fn find_user_by_username(&self, username: &str) -> Result<Option<UserRecord>, StoreError> {
        let tables = self.read()?;
        Ok(tables.user_by_name(username).cloned())
    }

    fn find_role_by_name(&self, name: &str) -> Result<Option<RoleRecord>, StoreError> {
        let tables = self.read()?;
        Ok(tables
            .roles_by_name
            .get(name)
            .and_then(|id| tables.roles.get(id))
            .cloned())
    }

    fn create_role_if_absent(&self, name: &str) -> Result<RoleRecord, StoreError> {
        let name = RoleName::parse(name.to_string())?;
        let mut tables = self.write()?;
        Ok(tables.role_or_insert(&name))
    }

    fn upsert_user_with_roles(&self, user: NewUser) -> Result<UpsertOutcome, StoreError> {
        let NewUser {
            username,
            secret_hash,
            enabled,
            roles,
        } = user;

        // Nothing below can fail, so holding the write lock makes the whole
        // upsert one atomic step.
        let mut tables = self.write()?;

        let (record, created) = match tables.user_by_name(username.as_str()) {
            Some(existing) => (existing.clone(), false),
            None => {
                let record = UserRecord {
                    id: UserId::new(),
                    username: username.clone(),
                    secret_hash,
                    enabled,
                    created_at: Utc::now(),
                };
                tables
                    .users_by_name
                    .insert(username.as_str().to_string(), record.id());
                tables.users.insert(record.id(), record.clone());
                (record, true)
            }
        };

        let mut roles_added = Vec::new();
        for name in roles.iter().collect::<BTreeSet<_>>() {
            let role = tables.role_or_insert(name);
            if tables.user_roles.insert((record.id(), role.id())) {
                roles_added.push(role.name);
            }
        }

        Ok(UpsertOutcome {
            user: record,
            created,
            roles_added,
        })
    }

    fn roles_of(&self, user_id: UserId) -> Result<Vec<RoleRecord>, StoreError> {
        let tables = self.read()?;
        let mut roles: Vec<RoleRecord> = tables
            .user_roles
            .range((user_id, RoleId::from_uuid(uuid::Uuid::nil()))..)
            .take_while(|(u, _)| *u == user_id)
            .filter_map(|(_, role_id)| tables.roles.get(role_id).cloned())
            .collect();
        roles.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(roles)
    }

    fn assign_role(&self, username: &Username, role: &RoleName) -> Result<bool, StoreError> {
        let mut tables = self.write()?;
        let user_id = tables
            .user_by_name(username.as_str())
            .map(Entity::id)
            .ok_or_else(|| StoreError::UnknownUser(username.to_string()))?;

        let role = tables.role_or_insert(role);
        Ok(tables.user_roles.insert((user_id, role.id())))
    }
}
