use std::collections::BTreeSet;

use serde::Serialize;

use crate::{RoleName, Username};

/// A fully resolved, authenticated identity.
///
/// Produced once per successful login and never mutated afterwards. It is a
/// plain value: it carries no reference back to the stored user record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    username: Username,
    roles: BTreeSet<RoleName>,
}

impl Principal {
    /// Build a principal; duplicate roles collapse.
    pub fn new(username: Username, roles: impl IntoIterator<Item = RoleName>) -> Self {
        Self {
            username,
            roles: roles.into_iter().collect(),
        }
    }

    pub fn username(&self) -> &Username {
        &self.username
    }

    pub fn roles(&self) -> &BTreeSet<RoleName> {
        &self.roles
    }

    pub fn has_role(&self, role: &RoleName) -> bool {
        self.roles.contains(role)
    }

    /// ANY-of check: true when at least one of `required` is held.
    pub fn has_any_role<'a>(&self, required: impl IntoIterator<Item = &'a RoleName>) -> bool {
        required.into_iter().any(|r| self.roles.contains(r))
    }
}
