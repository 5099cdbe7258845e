use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Literal prefix every role name carries.
pub const ROLE_PREFIX: &str = "ROLE_";

/// Longest accepted role name, in characters (prefix included).
pub const MAX_ROLE_NAME_LEN: usize = 50;

/// Validated role name used for RBAC (e.g. `ROLE_ADMIN`).
///
/// A `RoleName` can only be built through [`RoleName::parse`], so holding one
/// proves the `ROLE_` prefix is present. Comparisons are exact: nothing ever
/// adds or strips the prefix on the caller's behalf.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoleName(Cow<'static, str>);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RoleNameError {
    #[error("role name '{0}' must start with 'ROLE_'")]
    MissingPrefix(String),

    #[error("role name '{0}' has nothing after 'ROLE_'")]
    EmptySuffix(String),

    #[error("role name '{0}' contains whitespace")]
    Whitespace(String),

    #[error("role name is {len} characters long (max 50)")]
    TooLong { len: usize },
}

impl RoleName {
    pub fn parse(name: impl Into<Cow<'static, str>>) -> Result<Self, RoleNameError> {
        let name = name.into();
        let Some(suffix) = name.strip_prefix(ROLE_PREFIX) else {
            return Err(RoleNameError::MissingPrefix(name.into_owned()));
        };
        if suffix.is_empty() {
            return Err(RoleNameError::EmptySuffix(name.into_owned()));
        }
        if name.chars().any(char::is_whitespace) {
            return Err(RoleNameError::Whitespace(name.into_owned()));
        }
        let len = name.chars().count();
        if len > MAX_ROLE_NAME_LEN {
            return Err(RoleNameError::TooLong { len });
        }
        Ok(Self(name))
    }

    /// `ROLE_USER`, the baseline role of every seeded account.
    pub fn user() -> Self {
        Self(Cow::Borrowed("ROLE_USER"))
    }

    /// `ROLE_ADMIN`.
    pub fn admin() -> Self {
        Self(Cow::Borrowed("ROLE_ADMIN"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for RoleName {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl core::str::FromStr for RoleName {
    type Err = RoleNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s.to_owned())
    }
}

impl TryFrom<String> for RoleName {
    type Error = RoleNameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<RoleName> for String {
    fn from(value: RoleName) -> Self {
        value.0.into_owned()
    }
}
