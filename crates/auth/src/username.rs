use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Longest username the identity schema stores (in characters).
pub const MAX_USERNAME_LEN: usize = 50;

/// Validated, case-sensitive account name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Username(String);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UsernameError {
    #[error("username is empty")]
    Empty,

    #[error("username is {len} characters long (max 50)")]
    TooLong { len: usize },

    #[error("username has leading or trailing whitespace")]
    SurroundingWhitespace,
}

impl Username {
    pub fn parse(raw: impl Into<String>) -> Result<Self, UsernameError> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(UsernameError::Empty);
        }
        if raw.trim() != raw {
            return Err(UsernameError::SurroundingWhitespace);
        }
        let len = raw.chars().count();
        if len > MAX_USERNAME_LEN {
            return Err(UsernameError::TooLong { len });
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Username {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Username {
    type Error = UsernameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<Username> for String {
    fn from(value: Username) -> Self {
        value.0
    }
}
