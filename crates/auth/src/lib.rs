//! `rolegate-auth`: pure authentication/authorization core.
//!
//! This crate is intentionally decoupled from HTTP and storage: it knows how
//! to hash and verify secrets, what a valid role or username looks like, and
//! how to decide access for a resource. Loading records is the caller's job.

pub mod authorize;
pub mod login;
pub mod password;
pub mod principal;
pub mod roles;
pub mod user;
pub mod username;

pub use authorize::{DecisionExplanation, PolicyError, PolicyRule, PolicyTable, Requirement, ResourcePattern, Verdict};
pub use login::{AuthError, LoginFailure};
pub use password::{Argon2SecretHasher, CorruptCredential, HashError, HasherConfig, SecretHash, SecretHasher};
pub use principal::Principal;
pub use roles::{MAX_ROLE_NAME_LEN, ROLE_PREFIX, RoleName, RoleNameError};
pub use user::{NewUser, RoleRecord, UserRecord};
pub use username::{MAX_USERNAME_LEN, Username, UsernameError};
