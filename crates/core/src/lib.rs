//! `rolegate-core`: identity building blocks shared by every rolegate crate.
//!
//! This crate contains **pure** primitives (no storage or transport concerns).

pub mod entity;
pub mod error;
pub mod id;

pub use entity::Entity;
pub use error::DomainError;
pub use id::{RoleId, UserId};
