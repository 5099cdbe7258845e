//! Identity storage boundary.
//!
//! Users, roles and the user↔role association are kept as flat tables keyed
//! by id. Callers only ever hand names to the store; ids are assigned and
//! resolved inside it.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryIdentityStore;
pub use postgres::PostgresIdentityStore;
pub use r#trait::{IdentityStore, StoreError, UpsertOutcome};
