//! Infrastructure layer: identity storage, principal resolution, seeding.

pub mod identity_store;
pub mod resolver;
pub mod seed;

pub use identity_store::{
    IdentityStore, InMemoryIdentityStore, PostgresIdentityStore, StoreError, UpsertOutcome,
};
pub use resolver::PrincipalResolver;
pub use seed::{
    PlannedUser, SeedError, SeedPlan, SeedReport, SeedUser, apply_seed, plan_seed, seed,
};
