//! Application wiring: store, hasher, policy table and router.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use axum::{Router, routing::get};
use sqlx::PgPool;
use tower::ServiceBuilder;
use tracing::{info, warn};

use rolegate_auth::{
    Argon2SecretHasher, HashError, PolicyRule, PolicyTable, SecretHasher,
};
use rolegate_infra::{
    IdentityStore, InMemoryIdentityStore, PostgresIdentityStore, PrincipalResolver, SeedReport,
    SeedUser, seed,
};

use crate::{config::ApiConfig, middleware, routes};

pub type ApiResolver = PrincipalResolver<Arc<dyn IdentityStore>, Arc<dyn SecretHasher>>;

/// Shared, read-only per-request state.
#[derive(Clone)]
pub struct AppState {
    pub resolver: Arc<ApiResolver>,
    pub policy: Arc<PolicyTable>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn IdentityStore>,
        hasher: Arc<dyn SecretHasher>,
        policy: PolicyTable,
    ) -> Result<Self, HashError> {
        Ok(Self {
            resolver: Arc::new(PrincipalResolver::new(store, hasher)?),
            policy: Arc::new(policy),
        })
    }

    pub fn store(&self) -> &Arc<dyn IdentityStore> {
        self.resolver.store()
    }
}

/// Build the HTTP router (public entrypoint used by `main.rs` and the tests).
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(routes::home))
        .route("/user", get(routes::user_home))
        .route("/admin", get(routes::admin_home))
        .route("/me", get(routes::me))
        .route("/explain", get(routes::explain))
        .fallback(routes::not_found)
        .layer(ServiceBuilder::new().layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::gate,
        )))
        .with_state(state)
}

/// Assemble the state described by `config`: pick the store, build the hasher,
/// load the policy table and apply any configured seed.
pub async fn build_state(config: &ApiConfig) -> anyhow::Result<AppState> {
    let hasher: Arc<dyn SecretHasher> = match &config.pepper {
        Some(pepper) => Arc::new(
            Argon2SecretHasher::with_pepper(config.hasher, pepper.as_bytes())
                .context("configuring peppered hasher")?,
        ),
        None => Arc::new(Argon2SecretHasher::new(config.hasher).context("configuring hasher")?),
    };

    let store: Arc<dyn IdentityStore> = match &config.database_url {
        Some(url) => {
            let pool = PgPool::connect(url)
                .await
                .context("connecting to Postgres")?;
            let store = PostgresIdentityStore::new(pool);
            store.migrate().await.context("creating identity tables")?;
            info!("using Postgres identity store");
            Arc::new(store)
        }
        None => {
            warn!("DATABASE_URL not set; identities are kept in memory");
            Arc::new(InMemoryIdentityStore::new())
        }
    };

    let policy = match &config.policy_file {
        Some(path) => load_policy(path)?,
        None => PolicyTable::standard(),
    };
    info!(rules = policy.len(), "policy table loaded");

    let mut seed_users = Vec::new();
    if config.demo_seed {
        seed_users.extend(SeedUser::demo_defaults());
    }
    if let Some(path) = &config.seed_file {
        seed_users.extend(load_seed_users(path)?);
    }
    if !seed_users.is_empty() {
        let report = apply_seed_users(Arc::clone(&store), Arc::clone(&hasher), seed_users).await?;
        info!(?report, "startup seed complete");
    }

    AppState::new(store, hasher, policy).context("preparing principal resolver")
}

/// Parse a JSON policy document (an ordered list of rules).
pub fn load_policy(path: &Path) -> anyhow::Result<PolicyTable> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading policy file {}", path.display()))?;
    parse_policy(&raw).with_context(|| format!("loading policy file {}", path.display()))
}

pub fn parse_policy(raw: &str) -> anyhow::Result<PolicyTable> {
    let rules: Vec<PolicyRule> = serde_json::from_str(raw).context("policy document is not valid JSON")?;
    Ok(PolicyTable::from_rules(rules)?)
}

pub fn load_seed_users(path: &Path) -> anyhow::Result<Vec<SeedUser>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading seed file {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing seed file {}", path.display()))
}

/// Run seeding on the blocking pool (hashing and the synchronous store).
pub async fn apply_seed_users(
    store: Arc<dyn IdentityStore>,
    hasher: Arc<dyn SecretHasher>,
    users: Vec<SeedUser>,
) -> anyhow::Result<SeedReport> {
    let report = tokio::task::spawn_blocking(move || seed(&*store, &*hasher, &users))
        .await
        .context("seed task panicked")?
        .context("seeding identities")?;
    Ok(report)
}
