//! Runtime configuration from environment variables.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, bail};

use rolegate_auth::{Argon2SecretHasher, HasherConfig};

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

#[derive(Clone)]
pub struct ApiConfig {
    pub bind_addr: SocketAddr,
    /// Postgres store when set; in-memory store otherwise.
    pub database_url: Option<String>,
    pub pepper: Option<String>,
    pub seed_file: Option<PathBuf>,
    pub policy_file: Option<PathBuf>,
    pub demo_seed: bool,
    pub hasher: HasherConfig,
}

impl ApiConfig {
    /// Read `ROLEGATE_*` and `DATABASE_URL` from the process environment.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let bind_addr = non_empty("ROLEGATE_BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr: SocketAddr = bind_addr
            .parse()
            .with_context(|| format!("ROLEGATE_BIND_ADDR is not a socket address: {bind_addr}"))?;

        let demo_seed = match non_empty("ROLEGATE_DEMO_SEED") {
            None => false,
            Some(raw) => parse_flag(&raw)
                .with_context(|| format!("ROLEGATE_DEMO_SEED must be a boolean, got {raw:?}"))?,
        };

        let defaults = HasherConfig::default();
        let cost = |key: &str, default: u32| -> anyhow::Result<u32> {
            match non_empty(key) {
                None => Ok(default),
                Some(raw) => raw
                    .trim()
                    .parse::<u32>()
                    .with_context(|| format!("{key} must be a positive integer, got {raw:?}")),
            }
        };
        let hasher = HasherConfig {
            memory_kib: cost("ROLEGATE_ARGON2_MEMORY_KIB", defaults.memory_kib)?,
            iterations: cost("ROLEGATE_ARGON2_ITERATIONS", defaults.iterations)?,
            parallelism: cost("ROLEGATE_ARGON2_PARALLELISM", defaults.parallelism)?,
        };
        // Argon2 must accept the combination.
        Argon2SecretHasher::new(hasher).context("invalid ROLEGATE_ARGON2_* cost parameters")?;

        Ok(Self {
            bind_addr,
            database_url: non_empty("DATABASE_URL"),
            pepper: non_empty("ROLEGATE_PASSWORD_PEPPER"),
            seed_file: non_empty("ROLEGATE_SEED_FILE").map(PathBuf::from),
            policy_file: non_empty("ROLEGATE_POLICY_FILE").map(PathBuf::from),
            demo_seed,
            hasher,
        })
    }
}

impl core::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("bind_addr", &self.bind_addr)
            .field("database", &self.database_url.is_some())
            .field("peppered", &self.pepper.is_some())
            .field("seed_file", &self.seed_file)
            .field("policy_file", &self.policy_file)
            .field("demo_seed", &self.demo_seed)
            .field("hasher", &self.hasher)
            .finish()
    }
}

fn parse_flag(raw: &str) -> anyhow::Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => bail!("unrecognised flag value"),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> anyhow::Result<ApiConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ApiConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.bind_addr.to_string(), DEFAULT_BIND_ADDR);
        assert!(cfg.database_url.is_none());
        assert!(cfg.pepper.is_none());
        assert!(!cfg.demo_seed);
        assert_eq!(cfg.hasher, HasherConfig::default());
    }

    #[test]
    fn reads_every_variable() {
        let cfg = config(&[
            ("ROLEGATE_BIND_ADDR", "127.0.0.1:9000"),
            ("DATABASE_URL", "postgres://localhost/rolegate"),
            ("ROLEGATE_PASSWORD_PEPPER", "pepper"),
            ("ROLEGATE_SEED_FILE", "/etc/rolegate/seed.json"),
            ("ROLEGATE_POLICY_FILE", "/etc/rolegate/policy.json"),
            ("ROLEGATE_DEMO_SEED", "yes"),
            ("ROLEGATE_ARGON2_MEMORY_KIB", "65536"),
            ("ROLEGATE_ARGON2_ITERATIONS", "3"),
            ("ROLEGATE_ARGON2_PARALLELISM", "2"),
        ])
        .unwrap();

        assert_eq!(cfg.bind_addr.port(), 9000);
        assert_eq!(cfg.database_url.as_deref(), Some("postgres://localhost/rolegate"));
        assert_eq!(cfg.pepper.as_deref(), Some("pepper"));
        assert_eq!(cfg.seed_file, Some(PathBuf::from("/etc/rolegate/seed.json")));
        assert_eq!(cfg.policy_file, Some(PathBuf::from("/etc/rolegate/policy.json")));
        assert!(cfg.demo_seed);
        assert_eq!(
            cfg.hasher,
            HasherConfig {
                memory_kib: 65536,
                iterations: 3,
                parallelism: 2,
            }
        );
    }

    #[test]
    fn argon2_costs_fall_back_individually() {
        let cfg = config(&[("ROLEGATE_ARGON2_ITERATIONS", "4")]).unwrap();
        assert_eq!(cfg.hasher.iterations, 4);
        assert_eq!(cfg.hasher.memory_kib, HasherConfig::default().memory_kib);
        assert_eq!(cfg.hasher.parallelism, HasherConfig::default().parallelism);
    }

    #[test]
    fn blank_values_count_as_unset() {
        let cfg = config(&[("DATABASE_URL", "  "), ("ROLEGATE_DEMO_SEED", "")]).unwrap();
        assert!(cfg.database_url.is_none());
        assert!(!cfg.demo_seed);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(config(&[("ROLEGATE_BIND_ADDR", "localhost")]).is_err());
        assert!(config(&[("ROLEGATE_DEMO_SEED", "maybe")]).is_err());
        assert!(config(&[("ROLEGATE_ARGON2_MEMORY_KIB", "lots")]).is_err());
        assert!(config(&[("ROLEGATE_ARGON2_ITERATIONS", "-1")]).is_err());
        // Parses, but Argon2 refuses zero passes.
        assert!(config(&[("ROLEGATE_ARGON2_ITERATIONS", "0")]).is_err());
    }

    #[test]
    fn debug_hides_secrets() {
        let cfg = config(&[
            ("DATABASE_URL", "postgres://rolegate:hunter2@db/rolegate"),
            ("ROLEGATE_PASSWORD_PEPPER", "pepper-value"),
        ])
        .unwrap();
        let rendered = format!("{cfg:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("pepper-value"));
    }
}
