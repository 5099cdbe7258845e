//! HTTP adapter: Basic credentials in, policy verdicts out.

pub mod app;
pub mod config;
pub mod errors;
pub mod middleware;
pub mod routes;
