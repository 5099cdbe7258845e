use anyhow::Context;

use rolegate_api::{app, config::ApiConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rolegate_observability::init();

    let config = ApiConfig::from_env().context("loading configuration")?;
    tracing::debug!(?config, "configuration loaded");

    let state = app::build_state(&config).await?;
    let app = app::build_app(state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;

    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app).await.context("server terminated")?;
    Ok(())
}
