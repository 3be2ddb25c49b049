use anyhow::Context;

use stockroom_api::config::ApiConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ApiConfig::from_env()?;
    stockroom_observability::init(config.log_format);

    let app = stockroom_api::app::build_app(&config).await?;

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;

    tracing::info!(
        addr = %listener.local_addr().context("listener has no local address")?,
        backend = config.backend.name(),
        "listening"
    );

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
