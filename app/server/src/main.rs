mod http_server;
mod settings;

use std::sync::Arc;

use settings::ServerSettings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let settings = ServerSettings::from_env()?;
    let pipeline = settings.build_pipeline()?;

    http_server::start_server(&settings.bind_addr, Arc::new(pipeline)).await
}
