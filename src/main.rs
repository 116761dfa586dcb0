use tracing_subscriber::EnvFilter;

use usage_dashboard::config::{Config, ProcessEnv};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("usage_dashboard=info,tower_http=info")),
        )
        .init();

    let config = Config::from_env(&ProcessEnv);
    usage_dashboard::api::serve(config).await
}
