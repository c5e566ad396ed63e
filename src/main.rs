use drayman::{Config, Orchestrator};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let path = std::env::args().nth(1);
    let config = match Config::load(path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "failed to load configuration");
            std::process::exit(1);
        }
    };

    let orchestrator = match Orchestrator::connect(config).await {
        Ok(orchestrator) => orchestrator,
        Err(e) => {
            tracing::error!(error = %e, "failed to start orchestrator");
            std::process::exit(1);
        }
    };

    if let Err(e) = orchestrator.run().await {
        tracing::warn!(error = %e, "shutdown incomplete");
    }
}
