use clap::Parser;
use tracing::info;

use virtuoso_common::Settings;
use virtuoso_executor::CliExecutor;
use virtuoso_web::AppState;

#[derive(Parser, Debug)]
#[command(name = "virtuoso-api", version, about = "Virtuoso gateway HTTP API")]
struct Cli {
    /// Listen address, overriding GATEWAY_LISTEN
    #[arg(long)]
    listen: Option<String>,

    /// Log filter when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cli.log_level.clone()));
    if cli.json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    let mut settings = Settings::from_env()?;
    if let Some(listen) = cli.listen {
        settings.listen = listen;
    }

    info!(
        environment = %settings.environment,
        cli_path = %settings.cli_path.display(),
        "starting Virtuoso gateway"
    );

    let executor = CliExecutor::new(&settings)?;
    let state = AppState::new(settings, executor);

    virtuoso_web::serve(state).await
}
