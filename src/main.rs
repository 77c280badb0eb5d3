//! churnflow entry point

use clap::Parser;
use churnflow::cli::{self, Cli};
use churnflow::config::LogFormat;
use tracing_subscriber::EnvFilter;

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "churnflow=info".into());
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.command.load_config()?;
    init_tracing(cli::log_format(config.as_ref()));

    cli::run(cli.command, config).await
}
