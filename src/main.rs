use anyhow::Result;
use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod cli;
mod commands;
mod config;
mod layout;
mod ledger;
mod models;
mod session;
mod topology;
mod utils;

use cli::{Cli, Commands};
use config::Config;

/// Stderr logging, plus a daily log file when the config names a directory.
/// The returned guard flushes the file writer on drop.
fn init_tracing(config: &Config) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr = fmt::layer().with_writer(std::io::stderr);

    match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "deskgrid.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr)
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry().with(filter).with(stderr).init();
            None
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config)?;
    let _guard = init_tracing(&config);

    match cli.command {
        Commands::Apply(args) => commands::apply::execute(args, &config).await,
        Commands::Reconcile(args) => commands::reconcile::execute(args, &config).await,
        Commands::Assign(args) => commands::assign::execute(args, &config).await,
        Commands::Release(args) => commands::release::execute(args, &config).await,
        Commands::Assignments(args) => commands::assignments::execute(args, &config).await,
        Commands::Capture(args) => commands::capture::execute(args, &config).await,
        Commands::Sessions => commands::sessions::execute(&config).await,
        Commands::Down(args) => commands::down::execute(args, &config).await,
        Commands::Attach(args) => commands::attach::execute(args, &config).await,
        Commands::Layout(args) => commands::layout::execute(args).await,
    }
}
