//! bridgectl: install, supervise and certify the bridge agent.
//!
//! # Usage
//!
//! ```text
//! bridgectl service install [--executable P] [--config P] [--name N]
//! bridgectl service uninstall|start|stop|restart [--name N]
//! bridgectl service status [--name N] [--json]
//! bridgectl service descriptor [--executable P] [--config P]
//! bridgectl service logs [--lines N] [--stderr-only]
//! bridgectl trust sign|verify <binary>
//! bridgectl trust notarize <binary>
//! bridgectl trust staple <binary> --submission <ID>
//! bridgectl trust status <tracking-id>
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use bridge_core::CancelToken;
use commands::{service::ServiceCommand, trust::TrustCommand};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "bridgectl",
    version,
    about = "Manage the bridge agent service and certify its binary",
    long_about = None,
)]
struct Cli {
    /// Log filter used when RUST_LOG is unset (e.g. `debug`, `bridge_service=trace`).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Install, control and inspect the bridge under the service supervisor.
    Service {
        #[command(subcommand)]
        command: ServiceCommand,
    },

    /// Sign, notarize and staple a bridge binary.
    Trust {
        #[command(subcommand)]
        command: TrustCommand,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let cancel = CancelToken::new();
    let on_interrupt = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || on_interrupt.cancel()) {
        tracing::warn!("could not install Ctrl-C handler: {e}");
    }

    match cli.command {
        Commands::Service { command } => commands::service::run(command, cancel),
        Commands::Trust { command } => commands::trust::run(command, cancel),
    }
}

fn init_tracing(default_level: &str) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
