//! # Doppelganger Checker
//!
//! Answers whether a validator client may start without risking a
//! doppelganger double-sign.
//!
//! ```text
//! doppelganger-checker --config config/checker.toml
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use checker_runtime::telemetry::init_tracing;
use checker_runtime::{CheckerConfig, CheckerRuntime};

#[derive(Debug, Parser)]
#[command(name = "doppelganger-checker")]
#[command(about = "Doppelganger detection service for validator clients")]
#[command(version)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config/checker.toml")]
    config: PathBuf,

    /// Log filter, overrides the configured level
    #[arg(long)]
    log_level: Option<String>,

    /// Emit JSON logs
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = CheckerConfig::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    if let Some(level) = args.log_level {
        config.log_level = level;
    }
    config.json_logs |= args.json_logs;

    init_tracing(&config.log_level, config.json_logs)?;

    let runtime = Arc::new(CheckerRuntime::new(config));
    let mut server = tokio::spawn({
        let runtime = Arc::clone(&runtime);
        async move { runtime.run().await }
    });

    info!("Doppelganger checker running. Press Ctrl+C to stop.");
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("listening for Ctrl+C")?;
            runtime.shutdown();
        }
        // server exited on its own, e.g. the port was taken
        joined = &mut server => {
            joined.context("server task panicked")??;
            return Ok(());
        }
    }

    if let Err(e) = server.await.context("server task panicked")? {
        error!(error = %e, "server stopped with an error");
        return Err(e.into());
    }
    Ok(())
}
