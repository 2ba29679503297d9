//! # Heist Sim
//!
//! Headless harness for the encounter core. Builds a small mansion in memory,
//! walks a crew through it and prints the run summary as JSON.
//!
//! Usage: `heist-sim [settings.toml]`. Log verbosity follows `RUST_LOG`.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

mod mansion;
mod run;
mod settings;

use std::path::PathBuf;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::run::HeistRun;
use crate::settings::SimSettings;

/// Main entry point.
fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive("heist=info".parse()?))
        .init();

    info!("Heist sim starting...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let path = std::env::args_os().nth(1).map(PathBuf::from);
    let settings = SimSettings::load(path.as_deref())?;
    info!(
        "Running {:.0}s at {:.3}s per tick with {} pursuers and {} grimoires",
        settings.run.duration_seconds, settings.run.tick_seconds, settings.run.pursuers, settings.run.grimoires
    );

    let summary = HeistRun::new(settings).run();
    println!("{}", serde_json::to_string_pretty(&summary)?);

    info!("Heist sim finished after {} ticks", summary.ticks);
    Ok(())
}
