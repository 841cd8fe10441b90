//! Shared CLI scaffolding for the `grid-bins` binaries.

use anyhow::Result;
use clap::Parser;
use grid_core::config::{Config, ConfigProfile, ProfileName};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct CommonArgs {
    /// Named profile to load (development, staging, production); overridden
    /// by `--config` when both are given.
    #[arg(long, default_value = "development")]
    pub profile: String,

    /// Path to a TOML config file; takes precedence over `--profile`.
    #[arg(long)]
    pub config: Option<String>,

    /// Override the configured log level.
    #[arg(long)]
    pub log_level: Option<String>,
}

impl CommonArgs {
    pub fn load_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => {
                let profile_name = ProfileName::from_str(&self.profile)
                    .ok_or_else(|| anyhow::anyhow!("unknown profile '{}'", self.profile))?;
                ConfigProfile::load(profile_name)
            }
        };
        if let Some(level) = &self.log_level {
            config.metrics.log_level = level.clone();
        }
        config.validate()?;
        Ok(config)
    }
}

pub fn init_logging(config: &Config) {
    grid_core::utils::init_logger(&config.metrics.log_level, config.metrics.json_logs);
}

/// Install a Ctrl-C handler that flips a shared flag rather than exiting
/// the process outright, so the run loop finishes its current cycle
/// (broadcast/commit are never interrupted mid-flight) before stopping.
pub fn install_shutdown_flag() -> Arc<AtomicBool> {
    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = shutdown.clone();
    ctrlc::set_handler(move || {
        tracing::warn!("shutdown requested, finishing current cycle");
        flag.store(true, Ordering::SeqCst);
    })
    .expect("failed to install Ctrl-C handler");
    shutdown
}
