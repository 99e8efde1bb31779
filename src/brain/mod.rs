// ABOUTME: Built-in brains and the factory that picks one from config
// ABOUTME: Echo is a demo handler; exec delegates to an external process over JSON lines

pub mod echo;
pub mod exec;

pub use echo::EchoBrain;
pub use exec::ExecBrain;

use anyhow::{Context, Result};
use std::time::Duration;
use switchboard_core::Brain;

use crate::config::{BrainConfig, BrainKind};

/// Create the brain selected by `[brain] kind`
pub fn build(config: &BrainConfig) -> Result<Box<dyn Brain>> {
    match config.kind {
        BrainKind::Echo => {
            tracing::info!(prefix = %config.prefix, "Using echo brain");
            Ok(Box::new(EchoBrain::new(
                &config.prefix,
                config.announce_channel.clone(),
            )))
        }
        BrainKind::Exec => {
            let command = config
                .command
                .clone()
                .context("brain.command is required for the exec brain")?;
            tracing::info!(command = %command, args = ?config.args, "Using exec brain");
            Ok(Box::new(ExecBrain::new(
                command,
                config.args.clone(),
                Duration::from_millis(config.response_timeout_ms),
            )))
        }
    }
}
