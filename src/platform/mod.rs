// ABOUTME: Chat platform implementations and the factory that picks one from config
// ABOUTME: Console is always available; Slack is behind the `slack` feature

pub mod console;
#[cfg(feature = "slack")]
pub mod slack;

pub use console::ConsolePlatform;
#[cfg(feature = "slack")]
pub use slack::SlackPlatform;

use anyhow::Result;
use switchboard_core::Platform;

use crate::config::{Config, PlatformKind};

/// Create the platform selected by `[platform] kind`
pub fn build(config: &Config) -> Result<Box<dyn Platform>> {
    match config.platform.kind {
        PlatformKind::Console => {
            let user = std::env::var("USER").unwrap_or_else(|_| "local".to_string());
            tracing::info!(user = %user, "Using console platform");
            Ok(Box::new(ConsolePlatform::stdin(&user)))
        }
        #[cfg(feature = "slack")]
        PlatformKind::Slack => {
            use anyhow::Context;
            let slack = config
                .slack
                .clone()
                .context("platform.kind = \"slack\" requires a [slack] section")?;
            tracing::info!("Using Slack platform");
            Ok(Box::new(SlackPlatform::new(slack)?))
        }
        #[cfg(not(feature = "slack"))]
        PlatformKind::Slack => {
            anyhow::bail!("Slack support not compiled in; rebuild with --features slack")
        }
    }
}
