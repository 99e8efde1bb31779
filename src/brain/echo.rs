// ABOUTME: Demo brain that repeats text following its command word
// ABOUTME: Optionally announces itself in a channel whenever a session comes up

use anyhow::Result;
use async_trait::async_trait;
use switchboard_core::{Brain, Reply, StartupGreeter};

pub struct EchoBrain {
    prefix: String,
    announce_channel: Option<String>,
}

impl EchoBrain {
    pub fn new(prefix: &str, announce_channel: Option<String>) -> Self {
        Self {
            prefix: prefix.to_string(),
            announce_channel,
        }
    }

    /// Text after `<prefix> `, or `None` when the message isn't addressed to us
    fn strip_command<'a>(&self, text: &'a str) -> Option<&'a str> {
        let rest = text.strip_prefix(self.prefix.as_str())?;
        let rest = rest.strip_prefix(' ')?.trim();
        (!rest.is_empty()).then_some(rest)
    }
}

#[async_trait]
impl Brain for EchoBrain {
    async fn handle_message(&mut self, user: &str, channel: &str, text: &str) -> Result<Vec<Reply>> {
        let Some(rest) = self.strip_command(text) else {
            return Ok(Vec::new());
        };
        tracing::debug!(user = %user, channel = %channel, "Echoing message");
        Ok(vec![Reply::channel(channel, rest)])
    }

    fn greeter(&mut self) -> Option<&mut dyn StartupGreeter> {
        if self.announce_channel.is_some() {
            Some(self)
        } else {
            None
        }
    }
}

#[async_trait]
impl StartupGreeter for EchoBrain {
    async fn startup_message(&mut self) -> Result<Vec<Reply>> {
        Ok(self
            .announce_channel
            .iter()
            .map(|channel| Reply::channel(channel.as_str(), "online"))
            .collect())
    }
}
