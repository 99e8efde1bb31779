// ABOUTME: Collaborator traits for the session manager: platform, connection, brain, transcript
// ABOUTME: Optional brain capabilities are exposed through accessor methods returning Option

use anyhow::Result;
use async_trait::async_trait;

use crate::error::PlatformError;
use crate::event::PlatformEvent;
use crate::reply::Reply;

// =============================================================================
// Directory entries
// =============================================================================

/// A user as listed by the platform directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserEntry {
    /// Opaque platform identifier (e.g., U01234)
    pub id: String,
    /// Human-readable name, if the platform has one for this user
    pub display_name: Option<String>,
}

impl UserEntry {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: Some(display_name.into()),
        }
    }

    pub fn anonymous(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: None,
        }
    }
}

/// A channel as listed by the platform directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelEntry {
    pub id: String,
    pub name: String,
}

impl ChannelEntry {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

// =============================================================================
// Platform
// =============================================================================

/// Connector for a chat platform.
///
/// Every session attempt calls `connect()` and gets a fresh `Connection`.
/// Connections are dropped after any transport failure and never reused.
#[async_trait]
pub trait Platform: Send + Sync {
    /// Platform identifier (e.g., "slack", "console")
    fn platform_id(&self) -> &'static str;

    /// Open a new real-time connection
    async fn connect(&self) -> Result<Box<dyn Connection>, PlatformError>;
}

/// A live connection to a chat platform, scoped to one session.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Drain every event buffered since the last call without waiting for new ones
    async fn poll_events(&mut self) -> Result<Vec<PlatformEvent>, PlatformError>;

    /// Send text to a channel
    async fn send(&self, destination: &str, text: &str) -> Result<(), PlatformError>;

    /// Full user directory
    async fn list_users(&self) -> Result<Vec<UserEntry>, PlatformError>;

    /// Full channel directory
    async fn list_channels(&self) -> Result<Vec<ChannelEntry>, PlatformError>;

    /// Open (or reuse) a direct-message channel with a user id.
    ///
    /// Returns `Ok(None)` when the platform answered but gave no channel.
    async fn open_direct_message(&self, user_id: &str) -> Result<Option<String>, PlatformError>;
}

// =============================================================================
// Brain
// =============================================================================

/// The pluggable message handler.
///
/// Errors are logged by the session and treated as "no replies".
#[async_trait]
pub trait Brain: Send {
    /// Handle an accepted inbound message, with user and channel already resolved to names
    async fn handle_message(&mut self, user: &str, channel: &str, text: &str) -> Result<Vec<Reply>>;

    /// Polled once per tick for unsolicited replies
    async fn handle_non_response(&mut self) -> Result<Vec<Reply>> {
        Ok(Vec::new())
    }

    /// Optional: replies to send every time a connection comes up
    fn greeter(&mut self) -> Option<&mut dyn StartupGreeter> {
        None
    }
}

/// Optional brain capability: a message announced when a session starts.
#[async_trait]
pub trait StartupGreeter: Send {
    async fn startup_message(&mut self) -> Result<Vec<Reply>>;
}

// =============================================================================
// Transcript
// =============================================================================

/// Receives every accepted inbound message after name resolution.
pub trait Transcript: Send {
    fn record(&mut self, channel: &str, user: &str, text: &str);
}
