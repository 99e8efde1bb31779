// ABOUTME: Typed error taxonomy for platform calls, DM resolution, and the session supervisor.
// ABOUTME: Transport errors drive reconnects; everything else is logged and absorbed.

use thiserror::Error;

/// Errors surfaced by a platform connection.
#[derive(Debug, Error)]
pub enum PlatformError {
    /// Underlying socket failed
    #[error("socket error: {0}")]
    Socket(#[from] std::io::Error),

    /// The real-time connection was closed by the remote side
    #[error("connection closed: {0}")]
    Closed(String),

    /// Platform-specific connection failure (handshake, auth, websocket upgrade)
    #[error("platform connection error: {0}")]
    Connection(String),

    /// A request/response API call failed but the connection itself is fine
    #[error("platform API error: {0}")]
    Api(String),
}

impl PlatformError {
    /// Whether this error means the connection can no longer be used.
    pub fn is_transport(&self) -> bool {
        !matches!(self, PlatformError::Api(_))
    }
}

/// Failure to turn a user reference into a direct-message channel.
#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("couldn't find a direct-message channel for user {user}")]
    NoChannel { user: String },

    #[error("opening a direct-message channel for user {user} failed: {source}")]
    Platform {
        user: String,
        #[source]
        source: PlatformError,
    },
}

/// Errors that end `SessionManager::run`.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The very first connection attempt failed, which usually means a bad credential
    #[error("couldn't establish a connection, check the client credential: {0}")]
    InitialConnect(#[source] PlatformError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_errors_are_not_transport() {
        assert!(!PlatformError::Api("ratelimited".into()).is_transport());
    }

    #[test]
    fn test_connection_level_errors_are_transport() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        assert!(PlatformError::Socket(io).is_transport());
        assert!(PlatformError::Closed("eof".into()).is_transport());
        assert!(PlatformError::Connection("handshake".into()).is_transport());
    }

    #[test]
    fn test_resolution_error_names_user() {
        let err = ResolutionError::NoChannel {
            user: "U123".into(),
        };
        assert!(err.to_string().contains("U123"));
    }
}
