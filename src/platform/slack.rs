// ABOUTME: Slack platform using slack-morphism: Socket Mode for events, Web API for everything else
// ABOUTME: Each connection runs its own Socket Mode listener, shut down when the connection drops

use anyhow::{Context, Result};
use async_trait::async_trait;
use slack_morphism::prelude::*;
use std::sync::Arc;
use switchboard_core::{
    ChannelEntry, Connection, Platform, PlatformError, PlatformEvent, UserEntry,
};
use tokio::sync::{mpsc, oneshot};

use crate::config::SlackConfig;

// =============================================================================
// Shared state passed to Socket Mode callbacks via SlackClientEventsUserState
// =============================================================================

/// Events and transport failures share one channel so `poll_events` sees
/// them in arrival order.
type BridgeItem = Result<PlatformEvent, PlatformError>;

const PAGE_SIZE: u16 = 200;

/// Callbacks are fn pointers, so per-connection state travels through the
/// listener's user state storage.
#[derive(Clone)]
struct SessionBridge {
    tx: mpsc::UnboundedSender<BridgeItem>,
    bot_user_id: String,
}

impl SessionBridge {
    fn forward(&self, event: PlatformEvent) {
        // Skip bot's own messages
        if event.get_str("user") == Some(self.bot_user_id.as_str()) {
            return;
        }
        if self.tx.send(Ok(event)).is_err() {
            tracing::debug!(platform = "slack", "Event receiver dropped");
        }
    }

    fn fail(&self, error: PlatformError) {
        let _ = self.tx.send(Err(error));
    }
}

/// Everything buffered since the last call; a forwarded failure ends the batch.
fn drain(rx: &mut mpsc::UnboundedReceiver<BridgeItem>) -> Result<Vec<PlatformEvent>, PlatformError> {
    let mut events = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(Ok(event)) => events.push(event),
            Ok(Err(e)) => return Err(e),
            Err(mpsc::error::TryRecvError::Empty) => return Ok(events),
            Err(mpsc::error::TryRecvError::Disconnected) => {
                return Err(PlatformError::Closed(
                    "Socket Mode listener stopped".to_string(),
                ))
            }
        }
    }
}

fn next_cursor(metadata: Option<SlackResponseMetadata>) -> Option<SlackCursorId> {
    metadata
        .and_then(|m| m.next_cursor)
        .filter(|cursor| !cursor.0.is_empty())
}

/// Forward push events as raw JSON objects; the session decides what to keep
async fn handle_push_event(
    event: SlackPushEventCallback,
    _client: Arc<SlackHyperClient>,
    states: SlackClientEventsUserState,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let bridge = {
        let guard = states.read().await;
        guard
            .get_user_state::<SessionBridge>()
            .cloned()
            .ok_or("SessionBridge not found in user state")?
    };

    let value = serde_json::to_value(&event.event)?;
    if let Some(event) = PlatformEvent::from_value(value) {
        bridge.forward(event);
    }
    Ok(())
}

/// Socket Mode errors end the session so it reconnects with a fresh listener
fn socket_mode_error_handler(
    err: Box<dyn std::error::Error + Send + Sync>,
    _client: Arc<SlackHyperClient>,
    states: SlackClientEventsUserState,
) -> HttpStatusCode {
    tracing::error!(platform = "slack", error = %err, "Socket Mode error");
    match states.try_read() {
        Ok(guard) => {
            if let Some(bridge) = guard.get_user_state::<SessionBridge>() {
                bridge.fail(PlatformError::Connection(format!("Socket Mode error: {}", err)));
            }
        }
        Err(_) => tracing::warn!(platform = "slack", "Socket Mode state busy, error not forwarded"),
    }
    HttpStatusCode::OK
}

fn api_error(e: SlackClientError) -> PlatformError {
    match e {
        SlackClientError::ApiError(_) => PlatformError::Api(e.to_string()),
        other => PlatformError::Connection(other.to_string()),
    }
}

// =============================================================================
// SlackPlatform
// =============================================================================

pub struct SlackPlatform {
    client: Arc<SlackHyperClient>,
    /// Bot OAuth token (xoxb-...) for Web API calls
    bot_token: SlackApiToken,
    /// App-level token (xapp-...) for Socket Mode connections
    app_token: SlackApiToken,
}

impl SlackPlatform {
    pub fn new(config: SlackConfig) -> Result<Self> {
        let client = Arc::new(SlackClient::new(
            SlackClientHyperConnector::new().context("Failed to create Slack HTTP connector")?,
        ));
        Ok(Self {
            client,
            bot_token: SlackApiToken::new(SlackApiTokenValue(config.bot_token)),
            app_token: SlackApiToken::new(SlackApiTokenValue(config.app_token)),
        })
    }
}

#[async_trait]
impl Platform for SlackPlatform {
    fn platform_id(&self) -> &'static str {
        "slack"
    }

    async fn connect(&self) -> Result<Box<dyn Connection>, PlatformError> {
        // auth.test doubles as the credential check for the first connect
        let session = self.client.open_session(&self.bot_token);
        let auth = session
            .auth_test()
            .await
            .map_err(|e| PlatformError::Connection(format!("auth.test failed: {}", e)))?;
        let bot_user_id = auth.user_id.to_string();
        tracing::info!(bot_user = %bot_user_id, team = %auth.team, "Slack bot authenticated");

        let (tx, rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = oneshot::channel::<Result<(), String>>();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        let bridge = SessionBridge { tx, bot_user_id };
        let client = Arc::clone(&self.client);
        let app_token = self.app_token.clone();

        tokio::spawn(async move {
            let callbacks =
                SlackSocketModeListenerCallbacks::new().with_push_events(handle_push_event);

            let environment = Arc::new(
                SlackClientEventsListenerEnvironment::new(client)
                    .with_error_handler(socket_mode_error_handler)
                    .with_user_state(bridge),
            );

            let listener = SlackClientSocketModeListener::new(
                &SlackClientSocketModeConfig::new(),
                environment,
                callbacks,
            );

            if let Err(e) = listener.listen_for(&app_token).await {
                let _ = ready_tx.send(Err(e.to_string()));
                return;
            }
            listener.start().await;
            let _ = ready_tx.send(Ok(()));
            tracing::info!(platform = "slack", "Socket Mode connected");

            // Resolves when the connection is dropped
            let _ = stop_rx.await;
            listener.shutdown().await;
            tracing::debug!(platform = "slack", "Socket Mode listener stopped");
        });

        match ready_rx.await {
            Ok(Ok(())) => Ok(Box::new(SlackConnection {
                client: Arc::clone(&self.client),
                bot_token: self.bot_token.clone(),
                events: rx,
                _stop: stop_tx,
            })),
            Ok(Err(e)) => Err(PlatformError::Connection(format!(
                "Socket Mode listener failed: {}",
                e
            ))),
            Err(_) => Err(PlatformError::Connection(
                "Socket Mode listener exited before connecting".to_string(),
            )),
        }
    }
}

// =============================================================================
// SlackConnection
// =============================================================================

pub struct SlackConnection {
    client: Arc<SlackHyperClient>,
    bot_token: SlackApiToken,
    events: mpsc::UnboundedReceiver<BridgeItem>,
    // Dropping this stops the listener task
    _stop: oneshot::Sender<()>,
}

#[async_trait]
impl Connection for SlackConnection {
    async fn poll_events(&mut self) -> Result<Vec<PlatformEvent>, PlatformError> {
        drain(&mut self.events)
    }

    async fn send(&self, destination: &str, text: &str) -> Result<(), PlatformError> {
        let session = self.client.open_session(&self.bot_token);
        let req = SlackApiChatPostMessageRequest::new(
            destination.into(),
            SlackMessageContent::new().with_text(text.to_string()),
        );
        session.chat_post_message(&req).await.map_err(api_error)?;
        Ok(())
    }

    async fn list_users(&self) -> Result<Vec<UserEntry>, PlatformError> {
        let session = self.client.open_session(&self.bot_token);
        let mut users = Vec::new();
        let mut cursor = None;
        loop {
            let req = SlackApiUsersListRequest::new().with_limit(PAGE_SIZE);
            let req = match cursor {
                Some(c) => req.with_cursor(c),
                None => req,
            };
            let resp = session.users_list(&req).await.map_err(api_error)?;
            users.extend(resp.members.into_iter().map(|user| {
                let display_name = user
                    .profile
                    .as_ref()
                    .and_then(|p| p.real_name.clone())
                    .filter(|n| !n.is_empty())
                    .or(user.name);
                UserEntry {
                    id: user.id.to_string(),
                    display_name,
                }
            }));
            cursor = next_cursor(resp.response_metadata);
            if cursor.is_none() {
                return Ok(users);
            }
        }
    }

    async fn list_channels(&self) -> Result<Vec<ChannelEntry>, PlatformError> {
        let session = self.client.open_session(&self.bot_token);
        let mut channels = Vec::new();
        let mut cursor = None;
        loop {
            let req = SlackApiConversationsListRequest::new()
                .with_limit(PAGE_SIZE)
                .with_types(vec![
                    SlackConversationType::Public,
                    SlackConversationType::Private,
                ]);
            let req = match cursor {
                Some(c) => req.with_cursor(c),
                None => req,
            };
            let resp = session.conversations_list(&req).await.map_err(api_error)?;
            channels.extend(resp.channels.into_iter().filter_map(|channel| {
                let name = channel.name?;
                Some(ChannelEntry::new(channel.id.to_string(), name))
            }));
            cursor = next_cursor(resp.response_metadata);
            if cursor.is_none() {
                return Ok(channels);
            }
        }
    }

    async fn open_direct_message(&self, user_id: &str) -> Result<Option<String>, PlatformError> {
        let session = self.client.open_session(&self.bot_token);
        let req = SlackApiConversationsOpenRequest::new().with_users(vec![user_id.into()]);
        let resp = session.conversations_open(&req).await.map_err(api_error)?;
        let channel = resp.channel.id.to_string();
        Ok(Some(channel).filter(|c| !c.is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bridge() -> (SessionBridge, mpsc::UnboundedReceiver<BridgeItem>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let bridge = SessionBridge {
            tx,
            bot_user_id: "UBOT".to_string(),
        };
        (bridge, rx)
    }

    fn message(user: &str, text: &str) -> PlatformEvent {
        PlatformEvent::new()
            .with("type", "message")
            .with("user", user)
            .with("channel", "C1")
            .with("text", text)
    }

    #[test]
    fn test_drain_returns_buffered_events() {
        let (bridge, mut rx) = bridge();
        bridge.forward(message("U1", "one"));
        bridge.forward(message("U1", "two"));

        let events = drain(&mut rx).unwrap();
        assert_eq!(events.len(), 2);
        assert!(drain(&mut rx).unwrap().is_empty());
    }

    #[test]
    fn test_own_messages_are_dropped() {
        let (bridge, mut rx) = bridge();
        bridge.forward(message("UBOT", "echo"));
        assert!(drain(&mut rx).unwrap().is_empty());
    }

    #[test]
    fn test_forwarded_socket_error_is_a_transport_error() {
        let (bridge, mut rx) = bridge();
        bridge.forward(message("U1", "before"));
        bridge.fail(PlatformError::Connection("socket reset".to_string()));

        let err = drain(&mut rx).unwrap_err();
        assert!(err.is_transport());
    }

    #[test]
    fn test_stopped_listener_reads_as_closed() {
        let (bridge, mut rx) = bridge();
        drop(bridge);
        assert!(matches!(drain(&mut rx), Err(PlatformError::Closed(_))));
    }

    #[test]
    fn test_empty_cursor_ends_pagination() {
        assert!(next_cursor(None).is_none());
        let done = SlackResponseMetadata::new().with_next_cursor(SlackCursorId("".to_string()));
        assert!(next_cursor(Some(done)).is_none());
        let more = SlackResponseMetadata::new().with_next_cursor(SlackCursorId("dXNlcjpVMDYx".to_string()));
        assert_eq!(next_cursor(Some(more)).map(|c| c.0), Some("dXNlcjpVMDYx".to_string()));
    }
}
