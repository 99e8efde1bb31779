// ABOUTME: Session manager that owns the connection lifecycle and the poll/dispatch/flush loop
// ABOUTME: First-connect failure is fatal; every later transport failure reconnects after a fixed delay

use std::convert::Infallible;
use std::time::Duration;
use tokio::time::{sleep, Instant};

use crate::address_book::AddressBook;
use crate::error::{PlatformError, SessionError};
use crate::event::InboundFilter;
use crate::metrics;
use crate::outbound::OutboundQueue;
use crate::reply::{NormalizedReply, Reply, ReplyNormalizer};
use crate::traits::{Brain, Connection, Platform, Transcript};

/// Timing and identity for a session manager
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Session name, used in logs
    pub name: String,
    /// Wait between a lost connection (or failed reconnect) and the next attempt
    pub reconnect_delay: Duration,
    /// Sleep between ticks of the live loop
    pub tick_interval: Duration,
    /// Minimum time between outbound send waves
    pub flush_interval: Duration,
    /// User (display name or id) who receives error reports by direct message
    pub maintainer: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            name: "switchboard".to_string(),
            reconnect_delay: Duration::from_secs(10),
            tick_interval: Duration::from_millis(100),
            flush_interval: Duration::from_secs(1),
            maintainer: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Live,
}

/// Where maintainer reports go for the current session
#[derive(Debug, Clone, PartialEq, Eq)]
enum MaintainerRoute {
    Unresolved,
    Channel(String),
    Unreachable,
}

/// Supervises the platform connection and relays between it and the brain.
pub struct SessionManager {
    platform: Box<dyn Platform>,
    brain: Box<dyn Brain>,
    config: SessionConfig,
    filter: InboundFilter,
    book: AddressBook,
    transcript: Option<Box<dyn Transcript>>,
    state: SessionState,
    key_verified: bool,
    maintainer_route: MaintainerRoute,
}

impl SessionManager {
    pub fn new(platform: Box<dyn Platform>, brain: Box<dyn Brain>, config: SessionConfig) -> Self {
        Self {
            platform,
            brain,
            config,
            filter: InboundFilter::new(),
            book: AddressBook::new(),
            transcript: None,
            state: SessionState::Disconnected,
            key_verified: false,
            maintainer_route: MaintainerRoute::Unresolved,
        }
    }

    /// Record every accepted inbound message to `transcript`
    pub fn with_transcript(mut self, transcript: Box<dyn Transcript>) -> Self {
        self.transcript = Some(transcript);
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether any connection attempt has ever succeeded
    pub fn key_verified(&self) -> bool {
        self.key_verified
    }

    pub fn address_book(&self) -> &AddressBook {
        &self.book
    }

    /// Connect and relay forever.
    ///
    /// Only returns when the very first connection attempt fails.
    pub async fn run(&mut self) -> Result<Infallible, SessionError> {
        loop {
            self.state = SessionState::Connecting;
            let mut conn = match self.platform.connect().await {
                Ok(conn) => {
                    metrics::record_connect("ok");
                    conn
                }
                Err(e) => {
                    metrics::record_connect("error");
                    self.state = SessionState::Disconnected;
                    if !self.key_verified {
                        tracing::error!(
                            session = %self.config.name,
                            platform = self.platform.platform_id(),
                            error = %e,
                            "Couldn't establish a connection, check the client credential"
                        );
                        return Err(SessionError::InitialConnect(e));
                    }
                    tracing::warn!(
                        session = %self.config.name,
                        platform = self.platform.platform_id(),
                        error = %e,
                        retry_in_secs = self.config.reconnect_delay.as_secs_f64(),
                        "Couldn't establish a connection, trying again"
                    );
                    sleep(self.config.reconnect_delay).await;
                    continue;
                }
            };
            self.key_verified = true;

            let err = self.serve(conn.as_mut()).await;
            self.state = SessionState::Disconnected;
            metrics::record_disconnect();
            tracing::warn!(
                session = %self.config.name,
                platform = self.platform.platform_id(),
                error = %err,
                retry_in_secs = self.config.reconnect_delay.as_secs_f64(),
                "Lost connection, reconnecting"
            );
            drop(conn);
            sleep(self.config.reconnect_delay).await;
        }
    }

    /// Run one live session; returns the error that ended it.
    async fn serve(&mut self, conn: &mut dyn Connection) -> PlatformError {
        let mut queue = self.new_queue();
        if let Err(e) = self.establish(&*conn, &mut queue).await {
            return e;
        }
        loop {
            if let Err(e) = self.tick(conn, &mut queue).await {
                return e;
            }
            sleep(self.config.tick_interval).await;
        }
    }

    /// A fresh outbound queue with this session's rate gate
    pub fn new_queue(&self) -> OutboundQueue {
        OutboundQueue::new(self.config.flush_interval)
    }

    /// Rebuild the address book, go live, and send the brain's startup message.
    pub async fn establish(
        &mut self,
        conn: &dyn Connection,
        queue: &mut OutboundQueue,
    ) -> Result<(), PlatformError> {
        self.book.rebuild(conn).await?;
        self.maintainer_route = MaintainerRoute::Unresolved;
        self.state = SessionState::Live;
        tracing::info!(
            session = %self.config.name,
            platform = self.platform.platform_id(),
            "Session live"
        );

        let Some(greeter) = self.brain.greeter() else {
            return Ok(());
        };
        let result = greeter.startup_message().await;
        let replies = match result {
            Ok(replies) => replies,
            Err(e) => {
                self.brain_failed(conn, queue, "startup_message", &e).await;
                Vec::new()
            }
        };
        self.relay(conn, queue, replies).await;
        Ok(())
    }

    /// One pass of the live loop: read events, dispatch, poll, flush.
    pub async fn tick(
        &mut self,
        conn: &mut dyn Connection,
        queue: &mut OutboundQueue,
    ) -> Result<(), PlatformError> {
        let events = match conn.poll_events().await {
            Ok(events) => events,
            Err(e) if e.is_transport() => return Err(e),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read events, skipping");
                Vec::new()
            }
        };
        let conn: &dyn Connection = &*conn;

        let mut replies = Vec::new();
        for event in &events {
            let Some(msg) = self.filter.extract(event) else {
                metrics::record_event("ignored");
                continue;
            };
            metrics::record_event("accepted");

            let user = self.book.user_name(&msg.user_id).to_string();
            let channel = self.book.channel_name(&msg.channel_id).to_string();
            if let Some(transcript) = self.transcript.as_mut() {
                transcript.record(&channel, &user, &msg.text);
            }

            metrics::record_message_dispatched();
            let result = self.brain.handle_message(&user, &channel, &msg.text).await;
            match result {
                Ok(out) => replies.extend(out),
                Err(e) => self.brain_failed(conn, queue, "handle_message", &e).await,
            }
        }

        let result = self.brain.handle_non_response().await;
        match result {
            Ok(out) => replies.extend(out),
            Err(e) => self.brain_failed(conn, queue, "handle_non_response", &e).await,
        }

        self.relay(conn, queue, replies).await;
        Ok(())
    }

    /// Normalize replies, queue them, and give the queue a chance to flush.
    async fn relay(&mut self, conn: &dyn Connection, queue: &mut OutboundQueue, replies: Vec<Reply>) {
        let (normalized, unresolved) = ReplyNormalizer::new(&self.book, conn)
            .normalize_reporting(replies)
            .await;
        queue.enqueue(normalized);
        for e in &unresolved {
            self.report_error(conn, queue, "Couldn't deliver a direct message", e)
                .await;
        }

        let Some(report) = queue.flush(conn, Instant::now()).await else {
            return;
        };
        for (destination, e) in &report.failed {
            // A report about the report channel would fail the same way
            if matches!(&self.maintainer_route, MaintainerRoute::Channel(c) if c == destination) {
                continue;
            }
            self.report_error(conn, queue, &format!("Failed to send message to {}", destination), e)
                .await;
        }
    }

    async fn brain_failed(
        &mut self,
        conn: &dyn Connection,
        queue: &mut OutboundQueue,
        call: &'static str,
        e: &anyhow::Error,
    ) {
        metrics::record_brain_error(call);
        tracing::error!(call, error = %format!("{:#}", e), "Brain call failed");
        self.report_error(conn, queue, &format!("Brain call {} failed", call), &format!("{:#}", e))
            .await;
    }

    /// Queue a direct message to the maintainer.
    ///
    /// Reports go through the rate gate like any reply; a report identical to
    /// one still pending is dropped. The DM channel is resolved once per session.
    async fn report_error(
        &mut self,
        conn: &dyn Connection,
        queue: &mut OutboundQueue,
        context: &str,
        error: &dyn std::fmt::Display,
    ) {
        let Some(maintainer) = self.config.maintainer.as_deref() else {
            return;
        };
        if self.maintainer_route == MaintainerRoute::Unresolved {
            self.maintainer_route = match self.book.resolve_user_to_dm_channel(conn, maintainer).await {
                Ok(channel) => MaintainerRoute::Channel(channel),
                Err(e) => {
                    tracing::error!(maintainer, error = %e, "Can't reach maintainer, reports will only be logged");
                    MaintainerRoute::Unreachable
                }
            };
        }
        let MaintainerRoute::Channel(channel) = &self.maintainer_route else {
            return;
        };

        let report = NormalizedReply::new(channel.as_str(), format!("{}\n```{}```", context, error));
        if queue.pending().contains(&report) {
            return;
        }
        queue.enqueue([report]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::PlatformEvent;
    use crate::testing::{MockConnection, MockPlatform, ScriptedBrain};

    fn message(user: &str, channel: &str, text: &str) -> PlatformEvent {
        PlatformEvent::new()
            .with("type", "message")
            .with("user", user)
            .with("channel", channel)
            .with("text", text)
    }

    fn manager(brain: ScriptedBrain, config: SessionConfig) -> SessionManager {
        SessionManager::new(Box::new(MockPlatform::new()), Box::new(brain), config)
    }

    #[test]
    fn test_default_config_timings() {
        let config = SessionConfig::default();
        assert_eq!(config.reconnect_delay, Duration::from_secs(10));
        assert_eq!(config.tick_interval, Duration::from_millis(100));
        assert_eq!(config.flush_interval, Duration::from_secs(1));
        assert!(config.maintainer.is_none());
    }

    #[tokio::test]
    async fn test_new_manager_is_disconnected() {
        let m = manager(ScriptedBrain::new(), SessionConfig::default());
        assert_eq!(m.state(), SessionState::Disconnected);
        assert!(!m.key_verified());
    }

    #[tokio::test]
    async fn test_tick_dispatches_with_resolved_names() {
        let mut conn = MockConnection::new()
            .with_user("U1", "alice")
            .with_channel("C1", "general")
            .with_events(vec![
                PlatformEvent::new().with("type", "presence_change"),
                message("U1", "C1", "hello   there"),
            ]);
        let brain = ScriptedBrain::new().replying(|_, channel, text| {
            vec![Reply::channel("C1", format!("{} said {}", channel, text))]
        });
        let tap = brain.tap();
        let mut m = manager(brain, SessionConfig::default());
        let mut queue = m.new_queue();
        m.establish(&conn, &mut queue).await.unwrap();
        assert_eq!(m.state(), SessionState::Live);

        m.tick(&mut conn, &mut queue).await.unwrap();

        assert_eq!(
            tap.messages(),
            vec![(
                "alice".to_string(),
                "general".to_string(),
                "hello there".to_string()
            )]
        );
        assert_eq!(
            conn.tap().sent(),
            vec![("C1".to_string(), "general said hello there".to_string())]
        );
    }

    #[tokio::test]
    async fn test_non_response_polled_once_per_tick() {
        let mut conn = MockConnection::new();
        let brain = ScriptedBrain::new();
        let tap = brain.tap();
        let mut m = manager(brain, SessionConfig::default());
        let mut queue = m.new_queue();
        m.establish(&conn, &mut queue).await.unwrap();

        for _ in 0..3 {
            m.tick(&mut conn, &mut queue).await.unwrap();
        }
        assert_eq!(tap.non_response_calls(), 3);
        assert!(tap.messages().is_empty());
    }

    #[tokio::test]
    async fn test_startup_message_is_sent_on_establish() {
        let conn = MockConnection::new();
        let brain = ScriptedBrain::new().with_startup(vec![Reply::channel("C1", "I'm back")]);
        let mut m = manager(brain, SessionConfig::default());
        let mut queue = m.new_queue();
        m.establish(&conn, &mut queue).await.unwrap();

        assert_eq!(
            conn.tap().sent(),
            vec![("C1".to_string(), "I'm back".to_string())]
        );
    }

    #[tokio::test]
    async fn test_brain_without_greeter_sends_nothing_on_establish() {
        let conn = MockConnection::new();
        let mut m = manager(ScriptedBrain::new(), SessionConfig::default());
        let mut queue = m.new_queue();
        m.establish(&conn, &mut queue).await.unwrap();
        assert!(conn.tap().sent().is_empty());
    }

    #[tokio::test]
    async fn test_transport_error_from_poll_ends_tick() {
        let mut conn =
            MockConnection::new().with_poll_error(PlatformError::Closed("eof".to_string()));
        let mut m = manager(ScriptedBrain::new(), SessionConfig::default());
        let mut queue = m.new_queue();
        m.establish(&conn, &mut queue).await.unwrap();

        let err = m.tick(&mut conn, &mut queue).await.unwrap_err();
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn test_api_error_from_poll_is_absorbed() {
        let mut conn =
            MockConnection::new().with_poll_error(PlatformError::Api("ratelimited".to_string()));
        let brain = ScriptedBrain::new();
        let tap = brain.tap();
        let mut m = manager(brain, SessionConfig::default());
        let mut queue = m.new_queue();
        m.establish(&conn, &mut queue).await.unwrap();

        m.tick(&mut conn, &mut queue).await.unwrap();
        assert_eq!(tap.non_response_calls(), 1);
    }

    #[tokio::test]
    async fn test_brain_error_is_reported_to_maintainer() {
        let mut conn = MockConnection::new()
            .with_user("U9", "maint")
            .with_dm_channel("U9", "D9")
            .with_events(vec![message("U1", "C1", "boom")]);
        let brain = ScriptedBrain::new().failing_messages("exploded");
        let config = SessionConfig {
            maintainer: Some("maint".to_string()),
            ..SessionConfig::default()
        };
        let mut m = manager(brain, config);
        let mut queue = m.new_queue();
        m.establish(&conn, &mut queue).await.unwrap();

        m.tick(&mut conn, &mut queue).await.unwrap();

        let sent = conn.tap().sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "D9");
        assert!(sent[0].1.contains("handle_message"));
        assert!(sent[0].1.contains("```exploded```"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_failure_is_reported_on_next_flush() {
        let mut conn = MockConnection::new()
            .with_dm_channel("U9", "D9")
            .failing_sends_to("C1");
        let brain = ScriptedBrain::new().with_startup(vec![Reply::channel("C1", "hi")]);
        let config = SessionConfig {
            maintainer: Some("U9".to_string()),
            ..SessionConfig::default()
        };
        let mut m = manager(brain, config);
        let mut queue = m.new_queue();
        m.establish(&conn, &mut queue).await.unwrap();

        // The report waits behind the rate gate
        assert!(conn.tap().sent().is_empty());
        assert_eq!(queue.pending().len(), 1);

        tokio::time::advance(Duration::from_secs(1)).await;
        m.tick(&mut conn, &mut queue).await.unwrap();

        let sent = conn.tap().sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "D9");
        assert!(sent[0].1.starts_with("Failed to send message to C1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_report_is_not_reported_again() {
        let mut conn = MockConnection::new()
            .with_dm_channel("U9", "D9")
            .failing_sends_to("C1")
            .failing_sends_to("D9");
        let brain = ScriptedBrain::new().with_startup(vec![Reply::channel("C1", "hi")]);
        let config = SessionConfig {
            maintainer: Some("U9".to_string()),
            ..SessionConfig::default()
        };
        let mut m = manager(brain, config);
        let mut queue = m.new_queue();
        m.establish(&conn, &mut queue).await.unwrap();

        tokio::time::advance(Duration::from_secs(1)).await;
        m.tick(&mut conn, &mut queue).await.unwrap();
        assert!(queue.is_empty());
        assert_eq!(conn.tap().dm_requests(), vec!["U9"]);
    }

    #[tokio::test]
    async fn test_undeliverable_direct_message_is_reported() {
        let mut conn = MockConnection::new()
            .with_user("U1", "ghost")
            .with_user("U9", "maint")
            .with_dm_channel("U9", "D9");
        let brain = ScriptedBrain::new().then_unsolicited(vec![Reply::user("ghost", "boo")]);
        let config = SessionConfig {
            maintainer: Some("maint".to_string()),
            ..SessionConfig::default()
        };
        let mut m = manager(brain, config);
        let mut queue = m.new_queue();
        m.establish(&conn, &mut queue).await.unwrap();
        m.tick(&mut conn, &mut queue).await.unwrap();

        let sent = conn.tap().sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "D9");
        assert!(sent[0].1.starts_with("Couldn't deliver a direct message"));
        assert!(sent[0].1.contains("U1"));
    }

    #[tokio::test]
    async fn test_transcript_records_accepted_messages() {
        let mut conn = MockConnection::new()
            .with_user("U1", "alice")
            .with_channel("C1", "general")
            .with_events(vec![message("U1", "C1", "hi"), message("U1", "C1", "")]);
        let transcript = crate::testing::RecordingTranscript::new();
        let lines = transcript.tap();
        let mut m = manager(ScriptedBrain::new(), SessionConfig::default())
            .with_transcript(Box::new(transcript));
        let mut queue = m.new_queue();
        m.establish(&conn, &mut queue).await.unwrap();
        m.tick(&mut conn, &mut queue).await.unwrap();

        assert_eq!(lines.lines(), vec!["#general | alice: hi".to_string()]);
    }
}
