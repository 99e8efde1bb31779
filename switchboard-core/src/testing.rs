// ABOUTME: Scripted mock platform, connection, brain, and transcript for deterministic tests
// ABOUTME: Each mock hands out a cloneable tap for asserting on recorded calls

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::Result;
use async_trait::async_trait;

use crate::error::PlatformError;
use crate::event::PlatformEvent;
use crate::reply::Reply;
use crate::traits::{
    Brain, ChannelEntry, Connection, Platform, StartupGreeter, Transcript, UserEntry,
};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// =============================================================================
// MockConnection
// =============================================================================

#[derive(Debug, Default)]
struct ConnectionLog {
    sent: Vec<(String, String)>,
    dm_requests: Vec<String>,
    polls: usize,
}

/// Read side of a `MockConnection`, usable after the connection is boxed
#[derive(Debug, Clone, Default)]
pub struct ConnectionTap {
    log: Arc<Mutex<ConnectionLog>>,
}

impl ConnectionTap {
    /// Successfully sent (destination, text) pairs, in order
    pub fn sent(&self) -> Vec<(String, String)> {
        lock(&self.log).sent.clone()
    }

    /// User ids passed to `open_direct_message`
    pub fn dm_requests(&self) -> Vec<String> {
        lock(&self.log).dm_requests.clone()
    }

    pub fn polls(&self) -> usize {
        lock(&self.log).polls
    }
}

/// Connection whose directory, events, and failures are scripted up front.
///
/// Each `poll_events` call pops the next scripted batch; once the script runs
/// out it returns no events forever.
#[derive(Debug, Default)]
pub struct MockConnection {
    polls: VecDeque<Result<Vec<PlatformEvent>, PlatformError>>,
    users: Vec<UserEntry>,
    channels: Vec<ChannelEntry>,
    dm_channels: HashMap<String, String>,
    failing_destinations: HashSet<String>,
    fail_channel_listing: bool,
    tap: ConnectionTap,
}

impl MockConnection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, id: &str, name: &str) -> Self {
        self.users.push(UserEntry::new(id, name));
        self
    }

    pub fn with_anonymous_user(mut self, id: &str) -> Self {
        self.users.push(UserEntry::anonymous(id));
        self
    }

    pub fn with_channel(mut self, id: &str, name: &str) -> Self {
        self.channels.push(ChannelEntry::new(id, name));
        self
    }

    /// `open_direct_message(user_id)` returns `channel`
    pub fn with_dm_channel(mut self, user_id: &str, channel: &str) -> Self {
        self.dm_channels
            .insert(user_id.to_string(), channel.to_string());
        self
    }

    /// Queue one batch of events for the next unscripted poll
    pub fn with_events(mut self, events: Vec<PlatformEvent>) -> Self {
        self.polls.push_back(Ok(events));
        self
    }

    /// Queue a failing poll
    pub fn with_poll_error(mut self, error: PlatformError) -> Self {
        self.polls.push_back(Err(error));
        self
    }

    pub fn failing_sends_to(mut self, destination: &str) -> Self {
        self.failing_destinations.insert(destination.to_string());
        self
    }

    pub fn failing_channel_listing(mut self) -> Self {
        self.fail_channel_listing = true;
        self
    }

    pub fn tap(&self) -> ConnectionTap {
        self.tap.clone()
    }
}

#[async_trait]
impl Connection for MockConnection {
    async fn poll_events(&mut self) -> Result<Vec<PlatformEvent>, PlatformError> {
        lock(&self.tap.log).polls += 1;
        self.polls.pop_front().unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn send(&self, destination: &str, text: &str) -> Result<(), PlatformError> {
        if self.failing_destinations.contains(destination) {
            return Err(PlatformError::Api(format!("channel_not_found: {}", destination)));
        }
        lock(&self.tap.log)
            .sent
            .push((destination.to_string(), text.to_string()));
        Ok(())
    }

    async fn list_users(&self) -> Result<Vec<UserEntry>, PlatformError> {
        Ok(self.users.clone())
    }

    async fn list_channels(&self) -> Result<Vec<ChannelEntry>, PlatformError> {
        if self.fail_channel_listing {
            return Err(PlatformError::Api("channels unavailable".to_string()));
        }
        Ok(self.channels.clone())
    }

    async fn open_direct_message(&self, user_id: &str) -> Result<Option<String>, PlatformError> {
        lock(&self.tap.log).dm_requests.push(user_id.to_string());
        Ok(self.dm_channels.get(user_id).cloned())
    }
}

// =============================================================================
// MockPlatform
// =============================================================================

/// Read side of a `MockPlatform`
#[derive(Debug, Clone, Default)]
pub struct PlatformTap {
    attempts: Arc<Mutex<usize>>,
}

impl PlatformTap {
    /// Number of `connect()` calls so far
    pub fn connect_attempts(&self) -> usize {
        *lock(&self.attempts)
    }
}

/// Platform that hands out scripted connection outcomes in order.
///
/// Once the script is exhausted every further attempt fails.
#[derive(Debug, Default)]
pub struct MockPlatform {
    outcomes: Mutex<VecDeque<Result<MockConnection, PlatformError>>>,
    tap: PlatformTap,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then_connect(self, conn: MockConnection) -> Self {
        lock(&self.outcomes).push_back(Ok(conn));
        self
    }

    pub fn then_fail(self, error: PlatformError) -> Self {
        lock(&self.outcomes).push_back(Err(error));
        self
    }

    pub fn tap(&self) -> PlatformTap {
        self.tap.clone()
    }
}

#[async_trait]
impl Platform for MockPlatform {
    fn platform_id(&self) -> &'static str {
        "mock"
    }

    async fn connect(&self) -> Result<Box<dyn Connection>, PlatformError> {
        *lock(&self.tap.attempts) += 1;
        let next = lock(&self.outcomes).pop_front();
        match next {
            Some(Ok(conn)) => Ok(Box::new(conn)),
            Some(Err(e)) => Err(e),
            None => Err(PlatformError::Connection(
                "no more scripted connections".to_string(),
            )),
        }
    }
}

// =============================================================================
// ScriptedBrain
// =============================================================================

type Responder = Box<dyn FnMut(&str, &str, &str) -> Vec<Reply> + Send>;

#[derive(Debug, Default)]
struct BrainLog {
    messages: Vec<(String, String, String)>,
    non_response_calls: usize,
}

/// Read side of a `ScriptedBrain`
#[derive(Debug, Clone, Default)]
pub struct BrainTap {
    log: Arc<Mutex<BrainLog>>,
}

impl BrainTap {
    /// (user, channel, text) for every dispatched message
    pub fn messages(&self) -> Vec<(String, String, String)> {
        lock(&self.log).messages.clone()
    }

    pub fn non_response_calls(&self) -> usize {
        lock(&self.log).non_response_calls
    }
}

/// Brain whose replies come from a closure and a per-tick script.
#[derive(Default)]
pub struct ScriptedBrain {
    responder: Option<Responder>,
    message_error: Option<String>,
    non_response_error: Option<String>,
    unsolicited: VecDeque<Vec<Reply>>,
    startup: Option<Vec<Reply>>,
    tap: BrainTap,
}

impl ScriptedBrain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply to every message with `f(user, channel, text)`
    pub fn replying(
        mut self,
        f: impl FnMut(&str, &str, &str) -> Vec<Reply> + Send + 'static,
    ) -> Self {
        self.responder = Some(Box::new(f));
        self
    }

    /// Fail every `handle_message` call with `message`
    pub fn failing_messages(mut self, message: &str) -> Self {
        self.message_error = Some(message.to_string());
        self
    }

    /// Fail every `handle_non_response` call with `message`
    pub fn failing_non_response(mut self, message: &str) -> Self {
        self.non_response_error = Some(message.to_string());
        self
    }

    /// Replies returned by the next unscripted `handle_non_response` call
    pub fn then_unsolicited(mut self, replies: Vec<Reply>) -> Self {
        self.unsolicited.push_back(replies);
        self
    }

    /// Enable the startup capability
    pub fn with_startup(mut self, replies: Vec<Reply>) -> Self {
        self.startup = Some(replies);
        self
    }

    pub fn tap(&self) -> BrainTap {
        self.tap.clone()
    }
}

#[async_trait]
impl Brain for ScriptedBrain {
    async fn handle_message(&mut self, user: &str, channel: &str, text: &str) -> Result<Vec<Reply>> {
        lock(&self.tap.log).messages.push((
            user.to_string(),
            channel.to_string(),
            text.to_string(),
        ));
        if let Some(message) = &self.message_error {
            anyhow::bail!("{}", message);
        }
        Ok(self
            .responder
            .as_mut()
            .map(|f| f(user, channel, text))
            .unwrap_or_default())
    }

    async fn handle_non_response(&mut self) -> Result<Vec<Reply>> {
        lock(&self.tap.log).non_response_calls += 1;
        if let Some(message) = &self.non_response_error {
            anyhow::bail!("{}", message);
        }
        Ok(self.unsolicited.pop_front().unwrap_or_default())
    }

    fn greeter(&mut self) -> Option<&mut dyn StartupGreeter> {
        if self.startup.is_some() {
            Some(self)
        } else {
            None
        }
    }
}

#[async_trait]
impl StartupGreeter for ScriptedBrain {
    async fn startup_message(&mut self) -> Result<Vec<Reply>> {
        Ok(self.startup.clone().unwrap_or_default())
    }
}

// =============================================================================
// RecordingTranscript
// =============================================================================

/// Read side of a `RecordingTranscript`
#[derive(Debug, Clone, Default)]
pub struct TranscriptTap {
    lines: Arc<Mutex<Vec<String>>>,
}

impl TranscriptTap {
    pub fn lines(&self) -> Vec<String> {
        lock(&self.lines).clone()
    }
}

/// Keeps `#channel | user: text` lines in memory
#[derive(Debug, Default)]
pub struct RecordingTranscript {
    tap: TranscriptTap,
}

impl RecordingTranscript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tap(&self) -> TranscriptTap {
        self.tap.clone()
    }
}

impl Transcript for RecordingTranscript {
    fn record(&mut self, channel: &str, user: &str, text: &str) {
        lock(&self.tap.lines).push(format!("#{} | {}: {}", channel, user, text));
    }
}
