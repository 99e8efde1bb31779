// ABOUTME: Local terminal platform: stdin lines become message events, sends go to stdout
// ABOUTME: One local user and one channel; useful for trying a brain without a chat service

use async_trait::async_trait;
use std::io::Write;
use std::sync::{Arc, Mutex as StdMutex};
use switchboard_core::{
    ChannelEntry, Connection, Platform, PlatformError, PlatformEvent, UserEntry,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::sync::Mutex;

pub const CONSOLE_CHANNEL_ID: &str = "C-console";
pub const CONSOLE_CHANNEL_NAME: &str = "console";

type SharedOutput = Arc<StdMutex<Box<dyn Write + Send>>>;

/// Console platform. The line reader outlives individual connections, so
/// reconnects keep reading the same stdin.
pub struct ConsolePlatform {
    inbox: Arc<Mutex<mpsc::UnboundedReceiver<String>>>,
    output: SharedOutput,
    user: UserEntry,
}

impl ConsolePlatform {
    /// Read from process stdin and write to stdout. Must be called inside a tokio runtime.
    pub fn stdin(user_name: &str) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Ok(None) => {
                        tracing::info!(platform = "console", "stdin closed");
                        break;
                    }
                    Err(e) => {
                        tracing::error!(platform = "console", error = %e, "Failed to read stdin");
                        break;
                    }
                }
            }
        });
        Self::from_parts(rx, Box::new(std::io::stdout()), user_name)
    }

    /// Build from an explicit line source and output sink
    pub fn from_parts(
        lines: mpsc::UnboundedReceiver<String>,
        output: Box<dyn Write + Send>,
        user_name: &str,
    ) -> Self {
        Self {
            inbox: Arc::new(Mutex::new(lines)),
            output: Arc::new(StdMutex::new(output)),
            user: UserEntry::new(format!("U-{}", user_name), user_name),
        }
    }
}

#[async_trait]
impl Platform for ConsolePlatform {
    fn platform_id(&self) -> &'static str {
        "console"
    }

    async fn connect(&self) -> Result<Box<dyn Connection>, PlatformError> {
        tracing::debug!(platform = "console", user = %self.user.id, "Console connected");
        Ok(Box::new(ConsoleConnection {
            inbox: Arc::clone(&self.inbox),
            output: Arc::clone(&self.output),
            user: self.user.clone(),
            input_closed: false,
        }))
    }
}

pub struct ConsoleConnection {
    inbox: Arc<Mutex<mpsc::UnboundedReceiver<String>>>,
    output: SharedOutput,
    user: UserEntry,
    input_closed: bool,
}

impl ConsoleConnection {
    fn dm_channel(&self) -> String {
        format!("D-{}", self.user.id)
    }
}

#[async_trait]
impl Connection for ConsoleConnection {
    async fn poll_events(&mut self) -> Result<Vec<PlatformEvent>, PlatformError> {
        let mut inbox = self.inbox.lock().await;
        let mut events = Vec::new();
        loop {
            match inbox.try_recv() {
                Ok(line) => events.push(
                    PlatformEvent::new()
                        .with("type", "message")
                        .with("user", self.user.id.as_str())
                        .with("channel", CONSOLE_CHANNEL_ID)
                        .with("text", line),
                ),
                Err(TryRecvError::Empty) => break,
                // No more input; keep serving unsolicited replies
                Err(TryRecvError::Disconnected) => {
                    if !self.input_closed {
                        tracing::debug!(platform = "console", "Input exhausted");
                        self.input_closed = true;
                    }
                    break;
                }
            }
        }
        Ok(events)
    }

    async fn send(&self, destination: &str, text: &str) -> Result<(), PlatformError> {
        let mut output = self
            .output
            .lock()
            .map_err(|_| PlatformError::Closed("console output lock poisoned".to_string()))?;
        for line in text.lines() {
            writeln!(output, "[{}] {}", destination, line)?;
        }
        output.flush()?;
        Ok(())
    }

    async fn list_users(&self) -> Result<Vec<UserEntry>, PlatformError> {
        Ok(vec![self.user.clone()])
    }

    async fn list_channels(&self) -> Result<Vec<ChannelEntry>, PlatformError> {
        Ok(vec![ChannelEntry::new(CONSOLE_CHANNEL_ID, CONSOLE_CHANNEL_NAME)])
    }

    async fn open_direct_message(&self, user_id: &str) -> Result<Option<String>, PlatformError> {
        Ok((user_id == self.user.id).then(|| self.dm_channel()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<StdMutex<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuffer {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    #[tokio::test]
    async fn test_poll_drains_buffered_lines() {
        let (tx, rx) = mpsc::unbounded_channel();
        let platform = ConsolePlatform::from_parts(rx, Box::new(SharedBuffer::default()), "ada");
        let mut conn = platform.connect().await.unwrap();

        tx.send("hello".to_string()).unwrap();
        tx.send("world".to_string()).unwrap();

        let events = conn.poll_events().await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].get_str("user"), Some("U-ada"));
        assert_eq!(events[0].get_str("channel"), Some(CONSOLE_CHANNEL_ID));
        assert_eq!(events[1].get_str("text"), Some("world"));

        assert!(conn.poll_events().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_closed_input_is_not_an_error() {
        let (tx, rx) = mpsc::unbounded_channel();
        let platform = ConsolePlatform::from_parts(rx, Box::new(SharedBuffer::default()), "ada");
        let mut conn = platform.connect().await.unwrap();
        drop(tx);
        assert!(conn.poll_events().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_send_prefixes_each_line() {
        let (_tx, rx) = mpsc::unbounded_channel();
        let buffer = SharedBuffer::default();
        let platform = ConsolePlatform::from_parts(rx, Box::new(buffer.clone()), "ada");
        let conn = platform.connect().await.unwrap();

        conn.send(CONSOLE_CHANNEL_ID, "one\ntwo").await.unwrap();
        assert_eq!(buffer.contents(), "[C-console] one\n[C-console] two\n");
    }

    #[tokio::test]
    async fn test_directory_and_direct_messages() {
        let (_tx, rx) = mpsc::unbounded_channel();
        let platform = ConsolePlatform::from_parts(rx, Box::new(SharedBuffer::default()), "ada");
        let conn = platform.connect().await.unwrap();

        assert_eq!(
            conn.list_users().await.unwrap(),
            vec![UserEntry::new("U-ada", "ada")]
        );
        assert_eq!(
            conn.list_channels().await.unwrap(),
            vec![ChannelEntry::new(CONSOLE_CHANNEL_ID, CONSOLE_CHANNEL_NAME)]
        );
        assert_eq!(
            conn.open_direct_message("U-ada").await.unwrap().as_deref(),
            Some("D-U-ada")
        );
        assert_eq!(conn.open_direct_message("U-bob").await.unwrap(), None);
    }
}
