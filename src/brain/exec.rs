// ABOUTME: Brain backed by an external process speaking JSON lines over stdin/stdout
// ABOUTME: A failed or silent child is killed and respawned lazily on the next request

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::process::Stdio;
use std::time::Duration;
use switchboard_core::{replies_from_json, Brain, Reply, StartupGreeter};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command as ProcessCommand};

/// One request line written to the child
#[derive(Debug, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
enum Request<'a> {
    Message {
        user: &'a str,
        channel: &'a str,
        text: &'a str,
    },
    Tick,
    Startup,
}

struct Worker {
    // Held so kill_on_drop fires when the worker goes away
    _child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
}

impl Worker {
    fn spawn(command: &str, args: &[String]) -> Result<Self> {
        tracing::debug!(command = %command, ?args, "Spawning brain process");

        let mut child = ProcessCommand::new(command)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to spawn brain process {}", command))?;

        metrics::counter!("switchboard_brain_spawns_total").increment(1);

        let stdin = child.stdin.take().context("Failed to capture stdin")?;
        let stdout = child.stdout.take().context("Failed to capture stdout")?;

        Ok(Self {
            _child: child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
        })
    }

    async fn exchange(&mut self, request: &Request<'_>) -> Result<Vec<Value>> {
        let mut line = serde_json::to_string(request)?;
        line.push('\n');
        self.stdin
            .write_all(line.as_bytes())
            .await
            .context("Failed to write to brain process")?;
        self.stdin.flush().await?;

        loop {
            let line = self
                .stdout
                .next_line()
                .await
                .context("Failed to read from brain process")?
                .context("Brain process closed its output")?;
            if line.trim().is_empty() {
                continue;
            }
            let value: Value = serde_json::from_str(&line)
                .with_context(|| format!("Brain process sent invalid JSON: {}", line))?;
            return match value {
                Value::Array(items) => Ok(items),
                other => anyhow::bail!("Brain process sent a non-array response: {}", other),
            };
        }
    }
}

pub struct ExecBrain {
    command: String,
    args: Vec<String>,
    timeout: Duration,
    worker: Option<Worker>,
}

impl ExecBrain {
    pub fn new(command: String, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            command,
            args,
            timeout,
            worker: None,
        }
    }

    fn worker(&mut self) -> Result<&mut Worker> {
        if self.worker.is_none() {
            self.worker = Some(Worker::spawn(&self.command, &self.args)?);
        }
        self.worker
            .as_mut()
            .context("Brain process is not running")
    }

    async fn request(&mut self, request: Request<'_>) -> Result<Vec<Reply>> {
        let timeout = self.timeout;
        let worker = self.worker()?;
        let outcome = tokio::time::timeout(timeout, worker.exchange(&request)).await;
        match outcome {
            Ok(Ok(values)) => Ok(replies_from_json(&values)),
            Ok(Err(e)) => {
                self.worker = None;
                Err(e)
            }
            Err(_) => {
                self.worker = None;
                anyhow::bail!("Brain process did not answer within {:?}", timeout)
            }
        }
    }
}

#[async_trait]
impl Brain for ExecBrain {
    async fn handle_message(&mut self, user: &str, channel: &str, text: &str) -> Result<Vec<Reply>> {
        self.request(Request::Message {
            user,
            channel,
            text,
        })
        .await
    }

    async fn handle_non_response(&mut self) -> Result<Vec<Reply>> {
        self.request(Request::Tick).await
    }

    fn greeter(&mut self) -> Option<&mut dyn StartupGreeter> {
        Some(self)
    }
}

#[async_trait]
impl StartupGreeter for ExecBrain {
    async fn startup_message(&mut self) -> Result<Vec<Reply>> {
        self.request(Request::Startup).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_format() {
        let message = Request::Message {
            user: "alice",
            channel: "general",
            text: "hi",
        };
        assert_eq!(
            serde_json::to_value(&message).unwrap(),
            serde_json::json!({"event": "message", "user": "alice", "channel": "general", "text": "hi"})
        );
        assert_eq!(
            serde_json::to_string(&Request::Tick).unwrap(),
            r#"{"event":"tick"}"#
        );
        assert_eq!(
            serde_json::to_string(&Request::Startup).unwrap(),
            r#"{"event":"startup"}"#
        );
    }

    #[tokio::test]
    async fn test_missing_command_is_an_error() {
        let mut brain = ExecBrain::new(
            "/nonexistent/switchboard-brain".to_string(),
            Vec::new(),
            Duration::from_secs(1),
        );
        assert!(brain.handle_message("a", "b", "c").await.is_err());
    }
}
