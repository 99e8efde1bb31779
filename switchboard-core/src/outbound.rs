// ABOUTME: Outbound message queue that coalesces adjacent same-destination replies
// ABOUTME: Flushes are rate-gated so the bot never sends faster than one wave per interval

use std::time::Duration;
use tokio::time::Instant;

use crate::error::PlatformError;
use crate::metrics;
use crate::reply::NormalizedReply;
use crate::traits::Connection;

/// Minimum time between two send waves
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(1);

/// Outcome of one send wave
#[derive(Debug, Default)]
pub struct FlushReport {
    /// Messages delivered after coalescing
    pub sent: usize,
    /// Destinations whose send failed, with the error
    pub failed: Vec<(String, PlatformError)>,
}

/// Pending replies for the current session.
#[derive(Debug)]
pub struct OutboundQueue {
    pending: Vec<NormalizedReply>,
    min_interval: Duration,
    last_flush: Option<Instant>,
}

impl Default for OutboundQueue {
    fn default() -> Self {
        Self::new(DEFAULT_FLUSH_INTERVAL)
    }
}

impl OutboundQueue {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            pending: Vec::new(),
            min_interval,
            last_flush: None,
        }
    }

    pub fn enqueue(&mut self, replies: impl IntoIterator<Item = NormalizedReply>) {
        self.pending.extend(replies);
    }

    pub fn pending(&self) -> &[NormalizedReply] {
        &self.pending
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Whether a flush at `now` would be allowed to send
    pub fn is_open(&self, now: Instant) -> bool {
        match self.last_flush {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.min_interval,
        }
    }

    /// Send the pending batch if the rate gate is open.
    ///
    /// Returns `None` when nothing was attempted (gate closed or queue empty).
    /// A failed send is logged and doesn't stop the rest of the wave; the
    /// batch is cleared either way.
    pub async fn flush(&mut self, conn: &dyn Connection, now: Instant) -> Option<FlushReport> {
        if self.pending.is_empty() || !self.is_open(now) {
            return None;
        }

        let batch = coalesce(std::mem::take(&mut self.pending));
        metrics::record_flush(batch.len());

        let mut report = FlushReport::default();
        for reply in batch {
            match conn.send(&reply.destination, &reply.text).await {
                Ok(()) => {
                    metrics::record_send("ok");
                    report.sent += 1;
                }
                Err(e) => {
                    metrics::record_send("error");
                    tracing::error!(
                        destination = %reply.destination,
                        error = %e,
                        "Failed to send message"
                    );
                    report.failed.push((reply.destination, e));
                }
            }
        }
        self.last_flush = Some(now);
        Some(report)
    }
}

/// Merge runs of adjacent replies to the same destination, joining text with newlines.
///
/// Order is preserved; non-adjacent replies to one destination stay separate.
pub fn coalesce(replies: Vec<NormalizedReply>) -> Vec<NormalizedReply> {
    let mut out: Vec<NormalizedReply> = Vec::with_capacity(replies.len());
    for reply in replies {
        match out.last_mut() {
            Some(last) if last.destination == reply.destination => {
                last.text.push('\n');
                last.text.push_str(&reply.text);
            }
            _ => out.push(reply),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockConnection;

    fn r(dest: &str, text: &str) -> NormalizedReply {
        NormalizedReply::new(dest, text)
    }

    #[test]
    fn test_coalesce_adjacent_runs() {
        let out = coalesce(vec![r("A", "x"), r("A", "y"), r("B", "z")]);
        assert_eq!(out, vec![r("A", "x\ny"), r("B", "z")]);
    }

    #[test]
    fn test_coalesce_never_regroups() {
        let out = coalesce(vec![r("A", "1"), r("B", "2"), r("A", "3")]);
        assert_eq!(out, vec![r("A", "1"), r("B", "2"), r("A", "3")]);
    }

    #[test]
    fn test_coalesce_empty() {
        assert!(coalesce(Vec::new()).is_empty());
    }

    #[tokio::test]
    async fn test_flush_sends_coalesced_batch_in_order() {
        let conn = MockConnection::new();
        let mut queue = OutboundQueue::default();
        queue.enqueue(vec![r("A", "x"), r("A", "y"), r("B", "z")]);

        let report = queue.flush(&conn, Instant::now()).await.unwrap();
        assert_eq!(report.sent, 2);
        assert!(report.failed.is_empty());
        assert_eq!(
            conn.tap().sent(),
            vec![
                ("A".to_string(), "x\ny".to_string()),
                ("B".to_string(), "z".to_string())
            ]
        );
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_flush_is_rate_gated() {
        let conn = MockConnection::new();
        let mut queue = OutboundQueue::new(Duration::from_secs(1));
        let start = Instant::now();

        queue.enqueue(vec![r("A", "first")]);
        assert!(queue.flush(&conn, start).await.is_some());

        queue.enqueue(vec![r("A", "second")]);
        let gated = queue
            .flush(&conn, start + Duration::from_millis(500))
            .await;
        assert!(gated.is_none());
        assert_eq!(queue.pending().len(), 1, "gated flush must not clear the queue");
        assert_eq!(conn.tap().sent().len(), 1);

        assert!(queue.flush(&conn, start + Duration::from_secs(1)).await.is_some());
        assert_eq!(conn.tap().sent().len(), 2);
    }

    #[tokio::test]
    async fn test_empty_flush_does_not_move_gate() {
        let conn = MockConnection::new();
        let mut queue = OutboundQueue::new(Duration::from_secs(1));
        let start = Instant::now();

        assert!(queue.flush(&conn, start).await.is_none());
        queue.enqueue(vec![r("A", "x")]);
        assert!(queue
            .flush(&conn, start + Duration::from_millis(10))
            .await
            .is_some());
    }

    #[tokio::test]
    async fn test_send_failure_does_not_abort_wave() {
        let conn = MockConnection::new().failing_sends_to("B");
        let mut queue = OutboundQueue::default();
        queue.enqueue(vec![r("A", "1"), r("B", "2"), r("C", "3")]);

        let report = queue.flush(&conn, Instant::now()).await.unwrap();
        assert_eq!(report.sent, 2);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "B");

        let sent: Vec<_> = conn.tap().sent().into_iter().map(|(d, _)| d).collect();
        assert_eq!(sent, vec!["A", "C"]);
        assert!(queue.is_empty(), "failed batch is not retried");
    }
}
