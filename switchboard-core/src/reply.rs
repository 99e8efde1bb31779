// ABOUTME: Brain reply shapes and the normalizer that turns them into (destination, text) pairs
// ABOUTME: Empty, malformed, or unresolvable replies are logged and dropped, never raised

use serde_json::Value;
use thiserror::Error;

use crate::address_book::AddressBook;
use crate::error::ResolutionError;
use crate::metrics;
use crate::traits::Connection;

/// A reply produced by a brain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Send to a channel id
    Channel { destination: String, text: String },
    /// Send as a direct message to a user (display name or raw id)
    User { user: String, text: String },
}

impl Reply {
    pub fn channel(destination: impl Into<String>, text: impl Into<String>) -> Self {
        Reply::Channel {
            destination: destination.into(),
            text: text.into(),
        }
    }

    pub fn user(user: impl Into<String>, text: impl Into<String>) -> Self {
        Reply::User {
            user: user.into(),
            text: text.into(),
        }
    }

    /// Parse a loosely-typed reply: `[destination, text]` or
    /// `[destination, text, is_direct_message]`.
    ///
    /// `null` and `false` in the first two slots read as empty and get
    /// dropped by the normalizer later.
    pub fn from_json(value: &Value) -> Result<Reply, MalformedReply> {
        let malformed = || MalformedReply(value.to_string());
        let parts = value.as_array().ok_or_else(malformed)?;
        let field = |v: &Value| -> Result<String, MalformedReply> {
            match v {
                Value::String(s) => Ok(s.clone()),
                Value::Null | Value::Bool(false) => Ok(String::new()),
                _ => Err(malformed()),
            }
        };
        match parts.as_slice() {
            [destination, text] => Ok(Reply::channel(field(destination)?, field(text)?)),
            [destination, text, flag] => {
                let direct = match flag {
                    Value::Bool(b) => *b,
                    Value::Null => false,
                    _ => return Err(malformed()),
                };
                let (destination, text) = (field(destination)?, field(text)?);
                Ok(if direct {
                    Reply::user(destination, text)
                } else {
                    Reply::channel(destination, text)
                })
            }
            _ => Err(malformed()),
        }
    }
}

impl<D: Into<String>, T: Into<String>> From<(D, T)> for Reply {
    fn from((destination, text): (D, T)) -> Self {
        Reply::channel(destination, text)
    }
}

impl<D: Into<String>, T: Into<String>> From<(D, T, bool)> for Reply {
    fn from((destination, text, direct): (D, T, bool)) -> Self {
        if direct {
            Reply::user(destination, text)
        } else {
            Reply::channel(destination, text)
        }
    }
}

/// A reply shape the normalizer can't use
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("bad response received from brain: {0}")]
pub struct MalformedReply(pub String);

/// A reply ready for the outbound queue; both fields are non-empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedReply {
    pub destination: String,
    pub text: String,
}

impl NormalizedReply {
    pub fn new(destination: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            destination: destination.into(),
            text: text.into(),
        }
    }
}

/// Canonicalizes brain replies against the current address book.
pub struct ReplyNormalizer<'a> {
    book: &'a AddressBook,
    conn: &'a dyn Connection,
}

impl<'a> ReplyNormalizer<'a> {
    pub fn new(book: &'a AddressBook, conn: &'a dyn Connection) -> Self {
        Self { book, conn }
    }

    pub async fn normalize(&self, replies: Vec<Reply>) -> Vec<NormalizedReply> {
        self.normalize_reporting(replies).await.0
    }

    /// Like `normalize`, also handing back the direct messages that couldn't
    /// be routed so the caller can report them.
    pub async fn normalize_reporting(
        &self,
        replies: Vec<Reply>,
    ) -> (Vec<NormalizedReply>, Vec<ResolutionError>) {
        let mut out = Vec::with_capacity(replies.len());
        let mut unresolved = Vec::new();
        for reply in replies {
            match reply {
                Reply::Channel { destination, text } => {
                    if destination.is_empty() || text.is_empty() {
                        metrics::record_reply_dropped("empty");
                        continue;
                    }
                    // Channel names are accepted as destinations too
                    let destination = self
                        .book
                        .channel_id(&destination)
                        .map(str::to_string)
                        .unwrap_or(destination);
                    out.push(NormalizedReply { destination, text });
                }
                Reply::User { user, text } => {
                    if user.is_empty() || text.is_empty() {
                        metrics::record_reply_dropped("empty");
                        continue;
                    }
                    match self.book.resolve_user_to_dm_channel(self.conn, &user).await {
                        Ok(destination) => out.push(NormalizedReply { destination, text }),
                        Err(e) => {
                            metrics::record_reply_dropped("unresolved");
                            tracing::error!(user = %user, error = %e, "Dropping direct-message reply");
                            unresolved.push(e);
                        }
                    }
                }
            }
        }
        (out, unresolved)
    }
}

/// Parse a batch of JSON replies, logging and skipping malformed entries.
pub fn replies_from_json(values: &[Value]) -> Vec<Reply> {
    values
        .iter()
        .filter_map(|value| match Reply::from_json(value) {
            Ok(reply) => Some(reply),
            Err(e) => {
                metrics::record_reply_dropped("malformed");
                tracing::warn!(error = %e, "Ignoring malformed reply");
                None
            }
        })
        .collect()
}
