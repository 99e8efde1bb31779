// ABOUTME: Platform-agnostic session manager for real-time chat bots
// ABOUTME: Connection supervision, inbound filtering, reply normalization, and rate-limited sends

pub mod address_book;
pub mod error;
pub mod event;
pub mod metrics;
pub mod outbound;
pub mod reply;
pub mod session;
pub mod testing;
pub mod traits;

pub use address_book::{AddressBook, Directory};
pub use error::{PlatformError, ResolutionError, SessionError};
pub use event::{InboundFilter, InboundMessage, PlatformEvent};
pub use outbound::{coalesce, FlushReport, OutboundQueue};
pub use reply::{replies_from_json, MalformedReply, NormalizedReply, Reply, ReplyNormalizer};
pub use session::{SessionConfig, SessionManager, SessionState};
pub use traits::{
    Brain, ChannelEntry, Connection, Platform, StartupGreeter, Transcript, UserEntry,
};
