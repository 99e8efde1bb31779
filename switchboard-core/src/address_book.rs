// ABOUTME: Bidirectional id <-> name lookup for users and channels, rebuilt on every connect
// ABOUTME: Lookups read an immutable Directory snapshot that rebuild swaps out whole

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{PlatformError, ResolutionError};
use crate::traits::{ChannelEntry, Connection, UserEntry};

/// One consistent view of the platform directory.
#[derive(Debug, Default)]
pub struct Directory {
    user_names: HashMap<String, String>,
    user_ids: HashMap<String, String>,
    channel_names: HashMap<String, String>,
    channel_ids: HashMap<String, String>,
}

impl Directory {
    pub fn from_entries(users: Vec<UserEntry>, channels: Vec<ChannelEntry>) -> Self {
        let mut directory = Directory::default();
        for user in users {
            // Users without a display name can't be addressed by name
            let Some(name) = user.display_name.filter(|n| !n.is_empty()) else {
                tracing::debug!(user_id = %user.id, "Skipping user without display name");
                continue;
            };
            directory.user_ids.insert(name.clone(), user.id.clone());
            directory.user_names.insert(user.id, name);
        }
        for channel in channels {
            directory
                .channel_ids
                .insert(channel.name.clone(), channel.id.clone());
            directory.channel_names.insert(channel.id, channel.name);
        }
        directory
    }

    pub fn user_count(&self) -> usize {
        self.user_names.len()
    }

    pub fn channel_count(&self) -> usize {
        self.channel_names.len()
    }
}

/// Address book held by the session manager.
#[derive(Debug, Default)]
pub struct AddressBook {
    directory: Arc<Directory>,
}

impl AddressBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch both directories and swap them in together.
    ///
    /// On error the previous directory stays in place.
    pub async fn rebuild(&mut self, conn: &dyn Connection) -> Result<(), PlatformError> {
        let users = conn.list_users().await?;
        let channels = conn.list_channels().await?;
        let directory = Directory::from_entries(users, channels);
        tracing::info!(
            users = directory.user_count(),
            channels = directory.channel_count(),
            "Address book rebuilt"
        );
        self.directory = Arc::new(directory);
        Ok(())
    }

    /// The current directory; holders keep a consistent view across rebuilds
    pub fn snapshot(&self) -> Arc<Directory> {
        Arc::clone(&self.directory)
    }

    /// Display name for a user id, falling back to the id itself
    pub fn user_name<'a>(&'a self, user_id: &'a str) -> &'a str {
        self.directory
            .user_names
            .get(user_id)
            .map(String::as_str)
            .unwrap_or(user_id)
    }

    /// Channel name for a channel id, falling back to the id itself
    pub fn channel_name<'a>(&'a self, channel_id: &'a str) -> &'a str {
        self.directory
            .channel_names
            .get(channel_id)
            .map(String::as_str)
            .unwrap_or(channel_id)
    }

    pub fn user_id(&self, name: &str) -> Option<&str> {
        self.directory.user_ids.get(name).map(String::as_str)
    }

    pub fn channel_id(&self, name: &str) -> Option<&str> {
        self.directory.channel_ids.get(name).map(String::as_str)
    }

    /// Resolve a display name or raw user id to a direct-message channel id.
    pub async fn resolve_user_to_dm_channel(
        &self,
        conn: &dyn Connection,
        user_ref: &str,
    ) -> Result<String, ResolutionError> {
        let user_id = self.user_id(user_ref).unwrap_or(user_ref);
        match conn.open_direct_message(user_id).await {
            Ok(Some(channel)) if !channel.is_empty() => Ok(channel),
            Ok(_) => Err(ResolutionError::NoChannel {
                user: user_id.to_string(),
            }),
            Err(source) => Err(ResolutionError::Platform {
                user: user_id.to_string(),
                source,
            }),
        }
    }
}
