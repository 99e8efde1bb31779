// ABOUTME: Root library module for the switchboard bot runner
// ABOUTME: Config, logging, built-in brains, and platform implementations around switchboard-core

pub mod brain;
pub mod config;
pub mod logging;
pub mod paths;
pub mod platform;

// Re-export the core session types for convenience
pub use switchboard_core::{
    Brain, Connection, Platform, Reply, SessionConfig, SessionError, SessionManager,
};
