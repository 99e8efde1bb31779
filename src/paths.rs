// ABOUTME: Where switchboard looks for its config file and writes its logs
// ABOUTME: Follows the platform's per-user directory conventions, with an env override for logs

use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::path::PathBuf;

const APP_NAME: &str = "switchboard";

/// Overrides the log directory, e.g. for containers without a home
pub const LOG_DIR_ENV: &str = "SWITCHBOARD_LOG_DIR";

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", APP_NAME)
}

/// Default config file, `~/.config/switchboard/config.toml` on Linux.
///
/// `None` when no home directory can be found; callers fall back to
/// built-in defaults.
pub fn config_file() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Directory for the error log and transcript.
///
/// `SWITCHBOARD_LOG_DIR` wins, then `~/.local/share/switchboard/logs` on
/// Linux. Having neither is an error rather than a guess at the cwd.
pub fn log_dir() -> Result<PathBuf> {
    let from_env = std::env::var_os(LOG_DIR_ENV)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from);
    resolve_log_dir(from_env, project_dirs())
}

fn resolve_log_dir(from_env: Option<PathBuf>, dirs: Option<ProjectDirs>) -> Result<PathBuf> {
    if let Some(dir) = from_env {
        return Ok(dir);
    }
    dirs.map(|d| d.data_local_dir().join("logs")).with_context(|| {
        format!(
            "No home directory to put logs in; set {} to choose one",
            LOG_DIR_ENV
        )
    })
}
