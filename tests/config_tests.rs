// ABOUTME: Tests for configuration loading and validation
// ABOUTME: Verifies TOML file discovery, env var overrides, and credential validation

use serial_test::serial;
use std::io::Write;
use std::time::Duration;
use switchboard::config::{BrainKind, Config, PlatformKind};
use tempfile::TempDir;

/// Helper to clear all config-related env vars
fn clear_config_env_vars() {
    for var in [
        "SWITCHBOARD_CONFIG_PATH",
        "SWITCHBOARD_NAME",
        "SWITCHBOARD_LOG_TEXT",
        "SWITCHBOARD_MAINTAINER",
        "SLACK_BOT_TOKEN",
        "SLACK_APP_TOKEN",
        "SWITCHBOARD_BRAIN_COMMAND",
    ] {
        std::env::remove_var(var);
    }
}

fn write_config(dir: &TempDir, content: &str) -> std::path::PathBuf {
    let path = dir.path().join("config.toml");
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(content.as_bytes()).unwrap();
    path
}

#[test]
#[serial]
fn test_config_loads_from_explicit_path() {
    clear_config_env_vars();
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"
name = "eulerbot"
log_text = true
maintainer = "ocharles"

[platform]
kind = "slack"

[slack]
bot_token = "xoxb-test"
app_token = "xapp-test"

[brain]
kind = "exec"
command = "/usr/local/bin/euler"
args = ["--quiet"]
"#,
    );

    let config = Config::load(Some(&path)).unwrap();

    assert_eq!(config.name, "eulerbot");
    assert!(config.log_text);
    assert_eq!(config.maintainer.as_deref(), Some("ocharles"));
    assert_eq!(config.platform.kind, PlatformKind::Slack);
    assert_eq!(config.brain.kind, BrainKind::Exec);
    assert_eq!(config.brain.command.as_deref(), Some("/usr/local/bin/euler"));
    assert_eq!(config.brain.args, vec!["--quiet".to_string()]);
    assert_eq!(
        config.session_config().reconnect_delay,
        Duration::from_secs(10)
    );
}

#[test]
#[serial]
fn test_config_path_from_env() {
    clear_config_env_vars();
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "name = \"from-env-path\"\n");
    std::env::set_var("SWITCHBOARD_CONFIG_PATH", &path);

    let config = Config::load(None).unwrap();
    assert_eq!(config.name, "from-env-path");

    clear_config_env_vars();
}

#[test]
#[serial]
fn test_missing_explicit_path_is_an_error() {
    clear_config_env_vars();
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("nope.toml");
    assert!(Config::load(Some(&missing)).is_err());
}

#[test]
#[serial]
fn test_env_var_overrides() {
    clear_config_env_vars();
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"
name = "original"

[platform]
kind = "slack"

[brain]
kind = "exec"
"#,
    );

    std::env::set_var("SWITCHBOARD_NAME", "override");
    std::env::set_var("SWITCHBOARD_LOG_TEXT", "yes");
    std::env::set_var("SWITCHBOARD_MAINTAINER", "admin");
    std::env::set_var("SLACK_BOT_TOKEN", "xoxb-env");
    std::env::set_var("SLACK_APP_TOKEN", "xapp-env");
    std::env::set_var("SWITCHBOARD_BRAIN_COMMAND", "/bin/cat");

    let config = Config::load(Some(&path)).unwrap();
    clear_config_env_vars();

    assert_eq!(config.name, "override");
    assert!(config.log_text);
    assert_eq!(config.maintainer.as_deref(), Some("admin"));
    let slack = config.slack.unwrap();
    assert_eq!(slack.bot_token, "xoxb-env");
    assert_eq!(slack.app_token, "xapp-env");
    assert_eq!(config.brain.command.as_deref(), Some("/bin/cat"));
}

#[test]
#[serial]
fn test_slack_without_tokens_fails_to_load() {
    clear_config_env_vars();
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "[platform]\nkind = \"slack\"\n");

    let err = Config::load(Some(&path)).unwrap_err();
    assert!(format!("{:#}", err).contains("slack"));
}

#[test]
#[serial]
fn test_invalid_log_text_override_is_rejected() {
    clear_config_env_vars();
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "");
    std::env::set_var("SWITCHBOARD_LOG_TEXT", "sometimes");

    let result = Config::load(Some(&path));
    clear_config_env_vars();
    assert!(result.is_err());
}

#[test]
#[serial]
fn test_malformed_toml_is_an_error() {
    clear_config_env_vars();
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "name = [unclosed");
    assert!(Config::load(Some(&path)).is_err());
}
