//! Configuration loader
//!
//! Loads the client configuration from environment variables or files.
//!
//! ## Loading Strategy
//! 1. First, attempts to load from environment variables
//! 2. If any required variable is missing, falls back to loading from file
//! 3. Probes multiple paths for config files
//! 4. Supports JSON and TOML formats
//!
//! Whatever the source, the result is checked with
//! [`ClientConfig::validate`] before it is returned.
//!
//! ## Environment Variables
//! - `PAWLINK_API_BASE_URL`: Base URL for relative endpoints (required)
//! - `PAWLINK_TOKEN_URL`: Identity provider token endpoint (required)
//! - `PAWLINK_CLIENT_ID`: OAuth client identifier (required)
//! - `PAWLINK_KEYCHAIN_SERVICE`: Secure store service namespace
//! - `PAWLINK_ACCOUNT`: Account the credentials are stored under
//! - `PAWLINK_REQUEST_TIMEOUT_SECS`: Per-dispatch timeout in seconds
//! - `PAWLINK_FAIL_FAST_WITHOUT_TOKEN`: Fail locally when no token is
//!   available (true/false)
//!
//! ## File Locations
//! The loader probes the following paths (in order):
//! 1. `./pawlink.toml` or `./pawlink.json` (current working directory)
//! 2. `./config.toml` or `./config.json` (current working directory)
//! 3. The same names one and two directories up
//! 4. Relative to executable location

use std::path::{Path, PathBuf};

use pawlink_domain::{AuthConfig, ClientConfig, PawlinkError, Result};

const FILE_NAMES: [&str; 4] = ["pawlink.toml", "pawlink.json", "config.toml", "config.json"];

/// Load configuration with automatic fallback strategy
///
/// # Errors
/// Returns `PawlinkError::Config` if:
/// - Configuration cannot be loaded from either source
/// - File format is invalid
/// - The loaded configuration fails validation
pub fn load() -> Result<ClientConfig> {
    match load_from_env() {
        Ok(config) => {
            tracing::info!("Configuration loaded from environment variables");
            Ok(config)
        }
        Err(e) => {
            tracing::debug!(error = %e, "Failed to load from environment, trying file");
            load_from_file(None)
        }
    }
}

/// Load configuration from environment variables
///
/// Sections without variables (retry, stream, upload) take their defaults.
///
/// # Errors
/// Returns `PawlinkError::Config` if required variables are missing
/// or have invalid values.
pub fn load_from_env() -> Result<ClientConfig> {
    let base_url = env_var("PAWLINK_API_BASE_URL")?;
    let token_url = env_var("PAWLINK_TOKEN_URL")?;
    let client_id = env_var("PAWLINK_CLIENT_ID")?;

    let mut auth = AuthConfig::new(token_url, client_id);
    if let Ok(service) = std::env::var("PAWLINK_KEYCHAIN_SERVICE") {
        auth.keychain_service = service;
    }
    if let Ok(account) = std::env::var("PAWLINK_ACCOUNT") {
        auth.account = account;
    }
    auth.fail_fast_without_token = env_bool("PAWLINK_FAIL_FAST_WITHOUT_TOKEN", false);

    let mut config = ClientConfig::new(base_url, auth);
    if let Ok(timeout) = std::env::var("PAWLINK_REQUEST_TIMEOUT_SECS") {
        config.request_timeout_secs = timeout
            .parse::<u64>()
            .map_err(|e| PawlinkError::Config(format!("Invalid request timeout: {e}")))?;
    }

    config.validate()?;
    Ok(config)
}

/// Load configuration from a file
///
/// If `path` is `None`, probes multiple locations for config files.
/// Supports both JSON and TOML formats (detected by file extension).
///
/// # Errors
/// Returns `PawlinkError::Config` if:
/// - File not found (when path is specified)
/// - No config file found (when path is `None`)
/// - File format is invalid or the configuration fails validation
pub fn load_from_file(path: Option<PathBuf>) -> Result<ClientConfig> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(PawlinkError::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            PawlinkError::Config("No config file found in any of the standard locations".into())
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| PawlinkError::Config(format!("Failed to read config file: {e}")))?;

    let config = parse_config(&contents, &config_path)?;
    config.validate()?;
    Ok(config)
}

/// Parse configuration from string content, format chosen by extension
fn parse_config(contents: &str, path: &Path) -> Result<ClientConfig> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| PawlinkError::Config(format!("Invalid TOML format: {e}"))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| PawlinkError::Config(format!("Invalid JSON format: {e}"))),
        _ => Err(PawlinkError::Config(format!("Unsupported config format: {extension}"))),
    }
}

/// Probe the standard locations for a configuration file
///
/// Returns the first config file found, or `None` if no file exists.
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut roots = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        roots.push(cwd.clone());
        roots.push(cwd.join(".."));
        roots.push(cwd.join("../.."));
    }

    if let Some(exe_dir) = std::env::current_exe().ok().and_then(|p| p.parent().map(Path::to_path_buf)) {
        roots.push(exe_dir.clone());
        roots.push(exe_dir.join(".."));
    }

    roots
        .iter()
        .flat_map(|root| FILE_NAMES.iter().map(move |name| root.join(name)))
        .find(|path| path.exists())
}

fn env_var(key: &str) -> Result<String> {
    std::env::var(key)
        .map_err(|_| PawlinkError::Config(format!("Missing required environment variable: {key}")))
}

/// Parse boolean from environment variable
///
/// Accepts: `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` (case-insensitive)
fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map_or(default, |s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}
