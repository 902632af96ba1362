//! CLI configuration file
//!
//! The file is optional JSON holding an `OrchestratorConfig`; missing fields
//! take their defaults. Command-line flags and their environment variables
//! are layered on top at startup.

use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};
use swarmcast_types::OrchestratorConfig;

pub const KEYS: &[&str] = &[
    "endpoint",
    "secret",
    "method_prefix",
    "request_timeout_secs",
    "download_dir",
    "poll_interval_ms",
    "poll_failure_limit",
    "media_extensions",
];

pub fn default_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("swarmcast"))
        .unwrap_or_else(|| PathBuf::from(".swarmcast"))
        .join("config.json")
}

/// Read the config file, falling back to defaults when it does not exist
pub fn load(path: &Path) -> Result<OrchestratorConfig> {
    match std::fs::read_to_string(path) {
        Ok(raw) => serde_json::from_str(&raw)
            .with_context(|| format!("Invalid config file {}", path.display())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(OrchestratorConfig::default()),
        Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
    }
}

pub fn save(path: &Path, config: &OrchestratorConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(config)?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
}

/// Flags and environment variables win over the file
pub fn apply_overrides(
    config: &mut OrchestratorConfig,
    rpc_url: Option<String>,
    rpc_secret: Option<String>,
) {
    if let Some(url) = rpc_url {
        config.engine.endpoint = url;
    }
    if let Some(secret) = rpc_secret {
        config.engine.secret = Some(secret).filter(|s| !s.is_empty());
    }
}

pub fn get_key(config: &OrchestratorConfig, key: &str) -> Result<String> {
    let value = match key {
        "endpoint" => config.engine.endpoint.clone(),
        "secret" => config.engine.secret.clone().unwrap_or_default(),
        "method_prefix" => config.engine.method_prefix.clone(),
        "request_timeout_secs" => config.engine.request_timeout_secs.to_string(),
        "download_dir" => config.download_dir.clone().unwrap_or_default(),
        "poll_interval_ms" => config.poll_interval_ms.to_string(),
        "poll_failure_limit" => config.poll_failure_limit.to_string(),
        "media_extensions" => config.media_extensions.join(","),
        _ => return Err(anyhow!("Unknown config key: {}", key)),
    };
    Ok(value)
}

/// Set one key from its string form. Empty strings clear optional values.
pub fn set_key(config: &mut OrchestratorConfig, key: &str, value: &str) -> Result<()> {
    let optional = |v: &str| Some(v.to_string()).filter(|s| !s.is_empty());
    match key {
        "endpoint" => config.engine.endpoint = value.to_string(),
        "secret" => config.engine.secret = optional(value),
        "method_prefix" => config.engine.method_prefix = value.to_string(),
        "request_timeout_secs" => config.engine.request_timeout_secs = value.parse()?,
        "download_dir" => config.download_dir = optional(value),
        "poll_interval_ms" => config.poll_interval_ms = value.parse()?,
        "poll_failure_limit" => config.poll_failure_limit = value.parse()?,
        "media_extensions" => {
            config.media_extensions = value
                .split(',')
                .map(str::trim)
                .filter(|ext| !ext.is_empty())
                .map(str::to_string)
                .collect()
        }
        _ => return Err(anyhow!("Unknown config key: {}", key)),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn temp_config_path() -> PathBuf {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        let id = NEXT.fetch_add(1, Ordering::Relaxed);
        std::env::temp_dir()
            .join(format!("swarmcast_cli_test_{}_{}", std::process::id(), id))
            .join("config.json")
    }

    #[test]
    fn missing_file_yields_defaults() {
        let config = load(&temp_config_path()).unwrap();
        assert_eq!(config, OrchestratorConfig::default());
    }

    #[test]
    fn partial_file_keeps_defaults_for_the_rest() {
        let path = temp_config_path();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, r#"{"engine": {"endpoint": "http://nas:6800/jsonrpc"}}"#).unwrap();

        let config = load(&path).unwrap();
        assert_eq!(config.engine.endpoint, "http://nas:6800/jsonrpc");
        assert_eq!(config.engine.method_prefix, "aria2");
        assert_eq!(config.poll_interval_ms, 1000);

        std::fs::write(&path, "{not json").unwrap();
        assert!(load(&path).is_err());
    }

    #[test]
    fn save_then_load() {
        let path = temp_config_path();
        let mut config = OrchestratorConfig::default();
        set_key(&mut config, "download_dir", "/srv/media").unwrap();
        save(&path, &config).unwrap();
        assert_eq!(load(&path).unwrap(), config);
    }

    #[test]
    fn keys_round_trip_through_strings() {
        let mut config = OrchestratorConfig::default();
        set_key(&mut config, "secret", "hunter2").unwrap();
        set_key(&mut config, "poll_failure_limit", "3").unwrap();
        set_key(&mut config, "media_extensions", ".mkv, .mp4,,").unwrap();

        assert_eq!(get_key(&config, "secret").unwrap(), "hunter2");
        assert_eq!(config.poll_failure_limit, 3);
        assert_eq!(config.media_extensions, vec![".mkv", ".mp4"]);

        set_key(&mut config, "secret", "").unwrap();
        assert!(config.engine.secret.is_none());

        assert!(set_key(&mut config, "poll_interval_ms", "soon").is_err());
        assert!(set_key(&mut config, "theme", "dark").is_err());
        for key in KEYS {
            assert!(get_key(&config, key).is_ok(), "{}", key);
        }
    }

    #[test]
    fn overrides_win_over_file() {
        let mut config = OrchestratorConfig::default();
        config.engine.secret = Some("from-file".to_string());
        apply_overrides(&mut config, Some("http://10.0.0.5:6800/jsonrpc".to_string()), None);
        assert_eq!(config.engine.endpoint, "http://10.0.0.5:6800/jsonrpc");
        assert_eq!(config.engine.secret.as_deref(), Some("from-file"));

        apply_overrides(&mut config, None, Some(String::new()));
        assert!(config.engine.secret.is_none());
    }
}
