//! Runtime configuration loader.
//!
//! Reads `config.toml` from the data directory and deserializes it into
//! [`RuntimeConfig`]. Falls back to defaults when the file is missing or
//! malformed.

use std::path::Path;

use courier_types::config::RuntimeConfig;

/// Load runtime configuration from `{data_dir}/config.toml`.
///
/// - Missing file: [`RuntimeConfig::default()`].
/// - Unreadable or unparsable file: logs a warning, returns the default.
pub async fn load_runtime_config(data_dir: &Path) -> RuntimeConfig {
    let config_path = data_dir.join("config.toml");

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", config_path.display());
            return RuntimeConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return RuntimeConfig::default();
        }
    };

    match toml::from_str::<RuntimeConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            RuntimeConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use courier_types::seal::ResealPolicy;
    use tempfile::TempDir;

    use super::*;

    #[tokio::test]
    async fn missing_file_returns_default() {
        let tmp = TempDir::new().unwrap();
        let config = load_runtime_config(tmp.path()).await;
        assert_eq!(config, RuntimeConfig::default());
    }

    #[tokio::test]
    async fn valid_toml_is_parsed() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(
            tmp.path().join("config.toml"),
            r#"
autostart = true
reseal = "reject"

[backoff]
initial_delay_ms = 250
max_attempts = 5
"#,
        )
        .await
        .unwrap();

        let config = load_runtime_config(tmp.path()).await;
        assert!(config.autostart);
        assert_eq!(config.reseal, ResealPolicy::Reject);
        assert_eq!(config.backoff.initial_delay_ms, 250);
        assert_eq!(config.backoff.max_delay_ms, 60_000);
        assert_eq!(config.backoff.max_attempts, Some(5));
    }

    #[tokio::test]
    async fn invalid_toml_returns_default() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(tmp.path().join("config.toml"), "autostart = {{ nope")
            .await
            .unwrap();

        let config = load_runtime_config(tmp.path()).await;
        assert_eq!(config, RuntimeConfig::default());
    }
}
