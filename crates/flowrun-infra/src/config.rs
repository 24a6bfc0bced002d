//! Engine configuration loader.
//!
//! Reads `config.toml` from the data directory and deserializes it into
//! [`EngineConfig`]. Falls back to defaults when the file is missing or
//! malformed.

use std::path::Path;

use flowrun_types::config::EngineConfig;

use crate::sqlite::pool::database_url;

/// Load configuration from `{data_dir}/config.toml`.
///
/// - Missing file: [`EngineConfig::default()`].
/// - Unreadable or unparsable file: logs a warning, returns the default.
pub async fn load_engine_config(data_dir: &Path) -> EngineConfig {
    let config_path = data_dir.join("config.toml");

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", config_path.display());
            return EngineConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return EngineConfig::default();
        }
    };

    match toml::from_str::<EngineConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            EngineConfig::default()
        }
    }
}

/// The configured database URL, or the one derived from `data_dir`.
pub fn resolve_database_url(config: &EngineConfig, data_dir: &Path) -> String {
    config
        .database_url
        .clone()
        .unwrap_or_else(|| database_url(data_dir))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn load_engine_config_missing_file_returns_default() {
        let tmp = TempDir::new().unwrap();
        let config = load_engine_config(tmp.path()).await;
        assert_eq!(config.scheduler.poll_interval_secs, 60);
        assert!(config.database_url.is_none());
    }

    #[tokio::test]
    async fn load_engine_config_valid_toml_returns_parsed() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(
            tmp.path().join("config.toml"),
            r#"
[scheduler]
poll_interval_secs = 15
lookahead_secs = 20

[runner]
resume_url = "http://localhost:5678/resume"
"#,
        )
        .await
        .unwrap();

        let config = load_engine_config(tmp.path()).await;
        assert_eq!(config.scheduler.poll_interval_secs, 15);
        assert_eq!(config.scheduler.lookahead_secs, 20);
        assert_eq!(
            config.runner.resume_url.as_deref(),
            Some("http://localhost:5678/resume")
        );
        assert_eq!(config.recovery.notify_delay_secs, 10);
    }

    #[tokio::test]
    async fn load_engine_config_invalid_toml_returns_default() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(tmp.path().join("config.toml"), "this is not { valid toml !!!")
            .await
            .unwrap();

        let config = load_engine_config(tmp.path()).await;
        assert_eq!(config.scheduler.lookahead_secs, 70);
    }

    #[test]
    fn resolve_database_url_prefers_configured_url() {
        let mut config = EngineConfig::default();
        assert_eq!(
            resolve_database_url(&config, Path::new("/data")),
            "sqlite:///data/flowrun.db"
        );
        config.database_url = Some("sqlite://:memory:".to_string());
        assert_eq!(resolve_database_url(&config, Path::new("/data")), "sqlite://:memory:");
    }
}
