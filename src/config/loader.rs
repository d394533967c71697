//! Settings and request batch loader.
//!
//! This module provides functionality to load settings from JSON files or
//! the default config location, and request batches from JSON files.

use crate::config::Settings;
use crate::error::{Error, Result};
use crate::probe::types::ProbeRequest;
use std::path::{Path, PathBuf};

/// Settings file name inside the config directory.
const SETTINGS_FILE: &str = "config.json";

/// Configuration loader.
///
/// Provides various methods to load settings and request batches
/// from different sources.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load settings from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let settings = ConfigLoader::load_from_file("config.json")?;
    /// println!("{} echo attempts", settings.ping_count);
    /// ```
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Settings> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let settings: Settings = serde_json::from_str(&content)?;
        Self::validate(&settings)?;
        Ok(settings)
    }

    /// Load settings from the default location.
    ///
    /// Reads `$CONFIG_DIR/netprobe/config.json` when it exists and falls back
    /// to the built-in defaults otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be parsed.
    pub fn load_default() -> Result<Settings> {
        let path = Self::settings_path();
        if path.exists() {
            tracing::debug!("Loading settings from {}", path.display());
            Self::load_from_file(path)
        } else {
            Ok(Settings::default())
        }
    }

    /// Load settings from `path` if given, else from the default location.
    ///
    /// # Errors
    ///
    /// Returns an error if the chosen file cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Settings> {
        match path {
            Some(path) => Self::load_from_file(path),
            None => Self::load_default(),
        }
    }

    /// Write settings as pretty JSON, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be written.
    pub fn save<P: AsRef<Path>>(settings: &Settings, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(settings)?)?;
        Ok(())
    }

    /// Get the config directory path.
    #[must_use]
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("netprobe")
    }

    /// Get the default settings file path.
    #[must_use]
    pub fn settings_path() -> PathBuf {
        Self::config_dir().join(SETTINGS_FILE)
    }

    /// Load a request batch (a JSON array of requests).
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    ///
    /// # Example
    ///
    /// ```ignore
    /// // [{"kind": "dns", "target": "example.com", "options": {"record_type": "MX"}}]
    /// let requests = ConfigLoader::load_requests("batch.json")?;
    /// ```
    pub fn load_requests<P: AsRef<Path>>(path: P) -> Result<Vec<ProbeRequest>> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let requests: Vec<ProbeRequest> = serde_json::from_str(&content)?;
        Ok(requests)
    }

    fn validate(settings: &Settings) -> Result<()> {
        if settings.ping_count == 0 {
            return Err(Error::config("ping_count must be at least 1"));
        }
        if settings.per_probe_timeout_ms == 0 {
            return Err(Error::config("per_probe_timeout_ms must be positive"));
        }
        for server in &settings.speed_servers {
            if !server.url.starts_with("http://") && !server.url.starts_with("https://") {
                return Err(Error::Config(format!(
                    "Invalid speed server URL: {}",
                    server.url
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::types::{ProbeKind, RecordType};
    use std::io::Write;

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"ping_count": 7, "geo_base_url": "http://localhost:8080"}}"#).unwrap();

        let settings = ConfigLoader::load_from_file(file.path()).unwrap();
        assert_eq!(settings.ping_count, 7);
        assert_eq!(settings.geo_base_url, "http://localhost:8080");
        assert_eq!(settings.ping_interval_ms, 1_000);
    }

    #[test]
    fn test_load_invalid_settings() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"ping_count": 0}}"#).unwrap();
        assert!(matches!(
            ConfigLoader::load_from_file(file.path()),
            Err(Error::Config(_))
        ));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(matches!(
            ConfigLoader::load_from_file(file.path()),
            Err(Error::Json(_))
        ));
    }

    #[test]
    fn test_load_bad_speed_server() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"speed_servers": [{{"host": "x", "url": "ftp://x"}}]}}"#
        )
        .unwrap();
        assert!(ConfigLoader::load_from_file(file.path()).is_err());
    }

    #[test]
    fn test_save_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let settings = Settings {
            max_concurrency: 2,
            ..Settings::default()
        };

        ConfigLoader::save(&settings, &path).unwrap();
        assert_eq!(ConfigLoader::load_from_file(&path).unwrap(), settings);
    }

    #[test]
    fn test_load_requests() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[
                {{"kind": "dns", "target": "example.com", "options": {{"record_type": "NS"}}}},
                {{"kind": "latency", "target": "1.1.1.1", "options": {{"sample_count": 3}}}},
                {{"kind": "local_ip"}}
            ]"#
        )
        .unwrap();

        let requests = ConfigLoader::load_requests(file.path()).unwrap();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[0].options().record_type, Some(RecordType::Ns));
        assert_eq!(requests[1].kind(), ProbeKind::Latency);
        assert_eq!(requests[2].target(), "");
    }

    #[test]
    fn test_settings_path() {
        assert!(ConfigLoader::settings_path().ends_with("netprobe/config.json"));
    }
}
