use crate::detector::DetectorConfig;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Poll interval of `watch`, in milliseconds.
    pub refresh_interval_ms: u64,
    /// Prefix given to sessions created by this tool.
    pub session_prefix: String,
    /// Start directory for new sessions when none is given.
    pub default_dir: Option<String>,
    /// Scrollback lines shown by `logs`.
    pub log_history: usize,
    /// Executable name that marks a Claude process.
    pub target_program: String,
    pub command_timeout_secs: u64,
    pub cwd_cache_ttl_secs: u64,
    pub active_window_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            refresh_interval_ms: 2000,
            session_prefix: "cd-".to_string(),
            default_dir: None,
            log_history: 1000,
            target_program: "claude".to_string(),
            command_timeout_secs: 5,
            cwd_cache_ttl_secs: 10,
            active_window_secs: 2,
        }
    }
}

impl Config {
    /// Load configuration from ~/.config/claude-dashboard/config.toml
    ///
    /// - File missing: returns default config (Ok)
    /// - File exists but invalid TOML: returns Err so caller can show warning
    /// - Field missing: uses its default
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config.sanitized())
    }

    /// Zero values fall back to defaults.
    fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        if self.refresh_interval_ms == 0 {
            self.refresh_interval_ms = defaults.refresh_interval_ms;
        }
        if self.log_history == 0 {
            self.log_history = defaults.log_history;
        }
        if self.command_timeout_secs == 0 {
            self.command_timeout_secs = defaults.command_timeout_secs;
        }
        if self.target_program.trim().is_empty() {
            self.target_program = defaults.target_program;
        }
        self
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn detector_config(&self) -> DetectorConfig {
        DetectorConfig {
            target_program: self.target_program.clone(),
            session_prefix: self.session_prefix.clone(),
            active_window: Duration::from_secs(self.active_window_secs),
            cwd_cache_ttl: Duration::from_secs(self.cwd_cache_ttl_secs),
        }
    }

    pub fn config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|d| {
            d.join(".config")
                .join("claude-dashboard")
                .join("config.toml")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.refresh_interval(), Duration::from_secs(2));
        assert_eq!(config.command_timeout(), Duration::from_secs(5));
        assert_eq!(config.session_prefix, "cd-");
        assert_eq!(config.log_history, 1000);
        assert!(config.default_dir.is_none());

        let detector = config.detector_config();
        assert_eq!(detector.target_program, "claude");
        assert_eq!(detector.active_window, Duration::from_secs(2));
        assert_eq!(detector.cwd_cache_ttl, Duration::from_secs(10));
    }

    #[test]
    fn test_load_valid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut file = fs::File::create(&path).unwrap();
        writeln!(file, "refresh_interval_ms = 500").unwrap();
        writeln!(file, r#"session_prefix = "cc-""#).unwrap();
        writeln!(file, r#"default_dir = "~/work""#).unwrap();
        writeln!(file, "active_window_secs = 5").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.refresh_interval(), Duration::from_millis(500));
        assert_eq!(config.session_prefix, "cc-");
        assert_eq!(config.default_dir.as_deref(), Some("~/work"));
        assert_eq!(config.detector_config().active_window, Duration::from_secs(5));
        // untouched fields keep defaults
        assert_eq!(config.log_history, 1000);
    }

    #[test]
    fn test_load_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "refresh_interval_ms = [[[invalid").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("config.toml"));
    }

    #[test]
    fn test_load_toml_missing_field() {
        let config: Config = toml::from_str("# empty config\n").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_zero_values_use_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "refresh_interval_ms = 0\nlog_history = 0\ntarget_program = \" \"\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.refresh_interval_ms, 2000);
        assert_eq!(config.log_history, 1000);
        assert_eq!(config.target_program, "claude");
    }
}
