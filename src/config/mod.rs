use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use config::{Config, ConfigError, File, FileFormat};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    pub wallet: WalletConfig,
    pub backend: BackendConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub ui: UiConfig,
}

impl SessionConfig {
    pub fn load() -> Result<Self> {
        let configured_path = std::env::var("SKILLS_SESSION_CONFIG")
            .unwrap_or_else(|_| "config/session.toml".to_string());
        assert!(
            !configured_path.is_empty(),
            "Configuration path must be non-empty"
        );
        assert!(
            configured_path.len() < 4096,
            "Configuration path length exceeds hard limit"
        );

        let mut builder = Config::builder()
            .add_source(File::new(&configured_path, FileFormat::Toml).required(true));

        if let Ok(env_override) = std::env::var("SKILLS_SESSION_ENV") {
            if !env_override.is_empty() {
                let env_file = format!("config/session.{}.toml", env_override);
                if Path::new(&env_file).exists() {
                    builder = builder.add_source(File::new(&env_file, FileFormat::Toml));
                }
            }
        }

        let settings = builder
            .build()
            .map_err(|err| map_config_error(err, &configured_path))?;
        let config: Self = settings
            .try_deserialize()
            .context("Failed to deserialize session configuration")?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        assert!(
            !self.wallet.rpc_url.is_empty(),
            "Wallet agent RPC URL must be specified"
        );
        assert!(
            !self.backend.rpc_url.is_empty(),
            "Identity backend RPC URL must be specified"
        );
        self.wallet.ensure_bounds()?;
        self.backend.ensure_bounds()?;
        self.ui.ensure_bounds()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalletConfig {
    pub rpc_url: String,
    pub request_timeout_ms: Option<u64>,
    #[serde(default = "WalletConfig::default_detect_attempts")]
    pub detect_attempts: u32,
    #[serde(default = "WalletConfig::default_detect_interval_ms")]
    pub detect_interval_ms: u64,
}

impl WalletConfig {
    pub fn request_timeout(&self) -> Duration {
        request_timeout(self.request_timeout_ms)
    }

    /// Upper bound on availability probes while waiting for the wallet
    /// agent to come up.
    pub fn detect_attempts(&self) -> u32 {
        assert!(self.detect_attempts >= 1, "At least one probe is required");
        assert!(
            self.detect_attempts <= 20,
            "Detection attempts exceed defensive limit"
        );
        self.detect_attempts
    }

    pub fn detect_interval(&self) -> Duration {
        assert!(
            self.detect_interval_ms >= 50,
            "Detection interval must be >= 50ms"
        );
        assert!(
            self.detect_interval_ms <= 5_000,
            "Detection interval must be <= 5 seconds"
        );
        Duration::from_millis(self.detect_interval_ms)
    }

    fn ensure_bounds(&self) -> Result<()> {
        let _ = self.request_timeout();
        let _ = self.detect_attempts();
        let _ = self.detect_interval();
        Ok(())
    }

    const fn default_detect_attempts() -> u32 {
        5
    }

    const fn default_detect_interval_ms() -> u64 {
        400
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    pub rpc_url: String,
    pub request_timeout_ms: Option<u64>,
}

impl BackendConfig {
    pub fn request_timeout(&self) -> Duration {
        request_timeout(self.request_timeout_ms)
    }

    fn ensure_bounds(&self) -> Result<()> {
        let _ = self.request_timeout();
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageConfig {
    pub path: Option<PathBuf>,
}

impl StorageConfig {
    /// Session file location: explicit path, else the platform state
    /// directory.
    pub fn session_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.path {
            assert!(
                path.as_os_str().len() < 4096,
                "Storage path length exceeds hard limit"
            );
            return Ok(path.clone());
        }
        let base = dirs::state_dir()
            .or_else(dirs::data_local_dir)
            .ok_or_else(|| anyhow!("No state directory available on this platform"))?;
        Ok(base.join("skills-session").join("session.json"))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UiConfig {
    #[serde(default = "UiConfig::default_welcome_seconds")]
    pub welcome_seconds: u64,
    #[serde(default = "UiConfig::default_redirect_delay_ms")]
    pub redirect_delay_ms: u64,
    #[serde(default = "UiConfig::default_copy_feedback_ms")]
    pub copy_feedback_ms: u64,
    pub clipboard_command: Option<String>,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            welcome_seconds: Self::default_welcome_seconds(),
            redirect_delay_ms: Self::default_redirect_delay_ms(),
            copy_feedback_ms: Self::default_copy_feedback_ms(),
            clipboard_command: None,
        }
    }
}

impl UiConfig {
    /// How long the first-login welcome indicator stays visible.
    pub fn welcome_window(&self) -> Duration {
        assert!(self.welcome_seconds >= 1, "Welcome window must be >= 1s");
        assert!(
            self.welcome_seconds <= 60,
            "Welcome window must be <= 60 seconds"
        );
        Duration::from_secs(self.welcome_seconds)
    }

    /// Pause before a returning user is sent on to the dashboard.
    pub fn redirect_delay(&self) -> Duration {
        assert!(
            self.redirect_delay_ms <= 10_000,
            "Redirect delay must be <= 10 seconds"
        );
        Duration::from_millis(self.redirect_delay_ms)
    }

    pub fn copy_feedback_window(&self) -> Duration {
        assert!(
            self.copy_feedback_ms >= 200,
            "Copy feedback window must be >= 200ms"
        );
        assert!(
            self.copy_feedback_ms <= 10_000,
            "Copy feedback window must be <= 10 seconds"
        );
        Duration::from_millis(self.copy_feedback_ms)
    }

    fn ensure_bounds(&self) -> Result<()> {
        let _ = self.welcome_window();
        let _ = self.redirect_delay();
        let _ = self.copy_feedback_window();
        Ok(())
    }

    const fn default_welcome_seconds() -> u64 {
        5
    }

    const fn default_redirect_delay_ms() -> u64 {
        1_500
    }

    const fn default_copy_feedback_ms() -> u64 {
        1_800
    }
}

fn request_timeout(configured_ms: Option<u64>) -> Duration {
    let millis = configured_ms.unwrap_or(3_000);
    assert!(millis >= 100, "RPC timeout must be at least 100ms");
    assert!(millis <= 60_000, "RPC timeout cannot exceed 60 seconds");
    Duration::from_millis(millis)
}

fn map_config_error(err: ConfigError, path: &str) -> ConfigError {
    match err {
        ConfigError::NotFound(_) => ConfigError::NotFound(path.to_string()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml: &str) -> SessionConfig {
        Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()
            .expect("config builds")
            .try_deserialize()
            .expect("config deserializes")
    }

    #[test]
    fn minimal_config_gets_defaults() {
        let config = parse(
            r#"
            [wallet]
            rpc_url = "http://127.0.0.1:8546"

            [backend]
            rpc_url = "http://127.0.0.1:8080"
            "#,
        );
        config.validate().expect("defaults validate");
        assert_eq!(config.wallet.detect_attempts(), 5);
        assert_eq!(config.wallet.detect_interval(), Duration::from_millis(400));
        assert_eq!(config.wallet.request_timeout(), Duration::from_secs(3));
        assert_eq!(config.ui.welcome_window(), Duration::from_secs(5));
        assert_eq!(config.ui.redirect_delay(), Duration::from_millis(1_500));
        assert_eq!(config.ui.copy_feedback_window(), Duration::from_millis(1_800));
        assert!(config.storage.path.is_none());
    }

    #[test]
    fn explicit_storage_path_wins() {
        let config = parse(
            r#"
            [wallet]
            rpc_url = "http://127.0.0.1:8546"

            [backend]
            rpc_url = "http://127.0.0.1:8080"

            [storage]
            path = "/tmp/session.json"
            "#,
        );
        assert_eq!(
            config.storage.session_path().expect("path resolves"),
            PathBuf::from("/tmp/session.json")
        );
    }

    #[test]
    #[should_panic(expected = "Copy feedback window")]
    fn out_of_bound_copy_window_is_rejected() {
        let config = parse(
            r#"
            [wallet]
            rpc_url = "http://127.0.0.1:8546"

            [backend]
            rpc_url = "http://127.0.0.1:8080"

            [ui]
            copy_feedback_ms = 50
            "#,
        );
        let _ = config.ui.copy_feedback_window();
    }
}
