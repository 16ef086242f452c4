//! Configuration file for the revenant daemon.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use revenant_core::session::SessionOptions;
use revenant_core::HomePorts;
use revenant_proto::Dialect;

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Operator-visible name shown in return-home messages
    #[serde(default = "default_name")]
    pub name: String,
    /// Directory captured files are written to
    #[serde(default = "default_capture_dir")]
    pub capture_dir: PathBuf,
    /// Home-server ports clients are redirected back to
    #[serde(default)]
    pub home: HomeConfig,
    /// BB master key files to try in the multi-key detector
    #[serde(default)]
    pub bb_key_files: Vec<PathBuf>,
    /// Listeners, one per upstream target
    #[serde(default)]
    pub listeners: Vec<ListenerConfig>,
    /// Licences for linked sessions
    #[serde(default)]
    pub licenses: Vec<LicenseConfig>,
    /// Default session toggles
    #[serde(default)]
    pub session: SessionConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Home-server ports
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HomeConfig {
    /// DC/GC/XB login port
    #[serde(default = "default_console_login")]
    pub console_login: u16,
    /// PC login port
    #[serde(default = "default_pc_login")]
    pub pc_login: u16,
    /// BB patch port
    #[serde(default = "default_bb_patch")]
    pub bb_patch: u16,
    /// BB login port
    #[serde(default = "default_bb_login")]
    pub bb_login: u16,
}

impl Default for HomeConfig {
    fn default() -> Self {
        Self {
            console_login: default_console_login(),
            pc_login: default_pc_login(),
            bb_patch: default_bb_patch(),
            bb_login: default_bb_login(),
        }
    }
}

impl From<HomeConfig> for HomePorts {
    fn from(cfg: HomeConfig) -> Self {
        Self {
            console_login: cfg.console_login,
            pc_login: cfg.pc_login,
            bb_patch: cfg.bb_patch,
            bb_login: cfg.bb_login,
        }
    }
}

/// One listening port bridging to one upstream server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenerConfig {
    /// Local address to listen on
    pub listen: SocketAddr,
    /// Protocol dialect clients on this port speak
    pub dialect: DialectName,
    /// Upstream server sessions on this port are brokered to
    pub destination: SocketAddr,
}

/// Dialect names accepted in the config file
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DialectName {
    /// Dreamcast
    Dc,
    /// PC
    Pc,
    /// GameCube
    Gc,
    /// Xbox
    Xb,
    /// Blue Burst
    Bb,
    /// Patch server
    Patch,
}

impl From<DialectName> for Dialect {
    fn from(name: DialectName) -> Self {
        match name {
            DialectName::Dc => Dialect::Dc,
            DialectName::Pc => Dialect::Pc,
            DialectName::Gc => Dialect::Gc,
            DialectName::Xb => Dialect::Xb,
            DialectName::Bb => Dialect::Bb,
            DialectName::Patch => Dialect::Patch,
        }
    }
}

/// One stored licence
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LicenseConfig {
    /// Serial number issued to the local client
    pub serial_number: u32,
    /// Access key string
    pub access_key: String,
    /// GC online password
    #[serde(default)]
    pub gc_password: String,
    /// BB account username
    #[serde(default)]
    pub bb_username: String,
    /// BB account password
    #[serde(default)]
    pub bb_password: String,
}

/// Default session toggles
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SessionConfig {
    /// Capture observed files to disk
    #[serde(default)]
    pub save_files: bool,
    /// Normalise chat color tags
    #[serde(default)]
    pub chat_filter: bool,
    /// Replay switch activations
    #[serde(default)]
    pub switch_assist: bool,
}

impl From<SessionConfig> for SessionOptions {
    fn from(cfg: SessionConfig) -> Self {
        Self {
            save_files: cfg.save_files,
            enable_chat_filter: cfg.chat_filter,
            switch_assist: cfg.switch_assist,
            ..Default::default()
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log filter, `tracing_subscriber::EnvFilter` syntax
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level() }
    }
}

impl Config {
    /// Load a config file
    ///
    /// # Errors
    ///
    /// Fails on unreadable files or invalid TOML.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }

    /// Reject configurations that cannot work
    ///
    /// # Errors
    ///
    /// Fails when no listener is configured or a BB listener exists without
    /// master keys.
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(!self.listeners.is_empty(), "no listeners configured");
        let has_bb = self.listeners.iter().any(|l| l.dialect == DialectName::Bb);
        anyhow::ensure!(
            !has_bb || !self.bb_key_files.is_empty(),
            "a bb listener requires at least one bb key file"
        );
        Ok(())
    }
}

fn default_name() -> String {
    "revenant".to_string()
}

fn default_capture_dir() -> PathBuf {
    PathBuf::from("./captures")
}

fn default_console_login() -> u16 {
    9100
}

fn default_pc_login() -> u16 {
    9300
}

fn default_bb_patch() -> u16 {
    11000
}

fn default_bb_login() -> u16 {
    12000
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_parses() {
        let raw = r#"
            name = "myproxy"

            [[listeners]]
            listen = "0.0.0.0:9110"
            dialect = "gc"
            destination = "203.0.113.5:9100"

            [[licenses]]
            serial_number = 305419896
            access_key = "AAAAAAAA"

            [session]
            save_files = true
        "#;
        let config: Config = toml::from_str(raw).unwrap();
        config.validate().unwrap();
        assert_eq!(config.name, "myproxy");
        assert_eq!(config.listeners.len(), 1);
        assert_eq!(Dialect::from(config.listeners[0].dialect), Dialect::Gc);
        assert!(config.session.save_files);
    }

    #[test]
    fn bb_listener_requires_keys() {
        let raw = r#"
            [[listeners]]
            listen = "0.0.0.0:12000"
            dialect = "bb"
            destination = "203.0.113.5:12000"
        "#;
        let config: Config = toml::from_str(raw).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_config_is_rejected() {
        let config = Config::default();
        assert!(config.validate().is_err());
    }
}
