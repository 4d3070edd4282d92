//! Configuration module
//!
//! Handles loading and saving gridwire configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::protocol::{ZeroCoding, DEFAULT_PORT, HEADER_SIZE, MAX_ACKS, MAX_PACKET_SIZE};

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings
    #[serde(default)]
    pub general: GeneralConfig,

    /// Packet codec settings
    #[serde(default)]
    pub codec: CodecConfig,

    /// Network settings
    #[serde(default)]
    pub network: NetworkConfig,
}

/// General configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Human-readable name for this host
    #[serde(default = "default_name")]
    pub name: String,
    /// Enable verbose logging
    #[serde(default)]
    pub verbose: bool,
}

fn default_name() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string())
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            verbose: false,
        }
    }
}

/// Codec configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodecConfig {
    /// Physical capacity of outbound packets
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    /// Most acks piggy-backed on one packet
    #[serde(default = "default_max_acks")]
    pub max_acks_per_packet: usize,
    /// "auto" follows each message type's policy
    #[serde(default)]
    pub zero_coding: ZeroCoding,
}

fn default_buffer_size() -> usize {
    MAX_PACKET_SIZE
}

fn default_max_acks() -> usize {
    MAX_ACKS
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            buffer_size: default_buffer_size(),
            max_acks_per_packet: default_max_acks(),
            zero_coding: ZeroCoding::Auto,
        }
    }
}

/// Network configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// Interface to bind to
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Largest datagram accepted
    #[serde(default = "default_buffer_size")]
    pub recv_buffer_size: usize,
    /// Answer pings automatically
    #[serde(default = "default_true")]
    pub reply_to_pings: bool,
    /// Most unsent acks kept per peer; the oldest are dropped past this
    #[serde(default = "default_max_pending_acks")]
    pub max_pending_acks: usize,
    /// Peers silent for longer than this are forgotten
    #[serde(default = "default_peer_idle_timeout")]
    pub peer_idle_timeout_secs: u64,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_true() -> bool {
    true
}

fn default_max_pending_acks() -> usize {
    1024
}

fn default_peer_idle_timeout() -> u64 {
    60
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind_address: default_bind_address(),
            recv_buffer_size: default_buffer_size(),
            reply_to_pings: default_true(),
            max_pending_acks: default_max_pending_acks(),
            peer_idle_timeout_secs: default_peer_idle_timeout(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;
        config.normalize();
        Ok(config)
    }

    /// Load configuration from the default location
    pub fn load_default() -> ConfigResult<Self> {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("gridwire/config.toml")),
            Some(PathBuf::from("./gridwire.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path in config_paths.iter().flatten() {
            if path.exists() {
                tracing::debug!("Loading config from {}", path.display());
                return Self::load(path);
            }
        }

        Ok(Self::default())
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let contents = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Clamp values the codec cannot honor
    fn normalize(&mut self) {
        if self.codec.buffer_size < HEADER_SIZE {
            tracing::warn!(
                "codec.buffer_size {} is below the header size, using {}",
                self.codec.buffer_size,
                HEADER_SIZE
            );
            self.codec.buffer_size = HEADER_SIZE;
        }
        let acks = self.codec.max_acks_per_packet.clamp(1, MAX_ACKS);
        if acks != self.codec.max_acks_per_packet {
            tracing::warn!(
                "codec.max_acks_per_packet {} outside 1..={}, using {}",
                self.codec.max_acks_per_packet,
                MAX_ACKS,
                acks
            );
            self.codec.max_acks_per_packet = acks;
        }
        if self.network.peer_idle_timeout_secs == 0 {
            tracing::warn!("network.peer_idle_timeout_secs must be at least 1");
            self.network.peer_idle_timeout_secs = 1;
        }
        if self.network.max_pending_acks == 0 {
            tracing::warn!("network.max_pending_acks must be at least 1");
            self.network.max_pending_acks = 1;
        }
    }
}

/// Generate a sample configuration file
pub fn generate_sample_config() -> ConfigResult<String> {
    let config = Config {
        general: GeneralConfig {
            name: "region-01".to_string(),
            verbose: false,
        },
        ..Default::default()
    };

    Ok(toml::to_string_pretty(&config)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.network.port, DEFAULT_PORT);
        assert_eq!(config.network.bind_address, "0.0.0.0");
        assert_eq!(config.codec.buffer_size, 4096);
        assert_eq!(config.codec.max_acks_per_packet, 255);
        assert_eq!(config.codec.zero_coding, ZeroCoding::Auto);
        assert!(config.network.reply_to_pings);
    }

    #[test]
    fn test_save_and_load() {
        let mut config = Config::default();
        config.network.port = 9000;
        config.codec.zero_coding = ZeroCoding::Never;
        let file = NamedTempFile::new().unwrap();

        config.save(file.path()).unwrap();

        let loaded = Config::load(file.path()).unwrap();
        assert_eq!(loaded.network.port, 9000);
        assert_eq!(loaded.codec.zero_coding, ZeroCoding::Never);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[codec]\nzero_coding = \"always\"\nbuffer_size = 2").unwrap();

        let loaded = Config::load(file.path()).unwrap();
        assert_eq!(loaded.codec.zero_coding, ZeroCoding::Always);
        assert_eq!(loaded.codec.buffer_size, HEADER_SIZE);
        assert_eq!(loaded.codec.max_acks_per_packet, MAX_ACKS);
        assert_eq!(loaded.network.port, DEFAULT_PORT);
    }

    #[test]
    fn test_zero_ack_limits_clamped() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[codec]\nmax_acks_per_packet = 0\n[network]\nmax_pending_acks = 0"
        )
        .unwrap();

        let loaded = Config::load(file.path()).unwrap();
        assert_eq!(loaded.codec.max_acks_per_packet, 1);
        assert_eq!(loaded.network.max_pending_acks, 1);
        assert_eq!(loaded.network.peer_idle_timeout_secs, 60);
    }

    #[test]
    fn test_oversized_ack_limit_clamped() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[codec]\nmax_acks_per_packet = 1000").unwrap();

        let loaded = Config::load(file.path()).unwrap();
        assert_eq!(loaded.codec.max_acks_per_packet, MAX_ACKS);
    }

    #[test]
    fn test_bad_zero_coding_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[codec]\nzero_coding = \"sometimes\"").unwrap();

        assert!(matches!(
            Config::load(file.path()),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        assert!(matches!(Config::load(&path), Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_sample_config() {
        let sample = generate_sample_config().unwrap();
        let parsed: Config = toml::from_str(&sample).unwrap();
        assert_eq!(parsed.general.name, "region-01");
        assert_eq!(parsed.codec.zero_coding, ZeroCoding::Auto);
    }
}
