use super::types::*;
use crate::error_handling::types::ConfigError;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Application configuration structure that defines all runtime parameters.
///
/// This structure holds the complete configuration for the gateway: the list of
/// server accounts it can hop between, logging, the HTTP command endpoint,
/// audio recording, transmit behaviour, the optional peripherals (backlight,
/// heartbeat LED, GPS, email) and the timing knobs of the control loop. It is
/// deserialized from a TOML file with `serde`.
///
/// # Examples
///
/// ```no_run
/// use std::path::Path;
/// use voxgate::configuration::Config;
///
/// let config = Config::from_file(Path::new("voxgate.toml")).unwrap();
/// println!("First server: {}", config.accounts[0].server);
/// ```
///
/// # Fields Overview
///
/// - `account_index`: the account used at startup
/// - `accounts`: ordered list of servers, walked with next/previous server commands
/// - `logging`: level, output target (screen, file or both) and line numbers
/// - `api`: HTTP command endpoint and per-command switches
/// - `audio_record`: recorder binary, devices, directories, chunking and timeouts
/// - `transmit`, `sounds`, `announcements`: what happens around a transmission
/// - `panic`, `beacon`, `heartbeat`, `display`, `gps`, `email`: optional features
/// - `terminal`: whether keypress commands are read from stdin
/// - `timings`: delays used by navigation, recording and shutdown
/// - `simulation`: channel layout of the built-in voice backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub account_index: usize,
    pub accounts: Vec<AccountConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub audio_record: AudioRecordConfig,
    #[serde(default)]
    pub transmit: TransmitConfig,
    #[serde(default)]
    pub sounds: SoundsConfig,
    #[serde(default)]
    pub announcements: AnnouncementsConfig,
    #[serde(default)]
    pub panic: PanicConfig,
    #[serde(default)]
    pub beacon: BeaconConfig,
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub gps: GpsConfig,
    #[serde(default)]
    pub email: EmailConfig,
    #[serde(default)]
    pub terminal: TerminalConfig,
    #[serde(default)]
    pub timings: TimingsConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

impl Config {
    /// Reads and validates the configuration stored at `path`.
    ///
    /// # Errors
    /// Returns [`ConfigError::IoError`] when the file cannot be read, a
    /// [`ConfigError::TomlError`] when it is not valid TOML for this structure,
    /// and any error raised by [`Config::validate`].
    pub fn from_file(path: &Path) -> Result<Config, ConfigError> {
        debug!("Reading configuration from {}", path.display());
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        info!(
            "Loaded {} account(s) from {}",
            config.accounts.len(),
            path.display()
        );
        Ok(config)
    }

    /// Parses and validates a configuration held in memory.
    pub fn from_toml_str(content: &str) -> Result<Config, ConfigError> {
        let config: Config =
            toml::from_str(content).map_err(|e| ConfigError::TomlError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the cross-field rules serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.accounts.is_empty() {
            return Err(ConfigError::AccountsEmpty(
                "at least one [[accounts]] entry is required".to_string(),
            ));
        }

        if self.account_index >= self.accounts.len() {
            return Err(ConfigError::NotInRange(format!(
                "account_index {} but only {} account(s) configured",
                self.account_index,
                self.accounts.len()
            )));
        }

        for account in &self.accounts {
            if account.server.trim().is_empty() {
                return Err(ConfigError::AccountsEmpty(format!(
                    "account '{}' has no server address",
                    account.name
                )));
            }
        }

        if crate::logging::parse_level(&self.logging.level).is_none() {
            return Err(ConfigError::UnknownValue(format!(
                "log level '{}'",
                self.logging.level
            )));
        }

        if self.api.enabled && self.api.listen_port < 1024 {
            return Err(ConfigError::BadPortsRange(format!(
                "api listen_port {} is below 1024",
                self.api.listen_port
            )));
        }

        if self.api.enabled
            && self.api.serve_recordings
            && self.api.listen_port == self.audio_record.file_server_port
        {
            return Err(ConfigError::BadPortsRange(format!(
                "api and recordings file server both use port {}",
                self.api.listen_port
            )));
        }

        for volume in [
            self.sounds.chimes_volume,
            self.transmit.repeater_tone_volume,
            self.panic.volume,
            self.beacon.volume,
            self.announcements.volume,
        ] {
            if volume > 100 {
                return Err(ConfigError::NotInRange(format!(
                    "volume {} is above 100",
                    volume
                )));
            }
        }

        if self.audio_record.chunk_size == 0 {
            return Err(ConfigError::NotInRange(
                "audio_record.chunk_size must be at least 1 second".to_string(),
            ));
        }

        if self.beacon.enabled && self.beacon.interval_secs == 0 {
            return Err(ConfigError::NotInRange(
                "beacon.interval_secs must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Copy of the configuration with every password masked, used when the
    /// configuration is printed on request.
    pub fn redacted(&self) -> Config {
        let mut copy = self.clone();
        for account in copy.accounts.iter_mut() {
            if !account.password.is_empty() {
                account.password = "********".to_string();
            }
        }
        copy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = r#"
account_index = 1

[[accounts]]
name = "home"
server = "voice.example.org:64738"
username = "gate-1"
password = "secret"
channel = "Ops"

[[accounts]]
name = "backup"
server = "backup.example.org:64738"

[logging]
level = "debug"
output = "screenandfile"
line_numbers = true

[api]
enabled = true
listen_port = 8080
scan_channels = false

[audio_record]
enabled = true
mode = "combo"
timeout_secs = 60
"#;

    #[test]
    fn parses_sample_configuration() {
        let config = Config::from_toml_str(SAMPLE).unwrap_or_else(|e| panic!("{}", e));

        assert_eq!(config.account_index, 1);
        assert_eq!(config.accounts.len(), 2);
        assert_eq!(config.accounts[0].channel, "Ops");
        assert!(config.accounts[1].username.is_empty());
        assert!(config.accounts[1].insecure);
        assert_eq!(config.logging.output, LogOutput::ScreenAndFile);
        assert!(config.logging.line_numbers);
        assert!(config.api.enabled);
        assert!(!config.api.scan_channels);
        assert!(config.api.channel_up);
        assert_eq!(config.audio_record.mode, RecordMode::Combo);
        assert_eq!(config.audio_record.timeout_secs, 60);
        assert_eq!(config.audio_record.chunk_size, 300);
        assert_eq!(config.timings.move_settle_ms, 500);
    }

    #[test]
    fn from_file_reads_disk() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.accounts[1].name, "backup");
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = Config::from_file(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::IoError(_)));
    }

    #[test]
    fn rejects_empty_accounts() {
        let err = Config::from_toml_str("accounts = []").unwrap_err();
        assert!(matches!(err, ConfigError::AccountsEmpty(_)));
    }

    #[test]
    fn rejects_account_index_out_of_range() {
        let content = r#"
account_index = 3
[[accounts]]
name = "only"
server = "a:1"
"#;
        let err = Config::from_toml_str(content).unwrap_err();
        assert!(matches!(err, ConfigError::NotInRange(_)));
    }

    #[test]
    fn rejects_unknown_log_level() {
        let content = r#"
[[accounts]]
name = "only"
server = "a:1"
[logging]
level = "chatty"
"#;
        let err = Config::from_toml_str(content).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownValue(_)));
    }

    #[test]
    fn rejects_invalid_toml() {
        let err = Config::from_toml_str("accounts = [[").unwrap_err();
        assert!(matches!(err, ConfigError::TomlError(_)));
    }

    #[test]
    fn redacted_masks_passwords() {
        let config = Config::from_toml_str(SAMPLE).unwrap();
        let redacted = config.redacted();
        assert_eq!(redacted.accounts[0].password, "********");
        assert!(redacted.accounts[1].password.is_empty());
        assert_eq!(config.accounts[0].password, "secret");
    }

    #[test]
    fn shipped_sample_is_valid() {
        let config = Config::from_toml_str(include_str!("../../voxgate.toml")).unwrap();
        assert_eq!(config.accounts.len(), 2);
        assert_eq!(config.accounts[0].channel, "Ops");
        assert_eq!(config.gps.fixed_position, Some((51.5072, -0.1276)));
        assert_eq!(config.simulation.channels.len(), 4);
        assert_eq!(config.simulation.denied_channels, vec![3]);
    }
}
