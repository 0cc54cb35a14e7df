use serde::{Deserialize, Serialize};
use std::path::PathBuf;

fn default_true() -> bool {
    true
}

/// One voice server the gateway can join.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountConfig {
    pub name: String,
    pub server: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_true")]
    pub insecure: bool,
    #[serde(default)]
    pub certificate: Option<PathBuf>,
    /// Channel joined right after connecting. Empty means stay wherever the server puts us.
    #[serde(default)]
    pub channel: String,
    #[serde(default)]
    pub ident: String,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    Screen,
    File,
    ScreenAndFile,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub output: LogOutput,
    pub line_numbers: bool,
    pub file: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            output: LogOutput::Screen,
            line_numbers: false,
            file: PathBuf::from("voxgate.log"),
        }
    }
}

/// HTTP command endpoint. Every command has its own switch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub enabled: bool,
    pub listen_port: u16,
    pub display_menu: bool,
    pub channel_up: bool,
    pub channel_down: bool,
    pub mute: bool,
    pub current_volume_level: bool,
    pub digital_volume_up: bool,
    pub digital_volume_down: bool,
    pub list_server_channels: bool,
    pub start_transmitting: bool,
    pub stop_transmitting: bool,
    pub list_online_users: bool,
    pub play_chimes: bool,
    pub request_gps_position: bool,
    pub send_email: bool,
    pub previous_server: bool,
    pub next_server: bool,
    pub clear_screen: bool,
    pub ping_servers: bool,
    pub panic_simulation: bool,
    pub repeat_tx_loop: bool,
    pub scan_channels: bool,
    pub show_acknowledgements: bool,
    pub display_version: bool,
    pub print_config: bool,
    pub serve_recordings: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_port: 8080,
            display_menu: true,
            channel_up: true,
            channel_down: true,
            mute: true,
            current_volume_level: true,
            digital_volume_up: true,
            digital_volume_down: true,
            list_server_channels: true,
            start_transmitting: true,
            stop_transmitting: true,
            list_online_users: true,
            play_chimes: true,
            request_gps_position: true,
            send_email: true,
            previous_server: true,
            next_server: true,
            clear_screen: true,
            ping_servers: true,
            panic_simulation: true,
            repeat_tx_loop: true,
            scan_channels: true,
            show_acknowledgements: true,
            display_version: true,
            print_config: true,
            serve_recordings: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordMode {
    Traffic,
    Ambient,
    Combo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioRecordConfig {
    pub enabled: bool,
    pub on_start: bool,
    pub mode: RecordMode,
    /// Seconds before a traffic or combo recording is stopped. 0 keeps recording.
    pub timeout_secs: u64,
    /// Same as `timeout_secs` for ambient (microphone) recordings.
    pub mic_timeout_secs: u64,
    pub save_path: PathBuf,
    pub archive_path: PathBuf,
    pub recorder: PathBuf,
    pub system: String,
    pub from_output: String,
    pub from_input: String,
    pub file_format: String,
    /// Chunk length in seconds handed to the recorder's `trim` directive.
    pub chunk_size: u64,
    pub file_server_port: u16,
}

impl Default for AudioRecordConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            on_start: false,
            mode: RecordMode::Traffic,
            timeout_secs: 0,
            mic_timeout_secs: 0,
            save_path: PathBuf::from("/avrec"),
            archive_path: PathBuf::from("/avrec/archive"),
            recorder: PathBuf::from("/usr/bin/sox"),
            system: "alsa".to_string(),
            from_output: "default".to_string(),
            from_input: "default".to_string(),
            file_format: "mp3".to_string(),
            chunk_size: 300,
            file_server_port: 8085,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransmitConfig {
    /// Mute the local speaker while transmitting (half-duplex radios).
    pub simplex_with_mute: bool,
    pub repeater_tone_enabled: bool,
    pub repeater_tone_file: PathBuf,
    pub repeater_tone_volume: u8,
}

impl Default for TransmitConfig {
    fn default() -> Self {
        Self {
            simplex_with_mute: true,
            repeater_tone_enabled: false,
            repeater_tone_file: PathBuf::from("sounds/repeatertone.wav"),
            repeater_tone_volume: 80,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoundsConfig {
    pub event_sound_enabled: bool,
    pub event_sound_file: PathBuf,
    pub chimes_file: PathBuf,
    pub chimes_volume: u8,
}

impl Default for SoundsConfig {
    fn default() -> Self {
        Self {
            event_sound_enabled: true,
            event_sound_file: PathBuf::from("sounds/event.wav"),
            chimes_file: PathBuf::from("sounds/chimes.wav"),
            chimes_volume: 80,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnouncementsConfig {
    pub enabled: bool,
    pub participants: bool,
    pub volume: u8,
}

impl Default for AnnouncementsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            participants: true,
            volume: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PanicConfig {
    pub enabled: bool,
    pub message: String,
    pub recursive: bool,
    pub send_ident: bool,
    pub send_gps_location: bool,
    pub sound_file: PathBuf,
    pub volume: u8,
    pub tx_lock_enabled: bool,
    pub tx_lock_timeout_secs: u64,
}

impl Default for PanicConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            message: "Panic button pressed".to_string(),
            recursive: false,
            send_ident: true,
            send_gps_location: false,
            sound_file: PathBuf::from("sounds/alert.wav"),
            volume: 100,
            tx_lock_enabled: false,
            tx_lock_timeout_secs: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BeaconConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    pub file: PathBuf,
    pub volume: u8,
}

impl Default for BeaconConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: 300,
            file: PathBuf::from("sounds/beacon.wav"),
            volume: 80,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    pub enabled: bool,
    pub period_ms: u64,
    pub on_ms: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            period_ms: 1000,
            on_ms: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub backlight_timer_enabled: bool,
    pub backlight_timeout_secs: u64,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            backlight_timer_enabled: false,
            backlight_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct GpsConfig {
    pub enabled: bool,
    /// Fixed position reported by the built-in receiver, as (latitude, longitude).
    pub fixed_position: Option<(f64, f64)>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailConfig {
    pub enabled: bool,
    pub receiver: String,
    pub subject: String,
    pub message: String,
    pub gps_date_time: bool,
    pub gps_lat_long: bool,
    pub maps_url: bool,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            receiver: String::new(),
            subject: "voxgate alert".to_string(),
            message: "Alert from voxgate".to_string(),
            gps_date_time: true,
            gps_lat_long: true,
            maps_url: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalConfig {
    pub enabled: bool,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingsConfig {
    pub move_settle_ms: u64,
    pub scan_dwell_ms: u64,
    pub record_grace_ms: u64,
    pub liveness_interval_secs: u64,
    pub reconnect_delay_ms: u64,
    pub shutdown_grace_secs: u64,
}

impl Default for TimingsConfig {
    fn default() -> Self {
        Self {
            move_settle_ms: 500,
            scan_dwell_ms: 1000,
            record_grace_ms: 2000,
            liveness_interval_secs: 300,
            reconnect_delay_ms: 1000,
            shutdown_grace_secs: 5,
        }
    }
}

/// A channel served by the built-in simulated voice backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatedChannelConfig {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub parent: Option<u32>,
    #[serde(default)]
    pub users: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub channels: Vec<SimulatedChannelConfig>,
    pub denied_channels: Vec<u32>,
    pub unreachable_servers: Vec<String>,
    pub welcome_message: Option<String>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            channels: vec![SimulatedChannelConfig {
                id: 0,
                name: "Root".to_string(),
                parent: None,
                users: Vec::new(),
            }],
            denied_channels: Vec::new(),
            unreachable_servers: Vec::new(),
            welcome_message: None,
        }
    }
}
