use log::{debug, warn};

use super::command::Command;
use crate::configuration::types::ApiConfig;

/// One command reachable over HTTP.
pub struct ApiEntry {
    pub token: &'static str,
    pub label: &'static str,
    pub command: Command,
    enabled: fn(&ApiConfig) -> bool,
}

const API_COMMANDS: &[ApiEntry] = &[
    ApiEntry { token: "DEL", label: "Display Menu", command: Command::DisplayMenu, enabled: |a| a.display_menu },
    ApiEntry { token: "F1", label: "Channel Up", command: Command::ChannelUp, enabled: |a| a.channel_up },
    ApiEntry { token: "F2", label: "Channel Down", command: Command::ChannelDown, enabled: |a| a.channel_down },
    ApiEntry { token: "F3", label: "Mute/Unmute Speaker", command: Command::MuteToggle, enabled: |a| a.mute },
    ApiEntry { token: "F3-mute", label: "Mute Speaker", command: Command::Mute, enabled: |a| a.mute },
    ApiEntry { token: "F3-unmute", label: "Unmute Speaker", command: Command::Unmute, enabled: |a| a.mute },
    ApiEntry { token: "F4", label: "Current Volume Level", command: Command::CurrentVolume, enabled: |a| a.current_volume_level },
    ApiEntry { token: "F5", label: "Digital Volume Up", command: Command::VolumeUp, enabled: |a| a.digital_volume_up },
    ApiEntry { token: "F6", label: "Digital Volume Down", command: Command::VolumeDown, enabled: |a| a.digital_volume_down },
    ApiEntry { token: "F7", label: "List Server Channels", command: Command::ListChannels, enabled: |a| a.list_server_channels },
    ApiEntry { token: "F8", label: "Start Transmitting", command: Command::StartTransmitting, enabled: |a| a.start_transmitting },
    ApiEntry { token: "F9", label: "Stop Transmitting", command: Command::StopTransmitting, enabled: |a| a.stop_transmitting },
    ApiEntry { token: "F10", label: "List Online Users", command: Command::ListUsers, enabled: |a| a.list_online_users },
    ApiEntry { token: "F11", label: "Play/Stop Chimes", command: Command::ToggleChimes, enabled: |a| a.play_chimes },
    ApiEntry { token: "F12", label: "Request GPS Position", command: Command::RequestGps, enabled: |a| a.request_gps_position },
    ApiEntry { token: "commandKeyCtrlE", label: "Send Email", command: Command::SendEmail, enabled: |a| a.send_email },
    ApiEntry { token: "commandKeyCtrlF", label: "Previous Server", command: Command::PreviousServer, enabled: |a| a.previous_server },
    ApiEntry { token: "commandKeyCtrlN", label: "Next Server", command: Command::NextServer, enabled: |a| a.next_server },
    ApiEntry { token: "commandKeyCtrlL", label: "Clear Screen", command: Command::ClearScreen, enabled: |a| a.clear_screen },
    ApiEntry { token: "commandKeyCtrlO", label: "Ping Servers", command: Command::PingServers, enabled: |a| a.ping_servers },
    ApiEntry { token: "commandKeyCtrlP", label: "Panic Simulation", command: Command::PanicSimulation, enabled: |a| a.panic_simulation },
    ApiEntry { token: "commandKeyCtrlR", label: "Repeat Tx Loop Test", command: Command::RepeatTxLoop, enabled: |a| a.repeat_tx_loop },
    ApiEntry { token: "commandKeyCtrlS", label: "Scan", command: Command::Scan, enabled: |a| a.scan_channels },
    ApiEntry { token: "commandKeyCtrlT", label: "Show Acknowledgements", command: Command::Acknowledgements, enabled: |a| a.show_acknowledgements },
    ApiEntry { token: "commandKeyCtrlV", label: "Display Version", command: Command::Version, enabled: |a| a.display_version },
    ApiEntry { token: "commandKeyCtrlW", label: "Serve Recordings", command: Command::ServeRecordings, enabled: |a| a.serve_recordings },
    ApiEntry { token: "commandKeyCtrlX", label: "Print Config", command: Command::PrintConfig, enabled: |a| a.print_config },
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Accepted { command: Command, label: &'static str },
    Denied { label: &'static str },
    Unknown,
}

impl Resolution {
    /// Text returned to the HTTP caller.
    pub fn message(&self) -> String {
        match self {
            Resolution::Accepted { label, .. } => {
                format!("API {} Request Processed Successfully", label)
            }
            Resolution::Denied { label } => format!("API {} Request Denied", label),
            Resolution::Unknown => "API Command Not Defined".to_string(),
        }
    }
}

/// Maps input tokens to commands and applies the per-command API switches.
#[derive(Debug, Clone)]
pub struct CommandRegistry {
    api: ApiConfig,
}

impl CommandRegistry {
    pub fn new(api: ApiConfig) -> Self {
        Self { api }
    }

    pub fn resolve_http(&self, token: &str) -> Resolution {
        match API_COMMANDS.iter().find(|entry| entry.token == token) {
            Some(entry) if (entry.enabled)(&self.api) => {
                debug!("http command {} -> {:?}", token, entry.command);
                Resolution::Accepted {
                    command: entry.command,
                    label: entry.label,
                }
            }
            Some(entry) => {
                warn!("http command {} is disabled in [api]", token);
                Resolution::Denied { label: entry.label }
            }
            None => {
                warn!("http command {} is not defined", token);
                Resolution::Unknown
            }
        }
    }

    /// Terminal keys are always available.
    pub fn resolve_key(&self, name: &str) -> Option<Command> {
        Command::from_key_name(name)
    }

    /// HTTP tokens the `[api]` switches currently allow, in menu order.
    pub fn enabled_http_tokens(&self) -> Vec<&'static str> {
        API_COMMANDS
            .iter()
            .filter(|entry| (entry.enabled)(&self.api))
            .map(|entry| entry.token)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enabled_token_is_accepted() {
        let registry = CommandRegistry::new(ApiConfig::default());
        let resolution = registry.resolve_http("F1");

        assert_eq!(
            resolution,
            Resolution::Accepted {
                command: Command::ChannelUp,
                label: "Channel Up"
            }
        );
        assert_eq!(
            resolution.message(),
            "API Channel Up Request Processed Successfully"
        );
    }

    #[test]
    fn disabled_token_is_denied() {
        let api = ApiConfig {
            scan_channels: false,
            ..ApiConfig::default()
        };
        let registry = CommandRegistry::new(api);

        assert_eq!(
            registry.resolve_http("commandKeyCtrlS").message(),
            "API Scan Request Denied"
        );
        assert_eq!(
            registry.resolve_http("commandKeyCtrlW"),
            Resolution::Denied {
                label: "Serve Recordings"
            }
        );
    }

    #[test]
    fn each_server_command_has_its_own_switch() {
        let api = ApiConfig {
            next_server: false,
            send_email: false,
            ..ApiConfig::default()
        };
        let registry = CommandRegistry::new(api);

        assert!(matches!(
            registry.resolve_http("commandKeyCtrlF"),
            Resolution::Accepted { .. }
        ));
        assert!(matches!(
            registry.resolve_http("commandKeyCtrlO"),
            Resolution::Accepted { .. }
        ));
        assert!(matches!(
            registry.resolve_http("commandKeyCtrlN"),
            Resolution::Denied { .. }
        ));
    }

    #[test]
    fn unknown_token() {
        let registry = CommandRegistry::new(ApiConfig::default());
        assert_eq!(registry.resolve_http("F13"), Resolution::Unknown);
        assert_eq!(registry.resolve_http("f1"), Resolution::Unknown);
        assert_eq!(Resolution::Unknown.message(), "API Command Not Defined");
    }

    #[test]
    fn every_documented_token_is_registered() {
        let tokens: Vec<&str> = API_COMMANDS.iter().map(|entry| entry.token).collect();
        for token in [
            "DEL", "F1", "F2", "F3", "F3-mute", "F3-unmute", "F4", "F5", "F6", "F7", "F8", "F9",
            "F10", "F11", "F12", "commandKeyCtrlE", "commandKeyCtrlF", "commandKeyCtrlN",
            "commandKeyCtrlL", "commandKeyCtrlO", "commandKeyCtrlP", "commandKeyCtrlR",
            "commandKeyCtrlS", "commandKeyCtrlT", "commandKeyCtrlV", "commandKeyCtrlX",
        ] {
            assert!(tokens.contains(&token), "missing {}", token);
        }
    }

    #[test]
    fn enabled_tokens_follow_the_switches() {
        let api = ApiConfig {
            channel_up: false,
            ..ApiConfig::default()
        };
        let tokens = CommandRegistry::new(api).enabled_http_tokens();
        assert!(!tokens.contains(&"F1"));
        assert!(tokens.contains(&"F2"));
        assert!(!tokens.contains(&"commandKeyCtrlW"));
    }
}
