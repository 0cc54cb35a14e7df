use serde::Serialize;
use std::fmt;

/// Every action the gateway can be asked to perform, whatever the input surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Command {
    DisplayMenu,
    ChannelUp,
    ChannelDown,
    MuteToggle,
    Mute,
    Unmute,
    CurrentVolume,
    VolumeUp,
    VolumeDown,
    ListChannels,
    StartTransmitting,
    StopTransmitting,
    ListUsers,
    ToggleChimes,
    RequestGps,
    SendEmail,
    PreviousServer,
    NextServer,
    ClearScreen,
    PingServers,
    PanicSimulation,
    RepeatTxLoop,
    Scan,
    Acknowledgements,
    Version,
    Uptime,
    PrintConfig,
    DumpState,
    RecordTraffic,
    RecordAmbient,
    RecordCombo,
    ServeRecordings,
    Quit,
}

/// Where a command came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Origin {
    Keyboard,
    Http,
    Internal,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Keyboard => write!(f, "keyboard"),
            Origin::Http => write!(f, "http"),
            Origin::Internal => write!(f, "internal"),
        }
    }
}

/// Key names accepted on the terminal, with what they do.
pub const KEY_BINDINGS: &[(&str, Command)] = &[
    ("del", Command::DisplayMenu),
    ("f1", Command::ChannelUp),
    ("f2", Command::ChannelDown),
    ("f3", Command::MuteToggle),
    ("f4", Command::CurrentVolume),
    ("f5", Command::VolumeUp),
    ("f6", Command::VolumeDown),
    ("f7", Command::ListChannels),
    ("f8", Command::StartTransmitting),
    ("f9", Command::StopTransmitting),
    ("f10", Command::ListUsers),
    ("f11", Command::ToggleChimes),
    ("f12", Command::RequestGps),
    ("ctrl-c", Command::Quit),
    ("ctrl-d", Command::DumpState),
    ("ctrl-e", Command::SendEmail),
    ("ctrl-f", Command::PreviousServer),
    ("ctrl-i", Command::RecordTraffic),
    ("ctrl-j", Command::RecordAmbient),
    ("ctrl-k", Command::RecordCombo),
    ("ctrl-l", Command::ClearScreen),
    ("ctrl-n", Command::NextServer),
    ("ctrl-o", Command::PingServers),
    ("ctrl-p", Command::PanicSimulation),
    ("ctrl-r", Command::RepeatTxLoop),
    ("ctrl-s", Command::Scan),
    ("ctrl-t", Command::Acknowledgements),
    ("ctrl-u", Command::Uptime),
    ("ctrl-v", Command::Version),
    ("ctrl-w", Command::ServeRecordings),
    ("ctrl-x", Command::PrintConfig),
];

impl Command {
    /// Parses a terminal key name such as `f1`, `F1`, `ctrl-s` or `^S`.
    pub fn from_key_name(name: &str) -> Option<Command> {
        let mut key = name.trim().to_ascii_lowercase();
        if let Some(rest) = key.strip_prefix('^') {
            key = format!("ctrl-{}", rest);
        } else if let Some(rest) = key.strip_prefix("ctrl+") {
            key = format!("ctrl-{}", rest);
        } else if key == "delete" {
            key = "del".to_string();
        }

        KEY_BINDINGS
            .iter()
            .find(|(binding, _)| *binding == key)
            .map(|(_, command)| *command)
    }

    /// One-line help shown by the menu.
    pub fn description(&self) -> &'static str {
        match self {
            Command::DisplayMenu => "Display this menu",
            Command::ChannelUp => "Channel up",
            Command::ChannelDown => "Channel down",
            Command::MuteToggle => "Mute/unmute speaker",
            Command::Mute => "Mute speaker",
            Command::Unmute => "Unmute speaker",
            Command::CurrentVolume => "Current volume level",
            Command::VolumeUp => "Digital volume up",
            Command::VolumeDown => "Digital volume down",
            Command::ListChannels => "List server channels",
            Command::StartTransmitting => "Start transmitting",
            Command::StopTransmitting => "Stop transmitting",
            Command::ListUsers => "List online users",
            Command::ToggleChimes => "Stream/stop chimes",
            Command::RequestGps => "Request GPS position",
            Command::SendEmail => "Send email",
            Command::PreviousServer => "Previous server",
            Command::NextServer => "Next server",
            Command::ClearScreen => "Clear screen",
            Command::PingServers => "Ping servers",
            Command::PanicSimulation => "Panic simulation",
            Command::RepeatTxLoop => "Repeat TX loop test",
            Command::Scan => "Scan channels",
            Command::Acknowledgements => "Acknowledgements",
            Command::Version => "Version",
            Command::Uptime => "Uptime",
            Command::PrintConfig => "Print configuration",
            Command::DumpState => "Dump state",
            Command::RecordTraffic => "Record traffic",
            Command::RecordAmbient => "Record ambient (mic)",
            Command::RecordCombo => "Record traffic and mic",
            Command::ServeRecordings => "Serve recordings over HTTP",
            Command::Quit => "Quit",
        }
    }

    pub fn key_name(&self) -> Option<&'static str> {
        KEY_BINDINGS
            .iter()
            .find(|(_, command)| command == self)
            .map(|(binding, _)| *binding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_names_are_case_insensitive() {
        assert_eq!(Command::from_key_name("F1"), Some(Command::ChannelUp));
        assert_eq!(Command::from_key_name("^S"), Some(Command::Scan));
        assert_eq!(Command::from_key_name("ctrl+c"), Some(Command::Quit));
        assert_eq!(Command::from_key_name("Delete"), Some(Command::DisplayMenu));
        assert_eq!(Command::from_key_name("esc"), None);
    }

    #[test]
    fn every_binding_round_trips_its_name() {
        for (name, command) in KEY_BINDINGS {
            assert_eq!(command.key_name(), Some(*name));
        }
    }
}
