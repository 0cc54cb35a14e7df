use std::fmt;
use std::path::PathBuf;

#[derive(Debug)]
pub enum ConfigError {
    IoError(std::io::Error),
    TomlError(String),
    AccountsEmpty(String),
    BadPortsRange(String),
    NotInRange(String),
    UnknownValue(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {}", e),
            ConfigError::TomlError(e) => write!(f, "TOML parsing error: {}", e),
            ConfigError::AccountsEmpty(e) => write!(f, "Accounts configuration error: {}", e),
            ConfigError::BadPortsRange(e) => write!(f, "Port range error: {}", e),
            ConfigError::NotInRange(e) => write!(f, "Value out of range: {}", e),
            ConfigError::UnknownValue(e) => write!(f, "Unknown value: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::IoError(err)
    }
}

#[derive(Debug)]
pub enum LoggingError {
    FileOpen(PathBuf, std::io::Error),
    AlreadyInitialized,
}

impl fmt::Display for LoggingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoggingError::FileOpen(path, e) => {
                write!(f, "Unable to open log file {}: {}", path.display(), e)
            }
            LoggingError::AlreadyInitialized => write!(f, "Logger already initialized"),
        }
    }
}

impl std::error::Error for LoggingError {}

/// Errors reported by a voice-session backend.
#[derive(Debug, Clone, PartialEq)]
pub enum VoiceError {
    NotConnected,
    DialFailed(String),
    ChannelNotFound(u32),
    Transport(String),
    /// The outgoing audio stream itself could not be opened.
    StreamUnavailable(String),
    /// One file could not be played into the stream.
    Playback(String),
}

impl fmt::Display for VoiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VoiceError::NotConnected => write!(f, "Voice session not connected"),
            VoiceError::DialFailed(e) => write!(f, "Dial failed: {}", e),
            VoiceError::ChannelNotFound(id) => write!(f, "Channel {} not found", id),
            VoiceError::Transport(e) => write!(f, "Voice transport error: {}", e),
            VoiceError::StreamUnavailable(e) => write!(f, "Audio stream unavailable: {}", e),
            VoiceError::Playback(e) => write!(f, "Playback failed: {}", e),
        }
    }
}

impl std::error::Error for VoiceError {}

#[derive(Debug)]
pub enum ConnectionError {
    DialFailed { address: String, source: VoiceError },
    RetriesExhausted { attempts: u32 },
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionError::DialFailed { address, source } => {
                write!(f, "Connecting to {} failed: {}", address, source)
            }
            ConnectionError::RetriesExhausted { attempts } => {
                write!(f, "Unable to connect after {} attempts, giving up", attempts)
            }
        }
    }
}

impl std::error::Error for ConnectionError {}

#[derive(Debug)]
pub enum JobError {
    IoError(std::io::Error),
    SpawnFailed(String),
    ArchiveFailed(String),
    FileServerFailed(String),
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobError::IoError(e) => write!(f, "Job IO error: {}", e),
            JobError::SpawnFailed(e) => write!(f, "Recorder spawn failed: {}", e),
            JobError::ArchiveFailed(e) => write!(f, "Archive failed: {}", e),
            JobError::FileServerFailed(e) => write!(f, "File server failed: {}", e),
        }
    }
}

impl std::error::Error for JobError {}

impl From<std::io::Error> for JobError {
    fn from(err: std::io::Error) -> Self {
        JobError::IoError(err)
    }
}

impl From<zip::result::ZipError> for JobError {
    fn from(err: zip::result::ZipError) -> Self {
        JobError::ArchiveFailed(err.to_string())
    }
}

#[derive(Debug)]
pub enum PeripheralError {
    Unavailable(String),
    AudioFailed(String),
    NotifyFailed(String),
}

impl fmt::Display for PeripheralError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeripheralError::Unavailable(e) => write!(f, "Peripheral unavailable: {}", e),
            PeripheralError::AudioFailed(e) => write!(f, "Audio output error: {}", e),
            PeripheralError::NotifyFailed(e) => write!(f, "Notification error: {}", e),
        }
    }
}

impl std::error::Error for PeripheralError {}

#[derive(Debug)]
pub enum WebError {
    BindFailed(String),
    ControlChannelClosed,
}

impl fmt::Display for WebError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WebError::BindFailed(e) => write!(f, "HTTP bind failed: {}", e),
            WebError::ControlChannelClosed => write!(f, "Control loop is no longer running"),
        }
    }
}

impl std::error::Error for WebError {}

#[derive(Debug)]
pub enum ControllerError {
    ConfigurationError(ConfigError),
    ConnectionError(ConnectionError),
    JobError(JobError),
    WebError(WebError),
    StreamFailed(VoiceError),
    TerminalUnavailable(String),
    InitializationFailed(String),
}

impl fmt::Display for ControllerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerError::ConfigurationError(e) => write!(f, "Configuration error: {}", e),
            ControllerError::ConnectionError(e) => write!(f, "Connection error: {}", e),
            ControllerError::JobError(e) => write!(f, "Job error: {}", e),
            ControllerError::WebError(e) => write!(f, "Web error: {}", e),
            ControllerError::StreamFailed(e) => write!(f, "Unable to open audio stream: {}", e),
            ControllerError::TerminalUnavailable(e) => write!(f, "Terminal input unavailable: {}", e),
            ControllerError::InitializationFailed(e) => write!(f, "Initialization failed: {}", e),
        }
    }
}

impl std::error::Error for ControllerError {}

impl From<ConfigError> for ControllerError {
    fn from(err: ConfigError) -> Self {
        ControllerError::ConfigurationError(err)
    }
}

impl From<ConnectionError> for ControllerError {
    fn from(err: ConnectionError) -> Self {
        ControllerError::ConnectionError(err)
    }
}

impl From<JobError> for ControllerError {
    fn from(err: JobError) -> Self {
        ControllerError::JobError(err)
    }
}

impl From<WebError> for ControllerError {
    fn from(err: WebError) -> Self {
        ControllerError::WebError(err)
    }
}
