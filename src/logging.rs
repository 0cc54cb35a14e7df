//! Logger setup.
//!
//! Everything in the crate logs through the `log` facade; this module wires the
//! `env_logger` backend to the target chosen in `[logging]`: the screen, an
//! append-only file, or both at once.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};

use env_logger::{Builder, Target};
use log::LevelFilter;

use crate::configuration::types::{LogOutput, LoggingConfig};
use crate::error_handling::types::LoggingError;

/// Maps a configured level name to a filter. `warning` and `alert` are
/// accepted as aliases of `warn`.
pub fn parse_level(level: &str) -> Option<LevelFilter> {
    match level.trim().to_ascii_lowercase().as_str() {
        "off" => Some(LevelFilter::Off),
        "trace" => Some(LevelFilter::Trace),
        "debug" => Some(LevelFilter::Debug),
        "info" => Some(LevelFilter::Info),
        "warn" | "warning" | "alert" => Some(LevelFilter::Warn),
        "error" | "fatal" => Some(LevelFilter::Error),
        _ => None,
    }
}

/// Writes every log line to stdout and to the log file.
struct Tee {
    file: File,
}

impl Write for Tee {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stdout().write_all(buf)?;
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stdout().flush()?;
        self.file.flush()
    }
}

fn open_log_file(config: &LoggingConfig) -> Result<File, LoggingError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.file)
        .map_err(|e| LoggingError::FileOpen(config.file.clone(), e))
}

/// Builds the logger described by `config` without installing it.
pub fn builder(config: &LoggingConfig) -> Result<Builder, LoggingError> {
    let level = parse_level(&config.level).unwrap_or(LevelFilter::Info);

    let mut builder = Builder::from_default_env();
    builder.filter_level(level).format_target(false);

    if config.line_numbers {
        builder.format(|buf, record| {
            writeln!(
                buf,
                "[{} {:<5} {}:{}] {}",
                chrono::Local::now().format("%Y-%m-%dT%H:%M:%S"),
                record.level(),
                record.file().unwrap_or("?"),
                record.line().unwrap_or(0),
                record.args()
            )
        });
    }

    match config.output {
        LogOutput::Screen => {
            builder.target(Target::Stdout);
        }
        LogOutput::File => {
            let file = open_log_file(config)?;
            builder.target(Target::Pipe(Box::new(file)));
        }
        LogOutput::ScreenAndFile => {
            let file = open_log_file(config)?;
            builder.target(Target::Pipe(Box::new(Tee { file })));
        }
    }

    Ok(builder)
}

/// Installs the global logger. Failing to open the log file is fatal for the caller.
pub fn init(config: &LoggingConfig) -> Result<(), LoggingError> {
    builder(config)?
        .try_init()
        .map_err(|_| LoggingError::AlreadyInitialized)
}
