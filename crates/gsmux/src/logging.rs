use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use clap::ValueEnum;

use crate::exit::{io_error, CliResult};

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_filter(self) -> tracing::level_filters::LevelFilter {
        match self {
            LogLevel::Error => tracing::level_filters::LevelFilter::ERROR,
            LogLevel::Warn => tracing::level_filters::LevelFilter::WARN,
            LogLevel::Info => tracing::level_filters::LevelFilter::INFO,
            LogLevel::Debug => tracing::level_filters::LevelFilter::DEBUG,
            LogLevel::Trace => tracing::level_filters::LevelFilter::TRACE,
        }
    }

    /// Map a syslog priority (0 emerg .. 7 debug) to a level.
    pub fn from_verbosity(verbosity: u8) -> Self {
        match verbosity {
            0..=3 => LogLevel::Error,
            4 => LogLevel::Warn,
            5 | 6 => LogLevel::Info,
            _ => LogLevel::Debug,
        }
    }
}

pub fn init_logging(format: LogFormat, level: LogLevel, file: Option<&Path>) -> CliResult<()> {
    let builder = tracing_subscriber::fmt()
        .with_max_level(level.as_filter())
        .with_ansi(false)
        .with_target(false);

    let Some(path) = file else {
        let builder = builder.with_writer(std::io::stderr);
        match format {
            LogFormat::Text => {
                let _ = builder.try_init();
            }
            LogFormat::Json => {
                let _ = builder.json().try_init();
            }
        }
        return Ok(());
    };

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|err| io_error(&format!("cannot open log file {}", path.display()), err))?;
    let builder = builder.with_writer(Mutex::new(file));
    match format {
        LogFormat::Text => {
            let _ = builder.try_init();
        }
        LogFormat::Json => {
            let _ = builder.json().try_init();
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_mapping() {
        assert_eq!(LogLevel::from_verbosity(0), LogLevel::Error);
        assert_eq!(LogLevel::from_verbosity(3), LogLevel::Error);
        assert_eq!(LogLevel::from_verbosity(4), LogLevel::Warn);
        assert_eq!(LogLevel::from_verbosity(6), LogLevel::Info);
        assert_eq!(LogLevel::from_verbosity(7), LogLevel::Debug);
    }
}
