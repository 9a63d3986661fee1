//! Module containing logger implementation.

use log::{Level, LevelFilter, Log, Metadata, Record};
use std::{
    env,
    io::{self, Write as _},
};

/// Environment variable read by [`init_from_env`].
pub const LEVEL_ENV: &str = "PYEMBED_LOG";

/// A minimal standard error logger for the `log` facade crate.
///
/// The embedded interpreter writes to the same process-wide standard error,
/// so records are written unbuffered, one line each.
pub struct Logger;

impl Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let level = match record.level() {
            Level::Error => "ERROR",
            Level::Warn => "WARN",
            Level::Info => "INFO",
            Level::Debug => "DEBUG",
            Level::Trace => "TRACE",
        };
        let _ = writeln!(
            io::stderr().lock(),
            "{} [{}] {}",
            level,
            record.target(),
            record.args()
        );
    }

    fn flush(&self) {
        let _ = io::stderr().flush();
    }
}

/// Initialize logging at the specified level.
///
/// Only the first installed logger takes effect; later calls only adjust the
/// maximum level.
pub fn init(level: LevelFilter) {
    static LOGGER: Logger = Logger;
    let _ = log::set_logger(&LOGGER);
    log::set_max_level(level);
}

/// Initialize logging with the level named by the `PYEMBED_LOG` environment
/// variable, defaulting to warnings.
pub fn init_from_env() {
    init(level_from(env::var(LEVEL_ENV).ok().as_deref()));
}

fn level_from(value: Option<&str>) -> LevelFilter {
    value
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(LevelFilter::Warn)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_levels() {
        assert_eq!(level_from(Some("debug")), LevelFilter::Debug);
        assert_eq!(level_from(Some(" TRACE ")), LevelFilter::Trace);
        assert_eq!(level_from(Some("off")), LevelFilter::Off);
        assert_eq!(level_from(Some("loud")), LevelFilter::Warn);
        assert_eq!(level_from(None), LevelFilter::Warn);
    }

    #[test]
    fn init_twice_does_not_panic() {
        init(LevelFilter::Error);
        init(LevelFilter::Error);
        assert_eq!(log::max_level(), LevelFilter::Error);
    }
}
