// A tiny logger for the `log` crate that writes one line per record to
// stderr. Filtering is left entirely to `log::set_max_level`.

use std::{
    borrow::Cow,
    path::{Path, PathBuf},
    sync::{LazyLock, Mutex},
};

use {jiff::tz::TimeZone, log::Log};

use crate::style::Theme;

/// Logs to stderr as `<timestamp>|<LEVEL>|<file>:<line>: <message>`.
///
/// Timestamps are in UTC until a time zone is set with
/// `Logger::set_time_zone`.
#[derive(Debug)]
pub struct Logger {
    tz: Mutex<Option<TimeZone>>,
}

impl Logger {
    /// Create a new logger and install it as the global logger.
    pub fn init() -> Result<&'static Logger, log::SetLoggerError> {
        let logger = Box::leak(Box::new(Logger { tz: Mutex::new(None) }));
        log::set_logger(logger)?;
        Ok(logger)
    }

    pub fn set_time_zone(&self, tz: TimeZone) {
        // A poisoned lock only means another thread panicked while logging.
        let mut guard = self.tz.lock().unwrap_or_else(|e| e.into_inner());
        *guard = Some(tz);
    }

    /// Returns the current time as it should appear in a log line.
    ///
    /// `Zoned::now()` isn't used since finding the system time zone may
    /// itself log, which would recurse back into here.
    fn now(&self) -> String {
        let ts = jiff::Timestamp::now();
        let guard = self.tz.lock().unwrap_or_else(|e| e.into_inner());
        match *guard {
            None => ts.strftime("%Y-%m-%dT%H:%M:%S%.3fZ").to_string(),
            Some(ref tz) => ts
                .to_zoned(tz.clone())
                .strftime("%Y-%m-%dT%H:%M:%S%.3f%:z")
                .to_string(),
        }
    }
}

impl Log for Logger {
    fn enabled(&self, _: &log::Metadata<'_>) -> bool {
        true
    }

    fn log(&self, record: &log::Record<'_>) {
        let location: Cow<'_, str> = match (record.file(), record.line()) {
            (Some(file), Some(line)) => {
                format!("|{}:{line}", relative(file)).into()
            }
            (Some(file), None) => format!("|{}", relative(file)).into(),
            _ => "".into(),
        };
        eprintln!(
            "{}|{}{location}: {}",
            Theme::stderr().highlight(self.now()),
            record.level(),
            record.args(),
        );
    }

    fn flush(&self) {}
}

/// Strips the current working directory from the start of `path`, if
/// possible.
fn relative(path: &str) -> &str {
    static CWD: LazyLock<Option<PathBuf>> =
        LazyLock::new(|| std::env::current_dir().ok());

    let Some(cwd) = CWD.as_deref() else { return path };
    Path::new(path)
        .strip_prefix(cwd)
        .ok()
        .and_then(|p| p.to_str())
        .unwrap_or(path)
}
