use std::{env, io::Write, process::ExitCode, sync::LazyLock};

use {
    anyhow::Context,
    jiff::{Timestamp, Zoned, tz::TimeZone},
};

mod args;
mod calendar;
mod cmd;
mod day;
mod feed;
mod grid;
mod ical;
mod logger;
mod occurrence;
mod render;
mod style;
mod weekdate;

/// The local time zone. All dates are laid out in this zone.
static TZ: LazyLock<TimeZone> = LazyLock::new(|| TimeZone::system());

static NOW: LazyLock<Zoned> = LazyLock::new(|| {
    let ts = match read_env_fortnight_now() {
        Ok(Some(ts)) => {
            log::trace!(
                "setting current time to `{ts}` from `FORTNIGHT_NOW` \
                 environment variable",
            );
            ts
        }
        Ok(None) => {
            let now = Timestamp::now();
            log::trace!(
                "`FORTNIGHT_NOW` environment variable not set, using \
                 current time `{now}`",
            );
            now
        }
        Err(err) => {
            let now = Timestamp::now();
            log::warn!(
                "reading `FORTNIGHT_NOW` failed, using current time \
                 `{now}`: {err:#}",
            );
            now
        }
    };
    ts.to_zoned(TZ.clone())
});

/// Two weeks at a glance.
fn main() -> ExitCode {
    let err = match run() {
        Ok(code) => return code,
        Err(err) => err,
    };
    if let Some(help) = err.root_cause().downcast_ref::<args::Help>() {
        let _ = writeln!(&mut std::io::stdout(), "{help}");
        return ExitCode::SUCCESS;
    }
    if let Some(version) = err.root_cause().downcast_ref::<args::Version>() {
        let _ = writeln!(&mut std::io::stdout(), "{version}");
        return ExitCode::SUCCESS;
    }
    // A broken pipe is how a reader like `head` tells us it has seen
    // enough, so it isn't an error. The Rust runtime ignores SIGPIPE, which
    // turns it into an I/O error instead.
    for cause in err.chain() {
        if let Some(err) = cause.downcast_ref::<std::io::Error>() {
            if err.kind() == std::io::ErrorKind::BrokenPipe {
                return ExitCode::from(0);
            }
        }
        // `serde_json` wraps I/O errors in its own type.
        if let Some(err) = cause.downcast_ref::<serde_json::Error>() {
            if err.io_error_kind() == Some(std::io::ErrorKind::BrokenPipe) {
                return ExitCode::from(0);
            }
        }
    }
    if env::var("RUST_BACKTRACE").map_or(false, |v| v == "1")
        && env::var("RUST_LIB_BACKTRACE").map_or(true, |v| v == "1")
    {
        let _ = writeln!(&mut std::io::stderr(), "{:?}", err);
    } else {
        let _ = writeln!(&mut std::io::stderr(), "{:#}", err);
    }
    ExitCode::from(1)
}

fn run() -> anyhow::Result<ExitCode> {
    let level = env::var("FORTNIGHT_LOG").unwrap_or_else(|_| String::new());
    let level = match &*level {
        "" | "off" => log::LevelFilter::Off,
        "error" => log::LevelFilter::Error,
        "warn" => log::LevelFilter::Warn,
        "info" => log::LevelFilter::Info,
        "debug" => log::LevelFilter::Debug,
        "trace" => log::LevelFilter::Trace,
        unk => anyhow::bail!("unrecognized log level '{}'", unk),
    };
    log::set_max_level(level);
    // The logger starts out in UTC so that finding the system time zone
    // can itself be logged. After that, timestamps are local.
    let logger = logger::Logger::init()?;
    logger.set_time_zone(TZ.clone());
    cmd::run(&mut lexopt::Parser::from_env())?;
    Ok(ExitCode::SUCCESS)
}

fn read_env_fortnight_now() -> anyhow::Result<Option<Timestamp>> {
    let Some(val) = env::var_os("FORTNIGHT_NOW") else { return Ok(None) };
    let Some(val) = val.to_str() else {
        anyhow::bail!(
            "`FORTNIGHT_NOW` environment variable is not valid UTF-8: {val:?}"
        )
    };
    val.parse::<Timestamp>()
        .context(
            "`FORTNIGHT_NOW` environment variable is not a valid \
             RFC 3339 timestamp",
        )
        .map(Some)
}
