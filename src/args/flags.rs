use std::{
    io::Write,
    path::{Path, PathBuf},
};

use {
    anyhow::Context,
    jiff::{ToSpan, civil::Date},
    lexopt::ValueExt,
};

use crate::{
    args::{Configurable, Usage},
    feed::Source,
    render::raster,
};

/// The date that determines which two weeks are shown.
///
/// This is either an ISO 8601 calendar date or one of a few words that are
/// relative to today.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ReferenceDate {
    #[default]
    Today,
    Tomorrow,
    Yesterday,
    Date(Date),
}

impl ReferenceDate {
    pub const USAGE: Usage = Usage::flag(
        "-d/--date <date>",
        "The date whose two weeks are shown (defaults to today).",
        r#"
The date whose two weeks are shown (defaults to today).

The grid always begins on the Monday of the week containing this date. This
date is also the one highlighted in the output.

The value may be a date like `2024-07-17`, or one of `today`, `tomorrow` or
`yesterday`. Relative dates are computed from the current time in your
configured time zone, which may be overridden with the `FORTNIGHT_NOW`
environment variable.
"#,
    );

    pub const ARG: Usage = Usage::arg(
        "<date>",
        "The date to show.",
        r#"
The date to show.

The value may be a date like `2024-07-17`, or one of `today`, `tomorrow` or
`yesterday`.
"#,
    );

    /// Returns the calendar date this refers to, given what today is.
    pub fn get(&self, today: Date) -> anyhow::Result<Date> {
        Ok(match *self {
            ReferenceDate::Today => today,
            ReferenceDate::Tomorrow => today.checked_add(1.day())?,
            ReferenceDate::Yesterday => today.checked_sub(1.day())?,
            ReferenceDate::Date(date) => date,
        })
    }
}

impl std::str::FromStr for ReferenceDate {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<ReferenceDate> {
        Ok(match &*s.to_lowercase() {
            "today" => ReferenceDate::Today,
            "tomorrow" => ReferenceDate::Tomorrow,
            "yesterday" => ReferenceDate::Yesterday,
            _ => {
                let date = s.parse::<Date>().with_context(|| {
                    format!(
                        "failed to parse `{s}` as a date, expected \
                         `YYYY-MM-DD`, `today`, `tomorrow` or `yesterday`",
                    )
                })?;
                ReferenceDate::Date(date)
            }
        })
    }
}

/// The output format of the `grid` and `day` commands.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Format {
    #[default]
    Text,
    Json,
}

impl Format {
    pub const USAGE: Usage = Usage::flag(
        "-f/--format <kind>",
        "Print the grid as `text` (default) or `json`.",
        r#"
Print the grid as `text` (default) or `json`.

The `text` format writes one block of lines per day. All-day events are shown
as bars like `[ Summary ]`, where `<` or `>` means the event continues on
another day. Timed events are shown with their local start time.

The `json` format writes the laid out grid as a single JSON object. Every
entry has a `kind` of either `all-day` or `timed`.
"#,
    );
}

impl std::str::FromStr for Format {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Format> {
        Ok(match &*s.to_lowercase() {
            "text" => Format::Text,
            "json" => Format::Json,
            unk => anyhow::bail!("unrecognized format `{unk}`"),
        })
    }
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match *self {
            Format::Text => write!(f, "text"),
            Format::Json => write!(f, "json"),
        }
    }
}

/// The dimensions of a rendered image, written as `WxH`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ImageSize {
    size: embedded_graphics::geometry::Size,
}

impl ImageSize {
    pub const USAGE: Usage = Usage::flag(
        "--size <WxH>",
        "The width and height of the image in pixels.",
        r#"
The width and height of the image in pixels, e.g., `800x600`.

The default is `1304x984`, which matches a common e-ink panel. Very small
sizes are rejected since the grid would not fit.
"#,
    );

    /// Return the parsed size.
    pub fn get(&self) -> embedded_graphics::geometry::Size {
        self.size
    }
}

impl Default for ImageSize {
    fn default() -> ImageSize {
        ImageSize { size: raster::DEFAULT_SIZE }
    }
}

impl std::str::FromStr for ImageSize {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<ImageSize> {
        let Some((width, height)) = s.split_once(['x', 'X']) else {
            anyhow::bail!("image size `{s}` must be written as `WxH`")
        };
        let width: u32 = width.trim().parse().with_context(|| {
            format!("failed to parse `{width}` as an image width")
        })?;
        let height: u32 = height.trim().parse().with_context(|| {
            format!("failed to parse `{height}` as an image height")
        })?;
        let size = embedded_graphics::geometry::Size::new(width, height);
        Ok(ImageSize { size })
    }
}

impl std::fmt::Display for ImageSize {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}x{}", self.size.width, self.size.height)
    }
}

/// A simple abstraction over "one output file path or stdout."
#[derive(Clone, Debug, Default)]
pub struct FileOrStdout {
    path: Option<PathBuf>,
}

impl FileOrStdout {
    pub const USAGE: Usage = Usage::flag(
        "-o/--output <path>",
        "Write to this file instead of stdout.",
        r#"
Write to this file instead of stdout.

The file is created if it doesn't exist and truncated if it does. When set to
`-`, stdout is used.
"#,
    );

    /// Return a `std::fmt::Display` impl for the underlying file or stdout.
    pub fn display(&self) -> impl std::fmt::Display + '_ {
        self.path.as_deref().unwrap_or_else(|| Path::new("<stdout>")).display()
    }

    /// Return a buffered writer for the underlying file or stdout.
    pub fn writer(&self) -> anyhow::Result<Box<dyn Write>> {
        Ok(if let Some(ref path) = self.path {
            let file = std::fs::File::create(path)
                .with_context(|| format!("{}", path.display()))?;
            Box::new(std::io::BufWriter::new(file))
        } else {
            Box::new(std::io::stdout().lock())
        })
    }
}

impl From<PathBuf> for FileOrStdout {
    fn from(path: PathBuf) -> FileOrStdout {
        if path == Path::new("-") {
            FileOrStdout { path: None }
        } else {
            FileOrStdout { path: Some(path) }
        }
    }
}

/// The CLI parsing configuration for calendar sources.
///
/// This greedily consumes all remaining positional arguments as sources.
/// When there are none, the `FORTNIGHT_CALENDARS` environment variable is
/// consulted instead.
#[derive(Clone, Debug, Default)]
pub struct Sources {
    sources: Vec<Source>,
}

impl Sources {
    pub const USAGE: Usage = Usage::arg(
        "<source>...",
        "One or more iCalendar files, URLs or `-` for stdin.",
        r#"
One or more iCalendar files, URLs or `-` for stdin.

URLs may use `http`, `https` or `webcal`. A `webcal` URL is fetched over
`https`.

When no sources are given, they are read from the `FORTNIGHT_CALENDARS`
environment variable, which should contain whitespace separated sources. If
that isn't set either, then an error is reported.
"#,
    );

    /// Returns the sources given, falling back to the environment.
    pub fn get(&self) -> anyhow::Result<Vec<Source>> {
        if !self.sources.is_empty() {
            return Ok(self.sources.clone());
        }
        let Some(val) = std::env::var_os("FORTNIGHT_CALENDARS") else {
            anyhow::bail!(
                "no calendar sources given, provide at least one \
                 <source> or set `FORTNIGHT_CALENDARS`",
            )
        };
        let Some(val) = val.to_str() else {
            anyhow::bail!(
                "`FORTNIGHT_CALENDARS` environment variable is not \
                 valid UTF-8: {val:?}"
            )
        };
        let sources = parse_source_list(val)
            .context("invalid `FORTNIGHT_CALENDARS` environment variable")?;
        log::debug!(
            "using {} source(s) from `FORTNIGHT_CALENDARS`",
            sources.len(),
        );
        Ok(sources)
    }
}

impl Configurable for Sources {
    fn configure(
        &mut self,
        _: &mut lexopt::Parser,
        arg: &mut lexopt::Arg,
    ) -> anyhow::Result<bool> {
        let lexopt::Arg::Value(ref mut v) = *arg else { return Ok(false) };
        let v = std::mem::take(v).string()?;
        self.sources.push(v.parse()?);
        Ok(true)
    }

    fn usage(&self) -> &[Usage] {
        &[Sources::USAGE]
    }
}

/// Parses a whitespace separated list of sources.
fn parse_source_list(list: &str) -> anyhow::Result<Vec<Source>> {
    let sources = list
        .split_whitespace()
        .map(|s| s.parse())
        .collect::<anyhow::Result<Vec<Source>>>()?;
    anyhow::ensure!(!sources.is_empty(), "no calendar sources found");
    Ok(sources)
}
