use std::io::Write;

use lexopt::ValueExt;

use crate::{
    args::{
        self, Usage,
        flags::{Format, ReferenceDate, Sources},
    },
    day::Diagnostics,
    grid,
    render::{Footer, Renderer, Slot, text::TextRenderer},
    style::Theme,
};

const USAGE: &'static str = r#"
Print the events on a single day.

This lays out one day exactly as it would appear in the two week grid, except
that all-day events always show their summary.

USAGE:
    fortnight day <date> <source>...

TIP:
    use -h for short docs and --help for long docs

EXAMPLES:
    Show what's happening today:

        $ fortnight day today work.ics
        Wed 2024-07-17 *
          [ Offsite >
          09:30 Standup

    %snip-start%

    Print tomorrow's events as JSON:

        $ fortnight day -f json tomorrow work.ics

    %snip-end%
REQUIRED ARGUMENTS:
%args%
OPTIONS:
%flags%
"#;

pub fn run(p: &mut lexopt::Parser) -> anyhow::Result<()> {
    let mut config = Config::default();
    let mut sources = Sources::default();
    args::configure(p, USAGE, &mut [&mut config, &mut sources])?;

    let today = crate::NOW.date();
    let date = config.date()?.get(today)?;
    let calendars = super::load(&sources)?;
    let mut diag = Diagnostics::default();
    let day = grid::build_day(&calendars, date, true, &crate::TZ, &mut diag)?;
    if diag.skipped > 0 {
        log::warn!("skipped {} event(s) on {date}", diag.skipped);
    }

    let mut wtr = std::io::stdout().lock();
    match config.format {
        Format::Text => {
            let mut renderer = TextRenderer::new(&mut wtr, Theme::stdout());
            let slot = Slot { row: 0, column: 0, is_today: date == today };
            renderer.day(slot, &day)?;
            renderer.finish(&Footer::default())?;
        }
        Format::Json => {
            serde_json::to_writer_pretty(&mut wtr, &day)?;
            writeln!(wtr)?;
        }
    }
    Ok(())
}

#[derive(Debug, Default)]
struct Config {
    date: Option<ReferenceDate>,
    format: Format,
}

impl Config {
    fn date(&self) -> anyhow::Result<ReferenceDate> {
        self.date.ok_or_else(|| anyhow::anyhow!("missing required <date>"))
    }
}

impl args::Configurable for Config {
    fn configure(
        &mut self,
        p: &mut lexopt::Parser,
        arg: &mut lexopt::Arg,
    ) -> anyhow::Result<bool> {
        use lexopt::Arg::*;

        match *arg {
            Value(ref v) => {
                if self.date.is_some() {
                    return Ok(false);
                }
                self.date = Some(v.clone().string()?.parse()?);
            }
            Short('f') | Long("format") => {
                self.format = args::parse(p, "-f/--format")?;
            }
            _ => return Ok(false),
        }
        Ok(true)
    }

    fn usage(&self) -> &[Usage] {
        &[ReferenceDate::ARG, Format::USAGE]
    }
}
