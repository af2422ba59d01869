use std::io::Write;

use crate::{
    args::{
        self, Usage,
        flags::{Format, ReferenceDate, Sources},
    },
    grid,
    render::{text::TextRenderer, walk},
    style::Theme,
};

const USAGE: &'static str = r#"
Print two weeks of events from one or more iCalendar feeds.

The grid starts on the Monday of the week containing the reference date, which
is today unless -d/--date is given. Days are printed one after the other, with
a blank line between the two weeks. The reference date is marked with `*`.

USAGE:
    fortnight grid [-d <date>] <source>...

TIP:
    use -h for short docs and --help for long docs

EXAMPLES:
    Show the next two weeks of a calendar file:

        $ fortnight grid work.ics

    %snip-start%

    Show the two weeks around a particular date:

        $ fortnight grid -d 2024-07-17 work.ics
        July 2024

        Mon 2024-07-15
          [ Offsite ]
        Tue 2024-07-16
        Wed 2024-07-17 *
          09:30 Standup
        ...

    Combine a local file with a remote feed and print the result as JSON:

        $ fortnight grid -f json work.ics webcal://example.com/holidays.ics

    Sources may also be given via the `FORTNIGHT_CALENDARS` environment
    variable:

        $ export FORTNIGHT_CALENDARS='work.ics home.ics'
        $ fortnight grid

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

    let tz = &*crate::TZ;
    let reference = config.date.get(crate::NOW.date())?;
    let calendars = super::load(&sources)?;
    let grid = grid::build(&calendars, reference, tz)?;

    let mut wtr = std::io::stdout().lock();
    match config.format {
        Format::Text => {
            let footer = super::footer(&grid);
            let mut renderer = TextRenderer::new(&mut wtr, Theme::stdout());
            walk(&grid, reference, &footer, &mut renderer)?;
        }
        Format::Json => {
            serde_json::to_writer_pretty(&mut wtr, &grid)?;
            writeln!(wtr)?;
        }
    }
    Ok(())
}

#[derive(Debug, Default)]
struct Config {
    date: ReferenceDate,
    format: Format,
}

impl args::Configurable for Config {
    fn configure(
        &mut self,
        p: &mut lexopt::Parser,
        arg: &mut lexopt::Arg,
    ) -> anyhow::Result<bool> {
        use lexopt::Arg::*;

        match *arg {
            Short('d') | Long("date") => {
                self.date = args::parse(p, "-d/--date")?;
            }
            Short('f') | Long("format") => {
                self.format = args::parse(p, "-f/--format")?;
            }
            _ => return Ok(false),
        }
        Ok(true)
    }

    fn usage(&self) -> &[Usage] {
        &[ReferenceDate::USAGE, Format::USAGE]
    }
}
