use std::{io::Write, path::PathBuf};

use anyhow::Context;

use crate::{
    args::{
        self, Usage,
        flags::{FileOrStdout, ImageSize, ReferenceDate, Sources},
    },
    grid,
    render::{raster::RasterRenderer, walk},
};

const USAGE: &'static str = r#"
Draw two weeks of events as a black and white PNG image.

The image is meant for displays that can only show two colors, like e-ink
panels. All text is drawn with bitmap fonts and no anti-aliasing. The layout
is the same as `fortnight grid`: the grid starts on the Monday of the week
containing the reference date, and the reference date is circled.

USAGE:
    fortnight png [-o <path>] <source>...

TIP:
    use -h for short docs and --help for long docs

EXAMPLES:
    Draw the next two weeks into a file:

        $ fortnight png -o calendar.png work.ics

    %snip-start%

    Draw a smaller image for a different panel:

        $ fortnight png --size 800x480 -o calendar.png work.ics

    Write the image to stdout:

        $ fortnight png work.ics > calendar.png

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

    // Check the size before doing any potentially slow loading.
    let mut renderer = RasterRenderer::new(config.size.get())?;
    let reference = config.date.get(crate::NOW.date())?;
    let calendars = super::load(&sources)?;
    let grid = grid::build(&calendars, reference, &crate::TZ)?;
    walk(&grid, reference, &super::footer(&grid), &mut renderer)?;

    let mut wtr = config.output.writer()?;
    renderer
        .into_canvas()
        .write_png(&mut wtr)
        .with_context(|| format!("{}", config.output.display()))?;
    wtr.flush()?;
    log::info!("wrote {} image to {}", config.size, config.output.display());
    Ok(())
}

#[derive(Debug, Default)]
struct Config {
    date: ReferenceDate,
    output: FileOrStdout,
    size: ImageSize,
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
            Short('o') | Long("output") => {
                let path = PathBuf::from(p.value().context("-o/--output")?);
                self.output = FileOrStdout::from(path);
            }
            Long("size") => {
                self.size = args::parse(p, "--size")?;
            }
            _ => return Ok(false),
        }
        Ok(true)
    }

    fn usage(&self) -> &[Usage] {
        &[ReferenceDate::USAGE, FileOrStdout::USAGE, ImageSize::USAGE]
    }
}
