use crate::{
    args::flags::Sources, calendar::Calendar, feed, grid::Grid,
    render::Footer,
};

mod day;
mod grid;
mod png;

const USAGE: &'static str = "\
Lay out two weeks of calendar events and render them.

USAGE:
    fortnight <command> ...

COMMANDS:
    day    Print the events on a single day
    grid   Print the two week grid as text or JSON
    png    Draw the two week grid as a PNG image
";

pub fn run(p: &mut lexopt::Parser) -> anyhow::Result<()> {
    let cmd = crate::args::next_as_command(USAGE, p)?;
    match &*cmd {
        "day" => day::run(p),
        "grid" => grid::run(p),
        "png" => png::run(p),
        unk => anyhow::bail!("unrecognized command '{}'", unk),
    }
}

/// Loads every calendar named by `sources` in the local time zone.
fn load(sources: &Sources) -> anyhow::Result<Vec<Calendar>> {
    feed::load(&sources.get()?, &crate::TZ)
}

/// Returns the footer shown below a rendered grid.
///
/// It records when the grid was rendered and, if any events couldn't be
/// shown, how many.
fn footer(grid: &Grid) -> Footer {
    let mut text =
        format!("Updated {}", crate::NOW.strftime("%Y-%m-%d %H:%M"));
    match grid.skipped() {
        0 => {}
        1 => text.push_str(" (1 event skipped)"),
        n => text.push_str(&format!(" ({n} events skipped)")),
    }
    Footer { text }
}
