use jiff::civil::Date;

use crate::grid::{COLUMNS, Day, Grid};

pub mod raster;
pub mod text;

/// What is shown above the grid.
#[derive(Clone, Debug)]
pub struct Header {
    /// The month and year being shown, e.g., `July 2024`.
    pub title: String,
    /// Abbreviated names of the weekdays, in column order.
    pub weekdays: Vec<String>,
}

/// Where a day is drawn in the grid.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Slot {
    pub row: usize,
    pub column: usize,
    pub is_today: bool,
}

/// What is shown below the grid.
#[derive(Clone, Debug, Default)]
pub struct Footer {
    pub text: String,
}

/// A consumer of a finished grid.
///
/// `walk` calls `begin` once, then `day` for every day in row order, then
/// `finish` once.
pub trait Renderer {
    fn begin(&mut self, header: &Header) -> anyhow::Result<()>;

    fn day(&mut self, slot: Slot, day: &Day) -> anyhow::Result<()>;

    fn finish(&mut self, footer: &Footer) -> anyhow::Result<()>;
}

/// Drives `renderer` over `grid`.
///
/// `today` is the highlighted date. The title of the header is its month
/// and year.
pub fn walk(
    grid: &Grid,
    today: Date,
    footer: &Footer,
    renderer: &mut dyn Renderer,
) -> anyhow::Result<()> {
    let header = Header {
        title: today.strftime("%B %Y").to_string(),
        weekdays: grid
            .days()
            .iter()
            .take(COLUMNS)
            .map(|day| day.date.strftime("%a").to_string())
            .collect(),
    };
    renderer.begin(&header)?;
    for (row, days) in grid.rows().enumerate() {
        for (column, day) in days.iter().enumerate() {
            let slot = Slot { row, column, is_today: day.date == today };
            renderer.day(slot, day)?;
        }
    }
    renderer.finish(footer)
}

/// Flattens a summary onto a single line.
fn one_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<&str>>().join(" ")
}

#[cfg(test)]
mod tests {
    use jiff::{civil::date, tz::TimeZone};

    use crate::grid;

    use super::*;

    #[derive(Default)]
    struct Recorder {
        calls: Vec<String>,
    }

    impl Renderer for Recorder {
        fn begin(&mut self, header: &Header) -> anyhow::Result<()> {
            self.calls.push(format!(
                "begin {} ({})",
                header.title,
                header.weekdays.join(",")
            ));
            Ok(())
        }

        fn day(&mut self, slot: Slot, day: &Day) -> anyhow::Result<()> {
            if slot.column == 0 || slot.is_today {
                self.calls.push(format!(
                    "day {} at {},{}{}",
                    day.date,
                    slot.row,
                    slot.column,
                    if slot.is_today { " (today)" } else { "" },
                ));
            }
            Ok(())
        }

        fn finish(&mut self, footer: &Footer) -> anyhow::Result<()> {
            self.calls.push(format!("finish {}", footer.text));
            Ok(())
        }
    }

    #[test]
    fn one_line_collapses_whitespace() {
        assert_eq!(one_line("Dinner\n at  home\t"), "Dinner at home");
    }

    #[test]
    fn walk_order() {
        let tz = TimeZone::UTC;
        let grid = grid::build(&[], date(2024, 7, 31), &tz).unwrap();
        let footer = Footer { text: "bye".to_string() };
        let mut rec = Recorder::default();
        walk(&grid, date(2024, 7, 31), &footer, &mut rec).unwrap();
        insta::assert_snapshot!(
            rec.calls.join("\n"),
            @r"
        begin July 2024 (Mon,Tue,Wed,Thu,Fri,Sat,Sun)
        day 2024-07-29 at 0,0
        day 2024-07-31 at 0,2 (today)
        day 2024-08-05 at 1,0
        finish bye
        ",
        );
    }
}
