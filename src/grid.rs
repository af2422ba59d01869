use jiff::{
    ToSpan,
    civil::{Date, Weekday},
    tz::TimeZone,
};

use crate::{
    calendar::Calendar,
    day::{self, Diagnostics},
    occurrence::Occurrence,
    weekdate::first_of_week,
};

/// The number of days in a grid.
pub const DAYS: usize = 14;

/// The number of columns (days) in each row of a grid.
pub const COLUMNS: usize = 7;

/// How an all-day occurrence is drawn in one day cell.
///
/// These always describe the true span of the occurrence, even when it
/// extends past either end of the grid. An occurrence that started before
/// the grid has no left edge on the first day, which shows that it
/// continues.
#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Serialize)]
pub struct SpanAttrs {
    pub is_start: bool,
    pub is_end: bool,
    /// When false, the entry keeps its place and borders but has no text.
    pub show_summary: bool,
}

impl SpanAttrs {
    fn new(
        start: Date,
        end: Date,
        date: Date,
        first_column: bool,
    ) -> SpanAttrs {
        let is_start = date == start;
        SpanAttrs {
            is_start,
            is_end: date == end,
            show_summary: is_start || first_column,
        }
    }

    /// Returns the borders to draw around the bar for this span.
    pub fn borders(&self) -> Borders {
        Borders {
            top: true,
            bottom: true,
            left: self.is_start,
            right: self.is_end,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Borders {
    pub top: bool,
    pub bottom: bool,
    pub left: bool,
    pub right: bool,
}

/// An occurrence placed in a day cell.
#[derive(Clone, Debug, Eq, PartialEq, serde::Serialize)]
pub struct Entry {
    #[serde(flatten)]
    pub occurrence: Occurrence,
    /// Only all-day occurrences have span attributes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span: Option<SpanAttrs>,
}

impl Entry {
    fn new(occurrence: Occurrence, date: Date, first_column: bool) -> Entry {
        let span = match occurrence {
            Occurrence::AllDay { start, end, .. } => {
                Some(SpanAttrs::new(start, end, date, first_column))
            }
            Occurrence::Timed { .. } => None,
        };
        Entry { occurrence, span }
    }

    /// Returns the text to show for this entry, or `None` if this is the
    /// continuation of an all-day bar whose text is shown elsewhere.
    pub fn text(&self) -> Option<&str> {
        if self.span.is_some_and(|span| !span.show_summary) {
            return None;
        }
        Some(self.occurrence.summary())
    }
}

/// A single cell in a grid.
#[derive(Clone, Debug, Eq, PartialEq, serde::Serialize)]
pub struct Day {
    pub date: Date,
    pub entries: Vec<Entry>,
}

/// Two weeks of days, starting on a Monday.
#[derive(Clone, Debug, Eq, PartialEq, serde::Serialize)]
pub struct Grid {
    anchor: Date,
    days: Vec<Day>,
    /// The number of events that were skipped because they couldn't be
    /// resolved.
    skipped: usize,
}

impl Grid {
    #[cfg(test)]
    pub fn anchor(&self) -> Date {
        self.anchor
    }

    pub fn days(&self) -> &[Day] {
        &self.days
    }

    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Returns the days of this grid one week at a time.
    pub fn rows(&self) -> impl Iterator<Item = &[Day]> {
        self.days.chunks(COLUMNS)
    }

    /// Returns the day cell for the given date, if it is in this grid.
    #[cfg(test)]
    pub fn day(&self, date: Date) -> Option<&Day> {
        self.days.iter().find(|day| day.date == date)
    }
}

/// Builds the grid of the two weeks beginning on the Monday of the week
/// containing `reference`.
///
/// Dates are interpreted in the display time zone `tz`.
pub fn build(
    calendars: &[Calendar],
    reference: Date,
    tz: &TimeZone,
) -> anyhow::Result<Grid> {
    let anchor = first_of_week(Weekday::Monday, reference)?;
    let mut diag = Diagnostics::default();
    let mut days = Vec::with_capacity(DAYS);
    for i in 0..DAYS {
        let date = anchor.checked_add((i as i64).days())?;
        let first_column = i % COLUMNS == 0;
        days.push(build_day(calendars, date, first_column, tz, &mut diag)?);
    }
    log::debug!(
        "built grid anchored on {anchor} from {} calendar(s), \
         skipped {} event(s)",
        calendars.len(),
        diag.skipped,
    );
    Ok(Grid { anchor, days, skipped: diag.skipped })
}

/// Builds a single day cell.
///
/// `first_column` should be true when this day begins a row of the grid.
pub fn build_day(
    calendars: &[Calendar],
    date: Date,
    first_column: bool,
    tz: &TimeZone,
    diag: &mut Diagnostics,
) -> anyhow::Result<Day> {
    let mut occurrences = day::occurrences_on(calendars, date, tz, diag)?;
    day::order(&mut occurrences);
    let entries = occurrences
        .into_iter()
        .map(|occ| Entry::new(occ, date, first_column))
        .collect();
    Ok(Day { date, entries })
}

#[cfg(test)]
mod tests {
    use jiff::civil::{Time, date};

    use crate::{
        calendar::{Event, When},
        ical::RecurrenceRule,
    };

    use super::*;

    fn ny() -> TimeZone {
        TimeZone::get("America/New_York").unwrap()
    }

    fn all_day(summary: &str, start: Date, days: i64) -> Event {
        Event::new(When::Date(start))
            .with_duration(days.days())
            .with_summary(summary)
    }

    fn timed(summary: &str, start: Date, hour: i8) -> Event {
        let start = start.at(hour, 0, 0, 0).to_zoned(ny()).unwrap();
        Event::new(When::DateTime(start))
            .with_duration(1.hour())
            .with_summary(summary)
    }

    /// Renders each day as `date: entries` where all-day entries show their
    /// border flags as `[`/`]` and `<`/`>` and hidden text as `~`.
    fn snapshot(grid: &Grid) -> String {
        let mut lines = vec![];
        for day in grid.days() {
            let entries: String = day
                .entries
                .iter()
                .map(|e| {
                    let text = e.text().unwrap_or("~");
                    match e.span {
                        None => format!(" {text}"),
                        Some(span) => {
                            let b = span.borders();
                            let l = if b.left { "[" } else { "<" };
                            let r = if b.right { "]" } else { ">" };
                            format!(" {l}{text}{r}")
                        }
                    }
                })
                .collect();
            lines.push(format!("{}:{entries}", day.date));
        }
        lines.join("\n")
    }

    #[test]
    fn anchor_is_monday_of_reference_week() {
        // 2024-07-17 is a Wednesday.
        let grid = build(&[], date(2024, 7, 17), &ny()).unwrap();
        assert_eq!(grid.anchor(), date(2024, 7, 15));
        assert_eq!(grid.days().len(), DAYS);
        assert_eq!(grid.days()[7].date, date(2024, 7, 22));
        for (i, day) in grid.days().iter().enumerate() {
            let expected =
                grid.anchor().checked_add((i as i64).days()).unwrap();
            assert_eq!(day.date, expected);
            assert!(day.entries.is_empty());
        }
        assert_eq!(grid.rows().count(), 2);

        let grid = build(&[], date(2024, 7, 15), &ny()).unwrap();
        assert_eq!(grid.anchor(), date(2024, 7, 15));
        let grid = build(&[], date(2024, 7, 21), &ny()).unwrap();
        assert_eq!(grid.anchor(), date(2024, 7, 15));
    }

    #[test]
    fn spans_across_rows_and_window_edges() {
        let events = vec![
            // Started before the grid and ends on its first Tuesday.
            all_day("Before", date(2024, 7, 12), 5),
            // Saturday of the first week through Tuesday of the second.
            all_day("Weekend", date(2024, 7, 20), 4),
            // Continues past the end of the grid.
            all_day("After", date(2024, 7, 27), 4),
            timed("Lunch", date(2024, 7, 20), 12),
            timed("Coffee", date(2024, 7, 20), 9),
        ];
        let cals = vec![Calendar::new("test", events)];
        let grid = build(&cals, date(2024, 7, 17), &ny()).unwrap();
        insta::assert_snapshot!(
            snapshot(&grid),
            @r"
        2024-07-15: <Before>
        2024-07-16: <~]
        2024-07-17:
        2024-07-18:
        2024-07-19:
        2024-07-20: [Weekend> Lunch Coffee
        2024-07-21: <~>
        2024-07-22: <Weekend>
        2024-07-23: <~]
        2024-07-24:
        2024-07-25:
        2024-07-26:
        2024-07-27: [After>
        2024-07-28: <~>
        ",
        );
        assert_eq!(grid.skipped(), 0);
    }

    #[test]
    fn show_summary_only_on_start_and_row_starts() {
        // A long event covering the whole grid.
        let cals = vec![Calendar::new(
            "test",
            vec![all_day("Long", date(2024, 7, 1), 60)],
        )];
        let grid = build(&cals, date(2024, 7, 17), &ny()).unwrap();
        let shown: Vec<usize> = grid
            .days()
            .iter()
            .enumerate()
            .filter(|(_, day)| day.entries[0].text().is_some())
            .map(|(i, _)| i)
            .collect();
        assert_eq!(shown, vec![0, 7]);
    }

    #[test]
    fn entry_serialization() {
        let cals = vec![Calendar::new(
            "test",
            vec![
                all_day("Trip", date(2024, 7, 16), 2),
                timed("Call", date(2024, 7, 16), 9),
            ],
        )];
        let grid = build(&cals, date(2024, 7, 16), &ny()).unwrap();
        let day = grid.day(date(2024, 7, 16)).unwrap();
        insta::assert_snapshot!(
            serde_json::to_string_pretty(day).unwrap(),
            @r#"
        {
          "date": "2024-07-16",
          "entries": [
            {
              "kind": "all-day",
              "start": "2024-07-16",
              "end": "2024-07-17",
              "summary": "Trip",
              "span": {
                "is_start": true,
                "is_end": false,
                "show_summary": true
              }
            },
            {
              "kind": "timed",
              "start": "09:00:00",
              "end": "2024-07-16T10:00:00",
              "summary": "Call"
            }
          ]
        }
        "#,
        );
        assert_eq!(
            day.entries[1].occurrence,
            Occurrence::Timed {
                start: Time::constant(9, 0, 0, 0),
                end: date(2024, 7, 16).at(10, 0, 0, 0),
                summary: "Call".into(),
            },
        );
    }

    #[test]
    fn daily_event_across_spring_forward() {
        let start = date(2024, 3, 4).at(2, 30, 0, 0);
        let rule =
            RecurrenceRule::parse("FREQ=DAILY", start, &ny()).unwrap();
        let event = Event::new(When::DateTime(start.to_zoned(ny()).unwrap()))
            .with_duration(30.minutes())
            .with_rule(rule)
            .with_summary("Backup");
        let cals = vec![Calendar::new("test", vec![event])];
        let grid = build(&cals, date(2024, 3, 6), &ny()).unwrap();
        for day in grid.days() {
            assert_eq!(day.entries.len(), 1, "{}", day.date);
        }
        let sunday = grid.day(date(2024, 3, 10)).unwrap();
        assert_eq!(
            sunday.entries[0].occurrence,
            Occurrence::Timed {
                start: Time::constant(3, 30, 0, 0),
                end: date(2024, 3, 10).at(4, 0, 0, 0),
                summary: "Backup".into(),
            },
        );
    }

    #[test]
    fn grids_are_built_concurrently() {
        let cals = vec![Calendar::new(
            "test",
            vec![all_day("Trip", date(2024, 7, 16), 2)],
        )];
        let (a, b) = std::thread::scope(|s| {
            let a = s.spawn(|| build(&cals, date(2024, 7, 17), &ny()));
            let b = s.spawn(|| build(&cals, date(2024, 7, 31), &ny()));
            (a.join().unwrap().unwrap(), b.join().unwrap().unwrap())
        });
        assert_eq!(a.anchor(), date(2024, 7, 15));
        assert_eq!(b.anchor(), date(2024, 7, 29));
        assert_eq!(a.day(date(2024, 7, 17)).unwrap().entries.len(), 1);
        assert!(b.days().iter().all(|day| day.entries.is_empty()));
        assert_eq!(a, build(&cals, date(2024, 7, 17), &ny()).unwrap());
    }
}
