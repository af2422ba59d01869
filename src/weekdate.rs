use {
    anyhow::Context,
    jiff::{
        ToSpan,
        civil::{Date, Weekday},
    },
};

/// Returns the start of the week that the given date resides in.
///
/// The starting point of the week is determined by `start`. Grids always use
/// Monday, while weekly recurrence rules use their `WKST`.
pub fn first_of_week(start: Weekday, date: Date) -> anyhow::Result<Date> {
    let wd = date.weekday();
    if start == wd {
        Ok(date)
    } else {
        date.nth_weekday(-1, start).with_context(|| {
            format!(
                "failed to find first day of week containing \
                 {date}, for weeks starting on {start:?}",
            )
        })
    }
}

/// Returns every date in the week beginning at `first`, in order.
///
/// Dates that would overflow Jiff's supported range are omitted, which can
/// only happen at the very end of year 9999.
pub fn week_of(first: Date) -> impl Iterator<Item = Date> {
    (0..7).filter_map(move |n| first.checked_add(n.days()).ok())
}
