use jiff::{civil::Date, tz::TimeZone};

use crate::{
    calendar::Calendar,
    occurrence::{self, Occurrence, ResolveError},
};

/// Counts events that were skipped while building a grid.
#[derive(Clone, Copy, Debug, Default)]
pub struct Diagnostics {
    pub skipped: usize,
}

/// Returns every occurrence on `date` across all calendars.
///
/// The order is discovery order: calendars in the order given, then events
/// in feed order. Identical events in different calendars are all kept.
///
/// Events that can't be resolved because of arithmetic overflow are logged,
/// counted and skipped. An event missing its timing is an error.
pub fn occurrences_on(
    calendars: &[Calendar],
    date: Date,
    tz: &TimeZone,
    diag: &mut Diagnostics,
) -> Result<Vec<Occurrence>, ResolveError> {
    let mut found = vec![];
    for cal in calendars.iter() {
        for event in cal.events().iter() {
            match occurrence::resolve(event, date, tz) {
                Ok(None) => {}
                Ok(Some(occ)) => {
                    log::trace!(
                        "{} from calendar `{}` occurs on {date}",
                        event.label(),
                        cal.name(),
                    );
                    found.push(occ);
                }
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    log::warn!(
                        "skipping event from calendar `{}` on {date}: {:#}",
                        cal.name(),
                        anyhow::Error::from(err),
                    );
                    diag.skipped += 1;
                }
            }
        }
    }
    Ok(found)
}

/// Sorts occurrences by display priority, all-day before timed.
///
/// The sort is stable, so occurrences with the same priority stay in
/// discovery order.
pub fn order(occurrences: &mut [Occurrence]) {
    occurrences.sort_by_key(|occ| occ.priority());
}
