use std::sync::Arc;

use jiff::{
    SignedDuration, ToSpan, Unit, Zoned,
    civil::{Date, DateTime, Time},
    tz::TimeZone,
};

use crate::calendar::{Event, When};

/// How far past the target date recurrence rules are expanded.
///
/// The margin covers the difference between an event's own time zone and
/// the display time zone.
const HORIZON_DAYS: i32 = 2;

/// A single event as it appears on one day.
#[derive(Clone, Debug, Eq, PartialEq, serde::Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Occurrence {
    /// An event with a time of day. It is only ever shown on the date that
    /// it starts on, in the display time zone.
    Timed {
        start: Time,
        end: DateTime,
        #[serde(serialize_with = "serialize_summary")]
        summary: Arc<str>,
    },
    /// An event covering whole days. `end` is inclusive.
    AllDay {
        start: Date,
        end: Date,
        #[serde(serialize_with = "serialize_summary")]
        summary: Arc<str>,
    },
}

impl Occurrence {
    /// The display priority of this occurrence. Lower sorts first.
    pub fn priority(&self) -> u8 {
        match *self {
            Occurrence::AllDay { .. } => 10,
            Occurrence::Timed { .. } => 20,
        }
    }

    pub fn summary(&self) -> &Arc<str> {
        match *self {
            Occurrence::Timed { ref summary, .. } => summary,
            Occurrence::AllDay { ref summary, .. } => summary,
        }
    }
}

fn serialize_summary<S: serde::Serializer>(
    summary: &Arc<str>,
    s: S,
) -> Result<S::Ok, S::Error> {
    s.serialize_str(summary)
}

/// An error that occurs when resolving an event on a date.
#[derive(Debug)]
pub enum ResolveError {
    /// The event has neither an end nor a duration. Feeds are expected to
    /// fill in the defaults, so this means the input is broken and the
    /// whole render should stop.
    MissingTiming { event: String },
    /// Datetime arithmetic overflowed while computing an instance.
    Arithmetic { event: String, err: jiff::Error },
}

impl ResolveError {
    /// Whether this error should abort the render instead of skipping the
    /// event.
    pub fn is_fatal(&self) -> bool {
        matches!(*self, ResolveError::MissingTiming { .. })
    }
}

impl std::fmt::Display for ResolveError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match *self {
            ResolveError::MissingTiming { ref event } => {
                write!(f, "{event} has neither an end nor a duration")
            }
            ResolveError::Arithmetic { ref event, .. } => {
                write!(f, "failed to compute an instance of {event}")
            }
        }
    }
}

impl std::error::Error for ResolveError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match *self {
            ResolveError::MissingTiming { .. } => None,
            ResolveError::Arithmetic { ref err, .. } => Some(err),
        }
    }
}

/// The length of an event, measured in the way that its kind needs.
#[derive(Clone, Copy, Debug)]
enum Length {
    /// All-day events are measured in calendar days.
    Days(i64),
    /// Timed events are measured exactly.
    Exact(SignedDuration),
}

/// Returns the occurrence of `event` on `date`, if any.
///
/// Dates are interpreted in the display time zone `tz`. A timed event
/// covers only the date it starts on. An all-day event covers its start
/// date up to, but not including, its end date (or just its start date when
/// it has no length).
pub fn resolve(
    event: &Event,
    date: Date,
    tz: &TimeZone,
) -> Result<Option<Occurrence>, ResolveError> {
    let arith = |err: jiff::Error| ResolveError::Arithmetic {
        event: event.label(),
        err,
    };
    let Some(summary) = event.summary() else { return Ok(None) };
    let length = length(event)?;
    let horizon = horizon(event, date, tz).map_err(arith)?;
    for instance in event.instances(horizon) {
        let start_date = instance.date_in(tz);
        if start_date > date {
            break;
        }
        match (instance, length) {
            (When::Date(start), Length::Days(days)) => {
                let end = if days <= 1 {
                    start
                } else {
                    start.checked_add((days - 1).days()).map_err(arith)?
                };
                if end >= date {
                    return Ok(Some(Occurrence::AllDay {
                        start,
                        end,
                        summary: Arc::clone(summary),
                    }));
                }
            }
            (When::DateTime(zdt), Length::Exact(duration)) => {
                if start_date != date {
                    continue;
                }
                let zdt = zdt.with_time_zone(tz.clone());
                let end = zdt.checked_add(duration).map_err(arith)?;
                return Ok(Some(Occurrence::Timed {
                    start: zdt.time(),
                    end: end.datetime(),
                    summary: Arc::clone(summary),
                }));
            }
            // `length` always measures by the kind of the start, and every
            // instance has the same kind as the start.
            _ => unreachable!("instance kind differs from event start"),
        }
    }
    Ok(None)
}

/// Computes the length of an event from its duration, or from its end when
/// it has no duration.
fn length(event: &Event) -> Result<Length, ResolveError> {
    let arith = |err: jiff::Error| ResolveError::Arithmetic {
        event: event.label(),
        err,
    };
    match (event.start(), event.duration(), event.end()) {
        (_, None, None) => {
            Err(ResolveError::MissingTiming { event: event.label() })
        }
        (&When::Date(start), Some(span), _) => {
            let days = span.total((Unit::Day, start)).map_err(arith)?;
            Ok(Length::Days(days.floor() as i64))
        }
        (&When::Date(start), None, Some(end)) => {
            let end = match *end {
                When::Date(end) => end,
                When::DateTime(ref zdt) => zdt.date(),
            };
            let span = start.until(end).map_err(arith)?;
            Ok(Length::Days(i64::from(span.get_days())))
        }
        (When::DateTime(start), Some(span), _) => {
            let end = start.checked_add(span).map_err(arith)?;
            Ok(Length::Exact(start.duration_until(&end)))
        }
        (When::DateTime(start), None, Some(end)) => {
            let end: Zoned = match *end {
                When::DateTime(ref zdt) => zdt.clone(),
                When::Date(date) => {
                    date.to_zoned(start.time_zone().clone()).map_err(arith)?
                }
            };
            Ok(Length::Exact(start.duration_until(&end)))
        }
    }
}

/// Returns the point past which recurrence rules of `event` don't need to
/// be expanded when resolving `date`, in the event's own frame.
fn horizon(
    event: &Event,
    date: Date,
    tz: &TimeZone,
) -> Result<DateTime, jiff::Error> {
    let end = date
        .checked_add(HORIZON_DAYS.days())
        .unwrap_or(Date::MAX)
        .to_datetime(Time::midnight());
    match event.time_zone() {
        None => Ok(end),
        Some(event_tz) => {
            let zdt = end.to_zoned(tz.clone())?;
            Ok(zdt.with_time_zone(event_tz.clone()).datetime())
        }
    }
}
