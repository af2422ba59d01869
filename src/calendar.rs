use std::{iter::Peekable, sync::Arc};

use jiff::{
    Span, Zoned,
    civil::{Date, DateTime, Time},
    tz::TimeZone,
};

use crate::ical::{RecurrenceIter, RecurrenceRule};

/// A single calendar loaded from one source.
#[derive(Clone, Debug)]
pub struct Calendar {
    name: Arc<str>,
    events: Vec<Event>,
}

impl Calendar {
    pub fn new(name: impl Into<Arc<str>>, events: Vec<Event>) -> Calendar {
        Calendar { name: name.into(), events }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }
}

/// The start or end of an event.
///
/// All-day events are described by dates. Everything else is a zoned
/// datetime, where floating values have already been put into the local
/// time zone.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum When {
    Date(Date),
    DateTime(Zoned),
}

impl When {
    /// Returns the civil datetime of this value in its own frame.
    ///
    /// Dates are mapped to midnight.
    pub fn civil(&self) -> DateTime {
        match *self {
            When::Date(date) => date.to_datetime(Time::midnight()),
            When::DateTime(ref zdt) => zdt.datetime(),
        }
    }

    /// Returns this value as a civil datetime in the frame of `start`.
    ///
    /// For an all-day `start`, that is midnight on this value's date. For a
    /// zoned `start`, dates take the time of day of `start` and datetimes
    /// are converted into the time zone of `start`.
    pub fn civil_in(&self, start: &When) -> DateTime {
        match (self, start) {
            (&When::Date(date), &When::Date(_)) => When::Date(date).civil(),
            (When::DateTime(zdt), &When::Date(_)) => {
                When::Date(zdt.date()).civil()
            }
            (&When::Date(date), When::DateTime(start)) => {
                date.to_datetime(start.time())
            }
            (When::DateTime(zdt), When::DateTime(start)) => {
                zdt.with_time_zone(start.time_zone().clone()).datetime()
            }
        }
    }

    /// Returns the date of this value in the given time zone.
    ///
    /// Dates have no time zone, so they are returned as is.
    pub fn date_in(&self, tz: &TimeZone) -> Date {
        match *self {
            When::Date(date) => date,
            When::DateTime(ref zdt) => zdt.with_time_zone(tz.clone()).date(),
        }
    }
}

impl std::fmt::Display for When {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match *self {
            When::Date(ref date) => std::fmt::Display::fmt(date, f),
            When::DateTime(ref zdt) => std::fmt::Display::fmt(zdt, f),
        }
    }
}

/// A single VEVENT, possibly recurring.
///
/// Recurrence dates and exception dates are stored as civil datetimes in the
/// frame of the event's start: the start's time zone for zoned events and
/// midnight for all-day events.
#[derive(Clone, Debug)]
pub struct Event {
    uid: Option<Arc<str>>,
    summary: Option<Arc<str>>,
    start: When,
    end: Option<When>,
    duration: Option<Span>,
    rule: Option<RecurrenceRule>,
    rdates: Vec<DateTime>,
    exdates: Vec<DateTime>,
}

impl Event {
    pub fn new(start: When) -> Event {
        Event {
            uid: None,
            summary: None,
            start,
            end: None,
            duration: None,
            rule: None,
            rdates: vec![],
            exdates: vec![],
        }
    }

    pub fn with_uid(self, uid: impl Into<Arc<str>>) -> Event {
        Event { uid: Some(uid.into()), ..self }
    }

    pub fn with_summary(self, summary: impl Into<Arc<str>>) -> Event {
        Event { summary: Some(summary.into()), ..self }
    }

    pub fn with_end(self, end: When) -> Event {
        Event { end: Some(end), ..self }
    }

    pub fn with_duration(self, duration: Span) -> Event {
        Event { duration: Some(duration), ..self }
    }

    pub fn with_rule(self, rule: RecurrenceRule) -> Event {
        Event { rule: Some(rule), ..self }
    }

    pub fn with_rdate(mut self, dt: DateTime) -> Event {
        self.rdates.push(dt);
        self
    }

    pub fn with_exdate(mut self, dt: DateTime) -> Event {
        self.exdates.push(dt);
        self
    }

    pub fn uid(&self) -> Option<&str> {
        self.uid.as_deref()
    }

    /// Returns the summary of this event, if it has a non-blank one.
    pub fn summary(&self) -> Option<&Arc<str>> {
        self.summary.as_ref().filter(|s| !s.trim().is_empty())
    }

    pub fn start(&self) -> &When {
        &self.start
    }

    pub fn end(&self) -> Option<&When> {
        self.end.as_ref()
    }

    pub fn duration(&self) -> Option<Span> {
        self.duration
    }

    /// Returns the time zone of this event's start, if it has one.
    pub fn time_zone(&self) -> Option<&TimeZone> {
        match self.start {
            When::Date(_) => None,
            When::DateTime(ref zdt) => Some(zdt.time_zone()),
        }
    }

    /// A short human readable label for this event, for error messages.
    pub fn label(&self) -> String {
        let name = self
            .uid()
            .map(|uid| format!("`{uid}`"))
            .or_else(|| self.summary().map(|s| format!("`{s}`")))
            .unwrap_or_else(|| "<unnamed>".to_string());
        format!("event {name} starting at {}", self.start)
    }

    /// Returns every instance of this event in non-decreasing order.
    ///
    /// This merges the instances of the recurrence rule (or just the start,
    /// for non-recurring events) with the recurrence dates, drops exception
    /// dates and removes duplicates. A rule is not expanded past periods
    /// starting after `horizon`, which is a civil datetime in the frame of
    /// this event.
    pub fn instances(&self, horizon: DateTime) -> Instances<'_> {
        let base = match self.rule {
            None => Base::Single(Some(self.start.civil())),
            Some(ref rule) => Base::Rule(rule.iter().bounded(horizon)),
        };
        let mut rdates = self.rdates.clone();
        rdates.sort();
        rdates.reverse();
        Instances { event: self, base: base.peekable(), rdates, last: None }
    }
}

/// An iterator over the instances of an event.
#[derive(Debug)]
pub struct Instances<'e> {
    event: &'e Event,
    base: Peekable<Base<'e>>,
    /// Sorted latest first.
    rdates: Vec<DateTime>,
    last: Option<DateTime>,
}

impl<'e> Instances<'e> {
    /// Returns the next civil datetime, merging rule instances and
    /// recurrence dates.
    fn next_civil(&mut self) -> Option<DateTime> {
        let take_rdate = match (self.base.peek(), self.rdates.last()) {
            (None, None) => return None,
            (Some(_), None) => false,
            (None, Some(_)) => true,
            (Some(base), Some(rdate)) => rdate < base,
        };
        if take_rdate { self.rdates.pop() } else { self.base.next() }
    }

    /// Attaches the time zone of the event to a civil instance.
    ///
    /// Instances falling in a gap are read with the offset before the gap,
    /// which moves them forward by the length of the gap. Instances in a
    /// fold use the earlier of the two offsets.
    fn attach(&self, dt: DateTime) -> Option<When> {
        let zdt = match self.event.start {
            When::Date(_) => return Some(When::Date(dt.date())),
            When::DateTime(ref zdt) => zdt,
        };
        match zdt.time_zone().to_ambiguous_zoned(dt).compatible() {
            Ok(zdt) => Some(When::DateTime(zdt)),
            Err(err) => {
                log::debug!(
                    "skipping instance {dt} of {}: {err}",
                    self.event.label(),
                );
                None
            }
        }
    }
}

impl<'e> Iterator for Instances<'e> {
    type Item = When;

    fn next(&mut self) -> Option<When> {
        loop {
            let dt = self.next_civil()?;
            if self.last == Some(dt) || self.event.exdates.contains(&dt) {
                continue;
            }
            self.last = Some(dt);
            if let Some(when) = self.attach(dt) {
                return Some(when);
            }
        }
    }
}

#[derive(Debug)]
enum Base<'e> {
    Single(Option<DateTime>),
    Rule(RecurrenceIter<'e>),
}

impl<'e> Iterator for Base<'e> {
    type Item = DateTime;

    fn next(&mut self) -> Option<DateTime> {
        match *self {
            Base::Single(ref mut dt) => dt.take(),
            Base::Rule(ref mut it) => it.next(),
        }
    }
}

#[cfg(test)]
mod tests {
    use jiff::{ToSpan, civil::date};

    use super::*;

    fn ny() -> TimeZone {
        TimeZone::get("America/New_York").unwrap()
    }

    fn zoned(dt: DateTime) -> When {
        When::DateTime(dt.to_zoned(ny()).unwrap())
    }

    fn horizon() -> DateTime {
        date(2030, 1, 1).at(0, 0, 0, 0)
    }

    fn snapshot(event: &Event) -> String {
        event
            .instances(horizon())
            .map(|w| w.to_string())
            .collect::<Vec<String>>()
            .join("\n")
    }

    #[test]
    fn single_instance() {
        let event = Event::new(When::Date(date(2024, 7, 15)));
        insta::assert_snapshot!(snapshot(&event), @"2024-07-15");
    }

    #[test]
    fn rule_with_rdates_and_exdates() {
        let start = date(2024, 7, 15).at(9, 0, 0, 0);
        let rule =
            RecurrenceRule::parse("FREQ=DAILY;COUNT=4", start, &ny()).unwrap();
        let event = Event::new(zoned(start))
            .with_rule(rule)
            .with_exdate(date(2024, 7, 16).at(9, 0, 0, 0))
            // A duplicate of a rule instance is only reported once.
            .with_rdate(date(2024, 7, 17).at(9, 0, 0, 0))
            .with_rdate(date(2024, 7, 20).at(14, 0, 0, 0))
            .with_rdate(date(2024, 7, 15).at(8, 0, 0, 0));
        insta::assert_snapshot!(
            snapshot(&event),
            @r"
        2024-07-15T08:00:00-04:00[America/New_York]
        2024-07-15T09:00:00-04:00[America/New_York]
        2024-07-17T09:00:00-04:00[America/New_York]
        2024-07-18T09:00:00-04:00[America/New_York]
        2024-07-20T14:00:00-04:00[America/New_York]
        ",
        );
    }

    #[test]
    fn gaps_move_forward_and_folds_are_earlier() {
        let start = date(2024, 3, 9).at(2, 30, 0, 0);
        let rule =
            RecurrenceRule::parse("FREQ=DAILY;COUNT=3", start, &ny()).unwrap();
        let event = Event::new(zoned(start)).with_rule(rule);
        insta::assert_snapshot!(
            snapshot(&event),
            @r"
        2024-03-09T02:30:00-05:00[America/New_York]
        2024-03-10T03:30:00-04:00[America/New_York]
        2024-03-11T02:30:00-04:00[America/New_York]
        ",
        );

        let start = date(2024, 11, 3).at(1, 30, 0, 0);
        let event = Event::new(zoned(start));
        insta::assert_snapshot!(
            snapshot(&event),
            @"2024-11-03T01:30:00-04:00[America/New_York]",
        );
    }

    #[test]
    fn summary_and_label() {
        let event =
            Event::new(When::Date(date(2024, 7, 15))).with_summary("   ");
        assert_eq!(event.summary(), None);
        insta::assert_snapshot!(
            event.label(),
            @"event <unnamed> starting at 2024-07-15",
        );
        let event = event
            .with_summary("Holiday")
            .with_duration(1.day())
            .with_uid("abc@x");
        assert_eq!(event.summary().map(|s| &**s), Some("Holiday"));
        insta::assert_snapshot!(
            event.label(),
            @"event `abc@x` starting at 2024-07-15",
        );
    }
}
