use std::{cmp::Ordering, sync::Arc};

use {
    anyhow::Context,
    jiff::{
        Span,
        civil::{Date, DateTime, Time, Weekday},
        tz::TimeZone,
    },
};

use crate::weekdate::{first_of_week, week_of};

// Unlike a general purpose implementation, this only covers the parts of
// RFC 5545 recurrence rules that calendar feeds actually emit. In particular,
// BYWEEKNO, BYHOUR, BYMINUTE and BYSECOND are rejected when parsing. Events
// carrying them are skipped by the feed loader instead of being misrendered.
//
// Everything here works on civil datetimes. Callers are responsible for
// attaching a time zone to what comes out of the iterator, since all-day
// events don't have one at all.

/// An RFC 5545 recurrence rule.
#[derive(Clone, Debug)]
pub struct RecurrenceRule {
    inner: Arc<RecurrenceRuleInner>,
}

#[derive(Debug)]
struct RecurrenceRuleInner {
    freq: Frequency,
    start: DateTime,
    until: Option<DateTime>,
    count: Option<u32>,
    interval: i32,
    by_month: Box<[i8]>,
    // can be negative
    by_year_day: Box<[i16]>,
    // can be negative
    by_month_day: Box<[i8]>,
    by_week_day: Box<[ByWeekday]>,
    // can be negative
    by_set_pos: Box<[i32]>,
    week_start: Weekday,
}

impl RecurrenceRule {
    /// Returns a builder for constructing a `RecurrenceRule`.
    ///
    /// The frequency and the starting point are the only two things required
    /// to create a rule.
    pub fn builder(freq: Frequency, start: DateTime) -> RecurrenceRuleBuilder {
        RecurrenceRuleBuilder::new(freq, start)
    }

    /// Parses the value of an `RRULE` property, e.g.,
    /// `FREQ=WEEKLY;BYDAY=MO,WE;COUNT=10`.
    ///
    /// `start` is the civil `DTSTART` of the event. `tz` is the time zone
    /// that `start` is in, and is only used to convert a UTC `UNTIL` into
    /// the same civil time as `start`.
    pub fn parse(
        text: &str,
        start: DateTime,
        tz: &TimeZone,
    ) -> anyhow::Result<RecurrenceRule> {
        let mut freq = None;
        let mut parts = vec![];
        for part in text.trim().split(';').filter(|p| !p.is_empty()) {
            let Some((name, value)) = part.split_once('=') else {
                anyhow::bail!("invalid recurrence rule part `{part}`");
            };
            let name = name.trim().to_ascii_uppercase();
            if name == "FREQ" {
                freq = Some(value.parse::<Frequency>()?);
            } else {
                parts.push((name, value.trim()));
            }
        }
        let freq = freq.context("recurrence rule is missing FREQ")?;
        let mut b = RecurrenceRule::builder(freq, start);
        for (name, value) in parts {
            match &*name {
                "INTERVAL" => {
                    b.interval(parse_int(&name, value)?);
                }
                "COUNT" => {
                    b.count(parse_int(&name, value)?);
                }
                "UNTIL" => {
                    b.until(parse_until(value, tz).with_context(|| {
                        format!("invalid UNTIL value `{value}`")
                    })?);
                }
                "BYMONTH" => {
                    for v in value.split(',') {
                        b.by_month(parse_int(&name, v)?);
                    }
                }
                "BYMONTHDAY" => {
                    for v in value.split(',') {
                        b.by_month_day(parse_int(&name, v)?);
                    }
                }
                "BYYEARDAY" => {
                    for v in value.split(',') {
                        b.by_year_day(parse_int(&name, v)?);
                    }
                }
                "BYDAY" => {
                    for v in value.split(',') {
                        b.by_week_day(v.parse::<ByWeekday>()?);
                    }
                }
                "BYSETPOS" => {
                    for v in value.split(',') {
                        b.by_set_position(parse_int(&name, v)?);
                    }
                }
                "WKST" => {
                    b.week_start(parse_weekday(value)?);
                }
                "BYWEEKNO" | "BYHOUR" | "BYMINUTE" | "BYSECOND" => {
                    anyhow::bail!(
                        "recurrence rule part `{name}` is not supported"
                    );
                }
                unk => {
                    anyhow::bail!("unrecognized recurrence rule part `{unk}`")
                }
            }
        }
        b.build()
    }

    /// Returns an iterator over all datetimes in this recurrence rule.
    ///
    /// Without COUNT or UNTIL, the iterator runs all the way up to Jiff's
    /// maximum datetime. Use `RecurrenceIter::bounded` when only a window of
    /// the sequence is interesting.
    pub fn iter(&self) -> RecurrenceIter<'_> {
        RecurrenceIter {
            rule: self,
            set: vec![],
            period: Some(0),
            emitted: 0,
            horizon: None,
        }
    }

    /// Returns the frequency of this rule.
    pub fn frequency(&self) -> Frequency {
        self.inner.freq
    }

    /// Returns the start of the `n`th period of this rule.
    ///
    /// Periods are normalized to the start of their year, month, week or day
    /// (depending on the frequency) so that every datetime an expansion of
    /// the period produces is never before the period's start. For sub-daily
    /// frequencies, the period start is the candidate datetime itself.
    fn period_start(&self, n: i64) -> Option<DateTime> {
        let r = &self.inner;
        let step = n.checked_mul(i64::from(r.interval))?;
        let midnight = |d: Date| d.to_datetime(Time::midnight());
        let start = r.start.date();
        let dt = match r.freq {
            Frequency::Yearly => {
                let span = Span::new().try_years(step).ok()?;
                midnight(start.first_of_year().checked_add(span).ok()?)
            }
            Frequency::Monthly => {
                let span = Span::new().try_months(step).ok()?;
                midnight(start.first_of_month().checked_add(span).ok()?)
            }
            Frequency::Weekly => {
                let first = first_of_week(r.week_start, start).ok()?;
                let span = Span::new().try_weeks(step).ok()?;
                midnight(first.checked_add(span).ok()?)
            }
            Frequency::Daily => {
                let span = Span::new().try_days(step).ok()?;
                midnight(start.checked_add(span).ok()?)
            }
            Frequency::Hourly => {
                r.start.checked_add(Span::new().try_hours(step).ok()?).ok()?
            }
            Frequency::Minutely => r
                .start
                .checked_add(Span::new().try_minutes(step).ok()?)
                .ok()?,
            Frequency::Secondly => r
                .start
                .checked_add(Span::new().try_seconds(step).ok()?)
                .ok()?,
        };
        Some(dt)
    }
}

impl<'r> IntoIterator for &'r RecurrenceRule {
    type IntoIter = RecurrenceIter<'r>;
    type Item = DateTime;

    fn into_iter(self) -> RecurrenceIter<'r> {
        self.iter()
    }
}

/// An expander for a single period of a recurrence rule.
#[derive(Clone, Debug)]
struct Expander<'a> {
    /// The rule we are expanding.
    rule: &'a RecurrenceRuleInner,
    /// The start of the period being expanded.
    period: DateTime,
}

impl<'a> Expander<'a> {
    /// Expand this period into `set`.
    ///
    /// The datetimes are pushed in reverse chronological order so that the
    /// iterator can pop the earliest one off the end.
    fn expand(&self, set: &mut Vec<DateTime>) {
        let r = self.rule;
        let mut datetimes: Vec<DateTime> = match r.freq {
            Frequency::Hourly | Frequency::Minutely | Frequency::Secondly => {
                let dt = self.period;
                if self.limit(dt.date()) { vec![dt] } else { vec![] }
            }
            _ => {
                let mut dates = vec![];
                match r.freq {
                    Frequency::Yearly => self.yearly(&mut dates),
                    Frequency::Monthly => self.monthly(&mut dates),
                    Frequency::Weekly => self.weekly(&mut dates),
                    _ => {
                        let date = self.period.date();
                        if self.limit(date) {
                            dates.push(date);
                        }
                    }
                }
                let time = r.start.time();
                dates.into_iter().map(|d| d.to_datetime(time)).collect()
            }
        };
        datetimes.sort();
        datetimes.dedup();
        if !r.by_set_pos.is_empty() {
            let len = datetimes.len();
            let mut position = 0;
            datetimes.retain(|_| {
                let keep = self.satisfies_by_set_pos(position, len);
                position += 1;
                keep
            });
        }
        datetimes.reverse();
        set.extend(datetimes);
    }

    /// Populate `dates` according to this rule at a YEARLY frequency.
    fn yearly(&self, dates: &mut Vec<Date>) {
        let r = self.rule;
        let year = self.period.date().year();
        let first = self.period.date().first_of_year();
        let last = first.last_of_year();
        if !r.by_year_day.is_empty() {
            let days_in_year = first.days_in_year();
            for &yd in r.by_year_day.iter() {
                let yd = if yd < 0 { days_in_year + yd + 1 } else { yd };
                if let Ok(date) = first.with().day_of_year(yd).build() {
                    if self.limit(date) {
                        dates.push(date);
                    }
                }
            }
        } else if !r.by_month.is_empty() {
            for &month in r.by_month.iter() {
                self.month(year, month, dates);
            }
        } else if !r.by_week_day.is_empty() {
            for wd in r.by_week_day.iter() {
                for date in wd.dates_between(first, last) {
                    if self.satisfies_by_month_day(date) {
                        dates.push(date);
                    }
                }
            }
        } else if !r.by_month_day.is_empty() {
            for month in 1..=12 {
                self.month(year, month, dates);
            }
        } else {
            self.month(year, r.start.month(), dates);
        }
    }

    /// Populate `dates` according to this rule at a MONTHLY frequency.
    fn monthly(&self, dates: &mut Vec<Date>) {
        let date = self.period.date();
        if !self.satisfies_by_month(date) {
            return;
        }
        self.month(date.year(), date.month(), dates);
    }

    /// Populate `dates` according to this rule at a WEEKLY frequency.
    fn weekly(&self, dates: &mut Vec<Date>) {
        let r = self.rule;
        for date in week_of(self.period.date()) {
            let weekday_ok = if r.by_week_day.is_empty() {
                date.weekday() == r.start.weekday()
            } else {
                self.satisfies_by_week_day(date)
            };
            if weekday_ok && self.satisfies_by_month(date) {
                dates.push(date);
            }
        }
    }

    /// Expand the days of a single month, using BYMONTHDAY and BYDAY when
    /// present and the day of the start otherwise.
    fn month(&self, year: i16, month: i8, dates: &mut Vec<Date>) {
        let r = self.rule;
        let Ok(first) = Date::new(year, month, 1) else { return };
        let last = first.last_of_month();
        if !r.by_month_day.is_empty() {
            for &md in r.by_month_day.iter() {
                let Some(date) = resolve_month_day(first, md) else {
                    continue;
                };
                if r.by_week_day.is_empty()
                    || r.by_week_day.iter().any(|wd| {
                        wd.dates_between(first, last).contains(&date)
                    })
                {
                    dates.push(date);
                }
            }
        } else if !r.by_week_day.is_empty() {
            for wd in r.by_week_day.iter() {
                dates.extend(wd.dates_between(first, last));
            }
        } else if let Ok(date) = Date::new(year, month, r.start.day()) {
            dates.push(date);
        }
    }

    /// Returns true when the given date satisfies all of the limiting
    /// rules that apply at DAILY and sub-daily frequencies.
    fn limit(&self, date: Date) -> bool {
        self.satisfies_by_month(date)
            && self.satisfies_by_month_day(date)
            && self.satisfies_by_week_day(date)
    }

    fn satisfies_by_month(&self, date: Date) -> bool {
        let r = self.rule;
        r.by_month.is_empty() || r.by_month.contains(&date.month())
    }

    fn satisfies_by_month_day(&self, date: Date) -> bool {
        let r = self.rule;
        if r.by_month_day.is_empty() {
            return true;
        }
        let first = date.first_of_month();
        r.by_month_day
            .iter()
            .any(|&md| resolve_month_day(first, md) == Some(date))
    }

    fn satisfies_by_week_day(&self, date: Date) -> bool {
        let r = self.rule;
        r.by_week_day.is_empty()
            || r.by_week_day.iter().any(|wd| wd.weekday() == date.weekday())
    }

    fn satisfies_by_set_pos(&self, position: usize, len: usize) -> bool {
        let Ok(position) = i32::try_from(position) else { return false };
        let Ok(len) = i32::try_from(len) else { return false };
        self.rule.by_set_pos.iter().any(|&pos| {
            if pos > 0 { pos - 1 == position } else { len + pos == position }
        })
    }
}

/// Resolves a possibly negative BYMONTHDAY value to a date in the month
/// beginning at `first`. Days that don't exist in the month are `None`.
fn resolve_month_day(first: Date, md: i8) -> Option<Date> {
    let day = if md < 0 { first.days_in_month() + md + 1 } else { md };
    if day < 1 {
        return None;
    }
    Date::new(first.year(), first.month(), day).ok()
}

#[derive(Clone, Debug)]
pub struct RecurrenceIter<'r> {
    /// The recurrence rule that we're generating civil datetimes for.
    rule: &'r RecurrenceRule,
    /// The datetimes of the current period, latest first.
    set: Vec<DateTime>,
    /// The index of the next period to expand.
    ///
    /// When this is `None`, no more periods will be expanded.
    period: Option<i64>,
    /// How many datetimes have been emitted so far, for COUNT.
    emitted: u32,
    /// When set, no period starting after this datetime is expanded.
    horizon: Option<DateTime>,
}

impl<'r> RecurrenceIter<'r> {
    /// Stop iteration once a period would start after `horizon`.
    ///
    /// Since periods are visited in order and every datetime produced by a
    /// period is on or after its start, this never drops a datetime that is
    /// on or before `horizon`. It exists to bound the work done for rules
    /// that match rarely or never.
    pub fn bounded(self, horizon: DateTime) -> RecurrenceIter<'r> {
        RecurrenceIter { horizon: Some(horizon), ..self }
    }

    fn is_exhausted(&self) -> bool {
        self.rule.inner.count.is_some_and(|count| self.emitted >= count)
    }

    fn finish(&mut self) {
        self.set.clear();
        self.period = None;
    }
}

impl<'r> Iterator for RecurrenceIter<'r> {
    type Item = DateTime;

    fn next(&mut self) -> Option<DateTime> {
        let rule: &'r RecurrenceRule = self.rule;
        let r = &rule.inner;
        loop {
            if self.is_exhausted() {
                self.finish();
                return None;
            }
            if let Some(dt) = self.set.pop() {
                // The first period may expand to datetimes before the start
                // of the rule. Those are never part of the sequence.
                if dt < r.start {
                    continue;
                }
                if r.until.is_some_and(|until| dt > until) {
                    self.finish();
                    return None;
                }
                self.emitted += 1;
                return Some(dt);
            }
            let n = self.period?;
            let Some(start) = rule.period_start(n) else {
                log::trace!("recurrence rule period {n} is out of range");
                self.finish();
                return None;
            };
            let past_until = r.until.is_some_and(|until| start > until);
            let past_horizon = self.horizon.is_some_and(|h| start > h);
            if past_until || past_horizon {
                self.finish();
                return None;
            }
            self.period = n.checked_add(1);
            Expander { rule: r, period: start }.expand(&mut self.set);
        }
    }
}

impl<'r> std::iter::FusedIterator for RecurrenceIter<'r> {}

/// A builder for constructing a valid recurrence rule.
#[derive(Clone, Debug)]
pub struct RecurrenceRuleBuilder {
    freq: Frequency,
    start: DateTime,
    until: Option<DateTime>,
    count: Option<u32>,
    interval: i32,
    by_month: Vec<i8>,
    by_year_day: Vec<i16>,
    by_month_day: Vec<i8>,
    by_week_day: Vec<ByWeekday>,
    by_set_pos: Vec<i32>,
    week_start: Weekday,
}

impl RecurrenceRuleBuilder {
    fn new(freq: Frequency, start: DateTime) -> RecurrenceRuleBuilder {
        RecurrenceRuleBuilder {
            freq,
            start,
            until: None,
            count: None,
            interval: 1,
            by_month: vec![],
            by_year_day: vec![],
            by_month_day: vec![],
            by_week_day: vec![],
            by_set_pos: vec![],
            week_start: Weekday::Monday,
        }
    }

    pub fn build(&self) -> anyhow::Result<RecurrenceRule> {
        fn sort_and_dedup<T: Clone + Ord>(slice: &[T]) -> Box<[T]> {
            let mut vec = slice.to_vec();
            vec.sort();
            vec.dedup();
            vec.into_boxed_slice()
        }

        anyhow::ensure!(
            self.interval >= 1,
            "recurrence interval must be positive, but got {}",
            self.interval,
        );
        anyhow::ensure!(
            self.until.is_none() || self.count.is_none(),
            "COUNT and UNTIL cannot both be set on a recurrence rule",
        );
        for &month in self.by_month.iter() {
            anyhow::ensure!(
                (1..=12).contains(&month),
                "BYMONTH value `{month}` is not in the range 1..=12",
            );
        }
        for &md in self.by_month_day.iter() {
            anyhow::ensure!(
                md != 0 && (-31..=31).contains(&md),
                "BYMONTHDAY value `{md}` is not in the range \
                 -31..=-1 or 1..=31",
            );
        }
        for &yd in self.by_year_day.iter() {
            anyhow::ensure!(
                yd != 0 && (-366..=366).contains(&yd),
                "BYYEARDAY value `{yd}` is not in the range \
                 -366..=-1 or 1..=366",
            );
        }
        for &pos in self.by_set_pos.iter() {
            anyhow::ensure!(
                pos != 0 && (-366..=366).contains(&pos),
                "BYSETPOS value `{pos}` is not in the range \
                 -366..=-1 or 1..=366",
            );
        }
        if !self.by_month_day.is_empty() {
            anyhow::ensure!(
                !matches!(self.freq, Frequency::Weekly),
                "BYMONTHDAY cannot be used with WEEKLY frequency",
            );
        }
        if !self.by_year_day.is_empty() {
            anyhow::ensure!(
                matches!(self.freq, Frequency::Yearly),
                "BYYEARDAY can only be used with YEARLY frequency",
            );
        }
        if !self.by_set_pos.is_empty() {
            anyhow::ensure!(
                !self.by_month.is_empty()
                    || !self.by_month_day.is_empty()
                    || !self.by_year_day.is_empty()
                    || !self.by_week_day.is_empty(),
                "BYSETPOS requires at least one other BYxxx rule part",
            );
        }
        for wd in self.by_week_day.iter() {
            let ByWeekday::Numbered { nth, .. } = *wd else { continue };
            // Numbered weekdays are relative to the month when BYMONTH is
            // present at YEARLY frequency, in which case the year-wide
            // range doesn't apply.
            let (monthly, limit) = match self.freq {
                Frequency::Monthly => (true, 5),
                Frequency::Yearly if !self.by_month.is_empty() => (true, 5),
                Frequency::Yearly => (false, 53),
                _ => anyhow::bail!(
                    "numbered weekday `{wd}` can only be used with \
                     MONTHLY or YEARLY frequency",
                ),
            };
            anyhow::ensure!(
                nth != 0 && (-limit..=limit).contains(&nth),
                "numbered weekday `{wd}` is out of range for a {} period",
                if monthly { "monthly" } else { "yearly" },
            );
            anyhow::ensure!(
                self.by_year_day.is_empty(),
                "numbered weekday `{wd}` cannot be combined with BYYEARDAY",
            );
        }
        let inner = RecurrenceRuleInner {
            freq: self.freq,
            start: self.start,
            until: self.until,
            count: self.count,
            interval: self.interval,
            by_month: sort_and_dedup(&self.by_month),
            by_year_day: sort_and_dedup(&self.by_year_day),
            by_month_day: sort_and_dedup(&self.by_month_day),
            by_week_day: sort_and_dedup(&self.by_week_day),
            by_set_pos: sort_and_dedup(&self.by_set_pos),
            week_start: self.week_start,
        };
        Ok(RecurrenceRule { inner: Arc::new(inner) })
    }

    pub fn until(&mut self, until: DateTime) -> &mut RecurrenceRuleBuilder {
        self.until = Some(until);
        self
    }

    pub fn count(&mut self, count: u32) -> &mut RecurrenceRuleBuilder {
        self.count = Some(count);
        self
    }

    pub fn interval(&mut self, increment: i32) -> &mut RecurrenceRuleBuilder {
        self.interval = increment;
        self
    }

    pub fn by_month(&mut self, month: i8) -> &mut RecurrenceRuleBuilder {
        self.by_month.push(month);
        self
    }

    pub fn by_year_day(&mut self, day: i16) -> &mut RecurrenceRuleBuilder {
        self.by_year_day.push(day);
        self
    }

    pub fn by_month_day(&mut self, day: i8) -> &mut RecurrenceRuleBuilder {
        self.by_month_day.push(day);
        self
    }

    pub fn by_week_day(
        &mut self,
        weekday: impl Into<ByWeekday>,
    ) -> &mut RecurrenceRuleBuilder {
        self.by_week_day.push(weekday.into());
        self
    }

    pub fn by_set_position(
        &mut self,
        position: i32,
    ) -> &mut RecurrenceRuleBuilder {
        self.by_set_pos.push(position);
        self
    }

    pub fn week_start(
        &mut self,
        weekday: Weekday,
    ) -> &mut RecurrenceRuleBuilder {
        self.week_start = weekday;
        self
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Frequency {
    Yearly,
    Monthly,
    Weekly,
    Daily,
    Hourly,
    Minutely,
    Secondly,
}

impl Frequency {
    fn as_str(&self) -> &'static str {
        match *self {
            Frequency::Yearly => "YEARLY",
            Frequency::Monthly => "MONTHLY",
            Frequency::Weekly => "WEEKLY",
            Frequency::Daily => "DAILY",
            Frequency::Hourly => "HOURLY",
            Frequency::Minutely => "MINUTELY",
            Frequency::Secondly => "SECONDLY",
        }
    }
}

impl std::str::FromStr for Frequency {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Frequency> {
        use self::Frequency::*;

        let freq = match &*s.trim().to_ascii_uppercase() {
            "YEARLY" => Yearly,
            "MONTHLY" => Monthly,
            "WEEKLY" => Weekly,
            "DAILY" => Daily,
            "HOURLY" => Hourly,
            "MINUTELY" => Minutely,
            "SECONDLY" => Secondly,
            unk => anyhow::bail!("unrecognized frequency: `{unk}`"),
        };
        Ok(freq)
    }
}

impl std::fmt::Display for Frequency {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A type describing BYDAY inputs.
///
/// This implements `Ord` even though the actual order of weekdays cannot be
/// determined unless the _start_ of the week is known. It exists to make it
/// easy to sort and de-duplicate collections containing a `ByWeekday`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ByWeekday {
    Any(Weekday),
    Numbered { nth: i8, weekday: Weekday },
}

impl ByWeekday {
    fn weekday(&self) -> Weekday {
        match *self {
            ByWeekday::Any(weekday) => weekday,
            ByWeekday::Numbered { weekday, .. } => weekday,
        }
    }

    /// Returns the dates matching this weekday between `first` and `last`
    /// (inclusive).
    ///
    /// When this is a numbered weekday, a positive number counts from
    /// `first` and a negative number counts back from `last`. At most one
    /// date is returned in that case.
    fn dates_between(&self, first: Date, last: Date) -> Vec<Date> {
        let weekday = self.weekday();
        let mut all = vec![];
        let mut cur = if first.weekday() == weekday {
            Some(first)
        } else {
            first.nth_weekday(1, weekday).ok()
        };
        while let Some(date) = cur.filter(|&d| d <= last) {
            all.push(date);
            cur = date.nth_weekday(1, weekday).ok();
        }
        let ByWeekday::Numbered { nth, .. } = *self else { return all };
        let index = if nth > 0 {
            usize::try_from(nth - 1).ok()
        } else {
            all.len().checked_sub(usize::from(nth.unsigned_abs()))
        };
        index.and_then(|i| all.get(i).copied()).into_iter().collect()
    }
}

impl From<Weekday> for ByWeekday {
    fn from(weekday: Weekday) -> ByWeekday {
        ByWeekday::Any(weekday)
    }
}

impl From<(i8, Weekday)> for ByWeekday {
    fn from((nth, weekday): (i8, Weekday)) -> ByWeekday {
        ByWeekday::Numbered { nth, weekday }
    }
}

impl Ord for ByWeekday {
    fn cmp(&self, rhs: &ByWeekday) -> Ordering {
        match (*self, *rhs) {
            (ByWeekday::Any(lhs), ByWeekday::Any(rhs)) => {
                lhs.to_monday_one_offset().cmp(&rhs.to_monday_one_offset())
            }
            (
                ByWeekday::Numbered { nth: lhs_nth, weekday: lhs_weekday },
                ByWeekday::Numbered { nth: rhs_nth, weekday: rhs_weekday },
            ) => {
                let lhs = (lhs_nth, lhs_weekday.to_monday_one_offset());
                let rhs = (rhs_nth, rhs_weekday.to_monday_one_offset());
                lhs.cmp(&rhs)
            }
            (ByWeekday::Any(_), ByWeekday::Numbered { .. }) => Ordering::Less,
            (ByWeekday::Numbered { .. }, ByWeekday::Any(_)) => {
                Ordering::Greater
            }
        }
    }
}

impl PartialOrd for ByWeekday {
    fn partial_cmp(&self, rhs: &ByWeekday) -> Option<Ordering> {
        Some(self.cmp(rhs))
    }
}

impl std::str::FromStr for ByWeekday {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<ByWeekday> {
        let s = s.trim();
        let split = s.len().checked_sub(2).filter(|&i| s.is_char_boundary(i));
        let Some(split) = split else {
            anyhow::bail!("invalid BYDAY value `{s}`");
        };
        let (nth, weekday) = s.split_at(split);
        let weekday = parse_weekday(weekday)?;
        if nth.is_empty() {
            return Ok(ByWeekday::Any(weekday));
        }
        let nth = nth.trim_start_matches('+').parse().with_context(|| {
            format!("failed to parse `{nth}` as integer weekday number")
        })?;
        Ok(ByWeekday::Numbered { nth, weekday })
    }
}

impl std::fmt::Display for ByWeekday {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        if let ByWeekday::Numbered { nth, .. } = *self {
            write!(f, "{nth}")?;
        }
        f.write_str(match self.weekday() {
            Weekday::Sunday => "SU",
            Weekday::Monday => "MO",
            Weekday::Tuesday => "TU",
            Weekday::Wednesday => "WE",
            Weekday::Thursday => "TH",
            Weekday::Friday => "FR",
            Weekday::Saturday => "SA",
        })
    }
}

/// Parses a two letter RFC 5545 weekday, e.g., `MO`.
fn parse_weekday(s: &str) -> anyhow::Result<Weekday> {
    let wd = match &*s.trim().to_ascii_uppercase() {
        "SU" => Weekday::Sunday,
        "MO" => Weekday::Monday,
        "TU" => Weekday::Tuesday,
        "WE" => Weekday::Wednesday,
        "TH" => Weekday::Thursday,
        "FR" => Weekday::Friday,
        "SA" => Weekday::Saturday,
        unk => anyhow::bail!("unrecognized weekday `{unk}`"),
    };
    Ok(wd)
}

fn parse_int<T>(name: &str, value: &str) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    <T as std::str::FromStr>::Err: std::error::Error + Send + Sync + 'static,
{
    let value = value.trim();
    value
        .trim_start_matches('+')
        .parse()
        .with_context(|| format!("invalid {name} value `{value}`"))
}

/// Parses an `UNTIL` value into a civil datetime in the zone `tz`.
///
/// A date is inclusive through the end of that day. A UTC datetime (ending
/// in `Z`) is converted into `tz`. Anything else is taken as a civil
/// datetime in `tz`.
fn parse_until(value: &str, tz: &TimeZone) -> anyhow::Result<DateTime> {
    let value = value.trim();
    if value.len() == 8 {
        let date = Date::strptime("%Y%m%d", value)?;
        return Ok(date.to_datetime(Time::MAX));
    }
    if let Some(utc) = value.strip_suffix(['Z', 'z']) {
        let dt = DateTime::strptime("%Y%m%dT%H%M%S", utc)?;
        let zdt = dt.to_zoned(TimeZone::UTC)?;
        return Ok(zdt.with_time_zone(tz.clone()).datetime());
    }
    Ok(DateTime::strptime("%Y%m%dT%H%M%S", value)?)
}
