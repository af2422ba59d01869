use std::{io::Read, path::PathBuf, time::Duration};

use {
    anyhow::Context,
    ical::{
        IcalParser, parser::ical::component::IcalEvent, property::Property,
    },
    jiff::{
        Span, ToSpan,
        civil::{Date, DateTime},
        tz::TimeZone,
    },
};

use crate::{
    calendar::{Calendar, Event, When},
    ical::RecurrenceRule,
};

/// How long to wait on a remote calendar before giving up.
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Where to read a calendar feed from.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Source {
    /// A file on disk.
    Path(PathBuf),
    /// The standard input of this process, given as `-`.
    Stdin,
    /// An `http`, `https` or `webcal` URL.
    Url(String),
}

impl Source {
    /// Reads the raw contents of this source.
    pub fn read(&self) -> anyhow::Result<String> {
        match *self {
            Source::Path(ref path) => std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display())),
            Source::Stdin => {
                let mut data = String::new();
                std::io::stdin()
                    .read_to_string(&mut data)
                    .context("failed to read <stdin>")?;
                Ok(data)
            }
            Source::Url(ref url) => fetch(url),
        }
    }
}

impl std::str::FromStr for Source {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Source> {
        if s.is_empty() {
            anyhow::bail!("calendar source cannot be empty");
        }
        if s == "-" {
            return Ok(Source::Stdin);
        }
        let lower = s.to_ascii_lowercase();
        let is_url = ["http://", "https://", "webcal://"]
            .iter()
            .any(|scheme| lower.starts_with(scheme));
        if is_url {
            return Ok(Source::Url(s.to_string()));
        }
        Ok(Source::Path(PathBuf::from(s)))
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match *self {
            Source::Path(ref path) => write!(f, "{}", path.display()),
            Source::Stdin => write!(f, "<stdin>"),
            Source::Url(ref url) => write!(f, "{url}"),
        }
    }
}

/// Fetches a remote calendar. `webcal` URLs are fetched over `https`.
fn fetch(url: &str) -> anyhow::Result<String> {
    let url = match url.get(..9) {
        Some(scheme) if scheme.eq_ignore_ascii_case("webcal://") => {
            format!("https://{}", &url[9..])
        }
        _ => url.to_string(),
    };
    log::debug!("fetching calendar from {url}");
    let response = ureq::get(&url)
        .timeout(FETCH_TIMEOUT)
        .call()
        .with_context(|| format!("failed to fetch {url}"))?;
    response
        .into_string()
        .with_context(|| format!("failed to read response body from {url}"))
}

/// Reads and parses every source, in order.
///
/// `local` is the time zone used for floating datetimes and unknown time
/// zone identifiers.
pub fn load(
    sources: &[Source],
    local: &TimeZone,
) -> anyhow::Result<Vec<Calendar>> {
    let mut calendars = vec![];
    for source in sources.iter() {
        let data = source.read()?;
        let parsed = parse(&source.to_string(), &data, local)
            .with_context(|| format!("failed to parse calendar {source}"))?;
        for cal in parsed.iter() {
            log::info!(
                "loaded calendar `{}` with {} event(s) from {source}",
                cal.name(),
                cal.events().len(),
            );
        }
        calendars.extend(parsed);
    }
    Ok(calendars)
}

/// Parses iCalendar data into calendars.
///
/// A calendar without an `X-WR-CALNAME` is named after `default_name`.
/// Events that can't be used are skipped with a warning.
pub fn parse(
    default_name: &str,
    data: &str,
    local: &TimeZone,
) -> anyhow::Result<Vec<Calendar>> {
    let mut calendars = vec![];
    for result in IcalParser::new(data.as_bytes()) {
        let ical = result.context("invalid iCalendar data")?;
        let name = find(&ical.properties, "X-WR-CALNAME")
            .and_then(|p| p.value.as_deref())
            .map(unescape)
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| default_name.to_string());
        let mut events = vec![];
        for vevent in ical.events.iter() {
            match event(vevent, local) {
                Ok(event) => events.push(event),
                Err(err) => {
                    let uid = find(&vevent.properties, "UID")
                        .and_then(|p| p.value.as_deref())
                        .unwrap_or("<unknown>");
                    log::warn!(
                        "skipping event `{uid}` in calendar `{name}`: {err:#}",
                    );
                }
            }
        }
        calendars.push(Calendar::new(name, events));
    }
    anyhow::ensure!(
        !calendars.is_empty(),
        "no VCALENDAR found in iCalendar data",
    );
    Ok(calendars)
}

/// Converts a single VEVENT into an event.
fn event(vevent: &IcalEvent, local: &TimeZone) -> anyhow::Result<Event> {
    let props = &vevent.properties;
    let dtstart = find(props, "DTSTART").context("missing DTSTART")?;
    let start = when(dtstart, local).context("invalid DTSTART")?;
    let mut event = Event::new(start.clone());
    if let Some(uid) = find(props, "UID").and_then(|p| p.value.as_deref()) {
        event = event.with_uid(uid.trim());
    }
    if let Some(summary) =
        find(props, "SUMMARY").and_then(|p| p.value.as_deref())
    {
        event = event.with_summary(unescape(summary));
    }

    let end = match find(props, "DTEND") {
        None => None,
        Some(prop) => Some(when(prop, local).context("invalid DTEND")?),
    };
    let duration_value =
        find(props, "DURATION").and_then(|p| p.value.as_deref());
    let duration = match duration_value {
        None => None,
        Some(value) => Some(
            value
                .trim()
                .parse::<Span>()
                .with_context(|| format!("invalid DURATION `{value}`"))?,
        ),
    };
    match (end, duration) {
        (_, Some(duration)) => event = event.with_duration(duration),
        (Some(end), None) => {
            let end = match (&start, end) {
                (&When::Date(_), When::DateTime(zdt)) => {
                    When::Date(zdt.date())
                }
                (_, end) => end,
            };
            anyhow::ensure!(
                end.civil_in(&start) >= start.civil(),
                "event ends at {end} before it starts at {start}",
            );
            event = event.with_end(end);
        }
        // RFC 5545 says an event without an end lasts one day when it
        // starts on a date, and takes no time otherwise.
        (None, None) => {
            let duration = match start {
                When::Date(_) => 1.day(),
                When::DateTime(_) => Span::new(),
            };
            event = event.with_duration(duration);
        }
    }

    let frame_tz = event.time_zone().unwrap_or(local).clone();
    if let Some(prop) = find(props, "RRULE") {
        let value = prop.value.as_deref().unwrap_or("");
        let rule = RecurrenceRule::parse(value, start.civil(), &frame_tz)
            .with_context(|| format!("invalid RRULE `{value}`"))?;
        event = event.with_rule(rule);
    }
    for prop in props.iter().filter(|p| is_named(p, "RDATE")) {
        anyhow::ensure!(
            !has_param(prop, "VALUE", "PERIOD"),
            "RDATE periods are not supported",
        );
        for rdate in whens(prop, local).context("invalid RDATE")? {
            event = event.with_rdate(rdate.civil_in(&start));
        }
    }
    for prop in props.iter().filter(|p| is_named(p, "EXDATE")) {
        for exdate in whens(prop, local).context("invalid EXDATE")? {
            event = event.with_exdate(exdate.civil_in(&start));
        }
    }
    Ok(event)
}

/// Returns the first property with the given name.
fn find<'a>(props: &'a [Property], name: &str) -> Option<&'a Property> {
    props.iter().find(|p| is_named(p, name))
}

fn is_named(prop: &Property, name: &str) -> bool {
    prop.name.eq_ignore_ascii_case(name)
}

/// Returns the values of the named parameter, if present.
fn param<'a>(prop: &'a Property, name: &str) -> Option<&'a [String]> {
    prop.params
        .as_ref()?
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, values)| values.as_slice())
}

fn has_param(prop: &Property, name: &str, value: &str) -> bool {
    param(prop, name)
        .is_some_and(|vs| vs.iter().any(|v| v.eq_ignore_ascii_case(value)))
}

/// Parses a `DTSTART` or `DTEND` style property.
fn when(prop: &Property, local: &TimeZone) -> anyhow::Result<When> {
    let mut whens = whens(prop, local)?;
    anyhow::ensure!(whens.len() == 1, "expected exactly one value");
    Ok(whens.remove(0))
}

/// Parses a property holding a comma separated list of dates or datetimes.
fn whens(prop: &Property, local: &TimeZone) -> anyhow::Result<Vec<When>> {
    let value = prop.value.as_deref().unwrap_or("").trim();
    anyhow::ensure!(!value.is_empty(), "value is empty");
    let is_date = has_param(prop, "VALUE", "DATE");
    let tz = match param(prop, "TZID").and_then(|vs| vs.first()) {
        None => local.clone(),
        Some(tzid) => time_zone(tzid, local),
    };
    value
        .split(',')
        .map(|v| {
            parse_when(v.trim(), is_date, &tz)
                .with_context(|| format!("invalid date or datetime `{v}`"))
        })
        .collect()
}

/// Looks up a `TZID`, falling back to `local` when it isn't known.
fn time_zone(tzid: &str, local: &TimeZone) -> TimeZone {
    let tzid = tzid.trim().trim_matches('"');
    match TimeZone::get(tzid) {
        Ok(tz) => tz,
        Err(err) => {
            log::warn!(
                "unrecognized time zone `{tzid}`, using local time zone \
                 instead: {err}",
            );
            local.clone()
        }
    }
}

/// Parses a single iCalendar date or datetime value.
///
/// Datetimes ending in `Z` are in UTC. Everything else is a civil datetime
/// in `tz`.
fn parse_when(
    value: &str,
    is_date: bool,
    tz: &TimeZone,
) -> anyhow::Result<When> {
    if is_date || value.len() == 8 {
        return Ok(When::Date(Date::strptime("%Y%m%d", value)?));
    }
    if let Some(utc) = value.strip_suffix(['Z', 'z']) {
        let dt = DateTime::strptime("%Y%m%dT%H%M%S", utc)?;
        return Ok(When::DateTime(dt.to_zoned(TimeZone::UTC)?));
    }
    let dt = DateTime::strptime("%Y%m%dT%H%M%S", value)?;
    Ok(When::DateTime(dt.to_zoned(tz.clone())?))
}

/// Undoes the escaping of iCalendar TEXT values and trims the result.
fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') | Some('N') => out.push('\n'),
            Some(ch) => out.push(ch),
            None => out.push('\\'),
        }
    }
    out.trim().to_string()
}
