//! Calendar feed parsing on top of the icalendar crate's parser.
//!
//! Produces one [`RawEventDefinition`] per series: masters carry their
//! `RECURRENCE-ID` overrides, and overrides without a master in the same
//! document are returned as standalone events.

use super::models::{RawDate, RawEventDefinition};
use crate::error::{malformed_feed, BotResult};
use chrono::{NaiveDate, NaiveDateTime};
use icalendar::parser::{read_calendar, unfold, Component, Property};
use icalendar::{CalendarDateTime, DatePerhapsTime};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Parse a raw calendar document into event definitions
pub fn parse_calendar(source_name: &str, content: &str) -> BotResult<Vec<RawEventDefinition>> {
    let unfolded = unfold(content);
    let calendar = read_calendar(&unfolded).map_err(|e| malformed_feed(source_name, e))?;

    let mut masters: Vec<RawEventDefinition> = Vec::new();
    let mut overrides: Vec<RawEventDefinition> = Vec::new();

    for vevent in calendar.components.iter().filter(|c| c.name == "VEVENT") {
        match parse_vevent(vevent) {
            Some(def) if def.recurrence_id.is_some() => overrides.push(def),
            Some(def) => masters.push(def),
            None => warn!("Skipping VEVENT without UID in {}", source_name),
        }
    }

    let index: HashMap<String, usize> = masters
        .iter()
        .enumerate()
        .map(|(i, m)| (m.uid.clone(), i))
        .collect();

    for ov in overrides {
        match index.get(&ov.uid) {
            Some(&i) => masters[i].overrides.push(ov),
            None if ov.cancelled => {
                debug!("Dropping cancelled orphan override of '{}'", ov.uid);
            }
            None => {
                debug!("Treating orphan override of '{}' as standalone", ov.uid);
                masters.push(RawEventDefinition {
                    rrule: None,
                    recurrence_id: None,
                    ..ov
                });
            }
        }
    }

    Ok(masters)
}

fn parse_vevent(vevent: &Component<'_>) -> Option<RawEventDefinition> {
    let uid = vevent.find_prop("UID")?.val.to_string();

    let text = |name: &str| {
        vevent
            .find_prop(name)
            .map(|p| unescape_text(p.val.as_ref()))
            .filter(|v| !v.trim().is_empty())
    };

    let date_prop = |name: &str| {
        vevent
            .find_prop(name)
            .and_then(|p| DatePerhapsTime::try_from(p).ok())
            .map(to_raw_date)
    };

    let cancelled = vevent
        .find_prop("STATUS")
        .map(|p| p.val.as_ref().eq_ignore_ascii_case("CANCELLED"))
        .unwrap_or(false);

    let exdates = vevent
        .properties
        .iter()
        .filter(|p| p.name == "EXDATE")
        .flat_map(parse_exdate_property)
        .collect();

    Some(RawEventDefinition {
        uid,
        summary: text("SUMMARY"),
        description: text("DESCRIPTION"),
        location: text("LOCATION"),
        start: date_prop("DTSTART"),
        end: date_prop("DTEND"),
        rrule: vevent.find_prop("RRULE").map(|p| p.val.to_string()),
        exdates,
        recurrence_id: date_prop("RECURRENCE-ID"),
        cancelled,
        overrides: Vec::new(),
    })
}

fn to_raw_date(dpt: DatePerhapsTime) -> RawDate {
    match dpt {
        DatePerhapsTime::Date(d) => RawDate::Date(d),
        DatePerhapsTime::DateTime(cal_dt) => match cal_dt {
            CalendarDateTime::Utc(dt) => RawDate::Utc(dt),
            CalendarDateTime::Floating(naive) => RawDate::Floating(naive),
            CalendarDateTime::WithTimezone { date_time, tzid } => RawDate::Zoned {
                datetime: date_time,
                tzid,
            },
        },
    }
}

/// EXDATE may carry TZID or VALUE=DATE parameters and comma-separated values
fn parse_exdate_property(prop: &Property<'_>) -> Vec<RawDate> {
    let tzid = prop
        .params
        .iter()
        .find(|p| p.key == "TZID")
        .and_then(|p| p.val.as_ref().map(|v| v.to_string()));

    let is_date = prop
        .params
        .iter()
        .any(|p| p.key == "VALUE" && p.val.as_ref().map(|v| v.as_ref()) == Some("DATE"));

    prop.val
        .as_ref()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| {
            let parsed = if is_date || s.len() == 8 {
                NaiveDate::parse_from_str(s, "%Y%m%d").ok().map(RawDate::Date)
            } else if let Some(tz) = &tzid {
                NaiveDateTime::parse_from_str(s, "%Y%m%dT%H%M%S")
                    .ok()
                    .map(|datetime| RawDate::Zoned {
                        datetime,
                        tzid: tz.clone(),
                    })
            } else if let Some(utc) = s.strip_suffix('Z') {
                NaiveDateTime::parse_from_str(utc, "%Y%m%dT%H%M%S")
                    .ok()
                    .map(|dt| RawDate::Utc(dt.and_utc()))
            } else {
                NaiveDateTime::parse_from_str(s, "%Y%m%dT%H%M%S")
                    .ok()
                    .map(RawDate::Floating)
            };
            if parsed.is_none() {
                warn!("Ignoring unparsable EXDATE value '{}'", s);
            }
            parsed
        })
        .collect()
}

/// Decode RFC 5545 TEXT escapes
fn unescape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') | Some('N') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}
