use super::models::{
    CalendarEventDefinition, Cancellation, ExceptionOverride, RawDate, RawEventDefinition,
    ZonedInstant,
};
use crate::config::NaiveTimePolicy;
use crate::error::{malformed_timestamp, BotResult};
use chrono::{DateTime, Duration, LocalResult, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

/// Convert a feed date/datetime into an absolute instant plus its authored zone.
///
/// Date-only values become midnight UTC. Floating values follow `policy`.
/// Zoned values keep their zone so recurrence rules can be evaluated in it.
pub fn normalize(raw: &RawDate, policy: NaiveTimePolicy) -> BotResult<ZonedInstant> {
    match raw {
        RawDate::Date(date) => {
            let midnight = date
                .and_hms_opt(0, 0, 0)
                .ok_or_else(|| malformed_timestamp(&format!("Invalid date {}", date)))?;
            Ok(ZonedInstant {
                utc: midnight.and_utc(),
                zone: Tz::UTC,
            })
        }
        RawDate::Floating(naive) => match policy {
            NaiveTimePolicy::Utc => Ok(ZonedInstant {
                utc: naive.and_utc(),
                zone: Tz::UTC,
            }),
            NaiveTimePolicy::Local(zone) => localize(naive, zone),
        },
        RawDate::Utc(dt) => Ok(ZonedInstant {
            utc: *dt,
            zone: Tz::UTC,
        }),
        RawDate::Zoned { datetime, tzid } => {
            let zone: Tz = tzid
                .parse()
                .map_err(|_| malformed_timestamp(&format!("Unknown TZID '{}'", tzid)))?;
            localize(datetime, zone)
        }
    }
}

/// Resolve a wall-clock time in `zone`. Ambiguous times take the earlier instant.
pub(crate) fn localize(naive: &NaiveDateTime, zone: Tz) -> BotResult<ZonedInstant> {
    let resolved = match zone.from_local_datetime(naive) {
        LocalResult::Single(dt) => dt,
        LocalResult::Ambiguous(earliest, _) => earliest,
        LocalResult::None => {
            return Err(malformed_timestamp(&format!(
                "{} does not exist in {}",
                naive,
                zone.name()
            )))
        }
    };
    Ok(ZonedInstant {
        utc: resolved.with_timezone(&Utc),
        zone,
    })
}

/// Build a normalized definition from a parsed VEVENT and its overrides.
///
/// Broken overrides are dropped with a warning; a broken master start/end fails the whole definition.
pub fn build_definition(
    raw: &RawEventDefinition,
    policy: NaiveTimePolicy,
) -> BotResult<CalendarEventDefinition> {
    let raw_start = raw
        .start
        .as_ref()
        .ok_or_else(|| malformed_timestamp(&format!("Event '{}' has no DTSTART", raw.uid)))?;
    let start = normalize(raw_start, policy)?;
    let end = resolve_end(raw_start, &start, raw.end.as_ref(), policy)?;
    if end.utc < start.utc {
        return Err(malformed_timestamp(&format!(
            "Event '{}' ends before it starts",
            raw.uid
        )));
    }

    let cancelled = if raw.cancelled {
        Cancellation::EntireSeries
    } else {
        let mut ids = BTreeSet::new();
        for exdate in &raw.exdates {
            match normalize(exdate, policy) {
                Ok(instant) => {
                    ids.insert(instant.utc);
                }
                Err(e) => warn!("Ignoring EXDATE on '{}': {}", raw.uid, e),
            }
        }
        for ov in raw.overrides.iter().filter(|ov| ov.cancelled) {
            if let Some(id) = ov.recurrence_id.as_ref() {
                match normalize(id, policy) {
                    Ok(instant) => {
                        ids.insert(instant.utc);
                    }
                    Err(e) => warn!("Ignoring cancelled instance of '{}': {}", raw.uid, e),
                }
            }
        }
        Cancellation::Occurrences(ids)
    };

    let mut exceptions = BTreeMap::new();
    for ov in raw.overrides.iter().filter(|ov| !ov.cancelled) {
        match build_exception(ov, policy) {
            Ok((recurrence_id, exception)) => {
                exceptions.insert(recurrence_id, exception);
            }
            Err(e) => warn!("Ignoring override of '{}': {}", raw.uid, e),
        }
    }

    Ok(CalendarEventDefinition {
        uid: raw.uid.clone(),
        summary: raw.summary.clone().unwrap_or_default(),
        description: raw.description.clone(),
        location: raw.location.clone(),
        start,
        end,
        recurrence_rule: raw.rrule.clone(),
        exceptions,
        cancelled,
    })
}

fn build_exception(
    ov: &RawEventDefinition,
    policy: NaiveTimePolicy,
) -> BotResult<(DateTime<Utc>, ExceptionOverride)> {
    let recurrence_id = ov
        .recurrence_id
        .as_ref()
        .ok_or_else(|| malformed_timestamp("Override without RECURRENCE-ID"))?;
    let recurrence_id = normalize(recurrence_id, policy)?.utc;
    let raw_start = ov
        .start
        .as_ref()
        .ok_or_else(|| malformed_timestamp("Override without DTSTART"))?;
    let start = normalize(raw_start, policy)?;
    let end = resolve_end(raw_start, &start, ov.end.as_ref(), policy)?;

    Ok((
        recurrence_id,
        ExceptionOverride {
            summary: ov.summary.clone(),
            description: ov.description.clone(),
            location: ov.location.clone(),
            start,
            end,
        },
    ))
}

/// DTEND, or one day after an all-day DTSTART, or DTSTART itself
fn resolve_end(
    raw_start: &RawDate,
    start: &ZonedInstant,
    raw_end: Option<&RawDate>,
    policy: NaiveTimePolicy,
) -> BotResult<ZonedInstant> {
    match raw_end {
        Some(raw_end) => normalize(raw_end, policy),
        None => match raw_start {
            RawDate::Date(_) => Ok(ZonedInstant {
                utc: start.utc + Duration::days(1),
                zone: start.zone,
            }),
            _ => Ok(*start),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn naive(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    #[test]
    fn test_date_only_is_midnight_utc() {
        let raw = RawDate::Date(NaiveDate::from_ymd_opt(2024, 1, 8).unwrap());
        let instant = normalize(&raw, NaiveTimePolicy::Utc).unwrap();
        assert_eq!(instant.utc, Utc.with_ymd_and_hms(2024, 1, 8, 0, 0, 0).unwrap());
        assert_eq!(instant.zone, Tz::UTC);
    }

    #[test]
    fn test_floating_policies() {
        let raw = RawDate::Floating(naive(2024, 1, 8, 18, 0));
        let as_utc = normalize(&raw, NaiveTimePolicy::Utc).unwrap();
        assert_eq!(as_utc.utc, Utc.with_ymd_and_hms(2024, 1, 8, 18, 0, 0).unwrap());

        let local = normalize(
            &raw,
            NaiveTimePolicy::Local(chrono_tz::America::Los_Angeles),
        )
        .unwrap();
        // PST is UTC-8 in January
        assert_eq!(local.utc, Utc.with_ymd_and_hms(2024, 1, 9, 2, 0, 0).unwrap());
        assert_eq!(local.zone, chrono_tz::America::Los_Angeles);
        assert_eq!(local.local(), naive(2024, 1, 8, 18, 0));
    }

    #[test]
    fn test_zoned_keeps_zone() {
        let raw = RawDate::Zoned {
            datetime: naive(2024, 7, 1, 18, 0),
            tzid: "America/Los_Angeles".to_string(),
        };
        let instant = normalize(&raw, NaiveTimePolicy::Utc).unwrap();
        // PDT is UTC-7 in July
        assert_eq!(instant.utc, Utc.with_ymd_and_hms(2024, 7, 2, 1, 0, 0).unwrap());
        assert_eq!(instant.zone, chrono_tz::America::Los_Angeles);
    }

    #[test]
    fn test_unknown_tzid_is_malformed() {
        let raw = RawDate::Zoned {
            datetime: naive(2024, 7, 1, 18, 0),
            tzid: "Not/AZone".to_string(),
        };
        let err = normalize(&raw, NaiveTimePolicy::Utc).unwrap_err();
        assert!(matches!(err, crate::error::Error::MalformedTimestamp(_)));
    }

    #[test]
    fn test_nonexistent_local_time_is_malformed() {
        // 2024-03-10 02:30 is skipped by the spring-forward transition
        let raw = RawDate::Zoned {
            datetime: naive(2024, 3, 10, 2, 30),
            tzid: "America/Los_Angeles".to_string(),
        };
        assert!(normalize(&raw, NaiveTimePolicy::Utc).is_err());
    }

    #[test]
    fn test_build_definition_collects_cancellations_and_exceptions() {
        let master = RawEventDefinition {
            uid: "A".to_string(),
            summary: Some("Open Lab".to_string()),
            start: Some(RawDate::Utc(Utc.with_ymd_and_hms(2024, 1, 1, 18, 0, 0).unwrap())),
            end: Some(RawDate::Utc(Utc.with_ymd_and_hms(2024, 1, 1, 19, 0, 0).unwrap())),
            rrule: Some("FREQ=WEEKLY".to_string()),
            exdates: vec![RawDate::Utc(Utc.with_ymd_and_hms(2024, 1, 8, 18, 0, 0).unwrap())],
            overrides: vec![
                RawEventDefinition {
                    uid: "A".to_string(),
                    recurrence_id: Some(RawDate::Utc(
                        Utc.with_ymd_and_hms(2024, 1, 15, 18, 0, 0).unwrap(),
                    )),
                    cancelled: true,
                    ..Default::default()
                },
                RawEventDefinition {
                    uid: "A".to_string(),
                    description: Some("Moved".to_string()),
                    recurrence_id: Some(RawDate::Utc(
                        Utc.with_ymd_and_hms(2024, 1, 22, 18, 0, 0).unwrap(),
                    )),
                    start: Some(RawDate::Utc(Utc.with_ymd_and_hms(2024, 1, 22, 20, 0, 0).unwrap())),
                    end: Some(RawDate::Utc(Utc.with_ymd_and_hms(2024, 1, 22, 21, 0, 0).unwrap())),
                    ..Default::default()
                },
            ],
            ..Default::default()
        };

        let def = build_definition(&master, NaiveTimePolicy::Utc).unwrap();
        assert!(def.is_cancelled_at(&Utc.with_ymd_and_hms(2024, 1, 8, 18, 0, 0).unwrap()));
        assert!(def.is_cancelled_at(&Utc.with_ymd_and_hms(2024, 1, 15, 18, 0, 0).unwrap()));
        assert!(!def.is_cancelled_at(&Utc.with_ymd_and_hms(2024, 1, 22, 18, 0, 0).unwrap()));

        let exception = def
            .exceptions
            .get(&Utc.with_ymd_and_hms(2024, 1, 22, 18, 0, 0).unwrap())
            .unwrap();
        assert_eq!(exception.description.as_deref(), Some("Moved"));
        assert_eq!(exception.start.utc, Utc.with_ymd_and_hms(2024, 1, 22, 20, 0, 0).unwrap());
    }

    #[test]
    fn test_build_definition_all_day_without_end() {
        let raw = RawEventDefinition {
            uid: "day".to_string(),
            start: Some(RawDate::Date(NaiveDate::from_ymd_opt(2024, 2, 3).unwrap())),
            ..Default::default()
        };
        let def = build_definition(&raw, NaiveTimePolicy::Utc).unwrap();
        assert_eq!(def.end.utc - def.start.utc, Duration::days(1));
    }

    #[test]
    fn test_build_definition_requires_start() {
        let raw = RawEventDefinition {
            uid: "nostart".to_string(),
            ..Default::default()
        };
        assert!(build_definition(&raw, NaiveTimePolicy::Utc).is_err());
    }

    #[test]
    fn test_cancelled_master_cancels_series() {
        let raw = RawEventDefinition {
            uid: "gone".to_string(),
            start: Some(RawDate::Utc(Utc.with_ymd_and_hms(2024, 1, 1, 18, 0, 0).unwrap())),
            cancelled: true,
            ..Default::default()
        };
        let def = build_definition(&raw, NaiveTimePolicy::Utc).unwrap();
        assert_eq!(def.cancelled, Cancellation::EntireSeries);
    }
}
