//! RRULE expansion for calendar definitions.
//!
//! Rules are evaluated in the zone the event was authored in, so BYDAY and
//! wall-clock times survive DST transitions. Exceptions replace single
//! instances and cancellations remove them; a cancellation always wins.

use super::models::{
    CalendarEventDefinition, Cancellation, ExceptionOverride, Occurrence, ZonedInstant,
};
use super::time::localize;
use crate::error::{invalid_rrule, BotResult};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use chrono_tz::Tz;
use rrule::RRuleSet;
use std::collections::BTreeSet;
use tracing::warn;

/// Upper bound on instants generated for one definition in one window
const MAX_INSTANCES: u16 = 1000;

/// Occurrences produced for one definition
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Expansion {
    pub occurrences: Vec<Occurrence>,
    pub cancelled: Vec<Occurrence>,
}

/// Expand a definition into the concrete occurrences starting inside
/// `[window_start, window_end]` (both inclusive).
///
/// Non-recurring definitions are included when they overlap the window.
pub fn expand(
    def: &CalendarEventDefinition,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
) -> BotResult<Expansion> {
    let mut expansion = Expansion::default();

    if def.cancelled == Cancellation::EntireSeries {
        return Ok(expansion);
    }

    let rule = match def.recurrence_rule.as_deref() {
        Some(rule) => rule,
        None => {
            if def.start.utc <= window_end && def.end.utc >= window_start {
                let occ = base_occurrence(def, def.start.utc, def.end.utc);
                if def.is_cancelled_at(&def.start.utc) {
                    expansion.cancelled.push(occ);
                } else {
                    expansion.occurrences.push(occ);
                }
            }
            return Ok(expansion);
        }
    };

    let duration = def.end.utc - def.start.utc;
    let mut handled = BTreeSet::new();
    for instant in rule_instants(def, rule, window_start, window_end)? {
        let occ_end = instant + duration;

        if def.is_cancelled_at(&instant) {
            expansion.cancelled.push(base_occurrence(def, instant, occ_end));
        } else if let Some(exception) = def.exceptions.get(&instant) {
            handled.insert(instant);
            expansion.occurrences.push(exception_occurrence(def, exception));
        } else {
            expansion.occurrences.push(base_occurrence(def, instant, occ_end));
        }
    }

    // Overrides moved into the window from a slot outside it
    for (recurrence_id, exception) in &def.exceptions {
        if handled.contains(recurrence_id) || def.is_cancelled_at(recurrence_id) {
            continue;
        }
        if exception.start.utc >= window_start && exception.start.utc <= window_end {
            expansion.occurrences.push(exception_occurrence(def, exception));
        }
    }
    expansion.occurrences.sort_by_key(|o| o.start_utc);

    Ok(expansion)
}

fn exception_occurrence(
    def: &CalendarEventDefinition,
    exception: &ExceptionOverride,
) -> Occurrence {
    Occurrence {
        uid: def.uid.clone(),
        name: exception
            .summary
            .clone()
            .unwrap_or_else(|| def.summary.clone()),
        description: exception
            .description
            .clone()
            .or_else(|| def.description.clone())
            .unwrap_or_default(),
        location: exception
            .location
            .clone()
            .or_else(|| def.location.clone())
            .unwrap_or_default(),
        start_utc: exception.start.utc,
        end_utc: exception.end.utc,
    }
}

fn base_occurrence(
    def: &CalendarEventDefinition,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Occurrence {
    Occurrence {
        uid: def.uid.clone(),
        name: def.summary.clone(),
        description: def.description.clone().unwrap_or_default(),
        location: def.location.clone().unwrap_or_default(),
        start_utc: start,
        end_utc: end,
    }
}

/// All rule-generated start instants inside the inclusive window, in UTC
fn rule_instants(
    def: &CalendarEventDefinition,
    rule: &str,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
) -> BotResult<Vec<DateTime<Utc>>> {
    let rule = rule.trim();
    let rule = rule.strip_prefix("RRULE:").unwrap_or(rule);
    let rule = normalize_until(rule, &def.start).map_err(|e| invalid_rrule(&def.uid, e))?;

    let source = format!("{}\nRRULE:{}", dtstart_line(&def.start), rule);
    let rrule_set = source
        .parse::<RRuleSet>()
        .map_err(|e| invalid_rrule(&def.uid, e))?;

    // Widen by a second on each side so both window bounds are included
    let tz: rrule::Tz = Utc.into();
    let after = (window_start - Duration::seconds(1)).with_timezone(&tz);
    let before = (window_end + Duration::seconds(1)).with_timezone(&tz);

    let result = rrule_set.after(after).before(before).all(MAX_INSTANCES);
    if result.limited {
        warn!(
            "Recurrence for '{}' truncated at {} instances",
            def.uid, MAX_INSTANCES
        );
    }

    Ok(result
        .dates
        .iter()
        .map(|dt| dt.with_timezone(&Utc))
        .filter(|dt| *dt >= window_start && *dt <= window_end)
        .collect())
}

fn dtstart_line(start: &ZonedInstant) -> String {
    if start.zone == Tz::UTC {
        format!("DTSTART:{}", start.utc.format("%Y%m%dT%H%M%SZ"))
    } else {
        format!(
            "DTSTART;TZID={}:{}",
            start.zone.name(),
            start.local().format("%Y%m%dT%H%M%S")
        )
    }
}

/// Rewrite UNTIL as a UTC instant, reading date and floating values in the
/// evaluation zone. A date-only UNTIL covers the whole day.
fn normalize_until(rule: &str, start: &ZonedInstant) -> Result<String, String> {
    let mut parts = Vec::new();
    for part in rule.split(';').filter(|p| !p.trim().is_empty()) {
        let (key, value) = part
            .split_once('=')
            .ok_or_else(|| format!("malformed rule part '{}'", part))?;
        if !key.trim().eq_ignore_ascii_case("UNTIL") {
            parts.push(part.trim().to_string());
            continue;
        }

        let value = value.trim();
        let until_utc = if let Some(utc) = value.strip_suffix('Z') {
            NaiveDateTime::parse_from_str(utc, "%Y%m%dT%H%M%S")
                .map_err(|_| format!("unparsable UNTIL '{}'", value))?
                .and_utc()
        } else if value.len() == 8 {
            let date = NaiveDate::parse_from_str(value, "%Y%m%d")
                .map_err(|_| format!("unparsable UNTIL '{}'", value))?;
            let end_of_day = date
                .and_hms_opt(23, 59, 59)
                .ok_or_else(|| format!("unparsable UNTIL '{}'", value))?;
            localize(&end_of_day, start.zone)
                .map_err(|e| e.to_string())?
                .utc
        } else {
            let naive = NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%S")
                .map_err(|_| format!("unparsable UNTIL '{}'", value))?;
            localize(&naive, start.zone).map_err(|e| e.to_string())?.utc
        };

        parts.push(format!("UNTIL={}", until_utc.format("%Y%m%dT%H%M%SZ")));
    }
    Ok(parts.join(";"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::BTreeMap;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn at(dt: DateTime<Utc>) -> ZonedInstant {
        ZonedInstant {
            utc: dt,
            zone: Tz::UTC,
        }
    }

    fn weekly_open_lab() -> CalendarEventDefinition {
        CalendarEventDefinition {
            uid: "A".to_string(),
            summary: "Open Lab".to_string(),
            description: Some("Weekly open lab".to_string()),
            location: Some("MAG Laboratory".to_string()),
            start: at(utc(2024, 1, 1, 18, 0)),
            end: at(utc(2024, 1, 1, 19, 0)),
            recurrence_rule: Some("FREQ=WEEKLY;BYDAY=MO".to_string()),
            exceptions: BTreeMap::new(),
            cancelled: Cancellation::default(),
        }
    }

    fn starts(expansion: &Expansion) -> Vec<DateTime<Utc>> {
        expansion.occurrences.iter().map(|o| o.start_utc).collect()
    }

    #[test]
    fn test_weekly_expansion_in_window() {
        let def = weekly_open_lab();
        let expansion = expand(&def, utc(2024, 1, 8, 0, 0), utc(2024, 1, 22, 0, 0)).unwrap();
        assert_eq!(
            starts(&expansion),
            vec![utc(2024, 1, 8, 18, 0), utc(2024, 1, 15, 18, 0)]
        );
        for occ in &expansion.occurrences {
            assert_eq!(occ.end_utc - occ.start_utc, Duration::hours(1));
            assert_eq!(occ.uid, "A");
        }
        assert!(expansion.cancelled.is_empty());
    }

    #[test]
    fn test_window_bounds_are_inclusive() {
        let def = weekly_open_lab();

        let expansion = expand(&def, utc(2024, 1, 8, 18, 0), utc(2024, 1, 22, 18, 0)).unwrap();
        assert_eq!(
            starts(&expansion),
            vec![
                utc(2024, 1, 8, 18, 0),
                utc(2024, 1, 15, 18, 0),
                utc(2024, 1, 22, 18, 0)
            ]
        );

        // One minute short of the last instance
        let expansion = expand(&def, utc(2024, 1, 8, 18, 1), utc(2024, 1, 22, 17, 59)).unwrap();
        assert_eq!(starts(&expansion), vec![utc(2024, 1, 15, 18, 0)]);
    }

    #[test]
    fn test_cancellation_wins_over_exception() {
        let mut def = weekly_open_lab();
        let id = utc(2024, 1, 15, 18, 0);
        def.exceptions.insert(
            id,
            ExceptionOverride {
                summary: None,
                description: Some("Changed".to_string()),
                location: None,
                start: at(utc(2024, 1, 15, 20, 0)),
                end: at(utc(2024, 1, 15, 21, 0)),
            },
        );
        def.cancelled = Cancellation::Occurrences(BTreeSet::from([id]));

        let expansion = expand(&def, utc(2024, 1, 8, 0, 0), utc(2024, 1, 22, 0, 0)).unwrap();
        assert_eq!(starts(&expansion), vec![utc(2024, 1, 8, 18, 0)]);
        assert_eq!(expansion.cancelled.len(), 1);
        assert_eq!(expansion.cancelled[0].start_utc, id);
    }

    #[test]
    fn test_exception_uses_its_own_times_and_fields() {
        let mut def = weekly_open_lab();
        def.exceptions.insert(
            utc(2024, 1, 15, 18, 0),
            ExceptionOverride {
                summary: None,
                description: Some("Late start this week".to_string()),
                location: None,
                start: at(utc(2024, 1, 15, 19, 30)),
                end: at(utc(2024, 1, 15, 22, 0)),
            },
        );

        let expansion = expand(&def, utc(2024, 1, 8, 0, 0), utc(2024, 1, 22, 0, 0)).unwrap();
        let moved = &expansion.occurrences[1];
        assert_eq!(moved.description, "Late start this week");
        assert_eq!(moved.name, "Open Lab");
        assert_eq!(moved.location, "MAG Laboratory");
        assert_eq!(moved.start_utc, utc(2024, 1, 15, 19, 30));
        assert_eq!(moved.end_utc, utc(2024, 1, 15, 22, 0));
        assert_eq!(expansion.occurrences[0].description, "Weekly open lab");
    }

    #[test]
    fn test_exception_moved_out_of_its_slot() {
        let mut def = weekly_open_lab();
        // Monday Jan 8 instance moved to Friday Jan 12
        def.exceptions.insert(
            utc(2024, 1, 8, 18, 0),
            ExceptionOverride {
                summary: None,
                description: None,
                location: None,
                start: at(utc(2024, 1, 12, 18, 0)),
                end: at(utc(2024, 1, 12, 19, 0)),
            },
        );

        // Original slot inside the window
        let expansion = expand(&def, utc(2024, 1, 5, 0, 0), utc(2024, 1, 14, 0, 0)).unwrap();
        assert_eq!(starts(&expansion), vec![utc(2024, 1, 12, 18, 0)]);

        // Original slot already passed, the moved instance is still ahead
        let expansion = expand(&def, utc(2024, 1, 9, 0, 0), utc(2024, 1, 16, 0, 0)).unwrap();
        assert_eq!(
            starts(&expansion),
            vec![utc(2024, 1, 12, 18, 0), utc(2024, 1, 15, 18, 0)]
        );

        // Moved instance already passed
        let expansion = expand(&def, utc(2024, 1, 13, 0, 0), utc(2024, 1, 16, 0, 0)).unwrap();
        assert_eq!(starts(&expansion), vec![utc(2024, 1, 15, 18, 0)]);

        // A cancelled slot keeps its override out
        def.cancelled = Cancellation::Occurrences(BTreeSet::from([utc(2024, 1, 8, 18, 0)]));
        let expansion = expand(&def, utc(2024, 1, 9, 0, 0), utc(2024, 1, 16, 0, 0)).unwrap();
        assert_eq!(starts(&expansion), vec![utc(2024, 1, 15, 18, 0)]);
    }

    #[test]
    fn test_entire_series_cancelled_yields_nothing() {
        let mut def = weekly_open_lab();
        def.cancelled = Cancellation::EntireSeries;
        let expansion = expand(&def, utc(2024, 1, 8, 0, 0), utc(2024, 1, 22, 0, 0)).unwrap();
        assert_eq!(expansion, Expansion::default());
    }

    #[test]
    fn test_single_event_overlap() {
        let mut def = weekly_open_lab();
        def.recurrence_rule = None;
        def.start = at(utc(2024, 1, 7, 23, 0));
        def.end = at(utc(2024, 1, 8, 1, 0));

        // Overlaps the window start
        let expansion = expand(&def, utc(2024, 1, 8, 0, 0), utc(2024, 1, 15, 0, 0)).unwrap();
        assert_eq!(expansion.occurrences.len(), 1);

        // Entirely before the window
        let expansion = expand(&def, utc(2024, 1, 8, 2, 0), utc(2024, 1, 15, 0, 0)).unwrap();
        assert!(expansion.occurrences.is_empty());

        // Starts exactly at the window end
        let expansion = expand(&def, utc(2024, 1, 1, 0, 0), utc(2024, 1, 7, 23, 0)).unwrap();
        assert_eq!(expansion.occurrences.len(), 1);
    }

    #[test]
    fn test_zone_aware_rule_tracks_dst() {
        let la = chrono_tz::America::Los_Angeles;
        let mut def = weekly_open_lab();
        // Monday 2024-01-01 18:00 PST
        def.start = ZonedInstant {
            utc: utc(2024, 1, 2, 2, 0),
            zone: la,
        };
        def.end = ZonedInstant {
            utc: utc(2024, 1, 2, 3, 0),
            zone: la,
        };

        // DST starts 2024-03-10; Mondays around it stay at 18:00 local
        let expansion = expand(&def, utc(2024, 3, 4, 0, 0), utc(2024, 3, 13, 0, 0)).unwrap();
        assert_eq!(
            starts(&expansion),
            vec![utc(2024, 3, 5, 2, 0), utc(2024, 3, 12, 1, 0)]
        );
    }

    #[test]
    fn test_floating_until_is_read_in_rule_zone() {
        let la = chrono_tz::America::Los_Angeles;
        let mut def = weekly_open_lab();
        def.start = ZonedInstant {
            utc: utc(2024, 1, 2, 2, 0),
            zone: la,
        };
        def.end = ZonedInstant {
            utc: utc(2024, 1, 2, 3, 0),
            zone: la,
        };
        def.recurrence_rule = Some("FREQ=WEEKLY;BYDAY=MO;UNTIL=20240115T180000".to_string());

        let expansion = expand(&def, utc(2024, 1, 1, 0, 0), utc(2024, 2, 1, 0, 0)).unwrap();
        assert_eq!(
            starts(&expansion),
            vec![
                utc(2024, 1, 2, 2, 0),
                utc(2024, 1, 9, 2, 0),
                utc(2024, 1, 16, 2, 0)
            ]
        );
    }

    #[test]
    fn test_normalize_until_variants() {
        let start = at(utc(2024, 1, 1, 18, 0));
        assert_eq!(
            normalize_until("FREQ=DAILY;UNTIL=20240105", &start).unwrap(),
            "FREQ=DAILY;UNTIL=20240105T235959Z"
        );
        assert_eq!(
            normalize_until("FREQ=DAILY;UNTIL=20240105T120000Z", &start).unwrap(),
            "FREQ=DAILY;UNTIL=20240105T120000Z"
        );
        assert_eq!(
            normalize_until("FREQ=DAILY;COUNT=3", &start).unwrap(),
            "FREQ=DAILY;COUNT=3"
        );
        assert!(normalize_until("FREQ=DAILY;UNTIL=soon", &start).is_err());
        assert!(normalize_until("FREQ=DAILY;BROKEN", &start).is_err());
    }

    #[test]
    fn test_invalid_rule_is_reported() {
        let mut def = weekly_open_lab();
        def.recurrence_rule = Some("FREQ=SOMETIMES".to_string());
        let err = expand(&def, utc(2024, 1, 1, 0, 0), utc(2024, 2, 1, 0, 0)).unwrap_err();
        assert!(matches!(
            err,
            crate::error::Error::InvalidRecurrenceRule { ref uid, .. } if uid == "A"
        ));
    }
}
