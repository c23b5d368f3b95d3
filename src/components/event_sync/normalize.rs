use super::models::Occurrence;
use crate::config::SyncSettings;
use crate::utils::time::floor_to_minute;
use lazy_static::lazy_static;
use regex::Regex;

/// Discord's limit for scheduled event names and locations
pub const NAME_MAX_LENGTH: usize = 100;
pub const LOCATION_MAX_LENGTH: usize = 100;
/// Name used when a feed event has no summary
pub const UNTITLED_NAME: &str = "Untitled event";

lazy_static! {
    static ref LINE_BREAK: Regex = Regex::new(r"(?i)<br\s*/?>").expect("valid line break regex");
    static ref MARKUP_TAG: Regex = Regex::new(r"<[^>]+>").expect("valid markup regex");
}

/// Cleans occurrences so that equality comparisons against the store are stable
#[derive(Debug, Clone)]
pub struct OccurrenceNormalizer {
    description_max_length: usize,
    default_location: String,
    default_description: String,
}

impl OccurrenceNormalizer {
    pub fn new(settings: &SyncSettings) -> Self {
        Self {
            description_max_length: settings.description_max_length,
            default_location: settings.default_location.clone(),
            default_description: settings.default_description.clone(),
        }
    }

    pub fn normalize(&self, occ: Occurrence) -> Occurrence {
        let name = truncate_chars(occ.name.trim(), NAME_MAX_LENGTH);
        let name = if name.is_empty() {
            UNTITLED_NAME.to_string()
        } else {
            name
        };

        let description = clean_description(&occ.description);
        let description = if description.is_empty() {
            self.default_description.clone()
        } else {
            description
        };
        let description = truncate_chars(&description, self.description_max_length);

        let location = truncate_chars(occ.location.trim(), LOCATION_MAX_LENGTH);
        let location = if location.is_empty() {
            self.default_location.clone()
        } else {
            location
        };

        Occurrence {
            uid: occ.uid,
            name,
            description,
            location,
            start_utc: floor_to_minute(occ.start_utc),
            end_utc: floor_to_minute(occ.end_utc),
        }
    }
}

/// Remove markup tags and decode HTML entities
pub fn clean_description(raw: &str) -> String {
    let with_breaks = LINE_BREAK.replace_all(raw, "\n");
    let stripped = MARKUP_TAG.replace_all(&with_breaks, "");
    html_escape::decode_html_entities(&stripped).trim().to_string()
}

/// Cut to at most `max` characters, never inside a UTF-8 sequence
pub fn truncate_chars(value: &str, max: usize) -> String {
    match value.char_indices().nth(max) {
        Some((idx, _)) => value[..idx].trim_end().to_string(),
        None => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn normalizer() -> OccurrenceNormalizer {
        OccurrenceNormalizer::new(&SyncSettings::default())
    }

    fn occurrence() -> Occurrence {
        Occurrence {
            uid: "A".to_string(),
            name: "  Open Lab  ".to_string(),
            description: "<p>Bring <b>snacks</b> &amp; tools</p><br/>See you".to_string(),
            location: "   ".to_string(),
            start_utc: Utc.with_ymd_and_hms(2024, 1, 8, 18, 0, 42).unwrap(),
            end_utc: Utc.with_ymd_and_hms(2024, 1, 8, 19, 0, 59).unwrap(),
        }
    }

    #[test]
    fn test_normalize_cleans_fields() {
        let occ = normalizer().normalize(occurrence());
        assert_eq!(occ.name, "Open Lab");
        assert_eq!(occ.description, "Bring snacks & tools\nSee you");
        assert_eq!(occ.location, "MAG Laboratory");
        assert_eq!(occ.start_utc, Utc.with_ymd_and_hms(2024, 1, 8, 18, 0, 0).unwrap());
        assert_eq!(occ.end_utc, Utc.with_ymd_and_hms(2024, 1, 8, 19, 0, 0).unwrap());
    }

    #[test]
    fn test_normalize_defaults() {
        let mut occ = occurrence();
        occ.name = " ".to_string();
        occ.description = "<div></div>".to_string();
        let occ = normalizer().normalize(occ);
        assert_eq!(occ.name, UNTITLED_NAME);
        assert_eq!(occ.description, "No description provided");
    }

    #[test]
    fn test_description_truncated_after_cleaning() {
        let mut occ = occurrence();
        // 999 characters of text plus an entity that decodes to one character
        occ.description = format!("{}&amp;tail", "x".repeat(999));
        let occ = normalizer().normalize(occ);
        assert_eq!(occ.description.chars().count(), 1000);
        assert!(occ.description.ends_with("x&"));
    }

    #[test]
    fn test_truncate_chars_multibyte() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("short", 10), "short");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let once = normalizer().normalize(occurrence());
        let twice = normalizer().normalize(once.clone());
        assert_eq!(once, twice);
    }
}
