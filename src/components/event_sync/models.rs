use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use chrono_tz::Tz;
use std::collections::{BTreeMap, BTreeSet};

/// A date or datetime exactly as authored in a feed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawDate {
    /// All-day value with no time of day
    Date(NaiveDate),
    /// Datetime with no zone information
    Floating(NaiveDateTime),
    /// Datetime with a trailing `Z`
    Utc(DateTime<Utc>),
    /// Wall-clock datetime qualified by a TZID
    Zoned { datetime: NaiveDateTime, tzid: String },
}

/// An absolute instant plus the zone it was authored in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZonedInstant {
    pub utc: DateTime<Utc>,
    pub zone: Tz,
}

impl ZonedInstant {
    /// Wall-clock time in the authored zone
    pub fn local(&self) -> NaiveDateTime {
        self.utc.with_timezone(&self.zone).naive_local()
    }
}

/// One VEVENT as read from a feed, before time normalization
#[derive(Debug, Clone, Default)]
pub struct RawEventDefinition {
    pub uid: String,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start: Option<RawDate>,
    pub end: Option<RawDate>,
    pub rrule: Option<String>,
    pub exdates: Vec<RawDate>,
    pub recurrence_id: Option<RawDate>,
    pub cancelled: bool,
    /// Overrides and cancellations attached to this master
    pub overrides: Vec<RawEventDefinition>,
}

/// Replacement fields for one occurrence of a recurring series
#[derive(Debug, Clone, PartialEq)]
pub struct ExceptionOverride {
    pub summary: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start: ZonedInstant,
    pub end: ZonedInstant,
}

/// Cancellation state of a definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cancellation {
    /// The whole series is gone
    EntireSeries,
    /// Individual occurrences, keyed by recurrence identifier
    Occurrences(BTreeSet<DateTime<Utc>>),
}

impl Default for Cancellation {
    fn default() -> Self {
        Cancellation::Occurrences(BTreeSet::new())
    }
}

/// A normalized source record ready for expansion
#[derive(Debug, Clone)]
pub struct CalendarEventDefinition {
    pub uid: String,
    pub summary: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start: ZonedInstant,
    pub end: ZonedInstant,
    pub recurrence_rule: Option<String>,
    /// Keyed by the original (un-overridden) occurrence start
    pub exceptions: BTreeMap<DateTime<Utc>, ExceptionOverride>,
    pub cancelled: Cancellation,
}

impl CalendarEventDefinition {
    pub fn is_cancelled_at(&self, recurrence_id: &DateTime<Utc>) -> bool {
        match &self.cancelled {
            Cancellation::EntireSeries => true,
            Cancellation::Occurrences(ids) => ids.contains(recurrence_id),
        }
    }
}

/// One concrete instance of an event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Occurrence {
    pub uid: String,
    pub name: String,
    pub description: String,
    pub location: String,
    pub start_utc: DateTime<Utc>,
    pub end_utc: DateTime<Utc>,
}

/// Lifecycle status of a store entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    Scheduled,
    Active,
    Completed,
    Cancelled,
}

impl EntryStatus {
    /// Completed and cancelled entries are never matched or deleted
    pub fn is_terminal(&self) -> bool {
        matches!(self, EntryStatus::Completed | EntryStatus::Cancelled)
    }
}

/// The store's view of a previously created item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteScheduledEntry {
    pub id: u64,
    pub name: String,
    pub description: String,
    pub location: String,
    pub start_utc: DateTime<Utc>,
    pub end_utc: DateTime<Utc>,
    pub status: EntryStatus,
}

impl RemoteScheduledEntry {
    /// Whether participants may currently be attending
    pub fn is_in_progress(&self, now: DateTime<Utc>) -> bool {
        self.status == EntryStatus::Active || (self.start_utc <= now && now <= self.end_utc)
    }
}

/// Tuple deciding whether an occurrence and a store entry are the same event
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IdentityKey {
    pub name: String,
    pub start_utc: DateTime<Utc>,
    pub location: String,
    /// Only populated under the strict policy
    pub description: Option<String>,
}

/// Outcome of one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub feeds_ok: usize,
    pub feeds_failed: usize,
    pub definitions_skipped: usize,
    pub occurrences: usize,
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub failed: usize,
    pub sweep_suppressed: bool,
    pub finished_at: Option<DateTime<Utc>>,
}

impl SyncReport {
    pub fn operations(&self) -> usize {
        self.created + self.updated + self.deleted
    }
}
