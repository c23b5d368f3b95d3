//! Diffing desired occurrences against the remote store.
//!
//! [`Reconciler::plan`] is pure and decides every mutation up front;
//! [`Reconciler::apply`] issues them one at a time and keeps going past
//! individual failures.

use super::models::{IdentityKey, Occurrence, RemoteScheduledEntry};
use super::store::EventStore;
use crate::config::{MatchPolicy, SyncSettings};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use tracing::{debug, error, info};

/// Mutations decided for one pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncPlan {
    pub to_create: Vec<Occurrence>,
    /// Matched entries whose description or end time drifted
    pub to_update: Vec<(u64, Occurrence)>,
    pub to_delete: Vec<RemoteScheduledEntry>,
}

impl SyncPlan {
    pub fn is_empty(&self) -> bool {
        self.to_create.is_empty() && self.to_update.is_empty() && self.to_delete.is_empty()
    }

    pub fn len(&self) -> usize {
        self.to_create.len() + self.to_update.len() + self.to_delete.len()
    }
}

/// Counts of mutations actually carried out
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub failed: usize,
}

pub fn occurrence_key(occ: &Occurrence, policy: MatchPolicy) -> IdentityKey {
    IdentityKey {
        name: occ.name.clone(),
        start_utc: occ.start_utc,
        location: occ.location.clone(),
        description: match policy {
            MatchPolicy::Standard => None,
            MatchPolicy::Strict => Some(occ.description.clone()),
        },
    }
}

pub fn entry_key(entry: &RemoteScheduledEntry, policy: MatchPolicy) -> IdentityKey {
    IdentityKey {
        name: entry.name.clone(),
        start_utc: entry.start_utc,
        location: entry.location.clone(),
        description: match policy {
            MatchPolicy::Standard => None,
            MatchPolicy::Strict => Some(entry.description.clone()),
        },
    }
}

#[derive(Debug, Clone)]
pub struct Reconciler {
    policy: MatchPolicy,
    refresh_drifted: bool,
    reserved_name_markers: Vec<String>,
}

impl Reconciler {
    pub fn new(settings: &SyncSettings) -> Self {
        Self {
            policy: settings.match_policy,
            refresh_drifted: settings.refresh_drifted,
            reserved_name_markers: settings.reserved_name_markers.clone(),
        }
    }

    fn is_reserved(&self, entry: &RemoteScheduledEntry) -> bool {
        self.reserved_name_markers
            .iter()
            .any(|marker| !marker.is_empty() && entry.name.contains(marker.as_str()))
    }

    /// Decide creates, refreshes and deletes.
    ///
    /// `sweep_allowed` gates the removal of entries that no longer appear in
    /// any feed; it is false when part of the desired set could not be built.
    pub fn plan(
        &self,
        desired: &[Occurrence],
        cancelled: &[Occurrence],
        current: &[RemoteScheduledEntry],
        now: DateTime<Utc>,
        sweep_allowed: bool,
    ) -> SyncPlan {
        let mut plan = SyncPlan::default();

        let mut live: HashMap<IdentityKey, Vec<&RemoteScheduledEntry>> = HashMap::new();
        for entry in current.iter().filter(|e| !e.status.is_terminal()) {
            live.entry(entry_key(entry, self.policy))
                .or_default()
                .push(entry);
        }

        let mut desired_keys = HashSet::new();
        for occ in desired {
            let key = occurrence_key(occ, self.policy);
            if !desired_keys.insert(key.clone()) {
                debug!("Skipping duplicate occurrence '{}' at {}", occ.name, occ.start_utc);
                continue;
            }

            match live.get(&key).and_then(|entries| entries.first()) {
                Some(entry) => {
                    if self.refresh_drifted
                        && (entry.description != occ.description || entry.end_utc != occ.end_utc)
                    {
                        plan.to_update.push((entry.id, occ.clone()));
                    }
                }
                None if occ.start_utc <= now => {
                    debug!("Not creating '{}': start {} has passed", occ.name, occ.start_utc);
                }
                None => plan.to_create.push(occ.clone()),
            }
        }

        let mut doomed: HashSet<u64> = HashSet::new();
        for occ in cancelled {
            let key = occurrence_key(occ, self.policy);
            if desired_keys.contains(&key) {
                continue;
            }
            for entry in live.get(&key).into_iter().flatten() {
                if entry.is_in_progress(now) {
                    info!("Keeping cancelled '{}' while it is in progress", entry.name);
                } else if doomed.insert(entry.id) {
                    plan.to_delete.push((*entry).clone());
                }
            }
        }

        if !sweep_allowed {
            return plan;
        }

        for entry in current.iter().filter(|e| !e.status.is_terminal()) {
            if doomed.contains(&entry.id)
                || entry.is_in_progress(now)
                || self.is_reserved(entry)
                || desired_keys.contains(&entry_key(entry, self.policy))
            {
                continue;
            }
            doomed.insert(entry.id);
            plan.to_delete.push(entry.clone());
        }

        plan
    }

    /// Carry out a plan. Each failure is logged and counted; the rest still run.
    pub async fn apply(&self, plan: SyncPlan, store: &dyn EventStore) -> ApplyOutcome {
        let mut outcome = ApplyOutcome::default();

        for occ in &plan.to_create {
            match store.create(occ).await {
                Ok(_) => outcome.created += 1,
                Err(e) => {
                    error!("Failed to create '{}' at {}: {}", occ.name, occ.start_utc, e);
                    outcome.failed += 1;
                }
            }
        }

        for (id, occ) in &plan.to_update {
            match store.edit(*id, occ).await {
                Ok(_) => outcome.updated += 1,
                Err(e) => {
                    error!("Failed to refresh '{}' ({}): {}", occ.name, id, e);
                    outcome.failed += 1;
                }
            }
        }

        for entry in &plan.to_delete {
            match store.delete(entry.id).await {
                Ok(()) => outcome.deleted += 1,
                Err(e) => {
                    error!("Failed to delete '{}' ({}): {}", entry.name, entry.id, e);
                    outcome.failed += 1;
                }
            }
        }

        outcome
    }
}
