use super::fetcher::{feed_label, FeedFetcher};
use super::ics::parse_calendar;
use super::models::{Occurrence, SyncReport};
use super::normalize::OccurrenceNormalizer;
use super::reconcile::Reconciler;
use super::recurrence::expand;
use super::store::EventStore;
use super::time::build_definition;
use crate::config::SyncSettings;
use crate::error::{config_error, BotResult};
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, error, info, warn};

/// Occurrences gathered from every feed that could be read
#[derive(Debug, Default)]
struct DesiredState {
    desired: Vec<Occurrence>,
    cancelled: Vec<Occurrence>,
}

/// Run one full reconciliation pass.
///
/// Feed, definition and mutation failures are logged and counted in the
/// report. Only a failure to list the store aborts the pass.
pub async fn run_pass(
    settings: &SyncSettings,
    fetcher: &dyn FeedFetcher,
    store: &dyn EventStore,
    now: DateTime<Utc>,
) -> BotResult<SyncReport> {
    let window_end = Duration::try_days(settings.sync_days)
        .and_then(|days| now.checked_add_signed(days))
        .ok_or_else(|| {
            config_error(&format!(
                "A {} day window reaches past the supported date range",
                settings.sync_days
            ))
        })?;
    let mut report = SyncReport::default();

    let state = collect_desired(settings, fetcher, now, window_end, &mut report).await;
    report.occurrences = state.desired.len();

    let current = match store.list_entries().await {
        Ok(entries) => entries,
        Err(e) => {
            error!("Cannot list scheduled events, aborting pass: {}", e);
            return Err(e);
        }
    };

    let sweep_allowed = report.feeds_failed == 0;
    if !sweep_allowed {
        warn!(
            "{} feed(s) failed, not removing events missing from feeds this pass",
            report.feeds_failed
        );
    }
    report.sweep_suppressed = !sweep_allowed;

    let reconciler = Reconciler::new(settings);
    let plan = reconciler.plan(
        &state.desired,
        &state.cancelled,
        &current,
        now,
        sweep_allowed,
    );
    if plan.is_empty() {
        debug!("Store already matches the feeds");
    } else {
        info!("Applying {} change(s) to the store", plan.len());
    }
    let outcome = reconciler.apply(plan, store).await;

    report.created = outcome.created;
    report.updated = outcome.updated;
    report.deleted = outcome.deleted;
    report.failed = outcome.failed;
    report.finished_at = Some(Utc::now());

    info!(
        "Sync pass done: {} occurrences, {} created, {} updated, {} deleted, {} failed",
        report.occurrences, report.created, report.updated, report.deleted, report.failed
    );
    Ok(report)
}

async fn collect_desired(
    settings: &SyncSettings,
    fetcher: &dyn FeedFetcher,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    report: &mut SyncReport,
) -> DesiredState {
    let normalizer = OccurrenceNormalizer::new(settings);
    let mut state = DesiredState::default();

    for url in &settings.feed_urls {
        let label = feed_label(url);

        let content = match fetcher.fetch(url).await {
            Ok(content) => content,
            Err(e) => {
                warn!("Skipping feed {}: {}", label, e);
                report.feeds_failed += 1;
                continue;
            }
        };

        let definitions = match parse_calendar(&label, &content) {
            Ok(defs) => defs,
            Err(e) => {
                warn!("Skipping feed {}: {}", label, e);
                report.feeds_failed += 1;
                continue;
            }
        };
        report.feeds_ok += 1;

        for raw in &definitions {
            let expansion = build_definition(raw, settings.naive_time_policy)
                .and_then(|def| expand(&def, window_start, window_end));

            match expansion {
                Ok(expansion) => {
                    state.desired.extend(
                        expansion
                            .occurrences
                            .into_iter()
                            .map(|o| normalizer.normalize(o)),
                    );
                    state.cancelled.extend(
                        expansion
                            .cancelled
                            .into_iter()
                            .map(|o| normalizer.normalize(o)),
                    );
                }
                Err(e) => {
                    warn!("Skipping event '{}' in {}: {}", raw.uid, label, e);
                    report.definitions_skipped += 1;
                }
            }
        }
    }

    // Stable, so the first feed still wins between identical keys
    state.desired.sort_by_key(|o| o.start_utc);
    state
}
