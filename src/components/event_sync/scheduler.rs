use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::handle::EventSyncHandle;
use crate::config::Config;
use crate::error::{BotResult, Error};
use crate::utils::scheduler::Scheduler;
use crate::utils::time::format_elapsed;

/// Runs a reconciliation pass every `sync_interval_secs`, starting immediately
pub struct EventSyncScheduler {
    token: CancellationToken,
}

impl Scheduler for EventSyncScheduler {
    type Handle = EventSyncHandle;

    fn start(
        config: Arc<Config>,
        handle: Self::Handle,
    ) -> Pin<Box<dyn Future<Output = BotResult<Self>> + Send>> {
        Box::pin(async move {
            let period = Duration::from_secs(config.sync_interval_secs);
            let token = CancellationToken::new();

            info!("Starting Event Sync scheduler, period {:?}", period);
            tokio::spawn(run_scheduler_loop(period, handle, token.clone()));

            Ok(Self { token })
        })
    }

    fn stop(&self) -> Pin<Box<dyn Future<Output = BotResult<()>> + Send + '_>> {
        Box::pin(async move {
            // A pass already underway runs to completion
            info!("Stopping Event Sync scheduler");
            self.token.cancel();
            Ok(())
        })
    }
}

/// Ticks that arrive while a pass is still running are skipped, never queued
async fn run_scheduler_loop(period: Duration, handle: EventSyncHandle, token: CancellationToken) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let started = Instant::now();
        match handle.run_pass().await {
            Ok(report) => info!(
                "Scheduled sync pass finished in {} ({} changes)",
                format_elapsed(started.elapsed()),
                report.operations()
            ),
            Err(Error::PassInProgress) => {
                warn!("Previous sync pass still running, skipping this tick")
            }
            Err(e) => error!("Scheduled sync pass failed: {}", e),
        }
    }

    info!("Event Sync scheduler stopped");
}
