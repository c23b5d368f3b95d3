mod actor;
pub mod fetcher;
mod handle;
pub mod ics;
pub mod models;
pub mod normalize;
pub mod pass;
pub mod reconcile;
pub mod recurrence;
mod scheduler;
pub mod store;
pub mod time;

pub use fetcher::{FeedFetcher, HttpFeedFetcher};
pub use handle::EventSyncHandle;
pub use models::SyncReport;
pub use scheduler::EventSyncScheduler;
pub use store::{DiscordEventStore, EventStore};

use crate::config::Config;
use crate::error::BotResult;
use crate::utils::scheduler::Scheduler;
use async_trait::async_trait;
use lazy_static::lazy_static;
use poise::serenity_prelude as serenity;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

lazy_static! {
    static ref SCHEDULER_STARTED: AtomicBool = AtomicBool::new(false);
}

/// Keeps guild scheduled events in line with the configured calendar feeds
#[derive(Default)]
pub struct EventSync {
    handle: RwLock<Option<EventSyncHandle>>,
    scheduler: RwLock<Option<EventSyncScheduler>>,
}

impl EventSync {
    /// Create a new Event Sync component
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the handle if it exists
    pub async fn get_handle(&self) -> Option<EventSyncHandle> {
        self.handle.read().await.clone()
    }
}

#[async_trait]
impl super::Component for EventSync {
    fn name(&self) -> &'static str {
        "event_sync"
    }

    async fn init(&self, ctx: &serenity::Context, config: Arc<Config>) -> BotResult<()> {
        let handle = {
            let mut handle_lock = self.handle.write().await;
            match &*handle_lock {
                Some(handle) => handle.clone(),
                None => {
                    let fetcher =
                        HttpFeedFetcher::new(Duration::from_secs(config.fetch_timeout_secs))?;
                    let store = DiscordEventStore::new(ctx.http.clone(), config.guild_id);
                    let handle =
                        EventSyncHandle::new(config.clone(), Arc::new(fetcher), Arc::new(store));
                    *handle_lock = Some(handle.clone());
                    handle
                }
            }
        };

        // `ready` can fire again after a reconnect
        if SCHEDULER_STARTED.swap(true, Ordering::SeqCst) {
            warn!("Event Sync scheduler is already running, skipping initialization");
            return Ok(());
        }

        info!(
            "Syncing {} feed(s) into guild {}",
            config.sync.feed_urls.len(),
            config.guild_id
        );
        match EventSyncScheduler::start(config, handle).await {
            Ok(scheduler) => *self.scheduler.write().await = Some(scheduler),
            Err(e) => {
                error!("Failed to start Event Sync scheduler: {}", e);
                SCHEDULER_STARTED.store(false, Ordering::SeqCst);
            }
        }

        Ok(())
    }

    async fn shutdown(&self) -> BotResult<()> {
        if let Some(scheduler) = self.scheduler.write().await.take() {
            scheduler.stop().await?;
            SCHEDULER_STARTED.store(false, Ordering::SeqCst);
        }

        if let Some(handle) = &*self.handle.read().await {
            handle.shutdown().await?;
        }

        Ok(())
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}
