use super::actor::{EventSyncActor, EventSyncActorHandle};
use super::fetcher::FeedFetcher;
use super::models::SyncReport;
use super::store::EventStore;
use crate::config::Config;
use crate::error::{BotResult, Error};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Handle for interacting with the Event Sync actor
#[derive(Clone)]
pub struct EventSyncHandle {
    actor_handle: EventSyncActorHandle,
    /// Held for the whole duration of a pass
    pass_lock: Arc<Mutex<()>>,
    _actor_task: Arc<JoinHandle<()>>,
}

impl EventSyncHandle {
    /// Create a new EventSyncHandle and spawn the actor
    pub fn new(
        config: Arc<Config>,
        fetcher: Arc<dyn FeedFetcher>,
        store: Arc<dyn EventStore>,
    ) -> Self {
        let (mut actor, handle) = EventSyncActor::new(config, fetcher, store);

        let actor_task = tokio::spawn(async move {
            actor.run().await;
        });

        Self {
            actor_handle: handle,
            pass_lock: Arc::new(Mutex::new(())),
            _actor_task: Arc::new(actor_task),
        }
    }

    /// Run a pass now. Fails with [`Error::PassInProgress`] instead of queueing
    /// behind a pass that is already running.
    pub async fn run_pass(&self) -> BotResult<SyncReport> {
        let _guard = self
            .pass_lock
            .try_lock()
            .map_err(|_| Error::PassInProgress)?;
        self.actor_handle.run_pass().await
    }

    /// Whether a pass is currently running
    pub fn is_running(&self) -> bool {
        self.pass_lock.try_lock().is_err()
    }

    pub async fn last_report(&self) -> BotResult<Option<SyncReport>> {
        self.actor_handle.last_report().await
    }

    /// Shutdown the actor
    pub async fn shutdown(&self) -> BotResult<()> {
        self.actor_handle.shutdown().await
    }
}
