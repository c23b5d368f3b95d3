use super::fetcher::FeedFetcher;
use super::models::SyncReport;
use super::pass::run_pass;
use super::store::EventStore;
use crate::config::{Config, SyncSettings};
use crate::error::{component_error, BotResult};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info};

/// The Event Sync actor that runs reconciliation passes one at a time
pub struct EventSyncActor {
    settings: SyncSettings,
    fetcher: Arc<dyn FeedFetcher>,
    store: Arc<dyn EventStore>,
    last_report: Option<SyncReport>,
    command_rx: mpsc::Receiver<EventSyncCommand>,
}

/// Commands that can be sent to the Event Sync actor
pub enum EventSyncCommand {
    RunPass(mpsc::Sender<BotResult<SyncReport>>),
    LastReport(mpsc::Sender<Option<SyncReport>>),
    Shutdown,
}

/// Handle for communicating with the Event Sync actor
#[derive(Clone)]
pub struct EventSyncActorHandle {
    command_tx: mpsc::Sender<EventSyncCommand>,
}

impl EventSyncActorHandle {
    /// Run a pass and wait for its report
    pub async fn run_pass(&self) -> BotResult<SyncReport> {
        let (response_tx, mut response_rx) = mpsc::channel(1);
        self.command_tx
            .send(EventSyncCommand::RunPass(response_tx))
            .await
            .map_err(|e| component_error(&format!("Actor mailbox error: {}", e)))?;

        response_rx
            .recv()
            .await
            .ok_or_else(|| component_error("Response channel closed"))?
    }

    /// Report of the most recent completed pass
    pub async fn last_report(&self) -> BotResult<Option<SyncReport>> {
        let (response_tx, mut response_rx) = mpsc::channel(1);
        self.command_tx
            .send(EventSyncCommand::LastReport(response_tx))
            .await
            .map_err(|e| component_error(&format!("Actor mailbox error: {}", e)))?;

        response_rx
            .recv()
            .await
            .ok_or_else(|| component_error("Response channel closed"))
    }

    /// Shutdown the actor
    pub async fn shutdown(&self) -> BotResult<()> {
        let _ = self.command_tx.send(EventSyncCommand::Shutdown).await;
        Ok(())
    }
}

impl EventSyncActor {
    /// Create a new actor and return its handle
    pub fn new(
        config: Arc<Config>,
        fetcher: Arc<dyn FeedFetcher>,
        store: Arc<dyn EventStore>,
    ) -> (Self, EventSyncActorHandle) {
        let (command_tx, command_rx) = mpsc::channel(8);

        let actor = Self {
            settings: config.sync_settings(),
            fetcher,
            store,
            last_report: None,
            command_rx,
        };

        (actor, EventSyncActorHandle { command_tx })
    }

    /// Start the actor's processing loop
    pub async fn run(&mut self) {
        info!("Event Sync actor started");

        while let Some(cmd) = self.command_rx.recv().await {
            match cmd {
                EventSyncCommand::RunPass(response_tx) => {
                    let result = self.run_pass().await;
                    let _ = response_tx.send(result).await;
                }
                EventSyncCommand::LastReport(response_tx) => {
                    let _ = response_tx.send(self.last_report.clone()).await;
                }
                EventSyncCommand::Shutdown => {
                    info!("Event Sync actor shutting down");
                    break;
                }
            }
        }

        info!("Event Sync actor shut down");
    }

    async fn run_pass(&mut self) -> BotResult<SyncReport> {
        let result = run_pass(
            &self.settings,
            self.fetcher.as_ref(),
            self.store.as_ref(),
            Utc::now(),
        )
        .await;

        match &result {
            Ok(report) => self.last_report = Some(report.clone()),
            Err(e) => error!("Sync pass failed: {}", e),
        }
        result
    }
}
