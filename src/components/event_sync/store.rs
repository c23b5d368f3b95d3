use super::models::{EntryStatus, Occurrence, RemoteScheduledEntry};
use crate::error::{malformed_timestamp, store_error_from_serenity, BotResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use poise::serenity_prelude as serenity;
use poise::serenity_prelude::{
    CreateScheduledEvent, EditScheduledEvent, GuildId, ScheduledEvent, ScheduledEventId,
    ScheduledEventStatus, ScheduledEventType, Timestamp,
};
use std::sync::Arc;
use tracing::{debug, info};

/// Remote collection of scheduled entries that the engine reconciles against
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Every entry currently known to the store
    async fn list_entries(&self) -> BotResult<Vec<RemoteScheduledEntry>>;

    /// Create an external-location entry for an occurrence
    async fn create(&self, occurrence: &Occurrence) -> BotResult<RemoteScheduledEntry>;

    /// Rewrite description and end time of an existing entry
    async fn edit(&self, id: u64, occurrence: &Occurrence) -> BotResult<RemoteScheduledEntry>;

    async fn delete(&self, id: u64) -> BotResult<()>;
}

/// Guild scheduled events, accessed over the Discord REST API
#[derive(Clone)]
pub struct DiscordEventStore {
    http: Arc<serenity::Http>,
    guild_id: GuildId,
}

impl DiscordEventStore {
    pub fn new(http: Arc<serenity::Http>, guild_id: u64) -> Self {
        Self {
            http,
            guild_id: GuildId::new(guild_id),
        }
    }
}

#[async_trait]
impl EventStore for DiscordEventStore {
    async fn list_entries(&self) -> BotResult<Vec<RemoteScheduledEntry>> {
        let events = self
            .guild_id
            .scheduled_events(&*self.http, false)
            .await
            .map_err(|e| store_error_from_serenity("list", e))?;

        debug!("Guild {} has {} scheduled events", self.guild_id, events.len());
        events.into_iter().map(entry_from_event).collect()
    }

    async fn create(&self, occurrence: &Occurrence) -> BotResult<RemoteScheduledEntry> {
        let builder = CreateScheduledEvent::new(
            ScheduledEventType::External,
            occurrence.name.clone(),
            to_timestamp(occurrence.start_utc)?,
        )
        .description(occurrence.description.clone())
        .end_time(to_timestamp(occurrence.end_utc)?)
        .location(occurrence.location.clone());

        let event = self
            .guild_id
            .create_scheduled_event(&*self.http, builder)
            .await
            .map_err(|e| store_error_from_serenity("create", e))?;

        info!(
            "Created scheduled event '{}' at {} ({})",
            event.name, occurrence.start_utc, event.id
        );
        entry_from_event(event)
    }

    async fn edit(&self, id: u64, occurrence: &Occurrence) -> BotResult<RemoteScheduledEntry> {
        let builder = EditScheduledEvent::new()
            .description(occurrence.description.clone())
            .end_time(to_timestamp(occurrence.end_utc)?);

        let event = self
            .guild_id
            .edit_scheduled_event(&*self.http, ScheduledEventId::new(id), builder)
            .await
            .map_err(|e| store_error_from_serenity("edit", e))?;

        info!("Refreshed scheduled event '{}' ({})", event.name, event.id);
        entry_from_event(event)
    }

    async fn delete(&self, id: u64) -> BotResult<()> {
        self.guild_id
            .delete_scheduled_event(&*self.http, ScheduledEventId::new(id))
            .await
            .map_err(|e| store_error_from_serenity("delete", e))?;

        info!("Deleted scheduled event {}", id);
        Ok(())
    }
}

fn entry_from_event(event: ScheduledEvent) -> BotResult<RemoteScheduledEntry> {
    let start_utc = from_timestamp(event.start_time)?;
    let end_utc = match event.end_time {
        Some(end) => from_timestamp(end)?,
        None => start_utc,
    };

    Ok(RemoteScheduledEntry {
        id: event.id.get(),
        name: event.name,
        description: event.description.unwrap_or_default(),
        location: event
            .metadata
            .and_then(|m| m.location)
            .unwrap_or_default(),
        start_utc,
        end_utc,
        status: map_status(event.status),
    })
}

fn map_status(status: ScheduledEventStatus) -> EntryStatus {
    match status {
        ScheduledEventStatus::Active => EntryStatus::Active,
        ScheduledEventStatus::Completed => EntryStatus::Completed,
        ScheduledEventStatus::Canceled => EntryStatus::Cancelled,
        _ => EntryStatus::Scheduled,
    }
}

fn to_timestamp(dt: DateTime<Utc>) -> BotResult<Timestamp> {
    Timestamp::from_unix_timestamp(dt.timestamp())
        .map_err(|_| malformed_timestamp(&format!("{} is outside Discord's range", dt)))
}

fn from_timestamp(ts: Timestamp) -> BotResult<DateTime<Utc>> {
    DateTime::from_timestamp(ts.unix_timestamp(), 0)
        .ok_or_else(|| malformed_timestamp(&format!("Store returned invalid timestamp {}", ts)))
}
