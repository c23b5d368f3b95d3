use crate::commands::{create_error_embed, create_success_embed, CommandResult, Context};
use crate::components::event_sync::SyncReport;
use crate::components::EventSyncHandle;
use crate::error::Error;
use crate::utils::time::discord_timestamp;
use tracing::{debug, error};

async fn event_sync_handle(ctx: &Context<'_>) -> Option<EventSyncHandle> {
    match &ctx.data().component_manager {
        Some(cm) => cm.event_sync_handle().await,
        None => {
            debug!("ComponentManager not available");
            None
        }
    }
}

/// Reconcile the guild's scheduled events with the calendar feeds right now
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    required_permissions = "MANAGE_EVENTS"
)]
pub async fn sync_now(ctx: Context<'_>) -> CommandResult {
    ctx.defer().await?;

    let Some(handle) = event_sync_handle(&ctx).await else {
        ctx.send(poise::CreateReply::default().embed(create_error_embed(
            "Event sync",
            "Event sync is not enabled",
        )))
        .await?;
        return Ok(());
    };

    let embed = match handle.run_pass().await {
        Ok(report) => create_success_embed("Sync complete", &format_report(&report)),
        Err(Error::PassInProgress) => {
            create_error_embed("Event sync", "A sync pass is already running, try again shortly")
        }
        Err(e) => {
            error!("Manual sync pass failed: {}", e);
            create_error_embed("Sync failed", &e.to_string())
        }
    };

    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Show the outcome of the most recent sync pass
#[poise::command(slash_command, prefix_command, guild_only)]
pub async fn sync_status(ctx: Context<'_>) -> CommandResult {
    let Some(handle) = event_sync_handle(&ctx).await else {
        ctx.send(
            poise::CreateReply::default()
                .embed(create_error_embed("Event sync", "Event sync is not enabled"))
                .ephemeral(true),
        )
        .await?;
        return Ok(());
    };

    let description = match handle.last_report().await? {
        Some(report) if handle.is_running() => {
            format!("A pass is running now.\n\n{}", format_report(&report))
        }
        Some(report) => format_report(&report),
        None if handle.is_running() => "The first pass is running now.".to_string(),
        None => "No pass has completed yet.".to_string(),
    };

    ctx.send(
        poise::CreateReply::default()
            .embed(create_success_embed("Event sync status", &description))
            .ephemeral(true),
    )
    .await?;
    Ok(())
}

pub fn format_report(report: &SyncReport) -> String {
    let mut lines = vec![
        format!(
            "Feeds: {} ok, {} failed",
            report.feeds_ok, report.feeds_failed
        ),
        format!("Occurrences in window: {}", report.occurrences),
        format!(
            "Created {}, updated {}, deleted {}",
            report.created, report.updated, report.deleted
        ),
    ];
    if report.failed > 0 {
        lines.push(format!("Failed operations: {}", report.failed));
    }
    if report.definitions_skipped > 0 {
        lines.push(format!("Skipped events: {}", report.definitions_skipped));
    }
    if report.sweep_suppressed {
        lines.push("Stale events were kept because a feed failed".to_string());
    }
    if let Some(finished) = report.finished_at {
        lines.push(format!("Finished {}", discord_timestamp(finished, 'R')));
    }
    lines.join("\n")
}
