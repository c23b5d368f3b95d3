use crate::commands::{create_error_embed, get_all_application_commands, CommandContext};
use crate::components::{ComponentManager, EventSync};
use crate::config::Config;
use crate::error::Error;
use crate::shutdown;
use poise::serenity_prelude as serenity;
use poise::serenity_prelude::OnlineStatus;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Initialize logging with environment-based configuration
pub fn init_logging() -> miette::Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,serenity=warn,poise=warn")),
        )
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| Error::Other(format!("Failed to set up logging: {}", e)))?;

    Ok(())
}

/// Load the application config once; it is never re-read afterwards
pub fn load_config() -> miette::Result<Arc<Config>> {
    match Config::load() {
        Ok(config) => {
            info!(
                "Loaded configuration: {} feed(s), {} day window, every {}s",
                config.sync.feed_urls.len(),
                config.sync.sync_days,
                config.sync_interval_secs
            );
            Ok(Arc::new(config))
        }
        Err(e) => {
            error!("Failed to load configuration: {:?}", e);
            Err(e.into())
        }
    }
}

/// Initialize and start the Discord bot
pub async fn start_bot(config: Arc<Config>) -> miette::Result<()> {
    let token = config.discord_token.clone();
    let activity = config.activity.clone();

    // Set up framework options
    let options = poise::FrameworkOptions {
        commands: get_all_application_commands(),
        on_error: |error| Box::pin(on_error(error)),
        prefix_options: poise::PrefixFrameworkOptions {
            prefix: Some("!".to_string()),
            ..Default::default()
        },
        ..Default::default()
    };

    // Scheduled events need the guild intent
    let intents =
        serenity::GatewayIntents::non_privileged() | serenity::GatewayIntents::GUILD_SCHEDULED_EVENTS;

    let mut component_manager = ComponentManager::new(Arc::clone(&config));
    if config.is_component_enabled("event_sync") {
        component_manager.register(EventSync::new());
    } else {
        warn!("Event sync component is disabled");
    }

    // Create a shared component manager
    let component_manager = Arc::new(component_manager);

    // Create a shared data context for commands
    let command_data = CommandContext::new(Arc::clone(&config))
        .with_component_manager(Arc::clone(&component_manager));

    // Create shutdown channel
    let (shutdown_send, shutdown_recv) = oneshot::channel();

    // Spawn signal handler task
    let shutdown_components = Arc::clone(&component_manager);
    tokio::spawn(async move {
        shutdown::handle_signals(shutdown_send, shutdown_components).await;
    });

    let guild_id = serenity::GuildId::new(config.guild_id);
    let client_result = serenity::ClientBuilder::new(token, intents)
        .framework(poise::Framework::new(
            options,
            move |ctx, ready, framework| {
                Box::pin(async move {
                    info!("{} is connected!", ready.user.name);

                    // Set the bot's status
                    ctx.set_presence(
                        Some(serenity::ActivityData::watching(&activity)),
                        OnlineStatus::Online,
                    );
                    info!("Setting activity to {}", activity);

                    if let Err(e) = component_manager.init_all(ctx).await {
                        error!("Failed to initialize components: {:?}", e);
                    }

                    // Guild registration shows up immediately, unlike global commands
                    if let Err(e) = poise::builtins::register_in_guild(
                        ctx,
                        &framework.options().commands,
                        guild_id,
                    )
                    .await
                    {
                        error!("Failed to register slash commands: {:?}", e);
                    } else {
                        info!("Slash commands registered in guild {}", guild_id);
                    }

                    Ok(command_data)
                })
            },
        ))
        .await;

    // Start the bot
    info!("Starting bot...");
    let mut client = client_result.map_err(Error::from)?;

    let client_handle = tokio::spawn(async move {
        if let Err(e) = client.start().await {
            Err(Error::from(e))
        } else {
            Ok(())
        }
    });

    // Wait for either the client to end or a shutdown signal
    tokio::select! {
        result = client_handle => {
            info!("Bot process ended");
            match result {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(e.into()),
                Err(e) => {
                    error!("Client task error: {:?}", e);
                    Err(Error::Other(format!("Client task error: {}", e)).into())
                }
            }
        }
        _ = shutdown_recv => {
            info!("Received shutdown signal, shutting down bot...");
            Ok(())
        }
    }
}

/// Handle errors from commands
async fn on_error(error: poise::FrameworkError<'_, CommandContext, Error>) {
    match error {
        poise::FrameworkError::Setup { error, .. } => {
            error!("Error during setup: {:?}", error);
        }
        poise::FrameworkError::Command { error, ctx, .. } => {
            error!("Error in command '{}': {:?}", ctx.command().name, error);
            if let Err(e) = ctx
                .send(
                    poise::CreateReply::default()
                        .embed(create_error_embed("Command error", &format!("{}", error)))
                        .ephemeral(true),
                )
                .await
            {
                error!("Error while sending error message: {:?}", e);
            }
        }
        poise::FrameworkError::MissingUserPermissions { ctx, .. } => {
            if let Err(e) = ctx
                .send(
                    poise::CreateReply::default()
                        .embed(create_error_embed(
                            "Missing permissions",
                            "You need the Manage Events permission for this command",
                        ))
                        .ephemeral(true),
                )
                .await
            {
                error!("Error while sending error message: {:?}", e);
            }
        }
        error => {
            error!("Other error: {:?}", error);
        }
    }
}
