use std::env;
use std::sync::Arc;

use poise::serenity_prelude::{self as serenity, GuildId, Http, UserId};
use serenity::GatewayIntents;
use steward::moderation::{UNBAN_PRESET, UNBAN_REASON};
use steward::scheduler::{Scheduler, preset};
use steward::store::Store;
use steward::{BotConfig, Data, Error, commands, handlers, logging};
use tracing::info;

/// Build the scheduler's preset registry. Presets must be registered before
/// `load_tasks` so persisted tasks can resolve them.
fn task_presets(http: Arc<Http>) -> Vec<(&'static str, steward::scheduler::TaskPreset)> {
    let unban = preset(move |args: Vec<String>| {
        let http = Arc::clone(&http);
        async move {
            let user_id: u64 = args
                .first()
                .and_then(|arg| arg.parse().ok())
                .ok_or("unban task is missing a user id")?;
            let guild_id: u64 = args
                .get(1)
                .and_then(|arg| arg.parse().ok())
                .ok_or("unban task is missing a guild id")?;

            GuildId::new(guild_id)
                .unban(&http, UserId::new(user_id))
                .await?;

            info!(user_id = %user_id, guild_id = %guild_id, reason = UNBAN_REASON, "Scheduled unban executed");
            Ok(())
        }
    });

    vec![(UNBAN_PRESET, unban)]
}

/// Main function to run the bot
async fn async_main() -> Result<(), Error> {
    // Initialize logging
    logging::init()?;

    // Load environment variables
    let token = env::var("DISCORD_TOKEN").expect("DISCORD_TOKEN must be set");
    let config = BotConfig::from_env();

    // Configure the Poise framework
    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: commands::all(),
            pre_command: |ctx| {
                Box::pin(async move {
                    logging::log_command_start(ctx);
                })
            },
            post_command: |ctx| {
                Box::pin(async move {
                    logging::log_command_end(ctx);
                })
            },
            on_error: |error| {
                Box::pin(async move {
                    logging::log_command_error(&error);
                })
            },
            ..Default::default()
        })
        .setup(move |ctx, _ready, framework| {
            Box::pin(async move {
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;

                // Load persisted records and re-arm every scheduled task
                // before any command or event can fire.
                let store = Arc::new(Store::load(&config.data_dir).await);
                let scheduler =
                    Scheduler::new(Arc::clone(&store), task_presets(Arc::clone(&ctx.http)));
                scheduler.load_tasks().await?;

                let data = Data::new(store, scheduler, config);

                // The event handlers reach the data through serenity's map.
                ctx.data.write().await.insert::<Data>(data.clone());

                logging::log_console("Commands registered and data initialized".to_string());
                Ok(data)
            })
        })
        .build();

    // Configure the Serenity client
    let intents = GatewayIntents::non_privileged() | GatewayIntents::GUILD_MEMBERS;
    let mut client = serenity::ClientBuilder::new(token, intents)
        .event_handler(handlers::Handler)
        .framework(framework)
        .await
        .expect("Failed to create client");

    info!("Starting bot...");
    // Start the bot
    if let Err(err) = client.start().await {
        eprintln!("Error starting the bot: {}", err);
    }

    Ok(())
}

fn main() {
    // Run the async main function
    let result = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(async_main());

    // Handle any errors that occurred during execution
    if let Err(err) = result {
        eprintln!("Error: {}", err);
    }
}
