use std::sync::Arc;

use log::{info, trace, warn};

use route_bot::{
    commands::{RouteBot, GENERAL_GROUP, HELP},
    config::Config,
    GenericError,
};

use serenity::{
    async_trait,
    framework::StandardFramework,
    http::Http,
    model::prelude::Ready,
    prelude::{Client, Context, EventHandler, GatewayIntents},
};

struct Handler;

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, _: Context, ready: Ready) {
        info!("{} is connected!", ready.user.name);
    }
}

#[tokio::main]
async fn main() -> Result<(), GenericError> {
    env_logger::builder()
        .filter_module("route_bot", log::LevelFilter::Trace)
        .init();
    trace!("Logger init with level TRACE.");

    let config = Config::from_env()?;
    let token = config
        .discord_token
        .clone()
        .ok_or("DISCORD_TOKEN not set.")?;
    let http = Http::new(&token);
    let bot_id = http.get_current_user().await?.id;

    let framework = StandardFramework::new()
        .configure(|c| {
            c.with_whitespace(true)
                .on_mention(Some(bot_id))
                .prefix(config.prefix.as_str())
        })
        .help(&HELP)
        .group(&GENERAL_GROUP);

    let bot = Arc::new(RouteBot::new(config)?);
    let intents = GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::DIRECT_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;
    let mut client = Client::builder(&token, intents)
        .event_handler(Handler)
        .framework(framework)
        .type_map_insert::<RouteBot>(bot)
        .await?;

    if let Err(why) = client.start().await {
        warn!("Client error: {:?}", why);
    }
    Ok(())
}
