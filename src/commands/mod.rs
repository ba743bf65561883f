use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use crate::{
    config::Config,
    services::{
        geocoding::{GeocodingService, GoogleMapsService},
        location::SharedLocations,
        static_map::StaticMap,
        Place,
    },
    session::{RouteDisplay, SearchOutcome, SearchSession, SessionOptions},
    GenericError, RouteError,
};

use log::*;
use serenity::{
    framework::standard::{
        help_commands::with_embeds,
        macros::{command, group, help},
        Args, CommandGroup, CommandResult, HelpOptions,
    },
    model::{channel::Message, id::UserId},
    prelude::*,
};

/// Discord messages are capped at 2000 characters.
const MESSAGE_LIMIT: usize = 2000;

/// State shared by every command.
pub struct RouteBot {
    config: Config,
    maps: Arc<GoogleMapsService>,
    locations: SharedLocations,
    sessions: Mutex<HashMap<u64, Arc<SearchSession<StaticMap>>>>,
}

impl TypeMapKey for RouteBot {
    type Value = Arc<RouteBot>;
}

impl RouteBot {
    pub fn new(config: Config) -> Result<Self, RouteError> {
        Ok(RouteBot {
            maps: Arc::new(GoogleMapsService::new(&config)?),
            config,
            locations: SharedLocations::new(),
            sessions: Mutex::new(HashMap::new()),
        })
    }

    pub async fn session(&self, user: u64) -> Arc<SearchSession<StaticMap>> {
        let mut sessions = self.sessions.lock().await;
        sessions
            .entry(user)
            .or_insert_with(|| {
                let mut surface = StaticMap::new(self.config.map_width, self.config.map_height)
                    .with_max_path_points(self.config.map_path_points);
                if let Some(key) = &self.config.static_maps_key {
                    surface = surface.with_api_key(key.clone());
                }
                Arc::new(SearchSession::new(
                    surface,
                    self.maps.clone(),
                    self.maps.clone(),
                    Arc::new(self.locations.for_user(user)),
                    SessionOptions::from(&self.config),
                ))
            })
            .clone()
    }

    pub async fn share_location(&self, user: u64, text: &str) -> Result<Place, RouteError> {
        let place = self.maps.geocode(text.trim()).await?;
        self.locations.share(user, place.coordinate).await;
        Ok(place)
    }
}

async fn route_bot(ctx: &Context) -> Result<Arc<RouteBot>, GenericError> {
    let data = ctx.data.read().await;
    data.get::<RouteBot>()
        .cloned()
        .ok_or_else(|| "RouteBot missing from client data".into())
}

async fn say(ctx: &Context, msg: &Message, text: impl std::fmt::Display) {
    if let Err(why) = msg.channel_id.say(&ctx.http, text).await {
        warn!("Error sending message: {:?}", why);
    }
}

pub fn location_prompt(prefix: &str) -> String {
    format!("I need your location for that. Share it with `{prefix} location <place>`.")
}

pub fn describe_route(display: &RouteDisplay, map_url: &str) -> String {
    let via = display
        .route
        .summary
        .as_deref()
        .map(|summary| format!(" via {summary}"))
        .unwrap_or_default();
    format!(
        "Route to **{}**{} from {}.\n{}",
        display.destination.label, via, display.origin, map_url
    )
}

/// Describes the route with a map link, thinning the drawn path until the
/// reply fits in one message. Falls back to a map without the path, then to
/// a truncated reply with no map at all.
pub fn route_reply(display: &RouteDisplay, map: &StaticMap) -> String {
    let mut budget = map.max_path_points();
    loop {
        let reply = describe_route(display, &map.url_with_max_path_points(budget));
        if reply.len() <= MESSAGE_LIMIT {
            return reply;
        }
        if budget == 0 {
            break;
        }
        debug!("Route reply too long with {} path points.", budget);
        budget = if budget > 2 { budget / 2 } else { 0 };
    }
    let mut reply = describe_route(display, "(map unavailable)");
    if reply.len() > MESSAGE_LIMIT {
        let cut = (0..=MESSAGE_LIMIT)
            .rev()
            .find(|&i| reply.is_char_boundary(i))
            .unwrap_or(0);
        reply.truncate(cut);
    }
    reply
}

pub fn error_reply(error: &RouteError, prefix: &str) -> String {
    match error {
        RouteError::PermissionDenied => {
            format!("Location sharing is off. Use `{prefix} location <place>` to turn it back on.")
        }
        RouteError::GeocodeNotFound(query) => format!("Couldn't find {query:?}."),
        RouteError::LocationUnavailable(_) => {
            format!("No location received. {}", location_prompt(prefix))
        }
        RouteError::DirectionsEmptyResult => "No route found to that destination.".to_string(),
        other => format!("Something went wrong: {other}"),
    }
}

#[help]
pub async fn help(
    context: &Context,
    msg: &Message,
    args: Args,
    help_options: &'static HelpOptions,
    groups: &[&'static CommandGroup],
    owners: HashSet<UserId>,
) -> CommandResult {
    let _ = with_embeds(context, msg, args, help_options, groups, owners).await?;
    Ok(())
}

#[group]
#[commands(to, location, clear, geojson)]
pub struct General;

#[command]
#[description("Show the route from your location to a destination.")]
#[usage("[destination]")]
#[example("Tokyo Tower")]
async fn to(ctx: &Context, msg: &Message, args: Args) -> CommandResult {
    let bot = route_bot(ctx).await?;
    let user = msg.author.id.0;
    let session = bot.session(user).await;
    let prompt = bot.locations.prompt_signal(user).await;
    trace!("Received route command from {}.", user);

    let search = session.search(args.rest());
    tokio::pin!(search);
    let outcome = loop {
        tokio::select! {
            outcome = &mut search => break outcome,
            _ = prompt.notified() => say(ctx, msg, location_prompt(&bot.config.prefix)).await,
        }
    };

    match outcome {
        Ok(SearchOutcome::Ignored) => {}
        Ok(SearchOutcome::Displayed(display)) => {
            let reply = session.inspect(|map| route_reply(&display, map)).await;
            say(ctx, msg, reply).await;
        }
        Err(e) if !e.is_reportable() => debug!("Dropping reply for superseded search."),
        Err(e) => say(ctx, msg, error_reply(&e, &bot.config.prefix)).await,
    }
    Ok(())
}

#[command]
#[description("Share your location with the route finder.")]
#[usage("[location]")]
#[example("London")]
async fn location(ctx: &Context, msg: &Message, args: Args) -> CommandResult {
    let bot = route_bot(ctx).await?;
    let reply = match bot.share_location(msg.author.id.0, args.rest()).await {
        Ok(place) => format!("Location {} received ({}).", place.label, place.coordinate),
        Err(e) => error_reply(&e, &bot.config.prefix),
    };
    say(ctx, msg, reply).await;
    Ok(())
}

#[command]
#[description = "Stop sharing your location."]
#[usage("")]
async fn clear(ctx: &Context, msg: &Message) -> CommandResult {
    let bot = route_bot(ctx).await?;
    bot.locations.revoke(msg.author.id.0).await;
    say(ctx, msg, "Location cleared.").await;
    Ok(())
}

#[command]
#[description = "Export your current map as GeoJSON."]
#[usage("")]
async fn geojson(ctx: &Context, msg: &Message) -> CommandResult {
    let bot = route_bot(ctx).await?;
    let session = bot.session(msg.author.id.0).await;
    let json = serde_json::to_string(&session.inspect(|map| map.to_geojson()).await)?;
    let reply = format!("```json\n{json}\n```");
    if reply.len() > MESSAGE_LIMIT {
        say(ctx, msg, "That map is too large to post.").await;
    } else {
        say(ctx, msg, reply).await;
    }
    Ok(())
}
