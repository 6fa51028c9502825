#![warn(
    clippy::cognitive_complexity,
    clippy::missing_const_for_fn,
    clippy::option_if_let_else
)]

mod errors;
mod handler;
mod state;
mod structs;

use log::LevelFilter;
use log::{error, info, warn};
use serenity::model::gateway::GatewayIntents;
use serenity::prelude::*;
use simple_logger::SimpleLogger;
use time::UtcOffset;

use std::env;
use std::sync::Arc;
use std::time::Duration;

use handler::{log_error, Handler};
use state::BotState;
use store::structs::Document;
use store::{Store, DATA_PATH};

/// Wall-clock gap between autosaves. Mutating commands save on their own,
/// this catches the repost bookkeeping in between.
const AUTOSAVE_INTERVAL: Duration = Duration::from_secs(300);

fn load_document(store: &Store) -> Document {
    match store.load() {
        Ok(doc) => {
            info!("loaded data file from {DATA_PATH}");
            doc
        }
        Err(why) => {
            warn!("Failed to load data file, starting empty: {why}");
            Document::default()
        }
    }
}

async fn autosave_loop(state: Arc<BotState>) {
    let mut ticker = tokio::time::interval(AUTOSAVE_INTERVAL);
    // the first tick fires immediately, nothing to save yet
    ticker.tick().await;
    loop {
        ticker.tick().await;
        log_error(state.persist(), "Autosave");
    }
}

#[tokio::main]
async fn main() {
    SimpleLogger::new()
        .with_level(LevelFilter::Warn)
        .with_module_level("bot", LevelFilter::Debug)
        .with_module_level("store", LevelFilter::Debug)
        // EST offset, will be incorrect if it runs over DST
        // Could we please abolish DST
        .with_utc_offset(UtcOffset::from_hms(-4, 0, 0).unwrap())
        .init()
        .unwrap();
    // Configure the client with your Discord bot token in the environment.
    let token = env::var("DISCORD_TOKEN").expect("Expected a token in the environment");

    // init for tokio metrics
    console_subscriber::init();

    let store = Store::new(DATA_PATH);
    let state = Arc::new(BotState::new(&load_document(&store), store));

    tokio::spawn(autosave_loop(Arc::clone(&state)));

    let intents = GatewayIntents::GUILDS
        .union(GatewayIntents::GUILD_MESSAGES)
        .union(GatewayIntents::MESSAGE_CONTENT);

    let mut client = Client::builder(&token, intents)
        .event_handler(Handler::new(Arc::clone(&state)))
        .await
        .expect("Err creating client");

    // Finally, start a single shard, and start listening to events.
    //
    // Shards will automatically attempt to reconnect, and will perform
    // exponential backoff until it reconnects.
    if let Err(why) = client.start().await {
        error!("Client error: {:?}", why);
    }

    // one last save so a restart picks up where this run stopped
    log_error(state.persist(), "Final save");
}
