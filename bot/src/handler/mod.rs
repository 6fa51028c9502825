mod commands;
mod sticky;

use crate::errors::Result;
use crate::state::BotState;

use log::{debug, error, info};
use serenity::{
    async_trait,
    model::{channel::Message, gateway::Ready, guild::Guild},
    prelude::*,
};
use store::structs::ServerInfo;

use std::sync::Arc;

pub struct Handler {
    state: Arc<BotState>,
}

pub fn log_error<T>(r: Result<T>, label: &str) {
    match r {
        Ok(_) => (),
        Err(why) => error!("{label} failed with error: {why}"),
    }
}

impl Handler {
    pub const fn new(state: Arc<BotState>) -> Handler {
        Handler { state }
    }
}

fn server_info_from_guild(guild: &Guild) -> ServerInfo {
    ServerInfo {
        name: guild.name.clone(),
        member_count: guild.member_count,
        icon_url: guild.icon_url(),
        banner_url: guild.banner_url(),
        description: guild.description.clone(),
        owner_id: *guild.owner_id.as_u64(),
        mod_roles: Vec::new(),
    }
}

#[async_trait]
impl EventHandler for Handler {
    async fn message(&self, ctx: Context, msg: Message) {
        // bot traffic never triggers a repost, our own least of all
        if msg.author.bot {
            return;
        }

        if msg.guild_id.is_none() {
            return;
        }

        if commands::has_command_prefix(&msg.content) {
            if let Some(reply) = commands::handle_command(&ctx, &msg, &self.state).await {
                log_error(reply.send(&ctx).await, "Command reply");
            }
            return;
        }

        log_error(
            sticky::maintain(&ctx, &msg, &self.state).await,
            "Sticky maintenance",
        );
    }

    async fn ready(&self, _: Context, ready: Ready) {
        info!("{} is connected!", ready.user.name);
    }

    async fn guild_create(&self, _ctx: Context, guild: Guild, _is_new: bool) {
        debug!("caching server info for {} ({})", guild.name, guild.id);
        log_error(
            self.state
                .refresh_server_info(*guild.id.as_u64(), server_info_from_guild(&guild)),
            "Server info refresh",
        );
    }
}
