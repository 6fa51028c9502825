mod embeds;
mod roles;
mod sticky;

use crate::errors::Result;
use crate::state::BotState;
use crate::structs::reply::{Reply, ReplyType};

use lazy_static::lazy_static;
use log::warn;
use regex::Regex;
use serenity::{model::channel::Message, prelude::*};

pub(super) fn has_command_prefix(command: &str) -> bool {
    lazy_static! {
        static ref RE: Regex = Regex::new(r"(?i)^!sm ").unwrap();
    }
    RE.is_match(command)
}

/// Peels the next whitespace-delimited token off the argument string.
fn next_token(args: &str) -> Option<(&str, &str)> {
    let trimmed = args.trim_start();
    if trimmed.is_empty() {
        return None;
    }
    Some(
        trimmed
            .split_once(|c: char| c.is_whitespace())
            .map_or((trimmed, ""), |(head, rest)| (head, rest.trim_start())),
    )
}

/// Guild owner or holder of a configured moderator role. The owner check
/// prefers the gateway cache so a fresh guild works before any server info
/// refresh has landed.
fn author_can_manage(ctx: &Context, msg: &Message, state: &BotState) -> Result<bool> {
    let guild_id = *msg.guild_id.unwrap().as_u64();
    let author_id = *msg.author.id.as_u64();

    let cached_owner = msg
        .guild_id
        .and_then(|id| id.to_guild_cached(&ctx.cache))
        .map(|guild| *guild.owner_id.as_u64());
    if cached_owner == Some(author_id) {
        return Ok(true);
    }

    let roles: Vec<u64> = msg.member.as_ref().map_or_else(Vec::new, |member| {
        member.roles.iter().map(|role| *role.as_u64()).collect()
    });
    state.can_manage(guild_id, author_id, &roles)
}

fn help_reply(msg: &Message) -> Reply<'_> {
    Reply::new_const(
        "Sticky message commands:\n\
         `!sm sticky add <name> <cooldown_secs> <text>` - plain text sticky in this channel\n\
         `!sm sticky embed <name> <cooldown_secs> <color> <title> | <description>` - embed sticky\n\
         `!sm sticky attach <name> <cooldown_secs> <embed_id>` - sticky from a stored embed\n\
         `!sm sticky remove <name>` - remove a sticky and its live copy\n\
         `!sm sticky list` - sticky messages in this server\n\
         `!sm embed create <embed_id> <color> <title> | <description>` - store an embed template\n\
         `!sm embed send <embed_id> [#channel]` - post a stored embed\n\
         `!sm embed list` - stored embeds in this server\n\
         `!sm modrole add|remove <@role|id>` - manage who can edit stickies (owner only)\n\
         `!sm modrole list` - configured moderator roles\n\
         Colors: blue, red, green, purple",
        ReplyType::Channel(msg.channel_id),
    )
}

pub async fn handle_command<'a>(
    ctx: &Context,
    msg: &'a Message,
    state: &BotState,
) -> Option<Reply<'a>> {
    if !has_command_prefix(&msg.content) {
        return None;
    }

    let line = msg.content[4..].trim();
    let (head, rest) = next_token(line)?;
    let ret = match head {
        "sticky" => sticky::dispatch(ctx, msg, state, rest).await,
        "embed" => embeds::dispatch(ctx, msg, state, rest).await,
        "modrole" => roles::dispatch(ctx, msg, state, rest).await,
        "help" => Ok(help_reply(msg)),
        _ => Ok(Reply::new_const(
            "Unrecognized command, try `!sm help`",
            ReplyType::Message(msg),
        )),
    };

    match ret {
        Ok(resp) => Some(resp),
        Err(why) => {
            warn!("Failed to process command {line} with err: {why}");
            Some(Reply::new_const(
                "❌ Failed to run that command!",
                ReplyType::Message(msg),
            ))
        }
    }
}
