use super::next_token;
use crate::errors::Result;
use crate::state::BotState;
use crate::structs::reply::{Reply, ReplyType};

use lazy_static::lazy_static;
use regex::Regex;
use serenity::model::channel::Message;
use serenity::prelude::*;

const USAGE: &str = "Usage: `!sm modrole add|remove <@role|id>` or `!sm modrole list`";
const OWNER_ONLY: &str = "❌ Only the server owner can manage moderator roles!";

pub(super) async fn dispatch<'a>(
    ctx: &Context,
    msg: &'a Message,
    state: &BotState,
    rest: &str,
) -> Result<Reply<'a>> {
    let (action, args) = next_token(rest).unwrap_or(("", ""));
    match action {
        "add" => add(ctx, msg, state, args),
        "remove" => remove(ctx, msg, state, args),
        "list" => list(msg, state),
        _ => Ok(Reply::new_const(USAGE, ReplyType::Message(msg))),
    }
}

fn parse_role_token(token: &str) -> Option<u64> {
    lazy_static! {
        static ref RE: Regex = Regex::new(r"^<@&(\d+)>$").unwrap();
    }
    match RE.captures(token) {
        Some(caps) => caps[1].parse().ok(),
        None => token.parse().ok(),
    }
}

/// Changing who may manage stickies is reserved for the guild owner; a
/// moderator role must not be able to grant itself company.
fn author_is_owner(ctx: &Context, msg: &Message, state: &BotState) -> Result<bool> {
    let author_id = *msg.author.id.as_u64();
    let cached_owner = msg
        .guild_id
        .and_then(|id| id.to_guild_cached(&ctx.cache))
        .map(|guild| *guild.owner_id.as_u64());
    if let Some(owner_id) = cached_owner {
        return Ok(owner_id == author_id);
    }
    state.can_manage(*msg.guild_id.unwrap().as_u64(), author_id, &[])
}

fn parse_single_role(args: &str) -> Option<u64> {
    let (token, rest) = next_token(args)?;
    if !rest.is_empty() {
        return None;
    }
    parse_role_token(token)
}

fn add<'a>(ctx: &Context, msg: &'a Message, state: &BotState, args: &str) -> Result<Reply<'a>> {
    if !author_is_owner(ctx, msg, state)? {
        return Ok(Reply::new_const(OWNER_ONLY, ReplyType::Message(msg)));
    }
    let role_id = match parse_single_role(args) {
        Some(role_id) => role_id,
        None => return Ok(Reply::new_const(USAGE, ReplyType::Message(msg))),
    };

    let added = state.add_mod_role(*msg.guild_id.unwrap().as_u64(), role_id)?;
    if !added {
        return Ok(Reply::new_const(
            "That role is already a moderator role.",
            ReplyType::Message(msg),
        ));
    }
    state.persist()?;
    Ok(Reply::new(
        format!("✅ <@&{role_id}> can now manage sticky messages!"),
        ReplyType::Message(msg),
    ))
}

fn remove<'a>(ctx: &Context, msg: &'a Message, state: &BotState, args: &str) -> Result<Reply<'a>> {
    if !author_is_owner(ctx, msg, state)? {
        return Ok(Reply::new_const(OWNER_ONLY, ReplyType::Message(msg)));
    }
    let role_id = match parse_single_role(args) {
        Some(role_id) => role_id,
        None => return Ok(Reply::new_const(USAGE, ReplyType::Message(msg))),
    };

    let removed = state.remove_mod_role(*msg.guild_id.unwrap().as_u64(), role_id)?;
    if !removed {
        return Ok(Reply::new_const(
            "❌ That role is not a moderator role!",
            ReplyType::Message(msg),
        ));
    }
    state.persist()?;
    Ok(Reply::new(
        format!("✅ <@&{role_id}> can no longer manage sticky messages."),
        ReplyType::Message(msg),
    ))
}

fn list<'a>(msg: &'a Message, state: &BotState) -> Result<Reply<'a>> {
    let roles = state.mod_roles(*msg.guild_id.unwrap().as_u64())?;
    if roles.is_empty() {
        return Ok(Reply::new_const(
            "No moderator roles configured, only the server owner can manage stickies.",
            ReplyType::Message(msg),
        ));
    }

    let response = format!(
        "Moderator roles: {}",
        roles
            .into_iter()
            .map(|role_id| format!("<@&{role_id}>"))
            .collect::<Vec<String>>()
            .join(", ")
    );
    Ok(Reply::new(response, ReplyType::Channel(msg.channel_id)))
}
