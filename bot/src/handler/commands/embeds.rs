use super::{author_can_manage, next_token};
use crate::errors::{Error, Result};
use crate::state::BotState;
use crate::structs::payload::{color_value, EmbedPayload};
use crate::structs::reply::{Reply, ReplyType};

use chrono::Utc;
use lazy_static::lazy_static;
use regex::Regex;
use serenity::model::channel::Message;
use serenity::model::id::ChannelId;
use serenity::prelude::*;
use store::structs::StoredEmbed;

const USAGE_CREATE: &str = "Usage: `!sm embed create <embed_id> <color> <title> | <description>`";
const USAGE_SEND: &str = "Usage: `!sm embed send <embed_id> [#channel]`";
const NO_PERMISSION: &str = "❌ You need a moderator role to manage embeds!";

pub(super) async fn dispatch<'a>(
    ctx: &Context,
    msg: &'a Message,
    state: &BotState,
    rest: &str,
) -> Result<Reply<'a>> {
    let (action, args) = next_token(rest).unwrap_or(("", ""));
    match action {
        "create" => create(ctx, msg, state, args).await,
        "send" => send(ctx, msg, state, args).await,
        "list" => list(msg, state),
        _ => Ok(Reply::new_const(
            "Unrecognized embed command, try `!sm help`",
            ReplyType::Message(msg),
        )),
    }
}

fn parse_channel_token(token: &str) -> Option<u64> {
    lazy_static! {
        static ref RE: Regex = Regex::new(r"^<#(\d+)>$").unwrap();
    }
    match RE.captures(token) {
        Some(caps) => caps[1].parse().ok(),
        None => token.parse().ok(),
    }
}

/// id, color, optional title and the description after `|`.
fn parse_create_args(args: &str) -> Option<(&str, &str, Option<&str>, &str)> {
    let (embed_id, rest) = next_token(args)?;
    let (color, rest) = next_token(rest)?;

    let (title, description) = rest.split_once('|')?;
    let title = title.trim();
    let description = description.trim();
    if description.is_empty() {
        return None;
    }
    let title = if title.is_empty() { None } else { Some(title) };
    Some((embed_id, color, title, description))
}

/// id and an optional target channel.
fn parse_send_args(args: &str) -> Option<(&str, Option<u64>)> {
    let (embed_id, rest) = next_token(args)?;
    if rest.is_empty() {
        return Some((embed_id, None));
    }
    let (channel, rest) = next_token(rest)?;
    if !rest.is_empty() {
        return None;
    }
    Some((embed_id, Some(parse_channel_token(channel)?)))
}

async fn create<'a>(
    ctx: &Context,
    msg: &'a Message,
    state: &BotState,
    args: &str,
) -> Result<Reply<'a>> {
    if !author_can_manage(ctx, msg, state)? {
        return Ok(Reply::new_const(NO_PERMISSION, ReplyType::Message(msg)));
    }
    let (embed_id, color, title, description) = match parse_create_args(args) {
        Some(parsed) => parsed,
        None => return Ok(Reply::new_const(USAGE_CREATE, ReplyType::Message(msg))),
    };

    let color = color.to_lowercase();
    let embed = StoredEmbed {
        title: title.unwrap_or(embed_id).to_string(),
        description: description.to_string(),
        color: color_value(Some(color.as_str())),
        footer: None,
        thumbnail: None,
        image: None,
        author: None,
        fields: Vec::new(),
        created_at: Utc::now().timestamp(),
        creator_id: *msg.author.id.as_u64(),
        guild_id: *msg.guild_id.unwrap().as_u64(),
    };
    match state.store_embed(embed_id.to_string(), embed) {
        Ok(()) => (),
        Err(Error::EmbedExists) => {
            return Ok(Reply::new(
                format!("❌ An embed with id '{embed_id}' already exists!"),
                ReplyType::Message(msg),
            ))
        }
        Err(why) => return Err(why),
    }
    state.persist()?;

    Ok(Reply::new(
        format!("✅ Embed '{embed_id}' stored!"),
        ReplyType::Message(msg),
    ))
}

async fn send<'a>(
    ctx: &Context,
    msg: &'a Message,
    state: &BotState,
    args: &str,
) -> Result<Reply<'a>> {
    let (embed_id, channel) = match parse_send_args(args) {
        Some(parsed) => parsed,
        None => return Ok(Reply::new_const(USAGE_SEND, ReplyType::Message(msg))),
    };

    let guild_id = *msg.guild_id.unwrap().as_u64();
    let template = match state.get_embed(guild_id, embed_id)? {
        Some(template) => template,
        None => {
            return Ok(Reply::new_const(
                "❌ Embed not found!",
                ReplyType::Message(msg),
            ))
        }
    };

    let target = channel.map_or(msg.channel_id, ChannelId);
    EmbedPayload::from_template(&template)
        .send(ctx, target)
        .await?;

    Ok(Reply::new(
        format!("✅ Embed sent to <#{target}>!"),
        ReplyType::Message(msg),
    ))
}

fn list<'a>(msg: &'a Message, state: &BotState) -> Result<Reply<'a>> {
    let guild_id = *msg.guild_id.unwrap().as_u64();
    let entries = state.list_embeds(guild_id)?;
    if entries.is_empty() {
        return Ok(Reply::new_const(
            "❌ No stored embeds found for this server!",
            ReplyType::Message(msg),
        ));
    }

    let response = format!(
        "📋 Stored embeds in this server:\n{}",
        entries
            .into_iter()
            .map(|(id, embed)| format!("{id}: {} (created by <@{}>)", embed.title, embed.creator_id))
            .collect::<Vec<String>>()
            .join("\n")
    );

    Ok(Reply::new(response, ReplyType::Channel(msg.channel_id)))
}
