use super::{author_can_manage, next_token};
use crate::errors::{Error, Result};
use crate::state::BotState;
use crate::structs::reply::{Reply, ReplyType};
use crate::structs::AttachReport;

use chrono::Utc;
use humantime::format_duration;
use log::debug;
use serenity::model::channel::Message;
use serenity::model::id::{ChannelId, MessageId};
use serenity::prelude::*;
use std::time::Duration;
use store::structs::{RichContent, StickyContent, StickyDefinition};

const USAGE_ADD: &str = "Usage: `!sm sticky add <name> <cooldown_secs> <text>`";
const USAGE_EMBED: &str =
    "Usage: `!sm sticky embed <name> <cooldown_secs> <color> <title> | <description>`";
const USAGE_ATTACH: &str = "Usage: `!sm sticky attach <name> <cooldown_secs> <embed_id>`";
const USAGE_REMOVE: &str = "Usage: `!sm sticky remove <name>`";
const NO_PERMISSION: &str = "❌ You need a moderator role to manage sticky messages!";

pub(super) async fn dispatch<'a>(
    ctx: &Context,
    msg: &'a Message,
    state: &BotState,
    rest: &str,
) -> Result<Reply<'a>> {
    let (action, args) = next_token(rest).unwrap_or(("", ""));
    match action {
        "add" => add(ctx, msg, state, args).await,
        "embed" => add_embed(ctx, msg, state, args).await,
        "attach" => attach_stored(ctx, msg, state, args).await,
        "remove" => remove(ctx, msg, state, args).await,
        "list" => list(msg, state),
        _ => Ok(Reply::new_const(
            "Unrecognized sticky command, try `!sm help`",
            ReplyType::Message(msg),
        )),
    }
}

/// name, cooldown and the remaining text.
fn parse_add_args(args: &str) -> Option<(&str, u64, &str)> {
    let (name, rest) = next_token(args)?;
    let (cooldown, text) = next_token(rest)?;
    let cooldown = cooldown.parse().ok()?;
    if text.is_empty() {
        return None;
    }
    Some((name, cooldown, text))
}

/// name, cooldown, color, optional title and the description after `|`.
fn parse_embed_args(args: &str) -> Option<(&str, u64, &str, Option<&str>, &str)> {
    let (name, rest) = next_token(args)?;
    let (cooldown, rest) = next_token(rest)?;
    let cooldown = cooldown.parse().ok()?;
    let (color, rest) = next_token(rest)?;

    let (title, description) = rest.split_once('|')?;
    let title = title.trim();
    let description = description.trim();
    if description.is_empty() {
        return None;
    }
    let title = if title.is_empty() { None } else { Some(title) };
    Some((name, cooldown, color, title, description))
}

fn parse_attach_args(args: &str) -> Option<(&str, u64, &str)> {
    let (name, rest) = next_token(args)?;
    let (cooldown, rest) = next_token(rest)?;
    let cooldown = cooldown.parse().ok()?;
    let (embed_id, rest) = next_token(rest)?;
    if !rest.is_empty() {
        return None;
    }
    Some((name, cooldown, embed_id))
}

fn attach_ack<'a>(msg: &'a Message, name: &str, cooldown: u64, report: &AttachReport) -> Reply<'a> {
    let mut note = format!("✅ Sticky message '{name}' created with {cooldown}s cooldown!");
    if let Some(old_name) = &report.superseded {
        note.push_str(&format!(" Replaced '{old_name}' on this channel."));
    }
    if let Some(old_channel) = report.moved_from {
        note.push_str(&format!(" Moved from <#{old_channel}>."));
    }
    Reply::new(note, ReplyType::Message(msg))
}

async fn add<'a>(
    ctx: &Context,
    msg: &'a Message,
    state: &BotState,
    args: &str,
) -> Result<Reply<'a>> {
    if !author_can_manage(ctx, msg, state)? {
        return Ok(Reply::new_const(NO_PERMISSION, ReplyType::Message(msg)));
    }
    let (name, cooldown, text) = match parse_add_args(args) {
        Some(parsed) => parsed,
        None => return Ok(Reply::new_const(USAGE_ADD, ReplyType::Message(msg))),
    };

    let def = StickyDefinition::new(
        *msg.guild_id.unwrap().as_u64(),
        *msg.channel_id.as_u64(),
        name.to_string(),
        StickyContent::Text(text.to_string()),
        Utc::now().timestamp(),
    );
    let report = state.attach_sticky(def, cooldown)?;
    state.persist()?;
    Ok(attach_ack(msg, name, cooldown, &report))
}

async fn add_embed<'a>(
    ctx: &Context,
    msg: &'a Message,
    state: &BotState,
    args: &str,
) -> Result<Reply<'a>> {
    if !author_can_manage(ctx, msg, state)? {
        return Ok(Reply::new_const(NO_PERMISSION, ReplyType::Message(msg)));
    }
    let (name, cooldown, color, title, description) = match parse_embed_args(args) {
        Some(parsed) => parsed,
        None => return Ok(Reply::new_const(USAGE_EMBED, ReplyType::Message(msg))),
    };

    let content = StickyContent::Rich(RichContent::Embed {
        title: title.map(str::to_string),
        description: description.to_string(),
        color: Some(color.to_lowercase()),
        footer: None,
        thumbnail: None,
        image: None,
    });
    let def = StickyDefinition::new(
        *msg.guild_id.unwrap().as_u64(),
        *msg.channel_id.as_u64(),
        name.to_string(),
        content,
        Utc::now().timestamp(),
    );
    let report = state.attach_sticky(def, cooldown)?;
    state.persist()?;
    Ok(attach_ack(msg, name, cooldown, &report))
}

async fn attach_stored<'a>(
    ctx: &Context,
    msg: &'a Message,
    state: &BotState,
    args: &str,
) -> Result<Reply<'a>> {
    if !author_can_manage(ctx, msg, state)? {
        return Ok(Reply::new_const(NO_PERMISSION, ReplyType::Message(msg)));
    }
    let (name, cooldown, embed_id) = match parse_attach_args(args) {
        Some(parsed) => parsed,
        None => return Ok(Reply::new_const(USAGE_ATTACH, ReplyType::Message(msg))),
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

    let content = StickyContent::Rich(RichContent::StoredEmbed {
        embed_id: embed_id.to_string(),
        original_data: template,
    });
    let def = StickyDefinition::new(
        guild_id,
        *msg.channel_id.as_u64(),
        name.to_string(),
        content,
        Utc::now().timestamp(),
    );
    let report = state.attach_sticky(def, cooldown)?;
    state.persist()?;
    Ok(attach_ack(msg, name, cooldown, &report))
}

async fn remove<'a>(
    ctx: &Context,
    msg: &'a Message,
    state: &BotState,
    args: &str,
) -> Result<Reply<'a>> {
    if !author_can_manage(ctx, msg, state)? {
        return Ok(Reply::new_const(NO_PERMISSION, ReplyType::Message(msg)));
    }
    let (name, rest) = match next_token(args) {
        Some(parsed) => parsed,
        None => return Ok(Reply::new_const(USAGE_REMOVE, ReplyType::Message(msg))),
    };
    if !rest.is_empty() {
        return Ok(Reply::new_const(USAGE_REMOVE, ReplyType::Message(msg)));
    }

    let guild_id = *msg.guild_id.unwrap().as_u64();
    let def = match state.remove_sticky(guild_id, name) {
        Ok(def) => def,
        Err(Error::NotFound) => {
            return Ok(Reply::new(
                format!("❌ No sticky message found with name '{name}'!"),
                ReplyType::Message(msg),
            ))
        }
        Err(why) => return Err(why),
    };
    state.persist()?;

    // best-effort takedown of the live copy, it may already be gone
    if let Some(message_id) = def.last_posted_message_id {
        if let Err(why) = ChannelId(def.channel_id)
            .delete_message(&ctx.http, MessageId(message_id))
            .await
        {
            debug!("Failed to delete live copy of '{name}': {why}");
        }
    }

    Ok(Reply::new(
        format!("✅ Sticky message '{name}' removed!"),
        ReplyType::Message(msg),
    ))
}

fn list<'a>(msg: &'a Message, state: &BotState) -> Result<Reply<'a>> {
    let guild_id = *msg.guild_id.unwrap().as_u64();
    let entries = state.list_stickies(guild_id)?;
    if entries.is_empty() {
        return Ok(Reply::new_const(
            "❌ No sticky messages found in this server!",
            ReplyType::Message(msg),
        ));
    }

    let response = format!(
        "📌 Sticky messages in this server:\n{}",
        entries
            .into_iter()
            .map(|(def, cooldown)| {
                format!(
                    "{} ({}) in <#{}>, cooldown {}",
                    def.name,
                    def.content.kind_label(),
                    def.channel_id,
                    format_duration(Duration::from_secs(cooldown))
                )
            })
            .collect::<Vec<String>>()
            .join("\n")
    );

    Ok(Reply::new(response, ReplyType::Channel(msg.channel_id)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_add_args() {
        assert_eq!(
            parse_add_args("welcome 30 Hi! Read the rules."),
            Some(("welcome", 30, "Hi! Read the rules."))
        );
    }

    #[test]
    fn test_parse_add_args_rejects_bad_cooldown() {
        assert_eq!(parse_add_args("welcome soon Hi!"), None);
        assert_eq!(parse_add_args("welcome -5 Hi!"), None);
    }

    #[test]
    fn test_parse_add_args_rejects_missing_text() {
        assert_eq!(parse_add_args("welcome 30"), None);
        assert_eq!(parse_add_args("welcome"), None);
        assert_eq!(parse_add_args(""), None);
    }

    #[test]
    fn test_parse_embed_args() {
        assert_eq!(
            parse_embed_args("rules 60 green Server Rules | Be nice to each other"),
            Some(("rules", 60, "green", Some("Server Rules"), "Be nice to each other"))
        );
    }

    #[test]
    fn test_parse_embed_args_title_optional() {
        assert_eq!(
            parse_embed_args("rules 60 blue | just the description"),
            Some(("rules", 60, "blue", None, "just the description"))
        );
    }

    #[test]
    fn test_parse_embed_args_needs_pipe_and_description() {
        assert_eq!(parse_embed_args("rules 60 blue no separator"), None);
        assert_eq!(parse_embed_args("rules 60 blue Title | "), None);
    }

    #[test]
    fn test_parse_attach_args() {
        assert_eq!(parse_attach_args("ad 300 promo"), Some(("ad", 300, "promo")));
        assert_eq!(parse_attach_args("ad 300 promo extra"), None);
        assert_eq!(parse_attach_args("ad promo"), None);
    }
}
