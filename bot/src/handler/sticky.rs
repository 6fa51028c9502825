use crate::errors::Result;
use crate::state::{BotState, RepostJob};
use crate::structs::payload::StickyPayload;

use chrono::Utc;
use log::{debug, warn};
use serenity::model::channel::Message;
use serenity::model::id::{ChannelId, GuildId};
use serenity::prelude::*;
use std::time::Duration;
use tokio::time::sleep;

/// Pause between sweeping stale copies and posting the fresh one, long
/// enough for the deletions to land before the channel gets new content.
const REPOST_DELAY: Duration = Duration::from_millis(100);

/// How far back the sweep looks for stale copies. Anything older has
/// scrolled out of view, deleting it buys nothing.
const HISTORY_SCAN_LIMIT: u64 = 50;

/// Entry point for every non-command message: if the channel carries a
/// sticky and the cooldown allows, run the delete-then-post sequence.
pub(super) async fn maintain(ctx: &Context, msg: &Message, state: &BotState) -> Result<()> {
    let channel_id = *msg.channel_id.as_u64();
    let job = match state.begin_repost(channel_id, Utc::now())? {
        Some(job) => job,
        None => return Ok(()),
    };

    match repost(ctx, state, &job).await {
        Ok(new_message_id) => state.finish_repost(&job, new_message_id),
        Err(why) => {
            warn!(
                "Failed to repost sticky '{}' in channel {channel_id}: {why}",
                job.name
            );
            state.abort_repost(channel_id)
        }
    }
}

/// The sequence itself: sweep stale copies, wait out the deletions, post
/// the fresh copy. Returns the new live copy's id.
async fn repost(ctx: &Context, state: &BotState, job: &RepostJob) -> Result<u64> {
    sweep_stale_copies(ctx, job).await?;
    sleep(REPOST_DELAY).await;

    let guild_name = guild_name(ctx, state, job.guild_id);
    let payload = StickyPayload::for_sticky(&job.content, &guild_name);
    let posted = payload.send(ctx, ChannelId(job.channel_id)).await?;
    Ok(*posted.id.as_u64())
}

fn guild_name(ctx: &Context, state: &BotState, guild_id: u64) -> String {
    GuildId(guild_id)
        .name(&ctx.cache)
        .or_else(|| state.server_name(guild_id).ok().flatten())
        .unwrap_or_else(|| "this server".to_string())
}

/// Deletes previous copies of the sticky from the recent history: the
/// recorded live copy plus anything else we posted with the sticky's
/// shape. Individual delete failures are skipped, the message may already
/// be gone.
async fn sweep_stale_copies(ctx: &Context, job: &RepostJob) -> Result<()> {
    let channel = ChannelId(job.channel_id);
    let own_id = ctx.cache.current_user_id();
    let history = channel
        .messages(&ctx.http, |retriever| retriever.limit(HISTORY_SCAN_LIMIT))
        .await?;

    for message in history {
        let stale = is_stale_copy(
            job,
            message.author.id == own_id,
            *message.id.as_u64(),
            !message.embeds.is_empty(),
        );
        if stale {
            if let Err(why) = channel.delete_message(&ctx.http, message.id).await {
                debug!("Failed to delete stale sticky copy {}: {why}", message.id);
            }
        }
    }
    Ok(())
}

/// A message is a stale copy when we authored it and it is either the
/// recorded live copy or matches the sticky's shape.
fn is_stale_copy(job: &RepostJob, own_message: bool, message_id: u64, has_embeds: bool) -> bool {
    own_message
        && (job.last_posted_message_id == Some(message_id)
            || has_embeds == job.content.is_embed())
}
