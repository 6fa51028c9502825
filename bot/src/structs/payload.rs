use crate::errors::Result;

use serenity::builder::CreateEmbed;
use serenity::model::channel::Message;
use serenity::model::id::ChannelId;
use serenity::model::Timestamp;
use serenity::prelude::Context;
use serenity::utils::Colour;
use store::structs::{EmbedAuthor, EmbedField, RichContent, StickyContent, StoredEmbed};

const STICKY_TAG: &str = "📌 Sticky message";
const DEFAULT_EMBED_TITLE: &str = "Sticky Message";

/// Outbound message, fully rendered before anything touches the network.
#[derive(Debug, Clone, PartialEq)]
pub enum StickyPayload {
    Text(String),
    Embed(EmbedPayload),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmbedPayload {
    pub title: Option<String>,
    pub description: String,
    pub color: u32,
    pub footer: Option<String>,
    pub thumbnail: Option<String>,
    pub image: Option<String>,
    pub author: Option<EmbedAuthor>,
    pub fields: Vec<EmbedField>,
    pub timestamped: bool,
}

impl StickyPayload {
    /// Renders sticky content for a repost. Embed variants get the sticky
    /// footer tag with the server's name; plain text passes through as is.
    pub fn for_sticky(content: &StickyContent, guild_name: &str) -> StickyPayload {
        match content {
            StickyContent::Text(text) => StickyPayload::Text(text.clone()),
            StickyContent::Rich(RichContent::Embed {
                title,
                description,
                color,
                footer,
                thumbnail,
                image,
            }) => StickyPayload::Embed(EmbedPayload {
                title: Some(
                    title
                        .clone()
                        .unwrap_or_else(|| DEFAULT_EMBED_TITLE.to_string()),
                ),
                description: description.clone(),
                color: color_value(color.as_deref()),
                footer: Some(sticky_footer(footer.as_deref(), guild_name)),
                thumbnail: thumbnail.clone(),
                image: image.clone(),
                author: None,
                fields: Vec::new(),
                timestamped: true,
            }),
            StickyContent::Rich(RichContent::StoredEmbed { original_data, .. }) => {
                let mut payload = EmbedPayload::from_template(original_data);
                payload.footer = Some(sticky_footer(original_data.footer.as_deref(), guild_name));
                StickyPayload::Embed(payload)
            }
        }
    }

    pub async fn send(&self, ctx: &Context, channel_id: ChannelId) -> Result<Message> {
        let sent = match self {
            StickyPayload::Text(text) => channel_id.say(ctx, text).await?,
            StickyPayload::Embed(embed) => {
                channel_id
                    .send_message(&ctx.http, |m| m.embed(|e| embed.apply(e)))
                    .await?
            }
        };
        Ok(sent)
    }
}

impl EmbedPayload {
    /// Plain render of a stored template, no sticky tagging. This is what
    /// the direct embed send command posts.
    pub fn from_template(template: &StoredEmbed) -> EmbedPayload {
        EmbedPayload {
            title: Some(template.title.clone()),
            description: template.description.clone(),
            color: template.color,
            footer: template.footer.clone(),
            thumbnail: template.thumbnail.clone(),
            image: template.image.clone(),
            author: template.author.clone(),
            fields: template.fields.clone(),
            timestamped: false,
        }
    }

    pub async fn send(&self, ctx: &Context, channel_id: ChannelId) -> Result<Message> {
        Ok(channel_id
            .send_message(&ctx.http, |m| m.embed(|e| self.apply(e)))
            .await?)
    }

    fn apply<'a>(&self, e: &'a mut CreateEmbed) -> &'a mut CreateEmbed {
        if let Some(title) = &self.title {
            e.title(title);
        }
        e.description(&self.description);
        e.colour(Colour::new(self.color));
        if let Some(footer) = &self.footer {
            e.footer(|f| f.text(footer));
        }
        if let Some(thumbnail) = &self.thumbnail {
            e.thumbnail(thumbnail);
        }
        if let Some(image) = &self.image {
            e.image(image);
        }
        if let Some(author) = &self.author {
            e.author(|a| {
                a.name(&author.name);
                if let Some(icon_url) = &author.icon_url {
                    a.icon_url(icon_url);
                }
                if let Some(url) = &author.url {
                    a.url(url);
                }
                a
            });
        }
        for field in &self.fields {
            e.field(&field.name, &field.value, field.inline);
        }
        if self.timestamped {
            e.timestamp(Timestamp::now());
        }
        e
    }
}

fn sticky_footer(existing: Option<&str>, guild_name: &str) -> String {
    existing.map_or_else(
        || format!("{STICKY_TAG} • {guild_name}"),
        |footer| format!("{footer} • {STICKY_TAG} • {guild_name}"),
    )
}

/// Maps the color names the sticky commands accept onto discord's palette.
/// Anything unrecognized falls back to blue.
pub fn color_value(name: Option<&str>) -> u32 {
    match name {
        Some("red") => 15_158_332,
        Some("green") => 3_066_993,
        Some("purple") => 10_181_046,
        _ => 3_447_003,
    }
}
