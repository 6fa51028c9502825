use serde::{Deserialize, Serialize};

use crate::structs::StoredEmbed;

/// Content carried by a sticky definition. Plain text lives in the data
/// file as a bare JSON string; the rich variants are objects tagged with a
/// `type` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StickyContent {
    Text(String),
    Rich(RichContent),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RichContent {
    /// Embed described inline when the sticky was created.
    Embed {
        title: Option<String>,
        description: String,
        color: Option<String>,
        #[serde(default)]
        footer: Option<String>,
        #[serde(default)]
        thumbnail: Option<String>,
        #[serde(default)]
        image: Option<String>,
    },
    /// Reference to a saved embed template plus a snapshot of its data
    /// taken when the sticky was attached. Later edits to the template do
    /// not reach the sticky.
    StoredEmbed {
        embed_id: String,
        original_data: StoredEmbed,
    },
}

impl StickyContent {
    #[inline]
    pub const fn is_embed(&self) -> bool {
        matches!(self, StickyContent::Rich(_))
    }

    pub const fn kind_label(&self) -> &'static str {
        match self {
            StickyContent::Text(_) => "Text",
            StickyContent::Rich(_) => "Embed",
        }
    }
}

/// One sticky definition, keyed by (guild, name) in the data file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StickyDefinition {
    pub guild_id: u64,
    pub channel_id: u64,
    pub name: String,
    pub content: StickyContent,
    /// Id of the live copy most recently posted to the channel, None until
    /// the first repost.
    #[serde(rename = "message_id", default)]
    pub last_posted_message_id: Option<u64>,
    /// Unix seconds at creation time, drives listing order.
    #[serde(default)]
    pub created_at: i64,
}

impl StickyDefinition {
    pub const fn new(
        guild_id: u64,
        channel_id: u64,
        name: String,
        content: StickyContent,
        created_at: i64,
    ) -> StickyDefinition {
        StickyDefinition {
            guild_id,
            channel_id,
            name,
            content,
            last_posted_message_id: None,
            created_at,
        }
    }

    #[inline]
    pub const fn is_embed(&self) -> bool {
        self.content.is_embed()
    }
}

/// Per-channel live-copy bookkeeping written under the `sticky_messages`
/// key. Rebuilt from the definition map on save; the definition map is
/// authoritative when loading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelSticky {
    pub message_id: Option<u64>,
    pub content: StickyContent,
    pub is_embed: bool,
}

impl ChannelSticky {
    pub fn from_definition(def: &StickyDefinition) -> ChannelSticky {
        ChannelSticky {
            message_id: def.last_posted_message_id,
            content: def.content.clone(),
            is_embed: def.is_embed(),
        }
    }
}
