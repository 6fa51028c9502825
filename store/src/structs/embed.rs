use serde::{Deserialize, Serialize};

/// A reusable embed layout saved through the embed builder, referenced by
/// id and snapshotted into sticky definitions at attach time. Never mutated
/// after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEmbed {
    pub title: String,
    pub description: String,
    /// Packed rgb value, not a color name.
    pub color: u32,
    pub footer: Option<String>,
    pub thumbnail: Option<String>,
    pub image: Option<String>,
    #[serde(default)]
    pub author: Option<EmbedAuthor>,
    #[serde(default)]
    pub fields: Vec<EmbedField>,
    /// Unix seconds at save time.
    pub created_at: i64,
    pub creator_id: u64,
    pub guild_id: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbedAuthor {
    pub name: String,
    #[serde(default)]
    pub icon_url: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    #[serde(default = "inline_default")]
    pub inline: bool,
}

const fn inline_default() -> bool {
    true
}
