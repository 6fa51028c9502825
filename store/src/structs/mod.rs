mod embed;
mod server;
mod sticky;

pub use embed::EmbedAuthor;
pub use embed::EmbedField;
pub use embed::StoredEmbed;
pub use server::ServerInfo;
pub use sticky::ChannelSticky;
pub use sticky::RichContent;
pub use sticky::StickyContent;
pub use sticky::StickyDefinition;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The full persisted snapshot. Field names are the top-level keys of the
/// data file; every save rewrites the whole document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Document {
    /// Per-channel live-copy bookkeeping, derived from
    /// `guild_sticky_messages` on save and ignored on load.
    pub sticky_messages: BTreeMap<u64, ChannelSticky>,
    /// Channel id to configured repost interval in seconds.
    pub sticky_cooldowns: BTreeMap<u64, u64>,
    /// Guild id to name to definition. The authoritative sticky state.
    pub guild_sticky_messages: BTreeMap<u64, BTreeMap<String, StickyDefinition>>,
    pub server_info: BTreeMap<u64, ServerInfo>,
    pub stored_embeds: BTreeMap<String, StoredEmbed>,
}
