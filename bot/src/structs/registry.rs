use log::warn;
use std::collections::{BTreeMap, HashMap};
use store::structs::{ChannelSticky, Document, StickyDefinition};

/// What an attach displaced: a different sticky that owned the target
/// channel, and/or the channel this name previously lived on.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct AttachReport {
    pub superseded: Option<String>,
    pub moved_from: Option<u64>,
}

/// In-memory index of sticky definitions. The guild map owns them; the
/// channel index is derived from it and every mutation keeps the two
/// aligned, so a channel never has more than one owner.
#[derive(Debug, Default)]
pub struct Registry {
    guilds: BTreeMap<u64, BTreeMap<String, StickyDefinition>>,
    by_channel: HashMap<u64, (u64, String)>,
}

impl Registry {
    pub fn new() -> Registry {
        Registry::default()
    }

    /// Rebuilds the registry from a loaded document. The name-keyed map is
    /// authoritative; definitions whose channel is also claimed by a later
    /// name are dropped with a warning.
    pub fn from_document(doc: &Document) -> Registry {
        let mut registry = Registry::new();
        for (guild_id, names) in &doc.guild_sticky_messages {
            for (name, def) in names {
                // trust the map keys over whatever the fields say
                let mut def = def.clone();
                def.guild_id = *guild_id;
                def.name = name.clone();

                let report = registry.attach(def);
                if let Some(lost) = report.superseded {
                    warn!(
                        "dropped sticky '{lost}' while loading guild {guild_id}, \
                         its channel is also claimed by '{name}'"
                    );
                }
            }
        }
        registry
    }

    /// Inserts or overwrites the definition under (guild, name). Any other
    /// definition owning the target channel is removed outright rather than
    /// left orphaned; its name comes back in the report so callers can warn.
    pub fn attach(&mut self, def: StickyDefinition) -> AttachReport {
        let mut report = AttachReport::default();

        // the name may already live on another channel, vacate that channel
        if let Some(previous) = self
            .guilds
            .get(&def.guild_id)
            .and_then(|names| names.get(&def.name))
        {
            if previous.channel_id != def.channel_id {
                report.moved_from = Some(previous.channel_id);
                self.by_channel.remove(&previous.channel_id);
            }
        }

        // the target channel may belong to a different definition, drop it
        if let Some((owner_guild, owner_name)) = self.by_channel.get(&def.channel_id).cloned() {
            if owner_guild != def.guild_id || owner_name != def.name {
                self.remove(owner_guild, &owner_name);
                report.superseded = Some(owner_name);
            }
        }

        self.by_channel
            .insert(def.channel_id, (def.guild_id, def.name.clone()));
        self.guilds
            .entry(def.guild_id)
            .or_insert_with(BTreeMap::new)
            .insert(def.name.clone(), def);
        report
    }

    /// Removes the definition and its channel index entry. None when the
    /// guild has nothing under that name.
    pub fn remove(&mut self, guild_id: u64, name: &str) -> Option<StickyDefinition> {
        let names = self.guilds.get_mut(&guild_id)?;
        let def = names.remove(name)?;
        if names.is_empty() {
            self.guilds.remove(&guild_id);
        }

        let owned = self
            .by_channel
            .get(&def.channel_id)
            .map_or(false, |(g, n)| *g == guild_id && n == name);
        if owned {
            self.by_channel.remove(&def.channel_id);
        }
        Some(def)
    }

    #[inline]
    pub fn lookup_by_channel(&self, channel_id: u64) -> Option<&StickyDefinition> {
        let (guild_id, name) = self.by_channel.get(&channel_id)?;
        self.guilds.get(guild_id).and_then(|names| names.get(name))
    }

    /// Records the id of a fresh live copy. A no-op when the definition is
    /// gone or no longer owns the channel the repost ran on.
    pub fn set_last_posted(&mut self, guild_id: u64, name: &str, channel_id: u64, message_id: u64) {
        if let Some(def) = self
            .guilds
            .get_mut(&guild_id)
            .and_then(|names| names.get_mut(name))
        {
            if def.channel_id == channel_id {
                def.last_posted_message_id = Some(message_id);
            }
        }
    }

    /// Definitions for one guild in creation order.
    pub fn list(&self, guild_id: u64) -> Vec<&StickyDefinition> {
        let mut defs: Vec<&StickyDefinition> = self
            .guilds
            .get(&guild_id)
            .map_or_else(Vec::new, |names| names.values().collect());
        defs.sort_by_key(|def| def.created_at);
        defs
    }

    /// The `guild_sticky_messages` section of the data file.
    pub fn guild_view(&self) -> BTreeMap<u64, BTreeMap<String, StickyDefinition>> {
        self.guilds.clone()
    }

    /// The `sticky_messages` section of the data file, one bookkeeping
    /// entry per owned channel.
    pub fn channel_view(&self) -> BTreeMap<u64, ChannelSticky> {
        self.by_channel
            .iter()
            .filter_map(|(channel_id, (guild_id, name))| {
                self.guilds
                    .get(guild_id)
                    .and_then(|names| names.get(name))
                    .map(|def| (*channel_id, ChannelSticky::from_definition(def)))
            })
            .collect()
    }
}
