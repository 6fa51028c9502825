use crate::errors::{Error, Result};
use crate::structs::{AttachReport, CooldownGate, GateDecision, Registry};

use chrono::{DateTime, Utc};
use log::debug;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use store::structs::{Document, ServerInfo, StickyContent, StickyDefinition, StoredEmbed};
use store::Store;

/// Everything the handlers share: the sticky book (registry, cooldown gate
/// and in-flight repost flags behind one mutex), the stored embed
/// templates, the cached server info, and the store handle. No lock here is
/// ever held across an await; callers clone out what they need.
pub struct BotState {
    book: Mutex<StickyBook>,
    embeds: RwLock<BTreeMap<String, StoredEmbed>>,
    server_info: RwLock<BTreeMap<u64, ServerInfo>>,
    store: Store,
}

#[derive(Debug)]
struct StickyBook {
    registry: Registry,
    gate: CooldownGate,
    reposting: HashSet<u64>,
}

/// Work order handed out when a channel passes the gate: everything the
/// repost sequence needs, cloned so no lock is held during the I/O.
#[derive(Debug, Clone, PartialEq)]
pub struct RepostJob {
    pub guild_id: u64,
    pub channel_id: u64,
    pub name: String,
    pub content: StickyContent,
    pub last_posted_message_id: Option<u64>,
}

impl BotState {
    pub fn new(doc: &Document, store: Store) -> BotState {
        BotState {
            book: Mutex::new(StickyBook {
                registry: Registry::from_document(doc),
                gate: CooldownGate::from_intervals(&doc.sticky_cooldowns),
                reposting: HashSet::new(),
            }),
            embeds: RwLock::new(doc.stored_embeds.clone()),
            server_info: RwLock::new(doc.server_info.clone()),
            store,
        }
    }

    fn book(&self) -> Result<MutexGuard<'_, StickyBook>> {
        self.book
            .lock()
            .map_err(|_why| Error::ConstStr("Failed to acquire sticky book lock"))
    }

    fn embeds_read(&self) -> Result<RwLockReadGuard<'_, BTreeMap<String, StoredEmbed>>> {
        self.embeds
            .read()
            .map_err(|_why| Error::ConstStr("Failed to acquire read on embeds"))
    }

    fn embeds_write(&self) -> Result<RwLockWriteGuard<'_, BTreeMap<String, StoredEmbed>>> {
        self.embeds
            .write()
            .map_err(|_why| Error::ConstStr("Failed to acquire write on embeds"))
    }

    fn info_read(&self) -> Result<RwLockReadGuard<'_, BTreeMap<u64, ServerInfo>>> {
        self.server_info
            .read()
            .map_err(|_why| Error::ConstStr("Failed to acquire read on server info"))
    }

    fn info_write(&self) -> Result<RwLockWriteGuard<'_, BTreeMap<u64, ServerInfo>>> {
        self.server_info
            .write()
            .map_err(|_why| Error::ConstStr("Failed to acquire write on server info"))
    }

    /// Registers the definition and installs its cooldown. Nothing is
    /// posted here; the first qualifying message afterwards is.
    pub fn attach_sticky(&self, def: StickyDefinition, cooldown_secs: u64) -> Result<AttachReport> {
        let mut book = self.book()?;
        let channel_id = def.channel_id;
        let report = book.registry.attach(def);
        if let Some(old_channel) = report.moved_from {
            book.gate.remove(old_channel);
        }
        book.gate.configure(channel_id, cooldown_secs);
        Ok(report)
    }

    /// Drops the definition, its channel entry and its cooldown state. The
    /// removed definition comes back so the caller can take down the live
    /// copy.
    pub fn remove_sticky(&self, guild_id: u64, name: &str) -> Result<StickyDefinition> {
        let mut book = self.book()?;
        let def = book.registry.remove(guild_id, name).ok_or(Error::NotFound)?;
        book.gate.remove(def.channel_id);
        Ok(def)
    }

    /// Definitions for one guild in creation order, each with its
    /// configured cooldown.
    pub fn list_stickies(&self, guild_id: u64) -> Result<Vec<(StickyDefinition, u64)>> {
        let book = self.book()?;
        Ok(book
            .registry
            .list(guild_id)
            .into_iter()
            .map(|def| (def.clone(), book.gate.interval_secs(def.channel_id)))
            .collect())
    }

    /// Gate-checked entry into a repost. Yields a work order only when the
    /// channel has a sticky, no repost is already in flight for it, and the
    /// cooldown allows. The gate records the send time here, before any
    /// I/O starts.
    pub fn begin_repost(&self, channel_id: u64, now: DateTime<Utc>) -> Result<Option<RepostJob>> {
        let mut book = self.book()?;

        let job = match book.registry.lookup_by_channel(channel_id) {
            Some(def) => RepostJob {
                guild_id: def.guild_id,
                channel_id: def.channel_id,
                name: def.name.clone(),
                content: def.content.clone(),
                last_posted_message_id: def.last_posted_message_id,
            },
            None => return Ok(None),
        };

        if book.reposting.contains(&channel_id) {
            debug!("repost already in flight for channel {channel_id}");
            return Ok(None);
        }
        if book.gate.try_acquire(channel_id, now) == GateDecision::Denied {
            return Ok(None);
        }

        book.reposting.insert(channel_id);
        Ok(Some(job))
    }

    /// Closes out a successful repost: clears the in-flight flag and
    /// records the fresh live copy, unless the channel changed owners
    /// mid-flight.
    pub fn finish_repost(&self, job: &RepostJob, new_message_id: u64) -> Result<()> {
        let mut book = self.book()?;
        book.reposting.remove(&job.channel_id);
        book.registry
            .set_last_posted(job.guild_id, &job.name, job.channel_id, new_message_id);
        Ok(())
    }

    /// Returns a failed repost's channel to the armed state. The next
    /// qualifying message retries the whole sequence.
    pub fn abort_repost(&self, channel_id: u64) -> Result<()> {
        let mut book = self.book()?;
        book.reposting.remove(&channel_id);
        Ok(())
    }

    /// Saves a new template. Ids are globally unique; a taken id is an
    /// operator error, never an overwrite.
    pub fn store_embed(&self, embed_id: String, embed: StoredEmbed) -> Result<()> {
        let mut embeds = self.embeds_write()?;
        if embeds.contains_key(&embed_id) {
            return Err(Error::EmbedExists);
        }
        embeds.insert(embed_id, embed);
        Ok(())
    }

    /// Template lookup, scoped to the guild asking.
    pub fn get_embed(&self, guild_id: u64, embed_id: &str) -> Result<Option<StoredEmbed>> {
        let embeds = self.embeds_read()?;
        Ok(embeds
            .get(embed_id)
            .filter(|embed| embed.guild_id == guild_id)
            .cloned())
    }

    /// Templates visible to the guild, oldest first.
    pub fn list_embeds(&self, guild_id: u64) -> Result<Vec<(String, StoredEmbed)>> {
        let embeds = self.embeds_read()?;
        let mut entries: Vec<(String, StoredEmbed)> = embeds
            .iter()
            .filter(|(_, embed)| embed.guild_id == guild_id)
            .map(|(id, embed)| (id.clone(), embed.clone()))
            .collect();
        entries.sort_by_key(|(_, embed)| embed.created_at);
        Ok(entries)
    }

    /// Refreshes cached guild metadata. The configured moderator roles are
    /// operator state, they survive the refresh.
    pub fn refresh_server_info(&self, guild_id: u64, mut fresh: ServerInfo) -> Result<()> {
        let mut info = self.info_write()?;
        if let Some(existing) = info.get(&guild_id) {
            fresh.mod_roles = existing.mod_roles.clone();
        }
        info.insert(guild_id, fresh);
        Ok(())
    }

    pub fn server_name(&self, guild_id: u64) -> Result<Option<String>> {
        Ok(self.info_read()?.get(&guild_id).map(|info| info.name.clone()))
    }

    pub fn add_mod_role(&self, guild_id: u64, role_id: u64) -> Result<bool> {
        let mut info = self.info_write()?;
        let entry = info.entry(guild_id).or_insert_with(ServerInfo::default);
        if entry.mod_roles.contains(&role_id) {
            return Ok(false);
        }
        entry.mod_roles.push(role_id);
        Ok(true)
    }

    pub fn remove_mod_role(&self, guild_id: u64, role_id: u64) -> Result<bool> {
        let mut info = self.info_write()?;
        let entry = match info.get_mut(&guild_id) {
            Some(entry) => entry,
            None => return Ok(false),
        };
        let before = entry.mod_roles.len();
        entry.mod_roles.retain(|id| *id != role_id);
        Ok(entry.mod_roles.len() != before)
    }

    pub fn mod_roles(&self, guild_id: u64) -> Result<Vec<u64>> {
        Ok(self
            .info_read()?
            .get(&guild_id)
            .map_or_else(Vec::new, |info| info.mod_roles.clone()))
    }

    /// Guild owner or anyone holding a configured moderator role. Works off
    /// the cached server info, so a guild the bot has never seen reports
    /// false for everyone.
    pub fn can_manage(&self, guild_id: u64, user_id: u64, user_roles: &[u64]) -> Result<bool> {
        let info = self.info_read()?;
        Ok(info.get(&guild_id).map_or(false, |info| {
            info.owner_id == user_id || user_roles.iter().any(|role| info.mod_roles.contains(role))
        }))
    }

    /// Writes the full current state to the data file. The sticky book
    /// stays locked for the duration, so the snapshot and the write are one
    /// step relative to other saves and mutations.
    pub fn persist(&self) -> Result<()> {
        let book = self.book()?;
        let embeds = self.embeds_read()?;
        let info = self.info_read()?;

        let doc = Document {
            sticky_messages: book.registry.channel_view(),
            sticky_cooldowns: book.gate.intervals(),
            guild_sticky_messages: book.registry.guild_view(),
            server_info: info.clone(),
            stored_embeds: embeds.clone(),
        };
        self.store.save(|| doc)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use store::structs::RichContent;
    use tempfile::{tempdir, TempDir};

    fn time_zero() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 4, 1, 12, 0, 0).unwrap()
    }

    fn plus_ms(ms: i64) -> DateTime<Utc> {
        time_zero() + chrono::Duration::milliseconds(ms)
    }

    fn fresh_state() -> (BotState, TempDir) {
        let dir = tempdir().unwrap();
        let store = Store::new(dir.path().join("bot_data.json"));
        (BotState::new(&Document::default(), store), dir)
    }

    fn text_def(guild: u64, channel: u64, name: &str, text: &str) -> StickyDefinition {
        StickyDefinition::new(
            guild,
            channel,
            name.to_string(),
            StickyContent::Text(text.to_string()),
            1_650_000_000,
        )
    }

    fn sale_template(guild: u64) -> StoredEmbed {
        StoredEmbed {
            title: "Sale".to_string(),
            description: "everything must go".to_string(),
            color: 3_447_003,
            footer: None,
            thumbnail: None,
            image: None,
            author: None,
            fields: Vec::new(),
            created_at: 1_650_000_000,
            creator_id: 42,
            guild_id: guild,
        }
    }

    #[test]
    fn test_message_on_unattached_channel_is_a_noop() {
        let (state, _dir) = fresh_state();
        assert_eq!(state.begin_repost(100, time_zero()).unwrap(), None);
    }

    #[test]
    fn test_text_sticky_repost_cycle() {
        let (state, _dir) = fresh_state();
        state
            .attach_sticky(text_def(1, 100, "welcome", "Hi!"), 1)
            .unwrap();

        // first message after attach posts immediately
        let job = state.begin_repost(100, time_zero()).unwrap().unwrap();
        assert_eq!(job.content, StickyContent::Text("Hi!".to_string()));
        assert_eq!(job.last_posted_message_id, None);
        state.finish_repost(&job, 555).unwrap();

        // half a second later the cooldown denies
        assert_eq!(state.begin_repost(100, plus_ms(500)).unwrap(), None);

        // once the second has passed the next message triggers again and
        // the job carries the previous live copy for the sweep
        let job = state.begin_repost(100, plus_ms(1_200)).unwrap().unwrap();
        assert_eq!(job.last_posted_message_id, Some(555));
    }

    #[test]
    fn test_in_flight_repost_blocks_second_trigger() {
        let (state, _dir) = fresh_state();
        state
            .attach_sticky(text_def(1, 100, "welcome", "Hi!"), 1)
            .unwrap();

        assert!(state.begin_repost(100, time_zero()).unwrap().is_some());
        // gate would be open again, the in-flight flag is what denies
        assert_eq!(state.begin_repost(100, plus_ms(1_200)).unwrap(), None);

        state.abort_repost(100).unwrap();
        assert!(state.begin_repost(100, plus_ms(1_300)).unwrap().is_some());
    }

    #[test]
    fn test_failed_repost_keeps_gate_closed_for_the_interval() {
        let (state, _dir) = fresh_state();
        state
            .attach_sticky(text_def(1, 100, "welcome", "Hi!"), 1)
            .unwrap();

        assert!(state.begin_repost(100, time_zero()).unwrap().is_some());
        state.abort_repost(100).unwrap();

        // the send time was recorded before the repost failed
        assert_eq!(state.begin_repost(100, plus_ms(500)).unwrap(), None);
        assert!(state.begin_repost(100, plus_ms(1_100)).unwrap().is_some());
    }

    #[test]
    fn test_reattach_replaces_content_and_reopens_gate() {
        let (state, _dir) = fresh_state();
        state
            .attach_sticky(text_def(1, 100, "welcome", "Hi!"), 3_600)
            .unwrap();
        let job = state.begin_repost(100, time_zero()).unwrap().unwrap();
        state.finish_repost(&job, 555).unwrap();

        let report = state
            .attach_sticky(text_def(1, 100, "welcome", "Hello!"), 3_600)
            .unwrap();
        assert_eq!(report, AttachReport::default());

        // fresh definition, fresh gate
        let job = state.begin_repost(100, plus_ms(10)).unwrap().unwrap();
        assert_eq!(job.content, StickyContent::Text("Hello!".to_string()));
        assert_eq!(job.last_posted_message_id, None);
    }

    #[test]
    fn test_attach_conflict_supersedes_previous_owner() {
        let (state, _dir) = fresh_state();
        state
            .attach_sticky(text_def(1, 100, "welcome", "Hi!"), 1)
            .unwrap();

        let report = state
            .attach_sticky(text_def(1, 100, "rules", "be nice"), 1)
            .unwrap();
        assert_eq!(report.superseded, Some("welcome".to_string()));

        let names: Vec<String> = state
            .list_stickies(1)
            .unwrap()
            .into_iter()
            .map(|(def, _)| def.name)
            .collect();
        assert_eq!(names, vec!["rules".to_string()]);
        assert!(matches!(
            state.remove_sticky(1, "welcome"),
            Err(Error::NotFound)
        ));
    }

    #[test]
    fn test_second_remove_is_not_found_and_changes_nothing() {
        let (state, _dir) = fresh_state();
        state
            .attach_sticky(text_def(1, 100, "welcome", "Hi!"), 1)
            .unwrap();

        let removed = state.remove_sticky(1, "welcome").unwrap();
        assert_eq!(removed.channel_id, 100);
        assert!(state.list_stickies(1).unwrap().is_empty());

        assert!(matches!(
            state.remove_sticky(1, "welcome"),
            Err(Error::NotFound)
        ));
        assert!(state.list_stickies(1).unwrap().is_empty());
        assert_eq!(state.begin_repost(100, time_zero()).unwrap(), None);
    }

    #[test]
    fn test_stored_embed_sticky_carries_snapshot() {
        let (state, _dir) = fresh_state();
        state
            .store_embed("promo".to_string(), sale_template(1))
            .unwrap();

        let template = state.get_embed(1, "promo").unwrap().unwrap();
        let def = StickyDefinition::new(
            1,
            200,
            "ad".to_string(),
            StickyContent::Rich(RichContent::StoredEmbed {
                embed_id: "promo".to_string(),
                original_data: template,
            }),
            1_650_000_000,
        );
        state.attach_sticky(def, 1).unwrap();

        let job = state.begin_repost(200, time_zero()).unwrap().unwrap();
        match job.content {
            StickyContent::Rich(RichContent::StoredEmbed {
                embed_id,
                original_data,
            }) => {
                assert_eq!(embed_id, "promo");
                assert_eq!(original_data.title, "Sale");
            }
            other => panic!("expected a stored embed job, got {other:?}"),
        }
    }

    #[test]
    fn test_store_embed_rejects_duplicate_id() {
        let (state, _dir) = fresh_state();
        state
            .store_embed("promo".to_string(), sale_template(1))
            .unwrap();

        let mut second = sale_template(1);
        second.title = "Other".to_string();
        assert!(matches!(
            state.store_embed("promo".to_string(), second),
            Err(Error::EmbedExists)
        ));
        assert_eq!(state.get_embed(1, "promo").unwrap().unwrap().title, "Sale");
    }

    #[test]
    fn test_get_embed_scoped_to_guild() {
        let (state, _dir) = fresh_state();
        state
            .store_embed("promo".to_string(), sale_template(1))
            .unwrap();

        assert!(state.get_embed(2, "promo").unwrap().is_none());
        assert!(state.get_embed(1, "promo").unwrap().is_some());
    }

    #[test]
    fn test_list_embeds_in_creation_order() {
        let (state, _dir) = fresh_state();
        let mut older = sale_template(1);
        older.created_at = 10;
        let mut newer = sale_template(1);
        newer.created_at = 20;
        state.store_embed("zzz".to_string(), older).unwrap();
        state.store_embed("aaa".to_string(), newer).unwrap();
        state.store_embed("other".to_string(), sale_template(2)).unwrap();

        let ids: Vec<String> = state
            .list_embeds(1)
            .unwrap()
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        assert_eq!(ids, vec!["zzz".to_string(), "aaa".to_string()]);
    }

    #[test]
    fn test_mod_roles_and_permissions() {
        let (state, _dir) = fresh_state();
        state
            .refresh_server_info(
                1,
                ServerInfo {
                    name: "testing grounds".to_string(),
                    owner_id: 7,
                    ..ServerInfo::default()
                },
            )
            .unwrap();

        assert!(state.can_manage(1, 7, &[]).unwrap());
        assert!(!state.can_manage(1, 8, &[900]).unwrap());

        assert!(state.add_mod_role(1, 900).unwrap());
        assert!(!state.add_mod_role(1, 900).unwrap());
        assert!(state.can_manage(1, 8, &[900]).unwrap());
        assert!(!state.can_manage(1, 8, &[901]).unwrap());

        assert!(state.remove_mod_role(1, 900).unwrap());
        assert!(!state.remove_mod_role(1, 900).unwrap());
        assert!(!state.can_manage(1, 8, &[900]).unwrap());
    }

    #[test]
    fn test_refresh_preserves_mod_roles() {
        let (state, _dir) = fresh_state();
        state.add_mod_role(1, 900).unwrap();

        state
            .refresh_server_info(
                1,
                ServerInfo {
                    name: "renamed".to_string(),
                    owner_id: 7,
                    ..ServerInfo::default()
                },
            )
            .unwrap();

        assert_eq!(state.mod_roles(1).unwrap(), vec![900]);
        assert_eq!(state.server_name(1).unwrap(), Some("renamed".to_string()));
    }

    #[test]
    fn test_unknown_guild_cannot_manage() {
        let (state, _dir) = fresh_state();
        assert!(!state.can_manage(1, 7, &[900]).unwrap());
    }

    #[test]
    fn test_persist_and_reload_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bot_data.json");

        let state = BotState::new(&Document::default(), Store::new(&path));
        state
            .attach_sticky(text_def(1, 100, "welcome", "Hi!"), 5)
            .unwrap();
        let job = state.begin_repost(100, time_zero()).unwrap().unwrap();
        state.finish_repost(&job, 555).unwrap();
        state
            .store_embed("promo".to_string(), sale_template(1))
            .unwrap();
        let template = state.get_embed(1, "promo").unwrap().unwrap();
        state
            .attach_sticky(
                StickyDefinition::new(
                    1,
                    200,
                    "ad".to_string(),
                    StickyContent::Rich(RichContent::StoredEmbed {
                        embed_id: "promo".to_string(),
                        original_data: template,
                    }),
                    1_650_000_100,
                ),
                30,
            )
            .unwrap();
        state.add_mod_role(1, 900).unwrap();
        state.persist().unwrap();

        let reloaded_doc = Store::new(&path).load().unwrap();
        assert_eq!(reloaded_doc.sticky_cooldowns.get(&100), Some(&5));
        assert_eq!(reloaded_doc.sticky_cooldowns.get(&200), Some(&30));
        assert_eq!(
            reloaded_doc
                .sticky_messages
                .get(&100)
                .and_then(|entry| entry.message_id),
            Some(555)
        );
        assert!(reloaded_doc.stored_embeds.contains_key("promo"));

        // a state rebuilt from the document picks up where the old one left
        let rebuilt = BotState::new(&reloaded_doc, Store::new(&path));
        assert_eq!(rebuilt.list_stickies(1).unwrap().len(), 2);
        let job = rebuilt.begin_repost(100, time_zero()).unwrap().unwrap();
        assert_eq!(job.name, "welcome");
        assert_eq!(job.last_posted_message_id, Some(555));
        assert_eq!(rebuilt.mod_roles(1).unwrap(), vec![900]);
    }

    #[test]
    fn test_finish_after_supersede_does_not_mark_new_owner() {
        let (state, _dir) = fresh_state();
        state
            .attach_sticky(text_def(1, 100, "welcome", "Hi!"), 1)
            .unwrap();
        let job = state.begin_repost(100, time_zero()).unwrap().unwrap();

        // the channel changes owners while the repost is in flight
        state
            .attach_sticky(text_def(1, 100, "rules", "be nice"), 1)
            .unwrap();
        state.finish_repost(&job, 999).unwrap();

        let stickies = state.list_stickies(1).unwrap();
        assert_eq!(stickies.len(), 1);
        let (def, _) = &stickies[0];
        assert_eq!(def.name, "rules");
        assert_eq!(def.last_posted_message_id, None);
    }
}
