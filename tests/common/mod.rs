#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use chrono::{DateTime, Utc};
use morrible::automod::classifier::{ClassifierBackend, RuleBasedClassifier, ToxicityClassifier};
use morrible::automod::platform::{
    HistoryMessage, InboundMessage, InfractionKind, InfractionStore, ModLogSink, ModerationPlatform,
    NewInfraction, PlatformError,
};
use morrible::automod::regex_gate::{compile_pattern, flexible_word_pattern, StaticPatterns};
use morrible::automod::AutoMod;
use morrible::config::AutoModConfig;
use serenity::async_trait;

pub const GUILD: u64 = 1;
pub const CHANNEL: u64 = 10;
pub const BOT: u64 = 999;

/* ------------ rejestr naruszeń w pamięci ------------ */

#[derive(Default)]
pub struct MemoryStore {
    pub rows: Mutex<Vec<NewInfraction>>,
    pub fail_append: AtomicBool,
}

impl MemoryStore {
    pub fn preload(&self, user_id: u64, n: usize) {
        let mut rows = self.rows.lock().unwrap();
        for _ in 0..n {
            rows.push(NewInfraction {
                guild_id: GUILD,
                user_id,
                moderator_id: BOT,
                kind: InfractionKind::Warn,
                reason: "earlier".into(),
                duration_seconds: None,
            });
        }
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }
}

#[async_trait]
impl InfractionStore for MemoryStore {
    async fn append(&self, infraction: NewInfraction) -> Result<()> {
        if self.fail_append.load(Ordering::SeqCst) {
            anyhow::bail!("database unavailable");
        }
        self.rows.lock().unwrap().push(infraction);
        Ok(())
    }

    async fn count(&self, user_id: u64) -> Result<i64> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.user_id == user_id)
            .count() as i64)
    }
}

/* ------------ Discord w pamięci ------------ */

#[derive(Default)]
pub struct FakePlatform {
    pub history: Mutex<Vec<HistoryMessage>>,
    pub deleted: Mutex<Vec<u64>>,
    pub dms: Mutex<Vec<(u64, String)>>,
    pub timeouts: Mutex<Vec<(u64, DateTime<Utc>)>>,
    pub bans: Mutex<Vec<u64>>,
    pub deny_ban: AtomicBool,
    pub deny_dm: AtomicBool,
    pub fail_history: AtomicBool,
}

impl FakePlatform {
    pub fn push_history(&self, id: u64, author_id: u64, content: &str) {
        self.history.lock().unwrap().insert(
            0,
            HistoryMessage {
                id,
                author_id,
                content: content.into(),
            },
        );
    }
}

#[async_trait]
impl ModerationPlatform for FakePlatform {
    fn actor_id(&self) -> u64 {
        BOT
    }

    async fn send_direct_message(&self, user_id: u64, text: &str) -> Result<(), PlatformError> {
        if self.deny_dm.load(Ordering::SeqCst) {
            return Err(PlatformError::MissingPermissions);
        }
        self.dms.lock().unwrap().push((user_id, text.to_string()));
        Ok(())
    }

    async fn timeout(
        &self,
        _guild_id: u64,
        user_id: u64,
        until: DateTime<Utc>,
        _reason: &str,
    ) -> Result<(), PlatformError> {
        self.timeouts.lock().unwrap().push((user_id, until));
        Ok(())
    }

    async fn ban(&self, _guild_id: u64, user_id: u64, _reason: &str) -> Result<(), PlatformError> {
        if self.deny_ban.load(Ordering::SeqCst) {
            return Err(PlatformError::MissingPermissions);
        }
        self.bans.lock().unwrap().push(user_id);
        Ok(())
    }

    async fn delete_message(&self, _channel_id: u64, message_id: u64) -> Result<(), PlatformError> {
        self.deleted.lock().unwrap().push(message_id);
        Ok(())
    }

    async fn fetch_recent_history(
        &self,
        _channel_id: u64,
        limit: u8,
    ) -> Result<Vec<HistoryMessage>, PlatformError> {
        if self.fail_history.load(Ordering::SeqCst) {
            return Err(PlatformError::Other("history offline".into()));
        }
        Ok(self
            .history
            .lock()
            .unwrap()
            .iter()
            .take(limit as usize)
            .cloned()
            .collect())
    }
}

/* ------------ modlog ------------ */

#[derive(Default)]
pub struct RecordingModLog {
    pub lines: Mutex<Vec<(u64, u64, String)>>,
}

impl RecordingModLog {
    pub fn texts(&self) -> Vec<String> {
        self.lines.lock().unwrap().iter().map(|(_, _, t)| t.clone()).collect()
    }
}

#[async_trait]
impl ModLogSink for RecordingModLog {
    async fn notify(&self, guild_id: u64, user_id: u64, text: &str) {
        self.lines
            .lock()
            .unwrap()
            .push((guild_id, user_id, text.to_string()));
    }
}

/* ------------ składanie potoku ------------ */

pub struct Harness {
    pub automod: Arc<AutoMod>,
    pub platform: Arc<FakePlatform>,
    pub store: Arc<MemoryStore>,
    pub modlog: Arc<RecordingModLog>,
}

pub fn rules_classifier(cfg: &AutoModConfig) -> ToxicityClassifier {
    ToxicityClassifier::new(
        ClassifierBackend::Rules(RuleBasedClassifier::new(cfg.substring_min)),
        cfg,
    )
}

pub fn harness(cfg: &AutoModConfig, classifier: ToxicityClassifier, words: &[&str]) -> Harness {
    let platform = Arc::new(FakePlatform::default());
    let store = Arc::new(MemoryStore::default());
    let modlog = Arc::new(RecordingModLog::default());
    let automod = AutoMod::new(cfg, classifier, platform.clone(), store.clone(), modlog.clone());

    if !words.is_empty() {
        let patterns = words
            .iter()
            .map(|w| compile_pattern(&flexible_word_pattern(w)).unwrap())
            .collect();
        automod.attach_patterns(Arc::new(StaticPatterns::new(patterns)));
    }

    Harness {
        automod,
        platform,
        store,
        modlog,
    }
}

pub fn msg(author_id: u64, message_id: u64, content: &str) -> InboundMessage {
    InboundMessage {
        guild_id: Some(GUILD),
        channel_id: CHANNEL,
        message_id,
        author_id,
        author_is_bot: false,
        content: content.into(),
    }
}
