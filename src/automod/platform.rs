//! src/automod/platform.rs
//! Granice automoda ze światem zewnętrznym: Discord, baza naruszeń, kanał logów.
//! Implementacje produkcyjne siedzą w `crate::discord`, `crate::db` i `crate::modlog`.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serenity::async_trait;
use thiserror::Error;

/// Wiadomość, która weszła do automoda (po odfiltrowaniu DM/botów w handlerze).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub guild_id: Option<u64>,
    pub channel_id: u64,
    pub message_id: u64,
    pub author_id: u64,
    pub author_is_bot: bool,
    pub content: String,
}

/// Wpis z historii kanału, tyle ile potrzeba do sprzątania.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryMessage {
    pub id: u64,
    pub author_id: u64,
    pub content: String,
}

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("missing permissions")]
    MissingPermissions,
    #[error("not found")]
    NotFound,
    #[error("{0}")]
    Other(String),
}

#[async_trait]
pub trait ModerationPlatform: Send + Sync {
    /// Id konta, które wykonuje akcje (zapisywane jako moderator naruszenia).
    fn actor_id(&self) -> u64;

    async fn send_direct_message(&self, user_id: u64, text: &str) -> Result<(), PlatformError>;

    async fn timeout(
        &self,
        guild_id: u64,
        user_id: u64,
        until: DateTime<Utc>,
        reason: &str,
    ) -> Result<(), PlatformError>;

    async fn ban(&self, guild_id: u64, user_id: u64, reason: &str) -> Result<(), PlatformError>;

    async fn delete_message(&self, channel_id: u64, message_id: u64) -> Result<(), PlatformError>;

    /// Najnowsze wiadomości kanału, od najnowszej.
    async fn fetch_recent_history(
        &self,
        channel_id: u64,
        limit: u8,
    ) -> Result<Vec<HistoryMessage>, PlatformError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfractionKind {
    Warn,
    Timeout,
    Ban,
    Automod,
}

impl InfractionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Warn => "warn",
            Self::Timeout => "timeout",
            Self::Ban => "ban",
            Self::Automod => "automod",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewInfraction {
    pub guild_id: u64,
    pub user_id: u64,
    pub moderator_id: u64,
    pub kind: InfractionKind,
    pub reason: String,
    pub duration_seconds: Option<i32>,
}

/// Trwały, dopisywany rejestr naruszeń. Licznik zawsze czytamy ze źródła.
#[async_trait]
pub trait InfractionStore: Send + Sync {
    async fn append(&self, infraction: NewInfraction) -> Result<()>;
    async fn count(&self, user_id: u64) -> Result<i64>;
}

#[async_trait]
pub trait ModLogSink: Send + Sync {
    async fn notify(&self, guild_id: u64, user_id: u64, text: &str);
}

/// Sink, który nic nie robi (brak kanału logów).
pub struct NoopModLog;

#[async_trait]
impl ModLogSink for NoopModLog {
    async fn notify(&self, _guild_id: u64, _user_id: u64, _text: &str) {}
}
