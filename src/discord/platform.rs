// src/discord/platform.rs
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serenity::all::{
    ChannelId, CreateMessage, EditMember, GetMessages, GuildId, Http, MessageId, Timestamp, UserId,
};
use serenity::async_trait;

use crate::automod::platform::{HistoryMessage, ModerationPlatform, PlatformError};

/// Akcje automoda wykonywane przez HTTP API Discorda.
pub struct SerenityPlatform {
    http: Arc<Http>,
    actor_id: u64,
}

impl SerenityPlatform {
    pub fn new(http: Arc<Http>, actor_id: u64) -> Self {
        Self { http, actor_id }
    }
}

pub fn is_missing_permissions(source: &serenity::Error) -> bool {
    matches!(
        source,
        serenity::Error::Http(serenity::http::HttpError::UnsuccessfulRequest(response))
            if response.status_code.as_u16() == 403 || response.error.code == 50013
    )
}

fn is_not_found(source: &serenity::Error) -> bool {
    matches!(
        source,
        serenity::Error::Http(serenity::http::HttpError::UnsuccessfulRequest(response))
            if response.status_code.as_u16() == 404
    )
}

fn map_err(source: serenity::Error) -> PlatformError {
    if is_missing_permissions(&source) {
        PlatformError::MissingPermissions
    } else if is_not_found(&source) {
        PlatformError::NotFound
    } else {
        PlatformError::Other(source.to_string())
    }
}

#[async_trait]
impl ModerationPlatform for SerenityPlatform {
    fn actor_id(&self) -> u64 {
        self.actor_id
    }

    async fn send_direct_message(&self, user_id: u64, text: &str) -> Result<(), PlatformError> {
        let dm = UserId::new(user_id)
            .create_dm_channel(&self.http)
            .await
            .map_err(map_err)?;
        dm.send_message(&self.http, CreateMessage::new().content(text))
            .await
            .map_err(map_err)?;
        Ok(())
    }

    async fn timeout(
        &self,
        guild_id: u64,
        user_id: u64,
        until: DateTime<Utc>,
        reason: &str,
    ) -> Result<(), PlatformError> {
        let until = Timestamp::from_unix_timestamp(until.timestamp())
            .map_err(|e| PlatformError::Other(e.to_string()))?;
        GuildId::new(guild_id)
            .edit_member(
                &self.http,
                UserId::new(user_id),
                EditMember::new()
                    .disable_communication_until_datetime(until)
                    .audit_log_reason(reason),
            )
            .await
            .map_err(map_err)?;
        Ok(())
    }

    async fn ban(&self, guild_id: u64, user_id: u64, reason: &str) -> Result<(), PlatformError> {
        GuildId::new(guild_id)
            .ban_with_reason(&self.http, UserId::new(user_id), 0, reason)
            .await
            .map_err(map_err)
    }

    async fn delete_message(&self, channel_id: u64, message_id: u64) -> Result<(), PlatformError> {
        ChannelId::new(channel_id)
            .delete_message(&self.http, MessageId::new(message_id))
            .await
            .map_err(map_err)
    }

    async fn fetch_recent_history(
        &self,
        channel_id: u64,
        limit: u8,
    ) -> Result<Vec<HistoryMessage>, PlatformError> {
        let msgs = ChannelId::new(channel_id)
            .messages(&self.http, GetMessages::new().limit(limit))
            .await
            .map_err(map_err)?;
        Ok(msgs
            .into_iter()
            .map(|m| HistoryMessage {
                id: m.id.get(),
                author_id: m.author.id.get(),
                content: m.content,
            })
            .collect())
    }
}
