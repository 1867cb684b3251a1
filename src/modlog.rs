use std::sync::Arc;

use serenity::all::*;
use serenity::async_trait;
use tracing::warn;

use crate::automod::platform::ModLogSink;

const BRAND_FOOTER: &str = "Morrible • AutoMod";

/// Kanał logów moderacji. Bez skonfigurowanego kanału nic nie wysyła.
pub struct ChannelModLog {
    http: Arc<Http>,
    channel_id: Option<u64>,
}

impl ChannelModLog {
    pub fn new(http: Arc<Http>, channel_id: Option<u64>) -> Self {
        Self { http, channel_id }
    }
}

pub fn modlog_embed(user_id: u64, text: &str) -> CreateEmbed {
    CreateEmbed::new()
        .title("🛡️ AutoMod")
        .colour(Colour::new(0xE67E22))
        .field("Użytkownik", format!("<@{user_id}> (`{user_id}`)"), true)
        .field("Akcja", text, false)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(BRAND_FOOTER))
}

#[async_trait]
impl ModLogSink for ChannelModLog {
    async fn notify(&self, guild_id: u64, user_id: u64, text: &str) {
        let Some(ch_id) = self.channel_id.filter(|id| *id != 0) else {
            return;
        };
        let embed = modlog_embed(user_id, text);
        if let Err(e) = ChannelId::new(ch_id)
            .send_message(&self.http, CreateMessage::new().embed(embed))
            .await
        {
            warn!(error=?e, guild_id, channel_id = ch_id, "modlog send failed");
        }
    }
}
