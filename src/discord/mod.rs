// src/discord/mod.rs
pub mod platform;

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use anyhow::Result;
use futures_util::FutureExt;
use once_cell::sync::OnceCell;
use serenity::all::*;
use serenity::async_trait;

use crate::automod::platform::{InboundMessage, ModLogSink, NoopModLog};
use crate::automod::AutoMod;
use crate::blacklist::Blacklist;
use crate::modlog::ChannelModLog;
use crate::{db, AppContext};
use platform::SerenityPlatform;

pub struct Handler {
    pub app: Arc<AppContext>,
    /// Budowany w `ready`, gdy znamy HTTP i id bota.
    automod: OnceCell<Arc<AutoMod>>,
}

impl Handler {
    pub fn new(app: Arc<AppContext>) -> Self {
        Self {
            app,
            automod: OnceCell::new(),
        }
    }
}

pub fn inbound_from(msg: &Message) -> InboundMessage {
    InboundMessage {
        guild_id: msg.guild_id.map(|g| g.get()),
        channel_id: msg.channel_id.get(),
        message_id: msg.id.get(),
        author_id: msg.author.id.get(),
        author_is_bot: msg.author.bot || msg.webhook_id.is_some(),
        content: msg.content.clone(),
    }
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        tracing::info!("Logged in as {}", ready.user.name);

        // Tabele (raz przy starcie procesu)
        if let Err(e) = db::ensure_tables(&self.app.db).await {
            tracing::warn!(error=?e, "ensure_tables failed");
        }

        // AutoMod: tylko przy pierwszym ready (reconnecty nie budują drugi raz)
        if self.automod.get().is_none() {
            let platform = Arc::new(SerenityPlatform::new(ctx.http.clone(), ready.user.id.get()));
            let modlog: Arc<dyn ModLogSink> = match self.app.settings.modlog.channel_id {
                Some(id) if id != 0 => Arc::new(ChannelModLog::new(ctx.http.clone(), Some(id))),
                _ => {
                    tracing::info!("modlog channel not configured; automod actions are not posted");
                    Arc::new(NoopModLog)
                }
            };
            let automod = self.app.build_automod(platform, modlog);
            if self.automod.set(automod.clone()).is_ok() {
                let workers = automod.start();
                let n = workers.len();
                self.app.adopt_workers(workers).await;
                tracing::info!(batch_mode = self.app.settings.automod.batch_mode, workers = n, "AutoMod ready");
            }
        }

        // Rejestr komend slash dla wszystkich gildii
        for g in ready.guilds {
            if let Err(e) = Blacklist::register_commands(&ctx, g.id).await {
                tracing::warn!(error=?e, gid=%g.id.get(), "register blacklist failed");
            }
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        let fut = Blacklist::on_interaction(&ctx, &self.app, interaction);
        if AssertUnwindSafe(fut).catch_unwind().await.is_err() {
            tracing::error!("interaction handler panicked");
        }
    }

    async fn message(&self, _ctx: Context, msg: Message) {
        if msg.guild_id.is_none() || msg.author.bot {
            return;
        }
        let Some(automod) = self.automod.get() else {
            return;
        };
        automod.on_message(inbound_from(&msg));
    }
}

fn intents_from_settings(names: &[String]) -> GatewayIntents {
    let mut i = GatewayIntents::empty();
    for n in names {
        match n.as_str() {
            "GUILDS" => i |= GatewayIntents::GUILDS,
            "GUILD_MEMBERS" => i |= GatewayIntents::GUILD_MEMBERS,
            "GUILD_MESSAGES" => i |= GatewayIntents::GUILD_MESSAGES,
            "GUILD_MODERATION" => i |= GatewayIntents::GUILD_MODERATION,
            "MESSAGE_CONTENT" => i |= GatewayIntents::MESSAGE_CONTENT,
            other => tracing::warn!(intent = other, "unknown gateway intent ignored"),
        }
    }
    i
}

pub async fn run_bot(ctx: Arc<AppContext>) -> Result<()> {
    let token = &ctx.settings.discord.token;
    if token.is_empty() {
        anyhow::bail!("Brak tokenu Discord (MORRIBLE_DISCORD__TOKEN). Uzupełnij w .env.");
    }

    let intents = intents_from_settings(&ctx.settings.discord.intents) | crate::default_gateway_intents();

    let mut client = serenity::Client::builder(token, intents)
        .event_handler(Handler::new(ctx.clone()))
        .await?;

    // Ctrl-C → zamykamy shardy, start() wraca
    let shards = client.shard_manager.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl-C received, shutting down shards");
            shards.shutdown_all().await;
        }
    });

    tracing::info!("Discord client starting…");
    let res = client.start().await;

    ctx.shutdown_workers().await;
    res?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intents_parse_known_names() {
        let i = intents_from_settings(&["GUILDS".into(), "MESSAGE_CONTENT".into(), "NOPE".into()]);
        assert!(i.contains(GatewayIntents::GUILDS));
        assert!(i.contains(GatewayIntents::MESSAGE_CONTENT));
        assert!(!i.contains(GatewayIntents::GUILD_MEMBERS));
    }
}
