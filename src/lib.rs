// src/lib.rs

pub mod automod;
pub mod blacklist;
pub mod config;
pub mod db;
pub mod discord;
pub mod logging;
pub mod modlog;

use anyhow::Result;
use std::sync::Arc;
use tokio::sync::Mutex;

use automod::blacklist::BlacklistManager;
use automod::classifier::ToxicityClassifier;
use automod::platform::{ModLogSink, ModerationPlatform};
use automod::workers::BackgroundWorkers;
use automod::AutoMod;
use config::Settings;
use db::{Db, PgInfractionStore};

use serenity::all::GatewayIntents;

/// Globalny kontekst aplikacji: konfiguracja, DB, czarna lista i zadania w tle.
pub struct AppContext {
    pub settings: Settings,
    pub db: Db,
    pub blacklist: Arc<BlacklistManager>,
    workers: Mutex<Option<BackgroundWorkers>>,
}

impl AppContext {
    /// Bootstrap całej aplikacji:
    /// - logi
    /// - połączenie z DB
    /// - czarna lista z pliku
    pub async fn bootstrap(settings: Settings) -> Result<Arc<Self>> {
        // 1) logi
        logging::init(&settings);

        // 2) DB
        let db = db::connect(&settings.database.url, settings.database.max_connections).await?;

        // 3) czarna lista
        let blacklist = BlacklistManager::load(&settings.blacklist.path).await;

        Ok(Arc::new(Self::with_parts(settings, db, blacklist)))
    }

    pub fn with_parts(settings: Settings, db: Db, blacklist: Arc<BlacklistManager>) -> Self {
        Self {
            settings,
            db,
            blacklist,
            workers: Mutex::new(None),
        }
    }

    /// Składa AutoMod na produkcyjnych zależnościach (Postgres + czarna lista).
    pub fn build_automod(
        &self,
        platform: Arc<dyn ModerationPlatform>,
        modlog: Arc<dyn ModLogSink>,
    ) -> Arc<AutoMod> {
        let cfg = &self.settings.automod;
        let classifier = ToxicityClassifier::from_config(cfg, &self.settings.classifier);
        let store = Arc::new(PgInfractionStore::new(self.db.clone()));
        let automod = AutoMod::new(cfg, classifier, platform, store, modlog);
        automod.attach_patterns(self.blacklist.clone());
        automod
    }

    /// Przejmuje zadania w tle; poprzedni zestaw (jeśli był) jest zamykany.
    pub async fn adopt_workers(&self, workers: BackgroundWorkers) {
        let previous = self.workers.lock().await.replace(workers);
        if let Some(prev) = previous {
            prev.shutdown().await;
        }
    }

    pub async fn shutdown_workers(&self) {
        let current = self.workers.lock().await.take();
        if let Some(w) = current {
            w.shutdown().await;
        }
    }
}

/// Minimalny zestaw intents dla automoda:
/// - GUILDS, GUILD_MESSAGES, MESSAGE_CONTENT (konieczne do filtrowania treści).
pub fn default_gateway_intents() -> GatewayIntents {
    GatewayIntents::GUILDS | GatewayIntents::GUILD_MESSAGES | GatewayIntents::MESSAGE_CONTENT
}

/// Start klienta Discorda (Gateway + slash commands).
pub async fn run(ctx: Arc<AppContext>) -> Result<()> {
    discord::run_bot(ctx).await
}
