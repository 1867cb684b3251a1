//! src/automod/mod.rs
//! AutoMod: bufor wiadomości per użytkownik, bramka regex + klasyfikator,
//! harmonogram ocen i eskalacja kar.
//!
//! Przepływ: `on_message` → bufor (+normalizacja) → cooldown →
//! kolejka paczek albo osobne zadanie → `BufferEvaluator` → kara → modlog.

pub mod batch;
pub mod blacklist;
pub mod buffer;
pub mod classifier;
pub mod escalation;
pub mod evaluator;
pub mod intake;
pub mod normalize;
pub mod platform;
pub mod reaper;
pub mod regex_gate;
pub mod workers;

use std::sync::Arc;
use std::time::Instant;

use tracing::debug;

use crate::config::AutoModConfig;
use batch::BatchScheduler;
use buffer::{BufferLimits, ModerationState};
use classifier::ToxicityClassifier;
use escalation::PunishmentEscalator;
use evaluator::BufferEvaluator;
use intake::{IntakeRoute, MessageIntakeGate};
use platform::{InboundMessage, InfractionStore, ModLogSink, ModerationPlatform};
use reaper::InactivityReaper;
use regex_gate::{PatternProvider, RegexGate};
use workers::BackgroundWorkers;

pub struct AutoMod {
    batch_mode: bool,
    state: Arc<ModerationState>,
    gate: Arc<RegexGate>,
    classifier: Arc<ToxicityClassifier>,
    intake: MessageIntakeGate,
    evaluator: Arc<BufferEvaluator>,
    batch: Arc<BatchScheduler>,
    reaper: Arc<InactivityReaper>,
}

impl AutoMod {
    /// Składa cały potok. Nic tu nie startuje w tle: od tego jest `start`.
    pub fn new(
        cfg: &AutoModConfig,
        classifier: ToxicityClassifier,
        platform: Arc<dyn ModerationPlatform>,
        store: Arc<dyn InfractionStore>,
        modlog: Arc<dyn ModLogSink>,
    ) -> Arc<Self> {
        let state = Arc::new(ModerationState::new(BufferLimits::from_config(cfg)));
        let gate = Arc::new(RegexGate::new());
        let classifier = Arc::new(classifier);
        let escalator = Arc::new(PunishmentEscalator::new(store, platform.clone(), cfg));

        let evaluator = Arc::new(BufferEvaluator::new(
            state.clone(),
            gate.clone(),
            classifier.clone(),
            escalator,
            platform,
            modlog,
            cfg,
        ));

        Arc::new(Self {
            batch_mode: cfg.batch_mode,
            intake: MessageIntakeGate::new(state.clone(), cfg.user_cooldown(), cfg.batch_mode),
            batch: Arc::new(BatchScheduler::new(cfg.batch_delay(), cfg.batch_size)),
            reaper: Arc::new(InactivityReaper::new(state.clone(), classifier.clone(), cfg)),
            state,
            gate,
            classifier,
            evaluator,
        })
    }

    /// Podpina źródło wzorców regex (do tego czasu bramka nic nie flaguje).
    pub fn attach_patterns(&self, provider: Arc<dyn PatternProvider>) -> bool {
        self.gate.attach(provider)
    }

    /// Punkt wejścia z handlera Discorda. Nigdy nie zwraca błędu.
    pub fn on_message(&self, msg: InboundMessage) -> IntakeRoute {
        self.on_message_at(msg, Instant::now())
    }

    pub fn on_message_at(&self, msg: InboundMessage, now: Instant) -> IntakeRoute {
        let route = self.intake.admit(&msg, now);
        match route {
            IntakeRoute::Ignored | IntakeRoute::BufferOnly => {}
            IntakeRoute::Enqueue => self.batch.enqueue(msg),
            IntakeRoute::Dispatch => {
                let evaluator = self.evaluator.clone();
                tokio::spawn(async move {
                    evaluator.evaluate(&msg).await;
                });
            }
        }
        debug!(route=?route, "automod intake");
        route
    }

    /// Startuje sprzątacza i (w trybie paczek) harmonogram.
    pub fn start(&self) -> BackgroundWorkers {
        let mut workers = BackgroundWorkers::new();

        let rx = workers.subscribe();
        workers.spawn("reaper", self.reaper.clone().run(rx));

        if self.batch_mode {
            let rx = workers.subscribe();
            workers.spawn("batch", self.batch.clone().run(self.evaluator.clone(), rx));
        }

        workers
    }

    pub fn state(&self) -> &Arc<ModerationState> {
        &self.state
    }

    pub fn evaluator(&self) -> &Arc<BufferEvaluator> {
        &self.evaluator
    }

    pub fn batch(&self) -> &Arc<BatchScheduler> {
        &self.batch
    }

    pub fn reaper(&self) -> &Arc<InactivityReaper> {
        &self.reaper
    }

    pub fn classifier(&self) -> &Arc<ToxicityClassifier> {
        &self.classifier
    }

    pub fn gate(&self) -> &Arc<RegexGate> {
        &self.gate
    }
}
