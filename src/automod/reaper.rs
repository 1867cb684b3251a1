//! src/automod/reaper.rs
//! Okresowe sprzątanie: nieaktywni użytkownicy i przerośnięty cache klasyfikatora.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tracing::info;

use super::buffer::ModerationState;
use super::classifier::ToxicityClassifier;
use crate::config::AutoModConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReapReport {
    pub evicted: usize,
    pub cache_cleared: bool,
}

pub struct InactivityReaper {
    state: Arc<ModerationState>,
    classifier: Arc<ToxicityClassifier>,
    ttl: Duration,
    interval: Duration,
    cache_limit: u64,
}

impl InactivityReaper {
    pub fn new(state: Arc<ModerationState>, classifier: Arc<ToxicityClassifier>, cfg: &AutoModConfig) -> Self {
        Self {
            state,
            classifier,
            ttl: cfg.inactivity_ttl(),
            interval: cfg.reap_interval(),
            cache_limit: cfg.dedup_cache_limit,
        }
    }

    pub fn sweep(&self, now: Instant) -> ReapReport {
        let evicted = self.state.evict_idle(now, self.ttl);
        let cache_cleared = if self.classifier.cache_len() > self.cache_limit {
            self.classifier.clear_cache();
            true
        } else {
            false
        };
        ReapReport {
            evicted,
            cache_cleared,
        }
    }

    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.interval);
        // pierwszy tick odpala natychmiast, pomijamy go
        interval.tick().await;
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let report = self.sweep(Instant::now());
                    info!(
                        evicted = report.evicted,
                        cache_cleared = report.cache_cleared,
                        users = self.state.user_count(),
                        "automod reaper sweep"
                    );
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }
}
