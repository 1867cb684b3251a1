//! src/automod/escalation.rs
//! Eskalacja kar na podstawie liczby naruszeń: ostrzeżenie → timeout → ban.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{info, warn};

use super::platform::{InfractionKind, InfractionStore, ModerationPlatform, NewInfraction, PlatformError};
use crate::config::AutoModConfig;

/// Limit długości powodu w rejestrze naruszeń.
pub const MAX_REASON_CHARS: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EscalationThresholds {
    pub warn: u32,
    pub timeout: u32,
    pub ban: u32,
}

impl EscalationThresholds {
    pub fn from_config(cfg: &AutoModConfig) -> Self {
        Self {
            warn: cfg.warn_threshold,
            timeout: cfg.timeout_threshold,
            ban: cfg.ban_threshold,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    None,
    Warn,
    Timeout,
    Ban,
}

/// Poziom kary dla licznika *po* doliczeniu bieżącego naruszenia.
/// Progi sprawdzane od najwyższego.
pub fn tier_for(next_count: i64, t: EscalationThresholds) -> Tier {
    if next_count >= t.ban as i64 {
        Tier::Ban
    } else if next_count >= t.timeout as i64 {
        Tier::Timeout
    } else if next_count >= t.warn as i64 {
        Tier::Warn
    } else {
        Tier::None
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscalationOutcome {
    /// Licznik odczytany z rejestru po zapisie.
    pub infractions: i64,
    pub tier: Tier,
    pub action: String,
}

pub struct PunishmentEscalator {
    store: Arc<dyn InfractionStore>,
    platform: Arc<dyn ModerationPlatform>,
    thresholds: EscalationThresholds,
    timeout_duration: Duration,
}

impl PunishmentEscalator {
    pub fn new(
        store: Arc<dyn InfractionStore>,
        platform: Arc<dyn ModerationPlatform>,
        cfg: &AutoModConfig,
    ) -> Self {
        Self {
            store,
            platform,
            thresholds: EscalationThresholds::from_config(cfg),
            timeout_duration: cfg.timeout_duration(),
        }
    }

    /// Nakłada karę i zapisuje naruszenie. Błąd egzekucji nie blokuje zapisu.
    pub async fn escalate(
        &self,
        guild_id: u64,
        user_id: u64,
        reason: &str,
        content: &str,
    ) -> Result<EscalationOutcome> {
        let prior = self.store.count(user_id).await?;
        let next = prior + 1;
        let tier = tier_for(next, self.thresholds);
        let secs = self.timeout_duration.as_secs();

        let mut duration_seconds = None;
        let action = match tier {
            Tier::Ban => {
                // DM przed banem, po banie nie da się już napisać
                self.notify_user(user_id, &format!("🚫 AutoMod nałożył na Ciebie bana. Powód: {reason}."))
                    .await;
                match self.platform.ban(guild_id, user_id, reason).await {
                    Ok(()) => "Banned".to_string(),
                    Err(PlatformError::MissingPermissions) => {
                        warn!(guild_id, user_id, "automod ban denied: missing permissions");
                        "Ban failed (missing permissions)".to_string()
                    }
                    Err(e) => {
                        warn!(error=?e, guild_id, user_id, "automod ban failed");
                        "Ban failed".to_string()
                    }
                }
            }
            Tier::Timeout => {
                let until = chrono::Utc::now()
                    + chrono::Duration::from_std(self.timeout_duration).unwrap_or(chrono::Duration::seconds(600));
                match self.platform.timeout(guild_id, user_id, until, reason).await {
                    Ok(()) => {
                        duration_seconds = Some(i32::try_from(secs).unwrap_or(i32::MAX));
                        self.notify_user(
                            user_id,
                            &format!("🔇 AutoMod nałożył na Ciebie wyciszenie na {secs}s. Powód: {reason}."),
                        )
                        .await;
                        format!("Timed out for {secs}s")
                    }
                    Err(PlatformError::MissingPermissions) => {
                        warn!(guild_id, user_id, "automod timeout denied: missing permissions");
                        "Timeout failed (missing permissions)".to_string()
                    }
                    Err(e) => {
                        warn!(error=?e, guild_id, user_id, "automod timeout failed");
                        "Timeout failed".to_string()
                    }
                }
            }
            Tier::Warn => {
                self.notify_user(
                    user_id,
                    &format!("⚠️ Ostrzeżenie od AutoModa. Powód: {reason}. Kolejne naruszenia skończą się wyciszeniem."),
                )
                .await;
                "Warned".to_string()
            }
            Tier::None => "No action".to_string(),
        };

        self.store
            .append(NewInfraction {
                guild_id,
                user_id,
                moderator_id: self.platform.actor_id(),
                kind: InfractionKind::Automod,
                reason: clip(&format!("{reason}: {content}"), MAX_REASON_CHARS),
                duration_seconds,
            })
            .await?;

        let infractions = self.store.count(user_id).await?;
        info!(guild_id, user_id, infractions, action=%action, "automod escalation applied");

        Ok(EscalationOutcome {
            infractions,
            tier,
            action,
        })
    }

    /// DM do ukaranego. Zamknięte DM to norma, więc tylko log.
    async fn notify_user(&self, user_id: u64, text: &str) {
        if let Err(e) = self.platform.send_direct_message(user_id, text).await {
            warn!(error=?e, user_id, "automod DM failed");
        }
    }
}

fn clip(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
