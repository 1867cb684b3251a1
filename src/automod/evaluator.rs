//! src/automod/evaluator.rs
//! Pełna ocena bufora użytkownika: regex → klasyfikator → sprzątanie → kara → log.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use futures_util::FutureExt;
use tracing::{debug, error, info, warn};

use super::buffer::{BufferSnapshot, ModerationState, UserEntry, TRUNCATION_MARKER};
use super::classifier::ToxicityClassifier;
use super::escalation::{EscalationOutcome, PunishmentEscalator};
use super::platform::{InboundMessage, ModLogSink, ModerationPlatform};
use super::regex_gate::RegexGate;
use crate::config::AutoModConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Regex,
    Toxicity,
}

impl Verdict {
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Regex => "Regex violation",
            Self::Toxicity => "AI toxicity",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Cooldown oceny albo za mało wiadomości.
    NotReady,
    EmptyBuffer,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvaluationOutcome {
    Skipped(SkipReason),
    Clear,
    Flagged {
        verdict: Verdict,
        deleted: usize,
        escalation: EscalationOutcome,
    },
    /// Błąd w trakcie oceny: bufory wyczyszczone, bez kary.
    Failed,
}

#[derive(Debug, Clone, Copy)]
struct EvaluatorSettings {
    eval_cooldown: Duration,
    min_messages: usize,
    substring_min: usize,
    max_deletions: usize,
    history_lookback: u8,
}

pub struct BufferEvaluator {
    state: Arc<ModerationState>,
    gate: Arc<RegexGate>,
    classifier: Arc<ToxicityClassifier>,
    escalator: Arc<PunishmentEscalator>,
    platform: Arc<dyn ModerationPlatform>,
    modlog: Arc<dyn ModLogSink>,
    settings: EvaluatorSettings,
}

impl BufferEvaluator {
    pub fn new(
        state: Arc<ModerationState>,
        gate: Arc<RegexGate>,
        classifier: Arc<ToxicityClassifier>,
        escalator: Arc<PunishmentEscalator>,
        platform: Arc<dyn ModerationPlatform>,
        modlog: Arc<dyn ModLogSink>,
        cfg: &AutoModConfig,
    ) -> Self {
        Self {
            state,
            gate,
            classifier,
            escalator,
            platform,
            modlog,
            settings: EvaluatorSettings {
                eval_cooldown: cfg.eval_cooldown(),
                min_messages: cfg.min_messages,
                substring_min: cfg.substring_min,
                max_deletions: cfg.max_buffer,
                history_lookback: cfg.history_lookback,
            },
        }
    }

    pub async fn evaluate(&self, msg: &InboundMessage) -> EvaluationOutcome {
        self.evaluate_at(msg, Instant::now()).await
    }

    pub async fn evaluate_at(&self, msg: &InboundMessage, now: Instant) -> EvaluationOutcome {
        let user_id = msg.author_id;
        let s = self.settings;

        if !self
            .state
            .try_begin_evaluation(user_id, now, s.eval_cooldown, s.min_messages)
        {
            return EvaluationOutcome::Skipped(SkipReason::NotReady);
        }

        // sprzątacz mógł usunąć wpis w międzyczasie
        let Some(entry) = self.state.get(user_id) else {
            return EvaluationOutcome::Skipped(SkipReason::EmptyBuffer);
        };
        let _guard = entry.lock_evaluation().await;

        let snapshot = entry.snapshot();
        if snapshot.raw.is_empty() {
            return EvaluationOutcome::Skipped(SkipReason::EmptyBuffer);
        }

        let run = AssertUnwindSafe(self.run_checks(msg, &entry, snapshot)).catch_unwind().await;
        match run {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                error!(error=?e, user_id, "automod evaluation failed; buffers cleared");
                entry.clear();
                EvaluationOutcome::Failed
            }
            Err(_) => {
                error!(user_id, "automod evaluation panicked; buffers cleared");
                entry.clear();
                EvaluationOutcome::Failed
            }
        }
    }

    async fn run_checks(
        &self,
        msg: &InboundMessage,
        entry: &UserEntry,
        snapshot: BufferSnapshot,
    ) -> Result<EvaluationOutcome> {
        let user_id = msg.author_id;

        let combined = snapshot.raw.join(" ");
        let verdict = if self.gate.matches(&combined) {
            Some(Verdict::Regex)
        } else if snapshot.normalized.chars().count() >= self.settings.substring_min
            && self.classifier.classify(&snapshot.normalized).await
        {
            Some(Verdict::Toxicity)
        } else {
            None
        };

        let Some(verdict) = verdict else {
            debug!(user_id, "buffer clean");
            return Ok(EvaluationOutcome::Clear);
        };

        let deleted = self.delete_matching_history(msg, &snapshot.raw).await;
        entry.clear();

        let guild_id = msg.guild_id.unwrap_or_default();
        let escalation = self
            .escalator
            .escalate(guild_id, user_id, verdict.reason(), &msg.content)
            .await?;

        let line = format!(
            "{}: {} (Infraction #{})",
            verdict.reason(),
            escalation.action,
            escalation.infractions
        );
        self.modlog.notify(guild_id, user_id, &line).await;
        info!(user_id, guild_id, deleted, verdict=?verdict, "automod flagged buffer");

        Ok(EvaluationOutcome::Flagged {
            verdict,
            deleted,
            escalation,
        })
    }

    /// Kasuje z historii kanału wiadomości autora pasujące do bufora.
    /// Wiadomość wyzwalająca zostaje. Błędy są logowane, nie przerywają oceny.
    async fn delete_matching_history(&self, msg: &InboundMessage, buffered: &[String]) -> usize {
        let history = match self
            .platform
            .fetch_recent_history(msg.channel_id, self.settings.history_lookback)
            .await
        {
            Ok(h) => h,
            Err(e) => {
                warn!(error=?e, channel_id = msg.channel_id, "history fetch failed; nothing deleted");
                return 0;
            }
        };

        let mut deleted = 0;
        for m in history {
            if deleted >= self.settings.max_deletions {
                break;
            }
            if m.author_id != msg.author_id || m.id == msg.message_id {
                continue;
            }
            if !matches_buffered(&m.content, buffered) {
                continue;
            }
            match self.platform.delete_message(msg.channel_id, m.id).await {
                Ok(()) => deleted += 1,
                Err(e) => warn!(error=?e, message_id = m.id, "automod delete failed"),
            }
        }
        deleted
    }
}

/// Zawieranie w dowolną stronę; puste treści (same załączniki) nigdy nie pasują.
fn matches_buffered(content: &str, buffered: &[String]) -> bool {
    let content = content.trim();
    if content.is_empty() {
        return false;
    }
    buffered.iter().any(|b| {
        let b = b.strip_suffix(TRUNCATION_MARKER).unwrap_or(b).trim();
        !b.is_empty() && (b.contains(content) || content.contains(b))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn containment_either_direction() {
        let buf = vec!["hello there".to_string()];
        assert!(matches_buffered("hello", &buf));
        assert!(matches_buffered("oh hello there friend", &buf));
        assert!(!matches_buffered("goodbye", &buf));
    }

    #[test]
    fn empty_history_content_never_matches() {
        let buf = vec!["anything".to_string()];
        assert!(!matches_buffered("", &buf));
        assert!(!matches_buffered("   ", &buf));
    }

    #[test]
    fn truncated_entries_match_full_message() {
        let full = "x".repeat(1200);
        let buf = vec![format!("{}{}", "x".repeat(1000), TRUNCATION_MARKER)];
        assert!(matches_buffered(&full, &buf));
    }

    #[test]
    fn verdict_reasons() {
        assert_eq!(Verdict::Regex.reason(), "Regex violation");
        assert_eq!(Verdict::Toxicity.reason(), "AI toxicity");
    }
}
