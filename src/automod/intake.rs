//! src/automod/intake.rs
//! Bramka wejściowa: buforuje każdą wiadomość i decyduje, czy (i jak)
//! zlecić ocenę bufora.

use std::sync::Arc;
use std::time::{Duration, Instant};

use super::buffer::ModerationState;
use super::platform::InboundMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntakeRoute {
    /// DM albo bot: nic nie robimy.
    Ignored,
    /// Zbuforowane, cooldown jeszcze trwa.
    BufferOnly,
    /// Do kolejki BatchSchedulera.
    Enqueue,
    /// Osobne zadanie oceny.
    Dispatch,
}

pub struct MessageIntakeGate {
    state: Arc<ModerationState>,
    cooldown: Duration,
    batch_mode: bool,
}

impl MessageIntakeGate {
    pub fn new(state: Arc<ModerationState>, cooldown: Duration, batch_mode: bool) -> Self {
        Self {
            state,
            cooldown,
            batch_mode,
        }
    }

    pub fn admit(&self, msg: &InboundMessage, now: Instant) -> IntakeRoute {
        if msg.guild_id.is_none() || msg.author_is_bot {
            return IntakeRoute::Ignored;
        }

        self.state.add_message(msg.author_id, &msg.content, now);

        if !self.state.try_pass_intake(msg.author_id, now, self.cooldown) {
            return IntakeRoute::BufferOnly;
        }

        if self.batch_mode {
            IntakeRoute::Enqueue
        } else {
            IntakeRoute::Dispatch
        }
    }
}
