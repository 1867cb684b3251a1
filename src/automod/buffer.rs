//! src/automod/buffer.rs
//! Rejestr stanu per użytkownik: ostatnie surowe wiadomości, znormalizowany
//! strumień znaków oraz znaczniki czasu dla cooldownów i sprzątania.
//!
//! Mutacja buforów to krótka, synchroniczna sekcja krytyczna (bez `.await`).
//! Ocena bufora trzyma osobny, asynchroniczny zamek per użytkownik.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use dashmap::DashMap;

use super::normalize::normalize;
use crate::config::AutoModConfig;

/// Doklejane do wiadomości przyciętych do limitu znaków.
pub const TRUNCATION_MARKER: &str = "...";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferLimits {
    pub max_buffer: usize,
    pub substring_max: usize,
    pub max_message_chars: usize,
}

impl BufferLimits {
    pub fn from_config(cfg: &AutoModConfig) -> Self {
        Self {
            max_buffer: cfg.max_buffer,
            substring_max: cfg.substring_max,
            max_message_chars: cfg.max_message_chars,
        }
    }

    pub fn normalized_capacity(&self) -> usize {
        self.max_buffer.saturating_mul(self.substring_max)
    }
}

#[derive(Debug)]
struct UserBuffers {
    raw: VecDeque<String>,
    normalized: VecDeque<char>,
    last_checked_at: Option<Instant>,
    last_processed_at: Option<Instant>,
    created_at: Instant,
}

impl UserBuffers {
    fn new(now: Instant) -> Self {
        Self {
            raw: VecDeque::new(),
            normalized: VecDeque::new(),
            last_checked_at: None,
            last_processed_at: None,
            created_at: now,
        }
    }

    fn clear(&mut self) {
        self.raw.clear();
        self.normalized.clear();
    }

    /// Ostatnia aktywność w rozumieniu sprzątacza.
    fn last_seen(&self) -> Instant {
        self.last_checked_at.unwrap_or(self.created_at)
    }
}

/// Stan jednego użytkownika. Tworzony leniwie przy pierwszej wiadomości.
#[derive(Debug)]
pub struct UserEntry {
    buffers: Mutex<UserBuffers>,
    eval_lock: tokio::sync::Mutex<()>,
}

impl UserEntry {
    fn new(now: Instant) -> Self {
        Self {
            buffers: Mutex::new(UserBuffers::new(now)),
            eval_lock: tokio::sync::Mutex::new(()),
        }
    }

    fn buffers(&self) -> MutexGuard<'_, UserBuffers> {
        // Zatruty zamek: dane bufora są nadal spójne (każda operacja jest atomowa)
        match self.buffers.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Zamek oceny: serializuje ocenę, czyszczenie i eskalację jednego użytkownika.
    pub async fn lock_evaluation(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.eval_lock.lock().await
    }

    pub fn snapshot(&self) -> BufferSnapshot {
        let b = self.buffers();
        BufferSnapshot {
            raw: b.raw.iter().cloned().collect(),
            normalized: b.normalized.iter().collect(),
        }
    }

    /// Czyści oba bufory tego wpisu, nawet jeśli rejestr trzyma już nowszy.
    pub fn clear(&self) {
        self.buffers().clear();
    }
}

/// Migawka buforów pobrana pod zamkiem.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BufferSnapshot {
    pub raw: Vec<String>,
    pub normalized: String,
}

pub struct ModerationState {
    users: DashMap<u64, Arc<UserEntry>>,
    limits: BufferLimits,
}

impl ModerationState {
    pub fn new(limits: BufferLimits) -> Self {
        Self {
            users: DashMap::new(),
            limits,
        }
    }

    pub fn limits(&self) -> BufferLimits {
        self.limits
    }

    /// Zwraca (tworząc w razie potrzeby) wpis użytkownika.
    pub fn entry(&self, user_id: u64, now: Instant) -> Arc<UserEntry> {
        self.users
            .entry(user_id)
            .or_insert_with(|| Arc::new(UserEntry::new(now)))
            .clone()
    }

    /// Wpis bez tworzenia nowego.
    pub fn get(&self, user_id: u64) -> Option<Arc<UserEntry>> {
        self.users.get(&user_id).map(|e| Arc::clone(e.value()))
    }

    /// Dopisuje wiadomość do buforów. Zwraca liczbę surowych wiadomości w buforze.
    pub fn add_message(&self, user_id: u64, text: &str, now: Instant) -> usize {
        let entry = self.entry(user_id, now);
        let mut b = entry.buffers();

        if text.trim().is_empty() {
            return b.raw.len();
        }

        let stored = truncate_message(text, self.limits.max_message_chars);
        let normalized = normalize(&stored);

        if b.raw.len() >= self.limits.max_buffer {
            let overflow = b.raw.len() + 1 - self.limits.max_buffer;
            b.raw.drain(..overflow);
        }
        b.raw.push_back(stored);

        b.normalized.extend(normalized.chars());
        let cap = self.limits.normalized_capacity();
        let chunk = (cap / 4).max(1);
        while b.normalized.len() > cap {
            let n = chunk.min(b.normalized.len());
            b.normalized.drain(..n);
        }

        b.raw.len()
    }

    /// Cooldown wejściowy: true, jeśli wiadomość może trafić do oceny
    /// (i od razu zapisuje `last_checked_at`).
    pub fn try_pass_intake(&self, user_id: u64, now: Instant, cooldown: Duration) -> bool {
        let entry = self.entry(user_id, now);
        let mut b = entry.buffers();
        let ready = match b.last_checked_at {
            None => true,
            Some(t) => now.saturating_duration_since(t) >= cooldown,
        };
        if ready {
            b.last_checked_at = Some(now);
        }
        ready
    }

    /// Warunek wejścia do oceny: minął cooldown oceny i w buforze jest dość wiadomości.
    /// Przy sukcesie zapisuje `last_processed_at`.
    pub fn try_begin_evaluation(
        &self,
        user_id: u64,
        now: Instant,
        cooldown: Duration,
        min_messages: usize,
    ) -> bool {
        let Some(entry) = self.get(user_id) else {
            return false;
        };
        let mut b = entry.buffers();
        if let Some(t) = b.last_processed_at {
            if now.saturating_duration_since(t) < cooldown {
                return false;
            }
        }
        if b.raw.len() < min_messages {
            return false;
        }
        b.last_processed_at = Some(now);
        true
    }

    pub fn snapshot(&self, user_id: u64) -> Option<BufferSnapshot> {
        self.get(user_id).map(|e| e.snapshot())
    }

    /// Czyści oba bufory naraz. Znaczniki czasu zostają.
    pub fn clear(&self, user_id: u64) {
        if let Some(entry) = self.get(user_id) {
            entry.clear();
        }
    }

    pub fn raw_len(&self, user_id: u64) -> usize {
        self.get(user_id).map(|e| e.buffers().raw.len()).unwrap_or(0)
    }

    pub fn normalized_len(&self, user_id: u64) -> usize {
        self.get(user_id)
            .map(|e| e.buffers().normalized.len())
            .unwrap_or(0)
    }

    pub fn contains(&self, user_id: u64) -> bool {
        self.users.contains_key(&user_id)
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    /// Usuwa użytkowników nieaktywnych dłużej niż `ttl`. Zwraca liczbę usuniętych.
    pub fn evict_idle(&self, now: Instant, ttl: Duration) -> usize {
        let is_idle = |e: &Arc<UserEntry>| now.saturating_duration_since(e.buffers().last_seen()) > ttl;

        // migawka kluczy, żeby nie iterować po mapie w trakcie usuwania
        let candidates: Vec<u64> = self
            .users
            .iter()
            .filter(|kv| is_idle(kv.value()))
            .map(|kv| *kv.key())
            .collect();

        candidates
            .into_iter()
            .filter(|uid| self.users.remove_if(uid, |_, e| is_idle(e)).is_some())
            .count()
    }
}

fn truncate_message(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max_chars).collect();
    cut.push_str(TRUNCATION_MARKER);
    cut
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn state() -> ModerationState {
        ModerationState::new(BufferLimits::from_config(&AutoModConfig::default()))
    }

    #[test]
    fn whitespace_only_is_noop() {
        let s = state();
        let now = Instant::now();
        assert_eq!(s.add_message(1, "   \n\t", now), 0);
        assert_eq!(s.normalized_len(1), 0);
    }

    #[test]
    fn raw_buffer_keeps_latest() {
        let s = state();
        let now = Instant::now();
        for i in 0..8 {
            s.add_message(1, &format!("msg{i}"), now);
        }
        let snap = s.snapshot(1).unwrap();
        assert_eq!(snap.raw, vec!["msg3", "msg4", "msg5", "msg6", "msg7"]);
    }

    #[test]
    fn long_message_truncated_with_marker() {
        let s = state();
        let long = "ą".repeat(1500);
        s.add_message(7, &long, Instant::now());
        let snap = s.snapshot(7).unwrap();
        assert_eq!(snap.raw[0].chars().count(), 1000 + TRUNCATION_MARKER.len());
        assert!(snap.raw[0].ends_with(TRUNCATION_MARKER));
    }

    #[test]
    fn normalized_evicts_in_chunks() {
        let s = state();
        let cap = s.limits().normalized_capacity();
        s.add_message(1, &"a".repeat(cap), Instant::now());
        assert_eq!(s.normalized_len(1), cap);
        s.add_message(1, "b", Instant::now());
        assert_eq!(s.normalized_len(1), cap + 1 - cap / 4);
        assert!(s.snapshot(1).unwrap().normalized.ends_with('b'));
    }

    #[test]
    fn clear_empties_both_buffers() {
        let s = state();
        let now = Instant::now();
        s.add_message(1, "hello there", now);
        s.add_message(1, "general kenobi", now);
        s.clear(1);
        let snap = s.snapshot(1).unwrap();
        assert!(snap.raw.is_empty());
        assert!(snap.normalized.is_empty());
    }

    #[test]
    fn clearing_an_evicted_entry_keeps_the_new_one() {
        let s = state();
        let t0 = Instant::now();
        s.add_message(1, "first words", t0);
        let stale = s.get(1).unwrap();

        let later = t0 + Duration::from_secs(7200);
        assert_eq!(s.evict_idle(later, Duration::from_secs(3600)), 1);
        s.add_message(1, "second words", later);

        stale.clear();
        assert_eq!(s.raw_len(1), 1);
        assert_eq!(s.snapshot(1).unwrap().raw, vec!["second words".to_string()]);
    }

    #[test]
    fn intake_cooldown() {
        let s = state();
        let t0 = Instant::now();
        let cd = Duration::from_secs(2);
        assert!(s.try_pass_intake(1, t0, cd));
        assert!(!s.try_pass_intake(1, t0 + Duration::from_secs(1), cd));
        assert!(s.try_pass_intake(1, t0 + Duration::from_secs(2), cd));
    }

    #[test]
    fn evaluation_needs_two_messages_and_cooldown() {
        let s = state();
        let t0 = Instant::now();
        let cd = Duration::from_secs(30);
        s.add_message(1, "one", t0);
        assert!(!s.try_begin_evaluation(1, t0, cd, 2));
        s.add_message(1, "two", t0);
        assert!(s.try_begin_evaluation(1, t0, cd, 2));
        assert!(!s.try_begin_evaluation(1, t0 + Duration::from_secs(29), cd, 2));
        assert!(s.try_begin_evaluation(1, t0 + Duration::from_secs(30), cd, 2));
        assert!(!s.try_begin_evaluation(99, t0, cd, 2));
    }

    #[test]
    fn evict_only_idle_users() {
        let s = state();
        let t0 = Instant::now();
        let ttl = Duration::from_secs(3600);
        s.add_message(1, "old", t0);
        s.try_pass_intake(1, t0, Duration::from_secs(2));
        s.add_message(2, "fresh", t0);
        s.try_pass_intake(2, t0 + Duration::from_secs(3000), Duration::from_secs(2));

        let evicted = s.evict_idle(t0 + Duration::from_secs(3601), ttl);
        assert_eq!(evicted, 1);
        assert!(!s.contains(1));
        assert!(s.contains(2));
    }

    proptest! {
        #[test]
        fn bounds_hold_for_any_sequence(
            msgs in proptest::collection::vec("\\PC{0,300}", 0..40),
            max_buffer in 1usize..8,
            substring_max in 1usize..60,
        ) {
            let limits = BufferLimits { max_buffer, substring_max, max_message_chars: 1000 };
            let s = ModerationState::new(limits);
            let now = Instant::now();
            for m in &msgs {
                s.add_message(5, m, now);
                prop_assert!(s.raw_len(5) <= max_buffer);
                prop_assert!(s.normalized_len(5) <= limits.normalized_capacity());
            }
        }
    }
}
