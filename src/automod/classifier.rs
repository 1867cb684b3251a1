//! src/automod/classifier.rs
//! Ocena toksyczności: jeden interfejs, dwa backendy wybierane z konfiguracji
//! (reguły albo zewnętrzny model z awaryjnym powrotem do reguł).

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use moka::sync::Cache;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serenity::async_trait;
use tracing::{debug, warn};
use url::Url;

use super::normalize::normalize;
use crate::config::{AutoModConfig, ClassifierBackendKind, ClassifierConfig};

/// Długość okna (w znakach) podawanego do modelu.
pub const MODEL_WINDOW_CHARS: usize = 512;

static HIGH_RISK: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"(?i)\b(?:fuck|shit|bitch|asshole|dick|pussy|cunt)\w*\b").unwrap(),
        Regex::new(r"(?i)\b(?:kill|murder|hurt|harm)\s+(?:yourself|myself|themselves|us)\b").unwrap(),
        Regex::new(r"(?i)\b(?:nigg|fag|retard)\w*\b").unwrap(),
        Regex::new(r"(?i)\b(?:die\s+u|kys|kill\s+urself)\b").unwrap(),
    ]
});

/* ==============================
   Model zewnętrzny
   ============================== */

/// Czarna skrzynka zwracająca wynik toksyczności w [0, 1].
#[async_trait]
pub trait ToxicityModel: Send + Sync {
    async fn score(&self, text: &str) -> Result<f32>;
}

#[derive(Serialize)]
struct ScoreRequest<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct ScoreResponse {
    score: f32,
}

/// Model wystawiony po HTTP: `POST {"text": ..}` → `{"score": 0.0..1.0}`.
pub struct HttpToxicityModel {
    client: Client,
    endpoint: Url,
}

impl HttpToxicityModel {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        let endpoint = Url::parse(endpoint).with_context(|| format!("bad classifier endpoint {endpoint}"))?;
        let client = Client::builder()
            .user_agent("Morrible-AutoMod/1.0")
            .timeout(timeout)
            .build()?;
        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl ToxicityModel for HttpToxicityModel {
    async fn score(&self, text: &str) -> Result<f32> {
        let resp = self
            .client
            .post(self.endpoint.clone())
            .json(&ScoreRequest { text })
            .send()
            .await?
            .error_for_status()?;
        let body: ScoreResponse = resp.json().await?;
        if !body.score.is_finite() {
            anyhow::bail!("classifier returned non-finite score");
        }
        Ok(body.score.clamp(0.0, 1.0))
    }
}

/* ==============================
   Backend regułowy
   ============================== */

#[derive(Debug, Clone)]
/// Reguły pisane pod surowy tekst. W potoku dostają strumień znormalizowany
/// (małe litery, bez spacji, sklejony), więc granice `\b`, krzyk i powtórzenia
/// łapią tam tylko skrajne przypadki. Rozbite słowa łapie głównie `RegexGate` na surowym tekście.
pub struct RuleBasedClassifier {
    min_len: usize,
}

impl RuleBasedClassifier {
    pub fn new(min_len: usize) -> Self {
        Self { min_len }
    }

    pub fn is_toxic(&self, text: &str) -> bool {
        if text.trim().chars().count() < self.min_len {
            return false;
        }
        HIGH_RISK.iter().any(|re| re.is_match(text)) || is_yelling(text) || is_repetitive(text)
    }
}

/// Ponad 10 znaków, więcej niż 5 wielkich liter i ponad 60% wielkich liter.
fn is_yelling(text: &str) -> bool {
    let total = text.chars().count();
    if total <= 10 {
        return false;
    }
    let upper = text.chars().filter(|c| c.is_uppercase()).count();
    upper > 5 && (upper as f32 / total as f32) > 0.6
}

/// Ponad 5 słów, a najczęstsze stanowi ponad 40% wszystkich.
fn is_repetitive(text: &str) -> bool {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= 5 {
        return false;
    }
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for w in words.iter().copied() {
        *counts.entry(w).or_insert(0) += 1;
    }
    let top = counts.values().copied().max().unwrap_or(0);
    (top as f32 / words.len() as f32) > 0.4
}

/* ==============================
   Backend modelowy
   ============================== */

pub struct ModelClassifier {
    model: Option<Arc<dyn ToxicityModel>>,
    threshold: f32,
    fallback: RuleBasedClassifier,
}

impl ModelClassifier {
    pub fn new(model: Option<Arc<dyn ToxicityModel>>, threshold: f32, fallback: RuleBasedClassifier) -> Self {
        Self {
            model,
            threshold,
            fallback,
        }
    }

    pub fn has_model(&self) -> bool {
        self.model.is_some()
    }

    async fn classify(&self, text: &str) -> bool {
        let Some(model) = self.model.as_ref() else {
            return self.fallback.is_toxic(text);
        };

        for window in sample_windows(text, MODEL_WINDOW_CHARS) {
            match model.score(window).await {
                Ok(score) if score >= self.threshold => {
                    debug!(score, "model flagged window");
                    return true;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(error=?e, "toxicity model failed; using rule-based fallback");
                    return self.fallback.is_toxic(text);
                }
            }
        }
        false
    }
}

/// Okna dla modelu: całość, albo początek + koniec (+ środek dla bardzo długich).
pub fn sample_windows(text: &str, window: usize) -> Vec<&str> {
    let total = text.chars().count();
    if total <= window || window == 0 {
        return vec![text];
    }
    let byte_at = |ci: usize| {
        text.char_indices()
            .nth(ci)
            .map(|(b, _)| b)
            .unwrap_or(text.len())
    };

    let mut out = vec![&text[..byte_at(window)], &text[byte_at(total - window)..]];
    if total > window * 3 {
        let start = (total - window) / 2;
        out.push(&text[byte_at(start)..byte_at(start + window)]);
    }
    out
}

/* ==============================
   Fasada
   ============================== */

pub enum ClassifierBackend {
    Rules(RuleBasedClassifier),
    Model(ModelClassifier),
}

impl ClassifierBackend {
    async fn classify(&self, text: &str) -> bool {
        match self {
            Self::Rules(r) => r.is_toxic(text),
            Self::Model(m) => m.classify(text).await,
        }
    }
}

pub struct ToxicityClassifier {
    backend: ClassifierBackend,
    /// (fraza małymi literami, fraza znormalizowana)
    allowed: Vec<(String, String)>,
    /// hash treści → "oceniono, czyste"
    cache: Cache<u64, ()>,
}

impl ToxicityClassifier {
    pub fn new(backend: ClassifierBackend, cfg: &AutoModConfig) -> Self {
        let allowed = cfg
            .allowed_context
            .iter()
            .map(|p| {
                let lower = p.trim().to_lowercase();
                let norm = normalize(&lower);
                (lower, norm)
            })
            .filter(|(lower, _)| !lower.is_empty())
            .collect();

        Self {
            backend,
            allowed,
            cache: Cache::builder()
                .max_capacity(cfg.dedup_cache_limit.saturating_mul(2).max(1))
                .build(),
        }
    }

    /// Backend wg konfiguracji. Model, którego nie da się zbudować, oznacza reguły.
    pub fn from_config(cfg: &AutoModConfig, ccfg: &ClassifierConfig) -> Self {
        let rules = RuleBasedClassifier::new(cfg.substring_min);
        let backend = match ccfg.backend {
            ClassifierBackendKind::Rules => ClassifierBackend::Rules(rules),
            ClassifierBackendKind::Model => {
                let timeout = Duration::from_millis(ccfg.request_timeout_ms);
                let model: Option<Arc<dyn ToxicityModel>> = match ccfg.endpoint.as_deref() {
                    Some(ep) => match HttpToxicityModel::new(ep, timeout) {
                        Ok(m) => Some(Arc::new(m)),
                        Err(e) => {
                            warn!(error=?e, "toxicity model unavailable; rule-based fallback only");
                            None
                        }
                    },
                    None => None,
                };
                ClassifierBackend::Model(ModelClassifier::new(model, cfg.ai_toxic_threshold, rules))
            }
        };
        Self::new(backend, cfg)
    }

    pub fn backend(&self) -> &ClassifierBackend {
        &self.backend
    }

    /// Czy tekst zawiera frazę z listy dozwolonych kontekstów.
    pub fn is_allowed_context(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        let norm = normalize(text);
        self.allowed
            .iter()
            .any(|(phrase, phrase_norm)| lower.contains(phrase.as_str()) || (!phrase_norm.is_empty() && norm.contains(phrase_norm.as_str())))
    }

    /// Czy tekst jest toksyczny. Nigdy nie zwraca błędu: awarie modelu kończą się regułami.
    pub async fn classify(&self, text: &str) -> bool {
        if self.is_allowed_context(text) {
            return false;
        }

        let key = content_hash(text);
        if self.cache.contains_key(&key) {
            return false;
        }

        let flagged = self.backend.classify(text).await;
        if !flagged {
            self.cache.insert(key, ());
        }
        flagged
    }

    pub fn cache_len(&self) -> u64 {
        self.cache.run_pending_tasks();
        self.cache.entry_count()
    }

    pub fn clear_cache(&self) {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks();
    }
}

fn content_hash(text: &str) -> u64 {
    let mut h = DefaultHasher::new();
    text.hash(&mut h);
    h.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixed(f32, AtomicUsize);

    #[async_trait]
    impl ToxicityModel for Fixed {
        async fn score(&self, _text: &str) -> Result<f32> {
            self.1.fetch_add(1, Ordering::SeqCst);
            Ok(self.0)
        }
    }

    struct Broken;

    #[async_trait]
    impl ToxicityModel for Broken {
        async fn score(&self, _text: &str) -> Result<f32> {
            anyhow::bail!("model offline")
        }
    }

    /// Flaguje tylko okna zawierające zadany fragment.
    struct Spotter(&'static str, Mutex<Vec<String>>);

    #[async_trait]
    impl ToxicityModel for Spotter {
        async fn score(&self, text: &str) -> Result<f32> {
            self.1.lock().unwrap().push(text.to_string());
            Ok(if text.contains(self.0) { 0.9 } else { 0.1 })
        }
    }

    fn cfg() -> AutoModConfig {
        AutoModConfig::default()
    }

    fn model_classifier(model: Arc<dyn ToxicityModel>) -> ToxicityClassifier {
        let c = cfg();
        ToxicityClassifier::new(
            ClassifierBackend::Model(ModelClassifier::new(
                Some(model),
                c.ai_toxic_threshold,
                RuleBasedClassifier::new(c.substring_min),
            )),
            &c,
        )
    }

    fn rules() -> ToxicityClassifier {
        let c = cfg();
        ToxicityClassifier::new(ClassifierBackend::Rules(RuleBasedClassifier::new(c.substring_min)), &c)
    }

    #[test]
    fn rules_high_risk_patterns() {
        let r = RuleBasedClassifier::new(3);
        assert!(r.is_toxic("you should kys"));
        assert!(r.is_toxic("go hurt yourself"));
        assert!(r.is_toxic("fuck"));
        assert!(!r.is_toxic("have a nice day"));
        assert!(!r.is_toxic("ky"));
    }

    #[test]
    fn rules_yelling_and_repetition() {
        let r = RuleBasedClassifier::new(3);
        assert!(r.is_toxic("STOP TALKING NOW"));
        assert!(!r.is_toxic("Hello World"));
        assert!(r.is_toxic("spam spam spam spam ham eggs"));
        assert!(!r.is_toxic("one two three four five six"));
    }

    #[test]
    fn rules_on_normalized_stream_only_see_leading_stems() {
        let r = RuleBasedClassifier::new(3);
        assert!(r.is_toxic("fuckyou"));
        // brak granicy słowa przed rdzeniem
        assert!(!r.is_toxic("youfuckingidiot"));
    }

    #[tokio::test]
    async fn threshold_is_inclusive() {
        let c = model_classifier(Arc::new(Fixed(0.6, AtomicUsize::new(0))));
        assert!(c.classify("borderline text").await);
        let c = model_classifier(Arc::new(Fixed(0.59, AtomicUsize::new(0))));
        assert!(!c.classify("borderline text").await);
    }

    #[tokio::test]
    async fn broken_model_falls_back_to_rules() {
        let c = model_classifier(Arc::new(Broken));
        assert!(c.classify("YOU ARE SO STUPID KYS").await);
        assert!(!c.classify("lovely weather today").await);
    }

    #[tokio::test]
    async fn missing_model_uses_rules() {
        let c = cfg();
        let clf = ToxicityClassifier::new(
            ClassifierBackend::Model(ModelClassifier::new(None, 0.6, RuleBasedClassifier::new(3))),
            &c,
        );
        assert!(clf.classify("kys").await);
    }

    #[tokio::test]
    async fn allow_list_short_circuits_before_scoring() {
        let model = Arc::new(Fixed(1.0, AtomicUsize::new(0)));
        let c = model_classifier(model.clone());
        assert!(!c.classify("I am gay and proud").await);
        assert!(!c.classify("iamgayandproud").await);
        assert_eq!(model.1.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn clean_results_are_cached_flagged_are_not() {
        let model = Arc::new(Fixed(0.1, AtomicUsize::new(0)));
        let c = model_classifier(model.clone());
        assert!(!c.classify("plain words").await);
        assert!(!c.classify("plain words").await);
        assert_eq!(model.1.load(Ordering::SeqCst), 1);
        assert_eq!(c.cache_len(), 1);

        let model = Arc::new(Fixed(0.9, AtomicUsize::new(0)));
        let c = model_classifier(model.clone());
        assert!(c.classify("bad words").await);
        assert!(c.classify("bad words").await);
        assert_eq!(model.1.load(Ordering::SeqCst), 2);
        assert_eq!(c.cache_len(), 0);
    }

    #[tokio::test]
    async fn clear_cache_forces_rescoring() {
        let model = Arc::new(Fixed(0.1, AtomicUsize::new(0)));
        let c = model_classifier(model.clone());
        assert!(!c.classify("nothing to see").await);
        c.clear_cache();
        assert!(!c.classify("nothing to see").await);
        assert_eq!(model.1.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn rules_backend_is_selected_by_default() {
        let c = ToxicityClassifier::from_config(&cfg(), &ClassifierConfig::default());
        assert!(matches!(c.backend(), ClassifierBackend::Rules(_)));
        assert!(rules().classify("kys").await);
    }

    #[test]
    fn model_backend_from_config_builds_http_model() {
        let ccfg = ClassifierConfig {
            backend: ClassifierBackendKind::Model,
            endpoint: Some("http://127.0.0.1:8080/score".into()),
            ..Default::default()
        };
        let c = ToxicityClassifier::from_config(&cfg(), &ccfg);
        match c.backend() {
            ClassifierBackend::Model(m) => assert!(m.has_model()),
            ClassifierBackend::Rules(_) => panic!("expected model backend"),
        }
    }

    #[test]
    fn windows_cover_start_end_middle() {
        let short = "a".repeat(MODEL_WINDOW_CHARS);
        assert_eq!(sample_windows(&short, MODEL_WINDOW_CHARS).len(), 1);

        let medium = format!("{}{}", "a".repeat(MODEL_WINDOW_CHARS), "b".repeat(MODEL_WINDOW_CHARS));
        let w = sample_windows(&medium, MODEL_WINDOW_CHARS);
        assert_eq!(w.len(), 2);
        assert!(w[0].chars().all(|c| c == 'a'));
        assert!(w[1].chars().all(|c| c == 'b'));

        let long = "x".repeat(MODEL_WINDOW_CHARS * 4);
        let w = sample_windows(&long, MODEL_WINDOW_CHARS);
        assert_eq!(w.len(), 3);
        assert!(w.iter().all(|s| s.chars().count() == MODEL_WINDOW_CHARS));
    }

    #[tokio::test]
    async fn toxic_tail_is_found_in_end_window() {
        let text = format!("{}toxicbit", "a".repeat(MODEL_WINDOW_CHARS * 2));
        let spotter = Arc::new(Spotter("toxicbit", Mutex::new(Vec::new())));
        let c = model_classifier(spotter.clone());
        assert!(c.classify(&text).await);
        assert_eq!(spotter.1.lock().unwrap().len(), 2);
    }
}
