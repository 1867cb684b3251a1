//! src/automod/blacklist.rs
//! Czarna lista słów: stałe wzorce + słowa dodawane przez administrację,
//! trzymane w pliku JSON. Po każdej zmianie cały zestaw regexów jest
//! kompilowany od nowa i podmieniany jednym ruchem.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::regex_gate::{compile_pattern, flexible_word_pattern, PatternProvider};

pub const MIN_WORD_CHARS: usize = 2;
pub const MAX_WORD_CHARS: usize = 50;

/// Wzorce zawsze aktywne, niezależnie od pliku.
const STATIC_PATTERNS: &[&str] = &[
    r"\bn+[i1!]+gg+(?:a|er|uh)s?\b",
    r"\bf+[a@4]+gg*(?:[o0]+t)?s?\b",
    r"\bk+y+s+\b",
    r"\bk[i1!]ll\s*y(?:o|ou)?u?r\s*s[e3]lf\b",
    r"\bretard(?:ed|s)?\b",
];

#[derive(Debug, Error)]
pub enum BlacklistError {
    #[error("word must be 2-50 characters long")]
    InvalidLength,
    #[error("blacklist file I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("blacklist file could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct BlacklistFile {
    #[serde(default)]
    offensive_words: Vec<String>,
}

pub struct BlacklistManager {
    path: PathBuf,
    /// Jedna edycja naraz: odczyt → zmiana → zapis pliku → podmiana wzorców.
    edit: Mutex<()>,
    words: RwLock<Vec<String>>,
    compiled: RwLock<Arc<Vec<Regex>>>,
}

impl BlacklistManager {
    /// Wczytuje plik (brak/uszkodzony → pusta lista) i kompiluje zestaw.
    pub async fn load(path: impl Into<PathBuf>) -> Arc<Self> {
        let path = path.into();
        let words = read_words(&path).await;
        let this = Arc::new(Self {
            path,
            edit: Mutex::new(()),
            words: RwLock::new(words),
            compiled: RwLock::new(Arc::new(Vec::new())),
        });
        this.refresh();
        this
    }

    pub fn words(&self) -> Vec<String> {
        match self.words.read() {
            Ok(w) => w.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Dodaje słowo, zapisuje plik i odświeża wzorce. Zwraca aktualną listę.
    pub async fn add_word(&self, word: &str) -> Result<Vec<String>, BlacklistError> {
        let word = clean_word(word);
        let len = word.chars().count();
        if !(MIN_WORD_CHARS..=MAX_WORD_CHARS).contains(&len) {
            return Err(BlacklistError::InvalidLength);
        }
        let _edit = self.edit.lock().await;
        let mut next = self.words();
        next.push(word);
        self.store(next).await
    }

    /// Usuwa słowo (jeśli było), zapisuje plik i odświeża wzorce.
    pub async fn remove_word(&self, word: &str) -> Result<Vec<String>, BlacklistError> {
        let word = clean_word(word);
        let _edit = self.edit.lock().await;
        let next: Vec<String> = self.words().into_iter().filter(|w| *w != word).collect();
        self.store(next).await
    }

    /// Wołane wyłącznie pod zamkiem `edit`.
    async fn store(&self, words: Vec<String>) -> Result<Vec<String>, BlacklistError> {
        let words = canonical(words);
        write_words(&self.path, &words).await?;
        match self.words.write() {
            Ok(mut w) => *w = words.clone(),
            Err(poisoned) => *poisoned.into_inner() = words.clone(),
        }
        self.refresh();
        Ok(words)
    }

    /// Kompiluje stałe wzorce + słowa z listy i podmienia cały zestaw.
    pub fn refresh(&self) {
        let words = self.words();
        let mut set = Vec::with_capacity(STATIC_PATTERNS.len() + words.len());

        for p in STATIC_PATTERNS {
            match compile_pattern(p) {
                Ok(re) => set.push(re),
                Err(e) => warn!(error=?e, pattern=%p, "static blacklist pattern failed to compile"),
            }
        }
        for w in &words {
            match compile_pattern(&flexible_word_pattern(w)) {
                Ok(re) => set.push(re),
                Err(e) => warn!(error=?e, word=%w, "blacklist word failed to compile"),
            }
        }

        let total = set.len();
        match self.compiled.write() {
            Ok(mut c) => *c = Arc::new(set),
            Err(poisoned) => *poisoned.into_inner() = Arc::new(set),
        }
        info!(patterns = total, words = words.len(), "blacklist patterns refreshed");
    }
}

impl PatternProvider for BlacklistManager {
    fn patterns(&self) -> Arc<Vec<Regex>> {
        match self.compiled.read() {
            Ok(c) => c.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

fn clean_word(word: &str) -> String {
    word.trim().to_lowercase()
}

/// Małe litery, bez pustych, bez duplikatów, posortowane.
fn canonical(words: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = words
        .into_iter()
        .map(|w| clean_word(&w))
        .filter(|w| !w.is_empty())
        .collect();
    out.sort();
    out.dedup();
    out
}

async fn read_words(path: &Path) -> Vec<String> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(error=?e, path=%path.display(), "blacklist file unreadable; starting empty");
            }
            return Vec::new();
        }
    };
    match serde_json::from_str::<BlacklistFile>(&raw) {
        Ok(file) => canonical(file.offensive_words),
        Err(e) => {
            warn!(error=?e, path=%path.display(), "blacklist file corrupt; starting empty");
            Vec::new()
        }
    }
}

async fn write_words(path: &Path, words: &[String]) -> Result<(), BlacklistError> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            tokio::fs::create_dir_all(dir).await?;
        }
    }
    let body = serde_json::to_string_pretty(&BlacklistFile {
        offensive_words: words.to_vec(),
    })?;
    tokio::fs::write(path, body).await?;
    Ok(())
}
