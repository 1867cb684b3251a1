//! src/automod/regex_gate.rs
//! Szybka bramka regexowa nad surowym (nieznormalizowanym) tekstem bufora.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use regex::{Regex, RegexBuilder};
use tracing::{debug, error};

/// Źródło aktualnego zestawu wzorców. Zestaw może być podmieniany w całości
/// w dowolnym momencie, więc bramka bierze migawkę przy każdym sprawdzeniu.
pub trait PatternProvider: Send + Sync {
    fn patterns(&self) -> Arc<Vec<Regex>>;
}

/// Zestaw stały, przydatny w testach i przy twardo zaszytych listach.
pub struct StaticPatterns(Arc<Vec<Regex>>);

impl StaticPatterns {
    pub fn new(patterns: Vec<Regex>) -> Self {
        Self(Arc::new(patterns))
    }
}

impl PatternProvider for StaticPatterns {
    fn patterns(&self) -> Arc<Vec<Regex>> {
        self.0.clone()
    }
}

/// Wzorzec "elastyczny": `abc` → `a[^\w]*b[^\w]*c`, czyli łapie też `a.b c`.
pub fn flexible_word_pattern(word: &str) -> String {
    word.chars()
        .map(|c| regex::escape(&c.to_string()))
        .collect::<Vec<_>>()
        .join(r"[^\w]*")
}

/// Kompilacja wzorca tak, jak robi to bramka: bez rozróżniania wielkości liter,
/// `.` łapie też nowe linie.
pub fn compile_pattern(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .dot_matches_new_line(true)
        .build()
}

pub struct RegexGate {
    provider: OnceCell<Arc<dyn PatternProvider>>,
}

impl Default for RegexGate {
    fn default() -> Self {
        Self::new()
    }
}

impl RegexGate {
    /// Bramka bez dostawcy: do czasu `attach` nic nie flaguje.
    pub fn new() -> Self {
        Self {
            provider: OnceCell::new(),
        }
    }

    pub fn with_provider(provider: Arc<dyn PatternProvider>) -> Self {
        let gate = Self::new();
        gate.attach(provider);
        gate
    }

    /// Podpina dostawcę wzorców. Drugie wywołanie jest ignorowane.
    pub fn attach(&self, provider: Arc<dyn PatternProvider>) -> bool {
        self.provider.set(provider).is_ok()
    }

    pub fn is_attached(&self) -> bool {
        self.provider.get().is_some()
    }

    /// Czy którykolwiek wzorzec pasuje do tekstu. Zatrzymuje się na pierwszym trafieniu.
    pub fn matches(&self, text: &str) -> bool {
        let Some(provider) = self.provider.get() else {
            debug!("regex gate has no pattern provider yet");
            return false;
        };

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            let snapshot = provider.patterns();
            snapshot.iter().any(|re| re.is_match(text))
        }));

        match outcome {
            Ok(hit) => hit,
            Err(_) => {
                error!("regex gate panicked while matching; treating as no match");
                false
            }
        }
    }
}
