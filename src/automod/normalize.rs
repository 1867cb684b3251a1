//! src/automod/normalize.rs
//! Sprowadza tekst do "szkieletu" `[a-z0-9]`, żeby obejścia typu `Fr3@k`,
//! `f.u.c.k` czy znaki z akcentami wpadały w te same wzorce.

use unicode_normalization::UnicodeNormalization;

/// Zamiana znaków "leet" na litery. Cyfry spoza tabeli (2, 6, 8, 9) zostają.
fn leet(ch: char) -> char {
    match ch {
        '4' | '@' => 'a',
        '3' => 'e',
        '1' | '!' => 'i',
        '0' => 'o',
        '$' | '5' => 's',
        '7' => 't',
        other => other,
    }
}

/// Znaki bez rozkładu NFKD do ASCII, które i tak chcemy zachować.
fn fold_special(ch: char) -> char {
    match ch {
        'ƒ' => 'f',
        'ß' => 'b',
        'ç' => 'c',
        other => other,
    }
}

/// Normalizacja treści wiadomości.
///
/// Kolejność: małe litery → NFKD (odrzucamy wszystko spoza ASCII) → tabela leet →
/// tylko `[a-z0-9]`. Funkcja jest totalna i idempotentna.
pub fn normalize(text: &str) -> String {
    let lowered = text.to_lowercase();
    lowered
        .chars()
        .map(fold_special)
        .nfkd()
        .filter(|c| c.is_ascii())
        .map(leet)
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        .collect()
}
