//! Best-effort language detection
//!
//! Only tells Portuguese apart from the English baseline. False negatives
//! simply get the default voice.

use once_cell::sync::Lazy;
use regex::Regex;

/// Language assumed when nothing marks the text otherwise
pub const DEFAULT_LANGUAGE: &str = "en";

/// Portuguese diacritics and common marker words
static PORTUGUESE_MARKERS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)[ãõçáéíóúâêîôûà]|você|estou|tenho|como|querido|filho|coração|senhor|deus",
    )
    .expect("Portuguese marker pattern is valid")
});

/// Pick a two-letter language code for `text`.
///
/// A pinned language other than "auto" always wins; region suffixes
/// (`pt-BR`) are reduced to the language part.
pub fn detect_language(text: &str, pinned: &str) -> String {
    let pinned = pinned.trim();
    if !pinned.is_empty() && !pinned.eq_ignore_ascii_case("auto") {
        return normalize_language(pinned);
    }

    if PORTUGUESE_MARKERS.is_match(text) {
        "pt".to_string()
    } else {
        DEFAULT_LANGUAGE.to_string()
    }
}

/// Reduce a language tag such as `pt-BR` or `en_US` to `pt`/`en`
pub fn normalize_language(tag: &str) -> String {
    tag.split(['-', '_'])
        .next()
        .unwrap_or(DEFAULT_LANGUAGE)
        .to_lowercase()
}
