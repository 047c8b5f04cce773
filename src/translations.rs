//! Picks the language bundle to load.

use crate::models::TranslationList;

pub const FALLBACK_LANGUAGE: &str = "en";

/// Resolve the language to load.
///
/// A stored preference wins if the server still offers it. Otherwise the
/// server's default applies, where `"auto"` means the caller's locale (or its
/// primary subtag, `en-us` → `en`). Falls back to English.
pub fn resolve_language(
    available: &TranslationList,
    stored: Option<&str>,
    locale: Option<&str>,
) -> String {
    let codes: Vec<String> = available
        .translations
        .iter()
        .map(|t| t.language_code.to_lowercase())
        .collect();
    let offered = |code: &str| codes.iter().any(|c| c == code);

    if let Some(stored) = stored.filter(|s| offered(s)) {
        return stored.to_string();
    }

    if available.default_language_code != "auto" {
        return available.default_language_code.clone();
    }

    if let Some(locale) = locale.map(str::to_lowercase) {
        if offered(&locale) {
            return locale;
        }
        if let Some(primary) = locale.split('-').next().filter(|p| offered(p)) {
            return primary.to_string();
        }
    }

    FALLBACK_LANGUAGE.to_string()
}
