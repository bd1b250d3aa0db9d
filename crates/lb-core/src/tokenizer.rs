use regex::Regex;
use std::sync::LazyLock;

static WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\w+").unwrap());
static SYMBOL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\w\s]").unwrap());

/// Rough LLM token estimate for cached block counts.
///
/// Words cost one token per four characters (minimum one), each
/// punctuation or symbol character costs one. Never authoritative; the
/// store refreshes it on every content change.
pub fn estimate_tokens(text: &str) -> usize {
    let words: usize = WORD
        .find_iter(text)
        .map(|m| m.as_str().chars().count().div_ceil(4).max(1))
        .sum();
    let symbols = SYMBOL.find_iter(text).count();
    words + symbols
}
