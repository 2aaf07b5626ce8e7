use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

/// A message split into its `@mention` tokens and the remaining text.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParsedMessage {
    /// Lower-cased tokens without the `@`.
    pub mentions: BTreeSet<String>,
    pub cleaned: String,
}

static MENTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@(\w+)").expect("valid mention regex"));
static STRIP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@\w+\s*").expect("valid mention strip regex"));

/// Extract `@word` mentions. Unknown tokens are kept; the router ignores them.
pub fn parse_mentions(message: &str) -> ParsedMessage {
    let mentions = MENTION_RE
        .captures_iter(message)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().to_lowercase())
        .collect();
    let cleaned = STRIP_RE.replace_all(message, "").trim().to_string();
    ParsedMessage { mentions, cleaned }
}
