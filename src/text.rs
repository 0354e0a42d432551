//! Name normalization shared by menu matching and on-page item lookup.
//!
//! Spoken or parsed item names rarely carry the glyphs a menu renders
//! (`McFlurry®`, `Café Mocha`, `Whopper™`), so every comparison goes
//! through the same folding: drop trademark marks, strip accents,
//! lowercase, collapse punctuation.

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

/// Trademark-style glyphs removed before any comparison.
const MARKS: &[char] = &['™', '®', '©', '℠'];

/// Size descriptors that never identify an item on their own.
pub const SIZE_WORDS: &[&str] = &[
    "small", "medium", "large", "regular", "jumbo", "kid", "junior", "xl",
];

/// Filler words ignored when deciding what a request names.
pub const STOP_WORDS: &[&str] = &[
    "a", "an", "the", "some", "of", "please", "one", "ones", "just", "that", "this", "it",
    "order", "i", "want", "me", "my", "too", "also", "like", "size", "sized", "thing",
];

/// Remove trademark / registered / copyright glyphs.
pub fn strip_marks(s: &str) -> String {
    s.chars().filter(|c| !MARKS.contains(c)).collect()
}

/// Decompose and drop combining marks (`é` → `e`).
pub fn fold_accents(s: &str) -> String {
    s.nfkd().filter(|c| !is_combining_mark(*c)).collect()
}

/// Collapse runs of whitespace to single spaces and trim.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Fully folded comparison key: marks stripped, accents folded,
/// lowercase, punctuation turned into spaces.
pub fn normalize(s: &str) -> String {
    let folded = fold_accents(&strip_marks(s)).to_lowercase();
    let spaced: String = folded
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    collapse_whitespace(&spaced)
}

/// Crude plural folding applied to both sides of a comparison.
pub fn singularize(word: &str) -> String {
    match word {
        "pc" | "pcs" | "pieces" => "piece".to_string(),
        "kids" => "kid".to_string(),
        w if is_stop_word(w) || is_size_word(w) => w.to_string(),
        w if w.len() > 3 && w.ends_with('s') && !w.ends_with("ss") => w[..w.len() - 1].to_string(),
        w => w.to_string(),
    }
}

/// Normalized, singularized tokens.
pub fn tokens(s: &str) -> Vec<String> {
    normalize(s).split(' ').filter(|t| !t.is_empty()).map(singularize).collect()
}

pub fn is_size_word(token: &str) -> bool {
    SIZE_WORDS.contains(&token)
}

pub fn is_stop_word(token: &str) -> bool {
    STOP_WORDS.contains(&token)
}

/// Tokens that actually name a thing: no filler, no sizes.
pub fn core_tokens(s: &str) -> Vec<String> {
    tokens(s)
        .into_iter()
        .filter(|t| !is_stop_word(t) && !is_size_word(t))
        .collect()
}

/// Size words mentioned in `s`, in order.
pub fn size_tokens(s: &str) -> Vec<String> {
    tokens(s).into_iter().filter(|t| is_size_word(t)).collect()
}

/// Progressive lookup variants of an on-page title, from strictest to
/// loosest: as written, marks stripped, fully folded.
pub fn title_variants(s: &str) -> [String; 3] {
    let trimmed = collapse_whitespace(s);
    let unmarked = collapse_whitespace(&strip_marks(&trimmed));
    [trimmed, unmarked, normalize(s)]
}

static WITHDRAWAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:forget|skip|remove|cancel|drop|never\s*mind)\b(?:\s+(?:about|the|a|an|my|on))*\s+([^,;.!?]+)",
    )
    .unwrap()
});

/// Core token lists the customer took back ("forget the pizza").
pub fn withdrawals(utterance: &str) -> Vec<Vec<String>> {
    WITHDRAWAL
        .captures_iter(utterance)
        .filter_map(|caps| {
            let toks = core_tokens(caps.get(1)?.as_str());
            (!toks.is_empty()).then_some(toks)
        })
        .collect()
}

/// True when one of `withdrawn` names every core token of `requested`.
pub fn is_withdrawn(requested: &str, withdrawn: &[Vec<String>]) -> bool {
    let core = core_tokens(requested);
    !core.is_empty()
        && withdrawn
            .iter()
            .any(|w| core.iter().all(|t| w.contains(t)))
}

/// Capitalize the first letter (`"large"` → `"Large"`).
pub fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
