//! Currency parsing and arithmetic in integer cents.
//!
//! Menu prices arrive as display strings (`"$3.49"`, `"+$0.60"`,
//! `"Large • $4.09"`).  All arithmetic happens on `i64` cents so that
//! `base + delta` never accumulates float error.

use once_cell::sync::Lazy;
use regex::Regex;

/// `+$0.60`, `+ $1`, `+$.50`, `-$0.70`; a spaced dash is a separator.
static DELTA_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\+\s*|[\-\u{2212}])\$\s*(\d*(?:\.\d{1,2})?)").expect("valid delta regex")
});

/// First `$X.YY` amount in a string.
static AMOUNT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\s*(\d[\d,]*(?:\.\d{1,2})?|\.\d{1,2})").expect("valid amount regex")
});

/// Parse a plain number like `3.49`, `3.5`, `3` or `.5` into cents.
fn number_to_cents(raw: &str) -> Option<i64> {
    let raw = raw.replace(',', "");
    if raw.is_empty() {
        return None;
    }
    let (whole, frac) = match raw.split_once('.') {
        Some((w, f)) => (w, f),
        None => (raw.as_str(), ""),
    };
    if frac.len() > 2 || !whole.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    if !frac.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let whole: i64 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let frac: i64 = match frac.len() {
        0 => 0,
        1 => frac.parse::<i64>().ok()? * 10,
        _ => frac.parse().ok()?,
    };
    whole.checked_mul(100)?.checked_add(frac)
}

/// Parse the first currency amount in `text` (e.g. `"$3.49"`) into cents.
///
/// A leading `+` is ignored here; use [`parse_delta`] to tell the two apart.
pub fn parse_price(text: &str) -> Option<i64> {
    let caps = AMOUNT.captures(text)?;
    number_to_cents(caps.get(1)?.as_str())
}

/// Parse an explicit `+$X` or `-$X` delta token out of an option label.
pub fn parse_delta(label: &str) -> Option<i64> {
    let caps = DELTA_TOKEN.captures(label)?;
    let cents = number_to_cents(caps.get(2)?.as_str())?;
    Some(if caps[1].starts_with('+') { cents } else { -cents })
}

/// Parse a full (non-delta) price embedded in an option label.
///
/// Returns `None` when the only amount in the label is a signed delta.
pub fn parse_embedded_price(label: &str) -> Option<i64> {
    for caps in AMOUNT.captures_iter(label) {
        let whole = caps.get(0)?;
        let prefix = &label[..whole.start()];
        if prefix.trim_end().ends_with('+') || prefix.ends_with(['-', '\u{2212}']) {
            continue;
        }
        if let Some(cents) = number_to_cents(caps.get(1)?.as_str()) {
            return Some(cents);
        }
    }
    None
}

/// Format cents as `$X.YY`.
pub fn format_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.abs();
    format!("{}${}.{:02}", sign, abs / 100, abs % 100)
}

/// Loose price equality used when a spoken answer names a price.
pub fn same_price(a: &str, b: &str) -> bool {
    match (parse_price(a), parse_price(b)) {
        (Some(x), Some(y)) => x == y,
        _ => a.trim() == b.trim(),
    }
}
