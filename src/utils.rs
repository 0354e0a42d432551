/// Truncate a string to at most `max_bytes` bytes without splitting a multi-byte
/// character. Returns the original string if it already fits.
pub fn safe_truncate(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Single-line log preview of user speech or oracle payloads.
pub fn preview(s: &str, max_bytes: usize) -> String {
    let flat = s.split_whitespace().collect::<Vec<_>>().join(" ");
    let cut = safe_truncate(&flat, max_bytes);
    if cut.len() < flat.len() {
        format!("{}…", cut)
    } else {
        flat
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_within_limit() {
        assert_eq!(safe_truncate("big mac", 10), "big mac");
    }

    #[test]
    fn ascii_truncated() {
        assert_eq!(safe_truncate("two big macs", 7), "two big");
    }

    #[test]
    fn multibyte_no_split() {
        // "Café™" ends in a 3-byte glyph; cutting inside it backs up.
        assert_eq!(safe_truncate("Café™", 6), "Café");
    }

    #[test]
    fn zero_max() {
        assert_eq!(safe_truncate("fries", 0), "");
    }

    #[test]
    fn preview_flattens_and_marks_cut() {
        assert_eq!(preview("two  big\nmacs", 100), "two big macs");
        assert_eq!(preview("two big macs and fries", 7), "two big…");
    }
}
