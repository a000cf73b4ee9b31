//! Surface normalization for Hebrew/English clinical text.
//!
//! Two forms are used for matching:
//! - the *normalized* form: bidi marks and BOM stripped, final letters mapped to
//!   their base form, whitespace collapsed, Latin lowercased;
//! - the *compact* form: the normalized form with spaces, hyphens, geresh and
//!   gershayim removed, so "מולטי-יוניט" and "מולטיוניט" compare equal.

/// Characters dropped from the compact form.
const COMPACT_STRIP: [char; 4] = [' ', '-', '\u{05F4}', '\u{05F3}'];

fn is_invisible(ch: char) -> bool {
    matches!(ch, '\u{200F}' | '\u{200E}' | '\u{FEFF}')
}

fn base_letter(ch: char) -> char {
    match ch {
        'ך' => 'כ',
        'ם' => 'מ',
        'ן' => 'נ',
        'ף' => 'פ',
        'ץ' => 'צ',
        other => other,
    }
}

pub fn normalize_surface(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;
    for ch in text.chars().filter(|c| !is_invisible(*c)) {
        if ch.is_whitespace() {
            pending_space = !out.is_empty();
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        for lower in base_letter(ch).to_lowercase() {
            out.push(lower);
        }
    }
    out
}

pub fn compact(normalized: &str) -> String {
    normalized.chars().filter(|c| !COMPACT_STRIP.contains(c)).collect()
}

pub fn is_hebrew_char(ch: char) -> bool {
    ('\u{0590}'..='\u{05FF}').contains(&ch)
}

pub fn has_hebrew(text: &str) -> bool {
    text.chars().any(is_hebrew_char)
}

/// Strip leading/trailing characters that are not letters, e.g. `שלת14` → `שלת`.
pub fn letter_core(text: &str) -> &str {
    text.trim_matches(|c: char| !c.is_alphabetic())
}

pub fn char_len(text: &str) -> usize {
    text.chars().count()
}
