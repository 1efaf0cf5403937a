//! Whitespace and control-character cleanup

use once_cell::sync::Lazy;
use regex::Regex;

static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static regex"));

/// Invisible characters that survive extraction but carry no text
fn is_noise(c: char) -> bool {
    (c.is_control() && !c.is_whitespace())
        || matches!(c, '\u{FEFF}' | '\u{200B}' | '\u{200C}' | '\u{200D}')
}

/// Strip control noise, collapse whitespace runs to one space, trim
pub fn clean_text(text: &str) -> String {
    let stripped: String = text.chars().filter(|c| !is_noise(*c)).collect();
    WHITESPACE_RUN.replace_all(&stripped, " ").trim().to_string()
}
