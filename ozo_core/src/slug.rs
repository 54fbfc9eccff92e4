//! Turn upstream names into file system friendly path segments.

use std::sync::OnceLock;

use regex::Regex;
use unicode_normalization::UnicodeNormalization;

fn unwanted_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"[^\w\s-]").unwrap())
}

fn separator_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"[-\s]+").unwrap())
}

/// Reduce a name to lower-case ASCII words joined by underscores.
///
/// Diacritics are stripped, so `Hlavní třída` becomes `hlavni_trida`.
/// Changing this function moves every artifact and changes every event UID!
pub fn slugify(text: &str) -> String {
    let ascii: String = text.nfd().filter(char::is_ascii).collect();
    let cleaned = unwanted_regex().replace_all(&ascii, "");
    let cleaned = cleaned.trim().to_lowercase();
    separator_regex().replace_all(&cleaned, "_").into_owned()
}

/// Make a reference code usable as a file stem.
pub fn file_stem(reference: &str) -> String {
    reference.replace(['/', '\\'], "_")
}
