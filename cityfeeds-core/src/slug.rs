//! Feed-key slugification.

use std::sync::OnceLock;

use regex::Regex;

fn non_word() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^\w-]").expect("static regex"))
}

/// Replace every character that is neither a word character nor `-` with `-`.
///
/// Word characters are Unicode-aware, so `"Zürich Nord"` becomes `"Zürich-Nord"`.
pub fn slugify(s: &str) -> String {
    non_word().replace_all(s, "-").into_owned()
}
