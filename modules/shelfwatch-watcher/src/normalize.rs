//! Title normalization: raw catalog cell text to canonical identity string.
//!
//! Catalog cells arrive as `1.敗北者たち Vol.3（首刷限定版）` style strings:
//! an enumeration prefix, the work title, and bracketed edition/printing
//! annotations in whatever bracket style that page happened to use. The
//! canonical form drops the prefix and annotations and collapses whitespace,
//! so the same work dedups across pages and runs.

use std::sync::LazyLock;

use regex::Regex;

/// Leading enumeration runs: digits (ASCII or fullwidth), dots, ideographic
/// commas, closing parens/brackets and whitespace.
static ENUM_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9０-９.．、)）\]】>〉\s]+").unwrap());

/// One innermost bracketed annotation per style. Applied to a fixed point so
/// nested brackets unwrap layer by layer.
static BRACKETED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\([^()]*\)|（[^（）]*）|\[[^\[\]]*\]|【[^【】]*】|〈[^〈〉]*〉").unwrap()
});

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Canonicalize a raw title. Idempotent, deterministic, and never turns a
/// non-empty input into an empty output.
///
/// Stripping runs to a fixed point, which is what makes the function
/// idempotent for inputs like `1.2.Foo` where removing one prefix exposes
/// another. If stripping would erase the whole string (a title that is
/// nothing but a bracketed annotation), the whitespace-normalized original is
/// returned instead: different catalog entries mix bracket conventions, and
/// over-aggressive stripping would merge distinct works into one key.
pub fn normalize(raw: &str) -> String {
    let mut current = collapse_whitespace(raw);
    loop {
        let next = strip_once(&current);
        if next == current {
            break;
        }
        current = next;
    }

    if current.is_empty() {
        let fallback = collapse_whitespace(raw);
        if fallback.is_empty() {
            return raw.to_string();
        }
        return fallback;
    }
    current
}

fn strip_once(s: &str) -> String {
    let without_prefix = ENUM_PREFIX.replace(s, "");
    let without_brackets = BRACKETED.replace_all(&without_prefix, " ");
    collapse_whitespace(&without_brackets)
}

fn collapse_whitespace(s: &str) -> String {
    WHITESPACE.replace_all(s.trim(), " ").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_enumeration_prefix() {
        assert_eq!(normalize("1.Foo Vol.1"), "Foo Vol.1");
        assert_eq!(normalize("2.Bar Vol.2"), "Bar Vol.2");
        assert_eq!(normalize("１２、敗北者たち 3"), "敗北者たち 3");
    }

    #[test]
    fn strips_stacked_prefixes() {
        assert_eq!(normalize("1.2.Foo"), "Foo");
    }

    #[test]
    fn strips_bracketed_annotations_in_mixed_styles() {
        assert_eq!(normalize("Foo Vol.3（首刷限定版）"), "Foo Vol.3");
        assert_eq!(normalize("Foo Vol.3【完】"), "Foo Vol.3");
        assert_eq!(normalize("Foo (limited) Vol.3 [reprint]"), "Foo Vol.3");
        assert_eq!(normalize("Foo（外（内）側）Vol.1"), "Foo Vol.1");
    }

    #[test]
    fn collapses_internal_whitespace() {
        assert_eq!(normalize("  Foo   Bar \t Vol.1  "), "Foo Bar Vol.1");
    }

    #[test]
    fn bracket_only_title_falls_back_to_trimmed_original() {
        assert_eq!(normalize("【全】"), "【全】");
        assert_eq!(normalize("  （特装版）  "), "（特装版）");
    }

    #[test]
    fn never_empties_non_empty_input() {
        for raw in ["【全】", "（a）", "1.", "  x  ", "。", "---"] {
            let canonical = normalize(raw);
            assert!(!canonical.is_empty(), "emptied {raw:?}");
        }
    }

    #[test]
    fn idempotent_on_assorted_inputs() {
        let samples = [
            "1.Foo Vol.1",
            "1.2.Foo",
            "敗北者たち（全）",
            "【全】",
            "  Foo   Bar ",
            "３．怪獣図鑑 Vol.10（新装版）",
            "plain title",
            "",
        ];
        for raw in samples {
            let once = normalize(raw);
            assert_eq!(normalize(&once), once, "not idempotent for {raw:?}");
        }
    }
}
