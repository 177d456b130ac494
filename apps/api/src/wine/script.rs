//! Script detection and name normalization.
//!
//! Japanese-script text is width-folded (NFKC) and kept as written apart from
//! separators. Everything else is decomposed (NFKD), stripped of combining
//! marks, lower-cased and stripped of punctuation, so `Château` and `chateau`
//! compare equal.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::wine::models::WineRecord;

static TRAILING_VINTAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s+(?:nv|n\.v\.?|(?:19|20)\d{2})$").expect("valid vintage regex")
});

/// Characters treated as word separators inside names.
const SEPARATORS: &[char] = &['・', '･', '=', '＝', '/', '／', '-', '‐', '–', '—', '_'];

/// Bracket and quote characters dropped from Japanese names.
const BRACKETS: &[char] = &[
    '(', ')', '（', '）', '[', ']', '【', '】', '「', '」', '『', '』', '"', '\'', '“', '”', '‘', '’',
];

/// True when the text contains kana or CJK ideographs.
///
/// Full-width ASCII and CJK punctuation are not counted, so `ＡＢＣ` or an
/// ideographic space inside a romanized name does not make it "Japanese".
pub fn contains_japanese(text: &str) -> bool {
    text.chars().any(is_japanese_char)
}

fn is_japanese_char(c: char) -> bool {
    matches!(c as u32,
        0x3040..=0x309F   // hiragana
        | 0x30A0..=0x30FF // katakana
        | 0x31F0..=0x31FF // katakana phonetic extensions
        | 0x3400..=0x4DBF // CJK extension A
        | 0x4E00..=0x9FFF // CJK unified ideographs
        | 0xFF66..=0xFF9F // half-width katakana
    )
}

/// Normalizes a wine or producer name for identity comparison.
pub fn normalize_name(raw: &str) -> String {
    let folded: String = raw.trim().nfkc().collect();

    let mut normalized = if contains_japanese(&folded) {
        let spaced: String = folded
            .chars()
            .filter(|c| !BRACKETS.contains(c))
            .map(|c| if SEPARATORS.contains(&c) { ' ' } else { c })
            .collect();
        collapse_whitespace(&spaced.to_lowercase())
    } else {
        let stripped: String = folded
            .nfkd()
            .filter(|c| !is_combining_mark(*c))
            .map(|c| if c.is_alphanumeric() || c == '.' { c } else { ' ' })
            .collect();
        collapse_whitespace(&stripped.to_lowercase())
    };

    normalized = TRAILING_VINTAGE.replace(&normalized, "").into_owned();
    if !contains_japanese(&normalized) {
        normalized = normalized.replace('.', " ");
    }
    collapse_whitespace(&normalized)
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalized `(name, producer)` pair used for exact-match deduplication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityKey {
    pub name: String,
    pub producer: Option<String>,
}

impl IdentityKey {
    pub fn of(record: &WineRecord) -> Self {
        let producer = record
            .producer
            .as_deref()
            .map(normalize_name)
            .filter(|p| !p.is_empty());
        Self {
            name: normalize_name(&record.name),
            producer,
        }
    }

    /// Names are equal and the producers agree, an absent producer agreeing
    /// with any other.
    pub fn matches(&self, other: &IdentityKey) -> bool {
        if self.name.is_empty() || self.name != other.name {
            return false;
        }
        match (&self.producer, &other.producer) {
            (Some(a), Some(b)) => a == b,
            _ => true,
        }
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.producer {
            Some(producer) => write!(f, "{}|{}", self.name, producer),
            None => write!(f, "{}", self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wine::models::RecordSource;

    #[test]
    fn test_contains_japanese() {
        assert!(contains_japanese("シャトー・マルゴー"));
        assert!(contains_japanese("白ワイン"));
        assert!(contains_japanese("ぶどう"));
        assert!(!contains_japanese("Château Margaux"));
        assert!(!contains_japanese("ＡＢＣ　１２３"));
        assert!(!contains_japanese(""));
    }

    #[test]
    fn test_normalize_strips_diacritics_and_case() {
        assert_eq!(normalize_name("Château  Margaux"), "chateau margaux");
        assert_eq!(normalize_name("CHATEAU MARGAUX"), "chateau margaux");
        assert_eq!(normalize_name("Côtes-du-Rhône"), "cotes du rhone");
    }

    #[test]
    fn test_normalize_drops_trailing_vintage() {
        assert_eq!(normalize_name("Opus One 2018"), "opus one");
        assert_eq!(normalize_name("Bonitura NV"), "bonitura");
        assert_eq!(normalize_name("ボニトゥラ NV"), "ボニトゥラ");
    }

    #[test]
    fn test_normalize_japanese_keeps_voicing_marks() {
        // NFKD would split ゴ into コ + U+3099; Japanese names must not lose it.
        assert_eq!(normalize_name("シャトー・マルゴー"), "シャトー マルゴー");
        assert_ne!(normalize_name("マルゴー"), normalize_name("マルコー"));
    }

    #[test]
    fn test_normalize_keeps_colour_words() {
        assert_eq!(normalize_name("ドメーヌ・ルロワ 赤"), "ドメーヌ ルロワ 赤");
        assert_ne!(
            normalize_name("ドメーヌ・ルロワ 赤"),
            normalize_name("ドメーヌ・ルロワ 白")
        );
    }

    #[test]
    fn test_normalize_folds_width() {
        assert_eq!(normalize_name("ｼｬﾄｰ･ﾏﾙｺﾞｰ"), normalize_name("シャトー・マルゴー"));
        assert_eq!(normalize_name("（シャトー・マルゴー）"), "シャトー マルゴー");
    }

    #[test]
    fn test_identity_key_blank_producer_matches_any() {
        let mut a = WineRecord::new("シャトー・マルゴー", RecordSource::PdfImport);
        a.producer = Some("Château Margaux".to_string());
        let mut b = WineRecord::new("シャトー・マルゴー", RecordSource::PdfImport);
        b.producer = Some("  ".to_string());

        let ka = IdentityKey::of(&a);
        let kb = IdentityKey::of(&b);
        assert_eq!(kb.producer, None);
        assert!(ka.matches(&kb));
        assert!(kb.matches(&ka));
    }

    #[test]
    fn test_identity_key_different_producers_do_not_match() {
        let mut a = WineRecord::new("Chablis", RecordSource::PdfImport);
        a.producer = Some("Domaine Laroche".to_string());
        let mut b = WineRecord::new("Chablis", RecordSource::PdfImport);
        b.producer = Some("William Fèvre".to_string());
        assert!(!IdentityKey::of(&a).matches(&IdentityKey::of(&b)));
    }

    #[test]
    fn test_identity_key_display() {
        let mut a = WineRecord::new("Opus One", RecordSource::Manual);
        assert_eq!(IdentityKey::of(&a).to_string(), "opus one");
        a.producer = Some("Opus One Winery".to_string());
        assert_eq!(IdentityKey::of(&a).to_string(), "opus one|opus one winery");
    }
}
