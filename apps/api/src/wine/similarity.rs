//! Fuzzy name similarity used to surface likely duplicates for manual review.
//!
//! Scores are kept in basis points so the threshold comparison is exact:
//! the same pair of names always lands on the same side of the threshold.

use std::sync::LazyLock;

use serde::{Serialize, Serializer};

use crate::wine::script::{contains_japanese, normalize_name};

const TRANSLITERATION_SCORE: f64 = 0.95;

/// Japanese wine and grape names with their common romanized spellings.
const TRANSLITERATIONS: &[(&str, &[&str])] = &[
    ("ボニトゥラ", &["bonitura"]),
    ("プティ・シャブリ", &["petit chablis"]),
    ("シャブリ", &["chablis"]),
    ("シャトー・マルゴー", &["chateau margaux"]),
    ("オーパス・ワン", &["opus one"]),
    ("クレマン・ド・ロワール", &["cremant de loire"]),
    ("モンテ・アラヤ", &["monte araya"]),
    ("トスカーナ・ロサート", &["toscana rosato"]),
    ("アルマ・デ・チリ", &["alma de chile"]),
    ("コート・ド・ガスコーニュ", &["cotes de gascogne"]),
    ("ラソン", &["razon"]),
    ("ピノ・グリージョ", &["pinot grigio", "pinot gris"]),
    ("ピノ・ノワール", &["pinot noir"]),
    ("カベルネ・ソーヴィニヨン", &["cabernet sauvignon"]),
    ("ソーヴィニヨン・ブラン", &["sauvignon blanc"]),
    ("テンプラニーリョ", &["tempranillo"]),
    ("シャルドネ", &["chardonnay"]),
    ("メルロー", &["merlot"]),
    ("リースリング", &["riesling"]),
    ("シラー", &["syrah", "shiraz"]),
];

static NORMALIZED_TRANSLITERATIONS: LazyLock<Vec<(String, &'static [&'static str])>> =
    LazyLock::new(|| {
        TRANSLITERATIONS
            .iter()
            .map(|(ja, latin)| (normalize_name(ja), *latin))
            .collect()
    });

/// Similarity between two names, in basis points of 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Similarity(u16);

impl Similarity {
    pub const ZERO: Similarity = Similarity(0);
    pub const MAX: Similarity = Similarity(10_000);

    /// Rounds a 0.0–1.0 ratio to the nearest basis point.
    pub fn from_ratio(ratio: f64) -> Self {
        if !ratio.is_finite() {
            return Self::ZERO;
        }
        Self::from_basis_points((ratio.clamp(0.0, 1.0) * 10_000.0).round() as u16)
    }

    pub const fn from_basis_points(bp: u16) -> Self {
        if bp > 10_000 {
            Self::MAX
        } else {
            Similarity(bp)
        }
    }

    pub fn basis_points(&self) -> u16 {
        self.0
    }

    pub fn as_ratio(&self) -> f64 {
        f64::from(self.0) / 10_000.0
    }
}

impl Serialize for Similarity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_ratio())
    }
}

/// Scores two names already passed through `normalize_name`. Takes the best
/// of edit distance, transliteration and word containment.
pub fn name_similarity(na: &str, nb: &str) -> Similarity {
    if na.is_empty() || nb.is_empty() {
        return Similarity::ZERO;
    }
    if na == nb {
        return Similarity::MAX;
    }

    let edit = strsim::normalized_levenshtein(na, nb);
    let best = edit
        .max(transliteration_score(na, nb))
        .max(containment_score(na, nb));
    Similarity::from_ratio(best)
}

fn transliteration_score(na: &str, nb: &str) -> f64 {
    let (ja, latin) = match (contains_japanese(na), contains_japanese(nb)) {
        (true, false) => (na, nb),
        (false, true) => (nb, na),
        _ => return 0.0,
    };
    let hit = NORMALIZED_TRANSLITERATIONS
        .iter()
        .any(|(ja_term, variants)| {
            ja.contains(ja_term.as_str()) && variants.iter().any(|v| latin.contains(v))
        });
    if hit {
        TRANSLITERATION_SCORE
    } else {
        0.0
    }
}

/// Handles "producer + wine" against "wine" style names.
fn containment_score(na: &str, nb: &str) -> f64 {
    let words = |s: &str| -> Vec<String> {
        let mut w: Vec<String> = s
            .split_whitespace()
            .filter(|w| w.chars().count() > 2)
            .map(str::to_string)
            .collect();
        w.sort();
        w.dedup();
        w
    };
    let wa = words(na);
    let wb = words(nb);
    if wa.is_empty() || wb.is_empty() {
        return 0.0;
    }

    let shared = wa.iter().filter(|w| wb.contains(w)).count();
    if shared == 0 {
        return 0.0;
    }
    let overlap = shared as f64 / wa.len().min(wb.len()) as f64;
    if overlap >= 0.8 {
        0.9
    } else if overlap >= 0.6 {
        0.8
    } else if overlap >= 0.4 {
        0.7
    } else {
        0.0
    }
}
