use serde::Serialize;
use thiserror::Error;

use crate::wine::models::WineRecord;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SelectionError {
    #[error("Select at least one wine")]
    Empty,

    #[error("At most two wines can be combined, got {0}")]
    TooMany(usize),
}

/// One or two library wines folded into a single description.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MergedWineInfo {
    pub names: String,
    pub producers: String,
    pub countries: String,
    pub grape_varieties: String,
    pub notes: Option<String>,
    pub wine_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SelectionResponse {
    pub merged: MergedWineInfo,
    pub preview: String,
    pub summary: String,
}

pub fn combine(wines: &[&WineRecord]) -> Result<MergedWineInfo, SelectionError> {
    match wines {
        [] => Err(SelectionError::Empty),
        [wine] => Ok(MergedWineInfo {
            names: wine.name.trim().to_string(),
            producers: join_distinct([wine.producer.as_deref()], " / "),
            countries: join_distinct([wine.country.as_deref()], " & "),
            grape_varieties: join_distinct([wine.grape_variety.as_deref()], " + "),
            notes: wine.notes.clone(),
            wine_count: 1,
        }),
        [a, b] => Ok(MergedWineInfo {
            names: join_distinct([Some(a.name.as_str()), Some(b.name.as_str())], " & "),
            producers: join_distinct([a.producer.as_deref(), b.producer.as_deref()], " / "),
            countries: join_distinct([a.country.as_deref(), b.country.as_deref()], " & "),
            grape_varieties: join_distinct(
                [a.grape_variety.as_deref(), b.grape_variety.as_deref()],
                " + ",
            ),
            notes: labelled_notes(a, b),
            wine_count: 2,
        }),
        more => Err(SelectionError::TooMany(more.len())),
    }
}

/// Joins the non-blank values, skipping case-insensitive repeats.
fn join_distinct<'a>(values: impl IntoIterator<Item = Option<&'a str>>, sep: &str) -> String {
    let mut seen: Vec<String> = Vec::new();
    let mut kept: Vec<&str> = Vec::new();
    for value in values.into_iter().flatten().map(str::trim) {
        if value.is_empty() {
            continue;
        }
        let folded = value.to_lowercase();
        if !seen.contains(&folded) {
            seen.push(folded);
            kept.push(value);
        }
    }
    kept.join(sep)
}

fn labelled_notes(a: &WineRecord, b: &WineRecord) -> Option<String> {
    let label = |w: &WineRecord| {
        w.notes
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .map(|n| format!("【{}】{}", w.name, n))
    };
    match (label(a), label(b)) {
        (Some(x), Some(y)) => Some(format!("{x}\n\n{y}")),
        (x, y) => x.or(y),
    }
}

/// Short description shown next to a selection.
pub fn preview(merged: &MergedWineInfo) -> String {
    let mut parts = Vec::new();
    if merged.wine_count == 1 {
        if !merged.producers.is_empty() {
            parts.push(format!("Producer: {}", merged.producers));
        }
        if !merged.countries.is_empty() {
            parts.push(format!("Country: {}", merged.countries));
        }
        if !merged.grape_varieties.is_empty() {
            parts.push(format!("Grape: {}", merged.grape_varieties));
        }
        if parts.is_empty() {
            return "Single wine selected".to_string();
        }
    } else {
        if !merged.countries.is_empty() {
            parts.push(format!("Countries: {}", merged.countries));
        }
        if !merged.grape_varieties.is_empty() {
            parts.push(format!("Grapes: {}", merged.grape_varieties));
        }
        if parts.is_empty() {
            return "Two wines selected".to_string();
        }
    }
    parts.join(" • ")
}

pub fn summary(merged: &MergedWineInfo) -> String {
    let glasses = "🍷".repeat(merged.wine_count.clamp(1, 2));
    format!("{glasses} {}", merged.names)
}
