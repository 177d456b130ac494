use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::wine::script::contains_japanese;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RecordSource {
    PdfImport,
    Manual,
}

/// A single wine entry, either parsed out of a PDF wine list or entered by hand.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WineRecord {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub producer: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub grape_variety: Option<String>,
    #[serde(default)]
    pub vintage: Option<u16>,
    #[serde(default)]
    pub price: Option<f64>,
    /// As printed, e.g. `13.5%`.
    #[serde(default)]
    pub alcohol_content: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    pub source: RecordSource,
    #[serde(default)]
    pub source_files: Vec<String>,
}

impl WineRecord {
    pub fn new(name: impl Into<String>, source: RecordSource) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            producer: None,
            region: None,
            country: None,
            grape_variety: None,
            vintage: None,
            price: None,
            alcohol_content: None,
            notes: None,
            source,
            source_files: Vec::new(),
        }
    }

    /// True when the name still has content after trimming.
    pub fn has_name(&self) -> bool {
        !self.name.trim().is_empty()
    }

    /// Appends a line of text to the notes, skipping exact repeats.
    pub fn push_note(&mut self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        match &mut self.notes {
            Some(notes) if notes.split(" | ").any(|n| n == text) => {}
            Some(notes) => {
                notes.push_str(" | ");
                notes.push_str(text);
            }
            None => self.notes = Some(text.to_string()),
        }
    }

    /// Merges `other` into `self`.
    ///
    /// Blank fields are filled from `other`. When both sides carry a value the
    /// existing one is kept, unless only the incoming value is written in
    /// Japanese script. A non-empty field is never replaced with an empty one.
    pub fn merge_from(&mut self, other: &WineRecord) {
        if other.has_name() && !contains_japanese(&self.name) && contains_japanese(&other.name) {
            self.name = other.name.trim().to_string();
        }

        merge_text(&mut self.producer, &other.producer);
        merge_text(&mut self.region, &other.region);
        merge_text(&mut self.country, &other.country);
        merge_text(&mut self.grape_variety, &other.grape_variety);
        merge_text(&mut self.alcohol_content, &other.alcohol_content);

        if self.vintage.is_none() {
            self.vintage = other.vintage;
        }
        if self.price.is_none() {
            self.price = other.price;
        }
        if let Some(notes) = &other.notes {
            for note in notes.split(" | ") {
                self.push_note(note);
            }
        }
        for file in &other.source_files {
            if !self.source_files.contains(file) {
                self.source_files.push(file.clone());
            }
        }
    }

    /// Lower-cased text used by library search.
    pub fn searchable_text(&self) -> String {
        [
            Some(self.name.as_str()),
            self.producer.as_deref(),
            self.region.as_deref(),
            self.country.as_deref(),
            self.grape_variety.as_deref(),
            self.notes.as_deref(),
        ]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
    }
}

fn merge_text(existing: &mut Option<String>, incoming: &Option<String>) {
    let incoming = match incoming.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => v,
        _ => return,
    };
    match existing.as_deref().map(str::trim) {
        Some(current) if !current.is_empty() => {
            if !contains_japanese(current) && contains_japanese(incoming) {
                *existing = Some(incoming.to_string());
            }
        }
        _ => *existing = Some(incoming.to_string()),
    }
}

/// Blank strings coming from clients or the parser are stored as `None`.
pub fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
