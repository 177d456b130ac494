//! Folding candidate records into a session library.
//!
//! Exact identity-key matches merge immediately. Near matches are never
//! merged automatically: they become [`MergeSuggestion`]s the user resolves.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::wine::library::{LibraryError, WineLibrary};
use crate::wine::models::WineRecord;
use crate::wine::script::IdentityKey;
use crate::wine::similarity::{name_similarity, Similarity};

/// A candidate that resembles an existing record closely enough to ask.
#[derive(Debug, Clone, Serialize)]
pub struct MergeSuggestion {
    pub id: Uuid,
    pub candidate: WineRecord,
    pub target_id: Uuid,
    pub target_name: String,
    pub score: Similarity,
    pub created_at: DateTime<Utc>,
}

/// Counts for one import. `dropped_fields` is filled by the parser stage.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct ImportReport {
    pub added: usize,
    pub merged: usize,
    pub skipped: usize,
    pub flagged: usize,
    pub dropped_fields: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Added(Uuid),
    Merged(Uuid),
    Flagged(Uuid),
    Skipped,
}

#[derive(Debug, Clone, Default)]
pub struct PendingSuggestions {
    items: Vec<MergeSuggestion>,
}

impl PendingSuggestions {
    pub fn list(&self) -> &[MergeSuggestion] {
        &self.items
    }

    /// Stores `suggestion`, dropping an older one for the same candidate key
    /// and target.
    fn upsert(&mut self, suggestion: MergeSuggestion) {
        let key = IdentityKey::of(&suggestion.candidate);
        self.items.retain(|s| {
            !(s.target_id == suggestion.target_id && IdentityKey::of(&s.candidate) == key)
        });
        self.items.push(suggestion);
    }

    fn take(&mut self, id: Uuid) -> Option<MergeSuggestion> {
        let idx = self.items.iter().position(|s| s.id == id)?;
        Some(self.items.remove(idx))
    }

    /// Drops suggestions whose target is no longer in `library`.
    pub fn prune(&mut self, library: &WineLibrary) {
        self.items.retain(|s| library.get(s.target_id).is_some());
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

/// Sequential fold of candidates into a library.
pub struct Deduplicator<'a> {
    library: &'a mut WineLibrary,
    pending: &'a mut PendingSuggestions,
    threshold: Similarity,
    report: ImportReport,
}

impl<'a> Deduplicator<'a> {
    pub fn new(
        library: &'a mut WineLibrary,
        pending: &'a mut PendingSuggestions,
        threshold: Similarity,
    ) -> Self {
        Self {
            library,
            pending,
            threshold,
            report: ImportReport::default(),
        }
    }

    pub fn offer(&mut self, candidate: WineRecord) -> Outcome {
        if !candidate.has_name() {
            self.report.skipped += 1;
            return Outcome::Skipped;
        }

        let key = IdentityKey::of(&candidate);
        if let Some(idx) = self.library.find_match(&key) {
            let id = self.library.merge_at(idx, &candidate);
            self.report.merged += 1;
            return Outcome::Merged(id);
        }

        if let Some((target, score)) = self.closest(&key) {
            if score >= self.threshold {
                let suggestion = MergeSuggestion {
                    id: Uuid::new_v4(),
                    target_id: target.id,
                    target_name: target.name.clone(),
                    candidate,
                    score,
                    created_at: Utc::now(),
                };
                let id = suggestion.id;
                tracing::debug!(
                    target_id = %suggestion.target_id,
                    score_bp = score.basis_points(),
                    "near match held for review"
                );
                self.pending.upsert(suggestion);
                self.report.flagged += 1;
                return Outcome::Flagged(id);
            }
        }

        let id = self.library.push(candidate);
        self.report.added += 1;
        Outcome::Added(id)
    }

    /// Best-scoring library record; the earliest wins ties.
    fn closest(&self, candidate: &IdentityKey) -> Option<(&WineRecord, Similarity)> {
        let mut best: Option<(&WineRecord, Similarity)> = None;
        for (record, key) in self.library.records().iter().zip(self.library.keys()) {
            let score = name_similarity(&candidate.name, &key.name);
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((record, score));
            }
        }
        best
    }

    pub fn finish(self) -> ImportReport {
        self.report
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Merge,
    KeepSeparate,
    Discard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "record_id", rename_all = "snake_case")]
pub enum Resolution {
    Merged(Uuid),
    Added(Uuid),
    Discarded,
}

/// Applies the user's decision on a pending suggestion.
///
/// `keep_separate` falls back to a merge when the candidate's key has come to
/// match a library record since the suggestion was made.
pub fn resolve(
    library: &mut WineLibrary,
    pending: &mut PendingSuggestions,
    suggestion_id: Uuid,
    decision: Decision,
) -> Result<Resolution, LibraryError> {
    let suggestion = pending
        .take(suggestion_id)
        .ok_or(LibraryError::NotFound(suggestion_id))?;

    let resolution = match decision {
        Decision::Discard => Resolution::Discarded,
        Decision::Merge => match library.merge_into(suggestion.target_id, &suggestion.candidate) {
            Ok(id) => Resolution::Merged(id),
            Err(e) => {
                pending.items.push(suggestion);
                return Err(e);
            }
        },
        Decision::KeepSeparate => {
            let key = IdentityKey::of(&suggestion.candidate);
            match library.find_match(&key) {
                Some(idx) => Resolution::Merged(library.merge_at(idx, &suggestion.candidate)),
                None => Resolution::Added(library.push(suggestion.candidate)),
            }
        }
    };
    pending.prune(library);
    Ok(resolution)
}
