use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::wine::models::{RecordSource, WineRecord};
use crate::wine::script::IdentityKey;

#[derive(Debug, Error, PartialEq)]
pub enum LibraryError {
    #[error("Wine record {0} not found")]
    NotFound(Uuid),

    #[error("Another record already uses the name/producer '{key}'")]
    KeyConflict { existing: Uuid, key: String },

    #[error("Wine name must not be empty")]
    EmptyName,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    Name,
    Producer,
    Country,
    SourceFile,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListQuery {
    pub q: Option<String>,
    pub source: Option<RecordSource>,
    pub sort: Option<SortKey>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Added(Uuid),
    Replaced(Uuid),
}

/// A session's wine records, in insertion order.
///
/// No two records have matching identity keys once a method returns.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WineLibrary {
    records: Vec<WineRecord>,
    /// `IdentityKey::of` each record, index for index.
    #[serde(skip)]
    keys: Vec<IdentityKey>,
}

impl WineLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[WineRecord] {
        &self.records
    }

    /// Identity keys parallel to [`records`](Self::records).
    pub fn keys(&self) -> &[IdentityKey] {
        &self.keys
    }

    pub fn get(&self, id: Uuid) -> Option<&WineRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    fn position(&self, id: Uuid) -> Option<usize> {
        self.records.iter().position(|r| r.id == id)
    }

    /// Index of the record matching `key`. A record with the same producer
    /// wins over one matched through a missing producer; otherwise the
    /// earliest match is returned.
    pub fn find_match(&self, key: &IdentityKey) -> Option<usize> {
        let mut fallback = None;
        for (idx, existing) in self.keys.iter().enumerate() {
            if !existing.matches(key) {
                continue;
            }
            if existing.producer.is_some() && existing.producer == key.producer {
                return Some(idx);
            }
            fallback.get_or_insert(idx);
        }
        fallback
    }

    /// Appends without a key check. Callers establish there is no match.
    pub(crate) fn push(&mut self, record: WineRecord) -> Uuid {
        let id = record.id;
        self.keys.push(IdentityKey::of(&record));
        self.records.push(record);
        id
    }

    fn replace_at(&mut self, idx: usize, record: WineRecord) {
        self.keys[idx] = IdentityKey::of(&record);
        self.records[idx] = record;
    }

    fn remove_at(&mut self, idx: usize) -> WineRecord {
        self.keys.remove(idx);
        self.records.remove(idx)
    }

    /// Merges `incoming` into the record at `idx`, then folds in any other
    /// record the merged key now collides with.
    pub(crate) fn merge_at(&mut self, idx: usize, incoming: &WineRecord) -> Uuid {
        self.records[idx].merge_from(incoming);
        self.keys[idx] = IdentityKey::of(&self.records[idx]);
        self.settle(idx)
    }

    pub fn merge_into(&mut self, id: Uuid, incoming: &WineRecord) -> Result<Uuid, LibraryError> {
        let idx = self.position(id).ok_or(LibraryError::NotFound(id))?;
        Ok(self.merge_at(idx, incoming))
    }

    fn settle(&mut self, idx: usize) -> Uuid {
        let id = self.records[idx].id;
        loop {
            let Some(idx) = self.position(id) else {
                return id;
            };
            let key = &self.keys[idx];
            let other = self
                .keys
                .iter()
                .enumerate()
                .position(|(i, k)| i != idx && k.matches(key));
            let Some(other) = other else {
                return id;
            };
            let absorbed = self.remove_at(other);
            if let Some(idx) = self.position(id) {
                self.records[idx].merge_from(&absorbed);
                self.keys[idx] = IdentityKey::of(&self.records[idx]);
            }
        }
    }

    /// Replace-or-append by identity key.
    ///
    /// A replaced record keeps its id, and its producer when the committed
    /// record leaves the producer blank, so its key does not widen.
    pub fn commit(&mut self, mut record: WineRecord) -> Result<CommitOutcome, LibraryError> {
        if !record.has_name() {
            return Err(LibraryError::EmptyName);
        }
        record.name = record.name.trim().to_string();
        match self.find_match(&IdentityKey::of(&record)) {
            Some(idx) => {
                let existing = &self.records[idx];
                record.id = existing.id;
                if record.producer.is_none() {
                    record.producer = existing.producer.clone();
                }
                for file in &existing.source_files {
                    if !record.source_files.contains(file) {
                        record.source_files.push(file.clone());
                    }
                }
                self.replace_at(idx, record);
                Ok(CommitOutcome::Replaced(self.settle(idx)))
            }
            None => Ok(CommitOutcome::Added(self.push(record))),
        }
    }

    /// Replaces the record `id` with `record`, keeping the id and source.
    pub fn update(&mut self, id: Uuid, mut record: WineRecord) -> Result<&WineRecord, LibraryError> {
        let idx = self.position(id).ok_or(LibraryError::NotFound(id))?;
        if !record.has_name() {
            return Err(LibraryError::EmptyName);
        }
        record.name = record.name.trim().to_string();

        let key = IdentityKey::of(&record);
        let clash = self
            .keys
            .iter()
            .enumerate()
            .position(|(i, k)| i != idx && k.matches(&key));
        if let Some(other) = clash {
            return Err(LibraryError::KeyConflict {
                existing: self.records[other].id,
                key: key.to_string(),
            });
        }

        record.id = id;
        record.source = self.records[idx].source;
        self.replace_at(idx, record);
        Ok(&self.records[idx])
    }

    pub fn remove(&mut self, id: Uuid) -> Result<WineRecord, LibraryError> {
        let idx = self.position(id).ok_or(LibraryError::NotFound(id))?;
        Ok(self.remove_at(idx))
    }

    /// Drops every record and returns how many there were.
    pub fn clear(&mut self) -> usize {
        let count = self.records.len();
        self.records.clear();
        self.keys.clear();
        count
    }

    pub fn list(&self, query: &ListQuery) -> Vec<&WineRecord> {
        let needle = query
            .q
            .as_deref()
            .map(|q| q.trim().to_lowercase())
            .filter(|q| !q.is_empty());

        let mut matched: Vec<&WineRecord> = self
            .records
            .iter()
            .filter(|r| query.source.map_or(true, |s| r.source == s))
            .filter(|r| {
                needle
                    .as_deref()
                    .map_or(true, |n| r.searchable_text().contains(n))
            })
            .collect();

        if let Some(sort) = query.sort {
            // Records without the field sort last; ties keep insertion order.
            matched.sort_by_cached_key(|r| {
                let value = match sort {
                    SortKey::Name => Some(r.name.as_str()),
                    SortKey::Producer => r.producer.as_deref(),
                    SortKey::Country => r.country.as_deref(),
                    SortKey::SourceFile => r.source_files.first().map(String::as_str),
                };
                (value.is_none(), value.map(str::to_lowercase))
            });
        }
        matched
    }
}
