//! Editable intermediate representation
//!
//! A [`Document`] holds every archive entry in original order with its raw
//! bytes (base64 in JSON) and metadata. XML entries that contain text runs
//! also carry an [`Editable`] view: the runs, their concatenated text and the
//! placeholders found in it. Pending replacements live in [`EditSet`].
//!
//! ```text
//! {
//!   "entries": {
//!     "word/document.xml": {
//!       "content": "PD94bWwg...",
//!       "metadata": { "timestamp": [2024, 5, 1, 9, 30, 0], "compression_method": 8, "external_attributes": 0, "host_system": 3 },
//!       "editable": { "runs": [...], "all_text": "...", "placeholders": [...] }
//!     }
//!   },
//!   "edits": { "word/document.xml": { "{Name}": "World" } }
//! }
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::container::{ArchiveEntry, EntryMetadata};
use crate::placeholder::{run_by_id, Placeholder, RunSlice};
use crate::runs::Run;
use crate::splice::Replacements;

/// The whole container in editable form
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Entries in archive order
    #[serde(with = "ordered_entries")]
    pub entries: Vec<DocumentEntry>,
    /// Replacements to apply on reconstruction
    #[serde(default, skip_serializing_if = "EditSet::is_empty")]
    pub edits: EditSet,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up an entry by name
    pub fn entry(&self, name: &str) -> Option<&DocumentEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Entries that have at least one run
    pub fn editable_entries(&self) -> impl Iterator<Item = &DocumentEntry> {
        self.entries.iter().filter(|e| e.editable.is_some())
    }

    /// Distinct placeholder tokens of an entry, in first-seen order
    pub fn tokens(&self, name: &str) -> Vec<&str> {
        let mut tokens: Vec<&str> = Vec::new();
        if let Some(editable) = self.entry(name).and_then(|e| e.editable.as_ref()) {
            for p in &editable.placeholders {
                if !tokens.contains(&p.placeholder.as_str()) {
                    tokens.push(&p.placeholder);
                }
            }
        }
        tokens
    }
}

/// One archive entry in the representation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentEntry {
    /// Entry name; stored as the map key in JSON
    #[serde(skip)]
    pub name: String,
    /// Raw entry bytes
    #[serde(with = "base64_bytes")]
    pub content: Vec<u8>,
    pub metadata: EntryMetadata,
    /// Present only for entries with text runs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub editable: Option<Editable>,
}

impl DocumentEntry {
    /// The entry as it would be written with no edits applied
    pub fn to_archive_entry(&self) -> ArchiveEntry {
        ArchiveEntry {
            name: self.name.clone(),
            data: self.content.clone(),
            metadata: self.metadata,
        }
    }
}

/// Editable view of one XML entry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Editable {
    pub runs: Vec<RunText>,
    pub all_text: String,
    pub placeholders: Vec<PlaceholderRecord>,
}

/// A run without its byte bookkeeping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunText {
    pub run_id: usize,
    pub text: String,
}

impl From<&Run> for RunText {
    fn from(run: &Run) -> Self {
        Self {
            run_id: run.run_id,
            text: run.text.clone(),
        }
    }
}

/// A placeholder as exposed to editors
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceholderRecord {
    /// Token text, e.g. `{Name}`
    pub placeholder: String,
    /// Contributing run slices
    pub runs: Vec<RunSlice>,
}

impl From<&Placeholder> for PlaceholderRecord {
    fn from(p: &Placeholder) -> Self {
        Self {
            placeholder: p.token.clone(),
            runs: p.runs.clone(),
        }
    }
}

impl PlaceholderRecord {
    /// Rebuild a [`Placeholder`] against freshly extracted runs
    ///
    /// The logical span is recomputed from `runs`; whether the slices still
    /// spell the token is left to [`Placeholder::matches_runs`].
    pub fn to_placeholder(&self, runs: &[Run]) -> Placeholder {
        let start = self
            .runs
            .first()
            .and_then(|first| {
                let preceding: usize = runs
                    .iter()
                    .take_while(|r| r.run_id != first.run_id)
                    .map(Run::char_len)
                    .sum();
                run_by_id(runs, first.run_id)
                    .map(|_| preceding.saturating_add(first.start_in_run))
            })
            .unwrap_or(0);
        let len = self
            .runs
            .iter()
            .map(RunSlice::len)
            .fold(0usize, usize::saturating_add);

        Placeholder {
            token: self.placeholder.clone(),
            logical_span: start..start.saturating_add(len),
            runs: self.runs.clone(),
        }
    }
}

/// Replacements keyed by entry name, then by token
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EditSet(BTreeMap<String, Replacements>);

impl EditSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage a replacement; returns the value it replaced, if any
    pub fn set(
        &mut self,
        entry: impl Into<String>,
        token: impl Into<String>,
        value: impl Into<String>,
    ) -> Option<String> {
        self.0
            .entry(entry.into())
            .or_default()
            .insert(token.into(), value.into())
    }

    /// Drop a staged replacement, removing the entry once it has none left
    pub fn clear(&mut self, entry: &str, token: &str) -> Option<String> {
        let replacements = self.0.get_mut(entry)?;
        let previous = replacements.remove(token);
        if replacements.is_empty() {
            self.0.remove(entry);
        }
        previous
    }

    /// Replacements for one entry
    pub fn for_entry(&self, entry: &str) -> Option<&Replacements> {
        self.0.get(entry)
    }

    /// Entry names that have replacements
    pub fn entries(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Replacements)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Total number of staged replacements
    pub fn len(&self) -> usize {
        self.0.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(BTreeMap::is_empty)
    }

    /// Fold `other` into this set; its values win
    pub fn merge(&mut self, other: EditSet) {
        for (entry, replacements) in other.0 {
            self.0.entry(entry).or_default().extend(replacements);
        }
    }
}

impl FromIterator<(String, String, String)> for EditSet {
    fn from_iter<I: IntoIterator<Item = (String, String, String)>>(iter: I) -> Self {
        let mut set = EditSet::new();
        for (entry, token, value) in iter {
            set.set(entry, token, value);
        }
        set
    }
}

/// Entries as a JSON object keyed by name, preserving archive order
mod ordered_entries {
    use std::fmt;

    use serde::de::{MapAccess, Visitor};
    use serde::ser::SerializeMap;
    use serde::{Deserializer, Serializer};

    use super::DocumentEntry;

    pub fn serialize<S: Serializer>(entries: &[DocumentEntry], s: S) -> Result<S::Ok, S::Error> {
        let mut map = s.serialize_map(Some(entries.len()))?;
        for entry in entries {
            map.serialize_entry(&entry.name, entry)?;
        }
        map.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<DocumentEntry>, D::Error> {
        d.deserialize_map(EntriesVisitor)
    }

    struct EntriesVisitor;

    impl<'de> Visitor<'de> for EntriesVisitor {
        type Value = Vec<DocumentEntry>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a map of entry name to entry")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
            let mut entries: Vec<DocumentEntry> = Vec::with_capacity(access.size_hint().unwrap_or(0));
            while let Some((name, mut entry)) = access.next_entry::<String, DocumentEntry>()? {
                if entries.iter().any(|e| e.name == name) {
                    return Err(serde::de::Error::custom(format!("duplicate entry: {name}")));
                }
                entry.name = name;
                entries.push(entry);
            }
            Ok(entries)
        }
    }
}

mod base64_bytes {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(d)?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
