//! JSON to DOCX decoder

use std::path::Path;

use anyhow::{Context, Result};
use log::{debug, info, warn};

use crate::container::ArchiveEntry;
use crate::document::{Document, DocumentEntry, EditSet};
use crate::error::{MappingInconsistency, SpliceError};
use crate::placeholder::Placeholder;
use crate::runs::extract_runs;
use crate::splice::{apply_edits, Replacements};

/// Entries ready to be written back, plus what happened to the edits
#[derive(Debug, Clone)]
pub struct Reconstruction {
    pub entries: Vec<ArchiveEntry>,
    pub report: ReconstructReport,
}

/// What happened to the requested edits
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconstructReport {
    /// Placeholder occurrences replaced
    pub applied: usize,
    /// Entries whose bytes changed
    pub edited_entries: Vec<String>,
    /// Edits skipped because runs no longer spell the token
    pub inconsistencies: Vec<MappingInconsistency>,
    /// `(entry, token)` pairs with no matching placeholder
    pub unmatched: Vec<(String, String)>,
    /// Entries named by edits but absent from the document
    pub unknown_entries: Vec<String>,
}

impl ReconstructReport {
    /// Whether every requested edit found its placeholder
    pub fn is_clean(&self) -> bool {
        self.inconsistencies.is_empty() && self.unmatched.is_empty() && self.unknown_entries.is_empty()
    }
}

/// Parses the representation and rebuilds archive entries from it
pub struct Decoder {}

impl Decoder {
    pub fn new() -> Self {
        Self {}
    }

    /// Decode a document from JSON text
    pub fn decode(&self, input: &str) -> Result<Document> {
        serde_json::from_str(input).context("Failed to parse document JSON")
    }

    /// Decode a document from a JSON file
    pub fn decode_file(&self, path: &Path) -> Result<Document> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read JSON: {}", path.display()))?;
        self.decode(&content)
            .with_context(|| format!("Invalid document: {}", path.display()))
    }

    /// Rebuild entries applying the document's own staged edits
    pub fn reconstruct(&self, document: &Document) -> Result<Reconstruction, SpliceError> {
        self.reconstruct_with(document, &document.edits)
    }

    /// Rebuild entries applying `edits`
    ///
    /// Runs are re-extracted from each entry's bytes and every recorded
    /// placeholder is checked against them before its edit is spliced in.
    /// Entries without edits are copied through byte for byte.
    pub fn reconstruct_with(
        &self,
        document: &Document,
        edits: &EditSet,
    ) -> Result<Reconstruction, SpliceError> {
        let mut report = ReconstructReport::default();
        let mut entries = Vec::with_capacity(document.entries.len());

        for entry in &document.entries {
            let data = match edits.for_entry(&entry.name) {
                Some(replacements) if !replacements.is_empty() => {
                    self.reconstruct_entry(entry, replacements, &mut report)?
                }
                _ => entry.content.clone(),
            };
            entries.push(ArchiveEntry {
                name: entry.name.clone(),
                data,
                metadata: entry.metadata,
            });
        }

        for name in edits.entries() {
            if document.entry(name).is_none() {
                warn!("edits name an entry that does not exist: {name}");
                report.unknown_entries.push(name.to_string());
            }
        }

        info!(
            "reconstructed {} entries, {} placeholders replaced",
            entries.len(),
            report.applied
        );
        Ok(Reconstruction { entries, report })
    }

    fn reconstruct_entry(
        &self,
        entry: &DocumentEntry,
        replacements: &Replacements,
        report: &mut ReconstructReport,
    ) -> Result<Vec<u8>, SpliceError> {
        let Some(editable) = &entry.editable else {
            warn!("{}: has edits but no editable text", entry.name);
            report.unmatched.extend(
                replacements
                    .keys()
                    .map(|token| (entry.name.clone(), token.clone())),
            );
            return Ok(entry.content.clone());
        };

        let runs = match extract_runs(&entry.content) {
            Ok(runs) => runs,
            Err(e) => {
                warn!("{}: cannot rescan content, leaving unedited: {e}", entry.name);
                report.unmatched.extend(
                    replacements
                        .keys()
                        .map(|token| (entry.name.clone(), token.clone())),
                );
                return Ok(entry.content.clone());
            }
        };
        if runs.len() != editable.runs.len() {
            debug!(
                "{}: recorded {} runs, content has {}",
                entry.name,
                editable.runs.len(),
                runs.len()
            );
        }

        let placeholders: Vec<Placeholder> = editable
            .placeholders
            .iter()
            .map(|record| record.to_placeholder(&runs))
            .collect();

        for token in replacements.keys() {
            if !placeholders.iter().any(|p| &p.token == token) {
                warn!("{}: no placeholder {token}", entry.name);
                report.unmatched.push((entry.name.clone(), token.clone()));
            }
        }

        let outcome = apply_edits(
            &entry.name,
            &entry.content,
            &runs,
            &placeholders,
            replacements,
        )?;
        if outcome.is_modified() {
            report.edited_entries.push(entry.name.clone());
        }
        report.applied += outcome.applied;
        report.inconsistencies.extend(outcome.skipped);
        Ok(outcome.data)
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::Encoder;

    const XML: &str = r#"<w:p><w:r><w:t>Hello </w:t></w:r><w:r><w:t>{</w:t></w:r><w:r><w:t>Name</w:t></w:r><w:r><w:t>}!</w:t></w:r></w:p>"#;

    fn document() -> Document {
        Encoder::new().extract(&[
            ArchiveEntry::new("word/document.xml", XML),
            ArchiveEntry::new("word/media/a.bin", vec![1, 2, 3]),
        ])
    }

    #[test]
    fn test_reconstruct_without_edits_is_identity() {
        let doc = document();
        let rebuilt = Decoder::new().reconstruct(&doc).unwrap();
        assert_eq!(rebuilt.entries[0].data, XML.as_bytes());
        assert_eq!(rebuilt.entries[1].data, vec![1, 2, 3]);
        assert!(rebuilt.report.edited_entries.is_empty());
        assert!(rebuilt.report.is_clean());
    }

    #[test]
    fn test_reconstruct_applies_staged_edits() {
        let mut doc = document();
        doc.edits.set("word/document.xml", "{Name}", "World");
        let rebuilt = Decoder::new().reconstruct(&doc).unwrap();

        let xml = String::from_utf8(rebuilt.entries[0].data.clone()).unwrap();
        assert_eq!(
            xml,
            r#"<w:p><w:r><w:t>Hello </w:t></w:r><w:r><w:t>World</w:t></w:r><w:r><w:t></w:t></w:r><w:r><w:t>!</w:t></w:r></w:p>"#
        );
        assert_eq!(rebuilt.report.applied, 1);
        assert_eq!(rebuilt.report.edited_entries, vec!["word/document.xml"]);
    }

    #[test]
    fn test_decode_json_then_reconstruct() {
        let encoder = Encoder::new();
        let mut doc = document();
        doc.edits.set("word/document.xml", "{Name}", "A & B");
        let json = encoder.encode(&doc).unwrap();

        let decoded = Decoder::new().decode(&json).unwrap();
        let rebuilt = Decoder::new().reconstruct(&decoded).unwrap();
        let xml = String::from_utf8(rebuilt.entries[0].data.clone()).unwrap();
        assert!(xml.contains("<w:t>A &amp; B</w:t>"));
    }

    #[test]
    fn test_unmatched_and_unknown_edits_are_reported() {
        let mut doc = document();
        doc.edits.set("word/document.xml", "{Missing}", "x");
        doc.edits.set("word/media/a.bin", "{A}", "x");
        doc.edits.set("word/nowhere.xml", "{A}", "x");
        let rebuilt = Decoder::new().reconstruct(&doc).unwrap();

        assert_eq!(rebuilt.entries[0].data, XML.as_bytes());
        assert_eq!(
            rebuilt.report.unmatched,
            vec![
                ("word/document.xml".to_string(), "{Missing}".to_string()),
                ("word/media/a.bin".to_string(), "{A}".to_string()),
            ]
        );
        assert_eq!(rebuilt.report.unknown_entries, vec!["word/nowhere.xml"]);
        assert!(!rebuilt.report.is_clean());
    }

    #[test]
    fn test_tampered_content_reports_inconsistency() {
        let mut doc = document();
        // Content changed behind the recorded placeholder
        doc.entries[0].content = XML.replace("Name", "Nope").into_bytes();
        doc.edits.set("word/document.xml", "{Name}", "World");
        let rebuilt = Decoder::new().reconstruct(&doc).unwrap();

        assert_eq!(rebuilt.entries[0].data, doc.entries[0].content);
        assert_eq!(rebuilt.report.inconsistencies.len(), 1);
        assert_eq!(rebuilt.report.inconsistencies[0].found, "{Nope}");
        assert_eq!(rebuilt.report.applied, 0);
    }

    #[test]
    fn test_reversed_slice_in_json_reports_inconsistency() {
        let encoder = Encoder::new();
        let mut doc = document();
        doc.edits.set("word/document.xml", "{Name}", "World");
        let json = encoder.encode(&doc).unwrap();
        let mut value: serde_json::Value = serde_json::from_str(&json).unwrap();
        value["entries"]["word/document.xml"]["editable"]["placeholders"][0]["runs"][0]
            ["start_in_run"] = serde_json::json!(5);

        let decoded = Decoder::new().decode(&value.to_string()).unwrap();
        let rebuilt = Decoder::new().reconstruct(&decoded).unwrap();

        assert_eq!(rebuilt.entries[0].data, XML.as_bytes());
        assert_eq!(rebuilt.report.inconsistencies.len(), 1);
        assert_eq!(rebuilt.report.applied, 0);
        assert!(rebuilt.report.edited_entries.is_empty());
    }

    #[test]
    fn test_partly_stale_entry_is_edited_and_reported() {
        let xml = r#"<w:t>{Name}</w:t><w:t> from {City}</w:t>"#;
        let mut doc = Encoder::new().extract(&[ArchiveEntry::new("word/document.xml", xml)]);
        doc.entries[0].content = xml.replace("City", "Town").into_bytes();
        doc.edits.set("word/document.xml", "{Name}", "Ada");
        doc.edits.set("word/document.xml", "{City}", "Paris");
        let rebuilt = Decoder::new().reconstruct(&doc).unwrap();

        assert_eq!(
            rebuilt.entries[0].data,
            br#"<w:t>Ada</w:t><w:t> from {Town}</w:t>"#
        );
        assert_eq!(rebuilt.report.applied, 1);
        assert_eq!(rebuilt.report.inconsistencies.len(), 1);
        assert_eq!(rebuilt.report.edited_entries, vec!["word/document.xml"]);
    }

    #[test]
    fn test_external_edit_set_overrides_staged() {
        let mut doc = document();
        doc.edits.set("word/document.xml", "{Name}", "Staged");
        let mut edits = EditSet::new();
        edits.set("word/document.xml", "{Name}", "Direct");
        let rebuilt = Decoder::new().reconstruct_with(&doc, &edits).unwrap();
        let xml = String::from_utf8(rebuilt.entries[0].data.clone()).unwrap();
        assert!(xml.contains("Direct"));
        assert!(!xml.contains("Staged"));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(Decoder::new().decode("not json").is_err());
        assert!(Decoder::new().decode(r#"{"edits": {}}"#).is_err());
    }
}
