//! DOCX to JSON encoder

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use log::{debug, warn};

use crate::config::ExtractConfig;
use crate::container::ArchiveEntry;
use crate::document::{Document, DocumentEntry, Editable, PlaceholderRecord, RunText};
use crate::placeholder::map_placeholders;
use crate::runs::extract_runs;

/// Builds the editable representation of an archive
pub struct Encoder {
    config: ExtractConfig,
}

impl Encoder {
    /// Create an encoder with the default configuration
    pub fn new() -> Self {
        Self {
            config: ExtractConfig::default(),
        }
    }

    pub fn with_config(config: ExtractConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExtractConfig {
        &self.config
    }

    /// Turn archive entries into a document with no staged edits
    pub fn extract(&self, entries: &[ArchiveEntry]) -> Document {
        Document {
            entries: entries.iter().map(|e| self.extract_entry(e)).collect(),
            edits: Default::default(),
        }
    }

    fn extract_entry(&self, entry: &ArchiveEntry) -> DocumentEntry {
        DocumentEntry {
            name: entry.name.clone(),
            content: entry.data.clone(),
            metadata: entry.metadata,
            editable: self.editable(entry),
        }
    }

    /// Editable view of an entry, or `None` for opaque entries
    fn editable(&self, entry: &ArchiveEntry) -> Option<Editable> {
        if entry.is_dir() || !self.config.is_editable_name(&entry.name) {
            return None;
        }
        let runs = match extract_runs(&entry.data) {
            Ok(runs) => runs,
            Err(e) => {
                warn!("{}: treating as opaque: {e}", entry.name);
                return None;
            }
        };
        if runs.is_empty() {
            return None;
        }

        let mapped = map_placeholders(&runs, self.config.syntax);
        debug!(
            "{}: {} runs, {} placeholders",
            entry.name,
            runs.len(),
            mapped.placeholders.len()
        );

        Some(Editable {
            runs: runs.iter().map(RunText::from).collect(),
            all_text: mapped.all_text,
            placeholders: mapped
                .placeholders
                .iter()
                .map(PlaceholderRecord::from)
                .collect(),
        })
    }

    /// Encode a document as pretty-printed JSON
    pub fn encode(&self, document: &Document) -> Result<String> {
        serde_json::to_string_pretty(document).context("Failed to serialize document")
    }

    /// Encode a document directly to a writer
    pub fn encode_to_writer<W: Write>(&self, document: &Document, mut writer: W) -> Result<()> {
        let encoded = self.encode(document)?;
        writer.write_all(encoded.as_bytes())?;
        Ok(())
    }

    /// Encode a document to a file
    pub fn encode_to_file(&self, document: &Document, path: &Path) -> Result<()> {
        let encoded = self.encode(document)?;
        std::fs::write(path, encoded)
            .with_context(|| format!("Failed to write JSON: {}", path.display()))?;
        Ok(())
    }
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new()
    }
}
