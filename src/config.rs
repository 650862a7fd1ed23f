//! Configuration values
//!
//! Everything here is plain data passed explicitly into the component that
//! needs it. Nothing is read from process state below the binary.

use std::path::{Path, PathBuf};

use crate::error::FlattenError;

/// Inflate limit for a single entry (256 MiB)
pub const MAX_ENTRY_BYTES: u64 = 256 * 1024 * 1024;

/// Inflate limit across all entries (512 MiB)
pub const MAX_TOTAL_BYTES: u64 = 512 * 1024 * 1024;

/// Which brace forms count as placeholders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaceholderSyntax {
    /// `{{Name}}` and `{Name}`
    #[default]
    Braces,
    /// Only `{{Name}}`; prose such as `{see below}` is ignored
    DoubleBraces,
}

/// Configuration for run extraction and placeholder detection
#[derive(Debug, Clone)]
pub struct ExtractConfig {
    /// Placeholder pattern to search logical text with
    pub syntax: PlaceholderSyntax,
    /// Entry name suffixes (case-insensitive) that are scanned for runs
    pub editable_suffixes: Vec<String>,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            syntax: PlaceholderSyntax::default(),
            editable_suffixes: vec![".xml".to_string()],
        }
    }
}

impl ExtractConfig {
    /// Set the placeholder syntax
    pub fn with_syntax(mut self, syntax: PlaceholderSyntax) -> Self {
        self.syntax = syntax;
        self
    }

    /// Replace the list of scanned suffixes
    pub fn with_suffixes<I, S>(mut self, suffixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.editable_suffixes = suffixes.into_iter().map(Into::into).collect();
        self
    }

    /// Whether an entry with this name should be scanned
    pub fn is_editable_name(&self, name: &str) -> bool {
        let lower = name.to_ascii_lowercase();
        self.editable_suffixes
            .iter()
            .any(|suffix| lower.ends_with(&suffix.to_ascii_lowercase()))
    }
}

/// Size limits enforced when inflating an archive
#[derive(Debug, Clone, Copy)]
pub struct ContainerLimits {
    /// Maximum uncompressed bytes for any single entry
    pub max_entry_bytes: u64,
    /// Maximum uncompressed bytes across the archive
    pub max_total_bytes: u64,
}

impl Default for ContainerLimits {
    fn default() -> Self {
        Self {
            max_entry_bytes: MAX_ENTRY_BYTES,
            max_total_bytes: MAX_TOTAL_BYTES,
        }
    }
}

/// Location of the external office converter used for flattening
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlattenConfig {
    /// Path to the `soffice` executable
    pub converter: PathBuf,
}

impl FlattenConfig {
    pub fn new(converter: impl Into<PathBuf>) -> Self {
        Self {
            converter: converter.into(),
        }
    }

    /// Check the converter exists; called once before any conversion
    pub fn validate(&self) -> Result<(), FlattenError> {
        if is_file(&self.converter) {
            Ok(())
        } else {
            Err(FlattenError::ConverterMissing(self.converter.clone()))
        }
    }
}

fn is_file(path: &Path) -> bool {
    path.metadata().map(|m| m.is_file()).unwrap_or(false)
}
