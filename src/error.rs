//! Error types
//!
//! Archive-level failures ([`ContainerError`]) and splice integrity failures
//! ([`SpliceError`]) abort a conversion. [`ExtractionError`] and
//! [`MappingInconsistency`] are recovered per entry: the first turns the entry
//! into opaque passthrough, the second skips one edit and is reported.

use thiserror::Error;

/// Errors reading or writing the zip container
#[derive(Error, Debug)]
pub enum ContainerError {
    /// IO error on the archive file
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Corrupt or unsupported zip structure
    #[error("Invalid ZIP archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Entry is password-protected
    #[error("Entry '{name}' is encrypted")]
    Encrypted {
        /// Name of the encrypted entry
        name: String,
    },

    /// Single entry exceeds the configured inflate limit
    #[error("Entry '{name}' is too large ({size} bytes, max {max} bytes)")]
    EntryTooLarge {
        /// Name of the entry
        name: String,
        /// Declared uncompressed size
        size: u64,
        /// Configured limit
        max: u64,
    },

    /// Sum of all entries exceeds the configured inflate limit
    #[error("Archive is too large (max {max} bytes)")]
    ArchiveTooLarge {
        /// Configured limit
        max: u64,
    },

    /// Two entries share a name
    #[error("Duplicate entry: {0}")]
    DuplicateEntry(String),
}

/// Reasons an entry cannot be scanned for runs
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    /// Entry bytes are not UTF-8
    #[error("entry is not valid UTF-8 (valid up to byte {valid_up_to})")]
    InvalidUtf8 {
        /// Length of the valid UTF-8 prefix
        valid_up_to: usize,
    },

    /// A text element was opened but never closed
    #[error("unterminated <{element}> element at byte {offset}")]
    Unterminated {
        /// Qualified element name as written
        element: String,
        /// Offset of the opening `<`
        offset: usize,
    },
}

/// A placeholder whose contributing run slices no longer spell its token
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("placeholder '{token}' in '{entry}' no longer matches its runs (found '{found}')")]
pub struct MappingInconsistency {
    /// Entry the placeholder belongs to
    pub entry: String,
    /// Token recorded for the placeholder
    pub token: String,
    /// Text actually reconstructed from the current runs
    pub found: String,
}

/// Failures applying edits to an entry's raw bytes
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SpliceError {
    /// Recorded byte span no longer bounds the run it was extracted from
    #[error("run {run_id} of '{entry}' cannot be located in the entry bytes")]
    RunNotFound {
        /// Entry being reconstructed
        entry: String,
        /// Run whose span is stale
        run_id: usize,
    },

    /// Two byte patches overlap, which means span bookkeeping went wrong
    #[error("overlapping edit at run {run_id} of '{entry}'")]
    Overlap {
        /// Entry being reconstructed
        entry: String,
        /// Run where the overlap was detected
        run_id: usize,
    },
}

/// Failures running the external flattening converter
#[derive(Error, Debug)]
pub enum FlattenError {
    /// Converter binary is not where the configuration says
    #[error("converter not found at: {0}")]
    ConverterMissing(std::path::PathBuf),

    /// Converter ran but exited unsuccessfully
    #[error("conversion to {step} failed: {status}")]
    ConversionFailed {
        /// Target format of the failed step
        step: &'static str,
        /// Exit status reported by the converter
        status: std::process::ExitStatus,
    },

    /// Converter finished but produced no output file
    #[error("converter produced no output at: {0}")]
    MissingOutput(std::path::PathBuf),

    /// IO error copying or cleaning up
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Rejected editor actions
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EditorError {
    /// Entry name not present in the document
    #[error("unknown entry: {0}")]
    UnknownEntry(String),

    /// Entry is not an XML part
    #[error("entry is not an XML part: {0}")]
    NotEditable(String),

    /// Token is not one of the entry's detected placeholders
    #[error("placeholder '{token}' not found in '{entry}'")]
    UnknownPlaceholder {
        /// Selected entry
        entry: String,
        /// Rejected token
        token: String,
    },

    /// Action needs a selected entry
    #[error("select an entry first")]
    NoEntrySelected,

    /// Action needs at least one selected placeholder
    #[error("select at least one placeholder")]
    NoPlaceholderSelected,
}
