//! # docx-splice
//!
//! Lossless DOCX ⇄ JSON conversion with placeholder filling.
//!
//! A DOCX file is a zip of XML parts. Word frequently splits what looks like
//! one word across several `<w:t>` text runs, so a template token such as
//! `{MemFirstName}` may be stored as `{` + `MemFirstName` + `}` in three runs.
//! This crate finds such tokens in the concatenated run text, maps them back
//! onto the runs they span, and replaces them by patching only the affected
//! run bytes. Everything else in the archive comes back byte for byte.
//!
//! ## Representation
//!
//! Every entry is kept in archive order with its raw bytes (base64) and zip
//! metadata. XML entries that contain runs also get an editable view:
//!
//! ```text
//! "word/document.xml": {
//!   "content": "PD94bWwg...",
//!   "metadata": { "timestamp": [2024, 5, 1, 9, 30, 0], "compression_method": 8, "external_attributes": 0, "host_system": 3 },
//!   "editable": {
//!     "runs": [{ "run_id": 0, "text": "Dear {" }, { "run_id": 1, "text": "Name" }, { "run_id": 2, "text": "}," }],
//!     "all_text": "Dear {Name},",
//!     "placeholders": [{ "placeholder": "{Name}", "runs": [
//!       { "run_id": 0, "start_in_run": 5, "end_in_run": 6 },
//!       { "run_id": 1, "start_in_run": 0, "end_in_run": 4 },
//!       { "run_id": 2, "start_in_run": 0, "end_in_run": 1 }
//!     ] }]
//!   }
//! }
//! ```
//!
//! Replacements are staged under a top-level `"edits"` object keyed by entry
//! name and token.
//!
//! ## Replacement rule
//!
//! The first run of a placeholder receives the replacement in place of its
//! slice of the token; the other runs lose their slice. Text around the token
//! stays where it was, so the runs `Dear {`, `Name` and `},` become
//! `Dear Aditya`, an empty run, and `,`.
//!
//! ## Example
//!
//! ```no_run
//! use std::path::Path;
//! use docx_splice::{pipeline, EditSet, ExtractConfig};
//!
//! # fn main() -> anyhow::Result<()> {
//! let mut edits = EditSet::new();
//! edits.set("word/document.xml", "{Name}", "Aditya");
//! let report = pipeline::fill(
//!     Path::new("letter.docx"),
//!     &edits,
//!     Path::new("letter_filled.docx"),
//!     &ExtractConfig::default(),
//! )?;
//! assert!(report.is_clean());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod container;
pub mod decoder;
pub mod document;
pub mod encoder;
pub mod error;
pub mod flatten;
pub mod pipeline;
pub mod placeholder;
pub mod runs;
pub mod session;
pub mod splice;

pub use config::{ContainerLimits, ExtractConfig, FlattenConfig, PlaceholderSyntax};
pub use container::{ArchiveEntry, EntryMetadata};
pub use decoder::{Decoder, ReconstructReport, Reconstruction};
pub use document::{Document, DocumentEntry, EditSet, Editable, PlaceholderRecord, RunText};
pub use encoder::Encoder;
pub use error::{
    ContainerError, EditorError, ExtractionError, FlattenError, MappingInconsistency, SpliceError,
};
pub use flatten::Flattener;
pub use placeholder::{map_placeholders, MappedText, Placeholder, RunSlice};
pub use runs::{extract_runs, logical_text, Run};
pub use session::{reduce, EditDelta, EditorAction, EditorState};
pub use splice::{apply_edits, splice_entry, Replacements, SpliceOutcome};
