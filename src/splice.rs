//! Edit splicing
//!
//! Replacements are written into the original bytes of the runs a placeholder
//! covers. The first contributing run receives the replacement in place of its
//! slice of the token, the slices held by the remaining runs are emptied, and
//! every byte outside those slices is copied through unchanged.
//!
//! Patches are collected first and applied in one forward pass from the
//! original buffer into a fresh one, so spans recorded at extraction time stay
//! valid for the whole pass.

use std::collections::BTreeMap;
use std::ops::Range;

use log::{debug, warn};
use quick_xml::escape::escape;

use crate::config::PlaceholderSyntax;
use crate::error::{MappingInconsistency, SpliceError};
use crate::placeholder::{char_slice, map_placeholders, run_by_id, Placeholder};
use crate::runs::{extract_runs, RawContext, Run};

/// Token to replacement for a single entry
pub type Replacements = BTreeMap<String, String>;

/// Result of applying replacements to one entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpliceOutcome {
    /// New entry bytes
    pub data: Vec<u8>,
    /// Number of placeholder occurrences replaced
    pub applied: usize,
    /// Edits skipped because their runs no longer spell the token
    pub skipped: Vec<MappingInconsistency>,
    /// Content span of every edited run within `data`
    pub relocated: Vec<(usize, Range<usize>)>,
}

impl SpliceOutcome {
    fn unchanged(raw: &[u8]) -> Self {
        Self {
            data: raw.to_vec(),
            applied: 0,
            skipped: Vec::new(),
            relocated: Vec::new(),
        }
    }

    pub fn is_modified(&self) -> bool {
        !self.relocated.is_empty()
    }
}

/// Replace a char range of a run's text
#[derive(Debug, Clone)]
struct SubEdit {
    start: usize,
    end: usize,
    insert: String,
}

/// Bytes to write in place of `range` of the original buffer
#[derive(Debug)]
struct Patch {
    run_id: usize,
    range: Range<usize>,
    bytes: Vec<u8>,
}

/// Extract, map and splice one entry
///
/// Entries that cannot be scanned are returned unchanged.
pub fn splice_entry(
    entry: &str,
    raw: &[u8],
    syntax: PlaceholderSyntax,
    replacements: &Replacements,
) -> Result<SpliceOutcome, SpliceError> {
    if replacements.is_empty() {
        return Ok(SpliceOutcome::unchanged(raw));
    }
    let runs = match extract_runs(raw) {
        Ok(runs) => runs,
        Err(e) => {
            warn!("{entry}: passing through unedited: {e}");
            return Ok(SpliceOutcome::unchanged(raw));
        }
    };
    let mapped = map_placeholders(&runs, syntax);
    apply_edits(entry, raw, &runs, &mapped.placeholders, replacements)
}

/// Apply `replacements` to every matching placeholder of an entry
///
/// `runs` must have been extracted from `raw`; a run whose span no longer
/// locates it fails the whole entry with [`SpliceError::RunNotFound`].
pub fn apply_edits(
    entry: &str,
    raw: &[u8],
    runs: &[Run],
    placeholders: &[Placeholder],
    replacements: &Replacements,
) -> Result<SpliceOutcome, SpliceError> {
    let mut per_run: BTreeMap<usize, Vec<SubEdit>> = BTreeMap::new();
    let mut skipped = Vec::new();
    let mut applied = 0;

    for placeholder in placeholders {
        let Some(replacement) = replacements.get(&placeholder.token) else {
            continue;
        };
        if !placeholder.matches_runs(runs) {
            let found = placeholder
                .reconstruct(|id| run_by_id(runs, id).map(|r| r.text.as_str()))
                .unwrap_or_default();
            warn!(
                "{entry}: skipping '{}', runs now read '{found}'",
                placeholder.token
            );
            skipped.push(MappingInconsistency {
                entry: entry.to_string(),
                token: placeholder.token.clone(),
                found,
            });
            continue;
        }

        for (i, slice) in placeholder.runs.iter().enumerate() {
            per_run.entry(slice.run_id).or_default().push(SubEdit {
                start: slice.start_in_run,
                end: slice.end_in_run,
                insert: if i == 0 {
                    replacement.clone()
                } else {
                    String::new()
                },
            });
        }
        applied += 1;
    }

    if per_run.is_empty() {
        let mut outcome = SpliceOutcome::unchanged(raw);
        outcome.skipped = skipped;
        return Ok(outcome);
    }

    let mut patches = Vec::new();
    let mut contents = BTreeMap::new();
    for (run_id, mut edits) in per_run {
        let located = run_by_id(runs, run_id)
            .filter(|run| run.is_located_in(raw))
            .and_then(|run| run.content.clone().map(|content| (run, content)));
        let (run, content) = match located {
            Some(found) => found,
            None => {
                return Err(SpliceError::RunNotFound {
                    entry: entry.to_string(),
                    run_id,
                })
            }
        };
        edits.sort_by_key(|e| e.start);
        patches.extend(run_patches(entry, run, &content, &edits)?);
        contents.insert(run_id, content);
    }

    let (data, relocated) = write_patches(entry, raw, patches, &contents)?;
    debug!(
        "{entry}: replaced {applied} placeholders across {} runs",
        relocated.len()
    );

    Ok(SpliceOutcome {
        data,
        applied,
        skipped,
        relocated,
    })
}

fn run_patches(
    entry: &str,
    run: &Run,
    content: &Range<usize>,
    edits: &[SubEdit],
) -> Result<Vec<Patch>, SpliceError> {
    let slices: Option<Vec<_>> = edits
        .iter()
        .map(|edit| run.raw_slice(edit.start, edit.end))
        .collect();
    if let Some(slices) = slices {
        return Ok(edits
            .iter()
            .zip(slices)
            .map(|(edit, (range, context))| Patch {
                run_id: run.run_id,
                range,
                bytes: escape_for(&edit.insert, context),
            })
            .collect());
    }
    if run.verbatim {
        return Err(SpliceError::RunNotFound {
            entry: entry.to_string(),
            run_id: run.run_id,
        });
    }

    // A slice crosses markup or a CDATA edge: rewrite the whole content
    debug!("{entry}: rewriting run {} as plain text", run.run_id);
    let mut text = String::with_capacity(run.text.len());
    let mut cursor = 0;
    let overlap = || SpliceError::Overlap {
        entry: entry.to_string(),
        run_id: run.run_id,
    };
    for edit in edits {
        if edit.start < cursor {
            return Err(overlap());
        }
        text.push_str(char_slice(&run.text, cursor, edit.start).ok_or_else(overlap)?);
        text.push_str(&edit.insert);
        cursor = edit.end;
    }
    text.push_str(char_slice(&run.text, cursor, run.char_len()).ok_or_else(overlap)?);

    Ok(vec![Patch {
        run_id: run.run_id,
        range: content.clone(),
        bytes: escape_for(&text, RawContext::Text),
    }])
}

/// Encode `text` for insertion at a raw position
fn escape_for(text: &str, context: RawContext) -> Vec<u8> {
    match context {
        RawContext::Text => escape(text).into_owned().into_bytes(),
        RawContext::Cdata => text.replace("]]>", "]]]]><![CDATA[>").into_bytes(),
    }
}

/// Apply sorted, non-overlapping patches in one pass
///
/// Returns the new buffer and each edited run's relocated content span.
fn write_patches(
    entry: &str,
    raw: &[u8],
    mut patches: Vec<Patch>,
    contents: &BTreeMap<usize, Range<usize>>,
) -> Result<(Vec<u8>, Vec<(usize, Range<usize>)>), SpliceError> {
    patches.sort_by_key(|p| p.range.start);

    let mut out = Vec::with_capacity(raw.len());
    let mut cursor = 0;
    let mut shift: isize = 0;
    let mut relocated: Vec<(usize, Range<usize>)> = Vec::with_capacity(contents.len());

    for patch in patches {
        if patch.range.start < cursor || patch.range.end > raw.len() {
            return Err(SpliceError::Overlap {
                entry: entry.to_string(),
                run_id: patch.run_id,
            });
        }

        let content = &contents[&patch.run_id];
        let is_new_run = relocated.last().map(|(id, _)| *id) != Some(patch.run_id);
        if is_new_run {
            let start = offset(content.start, shift);
            relocated.push((patch.run_id, start..start));
        }

        out.extend_from_slice(&raw[cursor..patch.range.start]);
        out.extend_from_slice(&patch.bytes);
        cursor = patch.range.end;
        shift += patch.bytes.len() as isize - patch.range.len() as isize;

        if let Some((_, span)) = relocated.last_mut() {
            span.end = offset(content.end, shift);
        }
    }
    out.extend_from_slice(&raw[cursor..]);

    Ok((out, relocated))
}

fn offset(pos: usize, shift: isize) -> usize {
    pos.saturating_add_signed(shift)
}
