//! Placeholder mapping
//!
//! Run texts are concatenated into one logical string, placeholder tokens are
//! searched in that string, and each match is mapped back onto the runs it
//! overlaps. All offsets are char offsets.

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::PlaceholderSyntax;
use crate::runs::Run;

static RE_BRACES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{.*?\}\}|\{[^{}\n\r]+\}").expect("valid placeholder regex")
});
static RE_DOUBLE_BRACES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{.*?\}\}").expect("valid double-brace regex"));

/// The part of one run a placeholder occupies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSlice {
    pub run_id: usize,
    pub start_in_run: usize,
    pub end_in_run: usize,
}

impl RunSlice {
    /// Chars covered; a reversed slice covers none
    pub fn len(&self) -> usize {
        self.end_in_run.saturating_sub(self.start_in_run)
    }

    pub fn is_empty(&self) -> bool {
        self.start_in_run >= self.end_in_run
    }
}

/// A token found in the logical text, possibly spread over several runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    /// Matched text, e.g. `{Name}`
    pub token: String,
    /// Char span in the logical text
    pub logical_span: Range<usize>,
    /// Contributing slices in run order, covering exactly `logical_span`
    pub runs: Vec<RunSlice>,
}

impl Placeholder {
    /// Rebuild the token from current run texts
    ///
    /// Returns `None` if a referenced run is missing or a slice is out of range.
    pub fn reconstruct<'r, F>(&self, mut run_text: F) -> Option<String>
    where
        F: FnMut(usize) -> Option<&'r str>,
    {
        let mut out = String::with_capacity(self.token.len());
        for slice in &self.runs {
            let text = run_text(slice.run_id)?;
            out.push_str(char_slice(text, slice.start_in_run, slice.end_in_run)?);
        }
        Some(out)
    }

    /// Whether the contributing slices of `runs` still spell the token
    pub fn matches_runs(&self, runs: &[Run]) -> bool {
        self.reconstruct(|id| run_by_id(runs, id).map(|r| r.text.as_str()))
            .is_some_and(|text| text == self.token)
    }

    pub fn is_fragmented(&self) -> bool {
        self.runs.len() > 1
    }
}

/// Logical text of an entry together with the placeholders found in it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedText {
    pub all_text: String,
    pub placeholders: Vec<Placeholder>,
}

/// Find placeholders across `runs`
pub fn map_placeholders(runs: &[Run], syntax: PlaceholderSyntax) -> MappedText {
    let mut all_text = String::new();
    // [start, end) of each run in logical chars
    let mut positions = Vec::with_capacity(runs.len());
    let mut pos = 0;
    for run in runs {
        all_text.push_str(&run.text);
        let len = run.text.chars().count();
        positions.push(pos..pos + len);
        pos += len;
    }

    let regex: &Regex = match syntax {
        PlaceholderSyntax::Braces => &*RE_BRACES,
        PlaceholderSyntax::DoubleBraces => &*RE_DOUBLE_BRACES,
    };

    let mut placeholders = Vec::new();
    let mut cursor = CharCursor::default();

    for m in regex.find_iter(&all_text) {
        let start = cursor.advance(&all_text, m.start());
        let end = cursor.advance(&all_text, m.end());

        let mut slices = Vec::new();
        for (run, span) in runs.iter().zip(&positions) {
            if span.end <= start {
                continue;
            }
            if span.start >= end {
                break;
            }
            let start_in_run = start.max(span.start) - span.start;
            let end_in_run = end.min(span.end) - span.start;
            if start_in_run < end_in_run {
                slices.push(RunSlice {
                    run_id: run.run_id,
                    start_in_run,
                    end_in_run,
                });
            }
        }

        if !slices.is_empty() {
            placeholders.push(Placeholder {
                token: m.as_str().to_string(),
                logical_span: start..end,
                runs: slices,
            });
        }
    }

    MappedText {
        all_text,
        placeholders,
    }
}

/// Byte to char offset conversion for monotonically increasing offsets
#[derive(Default)]
struct CharCursor {
    byte: usize,
    chars: usize,
}

impl CharCursor {
    fn advance(&mut self, text: &str, byte: usize) -> usize {
        self.chars += text[self.byte..byte].chars().count();
        self.byte = byte;
        self.chars
    }
}

pub(crate) fn run_by_id(runs: &[Run], run_id: usize) -> Option<&Run> {
    // Extracted runs are numbered by position
    match runs.get(run_id) {
        Some(run) if run.run_id == run_id => Some(run),
        _ => runs.iter().find(|r| r.run_id == run_id),
    }
}

/// Slice `text` by char offsets
pub fn char_slice(text: &str, start: usize, end: usize) -> Option<&str> {
    if start > end {
        return None;
    }
    let mut indices = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()));
    let from = indices.nth(start)?;
    let to = if end == start {
        from
    } else {
        indices.nth(end - start - 1)?
    };
    Some(&text[from..to])
}
