//! Placeholder editing session
//!
//! Editing is a pure state machine: [`reduce`] takes the current
//! [`EditorState`] and one [`EditorAction`] and returns the next state along
//! with the [`EditDelta`]s the action produced. Front ends (the `edit`
//! subcommand, or any interactive UI) only dispatch actions and persist the
//! staged [`EditSet`].

use log::debug;

use crate::document::{Document, EditSet};
use crate::error::EditorError;

/// What the user has selected and staged so far
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditorState {
    /// Entry whose placeholders are listed
    pub entry: Option<String>,
    /// Selected tokens of that entry
    pub selected: Vec<String>,
    /// Value to apply to the selection
    pub draft: String,
    /// Every edit staged so far
    pub staged: EditSet,
}

impl EditorState {
    /// Start from edits already stored in a document
    pub fn from_document(document: &Document) -> Self {
        Self {
            staged: document.edits.clone(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditorAction {
    /// Show the placeholders of an entry; drops the token selection
    ///
    /// Any XML part can be selected, even one with no placeholders.
    SelectEntry(String),
    /// Replace the token selection; seeds the draft from the first token
    SelectPlaceholders(Vec<String>),
    SetDraft(String),
    /// Stage the draft for every selected token
    ApplyToSelection,
    /// Unstage every selected token
    ClearSelection,
}

/// A single change to the staged edit set
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditDelta {
    Set {
        entry: String,
        token: String,
        value: String,
    },
    Clear {
        entry: String,
        token: String,
    },
}

impl EditDelta {
    pub fn apply_to(&self, edits: &mut EditSet) {
        match self {
            EditDelta::Set {
                entry,
                token,
                value,
            } => {
                edits.set(entry.as_str(), token.as_str(), value.as_str());
            }
            EditDelta::Clear { entry, token } => {
                edits.clear(entry, token);
            }
        }
    }
}

/// Apply one action
///
/// On error the caller keeps its previous state; nothing is staged.
pub fn reduce(
    state: &EditorState,
    action: EditorAction,
    document: &Document,
) -> Result<(EditorState, Vec<EditDelta>), EditorError> {
    let mut next = state.clone();
    let mut deltas = Vec::new();

    match action {
        EditorAction::SelectEntry(name) => {
            let entry = document
                .entry(&name)
                .ok_or_else(|| EditorError::UnknownEntry(name.clone()))?;
            if entry.editable.is_none() && !is_xml_part(&name) {
                return Err(EditorError::NotEditable(name));
            }
            if document.tokens(&name).is_empty() {
                debug!("{name}: no placeholders");
            }
            next.entry = Some(name);
            next.selected.clear();
            next.draft.clear();
        }

        EditorAction::SelectPlaceholders(tokens) => {
            let entry = state.entry.as_deref().ok_or(EditorError::NoEntrySelected)?;
            let known = document.tokens(entry);
            if let Some(bad) = tokens.iter().find(|t| !known.contains(&t.as_str())) {
                return Err(EditorError::UnknownPlaceholder {
                    entry: entry.to_string(),
                    token: bad.clone(),
                });
            }
            if let Some(first) = tokens.first() {
                next.draft = first.trim_matches(&['{', '}'][..]).to_string();
            }
            next.selected = tokens;
        }

        EditorAction::SetDraft(value) => {
            next.draft = value;
        }

        EditorAction::ApplyToSelection => {
            let entry = state.entry.as_deref().ok_or(EditorError::NoEntrySelected)?;
            if state.selected.is_empty() {
                return Err(EditorError::NoPlaceholderSelected);
            }
            deltas.extend(state.selected.iter().map(|token| EditDelta::Set {
                entry: entry.to_string(),
                token: token.clone(),
                value: state.draft.clone(),
            }));
        }

        EditorAction::ClearSelection => {
            // Nothing selected is a no-op
            if let Some(entry) = state.entry.as_deref() {
                deltas.extend(
                    state
                        .selected
                        .iter()
                        .filter(|token| {
                            state
                                .staged
                                .for_entry(entry)
                                .is_some_and(|r| r.contains_key(token.as_str()))
                        })
                        .map(|token| EditDelta::Clear {
                            entry: entry.to_string(),
                            token: token.clone(),
                        }),
                );
            }
        }
    }

    for delta in &deltas {
        delta.apply_to(&mut next.staged);
    }
    if !deltas.is_empty() {
        debug!("{} edit changes, {} staged", deltas.len(), next.staged.len());
    }
    Ok((next, deltas))
}

fn is_xml_part(name: &str) -> bool {
    name.to_ascii_lowercase().ends_with(".xml")
}
