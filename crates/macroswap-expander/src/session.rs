//! Per-run expansion bookkeeping
//!
//! Everything `un_expand` needs to reverse an earlier `expand` lives here, keyed by
//! file identifier. Expanders themselves hold no per-file state, so one expander can
//! serve many files and a worker can own a single file's [`FileState`] while it runs.

use macroswap_core::Diagnostic;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// How one generated value came about within a file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReverseEntry {
    /// Number of references that produced the value
    pub count: usize,

    /// Distinct matched texts that produced the value, in first-seen order
    pub originals: Vec<String>,

    /// How many of `originals` un-expansion has already handed out, front to back
    #[serde(default)]
    pub consumed: usize,
}

impl ReverseEntry {
    fn record(&mut self, original: &str) {
        self.count += 1;
        if !self.originals.iter().any(|o| o == original) {
            self.originals.push(original.to_string());
        }
    }

    /// More than one distinct reference produced this value
    pub fn is_ambiguous(&self) -> bool {
        self.originals.len() > 1
    }

    pub(crate) fn take_original(&mut self) -> Option<String> {
        let original = self.originals.get(self.consumed)?.clone();
        self.consumed += 1;
        Some(original)
    }
}

/// Bookkeeping for a single file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileState {
    /// Generated value -> how it was produced
    #[serde(default)]
    pub reverse: BTreeMap<String, ReverseEntry>,

    /// Macro names that were resolved through the generator
    #[serde(default)]
    pub unmapped: BTreeSet<String>,

    /// Anomalies raised while processing this file
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<Diagnostic>,
}

impl FileState {
    /// Nothing has been recorded for this file
    pub fn is_empty(&self) -> bool {
        self.reverse.is_empty() && self.unmapped.is_empty() && self.diagnostics.is_empty()
    }

    pub(crate) fn record(&mut self, value: &str, original: &str) {
        self.reverse.entry(value.to_string()).or_default().record(original);
    }

    pub(crate) fn mark_unmapped(&mut self, macro_name: &str) {
        self.unmapped.insert(macro_name.to_string());
    }

    pub(crate) fn push_diagnostic(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }
}

/// All bookkeeping for one translation run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExpansionSession {
    files: BTreeMap<String, FileState>,
}

impl ExpansionSession {
    /// Create an empty session
    pub fn new() -> Self {
        Self::default()
    }

    /// State recorded for a file, if any
    pub fn file(&self, file_id: &str) -> Option<&FileState> {
        self.files.get(file_id)
    }

    pub fn file_mut(&mut self, file_id: &str) -> Option<&mut FileState> {
        self.files.get_mut(file_id)
    }

    /// Macro names resolved through the generator for a file.
    ///
    /// `None` when the generator was never used for it.
    pub fn unmapped(&self, file_id: &str) -> Option<&BTreeSet<String>> {
        self.files
            .get(file_id)
            .map(|state| &state.unmapped)
            .filter(|unmapped| !unmapped.is_empty())
    }

    /// Reverse index for a file. `None` when no value was recorded.
    pub fn reverse(&self, file_id: &str) -> Option<&BTreeMap<String, ReverseEntry>> {
        self.files
            .get(file_id)
            .map(|state| &state.reverse)
            .filter(|reverse| !reverse.is_empty())
    }

    /// Reverse entry for one generated value of a file
    pub fn reverse_entry(&self, file_id: &str, value: &str) -> Option<&ReverseEntry> {
        self.files.get(file_id).and_then(|state| state.reverse.get(value))
    }

    /// Identifiers of every tracked file, sorted
    pub fn file_ids(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Detach a file's state so it can be processed on its own
    pub fn take_file(&mut self, file_id: &str) -> Option<FileState> {
        self.files.remove(file_id)
    }

    /// Attach a file's state, replacing any previous state for that file.
    ///
    /// Empty states are dropped so untouched files stay absent.
    pub fn insert_file(&mut self, file_id: impl Into<String>, state: FileState) -> Option<FileState> {
        let file_id = file_id.into();
        if state.is_empty() {
            return self.files.remove(&file_id);
        }
        self.files.insert(file_id, state)
    }

    /// Record a diagnostic against a file
    pub fn record_diagnostic(&mut self, file_id: &str, diagnostic: Diagnostic) {
        self.files
            .entry(file_id.to_string())
            .or_default()
            .push_diagnostic(diagnostic);
    }

    /// All diagnostics, grouped by file
    pub fn diagnostics(&self) -> impl Iterator<Item = &Diagnostic> {
        self.files.values().flat_map(|state| state.diagnostics.iter())
    }

    /// Remove and return every diagnostic recorded so far
    pub fn drain_diagnostics(&mut self) -> Vec<Diagnostic> {
        let drained = self
            .files
            .values_mut()
            .flat_map(|state| std::mem::take(&mut state.diagnostics))
            .collect();
        self.files.retain(|_, state| !state.is_empty());
        drained
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Save to file
    pub fn save_to_file(&self, path: &Path) -> Result<(), SessionError> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Load a session saved by [`ExpansionSession::save_to_file`]
    pub fn from_file(path: &Path) -> Result<Self, SessionError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }
}

/// Session persistence errors
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid session file: {0}")]
    Json(#[from] serde_json::Error),
}
