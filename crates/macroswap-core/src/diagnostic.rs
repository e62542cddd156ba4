//! Diagnostic codes and anomaly reporting
//!
//! IMPORTANT: Diagnostic codes are versioned and stable.
//! NEVER rename or remove codes - they are part of the public API.
//! Add new codes with new names only.

use serde::{Deserialize, Serialize};

/// Diagnostic code registry (v1)
///
/// Every anomaly the substitution engine can hit maps to one of these codes.
/// None of them abort a run; the caller decides what to do with them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiagnosticCode {
    // Expansion (1xxx)
    /// A macro reference had no mapping entry and no generator was configured
    MacroUnresolved,

    // Un-expansion (2xxx)
    /// One generated value was produced by several distinct macro references
    MacroAmbiguousReversal,

    /// A generated value was restored a different number of times than it was produced
    UnexpandCountMismatch,

    // Routing (3xxx)
    /// A file name matched more than one routing pattern
    RouteAmbiguous,
}

impl DiagnosticCode {
    /// Get the diagnostic code as a stable string identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MacroUnresolved => "MACRO_UNRESOLVED",
            Self::MacroAmbiguousReversal => "MACRO_AMBIGUOUS_REVERSAL",
            Self::UnexpandCountMismatch => "UNEXPAND_COUNT_MISMATCH",
            Self::RouteAmbiguous => "ROUTE_AMBIGUOUS",
        }
    }
}

impl std::fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Diagnostic severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Warning - output may be inaccurate but processing continued
    Warn,

    /// Error - a warning escalated by `--deny-warnings`
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Where a diagnostic was raised
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// File identifier as passed to the engine
    pub file: String,

    /// Optional line number (1-indexed)
    pub line: Option<usize>,
}

impl Location {
    /// Create a new location with just a file identifier
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            line: None,
        }
    }

    /// Create a location with file and line number
    pub fn with_line(file: impl Into<String>, line: usize) -> Self {
        Self {
            file: file.into(),
            line: Some(line),
        }
    }
}

/// A diagnostic message with structured metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Stable diagnostic code
    pub code: DiagnosticCode,

    /// Severity level
    pub severity: Severity,

    /// Human-readable message
    pub message: String,

    /// Source location (best-effort)
    pub location: Option<Location>,

    /// Expected value (for count diagnostics)
    pub expected: Option<String>,

    /// Actual value (for count diagnostics)
    pub actual: Option<String>,

    /// Competing candidates: conflicting originals or matching patterns
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub candidates: Vec<String>,
}

impl Diagnostic {
    /// Create a new diagnostic with minimal fields
    pub fn new(code: DiagnosticCode, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            code,
            severity,
            message: message.into(),
            location: None,
            expected: None,
            actual: None,
            candidates: Vec::new(),
        }
    }

    /// Shorthand for a warning, the severity every engine anomaly uses
    pub fn warn(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self::new(code, Severity::Warn, message)
    }

    /// Set the location
    pub fn with_location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    /// Set expected/actual values
    pub fn with_comparison(mut self, expected: impl Into<String>, actual: impl Into<String>) -> Self {
        self.expected = Some(expected.into());
        self.actual = Some(actual.into());
        self
    }

    /// Set the competing candidates
    pub fn with_candidates(mut self, candidates: Vec<String>) -> Self {
        self.candidates = candidates;
        self
    }
}
