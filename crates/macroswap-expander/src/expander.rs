//! Macro expansion and un-expansion
//!
//! An [`Expander`] owns one macro syntax (a regex with a single capture group for the
//! macro name) and the policy for turning a macro name into a replacement value.
//! Expansion swaps every reference for its value and records how each value was
//! produced in the [`ExpansionSession`]; un-expansion uses that record to put the
//! references back into text that went through a translator.
//!
//! Nothing here fails at run time: unresolved macros, ambiguous values and count
//! mismatches are logged with `tracing` and recorded as diagnostics on the file.

use macroswap_core::{Diagnostic, DiagnosticCode, Location};
use regex::{Captures, Regex, RegexBuilder};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::session::{ExpansionSession, FileState};

/// Produces a value for a macro name missing from the static mapping
pub trait MacroGenerator: Send + Sync {
    fn generate(&self, file_id: &str, macro_name: &str) -> String;
}

impl<F> MacroGenerator for F
where
    F: Fn(&str, &str) -> String + Send + Sync,
{
    fn generate(&self, file_id: &str, macro_name: &str) -> String {
        self(file_id, macro_name)
    }
}

/// Renders a generated value back into text during un-expansion.
///
/// Receives the generated value and the matched reference chosen for it.
pub trait MacroUnGenerator: Send + Sync {
    fn un_generate(&self, file_id: &str, value: &str, original: &str) -> String;
}

impl<F> MacroUnGenerator for F
where
    F: Fn(&str, &str, &str) -> String + Send + Sync,
{
    fn un_generate(&self, file_id: &str, value: &str, original: &str) -> String {
        self(file_id, value, original)
    }
}

/// Expander construction errors
#[derive(Debug, thiserror::Error)]
pub enum ExpanderError {
    #[error("Invalid macro pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("Macro pattern '{pattern}' must have exactly one capture group, found {found}")]
    CaptureGroups { pattern: String, found: usize },
}

/// Builder for [`Expander`]
pub struct ExpanderBuilder {
    name: String,
    pattern: String,
    mapping: Option<HashMap<String, String>>,
    generator: Option<Arc<dyn MacroGenerator>>,
    un_generator: Option<Arc<dyn MacroUnGenerator>>,
    strict_counts: bool,
}

impl ExpanderBuilder {
    /// Name used in logs and diagnostics
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Static macro name -> value mapping
    pub fn mapping<I, K, V>(mut self, mapping: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.mapping = Some(
            mapping
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }

    pub fn generator(mut self, generator: impl MacroGenerator + 'static) -> Self {
        self.generator = Some(Arc::new(generator));
        self
    }

    pub fn un_generator(mut self, un_generator: impl MacroUnGenerator + 'static) -> Self {
        self.un_generator = Some(Arc::new(un_generator));
        self
    }

    /// Warn when a value is restored a different number of times than it was produced
    pub fn strict_counts(mut self, strict: bool) -> Self {
        self.strict_counts = strict;
        self
    }

    /// Compile the pattern (case-insensitive) and check its capture groups
    pub fn build(self) -> Result<Expander, ExpanderError> {
        let pattern = RegexBuilder::new(&self.pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| ExpanderError::InvalidPattern {
                pattern: self.pattern.clone(),
                message: e.to_string(),
            })?;

        // captures_len counts the implicit whole-match group
        let found = pattern.captures_len() - 1;
        if found != 1 {
            return Err(ExpanderError::CaptureGroups {
                pattern: self.pattern,
                found,
            });
        }

        Ok(Expander {
            name: self.name,
            pattern,
            mapping: self.mapping,
            generator: self.generator,
            un_generator: self.un_generator,
            strict_counts: self.strict_counts,
        })
    }
}

/// One macro syntax family and its resolution policy
pub struct Expander {
    name: String,
    pattern: Regex,
    mapping: Option<HashMap<String, String>>,
    generator: Option<Arc<dyn MacroGenerator>>,
    un_generator: Option<Arc<dyn MacroUnGenerator>>,
    strict_counts: bool,
}

impl std::fmt::Debug for Expander {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Expander")
            .field("name", &self.name)
            .field("pattern", &self.pattern.as_str())
            .field("mapping_entries", &self.mapping.as_ref().map_or(0, HashMap::len))
            .field("generator", &self.generator.is_some())
            .field("un_generator", &self.un_generator.is_some())
            .field("strict_counts", &self.strict_counts)
            .finish()
    }
}

/// One value scheduled for restoration
struct Restoration {
    value: String,
    recovered: String,
    expected: usize,
}

impl Expander {
    /// Start building an expander for a macro pattern
    pub fn builder(pattern: impl Into<String>) -> ExpanderBuilder {
        ExpanderBuilder {
            name: "default".to_string(),
            pattern: pattern.into(),
            mapping: None,
            generator: None,
            un_generator: None,
            strict_counts: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The macro pattern as written
    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    pub fn strict_counts(&self) -> bool {
        self.strict_counts
    }

    /// Replace every macro reference in `text`, recording the substitutions in `session`.
    ///
    /// A file with no references leaves no trace in the session.
    pub fn expand(&self, session: &mut ExpansionSession, file_id: &str, text: &str) -> String {
        let mut state = session.take_file(file_id).unwrap_or_default();
        let expanded = self.expand_file(&mut state, file_id, text);
        session.insert_file(file_id, state);
        expanded
    }

    /// Restore the references recorded for `file_id` in `text`.
    ///
    /// Text for a file that was never expanded comes back unchanged.
    pub fn un_expand(&self, session: &mut ExpansionSession, file_id: &str, text: &str) -> String {
        match session.file_mut(file_id) {
            Some(state) => self.un_expand_file(state, file_id, text),
            None => text.to_string(),
        }
    }

    /// [`Expander::expand`] against a single detached file state
    pub fn expand_file(&self, state: &mut FileState, file_id: &str, text: &str) -> String {
        // Matches arrive in ascending order, so lines are counted incrementally
        let mut scanned = 0;
        let mut line = 1;

        self.pattern
            .replace_all(text, |caps: &Captures<'_>| {
                let Some(full) = caps.get(0) else {
                    return String::new();
                };
                line += text[scanned..full.start()].matches('\n').count();
                scanned = full.start();

                let macro_name = caps.get(1).map_or("", |m| m.as_str());
                self.resolve(state, file_id, macro_name, full.as_str(), line)
            })
            .into_owned()
    }

    fn resolve(
        &self,
        state: &mut FileState,
        file_id: &str,
        macro_name: &str,
        full_match: &str,
        line: usize,
    ) -> String {
        if let Some(value) = self.mapping.as_ref().and_then(|m| m.get(macro_name)) {
            state.record(value, full_match);
            return value.clone();
        }

        if let Some(generator) = &self.generator {
            state.mark_unmapped(macro_name);
            let value = generator.generate(file_id, macro_name);
            state.record(&value, full_match);
            return value;
        }

        warn!(
            expander = %self.name,
            file = file_id,
            line,
            "Could not expand '{}': not present in the mapping and no generator configured",
            full_match
        );
        state.push_diagnostic(
            Diagnostic::warn(
                DiagnosticCode::MacroUnresolved,
                format!(
                    "Could not expand '{}': not present in the mapping and no generator configured",
                    full_match
                ),
            )
            .with_location(Location::with_line(file_id, line)),
        );

        // Identity: nothing to reverse, so the reverse index is left alone
        full_match.to_string()
    }

    /// [`Expander::un_expand`] against a single detached file state
    pub fn un_expand_file(&self, state: &mut FileState, file_id: &str, text: &str) -> String {
        if state.reverse.is_empty() {
            return text.to_string();
        }

        self.sanity_check(state, file_id);

        let mut plan = Vec::with_capacity(state.reverse.len());
        for (value, entry) in state.reverse.iter_mut() {
            if value.is_empty() {
                debug!(expander = %self.name, file = file_id, "Skipping empty generated value");
                continue;
            }
            let Some(original) = entry.take_original() else {
                debug!(
                    expander = %self.name,
                    file = file_id,
                    "Originals for '{}' already consumed",
                    value
                );
                continue;
            };
            let recovered = match &self.un_generator {
                Some(un_generator) => un_generator.un_generate(file_id, value, &original),
                None => original,
            };
            plan.push(Restoration {
                value: value.clone(),
                recovered,
                expected: entry.count,
            });
        }

        if plan.is_empty() {
            return text.to_string();
        }

        // Longest first so a value that contains another wins the alternation
        plan.sort_by(|a, b| {
            b.value
                .len()
                .cmp(&a.value.len())
                .then_with(|| a.value.cmp(&b.value))
        });

        let (restored, counts) = match Self::alternation(&plan) {
            Ok(matcher) => Self::restore_single_pass(&matcher, &plan, text),
            Err(e) => {
                warn!(
                    expander = %self.name,
                    file = file_id,
                    "Falling back to per-value un-expansion: {}",
                    e
                );
                Self::restore_per_value(&plan, text)
            }
        };

        for (restoration, actual) in plan.iter().zip(counts) {
            if actual == restoration.expected {
                continue;
            }
            if !self.strict_counts {
                debug!(
                    expander = %self.name,
                    file = file_id,
                    "'{}' restored {} time(s), expanded {} time(s)",
                    restoration.value,
                    actual,
                    restoration.expected
                );
                continue;
            }
            warn!(
                expander = %self.name,
                file = file_id,
                "The string '{}' was un-expanded to '{}' {} time(s), but was only the result of an expansion {} time(s)",
                restoration.value,
                restoration.recovered,
                actual,
                restoration.expected
            );
            state.push_diagnostic(
                Diagnostic::warn(
                    DiagnosticCode::UnexpandCountMismatch,
                    format!(
                        "'{}' was un-expanded to '{}' a different number of times than it was expanded",
                        restoration.value, restoration.recovered
                    ),
                )
                .with_location(Location::new(file_id))
                .with_comparison(restoration.expected.to_string(), actual.to_string()),
            );
        }

        restored
    }

    /// Warn about values that several distinct references expanded to
    fn sanity_check(&self, state: &mut FileState, file_id: &str) {
        let ambiguous: Vec<(String, Vec<String>)> = state
            .reverse
            .iter()
            .filter(|(_, entry)| entry.is_ambiguous())
            .map(|(value, entry)| (value.clone(), entry.originals.clone()))
            .collect();

        for (value, originals) in ambiguous {
            warn!(
                expander = %self.name,
                file = file_id,
                "The value '{}' was expanded from the following macros: {:?}. Un-expansion will not be accurate.",
                value,
                originals
            );
            state.push_diagnostic(
                Diagnostic::warn(
                    DiagnosticCode::MacroAmbiguousReversal,
                    format!(
                        "The value '{}' was expanded from {} different macros; un-expansion restores '{}' everywhere",
                        value,
                        originals.len(),
                        originals[0]
                    ),
                )
                .with_location(Location::new(file_id))
                .with_candidates(originals),
            );
        }
    }

    fn alternation(plan: &[Restoration]) -> Result<Regex, regex::Error> {
        let alternatives: Vec<String> = plan
            .iter()
            .map(|r| format!("({})", regex::escape(&r.value)))
            .collect();

        RegexBuilder::new(&alternatives.join("|"))
            .case_insensitive(true)
            .build()
    }

    /// Replace every planned value in one left-to-right scan.
    ///
    /// Recovered text is inserted literally and never re-scanned.
    fn restore_single_pass(matcher: &Regex, plan: &[Restoration], text: &str) -> (String, Vec<usize>) {
        let mut counts = vec![0usize; plan.len()];

        let restored = matcher
            .replace_all(text, |caps: &Captures<'_>| {
                let index = (1..caps.len()).find(|&group| caps.get(group).is_some());
                match index {
                    Some(group) => {
                        counts[group - 1] += 1;
                        plan[group - 1].recovered.clone()
                    }
                    None => caps[0].to_string(),
                }
            })
            .into_owned();

        (restored, counts)
    }

    fn restore_per_value(plan: &[Restoration], text: &str) -> (String, Vec<usize>) {
        let mut restored = text.to_string();
        let mut counts = Vec::with_capacity(plan.len());

        for restoration in plan {
            let matcher = RegexBuilder::new(&regex::escape(&restoration.value))
                .case_insensitive(true)
                .build();
            match matcher {
                Ok(matcher) => {
                    counts.push(matcher.find_iter(&restored).count());
                    restored = matcher
                        .replace_all(&restored, regex::NoExpand(&restoration.recovered))
                        .into_owned();
                }
                Err(_) => {
                    counts.push(restored.matches(restoration.value.as_str()).count());
                    restored = restored.replace(&restoration.value, &restoration.recovered);
                }
            }
        }

        (restored, counts)
    }
}
