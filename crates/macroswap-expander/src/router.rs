//! Filename-based dispatch to expanders
//!
//! Patterns use shell globbing (`*`, `?`, `[abc]`, `[!abc]`) against the whole file
//! identifier. Matching is case-sensitive and `*` also crosses `/`.

use glob::Pattern;
use macroswap_core::{Diagnostic, DiagnosticCode, Location, TieBreakConfig};
use std::sync::Arc;
use tracing::warn;

use crate::expander::Expander;
use crate::session::ExpansionSession;

/// Which route wins when several patterns match one file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TieBreak {
    /// Earliest registered pattern wins
    #[default]
    FirstRegistered,

    /// Latest registered pattern wins
    LastRegistered,
}

impl From<TieBreakConfig> for TieBreak {
    fn from(config: TieBreakConfig) -> Self {
        match config {
            TieBreakConfig::First => Self::FirstRegistered,
            TieBreakConfig::Last => Self::LastRegistered,
        }
    }
}

/// Routing errors
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error("Invalid glob pattern '{pattern}': {message}")]
    InvalidGlob { pattern: String, message: String },
}

struct Route {
    pattern: Pattern,
    expander: Arc<Expander>,
}

/// Outcome of routing one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingDecision {
    /// Pattern that won
    pub pattern: String,

    /// Name of the expander behind it
    pub expander: String,

    /// Every pattern that matched, in registration order
    pub matches: Vec<String>,
}

impl RoutingDecision {
    pub fn is_ambiguous(&self) -> bool {
        self.matches.len() > 1
    }
}

/// Ordered (glob pattern, expander) table
#[derive(Default)]
pub struct Router {
    routes: Vec<Route>,
    tie_break: TieBreak,
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("routes", &self.routes().collect::<Vec<_>>())
            .field("tie_break", &self.tie_break)
            .finish()
    }
}

impl Router {
    pub fn new(tie_break: TieBreak) -> Self {
        Self {
            routes: Vec::new(),
            tie_break,
        }
    }

    /// Register a route (builder style)
    pub fn route(mut self, pattern: &str, expander: Arc<Expander>) -> Result<Self, RouterError> {
        self.add_route(pattern, expander)?;
        Ok(self)
    }

    /// Register a route. One expander may back several patterns.
    pub fn add_route(&mut self, pattern: &str, expander: Arc<Expander>) -> Result<(), RouterError> {
        let pattern = Pattern::new(pattern).map_err(|e| RouterError::InvalidGlob {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;
        self.routes.push(Route { pattern, expander });
        Ok(())
    }

    pub fn tie_break(&self) -> TieBreak {
        self.tie_break
    }

    /// Registered (pattern, expander name) pairs in registration order
    pub fn routes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.routes
            .iter()
            .map(|route| (route.pattern.as_str(), route.expander.name()))
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Indices of every matching route plus the winning one
    fn select(&self, file_id: &str) -> Option<(usize, Vec<usize>)> {
        let matches: Vec<usize> = self
            .routes
            .iter()
            .enumerate()
            .filter(|(_, route)| route.pattern.matches(file_id))
            .map(|(index, _)| index)
            .collect();

        let chosen = match self.tie_break {
            TieBreak::FirstRegistered => matches.first().copied(),
            TieBreak::LastRegistered => matches.last().copied(),
        }?;

        Some((chosen, matches))
    }

    fn decision(&self, chosen: usize, matches: &[usize]) -> RoutingDecision {
        RoutingDecision {
            pattern: self.routes[chosen].pattern.as_str().to_string(),
            expander: self.routes[chosen].expander.name().to_string(),
            matches: matches
                .iter()
                .map(|&index| self.routes[index].pattern.as_str().to_string())
                .collect(),
        }
    }

    /// Route a file without logging anything
    pub fn explain(&self, file_id: &str) -> Option<RoutingDecision> {
        self.select(file_id)
            .map(|(chosen, matches)| self.decision(chosen, &matches))
    }

    /// Whether any pattern matches the file
    pub fn has_route(&self, file_id: &str) -> bool {
        self.routes.iter().any(|route| route.pattern.matches(file_id))
    }

    fn choose(&self, file_id: &str) -> Option<(&Arc<Expander>, Option<RoutingDecision>)> {
        let (chosen, matches) = self.select(file_id)?;

        let ambiguity = if matches.len() > 1 {
            let decision = self.decision(chosen, &matches);
            warn!(
                file = file_id,
                "File name {} matches multiple patterns {:?}. Choosing '{}' ({:?}).",
                file_id,
                decision.matches,
                decision.pattern,
                self.tie_break
            );
            Some(decision)
        } else {
            None
        };

        Some((&self.routes[chosen].expander, ambiguity))
    }

    /// The expander responsible for a file, if any.
    ///
    /// Several matching patterns log a warning and resolve through the tie-break.
    pub fn choose_expander(&self, file_id: &str) -> Option<&Arc<Expander>> {
        self.choose(file_id).map(|(expander, _)| expander)
    }

    /// Expand with the routed expander; unrouted files pass through untouched
    pub fn expand(&self, session: &mut ExpansionSession, file_id: &str, text: &str) -> String {
        let Some((expander, ambiguity)) = self.choose(file_id) else {
            return text.to_string();
        };

        if let Some(decision) = ambiguity {
            session.record_diagnostic(
                file_id,
                Diagnostic::warn(
                    DiagnosticCode::RouteAmbiguous,
                    format!(
                        "File name matches {} patterns; using '{}'",
                        decision.matches.len(),
                        decision.pattern
                    ),
                )
                .with_location(Location::new(file_id))
                .with_candidates(decision.matches),
            );
        }

        expander.expand(session, file_id, text)
    }

    /// Un-expand with the routed expander; unrouted files pass through untouched
    pub fn un_expand(&self, session: &mut ExpansionSession, file_id: &str, text: &str) -> String {
        match self.choose_expander(file_id) {
            Some(expander) => expander.un_expand(session, file_id, text),
            None => text.to_string(),
        }
    }
}
