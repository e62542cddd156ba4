//! Reversible macro substitution for SQL-like scripts
//!
//! This crate handles:
//! - Expanding templated macro references into plain tokens before translation
//! - Restoring the original references in translated output (un-expansion)
//! - Routing files to the right expander by glob pattern
//! - Running both stages over whole directory trees

pub mod session;
pub mod expander;
pub mod convention;
pub mod router;
pub mod factory;
pub mod processor;

pub use session::{ExpansionSession, FileState, ReverseEntry, SessionError};
pub use expander::{Expander, ExpanderBuilder, ExpanderError, MacroGenerator, MacroUnGenerator};
pub use convention::{ParamConvention, TemplateConvention};
pub use router::{Router, RouterError, RoutingDecision, TieBreak};
pub use factory::BuildError;
pub use processor::{MacroProcessor, ProcessError, ProcessStats};
