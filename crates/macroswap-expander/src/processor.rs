//! Whole-directory pre- and post-processing
//!
//! Mirrors an input tree into an output tree, expanding (before translation) or
//! un-expanding (after translation) every routed file on the way.

use macroswap_core::{Config, ProcessingConfig};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::factory::BuildError;
use crate::router::Router;
use crate::session::ExpansionSession;

/// Directory processing errors
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("Input is not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("IO error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> ProcessError + '_ {
    move |source| ProcessError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Counters for one directory pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessStats {
    /// Regular files found under the input directory
    pub files_seen: usize,

    /// Files handed to an expander
    pub files_transformed: usize,

    /// Files copied byte-for-byte (skipped extension or not UTF-8)
    pub files_copied: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Expand,
    UnExpand,
}

/// Runs a [`Router`] over directory trees
#[derive(Debug)]
pub struct MacroProcessor {
    router: Router,
    skip_extensions: Vec<String>,
}

impl MacroProcessor {
    /// Processor with the default skip list (`zip`, `csv`, `json`)
    pub fn new(router: Router) -> Self {
        Self {
            router,
            skip_extensions: ProcessingConfig::default().skip_extensions,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, BuildError> {
        Ok(Self {
            router: Router::from_config(config)?,
            skip_extensions: config.processing.skip_extensions.clone(),
        })
    }

    /// Replace the list of extensions copied verbatim
    pub fn with_skip_extensions(mut self, extensions: Vec<String>) -> Self {
        self.skip_extensions = extensions;
        self
    }

    /// Expand every routed file of `input_dir` into `output_dir`
    pub fn preprocess(
        &self,
        session: &mut ExpansionSession,
        input_dir: &Path,
        output_dir: &Path,
    ) -> Result<ProcessStats, ProcessError> {
        self.process(Stage::Expand, session, input_dir, output_dir)
    }

    /// Un-expand every routed file of `input_dir` into `output_dir`
    pub fn postprocess(
        &self,
        session: &mut ExpansionSession,
        input_dir: &Path,
        output_dir: &Path,
    ) -> Result<ProcessStats, ProcessError> {
        self.process(Stage::UnExpand, session, input_dir, output_dir)
    }

    fn is_skipped(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| self.skip_extensions.iter().any(|skip| skip.eq_ignore_ascii_case(ext)))
            .unwrap_or(false)
    }

    fn process(
        &self,
        stage: Stage,
        session: &mut ExpansionSession,
        input_dir: &Path,
        output_dir: &Path,
    ) -> Result<ProcessStats, ProcessError> {
        if !input_dir.is_dir() {
            return Err(ProcessError::NotADirectory(input_dir.to_path_buf()));
        }

        std::fs::create_dir_all(output_dir).map_err(io_error(output_dir))?;
        let input_root = input_dir.canonicalize().map_err(io_error(input_dir))?;
        let output_root = output_dir.canonicalize().map_err(io_error(output_dir))?;

        info!(
            input = %input_root.display(),
            output = %output_root.display(),
            ?stage,
            "Processing directory"
        );

        let mut stats = ProcessStats::default();

        // The output tree may live inside the input tree
        let walker = WalkDir::new(&input_root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| entry.path() != output_root.as_path());

        for entry in walker {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }

            let Ok(relative) = entry.path().strip_prefix(&input_root) else {
                continue;
            };
            let file_id = to_file_id(relative);
            let target = output_root.join(relative);

            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent).map_err(io_error(parent))?;
            }

            stats.files_seen += 1;

            if self.is_skipped(relative) {
                debug!(file = %file_id, "Copying file with skipped extension");
                std::fs::copy(entry.path(), &target).map_err(io_error(entry.path()))?;
                stats.files_copied += 1;
                continue;
            }

            let bytes = std::fs::read(entry.path()).map_err(io_error(entry.path()))?;
            let text = match String::from_utf8(bytes) {
                Ok(text) => text,
                Err(e) => {
                    debug!(file = %file_id, "Copying file that is not UTF-8");
                    std::fs::write(&target, e.into_bytes()).map_err(io_error(&target))?;
                    stats.files_copied += 1;
                    continue;
                }
            };

            if self.router.has_route(&file_id) {
                stats.files_transformed += 1;
            }

            let output = match stage {
                Stage::Expand => self.router.expand(session, &file_id, &text),
                Stage::UnExpand => self.router.un_expand(session, &file_id, &text),
            };

            std::fs::write(&target, output).map_err(io_error(&target))?;
        }

        info!(
            seen = stats.files_seen,
            transformed = stats.files_transformed,
            copied = stats.files_copied,
            "Finished processing directory"
        );

        Ok(stats)
    }
}

/// Relative path with `/` separators on every platform
fn to_file_id(relative: &Path) -> String {
    relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expander::Expander;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn processor() -> MacroProcessor {
        let expander = Arc::new(
            Expander::builder(r"\$\{(\w+)\}")
                .mapping([("foo", "BAR")])
                .build()
                .unwrap(),
        );
        MacroProcessor::new(Router::default().route("*.sql", expander).unwrap())
    }

    #[test]
    fn file_ids_use_forward_slashes() {
        let relative: PathBuf = ["nested", "deeper", "q.sql"].iter().collect();
        assert_eq!(to_file_id(&relative), "nested/deeper/q.sql");
    }

    #[test]
    fn rejects_missing_input() {
        let dir = tempfile::tempdir().unwrap();
        let err = processor()
            .preprocess(&mut ExpansionSession::new(), &dir.path().join("missing"), dir.path())
            .unwrap_err();
        assert!(matches!(err, ProcessError::NotADirectory(_)));
    }

    #[test]
    fn output_inside_input_is_not_walked() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("q.sql"), "select ${foo}").unwrap();
        let output = dir.path().join(".tmp_processed");

        let processor = processor();
        let mut session = ExpansionSession::new();
        let first = processor.preprocess(&mut session, dir.path(), &output).unwrap();
        let second = processor.preprocess(&mut session, dir.path(), &output).unwrap();

        assert_eq!(first.files_seen, 1);
        assert_eq!(second.files_seen, 1);
        assert_eq!(std::fs::read_to_string(output.join("q.sql")).unwrap(), "select BAR");
    }

    #[test]
    fn skipped_and_binary_files_are_copied() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        std::fs::write(input.path().join("data.csv"), "${foo}").unwrap();
        std::fs::write(input.path().join("blob.sql"), [0xff, 0xfe, 0x00]).unwrap();

        let stats = processor()
            .preprocess(&mut ExpansionSession::new(), input.path(), output.path())
            .unwrap();

        assert_eq!(stats.files_copied, 2);
        assert_eq!(stats.files_transformed, 0);
        assert_eq!(std::fs::read_to_string(output.path().join("data.csv")).unwrap(), "${foo}");
        assert_eq!(std::fs::read(output.path().join("blob.sql")).unwrap(), vec![0xff, 0xfe, 0x00]);
    }

    #[test]
    fn custom_skip_list_replaces_the_default() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        std::fs::write(input.path().join("q.sql"), "select ${foo}").unwrap();
        std::fs::write(input.path().join("data.csv"), "${foo}").unwrap();

        let stats = processor()
            .with_skip_extensions(vec!["SQL".to_string()])
            .preprocess(&mut ExpansionSession::new(), input.path(), output.path())
            .unwrap();

        assert_eq!(stats.files_copied, 1);
        assert_eq!(std::fs::read_to_string(output.path().join("q.sql")).unwrap(), "select ${foo}");
        // csv is no longer skipped, but no route matches it either
        assert_eq!(std::fs::read_to_string(output.path().join("data.csv")).unwrap(), "${foo}");
    }
}
