//! Configuration schema (macroswap.toml)

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

/// Which expander wins when a file name matches several routing patterns
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TieBreakConfig {
    /// The pattern registered first wins
    #[default]
    First,

    /// The pattern registered last wins
    Last,
}

/// Routing behaviour
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Tie-break for ambiguous routes
    #[serde(default)]
    pub tie_break: TieBreakConfig,
}

/// Directory processing behaviour
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// File extensions copied verbatim, never routed through an expander
    #[serde(default = "default_skip_extensions")]
    pub skip_extensions: Vec<String>,
}

fn default_skip_extensions() -> Vec<String> {
    vec!["zip".to_string(), "csv".to_string(), "json".to_string()]
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            skip_extensions: default_skip_extensions(),
        }
    }
}

fn default_param_prefix() -> String {
    "PARAM_".to_string()
}

fn default_param_suffix() -> String {
    "_PARAM".to_string()
}

fn default_true() -> bool {
    true
}

fn default_open() -> String {
    "{".to_string()
}

fn default_close() -> String {
    "}".to_string()
}

/// Generator used for macro names missing from the static mapping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum GeneratorConfig {
    /// `prefix + name + suffix`, e.g. `PARAM_customer_id_PARAM`
    Param {
        #[serde(default = "default_param_prefix")]
        prefix: String,
        #[serde(default = "default_param_suffix")]
        suffix: String,
        #[serde(default = "default_true")]
        lowercase: bool,
    },

    /// Free-form template where `{name}` is replaced by the macro name
    Template { template: String },
}

/// Un-generator used to render generated values back during un-expansion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum UnGeneratorConfig {
    /// Recover `open + inner + close` from values shaped `prefix + inner + suffix`
    Param {
        #[serde(default = "default_param_prefix")]
        prefix: String,
        #[serde(default = "default_param_suffix")]
        suffix: String,
        #[serde(default = "default_open")]
        open: String,
        #[serde(default = "default_close")]
        close: String,
    },
}

/// One macro syntax family and the files it applies to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpanderConfig {
    /// Name used in logs and diagnostics
    pub name: String,

    /// Regex with exactly one capture group yielding the macro name (matched case-insensitively)
    pub pattern: String,

    /// Glob patterns of the files routed to this expander
    pub files: Vec<String>,

    /// Static macro name -> value mapping
    #[serde(default)]
    pub mapping: BTreeMap<String, String>,

    /// Optional TOML file holding more mapping entries (relative to the config file)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapping_file: Option<PathBuf>,

    /// Fallback for names missing from the mapping
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generator: Option<GeneratorConfig>,

    /// Custom rendering of values during un-expansion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub un_generator: Option<UnGeneratorConfig>,

    /// Warn when a value is restored a different number of times than it was produced
    #[serde(default)]
    pub strict_counts: bool,
}

impl ExpanderConfig {
    /// Merge `mapping_file` (if any) with the inline mapping; inline entries win.
    ///
    /// Returns `None` when neither source contributes an entry.
    pub fn resolved_mapping(&self, project_root: &Path) -> Result<Option<BTreeMap<String, String>>, ConfigError> {
        let mut mapping = BTreeMap::new();

        if let Some(file) = &self.mapping_file {
            let path = if file.is_relative() {
                project_root.join(file)
            } else {
                file.clone()
            };

            let contents = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::MappingFile {
                    path: path.clone(),
                    message: e.to_string(),
                })?;

            let from_file: BTreeMap<String, String> = toml::from_str(&contents)
                .map_err(|e| ConfigError::MappingFile {
                    path: path.clone(),
                    message: e.to_string(),
                })?;

            mapping.extend(from_file);
        }

        mapping.extend(self.mapping.iter().map(|(k, v)| (k.clone(), v.clone())));

        if mapping.is_empty() {
            Ok(None)
        } else {
            Ok(Some(mapping))
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Routing behaviour
    #[serde(default)]
    pub routing: RoutingConfig,

    /// Directory processing behaviour
    #[serde(default)]
    pub processing: ProcessingConfig,

    /// Expanders in registration order
    #[serde(default)]
    pub expanders: Vec<ExpanderConfig>,

    /// Directory of the config file (for resolving mapping files)
    #[serde(skip)]
    pub project_root: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            routing: RoutingConfig::default(),
            processing: ProcessingConfig::default(),
            expanders: Vec::new(),
            project_root: std::env::current_dir().unwrap_or_default(),
        }
    }
}

impl Config {
    /// Load config from TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        let mut config = Self::from_toml(&contents)?;

        // Set project root to parent of config file
        if let Some(parent) = path.parent() {
            config.project_root = parent.to_path_buf();
        }

        Ok(config)
    }

    /// Load config from TOML string
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(toml)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Structural checks that do not need the regex engine
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut names = HashSet::new();

        for expander in &self.expanders {
            if !names.insert(expander.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate expander name '{}'",
                    expander.name
                )));
            }
            if expander.pattern.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "expander '{}' has an empty pattern",
                    expander.name
                )));
            }
            if expander.files.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "expander '{}' is not routed to any files",
                    expander.name
                )));
            }
        }

        Ok(())
    }
}

/// Config error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid config: {0}")]
    Invalid(String),

    #[error("Mapping file {}: {message}", path.display())]
    MappingFile { path: PathBuf, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[routing]
tie_break = "last"

[[expanders]]
name = "dollar-brace"
pattern = '\$\{(\w+)\}'
files = ["*.sql", "*.bteq"]
generator = { kind = "param" }
un_generator = { kind = "param", open = "${" }

[expanders.mapping]
foo = "BAR"
"#;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.routing.tie_break, TieBreakConfig::First);
        assert_eq!(config.processing.skip_extensions, vec!["zip", "csv", "json"]);
        assert!(config.expanders.is_empty());
    }

    #[test]
    fn parse_sample() {
        let config = Config::from_toml(SAMPLE).unwrap();
        assert_eq!(config.routing.tie_break, TieBreakConfig::Last);

        let expander = &config.expanders[0];
        assert_eq!(expander.files, vec!["*.sql", "*.bteq"]);
        assert_eq!(expander.mapping.get("foo").map(String::as_str), Some("BAR"));
        assert_eq!(
            expander.generator,
            Some(GeneratorConfig::Param {
                prefix: "PARAM_".to_string(),
                suffix: "_PARAM".to_string(),
                lowercase: true,
            })
        );
        assert_eq!(
            expander.un_generator,
            Some(UnGeneratorConfig::Param {
                prefix: "PARAM_".to_string(),
                suffix: "_PARAM".to_string(),
                open: "${".to_string(),
                close: "}".to_string(),
            })
        );
        assert!(!expander.strict_counts);
    }

    #[test]
    fn duplicate_names_rejected() {
        let toml = r#"
[[expanders]]
name = "a"
pattern = '\$\{(\w+)\}'
files = ["*.sql"]

[[expanders]]
name = "a"
pattern = '%(\w+)%'
files = ["*.bteq"]
"#;
        let err = Config::from_toml(toml).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn expander_without_files_rejected() {
        let toml = r#"
[[expanders]]
name = "a"
pattern = '\$\{(\w+)\}'
files = []
"#;
        assert!(Config::from_toml(toml).is_err());
    }

    #[test]
    fn mapping_file_merged_under_inline_entries() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("macros.toml"), "foo = \"FROM_FILE\"\nbaz = \"QUX\"\n").unwrap();

        let expander = ExpanderConfig {
            name: "a".to_string(),
            pattern: r"\$\{(\w+)\}".to_string(),
            files: vec!["*.sql".to_string()],
            mapping: BTreeMap::from([("foo".to_string(), "INLINE".to_string())]),
            mapping_file: Some(PathBuf::from("macros.toml")),
            generator: None,
            un_generator: None,
            strict_counts: false,
        };

        let mapping = expander.resolved_mapping(dir.path()).unwrap().unwrap();
        assert_eq!(mapping["foo"], "INLINE");
        assert_eq!(mapping["baz"], "QUX");
    }

    #[test]
    fn empty_mapping_resolves_to_none() {
        let config = Config::from_toml(SAMPLE).unwrap();
        let mut expander = config.expanders[0].clone();
        expander.mapping.clear();
        assert_eq!(expander.resolved_mapping(Path::new(".")).unwrap(), None);
    }

    #[test]
    fn config_toml_roundtrip() {
        let config = Config::from_toml(SAMPLE).unwrap();
        let toml = toml::to_string(&config).unwrap();
        let parsed = Config::from_toml(&toml).unwrap();
        assert_eq!(config.expanders, parsed.expanders);
    }
}
