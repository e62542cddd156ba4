//! Building expanders and routers from `macroswap.toml`

use macroswap_core::{Config, ConfigError, ExpanderConfig, GeneratorConfig, UnGeneratorConfig};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::convention::{ParamConvention, TemplateConvention};
use crate::expander::{Expander, ExpanderError};
use crate::router::{Router, RouterError};

/// Errors turning configuration into runtime objects
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Expander '{name}': {source}")]
    Expander {
        name: String,
        #[source]
        source: ExpanderError,
    },

    #[error("Expander '{name}': {source}")]
    Route {
        name: String,
        #[source]
        source: RouterError,
    },
}

impl Expander {
    /// Build an expander from its config section
    pub fn from_config(config: &ExpanderConfig, project_root: &Path) -> Result<Self, BuildError> {
        let mut builder = Expander::builder(config.pattern.as_str())
            .name(config.name.as_str())
            .strict_counts(config.strict_counts);

        if let Some(mapping) = config.resolved_mapping(project_root)? {
            debug!(expander = %config.name, entries = mapping.len(), "Loaded macro mapping");
            builder = builder.mapping(mapping);
        }

        builder = match &config.generator {
            Some(GeneratorConfig::Param { prefix, suffix, lowercase }) => builder.generator(
                ParamConvention::new(prefix.as_str(), suffix.as_str()).with_lowercase(*lowercase),
            ),
            Some(GeneratorConfig::Template { template }) => {
                builder.generator(TemplateConvention::new(template.as_str()))
            }
            None => builder,
        };

        builder = match &config.un_generator {
            Some(UnGeneratorConfig::Param { prefix, suffix, open, close }) => builder.un_generator(
                ParamConvention::new(prefix.as_str(), suffix.as_str())
                    .with_wrapping(open.as_str(), close.as_str()),
            ),
            None => builder,
        };

        builder.build().map_err(|source| BuildError::Expander {
            name: config.name.clone(),
            source,
        })
    }
}

impl Router {
    /// Build the routing table: one expander per section, one route per file pattern,
    /// in the order they appear in the config.
    pub fn from_config(config: &Config) -> Result<Self, BuildError> {
        let mut router = Router::new(config.routing.tie_break.into());

        for section in &config.expanders {
            let expander = Arc::new(Expander::from_config(section, &config.project_root)?);
            for pattern in &section.files {
                router
                    .add_route(pattern, Arc::clone(&expander))
                    .map_err(|source| BuildError::Route {
                        name: section.name.clone(),
                        source,
                    })?;
            }
        }

        Ok(router)
    }
}
