//! Naming conventions for generated values
//!
//! A convention turns a macro name into a token that survives translation
//! (`customer_id` -> `PARAM_customer_id_PARAM`) and, when used as an un-generator,
//! turns such a token back into a macro reference.

use crate::expander::{MacroGenerator, MacroUnGenerator};

/// `prefix + name + suffix` tokens, e.g. `PARAM_customer_id_PARAM`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamConvention {
    pub prefix: String,
    pub suffix: String,

    /// Lowercase macro names before wrapping them
    pub lowercase: bool,

    /// Text placed before the recovered name during un-expansion
    pub open: String,

    /// Text placed after the recovered name during un-expansion
    pub close: String,
}

impl Default for ParamConvention {
    /// `PARAM_name_PARAM`, restored as `{name}`
    fn default() -> Self {
        Self {
            prefix: "PARAM_".to_string(),
            suffix: "_PARAM".to_string(),
            lowercase: true,
            open: "{".to_string(),
            close: "}".to_string(),
        }
    }
}

impl ParamConvention {
    pub fn new(prefix: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            suffix: suffix.into(),
            ..Self::default()
        }
    }

    pub fn with_lowercase(mut self, lowercase: bool) -> Self {
        self.lowercase = lowercase;
        self
    }

    /// Set what surrounds a recovered name, e.g. `("${", "}")`
    pub fn with_wrapping(mut self, open: impl Into<String>, close: impl Into<String>) -> Self {
        self.open = open.into();
        self.close = close.into();
        self
    }

    /// The inner name of a value following this convention
    pub fn extract<'a>(&self, value: &'a str) -> Option<&'a str> {
        value
            .strip_prefix(self.prefix.as_str())?
            .strip_suffix(self.suffix.as_str())
            .filter(|inner| !inner.is_empty())
    }
}

impl MacroGenerator for ParamConvention {
    fn generate(&self, _file_id: &str, macro_name: &str) -> String {
        let name = if self.lowercase {
            macro_name.to_lowercase()
        } else {
            macro_name.to_string()
        };
        format!("{}{}{}", self.prefix, name, self.suffix)
    }
}

impl MacroUnGenerator for ParamConvention {
    /// Values that do not follow the convention fall back to the matched reference
    fn un_generate(&self, _file_id: &str, value: &str, original: &str) -> String {
        match self.extract(value) {
            Some(inner) => format!("{}{}{}", self.open, inner, self.close),
            None => original.to_string(),
        }
    }
}

/// Free-form generator: every `{name}` in the template becomes the macro name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateConvention {
    pub template: String,
}

impl TemplateConvention {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }
}

impl MacroGenerator for TemplateConvention {
    fn generate(&self, _file_id: &str, macro_name: &str) -> String {
        self.template.replace("{name}", macro_name)
    }
}
