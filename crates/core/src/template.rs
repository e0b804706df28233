//! Prompt templates with `{{name}}` placeholders.

use regex_lite::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;
use tracing::debug;

use crate::error::{Error, Result};

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_.]*)\s*\}\}").unwrap()
});

/// Substitutes named variables into a template.
pub trait TemplateRenderer: Send + Sync {
    fn render(&self, template: &str, variables: &BTreeMap<String, String>) -> Result<String>;
}

/// The built-in renderer.
///
/// Every placeholder must have a binding; an unresolved placeholder is a
/// configuration error rather than silently rendered text.
#[derive(Debug, Clone, Copy, Default)]
pub struct PromptTemplate;

impl PromptTemplate {
    /// Placeholder names in order of first appearance.
    pub fn variables(template: &str) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for caps in PLACEHOLDER.captures_iter(template) {
            let name = caps[1].to_string();
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }
}

impl TemplateRenderer for PromptTemplate {
    fn render(&self, template: &str, variables: &BTreeMap<String, String>) -> Result<String> {
        if let Some(missing) = Self::variables(template)
            .into_iter()
            .find(|name| !variables.contains_key(name))
        {
            debug!(variable = %missing, "Template variable has no binding");
            return Err(Error::config(format!(
                "Value for the variable '{missing}' is missing"
            )));
        }

        Ok(PLACEHOLDER
            .replace_all(template, |caps: &regex_lite::Captures<'_>| {
                variables.get(&caps[1]).cloned().unwrap_or_default()
            })
            .into_owned())
    }
}
