//! Template expansion for configured values.
//!
//! Only the interpreter setting is expanded, and only when it contains
//! template markers.

use minijinja::{Environment, UndefinedBehavior};
use serde_json::Value;

use crate::error::{Error, Result};

/// Returns true if `s` contains Jinja2 expression or statement markers.
pub fn is_template(s: &str) -> bool {
    s.contains("{{") || s.contains("{%")
}

/// Expands templates against a variable context.
pub trait Templar: Send + Sync {
    /// Render `template` with `vars` as the context.
    fn render(&self, template: &str, vars: &Value) -> Result<String>;
}

/// [`Templar`] backed by minijinja with strict undefined handling.
pub struct JinjaTemplar {
    env: Environment<'static>,
}

impl JinjaTemplar {
    /// Create a templar.
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        Self { env }
    }
}

impl Default for JinjaTemplar {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for JinjaTemplar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JinjaTemplar").finish_non_exhaustive()
    }
}

impl Templar for JinjaTemplar {
    fn render(&self, template: &str, vars: &Value) -> Result<String> {
        self.env
            .render_str(template, vars)
            .map_err(|e| Error::Template {
                template: template.to_string(),
                message: e.to_string(),
            })
    }
}
