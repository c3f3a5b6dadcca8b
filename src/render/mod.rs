//! Template rendering for stored email content.
//!
//! Subject, HTML and text bodies are rendered with `{{ variable }}`
//! interpolation against a JSON object. Content is inserted verbatim; no
//! HTML escaping is applied.
//!
//! # Example
//!
//! ```ignore
//! let renderer = TemplateRenderer::new(false);
//! let vars = json!({"name": "Ann"});
//!
//! assert_eq!(renderer.render("Hello {{name}}", Some(&vars))?, "Hello Ann");
//! assert_eq!(renderer.render("Hello {{name}}", None)?, "Hello {{name}}");
//! ```

use minijinja::{AutoEscape, Environment, ErrorKind, UndefinedBehavior};
use serde_json::Value;
use thiserror::Error;

use crate::metrics::RenderMetrics;

/// Rendering error type
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Invalid template: {0}")]
    InvalidTemplate(String),

    #[error("Template variables must be a JSON object, got {0}")]
    InvalidVariables(&'static str),

    #[error("Template rendering failed: {0}")]
    Render(String),
}

/// Result type for rendering
pub type TemplateResult<T> = Result<T, TemplateError>;

/// Renders template text against caller-supplied variables.
pub struct TemplateRenderer {
    env: Environment<'static>,
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::new(false)
    }
}

impl TemplateRenderer {
    /// With `strict_variables`, referencing a missing key is an error
    /// instead of rendering as empty.
    pub fn new(strict_variables: bool) -> Self {
        let mut env = Environment::new();
        env.set_auto_escape_callback(|_| AutoEscape::None);
        env.set_keep_trailing_newline(true);
        env.set_undefined_behavior(if strict_variables {
            UndefinedBehavior::Strict
        } else {
            UndefinedBehavior::Chainable
        });
        Self { env }
    }

    /// Render `source` with `variables`.
    ///
    /// Without variables (or with JSON `null`) the text is returned as-is
    /// and never parsed.
    pub fn render(&self, source: &str, variables: Option<&Value>) -> TemplateResult<String> {
        let variables = match variables {
            None | Some(Value::Null) => return Ok(source.to_string()),
            Some(v @ Value::Object(_)) => v,
            Some(other) => {
                RenderMetrics::record_error("variables");
                return Err(TemplateError::InvalidVariables(json_kind(other)));
            }
        };

        match self.env.render_str(source, variables) {
            Ok(rendered) => {
                RenderMetrics::record_rendered();
                Ok(rendered)
            }
            Err(e) if e.kind() == ErrorKind::SyntaxError => {
                RenderMetrics::record_error("syntax");
                tracing::debug!(error = %e, "Template failed to parse");
                Err(TemplateError::InvalidTemplate(e.to_string()))
            }
            Err(e) => {
                RenderMetrics::record_error("render");
                tracing::debug!(error = %e, "Template failed to render");
                Err(TemplateError::Render(e.to_string()))
            }
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_simple() {
        let renderer = TemplateRenderer::default();
        let vars = json!({"name": "Ann"});
        assert_eq!(
            renderer.render("Hello {{name}}", Some(&vars)).unwrap(),
            "Hello Ann"
        );
    }

    #[test]
    fn test_without_variables_returns_literal() {
        let renderer = TemplateRenderer::default();
        assert_eq!(
            renderer.render("Hello {{name}}", None).unwrap(),
            "Hello {{name}}"
        );
        // Not parsed either
        assert_eq!(renderer.render("{{ broken", None).unwrap(), "{{ broken");
        assert_eq!(
            renderer.render("Hi {{name}}", Some(&Value::Null)).unwrap(),
            "Hi {{name}}"
        );
    }

    #[test]
    fn test_render_nested_and_numbers() {
        let renderer = TemplateRenderer::default();
        let vars = json!({
            "user": {"name": "Ann", "orders": 3},
            "total": 12.5
        });
        assert_eq!(
            renderer
                .render("{{ user.name }} has {{ user.orders }} orders, {{ total }}", Some(&vars))
                .unwrap(),
            "Ann has 3 orders, 12.5"
        );
    }

    #[test]
    fn test_html_is_not_escaped() {
        let renderer = TemplateRenderer::default();
        let vars = json!({"link": "<a href=\"https://example.com\">here</a>"});
        assert_eq!(
            renderer.render("<p>{{ link }}</p>", Some(&vars)).unwrap(),
            "<p><a href=\"https://example.com\">here</a></p>"
        );
    }

    #[test]
    fn test_trailing_newline_kept() {
        let renderer = TemplateRenderer::default();
        let vars = json!({"code": "42"});
        assert_eq!(
            renderer.render("Code: {{code}}\n", Some(&vars)).unwrap(),
            "Code: 42\n"
        );
    }

    #[test]
    fn test_missing_variable_renders_empty() {
        let renderer = TemplateRenderer::new(false);
        let vars = json!({});
        assert_eq!(renderer.render("Hi {{name}}!", Some(&vars)).unwrap(), "Hi !");
    }

    #[test]
    fn test_missing_variable_strict_fails() {
        let renderer = TemplateRenderer::new(true);
        let vars = json!({});
        let result = renderer.render("Hi {{name}}!", Some(&vars));
        assert!(matches!(result, Err(TemplateError::Render(_))));
    }

    #[test]
    fn test_malformed_template() {
        let renderer = TemplateRenderer::default();
        let vars = json!({"name": "Ann"});
        let result = renderer.render("Hello {{ name", Some(&vars));
        assert!(matches!(result, Err(TemplateError::InvalidTemplate(_))));
    }

    #[test]
    fn test_non_object_variables_rejected() {
        let renderer = TemplateRenderer::default();
        let result = renderer.render("Hello", Some(&json!(["Ann"])));
        assert!(matches!(result, Err(TemplateError::InvalidVariables("array"))));
    }
}
