//! Action specifiers resolved against the request.
//!
//! A gate or helper may name its action literally (`"read"`), as a template
//! with `{field.path}` placeholders (`"edit {params.id}"`), or as a closure
//! over the request. Placeholders are resolved with
//! [`RequestContext::lookup`]; a placeholder that does not resolve is kept
//! verbatim so the action cannot accidentally collide with a real one.

use std::{fmt, sync::Arc};

use serde_json::Value;

use super::RequestContext;

type ActionFn = Arc<dyn Fn(&RequestContext) -> String + Send + Sync>;

/// How a gate determines the action to authorize.
#[derive(Clone)]
pub enum ActionSpec {
    Literal(String),
    Template(String),
    Dynamic(ActionFn),
}

impl ActionSpec {
    pub fn dynamic<F>(f: F) -> Self
    where
        F: Fn(&RequestContext) -> String + Send + Sync + 'static,
    {
        Self::Dynamic(Arc::new(f))
    }

    /// The effective action for this request.
    pub fn resolve(&self, request: &RequestContext) -> String {
        match self {
            Self::Literal(action) => action.clone(),
            Self::Template(template) => render_template(template, request),
            Self::Dynamic(f) => f(request),
        }
    }

    /// A label for diagnostics that does not need a request.
    pub fn label(&self) -> &str {
        match self {
            Self::Literal(action) | Self::Template(action) => action,
            Self::Dynamic(_) => "<dynamic>",
        }
    }
}

impl fmt::Debug for ActionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(action) => f.debug_tuple("Literal").field(action).finish(),
            Self::Template(template) => f.debug_tuple("Template").field(template).finish(),
            Self::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}

impl From<&str> for ActionSpec {
    fn from(action: &str) -> Self {
        Self::from(action.to_string())
    }
}

impl From<String> for ActionSpec {
    fn from(action: String) -> Self {
        if action.contains('{') {
            Self::Template(action)
        } else {
            Self::Literal(action)
        }
    }
}

fn render_template(template: &str, request: &RequestContext) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return out;
        };

        let field = after[..end].trim();
        match request.lookup(field) {
            Some(Value::String(value)) => out.push_str(&value),
            Some(Value::Null) | None => out.push_str(&rest[start..start + end + 2]),
            Some(value) => out.push_str(&value.to_string()),
        }
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    out
}
