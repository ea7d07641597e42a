//! Request views handed to voters.
//!
//! A [`RequestContext`] is a cheap, clonable handle over an immutable snapshot
//! of the incoming request. Path-scoped voters receive a derived context that
//! layers the parameters captured from their path pattern on top of the base
//! request: parameter lookups read the overlay first and fall back to the
//! base, every other accessor reads the base.

use std::sync::Arc;

use axum::extract::{FromRequestParts, OriginalUri, RawPathParams};
use http::{HeaderMap, Method, request::Parts};
use serde_json::{Map, Value};

use crate::config::DEFAULT_PRINCIPAL_FIELD;

/// Named parameters in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params(Vec<(String, String)>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a parameter, replacing any existing value with the same name.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.0.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.0.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for Params
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Params::new();
        for (name, value) in iter {
            params.insert(name, value);
        }
        params
    }
}

/// Named request fields attached by upstream middleware.
///
/// The authentication layer stores the principal here under the configured
/// principal field (`"user"` by default).
#[derive(Debug, Clone, Default)]
pub struct RequestAttributes(Map<String, Value>);

impl RequestAttributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: Value) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.0.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }
}

/// Authentication state published by the authentication middleware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Authentication {
    authenticated: bool,
}

impl Authentication {
    pub fn new(authenticated: bool) -> Self {
        Self { authenticated }
    }

    pub fn authenticated() -> Self {
        Self::new(true)
    }

    pub fn anonymous() -> Self {
        Self::new(false)
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }
}

#[derive(Debug)]
struct RequestSnapshot {
    method: Method,
    path: String,
    original_path: String,
    headers: HeaderMap,
    params: Params,
    attributes: RequestAttributes,
    principal_field: String,
    authentication: Option<Authentication>,
}

/// Read-only view of a request as seen by voters.
#[derive(Debug, Clone)]
pub struct RequestContext {
    base: Arc<RequestSnapshot>,
    overlay: Option<Arc<Params>>,
}

impl RequestContext {
    pub fn builder() -> RequestContextBuilder {
        RequestContextBuilder::default()
    }

    /// Snapshot the request parts.
    ///
    /// Route parameters are only available once the router has matched the
    /// request, i.e. when this runs inside a `route_layer` or a handler.
    pub async fn from_parts(parts: &mut Parts, principal_field: &str) -> Self {
        let params = match RawPathParams::from_request_parts(parts, &()).await {
            Ok(raw) => raw.iter().collect(),
            Err(_) => Params::new(),
        };
        let original_path = parts
            .extensions
            .get::<OriginalUri>()
            .map(|uri| uri.path().to_owned())
            .unwrap_or_else(|| parts.uri.path().to_owned());

        Self::from_snapshot(RequestSnapshot {
            method: parts.method.clone(),
            path: parts.uri.path().to_owned(),
            original_path,
            headers: parts.headers.clone(),
            params,
            attributes: parts
                .extensions
                .get::<RequestAttributes>()
                .cloned()
                .unwrap_or_default(),
            principal_field: principal_field.to_owned(),
            authentication: parts.extensions.get::<Authentication>().copied(),
        })
    }

    fn from_snapshot(snapshot: RequestSnapshot) -> Self {
        Self {
            base: Arc::new(snapshot),
            overlay: None,
        }
    }

    /// Derive a view whose parameters are `captures` layered over the
    /// parameters already visible through `self`. Captures win on collision.
    pub fn with_params(&self, captures: Params) -> Self {
        let overlay = match &self.overlay {
            Some(existing) => {
                let mut merged = (**existing).clone();
                for (name, value) in captures.iter() {
                    merged.insert(name, value);
                }
                merged
            }
            None => captures,
        };
        Self {
            base: Arc::clone(&self.base),
            overlay: Some(Arc::new(overlay)),
        }
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.overlay
            .as_ref()
            .and_then(|overlay| overlay.get(name))
            .or_else(|| self.base.params.get(name))
    }

    /// All visible parameters, overlay values first.
    pub fn params(&self) -> Params {
        let mut params = self.base.params.clone();
        if let Some(overlay) = &self.overlay {
            for (name, value) in overlay.iter() {
                params.insert(name, value);
            }
        }
        params
    }

    pub fn method(&self) -> &Method {
        &self.base.method
    }

    /// Path relative to the router that is handling the request.
    pub fn path(&self) -> &str {
        &self.base.path
    }

    /// Path as the application received it, including any nest prefix.
    pub fn original_path(&self) -> &str {
        &self.base.original_path
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.base.headers
    }

    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.base.attributes.get(name)
    }

    pub fn principal_field(&self) -> &str {
        &self.base.principal_field
    }

    /// The authenticated principal, if upstream attached one.
    pub fn principal(&self) -> Option<&Value> {
        self.attribute(&self.base.principal_field)
            .filter(|value| !value.is_null())
    }

    /// `None` when no authentication middleware ran for this request.
    pub fn is_authenticated(&self) -> Option<bool> {
        self.base
            .authentication
            .map(|auth| auth.is_authenticated())
    }

    /// Resolve a dotted field path such as `params.id`, `user.name`,
    /// `headers.x-tenant` or `method`.
    pub fn lookup(&self, path: &str) -> Option<Value> {
        let (head, rest) = match path.split_once('.') {
            Some((head, rest)) => (head, Some(rest)),
            None => (path, None),
        };

        match (head, rest) {
            ("params", Some(name)) => self.param(name).map(Value::from),
            ("params", None) => Some(Value::Object(
                self.params()
                    .iter()
                    .map(|(n, v)| (n.to_owned(), Value::from(v)))
                    .collect(),
            )),
            ("method", None) => Some(Value::from(self.method().as_str())),
            ("path", None) => Some(Value::from(self.path())),
            ("original_path", None) => Some(Value::from(self.original_path())),
            ("headers", Some(name)) => self
                .headers()
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(Value::from),
            _ => {
                let mut value = self.attribute(head)?;
                for key in rest.into_iter().flat_map(|rest| rest.split('.')) {
                    value = match value {
                        Value::Object(map) => map.get(key)?,
                        Value::Array(items) => items.get(key.parse::<usize>().ok()?)?,
                        _ => return None,
                    };
                }
                Some(value.clone())
            }
        }
    }
}

/// Builds a [`RequestContext`] without an HTTP request, e.g. for background
/// jobs that need an authorization decision.
#[derive(Debug, Default)]
pub struct RequestContextBuilder {
    method: Method,
    path: Option<String>,
    original_path: Option<String>,
    headers: HeaderMap,
    params: Params,
    attributes: RequestAttributes,
    principal_field: Option<String>,
    principal: Option<Value>,
    authentication: Option<Authentication>,
}

impl RequestContextBuilder {
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Defaults to the router-relative path.
    pub fn original_path(mut self, path: impl Into<String>) -> Self {
        self.original_path = Some(path.into());
        self
    }

    pub fn header(mut self, name: http::HeaderName, value: http::HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name, value);
        self
    }

    pub fn attribute(mut self, name: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(name, value);
        self
    }

    pub fn principal_field(mut self, field: impl Into<String>) -> Self {
        self.principal_field = Some(field.into());
        self
    }

    /// Attach a principal under the principal field.
    pub fn principal(mut self, principal: Value) -> Self {
        self.principal = Some(principal);
        self
    }

    pub fn authentication(mut self, authentication: Authentication) -> Self {
        self.authentication = Some(authentication);
        self
    }

    pub fn build(self) -> RequestContext {
        let principal_field = self
            .principal_field
            .unwrap_or_else(|| DEFAULT_PRINCIPAL_FIELD.to_owned());
        let mut attributes = self.attributes;
        if let Some(principal) = self.principal {
            attributes.insert(principal_field.clone(), principal);
        }
        let path = self.path.unwrap_or_else(|| "/".to_owned());

        RequestContext::from_snapshot(RequestSnapshot {
            method: self.method,
            original_path: self.original_path.unwrap_or_else(|| path.clone()),
            path,
            headers: self.headers,
            params: self.params,
            attributes,
            principal_field,
            authentication: self.authentication,
        })
    }
}
