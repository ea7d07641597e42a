//! Authorization helpers for handlers and templates.
//!
//! [`helpers_middleware`] snapshots the request once and publishes
//! predicates bound to it, so handlers can ask follow-up questions such as
//! "may this user also edit?" without building a context themselves:
//!
//! ```rust,ignore
//! async fn show(Extension(authz): Extension<Authorizer>) -> impl IntoResponse {
//!     if authz.can("edit")? { /* render edit controls */ }
//! }
//! ```
//!
//! The stage never decides anything on its own.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use serde_json::{Map, Value};

use crate::authz::{ActionSpec, AuthzEngine, AuthzError, RequestContext};

/// Predicates bound to one request.
#[derive(Debug, Clone)]
pub struct Authorizer {
    engine: Arc<AuthzEngine>,
    request: RequestContext,
}

impl Authorizer {
    pub fn new(engine: Arc<AuthzEngine>, request: RequestContext) -> Self {
        Self { engine, request }
    }

    pub fn request(&self) -> &RequestContext {
        &self.request
    }

    /// Whether the request may perform `action`, decided without suspending.
    pub fn can(&self, action: impl Into<ActionSpec>) -> Result<bool, AuthzError> {
        self.check("can", action.into())
    }

    /// Whether the request holds `role`, decided without suspending.
    pub fn is(&self, role: impl Into<ActionSpec>) -> Result<bool, AuthzError> {
        self.check("is", role.into())
    }

    /// Like [`Authorizer::can`], awaiting deferred voters.
    pub async fn can_async(&self, action: impl Into<ActionSpec>) -> Result<bool, AuthzError> {
        self.check_async("can", action.into()).await
    }

    /// Like [`Authorizer::is`], awaiting deferred voters.
    pub async fn is_async(&self, role: impl Into<ActionSpec>) -> Result<bool, AuthzError> {
        self.check_async("is", role.into()).await
    }

    fn check(&self, verb: &'static str, action: ActionSpec) -> Result<bool, AuthzError> {
        let action = action.resolve(&self.request);
        let allowed = self.engine.evaluate(&self.request, &action)?;
        tracing::trace!(verb, action = %action, allowed, "Helper evaluated");
        Ok(allowed)
    }

    async fn check_async(&self, verb: &'static str, action: ActionSpec) -> Result<bool, AuthzError> {
        let action = action.resolve(&self.request);
        let allowed = self.engine.evaluate_async(&self.request, &action).await?;
        tracing::trace!(verb, action = %action, allowed, "Helper evaluated");
        Ok(allowed)
    }
}

/// The authenticated principal together with predicates about it.
#[derive(Debug, Clone)]
pub struct AuthorizedUser {
    pub principal: Value,
    authorizer: Authorizer,
}

impl AuthorizedUser {
    pub fn authorizer(&self) -> &Authorizer {
        &self.authorizer
    }

    pub fn can(&self, action: impl Into<ActionSpec>) -> Result<bool, AuthzError> {
        self.authorizer.can(action)
    }

    pub fn is(&self, role: impl Into<ActionSpec>) -> Result<bool, AuthzError> {
        self.authorizer.is(role)
    }

    pub async fn can_async(&self, action: impl Into<ActionSpec>) -> Result<bool, AuthzError> {
        self.authorizer.can_async(action).await
    }

    pub async fn is_async(&self, role: impl Into<ActionSpec>) -> Result<bool, AuthzError> {
        self.authorizer.is_async(role).await
    }
}

/// Values exposed to response rendering (templates, serializers).
///
/// Upstream stages may insert their own `Locals`; the helper stage extends
/// it and never overwrites an existing principal entry (keyed by the
/// engine's principal field).
#[derive(Debug, Clone, Default)]
pub struct Locals {
    values: Map<String, Value>,
    authorizer: Option<Authorizer>,
    authenticated: Option<bool>,
}

impl Locals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    /// Predicates for the current request (`userIs` / `userCan`).
    pub fn authorizer(&self) -> Option<&Authorizer> {
        self.authorizer.as_ref()
    }

    /// `None` when no authentication stage ran.
    pub fn is_authenticated(&self) -> Option<bool> {
        self.authenticated
    }
}

/// Middleware attaching [`Authorizer`], [`AuthorizedUser`] and [`Locals`] to
/// the request.
pub async fn helpers_middleware(
    State(engine): State<Arc<AuthzEngine>>,
    req: Request,
    next: Next,
) -> Response {
    let (mut parts, body) = req.into_parts();
    let principal_field = engine.principal_field().to_string();
    let request = RequestContext::from_parts(&mut parts, &principal_field).await;
    let principal = request.principal().cloned();
    let authenticated = request.is_authenticated();
    let authorizer = Authorizer::new(engine, request);

    let mut locals = parts.extensions.remove::<Locals>().unwrap_or_default();
    if let Some(principal) = &principal
        && !locals.values.contains_key(&principal_field)
    {
        locals.insert(principal_field, principal.clone());
    }
    locals.authorizer = Some(authorizer.clone());
    if authenticated.is_some() {
        locals.authenticated = authenticated;
    }

    if let Some(principal) = principal {
        parts.extensions.insert(AuthorizedUser {
            principal,
            authorizer: authorizer.clone(),
        });
    }
    parts.extensions.insert(authorizer);
    parts.extensions.insert(locals);

    next.run(Request::from_parts(parts, body)).await
}
