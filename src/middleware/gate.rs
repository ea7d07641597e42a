//! Route gates.
//!
//! A [`Gate`] authorizes one action before the wrapped route runs. Gates are
//! installed with `axum::middleware::from_fn_with_state`:
//!
//! ```rust,ignore
//! let engine = Arc::new(engine);
//! let app = Router::new()
//!     .route("/fly", get(fly))
//!     .route_layer(middleware::from_fn_with_state(engine.can("fly"), gate_middleware));
//! ```
//!
//! On denial a gate either calls the engine's failure handler (the default)
//! or, in fallthrough mode, hands the request to the next route.

use std::{fmt, sync::Arc};

use axum::{
    Router,
    extract::{OriginalUri, Request, State},
    http::{Extensions, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tower::ServiceExt;

use super::{AuthorizedUser, Authorizer, Locals};
use crate::authz::{
    ActionSpec, Authentication, AuthzEngine, AuthzError, RequestAttributes, RequestContext,
};

/// Action reported to the failure handler by authentication gates.
pub const AUTHENTICATED_ACTION: &str = "isAuthenticated";

/// What a gate does with a denied request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureMode {
    /// Call the engine's failure handler.
    Handler,
    /// Skip to the next route.
    Fallthrough,
}

/// Result of checking a request against a gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    /// The request may continue.
    Proceed,
    /// Denied; the failure handler responds for `action`.
    Denied(String),
    /// Denied; the next route should handle the request.
    NextRoute(String),
}

/// Marker inserted into the `404` response of a fallthrough gate that has no
/// next route configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fallthrough {
    pub action: String,
}

#[derive(Debug, Clone)]
enum GateCheck {
    Vote {
        action: ActionSpec,
        verb: &'static str,
    },
    Authenticated,
}

/// A pipeline stage authorizing one action.
#[derive(Clone)]
pub struct Gate {
    engine: Arc<AuthzEngine>,
    check: GateCheck,
    failure: FailureMode,
    next_route: Option<Router>,
}

impl Gate {
    pub(crate) fn vote(engine: Arc<AuthzEngine>, action: ActionSpec, verb: &'static str) -> Self {
        Self {
            engine,
            check: GateCheck::Vote { action, verb },
            failure: FailureMode::Handler,
            next_route: None,
        }
    }

    pub(crate) fn authenticated(engine: Arc<AuthzEngine>) -> Self {
        Self {
            engine,
            check: GateCheck::Authenticated,
            failure: FailureMode::Handler,
            next_route: None,
        }
    }

    /// The same gate, but a denial skips to the next route instead of calling
    /// the failure handler.
    pub fn fallthrough(mut self) -> Self {
        self.failure = FailureMode::Fallthrough;
        self
    }

    /// Route denied requests to `router`. Implies [`Gate::fallthrough`].
    pub fn next_route(mut self, router: Router) -> Self {
        self.failure = FailureMode::Fallthrough;
        self.next_route = Some(router);
        self
    }

    pub fn failure_mode(&self) -> FailureMode {
        self.failure
    }

    pub fn engine(&self) -> &Arc<AuthzEngine> {
        &self.engine
    }

    /// Decide whether `request` may pass.
    ///
    /// Authentication gates fail with [`AuthzError::MissingAuthentication`]
    /// when no authentication state was published for the request.
    pub async fn check(&self, request: &RequestContext) -> Result<GateOutcome, AuthzError> {
        let (allowed, action) = match &self.check {
            GateCheck::Vote { action, verb } => {
                let action = action.resolve(request);
                let allowed = self.engine.decide(request, &action).await?;
                tracing::debug!(verb = *verb, action = %action, allowed, "Gate evaluated");
                (allowed, action)
            }
            GateCheck::Authenticated => {
                let allowed = request
                    .is_authenticated()
                    .ok_or(AuthzError::MissingAuthentication)?;
                (allowed, AUTHENTICATED_ACTION.to_string())
            }
        };

        Ok(match (allowed, self.failure) {
            (true, _) => GateOutcome::Proceed,
            (false, FailureMode::Handler) => GateOutcome::Denied(action),
            (false, FailureMode::Fallthrough) => GateOutcome::NextRoute(action),
        })
    }
}

impl fmt::Debug for Gate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gate")
            .field("check", &self.check)
            .field("failure", &self.failure)
            .field("next_route", &self.next_route.is_some())
            .finish_non_exhaustive()
    }
}

/// Middleware enforcing a [`Gate`].
///
/// Allowed requests continue to the inner service. Denied requests get the
/// failure handler's response, or are passed to the next route in
/// fallthrough mode. Faults (a failing voter, missing authentication state)
/// become a `500` response.
pub async fn gate_middleware(State(gate): State<Gate>, req: Request, next: Next) -> Response {
    let (mut parts, body) = req.into_parts();
    let request = RequestContext::from_parts(&mut parts, gate.engine.principal_field()).await;

    let outcome = gate.check(&request).await;

    match outcome {
        Ok(GateOutcome::Proceed) => next.run(Request::from_parts(parts, body)).await,
        Ok(GateOutcome::Denied(action)) => {
            tracing::info!(
                action = %action,
                method = %parts.method,
                path = %parts.uri.path(),
                "Request denied"
            );
            gate.engine.failure_handler().handle(&parts, &action)
        }
        Ok(GateOutcome::NextRoute(action)) => {
            tracing::debug!(action = %action, path = %parts.uri.path(), "Falling through to next route");
            match gate.next_route {
                Some(router) => {
                    parts.extensions = forwarded_extensions(&mut parts.extensions);
                    router
                        .oneshot(Request::from_parts(parts, body))
                        .await
                        .unwrap_or_else(|never| match never {})
                }
                None => {
                    let mut response = StatusCode::NOT_FOUND.into_response();
                    response.extensions_mut().insert(Fallthrough { action });
                    response
                }
            }
        }
        Err(e) => e.into_response(),
    }
}

/// Extensions a next route may rely on. Routing state of the route that
/// denied the request (path params, matched path) is left behind so the next
/// router can install its own.
fn forwarded_extensions(extensions: &mut Extensions) -> Extensions {
    fn carry<T: Clone + Send + Sync + 'static>(from: &mut Extensions, to: &mut Extensions) {
        if let Some(value) = from.remove::<T>() {
            to.insert(value);
        }
    }

    let mut forwarded = Extensions::new();
    carry::<OriginalUri>(extensions, &mut forwarded);
    carry::<RequestAttributes>(extensions, &mut forwarded);
    carry::<Authentication>(extensions, &mut forwarded);
    carry::<Locals>(extensions, &mut forwarded);
    carry::<Authorizer>(extensions, &mut forwarded);
    carry::<AuthorizedUser>(extensions, &mut forwarded);
    forwarded
}
