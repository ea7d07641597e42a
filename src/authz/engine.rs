//! Voter-based authorization engine.

use std::{fmt, sync::Arc};

use axum::{
    body::Body,
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
};

use super::{
    AuthzError, RequestContext,
    action::ActionSpec,
    registry::{Voter, VoterRegistry},
    vote::Vote,
};
use crate::{
    config::{AuthzConfig, EvaluationMode},
    middleware::Gate,
};

/// Builds the response for a denied request.
pub trait FailureHandler: Send + Sync {
    fn handle(&self, request: &Parts, action: &str) -> Response;
}

impl<F> FailureHandler for F
where
    F: Fn(&Parts, &str) -> Response + Send + Sync,
{
    fn handle(&self, request: &Parts, action: &str) -> Response {
        self(request, action)
    }
}

/// Responds with an empty `403 Forbidden`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ForbiddenHandler;

impl FailureHandler for ForbiddenHandler {
    fn handle(&self, _request: &Parts, _action: &str) -> Response {
        (StatusCode::FORBIDDEN, Body::empty()).into_response()
    }
}

/// Authorization engine owning an ordered list of voters.
///
/// Voters are registered during setup through `&mut self`; once the engine is
/// shared behind an `Arc` (as gates and helpers require) the registry is
/// read-only.
///
/// # Decision rule
///
/// Voters are consulted in registration order. The first `Allow` or `Deny`
/// is the decision and no later voter runs. When every voter abstains, or no
/// voter is registered, the request is denied.
pub struct AuthzEngine {
    config: AuthzConfig,
    registry: VoterRegistry,
    failure_handler: Arc<dyn FailureHandler>,
}

impl AuthzEngine {
    pub fn new(config: AuthzConfig) -> Self {
        Self {
            config,
            registry: VoterRegistry::new(),
            failure_handler: Arc::new(ForbiddenHandler),
        }
    }

    /// Replace the handler invoked when a gate denies a request.
    pub fn with_failure_handler(mut self, handler: impl FailureHandler + 'static) -> Self {
        self.failure_handler = Arc::new(handler);
        self
    }

    pub fn config(&self) -> &AuthzConfig {
        &self.config
    }

    pub fn is_async(&self) -> bool {
        self.config.mode == EvaluationMode::Async
    }

    pub fn principal_field(&self) -> &str {
        &self.config.principal_field
    }

    pub(crate) fn failure_handler(&self) -> &Arc<dyn FailureHandler> {
        &self.failure_handler
    }

    /// Register a voter consulted for every action.
    pub fn register(&mut self, voter: Voter) -> Result<&mut Self, AuthzError> {
        self.check_mode(&voter)?;
        self.registry.push(voter);
        Ok(self)
    }

    /// Register a voter consulted only for `action`.
    ///
    /// `action` must be non-empty and must not start with `/`.
    pub fn register_action(&mut self, action: &str, voter: Voter) -> Result<&mut Self, AuthzError> {
        self.check_mode(&voter)?;
        self.registry.push_action(action, voter)?;
        Ok(self)
    }

    /// Register a voter consulted only for `action` on requests whose path
    /// matches `pattern`. The voter sees the captured path parameters through
    /// [`RequestContext::param`].
    pub fn register_route(
        &mut self,
        action: &str,
        pattern: &str,
        voter: Voter,
    ) -> Result<&mut Self, AuthzError> {
        self.check_mode(&voter)?;
        self.registry.push_route(action, pattern, voter)?;
        Ok(self)
    }

    fn check_mode(&self, voter: &Voter) -> Result<(), AuthzError> {
        if voter.is_deferred() && !self.is_async() {
            return Err(AuthzError::invalid_argument(
                "deferred voters require an engine in async mode",
            ));
        }
        Ok(())
    }

    pub fn registry(&self) -> &VoterRegistry {
        &self.registry
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    /// Remove every voter.
    pub fn clear(&mut self) {
        self.registry.clear();
    }

    /// Decide `action` for `request` without suspending.
    ///
    /// Fails with [`AuthzError::DeferredVoter`] if the scan reaches a deferred
    /// voter, and with [`AuthzError::Voter`] if a voter faults.
    pub fn evaluate(&self, request: &RequestContext, action: &str) -> Result<bool, AuthzError> {
        let match_relative = self.config.match_relative_paths;
        for (index, entry) in self.registry.iter().enumerate() {
            let vote = entry
                .vote(index, request, action, match_relative)
                .inspect_err(|e| log_fault(action, e))?;
            if let Some(allowed) = vote.decision() {
                log_decision(action, Some((index, vote)));
                return Ok(allowed);
            }
        }
        log_decision(action, None);
        Ok(false)
    }

    /// Decide `action` for `request`, awaiting each voter in registration
    /// order. Voters never run concurrently, and none runs after a decisive
    /// vote.
    pub async fn evaluate_async(
        &self,
        request: &RequestContext,
        action: &str,
    ) -> Result<bool, AuthzError> {
        let match_relative = self.config.match_relative_paths;
        let mut decided = None;
        for (index, entry) in self.registry.iter().enumerate() {
            if decided.is_some() {
                break;
            }
            let vote = entry
                .vote_async(index, request, action, match_relative)
                .await
                .inspect_err(|e| log_fault(action, e))?;
            if vote.is_decisive() {
                decided = Some((index, vote));
            }
        }

        match decided {
            Some((index, vote)) => {
                log_decision(action, Some((index, vote)));
                Ok(vote == Vote::Allow)
            }
            None => {
                log_decision(action, None);
                Ok(false)
            }
        }
    }

    /// Decide `action` in the configured mode.
    pub async fn decide(&self, request: &RequestContext, action: &str) -> Result<bool, AuthzError> {
        match self.config.mode {
            EvaluationMode::Sync => self.evaluate(request, action),
            EvaluationMode::Async => self.evaluate_async(request, action).await,
        }
    }

    /// A gate authorizing `action` (a literal, a `{field}` template, or an
    /// [`ActionSpec`]).
    pub fn gate(self: &Arc<Self>, action: impl Into<ActionSpec>) -> Gate {
        Gate::vote(Arc::clone(self), action.into(), "can")
    }

    /// A gate checking an ability, e.g. `engine.can("edit {params.id}")`.
    pub fn can(self: &Arc<Self>, action: impl Into<ActionSpec>) -> Gate {
        Gate::vote(Arc::clone(self), action.into(), "can")
    }

    /// A gate checking a role, e.g. `engine.is("admin")`.
    pub fn is(self: &Arc<Self>, role: impl Into<ActionSpec>) -> Gate {
        Gate::vote(Arc::clone(self), role.into(), "is")
    }

    /// A gate that only requires an authenticated principal.
    pub fn is_authenticated(self: &Arc<Self>) -> Gate {
        Gate::authenticated(Arc::clone(self))
    }
}

impl Default for AuthzEngine {
    fn default() -> Self {
        Self::new(AuthzConfig::default())
    }
}

impl fmt::Debug for AuthzEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthzEngine")
            .field("config", &self.config)
            .field("voters", &self.registry.len())
            .finish_non_exhaustive()
    }
}

fn log_decision(action: &str, decisive: Option<(usize, Vote)>) {
    match decisive {
        Some((index, vote)) => {
            tracing::debug!(action, voter = index, vote = %vote, "Authorization decided")
        }
        None => tracing::debug!(action, "No decisive vote (default deny)"),
    }
}

fn log_fault(action: &str, error: &AuthzError) {
    tracing::warn!(action, error = %error, "Authorization evaluation failed");
}
