//! Voter registry.
//!
//! The registry is an ordered list of voters. Each entry may be scoped to a
//! single action and, additionally, to a path pattern. Entries that are out of
//! scope for a request abstain without their callable being invoked.

use std::{borrow::Cow, fmt, future::Future, sync::Arc};

use futures::future::{BoxFuture, FutureExt};

use super::{
    AuthzError, RequestContext,
    error::VoterError,
    path::PathPattern,
    vote::{IntoVote, Vote},
};

type ImmediateFn = Arc<dyn Fn(&RequestContext, &str) -> Result<Vote, VoterError> + Send + Sync>;
type DeferredFn = Arc<
    dyn Fn(RequestContext, String) -> BoxFuture<'static, Result<Vote, VoterError>> + Send + Sync,
>;

#[derive(Clone)]
enum VoterKind {
    Immediate(ImmediateFn),
    Deferred(DeferredFn),
}

/// A callable that casts one vote for a request/action pair.
#[derive(Clone)]
pub struct Voter(VoterKind);

impl Voter {
    /// A voter that decides immediately.
    pub fn new<F, V>(f: F) -> Self
    where
        F: Fn(&RequestContext, &str) -> V + Send + Sync + 'static,
        V: IntoVote,
    {
        Self(VoterKind::Immediate(Arc::new(move |request: &RequestContext, action: &str| {
            f(request, action).into_vote()
        })))
    }

    /// A voter whose vote settles later, e.g. after a database lookup.
    ///
    /// Deferred voters can only be registered on an engine running in async
    /// mode.
    pub fn deferred<F, Fut, V>(f: F) -> Self
    where
        F: Fn(RequestContext, String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = V> + Send + 'static,
        V: IntoVote + 'static,
    {
        Self(VoterKind::Deferred(Arc::new(move |request: RequestContext, action: String| {
            f(request, action).map(IntoVote::into_vote).boxed()
        })))
    }

    pub fn is_deferred(&self) -> bool {
        matches!(self.0, VoterKind::Deferred(_))
    }
}

impl fmt::Debug for Voter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            VoterKind::Immediate(_) => f.write_str("Voter::Immediate"),
            VoterKind::Deferred(_) => f.write_str("Voter::Deferred"),
        }
    }
}

/// A registered voter with its scope.
#[derive(Debug, Clone)]
pub struct VoterEntry {
    action: Option<String>,
    path: Option<PathPattern>,
    voter: Voter,
}

impl VoterEntry {
    pub fn action(&self) -> Option<&str> {
        self.action.as_deref()
    }

    pub fn path(&self) -> Option<&PathPattern> {
        self.path.as_ref()
    }

    pub fn is_deferred(&self) -> bool {
        self.voter.is_deferred()
    }

    /// The request this entry's voter should see, or `None` when the entry is
    /// out of scope and abstains.
    fn scope<'a>(
        &self,
        request: &'a RequestContext,
        action: &str,
        match_relative_paths: bool,
    ) -> Option<Cow<'a, RequestContext>> {
        if self.action.as_deref().is_some_and(|scoped| scoped != action) {
            return None;
        }

        let Some(pattern) = &self.path else {
            return Some(Cow::Borrowed(request));
        };

        let target = if match_relative_paths {
            request.path()
        } else {
            request.original_path()
        };
        let captures = pattern.matches(target)?;
        Some(Cow::Owned(request.with_params(captures)))
    }

    /// Cast this entry's vote without suspending.
    pub(crate) fn vote(
        &self,
        index: usize,
        request: &RequestContext,
        action: &str,
        match_relative_paths: bool,
    ) -> Result<Vote, AuthzError> {
        let Some(scoped) = self.scope(request, action, match_relative_paths) else {
            return Ok(Vote::Abstain);
        };
        match &self.voter.0 {
            VoterKind::Immediate(f) => {
                f(&*scoped, action).map_err(|source| AuthzError::Voter { index, source })
            }
            VoterKind::Deferred(_) => Err(AuthzError::DeferredVoter { index }),
        }
    }

    /// Cast this entry's vote, awaiting deferred voters.
    pub(crate) async fn vote_async(
        &self,
        index: usize,
        request: &RequestContext,
        action: &str,
        match_relative_paths: bool,
    ) -> Result<Vote, AuthzError> {
        let Some(scoped) = self.scope(request, action, match_relative_paths) else {
            return Ok(Vote::Abstain);
        };
        let outcome = match &self.voter.0 {
            VoterKind::Immediate(f) => f(&*scoped, action),
            VoterKind::Deferred(f) => f(scoped.into_owned(), action.to_string()).await,
        };
        outcome.map_err(|source| AuthzError::Voter { index, source })
    }
}

/// Ordered list of voters. Registration order is evaluation order.
#[derive(Debug, Clone, Default)]
pub struct VoterRegistry {
    entries: Vec<VoterEntry>,
}

impl VoterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a voter that is consulted for every action.
    pub fn push(&mut self, voter: Voter) {
        self.entries.push(VoterEntry {
            action: None,
            path: None,
            voter,
        });
    }

    /// Append a voter that is only consulted for `action`.
    pub fn push_action(&mut self, action: &str, voter: Voter) -> Result<(), AuthzError> {
        validate_action(action)?;
        self.entries.push(VoterEntry {
            action: Some(action.to_string()),
            path: None,
            voter,
        });
        Ok(())
    }

    /// Append a voter that is only consulted for `action` on paths matching
    /// `pattern`.
    pub fn push_route(
        &mut self,
        action: &str,
        pattern: &str,
        voter: Voter,
    ) -> Result<(), AuthzError> {
        validate_action(action)?;
        let path = PathPattern::compile(pattern)?;
        self.entries.push(VoterEntry {
            action: Some(action.to_string()),
            path: Some(path),
            voter,
        });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &VoterEntry> {
        self.entries.iter()
    }
}

fn validate_action(action: &str) -> Result<(), AuthzError> {
    if action.is_empty() {
        return Err(AuthzError::invalid_argument("action must not be empty"));
    }
    if action.starts_with('/') {
        return Err(AuthzError::invalid_argument(format!(
            "action '{action}' can't start with '/'; pass the path pattern separately"
        )));
    }
    Ok(())
}
