//! Authorization module providing voter-based access control.
//!
//! Authorization decisions are made by an ordered list of voters:
//! - Voters are plain callables that inspect the request and the action
//! - A voter may be scoped to one action, and additionally to a path pattern
//! - Each voter allows, denies, or abstains
//!
//! The decision flow:
//! 1. Resolve the action for the request (literal, template, or closure)
//! 2. Consult the voters in registration order
//! 3. Skip voters whose action or path scope does not match
//! 4. Return the first allow/deny vote (later voters never run)
//! 5. Deny when every voter abstained

mod action;
mod context;
mod engine;
mod error;
mod path;
mod registry;
mod vote;

pub use action::ActionSpec;
pub use context::{
    Authentication, Params, RequestAttributes, RequestContext, RequestContextBuilder,
};
pub use engine::{AuthzEngine, FailureHandler, ForbiddenHandler};
pub use error::{AuthzError, VoterError};
pub use path::PathPattern;
pub use registry::{Voter, VoterEntry, VoterRegistry};
pub use vote::{IntoVote, Vote};
