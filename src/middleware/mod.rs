mod gate;
mod helpers;

pub use gate::{
    AUTHENTICATED_ACTION, Fallthrough, FailureMode, Gate, GateOutcome, gate_middleware,
};
pub use helpers::{AuthorizedUser, Authorizer, Locals, helpers_middleware};
