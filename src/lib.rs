//! Voter-based authorization for axum applications.
//!
//! Applications register *voters* on an [`AuthzEngine`](authz::AuthzEngine).
//! Each voter looks at a request and an action string and allows, denies or
//! abstains. The first decisive vote wins; when everyone abstains the request
//! is denied.
//!
//! Routes are protected with gates built from a shared engine, and handlers
//! get request-bound predicates from [`helpers_middleware`](middleware::helpers_middleware):
//!
//! ```rust,ignore
//! let mut engine = AuthzEngine::default();
//! engine.register(Voter::new(|req: &RequestContext, action: &str| {
//!     req.lookup("user.roles")?.as_array().map(|roles| roles.iter().any(|r| r == action))
//! }))?;
//! let engine = Arc::new(engine);
//!
//! let app = Router::new()
//!     .route(
//!         "/admin",
//!         get(admin).route_layer(from_fn_with_state(engine.is("admin"), gate_middleware)),
//!     )
//!     .layer(from_fn_with_state(engine.clone(), helpers_middleware));
//! ```

pub mod authz;
pub mod config;
pub mod middleware;
#[cfg(feature = "server")]
pub mod observability;

#[cfg(test)]
mod tests;
