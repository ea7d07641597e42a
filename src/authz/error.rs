//! Authorization errors.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Error raised by a voter while casting its vote.
pub type VoterError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Faults raised by the authorization engine.
///
/// A denial is not an error: it is a plain `false` decision. These variants
/// cover configuration mistakes and voters that failed to vote.
#[derive(Debug, Error)]
pub enum AuthzError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error(
        "Expected authentication state on the request. \
         Make sure the authentication middleware runs before this gate"
    )]
    MissingAuthentication,

    #[error("Voter #{index} is deferred and cannot be evaluated synchronously")]
    DeferredVoter { index: usize },

    #[error("Voter #{index} failed: {source}")]
    Voter {
        index: usize,
        #[source]
        source: VoterError,
    },
}

impl AuthzError {
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::InvalidArgument(reason.into())
    }

    /// Whether this error stems from setup rather than from a voter.
    pub fn is_configuration(&self) -> bool {
        !matches!(self, Self::Voter { .. })
    }

    fn code(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "invalid_argument",
            Self::MissingAuthentication => "missing_authentication",
            Self::DeferredVoter { .. } => "deferred_voter",
            Self::Voter { .. } => "voter_failed",
        }
    }
}

impl IntoResponse for AuthzError {
    fn into_response(self) -> Response {
        if self.is_configuration() {
            tracing::error!(error = %self, "Authorization configuration error");
        } else {
            tracing::warn!(error = %self, "Authorization voter failed");
        }

        let body = json!({
            "error": {
                "code": self.code(),
                "message": "Authorization could not be evaluated",
            }
        });

        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}
