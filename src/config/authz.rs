use serde::{Deserialize, Serialize};

/// Field under which the authentication layer stores the principal.
pub const DEFAULT_PRINCIPAL_FIELD: &str = "user";

/// Authorization engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthzConfig {
    /// How voters are evaluated. Deferred voters require `async`.
    #[serde(default)]
    pub mode: EvaluationMode,

    /// Request attribute holding the authenticated principal.
    #[serde(default = "default_principal_field")]
    pub principal_field: String,

    /// Match route-scoped voters against the path seen by the router that
    /// handles the request instead of the full path the application received.
    #[serde(default)]
    pub match_relative_paths: bool,
}

impl Default for AuthzConfig {
    fn default() -> Self {
        Self {
            mode: EvaluationMode::default(),
            principal_field: default_principal_field(),
            match_relative_paths: false,
        }
    }
}

impl AuthzConfig {
    pub fn with_mode(mut self, mode: EvaluationMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_principal_field(mut self, field: impl Into<String>) -> Self {
        self.principal_field = field.into();
        self
    }

    pub fn with_relative_paths(mut self, enabled: bool) -> Self {
        self.match_relative_paths = enabled;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.principal_field.trim().is_empty() {
            return Err("authz.principal_field must not be empty".into());
        }
        Ok(())
    }
}

fn default_principal_field() -> String {
    DEFAULT_PRINCIPAL_FIELD.to_string()
}

/// Voter evaluation mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationMode {
    /// Voters decide immediately and gates never suspend.
    #[default]
    Sync,
    /// Voters may be deferred; gates await each voter in turn.
    Async,
}

impl EvaluationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sync => "sync",
            Self::Async => "async",
        }
    }
}
