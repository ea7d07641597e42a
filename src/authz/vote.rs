//! Votes cast by voters.

use std::fmt;

use super::error::VoterError;

/// The outcome of a single voter.
///
/// `Allow` and `Deny` are decisive and end the evaluation; `Abstain` hands the
/// decision to the next voter in registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Vote {
    Allow,
    Deny,
    #[default]
    Abstain,
}

impl Vote {
    /// Whether this vote ends the evaluation.
    pub fn is_decisive(self) -> bool {
        !matches!(self, Vote::Abstain)
    }

    /// The boolean decision this vote stands for, if it is decisive.
    pub fn decision(self) -> Option<bool> {
        match self {
            Vote::Allow => Some(true),
            Vote::Deny => Some(false),
            Vote::Abstain => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Vote::Allow => "allow",
            Vote::Deny => "deny",
            Vote::Abstain => "abstain",
        }
    }
}

impl fmt::Display for Vote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<bool> for Vote {
    fn from(allowed: bool) -> Self {
        if allowed { Vote::Allow } else { Vote::Deny }
    }
}

impl From<Option<bool>> for Vote {
    fn from(decision: Option<bool>) -> Self {
        decision.map_or(Vote::Abstain, Vote::from)
    }
}

/// Conversion from whatever a voter returns into a vote.
///
/// Voters may return a [`Vote`], a `bool`, an `Option<bool>` (where `None`
/// abstains), `()` (always abstains), or a `Result` of any of these. An `Err`
/// is a voter fault, never a vote.
pub trait IntoVote {
    fn into_vote(self) -> Result<Vote, VoterError>;
}

impl IntoVote for Vote {
    fn into_vote(self) -> Result<Vote, VoterError> {
        Ok(self)
    }
}

impl IntoVote for bool {
    fn into_vote(self) -> Result<Vote, VoterError> {
        Ok(Vote::from(self))
    }
}

impl IntoVote for Option<bool> {
    fn into_vote(self) -> Result<Vote, VoterError> {
        Ok(Vote::from(self))
    }
}

impl IntoVote for Option<Vote> {
    fn into_vote(self) -> Result<Vote, VoterError> {
        Ok(self.unwrap_or_default())
    }
}

impl IntoVote for () {
    fn into_vote(self) -> Result<Vote, VoterError> {
        Ok(Vote::Abstain)
    }
}

impl<T, E> IntoVote for Result<T, E>
where
    T: IntoVote,
    E: Into<VoterError>,
{
    fn into_vote(self) -> Result<Vote, VoterError> {
        self.map_err(Into::into)?.into_vote()
    }
}
