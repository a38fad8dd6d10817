use serde::{Deserialize, Serialize};
use ts_rs::TS;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, thiserror::Error)]
#[ts(export)]
pub enum GameError {
    #[error("Sign in to play")]
    NotSignedIn,
    #[error("Already signed in")]
    AlreadySignedIn,
    #[error("A round is already in progress")]
    RoundInProgress,
    #[error("No round is being played")]
    NotPlaying,
    #[error("No finished round to leave")]
    NoFinishedRound,
    #[error("Score is sealed for this round")]
    LedgerSealed,
    #[error("Score deltas must be positive")]
    InvalidDelta,
    #[error("Invalid round configuration: {reason}")]
    InvalidConfig { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub enum ConnectionError {
    InvalidToken,
    SessionExpired,
    ProfileMissing,
    InternalError { message: String },
}
