use std::fmt;

use thiserror::Error;
use uuid::Uuid;

/// Coarse error classes exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Invalid,
    NotFound,
    NotAllowed,
    Duplicate,
    Unknown,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Invalid => "invalid",
            ErrorKind::NotFound => "not_found",
            ErrorKind::NotAllowed => "not_allowed",
            ErrorKind::Duplicate => "duplicate",
            ErrorKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum InviteError {
    #[error("{0}")]
    Invalid(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("actor is not allowed to act on this invitation")]
    NotAllowed,

    #[error("an active invitation already exists for this session and recipient")]
    Duplicate,

    /// The guarded transition matched no row: another caller decided first.
    #[error("this invitation was already responded to")]
    AlreadyResponded,

    #[error("invitation {invitation_id} was accepted but its commitment could not be created: {message}")]
    CommitmentFailed { invitation_id: Uuid, message: String },

    #[error("store failure: {0}")]
    Unknown(String),
}

impl InviteError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            InviteError::Invalid(_) => ErrorKind::Invalid,
            InviteError::NotFound(_) | InviteError::AlreadyResponded => ErrorKind::NotFound,
            InviteError::NotAllowed => ErrorKind::NotAllowed,
            InviteError::Duplicate => ErrorKind::Duplicate,
            InviteError::CommitmentFailed { .. } | InviteError::Unknown(_) => ErrorKind::Unknown,
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        InviteError::Invalid(message.into())
    }

    pub fn is_lost_race(&self) -> bool {
        matches!(self, InviteError::AlreadyResponded)
    }
}

impl From<anyhow::Error> for InviteError {
    fn from(err: anyhow::Error) -> Self {
        InviteError::Unknown(format!("{err:#}"))
    }
}
