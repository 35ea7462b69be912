//! Error types for the session layer.

use accel_net::NetError;
use accel_protocol::{ProtocolError, SessionId};

use crate::SessionState;

/// Errors that can occur while driving a session.
///
/// None of these are fatal to the process: a failed notification leaves
/// the session exactly as it was and the caller decides what to do next.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The session is FINISHING or already terminated.
    #[error("session {0} is terminating")]
    Terminating(SessionId),

    /// The operation does not apply in the session's current state.
    #[error("session {id} is {state}, cannot {op}")]
    InvalidState {
        /// The session.
        id: SessionId,
        /// Its state when the operation was attempted.
        state: SessionState,
        /// The attempted operation.
        op: &'static str,
    },

    /// Single-session policy refused a second login for this user.
    #[error("user {0} already has an active session")]
    DuplicateUsername(String),

    /// A session with this id is already registered.
    #[error("session {0} is already registered")]
    AlreadyRegistered(SessionId),

    /// The backup was taken from a different kind of front-end.
    #[error("backup of session {id} belongs to a {expected} front-end, not {actual}")]
    BackupMismatch {
        /// The session being restored.
        id: SessionId,
        /// The front-end kind recorded in the backup.
        expected: crate::CtrlKind,
        /// The front-end kind offered for the restore.
        actual: crate::CtrlKind,
    },

    /// The registry no longer accepts new sessions.
    #[error("session registry is shutting down")]
    ShuttingDown,

    /// Interface name or index resolution failed.
    #[error(transparent)]
    Net(#[from] NetError),

    /// The front-end rejected a request.
    #[error(transparent)]
    Ctrl(#[from] CtrlError),

    /// A backup record failed to encode or decode.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Failure reported by a [`ControlInterface`](crate::ControlInterface)
/// implementation.
///
/// The core logs these and carries on; retrying or escalating is the
/// front-end's job.
#[derive(Debug, thiserror::Error)]
pub enum CtrlError {
    /// The front-end does not implement this capability.
    #[error("{0} is not supported by this front-end")]
    Unsupported(&'static str),

    /// The front-end tried and failed.
    #[error("front-end failure: {0}")]
    Failed(String),
}
