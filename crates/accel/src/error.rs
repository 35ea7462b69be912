//! Unified error type for accel.

use accel_net::NetError;
use accel_protocol::ProtocolError;
use accel_session::{CtrlError, SessionError};

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `accel` meta-crate, you deal with this single error
/// type instead of importing errors from each sub-crate. The `#[from]`
/// attribute on each variant generates the `From` impls `?` relies on.
#[derive(Debug, thiserror::Error)]
pub enum AccelError {
    /// Namespace or interface resolution failed.
    #[error(transparent)]
    Net(#[from] NetError),

    /// A backup record could not be encoded or decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session operation was refused.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A front-end reported a failure.
    #[error(transparent)]
    Ctrl(#[from] CtrlError),
}
