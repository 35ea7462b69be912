//! Lifecycle notifications published by the registry.
//!
//! Subsystems that are not part of the core (accounting, address pools,
//! scripting hooks) subscribe through
//! [`SessionRegistry::subscribe`](crate::SessionRegistry::subscribe)
//! instead of being called directly. Delivery is best-effort: a slow
//! subscriber that falls behind the channel capacity misses events.

use accel_protocol::{SessionId, TerminateCause};

/// A lifecycle transition of one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Registered in STARTING (or RESTORE, with `restored` set).
    Starting { id: SessionId, restored: bool },
    /// The interface is configured and about to come up.
    PreUp { id: SessionId },
    /// Moved to ACTIVE.
    Started { id: SessionId },
    /// Accounting began.
    AcctStart { id: SessionId },
    /// The interface got a new name.
    Renamed { id: SessionId, ifname: String },
    /// Termination requested; cleanup in flight.
    Finishing { id: SessionId, cause: TerminateCause },
    /// The interface was torn down.
    IfDown { id: SessionId },
    /// Cleanup complete; the session left the registry.
    Finished { id: SessionId, cause: TerminateCause },
}

impl SessionEvent {
    /// The session the event is about.
    pub fn session_id(&self) -> SessionId {
        match self {
            Self::Starting { id, .. }
            | Self::PreUp { id }
            | Self::Started { id }
            | Self::AcctStart { id }
            | Self::Renamed { id, .. }
            | Self::Finishing { id, .. }
            | Self::IfDown { id }
            | Self::Finished { id, .. } => *id,
        }
    }
}
