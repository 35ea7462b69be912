//! Subscriber session lifecycle for accel.
//!
//! This crate is the core every access front-end plugs into:
//!
//! 1. **Sessions**: one [`Session`] per subscriber, with a state machine
//!    (STARTING → ACTIVE → FINISHING, or RESTORE after a restart)
//! 2. **Control interface**: the [`ControlInterface`] trait each front-end
//!    (PPPoE, IPoE, L2TP, ...) implements
//! 3. **Registry**: the [`SessionRegistry`] that enumerates sessions, keeps
//!    aggregate counters and publishes [`SessionEvent`]s
//! 4. **Extensions**: typed per-session state for other subsystems
//!    ([`SessionExtension`])
//!
//! # How it fits in the stack
//!
//! ```text
//! Front-ends (PPPoE, IPoE, ...)  ← implement ControlInterface, drive lifecycle
//!     ↕
//! Session core (this crate)      ← state machine, registry, refcounting
//!     ↕
//! Protocol / Net                 ← ids, counters, DHCPv6 matching, namespaces
//! ```
//!
//! # Termination
//!
//! [`Session::terminate`] may be called any number of times from anywhere;
//! only the first call records a cause and reaches the front-end. The
//! front-end reports completion with [`Session::finished`], which removes
//! the session from the registry. The session itself is freed when the
//! last [`Session`] reference is dropped.

mod backup;
mod ctrl;
mod error;
mod events;
mod extensions;
mod lease;
mod registry;
mod session;
mod traffic;

#[cfg(test)]
mod testing;

pub use backup::SessionBackup;
pub use ctrl::{ControlInterface, CtrlKind};
pub use error::{CtrlError, SessionError};
pub use events::SessionEvent;
pub use extensions::SessionExtension;
pub use lease::{Ipv4Lease, Ipv6Lease};
pub use registry::{SessionRegistry, SessionStat};
pub use session::{
    Session, SessionConfig, SessionInfo, SessionState, SingleSessionPolicy, WeakSession,
};
pub use traffic::AcctRecord;
