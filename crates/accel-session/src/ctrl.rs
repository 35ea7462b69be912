//! The control interface every access-protocol front-end implements.
//!
//! The session core never knows whether it is driving a PPPoE link, an
//! IPoE subscriber or an L2TP tunnel. It holds one [`ControlInterface`]
//! per session, bound at creation, and calls through it whenever a
//! lifecycle step needs protocol-specific work.
//!
//! # Contract
//!
//! - Each method is called at most once per logical event (one
//!   `acct_start` per session, one `terminate` per termination).
//! - Methods must not block for long. Slow work (netlink, AAA round
//!   trips) goes to the front-end's own tasks, which report back through
//!   the session's notification methods ([`Session::started`],
//!   [`Session::finished`], [`Session::ifup`], ...).
//! - The core never holds a session lock while calling in, so a method
//!   may call straight back into the session. A hard `terminate` that
//!   tears down synchronously and calls [`Session::finished`] before
//!   returning is fine.
//! - Failures are returned as [`CtrlError`] and treated as non-fatal.

use std::fmt;
use std::net::Ipv4Addr;

use accel_protocol::{Counters, HwAddr};
use serde::{Deserialize, Serialize};

use crate::{CtrlError, Session};

/// The access technology behind a control interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CtrlKind {
    Ppp,
    Pppoe,
    Ipoe,
    L2tp,
    Pptp,
    Sstp,
}

impl fmt::Display for CtrlKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ppp => "ppp",
            Self::Pppoe => "pppoe",
            Self::Ipoe => "ipoe",
            Self::L2tp => "l2tp",
            Self::Pptp => "pptp",
            Self::Sstp => "sstp",
        };
        f.write_str(name)
    }
}

/// Lifecycle commands and protocol-specific actions a front-end provides.
///
/// Only [`kind`](Self::kind) and [`terminate`](Self::terminate) are
/// mandatory; the rest default to "nothing to do" or
/// [`CtrlError::Unsupported`].
///
/// # Example
///
/// ```rust
/// use accel_session::{ControlInterface, CtrlError, CtrlKind, Session};
///
/// struct LoopbackCtrl;
///
/// impl ControlInterface for LoopbackCtrl {
///     fn kind(&self) -> CtrlKind {
///         CtrlKind::Ppp
///     }
///
///     fn terminate(&self, session: &Session, _hard: bool) -> Result<(), CtrlError> {
///         // Nothing to negotiate: tear down immediately.
///         session.finished();
///         Ok(())
///     }
/// }
/// ```
pub trait ControlInterface: Send + Sync + 'static {
    /// Which access technology this front-end speaks.
    fn kind(&self) -> CtrlKind;

    /// Begin negotiation for a fresh session.
    fn start(&self, _session: &Session) -> Result<(), CtrlError> {
        Ok(())
    }

    /// Re-attach to a session restored from a backup.
    fn restart(&self, _session: &Session) -> Result<(), CtrlError> {
        Err(CtrlError::Unsupported("restart"))
    }

    /// Tear the session down.
    ///
    /// `hard` means drop the link now. Soft means try a graceful protocol
    /// shutdown first; escalating to hard if the peer never confirms is
    /// the front-end's responsibility. Either way the front-end calls
    /// [`Session::finished`] once cleanup is complete.
    fn terminate(&self, session: &Session, hard: bool) -> Result<(), CtrlError>;

    /// Called after the session has left the registry.
    fn finished(&self, _session: &Session) {}

    /// Apply new shaper rates, in kbit/s.
    fn change_shaper(&self, _session: &Session, _down: u32, _up: u32) -> Result<(), CtrlError> {
        Err(CtrlError::Unsupported("change_shaper"))
    }

    /// Apply interface configuration (addresses, routes) before the
    /// session goes active.
    fn ifcfg(&self, _session: &Session) -> Result<(), CtrlError> {
        Ok(())
    }

    /// Push a changed IPv6 lease to the link.
    fn update_ipv6_addr(&self, _session: &Session) -> Result<(), CtrlError> {
        Ok(())
    }

    /// Postpone closing the link (e.g. to flush a final message).
    fn delay_close(&self, _session: &Session) -> Result<(), CtrlError> {
        Err(CtrlError::Unsupported("delay_close"))
    }

    /// Current link counters, counted since the front-end bound (or
    /// re-bound, after a restore) the link. `None` if unavailable.
    fn read_stats(&self, _session: &Session) -> Option<Counters> {
        None
    }

    /// Set the link MTU.
    fn set_mtu(&self, _session: &Session, _mtu: u16) -> Result<(), CtrlError> {
        Err(CtrlError::Unsupported("set_mtu"))
    }

    /// Set the gateway address announced to the subscriber.
    fn set_gw_addr(&self, _session: &Session, _addr: Ipv4Addr) -> Result<(), CtrlError> {
        Err(CtrlError::Unsupported("set_gw_addr"))
    }

    /// Accounting has begun for this session.
    fn acct_start(&self, _session: &Session) -> Result<(), CtrlError> {
        Ok(())
    }

    /// Install MPPE session keys.
    fn set_mppe_keys(&self, _session: &Session, _send_key: &[u8], _recv_key: &[u8]) {}

    /// The subscriber's hardware address, for front-ends that bind one
    /// (IPoE). Used to correlate DHCPv6 client identifiers.
    fn hwaddr(&self, _session: &Session) -> Option<HwAddr> {
        None
    }
}
