//! Network resource binding for accel.
//!
//! Sessions never talk to the kernel directly. They hold a [`NetHandle`]
//! for the network namespace they live in and ask it to resolve interface
//! names to indexes. The handle is reference-counted independently of any
//! session: the namespace backend is released exactly once, when the last
//! handle goes away.
//!
//! # Implementations
//!
//! - [`SysfsNet`]: resolves indexes through `/sys/class/net` (the
//!   process's own namespace). This is the usual default namespace.
//! - [`StaticNet`]: an in-memory table, used by simulators and tests.

mod error;
mod static_net;
mod sysfs;

pub use error::NetError;
pub use static_net::StaticNet;
pub use sysfs::SysfsNet;

use std::fmt;
use std::sync::Arc;

/// Size of the kernel's interface-name buffer, including the trailing NUL.
pub const IFNAMSIZ: usize = 16;

/// Longest interface name the kernel accepts, in bytes.
pub const MAX_IFNAME_LEN: usize = IFNAMSIZ - 1;

/// A network namespace backend.
///
/// One instance exists per namespace. Implementations must be cheap to
/// query; index resolution happens on the session's own context and must
/// not block for long.
pub trait Net: Send + Sync + 'static {
    /// Human-readable namespace name (`"default"` for the init namespace).
    fn name(&self) -> &str;

    /// Resolves an interface name to its kernel index.
    fn get_ifindex(&self, ifname: &str) -> Result<u32, NetError>;

    /// Called once, when the last [`NetHandle`] is dropped.
    fn release(&self) {}
}

/// Checks that `name` is acceptable as a Linux interface name.
///
/// The same rules apply to VRF names, which are interface names too.
pub fn validate_ifname(name: &str) -> Result<(), NetError> {
    let invalid = |reason| NetError::InvalidName {
        name: name.to_string(),
        reason,
    };

    if name.is_empty() {
        return Err(invalid("empty"));
    }
    if name.len() > MAX_IFNAME_LEN {
        return Err(NetError::NameTooLong {
            name: name.to_string(),
            len: name.len(),
            max: MAX_IFNAME_LEN,
        });
    }
    if name == "." || name == ".." {
        return Err(invalid("reserved"));
    }
    if name.chars().any(|c| c == '/' || c == ':' || c.is_whitespace()) {
        return Err(invalid("contains '/', ':' or whitespace"));
    }
    Ok(())
}

struct NetSlot {
    net: Box<dyn Net>,
}

impl Drop for NetSlot {
    fn drop(&mut self) {
        tracing::debug!(net = self.net.name(), "releasing network namespace");
        self.net.release();
    }
}

/// Shared handle to a network namespace backend.
///
/// Cloning (or [`acquire`](Self::acquire)) takes another reference;
/// dropping (or [`release`](Self::release)) gives it back. The backend's
/// [`Net::release`] runs when the count reaches zero.
#[derive(Clone)]
pub struct NetHandle {
    slot: Arc<NetSlot>,
}

impl NetHandle {
    /// Wraps a backend. The returned handle is the first reference.
    pub fn new(net: impl Net) -> Self {
        tracing::debug!(net = net.name(), "network namespace acquired");
        Self {
            slot: Arc::new(NetSlot { net: Box::new(net) }),
        }
    }

    /// Takes another reference to the same namespace.
    pub fn acquire(&self) -> Self {
        self.clone()
    }

    /// Gives this reference back.
    pub fn release(self) {
        drop(self);
    }

    /// The namespace name.
    pub fn name(&self) -> &str {
        self.slot.net.name()
    }

    /// Validates `ifname` and resolves it to a kernel index.
    pub fn get_ifindex(&self, ifname: &str) -> Result<u32, NetError> {
        validate_ifname(ifname)?;
        self.slot.net.get_ifindex(ifname)
    }

    /// Number of live references to this namespace.
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.slot)
    }

    /// Returns `true` if both handles point at the same namespace.
    pub fn same_namespace(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.slot, &other.slot)
    }
}

impl fmt::Debug for NetHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetHandle")
            .field("name", &self.name())
            .field("handles", &self.handle_count())
            .finish()
    }
}
