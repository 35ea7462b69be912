//! Namespace backend reading interface indexes from sysfs.

use std::io;
use std::path::PathBuf;

use crate::{Net, NetError};

const DEFAULT_SYSFS_ROOT: &str = "/sys/class/net";

/// Resolves interface indexes through `/sys/class/net/<ifname>/ifindex`.
///
/// sysfs reflects the namespace of the mounting process, so this is the
/// backend for the default namespace.
#[derive(Debug, Clone)]
pub struct SysfsNet {
    name: String,
    root: PathBuf,
}

impl SysfsNet {
    /// The init namespace, read from the standard sysfs mount.
    pub fn default_namespace() -> Self {
        Self::with_root("default", DEFAULT_SYSFS_ROOT)
    }

    /// A namespace whose sysfs class directory is mounted at `root`.
    pub fn with_root(name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            root: root.into(),
        }
    }
}

impl Net for SysfsNet {
    fn name(&self) -> &str {
        &self.name
    }

    fn get_ifindex(&self, ifname: &str) -> Result<u32, NetError> {
        let path = self.root.join(ifname).join("ifindex");
        let raw = std::fs::read_to_string(&path).map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                NetError::NotFound(ifname.to_string())
            } else {
                NetError::Io {
                    name: ifname.to_string(),
                    source,
                }
            }
        })?;

        raw.trim()
            .parse()
            .map_err(|_| NetError::MalformedIndex {
                name: ifname.to_string(),
                raw: raw.trim().to_string(),
            })
    }
}
