/// Errors that can occur while resolving network resources.
#[derive(Debug, thiserror::Error)]
pub enum NetError {
    /// The interface name is empty or contains characters the kernel rejects.
    #[error("invalid interface name {name:?}: {reason}")]
    InvalidName {
        /// The rejected name.
        name: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// The interface name does not fit the platform limit.
    #[error("interface name {name:?} is {len} bytes, limit is {max}")]
    NameTooLong {
        /// The rejected name.
        name: String,
        /// Its length in bytes.
        len: usize,
        /// The maximum accepted length in bytes.
        max: usize,
    },

    /// No interface with this name exists in the namespace.
    #[error("interface {0} not found")]
    NotFound(String),

    /// Reading the interface index failed.
    #[error("failed to resolve interface {name}: {source}")]
    Io {
        /// The interface being resolved.
        name: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The interface index could not be parsed.
    #[error("interface {name} has malformed index {raw:?}")]
    MalformedIndex {
        /// The interface being resolved.
        name: String,
        /// The raw text that failed to parse.
        raw: String,
    },
}
