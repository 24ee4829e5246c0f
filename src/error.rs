//! Error taxonomy for the attachment core.
//!
//! Every fatal condition in ADD or DEL ends up as one of these variants and is
//! handed back to the dispatch layer unchanged.

use thiserror::Error;

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// CNI error code for an invalid network configuration.
pub const CODE_INVALID_CONFIG: u32 = 7;
/// First plugin-specific CNI error code.
pub const CODE_PLUGIN_BASE: u32 = 100;

/// Errors raised while attaching or detaching a container.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed configuration document, interface name or CIDR.
    #[error("invalid network configuration: {0}")]
    Input(String),

    /// Namespace path could not be resolved, entered or left.
    #[error("network namespace {path}: {reason}")]
    Namespace {
        /// Path of the namespace involved.
        path: String,
        /// What went wrong.
        reason: String,
    },

    /// A device with the requested name exists but has the wrong kind.
    #[error("{name} already exists but is not a {expected} (found {found})")]
    DeviceConflict {
        /// Device name.
        name: String,
        /// Kind the plugin needs.
        expected: &'static str,
        /// Kind the kernel reported.
        found: String,
    },

    /// A link lookup returned nothing.
    #[error("link {0} not found")]
    LinkNotFound(String),

    /// Any other netlink failure.
    #[error("failed to {op} {device}: {source}")]
    Kernel {
        /// Operation being performed, e.g. "create bridge".
        op: &'static str,
        /// Device the operation targeted.
        device: String,
        /// Underlying netlink error.
        #[source]
        source: rtnetlink::Error,
    },

    /// Socket or runtime setup failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The system randomness source could not supply bytes.
    #[error("failed to read random bytes for {0}")]
    Entropy(&'static str),
}

impl Error {
    /// Wrap a netlink error with the operation and device it belongs to.
    pub fn kernel(op: &'static str, device: impl Into<String>, source: rtnetlink::Error) -> Self {
        Self::Kernel {
            op,
            device: device.into(),
            source,
        }
    }

    /// Build a namespace error.
    pub fn namespace(path: impl Into<String>, reason: impl ToString) -> Self {
        Self::Namespace {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Errno carried by a kernel error, as a positive value.
    pub fn errno(&self) -> Option<i32> {
        match self {
            Self::Kernel {
                source: rtnetlink::Error::NetlinkError(msg),
                ..
            } => Some(msg.raw_code().abs()),
            _ => None,
        }
    }

    /// True when a create operation hit an existing device of the same name.
    pub fn is_exists(&self) -> bool {
        self.errno() == Some(libc::EEXIST)
    }

    /// True when the target device is already gone.
    pub fn is_gone(&self) -> bool {
        matches!(self, Self::LinkNotFound(_)) || self.errno() == Some(libc::ENODEV)
    }

    /// CNI error code reported to the runtime.
    pub fn code(&self) -> u32 {
        match self {
            Self::Input(_) => CODE_INVALID_CONFIG,
            Self::Namespace { .. } => CODE_PLUGIN_BASE + 1,
            Self::DeviceConflict { .. } => CODE_PLUGIN_BASE + 2,
            Self::LinkNotFound(_) | Self::Kernel { .. } | Self::Io(_) => CODE_PLUGIN_BASE + 3,
            Self::Entropy(_) => CODE_PLUGIN_BASE + 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = Error::DeviceConflict {
            name: "br0".to_string(),
            expected: "bridge",
            found: "veth".to_string(),
        };
        assert_eq!(err.to_string(), "br0 already exists but is not a bridge (found veth)");
    }

    #[test]
    fn error_codes() {
        assert_eq!(Error::Input("x".into()).code(), 7);
        assert_eq!(Error::namespace("/run/netns/a", "missing").code(), 101);
        assert_eq!(Error::LinkNotFound("eth0".into()).code(), 103);
        assert_eq!(Error::Entropy("MAC address").code(), 104);
    }

    #[test]
    fn link_not_found_is_gone() {
        assert!(Error::LinkNotFound("eth0".into()).is_gone());
        assert!(!Error::Input("x".into()).is_gone());
        assert!(!Error::Input("x".into()).is_exists());
    }

    #[test]
    fn error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "socket");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
