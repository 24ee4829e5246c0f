//! Network namespace handles and scoped execution.
//!
//! `setns(2)` changes the namespace of the calling thread only. Everything in
//! here assumes the caller runs on the single thread owned by
//! [`crate::runtime::PinnedRuntime`].

use std::fs::File;
use std::future::Future;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};

use nix::sched::{setns, CloneFlags};
use nix::sys::statfs::statfs;
use tracing::{debug, error, trace};

use crate::error::{Error, Result};

const NSFS_MAGIC: i64 = 0x6e73_6673;
const PROC_SUPER_MAGIC: i64 = 0x9fa0;
const THREAD_NETNS: &str = "/proc/thread-self/ns/net";

/// An open reference to a network namespace.
#[derive(Debug)]
pub struct NetNs {
    file: File,
    path: PathBuf,
}

impl NetNs {
    /// Open the namespace bound at `path` (e.g. `/var/run/netns/foo` or
    /// `/proc/<pid>/ns/net`).
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let shown = path.display().to_string();
        if path.as_os_str().is_empty() {
            return Err(Error::namespace(shown, "no namespace path given"));
        }

        let stat = statfs(path).map_err(|e| Error::namespace(&shown, e))?;
        let magic = stat.filesystem_type().0 as i64;
        if magic != NSFS_MAGIC && magic != PROC_SUPER_MAGIC {
            return Err(Error::namespace(
                shown,
                format!("unknown filesystem type {magic:#x}, not a network namespace"),
            ));
        }

        let file = File::open(path).map_err(|e| Error::namespace(&shown, e))?;
        trace!(netns = %shown, "opened network namespace");
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// The namespace the calling thread is in right now.
    pub fn current() -> Result<Self> {
        Self::from_path(THREAD_NETNS)
    }

    /// Path this handle was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Move the calling thread into this namespace.
    pub fn set(&self) -> Result<()> {
        setns(self.file.as_raw_fd(), CloneFlags::CLONE_NEWNET)
            .map_err(|e| Error::namespace(self.path.display().to_string(), format!("setns: {e}")))
    }

    /// Poll `fut` to completion with the calling thread inside this namespace.
    ///
    /// The original namespace is restored on every exit path. If restoring
    /// fails, that error wins over the future's own result.
    pub async fn exec<F, T>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let guard = NsGuard::enter(self)?;
        let result = fut.await;
        guard.exit()?;
        result
    }
}

impl AsRawFd for NetNs {
    fn as_raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}

/// Holds the namespace to return to. Dropping it without `exit` still restores.
struct NsGuard {
    original: Option<NetNs>,
}

impl NsGuard {
    fn enter(target: &NetNs) -> Result<Self> {
        let original = NetNs::current()?;
        target.set()?;
        debug!(netns = %target.path.display(), "entered network namespace");
        Ok(Self {
            original: Some(original),
        })
    }

    fn exit(mut self) -> Result<()> {
        match self.original.take() {
            Some(original) => {
                original.set()?;
                debug!("restored original network namespace");
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl Drop for NsGuard {
    fn drop(&mut self) {
        if let Some(original) = self.original.take() {
            if let Err(e) = original.set() {
                error!("failed to restore network namespace: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_path_is_rejected() {
        let err = NetNs::from_path("").unwrap_err();
        assert!(matches!(err, Error::Namespace { .. }));
    }

    #[test]
    fn missing_path_is_rejected() {
        let err = NetNs::from_path("/var/run/netns/does-not-exist-12345").unwrap_err();
        assert!(matches!(err, Error::Namespace { .. }));
        assert_eq!(err.code(), 101);
    }

    #[test]
    fn regular_file_is_not_a_namespace() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let err = NetNs::from_path(file.path()).unwrap_err();
        assert!(err.to_string().contains("not a network namespace"));
    }

    #[test]
    fn current_namespace_opens() {
        let ns = NetNs::current().unwrap();
        assert_eq!(ns.path(), Path::new(THREAD_NETNS));
        assert!(ns.as_raw_fd() >= 0);
    }
}
