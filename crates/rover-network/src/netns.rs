//! Network namespace operations.
//!
//! Entering a network namespace changes a property of the calling thread,
//! not of the process. [`NetNs::enter`] therefore hands out a guard that
//! moves the thread back into its original namespace when dropped, and
//! [`NetNs::run`] scopes a closure to the target namespace.

use std::fs::File;
use std::path::{Path, PathBuf};

use rover_common::paths::THREAD_NETNS;
use rover_common::{RoverError, RoverResult};

/// An open handle on a network namespace.
#[derive(Debug)]
pub struct NetNs {
    file: File,
    path: PathBuf,
}

impl NetNs {
    /// Open the namespace at `path` (e.g. `/var/run/netns/blue` or
    /// `/proc/<pid>/ns/net`).
    ///
    /// # Errors
    ///
    /// Returns [`RoverError::Namespace`] if the file cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> RoverResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|e| RoverError::Namespace {
            path: path.display().to_string(),
            message: format!("failed to open: {e}"),
        })?;

        tracing::debug!(path = %path.display(), "Opened network namespace");
        Ok(Self { file, path })
    }

    /// Open the namespace the calling thread currently lives in.
    pub fn current() -> RoverResult<Self> {
        Self::open(THREAD_NETNS)
    }

    /// Path the namespace was opened from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Inode identifying the namespace.
    pub fn inode(&self) -> RoverResult<u64> {
        use std::os::unix::fs::MetadataExt;

        Ok(self.file.metadata()?.ino())
    }

    /// Move the calling thread into this namespace.
    ///
    /// The returned guard restores the previous namespace when dropped or
    /// when [`NetNsGuard::restore`] is called.
    pub fn enter(&self) -> RoverResult<NetNsGuard> {
        let original = Self::current()?;
        setns(self)?;

        tracing::debug!(path = %self.path.display(), "Entered network namespace");
        Ok(NetNsGuard {
            original: Some(original),
        })
    }

    /// Run `f` with the calling thread inside this namespace.
    ///
    /// The original namespace is restored on every exit path, including
    /// when `f` fails or panics. A failed restore takes precedence over the
    /// result of `f`.
    pub fn run<T>(&self, f: impl FnOnce() -> RoverResult<T>) -> RoverResult<T> {
        let guard = self.enter()?;
        let result = f();
        guard.restore()?;
        result
    }
}

/// Keeps the calling thread inside a namespace until released.
#[derive(Debug)]
#[must_use = "the namespace is left as soon as the guard is dropped"]
pub struct NetNsGuard {
    original: Option<NetNs>,
}

impl NetNsGuard {
    /// Move the thread back into the namespace it came from.
    ///
    /// # Errors
    ///
    /// Returns [`RoverError::Namespace`] if `setns` fails.
    pub fn restore(mut self) -> RoverResult<()> {
        match self.original.take() {
            Some(original) => {
                setns(&original).map_err(restore_failed)?;
                tracing::debug!(path = %original.path.display(), "Restored network namespace");
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl Drop for NetNsGuard {
    fn drop(&mut self) {
        if let Some(original) = self.original.take() {
            if let Err(e) = setns(&original) {
                tracing::error!(error = %e, "Failed to restore network namespace");
            }
        }
    }
}

/// Reclassify a failed `setns` back into the original namespace.
fn restore_failed(err: RoverError) -> RoverError {
    match err {
        RoverError::Namespace { path, message } => RoverError::NamespaceRestore { path, message },
        other => other,
    }
}

/// Inode of the calling thread's network namespace.
pub fn current_netns_inode() -> RoverResult<u64> {
    NetNs::current()?.inode()
}

#[cfg(target_os = "linux")]
fn setns(ns: &NetNs) -> RoverResult<()> {
    use rustix::thread::{LinkNameSpaceType, move_into_link_name_space};
    use std::os::fd::AsFd;

    move_into_link_name_space(ns.file.as_fd(), Some(LinkNameSpaceType::Network)).map_err(|e| {
        RoverError::Namespace {
            path: ns.path.display().to_string(),
            message: format!("setns failed: {e}"),
        }
    })
}

#[cfg(not(target_os = "linux"))]
fn setns(_ns: &NetNs) -> RoverResult<()> {
    Err(RoverError::Unsupported {
        feature: "network namespaces".to_string(),
    })
}
