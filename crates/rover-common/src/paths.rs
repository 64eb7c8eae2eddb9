//! Standard filesystem paths for rover.

use std::path::PathBuf;

use once_cell::sync::Lazy;

use crate::error::{RoverError, RoverResult};

/// Directory holding named network namespaces (default: /var/run/netns).
pub static NETNS_RUN_DIR: Lazy<PathBuf> = Lazy::new(|| {
    std::env::var("ROVER_NETNS_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/var/run/netns"))
});

/// Namespace file of the calling thread.
pub const THREAD_NETNS: &str = "/proc/thread-self/ns/net";

/// Resolve the namespace argument handed over by the runtime.
///
/// Paths are used as given. A bare name such as `blue` is looked up in
/// [`NETNS_RUN_DIR`], the way `ip netns` names them.
///
/// # Errors
///
/// Returns an error if the argument is empty.
pub fn resolve_netns_path(netns: &str) -> RoverResult<PathBuf> {
    let netns = netns.trim();
    if netns.is_empty() {
        return Err(RoverError::InvalidEnvironment {
            message: "network namespace path is empty".to_string(),
        });
    }

    if netns.contains('/') {
        Ok(PathBuf::from(netns))
    } else {
        Ok(NETNS_RUN_DIR.join(netns))
    }
}
