//! # rover
//!
//! Route overwrite for container network namespaces.
//!
//! rover runs after the plugins that created a container's interfaces and
//! addresses. It takes their result, applies a small declarative delta
//! (flush flags, routes to delete, routes to add) to the routing table of
//! the container namespace and reports the updated result.
//!
//! ## Usage
//!
//! ```no_run
//! use std::path::Path;
//!
//! use rover::config::NetConf;
//! use rover::reconcile::Reconciler;
//! use rover_network::NamespaceRouteApplier;
//!
//! # fn example(stdin: &[u8]) -> rover_common::RoverResult<()> {
//! let conf = NetConf::from_slice(stdin)?;
//! let result = Reconciler::new(NamespaceRouteApplier::new())
//!     .run(Path::new("/var/run/netns/blue"), &conf)?;
//! println!("{}", serde_json::to_string(&result)?);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod cli;
pub mod config;
pub mod diff;
pub mod reconcile;
pub mod result;

pub use config::{NetConf, ResolvedConfig, RouteOverrides};
pub use reconcile::Reconciler;
