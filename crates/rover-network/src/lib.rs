//! # rover-network
//!
//! Namespace-scoped route operations for rover.
//!
//! This crate moves the calling thread into a container's network
//! namespace and reconciles its routing table over rtnetlink.

#![warn(missing_docs)]

pub mod applier;
pub mod netns;
#[cfg(target_os = "linux")]
pub mod table;

pub use applier::{ApplyReport, NamespaceRouteApplier, RouteApplier, RouteFailure, RouteOp};
pub use netns::{NetNs, NetNsGuard, current_netns_inode};
