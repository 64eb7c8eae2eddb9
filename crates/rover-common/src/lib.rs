//! # rover-common
//!
//! Shared types for the rover route reconciliation engine.
//!
//! This crate provides functionality used across all rover crates:
//! - The route model and its destination match predicate
//! - The CNI result shape consumed and produced by the plugin
//! - The reconciliation plan handed from the differ to the applier
//! - Common error types
//! - Standard filesystem paths

#![warn(missing_docs)]

pub mod error;
pub mod paths;
pub mod plan;
pub mod result;
pub mod route;

pub use error::{RoverError, RoverResult};
pub use paths::{NETNS_RUN_DIR, resolve_netns_path};
pub use plan::RoutePlan;
pub use result::{CniResult, Interface, IpConfig};
pub use route::{Route, RouteList, default_v4_destination, same_destination};
