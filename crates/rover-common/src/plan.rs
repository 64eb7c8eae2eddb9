//! Reconciliation plan handed from the differ to the applier.

use crate::route::RouteList;

/// What to remove from and install into a namespace routing table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutePlan {
    /// Remove every route the sandbox interfaces did not bring themselves.
    pub flush_routes: bool,
    /// Remove every route without a destination after the additions.
    pub flush_gateway: bool,
    /// Routes whose destinations are removed from the kernel table.
    pub to_delete: RouteList,
    /// Routes installed on the sandbox interface, in order.
    pub to_add: RouteList,
    /// Route list reported back to the caller.
    pub final_routes: RouteList,
}

impl RoutePlan {
    /// Whether applying the plan would leave the kernel table untouched.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        !self.flush_routes
            && !self.flush_gateway
            && self.to_delete.is_empty()
            && self.to_add.is_empty()
    }
}
