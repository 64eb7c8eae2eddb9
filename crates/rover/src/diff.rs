//! Route set differ.
//!
//! Computes which routes to remove, which to install and what the caller
//! should see afterwards. Pure: nothing here touches the kernel.

use std::net::{IpAddr, Ipv4Addr};

use rover_common::{IpConfig, Route, RoutePlan, default_v4_destination};

use crate::config::ResolvedConfig;

/// Compute the reconciliation plan for `prev` under `config`.
///
/// Surviving routes keep their relative order and come first, followed by
/// `add_routes` in the order given.
#[must_use]
pub fn diff_routes(prev: &[Route], config: &ResolvedConfig) -> RoutePlan {
    let default_route = Route::new(default_v4_destination(), None);

    let mut rules = config.del_routes.clone();
    if config.flush_gateway {
        rules.push(default_route.clone());
    }

    let mut plan = RoutePlan {
        flush_routes: config.flush_routes,
        flush_gateway: config.flush_gateway,
        ..Default::default()
    };

    if config.flush_routes {
        plan.to_delete = prev.to_vec();
    } else {
        for route in prev {
            if rules.iter().any(|rule| rule.matches(route)) {
                plan.to_delete.push(route.clone());
            } else {
                plan.final_routes.push(route.clone());
            }
        }
    }

    if config.flush_gateway && !plan.to_delete.iter().any(|r| r.matches(&default_route)) {
        plan.to_delete.push(default_route);
    }

    plan.to_add.clone_from(&config.add_routes);
    plan.final_routes.extend(config.add_routes.iter().cloned());

    tracing::debug!(
        kept = plan.final_routes.len() - plan.to_add.len(),
        delete = plan.to_delete.len(),
        add = plan.to_add.len(),
        "Computed route plan"
    );
    plan
}

/// Reset every address gateway to `0.0.0.0`.
pub fn clear_gateways(ips: &mut [IpConfig]) {
    for ip in ips {
        ip.gateway = Some(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
    }
}
