//! Result assembly.

use rover_common::{CniResult, RoutePlan};

use crate::diff::clear_gateways;

/// Build the result reported to the runtime.
///
/// Interfaces, addresses and DNS settings are copied from `prev`; routes
/// are the plan's final list. Address gateways are zeroed when the plan
/// flushes the gateway. An empty `cni_version` keeps the previous one.
#[must_use]
pub fn build_result(prev: &CniResult, plan: &RoutePlan, cni_version: &str) -> CniResult {
    let mut result = CniResult {
        cni_version: if cni_version.is_empty() {
            prev.cni_version.clone()
        } else {
            Some(cni_version.to_string())
        },
        interfaces: prev.interfaces.clone(),
        ips: prev.ips.clone(),
        routes: plan.final_routes.clone(),
        dns: prev.dns.clone(),
    };

    if plan.flush_gateway {
        clear_gateways(&mut result.ips);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prev() -> CniResult {
        serde_json::from_str(
            r#"{
                "cniVersion": "0.3.1",
                "interfaces": [{"name": "eth0", "sandbox": "/var/run/netns/blue"}],
                "ips": [{"version": "4", "address": "10.0.0.2/24", "gateway": "10.0.0.1", "interface": 0}],
                "routes": [{"dst": "0.0.0.0/0", "gw": "10.0.0.1"}],
                "dns": {"nameservers": ["10.0.0.53"]}
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn copies_everything_but_routes() {
        let plan = RoutePlan {
            final_routes: vec!["30.0.0.0/24".parse().unwrap()],
            ..Default::default()
        };
        let result = build_result(&prev(), &plan, "1.0.0");

        assert_eq!(result.cni_version.as_deref(), Some("1.0.0"));
        assert_eq!(result.interfaces, prev().interfaces);
        assert_eq!(result.ips, prev().ips);
        assert_eq!(result.dns, prev().dns);
        assert_eq!(result.routes, plan.final_routes);
    }

    #[test]
    fn flush_gateway_zeroes_ip_gateways() {
        let plan = RoutePlan {
            flush_gateway: true,
            ..Default::default()
        };
        let result = build_result(&prev(), &plan, "");

        assert_eq!(result.cni_version.as_deref(), Some("0.3.1"));
        assert_eq!(result.ips[0].gateway, Some("0.0.0.0".parse().unwrap()));
        assert!(result.routes.is_empty());
    }
}
