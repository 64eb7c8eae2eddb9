//! Route model and the destination match predicate.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

use ipnetwork::{IpNetwork, Ipv4Network};
use serde::{Deserialize, Serialize};

use crate::error::RoverError;

/// Ordered list of routes. Duplicate destinations are allowed.
pub type RouteList = Vec<Route>;

/// A destination prefix with an optional gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    /// Destination prefix.
    pub dst: IpNetwork,
    /// Next hop.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gw: Option<IpAddr>,
}

impl Route {
    /// Create a route.
    #[must_use]
    pub fn new(dst: IpNetwork, gw: Option<IpAddr>) -> Self {
        Self { dst, gw }
    }

    /// Whether both routes target the same destination.
    ///
    /// The gateway is not part of the key.
    #[must_use]
    pub fn matches(&self, other: &Route) -> bool {
        same_destination(&self.dst, &other.dst)
    }

    /// Whether this is a default route (prefix length 0).
    #[must_use]
    pub fn is_default(&self) -> bool {
        self.dst.prefix() == 0
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.gw {
            Some(gw) => write!(f, "{} via {}", self.dst, gw),
            None => write!(f, "{}", self.dst),
        }
    }
}

/// Parses `10.0.0.0/24` or `10.0.0.0/24 via 10.0.0.1`.
impl FromStr for Route {
    type Err = RoverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (dst, gw) = match s.split_once(" via ") {
            Some((dst, gw)) => (dst.trim(), Some(gw.trim())),
            None => (s.trim(), None),
        };

        let dst = dst
            .parse::<IpNetwork>()
            .map_err(|e| RoverError::config(format!("invalid route destination '{dst}': {e}")))?;
        let gw = gw
            .map(|gw| {
                gw.parse::<IpAddr>()
                    .map_err(|e| RoverError::config(format!("invalid gateway '{gw}': {e}")))
            })
            .transpose()?;

        Ok(Self { dst, gw })
    }
}

/// Exact destination equality: same address bytes and same prefix length.
///
/// Never prefix containment: `10.0.0.0/24` does not match `10.0.0.0/16`.
/// Used both when computing the plan and when picking kernel routes to
/// remove, so the two cannot drift apart.
#[must_use]
pub fn same_destination(a: &IpNetwork, b: &IpNetwork) -> bool {
    a.ip() == b.ip() && a.prefix() == b.prefix()
}

/// The IPv4 default destination, `0.0.0.0/0`.
#[must_use]
pub fn default_v4_destination() -> IpNetwork {
    match Ipv4Network::new(Ipv4Addr::UNSPECIFIED, 0) {
        Ok(net) => IpNetwork::V4(net),
        Err(_) => unreachable!("prefix 0 is valid for IPv4"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn route(s: &str) -> Route {
        s.parse().unwrap()
    }

    #[test]
    fn parse_with_gateway() {
        let r = route("20.0.0.0/24 via 10.0.0.254");
        assert_eq!(r.dst.to_string(), "20.0.0.0/24");
        assert_eq!(r.gw, Some("10.0.0.254".parse().unwrap()));
        assert_eq!(r.to_string(), "20.0.0.0/24 via 10.0.0.254");
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!("not-a-route".parse::<Route>().is_err());
        assert!("10.0.0.0/24 via nowhere".parse::<Route>().is_err());
    }

    #[test]
    fn exact_match_only() {
        let rule = route("20.0.0.0/24");
        assert!(rule.matches(&route("20.0.0.0/24 via 10.0.0.254")));
        assert!(!rule.matches(&route("20.0.0.0/16")));
        assert!(!rule.matches(&route("20.0.1.0/24")));
    }

    #[test]
    fn default_destination() {
        let dst = default_v4_destination();
        assert_eq!(dst.to_string(), "0.0.0.0/0");
        assert!(Route::new(dst, None).is_default());
        assert!(!route("::/0").matches(&Route::new(dst, None)));
    }

    #[test]
    fn json_shape() {
        let r: Route = serde_json::from_str(r#"{"dst":"30.0.0.0/24"}"#).unwrap();
        assert_eq!(r.gw, None);
        assert_eq!(serde_json::to_string(&r).unwrap(), r#"{"dst":"30.0.0.0/24"}"#);

        let r: Route = serde_json::from_str(r#"{"dst":"0.0.0.0/0","gw":"10.0.0.1"}"#).unwrap();
        assert!(r.is_default());
    }

    proptest! {
        #[test]
        fn different_prefix_never_matches(a in any::<u32>(), p in 0u8..=32, q in 0u8..=32) {
            prop_assume!(p != q);
            let ip = IpAddr::V4(Ipv4Addr::from(a));
            let x = IpNetwork::new(ip, p).unwrap();
            let y = IpNetwork::new(ip, q).unwrap();
            prop_assert!(!same_destination(&x, &y));
            prop_assert!(same_destination(&x, &x));
        }
    }
}
