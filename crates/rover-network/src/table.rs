//! Kernel routing table access over rtnetlink.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use futures::TryStreamExt;
use ipnetwork::IpNetwork;
use rtnetlink::packet_route::AddressFamily;
use rtnetlink::packet_route::route::{
    RouteAddress, RouteAttribute, RouteMessage, RouteProtocol, RouteScope,
};
use rtnetlink::{Handle, RouteMessageBuilder};

use rover_common::{Route, RoverError, RoverResult, same_destination};

/// `RT_TABLE_MAIN`.
const MAIN_TABLE: u32 = 254;

/// A route as currently installed in the kernel.
#[derive(Debug, Clone)]
pub struct KernelRoute {
    message: RouteMessage,
    destination: Option<IpNetwork>,
    gateway: Option<IpAddr>,
}

impl KernelRoute {
    fn from_message(message: RouteMessage) -> Self {
        let prefix = message.header.destination_prefix_length;
        let mut destination = None;
        let mut gateway = None;

        for attr in &message.attributes {
            match attr {
                RouteAttribute::Destination(addr) => {
                    destination =
                        route_address(addr).and_then(|ip| IpNetwork::new(ip, prefix).ok());
                }
                RouteAttribute::Gateway(addr) => gateway = route_address(addr),
                _ => {}
            }
        }

        Self {
            message,
            destination,
            gateway,
        }
    }

    /// Whether the kernel reported an explicit destination.
    ///
    /// Default routes are dumped without one.
    #[must_use]
    pub fn has_destination(&self) -> bool {
        self.destination.is_some()
    }

    /// Destination prefix, the family's default prefix when absent.
    #[must_use]
    pub fn destination(&self) -> IpNetwork {
        self.destination.unwrap_or_else(|| {
            let any = if self.is_ipv6() {
                IpAddr::V6(Ipv6Addr::UNSPECIFIED)
            } else {
                IpAddr::V4(Ipv4Addr::UNSPECIFIED)
            };
            IpNetwork::new(any, 0).unwrap_or_else(|_| unreachable!("prefix 0 is always valid"))
        })
    }

    /// Whether the route covers the interface's own subnet.
    #[must_use]
    pub fn is_link_scope(&self) -> bool {
        self.message.header.scope == RouteScope::Link
    }

    /// Whether the route belongs to the interface itself and survives a flush.
    ///
    /// IPv6 prefix routes such as `fe80::/64` are installed by the kernel with
    /// universe scope, so the originating protocol is checked as well.
    #[must_use]
    pub fn is_interface_route(&self) -> bool {
        self.is_link_scope() || self.message.header.protocol == RouteProtocol::Kernel
    }

    /// Whether this route targets the same destination as `route`.
    #[must_use]
    pub fn matches(&self, route: &Route) -> bool {
        same_destination(&self.destination(), &route.dst)
    }

    fn is_ipv6(&self) -> bool {
        self.message.header.address_family == AddressFamily::Inet6
    }

    fn output_interface(&self) -> Option<u32> {
        self.message.attributes.iter().find_map(|attr| match attr {
            RouteAttribute::Oif(index) => Some(*index),
            _ => None,
        })
    }

    fn table(&self) -> u32 {
        self.message
            .attributes
            .iter()
            .find_map(|attr| match attr {
                RouteAttribute::Table(table) => Some(*table),
                _ => None,
            })
            .unwrap_or_else(|| u32::from(self.message.header.table))
    }
}

impl std::fmt::Display for KernelRoute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.gateway {
            Some(gw) => write!(f, "{} via {}", self.destination(), gw),
            None => write!(f, "{}", self.destination()),
        }
    }
}

fn route_address(addr: &RouteAddress) -> Option<IpAddr> {
    match addr {
        RouteAddress::Inet(v4) => Some(IpAddr::V4(*v4)),
        RouteAddress::Inet6(v6) => Some(IpAddr::V6(*v6)),
        _ => None,
    }
}

/// Errno carried by a netlink error reply, if any.
pub fn errno(err: &rtnetlink::Error) -> Option<i32> {
    match err {
        rtnetlink::Error::NetlinkError(msg) => msg.code.map(|code| -code.get()),
        _ => None,
    }
}

/// Routing table of the namespace the netlink socket was opened in.
pub struct RouteTable {
    handle: Handle,
}

impl RouteTable {
    /// Open a netlink socket in the calling thread's namespace.
    ///
    /// Must be called from within a tokio runtime; the connection task is
    /// spawned onto it.
    pub fn connect() -> RoverResult<Self> {
        let (connection, handle, _) = rtnetlink::new_connection().map_err(|e| RoverError::Netlink {
            message: format!("failed to create netlink connection: {e}"),
        })?;
        tokio::spawn(connection);

        Ok(Self { handle })
    }

    /// Index of the interface called `name`.
    pub async fn link_index(&self, name: &str) -> RoverResult<u32> {
        let mut links = self.handle.link().get().match_name(name.to_string()).execute();

        match links.try_next().await {
            Ok(Some(link)) => Ok(link.header.index),
            Ok(None) => Err(RoverError::Lookup {
                message: format!("interface {name} not found"),
            }),
            Err(e) => Err(RoverError::Lookup {
                message: format!("interface {name}: {e}"),
            }),
        }
    }

    /// Main-table IPv4 and IPv6 routes leaving through interface `index`.
    pub async fn routes(&self, index: u32) -> RoverResult<Vec<KernelRoute>> {
        let mut routes = Vec::new();

        for filter in [
            RouteMessageBuilder::<Ipv4Addr>::new().build(),
            RouteMessageBuilder::<Ipv6Addr>::new().build(),
        ] {
            let mut stream = self.handle.route().get(filter).execute();
            while let Some(message) =
                stream
                    .try_next()
                    .await
                    .map_err(|e| RoverError::RouteOperation {
                        operation: "dump",
                        route: format!("link {index}"),
                        message: e.to_string(),
                    })?
            {
                let route = KernelRoute::from_message(message);
                if route.output_interface() == Some(index) && route.table() == MAIN_TABLE {
                    routes.push(route);
                }
            }
        }

        tracing::trace!(index, count = routes.len(), "Dumped routes");
        Ok(routes)
    }

    /// Remove a route previously returned by [`RouteTable::routes`].
    pub async fn delete(&self, route: &KernelRoute) -> Result<(), rtnetlink::Error> {
        self.handle.route().del(route.message.clone()).execute().await
    }

    /// Install `route` on interface `index` with universal scope.
    ///
    /// Returns `false` when an identical route was already installed.
    pub async fn add(&self, index: u32, route: &Route) -> RoverResult<bool> {
        let message = add_message(index, route)?;
        match self.handle.route().add(message).execute().await {
            Ok(()) => Ok(true),
            Err(e) if errno(&e) == Some(libc::EEXIST) => Ok(false),
            Err(e) => Err(RoverError::RouteOperation {
                operation: "add",
                route: route.to_string(),
                message: e.to_string(),
            }),
        }
    }
}

fn add_message(index: u32, route: &Route) -> RoverResult<RouteMessage> {
    let mismatch = || RoverError::RouteOperation {
        operation: "add",
        route: route.to_string(),
        message: "gateway and destination belong to different address families".to_string(),
    };

    let message = match route.dst {
        IpNetwork::V4(dst) => {
            let mut builder = RouteMessageBuilder::<Ipv4Addr>::new()
                .destination_prefix(dst.ip(), dst.prefix())
                .output_interface(index)
                .scope(RouteScope::Universe);
            match route.gw {
                Some(IpAddr::V4(gw)) => builder = builder.gateway(gw),
                Some(IpAddr::V6(_)) => return Err(mismatch()),
                None => {}
            }
            builder.build()
        }
        IpNetwork::V6(dst) => {
            let mut builder = RouteMessageBuilder::<Ipv6Addr>::new()
                .destination_prefix(dst.ip(), dst.prefix())
                .output_interface(index)
                .scope(RouteScope::Universe);
            match route.gw {
                Some(IpAddr::V6(gw)) => builder = builder.gateway(gw),
                Some(IpAddr::V4(_)) => return Err(mismatch()),
                None => {}
            }
            builder.build()
        }
    };

    Ok(message)
}
