//! Applies a [`RoutePlan`] to the routing table of a network namespace.

use std::fmt;
use std::path::Path;

use rover_common::{Interface, Route, RoutePlan, RoverError, RoverResult};

use crate::netns::NetNs;

/// Kind of kernel route operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOp {
    /// Route removal.
    Delete,
    /// Route installation.
    Add,
    /// Route table enumeration.
    Dump,
}

impl fmt::Display for RouteOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Delete => write!(f, "delete"),
            Self::Add => write!(f, "add"),
            Self::Dump => write!(f, "dump"),
        }
    }
}

/// A non-fatal per-route failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteFailure {
    /// Operation that failed.
    pub op: RouteOp,
    /// Route (or interface, for dumps) the operation targeted.
    pub target: String,
    /// Error text.
    pub message: String,
}

/// Outcome of applying a plan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// Kernel routes that were removed.
    pub deleted: Vec<String>,
    /// Routes that were installed (or already present).
    pub added: Vec<Route>,
    /// Failures that did not stop the pass they happened in.
    pub failures: Vec<RouteFailure>,
}

impl ApplyReport {
    /// Failed route installations.
    pub fn failed_adds(&self) -> impl Iterator<Item = &RouteFailure> {
        self.failures.iter().filter(|f| f.op == RouteOp::Add)
    }

    fn record(&mut self, op: RouteOp, target: impl Into<String>, message: impl Into<String>) {
        let failure = RouteFailure {
            op,
            target: target.into(),
            message: message.into(),
        };
        tracing::warn!(
            op = %failure.op,
            target = %failure.target,
            error = %failure.message,
            "Route operation failed"
        );
        self.failures.push(failure);
    }
}

/// Executes reconciliation plans against a namespace.
pub trait RouteApplier {
    /// Check that `netns` can be opened, without entering it.
    fn open_namespace(&self, netns: &Path) -> RoverResult<()>;

    /// Mutate the routing table of `netns` according to `plan`.
    ///
    /// `interfaces` are the interfaces of the previous result; the sandbox
    /// ones are the only ones touched.
    fn apply(
        &self,
        netns: &Path,
        interfaces: &[Interface],
        plan: &RoutePlan,
    ) -> RoverResult<ApplyReport>;

    /// Check that the routing table of `netns` reflects `plan`.
    fn verify(&self, netns: &Path, interfaces: &[Interface], plan: &RoutePlan) -> RoverResult<()>;
}

/// [`RouteApplier`] backed by rtnetlink.
///
/// The calling thread enters the namespace for the duration of each call,
/// and the netlink socket is opened from inside it on a current-thread
/// runtime, so no other thread ever observes the namespace switch.
#[derive(Debug, Clone, Copy, Default)]
pub struct NamespaceRouteApplier;

impl NamespaceRouteApplier {
    /// Create an applier.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[cfg(target_os = "linux")]
impl NamespaceRouteApplier {
    fn in_namespace<T, F, Fut>(netns: &Path, f: F) -> RoverResult<T>
    where
        F: FnOnce(crate::table::RouteTable) -> Fut,
        Fut: std::future::Future<Output = RoverResult<T>>,
    {
        let ns = NetNs::open(netns)?;
        ns.run(|| {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;
            runtime.block_on(async {
                let table = crate::table::RouteTable::connect()?;
                f(table).await
            })
        })
    }
}

#[cfg(target_os = "linux")]
impl RouteApplier for NamespaceRouteApplier {
    fn open_namespace(&self, netns: &Path) -> RoverResult<()> {
        NetNs::open(netns).map(drop)
    }

    fn apply(
        &self,
        netns: &Path,
        interfaces: &[Interface],
        plan: &RoutePlan,
    ) -> RoverResult<ApplyReport> {
        tracing::debug!(
            netns = %netns.display(),
            delete = plan.to_delete.len(),
            add = plan.to_add.len(),
            flush_routes = plan.flush_routes,
            flush_gateway = plan.flush_gateway,
            "Applying route plan"
        );

        Self::in_namespace(netns, |table| linux::apply(table, interfaces, plan))
    }

    fn verify(&self, netns: &Path, interfaces: &[Interface], plan: &RoutePlan) -> RoverResult<()> {
        Self::in_namespace(netns, |table| linux::verify(table, interfaces, plan))
    }
}

#[cfg(not(target_os = "linux"))]
impl RouteApplier for NamespaceRouteApplier {
    fn open_namespace(&self, netns: &Path) -> RoverResult<()> {
        NetNs::open(netns).map(drop)
    }

    fn apply(&self, _: &Path, _: &[Interface], _: &RoutePlan) -> RoverResult<ApplyReport> {
        Err(RoverError::Unsupported {
            feature: "route reconciliation".to_string(),
        })
    }

    fn verify(&self, _: &Path, _: &[Interface], _: &RoutePlan) -> RoverResult<()> {
        Err(RoverError::Unsupported {
            feature: "route reconciliation".to_string(),
        })
    }
}

fn sandboxes(interfaces: &[Interface]) -> Vec<&Interface> {
    interfaces.iter().filter(|i| i.in_sandbox()).collect()
}

fn add_target<'a>(interfaces: &[&'a Interface]) -> RoverResult<&'a Interface> {
    interfaces.first().copied().ok_or_else(|| RoverError::Lookup {
        message: "previous result has no interface inside the sandbox".to_string(),
    })
}

#[cfg(target_os = "linux")]
mod linux {
    use super::{ApplyReport, RouteOp, add_target, sandboxes};
    use crate::table::{KernelRoute, RouteTable, errno};
    use rover_common::{Interface, Route, RoutePlan, RoverError, RoverResult};

    pub(super) async fn apply(
        table: RouteTable,
        interfaces: &[Interface],
        plan: &RoutePlan,
    ) -> RoverResult<ApplyReport> {
        let mut report = ApplyReport::default();
        let sandboxes = sandboxes(interfaces);

        if plan.flush_routes || !plan.to_delete.is_empty() {
            delete_pass(&table, &sandboxes, &mut report, |route| {
                if plan.flush_routes {
                    !route.is_interface_route()
                } else {
                    plan.to_delete.iter().any(|r| route.matches(r))
                }
            })
            .await;
        }

        if !plan.to_add.is_empty() {
            let target = add_target(&sandboxes)?;
            let index = table.link_index(&target.name).await?;

            for route in &plan.to_add {
                match table.add(index, route).await {
                    Ok(true) => {
                        tracing::info!(route = %route, link = %target.name, "Added route");
                        report.added.push(route.clone());
                    }
                    Ok(false) => {
                        tracing::debug!(route = %route, "Route already present");
                        report.added.push(route.clone());
                    }
                    Err(e) => report.record(RouteOp::Add, route.to_string(), e.to_string()),
                }
            }
        }

        if plan.flush_gateway {
            delete_pass(&table, &sandboxes, &mut report, |route| {
                !route.has_destination()
            })
            .await;
        }

        Ok(report)
    }

    /// Remove every route selected by `select` on each sandbox interface.
    async fn delete_pass(
        table: &RouteTable,
        sandboxes: &[&Interface],
        report: &mut ApplyReport,
        select: impl Fn(&KernelRoute) -> bool,
    ) {
        for iface in sandboxes {
            let index = match table.link_index(&iface.name).await {
                Ok(index) => index,
                Err(e) => {
                    report.record(RouteOp::Dump, iface.name.clone(), e.to_string());
                    continue;
                }
            };
            let routes = match table.routes(index).await {
                Ok(routes) => routes,
                Err(e) => {
                    report.record(RouteOp::Dump, iface.name.clone(), e.to_string());
                    continue;
                }
            };

            for route in routes.iter().filter(|&r| select(r)) {
                match table.delete(route).await {
                    Ok(()) => {
                        tracing::info!(route = %route, link = %iface.name, "Deleted route");
                        report.deleted.push(route.to_string());
                    }
                    Err(e) if errno(&e) == Some(libc::ESRCH) => {
                        tracing::debug!(route = %route, "Route already gone");
                    }
                    Err(e) => report.record(RouteOp::Delete, route.to_string(), e.to_string()),
                }
            }
        }
    }

    pub(super) async fn verify(
        table: RouteTable,
        interfaces: &[Interface],
        plan: &RoutePlan,
    ) -> RoverResult<()> {
        let sandboxes = sandboxes(interfaces);
        let target = add_target(&sandboxes)?;
        let index = table.link_index(&target.name).await?;
        let routes = table.routes(index).await?;

        let mismatch = |route: String, message: &str| RoverError::RouteOperation {
            operation: "check",
            route,
            message: message.to_string(),
        };
        let wanted = |route: &KernelRoute| plan.to_add.iter().any(|r| route.matches(r));

        for route in &plan.to_add {
            // The gateway flush runs after the additions and removes defaults.
            if plan.flush_gateway && route.is_default() {
                continue;
            }
            if !routes.iter().any(|k| k.matches(route)) {
                return Err(mismatch(route.to_string(), "missing from routing table"));
            }
        }

        let leftover = |route: &KernelRoute| {
            if wanted(route) {
                return false;
            }
            if plan.flush_routes {
                !route.is_interface_route()
            } else {
                plan.to_delete.iter().any(|r: &Route| route.matches(r))
            }
        };
        if let Some(route) = routes.iter().find(|&r| leftover(r)) {
            return Err(mismatch(route.to_string(), "should have been removed"));
        }

        if plan.flush_gateway {
            if let Some(route) = routes.iter().find(|r| !r.has_destination()) {
                return Err(mismatch(route.to_string(), "default route still present"));
            }
        }

        tracing::debug!(link = %target.name, "Routing table matches plan");
        Ok(())
    }
}
