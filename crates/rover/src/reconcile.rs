//! The reconciliation pipeline: resolve, diff, apply, build.

use std::path::Path;

use rover_common::{CniResult, RoutePlan, RoverError, RoverResult};
use rover_network::RouteApplier;

use crate::config::NetConf;
use crate::diff::diff_routes;
use crate::result::build_result;

/// Runs one reconciliation per call. Holds no state between calls.
#[derive(Debug, Clone, Default)]
pub struct Reconciler<A> {
    applier: A,
}

impl<A: RouteApplier> Reconciler<A> {
    /// Create a reconciler that mutates routes through `applier`.
    pub fn new(applier: A) -> Self {
        Self { applier }
    }

    /// Compute the plan for `conf` without touching any namespace.
    pub fn plan(conf: &NetConf) -> RoverResult<RoutePlan> {
        let prev = conf.prev_result()?;
        Ok(diff_routes(&prev.routes, &conf.resolve()))
    }

    /// Reconcile the routes of `netns` and return the updated result.
    ///
    /// A failed route installation aborts the invocation once every
    /// addition has been attempted; failed deletions are only logged.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is incomplete, the namespace
    /// cannot be opened (even when nothing needs to change) or entered, the
    /// sandbox interface is missing or a route could not be added. No result
    /// is produced in that case.
    pub fn run(&self, netns: &Path, conf: &NetConf) -> RoverResult<CniResult> {
        let prev = conf.prev_result()?;
        let plan = Self::plan(conf)?;

        if plan.is_noop() {
            self.applier.open_namespace(netns)?;
            tracing::debug!(netns = %netns.display(), "Nothing to change, routes passed through");
        } else {
            let report = self.applier.apply(netns, &prev.interfaces, &plan)?;

            let failed: Vec<_> = report.failed_adds().collect();
            if !failed.is_empty() {
                return Err(RoverError::RouteOperation {
                    operation: "add",
                    route: failed
                        .iter()
                        .map(|f| f.target.as_str())
                        .collect::<Vec<_>>()
                        .join(", "),
                    message: failed
                        .iter()
                        .map(|f| f.message.as_str())
                        .collect::<Vec<_>>()
                        .join("; "),
                });
            }

            tracing::info!(
                netns = %netns.display(),
                deleted = report.deleted.len(),
                added = report.added.len(),
                failures = report.failures.len(),
                "Routes reconciled"
            );
        }

        Ok(build_result(prev, &plan, &conf.cni_version))
    }

    /// Verify that `netns` still reflects the configuration.
    pub fn check(&self, netns: &Path, conf: &NetConf) -> RoverResult<()> {
        let prev = conf.prev_result()?;
        let plan = Self::plan(conf)?;
        self.applier.verify(netns, &prev.interfaces, &plan)
    }
}
