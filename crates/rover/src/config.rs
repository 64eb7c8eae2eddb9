//! Network configuration decoding and override resolution.
//!
//! The netconf carries the base settings at the top level and an optional
//! override block under `args.cni`. Each override field replaces its base
//! counterpart wholesale when present; lists are never merged element-wise.

use rover_common::{CniResult, RouteList, RoverError, RoverResult};
use serde::{Deserialize, Deserializer, Serialize};

/// The plugin configuration read from stdin.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetConf {
    /// Requested result schema version.
    #[serde(rename = "cniVersion", default)]
    pub cni_version: String,

    /// Network name.
    #[serde(default)]
    pub name: String,

    /// Plugin type.
    #[serde(rename = "type", default)]
    pub plugin_type: String,

    /// Remove every route before adding.
    #[serde(rename = "flushroutes", alias = "flushRoutes", default)]
    pub flush_routes: bool,

    /// Remove the default route and clear address gateways.
    #[serde(rename = "flushgateway", alias = "flushGateway", default)]
    pub flush_gateway: bool,

    /// Routes to remove, matched by destination.
    #[serde(
        rename = "delroutes",
        alias = "delRoutes",
        default,
        deserialize_with = "nullable_routes"
    )]
    pub del_routes: RouteList,

    /// Routes to install.
    #[serde(
        rename = "addroutes",
        alias = "addRoutes",
        default,
        deserialize_with = "nullable_routes"
    )]
    pub add_routes: RouteList,

    /// Runtime supplied arguments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<ConfArgs>,

    /// Result of the previous plugin in the chain.
    #[serde(rename = "prevResult", default, skip_serializing_if = "Option::is_none")]
    pub prev_result: Option<CniResult>,
}

/// The `args` object of a netconf.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfArgs {
    /// Overrides for this plugin.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cni: Option<RouteOverrides>,
}

/// Override block; `None` means "not supplied", not "false" or "empty".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteOverrides {
    /// Replaces `flushroutes` when present.
    #[serde(rename = "flushroutes", alias = "flushRoutes", default)]
    pub flush_routes: Option<bool>,
    /// Replaces `flushgateway` when present.
    #[serde(rename = "flushgateway", alias = "flushGateway", default)]
    pub flush_gateway: Option<bool>,
    /// Replaces `delroutes` when present.
    #[serde(rename = "delroutes", alias = "delRoutes", default)]
    pub del_routes: Option<RouteList>,
    /// Replaces `addroutes` when present.
    #[serde(rename = "addroutes", alias = "addRoutes", default)]
    pub add_routes: Option<RouteList>,
}

/// Settings after overrides were applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedConfig {
    /// Remove every route before adding.
    pub flush_routes: bool,
    /// Remove the default route and clear address gateways.
    pub flush_gateway: bool,
    /// Routes to remove.
    pub del_routes: RouteList,
    /// Routes to install.
    pub add_routes: RouteList,
}

impl ResolvedConfig {
    /// Apply `overrides` on top of this configuration.
    #[must_use]
    pub fn merge(mut self, overrides: &RouteOverrides) -> Self {
        if let Some(flush) = overrides.flush_routes {
            self.flush_routes = flush;
        }
        if let Some(flush) = overrides.flush_gateway {
            self.flush_gateway = flush;
        }
        if let Some(routes) = &overrides.del_routes {
            self.del_routes.clone_from(routes);
        }
        if let Some(routes) = &overrides.add_routes {
            self.add_routes.clone_from(routes);
        }
        self
    }
}

impl NetConf {
    /// Decode a netconf from raw stdin bytes.
    ///
    /// # Errors
    ///
    /// Returns [`RoverError::Config`] if the JSON does not have the expected
    /// shape.
    pub fn from_slice(data: &[u8]) -> RoverResult<Self> {
        serde_json::from_slice(data)
            .map_err(|e| RoverError::config(format!("failed to load netconf: {e}")))
    }

    /// The override block, if the runtime supplied one.
    #[must_use]
    pub fn overrides(&self) -> Option<&RouteOverrides> {
        self.args.as_ref().and_then(|args| args.cni.as_ref())
    }

    /// Merge the base settings with the override block.
    #[must_use]
    pub fn resolve(&self) -> ResolvedConfig {
        let base = ResolvedConfig {
            flush_routes: self.flush_routes,
            flush_gateway: self.flush_gateway,
            del_routes: self.del_routes.clone(),
            add_routes: self.add_routes.clone(),
        };

        let resolved = match self.overrides() {
            Some(overrides) => base.merge(overrides),
            None => base,
        };

        tracing::debug!(
            flush_routes = resolved.flush_routes,
            flush_gateway = resolved.flush_gateway,
            delroutes = resolved.del_routes.len(),
            addroutes = resolved.add_routes.len(),
            overridden = self.overrides().is_some(),
            "Resolved configuration"
        );
        resolved
    }

    /// The previous plugin's result.
    ///
    /// # Errors
    ///
    /// Returns [`RoverError::Config`] if the netconf has no `prevResult`.
    pub fn prev_result(&self) -> RoverResult<&CniResult> {
        self.prev_result.as_ref().ok_or_else(|| {
            RoverError::config("prevResult is required, rover must be chained after another plugin")
        })
    }
}

/// Treat an explicit `null` list like an absent one.
fn nullable_routes<'de, D>(deserializer: D) -> Result<RouteList, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<RouteList>::deserialize(deserializer)?.unwrap_or_default())
}
