//! Plugin entry point.
//!
//! The container runtime passes the operation and its parameters through
//! `CNI_*` environment variables and the netconf on stdin. Results and
//! errors are written as JSON to stdout; logs go to stderr.

use std::io::Write;

use clap::{Parser, ValueEnum};
use miette::Diagnostic;
use rover_common::{RoverError, RoverResult, resolve_netns_path};
use rover_network::RouteApplier;
use serde_json::json;

use crate::config::NetConf;
use crate::reconcile::Reconciler;

/// Result schema versions the plugin can emit.
pub const SUPPORTED_VERSIONS: &[&str] = &["0.3.0", "0.3.1", "0.4.0", "1.0.0"];

/// Version reported when the netconf does not name one.
pub const DEFAULT_VERSION: &str = "1.0.0";

/// rover - route overwrite plugin for container network namespaces
#[derive(Parser, Debug)]
#[command(name = "rover")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Operation requested by the runtime
    #[arg(long, env = "CNI_COMMAND", value_enum)]
    pub command: CniCommand,

    /// Container ID
    #[arg(long, env = "CNI_CONTAINERID")]
    pub container_id: Option<String>,

    /// Path to the container network namespace
    #[arg(long, env = "CNI_NETNS")]
    pub netns: Option<String>,

    /// Interface name inside the container
    #[arg(long, env = "CNI_IFNAME")]
    pub ifname: Option<String>,

    /// Extra arguments (KEY=VALUE;...)
    #[arg(long, env = "CNI_ARGS")]
    pub args: Option<String>,

    /// Plugin search path
    #[arg(long, env = "CNI_PATH")]
    pub path: Option<String>,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,
}

/// Operations defined by the CNI protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum CniCommand {
    /// Reconcile routes and print the updated result.
    #[value(name = "ADD")]
    Add,
    /// Detach; routes are left as they are.
    #[value(name = "DEL")]
    Del,
    /// Verify the routing table against the configuration.
    #[value(name = "CHECK")]
    Check,
    /// Print supported versions.
    #[value(name = "VERSION")]
    Version,
}

impl CniCommand {
    /// Whether the command expects a netconf on stdin.
    #[must_use]
    pub fn reads_stdin(self) -> bool {
        !matches!(self, Self::Version)
    }
}

impl Cli {
    /// Execute the requested command, writing its output to `out`.
    ///
    /// # Errors
    ///
    /// Returns the error to report to the runtime.
    pub fn execute<A: RouteApplier>(
        &self,
        applier: A,
        stdin: &[u8],
        out: &mut impl Write,
    ) -> RoverResult<()> {
        tracing::debug!(
            command = ?self.command,
            container_id = self.container_id.as_deref().unwrap_or(""),
            ifname = self.ifname.as_deref().unwrap_or(""),
            "Executing command"
        );

        match self.command {
            CniCommand::Add => {
                let conf = NetConf::from_slice(stdin)?;
                let netns = resolve_netns_path(self.require_netns()?)?;
                let result = Reconciler::new(applier).run(&netns, &conf)?;

                serde_json::to_writer(&mut *out, &result)?;
                writeln!(out)?;
            }
            CniCommand::Del => {
                // Settings are not reverted; the namespace usually goes away
                // together with the container.
                tracing::debug!("Nothing to undo on DEL");
            }
            CniCommand::Check => {
                let conf = NetConf::from_slice(stdin)?;
                let netns = resolve_netns_path(self.require_netns()?)?;
                Reconciler::new(applier).check(&netns, &conf)?;
            }
            CniCommand::Version => {
                let version = json!({
                    "cniVersion": DEFAULT_VERSION,
                    "supportedVersions": SUPPORTED_VERSIONS,
                });
                serde_json::to_writer(&mut *out, &version)?;
                writeln!(out)?;
            }
        }

        Ok(())
    }

    fn require_netns(&self) -> RoverResult<&str> {
        self.netns
            .as_deref()
            .ok_or_else(|| RoverError::InvalidEnvironment {
                message: "CNI_NETNS is required".to_string(),
            })
    }
}

/// Error object printed to stdout when a command fails.
#[must_use]
pub fn error_response(err: &RoverError, cni_version: &str) -> serde_json::Value {
    let mut response = json!({
        "cniVersion": cni_version,
        "code": err.cni_code(),
        "msg": err.to_string(),
    });
    if let Some(help) = err.help() {
        response["details"] = json!(help.to_string());
    }
    response
}

/// Error reported when `CNI_COMMAND` or another argument is missing or invalid.
///
/// Only the headline of clap's message is kept; usage text is dropped.
#[must_use]
pub fn usage_error(err: &clap::Error) -> RoverError {
    let rendered = err.to_string();
    let message = rendered
        .lines()
        .take_while(|line| !line.trim().is_empty())
        .map(str::trim)
        .collect::<Vec<_>>()
        .join(" ");

    RoverError::InvalidEnvironment {
        message: message
            .strip_prefix("error: ")
            .unwrap_or(&message)
            .to_string(),
    }
}

/// Version named by the netconf on stdin, if it parses at all.
#[must_use]
pub fn requested_version(stdin: &[u8]) -> String {
    serde_json::from_slice::<serde_json::Value>(stdin)
        .ok()
        .and_then(|conf| conf.get("cniVersion")?.as_str().map(str::to_string))
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| DEFAULT_VERSION.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_command_names() {
        let cli =
            Cli::try_parse_from(["rover", "--command", "ADD", "--netns", "/proc/1/ns/net"])
                .unwrap();
        assert_eq!(cli.command, CniCommand::Add);
        assert_eq!(cli.netns.as_deref(), Some("/proc/1/ns/net"));

        assert!(Cli::try_parse_from(["rover", "--command", "add"]).is_err());
    }

    #[test]
    fn usage_errors_are_invalid_environment() {
        let err = Cli::try_parse_from(["rover"]).unwrap_err();
        let err = usage_error(&err);
        assert!(matches!(err, RoverError::InvalidEnvironment { .. }));
        assert_eq!(err.cni_code(), 4);
        assert!(err.to_string().contains("--command"));
        assert!(!err.to_string().contains("Usage:"));

        let err = usage_error(&Cli::try_parse_from(["rover", "--command", "BOGUS"]).unwrap_err());
        assert!(err.to_string().contains("BOGUS"));
    }

    #[test]
    fn error_response_shape() {
        let err = RoverError::Lookup {
            message: "interface eth0 not found".to_string(),
        };
        let response = error_response(&err, "0.4.0");

        assert_eq!(response["cniVersion"], "0.4.0");
        assert_eq!(response["code"], 102);
        assert_eq!(
            response["msg"],
            "Interface lookup failed: interface eth0 not found"
        );
        assert!(response["details"].is_string());
    }

    #[test]
    fn requested_version_falls_back() {
        assert_eq!(requested_version(br#"{"cniVersion": "0.3.1"}"#), "0.3.1");
        assert_eq!(requested_version(b"garbage"), DEFAULT_VERSION);
        assert_eq!(requested_version(br#"{"cniVersion": ""}"#), DEFAULT_VERSION);
    }

    #[test]
    fn only_version_skips_stdin() {
        assert!(!CniCommand::Version.reads_stdin());
        assert!(CniCommand::Del.reads_stdin());
    }
}
