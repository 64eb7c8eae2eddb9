//! Common error types for rover.

use miette::Diagnostic;
use thiserror::Error;

/// Result type alias using [`RoverError`].
pub type RoverResult<T> = Result<T, RoverError>;

/// Errors raised while reconciling routes.
#[derive(Error, Diagnostic, Debug)]
pub enum RoverError {
    /// Malformed or type-mismatched configuration.
    #[error("Configuration error: {message}")]
    #[diagnostic(
        code(rover::config),
        help("Check the flushroutes, flushgateway, delroutes and addroutes keys of the netconf")
    )]
    Config {
        /// The error message.
        message: String,
    },

    /// A required CNI environment variable is missing or invalid.
    #[error("Invalid environment: {message}")]
    #[diagnostic(code(rover::environment))]
    InvalidEnvironment {
        /// The error message.
        message: String,
    },

    /// The target network namespace could not be opened or entered.
    #[error("Network namespace {path}: {message}")]
    #[diagnostic(
        code(rover::netns),
        help("Entering a network namespace requires CAP_SYS_ADMIN")
    )]
    Namespace {
        /// Path of the namespace.
        path: String,
        /// The error message.
        message: String,
    },

    /// The thread could not move back into its own namespace after working
    /// in the target one.
    #[error("Failed to leave network namespace {path}: {message}")]
    #[diagnostic(
        code(rover::netns_restore),
        help("Routes may already have been changed inside the namespace")
    )]
    NamespaceRestore {
        /// Path of the namespace the thread should have returned to.
        path: String,
        /// The error message.
        message: String,
    },

    /// A kernel route operation failed.
    #[error("Route {operation} failed for {route}: {message}")]
    #[diagnostic(code(rover::route))]
    RouteOperation {
        /// The operation (add, delete, dump, check).
        operation: &'static str,
        /// The route the operation targeted.
        route: String,
        /// The error message.
        message: String,
    },

    /// The namespace-resident interface could not be found.
    #[error("Interface lookup failed: {message}")]
    #[diagnostic(
        code(rover::lookup),
        help("The previous result must list an interface with a non-empty sandbox")
    )]
    Lookup {
        /// The error message.
        message: String,
    },

    /// The netlink socket could not be created.
    #[error("Netlink error: {message}")]
    #[diagnostic(code(rover::netlink))]
    Netlink {
        /// The error message.
        message: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    #[diagnostic(code(rover::io))]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    #[diagnostic(code(rover::serialization))]
    Serialization(String),

    /// Feature not supported on this platform.
    #[error("Feature not supported: {feature}")]
    #[diagnostic(
        code(rover::unsupported),
        help("Network namespaces are only available on Linux")
    )]
    Unsupported {
        /// The unsupported feature.
        feature: String,
    },
}

impl RoverError {
    /// Shorthand for a [`RoverError::Config`].
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// CNI error code reported to the runtime.
    ///
    /// Codes below 100 are the well-known ones from the CNI specification,
    /// everything above is plugin specific.
    #[must_use]
    pub fn cni_code(&self) -> u32 {
        match self {
            Self::InvalidEnvironment { .. } => 4,
            Self::Io(_) => 5,
            Self::Serialization(_) => 6,
            Self::Config { .. } => 7,
            Self::Namespace { .. } | Self::NamespaceRestore { .. } => 100,
            Self::RouteOperation { .. } => 101,
            Self::Lookup { .. } => 102,
            Self::Netlink { .. } => 103,
            Self::Unsupported { .. } => 104,
        }
    }

    /// Whether the error happened before any kernel state was touched.
    #[must_use]
    pub fn is_pre_mutation(&self) -> bool {
        matches!(
            self,
            Self::Config { .. }
                | Self::InvalidEnvironment { .. }
                | Self::Serialization(_)
                | Self::Namespace { .. }
                | Self::Netlink { .. }
        )
    }
}

impl From<serde_json::Error> for RoverError {
    fn from(err: serde_json::Error) -> Self {
        RoverError::Serialization(err.to_string())
    }
}
