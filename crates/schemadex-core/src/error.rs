use std::fmt;

use crate::identity::ModuleIdentity;

/// Machine-readable error codes shared by every schemadex layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigParseError,
    SelfDependency,
    CycleDetected,
    GraphSealed,
    UnknownNode,
    IndexDirCreateFailed,
    IndexWriteFailed,
    IndexReadFailed,
    IndexTimeout,
    MultipleFailures,
    LockContention,
    UnitPanicked,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ConfigParseError => "E1002",
            Self::SelfDependency => "E2001",
            Self::CycleDetected => "E2003",
            Self::GraphSealed => "E2006",
            Self::UnknownNode => "E2007",
            Self::IndexDirCreateFailed => "E5001",
            Self::IndexWriteFailed => "E5003",
            Self::IndexReadFailed => "E5004",
            Self::LockContention => "E5002",
            Self::IndexTimeout => "E7001",
            Self::MultipleFailures => "E7002",
            Self::UnitPanicked => "E7003",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ConfigParseError => "Config file parse error",
            Self::SelfDependency => "Module depends on itself",
            Self::CycleDetected => "Dependency cycle detected",
            Self::GraphSealed => "Graph is sealed for analysis",
            Self::UnknownNode => "Unknown index node",
            Self::IndexDirCreateFailed => "Index directory could not be created",
            Self::IndexWriteFailed => "Index file write failed",
            Self::IndexReadFailed => "Index file read failed",
            Self::LockContention => "Lock contention",
            Self::IndexTimeout => "Indexing timed out",
            Self::MultipleFailures => "Multiple indexing failures",
            Self::UnitPanicked => "Population unit panicked",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::ConfigParseError => Some("Fix syntax in .schemadex/config.toml and retry."),
            Self::SelfDependency => Some("Remove the dependency a module declares on itself."),
            Self::CycleDetected => {
                Some("Remove/adjust include or require declarations to keep the graph acyclic.")
            }
            Self::GraphSealed => None,
            Self::UnknownNode => None,
            Self::IndexDirCreateFailed | Self::IndexWriteFailed => {
                Some("Check disk space and write permissions on the index directory.")
            }
            Self::IndexReadFailed => Some("Re-run indexing to rebuild the index directory."),
            Self::LockContention => {
                Some("Retry after the other indexing process releases its lock.")
            }
            Self::IndexTimeout => {
                Some("Raise SCHEMADEX_INDEX_TTL or max_wait_ms if the build is very large.")
            }
            Self::MultipleFailures => Some("Inspect each listed cause; they are independent."),
            Self::UnitPanicked | Self::InternalUnexpected => {
                Some("Retry once. If persistent, report a bug with logs.")
            }
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Errors raised by the index graph.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// A module tried to include or require itself.
    #[error("{module} cannot depend on itself")]
    SelfDependency { module: ModuleIdentity },

    /// A dependency cycle was found while flattening closures.
    ///
    /// `from -> to` is the back-edge that closes the cycle.
    #[error("dependency cycle detected from {from} -> {to}")]
    CycleDetected {
        from: ModuleIdentity,
        to: ModuleIdentity,
    },

    /// Edges and liveness reasons are frozen once analysis begins.
    #[error("cannot {operation} on {module}: the graph is sealed for analysis")]
    Sealed {
        operation: &'static str,
        module: ModuleIdentity,
    },

    /// A node id did not belong to this pool.
    #[error("node #{0} does not exist in this pool")]
    UnknownNode(usize),
}

impl GraphError {
    /// Machine-readable code associated with this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::SelfDependency { .. } => ErrorCode::SelfDependency,
            Self::CycleDetected { .. } => ErrorCode::CycleDetected,
            Self::Sealed { .. } => ErrorCode::GraphSealed,
            Self::UnknownNode(_) => ErrorCode::UnknownNode,
        }
    }
}
