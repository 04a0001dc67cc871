use std::fmt::Write as _;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use schemadex_core::ErrorCode;
use schemadex_core::GraphError;
use schemadex_core::lock::LockError;

/// Errors raised while building or reading a persisted index.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("unable to create index directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("unable to write index file {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("unable to read index file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("index file {} holds {value:?}, expected a liveness level 0-4", path.display())]
    InvalidLevel { path: PathBuf, value: String },

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(
        "Indexing failures encountered for {build} @ file://{}: took more than {} millis to build index",
        root.display(),
        waited.as_millis()
    )]
    Timeout {
        build: String,
        root: PathBuf,
        waited: Duration,
    },

    #[error(
        "Indexing failures encountered for {build} @ file://{}{}",
        root.display(),
        summarize(failures)
    )]
    Multiple {
        build: String,
        root: PathBuf,
        failures: Vec<IndexError>,
    },

    #[error("population of project {project} panicked: {message}")]
    UnitPanicked { project: String, message: String },

    #[error("internal error: {0}")]
    Internal(String),
}

impl IndexError {
    /// Machine-readable code associated with this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::CreateDir { .. } => ErrorCode::IndexDirCreateFailed,
            Self::Write { .. } => ErrorCode::IndexWriteFailed,
            Self::Read { .. } | Self::InvalidLevel { .. } => ErrorCode::IndexReadFailed,
            Self::Graph(err) => err.code(),
            Self::Lock(err) => err.code(),
            Self::Timeout { .. } => ErrorCode::IndexTimeout,
            Self::Multiple { .. } => ErrorCode::MultipleFailures,
            Self::UnitPanicked { .. } => ErrorCode::UnitPanicked,
            Self::Internal(_) => ErrorCode::InternalUnexpected,
        }
    }

    /// Optional remediation hint for operators.
    #[must_use]
    pub const fn hint(&self) -> Option<&'static str> {
        self.code().hint()
    }
}

fn summarize(failures: &[IndexError]) -> String {
    let mut out = String::new();
    for (i, failure) in failures.iter().enumerate() {
        let _ = write!(out, "\n  {}. [{}] {failure}", i + 1, failure.code());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multiple_failures_list_every_cause() {
        let err = IndexError::Multiple {
            build: "demo".to_string(),
            root: PathBuf::from("/work/demo"),
            failures: vec![
                IndexError::UnitPanicked {
                    project: ":a".to_string(),
                    message: "boom".to_string(),
                },
                IndexError::CreateDir {
                    path: PathBuf::from("/ro/index"),
                    source: io::Error::from(io::ErrorKind::PermissionDenied),
                },
            ],
        };
        let text = err.to_string();
        assert!(text.starts_with("Indexing failures encountered for demo @ file:///work/demo"));
        assert!(text.contains("1. [E7003] population of project :a panicked: boom"));
        assert!(text.contains("2. [E5001] unable to create index directory /ro/index"));
        assert_eq!(err.code(), ErrorCode::MultipleFailures);
    }

    #[test]
    fn timeout_names_build_and_root() {
        let err = IndexError::Timeout {
            build: "demo".to_string(),
            root: PathBuf::from("/work/demo"),
            waited: Duration::from_millis(250),
        };
        assert_eq!(
            err.to_string(),
            "Indexing failures encountered for demo @ file:///work/demo: took more than 250 millis to build index"
        );
        assert!(err.hint().is_some());
    }
}
