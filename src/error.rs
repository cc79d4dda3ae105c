//! Error types for Avalon.

use std::time::Duration;
use thiserror::Error;

use crate::extension::Family;

/// Result type alias using Avalon's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Avalon operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid configuration (unknown title, conflicting flags, bad value).
    #[error("configuration error: {0}")]
    Config(String),

    /// Two extensions of the same family registered the same title.
    #[error("duplicate {family} extension: {title:?}")]
    DuplicateExtension {
        /// Family in which the collision happened.
        family: Family,
        /// The colliding title.
        title: String,
    },

    /// A producer spec token could not be parsed.
    #[error("invalid producer spec {spec:?}: {reason}")]
    Spec {
        /// The offending token.
        spec: String,
        /// Why it failed to parse.
        reason: String,
    },

    /// An inline mapping program failed to load or parse.
    #[error("inline mapping {url:?}: {reason}")]
    InlineMapping {
        /// The `file://` URL the program was loaded from.
        url: String,
        /// Why loading failed.
        reason: String,
    },

    /// A generic extension hook aborted startup.
    #[error("generic hook {title:?} failed: {reason}")]
    GenericHook {
        /// Title of the failing generic extension.
        title: String,
        /// The hook's error message.
        reason: String,
    },

    /// `Model::next` failed.
    #[error("model error: {0}")]
    ModelProduction(String),

    /// A mapping failed while transforming a record.
    #[error("mapping error: {0}")]
    Mapping(String),

    /// A format failed to serialize a batch.
    #[error("format error: {0}")]
    Format(String),

    /// A medium failed to deliver a batch.
    #[error("medium write failed: {cause}")]
    MediumWrite {
        /// Description of the underlying failure.
        cause: String,
        /// Whether the medium considers the failure worth retrying.
        retriable: bool,
    },

    /// The writer pool did not drain within the shutdown deadline.
    #[error("shutdown timed out after {0:?}")]
    ShutdownTimeout(Duration),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Process exit code for this error.
    ///
    /// Configuration problems exit with 2 (matching the CLI parser's own
    /// usage errors); everything that fails mid-run exits with 1.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Config(_)
            | Error::DuplicateExtension { .. }
            | Error::Spec { .. }
            | Error::InlineMapping { .. }
            | Error::GenericHook { .. } => 2,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_errors_exit_2() {
        assert_eq!(Error::Config("bad".into()).exit_code(), 2);
        assert_eq!(
            Error::Spec {
                spec: "1x2".into(),
                reason: "nope".into()
            }
            .exit_code(),
            2
        );
        assert_eq!(
            Error::DuplicateExtension {
                family: Family::Model,
                title: "test".into()
            }
            .exit_code(),
            2
        );
    }

    #[test]
    fn test_runtime_errors_exit_1() {
        assert_eq!(
            Error::MediumWrite {
                cause: "boom".into(),
                retriable: false
            }
            .exit_code(),
            1
        );
        assert_eq!(
            Error::ShutdownTimeout(Duration::from_secs(30)).exit_code(),
            1
        );
    }

    #[test]
    fn test_display_names_title() {
        let err = Error::DuplicateExtension {
            family: Family::Format,
            title: "csv".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("format"));
        assert!(msg.contains("csv"));
    }
}
