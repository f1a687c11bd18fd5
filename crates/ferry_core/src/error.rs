use ferry_db::{DbError, EntityKind};
use miette::Diagnostic;
use thiserror::Error;

use crate::vault::VaultError;

/// Configuration-specific errors
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("TOML parse error: {0}")]
    TomlParse(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for field {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

#[derive(Error, Diagnostic, Debug)]
pub enum CoreError {
    #[error("Duplicate {kind} mapping for source id {source_id}: {detail}")]
    #[diagnostic(
        code(ferry_core::duplicate_mapping),
        help("Two source records claim the same identity; the source data needs cleaning before this record can be imported")
    )]
    DuplicateMapping {
        kind: EntityKind,
        source_id: String,
        detail: String,
    },

    #[error("{kind} {source_id} depends on {dependency} {dependency_id}, which was never imported")]
    #[diagnostic(
        code(ferry_core::missing_dependency),
        help("Import the {dependency} first, then re-run; this record will be retried")
    )]
    MissingDependency {
        kind: EntityKind,
        source_id: String,
        dependency: EntityKind,
        dependency_id: String,
    },

    #[error("Invalid field '{field}' on {kind} {source_id}: {reason}")]
    #[diagnostic(code(ferry_core::invalid_field))]
    InvalidField {
        kind: EntityKind,
        source_id: String,
        field: String,
        reason: String,
    },

    #[error("Target platform rejected {kind}: {reason}")]
    #[diagnostic(code(ferry_core::target_validation))]
    TargetValidation { kind: EntityKind, reason: String },

    #[error("Target platform unavailable: {cause}")]
    #[diagnostic(
        code(ferry_core::target_unavailable),
        help("Nothing after the last committed record was written; re-run once the target is reachable")
    )]
    TargetUnavailable { cause: String },

    #[error("Markup conversion failed")]
    #[diagnostic(code(ferry_core::markup))]
    Markup(#[from] VaultError),

    #[error("Source '{source_name}' unavailable: {cause}")]
    #[diagnostic(
        code(ferry_core::source_unavailable),
        help("Check the configured path or connection settings")
    )]
    SourceUnavailable { source_name: String, cause: String },

    #[error("Source '{source_name}' is malformed: {details}")]
    #[diagnostic(code(ferry_core::source_format))]
    SourceFormat {
        source_name: String,
        details: String,
    },

    #[error("Database error")]
    #[diagnostic(code(ferry_core::database))]
    Database(#[from] DbError),

    #[error("Configuration error")]
    #[diagnostic(code(ferry_core::config))]
    Config(#[from] ConfigError),

    #[error("IO error on {path}")]
    #[diagnostic(code(ferry_core::io))]
    Io {
        path: String,
        #[source]
        cause: std::io::Error,
    },
}

impl CoreError {
    /// Whether this error only invalidates the record being processed.
    ///
    /// Record-level errors are reported and the batch continues; anything else
    /// aborts the run.
    pub fn is_record_level(&self) -> bool {
        matches!(
            self,
            Self::DuplicateMapping { .. }
                | Self::MissingDependency { .. }
                | Self::InvalidField { .. }
                | Self::TargetValidation { .. }
                | Self::Markup(_)
        )
    }

    pub fn invalid_field(
        kind: EntityKind,
        source_id: impl Into<String>,
        field: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidField {
            kind,
            source_id: source_id.into(),
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn source_unavailable(source_name: impl Into<String>, cause: impl ToString) -> Self {
        Self::SourceUnavailable {
            source_name: source_name.into(),
            cause: cause.to_string(),
        }
    }

    pub fn source_format(source_name: impl Into<String>, details: impl ToString) -> Self {
        Self::SourceFormat {
            source_name: source_name.into(),
            details: details.to_string(),
        }
    }

    pub fn io(path: impl AsRef<std::path::Path>, cause: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().display().to_string(),
            cause,
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
