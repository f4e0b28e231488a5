//! Error taxonomy of the statement pipeline
//!
//! Errors accumulate on a statement while its chain runs: the first one is
//! kept and every later one is appended through [`OrmError::chain`].

use cache_system::CacheError;
use domain_meta::DomainError;
use thiserror::Error;
use type_mapping::ConvertError;

/// Raw failure reported by a connection pool or driver
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct DbError {
    /// Vendor error code when the driver exposes one (SQLSTATE, errno, ORA-nnnnn)
    pub code: Option<String>,
    pub message: String,
}

impl DbError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    pub fn with_code(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            message: message.into(),
        }
    }
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err.as_database_error() {
            Some(db) => DbError {
                code: db.code().map(|c| c.into_owned()),
                message: db.message().to_string(),
            },
            None => DbError::new(err.to_string()),
        }
    }
}

impl From<CacheError> for DbError {
    fn from(err: CacheError) -> Self {
        DbError::new(err.to_string())
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum OrmError {
    /// The destination or the request does not fit the operation
    #[error("{0}")]
    User(String),

    #[error("schema error: {0}")]
    Schema(String),

    #[error("exec error: {0}")]
    Exec(#[from] DbError),

    #[error("duplicated key not allowed (code={code}): {message}")]
    DuplicatedKey { code: String, message: String },

    #[error("record not found")]
    RecordNotFound,

    #[error("statement cancelled")]
    Cancelled,

    #[error("hook {hook} failed: {message}")]
    Hook { hook: String, message: String },

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("extra field check failed (stage={stage}, db={db}, table={table}, field={field}): {source}")]
    ExtraCheck {
        stage: &'static str,
        db: String,
        table: String,
        field: String,
        source: DomainError,
    },

    #[error(transparent)]
    Convert(#[from] ConvertError),

    #[error("callback error: {0}")]
    Callback(String),

    #[error("WHERE conditions required")]
    MissingWhereClause,

    #[error("primary key required")]
    PrimaryKeyRequired,

    #[error("unsupported relation: {0}")]
    UnsupportedRelation(String),

    #[error("invalid transaction")]
    InvalidTransaction,

    #[error("dry run mode unsupported")]
    DryRunModeUnsupported,

    #[error("{}", join_errors(.0))]
    Multiple(Vec<OrmError>),
}

fn join_errors(errors: &[OrmError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl OrmError {
    pub fn user(message: impl Into<String>) -> Self {
        OrmError::User(message.into())
    }

    pub fn schema(message: impl Into<String>) -> Self {
        OrmError::Schema(message.into())
    }

    /// Error returned from a user hook
    pub fn hook(hook: impl Into<String>, message: impl Into<String>) -> Self {
        OrmError::Hook {
            hook: hook.into(),
            message: message.into(),
        }
    }

    /// Append `next` after `self`, flattening into [`OrmError::Multiple`]
    pub fn chain(self, next: OrmError) -> OrmError {
        match self {
            OrmError::Multiple(mut errors) => {
                errors.push(next);
                OrmError::Multiple(errors)
            }
            first => OrmError::Multiple(vec![first, next]),
        }
    }

    /// The first error of a chain
    pub fn first(&self) -> &OrmError {
        match self {
            OrmError::Multiple(errors) => errors.first().map(OrmError::first).unwrap_or(self),
            other => other,
        }
    }

    /// Whether any error in the chain is `kind`
    pub fn contains(&self, predicate: impl Fn(&OrmError) -> bool + Copy) -> bool {
        match self {
            OrmError::Multiple(errors) => errors.iter().any(|e| e.contains(predicate)),
            other => predicate(other),
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.contains(|e| matches!(e, OrmError::RecordNotFound))
    }

    pub fn is_cancelled(&self) -> bool {
        self.contains(|e| matches!(e, OrmError::Cancelled))
    }

    pub fn is_duplicated_key(&self) -> bool {
        self.contains(|e| matches!(e, OrmError::DuplicatedKey { .. }))
    }
}
