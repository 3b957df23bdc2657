//! Persistence engine error shapes.

use std::fmt;

use thiserror::Error;

// == Known Error Code ==
/// Engine error codes the pipeline knows how to report.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KnownErrorCode {
    /// P2000
    ValueTooLong,
    /// P2002
    UniqueViolation,
    /// P2003
    ForeignKeyViolation,
    /// P2004
    ConstraintViolation,
    /// P2011
    NullConstraintViolation,
    /// P2012
    MissingRequiredValue,
    /// P2013
    MissingRequiredArgument,
    /// P2014
    InvalidRelation,
    /// P2025
    RecordNotFound,
    /// P2026
    InvalidConnectionUrl,
    /// P2030
    BatchFailure,
    /// P2031
    InsufficientPermission,
    /// Any code outside the list above, kept verbatim
    Unrecognized(String),
}

impl KnownErrorCode {
    /// Parses an engine error code.
    pub fn from_code(code: &str) -> Self {
        match code {
            "P2000" => Self::ValueTooLong,
            "P2002" => Self::UniqueViolation,
            "P2003" => Self::ForeignKeyViolation,
            "P2004" => Self::ConstraintViolation,
            "P2011" => Self::NullConstraintViolation,
            "P2012" => Self::MissingRequiredValue,
            "P2013" => Self::MissingRequiredArgument,
            "P2014" => Self::InvalidRelation,
            "P2025" => Self::RecordNotFound,
            "P2026" => Self::InvalidConnectionUrl,
            "P2030" => Self::BatchFailure,
            "P2031" => Self::InsufficientPermission,
            other => Self::Unrecognized(other.to_string()),
        }
    }

    pub fn code(&self) -> &str {
        match self {
            Self::ValueTooLong => "P2000",
            Self::UniqueViolation => "P2002",
            Self::ForeignKeyViolation => "P2003",
            Self::ConstraintViolation => "P2004",
            Self::NullConstraintViolation => "P2011",
            Self::MissingRequiredValue => "P2012",
            Self::MissingRequiredArgument => "P2013",
            Self::InvalidRelation => "P2014",
            Self::RecordNotFound => "P2025",
            Self::InvalidConnectionUrl => "P2026",
            Self::BatchFailure => "P2030",
            Self::InsufficientPermission => "P2031",
            Self::Unrecognized(code) => code,
        }
    }
}

impl fmt::Display for KnownErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

// == Known Request Error ==
/// A request the engine rejected with a recognizable code.
#[derive(Debug, Clone, PartialEq)]
pub struct KnownRequestError {
    pub code: KnownErrorCode,
    pub message: String,
    /// Field(s) the failure refers to, when the engine reports them
    pub target: Option<String>,
    /// Argument name for missing-argument failures
    pub argument: Option<String>,
}

impl KnownRequestError {
    pub fn new(code: KnownErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            target: None,
            argument: None,
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_argument(mut self, argument: impl Into<String>) -> Self {
        self.argument = Some(argument.into());
        self
    }
}

// == Engine Error ==
/// Failure surfaced by the persistence engine.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("[{}] {}", .0.code, .0.message)]
    Known(KnownRequestError),

    #[error("engine connection failed: {0}")]
    Connection(String),

    #[error("{0}")]
    Other(String),
}

impl From<KnownRequestError> for EngineError {
    fn from(err: KnownRequestError) -> Self {
        EngineError::Known(err)
    }
}

/// Result type for engine calls.
pub type EngineResult<T> = std::result::Result<T, EngineError>;
