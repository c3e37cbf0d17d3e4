//! Error types.
//!
//! Internally the crate uses `anyhow` through the `Res` alias. Anything that crosses the public
//! API is converted into `Error`, which carries an `ErrorType` so that callers can branch on a
//! machine-readable code without parsing messages.

use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Display, Formatter};

/// The internal result type.
pub(crate) type Res<T> = anyhow::Result<T>;

/// The public result type.
pub type Result<T> = std::result::Result<T, Error>;

/// The category of a public error. The snake_case name doubles as the machine-readable code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    /// The budget or request did not carry an owner id.
    MissingOwner,
    /// A money value was negative or had more precision than the minor currency unit allows.
    MalformedAmount,
    /// The referenced budget does not exist.
    BudgetNotFound,
    /// A deletion reassignment was requested for a budget that is still active.
    BudgetStillActive,
    /// The request was malformed in some other way.
    InvalidInput,
    /// The calendar catalog was missing, unreadable or inconsistent.
    Calendar,
    /// Reading or writing the configuration failed.
    Config,
    /// The persistence collaborator failed.
    Database,
}

serde_plain::derive_display_from_serialize!(ErrorType);
serde_plain::derive_fromstr_from_deserialize!(ErrorType);

/// The public error type.
pub struct Error {
    error_type: ErrorType,
    source: anyhow::Error,
}

impl Error {
    pub fn new(error_type: ErrorType, source: impl Into<anyhow::Error>) -> Self {
        Self {
            error_type,
            source: source.into(),
        }
    }

    /// Construct an error from a plain message.
    pub fn msg(error_type: ErrorType, message: impl Display) -> Self {
        Self::new(error_type, anyhow::anyhow!("{message}"))
    }

    pub fn error_type(&self) -> ErrorType {
        self.error_type
    }

    /// The machine-readable code, e.g. `budget_not_found`.
    pub fn code(&self) -> String {
        self.error_type.to_string()
    }

    /// The human-readable message including the context chain.
    pub fn message(&self) -> String {
        format!("{:#}", self.source)
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#}", self.source)
    }
}

impl Debug for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {:?}", self.error_type, self.source)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.source.as_ref())
    }
}

/// Converts an internal result into the public `Result`, tagging the error with `ErrorType`.
pub(crate) trait IntoResult<T> {
    fn pub_result(self, error_type: ErrorType) -> Result<T>;
}

impl<T, E> IntoResult<T> for std::result::Result<T, E>
where
    E: Into<anyhow::Error>,
{
    fn pub_result(self, error_type: ErrorType) -> Result<T> {
        self.map_err(|e| Error::new(error_type, e))
    }
}
