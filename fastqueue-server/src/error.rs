use diesel::result::{DatabaseErrorKind, Error as DieselError};
use fastqueue_common::Status;
use std::fmt::{self, Display, Formatter};

/// The taxonomy of failures a repository or broker operation can raise. The HTTP facade maps
/// each variant to a status code exactly once, in `error_status`.
#[derive(Debug)]
pub enum BrokerError {
    /// A referenced entity (topic, queue, dead queue) does not exist.
    NotFound,
    /// A create would collide with an existing primary key.
    AlreadyExists,
    /// Input failed a range, regex, or co-requirement check.
    Invalid(String),
    /// Reserved for future use; the core never raises this today.
    Conflict,
    /// Anything else, usually a `diesel::result::Error` that isn't one of the two special cases
    /// below.
    Internal(DieselError),
}

impl Display for BrokerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not found"),
            Self::AlreadyExists => write!(f, "already exists"),
            Self::Invalid(message) => write!(f, "invalid: {}", message),
            Self::Conflict => write!(f, "conflict"),
            Self::Internal(err) => write!(f, "internal error: {}", err),
        }
    }
}

impl std::error::Error for BrokerError {}

impl From<DieselError> for BrokerError {
    fn from(err: DieselError) -> Self {
        Self::Internal(err)
    }
}

/// Classify a diesel error raised by an `INSERT`, distinguishing unique-violation (the row
/// already exists) and foreign-key-violation (a referenced id does not exist) from any other
/// store failure.
pub fn classify_write_error(err: DieselError) -> BrokerError {
    match err {
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => BrokerError::AlreadyExists,
        DieselError::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, _) => BrokerError::NotFound,
        other => BrokerError::Internal(other),
    }
}

/// Central status-code chokepoint for broker errors: every route maps through this function
/// exactly once so the HTTP facade can't drift from the taxonomy above.
pub fn error_status(err: &BrokerError) -> Status {
    match err {
        BrokerError::NotFound => Status::NotFound,
        BrokerError::AlreadyExists | BrokerError::Invalid(_) => Status::UnprocessableEntity,
        BrokerError::Conflict => Status::Conflict,
        BrokerError::Internal(_) => Status::InternalServerError,
    }
}

pub type BrokerResult<T> = Result<T, BrokerError>;
