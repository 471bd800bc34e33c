use crate::store::StorageError;

/// Everything a query for available slots can fail with.
#[derive(Debug)]
pub enum CalendarError {
    /// Malformed or incomplete request. Client-facing, never retried.
    Validation { field: &'static str, message: String },
    /// `date` is not a `YYYY-MM-DD` calendar date.
    InvalidDate(String),
    /// A read failed. Logged with full context, surfaced generically.
    Storage(StorageError),
}

pub const GENERIC_FAILURE: &str = "please try again later";

impl CalendarError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        CalendarError::Validation { field, message: message.into() }
    }

    pub fn is_client_error(&self) -> bool {
        !matches!(self, CalendarError::Storage(_))
    }

    /// The request field at fault, if the caller is to blame.
    pub fn field(&self) -> Option<&'static str> {
        match self {
            CalendarError::Validation { field, .. } => Some(field),
            CalendarError::InvalidDate(_) => Some("date"),
            CalendarError::Storage(_) => None,
        }
    }

    pub fn code(&self) -> &'static str {
        if self.is_client_error() {
            "validation_error"
        } else {
            "internal_server_error"
        }
    }

    /// What may be shown to the caller. Storage details stay internal.
    pub fn public_message(&self) -> String {
        match self {
            CalendarError::Storage(_) => GENERIC_FAILURE.to_string(),
            other => other.to_string(),
        }
    }
}

impl std::fmt::Display for CalendarError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CalendarError::Validation { field, message } => write!(f, "{field}: {message}"),
            CalendarError::InvalidDate(raw) => {
                write!(f, "date: {raw:?} is not a YYYY-MM-DD calendar date")
            }
            CalendarError::Storage(e) => write!(f, "storage error: {e}"),
        }
    }
}

impl std::error::Error for CalendarError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CalendarError::Storage(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StorageError> for CalendarError {
    fn from(e: StorageError) -> Self {
        CalendarError::Storage(e)
    }
}
