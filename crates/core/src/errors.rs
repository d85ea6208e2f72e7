use thiserror::Error;

/// Failure raised by the issue-tracker collaborator.
///
/// The display form is the bare message so it can be handed back to the
/// model verbatim.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct TrackerError {
    pub message: String,
}

impl TrackerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

/// Failure raised by the relational-store collaborator.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct SqlError {
    pub message: String,
}

impl SqlError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::{SqlError, TrackerError};

    #[test]
    fn tracker_error_displays_message_only() {
        let error = TrackerError::new("Cannot query field \"foo\" on type \"Issue\"");
        assert_eq!(error.to_string(), "Cannot query field \"foo\" on type \"Issue\"");
    }

    #[test]
    fn sql_error_displays_message_only() {
        assert_eq!(SqlError::new("syntax error").to_string(), "syntax error");
    }
}
