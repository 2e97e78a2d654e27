//! Error types shared across the catalogue and session phases.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    Parse,
    Validate,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Parse => write!(f, "Parse"),
            Phase::Validate => write!(f, "Validate"),
        }
    }
}

/// A problem with the catalogue document itself, found before any session starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogueError {
    pub code: String,
    pub phase: Phase,
    pub message: String,
    pub field: Option<String>,
}

impl std::fmt::Display for CatalogueError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.field {
            Some(name) => write!(
                f,
                "[{}:{}] {} (field '{}')",
                self.phase, self.code, self.message, name
            ),
            None => write!(f, "[{}:{}] {}", self.phase, self.code, self.message),
        }
    }
}

impl std::error::Error for CatalogueError {}

impl CatalogueError {
    pub fn parse(code: &str, message: impl Into<String>) -> Self {
        CatalogueError {
            code: code.into(),
            phase: Phase::Parse,
            message: message.into(),
            field: None,
        }
    }

    pub fn validate(code: &str, message: impl Into<String>, field: Option<String>) -> Self {
        CatalogueError {
            code: code.into(),
            phase: Phase::Validate,
            message: message.into(),
            field,
        }
    }
}

/// Misuse of a session: the caller asked for something the current state cannot do.
///
/// These never represent user input problems; those surface as field errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("unknown field '{0}'")]
    UnknownField(String),
    #[error("field '{field}' is a {kind} field and does not accept this value")]
    KindMismatch { field: String, kind: &'static str },
    #[error("'{option}' is not an option of field '{field}'")]
    UnknownOption { field: String, option: String },
    #[error("field '{field}' has no file at position {index}")]
    NoSuchFile { field: String, index: usize },
    #[error("submit is only available on the final step")]
    NotFinalStep,
    #[error("the final step accepts submit, not next")]
    NoNextStep,
    #[error("no submission is in flight")]
    NoSubmissionInFlight,
    #[error("a submission is in flight")]
    Busy,
    #[error("the session has been completed")]
    Closed,
}

/// Failure to obtain a session identity from the issuance collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationError {
    #[error("Failed to register user. Please try again.")]
    Rejected(String),
    #[error("An error occurred during registration.")]
    Transport(String),
}

/// Failure of a single file upload. Always terminal for that file's entry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadError {
    #[error("{0}")]
    Rejected(String),
    #[error("Upload failed due to a network error")]
    Transport(String),
}

/// Failure reported by the final submission sink.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmissionError {
    #[error("Form submission failed.")]
    Rejected,
    #[error("An error occurred while submitting the form.")]
    Transport(String),
}
