use thiserror::Error;

/// Every failure the data layer can report.
///
/// The first four kinds mirror what a gateway call or a submission can fail
/// with; the rest describe local problems (missing entities, unreadable files).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AppError {
    #[error("validation_error - {0}")]
    Validation(String),
    #[error("network_error - {0}")]
    Network(String),
    #[error("auth_error - {0}")]
    Auth(String),
    #[error("conflict_error - {0}")]
    Conflict(String),
    #[error("not_found - {0}")]
    NotFound(String),
    #[error("invalid_data - {0}")]
    InvalidData(String),
    #[error("io_error - {0}")]
    Io(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn validation<M: Into<String>>(message: M) -> Self {
        Self::Validation(message.into())
    }

    pub fn network<M: Into<String>>(message: M) -> Self {
        Self::Network(message.into())
    }

    pub fn auth<M: Into<String>>(message: M) -> Self {
        Self::Auth(message.into())
    }

    pub fn conflict<M: Into<String>>(message: M) -> Self {
        Self::Conflict(message.into())
    }

    pub fn not_found<M: Into<String>>(message: M) -> Self {
        Self::NotFound(message.into())
    }

    pub fn invalid_data<M: Into<String>>(message: M) -> Self {
        Self::InvalidData(message.into())
    }

    pub fn io<M: Into<String>>(message: M) -> Self {
        Self::Io(message.into())
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::Network(_) => "network_error",
            Self::Auth(_) => "auth_error",
            Self::Conflict(_) => "conflict_error",
            Self::NotFound(_) => "not_found",
            Self::InvalidData(_) => "invalid_data",
            Self::Io(_) => "io_error",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Validation(message)
            | Self::Network(message)
            | Self::Auth(message)
            | Self::Conflict(message)
            | Self::NotFound(message)
            | Self::InvalidData(message)
            | Self::Io(message) => message,
        }
    }

    /// Failures that came back from the gateway rather than from local checks.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::Auth(_) | Self::Conflict(_)
        )
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::io(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::invalid_data(err.to_string())
    }
}
