use std::error::Error;
use std::fmt;

use crate::upstream::{LoginError, UpstreamError};

#[derive(Debug)]
pub enum AppError {
    Io(std::io::Error),
    Db(sea_orm::DbErr),
    Json(serde_json::Error),
    NotFound(String),
    InvalidInput(String),
    Auth(String),
    Upstream(String),
    Structural(String),
}

impl AppError {
    /// HTTP-equivalent status code for the failure class.
    pub fn status(&self) -> u16 {
        match self {
            AppError::InvalidInput(_) => 400,
            AppError::Auth(_) => 401,
            AppError::NotFound(_) => 404,
            AppError::Upstream(_) => 502,
            AppError::Io(_) | AppError::Db(_) | AppError::Json(_) | AppError::Structural(_) => 500,
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, AppError::Auth(_))
    }

    /// Message suitable for a notice or a failed apply step.
    pub fn user_message(&self) -> String {
        match self {
            AppError::NotFound(message)
            | AppError::InvalidInput(message)
            | AppError::Auth(message)
            | AppError::Upstream(message)
            | AppError::Structural(message) => message.clone(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Io(err) => write!(f, "io error: {err}"),
            AppError::Db(err) => write!(f, "database error: {err}"),
            AppError::Json(err) => write!(f, "json error: {err}"),
            AppError::NotFound(message) => write_multiline(f, "Not found", message),
            AppError::InvalidInput(message) => write_multiline(f, "Invalid input", message),
            AppError::Auth(message) => write_multiline(f, "Unauthorized", message),
            AppError::Upstream(message) => write_multiline(f, "Upstream error", message),
            AppError::Structural(message) => write_multiline(f, "Unexpected response", message),
        }
    }
}

impl Error for AppError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            AppError::Io(err) => Some(err),
            AppError::Db(err) => Some(err),
            AppError::Json(err) => Some(err),
            AppError::NotFound(_)
            | AppError::InvalidInput(_)
            | AppError::Auth(_)
            | AppError::Upstream(_)
            | AppError::Structural(_) => None,
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<sea_orm::DbErr> for AppError {
    fn from(value: sea_orm::DbErr) -> Self {
        Self::Db(value)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

impl From<UpstreamError> for AppError {
    fn from(value: UpstreamError) -> Self {
        match value {
            UpstreamError::Unauthorized => Self::Auth(value.to_string()),
            other => Self::Upstream(other.to_string()),
        }
    }
}

impl From<LoginError> for AppError {
    fn from(value: LoginError) -> Self {
        match value {
            LoginError::InvalidCredentials => Self::Auth(value.to_string()),
            LoginError::Failed(message) => Self::Upstream(message),
        }
    }
}

fn write_multiline(f: &mut fmt::Formatter<'_>, label: &str, message: &str) -> fmt::Result {
    if message.contains('\n') {
        write!(f, "{label}:\n{message}")
    } else {
        write!(f, "{label}: {message}")
    }
}
