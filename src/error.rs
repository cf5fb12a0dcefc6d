use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use std::io;

use crate::config::ConfigError;
use crate::http::ServerError;

/// Errors that stop the process before or while serving.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Server(#[from] ServerError),
}

impl StartupError {
    /// Process exit status for this failure.
    ///
    /// 2 = configuration, 3 = certificate/key, 4 = bind, 1 = anything else.
    pub fn exit_code(&self) -> u8 {
        match self {
            StartupError::Config(_) => 2,
            StartupError::Server(ServerError::Tls { .. }) => 3,
            StartupError::Server(ServerError::Bind { .. }) => 4,
            StartupError::Server(ServerError::Server(_)) => 1,
        }
    }
}

/// Errors from the directory listing fallback.
#[derive(Debug, thiserror::Error)]
pub enum FileError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl IntoResponse for FileError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            FileError::NotFound(_) => (StatusCode::NOT_FOUND, "File not found".to_string()),
            FileError::Forbidden(_) => (
                StatusCode::FORBIDDEN,
                "No permission to list directory".to_string(),
            ),
            FileError::Io(_) => {
                tracing::error!("Internal error: {:?}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = format!(
            r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>Error {}</title>
</head>
<body>
    <h1>Error {}</h1>
    <p>{}</p>
    <a href="/">Return to the quiz</a>
</body>
</html>"#,
            status.as_u16(),
            status.as_u16(),
            message
        );

        (status, Html(body)).into_response()
    }
}
