use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use log::{debug, error};
use thiserror::Error;

use crate::{
    models::{InvalidStatus, RosterError},
    session_auth::Backend,
};

pub type Result<T, E = AppError> = std::result::Result<T, E>;

/// Errors that end a request. Form validation problems are not errors: the form is
/// rendered again with its messages instead.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("resource not found")]
    NotFound,
    #[error("permission denied")]
    Forbidden,
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("template error: {0}")]
    Template(#[from] tera::Error),
    #[error("authentication error: {0}")]
    Auth(#[from] axum_login::Error<Backend>),
    #[error("password hashing error: {0}")]
    Password(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        AppError::BadRequest(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Template(_)
            | AppError::Auth(_)
            | AppError::Password(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<InvalidStatus> for AppError {
    fn from(err: InvalidStatus) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

impl From<RosterError> for AppError {
    fn from(err: RosterError) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            AppError::BadRequest(message) => message.clone(),
            _ if status.is_server_error() => {
                error!("{self:?}");
                String::from("Something went wrong on our side.")
            },
            _ => self.to_string(),
        };
        debug!("responding {status} ({self})");

        let reason = status.canonical_reason().unwrap_or("Error");
        let body = Html(format!(
            r#"<!DOCTYPE html>
<html>
<head><title>{code} {reason}</title></head>
<body>
<h1>{code} {reason}</h1>
<p>{message}</p>
<p><a href="/">Back to the board</a></p>
</body>
</html>"#,
            code = status.as_u16(),
        ));

        (status, body).into_response()
    }
}
