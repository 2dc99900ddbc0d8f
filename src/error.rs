//! Error types and HTTP response mapping.
//!
//! Store failures are translated into [`ServiceError`] at the repository boundary;
//! handlers only ever return [`AppError`], which owns the status code mapping.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::{auth::Scope, models::ErrorDto, store::StoreError};

/// ServiceError
///
/// Failures of repository and identity operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The id does not resolve, or resolves to a row the caller may not see.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i32 },

    /// A referenced foreign id does not resolve.
    #[error("{entity} {id} referenced by the request does not exist")]
    RelationNotFound { entity: &'static str, id: i32 },

    #[error("{0}")]
    InvalidInput(String),

    /// A server-side fault outside the store, such as token signing or hashing.
    #[error("{0}")]
    Internal(String),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(msg) => ServiceError::InvalidInput(msg),
            other => ServiceError::Store(other),
        }
    }
}

/// AuthError
///
/// Authentication and authorization failures. Everything up to `InsufficientScope`
/// is a 401 carrying a `WWW-Authenticate` challenge; the rest are 403.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Not authenticated")]
    MissingCredentials,
    #[error("Could not validate credentials")]
    MalformedToken,
    #[error("Token has expired")]
    ExpiredToken,
    #[error("Could not validate credentials")]
    UnknownUser,
    #[error("Incorrect username or password")]
    BadCredentials,
    #[error("Not enough permissions")]
    InsufficientScope(Scope),
    #[error("Inactive user")]
    Inactive,
    #[error("Not enough permissions")]
    Forbidden,
}

impl AuthError {
    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::Inactive | AuthError::Forbidden => StatusCode::FORBIDDEN,
            _ => StatusCode::UNAUTHORIZED,
        }
    }

    fn challenge(&self) -> Option<String> {
        match self {
            AuthError::Inactive | AuthError::Forbidden => None,
            AuthError::InsufficientScope(scope) => {
                Some(format!("Bearer scope=\"{}\"", scope.as_str()))
            }
            _ => Some("Bearer".to_string()),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        tracing::debug!(reason = %self, "request rejected by auth");

        let status = self.status();
        let challenge = self.challenge();
        let mut response = (
            status,
            Json(ErrorDto {
                error: self.to_string(),
            }),
        )
            .into_response();

        if let Some(value) = challenge.and_then(|c| HeaderValue::from_str(&c).ok()) {
            response.headers_mut().insert(header::WWW_AUTHENTICATE, value);
        }
        response
    }
}

/// AppError
///
/// Top-level error returned by handlers and extractors.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Service(#[from] ServiceError),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::Service(err.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Auth(err) => err.into_response(),
            AppError::Service(ServiceError::NotFound { entity, id }) => (
                StatusCode::NOT_FOUND,
                Json(ErrorDto {
                    error: format!("{entity} {id} not found"),
                }),
            )
                .into_response(),
            AppError::Service(err @ ServiceError::RelationNotFound { .. })
            | AppError::Service(err @ ServiceError::InvalidInput(_)) => {
                tracing::info!(error = %err, "invalid input");
                (
                    StatusCode::BAD_REQUEST,
                    Json(ErrorDto {
                        error: err.to_string(),
                    }),
                )
                    .into_response()
            }
            AppError::Service(ServiceError::Internal(msg)) => InternalServerError(msg).into_response(),
            AppError::Service(ServiceError::Store(err)) => InternalServerError(err).into_response(),
        }
    }
}

/// Wrapper for converting any displayable error into a 500 with a generic body.
/// The detailed message only goes to the log.
pub struct InternalServerError<E>(pub E);

impl<E: std::fmt::Display> IntoResponse for InternalServerError<E> {
    fn into_response(self) -> Response {
        tracing::error!("{}", self.0);

        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorDto {
                error: "Internal server error".to_string(),
            }),
        )
            .into_response()
    }
}
