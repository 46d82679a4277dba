use crate::api::v1::handler::ApiResponse;
use crate::application_port::*;
use serde::Serialize;
use std::convert::Infallible;
use thiserror::Error;
use tracing::{error, warn};
use warp::http::StatusCode;
use warp::{Rejection, reject};

pub async fn recover_error(err: Rejection) -> Result<impl warp::Reply, Infallible> {
    let code = if let Some(code) = err.find::<ApiErrorCode>() {
        code.clone()
    } else if err.is_not_found() {
        ApiErrorCode::NotFound
    } else if err.find::<warp::filters::body::BodyDeserializeError>().is_some() {
        ApiErrorCode::InvalidInput("Invalid JSON format".to_string())
    } else if err.find::<reject::MissingHeader>().is_some() {
        ApiErrorCode::InvalidToken
    } else if err.find::<reject::MethodNotAllowed>().is_some() {
        ApiErrorCode::MethodNotAllowed
    } else if err.find::<reject::PayloadTooLarge>().is_some() {
        ApiErrorCode::InvalidInput("Request body too large".to_string())
    } else {
        warn!("Unhandled rejection: {:?}", err);
        ApiErrorCode::InternalError
    };

    let json = warp::reply::json(&ApiResponse::<()>::err(code.clone(), code.to_string()));
    Ok(warp::reply::with_status(json, code.status()))
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: &'static str,
    pub message: String,
}

/// Client-facing failure. Messages are deliberately generic: token failures
/// never reveal which check rejected them.
#[derive(Debug, Clone, Error)]
pub enum ApiErrorCode {
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Invalid or expired token")]
    InvalidToken,
    #[error("Missing refresh token")]
    MissingRefreshToken,
    #[error("Identity already exists")]
    IdentityExists,
    #[error("{0}")]
    InvalidInput(String),
    #[error("Too many requests")]
    RateLimited,
    #[error("Service temporarily unavailable")]
    StoreUnavailable,
    #[error("Not found")]
    NotFound,
    #[error("Method not allowed")]
    MethodNotAllowed,
    #[error("Internal error")]
    InternalError,
}

impl ApiErrorCode {
    pub fn internal<E: std::fmt::Display>(error: E) -> ApiErrorCode {
        error!("Internal error: {}", error);
        ApiErrorCode::InternalError
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiErrorCode::InvalidCredentials => "invalid_credentials",
            ApiErrorCode::InvalidToken => "invalid_token",
            ApiErrorCode::MissingRefreshToken => "missing_refresh_token",
            ApiErrorCode::IdentityExists => "identity_exists",
            ApiErrorCode::InvalidInput(_) => "invalid_input",
            ApiErrorCode::RateLimited => "rate_limited",
            ApiErrorCode::StoreUnavailable => "store_unavailable",
            ApiErrorCode::NotFound => "not_found",
            ApiErrorCode::MethodNotAllowed => "method_not_allowed",
            ApiErrorCode::InternalError => "internal_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiErrorCode::InvalidCredentials
            | ApiErrorCode::InvalidToken
            | ApiErrorCode::MissingRefreshToken => StatusCode::UNAUTHORIZED,
            ApiErrorCode::IdentityExists => StatusCode::CONFLICT,
            ApiErrorCode::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ApiErrorCode::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiErrorCode::StoreUnavailable => StatusCode::BAD_GATEWAY,
            ApiErrorCode::NotFound => StatusCode::NOT_FOUND,
            ApiErrorCode::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl reject::Reject for ApiErrorCode {}

impl From<AuthError> for ApiErrorCode {
    fn from(error: AuthError) -> Self {
        match error {
            AuthError::InvalidCredentials | AuthError::IdentityNotFound => {
                ApiErrorCode::InvalidCredentials
            }
            AuthError::IdentityExists => ApiErrorCode::IdentityExists,
            AuthError::InvalidInput(reason) => ApiErrorCode::InvalidInput(reason),
            AuthError::TokenExpired | AuthError::TokenReplayed | AuthError::TokenInvalid => {
                ApiErrorCode::InvalidToken
            }
            AuthError::StoreUnavailable(e) => {
                warn!("Session store unavailable: {}", e);
                ApiErrorCode::StoreUnavailable
            }
            AuthError::InternalFailure(e) => ApiErrorCode::internal(e),
        }
    }
}
