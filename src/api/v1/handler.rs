use super::cookie::*;
use super::error::*;
use crate::application_port::*;
use crate::domain_model::{FamilyId, Identity, Role, UserId};
use crate::logger::*;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use warp::http::{StatusCode, header};
use warp::{self, reject};

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ApiError>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        ApiResponse {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(code: ApiErrorCode, message: impl Into<String>) -> Self {
        ApiResponse {
            success: false,
            data: None,
            error: Some(ApiError {
                code: code.code(),
                message: message.into(),
            }),
        }
    }
}

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub username: String,
    pub password: String,
    pub role: Role,
}

pub async fn register(
    body: RegisterRequest,
    auth_service: Arc<dyn AuthService>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let register_input = RegisterInput {
        login: body.email,
        username: body.username,
        password: body.password,
        role: body.role,
    };
    let identity = auth_service
        .register(register_input)
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;

    Ok(warp::reply::with_status(
        warp::reply::json(&ApiResponse::ok(identity)),
        StatusCode::CREATED,
    ))
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user: Identity,
    pub access_token: AccessToken,
    pub access_token_expires_at: DateTime<Utc>,
}

pub async fn login(
    body: LoginRequest,
    auth_service: Arc<dyn AuthService>,
    secure_cookie: bool,
) -> Result<impl warp::Reply, warp::Rejection> {
    let login_input = LoginInput {
        login: body.email,
        password: body.password,
    };
    let login_result = auth_service
        .login(login_input)
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;

    let cookie = refresh_cookie(
        &login_result.tokens.family_id,
        auth_service.refresh_ttl(),
        secure_cookie,
    );
    let login_response = LoginResponse {
        user: login_result.identity,
        access_token: login_result.tokens.access_token,
        access_token_expires_at: login_result.tokens.access_token_expires_at,
    };

    Ok(warp::reply::with_header(
        warp::reply::json(&ApiResponse::ok(login_response)),
        header::SET_COOKIE,
        cookie,
    ))
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub access_token: AccessToken,
    pub access_token_expires_at: DateTime<Utc>,
}

pub async fn refresh(
    family_id: FamilyId,
    auth_service: Arc<dyn AuthService>,
    secure_cookie: bool,
) -> Result<impl warp::Reply, warp::Rejection> {
    let tokens = auth_service
        .refresh(&family_id)
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;

    let cookie = refresh_cookie(&tokens.family_id, auth_service.refresh_ttl(), secure_cookie);
    let response = RefreshResponse {
        access_token: tokens.access_token,
        access_token_expires_at: tokens.access_token_expires_at,
    };

    Ok(warp::reply::with_header(
        warp::reply::json(&ApiResponse::ok(response)),
        header::SET_COOKIE,
        cookie,
    ))
}

pub async fn logout(
    family_id: FamilyId,
    auth_service: Arc<dyn AuthService>,
    secure_cookie: bool,
) -> Result<impl warp::Reply, warp::Rejection> {
    auth_service
        .logout(&family_id)
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;

    Ok(warp::reply::with_header(
        warp::reply::json(&ApiResponse::ok(())),
        header::SET_COOKIE,
        cleared_refresh_cookie(secure_cookie),
    ))
}

pub async fn me(claims: TokenClaims) -> Result<impl warp::Reply, warp::Rejection> {
    Ok(warp::reply::json(&ApiResponse::ok(claims.identity())))
}

#[derive(Debug, Serialize)]
pub struct LogoutAllResponse {
    pub user_id: UserId,
    pub revoked: usize,
}

pub async fn logout_all(
    claims: TokenClaims,
    auth_service: Arc<dyn AuthService>,
    secure_cookie: bool,
) -> Result<impl warp::Reply, warp::Rejection> {
    let revoked = auth_service
        .revoke_all(claims.user_id)
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;
    info!(user_id = %claims.user_id, revoked, "logged out everywhere");

    let response = LogoutAllResponse {
        user_id: claims.user_id,
        revoked,
    };
    Ok(warp::reply::with_header(
        warp::reply::json(&ApiResponse::ok(response)),
        header::SET_COOKIE,
        cleared_refresh_cookie(secure_cookie),
    ))
}
