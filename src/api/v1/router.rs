use super::cookie::REFRESH_COOKIE;
use super::error::*;
use super::handler;
use crate::application_port::{AuthService, TokenClaims};
use crate::domain_model::FamilyId;
use crate::server::*;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::warn;
use warp::{Filter, http, reject};

const MAX_BODY_BYTES: u64 = 16 * 1024;

pub fn routes(
    server: Arc<Server>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let register = warp::path("auth")
        .and(warp::path("register"))
        .and(warp::path::end())
        .and(warp::post())
        .and(with_rate_limit(&server, RateLimitAction::Register))
        .and(json_body())
        .and(with(server.auth_service.clone()))
        .and_then(handler::register);

    let login = warp::path("auth")
        .and(warp::path("login"))
        .and(warp::path::end())
        .and(warp::post())
        .and(with_rate_limit(&server, RateLimitAction::Login))
        .and(json_body())
        .and(with(server.auth_service.clone()))
        .and(with_value(server.secure_cookie))
        .and_then(handler::login);

    let refresh = warp::path("auth")
        .and(warp::path("refresh"))
        .and(warp::path::end())
        .and(warp::post())
        .and(with_rate_limit(&server, RateLimitAction::Refresh))
        .and(with_refresh_cookie())
        .and(with(server.auth_service.clone()))
        .and(with_value(server.secure_cookie))
        .and_then(handler::refresh);

    let logout = warp::path("auth")
        .and(warp::path("logout"))
        .and(warp::path::end())
        .and(warp::post())
        .and(with_refresh_cookie())
        .and(with(server.auth_service.clone()))
        .and(with_value(server.secure_cookie))
        .and_then(handler::logout);

    let logout_all = warp::path("auth")
        .and(warp::path("logout-all"))
        .and(warp::path::end())
        .and(warp::post())
        .and(with_verification(server.auth_service.clone()))
        .and(with(server.auth_service.clone()))
        .and(with_value(server.secure_cookie))
        .and_then(handler::logout_all);

    let me = warp::path("auth")
        .and(warp::path("me"))
        .and(warp::path::end())
        .and(warp::get())
        .and(with_verification(server.auth_service.clone()))
        .and_then(handler::me);

    register
        .or(login)
        .or(refresh)
        .or(logout)
        .or(logout_all)
        .or(me)
}

fn json_body<T>() -> impl Filter<Extract = (T,), Error = warp::Rejection> + Clone
where
    T: serde::de::DeserializeOwned + Send,
{
    warp::body::content_length_limit(MAX_BODY_BYTES).and(warp::body::json())
}

fn with<ServiceType>(
    service: Arc<ServiceType>,
) -> impl Filter<Extract = (Arc<ServiceType>,), Error = Infallible> + Clone
where
    ServiceType: Send + Sync + ?Sized,
{
    warp::any().map(move || service.clone())
}

fn with_value<T: Clone + Send>(value: T) -> impl Filter<Extract = (T,), Error = Infallible> + Clone {
    warp::any().map(move || value.clone())
}

/// Charges the request to its client. Over budget rejects with 429 before the
/// body is read.
fn with_rate_limit(
    server: &Server,
    action: RateLimitAction,
) -> impl Filter<Extract = (), Error = warp::Rejection> + Clone + use<> {
    let limiter = server.rate_limiter.clone();
    let trust_forwarded_for = server.trust_forwarded_for;
    warp::addr::remote()
        .and(warp::header::optional::<String>("x-forwarded-for"))
        .and_then(move |remote: Option<SocketAddr>, forwarded: Option<String>| {
            let limiter = limiter.clone();
            async move {
                let client = client_ip(remote, forwarded.as_deref(), trust_forwarded_for);
                match limiter.check(client, action) {
                    RateLimitDecision::Allowed => Ok(()),
                    RateLimitDecision::Limited => {
                        warn!(?client, ?action, "rate limit exceeded");
                        Err(reject::custom(ApiErrorCode::RateLimited))
                    }
                }
            }
        })
        .untuple_one()
}

/// Family id from the refresh cookie. Absent or unparsable cookies reject
/// before the service is touched.
fn with_refresh_cookie() -> impl Filter<Extract = (FamilyId,), Error = warp::Rejection> + Clone {
    warp::cookie::optional::<String>(REFRESH_COOKIE).and_then(|cookie: Option<String>| async move {
        match cookie.filter(|value| !value.is_empty()) {
            None => Err(reject::custom(ApiErrorCode::MissingRefreshToken)),
            Some(value) => value
                .parse::<FamilyId>()
                .map_err(|_| reject::custom(ApiErrorCode::InvalidToken)),
        }
    })
}

fn with_verification(
    auth_service: Arc<dyn AuthService>,
) -> impl Filter<Extract = (TokenClaims,), Error = warp::Rejection> + Clone {
    warp::header::<String>(http::header::AUTHORIZATION.as_ref()).and_then(move |token: String| {
        let auth_service = auth_service.clone();
        async move {
            if let Some(token) = token.strip_prefix("Bearer ") {
                let claims = auth_service
                    .validate_token(token)
                    .map_err(ApiErrorCode::from)
                    .map_err(reject::custom)?;
                Ok(claims)
            } else {
                Err(reject::custom(ApiErrorCode::InvalidToken))
            }
        }
    })
}
