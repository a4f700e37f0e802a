use axum::{
    extract::{FromRef, FromRequestParts},
    http::{HeaderValue, header, request::Parts},
};
use base64::{Engine, engine::general_purpose::STANDARD};

use crate::{error::AppError, policy::Identity, service::Library};

/// Caller Extractor Result
///
/// The identity behind a request, if any. Handlers pass `caller.identity()` to the
/// guarded `Library` operations, which decide between 401 and 403 themselves.
///
/// A request without an `Authorization` header yields `Caller(None)`; a header that is
/// present but malformed or carries wrong credentials is rejected with 401 immediately.
#[derive(Debug, Clone)]
pub struct Caller(pub Option<Identity>);

impl Caller {
    pub fn identity(&self) -> Option<&Identity> {
        self.0.as_ref()
    }
}

/// AuthUser Extractor Result
///
/// A resolved identity; rejects anonymous requests with 401. Used by the router
/// middleware that guards mutating routes.
#[derive(Debug, Clone)]
pub struct AuthUser(pub Identity);

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
    Library: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        // The middleware and the handler both extract the caller; bcrypt runs once.
        if let Some(cached) = parts.extensions.get::<Caller>() {
            return Ok(cached.clone());
        }

        let Some(value) = parts.headers.get(header::AUTHORIZATION) else {
            return Ok(Caller(None));
        };

        let (user_name, password) = parse_basic(value).ok_or_else(|| {
            tracing::debug!("malformed Authorization header");
            AppError::Unauthenticated
        })?;

        let library = Library::from_ref(state);
        let identity = library
            .authenticate(&user_name, &password)
            .await?
            .ok_or_else(|| {
                tracing::warn!(user = %user_name, "invalid credentials");
                AppError::Unauthenticated
            })?;

        let caller = Caller(Some(identity));
        parts.extensions.insert(caller.clone());
        Ok(caller)
    }
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    Library: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Caller::from_request_parts(parts, state).await? {
            Caller(Some(identity)) => Ok(AuthUser(identity)),
            Caller(None) => Err(AppError::Unauthenticated),
        }
    }
}

/// parse_basic
///
/// Decodes `Basic base64(user:password)`. The scheme name is case-insensitive;
/// the password may itself contain colons.
pub fn parse_basic(value: &HeaderValue) -> Option<(String, String)> {
    let value = value.to_str().ok()?;
    let (scheme, encoded) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }

    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user_name, password) = decoded.split_once(':')?;
    Some((user_name.to_string(), password.to_string()))
}

/// Builds an `Authorization` header value; used by clients and tests.
pub fn basic_header(user_name: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{user_name}:{password}")))
}
