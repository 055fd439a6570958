//! Authentication extractors.
//!
//! Login itself happens elsewhere; these extractors only read the
//! [`CurrentUser`] it leaves in the session.

use axum::{
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Redirect, Response},
};
use tower_sessions::Session;

use crate::error::set_sentry_user;
use crate::models::{CurrentUser, session_keys};

/// Extractor that requires a logged-in user.
///
/// Without one, browsers are redirected to the login page.
pub struct RequireAuth(pub CurrentUser);

/// Error returned when authentication is required but nobody is logged in.
pub enum AuthRejection {
    /// Redirect to login page (for HTML requests).
    RedirectToLogin,
    /// Unauthorized response (no session layer, or API requests).
    Unauthorized,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        match self {
            Self::RedirectToLogin => Redirect::to("/auth/login").into_response(),
            Self::Unauthorized => StatusCode::UNAUTHORIZED.into_response(),
        }
    }
}

async fn current_user(parts: &Parts) -> Option<CurrentUser> {
    let session = parts.extensions.get::<Session>()?;
    let user: CurrentUser = session
        .get(session_keys::CURRENT_USER)
        .await
        .ok()
        .flatten()?;
    set_sentry_user(&user.id, Some(user.email.as_str()));
    Some(user)
}

impl<S> FromRequestParts<S> for RequireAuth
where
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if parts.extensions.get::<Session>().is_none() {
            return Err(AuthRejection::Unauthorized);
        }
        current_user(parts)
            .await
            .map(Self)
            .ok_or(AuthRejection::RedirectToLogin)
    }
}

/// Extractor that optionally gets the current user.
pub struct OptionalAuth(pub Option<CurrentUser>);

impl<S> FromRequestParts<S> for OptionalAuth
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(current_user(parts).await))
    }
}

/// Store the logged-in user in the session.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn set_current_user(
    session: &Session,
    user: &CurrentUser,
) -> Result<(), tower_sessions::session::Error> {
    session.insert(session_keys::CURRENT_USER, user).await
}
