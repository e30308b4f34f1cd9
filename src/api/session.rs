//! Cookie sessions.
//!
//! The session lives entirely in a private (encrypted and authenticated)
//! cookie holding the user snapshot taken at login plus an expiry. Nothing
//! is stored server side, so logging out only drops the cookie.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
};
use axum_extra::extract::cookie::{Cookie, Key, PrivateCookieJar, SameSite};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::error::ApiError;
use crate::config::SessionConfig;
use crate::crypto::derive_cookie_key;
use crate::db::UserSnapshot;
use crate::AppState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionPayload {
    pub user: UserSnapshot,
    /// Unix timestamp (seconds) after which the session is rejected
    pub expires_at: i64,
}

#[derive(Clone)]
pub struct SessionManager {
    key: Key,
    cookie_name: String,
    max_age_hours: i64,
    remember_hours: i64,
    secure: bool,
}

impl SessionManager {
    pub fn new(config: &SessionConfig, secret: &str) -> Self {
        Self {
            key: Key::from(&derive_cookie_key(secret)),
            cookie_name: config.cookie_name.clone(),
            max_age_hours: config.max_age_hours,
            remember_hours: config.remember_hours.max(config.max_age_hours),
            secure: config.secure,
        }
    }

    /// Open the request's cookie jar with the session key
    pub fn jar(&self, headers: &HeaderMap) -> PrivateCookieJar {
        PrivateCookieJar::from_headers(headers, self.key.clone())
    }

    /// Start a session for `user`. The cookie and the payload share one
    /// lifetime; `remember` stretches it from `max_age_hours` to
    /// `remember_hours`.
    pub fn login(
        &self,
        jar: PrivateCookieJar,
        user: &UserSnapshot,
        remember: bool,
    ) -> Result<PrivateCookieJar, ApiError> {
        let hours = if remember {
            self.remember_hours
        } else {
            self.max_age_hours
        };
        let payload = SessionPayload {
            user: user.clone(),
            expires_at: (chrono::Utc::now() + chrono::Duration::hours(hours)).timestamp(),
        };
        let value = serde_json::to_string(&payload).map_err(|e| {
            tracing::error!(error = %e, "Failed to encode session");
            ApiError::internal("Failed to save session")
        })?;

        let cookie = Cookie::build((self.cookie_name.clone(), value))
            .path("/")
            .http_only(true)
            .same_site(SameSite::None)
            .secure(self.secure)
            .max_age(time::Duration::hours(hours));

        Ok(jar.add(cookie))
    }

    /// The identity carried by the jar, if its session is present, intact
    /// and not expired.
    pub fn resolve(&self, jar: &PrivateCookieJar) -> Option<UserSnapshot> {
        self.resolve_at(jar, chrono::Utc::now().timestamp())
    }

    pub fn resolve_at(&self, jar: &PrivateCookieJar, now: i64) -> Option<UserSnapshot> {
        let cookie = jar.get(&self.cookie_name)?;
        let payload: SessionPayload = match serde_json::from_str(cookie.value()) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::debug!(error = %e, "Discarding malformed session");
                return None;
            }
        };

        if payload.expires_at <= now {
            tracing::debug!(user_id = payload.user.id, "Session expired");
            return None;
        }
        Some(payload.user)
    }

    /// Drop the session cookie
    pub fn invalidate(&self, jar: PrivateCookieJar) -> PrivateCookieJar {
        jar.remove(Cookie::build((self.cookie_name.clone(), "")).path("/"))
    }
}

/// The request's cookie jar, opened with the session key
pub struct SessionJar(pub PrivateCookieJar);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for SessionJar {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        Ok(SessionJar(state.sessions.jar(&parts.headers)))
    }
}

/// Authenticated identity; rejects with 401 when there is no valid session
pub struct CurrentUser(pub UserSnapshot);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let jar = state.sessions.jar(&parts.headers);
        state
            .sessions
            .resolve(&jar)
            .map(CurrentUser)
            .ok_or_else(|| ApiError::unauthorized("Unauthorized"))
    }
}

/// Identity if there is one; never rejects
pub struct MaybeUser(pub Option<UserSnapshot>);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for MaybeUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let jar = state.sessions.jar(&parts.headers);
        Ok(MaybeUser(state.sessions.resolve(&jar)))
    }
}
