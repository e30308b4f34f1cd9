//! Rate limiting for the credential endpoints.
//!
//! A single process-wide token bucket guards `/login` and
//! `/change_password`. Requests over the limit are rejected immediately
//! with 429 and a `Retry-After` hint; nothing is queued.

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;

use super::error::ApiError;
use crate::config::RateLimitConfig;
use crate::AppState;

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Thread-safe token bucket
#[derive(Debug)]
pub struct RateLimiter {
    bucket: Mutex<Bucket>,
    config: RateLimitConfig,
}

impl RateLimiter {
    /// Create a limiter whose bucket starts full
    pub fn new(config: RateLimitConfig) -> Self {
        Self::new_at(config, Instant::now())
    }

    pub fn new_at(config: RateLimitConfig, now: Instant) -> Self {
        Self {
            bucket: Mutex::new(Bucket {
                tokens: f64::from(config.capacity),
                last_refill: now,
            }),
            config,
        }
    }

    /// Take one token if available.
    /// Returns Err(retry_after_seconds) when the bucket is empty.
    pub fn check(&self) -> Result<(), u64> {
        self.check_at(Instant::now())
    }

    pub fn check_at(&self, now: Instant) -> Result<(), u64> {
        if !self.config.enabled {
            return Ok(());
        }

        let capacity = f64::from(self.config.capacity);
        let rate = self.config.refill_per_second;

        let mut bucket = self.bucket.lock();
        let elapsed = now.saturating_duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * rate).min(capacity);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            Ok(())
        } else if rate > 0.0 {
            let wait = (1.0 - bucket.tokens) / rate;
            Err(wait.ceil().max(1.0) as u64)
        } else {
            Err(60)
        }
    }
}

/// Middleware applied to the credential routes
pub async fn rate_limit_auth(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, Response> {
    match state.rate_limiter.check() {
        Ok(()) => Ok(next.run(request).await),
        Err(retry_after) => {
            tracing::warn!(
                path = %request.uri().path(),
                retry_after,
                "Rate limit exceeded"
            );
            let mut response = ApiError::rate_limited("Too many requests").into_response();
            if let Ok(value) = HeaderValue::from_str(&retry_after.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
            Err(response)
        }
    }
}
