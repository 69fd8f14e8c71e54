//! In-process sliding-window rate limiting
//!
//! One window per caller identity (API key digest, or a shared anonymous
//! bucket when auth is disabled). State lives in this process only, so
//! limits are per-instance when the gateway is scaled horizontally.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use parking_lot::Mutex;
use virtuoso_common::Error;

use crate::auth::{key_digest, API_KEY_HEADER};
use crate::error::ApiError;
use crate::server::AppState;

/// Caller identity: the SHA-256 digest of the presented key, so raw keys
/// never sit in limiter state
type Identity = [u8; 32];

pub struct RateLimiter {
    max_requests: u32,
    period: Duration,
    windows: Mutex<HashMap<Identity, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new(max_requests: u32, period: Duration) -> Self {
        Self {
            max_requests,
            period,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Record a request for `identity`, or reject it with the seconds until
    /// the window frees up. `max_requests == 0` disables limiting.
    pub fn check(&self, identity: Identity) -> Result<(), u64> {
        if self.max_requests == 0 {
            return Ok(());
        }

        let now = Instant::now();
        let mut windows = self.windows.lock();
        let window = windows.entry(identity).or_default();

        while let Some(front) = window.front() {
            if now.duration_since(*front) >= self.period {
                window.pop_front();
            } else {
                break;
            }
        }

        if window.len() >= self.max_requests as usize {
            let oldest = window.front().copied().unwrap_or(now);
            let retry_after = self
                .period
                .saturating_sub(now.duration_since(oldest))
                .as_secs()
                .max(1);
            return Err(retry_after);
        }

        window.push_back(now);
        Ok(())
    }
}

pub async fn enforce_rate_limit(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let identity = key_digest(
        request
            .headers()
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("anonymous"),
    );

    match state.limiter.check(identity) {
        Ok(()) => next.run(request).await,
        Err(retry_after_secs) => {
            ApiError(Error::RateLimited { retry_after_secs }).into_response()
        }
    }
}
