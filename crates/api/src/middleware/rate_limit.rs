//! Per-clinic rate limiting for the import submit path.
//!
//! Submissions write the uploaded file to disk and enqueue background work,
//! so one clinic is not allowed to monopolize the pipeline.

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use governor::{
    clock::{Clock, DefaultClock},
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter as GovRateLimiter,
};
use serde_json::json;
use std::{
    collections::HashMap,
    num::NonZeroU32,
    sync::{Arc, RwLock},
};
use uuid::Uuid;

use crate::app::AppState;
use crate::extractors::clinic_context::CLINIC_ID_HEADER;

type ClinicRateLimiter = GovRateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// One governor limiter per clinic, created lazily on first submit.
pub struct RateLimiterState {
    limiters: RwLock<HashMap<Uuid, Arc<ClinicRateLimiter>>>,
    rate_limit_per_minute: u32,
}

impl RateLimiterState {
    pub fn new(rate_limit_per_minute: u32) -> Self {
        Self {
            limiters: RwLock::new(HashMap::new()),
            rate_limit_per_minute,
        }
    }

    fn get_or_create_limiter(&self, clinic_id: Uuid) -> Arc<ClinicRateLimiter> {
        // Fast path under the read lock.
        {
            let limiters = self.limiters.read().unwrap();
            if let Some(limiter) = limiters.get(&clinic_id) {
                return limiter.clone();
            }
        }

        let mut limiters = self.limiters.write().unwrap();

        // Re-check after lock upgrade; another request may have won the race.
        if let Some(limiter) = limiters.get(&clinic_id) {
            return limiter.clone();
        }

        // A zero limit disables the middleware in app wiring, so the floor
        // here only guards against misuse.
        let per_minute = NonZeroU32::new(self.rate_limit_per_minute).unwrap_or(NonZeroU32::MIN);
        let limiter = Arc::new(GovRateLimiter::direct(Quota::per_minute(per_minute)));
        limiters.insert(clinic_id, limiter.clone());
        limiter
    }

    /// Ok when the request fits the clinic's quota, otherwise the number of
    /// seconds to wait before retrying.
    pub fn check(&self, clinic_id: Uuid) -> Result<(), u64> {
        let limiter = self.get_or_create_limiter(clinic_id);

        match limiter.check() {
            Ok(_) => Ok(()),
            Err(not_until) => {
                let wait = not_until.wait_time_from(DefaultClock::default().now());
                Err(wait.as_secs().max(1))
            }
        }
    }
}

impl std::fmt::Debug for RateLimiterState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiterState")
            .field("rate_limit_per_minute", &self.rate_limit_per_minute)
            .field("active_limiters", &self.limiters.read().unwrap().len())
            .finish()
    }
}

/// Applies the per-clinic quota before the handler runs.
///
/// The clinic is read straight from the gateway header. Requests without a
/// parseable header pass through; the clinic context extractor rejects them
/// regardless.
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let clinic_id = match req
        .headers()
        .get(CLINIC_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<Uuid>().ok())
    {
        Some(id) => id,
        None => return next.run(req).await,
    };

    if let Some(ref rate_limiter) = state.rate_limiter {
        if let Err(retry_after) = rate_limiter.check(clinic_id) {
            return rate_limited_response(state.config.security.rate_limit_per_minute, retry_after);
        }
    }

    next.run(req).await
}

fn rate_limited_response(limit: u32, retry_after: u64) -> Response {
    let body = json!({
        "error": "rate_limit_exceeded",
        "message": format!("Rate limit of {} requests/minute exceeded", limit),
        "retryAfter": retry_after
    });

    let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
    response
        .headers_mut()
        .insert(header::RETRY_AFTER, HeaderValue::from(retry_after));

    response
}
