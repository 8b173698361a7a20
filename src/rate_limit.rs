//! Fixed-window request counter keyed by client address.
//!
//! State lives in process memory, so limits are per instance.

use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use axum::{
    extract::{Request, State},
    http::{header::RETRY_AFTER, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use parking_lot::Mutex;
use tracing::warn;

use crate::models::ErrorBody;

pub const TOO_MANY_REQUESTS_MESSAGE: &str = "Çok fazla istek gönderildi. Lütfen biraz bekleyin.";

#[derive(Debug, Clone, Copy)]
struct WindowEntry {
    count: u32,
    started: Instant,
}

#[derive(Debug)]
pub struct RateLimiter {
    limit: u32,
    window: Duration,
    entries: Mutex<HashMap<String, WindowEntry>>,
}

impl RateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self { limit, window, entries: Mutex::new(HashMap::new()) }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Records one request and returns whether it is within the limit.
    pub fn allow(&self, key: &str) -> bool {
        self.hit_at(key, Instant::now()) <= self.limit
    }

    /// Counts a request at `now` and returns the count for the current window.
    fn hit_at(&self, key: &str, now: Instant) -> u32 {
        let mut entries = self.entries.lock();
        let entry = entries
            .entry(key.to_string())
            .or_insert(WindowEntry { count: 0, started: now });

        if now.duration_since(entry.started) > self.window {
            entry.count = 0;
            entry.started = now;
        }
        entry.count += 1;
        let count = entry.count;

        let window = self.window;
        entries.retain(|_, e| now.duration_since(e.started) <= window);
        count
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.entries.lock().len()
    }
}

/// First `x-forwarded-for` hop, then `x-real-ip`, then `"unknown"`.
pub fn client_key(headers: &HeaderMap) -> String {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };
    header("x-forwarded-for")
        .or_else(|| header("x-real-ip"))
        .unwrap_or_else(|| "unknown".to_string())
}

pub async fn limit_requests(State(limiter): State<Arc<RateLimiter>>, req: Request, next: Next) -> Response {
    let key = client_key(req.headers());
    if limiter.allow(&key) {
        return next.run(req).await;
    }

    warn!(client = %key, "rate limit exceeded");
    let body = ErrorBody { error: TOO_MANY_REQUESTS_MESSAGE.to_string(), kind: Some("rate_limited".into()) };
    let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
    response
        .headers_mut()
        .insert(RETRY_AFTER, HeaderValue::from(limiter.window().as_secs()));
    response
}
