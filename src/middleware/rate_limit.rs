//! In-memory sliding-window limiter guarding the login endpoint.
use crate::state::SharedState;
use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Attempts per client within one window. Oldest attempt at the front.
type Attempts = VecDeque<Instant>;

#[derive(Clone)]
pub struct RateLimiter {
    clients: Arc<Mutex<HashMap<String, Attempts>>>,
    budget: usize,
    window: Duration,
}

impl RateLimiter {
    pub fn new(budget: usize, window_secs: u64) -> Self {
        Self {
            clients: Arc::new(Mutex::new(HashMap::new())),
            budget,
            window: Duration::from_secs(window_secs),
        }
    }

    fn expire(&self, attempts: &mut Attempts, now: Instant) {
        while attempts
            .front()
            .is_some_and(|&at| now.duration_since(at) >= self.window)
        {
            attempts.pop_front();
        }
    }

    /// Counts an attempt from `client`; false once the budget is spent.
    /// Rejected attempts are not counted.
    pub async fn check(&self, client: &str) -> bool {
        let now = Instant::now();
        let mut clients = self.clients.lock().await;
        let attempts = clients.entry(client.to_owned()).or_default();
        self.expire(attempts, now);

        let allowed = attempts.len() < self.budget;
        if allowed {
            attempts.push_back(now);
        }
        allowed
    }

    /// Forgets clients whose attempts have all expired. Returns how many are still tracked.
    pub async fn cleanup(&self) -> usize {
        let now = Instant::now();
        let mut clients = self.clients.lock().await;
        clients.retain(|_, attempts| {
            self.expire(attempts, now);
            !attempts.is_empty()
        });
        clients.len()
    }
}

/// Peer address when the server runs with connect info, else the first
/// `X-Forwarded-For` hop.
fn client_key(request: &Request<Body>) -> String {
    if let Some(ConnectInfo(addr)) = request.extensions().get::<ConnectInfo<SocketAddr>>() {
        return addr.ip().to_string();
    }
    request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

pub async fn login_rate_limit(
    State(state): State<SharedState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let key = client_key(&request);

    if !state.login_limiter.check(&key).await {
        tracing::warn!("Login rate limit exceeded for {}", key);
        return (
            StatusCode::TOO_MANY_REQUESTS,
            "Too many login attempts. Please try again later.",
        )
            .into_response();
    }

    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn budget_is_per_client() {
        let limiter = RateLimiter::new(3, 60);

        for _ in 0..3 {
            assert!(limiter.check("10.0.0.1").await);
        }
        assert!(!limiter.check("10.0.0.1").await);
        assert!(!limiter.check("10.0.0.1").await);

        assert!(limiter.check("10.0.0.2").await);
        assert_eq!(limiter.cleanup().await, 2);
    }

    #[tokio::test]
    async fn budget_refills_after_window() {
        let limiter = RateLimiter::new(1, 1);

        assert!(limiter.check("ip1").await);
        assert!(!limiter.check("ip1").await);
        limiter.check("ip2").await;

        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(limiter.cleanup().await, 0);
        assert!(limiter.check("ip1").await);
    }

    #[test]
    fn client_key_prefers_forwarded_header_without_connect_info() {
        let req = Request::builder()
            .header("x-forwarded-for", "203.0.113.9, 10.0.0.1")
            .body(Body::empty())
            .unwrap();
        assert_eq!(client_key(&req), "203.0.113.9");

        let bare = Request::builder().body(Body::empty()).unwrap();
        assert_eq!(client_key(&bare), "unknown");
    }
}
