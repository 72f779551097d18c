use crate::config::Config;
use crate::middleware::RateLimiter;
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub session_key: Vec<u8>,
    pub login_limiter: RateLimiter,
}

impl AppState {
    pub fn new(pool: PgPool, config: Config) -> Self {
        Self {
            pool,
            session_key: config.session_key.clone(),
            config,
            // 5 attempts per 60 seconds per IP
            login_limiter: RateLimiter::new(5, 60),
        }
    }
}

pub type SharedState = Arc<AppState>;
