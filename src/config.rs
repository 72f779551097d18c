use anyhow::{Context, Result};
use base64::{engine::general_purpose, Engine as _};
use chrono_tz::Tz;
use std::{env, fmt::Display, str::FromStr};
use tracing::{info, warn};

use crate::time_utils;

pub const DEFAULT_TIMEZONE: &str = "Asia/Ho_Chi_Minh";

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    pub max_connections: u32,
    pub session_key: Vec<u8>,
    pub timezone: Tz,
    pub admin_password: String,
    /// Set when cookies must carry the `Secure` flag.
    pub production: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL missing")?;

        let session_key_b64 = env::var("SESSION_KEY").context("SESSION_KEY missing")?;
        let session_key = general_purpose::STANDARD
            .decode(session_key_b64.trim())
            .context("SESSION_KEY must be base64")?;
        if session_key.len() < 32 {
            anyhow::bail!("SESSION_KEY must decode to at least 32 bytes");
        }

        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| {
            let port: u16 = try_load("PORT", 3000);
            format!("0.0.0.0:{}", port)
        });

        let tz_raw = env::var("APP_TIMEZONE").unwrap_or_else(|_| DEFAULT_TIMEZONE.to_string());
        let timezone = time_utils::parse_timezone(&tz_raw).unwrap_or_else(|| {
            warn!("Unknown APP_TIMEZONE {tz_raw}, falling back to {DEFAULT_TIMEZONE}");
            time_utils::default_timezone()
        });

        let admin_password = env::var("ADMIN_PASSWORD").unwrap_or_else(|_| {
            warn!("ADMIN_PASSWORD not set, seeding admin with the default password");
            "admin123".to_string()
        });

        Ok(Self {
            database_url,
            bind_addr,
            max_connections: try_load("DB_MAX_CONNECTIONS", 10),
            session_key,
            timezone,
            admin_password,
            production: env::var("PRODUCTION").is_ok(),
        })
    }
}

fn try_load<T>(key: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    let Ok(raw) = env::var(key) else {
        info!("{key} not set, using default: {default}");
        return default;
    };
    raw.parse().unwrap_or_else(|e| {
        warn!("Invalid {key} value {raw}: {e}, using default: {default}");
        default
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn try_load_falls_back_on_garbage() {
        std::env::set_var("COOP_SURVEY_TEST_PORT", "not-a-port");
        let port: u16 = try_load("COOP_SURVEY_TEST_PORT", 3000);
        assert_eq!(port, 3000);

        std::env::set_var("COOP_SURVEY_TEST_PORT", "8081");
        let port: u16 = try_load("COOP_SURVEY_TEST_PORT", 3000);
        assert_eq!(port, 8081);

        let unset: u32 = try_load("COOP_SURVEY_TEST_UNSET", 10);
        assert_eq!(unset, 10);
    }
}
