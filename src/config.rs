//! Service configuration loaded from the environment (and `.env`, if present).

use std::{net::SocketAddr, str::FromStr, time::Duration};

use anyhow::Context;

#[derive(Debug, Clone)]
pub struct Config {
    /// Env: `DATABASE_URL`
    pub database_url: String,
    /// Env: `LISTEN_ADDR`
    pub listen_addr: SocketAddr,

    /// Env: `ACCESS_TOKEN_SECRET` (required)
    pub access_token_secret: String,
    /// Env: `REFRESH_TOKEN_SECRET` (required)
    pub refresh_token_secret: String,
    /// Env: `ACCESS_TOKEN_TTL_SECS`
    pub access_token_ttl: Duration,
    /// Env: `REFRESH_TOKEN_TTL_SECS`
    pub refresh_token_ttl: Duration,

    /// Delay before a scheduled chat deletion fires.
    /// Env: `CHAT_DELETION_DELAY_SECS`
    pub chat_deletion_delay: Duration,
    /// Env: `DELETION_POLL_SECS`
    pub deletion_poll_interval: Duration,
    /// Env: `REVOKED_SWEEP_SECS`
    pub revoked_sweep_interval: Duration,

    /// Env: `OTP_TTL_SECS`
    pub otp_ttl: Duration,
    /// Env: `BCRYPT_COST`
    pub bcrypt_cost: u32,
    /// Env: `MAIL_MAX_ATTEMPTS`
    pub mail_max_attempts: u32,

    /// Addresses that sign up as admins, lowercased.
    /// Env: `ADMIN_EMAILS` (comma separated)
    pub admin_emails: Vec<String>,
}

impl Config {
    /// Defaults for everything except the signing secrets.
    pub fn with_secrets(access_token_secret: impl Into<String>, refresh_token_secret: impl Into<String>) -> Self {
        Self {
            database_url: "sqlite://hirechat.db?mode=rwc".to_owned(),
            listen_addr: ([0, 0, 0, 0], 8080).into(),
            access_token_secret: access_token_secret.into(),
            refresh_token_secret: refresh_token_secret.into(),
            access_token_ttl: Duration::from_secs(60 * 60),
            refresh_token_ttl: Duration::from_secs(7 * 24 * 60 * 60),
            chat_deletion_delay: Duration::from_secs(24 * 60 * 60),
            deletion_poll_interval: Duration::from_secs(30),
            revoked_sweep_interval: Duration::from_secs(60 * 60),
            otp_ttl: Duration::from_secs(10 * 60),
            bcrypt_cost: bcrypt::DEFAULT_COST,
            mail_max_attempts: 3,
            admin_emails: Vec::new(),
        }
    }

    pub fn is_admin_email(&self, email: &str) -> bool {
        self.admin_emails.iter().any(|admin| admin.eq_ignore_ascii_case(email))
    }

    pub fn from_env() -> anyhow::Result<Self> {
        let access = dotenv::var("ACCESS_TOKEN_SECRET").context("ACCESS_TOKEN_SECRET must be set")?;
        let refresh = dotenv::var("REFRESH_TOKEN_SECRET").context("REFRESH_TOKEN_SECRET must be set")?;
        if access == refresh {
            anyhow::bail!("ACCESS_TOKEN_SECRET and REFRESH_TOKEN_SECRET must differ");
        }

        let mut config = Self::with_secrets(access, refresh);

        if let Ok(url) = dotenv::var("DATABASE_URL") {
            config.database_url = url;
        }
        config.listen_addr = parse_or("LISTEN_ADDR", config.listen_addr);
        config.access_token_ttl = secs_or("ACCESS_TOKEN_TTL_SECS", config.access_token_ttl);
        config.refresh_token_ttl = secs_or("REFRESH_TOKEN_TTL_SECS", config.refresh_token_ttl);
        config.chat_deletion_delay = secs_or("CHAT_DELETION_DELAY_SECS", config.chat_deletion_delay);
        config.deletion_poll_interval = secs_or("DELETION_POLL_SECS", config.deletion_poll_interval);
        config.revoked_sweep_interval = secs_or("REVOKED_SWEEP_SECS", config.revoked_sweep_interval);
        config.otp_ttl = secs_or("OTP_TTL_SECS", config.otp_ttl);
        config.bcrypt_cost = parse_or("BCRYPT_COST", config.bcrypt_cost);
        config.mail_max_attempts = parse_or("MAIL_MAX_ATTEMPTS", config.mail_max_attempts);
        if let Ok(raw) = dotenv::var("ADMIN_EMAILS") {
            config.admin_emails = parse_email_list(&raw);
        }

        Ok(config)
    }
}

fn parse_or<T: FromStr>(key: &str, default: T) -> T {
    let Ok(raw) = dotenv::var(key) else {
        return default;
    };

    match raw.parse() {
        Ok(value) => value,
        Err(_) => {
            tracing::warn!(key, value = %raw, "invalid value, using default");
            default
        }
    }
}

fn parse_email_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|email| email.trim().to_lowercase())
        .filter(|email| !email.is_empty())
        .collect()
}

fn secs_or(key: &str, default: Duration) -> Duration {
    Duration::from_secs(parse_or(key, default.as_secs()))
}
