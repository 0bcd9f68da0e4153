use anyhow::{Context, Result};
use chrono::Duration;
use encore_core::{DEFAULT_LIVE_INVITE_TTL_MINUTES, InvitationConfig};

#[derive(Clone, Debug)]
pub struct ServiceConfig {
    pub database_url: String,
    pub redis_url: String,
    pub http_addr: String,
    pub live_invite_ttl_minutes: i64,
}

impl ServiceConfig {
    pub fn from_env(default_http_addr: &str) -> Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is required")?;
        let redis_url = std::env::var("REDIS_URL").context("REDIS_URL is required")?;
        let http_addr =
            std::env::var("HTTP_ADDR").unwrap_or_else(|_| default_http_addr.to_string());
        let live_invite_ttl_minutes = match std::env::var("LIVE_INVITE_TTL_MINUTES") {
            Ok(raw) => parse_ttl_minutes(&raw)?,
            Err(_) => DEFAULT_LIVE_INVITE_TTL_MINUTES,
        };

        Ok(Self {
            database_url,
            redis_url,
            http_addr,
            live_invite_ttl_minutes,
        })
    }

    pub fn invitation_config(&self) -> InvitationConfig {
        InvitationConfig {
            live_invite_ttl: Some(Duration::minutes(self.live_invite_ttl_minutes)),
            ..InvitationConfig::default()
        }
    }
}

fn parse_ttl_minutes(raw: &str) -> Result<i64> {
    let minutes: i64 = raw
        .trim()
        .parse()
        .with_context(|| format!("LIVE_INVITE_TTL_MINUTES must be an integer, got {raw:?}"))?;
    if minutes <= 0 {
        anyhow::bail!("LIVE_INVITE_TTL_MINUTES must be positive");
    }
    Ok(minutes)
}
