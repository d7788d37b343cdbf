use crate::app_env;
use crate::domain::session;
use anyhow::{Context, anyhow, bail};
use std::env;
use std::fmt;
use std::net::SocketAddr;

const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:3000";
const MIN_SESSION_SECRET_LEN: usize = 32;

/// Settings for the session cookie handed out to browsers
#[derive(Clone)]
pub struct SessionConfig {
    pub secret: Vec<u8>,
    pub cookie_secure: bool,
    pub ttl: chrono::Duration,
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("secret", &"<redacted>")
            .field("cookie_secure", &self.cookie_secure)
            .field("ttl", &self.ttl)
            .finish()
    }
}

/// Application configuration assembled from the environment at startup
#[derive(Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub listen_addr: SocketAddr,
    pub session: SessionConfig,
}

impl AppConfig {
    /// Reads the configuration from process environment variables (see [app_env])
    pub fn from_env() -> Result<Self, anyhow::Error> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration using [lookup] to resolve environment variable names to values
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, anyhow::Error> {
        let database_url = lookup(app_env::DB_URL)
            .ok_or_else(|| anyhow!("{} must be set", app_env::DB_URL))?;

        let listen_addr = lookup(app_env::LISTEN_ADDR)
            .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_owned())
            .parse::<SocketAddr>()
            .with_context(|| format!("{} is not a valid socket address", app_env::LISTEN_ADDR))?;

        let secret = lookup(app_env::SESSION_SECRET)
            .ok_or_else(|| anyhow!("{} must be set", app_env::SESSION_SECRET))?;
        if secret.len() < MIN_SESSION_SECRET_LEN {
            bail!(
                "{} must be at least {MIN_SESSION_SECRET_LEN} bytes long",
                app_env::SESSION_SECRET
            );
        }

        let cookie_secure = match lookup(app_env::SESSION_COOKIE_SECURE).as_deref() {
            None | Some("") | Some("false") => false,
            Some("true") => true,
            Some(other) => bail!(
                "{} must be \"true\" or \"false\", got {other:?}",
                app_env::SESSION_COOKIE_SECURE
            ),
        };

        Ok(AppConfig {
            database_url,
            listen_addr,
            session: SessionConfig {
                secret: secret.into_bytes(),
                cookie_secure,
                ttl: session::session_ttl(),
            },
        })
    }
}
