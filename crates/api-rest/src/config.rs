//! Server settings read from the environment at startup.

use api_shared::AuthConfig;
use opencare_core::CoreConfig;

pub const DEFAULT_REST_ADDR: &str = "0.0.0.0:3000";

#[derive(Clone, Debug)]
pub struct ServerSettings {
    pub addr: String,
    pub core: CoreConfig,
    pub auth: AuthConfig,
}

impl ServerSettings {
    /// Resolve settings from `OPENCARE_*` variables. Call after `dotenvy::dotenv()`.
    ///
    /// # Errors
    ///
    /// Fails if a numeric value does not parse or `OPENCARE_TOKEN_SECRET` is missing or
    /// shorter than 32 bytes.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let core = CoreConfig::from_env_values(
            lookup("OPENCARE_DATABASE_PATH"),
            lookup("OPENCARE_BUSY_TIMEOUT_MS"),
            lookup("OPENCARE_PAGE_SIZE"),
            lookup("OPENCARE_MAX_PAGE_SIZE"),
        )?;
        let auth = AuthConfig::from_env_values(
            lookup("OPENCARE_TOKEN_SECRET"),
            lookup("OPENCARE_ACCESS_TTL_SECS"),
            lookup("OPENCARE_REFRESH_TTL_SECS"),
        )?;
        let addr = lookup("OPENCARE_REST_ADDR")
            .filter(|a| !a.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_REST_ADDR.into());
        Ok(Self { addr, core, auth })
    }
}
