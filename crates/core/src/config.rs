//! Core runtime configuration.
//!
//! Configuration is resolved once at process startup and then passed into core services.
//! Nothing in this crate reads process-wide environment variables during request handling.

use crate::constants::{
    DEFAULT_BUSY_TIMEOUT_MS, DEFAULT_DATABASE_PATH, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE,
    PASSWORD_HASH_ITERATIONS,
};
use crate::{CoreError, CoreResult};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    database_path: PathBuf,
    busy_timeout: Duration,
    default_page_size: u32,
    max_page_size: u32,
    password_iterations: u32,
}

impl CoreConfig {
    /// Create a new `CoreConfig`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Config`] if the page sizes are zero or the default page size
    /// exceeds the maximum.
    pub fn new(
        database_path: PathBuf,
        busy_timeout: Duration,
        default_page_size: u32,
        max_page_size: u32,
    ) -> CoreResult<Self> {
        if database_path.as_os_str().is_empty() {
            return Err(CoreError::Config("database path cannot be empty".into()));
        }
        if default_page_size == 0 || max_page_size == 0 {
            return Err(CoreError::Config("page sizes must be positive".into()));
        }
        if default_page_size > max_page_size {
            return Err(CoreError::Config(format!(
                "default page size {} exceeds maximum {}",
                default_page_size, max_page_size
            )));
        }

        Ok(Self {
            database_path,
            busy_timeout,
            default_page_size,
            max_page_size,
            password_iterations: PASSWORD_HASH_ITERATIONS,
        })
    }

    /// Override the password stretching work factor. Hashes record their own iteration
    /// count, so existing passwords keep verifying.
    pub fn with_password_iterations(mut self, iterations: u32) -> Self {
        self.password_iterations = iterations.max(1);
        self
    }

    /// Configuration with all defaults for the given database file.
    pub fn for_database(database_path: impl Into<PathBuf>) -> CoreResult<Self> {
        Self::new(
            database_path.into(),
            Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS),
            DEFAULT_PAGE_SIZE,
            MAX_PAGE_SIZE,
        )
    }

    /// Build a configuration from raw environment values.
    ///
    /// Each argument is the unparsed value of the matching `OPENCARE_*` variable, if set.
    /// Blank values fall back to the defaults.
    pub fn from_env_values(
        database_path: Option<String>,
        busy_timeout_ms: Option<String>,
        page_size: Option<String>,
        max_page_size: Option<String>,
    ) -> CoreResult<Self> {
        let database_path = non_blank(database_path)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE_PATH));
        let busy_timeout_ms = parse_env_number(
            "OPENCARE_BUSY_TIMEOUT_MS",
            busy_timeout_ms,
            DEFAULT_BUSY_TIMEOUT_MS,
        )?;
        let page_size = parse_env_number("OPENCARE_PAGE_SIZE", page_size, DEFAULT_PAGE_SIZE)?;
        let max_page_size =
            parse_env_number("OPENCARE_MAX_PAGE_SIZE", max_page_size, MAX_PAGE_SIZE)?;

        Self::new(
            database_path,
            Duration::from_millis(busy_timeout_ms),
            page_size,
            max_page_size,
        )
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    pub fn busy_timeout(&self) -> Duration {
        self.busy_timeout
    }

    pub fn default_page_size(&self) -> u32 {
        self.default_page_size
    }

    pub fn max_page_size(&self) -> u32 {
        self.max_page_size
    }

    pub fn password_iterations(&self) -> u32 {
        self.password_iterations
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse a numeric environment value, using `default` when it is unset or blank.
///
/// # Errors
///
/// Returns [`CoreError::Config`] naming `name` when the value is not a valid number.
pub fn parse_env_number<T>(name: &str, value: Option<String>, default: T) -> CoreResult<T>
where
    T: std::str::FromStr,
{
    match non_blank(value) {
        None => Ok(default),
        Some(raw) => raw
            .parse::<T>()
            .map_err(|_| CoreError::Config(format!("{} must be a number, got '{}'", name, raw))),
    }
}
