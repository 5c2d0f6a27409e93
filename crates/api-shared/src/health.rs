use chrono::{DateTime, Utc};
use opencare_core::Database;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub const SERVICE_NAME: &str = "opencare";

/// Health status payload, served without authentication.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct HealthRes {
    /// `healthy`, or `unavailable` when the store cannot be reached
    pub status: String,
    pub service: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
}

impl HealthRes {
    pub fn is_ok(&self) -> bool {
        self.status == "healthy"
    }
}

/// Simple health service shared by the REST server and the CLI
///
/// This service provides a standardised way to check the health status of OpenCare.
/// It can be used both as a static utility and as an instantiated service.
#[derive(Clone)]
pub struct HealthService;

impl HealthService {
    /// Creates a new instance of HealthService.
    pub fn new() -> Self {
        Self
    }

    /// Static method to check liveness without touching the store
    ///
    /// # Returns
    /// A `HealthRes` indicating the service is alive.
    pub fn check_health() -> HealthRes {
        Self::status("healthy")
    }

    /// Check liveness and that the database answers a trivial query
    ///
    /// This blocks on SQLite; async callers should run it on the blocking pool.
    ///
    /// # Returns
    /// A `HealthRes` with status `healthy`, or `unavailable` if the ping failed.
    pub fn check_store(&self, db: &Database) -> HealthRes {
        match db.ping() {
            Ok(()) => Self::check_health(),
            Err(e) => {
                tracing::error!("health check could not reach the database: {:?}", e);
                Self::status("unavailable")
            }
        }
    }

    fn status(status: &str) -> HealthRes {
        HealthRes {
            status: status.into(),
            service: SERVICE_NAME.into(),
            version: env!("CARGO_PKG_VERSION").into(),
            timestamp: Utc::now(),
        }
    }
}

impl Default for HealthService {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencare_core::CoreConfig;
    use tempfile::TempDir;

    #[test]
    fn test_check_health_reports_service() {
        let res = HealthService::check_health();
        assert!(res.is_ok());
        assert_eq!(res.service, "opencare");
        assert_eq!(res.version, env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn test_check_store_pings_database() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let cfg = CoreConfig::for_database(temp_dir.path().join("health.db"))
            .expect("config should build");
        let db = Database::open(&cfg).expect("database should open");
        assert!(HealthService::new().check_store(&db).is_ok());
    }
}
