//! Constants used throughout the OpenCare core crate.

/// Default SQLite database file when no explicit path is configured.
pub const DEFAULT_DATABASE_PATH: &str = "opencare.db";

/// Default time a connection waits for a lock before failing with `Busy`.
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Default number of results per page.
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Largest page size a client may request.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Shortest appointment accepted, in minutes.
pub const MIN_APPOINTMENT_MINUTES: i64 = 5;

/// Stored user agents are cut to this many characters.
pub const USER_AGENT_MAX_LEN: usize = 512;

/// Iterations applied when stretching a password.
pub const PASSWORD_HASH_ITERATIONS: u32 = 120_000;

/// Prefix identifying the stored password hash scheme.
pub const PASSWORD_HASH_SCHEME: &str = "pbkdf2_sha256";
