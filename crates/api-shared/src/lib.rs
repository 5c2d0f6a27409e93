//! # API Shared
//!
//! Shared utilities and definitions for the OpenCare APIs.
//!
//! Contains:
//! - Request and response bodies (`dto` module)
//! - Shared services like `HealthService`
//! - Bearer-token signing and verification (`auth` module)
//!
//! Used by `api-rest` and the CLI for common functionality.

pub mod auth;
pub mod dto;
pub mod health;

pub use auth::{AuthConfig, AuthError, AuthResult, Claims, TokenKind, TokenSigner};
pub use dto::{ErrorBody, TokenPair};
pub use health::{HealthRes, HealthService};
