//! # OpenCare Core
//!
//! Domain model and storage for the OpenCare health information system.
//!
//! This crate owns every record type and the rules around them:
//! - Entity definitions, validation and derived values (`models`, `validation`, `derived`)
//! - SQLite persistence with transactional writes and an audit trail (`store`, `repository`)
//! - Listing with filters, search, ordering and pagination (`query`)
//! - User accounts and password hashing (`accounts`)
//!
//! **No API concerns**: HTTP servers, tokens and request handling belong in `api-shared` and
//! `api-rest`.

pub mod access;
pub mod accounts;
pub mod audit;
pub mod config;
pub mod constants;
pub mod derived;
pub mod entity;
pub mod error;
pub mod interchange;
pub mod models;
pub mod query;
pub mod repository;
pub mod store;
pub mod validation;

#[cfg(test)]
pub(crate) mod test_support;

pub use access::{Access, Actor, Capability};
pub use accounts::AccountService;
pub use config::CoreConfig;
pub use entity::{Entity, EntitySchema, Stored, WriteEvent};
pub use error::{CoreError, CoreResult, FieldErrors};
pub use interchange::{ImportReport, InterchangeFormat, PatientInterchange};
pub use query::{ListQuery, Page};
pub use repository::Repository;
pub use store::Database;

pub use opencare_uuid::RecordId;
