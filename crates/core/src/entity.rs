//! The contract every stored record type fulfils.
//!
//! An [`Entity`] is a plain serde struct. The repository stores it as a JSON body plus a few
//! real columns (references, unique keys, sort keys) that the store enforces or indexes.
//! Derivations and validation run inside the write transaction.

use crate::access::{Access, Actor};
use crate::validation::Validator;
use crate::{CoreError, CoreResult};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use opencare_uuid::RecordId;
use rusqlite::types::Value;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value as Json};

pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Backing table.
    const TABLE: &'static str;
    /// Human-readable type name used in errors and the audit trail.
    const LABEL: &'static str;

    fn schema() -> &'static EntitySchema;

    /// Real columns written alongside the body.
    fn columns(&self) -> Vec<(&'static str, Value)>;

    /// Recompute derived fields and normalise input. Runs before validation on every save.
    fn derive(&mut self, _now: DateTime<Utc>) {}

    /// Copy server-owned values from the stored version before an update.
    fn carry_over(&mut self, _previous: &Self) {}

    /// Fill actor-owned fields on create (for example who generated a report).
    fn assign_actor(&mut self, _actor: &Actor) {}

    /// Check references and business rules, recording failures on `v`.
    ///
    /// Returns `Err` only for storage failures; rule violations go into the validator.
    fn validate(&self, v: &mut Validator<'_>, previous: Option<&Self>) -> CoreResult<()>;

    /// Optional SQL predicate (over alias `t`) restricting which rows `actor` may read.
    fn scope(_actor: &Actor) -> Option<&'static str> {
        None
    }

    /// Add read-time derived values to the serialised record.
    fn extend_view(&self, _view: &mut Map<String, Json>, _today: NaiveDate) {}

    /// Runs inside the write transaction after validation, before the row is written.
    /// For deletes it sees the last stored version, after the row is gone.
    fn on_write(&mut self, _id: &RecordId, _event: WriteEvent) {}
}

/// Which kind of write a record just went through.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteEvent {
    Created,
    Updated,
    Deleted,
}


/// Declarative listing and access rules for one entity type.
///
/// SQL fragments are written against the table alias `t` and are never built from input.
#[derive(Debug)]
pub struct EntitySchema {
    pub filters: &'static [Filter],
    /// Expressions matched case-insensitively by `search=`.
    pub search: &'static [&'static str],
    /// Accepted `ordering=` names and the expression each sorts by.
    pub ordering: &'static [(&'static str, &'static str)],
    /// Applied when the request names no valid ordering. `-` means descending.
    pub default_ordering: &'static [&'static str],
    /// Body fields whose reference column is nulled by the store when the target is deleted.
    pub nullable_refs: &'static [(&'static str, &'static str)],
    pub read: Access,
    pub write: Access,
    /// Record views and listings in the audit trail, not just writes.
    pub audit_reads: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct Filter {
    pub param: &'static str,
    pub expr: &'static str,
    pub kind: FilterKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    Exact,
    Integer,
    Boolean,
    Contains,
    /// Calendar date on or after the value.
    DateFrom,
    /// Calendar date on or before the value.
    DateTo,
    OnDate,
    /// Instant at or after the value.
    TimeFrom,
}

impl Filter {
    pub const fn exact(param: &'static str, expr: &'static str) -> Self {
        Self {
            param,
            expr,
            kind: FilterKind::Exact,
        }
    }

    pub const fn integer(param: &'static str, expr: &'static str) -> Self {
        Self {
            param,
            expr,
            kind: FilterKind::Integer,
        }
    }

    pub const fn boolean(param: &'static str, expr: &'static str) -> Self {
        Self {
            param,
            expr,
            kind: FilterKind::Boolean,
        }
    }

    pub const fn contains(param: &'static str, expr: &'static str) -> Self {
        Self {
            param,
            expr,
            kind: FilterKind::Contains,
        }
    }

    pub const fn date_from(param: &'static str, expr: &'static str) -> Self {
        Self {
            param,
            expr,
            kind: FilterKind::DateFrom,
        }
    }

    pub const fn date_to(param: &'static str, expr: &'static str) -> Self {
        Self {
            param,
            expr,
            kind: FilterKind::DateTo,
        }
    }

    pub const fn on_date(param: &'static str, expr: &'static str) -> Self {
        Self {
            param,
            expr,
            kind: FilterKind::OnDate,
        }
    }

    pub const fn time_from(param: &'static str, expr: &'static str) -> Self {
        Self {
            param,
            expr,
            kind: FilterKind::TimeFrom,
        }
    }
}

/// A persisted record with its server-assigned metadata.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Stored<E> {
    pub id: RecordId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub record: E,
}

impl<E: Entity> Stored<E> {
    /// The record as clients see it, including read-time derived values.
    pub fn view(&self, today: NaiveDate) -> CoreResult<Json> {
        let mut value = serde_json::to_value(self).map_err(CoreError::Serialization)?;
        if let Json::Object(map) = &mut value {
            self.record.extend_view(map, today);
        }
        Ok(value)
    }
}

// Column value helpers shared by the model modules.

pub(crate) fn text(value: impl AsRef<str>) -> Value {
    Value::Text(value.as_ref().to_owned())
}

pub(crate) fn id(value: &RecordId) -> Value {
    Value::Text(value.to_string())
}

pub(crate) fn opt_id(value: Option<&RecordId>) -> Value {
    value.map_or(Value::Null, id)
}

pub(crate) fn flag(value: bool) -> Value {
    Value::Integer(i64::from(value))
}

pub(crate) fn int(value: impl Into<i64>) -> Value {
    Value::Integer(value.into())
}

pub(crate) fn date(value: &NaiveDate) -> Value {
    Value::Text(value.format("%Y-%m-%d").to_string())
}

pub(crate) fn time(value: &NaiveTime) -> Value {
    Value::Text(value.format("%H:%M:%S").to_string())
}

pub(crate) fn timestamp(value: &DateTime<Utc>) -> Value {
    Value::Text(crate::store::timestamp_text(value))
}

pub(crate) fn opt_timestamp(value: Option<&DateTime<Utc>>) -> Value {
    value.map_or(Value::Null, timestamp)
}
