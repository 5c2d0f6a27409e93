//! Audit trail of reads and writes.
//!
//! Write entries are inserted in the same transaction as the write they describe. Entries never
//! carry field values: only field names, a short summary, result counts and filter names.

use crate::access::{Access, Actor, Capability};
use crate::constants::USER_AGENT_MAX_LEN;
use crate::entity::{self, Entity, EntitySchema, Filter};
use crate::validation::Validator;
use crate::{CoreError, CoreResult};
use chrono::{DateTime, SubsecRound, Utc};
use opencare_uuid::RecordId;
use rusqlite::types::Value;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

crate::models::choices! {
    pub enum AuditAction {
        Create => "create",
        Update => "update",
        Delete => "delete",
        View => "view",
    }
}

/// Sanitised description of what an audited operation touched.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditChanges {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<String>,
}

impl AuditChanges {
    pub fn summary(summary: impl Into<String>) -> Self {
        Self {
            summary: Some(summary.into()),
            ..Self::default()
        }
    }

    pub fn fields(fields: Vec<String>) -> Self {
        Self {
            fields,
            ..Self::default()
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditTrail {
    pub user: Option<RecordId>,
    pub action: AuditAction,
    pub model_name: String,
    pub object_id: String,
    #[serde(default)]
    pub changes: AuditChanges,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub user_agent: String,
}

impl Entity for AuditTrail {
    const TABLE: &'static str = "audit_trail";
    const LABEL: &'static str = "AuditTrail";

    fn schema() -> &'static EntitySchema {
        static SCHEMA: EntitySchema = EntitySchema {
            filters: &[
                Filter::exact("user", "t.user_id"),
                Filter::exact("action", "t.action"),
                Filter::exact("model_name", "t.model_name"),
                Filter::exact("object_id", "t.object_id"),
                Filter::date_from("timestamp_after", "t.timestamp"),
                Filter::date_to("timestamp_before", "t.timestamp"),
            ],
            search: &["t.model_name", "t.object_id"],
            ordering: &[("timestamp", "t.timestamp"), ("action", "t.action")],
            default_ordering: &["-timestamp"],
            nullable_refs: &[("user", "t.user_id")],
            read: Access::Requires(Capability::Administer),
            write: Access::Denied,
            audit_reads: false,
        };
        &SCHEMA
    }

    fn columns(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("user_id", entity::opt_id(self.user.as_ref())),
            ("action", entity::text(self.action.as_str())),
            ("model_name", entity::text(&self.model_name)),
            ("object_id", entity::text(&self.object_id)),
            ("timestamp", entity::timestamp(&self.timestamp)),
        ]
    }

    fn validate(&self, _v: &mut Validator<'_>, _previous: Option<&Self>) -> CoreResult<()> {
        Ok(())
    }
}

/// Append an audit entry using `conn`, normally the write transaction being audited.
pub fn record(
    conn: &Connection,
    actor: &Actor,
    action: AuditAction,
    model_name: &str,
    object_id: &str,
    changes: AuditChanges,
) -> CoreResult<RecordId> {
    let now = Utc::now().trunc_subsecs(6);
    let entry = AuditTrail {
        user: actor.user_id(),
        action,
        model_name: model_name.to_string(),
        object_id: object_id.to_string(),
        changes,
        timestamp: now,
        ip_address: actor.ip_address().map(str::to_string),
        user_agent: actor
            .user_agent()
            .map(|ua| ua.chars().take(USER_AGENT_MAX_LEN).collect())
            .unwrap_or_default(),
    };

    let id = RecordId::new();
    let body = serde_json::to_string(&entry).map_err(CoreError::Serialization)?;
    let ts = crate::store::timestamp_text(&now);
    conn.execute(
        "INSERT INTO audit_trail (id, created_at, updated_at, user_id, action, model_name, object_id, timestamp, body)
         VALUES (?1, ?2, ?2, ?3, ?4, ?5, ?6, ?2, ?7)",
        params![
            id.to_string(),
            ts,
            entry.user.map(|u| u.to_string()),
            entry.action.as_str(),
            entry.model_name,
            entry.object_id,
            body,
        ],
    )?;
    Ok(id)
}
