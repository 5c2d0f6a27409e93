//! Generic persistence for [`Entity`] types.
//!
//! A [`Repository`] owns the full write path for one entity family: permission check,
//! decoding, derivation, validation, the row write and its audit entry all happen inside one
//! immediate transaction. Reads apply the entity's row scope and, for sensitive families,
//! leave a `view` entry in the audit trail.

use crate::access::Actor;
use crate::audit::{self, AuditAction, AuditChanges};
use crate::config::CoreConfig;
use crate::entity::{Entity, Stored, WriteEvent};
use crate::query::{self, ListQuery, Page};
use crate::store::{self, Database};
use crate::validation::{self, Validator};
use crate::{CoreError, CoreResult};
use chrono::{DateTime, NaiveDate, SubsecRound, Utc};
use opencare_uuid::RecordId;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection};
use serde_json::{Map, Value as Json};
use std::marker::PhantomData;

/// Server-owned keys that clients may send back but never change.
const META_FIELDS: [&str; 3] = ["id", "created_at", "updated_at"];

pub struct Repository<E> {
    db: Database,
    cfg: CoreConfig,
    _entity: PhantomData<fn() -> E>,
}

impl<E> Clone for Repository<E> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            cfg: self.cfg.clone(),
            _entity: PhantomData,
        }
    }
}

impl<E: Entity> Repository<E> {
    pub fn new(db: Database, cfg: CoreConfig) -> Self {
        Self {
            db,
            cfg,
            _entity: PhantomData,
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// One page of records visible to `actor`.
    ///
    /// # Errors
    ///
    /// `Permission` if the actor may not read this family, `Validation` for malformed
    /// filters and `InvalidPage` for a page past the end.
    pub fn list(&self, actor: &Actor, query: &ListQuery) -> CoreResult<Page<Stored<E>>> {
        let schema = E::schema();
        schema.read.check(actor, "read", E::LABEL)?;
        let window = query::page_window(
            query,
            self.cfg.default_page_size(),
            self.cfg.max_page_size(),
        )?;
        let plan = query::plan(schema, query, E::scope(actor))?;

        let page = self.db.read(|conn| {
            let count: i64 = conn.query_row(
                &format!(
                    "SELECT COUNT(*) FROM {} t WHERE {}",
                    E::TABLE,
                    plan.where_sql
                ),
                params_from_iter(plan.params.iter()),
                |row| row.get(0),
            )?;
            let count = count.max(0) as u64;
            window.ensure_exists(count)?;

            let mut params = plan.params.clone();
            params.push(Value::Integer(i64::from(window.page_size)));
            params.push(Value::Integer(window.offset() as i64));
            let sql = format!(
                "{} WHERE {} ORDER BY {} LIMIT ? OFFSET ?",
                select_sql::<E>(),
                plan.where_sql,
                plan.order_sql
            );
            let rows = fetch::<E>(conn, &sql, &params)?;
            Ok(window.into_page(count, rows))
        })?;

        if schema.audit_reads {
            self.audit_read(
                actor,
                "list",
                AuditChanges {
                    summary: Some(format!("Listed {}", E::LABEL)),
                    count: Some(page.results.len() as u64),
                    filters: query.applied_filters(schema),
                    ..AuditChanges::default()
                },
            );
        }
        Ok(page)
    }

    /// Every record visible to `actor`, in default order.
    pub fn all(&self, actor: &Actor) -> CoreResult<Vec<Stored<E>>> {
        let schema = E::schema();
        schema.read.check(actor, "read", E::LABEL)?;
        let plan = query::plan(schema, &ListQuery::new(), E::scope(actor))?;
        let rows = self.db.read(|conn| {
            let sql = format!(
                "{} WHERE {} ORDER BY {}",
                select_sql::<E>(),
                plan.where_sql,
                plan.order_sql
            );
            fetch::<E>(conn, &sql, &plan.params)
        })?;

        if schema.audit_reads {
            self.audit_read(
                actor,
                "all",
                AuditChanges {
                    summary: Some(format!("Exported {}", E::LABEL)),
                    count: Some(rows.len() as u64),
                    ..AuditChanges::default()
                },
            );
        }
        Ok(rows)
    }

    /// Fetch one record visible to `actor`.
    pub fn get(&self, actor: &Actor, id: &RecordId) -> CoreResult<Stored<E>> {
        let schema = E::schema();
        schema.read.check(actor, "read", E::LABEL)?;
        let scope = E::scope(actor);
        let stored = self
            .db
            .read(|conn| {
                let sql = match scope {
                    Some(scope) => format!("{} WHERE t.id = ? AND ({})", select_sql::<E>(), scope),
                    None => format!("{} WHERE t.id = ?", select_sql::<E>()),
                };
                Ok(fetch::<E>(conn, &sql, &[Value::Text(id.to_string())])?
                    .into_iter()
                    .next())
            })?
            .ok_or_else(|| CoreError::not_found(E::LABEL, id))?;

        if schema.audit_reads {
            self.audit_read(
                actor,
                &id.to_string(),
                AuditChanges::summary(format!("Viewed {}", E::LABEL)),
            );
        }
        Ok(stored)
    }

    /// The client view of one record, with read-time derived values.
    pub fn view(&self, actor: &Actor, id: &RecordId) -> CoreResult<Json> {
        self.get(actor, id)?.view(today())
    }

    /// Create a record from a typed value.
    pub fn create(&self, actor: &Actor, record: E) -> CoreResult<Stored<E>> {
        E::schema().write.check(actor, "create", E::LABEL)?;
        self.db.write(|tx| self.insert_in(tx, actor, record))
    }

    /// Create a record from client JSON.
    pub fn create_from_json(&self, actor: &Actor, input: Json) -> CoreResult<Stored<E>> {
        E::schema().write.check(actor, "create", E::LABEL)?;
        let record: E = validation::decode(strip_meta(input))?;
        self.db.write(|tx| self.insert_in(tx, actor, record))
    }

    /// Replace every client-owned field of a record.
    pub fn replace(&self, actor: &Actor, id: &RecordId, input: Json) -> CoreResult<Stored<E>> {
        E::schema().write.check(actor, "update", E::LABEL)?;
        let record: E = validation::decode(strip_meta(input))?;
        self.db.write(|tx| self.update_in(tx, actor, id, record))
    }

    /// Apply a partial update: top-level keys in `input` overwrite the stored values.
    pub fn patch(&self, actor: &Actor, id: &RecordId, input: Json) -> CoreResult<Stored<E>> {
        E::schema().write.check(actor, "update", E::LABEL)?;
        let Json::Object(changes) = strip_meta(input) else {
            return Err(CoreError::field(
                crate::error::NON_FIELD_ERRORS,
                "Expected a JSON object.",
            ));
        };

        self.db.write(|tx| {
            let previous = self
                .load_in(tx, id)?
                .ok_or_else(|| CoreError::not_found(E::LABEL, id))?;
            let mut merged =
                serde_json::to_value(&previous.record).map_err(CoreError::Serialization)?;
            if let Json::Object(map) = &mut merged {
                map.extend(changes);
            }
            let record: E = validation::decode(merged)?;
            self.update_with(tx, actor, previous, record)
        })
    }

    pub fn delete(&self, actor: &Actor, id: &RecordId) -> CoreResult<()> {
        E::schema().write.check(actor, "delete", E::LABEL)?;
        self.db.write(|tx| self.delete_in(tx, actor, id))
    }

    /// Insert `record` inside an open write transaction.
    pub fn insert_in(
        &self,
        conn: &Connection,
        actor: &Actor,
        mut record: E,
    ) -> CoreResult<Stored<E>> {
        let now = Utc::now().trunc_subsecs(6);
        let id = RecordId::new();
        record.assign_actor(actor);
        record.derive(now);

        let mut v = Validator::new(conn, id, now.date_naive());
        record.validate(&mut v, None)?;
        v.finish()?;
        record.on_write(&id, WriteEvent::Created);

        let columns = record.columns();
        let body = serde_json::to_string(&record).map_err(CoreError::Serialization)?;
        let ts = store::timestamp_text(&now);

        let mut names = vec!["id", "created_at", "updated_at"];
        let mut values = vec![
            Value::Text(id.to_string()),
            Value::Text(ts.clone()),
            Value::Text(ts),
        ];
        for (name, value) in columns {
            names.push(name);
            values.push(value);
        }
        names.push("body");
        values.push(Value::Text(body));

        let placeholders = vec!["?"; names.len()].join(", ");
        conn.execute(
            &format!(
                "INSERT INTO {} ({}) VALUES ({})",
                E::TABLE,
                names.join(", "),
                placeholders
            ),
            params_from_iter(values.iter()),
        )?;

        audit::record(
            conn,
            actor,
            AuditAction::Create,
            E::LABEL,
            &id.to_string(),
            AuditChanges::summary(format!("Created {}", E::LABEL)),
        )?;
        tracing::debug!("created {} {}", E::LABEL, id);

        Ok(Stored {
            id,
            created_at: now,
            updated_at: now,
            record,
        })
    }

    /// Replace the stored record `id` inside an open write transaction.
    pub fn update_in(
        &self,
        conn: &Connection,
        actor: &Actor,
        id: &RecordId,
        record: E,
    ) -> CoreResult<Stored<E>> {
        let previous = self
            .load_in(conn, id)?
            .ok_or_else(|| CoreError::not_found(E::LABEL, id))?;
        self.update_with(conn, actor, previous, record)
    }

    fn update_with(
        &self,
        conn: &Connection,
        actor: &Actor,
        previous: Stored<E>,
        mut record: E,
    ) -> CoreResult<Stored<E>> {
        let now = Utc::now().trunc_subsecs(6);
        let id = previous.id;
        record.carry_over(&previous.record);
        record.derive(now);

        let mut v = Validator::new(conn, id, now.date_naive());
        record.validate(&mut v, Some(&previous.record))?;
        v.finish()?;
        record.on_write(&id, WriteEvent::Updated);

        let before = serde_json::to_value(&previous.record).map_err(CoreError::Serialization)?;
        let after = serde_json::to_value(&record).map_err(CoreError::Serialization)?;
        let fields = changed_fields(&before, &after);

        // UPDATE rather than REPLACE: REPLACE deletes the row first and would fire cascades.
        let mut assignments = vec!["updated_at = ?".to_string()];
        let mut values = vec![Value::Text(store::timestamp_text(&now))];
        for (name, value) in record.columns() {
            assignments.push(format!("{} = ?", name));
            values.push(value);
        }
        assignments.push("body = ?".to_string());
        values.push(Value::Text(after.to_string()));
        values.push(Value::Text(id.to_string()));

        conn.execute(
            &format!(
                "UPDATE {} SET {} WHERE id = ?",
                E::TABLE,
                assignments.join(", ")
            ),
            params_from_iter(values.iter()),
        )?;

        audit::record(
            conn,
            actor,
            AuditAction::Update,
            E::LABEL,
            &id.to_string(),
            AuditChanges {
                summary: Some(format!("Updated {}", E::LABEL)),
                fields,
                ..AuditChanges::default()
            },
        )?;
        tracing::debug!("updated {} {}", E::LABEL, id);

        Ok(Stored {
            id,
            created_at: previous.created_at,
            updated_at: now,
            record,
        })
    }

    /// Delete `id` inside an open write transaction. Owned rows cascade with it.
    pub fn delete_in(&self, conn: &Connection, actor: &Actor, id: &RecordId) -> CoreResult<()> {
        let mut previous = self
            .load_in(conn, id)?
            .ok_or_else(|| CoreError::not_found(E::LABEL, id))?;
        let deleted = conn
            .execute(
                &format!("DELETE FROM {} WHERE id = ?1", E::TABLE),
                params![id.to_string()],
            )
            .map_err(|err| {
                if store::is_foreign_key_violation(&err) {
                    CoreError::Conflict(format!(
                        "{} {} is still referenced by other records.",
                        E::LABEL,
                        id
                    ))
                } else {
                    CoreError::from(err)
                }
            })?;
        if deleted == 0 {
            return Err(CoreError::not_found(E::LABEL, id));
        }
        previous.record.on_write(id, WriteEvent::Deleted);

        audit::record(
            conn,
            actor,
            AuditAction::Delete,
            E::LABEL,
            &id.to_string(),
            AuditChanges::summary(format!("Deleted {}", E::LABEL)),
        )?;
        tracing::debug!("deleted {} {}", E::LABEL, id);
        Ok(())
    }

    /// Load `id` without permission checks or auditing.
    pub fn load_in(&self, conn: &Connection, id: &RecordId) -> CoreResult<Option<Stored<E>>> {
        let sql = format!("{} WHERE t.id = ?", select_sql::<E>());
        Ok(fetch::<E>(conn, &sql, &[Value::Text(id.to_string())])?
            .into_iter()
            .next())
    }

    fn audit_read(&self, actor: &Actor, object_id: &str, changes: AuditChanges) {
        let result = self.db.write(|tx| {
            audit::record(tx, actor, AuditAction::View, E::LABEL, object_id, changes)
        });
        if let Err(e) = result {
            tracing::warn!("failed to audit read of {} {}: {:?}", E::LABEL, object_id, e);
        }
    }
}

/// Today's date as used for read-time derived values.
pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// Select list for `E`, with nullable references re-synchronised from their columns.
///
/// `ON DELETE SET NULL` clears the column but not the body, so the column wins.
fn select_sql<E: Entity>() -> String {
    let refs = E::schema().nullable_refs;
    let body = if refs.is_empty() {
        "t.body".to_string()
    } else {
        let pairs = refs
            .iter()
            .map(|(field, column)| format!("'$.{}', {}", field, column))
            .collect::<Vec<_>>()
            .join(", ");
        format!("json_set(t.body, {})", pairs)
    };
    format!(
        "SELECT t.id, t.created_at, t.updated_at, {} FROM {} t",
        body,
        E::TABLE
    )
}

fn fetch<E: Entity>(conn: &Connection, sql: &str, params: &[Value]) -> CoreResult<Vec<Stored<E>>> {
    let mut stmt = conn.prepare(sql)?;
    let raw = stmt
        .query_map(params_from_iter(params.iter()), |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    raw.into_iter()
        .map(|(id, created_at, updated_at, body)| {
            Ok(Stored {
                id: RecordId::parse(&id)
                    .map_err(|_| CoreError::CorruptRecord(format!("{}: bad id {:?}", E::TABLE, id)))?,
                created_at: parse_timestamp(E::TABLE, &created_at)?,
                updated_at: parse_timestamp(E::TABLE, &updated_at)?,
                record: serde_json::from_str(&body).map_err(CoreError::Deserialization)?,
            })
        })
        .collect()
}

fn parse_timestamp(table: &str, raw: &str) -> CoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|_| CoreError::CorruptRecord(format!("{}: bad timestamp {:?}", table, raw)))
}

fn strip_meta(mut input: Json) -> Json {
    if let Json::Object(map) = &mut input {
        for key in META_FIELDS {
            map.remove(key);
        }
    }
    input
}

fn changed_fields(before: &Json, after: &Json) -> Vec<String> {
    let empty = Map::new();
    let before = before.as_object().unwrap_or(&empty);
    let after = after.as_object().unwrap_or(&empty);
    let mut fields: Vec<String> = after
        .iter()
        .filter(|(key, value)| before.get(*key) != Some(*value))
        .map(|(key, _)| key.clone())
        .chain(
            before
                .keys()
                .filter(|key| !after.contains_key(*key))
                .cloned(),
        )
        .collect();
    fields.sort();
    fields
}
