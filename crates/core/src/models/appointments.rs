//! Appointment booking with time-window conflict detection.

use super::choices;
use super::users::Role;
use crate::access::{Access, Actor, Capability};
use crate::constants::MIN_APPOINTMENT_MINUTES;
use crate::entity::{self, Entity, EntitySchema, Filter, WriteEvent};
use crate::models::patients::Patient;
use crate::models::reference::HealthFacility;
use crate::validation::{missing_reference, Validator};
use crate::{store, CoreResult};
use chrono::{DateTime, Duration, Utc};
use opencare_uuid::RecordId;
use rusqlite::types::Value;
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

choices! {
    pub enum AppointmentStatus {
        Scheduled => "scheduled",
        Completed => "completed",
        Cancelled => "cancelled",
        NoShow => "no_show",
    }
}

impl Default for AppointmentStatus {
    fn default() -> Self {
        AppointmentStatus::Scheduled
    }
}

impl AppointmentStatus {
    /// Appointments in these states still hold their time slot.
    pub fn holds_slot(&self) -> bool {
        matches!(self, AppointmentStatus::Scheduled | AppointmentStatus::NoShow)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    pub patient: RecordId,
    pub provider: RecordId,
    pub facility: RecordId,
    #[serde(default)]
    pub appointment_type: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub status: AppointmentStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Booking events announced so far. Server-owned.
    #[serde(default)]
    pub notifications_sent: Vec<String>,
    /// Set from the creating user; clients cannot change it.
    #[serde(default)]
    pub created_by: Option<RecordId>,
}

impl Entity for Appointment {
    const TABLE: &'static str = "appointments";
    const LABEL: &'static str = "Appointment";

    fn schema() -> &'static EntitySchema {
        static SCHEMA: EntitySchema = EntitySchema {
            filters: &[
                Filter::exact("patient", "t.patient_id"),
                Filter::exact("provider", "t.provider_id"),
                Filter::exact("facility", "t.facility_id"),
                Filter::exact("status", "t.status"),
                Filter::exact("appointment_type", "json_extract(t.body, '$.appointment_type')"),
                Filter::on_date("date", "t.start_time"),
                Filter::date_from("start_time_after", "t.start_time"),
                Filter::date_to("start_time_before", "t.start_time"),
                Filter::time_from("starts_from", "t.start_time"),
            ],
            search: &[
                "json_extract(t.body, '$.reason')",
                "json_extract(t.body, '$.appointment_type')",
                "(SELECT p.patient_id || ' ' || json_extract(p.body, '$.first_name') || ' ' || p.last_name FROM patients p WHERE p.id = t.patient_id)",
                "(SELECT u.username || ' ' || u.last_name FROM users u WHERE u.id = t.provider_id)",
            ],
            ordering: &[
                ("start_time", "t.start_time"),
                ("end_time", "t.end_time"),
                ("status", "t.status"),
            ],
            default_ordering: &["start_time"],
            nullable_refs: &[("created_by", "t.created_by_id")],
            read: Access::Authenticated,
            write: Access::Authenticated,
            audit_reads: false,
        };
        &SCHEMA
    }

    fn columns(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("patient_id", entity::id(&self.patient)),
            ("provider_id", entity::id(&self.provider)),
            ("facility_id", entity::id(&self.facility)),
            ("created_by_id", entity::opt_id(self.created_by.as_ref())),
            ("status", entity::text(self.status.as_str())),
            ("start_time", entity::timestamp(&self.start_time)),
            ("end_time", entity::timestamp(&self.end_time)),
        ]
    }

    fn assign_actor(&mut self, actor: &Actor) {
        self.created_by = actor.user_id();
    }

    fn carry_over(&mut self, previous: &Self) {
        self.created_by = previous.created_by;
        self.notifications_sent = previous.notifications_sent.clone();
    }

    fn on_write(&mut self, id: &RecordId, event: WriteEvent) {
        let event = match event {
            WriteEvent::Created => {
                self.notifications_sent.clear();
                "created"
            }
            WriteEvent::Updated => "updated",
            WriteEvent::Deleted => "cancelled",
        };
        tracing::info!(
            "Appointment {} {}: patient={} provider={} start={} status={}",
            id,
            event,
            self.patient,
            self.provider,
            self.start_time,
            self.status.as_str()
        );
        self.notifications_sent.push(event.to_string());
    }

    fn validate(&self, v: &mut Validator<'_>, _previous: Option<&Self>) -> CoreResult<()> {
        let timing_ok = if self.end_time <= self.start_time {
            v.error("end_time", "End time must be after start time.");
            false
        } else if self.end_time - self.start_time < Duration::minutes(MIN_APPOINTMENT_MINUTES) {
            v.error(
                "end_time",
                format!(
                    "Appointments must be at least {} minutes long.",
                    MIN_APPOINTMENT_MINUTES
                ),
            );
            false
        } else {
            true
        };

        v.active("patient", Patient::TABLE, "Patient", &self.patient)?;
        v.reference("facility", HealthFacility::TABLE, &self.facility)?;
        check_provider(v, &self.provider)?;

        if timing_ok && self.status.holds_slot() {
            for (field, column, who) in [
                ("provider", "provider_id", "provider"),
                ("patient", "patient_id", "patient"),
                ("facility", "facility_id", "facility"),
            ] {
                if v.has_error(field) {
                    continue;
                }
                let id = match field {
                    "provider" => self.provider,
                    "patient" => self.patient,
                    _ => self.facility,
                };
                if overlaps(v, column, &id, self.start_time, self.end_time)? {
                    v.error(
                        field,
                        format!("The {} already has an appointment in this time window.", who),
                    );
                }
            }
        }
        Ok(())
    }
}

/// The provider must exist, be active and hold the provider capability.
fn check_provider(v: &mut Validator<'_>, provider: &RecordId) -> CoreResult<()> {
    let row: Option<(String, bool, bool)> = v
        .conn()
        .query_row(
            "SELECT role, is_active, is_superuser FROM users WHERE id = ?1",
            params![provider.to_string()],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()?;
    let Some((role, is_active, is_superuser)) = row else {
        v.error("provider", missing_reference(provider));
        return Ok(());
    };
    if !is_active {
        v.error("provider", "Provider is not active.");
        return Ok(());
    }
    let can_provide = is_superuser
        || Role::from_wire(&role)
            .map(|role| role.capabilities().contains(&Capability::Provider))
            .unwrap_or(false);
    v.check(
        can_provide,
        "provider",
        "Selected user cannot be booked as a provider.",
    );
    Ok(())
}

/// True if another slot-holding appointment sharing `column = id` intersects the window.
fn overlaps(
    v: &Validator<'_>,
    column: &str,
    id: &RecordId,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> CoreResult<bool> {
    let count: i64 = v.conn().query_row(
        &format!(
            "SELECT COUNT(*) FROM appointments
             WHERE {} = ?1 AND id != ?2 AND status IN ('scheduled', 'no_show')
               AND julianday(start_time) < julianday(?4)
               AND julianday(end_time) > julianday(?3)",
            column
        ),
        params![
            id.to_string(),
            v.record_id().to_string(),
            store::timestamp_text(&start),
            store::timestamp_text(&end),
        ],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}
