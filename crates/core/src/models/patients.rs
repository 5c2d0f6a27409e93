//! Patients and their visits to facilities.

use super::{blank_as_none, choices, default_true};
use crate::access::{Access, Capability};
use crate::derived;
use crate::entity::{self, Entity, EntitySchema, Filter};
use crate::models::reference::{HealthFacility, Location};
use crate::models::users::User;
use crate::validation::{normalise_tags, Validator};
use crate::CoreResult;
use chrono::{DateTime, NaiveDate, Utc};
use opencare_types::{EmailAddress, NonEmptyText, PhoneNumber};
use opencare_uuid::RecordId;
use rusqlite::types::Value;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};

choices! {
    pub enum Gender {
        Male => "M",
        Female => "F",
        Other => "O",
    }
}

choices! {
    pub enum MaritalStatus {
        Single => "single",
        Married => "married",
        Divorced => "divorced",
        Widowed => "widowed",
    }
}

choices! {
    pub enum BloodType {
        APositive => "A+",
        ANegative => "A-",
        BPositive => "B+",
        BNegative => "B-",
        AbPositive => "AB+",
        AbNegative => "AB-",
        OPositive => "O+",
        ONegative => "O-",
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    /// Externally assigned identifier, unique across the system.
    pub patient_id: NonEmptyText,
    pub first_name: NonEmptyText,
    pub last_name: NonEmptyText,
    #[serde(default)]
    pub middle_name: String,
    pub date_of_birth: NaiveDate,
    pub gender: Gender,
    #[serde(default)]
    pub marital_status: Option<MaritalStatus>,

    pub phone_number: PhoneNumber,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub email: Option<EmailAddress>,
    pub address: NonEmptyText,
    pub location: RecordId,

    pub emergency_contact_name: NonEmptyText,
    pub emergency_contact_phone: NonEmptyText,
    pub emergency_contact_relationship: NonEmptyText,

    #[serde(default)]
    pub blood_type: Option<BloodType>,
    #[serde(default)]
    pub allergies: Vec<String>,
    #[serde(default)]
    pub chronic_conditions: Vec<String>,
    #[serde(default)]
    pub current_medications: Vec<String>,

    #[serde(default)]
    pub insurance_provider: String,
    #[serde(default)]
    pub insurance_number: String,
    #[serde(default)]
    pub payment_method: String,

    pub registered_facility: RecordId,
    /// Set on first save and never changed afterwards.
    #[serde(default)]
    pub registration_date: Option<DateTime<Utc>>,
    #[serde(default = "default_true")]
    pub is_active: bool,

    #[serde(default)]
    pub occupation: String,
    #[serde(default)]
    pub education_level: String,
    #[serde(default)]
    pub religion: String,
    #[serde(default)]
    pub ethnicity: String,
}

impl Patient {
    pub fn full_name(&self) -> String {
        if self.middle_name.trim().is_empty() {
            format!("{} {}", self.first_name, self.last_name)
        } else {
            format!(
                "{} {} {}",
                self.first_name,
                self.middle_name.trim(),
                self.last_name
            )
        }
    }

    pub fn age_on(&self, today: NaiveDate) -> i32 {
        derived::age_on(self.date_of_birth, today)
    }
}

impl Entity for Patient {
    const TABLE: &'static str = "patients";
    const LABEL: &'static str = "Patient";

    fn schema() -> &'static EntitySchema {
        static SCHEMA: EntitySchema = EntitySchema {
            filters: &[
                Filter::exact("gender", "json_extract(t.body, '$.gender')"),
                Filter::exact("location", "t.location_id"),
                Filter::exact("registered_facility", "t.registered_facility_id"),
                Filter::exact("blood_type", "json_extract(t.body, '$.blood_type')"),
                Filter::boolean("is_active", "t.is_active"),
                Filter::date_from("registration_date_after", "t.registration_date"),
                Filter::date_to("registration_date_before", "t.registration_date"),
            ],
            search: &[
                "t.patient_id",
                "json_extract(t.body, '$.first_name')",
                "t.last_name",
                "json_extract(t.body, '$.phone_number')",
            ],
            ordering: &[
                ("registration_date", "t.registration_date"),
                ("last_name", "t.last_name"),
                ("first_name", "json_extract(t.body, '$.first_name')"),
                ("date_of_birth", "json_extract(t.body, '$.date_of_birth')"),
                ("patient_id", "t.patient_id"),
            ],
            default_ordering: &["-registration_date"],
            nullable_refs: &[],
            read: Access::Authenticated,
            write: Access::Authenticated,
            audit_reads: true,
        };
        &SCHEMA
    }

    fn columns(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("patient_id", entity::text(&self.patient_id)),
            ("location_id", entity::id(&self.location)),
            ("registered_facility_id", entity::id(&self.registered_facility)),
            ("is_active", entity::flag(self.is_active)),
            ("last_name", entity::text(&self.last_name)),
            (
                "registration_date",
                entity::opt_timestamp(self.registration_date.as_ref()),
            ),
        ]
    }

    fn derive(&mut self, now: DateTime<Utc>) {
        normalise_tags(&mut self.allergies);
        normalise_tags(&mut self.chronic_conditions);
        normalise_tags(&mut self.current_medications);
        if self.registration_date.is_none() {
            self.registration_date = Some(now);
        }
    }

    fn carry_over(&mut self, previous: &Self) {
        self.registration_date = previous.registration_date;
    }

    fn validate(&self, v: &mut Validator<'_>, _previous: Option<&Self>) -> CoreResult<()> {
        v.reference("location", Location::TABLE, &self.location)?;
        v.reference(
            "registered_facility",
            HealthFacility::TABLE,
            &self.registered_facility,
        )?;
        let today = v.today();
        v.not_before(
            "date_of_birth",
            Some(&self.date_of_birth),
            Some(&today),
            "Date of birth cannot be in the future.",
        );
        Ok(())
    }

    fn extend_view(&self, view: &mut Map<String, Json>, today: NaiveDate) {
        view.insert("age".into(), Json::from(self.age_on(today)));
        view.insert("full_name".into(), Json::String(self.full_name()));
    }
}

choices! {
    pub enum VisitType {
        Consultation => "consultation",
        Emergency => "emergency",
        FollowUp => "follow_up",
        Vaccination => "vaccination",
        Laboratory => "laboratory",
        Pharmacy => "pharmacy",
    }
}

choices! {
    pub enum VisitStatus {
        Scheduled => "scheduled",
        InProgress => "in_progress",
        Completed => "completed",
        Cancelled => "cancelled",
        NoShow => "no_show",
    }
}

impl Default for VisitStatus {
    fn default() -> Self {
        VisitStatus::Scheduled
    }
}

impl VisitStatus {
    /// Whether a stored visit in this state may move to `next`.
    ///
    /// Completed, cancelled and no-show visits are final. Saving without a change is always
    /// allowed.
    pub fn can_become(&self, next: VisitStatus) -> bool {
        use VisitStatus::*;
        *self == next
            || matches!(
                (self, next),
                (Scheduled, InProgress | Cancelled | NoShow)
                    | (InProgress, Completed | Cancelled | NoShow)
            )
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PatientVisit {
    pub patient: RecordId,
    pub facility: RecordId,
    pub visit_type: VisitType,
    #[serde(default)]
    pub status: VisitStatus,
    pub scheduled_date: DateTime<Utc>,
    #[serde(default)]
    pub actual_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub chief_complaint: String,
    #[serde(default)]
    pub diagnosis: String,
    #[serde(default)]
    pub treatment_plan: String,
    #[serde(default)]
    pub prescription: Vec<String>,
    #[serde(default)]
    pub attending_provider: Option<RecordId>,
    #[serde(default)]
    pub consultation_fee: Option<Decimal>,
    #[serde(default)]
    pub total_cost: Option<Decimal>,
    #[serde(default = "default_payment_status")]
    pub payment_status: String,
    #[serde(default)]
    pub notes: String,
}

fn default_payment_status() -> String {
    "pending".to_string()
}

impl Entity for PatientVisit {
    const TABLE: &'static str = "patient_visits";
    const LABEL: &'static str = "PatientVisit";

    fn schema() -> &'static EntitySchema {
        static SCHEMA: EntitySchema = EntitySchema {
            filters: &[
                Filter::exact("patient", "t.patient_id"),
                Filter::exact("facility", "t.facility_id"),
                Filter::exact("attending_provider", "t.attending_provider_id"),
                Filter::exact("visit_type", "json_extract(t.body, '$.visit_type')"),
                Filter::exact("status", "t.status"),
                Filter::exact("payment_status", "json_extract(t.body, '$.payment_status')"),
                Filter::on_date("scheduled_on", "t.scheduled_date"),
                Filter::date_from("scheduled_date_after", "t.scheduled_date"),
                Filter::date_to("scheduled_date_before", "t.scheduled_date"),
            ],
            search: &[
                "json_extract(t.body, '$.chief_complaint')",
                "json_extract(t.body, '$.diagnosis')",
                "(SELECT p.patient_id || ' ' || json_extract(p.body, '$.first_name') || ' ' || p.last_name FROM patients p WHERE p.id = t.patient_id)",
                "(SELECT f.name FROM health_facilities f WHERE f.id = t.facility_id)",
            ],
            ordering: &[
                ("scheduled_date", "t.scheduled_date"),
                ("status", "t.status"),
                ("created_at", "t.created_at"),
            ],
            default_ordering: &["-scheduled_date"],
            nullable_refs: &[("attending_provider", "t.attending_provider_id")],
            read: Access::Requires(Capability::ClinicalRecords),
            write: Access::Requires(Capability::ClinicalRecords),
            audit_reads: false,
        };
        &SCHEMA
    }

    fn columns(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("patient_id", entity::id(&self.patient)),
            ("facility_id", entity::id(&self.facility)),
            (
                "attending_provider_id",
                entity::opt_id(self.attending_provider.as_ref()),
            ),
            ("status", entity::text(self.status.as_str())),
            ("scheduled_date", entity::timestamp(&self.scheduled_date)),
        ]
    }

    fn validate(&self, v: &mut Validator<'_>, previous: Option<&Self>) -> CoreResult<()> {
        v.reference("patient", Patient::TABLE, &self.patient)?;
        v.reference("facility", HealthFacility::TABLE, &self.facility)?;
        v.optional_reference(
            "attending_provider",
            User::TABLE,
            self.attending_provider.as_ref(),
        )?;
        for (field, amount) in [
            ("consultation_fee", self.consultation_fee),
            ("total_cost", self.total_cost),
        ] {
            v.check(
                amount.map_or(true, |a| a >= Decimal::ZERO),
                field,
                "Ensure this value is greater than or equal to 0.",
            );
        }

        if let Some(previous) = previous {
            if !previous.status.can_become(self.status) {
                v.error(
                    "status",
                    format!(
                        "Cannot change visit status from {} to {}.",
                        previous.status, self.status
                    ),
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{patient_json, Fixture};
    use crate::CoreError;
    use serde_json::json;

    #[test]
    fn test_visit_status_transitions() {
        use VisitStatus::*;
        assert!(Scheduled.can_become(InProgress));
        assert!(InProgress.can_become(Completed));
        assert!(Scheduled.can_become(NoShow));
        assert!(Completed.can_become(Completed));
        assert!(!Completed.can_become(InProgress));
        assert!(!Cancelled.can_become(Scheduled));
        assert!(!Scheduled.can_become(Completed));
    }

    #[test]
    fn test_duplicate_patient_id_conflicts_and_keeps_first() {
        let fx = Fixture::new();
        let clinic = fx.clinic();
        let mut second = patient_json("P-0001", clinic.location, clinic.facility);
        second["first_name"] = json!("Someone");

        let err = fx
            .repo::<Patient>()
            .create_from_json(&fx.actor, second)
            .expect_err("patient_id is unique");
        assert!(matches!(err, CoreError::Conflict(_)));

        let first = fx
            .repo::<Patient>()
            .get(&fx.actor, &clinic.patient)
            .expect("first patient intact");
        assert_eq!(first.record.first_name.as_str(), "Amina");
        assert_eq!(fx.count("patients"), 1);
    }

    #[test]
    fn test_patient_tags_normalised_and_age_in_view() {
        let fx = Fixture::new();
        let location = fx.location("Gulu");
        let facility = fx.facility("Gulu Clinic", location);
        let mut input = patient_json("P-0002", location, facility);
        input["allergies"] = json!([" penicillin", "latex", "penicillin"]);

        let stored = fx
            .repo::<Patient>()
            .create_from_json(&fx.actor, input)
            .expect("patient");
        assert_eq!(stored.record.allergies, vec!["latex", "penicillin"]);
        assert!(stored.record.registration_date.is_some());

        let today = NaiveDate::from_ymd_opt(2024, 3, 21).expect("date");
        let view = stored.view(today).expect("view");
        assert_eq!(view["age"], json!(33));
        assert_eq!(view["full_name"], json!("Amina Nakato"));
    }

    #[test]
    fn test_patient_future_birth_rejected() {
        let fx = Fixture::new();
        let location = fx.location("Gulu");
        let facility = fx.facility("Gulu Clinic", location);
        let mut input = patient_json("P-0003", location, facility);
        input["date_of_birth"] = json!("2999-01-01");
        let err = fx
            .repo::<Patient>()
            .create_from_json(&fx.actor, input)
            .expect_err("future birth date");
        assert!(matches!(err, CoreError::Validation(e) if e.contains("date_of_birth")));
    }

    #[test]
    fn test_registration_date_survives_replace() {
        let fx = Fixture::new();
        let clinic = fx.clinic();
        let repo = fx.repo::<Patient>();
        let before = repo.get(&fx.actor, &clinic.patient).expect("get");

        let mut input = patient_json("P-0001", clinic.location, clinic.facility);
        input["registration_date"] = json!("2000-01-01T00:00:00Z");
        let after = repo
            .replace(&fx.actor, &clinic.patient, input)
            .expect("replace");
        assert_eq!(after.record.registration_date, before.record.registration_date);
        assert_eq!(after.created_at, before.created_at);
    }

    #[test]
    fn test_patient_reads_are_audited() {
        let fx = Fixture::new();
        let clinic = fx.clinic();
        fx.repo::<Patient>()
            .get(&fx.actor, &clinic.patient)
            .expect("get");
        let views: i64 = fx
            .db
            .read(|conn| {
                Ok(conn.query_row(
                    "SELECT COUNT(*) FROM audit_trail WHERE action = 'view' AND model_name = 'Patient'",
                    [],
                    |row| row.get(0),
                )?)
            })
            .expect("count");
        assert_eq!(views, 1);
    }

    #[test]
    fn test_visit_state_machine_enforced_on_update() {
        let fx = Fixture::new();
        let clinic = fx.clinic();
        let repo = fx.repo::<PatientVisit>();
        let visit = repo
            .create_from_json(
                &fx.actor,
                json!({
                    "patient": clinic.patient,
                    "facility": clinic.facility,
                    "visit_type": "consultation",
                    "scheduled_date": "2024-05-01T09:00:00Z",
                }),
            )
            .expect("visit");
        assert_eq!(visit.record.status, VisitStatus::Scheduled);
        assert_eq!(visit.record.payment_status, "pending");

        repo.patch(&fx.actor, &visit.id, json!({ "status": "in_progress" }))
            .expect("start");
        repo.patch(&fx.actor, &visit.id, json!({ "status": "completed" }))
            .expect("complete");
        let err = repo
            .patch(&fx.actor, &visit.id, json!({ "status": "scheduled" }))
            .expect_err("completed is terminal");
        assert!(matches!(err, CoreError::Validation(e) if e.contains("status")));
    }

    #[test]
    fn test_deleted_provider_is_cleared_from_visit() {
        let fx = Fixture::new();
        let clinic = fx.clinic();
        let repo = fx.repo::<PatientVisit>();
        let visit = repo
            .create_from_json(
                &fx.actor,
                json!({
                    "patient": clinic.patient,
                    "facility": clinic.facility,
                    "visit_type": "consultation",
                    "scheduled_date": "2024-05-01T09:00:00Z",
                    "attending_provider": clinic.doctor,
                }),
            )
            .expect("visit");

        fx.repo::<User>()
            .delete(&fx.actor, &clinic.doctor)
            .expect("delete provider");
        let reloaded = repo.get(&fx.actor, &visit.id).expect("visit survives");
        assert_eq!(reloaded.record.attending_provider, None);
    }
}
