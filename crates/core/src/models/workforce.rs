//! Health worker profiles and the records they own.

use super::{choices, default_true};
use crate::access::{Access, Capability};
use crate::derived;
use crate::entity::{self, Entity, EntitySchema, Filter};
use crate::models::reference::HealthFacility;
use crate::models::users::User;
use crate::validation::{normalise_ids, normalise_tags, Validator};
use crate::CoreResult;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use opencare_types::NonEmptyText;
use opencare_uuid::RecordId;
use rusqlite::types::Value;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HealthWorkerProfile {
    pub user: RecordId,
    pub license_number: NonEmptyText,
    #[serde(default)]
    pub specialization: String,
    #[serde(default)]
    pub sub_specialization: String,
    #[serde(default)]
    pub years_of_experience: u32,
    pub primary_facility: RecordId,
    #[serde(default)]
    pub secondary_facilities: Vec<RecordId>,
    #[serde(default = "default_true")]
    pub is_licensed: bool,
    #[serde(default)]
    pub license_expiry_date: Option<NaiveDate>,
    #[serde(default = "default_true")]
    pub is_active_practitioner: bool,
    #[serde(default)]
    pub emergency_contact_name: String,
    #[serde(default)]
    pub emergency_contact_phone: String,
    #[serde(default)]
    pub emergency_contact_relationship: String,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub languages_spoken: Vec<String>,
    #[serde(default)]
    pub certifications: Vec<String>,
}

impl Entity for HealthWorkerProfile {
    const TABLE: &'static str = "health_worker_profiles";
    const LABEL: &'static str = "HealthWorkerProfile";

    fn schema() -> &'static EntitySchema {
        static SCHEMA: EntitySchema = EntitySchema {
            filters: &[
                Filter::exact("user", "t.user_id"),
                Filter::exact("primary_facility", "t.primary_facility_id"),
                Filter::exact("specialization", "json_extract(t.body, '$.specialization')"),
                Filter::boolean("is_licensed", "json_extract(t.body, '$.is_licensed')"),
                Filter::boolean(
                    "is_active_practitioner",
                    "json_extract(t.body, '$.is_active_practitioner')",
                ),
            ],
            search: &[
                "t.license_number",
                "json_extract(t.body, '$.specialization')",
                "(SELECT u.username || ' ' || json_extract(u.body, '$.first_name') || ' ' || u.last_name FROM users u WHERE u.id = t.user_id)",
            ],
            ordering: &[
                ("last_name", "(SELECT u.last_name FROM users u WHERE u.id = t.user_id)"),
                ("years_of_experience", "json_extract(t.body, '$.years_of_experience')"),
                ("license_number", "t.license_number"),
            ],
            default_ordering: &["last_name"],
            nullable_refs: &[],
            read: Access::Authenticated,
            write: Access::Requires(Capability::Administer),
            audit_reads: false,
        };
        &SCHEMA
    }

    fn columns(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("user_id", entity::id(&self.user)),
            ("license_number", entity::text(&self.license_number)),
            ("primary_facility_id", entity::id(&self.primary_facility)),
        ]
    }

    fn derive(&mut self, _now: DateTime<Utc>) {
        normalise_ids(&mut self.secondary_facilities);
        normalise_tags(&mut self.languages_spoken);
    }

    fn validate(&self, v: &mut Validator<'_>, _previous: Option<&Self>) -> CoreResult<()> {
        v.reference("user", User::TABLE, &self.user)?;
        v.reference("primary_facility", HealthFacility::TABLE, &self.primary_facility)?;
        v.references(
            "secondary_facilities",
            HealthFacility::TABLE,
            &self.secondary_facilities,
        )?;
        v.check(
            !self.secondary_facilities.contains(&self.primary_facility),
            "secondary_facilities",
            "The primary facility cannot also be a secondary facility.",
        );
        Ok(())
    }
}

choices! {
    pub enum QualificationType {
        Degree => "degree",
        Diploma => "diploma",
        Certification => "certification",
        License => "license",
        Training => "training",
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProfessionalQualification {
    pub health_worker: RecordId,
    pub qualification_type: QualificationType,
    pub title: NonEmptyText,
    pub institution: NonEmptyText,
    pub country: NonEmptyText,
    pub start_date: NaiveDate,
    pub completion_date: NaiveDate,
    #[serde(default)]
    pub expiry_date: Option<NaiveDate>,
    #[serde(default)]
    pub grade: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub is_verified: bool,
    #[serde(default)]
    pub verified_by: Option<RecordId>,
    #[serde(default)]
    pub verification_date: Option<NaiveDate>,
}

impl Entity for ProfessionalQualification {
    const TABLE: &'static str = "professional_qualifications";
    const LABEL: &'static str = "ProfessionalQualification";

    fn schema() -> &'static EntitySchema {
        static SCHEMA: EntitySchema = EntitySchema {
            filters: &[
                Filter::exact("health_worker", "t.health_worker_id"),
                Filter::exact(
                    "qualification_type",
                    "json_extract(t.body, '$.qualification_type')",
                ),
                Filter::boolean("is_verified", "json_extract(t.body, '$.is_verified')"),
            ],
            search: &[
                "json_extract(t.body, '$.title')",
                "json_extract(t.body, '$.institution')",
            ],
            ordering: &[
                ("completion_date", "t.completion_date"),
                ("title", "json_extract(t.body, '$.title')"),
            ],
            default_ordering: &["-completion_date"],
            nullable_refs: &[("verified_by", "t.verified_by_id")],
            read: Access::Authenticated,
            write: Access::Requires(Capability::Administer),
            audit_reads: false,
        };
        &SCHEMA
    }

    fn columns(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("health_worker_id", entity::id(&self.health_worker)),
            ("verified_by_id", entity::opt_id(self.verified_by.as_ref())),
            ("completion_date", entity::date(&self.completion_date)),
        ]
    }

    fn validate(&self, v: &mut Validator<'_>, _previous: Option<&Self>) -> CoreResult<()> {
        v.reference(
            "health_worker",
            HealthWorkerProfile::TABLE,
            &self.health_worker,
        )?;
        v.optional_reference("verified_by", User::TABLE, self.verified_by.as_ref())?;
        v.not_before(
            "completion_date",
            Some(&self.start_date),
            Some(&self.completion_date),
            "Completion date cannot be before the start date.",
        );
        v.not_before(
            "expiry_date",
            Some(&self.completion_date),
            self.expiry_date.as_ref(),
            "Expiry date cannot be before the completion date.",
        );
        Ok(())
    }
}

choices! {
    pub enum ScheduleType {
        Regular => "regular",
        OnCall => "on_call",
        Overtime => "overtime",
        Emergency => "emergency",
    }
}

impl Default for ScheduleType {
    fn default() -> Self {
        ScheduleType::Regular
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkSchedule {
    pub health_worker: RecordId,
    pub facility: RecordId,
    /// Monday is 0.
    pub day_of_week: u8,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    #[serde(default)]
    pub schedule_type: ScheduleType,
    #[serde(default = "default_true")]
    pub is_available: bool,
    #[serde(default)]
    pub notes: String,
}

impl Entity for WorkSchedule {
    const TABLE: &'static str = "work_schedules";
    const LABEL: &'static str = "WorkSchedule";

    fn schema() -> &'static EntitySchema {
        static SCHEMA: EntitySchema = EntitySchema {
            filters: &[
                Filter::exact("health_worker", "t.health_worker_id"),
                Filter::exact("facility", "t.facility_id"),
                Filter::integer("day_of_week", "t.day_of_week"),
                Filter::exact("schedule_type", "json_extract(t.body, '$.schedule_type')"),
                Filter::boolean("is_available", "json_extract(t.body, '$.is_available')"),
            ],
            search: &["json_extract(t.body, '$.notes')"],
            ordering: &[
                ("day_of_week", "t.day_of_week"),
                ("start_time", "t.start_time"),
            ],
            default_ordering: &["day_of_week", "start_time"],
            nullable_refs: &[],
            read: Access::Authenticated,
            write: Access::Requires(Capability::Administer),
            audit_reads: false,
        };
        &SCHEMA
    }

    fn columns(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("health_worker_id", entity::id(&self.health_worker)),
            ("facility_id", entity::id(&self.facility)),
            ("day_of_week", entity::int(self.day_of_week)),
            ("start_time", entity::time(&self.start_time)),
        ]
    }

    fn validate(&self, v: &mut Validator<'_>, _previous: Option<&Self>) -> CoreResult<()> {
        v.reference(
            "health_worker",
            HealthWorkerProfile::TABLE,
            &self.health_worker,
        )?;
        v.reference("facility", HealthFacility::TABLE, &self.facility)?;
        v.range("day_of_week", Some(self.day_of_week), 0, 6);
        v.check(
            self.end_time > self.start_time,
            "end_time",
            "End time must be after start time.",
        );
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PerformanceEvaluation {
    pub health_worker: RecordId,
    pub evaluator: RecordId,
    pub evaluation_date: NaiveDate,
    pub evaluation_period_start: NaiveDate,
    pub evaluation_period_end: NaiveDate,
    pub clinical_skills: u8,
    pub communication_skills: u8,
    pub teamwork: u8,
    pub professionalism: u8,
    pub productivity: u8,
    /// Always recomputed from the five ratings.
    #[serde(default)]
    pub overall_rating: u8,
    pub strengths: NonEmptyText,
    pub areas_for_improvement: NonEmptyText,
    pub goals: NonEmptyText,
    #[serde(default)]
    pub action_items: Vec<String>,
    #[serde(default)]
    pub follow_up_date: Option<NaiveDate>,
    #[serde(default)]
    pub notes: String,
}

impl PerformanceEvaluation {
    fn ratings(&self) -> [(&'static str, u8); 5] {
        [
            ("clinical_skills", self.clinical_skills),
            ("communication_skills", self.communication_skills),
            ("teamwork", self.teamwork),
            ("professionalism", self.professionalism),
            ("productivity", self.productivity),
        ]
    }
}

impl Entity for PerformanceEvaluation {
    const TABLE: &'static str = "performance_evaluations";
    const LABEL: &'static str = "PerformanceEvaluation";

    fn schema() -> &'static EntitySchema {
        static SCHEMA: EntitySchema = EntitySchema {
            filters: &[
                Filter::exact("health_worker", "t.health_worker_id"),
                Filter::exact("evaluator", "t.evaluator_id"),
                Filter::date_from("evaluation_date_after", "t.evaluation_date"),
                Filter::date_to("evaluation_date_before", "t.evaluation_date"),
            ],
            search: &[
                "json_extract(t.body, '$.strengths')",
                "json_extract(t.body, '$.goals')",
            ],
            ordering: &[
                ("evaluation_date", "t.evaluation_date"),
                ("overall_rating", "json_extract(t.body, '$.overall_rating')"),
            ],
            default_ordering: &["-evaluation_date"],
            nullable_refs: &[],
            read: Access::Authenticated,
            write: Access::Requires(Capability::Administer),
            audit_reads: false,
        };
        &SCHEMA
    }

    fn columns(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("health_worker_id", entity::id(&self.health_worker)),
            ("evaluator_id", entity::id(&self.evaluator)),
            ("evaluation_date", entity::date(&self.evaluation_date)),
        ]
    }

    fn derive(&mut self, _now: DateTime<Utc>) {
        let ratings = self.ratings().map(|(_, rating)| rating);
        self.overall_rating = derived::overall_rating(&ratings);
    }

    fn validate(&self, v: &mut Validator<'_>, _previous: Option<&Self>) -> CoreResult<()> {
        v.reference(
            "health_worker",
            HealthWorkerProfile::TABLE,
            &self.health_worker,
        )?;
        v.reference("evaluator", User::TABLE, &self.evaluator)?;
        for (field, rating) in self.ratings() {
            v.range(field, Some(rating), 1, 5);
        }
        v.not_before(
            "evaluation_period_end",
            Some(&self.evaluation_period_start),
            Some(&self.evaluation_period_end),
            "Evaluation period end cannot be before its start.",
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::Fixture;
    use crate::CoreError;
    use serde_json::{json, Value as Json};

    fn profile(fx: &Fixture, user: RecordId, facility: RecordId) -> RecordId {
        fx.create::<HealthWorkerProfile>(json!({
            "user": user,
            "license_number": "UMDPC-1001",
            "specialization": "pediatrics",
            "primary_facility": facility,
        }))
    }

    fn evaluation(health_worker: RecordId, evaluator: RecordId) -> Json {
        json!({
            "health_worker": health_worker,
            "evaluator": evaluator,
            "evaluation_date": "2024-06-30",
            "evaluation_period_start": "2024-01-01",
            "evaluation_period_end": "2024-06-30",
            "clinical_skills": 5,
            "communication_skills": 4,
            "teamwork": 5,
            "professionalism": 3,
            "productivity": 4,
            "overall_rating": 1,
            "strengths": "Calm under pressure",
            "areas_for_improvement": "Documentation",
            "goals": "Complete IMCI refresher",
        })
    }

    #[test]
    fn test_overall_rating_is_recomputed() {
        let fx = Fixture::new();
        let clinic = fx.clinic();
        let hw = profile(&fx, clinic.doctor, clinic.facility);
        let admin = fx.user("admin", "admin");

        let stored = fx
            .repo::<PerformanceEvaluation>()
            .create_from_json(&fx.actor, evaluation(hw, admin))
            .expect("evaluation should be stored");
        assert_eq!(stored.record.overall_rating, 4);
    }

    #[test]
    fn test_evaluation_rating_out_of_range() {
        let fx = Fixture::new();
        let clinic = fx.clinic();
        let hw = profile(&fx, clinic.doctor, clinic.facility);
        let mut input = evaluation(hw, clinic.doctor);
        input["teamwork"] = json!(6);

        let err = fx
            .repo::<PerformanceEvaluation>()
            .create_from_json(&fx.actor, input)
            .expect_err("6 is out of range");
        assert!(matches!(err, CoreError::Validation(e) if e.contains("teamwork")));
    }

    #[test]
    fn test_primary_facility_not_secondary() {
        let fx = Fixture::new();
        let clinic = fx.clinic();
        let err = fx
            .repo::<HealthWorkerProfile>()
            .create_from_json(
                &fx.actor,
                json!({
                    "user": clinic.doctor,
                    "license_number": "UMDPC-2002",
                    "primary_facility": clinic.facility,
                    "secondary_facilities": [clinic.facility],
                }),
            )
            .expect_err("primary listed as secondary");
        assert!(matches!(err, CoreError::Validation(e) if e.contains("secondary_facilities")));
    }

    #[test]
    fn test_duplicate_license_number_conflicts() {
        let fx = Fixture::new();
        let clinic = fx.clinic();
        profile(&fx, clinic.doctor, clinic.facility);
        let nurse = fx.user("nurse.joy", "nurse");
        let err = fx
            .repo::<HealthWorkerProfile>()
            .create_from_json(
                &fx.actor,
                json!({
                    "user": nurse,
                    "license_number": "UMDPC-1001",
                    "primary_facility": clinic.facility,
                }),
            )
            .expect_err("license numbers are unique");
        assert!(matches!(err, CoreError::Conflict(_)));
    }

    #[test]
    fn test_work_schedule_times_and_cascade() {
        let fx = Fixture::new();
        let clinic = fx.clinic();
        let hw = profile(&fx, clinic.doctor, clinic.facility);
        let repo = fx.repo::<WorkSchedule>();

        let err = repo
            .create_from_json(
                &fx.actor,
                json!({
                    "health_worker": hw,
                    "facility": clinic.facility,
                    "day_of_week": 7,
                    "start_time": "17:00:00",
                    "end_time": "09:00:00",
                }),
            )
            .expect_err("bad schedule");
        match err {
            CoreError::Validation(errors) => {
                assert!(errors.contains("day_of_week"));
                assert!(errors.contains("end_time"));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        repo.create_from_json(
            &fx.actor,
            json!({
                "health_worker": hw,
                "facility": clinic.facility,
                "day_of_week": 0,
                "start_time": "08:00:00",
                "end_time": "17:00:00",
            }),
        )
        .expect("valid schedule");
        fx.repo::<HealthWorkerProfile>()
            .delete(&fx.actor, &hw)
            .expect("profile delete");
        assert_eq!(fx.count("work_schedules"), 0);
    }
}
