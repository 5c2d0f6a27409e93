//! Clinical records and the detail rows attached to them.
//!
//! A [`HealthRecord`] belongs to one patient. Vital signs, medications, laboratory tests,
//! imaging studies and treatment plans hang off a record and are deleted with it. Every type
//! here requires the clinical records capability to read or write.

use super::{choices, default_true};
use crate::access::{Access, Actor, Capability};
use crate::derived;
use crate::entity::{self, Entity, EntitySchema, Filter};
use crate::models::patients::Patient;
use crate::models::reference::HealthFacility;
use crate::models::users::User;
use crate::validation::{is_safe_relative_path, normalise_ids, Validator};
use crate::CoreResult;
use chrono::{DateTime, NaiveDate, Utc};
use opencare_types::NonEmptyText;
use opencare_uuid::RecordId;
use rust_decimal::Decimal;
use rusqlite::types::Value;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

const CLINICAL: Access = Access::Requires(Capability::ClinicalRecords);

/// Owning patient of a detail row, for `patient=` filters on record children.
const RECORD_PATIENT: &str =
    "(SELECT r.patient_id FROM health_records r WHERE r.id = t.health_record_id)";

const UNSAFE_PATH: &str = "File paths must be relative and may not leave the storage root.";

fn check_paths(v: &mut Validator<'_>, field: &str, paths: &[String]) {
    if paths.iter().any(|p| !is_safe_relative_path(p)) {
        v.error(field, UNSAFE_PATH);
    }
}

choices! {
    pub enum RecordType {
        Medical => "medical",
        Dental => "dental",
        MentalHealth => "mental_health",
        Maternity => "maternity",
        Pediatric => "pediatric",
        Emergency => "emergency",
        Laboratory => "laboratory",
        Imaging => "imaging",
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HealthRecord {
    pub patient: RecordId,
    pub facility: RecordId,
    pub record_type: RecordType,
    pub record_date: DateTime<Utc>,
    #[serde(default)]
    pub attending_provider: Option<RecordId>,
    #[serde(default)]
    pub chief_complaint: String,
    #[serde(default)]
    pub history_of_present_illness: String,
    #[serde(default)]
    pub past_medical_history: String,
    #[serde(default)]
    pub family_history: String,
    #[serde(default)]
    pub social_history: String,
    #[serde(default)]
    pub physical_examination: String,
    #[serde(default)]
    pub assessment: String,
    #[serde(default)]
    pub diagnosis: Vec<String>,
    #[serde(default)]
    pub treatment_plan: String,
    #[serde(default)]
    pub follow_up_plan: String,
    #[serde(default)]
    pub notes: String,
    /// Relative paths under the attachment storage root.
    #[serde(default)]
    pub attachments: Vec<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub is_confidential: bool,
}

impl Entity for HealthRecord {
    const TABLE: &'static str = "health_records";
    const LABEL: &'static str = "HealthRecord";

    fn schema() -> &'static EntitySchema {
        static SCHEMA: EntitySchema = EntitySchema {
            filters: &[
                Filter::exact("patient", "t.patient_id"),
                Filter::exact(
                    "patient_identifier",
                    "(SELECT p.patient_id FROM patients p WHERE p.id = t.patient_id)",
                ),
                Filter::exact("facility", "t.facility_id"),
                Filter::exact("attending_provider", "t.attending_provider_id"),
                Filter::exact("record_type", "t.record_type"),
                Filter::boolean("is_active", "json_extract(t.body, '$.is_active')"),
                Filter::boolean("is_confidential", "json_extract(t.body, '$.is_confidential')"),
                Filter::date_from("record_date_after", "t.record_date"),
                Filter::date_to("record_date_before", "t.record_date"),
            ],
            search: &[
                "json_extract(t.body, '$.chief_complaint')",
                "json_extract(t.body, '$.assessment')",
                "json_extract(t.body, '$.diagnosis')",
                "(SELECT p.patient_id || ' ' || json_extract(p.body, '$.first_name') || ' ' || p.last_name FROM patients p WHERE p.id = t.patient_id)",
                "(SELECT f.name FROM health_facilities f WHERE f.id = t.facility_id)",
                "(SELECT u.username || ' ' || COALESCE(json_extract(u.body, '$.first_name'), '') || ' ' || u.last_name FROM users u WHERE u.id = t.attending_provider_id)",
            ],
            ordering: &[
                ("record_date", "t.record_date"),
                ("record_type", "t.record_type"),
                ("created_at", "t.created_at"),
            ],
            default_ordering: &["-record_date"],
            nullable_refs: &[("attending_provider", "t.attending_provider_id")],
            read: CLINICAL,
            write: CLINICAL,
            audit_reads: true,
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
            ("record_type", entity::text(self.record_type.as_str())),
            ("record_date", entity::timestamp(&self.record_date)),
        ]
    }

    fn validate(&self, v: &mut Validator<'_>, _previous: Option<&Self>) -> CoreResult<()> {
        v.active("patient", Patient::TABLE, "Patient", &self.patient)?;
        v.reference("facility", HealthFacility::TABLE, &self.facility)?;
        if let Some(provider) = &self.attending_provider {
            v.active("attending_provider", User::TABLE, "Attending provider", provider)?;
        }
        check_paths(v, "attachments", &self.attachments);
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VitalSigns {
    pub health_record: RecordId,
    /// Degrees Celsius.
    #[serde(default)]
    pub temperature: Option<Decimal>,
    #[serde(default)]
    pub blood_pressure_systolic: Option<u32>,
    #[serde(default)]
    pub blood_pressure_diastolic: Option<u32>,
    #[serde(default)]
    pub heart_rate: Option<u32>,
    #[serde(default)]
    pub respiratory_rate: Option<u32>,
    /// SpO2 percentage.
    #[serde(default)]
    pub oxygen_saturation: Option<u32>,
    /// Centimetres.
    #[serde(default)]
    pub height: Option<Decimal>,
    /// Kilograms.
    #[serde(default)]
    pub weight: Option<Decimal>,
    /// Derived from height and weight on every save.
    #[serde(default)]
    pub bmi: Option<Decimal>,
    #[serde(default)]
    pub pain_scale: Option<u8>,
    #[serde(default)]
    pub measurement_position: String,
    #[serde(default)]
    pub measurement_notes: String,
    #[serde(default)]
    pub recorded_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub recorded_by: Option<RecordId>,
}

impl Entity for VitalSigns {
    const TABLE: &'static str = "vital_signs";
    const LABEL: &'static str = "VitalSigns";

    fn schema() -> &'static EntitySchema {
        static SCHEMA: EntitySchema = EntitySchema {
            filters: &[
                Filter::exact("health_record", "t.health_record_id"),
                Filter::exact("patient", RECORD_PATIENT),
                Filter::exact("recorded_by", "t.recorded_by_id"),
                Filter::date_from("recorded_at_after", "t.recorded_at"),
                Filter::date_to("recorded_at_before", "t.recorded_at"),
            ],
            search: &[
                "json_extract(t.body, '$.measurement_position')",
                "json_extract(t.body, '$.measurement_notes')",
            ],
            ordering: &[("recorded_at", "t.recorded_at")],
            default_ordering: &["-recorded_at"],
            nullable_refs: &[("recorded_by", "t.recorded_by_id")],
            read: CLINICAL,
            write: CLINICAL,
            audit_reads: false,
        };
        &SCHEMA
    }

    fn columns(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("health_record_id", entity::id(&self.health_record)),
            ("recorded_by_id", entity::opt_id(self.recorded_by.as_ref())),
            ("recorded_at", entity::opt_timestamp(self.recorded_at.as_ref())),
        ]
    }

    fn assign_actor(&mut self, actor: &Actor) {
        if self.recorded_by.is_none() {
            self.recorded_by = actor.user_id();
        }
    }

    fn derive(&mut self, now: DateTime<Utc>) {
        self.bmi = derived::bmi(self.height, self.weight);
        if self.recorded_at.is_none() {
            self.recorded_at = Some(now);
        }
    }

    fn carry_over(&mut self, previous: &Self) {
        self.recorded_at = previous.recorded_at;
    }

    fn validate(&self, v: &mut Validator<'_>, _previous: Option<&Self>) -> CoreResult<()> {
        v.reference("health_record", HealthRecord::TABLE, &self.health_record)?;
        v.optional_reference("recorded_by", User::TABLE, self.recorded_by.as_ref())?;
        v.range("oxygen_saturation", self.oxygen_saturation, 0, 100);
        v.range("pain_scale", self.pain_scale, 0, 10);
        v.digits("temperature", self.temperature, 4, 1);
        for (field, value) in [("height", self.height), ("weight", self.weight)] {
            v.check(
                value.map_or(true, |x| x > Decimal::ZERO),
                field,
                "Ensure this value is greater than 0.",
            );
            v.digits(field, value, 5, 2);
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Medication {
    pub health_record: RecordId,
    pub medication_name: NonEmptyText,
    #[serde(default)]
    pub generic_name: String,
    pub dosage_form: NonEmptyText,
    pub strength: NonEmptyText,
    pub dosage: NonEmptyText,
    pub frequency: NonEmptyText,
    pub route: NonEmptyText,
    #[serde(default)]
    pub duration: String,
    #[serde(default)]
    pub prescribed_by: Option<RecordId>,
    #[serde(default)]
    pub prescription_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub instructions: String,
    #[serde(default)]
    pub special_instructions: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub adverse_effects: String,
    #[serde(default)]
    pub is_discontinued: bool,
    #[serde(default)]
    pub discontinuation_reason: String,
    #[serde(default)]
    pub notes: String,
}

impl Entity for Medication {
    const TABLE: &'static str = "medications";
    const LABEL: &'static str = "Medication";

    fn schema() -> &'static EntitySchema {
        static SCHEMA: EntitySchema = EntitySchema {
            filters: &[
                Filter::exact("health_record", "t.health_record_id"),
                Filter::exact("patient", RECORD_PATIENT),
                Filter::exact("prescribed_by", "t.prescribed_by_id"),
                Filter::exact("route", "json_extract(t.body, '$.route')"),
                Filter::boolean("is_active", "t.is_active"),
                Filter::boolean("is_discontinued", "json_extract(t.body, '$.is_discontinued')"),
                Filter::date_from("prescription_date_after", "t.prescription_date"),
                Filter::date_to("prescription_date_before", "t.prescription_date"),
            ],
            search: &[
                "json_extract(t.body, '$.medication_name')",
                "json_extract(t.body, '$.generic_name')",
                "json_extract(t.body, '$.instructions')",
            ],
            ordering: &[
                ("prescription_date", "t.prescription_date"),
                ("medication_name", "json_extract(t.body, '$.medication_name')"),
                ("start_date", "json_extract(t.body, '$.start_date')"),
            ],
            default_ordering: &["-prescription_date"],
            nullable_refs: &[("prescribed_by", "t.prescribed_by_id")],
            read: CLINICAL,
            write: CLINICAL,
            audit_reads: false,
        };
        &SCHEMA
    }

    fn columns(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("health_record_id", entity::id(&self.health_record)),
            ("prescribed_by_id", entity::opt_id(self.prescribed_by.as_ref())),
            (
                "prescription_date",
                entity::opt_timestamp(self.prescription_date.as_ref()),
            ),
            ("is_active", entity::flag(self.is_active)),
        ]
    }

    fn assign_actor(&mut self, actor: &Actor) {
        if self.prescribed_by.is_none() {
            self.prescribed_by = actor.user_id();
        }
    }

    fn derive(&mut self, now: DateTime<Utc>) {
        if self.prescription_date.is_none() {
            self.prescription_date = Some(now);
        }
        if self.is_discontinued {
            self.is_active = false;
        }
    }

    fn carry_over(&mut self, previous: &Self) {
        self.prescription_date = previous.prescription_date;
    }

    fn validate(&self, v: &mut Validator<'_>, _previous: Option<&Self>) -> CoreResult<()> {
        v.reference("health_record", HealthRecord::TABLE, &self.health_record)?;
        v.optional_reference("prescribed_by", User::TABLE, self.prescribed_by.as_ref())?;
        v.not_before(
            "end_date",
            self.start_date.as_ref(),
            self.end_date.as_ref(),
            "End date cannot be before start date.",
        );
        v.check(
            !self.is_discontinued || !self.discontinuation_reason.trim().is_empty(),
            "discontinuation_reason",
            "A reason is required when a medication is discontinued.",
        );
        Ok(())
    }
}

/// One measured parameter of a laboratory test.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LabResult {
    pub parameter: NonEmptyText,
    pub value: String,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub reference_range: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LaboratoryTest {
    pub health_record: RecordId,
    pub test_name: NonEmptyText,
    pub test_category: NonEmptyText,
    #[serde(default)]
    pub test_code: String,
    #[serde(default)]
    pub ordered_by: Option<RecordId>,
    #[serde(default)]
    pub ordered_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub collection_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub result_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub results: Vec<LabResult>,
    #[serde(default)]
    pub is_abnormal: bool,
    #[serde(default)]
    pub interpretation: String,
    #[serde(default)]
    pub clinical_significance: String,
    #[serde(default)]
    pub is_verified: bool,
    #[serde(default)]
    pub verified_by: Option<RecordId>,
    #[serde(default)]
    pub verification_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub specimen_quality: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub attachments: Vec<String>,
}

impl Entity for LaboratoryTest {
    const TABLE: &'static str = "laboratory_tests";
    const LABEL: &'static str = "LaboratoryTest";

    fn schema() -> &'static EntitySchema {
        static SCHEMA: EntitySchema = EntitySchema {
            filters: &[
                Filter::exact("health_record", "t.health_record_id"),
                Filter::exact("patient", RECORD_PATIENT),
                Filter::exact("ordered_by", "t.ordered_by_id"),
                Filter::exact("verified_by", "t.verified_by_id"),
                Filter::exact("test_category", "json_extract(t.body, '$.test_category')"),
                Filter::boolean("is_abnormal", "json_extract(t.body, '$.is_abnormal')"),
                Filter::boolean("is_verified", "json_extract(t.body, '$.is_verified')"),
                Filter::date_from("ordered_date_after", "t.ordered_date"),
                Filter::date_to("ordered_date_before", "t.ordered_date"),
            ],
            search: &[
                "json_extract(t.body, '$.test_name')",
                "json_extract(t.body, '$.test_code')",
                "json_extract(t.body, '$.interpretation')",
            ],
            ordering: &[
                ("ordered_date", "t.ordered_date"),
                ("result_date", "json_extract(t.body, '$.result_date')"),
                ("test_name", "json_extract(t.body, '$.test_name')"),
            ],
            default_ordering: &["-ordered_date"],
            nullable_refs: &[
                ("ordered_by", "t.ordered_by_id"),
                ("verified_by", "t.verified_by_id"),
            ],
            read: CLINICAL,
            write: CLINICAL,
            audit_reads: false,
        };
        &SCHEMA
    }

    fn columns(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("health_record_id", entity::id(&self.health_record)),
            ("ordered_by_id", entity::opt_id(self.ordered_by.as_ref())),
            ("verified_by_id", entity::opt_id(self.verified_by.as_ref())),
            ("ordered_date", entity::opt_timestamp(self.ordered_date.as_ref())),
        ]
    }

    fn assign_actor(&mut self, actor: &Actor) {
        if self.ordered_by.is_none() {
            self.ordered_by = actor.user_id();
        }
    }

    fn derive(&mut self, now: DateTime<Utc>) {
        if self.ordered_date.is_none() {
            self.ordered_date = Some(now);
        }
        if self.is_verified && self.verification_date.is_none() {
            self.verification_date = Some(now);
        }
    }

    fn carry_over(&mut self, previous: &Self) {
        self.ordered_date = previous.ordered_date;
    }

    fn validate(&self, v: &mut Validator<'_>, _previous: Option<&Self>) -> CoreResult<()> {
        v.reference("health_record", HealthRecord::TABLE, &self.health_record)?;
        v.optional_reference("ordered_by", User::TABLE, self.ordered_by.as_ref())?;
        v.optional_reference("verified_by", User::TABLE, self.verified_by.as_ref())?;
        v.check(
            !self.is_verified || self.verified_by.is_some(),
            "verified_by",
            "A verified test must name the user who verified it.",
        );
        v.not_before(
            "result_date",
            self.collection_date.as_ref(),
            self.result_date.as_ref(),
            "Result date cannot be before the collection date.",
        );

        let mut seen = HashSet::new();
        let unique = self
            .results
            .iter()
            .all(|r| seen.insert(r.parameter.as_str().to_lowercase()));
        v.check(unique, "results", "Each result parameter may appear only once.");
        check_paths(v, "attachments", &self.attachments);
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImagingStudy {
    pub health_record: RecordId,
    pub study_type: NonEmptyText,
    pub body_part: NonEmptyText,
    pub study_description: NonEmptyText,
    #[serde(default)]
    pub ordered_by: Option<RecordId>,
    #[serde(default)]
    pub ordered_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub performed_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub reported_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub technique: String,
    #[serde(default)]
    pub contrast_used: bool,
    #[serde(default)]
    pub contrast_type: String,
    #[serde(default)]
    pub findings: String,
    #[serde(default)]
    pub impression: String,
    #[serde(default)]
    pub recommendations: String,
    #[serde(default)]
    pub radiologist: Option<RecordId>,
    #[serde(default)]
    pub radiation_dose: String,
    #[serde(default)]
    pub safety_checks: Vec<String>,
    #[serde(default)]
    pub image_files: Vec<String>,
    #[serde(default)]
    pub notes: String,
}

impl Entity for ImagingStudy {
    const TABLE: &'static str = "imaging_studies";
    const LABEL: &'static str = "ImagingStudy";

    fn schema() -> &'static EntitySchema {
        static SCHEMA: EntitySchema = EntitySchema {
            filters: &[
                Filter::exact("health_record", "t.health_record_id"),
                Filter::exact("patient", RECORD_PATIENT),
                Filter::exact("ordered_by", "t.ordered_by_id"),
                Filter::exact("radiologist", "t.radiologist_id"),
                Filter::exact("study_type", "json_extract(t.body, '$.study_type')"),
                Filter::exact("body_part", "json_extract(t.body, '$.body_part')"),
                Filter::boolean("contrast_used", "json_extract(t.body, '$.contrast_used')"),
                Filter::date_from("ordered_date_after", "t.ordered_date"),
                Filter::date_to("ordered_date_before", "t.ordered_date"),
            ],
            search: &[
                "json_extract(t.body, '$.study_description')",
                "json_extract(t.body, '$.findings')",
                "json_extract(t.body, '$.impression')",
            ],
            ordering: &[
                ("ordered_date", "t.ordered_date"),
                ("performed_date", "json_extract(t.body, '$.performed_date')"),
            ],
            default_ordering: &["-ordered_date"],
            nullable_refs: &[
                ("ordered_by", "t.ordered_by_id"),
                ("radiologist", "t.radiologist_id"),
            ],
            read: CLINICAL,
            write: CLINICAL,
            audit_reads: false,
        };
        &SCHEMA
    }

    fn columns(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("health_record_id", entity::id(&self.health_record)),
            ("ordered_by_id", entity::opt_id(self.ordered_by.as_ref())),
            ("radiologist_id", entity::opt_id(self.radiologist.as_ref())),
            ("ordered_date", entity::opt_timestamp(self.ordered_date.as_ref())),
        ]
    }

    fn assign_actor(&mut self, actor: &Actor) {
        if self.ordered_by.is_none() {
            self.ordered_by = actor.user_id();
        }
    }

    fn derive(&mut self, now: DateTime<Utc>) {
        if self.ordered_date.is_none() {
            self.ordered_date = Some(now);
        }
    }

    fn carry_over(&mut self, previous: &Self) {
        self.ordered_date = previous.ordered_date;
    }

    fn validate(&self, v: &mut Validator<'_>, _previous: Option<&Self>) -> CoreResult<()> {
        v.reference("health_record", HealthRecord::TABLE, &self.health_record)?;
        v.optional_reference("ordered_by", User::TABLE, self.ordered_by.as_ref())?;
        v.optional_reference("radiologist", User::TABLE, self.radiologist.as_ref())?;
        v.check(
            !self.contrast_used || !self.contrast_type.trim().is_empty(),
            "contrast_type",
            "Specify the contrast agent when contrast was used.",
        );
        v.not_before(
            "reported_date",
            self.performed_date.as_ref(),
            self.reported_date.as_ref(),
            "Report date cannot be before the study was performed.",
        );
        check_paths(v, "image_files", &self.image_files);
        Ok(())
    }
}

choices! {
    pub enum PlanType {
        Acute => "acute",
        Chronic => "chronic",
        Preventive => "preventive",
        Rehabilitation => "rehabilitation",
        Palliative => "palliative",
    }
}

choices! {
    pub enum PlanStatus {
        Active => "active",
        Completed => "completed",
        Discontinued => "discontinued",
        OnHold => "on_hold",
    }
}

impl Default for PlanStatus {
    fn default() -> Self {
        PlanStatus::Active
    }
}

/// A dated entry in a treatment plan's progress log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProgressNote {
    pub date: NaiveDate,
    pub note: NonEmptyText,
    #[serde(default)]
    pub author: Option<RecordId>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Milestone {
    pub title: NonEmptyText,
    #[serde(default)]
    pub target_date: Option<NaiveDate>,
    #[serde(default)]
    pub achieved: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TreatmentPlan {
    pub health_record: RecordId,
    pub plan_name: NonEmptyText,
    pub plan_type: PlanType,
    #[serde(default)]
    pub goals: Vec<String>,
    #[serde(default)]
    pub interventions: Vec<String>,
    #[serde(default)]
    pub expected_outcomes: String,
    #[serde(default)]
    pub timeline: String,
    #[serde(default)]
    pub primary_provider: Option<RecordId>,
    #[serde(default)]
    pub care_team: Vec<RecordId>,
    #[serde(default)]
    pub status: PlanStatus,
    #[serde(default)]
    pub progress_notes: Vec<ProgressNote>,
    #[serde(default)]
    pub milestones: Vec<Milestone>,
    #[serde(default)]
    pub effectiveness_rating: Option<u8>,
    #[serde(default)]
    pub patient_satisfaction: Option<u8>,
    #[serde(default)]
    pub notes: String,
}

impl Entity for TreatmentPlan {
    const TABLE: &'static str = "treatment_plans";
    const LABEL: &'static str = "TreatmentPlan";

    fn schema() -> &'static EntitySchema {
        static SCHEMA: EntitySchema = EntitySchema {
            filters: &[
                Filter::exact("health_record", "t.health_record_id"),
                Filter::exact("patient", RECORD_PATIENT),
                Filter::exact("primary_provider", "t.primary_provider_id"),
                Filter::exact("plan_type", "json_extract(t.body, '$.plan_type')"),
                Filter::exact("status", "t.status"),
            ],
            search: &[
                "json_extract(t.body, '$.plan_name')",
                "json_extract(t.body, '$.expected_outcomes')",
            ],
            ordering: &[
                ("created_at", "t.created_at"),
                ("plan_name", "json_extract(t.body, '$.plan_name')"),
                ("status", "t.status"),
            ],
            default_ordering: &["-created_at"],
            nullable_refs: &[("primary_provider", "t.primary_provider_id")],
            read: CLINICAL,
            write: CLINICAL,
            audit_reads: false,
        };
        &SCHEMA
    }

    fn columns(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("health_record_id", entity::id(&self.health_record)),
            (
                "primary_provider_id",
                entity::opt_id(self.primary_provider.as_ref()),
            ),
            ("status", entity::text(self.status.as_str())),
        ]
    }

    fn derive(&mut self, _now: DateTime<Utc>) {
        normalise_ids(&mut self.care_team);
        self.progress_notes.sort_by_key(|n| n.date);
    }

    fn validate(&self, v: &mut Validator<'_>, _previous: Option<&Self>) -> CoreResult<()> {
        v.reference("health_record", HealthRecord::TABLE, &self.health_record)?;
        v.optional_reference(
            "primary_provider",
            User::TABLE,
            self.primary_provider.as_ref(),
        )?;
        v.references("care_team", User::TABLE, &self.care_team)?;
        for note in &self.progress_notes {
            v.optional_reference("progress_notes", User::TABLE, note.author.as_ref())?;
        }
        v.range("effectiveness_rating", self.effectiveness_rating, 1, 5);
        v.range("patient_satisfaction", self.patient_satisfaction, 1, 5);
        Ok(())
    }
}
