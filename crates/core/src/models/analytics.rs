//! Aggregate health metrics, outbreaks, reports and per-patient analytics.

use super::choices;
use crate::access::{Access, Actor, Capability};
use crate::entity::{self, Entity, EntitySchema, Filter};
use crate::models::patients::Patient;
use crate::models::reference::{HealthFacility, Location};
use crate::models::users::User;
use crate::validation::{normalise_ids, Validator};
use crate::CoreResult;
use chrono::{DateTime, NaiveDate, Utc};
use opencare_types::NonEmptyText;
use opencare_uuid::RecordId;
use rust_decimal::Decimal;
use rusqlite::types::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

choices! {
    pub enum MetricType {
        PatientCount => "patient_count",
        VisitCount => "visit_count",
        DiseasePrevalence => "disease_prevalence",
        MortalityRate => "mortality_rate",
        BirthRate => "birth_rate",
        VaccinationRate => "vaccination_rate",
        TreatmentSuccess => "treatment_success",
        WaitTime => "wait_time",
    }
}

choices! {
    pub enum MetricPeriod {
        Daily => "daily",
        Weekly => "weekly",
        Monthly => "monthly",
        Quarterly => "quarterly",
        Yearly => "yearly",
    }
}

/// One measured value at a (type, location, facility, date, period) coordinate.
///
/// Location and facility are both optional; a metric with neither is system-wide. The
/// coordinate is unique with an absent location or facility compared like any other value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HealthMetrics {
    pub metric_type: MetricType,
    pub value: Decimal,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub location: Option<RecordId>,
    #[serde(default)]
    pub facility: Option<RecordId>,
    pub date: NaiveDate,
    pub period: MetricPeriod,
}

impl Entity for HealthMetrics {
    const TABLE: &'static str = "health_metrics";
    const LABEL: &'static str = "HealthMetrics";

    fn schema() -> &'static EntitySchema {
        static SCHEMA: EntitySchema = EntitySchema {
            filters: &[
                Filter::exact("metric_type", "t.metric_type"),
                Filter::exact("location", "t.location_id"),
                Filter::exact("facility", "t.facility_id"),
                Filter::exact("period", "t.period"),
                Filter::date_from("date_after", "t.date"),
                Filter::date_to("date_before", "t.date"),
            ],
            search: &[
                "t.metric_type",
                "(SELECT l.name FROM locations l WHERE l.id = t.location_id)",
                "(SELECT f.name FROM health_facilities f WHERE f.id = t.facility_id)",
            ],
            ordering: &[
                ("date", "t.date"),
                ("metric_type", "t.metric_type"),
                ("value", "CAST(json_extract(t.body, '$.value') AS REAL)"),
            ],
            default_ordering: &["-date", "metric_type"],
            nullable_refs: &[],
            read: Access::Authenticated,
            write: Access::Requires(Capability::Administer),
            audit_reads: false,
        };
        &SCHEMA
    }

    fn columns(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("metric_type", entity::text(self.metric_type.as_str())),
            ("location_id", entity::opt_id(self.location.as_ref())),
            ("facility_id", entity::opt_id(self.facility.as_ref())),
            ("date", entity::date(&self.date)),
            ("period", entity::text(self.period.as_str())),
        ]
    }

    fn validate(&self, v: &mut Validator<'_>, _previous: Option<&Self>) -> CoreResult<()> {
        v.optional_reference("location", Location::TABLE, self.location.as_ref())?;
        v.optional_reference("facility", HealthFacility::TABLE, self.facility.as_ref())?;
        Ok(())
    }
}

choices! {
    pub enum OutbreakSeverity {
        Low => "low",
        Medium => "medium",
        High => "high",
        Critical => "critical",
    }
}

choices! {
    pub enum OutbreakStatus {
        Active => "active",
        Contained => "contained",
        Resolved => "resolved",
    }
}

impl Default for OutbreakStatus {
    fn default() -> Self {
        OutbreakStatus::Active
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DiseaseOutbreak {
    pub disease_name: NonEmptyText,
    pub location: RecordId,
    pub start_date: NaiveDate,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    pub severity: OutbreakSeverity,
    #[serde(default)]
    pub status: OutbreakStatus,
    #[serde(default)]
    pub total_cases: u32,
    #[serde(default)]
    pub active_cases: u32,
    #[serde(default)]
    pub recovered_cases: u32,
    #[serde(default)]
    pub fatal_cases: u32,
    #[serde(default)]
    pub response_measures: Vec<String>,
    #[serde(default)]
    pub affected_facilities: Vec<RecordId>,
    #[serde(default)]
    pub notes: String,
}

impl Entity for DiseaseOutbreak {
    const TABLE: &'static str = "disease_outbreaks";
    const LABEL: &'static str = "DiseaseOutbreak";

    fn schema() -> &'static EntitySchema {
        static SCHEMA: EntitySchema = EntitySchema {
            filters: &[
                Filter::exact("location", "t.location_id"),
                Filter::exact("status", "t.status"),
                Filter::exact("severity", "json_extract(t.body, '$.severity')"),
                Filter::contains("disease_name", "json_extract(t.body, '$.disease_name')"),
                Filter::date_from("start_date_after", "t.start_date"),
                Filter::date_to("start_date_before", "t.start_date"),
            ],
            search: &[
                "json_extract(t.body, '$.disease_name')",
                "(SELECT l.name FROM locations l WHERE l.id = t.location_id)",
            ],
            ordering: &[
                ("start_date", "t.start_date"),
                ("total_cases", "json_extract(t.body, '$.total_cases')"),
            ],
            default_ordering: &["-start_date"],
            nullable_refs: &[],
            read: Access::Authenticated,
            write: Access::Requires(Capability::Administer),
            audit_reads: false,
        };
        &SCHEMA
    }

    fn columns(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("location_id", entity::id(&self.location)),
            ("start_date", entity::date(&self.start_date)),
            ("status", entity::text(self.status.as_str())),
        ]
    }

    fn derive(&mut self, _now: DateTime<Utc>) {
        normalise_ids(&mut self.affected_facilities);
    }

    fn validate(&self, v: &mut Validator<'_>, _previous: Option<&Self>) -> CoreResult<()> {
        v.reference("location", Location::TABLE, &self.location)?;
        v.references(
            "affected_facilities",
            HealthFacility::TABLE,
            &self.affected_facilities,
        )?;
        v.not_before(
            "end_date",
            Some(&self.start_date),
            self.end_date.as_ref(),
            "End date cannot be before start date.",
        );
        let accounted = u64::from(self.active_cases)
            + u64::from(self.recovered_cases)
            + u64::from(self.fatal_cases);
        v.check(
            accounted <= u64::from(self.total_cases),
            "total_cases",
            "Active, recovered and fatal cases cannot exceed the total.",
        );
        Ok(())
    }
}

choices! {
    pub enum ReportType {
        Daily => "daily",
        Weekly => "weekly",
        Monthly => "monthly",
        Quarterly => "quarterly",
        Annual => "annual",
        Incident => "incident",
        Outbreak => "outbreak",
    }
}

/// A titled block of report content with optional named figures.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReportSection {
    pub title: NonEmptyText,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub figures: BTreeMap<String, Decimal>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub report_type: ReportType,
    pub title: NonEmptyText,
    #[serde(default)]
    pub description: String,
    /// The user who generated the report; set by the server.
    #[serde(default)]
    pub generated_by: Option<RecordId>,
    #[serde(default)]
    pub facility: Option<RecordId>,
    #[serde(default)]
    pub location: Option<RecordId>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default)]
    pub content: Vec<ReportSection>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub recommendations: String,
}

impl Entity for HealthReport {
    const TABLE: &'static str = "health_reports";
    const LABEL: &'static str = "HealthReport";

    fn schema() -> &'static EntitySchema {
        static SCHEMA: EntitySchema = EntitySchema {
            filters: &[
                Filter::exact("report_type", "t.report_type"),
                Filter::exact("facility", "t.facility_id"),
                Filter::exact("location", "t.location_id"),
                Filter::exact("generated_by", "t.generated_by_id"),
                Filter::date_from("start_date_after", "json_extract(t.body, '$.start_date')"),
                Filter::date_to("end_date_before", "json_extract(t.body, '$.end_date')"),
            ],
            search: &[
                "json_extract(t.body, '$.title')",
                "json_extract(t.body, '$.summary')",
            ],
            ordering: &[
                ("created_at", "t.created_at"),
                ("start_date", "json_extract(t.body, '$.start_date')"),
                ("title", "json_extract(t.body, '$.title')"),
            ],
            default_ordering: &["-created_at"],
            nullable_refs: &[("generated_by", "t.generated_by_id")],
            read: Access::Authenticated,
            write: Access::Requires(Capability::Administer),
            audit_reads: false,
        };
        &SCHEMA
    }

    fn columns(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("generated_by_id", entity::opt_id(self.generated_by.as_ref())),
            ("facility_id", entity::opt_id(self.facility.as_ref())),
            ("location_id", entity::opt_id(self.location.as_ref())),
            ("report_type", entity::text(self.report_type.as_str())),
        ]
    }

    fn assign_actor(&mut self, actor: &Actor) {
        self.generated_by = actor.user_id();
    }

    fn carry_over(&mut self, previous: &Self) {
        self.generated_by = previous.generated_by;
    }

    fn validate(&self, v: &mut Validator<'_>, _previous: Option<&Self>) -> CoreResult<()> {
        v.optional_reference("generated_by", User::TABLE, self.generated_by.as_ref())?;
        v.optional_reference("facility", HealthFacility::TABLE, self.facility.as_ref())?;
        v.optional_reference("location", Location::TABLE, self.location.as_ref())?;
        v.not_before(
            "end_date",
            Some(&self.start_date),
            Some(&self.end_date),
            "End date cannot be before start date.",
        );
        Ok(())
    }
}

choices! {
    pub enum HealthTrend {
        Improving => "improving",
        Stable => "stable",
        Declining => "declining",
        Critical => "critical",
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PatientAnalytics {
    pub patient: RecordId,
    pub analysis_date: NaiveDate,
    #[serde(default)]
    pub risk_score: Option<Decimal>,
    #[serde(default)]
    pub health_trend: Option<HealthTrend>,
    #[serde(default)]
    pub visit_frequency: u32,
    #[serde(default)]
    pub last_visit_date: Option<NaiveDate>,
    #[serde(default)]
    pub next_scheduled_visit: Option<NaiveDate>,
    /// Percentage, 0 to 100.
    #[serde(default)]
    pub treatment_compliance: Option<Decimal>,
    /// Percentage, 0 to 100.
    #[serde(default)]
    pub medication_adherence: Option<Decimal>,
    #[serde(default)]
    pub predicted_health_issues: Vec<String>,
    #[serde(default)]
    pub recommended_actions: Vec<String>,
    #[serde(default)]
    pub notes: String,
}

impl Entity for PatientAnalytics {
    const TABLE: &'static str = "patient_analytics";
    const LABEL: &'static str = "PatientAnalytics";

    fn schema() -> &'static EntitySchema {
        static SCHEMA: EntitySchema = EntitySchema {
            filters: &[
                Filter::exact("patient", "t.patient_id"),
                Filter::exact("health_trend", "json_extract(t.body, '$.health_trend')"),
                Filter::date_from("analysis_date_after", "t.analysis_date"),
                Filter::date_to("analysis_date_before", "t.analysis_date"),
            ],
            search: &[
                "(SELECT p.patient_id || ' ' || json_extract(p.body, '$.first_name') || ' ' || p.last_name FROM patients p WHERE p.id = t.patient_id)",
            ],
            ordering: &[
                ("analysis_date", "t.analysis_date"),
                ("risk_score", "CAST(json_extract(t.body, '$.risk_score') AS REAL)"),
            ],
            default_ordering: &["-analysis_date"],
            nullable_refs: &[],
            read: Access::Requires(Capability::ClinicalRecords),
            write: Access::Requires(Capability::ClinicalRecords),
            audit_reads: false,
        };
        &SCHEMA
    }

    fn columns(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("patient_id", entity::id(&self.patient)),
            ("analysis_date", entity::date(&self.analysis_date)),
        ]
    }

    fn validate(&self, v: &mut Validator<'_>, _previous: Option<&Self>) -> CoreResult<()> {
        v.reference("patient", Patient::TABLE, &self.patient)?;
        let hundred = Decimal::ONE_HUNDRED;
        v.range("treatment_compliance", self.treatment_compliance, Decimal::ZERO, hundred);
        v.range("medication_adherence", self.medication_adherence, Decimal::ZERO, hundred);
        v.not_before(
            "next_scheduled_visit",
            self.last_visit_date.as_ref(),
            self.next_scheduled_visit.as_ref(),
            "The next visit cannot be before the last visit.",
        );
        Ok(())
    }
}
