//! Bulk patient export and import in JSON or YAML.
//!
//! Import treats every row independently: each row is decoded, validated and written in its
//! own transaction, so a bad row is reported and skipped without touching its neighbours.

use crate::access::Actor;
use crate::entity::{Entity, Stored};
use crate::models::patients::Patient;
use crate::repository::Repository;
use crate::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterchangeFormat {
    #[default]
    Json,
    Yaml,
}

impl FromStr for InterchangeFormat {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(InterchangeFormat::Json),
            "yaml" | "yml" => Ok(InterchangeFormat::Yaml),
            other => Err(CoreError::field(
                "format",
                format!("\"{}\" is not a valid choice.", other),
            )),
        }
    }
}

impl InterchangeFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            InterchangeFormat::Json => "application/json",
            InterchangeFormat::Yaml => "application/yaml",
        }
    }
}

/// A row that could not be imported.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ImportFailure {
    /// Zero-based position in the submitted list.
    pub index: usize,
    pub patient_id: Option<String>,
    pub error: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ImportReport {
    pub created: usize,
    pub failed: Vec<ImportFailure>,
}

#[derive(Clone)]
pub struct PatientInterchange {
    patients: Repository<Patient>,
}

impl PatientInterchange {
    pub fn new(patients: Repository<Patient>) -> Self {
        Self { patients }
    }

    /// Serialise every patient visible to `actor`.
    pub fn export_patients(&self, actor: &Actor, format: InterchangeFormat) -> CoreResult<String> {
        let rows: Vec<Stored<Patient>> = self.patients.all(actor)?;
        match format {
            InterchangeFormat::Json => {
                serde_json::to_string_pretty(&rows).map_err(CoreError::Serialization)
            }
            InterchangeFormat::Yaml => {
                serde_yaml::to_string(&rows).map_err(CoreError::YamlSerialization)
            }
        }
    }

    /// Create one patient per element of the submitted list.
    ///
    /// # Errors
    ///
    /// Fails as a whole only when the actor may not create patients or `data` is not a list
    /// in the given format. Row failures are collected in the report.
    pub fn import_patients(
        &self,
        actor: &Actor,
        format: InterchangeFormat,
        data: &str,
    ) -> CoreResult<ImportReport> {
        Patient::schema().write.check(actor, "import", Patient::LABEL)?;
        let rows = parse_rows(format, data)?;

        let mut report = ImportReport::default();
        for (index, row) in rows.into_iter().enumerate() {
            let patient_id = row
                .get("patient_id")
                .and_then(Json::as_str)
                .map(str::to_string);
            match self.patients.create_from_json(actor, row) {
                Ok(_) => report.created += 1,
                Err(err) => {
                    let error = if err.is_client_error() {
                        err.to_string()
                    } else {
                        tracing::error!("patient import row {} failed: {:?}", index, err);
                        "The record could not be stored.".to_string()
                    };
                    report.failed.push(ImportFailure {
                        index,
                        patient_id,
                        error,
                    });
                }
            }
        }
        tracing::info!(
            "patient import by {}: {} created, {} failed",
            actor.username(),
            report.created,
            report.failed.len()
        );
        Ok(report)
    }
}

fn parse_rows(format: InterchangeFormat, data: &str) -> CoreResult<Vec<Json>> {
    let value: Json = match format {
        InterchangeFormat::Json => serde_json::from_str(data)
            .map_err(|e| CoreError::field("data", format!("Invalid JSON: {}", e)))?,
        InterchangeFormat::Yaml => serde_yaml::from_str(data)
            .map_err(|e| CoreError::field("data", format!("Invalid YAML: {}", e)))?,
    };
    match value {
        Json::Array(rows) => Ok(rows),
        _ => Err(CoreError::field(
            "data",
            "Expected a list of patient records.",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{patient_json, Fixture};

    #[test]
    fn test_format_parsing() {
        assert_eq!("JSON".parse::<InterchangeFormat>().ok(), Some(InterchangeFormat::Json));
        assert_eq!("yml".parse::<InterchangeFormat>().ok(), Some(InterchangeFormat::Yaml));
        assert!("csv".parse::<InterchangeFormat>().is_err());
    }

    #[test]
    fn test_import_reports_each_row_independently() {
        let fx = Fixture::new();
        let location = fx.location("Hoima");
        let facility = fx.facility("Hoima RRH", location);
        let service = PatientInterchange::new(fx.repo::<Patient>());

        let mut bad = patient_json("P-0002", location, facility);
        bad["gender"] = serde_json::json!("X");
        let rows = serde_json::json!([
            patient_json("P-0001", location, facility),
            bad,
            patient_json("P-0001", location, facility),
            patient_json("P-0003", location, facility),
        ]);

        let report = service
            .import_patients(&fx.actor, InterchangeFormat::Json, &rows.to_string())
            .expect("import should run");
        assert_eq!(report.created, 2);
        let failed: Vec<_> = report
            .failed
            .iter()
            .map(|f| (f.index, f.patient_id.as_deref()))
            .collect();
        assert_eq!(failed, vec![(1, Some("P-0002")), (2, Some("P-0001"))]);
        assert_eq!(fx.count("patients"), 2);
    }

    #[test]
    fn test_yaml_export_then_import_elsewhere() {
        let fx = Fixture::new();
        let clinic = fx.clinic();
        let service = PatientInterchange::new(fx.repo::<Patient>());
        let exported = service
            .export_patients(&fx.actor, InterchangeFormat::Yaml)
            .expect("export");
        assert!(exported.contains("patient_id: P-0001"));

        fx.repo::<Patient>()
            .delete(&fx.actor, &clinic.patient)
            .expect("delete");
        let report = service
            .import_patients(&fx.actor, InterchangeFormat::Yaml, &exported)
            .expect("import");
        assert_eq!(report.created, 1);
        assert!(report.failed.is_empty());
    }

    #[test]
    fn test_import_rejects_non_list() {
        let fx = Fixture::new();
        let service = PatientInterchange::new(fx.repo::<Patient>());
        let err = service
            .import_patients(&fx.actor, InterchangeFormat::Json, "{\"patient_id\": \"P-1\"}")
            .expect_err("not a list");
        assert!(matches!(err, CoreError::Validation(e) if e.contains("data")));
    }
}
