//! Input validation utilities.
//!
//! [`Validator`] collects field-level failures while an entity checks its references and
//! business rules inside the write transaction. [`decode`] turns client JSON into typed records,
//! reporting serde failures against the offending field.

use crate::error::{FieldErrors, NON_FIELD_ERRORS};
use crate::{CoreError, CoreResult};
use chrono::NaiveDate;
use opencare_uuid::RecordId;
use rust_decimal::Decimal;
use rusqlite::types::FromSql;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;

pub const REQUIRED: &str = "This field is required.";

/// Accumulates validation failures for one write.
pub struct Validator<'a> {
    conn: &'a Connection,
    record_id: RecordId,
    today: NaiveDate,
    errors: FieldErrors,
}

impl<'a> Validator<'a> {
    pub(crate) fn new(conn: &'a Connection, record_id: RecordId, today: NaiveDate) -> Self {
        Self {
            conn,
            record_id,
            today,
            errors: FieldErrors::new(),
        }
    }

    /// Identifier of the record being written (already allocated on create).
    pub fn record_id(&self) -> RecordId {
        self.record_id
    }

    pub fn today(&self) -> NaiveDate {
        self.today
    }

    pub fn conn(&self) -> &Connection {
        self.conn
    }

    pub fn error(&mut self, field: &str, message: impl Into<String>) {
        self.errors.add(field, message);
    }

    /// Record `message` against `field` unless `ok` holds.
    pub fn check(&mut self, ok: bool, field: &str, message: impl Into<String>) {
        if !ok {
            self.error(field, message);
        }
    }

    pub fn has_error(&self, field: &str) -> bool {
        self.errors.contains(field)
    }

    /// Verify that `id` exists in `table`, recording a field error if not.
    pub fn reference(&mut self, field: &str, table: &str, id: &RecordId) -> CoreResult<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                &format!("SELECT 1 FROM {} WHERE id = ?1", table),
                params![id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        if found.is_none() {
            self.error(field, missing_reference(id));
        }
        Ok(found.is_some())
    }

    pub fn optional_reference(
        &mut self,
        field: &str,
        table: &str,
        id: Option<&RecordId>,
    ) -> CoreResult<bool> {
        match id {
            Some(id) => self.reference(field, table, id),
            None => Ok(true),
        }
    }

    /// Verify every id in a set-valued reference.
    pub fn references(&mut self, field: &str, table: &str, ids: &[RecordId]) -> CoreResult<()> {
        for id in ids {
            self.reference(field, table, id)?;
        }
        Ok(())
    }

    /// Read one column of the row `id` in `table`. `None` if the row does not exist.
    pub fn column<T: FromSql>(
        &self,
        table: &str,
        column: &str,
        id: &RecordId,
    ) -> CoreResult<Option<T>> {
        Ok(self
            .conn
            .query_row(
                &format!("SELECT {} FROM {} WHERE id = ?1", column, table),
                params![id.to_string()],
                |row| row.get(0),
            )
            .optional()?)
    }

    /// Require that `id` names an existing row whose `is_active` flag is set.
    ///
    /// `label` names the referenced kind in the message, for example "Patient".
    pub fn active(
        &mut self,
        field: &str,
        table: &str,
        label: &str,
        id: &RecordId,
    ) -> CoreResult<bool> {
        match self.column::<bool>(table, "is_active", id)? {
            None => {
                self.error(field, missing_reference(id));
                Ok(false)
            }
            Some(false) => {
                self.error(field, format!("{} is not active.", label));
                Ok(false)
            }
            Some(true) => Ok(true),
        }
    }

    /// Check an optional value against an inclusive range.
    pub fn range<T>(&mut self, field: &str, value: Option<T>, min: T, max: T)
    where
        T: PartialOrd + std::fmt::Display + Copy,
    {
        if let Some(value) = value {
            if value < min || value > max {
                self.error(
                    field,
                    format!("Ensure this value is between {} and {}.", min, max),
                );
            }
        }
    }

    /// Bound an optional decimal to `max_digits` digits, `decimal_places` of them after the
    /// point.
    pub fn digits(
        &mut self,
        field: &str,
        value: Option<Decimal>,
        max_digits: u32,
        decimal_places: u32,
    ) {
        if let Some(message) = value.and_then(|x| digits_error(x, max_digits, decimal_places)) {
            self.error(field, message);
        }
    }

    /// Require `later >= earlier` when both are present.
    pub fn not_before<T: PartialOrd>(
        &mut self,
        field: &str,
        earlier: Option<&T>,
        later: Option<&T>,
        message: &str,
    ) {
        if let (Some(earlier), Some(later)) = (earlier, later) {
            if later < earlier {
                self.error(field, message);
            }
        }
    }

    /// Finish validation, failing with every collected error.
    pub fn finish(self) -> CoreResult<()> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(CoreError::Validation(self.errors))
        }
    }
}

/// Message for a decimal that does not fit `max_digits` / `decimal_places`, if any.
pub fn digits_error(value: Decimal, max_digits: u32, decimal_places: u32) -> Option<String> {
    let value = value.normalize();
    let places = value.scale();
    let digits = (value.mantissa().unsigned_abs().to_string().len() as u32).max(places);
    let whole = digits - places;
    if digits > max_digits {
        Some(format!(
            "Ensure that there are no more than {} digits in total.",
            max_digits
        ))
    } else if places > decimal_places {
        Some(format!(
            "Ensure that there are no more than {} decimal places.",
            decimal_places
        ))
    } else if whole > max_digits - decimal_places {
        Some(format!(
            "Ensure that there are no more than {} digits before the decimal point.",
            max_digits - decimal_places
        ))
    } else {
        None
    }
}

pub fn missing_reference(id: &RecordId) -> String {
    format!("Invalid pk \"{}\" - object does not exist.", id)
}

/// Deserialise client JSON into `T`, mapping serde failures onto field errors.
///
/// Missing fields are reported under their own name rather than the parent path.
pub fn decode<T: DeserializeOwned>(value: serde_json::Value) -> CoreResult<T> {
    serde_path_to_error::deserialize(value).map_err(|err| {
        let path = err.path().to_string();
        let message = err.inner().to_string();
        let (field, message) = describe_decode_error(&path, &message);
        CoreError::field(field, message)
    })
}

fn describe_decode_error(path: &str, message: &str) -> (String, String) {
    let field = if path.is_empty() || path == "." {
        NON_FIELD_ERRORS.to_string()
    } else {
        path.to_string()
    };

    if let Some(rest) = message.strip_prefix("missing field `") {
        let name = rest.split('`').next().unwrap_or(rest);
        let field = if field == NON_FIELD_ERRORS {
            name.to_string()
        } else {
            format!("{}.{}", field, name)
        };
        return (field, REQUIRED.to_string());
    }
    if let Some(rest) = message.strip_prefix("unknown variant `") {
        let variant = rest.split('`').next().unwrap_or(rest);
        return (field, format!("\"{}\" is not a valid choice.", variant));
    }
    if message.starts_with("invalid type: null") {
        return (field, "This field may not be null.".to_string());
    }
    (field, message.to_string())
}

/// Normalise a free-text tag set: trimmed, non-empty, de-duplicated and sorted.
pub fn normalise_tags(tags: &mut Vec<String>) {
    for tag in tags.iter_mut() {
        let trimmed = tag.trim();
        if trimmed.len() != tag.len() {
            *tag = trimmed.to_string();
        }
    }
    tags.retain(|tag| !tag.is_empty());
    tags.sort();
    tags.dedup();
}

/// Normalise a set of references: sorted and de-duplicated.
pub fn normalise_ids(ids: &mut Vec<RecordId>) {
    ids.sort();
    ids.dedup();
}

/// Validate a relative attachment path.
pub fn is_safe_relative_path(path: &str) -> bool {
    let trimmed = path.trim();
    !trimmed.is_empty()
        && !trimmed.starts_with('/')
        && !trimmed.starts_with('\\')
        && !trimmed.split(['/', '\\']).any(|segment| segment == "..")
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencare_types::NonEmptyText;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    #[allow(dead_code)]
    struct Sample {
        name: NonEmptyText,
        kind: SampleKind,
        #[serde(default)]
        count: u32,
    }

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "snake_case")]
    enum SampleKind {
        Clinic,
    }

    #[test]
    fn test_digits_error_bounds() {
        let dec = |s: &str| s.parse::<Decimal>().expect("valid decimal");
        assert_eq!(digits_error(dec("170.50"), 5, 2), None);
        assert_eq!(digits_error(dec("0.5"), 5, 2), None);
        assert_eq!(
            digits_error(dec("1700.5"), 5, 2).as_deref(),
            Some("Ensure that there are no more than 3 digits before the decimal point.")
        );
        assert_eq!(
            digits_error(dec("1.234"), 5, 2).as_deref(),
            Some("Ensure that there are no more than 2 decimal places.")
        );
        assert_eq!(
            digits_error(Decimal::MAX, 10, 2).as_deref(),
            Some("Ensure that there are no more than 10 digits in total.")
        );
    }

    #[test]
    fn test_decode_reports_missing_field_by_name() {
        let err = decode::<Sample>(serde_json::json!({ "kind": "clinic" }))
            .expect_err("name is required");
        match err {
            CoreError::Validation(errors) => {
                assert_eq!(errors.get("name"), Some(&[REQUIRED.to_string()][..]))
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_decode_reports_bad_choice_on_field() {
        let err = decode::<Sample>(serde_json::json!({ "name": "x", "kind": "spa" }))
            .expect_err("spa is not a kind");
        match err {
            CoreError::Validation(errors) => {
                let messages = errors.get("kind").expect("kind should have errors");
                assert_eq!(messages[0], "\"spa\" is not a valid choice.");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_decode_reports_blank_text_on_field() {
        let err = decode::<Sample>(serde_json::json!({ "name": "  ", "kind": "clinic" }))
            .expect_err("blank name should fail");
        assert!(matches!(err, CoreError::Validation(errors) if errors.contains("name")));
    }

    #[test]
    fn test_normalise_tags_dedupes_and_sorts() {
        let mut tags = vec![
            " penicillin ".to_string(),
            "latex".to_string(),
            "penicillin".to_string(),
            "".to_string(),
        ];
        normalise_tags(&mut tags);
        assert_eq!(tags, vec!["latex".to_string(), "penicillin".to_string()]);
    }

    #[test]
    fn test_safe_relative_paths() {
        assert!(is_safe_relative_path("scans/2024/chest.png"));
        assert!(!is_safe_relative_path("/etc/passwd"));
        assert!(!is_safe_relative_path("scans/../../secret"));
        assert!(!is_safe_relative_path("  "));
    }
}
