//! Reference data: the location hierarchy, the facility directory and system settings.

use super::{blank_as_none, choices};
use crate::access::{Access, Actor, Capability};
use crate::entity::{self, Entity, EntitySchema, Filter};
use crate::validation::{normalise_tags, Validator, REQUIRED};
use crate::CoreResult;
use chrono::{DateTime, NaiveTime, Utc};
use opencare_types::{EmailAddress, NonEmptyText, PhoneNumber};
use opencare_uuid::RecordId;
use rusqlite::{params, OptionalExtension};
use rusqlite::types::Value;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Longest parent chain walked before a hierarchy is treated as cyclic.
const MAX_LOCATION_DEPTH: usize = 64;

choices! {
    /// Administrative level, largest first.
    pub enum LocationType {
        Country => "country",
        Region => "region",
        District => "district",
        Subcounty => "subcounty",
        Parish => "parish",
        Village => "village",
    }
}

impl LocationType {
    /// Position in the hierarchy; smaller is larger.
    pub fn rank(&self) -> usize {
        Self::ALL
            .iter()
            .position(|t| t == self)
            .unwrap_or(Self::ALL.len())
    }

    /// True if a location of this type may sit directly or indirectly inside `parent`.
    pub fn fits_under(&self, parent: LocationType) -> bool {
        parent.rank() < self.rank()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub name: NonEmptyText,
    pub location_type: LocationType,
    #[serde(default)]
    pub parent: Option<RecordId>,
    #[serde(default)]
    pub latitude: Option<Decimal>,
    #[serde(default)]
    pub longitude: Option<Decimal>,
}

impl Entity for Location {
    const TABLE: &'static str = "locations";
    const LABEL: &'static str = "Location";

    fn schema() -> &'static EntitySchema {
        static SCHEMA: EntitySchema = EntitySchema {
            filters: &[
                Filter::exact("location_type", "t.location_type"),
                Filter::exact("parent", "t.parent_id"),
            ],
            search: &["t.name"],
            ordering: &[("name", "t.name"), ("location_type", "t.location_type")],
            default_ordering: &["name"],
            nullable_refs: &[],
            read: Access::Authenticated,
            write: Access::Requires(Capability::Administer),
            audit_reads: false,
        };
        &SCHEMA
    }

    fn columns(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("name", entity::text(&self.name)),
            ("location_type", entity::text(self.location_type.as_str())),
            ("parent_id", entity::opt_id(self.parent.as_ref())),
        ]
    }

    fn validate(&self, v: &mut Validator<'_>, previous: Option<&Self>) -> CoreResult<()> {
        v.range(
            "latitude",
            self.latitude,
            Decimal::from(-90),
            Decimal::from(90),
        );
        v.range(
            "longitude",
            self.longitude,
            Decimal::from(-180),
            Decimal::from(180),
        );

        if let Some(parent) = &self.parent {
            if *parent == v.record_id() {
                v.error("parent", "A location cannot be its own parent.");
            } else if v.reference("parent", Self::TABLE, parent)? {
                check_ancestry(v, self.location_type, parent)?;
            }
        }

        if let Some(previous) = previous {
            if previous.location_type != self.location_type {
                check_children(v, self.location_type)?;
            }
        }
        Ok(())
    }
}

/// Walk the ancestors of a location, rejecting cycles and ancestors that are not larger.
fn check_ancestry(
    v: &mut Validator<'_>,
    location_type: LocationType,
    parent: &RecordId,
) -> CoreResult<()> {
    let mut current = Some(*parent);
    for _ in 0..MAX_LOCATION_DEPTH {
        let Some(id) = current else {
            return Ok(());
        };
        if id == v.record_id() {
            v.error("parent", "This parent would create a cycle in the location hierarchy.");
            return Ok(());
        }
        let row: Option<(String, Option<String>)> = v
            .conn()
            .query_row(
                "SELECT location_type, parent_id FROM locations WHERE id = ?1",
                params![id.to_string()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let Some((ancestor_type, next)) = row else {
            return Ok(());
        };
        if let Some(ancestor_type) = LocationType::from_wire(&ancestor_type) {
            if !location_type.fits_under(ancestor_type) {
                v.error(
                    "parent",
                    format!(
                        "A {} cannot be placed inside a {}.",
                        location_type, ancestor_type
                    ),
                );
                return Ok(());
            }
        }
        current = next.and_then(|raw| RecordId::parse(&raw).ok());
    }
    v.error("parent", "The location hierarchy is too deep.");
    Ok(())
}

/// After a type change, every existing child must still be smaller.
fn check_children(v: &mut Validator<'_>, location_type: LocationType) -> CoreResult<()> {
    let mut stmt = v
        .conn()
        .prepare("SELECT DISTINCT location_type FROM locations WHERE parent_id = ?1")?;
    let child_types = stmt
        .query_map(params![v.record_id().to_string()], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    drop(stmt);

    let blocked = child_types
        .iter()
        .filter_map(|raw| LocationType::from_wire(raw))
        .any(|child| !child.fits_under(location_type));
    if blocked {
        v.error(
            "location_type",
            format!("Existing child locations must be smaller than a {}.", location_type),
        );
    }
    Ok(())
}

choices! {
    pub enum FacilityType {
        Hospital => "hospital",
        HealthCenter => "health_center",
        Clinic => "clinic",
        Dispensary => "dispensary",
        Laboratory => "laboratory",
        Pharmacy => "pharmacy",
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HealthFacility {
    pub name: NonEmptyText,
    pub facility_type: FacilityType,
    pub location: RecordId,
    pub address: NonEmptyText,
    pub phone_number: PhoneNumber,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub email: Option<EmailAddress>,
    #[serde(default)]
    pub website: String,
    #[serde(default)]
    pub is_24_hours: bool,
    #[serde(default)]
    pub opening_time: Option<NaiveTime>,
    #[serde(default)]
    pub closing_time: Option<NaiveTime>,
    #[serde(default)]
    pub services_offered: Vec<String>,
    pub contact_person_name: NonEmptyText,
    pub contact_person_phone: NonEmptyText,
}

impl Entity for HealthFacility {
    const TABLE: &'static str = "health_facilities";
    const LABEL: &'static str = "HealthFacility";

    fn schema() -> &'static EntitySchema {
        static SCHEMA: EntitySchema = EntitySchema {
            filters: &[
                Filter::exact("facility_type", "t.facility_type"),
                Filter::exact("location", "t.location_id"),
                Filter::boolean("is_24_hours", "json_extract(t.body, '$.is_24_hours')"),
            ],
            search: &[
                "t.name",
                "json_extract(t.body, '$.address')",
                "(SELECT l.name FROM locations l WHERE l.id = t.location_id)",
            ],
            ordering: &[
                ("name", "t.name"),
                ("facility_type", "t.facility_type"),
                ("created_at", "t.created_at"),
            ],
            default_ordering: &["name"],
            nullable_refs: &[],
            read: Access::Authenticated,
            write: Access::Requires(Capability::Administer),
            audit_reads: false,
        };
        &SCHEMA
    }

    fn columns(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("name", entity::text(&self.name)),
            ("facility_type", entity::text(self.facility_type.as_str())),
            ("location_id", entity::id(&self.location)),
        ]
    }

    fn derive(&mut self, _now: DateTime<Utc>) {
        normalise_tags(&mut self.services_offered);
        self.website = self.website.trim().to_string();
    }

    fn validate(&self, v: &mut Validator<'_>, _previous: Option<&Self>) -> CoreResult<()> {
        v.reference("location", Location::TABLE, &self.location)?;

        if !self.website.is_empty()
            && !(self.website.starts_with("http://") || self.website.starts_with("https://"))
        {
            v.error("website", "Enter a valid URL.");
        }

        if !self.is_24_hours {
            match (self.opening_time, self.closing_time) {
                (Some(open), Some(close)) => v.check(
                    close > open,
                    "closing_time",
                    "Closing time must be after opening time.",
                ),
                (open, close) => {
                    v.check(open.is_some(), "opening_time", REQUIRED);
                    v.check(close.is_some(), "closing_time", REQUIRED);
                }
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SystemConfiguration {
    pub key: NonEmptyText,
    pub value: NonEmptyText,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub is_public: bool,
}

impl Entity for SystemConfiguration {
    const TABLE: &'static str = "system_configurations";
    const LABEL: &'static str = "SystemConfiguration";

    fn schema() -> &'static EntitySchema {
        static SCHEMA: EntitySchema = EntitySchema {
            filters: &[Filter::boolean("is_public", "t.is_public")],
            search: &["t.key", "json_extract(t.body, '$.description')"],
            ordering: &[("key", "t.key"), ("updated_at", "t.updated_at")],
            default_ordering: &["key"],
            nullable_refs: &[],
            read: Access::Authenticated,
            write: Access::Requires(Capability::Administer),
            audit_reads: false,
        };
        &SCHEMA
    }

    fn columns(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("key", entity::text(&self.key)),
            ("is_public", entity::flag(self.is_public)),
        ]
    }

    fn validate(&self, v: &mut Validator<'_>, _previous: Option<&Self>) -> CoreResult<()> {
        v.check(
            self.key.as_str().chars().count() <= 100,
            "key",
            "Ensure this field has no more than 100 characters.",
        );
        Ok(())
    }

    fn scope(actor: &Actor) -> Option<&'static str> {
        if actor.has(Capability::Administer) {
            None
        } else {
            Some("t.is_public = 1")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::ListQuery;
    use crate::test_support::Fixture;
    use crate::CoreError;
    use serde_json::json;
    use std::collections::BTreeSet;

    fn parent_error(err: CoreError) -> String {
        match err {
            CoreError::Validation(errors) => errors
                .get("parent")
                .map(|m| m.join(" "))
                .unwrap_or_else(|| panic!("expected parent error, got {errors}")),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_location_hierarchy_requires_larger_parent() {
        let fx = Fixture::new();
        let country = fx.create::<Location>(json!({ "name": "Uganda", "location_type": "country" }));
        let district = fx.create::<Location>(
            json!({ "name": "Gulu", "location_type": "district", "parent": country }),
        );

        let err = fx
            .repo::<Location>()
            .create_from_json(
                &fx.actor,
                json!({ "name": "Northern", "location_type": "region", "parent": district }),
            )
            .expect_err("a region cannot sit inside a district");
        assert!(parent_error(err).contains("region"));
    }

    #[test]
    fn test_location_rejects_cycles_and_self_parent() {
        let fx = Fixture::new();
        let repo = fx.repo::<Location>();
        let region = fx.create::<Location>(json!({ "name": "Northern", "location_type": "region" }));
        let district = fx.create::<Location>(
            json!({ "name": "Gulu", "location_type": "district", "parent": region }),
        );

        let err = repo
            .patch(&fx.actor, &region, json!({ "parent": region }))
            .expect_err("self parent");
        assert!(parent_error(err).contains("own parent"));

        let err = repo
            .patch(&fx.actor, &region, json!({ "parent": district }))
            .expect_err("cycle");
        assert!(!parent_error(err).is_empty());
    }

    #[test]
    fn test_location_type_change_checks_children() {
        let fx = Fixture::new();
        let region = fx.create::<Location>(json!({ "name": "Northern", "location_type": "region" }));
        fx.create::<Location>(json!({ "name": "Gulu", "location_type": "district", "parent": region }));

        let err = fx
            .repo::<Location>()
            .patch(&fx.actor, &region, json!({ "location_type": "village" }))
            .expect_err("children would be larger than their parent");
        assert!(matches!(err, CoreError::Validation(e) if e.contains("location_type")));
    }

    #[test]
    fn test_location_unique_per_parent_including_root() {
        let fx = Fixture::new();
        fx.create::<Location>(json!({ "name": "Uganda", "location_type": "country" }));
        let err = fx
            .repo::<Location>()
            .create_from_json(&fx.actor, json!({ "name": "Uganda", "location_type": "country" }))
            .expect_err("duplicate root location");
        assert!(matches!(err, CoreError::Conflict(_)));
    }

    #[test]
    fn test_location_in_use_cannot_be_deleted() {
        let fx = Fixture::new();
        let location = fx.location("Gulu");
        fx.facility("Gulu Clinic", location);
        let err = fx
            .repo::<Location>()
            .delete(&fx.actor, &location)
            .expect_err("referenced location");
        assert!(matches!(err, CoreError::Conflict(msg) if msg.contains("still referenced")));
    }

    #[test]
    fn test_facility_with_patients_cannot_be_deleted() {
        let fx = Fixture::new();
        let clinic = fx.clinic();
        let err = fx
            .repo::<HealthFacility>()
            .delete(&fx.actor, &clinic.facility)
            .expect_err("registered patients reference the facility");
        assert!(matches!(err, CoreError::Conflict(msg) if msg.contains("still referenced")));
        assert_eq!(fx.count("health_facilities"), 1);
    }

    #[test]
    fn test_facility_hours_required_unless_24h() {
        let fx = Fixture::new();
        let location = fx.location("Gulu");
        let err = fx
            .repo::<HealthFacility>()
            .create_from_json(
                &fx.actor,
                json!({
                    "name": "Lacor",
                    "facility_type": "hospital",
                    "location": location,
                    "address": "Lacor Road",
                    "phone_number": "+256700000003",
                    "opening_time": "17:00:00",
                    "closing_time": "08:00:00",
                    "website": "lacor.org",
                    "contact_person_name": "Dr Opio",
                    "contact_person_phone": "+256700000004",
                }),
            )
            .expect_err("closing before opening");
        match err {
            CoreError::Validation(errors) => {
                assert!(errors.contains("closing_time"));
                assert!(errors.contains("website"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_private_configuration_hidden_from_non_admins() {
        let fx = Fixture::new();
        let repo = fx.repo::<SystemConfiguration>();
        fx.create::<SystemConfiguration>(json!({ "key": "site_name", "value": "OpenCare", "is_public": true }));
        let secret =
            fx.create::<SystemConfiguration>(json!({ "key": "sms_api_key", "value": "s3cret" }));

        let nurse = Actor::new(
            RecordId::new(),
            "nurse",
            [Capability::ClinicalRecords].into_iter().collect::<BTreeSet<_>>(),
        );
        let page = repo.list(&nurse, &ListQuery::new()).expect("list");
        assert_eq!(page.count, 1);
        assert_eq!(page.results[0].record.key.as_str(), "site_name");
        assert!(matches!(repo.get(&nurse, &secret), Err(CoreError::NotFound { .. })));
        assert_eq!(repo.list(&fx.actor, &ListQuery::new()).expect("list").count, 2);
    }
}
