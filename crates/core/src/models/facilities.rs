//! Facility operations: services, staff, equipment, inventory and opening schedules.

use super::{choices, default_true};
use crate::access::{Access, Capability};
use crate::derived;
use crate::entity::{self, Entity, EntitySchema, Filter};
use crate::models::reference::HealthFacility;
use crate::models::users::User;
use crate::validation::{missing_reference, normalise_ids, normalise_tags, Validator};
use crate::CoreResult;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use opencare_types::NonEmptyText;
use opencare_uuid::RecordId;
use rust_decimal::Decimal;
use rusqlite::types::Value;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};

const ADMIN: Access = Access::Requires(Capability::Administer);

/// Require that the row `id` in `table` belongs to `facility`.
fn same_facility(
    v: &mut Validator<'_>,
    field: &str,
    table: &str,
    id: &RecordId,
    facility: &RecordId,
) -> CoreResult<()> {
    match v.column::<String>(table, "facility_id", id)? {
        None => v.error(field, missing_reference(id)),
        Some(owner) if owner != facility.to_string() => {
            v.error(field, "Must belong to the same facility.")
        }
        Some(_) => {}
    }
    Ok(())
}

/// A non-negative amount with two decimal places and at most `max_digits` digits.
fn money(v: &mut Validator<'_>, field: &str, amount: Option<Decimal>, max_digits: u32) {
    v.check(
        amount.map_or(true, |a| a >= Decimal::ZERO),
        field,
        "Ensure this value is greater than or equal to 0.",
    );
    v.digits(field, amount, max_digits, 2);
}

choices! {
    pub enum ServiceCategory {
        PrimaryCare => "primary_care",
        EmergencyCare => "emergency_care",
        SpecializedCare => "specialized_care",
        Diagnostic => "diagnostic",
        Pharmacy => "pharmacy",
        Laboratory => "laboratory",
        Maternity => "maternity",
        Pediatric => "pediatric",
        MentalHealth => "mental_health",
        Rehabilitation => "rehabilitation",
    }
}

fn default_staff_count() -> u32 {
    1
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FacilityService {
    pub facility: RecordId,
    pub name: NonEmptyText,
    pub category: ServiceCategory,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_true")]
    pub is_available: bool,
    #[serde(default)]
    pub cost: Option<Decimal>,
    #[serde(default)]
    pub duration_minutes: Option<u32>,
    #[serde(default)]
    pub requirements: String,
    #[serde(default = "default_staff_count")]
    pub required_staff_count: u32,
    #[serde(default)]
    pub required_qualifications: Vec<String>,
}

impl Entity for FacilityService {
    const TABLE: &'static str = "facility_services";
    const LABEL: &'static str = "FacilityService";

    fn schema() -> &'static EntitySchema {
        static SCHEMA: EntitySchema = EntitySchema {
            filters: &[
                Filter::exact("facility", "t.facility_id"),
                Filter::exact("category", "t.category"),
                Filter::boolean("is_available", "json_extract(t.body, '$.is_available')"),
            ],
            search: &["t.name", "json_extract(t.body, '$.description')"],
            ordering: &[
                ("category", "t.category"),
                ("name", "t.name"),
                ("cost", "CAST(json_extract(t.body, '$.cost') AS REAL)"),
            ],
            default_ordering: &["category", "name"],
            nullable_refs: &[],
            read: Access::Authenticated,
            write: ADMIN,
            audit_reads: false,
        };
        &SCHEMA
    }

    fn columns(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("facility_id", entity::id(&self.facility)),
            ("name", entity::text(&self.name)),
            ("category", entity::text(self.category.as_str())),
        ]
    }

    fn derive(&mut self, _now: DateTime<Utc>) {
        normalise_tags(&mut self.required_qualifications);
    }

    fn validate(&self, v: &mut Validator<'_>, _previous: Option<&Self>) -> CoreResult<()> {
        v.reference("facility", HealthFacility::TABLE, &self.facility)?;
        money(v, "cost", self.cost, 10);
        v.check(
            self.duration_minutes != Some(0),
            "duration_minutes",
            "Ensure this value is greater than 0.",
        );
        Ok(())
    }
}

choices! {
    pub enum EmploymentType {
        FullTime => "full_time",
        PartTime => "part_time",
        Contract => "contract",
        Volunteer => "volunteer",
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FacilityStaff {
    pub staff: RecordId,
    pub facility: RecordId,
    pub position: NonEmptyText,
    #[serde(default)]
    pub department: String,
    pub employment_type: EmploymentType,
    #[serde(default = "default_true")]
    pub is_active: bool,
    pub hire_date: NaiveDate,
    #[serde(default)]
    pub termination_date: Option<NaiveDate>,
    /// Another staff row at the same facility.
    #[serde(default)]
    pub supervisor: Option<RecordId>,
    #[serde(default)]
    pub notes: String,
}

impl Entity for FacilityStaff {
    const TABLE: &'static str = "facility_staff";
    const LABEL: &'static str = "FacilityStaff";

    fn schema() -> &'static EntitySchema {
        static SCHEMA: EntitySchema = EntitySchema {
            filters: &[
                Filter::exact("facility", "t.facility_id"),
                Filter::exact("staff", "t.staff_id"),
                Filter::exact("supervisor", "t.supervisor_id"),
                Filter::exact("employment_type", "json_extract(t.body, '$.employment_type')"),
                Filter::exact("department", "json_extract(t.body, '$.department')"),
                Filter::boolean("is_active", "t.is_active"),
            ],
            search: &[
                "json_extract(t.body, '$.position')",
                "json_extract(t.body, '$.department')",
                "(SELECT u.username || ' ' || json_extract(u.body, '$.first_name') || ' ' || u.last_name FROM users u WHERE u.id = t.staff_id)",
            ],
            ordering: &[
                ("department", "json_extract(t.body, '$.department')"),
                ("position", "json_extract(t.body, '$.position')"),
                ("hire_date", "json_extract(t.body, '$.hire_date')"),
            ],
            default_ordering: &["department", "position"],
            nullable_refs: &[("supervisor", "t.supervisor_id")],
            read: Access::Authenticated,
            write: ADMIN,
            audit_reads: false,
        };
        &SCHEMA
    }

    fn columns(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("staff_id", entity::id(&self.staff)),
            ("facility_id", entity::id(&self.facility)),
            ("supervisor_id", entity::opt_id(self.supervisor.as_ref())),
            ("is_active", entity::flag(self.is_active)),
        ]
    }

    fn validate(&self, v: &mut Validator<'_>, _previous: Option<&Self>) -> CoreResult<()> {
        v.reference("staff", User::TABLE, &self.staff)?;
        v.reference("facility", HealthFacility::TABLE, &self.facility)?;
        v.not_before(
            "termination_date",
            Some(&self.hire_date),
            self.termination_date.as_ref(),
            "Termination date cannot be before the hire date.",
        );
        if let Some(supervisor) = &self.supervisor {
            if *supervisor == v.record_id() {
                v.error("supervisor", "A staff member cannot supervise themselves.");
            } else {
                same_facility(v, "supervisor", Self::TABLE, supervisor, &self.facility)?;
            }
        }
        Ok(())
    }
}

choices! {
    pub enum EquipmentStatus {
        Operational => "operational",
        Maintenance => "maintenance",
        Repair => "repair",
        OutOfOrder => "out_of_order",
        Retired => "retired",
    }
}

impl Default for EquipmentStatus {
    fn default() -> Self {
        EquipmentStatus::Operational
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FacilityEquipment {
    pub facility: RecordId,
    pub name: NonEmptyText,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub serial_number: String,
    pub category: NonEmptyText,
    #[serde(default)]
    pub manufacturer: String,
    #[serde(default)]
    pub purchase_date: Option<NaiveDate>,
    #[serde(default)]
    pub warranty_expiry: Option<NaiveDate>,
    #[serde(default)]
    pub status: EquipmentStatus,
    #[serde(default)]
    pub last_maintenance: Option<NaiveDate>,
    #[serde(default)]
    pub next_maintenance: Option<NaiveDate>,
    #[serde(default)]
    pub location_in_facility: String,
    #[serde(default)]
    pub assigned_to: Option<RecordId>,
    #[serde(default)]
    pub purchase_cost: Option<Decimal>,
    #[serde(default)]
    pub maintenance_cost: Decimal,
    #[serde(default)]
    pub notes: String,
}

impl Entity for FacilityEquipment {
    const TABLE: &'static str = "facility_equipment";
    const LABEL: &'static str = "FacilityEquipment";

    fn schema() -> &'static EntitySchema {
        static SCHEMA: EntitySchema = EntitySchema {
            filters: &[
                Filter::exact("facility", "t.facility_id"),
                Filter::exact("status", "t.status"),
                Filter::exact("category", "json_extract(t.body, '$.category')"),
                Filter::exact("assigned_to", "t.assigned_to_id"),
                Filter::date_to("next_maintenance_before", "json_extract(t.body, '$.next_maintenance')"),
            ],
            search: &[
                "json_extract(t.body, '$.name')",
                "json_extract(t.body, '$.serial_number')",
                "json_extract(t.body, '$.manufacturer')",
            ],
            ordering: &[
                ("category", "json_extract(t.body, '$.category')"),
                ("name", "json_extract(t.body, '$.name')"),
                ("next_maintenance", "json_extract(t.body, '$.next_maintenance')"),
            ],
            default_ordering: &["category", "name"],
            nullable_refs: &[("assigned_to", "t.assigned_to_id")],
            read: Access::Authenticated,
            write: ADMIN,
            audit_reads: false,
        };
        &SCHEMA
    }

    fn columns(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("facility_id", entity::id(&self.facility)),
            ("assigned_to_id", entity::opt_id(self.assigned_to.as_ref())),
            ("status", entity::text(self.status.as_str())),
        ]
    }

    fn validate(&self, v: &mut Validator<'_>, _previous: Option<&Self>) -> CoreResult<()> {
        v.reference("facility", HealthFacility::TABLE, &self.facility)?;
        if let Some(assignee) = &self.assigned_to {
            same_facility(v, "assigned_to", FacilityStaff::TABLE, assignee, &self.facility)?;
        }
        v.not_before(
            "warranty_expiry",
            self.purchase_date.as_ref(),
            self.warranty_expiry.as_ref(),
            "Warranty expiry cannot be before the purchase date.",
        );
        v.not_before(
            "next_maintenance",
            self.last_maintenance.as_ref(),
            self.next_maintenance.as_ref(),
            "Next maintenance cannot be before the last maintenance.",
        );
        money(v, "purchase_cost", self.purchase_cost, 12);
        money(v, "maintenance_cost", Some(self.maintenance_cost), 10);
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FacilityInventory {
    pub facility: RecordId,
    pub item_name: NonEmptyText,
    pub category: NonEmptyText,
    #[serde(default)]
    pub current_quantity: u32,
    #[serde(default)]
    pub minimum_quantity: u32,
    pub unit: NonEmptyText,
    #[serde(default)]
    pub supplier: String,
    #[serde(default)]
    pub batch_number: String,
    #[serde(default)]
    pub expiry_date: Option<NaiveDate>,
    #[serde(default)]
    pub unit_cost: Option<Decimal>,
    /// Unit cost times current quantity, recomputed on every save.
    #[serde(default)]
    pub total_value: Option<Decimal>,
    #[serde(default)]
    pub storage_location: String,
    #[serde(default)]
    pub notes: String,
}

impl FacilityInventory {
    /// Stock has fallen to or under the reorder level.
    pub fn below_minimum(&self) -> bool {
        self.current_quantity <= self.minimum_quantity
    }
}

impl Entity for FacilityInventory {
    const TABLE: &'static str = "facility_inventory";
    const LABEL: &'static str = "FacilityInventory";

    fn schema() -> &'static EntitySchema {
        static SCHEMA: EntitySchema = EntitySchema {
            filters: &[
                Filter::exact("facility", "t.facility_id"),
                Filter::exact("category", "json_extract(t.body, '$.category')"),
                Filter::exact("batch_number", "t.batch_number"),
                Filter::boolean("low_stock", "(t.current_quantity <= t.minimum_quantity)"),
                Filter::date_to("expiry_date_before", "json_extract(t.body, '$.expiry_date')"),
                Filter::date_from("expiry_date_after", "json_extract(t.body, '$.expiry_date')"),
            ],
            search: &[
                "t.item_name",
                "json_extract(t.body, '$.supplier')",
                "t.batch_number",
            ],
            ordering: &[
                ("item_name", "t.item_name"),
                ("current_quantity", "t.current_quantity"),
                ("expiry_date", "json_extract(t.body, '$.expiry_date')"),
                ("category", "json_extract(t.body, '$.category')"),
            ],
            default_ordering: &["category", "item_name"],
            nullable_refs: &[],
            read: Access::Authenticated,
            write: ADMIN,
            audit_reads: false,
        };
        &SCHEMA
    }

    fn columns(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("facility_id", entity::id(&self.facility)),
            ("item_name", entity::text(&self.item_name)),
            ("batch_number", entity::text(self.batch_number.trim())),
            ("current_quantity", entity::int(self.current_quantity)),
            ("minimum_quantity", entity::int(self.minimum_quantity)),
        ]
    }

    fn derive(&mut self, _now: DateTime<Utc>) {
        self.total_value = derived::inventory_total(self.unit_cost, self.current_quantity);
    }

    fn validate(&self, v: &mut Validator<'_>, _previous: Option<&Self>) -> CoreResult<()> {
        v.reference("facility", HealthFacility::TABLE, &self.facility)?;
        money(v, "unit_cost", self.unit_cost, 10);
        v.digits("total_value", self.total_value, 12, 2);
        Ok(())
    }

    fn extend_view(&self, view: &mut Map<String, Json>, _today: NaiveDate) {
        view.insert("below_minimum".into(), Json::Bool(self.below_minimum()));
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FacilitySchedule {
    pub facility: RecordId,
    #[serde(default)]
    pub service: Option<RecordId>,
    /// Monday is 0.
    pub day_of_week: u8,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    #[serde(default = "default_true")]
    pub is_available: bool,
    #[serde(default)]
    pub max_appointments: Option<u32>,
    #[serde(default)]
    pub current_appointments: u32,
    /// Staff rows of the same facility.
    #[serde(default)]
    pub assigned_staff: Vec<RecordId>,
    #[serde(default)]
    pub notes: String,
}

impl Entity for FacilitySchedule {
    const TABLE: &'static str = "facility_schedules";
    const LABEL: &'static str = "FacilitySchedule";

    fn schema() -> &'static EntitySchema {
        static SCHEMA: EntitySchema = EntitySchema {
            filters: &[
                Filter::exact("facility", "t.facility_id"),
                Filter::exact("service", "t.service_id"),
                Filter::integer("day_of_week", "t.day_of_week"),
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
            write: ADMIN,
            audit_reads: false,
        };
        &SCHEMA
    }

    fn columns(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("facility_id", entity::id(&self.facility)),
            ("service_id", entity::opt_id(self.service.as_ref())),
            ("day_of_week", entity::int(self.day_of_week)),
            ("start_time", entity::time(&self.start_time)),
        ]
    }

    fn derive(&mut self, _now: DateTime<Utc>) {
        normalise_ids(&mut self.assigned_staff);
    }

    fn validate(&self, v: &mut Validator<'_>, _previous: Option<&Self>) -> CoreResult<()> {
        v.reference("facility", HealthFacility::TABLE, &self.facility)?;
        if let Some(service) = &self.service {
            same_facility(v, "service", FacilityService::TABLE, service, &self.facility)?;
        }
        for staff in &self.assigned_staff {
            same_facility(v, "assigned_staff", FacilityStaff::TABLE, staff, &self.facility)?;
        }
        v.range("day_of_week", Some(self.day_of_week), 0, 6);
        v.check(
            self.end_time > self.start_time,
            "end_time",
            "End time must be after start time.",
        );
        if let Some(max) = self.max_appointments {
            v.check(
                self.current_appointments <= max,
                "current_appointments",
                "Current appointments cannot exceed the maximum.",
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::ListQuery;
    use crate::test_support::Fixture;
    use crate::CoreError;
    use serde_json::json;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).expect("valid decimal")
    }

    fn field_errors(err: CoreError) -> crate::error::FieldErrors {
        match err {
            CoreError::Validation(errors) => errors,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    fn staff(fx: &Fixture, user: RecordId, facility: RecordId) -> RecordId {
        fx.create::<FacilityStaff>(json!({
            "staff": user,
            "facility": facility,
            "position": "Clinical officer",
            "employment_type": "full_time",
            "hire_date": "2022-01-10",
        }))
    }

    #[test]
    fn test_inventory_total_value_follows_quantity() {
        let fx = Fixture::new();
        let location = fx.location("Mbale");
        let facility = fx.facility("Mbale HC IV", location);
        let repo = fx.repo::<FacilityInventory>();
        let item = repo
            .create_from_json(
                &fx.actor,
                json!({
                    "facility": facility,
                    "item_name": "Amoxicillin 250mg",
                    "category": "antibiotics",
                    "current_quantity": 8,
                    "minimum_quantity": 20,
                    "unit": "box",
                    "unit_cost": "12.50",
                    "total_value": "1.00",
                }),
            )
            .expect("inventory");
        assert_eq!(item.record.total_value, Some(dec("100.00")));

        let item = repo
            .patch(&fx.actor, &item.id, json!({ "current_quantity": 10 }))
            .expect("restock");
        assert_eq!(item.record.total_value, Some(dec("125.00")));

        let item = repo
            .patch(&fx.actor, &item.id, json!({ "current_quantity": 0 }))
            .expect("empty");
        assert_eq!(item.record.total_value, Some(dec("0.00")));
        assert_eq!(
            repo.view(&fx.actor, &item.id).expect("view")["below_minimum"],
            json!(true)
        );
    }

    #[test]
    fn test_inventory_oversized_unit_cost_is_rejected() {
        let fx = Fixture::new();
        let location = fx.location("Mbale");
        let facility = fx.facility("Mbale HC IV", location);
        let err = fx
            .repo::<FacilityInventory>()
            .create_from_json(
                &fx.actor,
                json!({
                    "facility": facility,
                    "item_name": "Gloves",
                    "category": "consumables",
                    "current_quantity": 10,
                    "minimum_quantity": 5,
                    "unit": "box",
                    "unit_cost": "79228162514264337593543950335",
                }),
            )
            .expect_err("unit cost exceeds ten digits");
        assert!(matches!(err, CoreError::Validation(e) if e.contains("unit_cost")));
        assert_eq!(fx.count("facility_inventory"), 0);
    }

    #[test]
    fn test_inventory_low_stock_filter_and_batch_uniqueness() {
        let fx = Fixture::new();
        let location = fx.location("Mbale");
        let facility = fx.facility("Mbale HC IV", location);
        let item = |name: &str, batch: &str, current: u32| {
            json!({
                "facility": facility,
                "item_name": name,
                "category": "consumables",
                "current_quantity": current,
                "minimum_quantity": 10,
                "unit": "piece",
                "batch_number": batch,
            })
        };
        let repo = fx.repo::<FacilityInventory>();
        repo.create_from_json(&fx.actor, item("Gloves", "", 5))
            .expect("gloves");
        repo.create_from_json(&fx.actor, item("Syringes", "B1", 50))
            .expect("syringes B1");
        repo.create_from_json(&fx.actor, item("Syringes", "B2", 10))
            .expect("a second batch is a separate item");
        let err = repo
            .create_from_json(&fx.actor, item("Gloves", "", 3))
            .expect_err("same item and blank batch");
        assert!(matches!(err, CoreError::Conflict(_)));

        let low = repo
            .list(&fx.actor, &ListQuery::new().with("low_stock", "true"))
            .expect("list");
        assert_eq!(low.count, 2);
    }

    #[test]
    fn test_staff_supervisor_rules() {
        let fx = Fixture::new();
        let location = fx.location("Arua");
        let facility = fx.facility("Arua RRH", location);
        let other = fx.facility("Koboko HC", location);
        let lead = staff(&fx, fx.user("lead", "doctor"), facility);
        let outsider = staff(&fx, fx.user("outsider", "nurse"), other);
        let member = staff(&fx, fx.user("member", "nurse"), facility);
        let repo = fx.repo::<FacilityStaff>();

        let err = repo
            .patch(&fx.actor, &member, json!({ "supervisor": member }))
            .expect_err("self supervision");
        assert!(field_errors(err).contains("supervisor"));

        let err = repo
            .patch(&fx.actor, &member, json!({ "supervisor": outsider }))
            .expect_err("supervisor elsewhere");
        assert!(field_errors(err).contains("supervisor"));

        repo.patch(&fx.actor, &member, json!({ "supervisor": lead }))
            .expect("same facility supervisor");
        repo.delete(&fx.actor, &lead).expect("delete supervisor");
        assert_eq!(repo.get(&fx.actor, &member).expect("member").record.supervisor, None);
    }

    #[test]
    fn test_equipment_assignee_must_work_at_facility() {
        let fx = Fixture::new();
        let location = fx.location("Arua");
        let facility = fx.facility("Arua RRH", location);
        let other = fx.facility("Koboko HC", location);
        let outsider = staff(&fx, fx.user("outsider", "nurse"), other);
        let err = fx
            .repo::<FacilityEquipment>()
            .create_from_json(
                &fx.actor,
                json!({
                    "facility": facility,
                    "name": "Ultrasound",
                    "category": "imaging",
                    "assigned_to": outsider,
                    "maintenance_cost": "-5",
                }),
            )
            .expect_err("invalid equipment");
        let errors = field_errors(err);
        assert!(errors.contains("assigned_to"));
        assert!(errors.contains("maintenance_cost"));
    }

    #[test]
    fn test_schedule_service_and_capacity() {
        let fx = Fixture::new();
        let location = fx.location("Arua");
        let facility = fx.facility("Arua RRH", location);
        let other = fx.facility("Koboko HC", location);
        let foreign_service = fx.create::<FacilityService>(json!({
            "facility": other,
            "name": "Antenatal clinic",
            "category": "maternity",
        }));
        let err = fx
            .repo::<FacilitySchedule>()
            .create_from_json(
                &fx.actor,
                json!({
                    "facility": facility,
                    "service": foreign_service,
                    "day_of_week": 1,
                    "start_time": "08:00:00",
                    "end_time": "12:00:00",
                    "max_appointments": 10,
                    "current_appointments": 11,
                }),
            )
            .expect_err("invalid schedule");
        let errors = field_errors(err);
        assert!(errors.contains("service"));
        assert!(errors.contains("current_appointments"));
    }

    #[test]
    fn test_duplicate_service_name_conflicts_and_facility_delete_cascades() {
        let fx = Fixture::new();
        let location = fx.location("Arua");
        let facility = fx.facility("Arua RRH", location);
        let service = json!({ "facility": facility, "name": "Pharmacy", "category": "pharmacy" });
        fx.create::<FacilityService>(service.clone());
        let err = fx
            .repo::<FacilityService>()
            .create_from_json(&fx.actor, service)
            .expect_err("duplicate name");
        assert!(matches!(err, CoreError::Conflict(_)));

        fx.repo::<HealthFacility>()
            .delete(&fx.actor, &facility)
            .expect("facility without patients can be deleted");
        assert_eq!(fx.count("facility_services"), 0);
    }
}
