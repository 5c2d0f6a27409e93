//! Shared fixtures for the crate's unit tests.

use crate::access::Actor;
use crate::config::CoreConfig;
use crate::entity::Entity;
use crate::models::patients::Patient;
use crate::models::reference::{HealthFacility, Location};
use crate::models::users::User;
use crate::repository::Repository;
use crate::store::Database;
use opencare_uuid::RecordId;
use serde_json::{json, Value};
use tempfile::TempDir;

pub(crate) fn test_db(temp_dir: &TempDir) -> Database {
    Database::open(&test_cfg(temp_dir)).expect("Database::open should succeed")
}

pub(crate) fn test_cfg(temp_dir: &TempDir) -> CoreConfig {
    CoreConfig::for_database(temp_dir.path().join("test.db"))
        .expect("CoreConfig::for_database should succeed")
        .with_password_iterations(1_000)
}

/// A migrated database plus helpers that seed the common reference rows.
pub(crate) struct Fixture {
    _temp_dir: TempDir,
    pub db: Database,
    pub cfg: CoreConfig,
    pub actor: Actor,
}

impl Fixture {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let cfg = test_cfg(&temp_dir);
        let db = Database::open(&cfg).expect("Database::open should succeed");
        Self {
            _temp_dir: temp_dir,
            db,
            cfg,
            actor: Actor::system(),
        }
    }

    pub fn repo<E: Entity>(&self) -> Repository<E> {
        Repository::new(self.db.clone(), self.cfg.clone())
    }

    /// Create a record as the system actor and return its id.
    pub fn create<E: Entity>(&self, input: Value) -> RecordId {
        self.repo::<E>()
            .create_from_json(&self.actor, input)
            .unwrap_or_else(|e| panic!("failed to seed {}: {e:?}", E::LABEL))
            .id
    }

    pub fn location(&self, name: &str) -> RecordId {
        self.create::<Location>(json!({ "name": name, "location_type": "district" }))
    }

    pub fn facility(&self, name: &str, location: RecordId) -> RecordId {
        self.create::<HealthFacility>(json!({
            "name": name,
            "facility_type": "clinic",
            "location": location,
            "address": "Plot 4, Main Street",
            "phone_number": "+256700000001",
            "is_24_hours": true,
            "contact_person_name": "Grace Achieng",
            "contact_person_phone": "+256700000002",
        }))
    }

    pub fn user(&self, username: &str, role: &str) -> RecordId {
        self.create::<User>(json!({
            "username": username,
            "first_name": "Test",
            "last_name": username,
            "role": role,
        }))
    }

    pub fn patient(&self, patient_id: &str, location: RecordId, facility: RecordId) -> RecordId {
        self.create::<Patient>(patient_json(patient_id, location, facility))
    }

    /// Location, facility, one doctor and one patient.
    pub fn clinic(&self) -> Clinic {
        let location = self.location("Gulu");
        let facility = self.facility("Gulu Clinic", location);
        let doctor = self.user("dr_okello", "doctor");
        let patient = self.patient("P-0001", location, facility);
        Clinic {
            location,
            facility,
            doctor,
            patient,
        }
    }

    pub fn count(&self, table: &str) -> i64 {
        self.db
            .read(|conn| {
                Ok(conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                    row.get(0)
                })?)
            })
            .expect("count should succeed")
    }
}

pub(crate) struct Clinic {
    pub location: RecordId,
    pub facility: RecordId,
    pub doctor: RecordId,
    pub patient: RecordId,
}

pub(crate) fn patient_json(patient_id: &str, location: RecordId, facility: RecordId) -> Value {
    json!({
        "patient_id": patient_id,
        "first_name": "Amina",
        "last_name": "Nakato",
        "date_of_birth": "1990-03-22",
        "gender": "F",
        "phone_number": "+256712345678",
        "address": "Kasubi, Kampala",
        "location": location,
        "emergency_contact_name": "John Nakato",
        "emergency_contact_phone": "+256798765432",
        "emergency_contact_relationship": "brother",
        "registered_facility": facility,
    })
}
