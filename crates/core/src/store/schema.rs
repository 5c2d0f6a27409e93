use crate::CoreResult;
use rusqlite::Connection;

/// Version recorded in `PRAGMA user_version` once all migrations have run.
pub const SCHEMA_VERSION: u32 = 1;

/// Ordered migrations; entry `n` upgrades the schema from version `n` to `n + 1`.
const MIGRATIONS: &[&str] = &[V1];

pub(super) fn migrate(conn: &mut Connection) -> CoreResult<()> {
    let current: u32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    for (index, sql) in MIGRATIONS.iter().enumerate().skip(current as usize) {
        let tx = conn.transaction()?;
        tx.execute_batch(sql)?;
        tx.pragma_update(None, "user_version", (index + 1) as u32)?;
        tx.commit()?;
        tracing::info!("applied schema migration {}", index + 1);
    }
    Ok(())
}

// Every table keeps the full record as a JSON `body`. Columns duplicate only what the store
// must enforce or index: references, unique keys, flags used by validation and sort keys.
const V1: &str = r#"
CREATE TABLE locations (
    id            TEXT PRIMARY KEY,
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL,
    name          TEXT NOT NULL,
    location_type TEXT NOT NULL,
    parent_id     TEXT REFERENCES locations(id) ON DELETE RESTRICT,
    body          TEXT NOT NULL
);
CREATE UNIQUE INDEX locations_name_parent_type
    ON locations (name, COALESCE(parent_id, ''), location_type);

CREATE TABLE health_facilities (
    id            TEXT PRIMARY KEY,
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL,
    name          TEXT NOT NULL UNIQUE,
    facility_type TEXT NOT NULL,
    location_id   TEXT NOT NULL REFERENCES locations(id) ON DELETE RESTRICT,
    body          TEXT NOT NULL
);

CREATE TABLE system_configurations (
    id         TEXT PRIMARY KEY,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    key        TEXT NOT NULL UNIQUE,
    is_public  INTEGER NOT NULL,
    body       TEXT NOT NULL
);

CREATE TABLE users (
    id            TEXT PRIMARY KEY,
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL,
    username      TEXT NOT NULL UNIQUE,
    role          TEXT NOT NULL,
    is_active     INTEGER NOT NULL,
    is_superuser  INTEGER NOT NULL,
    last_name     TEXT NOT NULL,
    password_hash TEXT,
    body          TEXT NOT NULL
);

CREATE TABLE audit_trail (
    id          TEXT PRIMARY KEY,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL,
    user_id     TEXT REFERENCES users(id) ON DELETE SET NULL,
    action      TEXT NOT NULL,
    model_name  TEXT NOT NULL,
    object_id   TEXT NOT NULL,
    timestamp   TEXT NOT NULL,
    body        TEXT NOT NULL
);
CREATE INDEX audit_trail_object ON audit_trail (model_name, object_id);

CREATE TABLE health_worker_profiles (
    id                  TEXT PRIMARY KEY,
    created_at          TEXT NOT NULL,
    updated_at          TEXT NOT NULL,
    user_id             TEXT NOT NULL UNIQUE REFERENCES users(id) ON DELETE CASCADE,
    license_number      TEXT NOT NULL UNIQUE,
    primary_facility_id TEXT NOT NULL REFERENCES health_facilities(id) ON DELETE RESTRICT,
    body                TEXT NOT NULL
);

CREATE TABLE professional_qualifications (
    id               TEXT PRIMARY KEY,
    created_at       TEXT NOT NULL,
    updated_at       TEXT NOT NULL,
    health_worker_id TEXT NOT NULL REFERENCES health_worker_profiles(id) ON DELETE CASCADE,
    verified_by_id   TEXT REFERENCES users(id) ON DELETE SET NULL,
    completion_date  TEXT NOT NULL,
    body             TEXT NOT NULL
);

CREATE TABLE work_schedules (
    id               TEXT PRIMARY KEY,
    created_at       TEXT NOT NULL,
    updated_at       TEXT NOT NULL,
    health_worker_id TEXT NOT NULL REFERENCES health_worker_profiles(id) ON DELETE CASCADE,
    facility_id      TEXT NOT NULL REFERENCES health_facilities(id) ON DELETE CASCADE,
    day_of_week      INTEGER NOT NULL,
    start_time       TEXT NOT NULL,
    body             TEXT NOT NULL,
    UNIQUE (health_worker_id, facility_id, day_of_week, start_time)
);

CREATE TABLE performance_evaluations (
    id               TEXT PRIMARY KEY,
    created_at       TEXT NOT NULL,
    updated_at       TEXT NOT NULL,
    health_worker_id TEXT NOT NULL REFERENCES health_worker_profiles(id) ON DELETE CASCADE,
    evaluator_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    evaluation_date  TEXT NOT NULL,
    body             TEXT NOT NULL
);

CREATE TABLE patients (
    id                     TEXT PRIMARY KEY,
    created_at             TEXT NOT NULL,
    updated_at             TEXT NOT NULL,
    patient_id             TEXT NOT NULL UNIQUE,
    location_id            TEXT NOT NULL REFERENCES locations(id) ON DELETE RESTRICT,
    registered_facility_id TEXT NOT NULL REFERENCES health_facilities(id) ON DELETE RESTRICT,
    is_active              INTEGER NOT NULL,
    last_name              TEXT NOT NULL,
    registration_date      TEXT NOT NULL,
    body                   TEXT NOT NULL
);

CREATE TABLE patient_visits (
    id                    TEXT PRIMARY KEY,
    created_at            TEXT NOT NULL,
    updated_at            TEXT NOT NULL,
    patient_id            TEXT NOT NULL REFERENCES patients(id) ON DELETE CASCADE,
    facility_id           TEXT NOT NULL REFERENCES health_facilities(id) ON DELETE RESTRICT,
    attending_provider_id TEXT REFERENCES users(id) ON DELETE SET NULL,
    status                TEXT NOT NULL,
    scheduled_date        TEXT NOT NULL,
    body                  TEXT NOT NULL
);
CREATE INDEX patient_visits_patient ON patient_visits (patient_id, scheduled_date);

CREATE TABLE appointments (
    id            TEXT PRIMARY KEY,
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL,
    patient_id    TEXT NOT NULL REFERENCES patients(id) ON DELETE CASCADE,
    provider_id   TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    facility_id   TEXT NOT NULL REFERENCES health_facilities(id) ON DELETE CASCADE,
    created_by_id TEXT REFERENCES users(id) ON DELETE SET NULL,
    status        TEXT NOT NULL,
    start_time    TEXT NOT NULL,
    end_time      TEXT NOT NULL,
    body          TEXT NOT NULL
);
CREATE INDEX appointments_provider ON appointments (provider_id, start_time);
CREATE INDEX appointments_patient ON appointments (patient_id, start_time);
CREATE INDEX appointments_facility ON appointments (facility_id, start_time);

CREATE TABLE health_records (
    id                    TEXT PRIMARY KEY,
    created_at            TEXT NOT NULL,
    updated_at            TEXT NOT NULL,
    patient_id            TEXT NOT NULL REFERENCES patients(id) ON DELETE CASCADE,
    facility_id           TEXT NOT NULL REFERENCES health_facilities(id) ON DELETE RESTRICT,
    attending_provider_id TEXT REFERENCES users(id) ON DELETE SET NULL,
    record_type           TEXT NOT NULL,
    record_date           TEXT NOT NULL,
    body                  TEXT NOT NULL
);
CREATE INDEX health_records_patient ON health_records (patient_id, record_date);

CREATE TABLE vital_signs (
    id               TEXT PRIMARY KEY,
    created_at       TEXT NOT NULL,
    updated_at       TEXT NOT NULL,
    health_record_id TEXT NOT NULL REFERENCES health_records(id) ON DELETE CASCADE,
    recorded_by_id   TEXT REFERENCES users(id) ON DELETE SET NULL,
    recorded_at      TEXT NOT NULL,
    body             TEXT NOT NULL
);

CREATE TABLE medications (
    id                TEXT PRIMARY KEY,
    created_at        TEXT NOT NULL,
    updated_at        TEXT NOT NULL,
    health_record_id  TEXT NOT NULL REFERENCES health_records(id) ON DELETE CASCADE,
    prescribed_by_id  TEXT REFERENCES users(id) ON DELETE SET NULL,
    prescription_date TEXT NOT NULL,
    is_active         INTEGER NOT NULL,
    body              TEXT NOT NULL
);

CREATE TABLE laboratory_tests (
    id               TEXT PRIMARY KEY,
    created_at       TEXT NOT NULL,
    updated_at       TEXT NOT NULL,
    health_record_id TEXT NOT NULL REFERENCES health_records(id) ON DELETE CASCADE,
    ordered_by_id    TEXT REFERENCES users(id) ON DELETE SET NULL,
    verified_by_id   TEXT REFERENCES users(id) ON DELETE SET NULL,
    ordered_date     TEXT NOT NULL,
    body             TEXT NOT NULL
);

CREATE TABLE imaging_studies (
    id               TEXT PRIMARY KEY,
    created_at       TEXT NOT NULL,
    updated_at       TEXT NOT NULL,
    health_record_id TEXT NOT NULL REFERENCES health_records(id) ON DELETE CASCADE,
    ordered_by_id    TEXT REFERENCES users(id) ON DELETE SET NULL,
    radiologist_id   TEXT REFERENCES users(id) ON DELETE SET NULL,
    ordered_date     TEXT NOT NULL,
    body             TEXT NOT NULL
);

CREATE TABLE treatment_plans (
    id                  TEXT PRIMARY KEY,
    created_at          TEXT NOT NULL,
    updated_at          TEXT NOT NULL,
    health_record_id    TEXT NOT NULL REFERENCES health_records(id) ON DELETE CASCADE,
    primary_provider_id TEXT REFERENCES users(id) ON DELETE SET NULL,
    status              TEXT NOT NULL,
    body                TEXT NOT NULL
);

CREATE TABLE facility_services (
    id          TEXT PRIMARY KEY,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL,
    facility_id TEXT NOT NULL REFERENCES health_facilities(id) ON DELETE CASCADE,
    name        TEXT NOT NULL,
    category    TEXT NOT NULL,
    body        TEXT NOT NULL,
    UNIQUE (facility_id, name)
);

CREATE TABLE facility_staff (
    id            TEXT PRIMARY KEY,
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL,
    staff_id      TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    facility_id   TEXT NOT NULL REFERENCES health_facilities(id) ON DELETE CASCADE,
    supervisor_id TEXT REFERENCES facility_staff(id) ON DELETE SET NULL,
    is_active     INTEGER NOT NULL,
    body          TEXT NOT NULL,
    UNIQUE (staff_id, facility_id)
);

CREATE TABLE facility_equipment (
    id             TEXT PRIMARY KEY,
    created_at     TEXT NOT NULL,
    updated_at     TEXT NOT NULL,
    facility_id    TEXT NOT NULL REFERENCES health_facilities(id) ON DELETE CASCADE,
    assigned_to_id TEXT REFERENCES facility_staff(id) ON DELETE SET NULL,
    status         TEXT NOT NULL,
    body           TEXT NOT NULL
);

CREATE TABLE facility_inventory (
    id               TEXT PRIMARY KEY,
    created_at       TEXT NOT NULL,
    updated_at       TEXT NOT NULL,
    facility_id      TEXT NOT NULL REFERENCES health_facilities(id) ON DELETE CASCADE,
    item_name        TEXT NOT NULL,
    batch_number     TEXT NOT NULL DEFAULT '',
    current_quantity INTEGER NOT NULL,
    minimum_quantity INTEGER NOT NULL,
    body             TEXT NOT NULL,
    UNIQUE (facility_id, item_name, batch_number)
);

CREATE TABLE facility_schedules (
    id          TEXT PRIMARY KEY,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL,
    facility_id TEXT NOT NULL REFERENCES health_facilities(id) ON DELETE CASCADE,
    service_id  TEXT REFERENCES facility_services(id) ON DELETE CASCADE,
    day_of_week INTEGER NOT NULL,
    start_time  TEXT NOT NULL,
    body        TEXT NOT NULL,
    UNIQUE (facility_id, day_of_week, start_time)
);

CREATE TABLE health_metrics (
    id          TEXT PRIMARY KEY,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL,
    metric_type TEXT NOT NULL,
    location_id TEXT REFERENCES locations(id) ON DELETE CASCADE,
    facility_id TEXT REFERENCES health_facilities(id) ON DELETE CASCADE,
    date        TEXT NOT NULL,
    period      TEXT NOT NULL,
    body        TEXT NOT NULL
);
CREATE UNIQUE INDEX health_metrics_coordinate
    ON health_metrics (metric_type, COALESCE(location_id, ''), COALESCE(facility_id, ''), date, period);

CREATE TABLE disease_outbreaks (
    id          TEXT PRIMARY KEY,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL,
    location_id TEXT NOT NULL REFERENCES locations(id) ON DELETE CASCADE,
    start_date  TEXT NOT NULL,
    status      TEXT NOT NULL,
    body        TEXT NOT NULL
);

CREATE TABLE health_reports (
    id              TEXT PRIMARY KEY,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL,
    generated_by_id TEXT REFERENCES users(id) ON DELETE SET NULL,
    facility_id     TEXT REFERENCES health_facilities(id) ON DELETE CASCADE,
    location_id     TEXT REFERENCES locations(id) ON DELETE CASCADE,
    report_type     TEXT NOT NULL,
    body            TEXT NOT NULL
);

CREATE TABLE patient_analytics (
    id            TEXT PRIMARY KEY,
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL,
    patient_id    TEXT NOT NULL REFERENCES patients(id) ON DELETE CASCADE,
    analysis_date TEXT NOT NULL,
    body          TEXT NOT NULL,
    UNIQUE (patient_id, analysis_date)
);
"#;
