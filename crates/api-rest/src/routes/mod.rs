//! Route table for the REST API.

pub mod auth;
pub mod collections;
pub mod health;
pub mod interchange;
pub mod shortcuts;
pub mod users;

use crate::state::AppState;
use axum::routing::{get, post};
use axum::Router;
use collections::{collection, item, list, read_only};
use opencare_core::audit::AuditTrail;
use opencare_core::models::analytics::{
    DiseaseOutbreak, HealthMetrics, HealthReport, PatientAnalytics,
};
use opencare_core::models::appointments::Appointment;
use opencare_core::models::facilities::{
    FacilityEquipment, FacilityInventory, FacilitySchedule, FacilityService, FacilityStaff,
};
use opencare_core::models::patients::{Patient, PatientVisit};
use opencare_core::models::records::{
    HealthRecord, ImagingStudy, LaboratoryTest, Medication, TreatmentPlan, VitalSigns,
};
use opencare_core::models::reference::{HealthFacility, Location, SystemConfiguration};
use opencare_core::models::users::User;
use opencare_core::models::workforce::{
    HealthWorkerProfile, PerformanceEvaluation, ProfessionalQualification, WorkSchedule,
};

/// Routes mounted under `/api/v1`.
pub fn api_v1() -> Router<AppState> {
    let router = Router::new()
        .route("/health", get(health::health))
        .route("/auth/token", post(auth::obtain_token))
        .route("/auth/token/refresh", post(auth::refresh_token))
        // Shortcuts and bulk endpoints; static segments win over `/:id`.
        .route("/records/by_patient", get(shortcuts::records_by_patient))
        .route("/visits/today", get(shortcuts::visits_today))
        .route(
            "/health-workers/by_specialization",
            get(shortcuts::health_workers_by_specialization),
        )
        .route("/facilities/by_location", get(shortcuts::facilities_by_location))
        .route("/patients/search", get(shortcuts::patients_search))
        .route("/patients/export", get(interchange::export_patients))
        .route("/patients/import", post(interchange::import_patients))
        .route("/inventory/low_stock", get(shortcuts::inventory_low_stock))
        .route("/appointments/upcoming", get(shortcuts::appointments_upcoming))
        // Users are created through the account service so a password can be set.
        .route("/users", get(list::<User>).post(users::create_user))
        .route("/users/:id", item::<User>())
        .route("/users/:id/set_password", post(users::set_password));

    let router = collection::<Location>(router, "/locations");
    let router = collection::<HealthFacility>(router, "/facilities");
    let router = collection::<SystemConfiguration>(router, "/system-config");
    let router = collection::<HealthWorkerProfile>(router, "/health-workers");
    let router = collection::<ProfessionalQualification>(router, "/qualifications");
    let router = collection::<WorkSchedule>(router, "/work-schedules");
    let router = collection::<PerformanceEvaluation>(router, "/evaluations");
    let router = collection::<Patient>(router, "/patients");
    let router = collection::<PatientVisit>(router, "/visits");
    let router = collection::<Appointment>(router, "/appointments");
    let router = collection::<HealthRecord>(router, "/records");
    let router = collection::<VitalSigns>(router, "/vital-signs");
    let router = collection::<Medication>(router, "/medications");
    let router = collection::<LaboratoryTest>(router, "/lab-tests");
    let router = collection::<ImagingStudy>(router, "/imaging-studies");
    let router = collection::<TreatmentPlan>(router, "/treatment-plans");
    let router = collection::<FacilityService>(router, "/facility-services");
    let router = collection::<FacilityStaff>(router, "/facility-staff");
    let router = collection::<FacilityEquipment>(router, "/facility-equipment");
    let router = collection::<FacilityInventory>(router, "/inventory");
    let router = collection::<FacilitySchedule>(router, "/facility-schedules");
    let router = collection::<HealthMetrics>(router, "/metrics");
    let router = collection::<DiseaseOutbreak>(router, "/outbreaks");
    let router = collection::<HealthReport>(router, "/reports");
    let router = collection::<PatientAnalytics>(router, "/patient-analytics");
    read_only::<AuditTrail>(router, "/audit-trail")
}
