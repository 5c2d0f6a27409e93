//! Router tests driven through `tower::ServiceExt::oneshot`.

use crate::{build_router, AppState};
use api_shared::AuthConfig;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use opencare_core::CoreConfig;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

const SECRET: &str = "0123456789abcdef0123456789abcdef";
const ADMIN_PASSWORD: &str = "Str0ng-pass!";

struct TestApp {
    _temp_dir: TempDir,
    app: Router,
}

impl TestApp {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let cfg = CoreConfig::for_database(temp_dir.path().join("api.db"))
            .expect("config should build")
            .with_password_iterations(1_000);
        let auth = AuthConfig::new(SECRET, 900, 86_400).expect("auth config should build");
        let state = AppState::open(cfg, auth).expect("state should open");
        state
            .accounts
            .create_superuser("admin", None, ADMIN_PASSWORD)
            .expect("superuser should be created");
        Self {
            _temp_dir: temp_dir,
            app: build_router(state),
        }
    }

    async fn call_raw(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<String>,
    ) -> (StatusCode, axum::http::HeaderMap, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            request = request.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => request
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body)),
            None => request.body(Body::empty()),
        }
        .expect("request should build");

        let response = self
            .app
            .clone()
            .oneshot(request)
            .await
            .expect("router should respond");
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body should collect")
            .to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        (status, headers, value)
    }

    async fn call(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let (status, _, value) = self
            .call_raw(method, uri, token, body.map(|b| b.to_string()))
            .await;
        (status, value)
    }

    async fn login(&self, username: &str, password: &str) -> Value {
        let (status, body) = self
            .call(
                Method::POST,
                "/api/v1/auth/token",
                None,
                Some(json!({ "username": username, "password": password })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "login failed: {}", body);
        body
    }

    async fn admin_token(&self) -> String {
        self.login("admin", ADMIN_PASSWORD).await["access"]
            .as_str()
            .expect("access token")
            .to_string()
    }

    async fn create(&self, token: &str, path: &str, body: Value) -> String {
        let (status, created) = self.call(Method::POST, path, Some(token), Some(body)).await;
        assert_eq!(status, StatusCode::CREATED, "create {} failed: {}", path, created);
        created["id"].as_str().expect("id").to_string()
    }

    /// Location and facility ids.
    async fn site(&self, token: &str) -> (String, String) {
        let location = self
            .create(
                token,
                "/api/v1/locations",
                json!({ "name": "Gulu", "location_type": "district" }),
            )
            .await;
        let facility = self
            .create(
                token,
                "/api/v1/facilities",
                json!({
                    "name": "Gulu Clinic",
                    "facility_type": "clinic",
                    "location": location,
                    "address": "Plot 4, Main Street",
                    "phone_number": "+256700000001",
                    "is_24_hours": true,
                    "contact_person_name": "Grace Achieng",
                    "contact_person_phone": "+256700000002",
                }),
            )
            .await;
        (location, facility)
    }
}

fn patient_body(patient_id: &str, location: &str, facility: &str) -> Value {
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

#[tokio::test]
async fn test_health_is_public() {
    let app = TestApp::new();
    for path in ["/health", "/api/v1/health"] {
        let (status, body) = app.call(Method::GET, path, None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["service"], "opencare");
    }
}

#[tokio::test]
async fn test_collections_require_a_token() {
    let app = TestApp::new();
    let (status, headers, body) = app
        .call_raw(Method::GET, "/api/v1/patients", None, None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "not_authenticated");
    assert_eq!(
        headers.get(header::WWW_AUTHENTICATE).map(|v| v.as_bytes()),
        Some(&b"Bearer"[..])
    );

    let (status, _) = app
        .call(Method::GET, "/api/v1/patients", Some("forged.token"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_wrong_password_is_unauthorized() {
    let app = TestApp::new();
    let (status, body) = app
        .call(
            Method::POST,
            "/api/v1/auth/token",
            None,
            Some(json!({ "username": "admin", "password": "wrong-password" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "not_authenticated");
}

#[tokio::test]
async fn test_refresh_issues_access_token_only() {
    let app = TestApp::new();
    let pair = app.login("admin", ADMIN_PASSWORD).await;
    let refresh = pair["refresh"].as_str().expect("refresh token");

    let (status, _) = app
        .call(Method::GET, "/api/v1/locations", Some(refresh), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED, "refresh tokens are not bearer tokens");

    let (status, renewed) = app
        .call(
            Method::POST,
            "/api/v1/auth/token/refresh",
            None,
            Some(json!({ "refresh": refresh })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(renewed.get("refresh").is_none());
    let access = renewed["access"].as_str().expect("access token");
    let (status, _) = app
        .call(Method::GET, "/api/v1/locations", Some(access), None)
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_patient_crud_and_conflict() {
    let app = TestApp::new();
    let token = app.admin_token().await;
    let (location, facility) = app.site(&token).await;

    let id = app
        .create(
            &token,
            "/api/v1/patients",
            patient_body("P-0001", &location, &facility),
        )
        .await;

    let (status, patient) = app
        .call(Method::GET, &format!("/api/v1/patients/{}", id), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(patient["patient_id"], "P-0001");
    assert!(patient["age"].is_u64());

    let (status, body) = app
        .call(
            Method::POST,
            "/api/v1/patients",
            Some(&token),
            Some(patient_body("P-0001", &location, &facility)),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "conflict");

    let (status, patched) = app
        .call(
            Method::PATCH,
            &format!("/api/v1/patients/{}", id),
            Some(&token),
            Some(json!({ "occupation": "Farmer" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(patched["occupation"], "Farmer");

    let (status, _) = app
        .call(Method::DELETE, &format!("/api/v1/patients/{}", id), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, body) = app
        .call(Method::GET, &format!("/api/v1/patients/{}", id), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "not_found");
}

#[tokio::test]
async fn test_validation_errors_are_field_maps() {
    let app = TestApp::new();
    let token = app.admin_token().await;
    let (location, facility) = app.site(&token).await;

    let mut body = patient_body("P-0002", &location, &facility);
    body["gender"] = json!("X");
    let (status, error) = app
        .call(Method::POST, "/api/v1/patients", Some(&token), Some(body))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["code"], "invalid");
    assert!(error["errors"]["gender"].is_array());

    let (status, _, error) = app
        .call_raw(
            Method::POST,
            "/api/v1/patients",
            Some(&token),
            Some("{not json".into()),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["code"], "parse_error");
}

#[tokio::test]
async fn test_pages_and_invalid_page() {
    let app = TestApp::new();
    let token = app.admin_token().await;
    let (location, facility) = app.site(&token).await;
    for n in 1..=3 {
        app.create(
            &token,
            "/api/v1/patients",
            patient_body(&format!("P-000{}", n), &location, &facility),
        )
        .await;
    }

    let (status, page) = app
        .call(
            Method::GET,
            "/api/v1/patients?page_size=2&ordering=patient_id",
            Some(&token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["count"], 3);
    assert_eq!(page["next"], 2);
    assert_eq!(page["results"].as_array().map(Vec::len), Some(2));

    let (status, _) = app
        .call(Method::GET, "/api/v1/patients?page=9", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, found) = app
        .call(Method::GET, "/api/v1/patients/search?q=P-0002", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(found["count"], 1);

    let (status, _) = app
        .call(Method::GET, "/api/v1/patients/search", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_capabilities_gate_clinical_collections() {
    let app = TestApp::new();
    let token = app.admin_token().await;
    app.create(
        &token,
        "/api/v1/users",
        json!({
            "username": "chw_lamwaka",
            "first_name": "Lamwaka",
            "last_name": "Akello",
            "role": "community_worker",
            "password": "field-visits-2024",
        }),
    )
    .await;

    let chw = app.login("chw_lamwaka", "field-visits-2024").await;
    let chw = chw["access"].as_str().expect("access token");

    let (status, body) = app
        .call(Method::GET, "/api/v1/records", Some(chw), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "permission_denied");

    let (status, _) = app
        .call(Method::GET, "/api/v1/audit-trail", Some(chw), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .call(Method::GET, "/api/v1/locations", Some(chw), None)
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_user_password_is_write_only_and_resettable() {
    let app = TestApp::new();
    let token = app.admin_token().await;
    let id = app
        .create(
            &token,
            "/api/v1/users",
            json!({
                "username": "nurse_atim",
                "first_name": "Atim",
                "last_name": "Odongo",
                "role": "nurse",
                "password": "ward-rounds-1",
            }),
        )
        .await;

    let (_, user) = app
        .call(Method::GET, &format!("/api/v1/users/{}", id), Some(&token), None)
        .await;
    assert!(user.get("password").is_none());
    assert!(user.get("password_hash").is_none());

    let (status, _) = app
        .call(
            Method::POST,
            &format!("/api/v1/users/{}/set_password", id),
            Some(&token),
            Some(json!({ "password": "night-shift-22" })),
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    app.login("nurse_atim", "night-shift-22").await;

    let (status, _) = app
        .call(
            Method::POST,
            "/api/v1/auth/token",
            None,
            Some(json!({ "username": "nurse_atim", "password": "ward-rounds-1" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_import_then_export() {
    let app = TestApp::new();
    let token = app.admin_token().await;
    let (location, facility) = app.site(&token).await;

    let rows = json!([
        patient_body("P-0101", &location, &facility),
        patient_body("P-0101", &location, &facility),
    ]);
    let (status, report) = app
        .call(
            Method::POST,
            "/api/v1/patients/import",
            Some(&token),
            Some(json!({ "format": "json", "data": rows.to_string() })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["created"], 1);
    assert_eq!(report["failed"][0]["index"], 1);
    assert_eq!(report["failed"][0]["patient_id"], "P-0101");

    let (status, headers, body) = app
        .call_raw(
            Method::GET,
            "/api/v1/patients/export?format=yaml",
            Some(&token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        headers.get(header::CONTENT_TYPE).map(|v| v.as_bytes()),
        Some(&b"application/yaml"[..])
    );
    assert!(body.as_str().is_some_and(|yaml| yaml.contains("P-0101")));
}

#[tokio::test]
async fn test_writes_leave_audit_entries() {
    let app = TestApp::new();
    let token = app.admin_token().await;
    app.site(&token).await;

    let (status, page) = app
        .call(
            Method::GET,
            "/api/v1/audit-trail?model_name=HealthFacility&action=create",
            Some(&token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["count"], 1);

    let (status, _) = app
        .call(
            Method::POST,
            "/api/v1/audit-trail",
            Some(&token),
            Some(json!({})),
        )
        .await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_records_by_patient_uses_patient_identifier() {
    let app = TestApp::new();
    let token = app.admin_token().await;
    let (location, facility) = app.site(&token).await;
    let patient = app
        .create(
            &token,
            "/api/v1/patients",
            patient_body("P-0001", &location, &facility),
        )
        .await;
    app.create(
        &token,
        "/api/v1/records",
        json!({
            "patient": patient,
            "facility": facility,
            "record_type": "medical",
            "record_date": "2024-05-01T10:00:00Z",
            "chief_complaint": "Cough",
        }),
    )
    .await;

    let (status, page) = app
        .call(
            Method::GET,
            "/api/v1/records/by_patient?patient_id=P-0001",
            Some(&token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["count"], 1);
    assert_eq!(page["results"][0]["patient"], json!(patient));

    let (status, page) = app
        .call(
            Method::GET,
            "/api/v1/records/by_patient?patient_id=P-9999",
            Some(&token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["count"], 0);

    let (status, body) = app
        .call(Method::GET, "/api/v1/records/by_patient", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["errors"]["patient_id"].is_array());
}

#[tokio::test]
async fn test_referenced_location_delete_is_conflict() {
    let app = TestApp::new();
    let token = app.admin_token().await;
    let (location, _) = app.site(&token).await;

    let (status, body) = app
        .call(
            Method::DELETE,
            &format!("/api/v1/locations/{}", location),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "conflict");
    assert!(!body["message"]
        .as_str()
        .expect("message")
        .contains("FOREIGN KEY"));

    let (status, _) = app
        .call(
            Method::GET,
            &format!("/api/v1/locations/{}", location),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_oversized_decimal_is_field_error() {
    let app = TestApp::new();
    let token = app.admin_token().await;
    let (_, facility) = app.site(&token).await;

    let (status, body) = app
        .call(
            Method::POST,
            "/api/v1/inventory",
            Some(&token),
            Some(json!({
                "facility": facility,
                "item_name": "Gloves",
                "category": "consumables",
                "current_quantity": 10,
                "unit": "box",
                "unit_cost": "79228162514264337593543950335",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid");
    assert!(body["errors"]["unit_cost"].is_array());
}
