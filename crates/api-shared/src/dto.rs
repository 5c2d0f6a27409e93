//! Request and response bodies shared by the API crates.

use opencare_core::interchange::ImportFailure;
use opencare_core::{CoreError, FieldErrors, ImportReport, Page};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::collections::BTreeMap;
use utoipa::{IntoParams, ToSchema};

#[derive(Clone, Debug, Deserialize, ToSchema)]
pub struct TokenReq {
    pub username: String,
    pub password: String,
}

#[derive(Clone, Debug, Deserialize, ToSchema)]
pub struct RefreshReq {
    pub refresh: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TokenPair {
    pub access: String,
    /// Absent when only the access token was renewed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh: Option<String>,
    pub token_type: String,
    /// Access token lifetime in seconds
    pub expires_in: i64,
}

#[derive(Clone, Debug, Deserialize, ToSchema)]
pub struct SetPasswordReq {
    pub password: String,
}

#[derive(Clone, Debug, Deserialize, ToSchema)]
pub struct ImportReq {
    /// `json` (default) or `yaml`
    #[serde(default)]
    pub format: Option<String>,
    /// Serialised list of patient records
    pub data: String,
}

#[derive(Clone, Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ExportQuery {
    /// `json` (default) or `yaml`
    pub format: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, ToSchema)]
pub struct ImportFailureRes {
    pub index: usize,
    pub patient_id: Option<String>,
    pub error: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, ToSchema)]
pub struct ImportRes {
    pub created: usize,
    pub failed: Vec<ImportFailureRes>,
}

impl From<ImportReport> for ImportRes {
    fn from(report: ImportReport) -> Self {
        Self {
            created: report.created,
            failed: report
                .failed
                .into_iter()
                .map(|ImportFailure { index, patient_id, error }| ImportFailureRes {
                    index,
                    patient_id,
                    error,
                })
                .collect(),
        }
    }
}

/// Paginated list envelope.
#[derive(Clone, Debug, PartialEq, Serialize, ToSchema)]
pub struct PageRes {
    pub count: u64,
    pub page: u32,
    pub page_size: u32,
    /// Next page number, if any
    pub next: Option<u32>,
    /// Previous page number, if any
    pub previous: Option<u32>,
    #[schema(value_type = Vec<Object>)]
    pub results: Vec<Json>,
}

impl From<Page<Json>> for PageRes {
    fn from(page: Page<Json>) -> Self {
        Self {
            count: page.count,
            page: page.page,
            page_size: page.page_size,
            next: page.next,
            previous: page.previous,
            results: page.results,
        }
    }
}

/// Error body returned for every failed request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    /// Stable machine-readable code, e.g. `invalid` or `not_found`
    pub code: String,
    pub message: String,
    /// Field name to messages, for validation failures
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<BTreeMap<String, Vec<String>>>,
}

impl ErrorBody {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            errors: None,
        }
    }

    pub fn with_fields(mut self, fields: &FieldErrors) -> Self {
        self.errors = Some(
            fields
                .iter()
                .map(|(field, messages)| (field.clone(), messages.clone()))
                .collect(),
        );
        self
    }
}

/// Stable code for a core error.
pub fn error_code(err: &CoreError) -> &'static str {
    match err {
        CoreError::Validation(_) => "invalid",
        CoreError::NotFound { .. } | CoreError::InvalidPage(_) => "not_found",
        CoreError::Unauthenticated => "not_authenticated",
        CoreError::Permission(_) => "permission_denied",
        CoreError::Conflict(_) => "conflict",
        CoreError::Busy => "service_unavailable",
        _ => "server_error",
    }
}
