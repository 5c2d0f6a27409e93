//! User accounts and the roles that grant capabilities.

use super::{blank_as_none, choices, default_true};
use crate::access::{Access, Actor, Capability};
use crate::entity::{self, Entity, EntitySchema, Filter};
use crate::validation::Validator;
use crate::CoreResult;
use chrono::NaiveDate;
use opencare_types::{EmailAddress, NonEmptyText, PhoneNumber};
use opencare_uuid::RecordId;
use rusqlite::types::Value;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};
use std::collections::BTreeSet;

choices! {
    pub enum Role {
        Admin => "admin",
        Doctor => "doctor",
        Nurse => "nurse",
        Midwife => "midwife",
        CommunityWorker => "community_worker",
        Pharmacist => "pharmacist",
        LabTechnician => "lab_technician",
    }
}

impl Default for Role {
    fn default() -> Self {
        Role::CommunityWorker
    }
}

impl Role {
    pub fn capabilities(&self) -> BTreeSet<Capability> {
        let mut caps = BTreeSet::new();
        match self {
            Role::Admin => {
                caps.insert(Capability::Administer);
            }
            Role::Doctor | Role::Nurse | Role::Midwife => {
                caps.insert(Capability::ClinicalRecords);
                caps.insert(Capability::Provider);
            }
            Role::Pharmacist | Role::LabTechnician => {
                caps.insert(Capability::ClinicalRecords);
            }
            Role::CommunityWorker => {
                caps.insert(Capability::Provider);
            }
        }
        caps
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub username: NonEmptyText,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub email: Option<EmailAddress>,
    #[serde(default)]
    pub role: Role,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub phone_number: Option<PhoneNumber>,
    #[serde(default)]
    pub date_of_birth: Option<NaiveDate>,
    #[serde(default)]
    pub license_number: String,
    #[serde(default)]
    pub specialization: String,
    #[serde(default)]
    pub years_of_experience: u32,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub is_superuser: bool,
}

impl User {
    /// Capabilities granted by the role, widened to everything for superusers.
    pub fn capabilities(&self) -> BTreeSet<Capability> {
        if self.is_superuser {
            return [
                Capability::ClinicalRecords,
                Capability::Administer,
                Capability::Provider,
            ]
            .into_iter()
            .collect();
        }
        self.role.capabilities()
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name.trim(), self.last_name.trim())
            .trim()
            .to_string()
    }

    /// The actor this user acts as once authenticated.
    pub fn actor(&self, id: RecordId) -> Actor {
        Actor::new(id, self.username.as_str(), self.capabilities())
    }
}

fn is_valid_username(username: &str) -> bool {
    username.chars().count() <= 150
        && username
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_'))
}

impl Entity for User {
    const TABLE: &'static str = "users";
    const LABEL: &'static str = "User";

    fn schema() -> &'static EntitySchema {
        static SCHEMA: EntitySchema = EntitySchema {
            filters: &[
                Filter::exact("role", "t.role"),
                Filter::boolean("is_active", "t.is_active"),
                Filter::exact("specialization", "json_extract(t.body, '$.specialization')"),
            ],
            search: &[
                "t.username",
                "json_extract(t.body, '$.first_name')",
                "t.last_name",
                "json_extract(t.body, '$.email')",
            ],
            ordering: &[
                ("username", "t.username"),
                ("last_name", "t.last_name"),
                ("date_joined", "t.created_at"),
            ],
            default_ordering: &["username"],
            nullable_refs: &[],
            read: Access::Authenticated,
            write: Access::Requires(Capability::Administer),
            audit_reads: false,
        };
        &SCHEMA
    }

    fn columns(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("username", entity::text(&self.username)),
            ("role", entity::text(self.role.as_str())),
            ("is_active", entity::flag(self.is_active)),
            ("is_superuser", entity::flag(self.is_superuser)),
            ("last_name", entity::text(&self.last_name)),
        ]
    }

    fn validate(&self, v: &mut Validator<'_>, _previous: Option<&Self>) -> CoreResult<()> {
        v.check(
            is_valid_username(self.username.as_str()),
            "username",
            "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.",
        );
        let today = v.today();
        v.not_before(
            "date_of_birth",
            self.date_of_birth.as_ref(),
            Some(&today),
            "Date of birth cannot be in the future.",
        );
        Ok(())
    }

    fn extend_view(&self, view: &mut Map<String, Json>, _today: NaiveDate) {
        view.insert("full_name".into(), Json::String(self.full_name()));
        view.insert(
            "capabilities".into(),
            serde_json::to_value(self.capabilities()).unwrap_or(Json::Null),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::Fixture;
    use crate::CoreError;
    use serde_json::json;

    #[test]
    fn test_role_capabilities() {
        assert!(Role::Doctor.capabilities().contains(&Capability::Provider));
        assert!(Role::Pharmacist.capabilities().contains(&Capability::ClinicalRecords));
        assert!(!Role::Pharmacist.capabilities().contains(&Capability::Provider));
        assert!(!Role::CommunityWorker
            .capabilities()
            .contains(&Capability::ClinicalRecords));
        assert_eq!(
            Role::Admin.capabilities(),
            [Capability::Administer].into_iter().collect()
        );
    }

    #[test]
    fn test_user_rejects_bad_username_and_future_birth() {
        let fx = Fixture::new();
        let err = fx
            .repo::<User>()
            .create_from_json(
                &fx.actor,
                json!({ "username": "bad name!", "date_of_birth": "2999-01-01" }),
            )
            .expect_err("invalid user");
        match err {
            CoreError::Validation(errors) => {
                assert!(errors.contains("username"));
                assert!(errors.contains("date_of_birth"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_user_view_has_full_name_and_capabilities() {
        let fx = Fixture::new();
        let id = fx.user("nurse.joy", "nurse");
        let view = fx
            .repo::<User>()
            .view(&fx.actor, &id)
            .expect("view should succeed");
        assert_eq!(view["full_name"], json!("Test nurse.joy"));
        assert_eq!(view["capabilities"], json!(["clinical_records", "provider"]));
        assert_eq!(view["role"], json!("nurse"));
        assert!(view.get("password").is_none());
    }
}
