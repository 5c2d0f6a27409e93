//! Who is acting, and what they may do.
//!
//! Roles map onto a small capability set; every permission check in the crate is a predicate
//! over that set rather than a role comparison.

use crate::{CoreError, CoreResult};
use opencare_uuid::RecordId;
use std::collections::BTreeSet;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Read and write clinical records, visits and patient analytics.
    ClinicalRecords,
    /// Manage reference data, staff and users.
    Administer,
    /// May be booked as the provider of an appointment.
    Provider,
}

/// The authenticated party behind an operation.
#[derive(Clone, Debug)]
pub struct Actor {
    user_id: Option<RecordId>,
    username: String,
    capabilities: BTreeSet<Capability>,
    ip_address: Option<String>,
    user_agent: Option<String>,
}

impl Actor {
    pub fn new(
        user_id: RecordId,
        username: impl Into<String>,
        capabilities: BTreeSet<Capability>,
    ) -> Self {
        Self {
            user_id: Some(user_id),
            username: username.into(),
            capabilities,
            ip_address: None,
            user_agent: None,
        }
    }

    /// An operator acting outside any user account, such as the CLI.
    ///
    /// Holds every capability; audit entries record no user.
    pub fn system() -> Self {
        Self {
            user_id: None,
            username: "system".into(),
            capabilities: [
                Capability::ClinicalRecords,
                Capability::Administer,
                Capability::Provider,
            ]
            .into_iter()
            .collect(),
            ip_address: None,
            user_agent: None,
        }
    }

    /// Attach client details recorded in the audit trail.
    pub fn with_client(mut self, ip_address: Option<String>, user_agent: Option<String>) -> Self {
        self.ip_address = ip_address;
        self.user_agent = user_agent;
        self
    }

    pub fn user_id(&self) -> Option<RecordId> {
        self.user_id
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn has(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    pub fn capabilities(&self) -> &BTreeSet<Capability> {
        &self.capabilities
    }

    pub fn ip_address(&self) -> Option<&str> {
        self.ip_address.as_deref()
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.user_agent.as_deref()
    }
}

/// Requirement guarding reads or writes of an entity family.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Access {
    /// Any authenticated user.
    Authenticated,
    /// Users holding the capability.
    Requires(Capability),
    /// Nobody, including administrators. Used for append-only data.
    Denied,
}

impl Access {
    /// Check `actor` against this requirement.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Permission`] describing the refused `action` on `label`.
    pub fn check(&self, actor: &Actor, action: &str, label: &str) -> CoreResult<()> {
        let allowed = match self {
            Access::Authenticated => true,
            Access::Requires(capability) => actor.has(*capability),
            Access::Denied => false,
        };
        if allowed {
            Ok(())
        } else {
            Err(CoreError::Permission(format!(
                "{} may not {} {} records",
                actor.username(),
                action,
                label
            )))
        }
    }
}
