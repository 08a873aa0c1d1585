use crate::CoreError;
use serde::Serialize;
use std::fmt;

/// One unit of work in a provisioning run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Step {
    WaitForService,
    Authenticate,
    Realm,
    Client,
    AccessRole,
    VerifyUser,
    GrantRole,
    FetchSecret,
}

impl Step {
    pub const ALL: [Step; 8] = [
        Step::WaitForService,
        Step::Authenticate,
        Step::Realm,
        Step::Client,
        Step::AccessRole,
        Step::VerifyUser,
        Step::GrantRole,
        Step::FetchSecret,
    ];

    /// State reached when this step succeeds.
    pub fn target(self) -> ProvisionState {
        match self {
            Step::WaitForService => ProvisionState::ServiceReady,
            Step::Authenticate => ProvisionState::Authenticated,
            Step::Realm => ProvisionState::RealmReady,
            Step::Client => ProvisionState::ClientReady,
            Step::AccessRole => ProvisionState::RoleReady,
            Step::VerifyUser => ProvisionState::UserVerified,
            Step::GrantRole => ProvisionState::RoleGranted,
            Step::FetchSecret => ProvisionState::SecretFetched,
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::WaitForService => write!(f, "wait-for-service"),
            Step::Authenticate => write!(f, "authenticate"),
            Step::Realm => write!(f, "realm"),
            Step::Client => write!(f, "client"),
            Step::AccessRole => write!(f, "access-role"),
            Step::VerifyUser => write!(f, "verify-user"),
            Step::GrantRole => write!(f, "grant-role"),
            Step::FetchSecret => write!(f, "fetch-secret"),
        }
    }
}

/// Progress of a provisioning run. The chain is strictly linear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProvisionState {
    Pending,
    ServiceReady,
    Authenticated,
    RealmReady,
    ClientReady,
    RoleReady,
    UserVerified,
    RoleGranted,
    SecretFetched,
}

impl ProvisionState {
    /// The only step allowed from this state, or `None` once the run is done.
    pub fn next_step(self) -> Option<Step> {
        match self {
            ProvisionState::Pending => Some(Step::WaitForService),
            ProvisionState::ServiceReady => Some(Step::Authenticate),
            ProvisionState::Authenticated => Some(Step::Realm),
            ProvisionState::RealmReady => Some(Step::Client),
            ProvisionState::ClientReady => Some(Step::AccessRole),
            ProvisionState::RoleReady => Some(Step::VerifyUser),
            ProvisionState::UserVerified => Some(Step::GrantRole),
            ProvisionState::RoleGranted => Some(Step::FetchSecret),
            ProvisionState::SecretFetched => None,
        }
    }

    pub fn is_done(self) -> bool {
        self == ProvisionState::SecretFetched
    }
}

impl fmt::Display for ProvisionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProvisionState::Pending => write!(f, "pending"),
            ProvisionState::ServiceReady => write!(f, "service-ready"),
            ProvisionState::Authenticated => write!(f, "authenticated"),
            ProvisionState::RealmReady => write!(f, "realm-ready"),
            ProvisionState::ClientReady => write!(f, "client-ready"),
            ProvisionState::RoleReady => write!(f, "role-ready"),
            ProvisionState::UserVerified => write!(f, "user-verified"),
            ProvisionState::RoleGranted => write!(f, "role-granted"),
            ProvisionState::SecretFetched => write!(f, "secret-fetched"),
        }
    }
}

pub fn validate_transition(from: ProvisionState, to: ProvisionState) -> Result<(), CoreError> {
    let valid = from.next_step().map(Step::target) == Some(to);

    if valid {
        Ok(())
    } else {
        Err(CoreError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}
