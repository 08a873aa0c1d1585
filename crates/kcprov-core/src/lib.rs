//! Provisioning core for kcprov.
//!
//! This crate brings an identity service in line with one workspace's
//! [`ProvisioningRequest`](kcprov_schema::ProvisioningRequest): it waits for
//! the service to answer, opens one admin session, then walks a fixed chain of
//! check-then-act steps (realm, client, access role, user, role grant, client
//! secret). Every step is safe to repeat; none ever deletes anything. The
//! first failing step ends the run with an error naming that step.

pub mod lifecycle;
pub mod orchestrator;
pub mod readiness;
pub mod reconcile;
pub mod session;

pub use lifecycle::{validate_transition, ProvisionState, Step};
pub use orchestrator::{provision, ProvisionOptions, ProvisionReport, Provisioner, StepReport};
pub use readiness::{wait_until_ready, RetryPolicy};
pub use reconcile::{ReconciliationOutcome, Reconciler};
pub use session::authenticate;

use kcprov_remote::RemoteError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("identity service at {url} did not become ready after {attempts} attempts")]
    ServiceUnavailable { url: String, attempts: u32 },
    #[error("authentication failed: {0}")]
    Auth(#[source] RemoteError),
    #[error("{step} failed: {description}: {source}")]
    Step {
        step: Step,
        description: String,
        #[source]
        source: RemoteError,
    },
    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
    #[error("request error: {0}")]
    Request(#[from] kcprov_schema::RequestError),
}

impl CoreError {
    /// The step a run stopped at, when the failure belongs to one.
    pub fn step(&self) -> Option<Step> {
        match self {
            CoreError::ServiceUnavailable { .. } => Some(Step::WaitForService),
            CoreError::Auth(_) => Some(Step::Authenticate),
            CoreError::Step { step, .. } => Some(*step),
            CoreError::InvalidTransition { .. } | CoreError::Request(_) => None,
        }
    }

    pub(crate) fn step_failed(
        step: Step,
        description: impl Into<String>,
        source: RemoteError,
    ) -> Self {
        CoreError::Step {
            step,
            description: description.into(),
            source,
        }
    }
}
