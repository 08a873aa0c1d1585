//! The provisioning run.
//!
//! [`Provisioner`] walks the [`ProvisionState`] chain one step at a time.
//! The step to run is always taken from the current state, so the
//! `validate_transition` call before each advance cannot fail as the loop
//! stands today; it guards the chain against a future loop that skips or
//! reorders steps.

use crate::lifecycle::{validate_transition, ProvisionState, Step};
use crate::readiness::{wait_until_ready, RetryPolicy};
use crate::reconcile::{ReconciliationOutcome, Reconciler};
use crate::session::authenticate;
use crate::CoreError;
use kcprov_remote::config::DEFAULT_TIMEOUT_SECS;
use kcprov_remote::{AccessToken, HttpBackend, HttpProbe, IdentityBackend, Probe, RemoteConfig};
use kcprov_schema::ProvisioningRequest;
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tracing::{info, info_span};

/// What one completed step did. The wait and session steps touch no
/// resource and carry no outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StepReport {
    pub step: Step,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<ReconciliationOutcome>,
}

/// Summary of a successful run.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct ProvisionReport {
    pub workspace_id: String,
    pub realm: String,
    pub client: String,
    /// Name the secret is stored under by the caller, `codewind-<workspace>`.
    pub secret_name: String,
    pub probe_attempts: u32,
    pub steps: Vec<StepReport>,
    pub secret: String,
}

impl ProvisionReport {
    pub fn outcome(&self, step: Step) -> Option<ReconciliationOutcome> {
        self.steps
            .iter()
            .find(|s| s.step == step)
            .and_then(|s| s.outcome)
    }
}

impl fmt::Debug for ProvisionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProvisionReport")
            .field("workspace_id", &self.workspace_id)
            .field("realm", &self.realm)
            .field("client", &self.client)
            .field("secret_name", &self.secret_name)
            .field("probe_attempts", &self.probe_attempts)
            .field("steps", &self.steps)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Drives one request through the fixed step chain against a backend.
pub struct Provisioner<B, P> {
    backend: B,
    probe: P,
    policy: RetryPolicy,
}

impl<B: IdentityBackend, P: Probe> Provisioner<B, P> {
    pub fn new(backend: B, probe: P) -> Self {
        Self {
            backend,
            probe,
            policy: RetryPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Run every step in order and return the client secret with a summary.
    ///
    /// The request is validated and its URLs normalized before anything
    /// is sent. Stops at the first failing step. Nothing already applied is
    /// rolled back; a later run picks up from whatever state the service is in.
    pub fn provision(&self, request: &ProvisioningRequest) -> Result<ProvisionReport, CoreError> {
        let request = &request.clone().validate()?;
        let span = info_span!(
            "provision",
            workspace = %request.workspace_id,
            realm = %request.realm,
        );
        let _enter = span.enter();

        let mut run = Run {
            state: ProvisionState::Pending,
            token: None,
            secret: None,
            probe_attempts: 0,
            steps: Vec::with_capacity(Step::ALL.len()),
        };

        while let Some(step) = run.state.next_step() {
            let target = step.target();
            validate_transition(run.state, target)?;
            let outcome = self.run_step(step, request, &mut run)?;
            match outcome {
                Some(outcome) => info!("{step}: {outcome}"),
                None => info!("{step}: done"),
            }
            run.steps.push(StepReport { step, outcome });
            run.state = target;
        }

        let secret = run.secret.ok_or_else(|| CoreError::InvalidTransition {
            from: run.state.to_string(),
            to: ProvisionState::SecretFetched.to_string(),
        })?;
        info!("workspace {} provisioned", request.workspace_id);
        Ok(ProvisionReport {
            workspace_id: request.workspace_id.to_string(),
            realm: request.realm.to_string(),
            client: request.client.to_string(),
            secret_name: request.secret_name(),
            probe_attempts: run.probe_attempts,
            steps: run.steps,
            secret,
        })
    }

    fn run_step(
        &self,
        step: Step,
        request: &ProvisioningRequest,
        run: &mut Run,
    ) -> Result<Option<ReconciliationOutcome>, CoreError> {
        let outcome = match step {
            Step::WaitForService => {
                run.probe_attempts = wait_until_ready(&self.probe, &request.auth_url, self.policy)?;
                None
            }
            Step::Authenticate => {
                run.token = Some(authenticate(&self.backend, request)?);
                None
            }
            Step::Realm => Some(self.reconciler(step, request, run)?.realm()?),
            Step::Client => Some(self.reconciler(step, request, run)?.client()?),
            Step::AccessRole => Some(self.reconciler(step, request, run)?.access_role()?),
            Step::VerifyUser => Some(self.reconciler(step, request, run)?.verify_user()?),
            Step::GrantRole => Some(self.reconciler(step, request, run)?.grant_role()?),
            Step::FetchSecret => {
                let secret = self.reconciler(step, request, run)?.fetch_secret()?;
                run.secret = Some(secret.value);
                None
            }
        };
        Ok(outcome)
    }

    /// Resource steps need the session opened by [`Step::Authenticate`].
    fn reconciler<'a>(
        &'a self,
        step: Step,
        request: &'a ProvisioningRequest,
        run: &'a Run,
    ) -> Result<Reconciler<'a, B>, CoreError> {
        let token = run
            .token
            .as_ref()
            .ok_or_else(|| CoreError::InvalidTransition {
                from: run.state.to_string(),
                to: step.target().to_string(),
            })?;
        Ok(Reconciler::new(&self.backend, token, request))
    }
}

struct Run {
    state: ProvisionState,
    token: Option<AccessToken>,
    secret: Option<String>,
    probe_attempts: u32,
    steps: Vec<StepReport>,
}

/// Tunables for the HTTP-backed entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProvisionOptions {
    pub retry: RetryPolicy,
    /// Per-request timeout for every admin call and readiness probe.
    pub timeout: Duration,
}

impl Default for ProvisionOptions {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

/// Provision `request` against the identity service at `request.auth_url`
/// and return the client secret.
pub fn provision(
    request: &ProvisioningRequest,
    options: &ProvisionOptions,
) -> Result<String, CoreError> {
    let config = RemoteConfig::new(&request.auth_url).with_timeout(options.timeout);
    let provisioner = Provisioner::new(HttpBackend::new(config), HttpProbe::new(options.timeout))
        .with_policy(options.retry);
    provisioner.provision(request).map(|report| report.secret)
}
