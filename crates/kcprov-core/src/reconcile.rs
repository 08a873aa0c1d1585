//! Per-resource reconciliation policies.
//!
//! Each method looks its resource up by natural key first and only then
//! decides what to do:
//!
//! | resource    | found                         | not found         |
//! |-------------|-------------------------------|-------------------|
//! | realm       | left untouched                | created           |
//! | client      | callback appended if missing  | created           |
//! | access role | (create-only, 409 is success) | created           |
//! | user        | verified                      | fatal             |
//! | role grant  | (unconditional, idempotent)   |                   |
//! | secret      | returned                      | fatal             |
//!
//! Nothing here deletes, and a failed lookup is never read as "absent".

use crate::lifecycle::Step;
use crate::CoreError;
use kcprov_remote::{
    AccessRole, AccessToken, Client, IdentityBackend, Lookup, Realm, RegisteredSecret, RemoteError,
};
use kcprov_schema::ProvisioningRequest;
use serde::Serialize;
use std::fmt;
use tracing::{error, info};

/// What a successful step did to the identity service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReconciliationOutcome {
    Created,
    Updated,
    AlreadySatisfied,
}

impl fmt::Display for ReconciliationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconciliationOutcome::Created => write!(f, "created"),
            ReconciliationOutcome::Updated => write!(f, "updated"),
            ReconciliationOutcome::AlreadySatisfied => write!(f, "already satisfied"),
        }
    }
}

/// Applies the per-kind policies for one request with one access token.
pub struct Reconciler<'a, B: IdentityBackend + ?Sized> {
    backend: &'a B,
    token: &'a AccessToken,
    request: &'a ProvisioningRequest,
}

impl<'a, B: IdentityBackend + ?Sized> Reconciler<'a, B> {
    pub fn new(backend: &'a B, token: &'a AccessToken, request: &'a ProvisioningRequest) -> Self {
        Self {
            backend,
            token,
            request,
        }
    }

    /// Get-or-create. An existing realm is never modified.
    pub fn realm(&self) -> Result<ReconciliationOutcome, CoreError> {
        let name = &self.request.realm;
        let lookup = self
            .backend
            .get_realm(self.token, name)
            .map_err(|e| fail(Step::Realm, format!("looking up realm '{name}'"), e))?;
        match lookup {
            Lookup::Found(existing) => {
                info!(
                    "updating existing realm {}",
                    existing.display_name.as_deref().unwrap_or(&existing.realm)
                );
                Ok(ReconciliationOutcome::AlreadySatisfied)
            }
            Lookup::NotFound => {
                info!("creating realm {name}");
                self.backend
                    .create_realm(self.token, &Realm::desired(name))
                    .map_err(|e| fail(Step::Realm, format!("creating realm '{name}'"), e))?;
                Ok(ReconciliationOutcome::Created)
            }
        }
    }

    /// Get-or-create. An existing client only gains this workspace's callback
    /// pattern; redirects registered by others are kept.
    pub fn client(&self) -> Result<ReconciliationOutcome, CoreError> {
        let realm = &self.request.realm;
        let name = &self.request.client;
        let redirect = self.request.redirect_pattern();
        info!("checking for client {name}");
        let lookup = self
            .backend
            .get_client(self.token, realm, name)
            .map_err(|e| fail(Step::Client, format!("looking up client '{name}'"), e))?;
        match lookup {
            Lookup::Found(mut existing) => {
                info!("updating existing client {name}");
                if !existing.append_redirect(&redirect) {
                    info!("client {name} already redirects to {redirect}");
                    return Ok(ReconciliationOutcome::AlreadySatisfied);
                }
                self.backend
                    .update_client(self.token, realm, &existing)
                    .map_err(|e| {
                        fail(
                            Step::Client,
                            format!("adding redirect {redirect} to client '{name}'"),
                            e,
                        )
                    })?;
                Ok(ReconciliationOutcome::Updated)
            }
            Lookup::NotFound => {
                info!("creating client {name}");
                self.backend
                    .create_client(self.token, realm, &Client::confidential(name, &redirect))
                    .map_err(|e| fail(Step::Client, format!("creating client '{name}'"), e))?;
                Ok(ReconciliationOutcome::Created)
            }
        }
    }

    /// Create-only. A conflict means the role is already there.
    pub fn access_role(&self) -> Result<ReconciliationOutcome, CoreError> {
        let realm = &self.request.realm;
        let name = self.request.access_role_name();
        info!("creating access role {name} in realm {realm}");
        let role = AccessRole::for_workspace(&name, &self.request.workspace_id);
        match self.backend.create_role(self.token, realm, &role) {
            Ok(()) => Ok(ReconciliationOutcome::Created),
            Err(e) if e.is_conflict() => {
                info!("access role {name} already exists");
                Ok(ReconciliationOutcome::AlreadySatisfied)
            }
            Err(e) => {
                error!("access role create failed: {e}");
                Err(fail(
                    Step::AccessRole,
                    format!("creating access role '{name}'"),
                    e,
                ))
            }
        }
    }

    /// Get-only. kcprov never registers developer accounts.
    pub fn verify_user(&self) -> Result<ReconciliationOutcome, CoreError> {
        let realm = &self.request.realm;
        let username = &self.request.developer;
        let lookup = self
            .backend
            .get_user(self.token, realm, username)
            .map_err(|e| {
                error!("configuring user failed: {e}");
                fail(Step::VerifyUser, format!("looking up user '{username}'"), e)
            })?;
        match lookup {
            Lookup::Found(_) => Ok(ReconciliationOutcome::AlreadySatisfied),
            Lookup::NotFound => {
                error!("developer account {username} not found in realm {realm}");
                Err(fail(
                    Step::VerifyUser,
                    format!("developer account '{username}' not found in realm '{realm}'"),
                    RemoteError::NotFound(format!("user '{username}'")),
                ))
            }
        }
    }

    /// Unconditional grant; granting a held role is a no-op server side.
    pub fn grant_role(&self) -> Result<ReconciliationOutcome, CoreError> {
        let realm = &self.request.realm;
        let username = &self.request.developer;
        let role = self.request.access_role_name();
        info!(
            "granting access to workspace {} for {username}",
            self.request.workspace_id
        );
        self.backend
            .add_user_role(self.token, realm, username, &role)
            .map_err(|e| {
                error!("granting access to workspace failed: {e}");
                fail(
                    Step::GrantRole,
                    format!("granting role '{role}' to '{username}'"),
                    e,
                )
            })?;
        Ok(ReconciliationOutcome::Updated)
    }

    /// Get-only fetch of the client's registered secret.
    pub fn fetch_secret(&self) -> Result<RegisteredSecret, CoreError> {
        let secret_name = self.request.secret_name();
        let client = &self.request.client;
        info!("fetching client secret {secret_name}");
        self.backend
            .get_client_secret(self.token, &self.request.realm, client)
            .map_err(|e| {
                error!("fetching client secret {secret_name} failed: {e}");
                fail(
                    Step::FetchSecret,
                    format!("fetching secret of client '{client}'"),
                    e,
                )
            })
    }
}

fn fail(step: Step, description: String, source: RemoteError) -> CoreError {
    CoreError::step_failed(step, description, source)
}
