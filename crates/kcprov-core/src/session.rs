use crate::CoreError;
use kcprov_remote::{AccessToken, IdentityBackend};
use kcprov_schema::ProvisioningRequest;
use tracing::{error, info};

/// Open the admin session for one run. A single attempt: credential or
/// connectivity problems here are reported, never retried.
pub fn authenticate<B: IdentityBackend + ?Sized>(
    backend: &B,
    request: &ProvisioningRequest,
) -> Result<AccessToken, CoreError> {
    info!("authenticating as {}", request.admin.username);
    backend.issue_token(&request.admin).map_err(|e| {
        error!("authentication as {} failed: {e}", request.admin.username);
        CoreError::Auth(e)
    })
}
