//! Identity-service boundary for kcprov.
//!
//! This crate describes everything the provisioning core needs from the
//! identity service: the [`IdentityBackend`] trait (token issuance plus
//! per-kind lookup, create, and mutate operations), the [`Probe`] trait used
//! while waiting for the service to come up, the resource descriptors that
//! travel over the admin API, and a blocking HTTP implementation of both
//! traits for Keycloak-compatible servers.

pub mod config;
pub mod http;
pub mod model;

pub use config::RemoteConfig;
pub use http::{HttpBackend, HttpProbe};
pub use model::{AccessRole, AccessToken, Client, Realm, RegisteredSecret, TokenResponse, User};

use kcprov_schema::{AdminCredentials, ClientName, RealmName, RoleName, Username};
use thiserror::Error;
use std::time::Duration;

/// Any HTTP status at or above this value means the service is not serving yet.
pub const TRANSPORT_FAILURE_STATUS: u16 = 500;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("HTTP {code} for {method} {url}")]
    Status {
        code: u16,
        method: &'static str,
        url: String,
    },
    #[error("not found: {0}")]
    NotFound(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl RemoteError {
    /// HTTP status carried by this error, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            RemoteError::Status { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn is_conflict(&self) -> bool {
        self.status() == Some(409)
    }
}

/// Result of looking a resource up by its natural key.
///
/// Transport failures are reported on the `Err` side of the surrounding
/// `Result`, so an absent resource and an unreachable server never look alike.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<T> {
    Found(T),
    NotFound,
}

impl<T> Lookup<T> {
    pub fn is_found(&self) -> bool {
        matches!(self, Lookup::Found(_))
    }

    pub fn found(self) -> Option<T> {
        match self {
            Lookup::Found(value) => Some(value),
            Lookup::NotFound => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Lookup<U> {
        match self {
            Lookup::Found(value) => Lookup::Found(f(value)),
            Lookup::NotFound => Lookup::NotFound,
        }
    }
}

impl<T> From<Option<T>> for Lookup<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Lookup::NotFound, Lookup::Found)
    }
}

/// Lightweight reachability check used by the readiness wait.
pub trait Probe: Send + Sync {
    /// Returns `true` once the service answers below [`TRANSPORT_FAILURE_STATUS`].
    /// Network errors count as unreachable, and so does no answer within
    /// `limit`.
    fn probe(&self, url: &str, limit: Duration) -> bool;
}

/// Admin operations the provisioning core performs against the identity service.
///
/// Every method is a single blocking request sequence with no internal retry.
pub trait IdentityBackend: Send + Sync {
    /// Exchange admin credentials for a short-lived access token.
    fn issue_token(&self, admin: &AdminCredentials) -> Result<AccessToken, RemoteError>;

    fn get_realm(&self, token: &AccessToken, realm: &RealmName)
        -> Result<Lookup<Realm>, RemoteError>;

    fn create_realm(&self, token: &AccessToken, realm: &Realm) -> Result<(), RemoteError>;

    fn get_client(
        &self,
        token: &AccessToken,
        realm: &RealmName,
        client: &ClientName,
    ) -> Result<Lookup<Client>, RemoteError>;

    fn create_client(
        &self,
        token: &AccessToken,
        realm: &RealmName,
        client: &Client,
    ) -> Result<(), RemoteError>;

    /// Replace an existing client registration with `client` (matched by its `id`).
    fn update_client(
        &self,
        token: &AccessToken,
        realm: &RealmName,
        client: &Client,
    ) -> Result<(), RemoteError>;

    /// Create a realm role. An existing role yields a 409 [`RemoteError::Status`].
    fn create_role(
        &self,
        token: &AccessToken,
        realm: &RealmName,
        role: &AccessRole,
    ) -> Result<(), RemoteError>;

    fn get_role(
        &self,
        token: &AccessToken,
        realm: &RealmName,
        role: &RoleName,
    ) -> Result<Lookup<AccessRole>, RemoteError>;

    fn get_user(
        &self,
        token: &AccessToken,
        realm: &RealmName,
        username: &Username,
    ) -> Result<Lookup<User>, RemoteError>;

    /// Grant a realm role to a user. Granting a role the user already holds is a no-op.
    fn add_user_role(
        &self,
        token: &AccessToken,
        realm: &RealmName,
        username: &Username,
        role: &RoleName,
    ) -> Result<(), RemoteError>;

    fn get_client_secret(
        &self,
        token: &AccessToken,
        realm: &RealmName,
        client: &ClientName,
    ) -> Result<RegisteredSecret, RemoteError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_and_conflict_helpers() {
        let err = RemoteError::Status {
            code: 409,
            method: "POST",
            url: "http://kc/admin/realms/r/roles".to_owned(),
        };
        assert_eq!(err.status(), Some(409));
        assert!(err.is_conflict());
        assert!(!RemoteError::Http("refused".to_owned()).is_conflict());
        assert_eq!(RemoteError::NotFound("x".to_owned()).status(), None);
    }

    #[test]
    fn lookup_from_option() {
        let found: Lookup<u8> = Some(3).into();
        assert!(found.is_found());
        assert_eq!(found.map(|v| v * 2).found(), Some(6));
        let missing: Lookup<u8> = None.into();
        assert_eq!(missing, Lookup::NotFound);
    }

    #[test]
    fn status_error_names_request() {
        let err = RemoteError::Status {
            code: 500,
            method: "PUT",
            url: "http://kc/x".to_owned(),
        };
        assert_eq!(err.to_string(), "HTTP 500 for PUT http://kc/x");
    }
}
