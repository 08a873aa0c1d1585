use crate::types::{ClientName, RealmName, RoleName, Username, WorkspaceId};
use crate::WORKSPACE_KEY_PREFIX;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use thiserror::Error;

pub const REQUEST_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("failed to read request file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse request file: {0}")]
    ParseToml(#[from] toml::de::Error),
    #[error("unsupported request_version: {0}, expected {REQUEST_VERSION}")]
    UnsupportedVersion(u32),
    #[error("missing required field '{0}'")]
    MissingField(&'static str),
    #[error("field '{0}' must not be empty")]
    EmptyField(&'static str),
    #[error("{field} is not an http(s) URL: '{value}'")]
    InvalidUrl { field: &'static str, value: String },
}

/// Admin account used to obtain the provisioning access token.
#[derive(Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AdminCredentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for AdminCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Everything one provisioning run needs, validated up front.
///
/// Built once (usually via [`RequestFile::into_request`]) and then only ever
/// borrowed by the steps of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisioningRequest {
    pub workspace_id: WorkspaceId,
    /// Base URL of the identity service, without a trailing slash.
    pub auth_url: String,
    pub realm: RealmName,
    pub admin: AdminCredentials,
    /// Public URL of the gatekeeper in front of the workspace, without a trailing slash.
    pub callback_url: String,
    pub developer: Username,
    pub client: ClientName,
}

impl ProvisioningRequest {
    /// Name of the per-workspace access role: `codewind-<workspace>`.
    pub fn access_role_name(&self) -> RoleName {
        RoleName::new(format!("{WORKSPACE_KEY_PREFIX}{}", self.workspace_id))
    }

    /// Name the workspace's client secret is registered under.
    pub fn secret_name(&self) -> String {
        format!("{WORKSPACE_KEY_PREFIX}{}", self.workspace_id)
    }

    /// Redirect pattern registered on the client for this workspace.
    pub fn redirect_pattern(&self) -> String {
        format!("{}/*", self.callback_url.trim().trim_end_matches('/'))
    }

    /// Check every field and normalize URLs.
    pub fn validate(mut self) -> Result<Self, RequestError> {
        non_empty("workspace_id", &self.workspace_id)?;
        non_empty("realm", &self.realm)?;
        non_empty("client", &self.client)?;
        non_empty("developer", &self.developer)?;
        non_empty("admin.username", &self.admin.username)?;
        non_empty("admin.password", &self.admin.password)?;
        self.auth_url = normalize_url("auth_url", &self.auth_url)?;
        self.callback_url = normalize_url("callback_url", &self.callback_url)?;
        Ok(self)
    }
}

fn non_empty(field: &'static str, value: &str) -> Result<(), RequestError> {
    if value.trim().is_empty() {
        return Err(RequestError::EmptyField(field));
    }
    Ok(())
}

fn normalize_url(field: &'static str, value: &str) -> Result<String, RequestError> {
    non_empty(field, value)?;
    let trimmed = value.trim().trim_end_matches('/');
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(RequestError::InvalidUrl {
            field,
            value: value.to_owned(),
        });
    }
    Ok(trimmed.to_owned())
}

/// On-disk shape of `kcprov.toml`. Every field is optional so that files and
/// command-line flags can be layered before validation.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RequestFile {
    #[serde(default)]
    pub request_version: Option<u32>,
    #[serde(default)]
    pub workspace_id: Option<String>,
    #[serde(default)]
    pub auth_url: Option<String>,
    #[serde(default)]
    pub realm: Option<String>,
    #[serde(default)]
    pub client: Option<String>,
    #[serde(default)]
    pub callback_url: Option<String>,
    #[serde(default)]
    pub developer: Option<String>,
    #[serde(default)]
    pub admin: AdminSection,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct AdminSection {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl RequestFile {
    /// Overlay `other` on top of `self`; fields set in `other` win.
    #[must_use]
    pub fn merge(self, other: RequestFile) -> RequestFile {
        RequestFile {
            request_version: other.request_version.or(self.request_version),
            workspace_id: other.workspace_id.or(self.workspace_id),
            auth_url: other.auth_url.or(self.auth_url),
            realm: other.realm.or(self.realm),
            client: other.client.or(self.client),
            callback_url: other.callback_url.or(self.callback_url),
            developer: other.developer.or(self.developer),
            admin: AdminSection {
                username: other.admin.username.or(self.admin.username),
                password: other.admin.password.or(self.admin.password),
            },
        }
    }

    pub fn into_request(self) -> Result<ProvisioningRequest, RequestError> {
        if let Some(v) = self.request_version {
            if v != REQUEST_VERSION {
                return Err(RequestError::UnsupportedVersion(v));
            }
        }
        let request = ProvisioningRequest {
            workspace_id: required("workspace_id", self.workspace_id)?.into(),
            auth_url: required("auth_url", self.auth_url)?,
            realm: required("realm", self.realm)?.into(),
            admin: AdminCredentials {
                username: required("admin.username", self.admin.username)?,
                password: required("admin.password", self.admin.password)?,
            },
            callback_url: required("callback_url", self.callback_url)?,
            developer: required("developer", self.developer)?.into(),
            client: required("client", self.client)?.into(),
        };
        request.validate()
    }
}

fn required(field: &'static str, value: Option<String>) -> Result<String, RequestError> {
    value.ok_or(RequestError::MissingField(field))
}

pub fn parse_request_str(input: &str) -> Result<RequestFile, RequestError> {
    Ok(toml::from_str(input)?)
}

pub fn parse_request_file(path: impl AsRef<Path>) -> Result<RequestFile, RequestError> {
    let content = fs::read_to_string(path)?;
    parse_request_str(&content)
}
