//! Resource descriptors exchanged with the identity service admin API.
//!
//! Field names follow the admin API's camelCase JSON. Only the fields the
//! provisioner reads or writes are modelled; [`Client`] keeps everything else
//! in `extra` so an update never drops settings made outside kcprov.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Bearer credential for one provisioning run. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Value for the `Authorization` header.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(<redacted>)")
    }
}

/// OpenID Connect token endpoint response.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub token_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Realm {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub realm: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_theme: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssl_required: Option<String>,
}

impl Realm {
    /// Realm as created for a fresh deployment.
    pub fn desired(name: &str) -> Self {
        Self {
            id: None,
            realm: name.to_owned(),
            display_name: Some(name.to_owned()),
            enabled: true,
            login_theme: Some("codewind".to_owned()),
            ssl_required: Some("external".to_owned()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub client_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub public_client: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Client {
    /// Confidential OpenID Connect client with a single redirect pattern.
    pub fn confidential(client_id: &str, redirect_uri: &str) -> Self {
        Self {
            id: None,
            client_id: client_id.to_owned(),
            name: Some(client_id.to_owned()),
            enabled: true,
            public_client: false,
            protocol: Some("openid-connect".to_owned()),
            redirect_uris: vec![redirect_uri.to_owned()],
            extra: serde_json::Map::new(),
        }
    }

    /// Add `uri` to the redirect list unless it is already there.
    /// Returns `true` if the list changed.
    pub fn append_redirect(&mut self, uri: &str) -> bool {
        if self.redirect_uris.iter().any(|u| u == uri) {
            return false;
        }
        self.redirect_uris.push(uri.to_owned());
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessRole {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl AccessRole {
    pub fn for_workspace(name: &str, workspace_id: &str) -> Self {
        Self {
            id: None,
            name: name.to_owned(),
            description: Some(format!("Access to workspace {workspace_id}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub username: String,
    #[serde(default)]
    pub enabled: bool,
}

/// Credential registered on a confidential client.
#[derive(Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RegisteredSecret {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub value: String,
}

impl fmt::Debug for RegisteredSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredSecret")
            .field("kind", &self.kind)
            .field("value", &"<redacted>")
            .finish()
    }
}
