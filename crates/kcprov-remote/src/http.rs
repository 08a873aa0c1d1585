use crate::model::{AccessRole, AccessToken, Client, Realm, RegisteredSecret, TokenResponse, User};
use crate::{IdentityBackend, Lookup, Probe, RemoteConfig, RemoteError, TRANSPORT_FAILURE_STATUS};
use kcprov_schema::{AdminCredentials, ClientName, RealmName, RoleName, Username};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::Read;
use std::time::Duration;

/// Client id used for admin sessions in the `master` realm.
const ADMIN_CLIENT_ID: &str = "admin-cli";

/// Blocking client for a Keycloak-compatible admin REST API.
///
/// Routes used, relative to the configured base URL:
/// - `POST /realms/master/protocol/openid-connect/token`  (form-encoded)
/// - `GET  /admin/realms/{realm}`,  `POST /admin/realms`
/// - `GET  /admin/realms/{realm}/clients?clientId=`, `POST .../clients`,
///   `PUT .../clients/{id}`, `GET .../clients/{id}/client-secret`
/// - `POST /admin/realms/{realm}/roles`, `GET .../roles/{name}`
/// - `GET  /admin/realms/{realm}/users?username=&exact=true`
/// - `POST /admin/realms/{realm}/users/{id}/role-mappings/realm`
pub struct HttpBackend {
    config: RemoteConfig,
    agent: ureq::Agent,
}

#[derive(Debug, Clone, Copy)]
enum SendMethod {
    Post,
    Put,
}

impl SendMethod {
    fn as_str(self) -> &'static str {
        match self {
            SendMethod::Post => "POST",
            SendMethod::Put => "PUT",
        }
    }
}

impl HttpBackend {
    pub fn new(config: RemoteConfig) -> Self {
        let agent = build_agent(config.timeout);
        Self { config, agent }
    }

    pub fn config(&self) -> &RemoteConfig {
        &self.config
    }

    fn realm_url(&self, realm: &RealmName) -> String {
        format!(
            "{}/{}",
            self.config.admin_realms_url(),
            urlencoding::encode(realm.as_str())
        )
    }

    fn do_get<T: DeserializeOwned>(
        &self,
        url: &str,
        token: &AccessToken,
        query: &[(&str, &str)],
    ) -> Result<Option<T>, RemoteError> {
        let mut req = self
            .agent
            .get(url)
            .header("Authorization", &token.bearer())
            .header("Accept", "application/json");
        for (key, value) in query {
            req = req.query(*key, *value);
        }
        let resp = match req.call() {
            Ok(r) => r,
            Err(ureq::Error::StatusCode(404)) => return Ok(None),
            Err(e) => return Err(map_error("GET", url, e)),
        };
        let body = read_body(resp)?;
        serde_json::from_slice(&body)
            .map(Some)
            .map_err(|e| RemoteError::Serialization(format!("GET {url}: {e}")))
    }

    fn do_send<T: Serialize + ?Sized>(
        &self,
        method: SendMethod,
        url: &str,
        token: &AccessToken,
        payload: &T,
    ) -> Result<(), RemoteError> {
        let body =
            serde_json::to_vec(payload).map_err(|e| RemoteError::Serialization(e.to_string()))?;
        let req = match method {
            SendMethod::Post => self.agent.post(url),
            SendMethod::Put => self.agent.put(url),
        };
        req.header("Authorization", &token.bearer())
            .header("Content-Type", "application/json")
            .send(&body[..])
            .map_err(|e| map_error(method.as_str(), url, e))?;
        Ok(())
    }

    /// Resolve a client's internal id, which the admin API uses in sub-resource paths.
    fn client_id_for(
        &self,
        token: &AccessToken,
        realm: &RealmName,
        client: &ClientName,
    ) -> Result<String, RemoteError> {
        self.get_client(token, realm, client)?
            .found()
            .and_then(|c| c.id)
            .ok_or_else(|| RemoteError::NotFound(format!("client '{client}' in realm '{realm}'")))
    }
}

impl IdentityBackend for HttpBackend {
    fn issue_token(&self, admin: &AdminCredentials) -> Result<AccessToken, RemoteError> {
        let url = self.config.token_url();
        tracing::debug!("POST {url} (user {})", admin.username);
        let resp = self
            .agent
            .post(&url)
            .send_form([
                ("grant_type", "password"),
                ("client_id", ADMIN_CLIENT_ID),
                ("username", admin.username.as_str()),
                ("password", admin.password.as_str()),
            ])
            .map_err(|e| map_error("POST", &url, e))?;
        let body = read_body(resp)?;
        let token: TokenResponse = serde_json::from_slice(&body)
            .map_err(|e| RemoteError::Serialization(format!("token response: {e}")))?;
        Ok(AccessToken::new(token.access_token))
    }

    fn get_realm(
        &self,
        token: &AccessToken,
        realm: &RealmName,
    ) -> Result<Lookup<Realm>, RemoteError> {
        let url = self.realm_url(realm);
        tracing::debug!("GET {url}");
        Ok(self.do_get(&url, token, &[])?.into())
    }

    fn create_realm(&self, token: &AccessToken, realm: &Realm) -> Result<(), RemoteError> {
        let url = self.config.admin_realms_url();
        tracing::debug!("POST {url} (realm {})", realm.realm);
        self.do_send(SendMethod::Post, &url, token, realm)
    }

    fn get_client(
        &self,
        token: &AccessToken,
        realm: &RealmName,
        client: &ClientName,
    ) -> Result<Lookup<Client>, RemoteError> {
        let url = format!("{}/clients", self.realm_url(realm));
        tracing::debug!("GET {url}?clientId={client}");
        let clients: Vec<Client> = self
            .do_get(&url, token, &[("clientId", client.as_str())])?
            .unwrap_or_default();
        Ok(clients
            .into_iter()
            .find(|c| c.client_id == client.as_str())
            .into())
    }

    fn create_client(
        &self,
        token: &AccessToken,
        realm: &RealmName,
        client: &Client,
    ) -> Result<(), RemoteError> {
        let url = format!("{}/clients", self.realm_url(realm));
        tracing::debug!("POST {url} (client {})", client.client_id);
        self.do_send(SendMethod::Post, &url, token, client)
    }

    fn update_client(
        &self,
        token: &AccessToken,
        realm: &RealmName,
        client: &Client,
    ) -> Result<(), RemoteError> {
        let id = client.id.as_deref().ok_or_else(|| {
            RemoteError::NotFound(format!("client '{}' has no id", client.client_id))
        })?;
        let url = format!("{}/clients/{}", self.realm_url(realm), urlencoding::encode(id));
        tracing::debug!("PUT {url}");
        self.do_send(SendMethod::Put, &url, token, client)
    }

    fn create_role(
        &self,
        token: &AccessToken,
        realm: &RealmName,
        role: &AccessRole,
    ) -> Result<(), RemoteError> {
        let url = format!("{}/roles", self.realm_url(realm));
        tracing::debug!("POST {url} (role {})", role.name);
        self.do_send(SendMethod::Post, &url, token, role)
    }

    fn get_role(
        &self,
        token: &AccessToken,
        realm: &RealmName,
        role: &RoleName,
    ) -> Result<Lookup<AccessRole>, RemoteError> {
        let url = format!(
            "{}/roles/{}",
            self.realm_url(realm),
            urlencoding::encode(role.as_str())
        );
        tracing::debug!("GET {url}");
        Ok(self.do_get(&url, token, &[])?.into())
    }

    fn get_user(
        &self,
        token: &AccessToken,
        realm: &RealmName,
        username: &Username,
    ) -> Result<Lookup<User>, RemoteError> {
        let url = format!("{}/users", self.realm_url(realm));
        tracing::debug!("GET {url}?username={username}");
        let users: Vec<User> = self
            .do_get(
                &url,
                token,
                &[("username", username.as_str()), ("exact", "true")],
            )?
            .unwrap_or_default();
        // `username` is a substring search on older servers even with `exact`.
        Ok(users
            .into_iter()
            .find(|u| u.username.eq_ignore_ascii_case(username.as_str()))
            .into())
    }

    fn add_user_role(
        &self,
        token: &AccessToken,
        realm: &RealmName,
        username: &Username,
        role: &RoleName,
    ) -> Result<(), RemoteError> {
        let user_id = self
            .get_user(token, realm, username)?
            .found()
            .and_then(|u| u.id)
            .ok_or_else(|| {
                RemoteError::NotFound(format!("user '{username}' in realm '{realm}'"))
            })?;
        let role = self
            .get_role(token, realm, role)?
            .found()
            .ok_or_else(|| RemoteError::NotFound(format!("role '{role}' in realm '{realm}'")))?;
        let url = format!(
            "{}/users/{}/role-mappings/realm",
            self.realm_url(realm),
            urlencoding::encode(&user_id)
        );
        tracing::debug!("POST {url} (role {})", role.name);
        self.do_send(SendMethod::Post, &url, token, &[role])
    }

    fn get_client_secret(
        &self,
        token: &AccessToken,
        realm: &RealmName,
        client: &ClientName,
    ) -> Result<RegisteredSecret, RemoteError> {
        let id = self.client_id_for(token, realm, client)?;
        let url = format!(
            "{}/clients/{}/client-secret",
            self.realm_url(realm),
            urlencoding::encode(&id)
        );
        tracing::debug!("GET {url}");
        self.do_get(&url, token, &[])?
            .ok_or_else(|| RemoteError::NotFound(format!("secret of client '{client}'")))
    }
}

/// Readiness probe that issues a plain `GET` against the service base URL.
///
/// A single probe never runs longer than the smaller of the configured
/// timeout and the limit the caller passes in.
pub struct HttpProbe {
    agent: ureq::Agent,
    timeout: Duration,
}

impl HttpProbe {
    pub fn new(timeout: Duration) -> Self {
        Self {
            agent: build_agent(timeout),
            timeout,
        }
    }
}

impl Probe for HttpProbe {
    fn probe(&self, url: &str, limit: Duration) -> bool {
        let timeout = self.timeout.min(limit);
        let request = self
            .agent
            .get(url)
            .config()
            .timeout_global(Some(timeout))
            .build();
        let code = match request.call() {
            Ok(resp) => resp.status().as_u16(),
            Err(ureq::Error::StatusCode(code)) => code,
            Err(e) => {
                tracing::trace!("probe {url}: {e}");
                return false;
            }
        };
        tracing::trace!("probe {url}: HTTP {code}");
        code < TRANSPORT_FAILURE_STATUS
    }
}

fn build_agent(timeout: Duration) -> ureq::Agent {
    let config = ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .build();
    ureq::Agent::new_with_config(config)
}

fn map_error(method: &'static str, url: &str, err: ureq::Error) -> RemoteError {
    match err {
        ureq::Error::StatusCode(code) => RemoteError::Status {
            code,
            method,
            url: url.to_owned(),
        },
        other => RemoteError::Http(other.to_string()),
    }
}

fn read_body(resp: ureq::http::Response<ureq::Body>) -> Result<Vec<u8>, RemoteError> {
    let mut reader = resp.into_body().into_reader();
    let mut body = Vec::new();
    reader
        .read_to_end(&mut body)
        .map_err(|e| RemoteError::Http(e.to_string()))?;
    Ok(body)
}
