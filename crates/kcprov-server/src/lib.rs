//! Reference identity server speaking the subset of the Keycloak admin API
//! that kcprov uses.
//!
//! State lives in memory in a [`Directory`]. Admin sessions are issued by the
//! `master` realm token endpoint against a single configured admin account.
//! The server can be told to answer `503` for its first N requests, which is
//! how a booting identity service looks to the readiness wait.
//!
//! The [`TestServer`] helper starts a server on a random port for integration testing.

pub mod directory;

pub use directory::{ApiError, Directory, RealmSnapshot};

use kcprov_remote::{AccessRole, Client, Realm};
use serde::Serialize;
use std::borrow::Cow;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tiny_http::{Header, Method, Request, Response, Server, StatusCode};
use tracing::{debug, info, warn};

const TOKEN_PATH: &str = "/realms/master/protocol/openid-connect/token";
const ADMIN_PREFIX: &str = "/admin/realms";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub admin_username: String,
    pub admin_password: String,
    /// Number of initial requests answered with `503` before serving.
    pub unready_requests: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            admin_username: "admin".to_owned(),
            admin_password: "admin".to_owned(),
            unready_requests: 0,
        }
    }
}

/// Shared server state: directory contents, issued tokens, and a request log.
pub struct IdentityService {
    config: ServerConfig,
    directory: Mutex<Directory>,
    tokens: Mutex<Vec<String>>,
    log: Mutex<Vec<String>>,
    unready_remaining: AtomicU32,
    token_counter: AtomicU64,
}

impl IdentityService {
    pub fn new(config: ServerConfig) -> Self {
        let unready = config.unready_requests;
        Self {
            config,
            directory: Mutex::new(Directory::new()),
            tokens: Mutex::new(Vec::new()),
            log: Mutex::new(Vec::new()),
            unready_remaining: AtomicU32::new(unready),
            token_counter: AtomicU64::new(0),
        }
    }

    pub fn directory(&self) -> MutexGuard<'_, Directory> {
        self.directory.lock().expect("directory lock poisoned")
    }

    /// `"METHOD /path"` for every request served so far, query strings dropped.
    pub fn request_log(&self) -> Vec<String> {
        self.log.lock().expect("log lock poisoned").clone()
    }

    fn record(&self, method: &Method, path: &str) {
        self.log
            .lock()
            .expect("log lock poisoned")
            .push(format!("{method} {path}"));
    }

    fn issue_token(&self) -> String {
        let n = self.token_counter.fetch_add(1, Ordering::SeqCst) + 1;
        let token = format!("kcprov-test-token-{n}");
        self.tokens
            .lock()
            .expect("token lock poisoned")
            .push(token.clone());
        token
    }

    fn is_authorized(&self, req: &Request) -> bool {
        let Some(value) = header_value(req, "Authorization") else {
            return false;
        };
        let Some(token) = value.strip_prefix("Bearer ") else {
            return false;
        };
        self.tokens
            .lock()
            .expect("token lock poisoned")
            .iter()
            .any(|t| t == token)
    }

    /// While the unready budget lasts, consume one unit and report `true`.
    fn still_booting(&self) -> bool {
        self.unready_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

fn header_value(req: &Request, name: &str) -> Option<String> {
    req.headers()
        .iter()
        .find(|h| h.field.as_str().as_str().eq_ignore_ascii_case(name))
        .map(|h| h.value.as_str().to_owned())
}

fn respond_err(req: Request, code: u16, msg: &str) {
    let body = serde_json::json!({ "errorMessage": msg }).to_string();
    let header = Header::from_bytes("Content-Type", "application/json").expect("valid header");
    let _ = req.respond(
        Response::from_string(body)
            .with_status_code(StatusCode(code))
            .with_header(header),
    );
}

fn respond_json(req: Request, value: &impl Serialize) {
    let Ok(json) = serde_json::to_vec(value) else {
        respond_err(req, 500, "serialization failed");
        return;
    };
    let header = Header::from_bytes("Content-Type", "application/json").expect("valid header");
    let _ = req.respond(Response::from_data(json).with_header(header));
}

fn respond_status(req: Request, code: u16) {
    let _ = req.respond(Response::empty(StatusCode(code)));
}

fn read_body(req: &mut Request) -> Option<Vec<u8>> {
    let mut body = Vec::new();
    if req.as_reader().read_to_end(&mut body).is_ok() {
        Some(body)
    } else {
        None
    }
}

fn read_json<T: serde::de::DeserializeOwned>(req: &mut Request) -> Result<T, ApiError> {
    let body = read_body(req).ok_or_else(|| ApiError {
        code: 500,
        message: "read error".to_owned(),
    })?;
    serde_json::from_slice(&body).map_err(|e| ApiError {
        code: 400,
        message: format!("invalid JSON: {e}"),
    })
}

/// Decode `a=1&b=2` (query string or form body) into pairs.
pub fn parse_pairs(input: &[u8]) -> Vec<(String, String)> {
    url::form_urlencoded::parse(input).into_owned().collect()
}

fn pair<'a>(pairs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    pairs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

/// Admin API route, with path segments already decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminRoute {
    Realms,
    Realm(String),
    Clients(String),
    Client(String, String),
    ClientSecret(String, String),
    Roles(String),
    Role(String, String),
    Users(String),
    UserRealmRoles(String, String),
}

/// Parse a path below `/admin/realms` into an [`AdminRoute`].
pub fn parse_admin_route(path: &str) -> Option<AdminRoute> {
    let rest = path.strip_prefix(ADMIN_PREFIX)?;
    if !(rest.is_empty() || rest.starts_with('/')) {
        return None;
    }
    let segments: Vec<String> = rest
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|s| urlencoding::decode(s).map_or_else(|_| s.to_owned(), Cow::into_owned))
        .collect();
    let seg: Vec<&str> = segments.iter().map(String::as_str).collect();
    let route = match seg.as_slice() {
        [] => AdminRoute::Realms,
        [realm] => AdminRoute::Realm((*realm).to_owned()),
        [realm, "clients"] => AdminRoute::Clients((*realm).to_owned()),
        [realm, "clients", id] => AdminRoute::Client((*realm).to_owned(), (*id).to_owned()),
        [realm, "clients", id, "client-secret"] => {
            AdminRoute::ClientSecret((*realm).to_owned(), (*id).to_owned())
        }
        [realm, "roles"] => AdminRoute::Roles((*realm).to_owned()),
        [realm, "roles", name] => AdminRoute::Role((*realm).to_owned(), (*name).to_owned()),
        [realm, "users"] => AdminRoute::Users((*realm).to_owned()),
        [realm, "users", id, "role-mappings", "realm"] => {
            AdminRoute::UserRealmRoles((*realm).to_owned(), (*id).to_owned())
        }
        _ => return None,
    };
    Some(route)
}

fn handle_token(service: &IdentityService, mut req: Request) {
    let Some(body) = read_body(&mut req) else {
        respond_err(req, 500, "read error");
        return;
    };
    let form = parse_pairs(&body);
    let valid = pair(&form, "grant_type") == Some("password")
        && pair(&form, "client_id") == Some("admin-cli")
        && pair(&form, "username") == Some(service.config.admin_username.as_str())
        && pair(&form, "password") == Some(service.config.admin_password.as_str());
    if !valid {
        warn!("rejected admin login for {:?}", pair(&form, "username"));
        respond_err(req, 401, "invalid_grant");
        return;
    }
    let token = service.issue_token();
    respond_json(
        req,
        &serde_json::json!({
            "access_token": token,
            "expires_in": 60,
            "token_type": "Bearer",
        }),
    );
}

fn dispatch_admin(
    service: &IdentityService,
    req: &mut Request,
    method: &Method,
    route: AdminRoute,
    query: &[(String, String)],
) -> Result<Reply, ApiError> {
    let mut dir = service.directory();
    match (method, route) {
        (Method::Post, AdminRoute::Realms) => {
            let realm: Realm = read_json(req)?;
            info!("create realm {}", realm.realm);
            dir.create_realm(realm)?;
            Ok(Reply::Status(201))
        }
        (Method::Get, AdminRoute::Realm(realm)) => Ok(Reply::json(&dir.get_realm(&realm)?)),
        (Method::Get, AdminRoute::Clients(realm)) => {
            let clients = dir.list_clients(&realm, pair(query, "clientId"))?;
            Ok(Reply::json(&clients))
        }
        (Method::Post, AdminRoute::Clients(realm)) => {
            let client: Client = read_json(req)?;
            info!("create client {} in {realm}", client.client_id);
            dir.create_client(&realm, client)?;
            Ok(Reply::Status(201))
        }
        (Method::Put, AdminRoute::Client(realm, id)) => {
            let client: Client = read_json(req)?;
            info!("update client {id} in {realm}");
            dir.update_client(&realm, &id, client)?;
            Ok(Reply::Status(204))
        }
        (Method::Get, AdminRoute::ClientSecret(realm, id)) => {
            let value = dir.client_secret(&realm, &id)?;
            Ok(Reply::json(
                &serde_json::json!({ "type": "secret", "value": value }),
            ))
        }
        (Method::Post, AdminRoute::Roles(realm)) => {
            let role: AccessRole = read_json(req)?;
            info!("create role {} in {realm}", role.name);
            dir.create_role(&realm, role)?;
            Ok(Reply::Status(201))
        }
        (Method::Get, AdminRoute::Role(realm, name)) => {
            Ok(Reply::json(&dir.get_role(&realm, &name)?))
        }
        (Method::Get, AdminRoute::Users(realm)) => {
            let users = dir.find_users(&realm, pair(query, "username"))?;
            Ok(Reply::json(&users))
        }
        (Method::Post, AdminRoute::UserRealmRoles(realm, id)) => {
            let roles: Vec<AccessRole> = read_json(req)?;
            info!("grant {} role(s) to {id} in {realm}", roles.len());
            dir.grant_roles(&realm, &id, &roles)?;
            Ok(Reply::Status(204))
        }
        _ => Err(ApiError {
            code: 405,
            message: "method not allowed".to_owned(),
        }),
    }
}

enum Reply {
    Status(u16),
    Json(serde_json::Value),
}

impl Reply {
    fn json(value: &impl Serialize) -> Self {
        Reply::Json(serde_json::to_value(value).unwrap_or(serde_json::Value::Null))
    }
}

/// Handle a single HTTP request, dispatching to the appropriate route handler.
pub fn handle_request(service: &IdentityService, mut req: Request) {
    let method = req.method().clone();
    let url = req.url().to_owned();
    let (path, query) = url.split_once('?').unwrap_or((url.as_str(), ""));
    let path = path.to_owned();
    let query = parse_pairs(query.as_bytes());
    debug!("{method} {path}");
    service.record(&method, &path);

    if service.still_booting() {
        respond_err(req, 503, "starting up");
        return;
    }

    if path == TOKEN_PATH && method == Method::Post {
        handle_token(service, req);
    } else if let Some(route) = parse_admin_route(&path) {
        if !service.is_authorized(&req) {
            respond_err(req, 401, "HTTP 401 Unauthorized");
            return;
        }
        match dispatch_admin(service, &mut req, &method, route, &query) {
            Ok(Reply::Status(code)) => respond_status(req, code),
            Ok(Reply::Json(value)) => respond_json(req, &value),
            Err(e) => {
                debug!("{method} {path}: {} {}", e.code, e.message);
                respond_err(req, e.code, &e.message);
            }
        }
    } else if (path == "/" || path.is_empty()) && method == Method::Get {
        let _ = req.respond(Response::from_string("kcprov reference identity server"));
    } else {
        respond_err(req, 404, "not found");
    }
}

/// Start the server loop, blocking the current thread.
pub fn run_server(service: &Arc<IdentityService>, addr: &str) -> std::io::Result<()> {
    let server = Server::http(addr).map_err(std::io::Error::other)?;
    for request in server.incoming_requests() {
        handle_request(service, request);
    }
    Ok(())
}

/// A test helper that starts a reference server on a random port in a background thread.
///
/// The server listens on `127.0.0.1:{port}`. Drop the `TestServer` to stop it.
pub struct TestServer {
    pub url: String,
    pub port: u16,
    pub service: Arc<IdentityService>,
    server: Arc<Server>,
    _handle: std::thread::JoinHandle<()>,
}

impl TestServer {
    /// Start a server with the default `admin`/`admin` account.
    pub fn start() -> Self {
        Self::start_with(ServerConfig::default())
    }

    pub fn start_with(config: ServerConfig) -> Self {
        let server =
            Arc::new(Server::http("127.0.0.1:0").expect("failed to bind test HTTP server"));
        let port = server.server_addr().to_ip().expect("not an IP addr").port();
        let url = format!("http://127.0.0.1:{port}");

        let service = Arc::new(IdentityService::new(config));
        let srv = Arc::clone(&server);
        let svc = Arc::clone(&service);
        let handle = std::thread::spawn(move || {
            for request in srv.incoming_requests() {
                handle_request(&svc, request);
            }
        });

        Self {
            url,
            port,
            service,
            server,
            _handle: handle,
        }
    }

    /// Seed a user account for `realm`.
    #[must_use]
    pub fn with_user(self, realm: &str, username: &str) -> Self {
        self.service.directory().seed_user(realm, username);
        self
    }

    pub fn snapshot(&self) -> Vec<RealmSnapshot> {
        self.service.directory().snapshot()
    }

    pub fn request_log(&self) -> Vec<String> {
        self.service.request_log()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.server.unblock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_admin_route_variants() {
        assert_eq!(parse_admin_route("/admin/realms"), Some(AdminRoute::Realms));
        assert_eq!(
            parse_admin_route("/admin/realms/codewind"),
            Some(AdminRoute::Realm("codewind".to_owned()))
        );
        assert_eq!(
            parse_admin_route("/admin/realms/codewind/clients/c-1/client-secret"),
            Some(AdminRoute::ClientSecret(
                "codewind".to_owned(),
                "c-1".to_owned()
            ))
        );
        assert_eq!(
            parse_admin_route("/admin/realms/codewind/users/u-1/role-mappings/realm"),
            Some(AdminRoute::UserRealmRoles(
                "codewind".to_owned(),
                "u-1".to_owned()
            ))
        );
    }

    #[test]
    fn parse_admin_route_decodes_segments() {
        assert_eq!(
            parse_admin_route("/admin/realms/my%20realm/roles/codewind-ws1"),
            Some(AdminRoute::Role(
                "my realm".to_owned(),
                "codewind-ws1".to_owned()
            ))
        );
    }

    #[test]
    fn parse_admin_route_rejects_unknown() {
        assert!(parse_admin_route("/admin/realms/r/groups").is_none());
        assert!(parse_admin_route("/other").is_none());
        assert!(parse_admin_route("/admin/realmsfoo").is_none());
    }

    #[test]
    fn parse_pairs_decodes_form() {
        let pairs = parse_pairs(b"grant_type=password&username=dev+one&password=p%40ss");
        assert_eq!(pair(&pairs, "grant_type"), Some("password"));
        assert_eq!(pair(&pairs, "username"), Some("dev one"));
        assert_eq!(pair(&pairs, "password"), Some("p@ss"));
        assert_eq!(pair(&pairs, "missing"), None);
    }

    #[test]
    fn parse_admin_route_keeps_malformed_escapes() {
        assert_eq!(
            parse_admin_route("/admin/realms/100%"),
            Some(AdminRoute::Realm("100%".to_owned()))
        );
    }

    #[test]
    fn unready_budget_runs_out() {
        let service = IdentityService::new(ServerConfig {
            unready_requests: 2,
            ..ServerConfig::default()
        });
        assert!(service.still_booting());
        assert!(service.still_booting());
        assert!(!service.still_booting());
    }
}
