//! In-memory identity directory behind the reference server.
//!
//! Realms own their clients, roles, and role grants. User accounts are kept
//! apart from realms, the way federated accounts are: they can be seeded for a
//! realm before that realm has been created.

use kcprov_remote::{AccessRole, Client, Realm, User};
use std::collections::{BTreeMap, BTreeSet};

/// HTTP-level failure of a directory operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub code: u16,
    pub message: String,
}

impl ApiError {
    fn not_found(what: impl Into<String>) -> Self {
        Self {
            code: 404,
            message: format!("{} not found", what.into()),
        }
    }

    fn conflict(what: impl Into<String>) -> Self {
        Self {
            code: 409,
            message: format!("{} already exists", what.into()),
        }
    }

    fn bad_request(msg: impl Into<String>) -> Self {
        Self {
            code: 400,
            message: msg.into(),
        }
    }
}

#[derive(Debug, Clone)]
struct ClientRecord {
    client: Client,
    secret: String,
}

#[derive(Debug, Clone)]
struct RealmRecord {
    realm: Realm,
    clients: Vec<ClientRecord>,
    roles: Vec<AccessRole>,
    /// user id -> granted realm role names
    grants: BTreeMap<String, BTreeSet<String>>,
}

/// Point-in-time view of one realm, for assertions in tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RealmSnapshot {
    pub name: String,
    /// `(clientId, redirectUris)` in creation order.
    pub clients: Vec<(String, Vec<String>)>,
    pub roles: Vec<String>,
    /// `(username, role names)` for every user holding at least one role.
    pub grants: Vec<(String, Vec<String>)>,
}

#[derive(Debug, Default)]
pub struct Directory {
    realms: BTreeMap<String, RealmRecord>,
    users: BTreeMap<String, Vec<User>>,
    next_id: u64,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{:08x}", self.next_id)
    }

    /// Register an account for `realm`, whether or not the realm exists yet.
    pub fn seed_user(&mut self, realm: &str, username: &str) {
        let id = self.next_id("user");
        let users = self.users.entry(realm.to_owned()).or_default();
        if users.iter().any(|u| u.username == username) {
            return;
        }
        users.push(User {
            id: Some(id),
            username: username.to_owned(),
            enabled: true,
        });
    }

    fn realm(&self, name: &str) -> Result<&RealmRecord, ApiError> {
        self.realms
            .get(name)
            .ok_or_else(|| ApiError::not_found(format!("realm '{name}'")))
    }

    fn realm_mut(&mut self, name: &str) -> Result<&mut RealmRecord, ApiError> {
        self.realms
            .get_mut(name)
            .ok_or_else(|| ApiError::not_found(format!("realm '{name}'")))
    }

    pub fn get_realm(&self, name: &str) -> Result<Realm, ApiError> {
        Ok(self.realm(name)?.realm.clone())
    }

    pub fn create_realm(&mut self, mut realm: Realm) -> Result<(), ApiError> {
        if realm.realm.is_empty() {
            return Err(ApiError::bad_request("realm name must not be empty"));
        }
        if self.realms.contains_key(&realm.realm) {
            return Err(ApiError::conflict(format!("realm '{}'", realm.realm)));
        }
        realm.id = Some(self.next_id("realm"));
        self.realms.insert(
            realm.realm.clone(),
            RealmRecord {
                realm,
                clients: Vec::new(),
                roles: Vec::new(),
                grants: BTreeMap::new(),
            },
        );
        Ok(())
    }

    /// Clients of `realm`, optionally filtered by exact `clientId`.
    pub fn list_clients(
        &self,
        realm: &str,
        client_id: Option<&str>,
    ) -> Result<Vec<Client>, ApiError> {
        Ok(self
            .realm(realm)?
            .clients
            .iter()
            .filter(|r| client_id.map_or(true, |id| r.client.client_id == id))
            .map(|r| r.client.clone())
            .collect())
    }

    pub fn create_client(&mut self, realm: &str, mut client: Client) -> Result<(), ApiError> {
        let id = self.next_id("client");
        let secret = self.next_id("secret");
        let record = self.realm_mut(realm)?;
        if record
            .clients
            .iter()
            .any(|r| r.client.client_id == client.client_id)
        {
            return Err(ApiError::conflict(format!("client '{}'", client.client_id)));
        }
        client.id = Some(id);
        record.clients.push(ClientRecord { client, secret });
        Ok(())
    }

    pub fn update_client(&mut self, realm: &str, id: &str, client: Client) -> Result<(), ApiError> {
        let record = self.realm_mut(realm)?;
        let existing = record
            .clients
            .iter_mut()
            .find(|r| r.client.id.as_deref() == Some(id))
            .ok_or_else(|| ApiError::not_found(format!("client id '{id}'")))?;
        let mut client = client;
        client.id = Some(id.to_owned());
        existing.client = client;
        Ok(())
    }

    pub fn client_secret(&self, realm: &str, id: &str) -> Result<String, ApiError> {
        self.realm(realm)?
            .clients
            .iter()
            .find(|r| r.client.id.as_deref() == Some(id))
            .map(|r| r.secret.clone())
            .ok_or_else(|| ApiError::not_found(format!("client id '{id}'")))
    }

    pub fn create_role(&mut self, realm: &str, mut role: AccessRole) -> Result<(), ApiError> {
        let id = self.next_id("role");
        let record = self.realm_mut(realm)?;
        if record.roles.iter().any(|r| r.name == role.name) {
            return Err(ApiError::conflict(format!("role '{}'", role.name)));
        }
        role.id = Some(id);
        record.roles.push(role);
        Ok(())
    }

    pub fn get_role(&self, realm: &str, name: &str) -> Result<AccessRole, ApiError> {
        self.realm(realm)?
            .roles
            .iter()
            .find(|r| r.name == name)
            .cloned()
            .ok_or_else(|| ApiError::not_found(format!("role '{name}'")))
    }

    pub fn find_users(&self, realm: &str, username: Option<&str>) -> Result<Vec<User>, ApiError> {
        self.realm(realm)?;
        Ok(self
            .users
            .get(realm)
            .map(|users| {
                users
                    .iter()
                    .filter(|u| username.map_or(true, |name| u.username.eq_ignore_ascii_case(name)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    /// Grant realm roles to a user. Already-held roles are left as they are.
    pub fn grant_roles(
        &mut self,
        realm: &str,
        user_id: &str,
        roles: &[AccessRole],
    ) -> Result<(), ApiError> {
        let known_user = self
            .users
            .get(realm)
            .is_some_and(|users| users.iter().any(|u| u.id.as_deref() == Some(user_id)));
        let record = self.realm_mut(realm)?;
        if !known_user {
            return Err(ApiError::not_found(format!("user id '{user_id}'")));
        }
        for role in roles {
            if !record.roles.iter().any(|r| r.name == role.name) {
                return Err(ApiError::not_found(format!("role '{}'", role.name)));
            }
        }
        let held = record.grants.entry(user_id.to_owned()).or_default();
        held.extend(roles.iter().map(|r| r.name.clone()));
        Ok(())
    }

    pub fn snapshot(&self) -> Vec<RealmSnapshot> {
        self.realms
            .values()
            .map(|record| {
                let users = self.users.get(&record.realm.realm);
                let username_of = |id: &str| {
                    users
                        .and_then(|us| us.iter().find(|u| u.id.as_deref() == Some(id)))
                        .map_or_else(|| id.to_owned(), |u| u.username.clone())
                };
                RealmSnapshot {
                    name: record.realm.realm.clone(),
                    clients: record
                        .clients
                        .iter()
                        .map(|r| (r.client.client_id.clone(), r.client.redirect_uris.clone()))
                        .collect(),
                    roles: record.roles.iter().map(|r| r.name.clone()).collect(),
                    grants: record
                        .grants
                        .iter()
                        .map(|(id, roles)| (username_of(id), roles.iter().cloned().collect()))
                        .collect(),
                }
            })
            .collect()
    }
}
