//! Request model and natural keys for kcprov.
//!
//! This crate defines the input side of a provisioning run: the validated
//! `ProvisioningRequest`, the natural keys derived from it (role name, secret
//! name, redirect pattern), and the layered `RequestFile` read from
//! `kcprov.toml` and merged with command-line overrides.

pub mod request;
pub mod types;

pub use request::{
    parse_request_file, parse_request_str, AdminCredentials, AdminSection, ProvisioningRequest,
    RequestError, RequestFile, REQUEST_VERSION,
};
pub use types::{ClientName, RealmName, RoleName, Username, WorkspaceId};

/// Prefix shared by the per-workspace access role and client secret names.
pub const WORKSPACE_KEY_PREFIX: &str = "codewind-";
