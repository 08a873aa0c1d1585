//! Raw HTTP tests against the reference server, using `ureq` directly.

use kcprov_server::{ServerConfig, TestServer};
use std::io::Read;

fn agent() -> ureq::Agent {
    ureq::Agent::new_with_defaults()
}

fn admin_token(server: &TestServer) -> String {
    let url = format!(
        "{}/realms/master/protocol/openid-connect/token",
        server.url
    );
    let resp = agent()
        .post(&url)
        .send_form([
            ("grant_type", "password"),
            ("client_id", "admin-cli"),
            ("username", "admin"),
            ("password", "admin"),
        ])
        .unwrap();
    let mut body = Vec::new();
    resp.into_body()
        .into_reader()
        .read_to_end(&mut body)
        .unwrap();
    let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
    value["access_token"].as_str().unwrap().to_owned()
}

#[test]
fn root_answers_ok() {
    let server = TestServer::start();
    let resp = agent().get(&server.url).call().unwrap();
    assert_eq!(resp.status().as_u16(), 200);
}

#[test]
fn token_with_wrong_password_is_401() {
    let server = TestServer::start();
    let url = format!(
        "{}/realms/master/protocol/openid-connect/token",
        server.url
    );
    let result = agent().post(&url).send_form([
        ("grant_type", "password"),
        ("client_id", "admin-cli"),
        ("username", "admin"),
        ("password", "nope"),
    ]);
    assert!(matches!(result, Err(ureq::Error::StatusCode(401))));
}

#[test]
fn admin_routes_require_bearer_token() {
    let server = TestServer::start();
    let url = format!("{}/admin/realms/codewind", server.url);
    let result = agent().get(&url).call();
    assert!(matches!(result, Err(ureq::Error::StatusCode(401))));

    let token = admin_token(&server);
    let result = agent()
        .get(&url)
        .header("Authorization", &format!("Bearer {token}"))
        .call();
    assert!(matches!(result, Err(ureq::Error::StatusCode(404))));
}

#[test]
fn realm_create_then_conflict() {
    let server = TestServer::start();
    let token = admin_token(&server);
    let url = format!("{}/admin/realms", server.url);
    let body = br#"{"realm":"codewind","enabled":true}"#;

    let resp = agent()
        .post(&url)
        .header("Authorization", &format!("Bearer {token}"))
        .header("Content-Type", "application/json")
        .send(&body[..])
        .unwrap();
    assert_eq!(resp.status().as_u16(), 201);

    let again = agent()
        .post(&url)
        .header("Authorization", &format!("Bearer {token}"))
        .header("Content-Type", "application/json")
        .send(&body[..]);
    assert!(matches!(again, Err(ureq::Error::StatusCode(409))));

    let snapshot = server.snapshot();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].name, "codewind");
}

#[test]
fn booting_server_answers_503_then_serves() {
    let server = TestServer::start_with(ServerConfig {
        unready_requests: 2,
        ..ServerConfig::default()
    });
    for _ in 0..2 {
        let result = agent().get(&server.url).call();
        assert!(matches!(result, Err(ureq::Error::StatusCode(503))));
    }
    let resp = agent().get(&server.url).call().unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    assert_eq!(server.request_log().len(), 3);
}

#[test]
fn bearer_header_name_is_case_insensitive() {
    let server = TestServer::start();
    let token = admin_token(&server);
    let result = agent()
        .get(&format!("{}/admin/realms/codewind", server.url))
        .header("authorization", &format!("Bearer {token}"))
        .call();
    assert!(matches!(result, Err(ureq::Error::StatusCode(404))));
}

#[test]
fn token_form_decodes_reserved_characters() {
    let server = TestServer::start_with(ServerConfig {
        admin_password: "p@ss w&rd=+".to_owned(),
        ..ServerConfig::default()
    });
    let url = format!(
        "{}/realms/master/protocol/openid-connect/token",
        server.url
    );
    let resp = agent()
        .post(&url)
        .send_form([
            ("grant_type", "password"),
            ("client_id", "admin-cli"),
            ("username", "admin"),
            ("password", "p@ss w&rd=+"),
        ])
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
}
