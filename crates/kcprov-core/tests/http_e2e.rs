//! Full provisioning runs over HTTP against the in-memory reference server.

use kcprov_core::{
    provision, wait_until_ready, CoreError, ProvisionOptions, Provisioner, ReconciliationOutcome,
    RetryPolicy, Step,
};
use kcprov_remote::{HttpBackend, HttpProbe, RemoteConfig};
use kcprov_schema::{
    AdminCredentials, ClientName, ProvisioningRequest, RealmName, Username, WorkspaceId,
};
use kcprov_server::{ServerConfig, TestServer};
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

fn request(server: &TestServer) -> ProvisioningRequest {
    ProvisioningRequest {
        workspace_id: WorkspaceId::new("ws1"),
        auth_url: server.url.clone(),
        realm: RealmName::new("codewind"),
        admin: AdminCredentials {
            username: "admin".to_owned(),
            password: "admin".to_owned(),
        },
        callback_url: "https://gatekeeper.example".to_owned(),
        developer: Username::new("dev1"),
        client: ClientName::new("codewind-client"),
    }
}

fn options() -> ProvisionOptions {
    ProvisionOptions {
        retry: RetryPolicy::new(10, Duration::from_millis(10)),
        timeout: Duration::from_secs(5),
    }
}

fn provisioner(server: &TestServer) -> Provisioner<HttpBackend, HttpProbe> {
    let timeout = Duration::from_secs(5);
    Provisioner::new(
        HttpBackend::new(RemoteConfig::new(&server.url).with_timeout(timeout)),
        HttpProbe::new(timeout),
    )
    .with_policy(RetryPolicy::new(10, Duration::from_millis(10)))
}

fn count(log: &[String], entry: &str) -> usize {
    log.iter().filter(|l| *l == entry).count()
}

#[test]
fn provisions_fresh_server() {
    let server = TestServer::start().with_user("codewind", "dev1");
    let secret = provision(&request(&server), &options()).unwrap();
    assert!(!secret.is_empty());

    let snapshot = server.snapshot();
    assert_eq!(snapshot.len(), 1);
    let realm = &snapshot[0];
    assert_eq!(realm.name, "codewind");
    assert_eq!(
        realm.clients,
        vec![(
            "codewind-client".to_owned(),
            vec!["https://gatekeeper.example/*".to_owned()]
        )]
    );
    assert_eq!(realm.roles, vec!["codewind-ws1"]);
    assert_eq!(
        realm.grants,
        vec![("dev1".to_owned(), vec!["codewind-ws1".to_owned()])]
    );
}

#[test]
fn rerun_is_idempotent() {
    let server = TestServer::start().with_user("codewind", "dev1");
    let p = provisioner(&server);
    let req = request(&server);

    let first = p.provision(&req).unwrap();
    let before = server.snapshot();
    let second = p.provision(&req).unwrap();

    assert_eq!(first.secret, second.secret);
    assert_eq!(server.snapshot(), before);
    assert_eq!(
        second.outcome(Step::Realm),
        Some(ReconciliationOutcome::AlreadySatisfied)
    );
    assert_eq!(
        second.outcome(Step::Client),
        Some(ReconciliationOutcome::AlreadySatisfied)
    );

    let log = server.request_log();
    assert_eq!(count(&log, "POST /admin/realms"), 1);
    assert_eq!(count(&log, "POST /admin/realms/codewind/clients"), 1);
    assert_eq!(count(&log, "POST /admin/realms/codewind/roles"), 2);
    assert!(!log.iter().any(|l| l.starts_with("PUT ")));
    assert!(!log.iter().any(|l| l.starts_with("DELETE ")));
}

#[test]
fn second_workspace_shares_realm_and_client() {
    let server = TestServer::start().with_user("codewind", "dev1");
    let p = provisioner(&server);
    let first = p.provision(&request(&server)).unwrap();

    let mut other = request(&server);
    other.workspace_id = WorkspaceId::new("ws2");
    other.callback_url = "https://gatekeeper-2.example/".to_owned();
    let other = other.validate().unwrap();
    let second = p.provision(&other).unwrap();

    assert_eq!(first.secret, second.secret);
    assert_eq!(
        second.outcome(Step::Client),
        Some(ReconciliationOutcome::Updated)
    );
    let snapshot = server.snapshot();
    let realm = &snapshot[0];
    assert_eq!(
        realm.clients[0].1,
        vec![
            "https://gatekeeper.example/*".to_owned(),
            "https://gatekeeper-2.example/*".to_owned(),
        ]
    );
    assert_eq!(realm.roles, vec!["codewind-ws1", "codewind-ws2"]);
    assert_eq!(
        realm.grants,
        vec![(
            "dev1".to_owned(),
            vec!["codewind-ws1".to_owned(), "codewind-ws2".to_owned()]
        )]
    );
}

#[test]
fn missing_developer_is_reported_and_nothing_granted() {
    let server = TestServer::start();
    let err = provision(&request(&server), &options()).unwrap_err();

    assert_eq!(err.step(), Some(Step::VerifyUser));
    assert!(err
        .to_string()
        .contains("developer account 'dev1' not found in realm 'codewind'"));

    let snapshot = server.snapshot();
    assert!(snapshot[0].grants.is_empty());
    let log = server.request_log();
    assert!(!log.iter().any(|l| l.contains("role-mappings")));
    assert!(!log.iter().any(|l| l.ends_with("/client-secret")));
}

#[test]
fn wrong_admin_password_fails_authentication() {
    let server = TestServer::start().with_user("codewind", "dev1");
    let mut req = request(&server);
    req.admin.password = "not-admin".to_owned();

    let err = provision(&req, &options()).unwrap_err();
    assert!(matches!(err, CoreError::Auth(_)), "{err}");
    assert!(err.to_string().contains("401"));
    assert!(server.snapshot().is_empty());
    let log = server.request_log();
    assert!(!log.iter().any(|l| l.contains("/admin/")));
}

#[test]
fn waits_for_booting_server() {
    let server = TestServer::start_with(ServerConfig {
        unready_requests: 3,
        ..ServerConfig::default()
    })
    .with_user("codewind", "dev1");

    let report = provisioner(&server).provision(&request(&server)).unwrap();
    assert_eq!(report.probe_attempts, 4);
    assert_eq!(&server.request_log()[..4], ["GET /", "GET /", "GET /", "GET /"]);
}

#[test]
fn server_that_never_comes_up() {
    let server = TestServer::start_with(ServerConfig {
        unready_requests: u32::MAX,
        ..ServerConfig::default()
    });
    let options = ProvisionOptions {
        retry: RetryPolicy::new(4, Duration::from_millis(50)),
        timeout: Duration::from_secs(5),
    };

    let err = provision(&request(&server), &options).unwrap_err();
    assert!(matches!(
        err,
        CoreError::ServiceUnavailable { attempts: 4, .. }
    ));
    assert_eq!(server.request_log().len(), 4);
}

#[test]
fn nothing_listening_is_unavailable() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let server = TestServer::start();
    let mut req = request(&server);
    req.auth_url = format!("http://127.0.0.1:{port}");
    let options = ProvisionOptions {
        retry: RetryPolicy::new(2, Duration::from_millis(20)),
        timeout: Duration::from_secs(1),
    };

    let err = provision(&req, &options).unwrap_err();
    assert_eq!(err.step(), Some(Step::WaitForService));
    assert!(server.request_log().is_empty());
}

#[test]
fn silent_service_releases_caller_within_budget() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    std::thread::spawn(move || {
        let mut held = Vec::new();
        for stream in listener.incoming() {
            let Ok(stream) = stream else { break };
            held.push(stream);
        }
    });
    let policy = RetryPolicy::new(3, Duration::from_millis(50));

    let start = Instant::now();
    let err = wait_until_ready(&HttpProbe::new(Duration::from_secs(30)), &url, policy).unwrap_err();
    let elapsed = start.elapsed();

    assert!(matches!(err, CoreError::ServiceUnavailable { .. }));
    assert!(
        elapsed <= policy.budget() + policy.interval,
        "waited {elapsed:?} on a {:?} budget",
        policy.budget()
    );
}

#[derive(Clone, Default)]
struct Capture(Arc<Mutex<Vec<u8>>>);

impl Write for Capture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[test]
fn progress_goes_to_the_injected_subscriber() {
    let server = TestServer::start().with_user("codewind", "dev1");
    let capture = Capture::default();
    let writer = capture.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::INFO)
        .finish();

    let report = tracing::subscriber::with_default(subscriber, || {
        provisioner(&server).provision(&request(&server))
    })
    .unwrap();

    let output = String::from_utf8(capture.0.lock().unwrap().clone()).unwrap();
    assert!(output.contains("creating realm codewind"), "{output}");
    assert!(output.contains("creating client codewind-client"), "{output}");
    assert!(output.contains("workspace ws1 provisioned"), "{output}");
    assert!(output.contains("workspace=ws1"), "{output}");
    assert!(!output.contains(&report.secret), "secret leaked into logs");
}
