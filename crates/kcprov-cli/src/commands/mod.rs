pub mod completions;
pub mod provision;
pub mod wait;

use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use kcprov_core::{ProvisionOptions, ReconciliationOutcome, RetryPolicy};
use kcprov_remote::config::DEFAULT_TIMEOUT_SECS;
use kcprov_schema::{parse_request_file, AdminSection, ProvisioningRequest, RequestFile};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_REQUEST_ERROR: u8 = 2;
pub const EXIT_UNAVAILABLE: u8 = 3;
pub const EXIT_AUTH_ERROR: u8 = 4;

/// Read when `--config` is not given and the file exists.
pub const DEFAULT_REQUEST_FILE: &str = "kcprov.toml";

/// Environment variable consulted for the admin password.
pub const ADMIN_PASSWORD_ENV: &str = "KCPROV_ADMIN_PASSWORD";

/// Request fields settable on the command line. Each one overrides the
/// request file.
#[derive(Debug, Default, Args)]
pub struct RequestArgs {
    /// Request file (TOML). Defaults to ./kcprov.toml when present.
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Workspace identifier; the access role is named codewind-<id>.
    #[arg(long)]
    pub workspace_id: Option<String>,
    /// Base URL of the identity service.
    #[arg(long)]
    pub auth_url: Option<String>,
    #[arg(long)]
    pub realm: Option<String>,
    /// OAuth client id registered for the workspace gateway.
    #[arg(long)]
    pub client: Option<String>,
    /// Gateway base URL; `<url>/*` is added to the client's redirect URIs.
    #[arg(long)]
    pub callback_url: Option<String>,
    /// Existing developer account to grant workspace access to.
    #[arg(long)]
    pub developer: Option<String>,
    #[arg(long)]
    pub admin_user: Option<String>,
    /// Admin password. Prefer KCPROV_ADMIN_PASSWORD to keep it out of `ps`.
    #[arg(long)]
    pub admin_password: Option<String>,
}

impl RequestArgs {
    fn overrides(&self) -> RequestFile {
        RequestFile {
            request_version: None,
            workspace_id: self.workspace_id.clone(),
            auth_url: self.auth_url.clone(),
            realm: self.realm.clone(),
            client: self.client.clone(),
            callback_url: self.callback_url.clone(),
            developer: self.developer.clone(),
            admin: AdminSection {
                username: self.admin_user.clone(),
                password: self.admin_password.clone(),
            },
        }
    }

    /// Layer file, environment, then flags, and validate the result.
    pub fn resolve(&self) -> Result<ProvisioningRequest, String> {
        let env = RequestFile {
            admin: AdminSection {
                username: None,
                password: std::env::var(ADMIN_PASSWORD_ENV).ok(),
            },
            ..RequestFile::default()
        };
        load_request_file(self.config.as_deref())?
            .merge(env)
            .merge(self.overrides())
            .into_request()
            .map_err(|e| format!("request error: {e}"))
    }
}

/// Readiness and timeout tunables shared by `provision` and `wait`.
#[derive(Debug, Args)]
pub struct RetryArgs {
    /// Readiness probes before giving up.
    #[arg(long, default_value_t = RetryPolicy::DEFAULT_MAX_ATTEMPTS)]
    pub attempts: u32,
    /// Pause between readiness probes, in milliseconds.
    #[arg(long, default_value_t = 500)]
    pub interval_ms: u64,
    /// Per-request timeout, in seconds.
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout_secs: u64,
}

impl RetryArgs {
    pub fn options(&self) -> ProvisionOptions {
        ProvisionOptions {
            retry: RetryPolicy::new(self.attempts, Duration::from_millis(self.interval_ms)),
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

/// Parse `path`, or the default request file if it exists, or nothing.
pub fn load_request_file(path: Option<&Path>) -> Result<RequestFile, String> {
    let path = match path {
        Some(p) => p,
        None => {
            let default = Path::new(DEFAULT_REQUEST_FILE);
            if !default.exists() {
                return Ok(RequestFile::default());
            }
            default
        }
    };
    parse_request_file(path).map_err(|e| format!("request error: {}: {e}", path.display()))
}

/// Map an error message to the process exit code.
pub fn exit_code_for(msg: &str) -> u8 {
    if msg.starts_with("request error:") {
        EXIT_REQUEST_ERROR
    } else if msg.starts_with("identity service at") {
        EXIT_UNAVAILABLE
    } else if msg.starts_with("authentication failed") {
        EXIT_AUTH_ERROR
    } else {
        EXIT_FAILURE
    }
}

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .expect("valid template")
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    pb.set_message(msg.to_owned());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

pub fn spin_ok(pb: &ProgressBar, msg: &str) {
    pb.set_style(ProgressStyle::with_template("{msg}").expect("valid template"));
    pb.finish_with_message(format!("✓ {msg}"));
}

pub fn spin_fail(pb: &ProgressBar, msg: &str) {
    pb.set_style(ProgressStyle::with_template("{msg}").expect("valid template"));
    pb.finish_with_message(format!("✗ {msg}"));
}

pub fn colorize_outcome(outcome: Option<ReconciliationOutcome>) -> String {
    use console::Style;
    match outcome {
        Some(ReconciliationOutcome::Created) => Style::new().green().apply_to("created").to_string(),
        Some(ReconciliationOutcome::Updated) => Style::new().cyan().apply_to("updated").to_string(),
        Some(ReconciliationOutcome::AlreadySatisfied) => {
            Style::new().dim().apply_to("unchanged").to_string()
        }
        None => Style::new().dim().apply_to("ok").to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn full_args() -> RequestArgs {
        RequestArgs {
            config: None,
            workspace_id: Some("ws1".to_owned()),
            auth_url: Some("http://kc:8080/".to_owned()),
            realm: Some("codewind".to_owned()),
            client: Some("codewind-client".to_owned()),
            callback_url: Some("https://gatekeeper.example".to_owned()),
            developer: Some("dev1".to_owned()),
            admin_user: Some("admin".to_owned()),
            admin_password: Some("secret".to_owned()),
        }
    }

    #[test]
    fn flags_alone_make_a_request() {
        let request = full_args().resolve().unwrap();
        assert_eq!(request.auth_url, "http://kc:8080");
        assert_eq!(request.access_role_name(), "codewind-ws1");
    }

    #[test]
    fn flags_override_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
workspace_id = "from-file"
realm = "file-realm"
"#
        )
        .unwrap();
        let args = RequestArgs {
            config: Some(file.path().to_path_buf()),
            realm: None,
            ..full_args()
        };
        let request = args.resolve().unwrap();
        assert_eq!(request.workspace_id, "ws1");
        assert_eq!(request.realm, "file-realm");
    }

    #[test]
    fn missing_config_file_is_a_request_error() {
        let args = RequestArgs {
            config: Some(PathBuf::from("/nonexistent/kcprov.toml")),
            ..full_args()
        };
        let err = args.resolve().unwrap_err();
        assert!(err.starts_with("request error:"), "{err}");
        assert_eq!(exit_code_for(&err), EXIT_REQUEST_ERROR);
    }

    #[test]
    fn missing_field_is_a_request_error() {
        let args = RequestArgs {
            developer: None,
            ..full_args()
        };
        let err = args.resolve().unwrap_err();
        assert!(err.contains("developer"), "{err}");
        assert_eq!(exit_code_for(&err), EXIT_REQUEST_ERROR);
    }

    #[test]
    fn exit_codes_follow_error_kind() {
        assert_eq!(
            exit_code_for("identity service at http://kc did not become ready after 3 attempts"),
            EXIT_UNAVAILABLE
        );
        assert_eq!(
            exit_code_for("authentication failed: HTTP 401 for POST http://kc/x"),
            EXIT_AUTH_ERROR
        );
        assert_eq!(
            exit_code_for("verify-user failed: developer account 'dev1' not found"),
            EXIT_FAILURE
        );
    }

    #[test]
    fn exit_codes_are_distinct() {
        let codes = [
            EXIT_SUCCESS,
            EXIT_FAILURE,
            EXIT_REQUEST_ERROR,
            EXIT_UNAVAILABLE,
            EXIT_AUTH_ERROR,
        ];
        for (i, a) in codes.iter().enumerate() {
            for b in &codes[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn retry_args_to_options() {
        let args = RetryArgs {
            attempts: 7,
            interval_ms: 250,
            timeout_secs: 3,
        };
        let options = args.options();
        assert_eq!(options.retry.max_attempts, 7);
        assert_eq!(options.retry.interval, Duration::from_millis(250));
        assert_eq!(options.timeout, Duration::from_secs(3));
    }

    #[test]
    fn json_pretty_serializes_object() {
        let val = serde_json::json!({"key": "value"});
        let result = json_pretty(&val).unwrap();
        assert!(result.contains("\"key\""));
    }

    #[test]
    fn colorize_outcome_keeps_label() {
        assert!(colorize_outcome(Some(ReconciliationOutcome::Created)).contains("created"));
        assert!(colorize_outcome(Some(ReconciliationOutcome::AlreadySatisfied)).contains("unchanged"));
        assert!(colorize_outcome(None).contains("ok"));
    }

    #[test]
    fn spinner_finishes() {
        let pb = spinner("testing...");
        spin_ok(&pb, "done");
        let pb = spinner("testing...");
        spin_fail(&pb, "failed");
    }
}
