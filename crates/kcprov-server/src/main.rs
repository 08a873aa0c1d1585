use clap::Parser;
use kcprov_server::{IdentityService, ServerConfig};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser)]
#[command(
    name = "kcprov-server",
    about = "Reference identity server for kcprov (in-memory, not for production)"
)]
struct Cli {
    /// Port to listen on.
    #[arg(long, default_value_t = 8080)]
    port: u16,

    /// Admin account accepted by the master realm token endpoint.
    #[arg(long, default_value = "admin")]
    admin_user: String,

    /// Password of the admin account.
    #[arg(long, default_value = "admin")]
    admin_password: String,

    /// Seed a user account, as `<realm>:<username>`. May be repeated.
    #[arg(long = "user", value_name = "REALM:USERNAME")]
    users: Vec<String>,

    /// Answer the first N requests with 503 to mimic a booting server.
    #[arg(long, default_value_t = 0)]
    unready_requests: u32,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let service = Arc::new(IdentityService::new(ServerConfig {
        admin_username: cli.admin_user,
        admin_password: cli.admin_password,
        unready_requests: cli.unready_requests,
    }));
    for entry in &cli.users {
        let Some((realm, username)) = entry.split_once(':') else {
            error!("invalid --user '{entry}', expected <realm>:<username>");
            return ExitCode::from(2);
        };
        service.directory().seed_user(realm, username);
        info!("seeded user {username} in realm {realm}");
    }

    let addr = format!("0.0.0.0:{}", cli.port);
    info!("starting kcprov-server on {addr}");
    if let Err(e) = kcprov_server::run_server(&service, &addr) {
        error!("server failed: {e}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
