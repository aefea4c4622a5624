//! cliniq - command-line client for the Cliniq clinic management platform.
//!
//! A thin consumer of `cliniq-core`: it logs in, restores the persisted
//! session at startup, and forwards raw authenticated requests. The mobile
//! front-end uses the same library surface.

use std::io::{self, Write as _};
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cliniq_core::store::file::STORE_FILE;
use cliniq_core::store::DeviceKey;
use cliniq_core::{
    ApiClient, Config, CredentialStore, FileStore, KeyValueStore, RequestOptions, SessionManager,
};

/// Initialize the tracing subscriber for logging.
/// Use RUST_LOG to control the level (e.g. RUST_LOG=debug); diagnostics go
/// to stderr and to a daily-rolled file under the storage directory.
fn init_tracing(log_dir: &Path) -> tracing_appender::non_blocking::WorkerGuard {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let file_appender = tracing_appender::rolling::daily(log_dir, "cliniq.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr).with_target(false))
        .with(fmt::layer().with_writer(file_writer).with_ansi(false))
        .with(filter)
        .init();
    guard
}

fn print_usage() {
    eprintln!("Usage: cliniq <command>");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  login [username] [--remember]   Authenticate and persist the session");
    eprintln!("  logout                          Wipe the local session");
    eprintln!("  whoami                          Show the logged-in user");
    eprintln!("  status                          Show session details");
    eprintln!("  request <METHOD> <path> [json]  Send an authenticated API request");
    eprintln!("  forget [username]               Drop remembered credentials");
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let mut config = Config::load()?;
    let log_dir = config.storage_dir()?.join("logs");
    let _guard = init_tracing(&log_dir);

    let args: Vec<String> = std::env::args().collect();
    let Some(command) = args.get(1) else {
        print_usage();
        return Ok(());
    };

    let api = ApiClient::new(&config.api_base_url())?;
    let store = open_store(&config)?;
    let manager = SessionManager::new(api, store);

    match command.as_str() {
        "login" => cmd_login(&manager, &mut config, &args[2..]).await,
        "logout" => cmd_logout(&manager).await,
        "whoami" => cmd_whoami(&manager).await,
        "status" => cmd_status(&manager).await,
        "request" => cmd_request(&manager, &args[2..]).await,
        "forget" => cmd_forget(&config, &args[2..]),
        other => {
            eprintln!("Unknown command: {}", other);
            print_usage();
            Ok(())
        }
    }
}

/// Open the session store, sealed with the per-device keychain key.
/// Headless machines without a keychain fall back to a plaintext store file.
fn open_store(config: &Config) -> Result<Arc<dyn KeyValueStore>> {
    let path = config.storage_dir()?.join(STORE_FILE);
    match DeviceKey::load_or_create() {
        Ok(key) => Ok(Arc::new(FileStore::open_sealed(path, &key)?)),
        Err(e) => {
            warn!(error = %e, "keychain unavailable, using plaintext store");
            Ok(Arc::new(FileStore::open_plain(path)?))
        }
    }
}

async fn cmd_login(
    manager: &SessionManager,
    config: &mut Config,
    args: &[String],
) -> Result<()> {
    let remember = args.iter().any(|a| a == "--remember");
    let username = match args.iter().find(|a| !a.starts_with("--")) {
        Some(name) => name.clone(),
        None => match &config.last_username {
            Some(name) => name.clone(),
            None => prompt("Username")?,
        },
    };
    if username.is_empty() {
        bail!("Username must not be empty");
    }

    let password = match CredentialStore::recall(&username) {
        Ok(Some(saved)) => {
            info!(%username, "using remembered credentials");
            saved
        }
        _ => rpassword::prompt_password("Password: ").context("Failed to read password")?,
    };

    let user = manager.login(&username, &password).await?;

    config.last_username = Some(username.clone());
    config.save()?;
    if remember {
        if let Err(e) = CredentialStore::remember(&username, &password) {
            warn!(error = %e, "could not remember credentials");
        }
    }

    println!("Logged in as {} ({})", user.full_name(), user.role);
    Ok(())
}

async fn cmd_logout(manager: &SessionManager) -> Result<()> {
    manager.logout().await?;
    println!("Logged out.");
    Ok(())
}

async fn cmd_whoami(manager: &SessionManager) -> Result<()> {
    match manager.restore_session().await? {
        Some(user) => println!("{} ({})", user.username, user.role),
        None => println!("Not logged in."),
    }
    Ok(())
}

async fn cmd_status(manager: &SessionManager) -> Result<()> {
    manager.restore_session().await?;
    let session = manager.session().await;

    let Some(user) = session.user() else {
        println!("Not logged in.");
        return Ok(());
    };

    println!("User:     {} ({})", user.full_name(), user.username);
    println!("Role:     {}", user.role);
    if let Some(id) = user.doctor_id {
        println!("Doctor:   {}", id);
    }
    if let Some(id) = user.patient_id {
        println!("Patient:  {}", id);
    }
    if let Some(id) = user.clinic_id {
        println!("Clinic:   {}", id);
    }
    if let Some(at) = session.logged_in_at() {
        println!("Since:    {}", at.format("%Y-%m-%d %H:%M UTC"));
    }
    Ok(())
}

async fn cmd_request(manager: &SessionManager, args: &[String]) -> Result<()> {
    let (Some(method), Some(path)) = (args.first(), args.get(1)) else {
        bail!("Usage: cliniq request <METHOD> <path> [json-body]");
    };
    let method: reqwest::Method = method
        .to_uppercase()
        .parse()
        .map_err(|_| anyhow::anyhow!("Invalid HTTP method: {}", method))?;

    let mut options = RequestOptions::new(method);
    if let Some(body) = args.get(2) {
        let body: serde_json::Value =
            serde_json::from_str(body).context("Request body is not valid JSON")?;
        options = options.json(body);
    }

    if manager.restore_session().await?.is_none() {
        bail!("Not logged in");
    }

    let response = manager.authenticated_request(path, options).await?;
    let status = response.status();
    let text = response.text().await.unwrap_or_default();

    eprintln!("{}", status);
    match serde_json::from_str::<serde_json::Value>(&text) {
        Ok(value) => println!("{}", serde_json::to_string_pretty(&value)?),
        Err(_) => println!("{}", text),
    }
    Ok(())
}

fn cmd_forget(config: &Config, args: &[String]) -> Result<()> {
    let username = match args.first() {
        Some(name) => name.clone(),
        None => config
            .last_username
            .clone()
            .context("No username given and none remembered")?,
    };
    CredentialStore::forget(&username)?;
    println!("Forgot credentials for {}.", username);
    Ok(())
}

fn prompt(label: &str) -> Result<String> {
    print!("{}: ", label);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}
