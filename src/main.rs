//! Timetable portal server.
//!
//! Serves the REST API on `0.0.0.0:$PORT` over a Sled store at
//! `$DATABASE_PATH`, forwarding generation requests to the Python optimiser at
//! `$PYTHON_API_URL`.
//!
//! Usage:
//!   cargo run --bin load_data            # optional sample data
//!   cargo run --bin timetable_portal     # start server

use std::net::SocketAddr;
use std::sync::Arc;

use chrono::Utc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use uuid::Uuid;

use timetable_portal::auth::hash_password;
use timetable_portal::config::{AppConfig, SuperadminSeed};
use timetable_portal::logging;
use timetable_portal::mail::{HttpMailer, LogMailer, Mailer};
use timetable_portal::models::{Admin, AdminRole};
use timetable_portal::rest::{create_router, AppState};
use timetable_portal::scheduler::PythonScheduler;
use timetable_portal::storage::Storage;

/// Creates the configured superadmin unless an admin with that email exists.
fn ensure_superadmin(
    storage: &Storage,
    seed: &SuperadminSeed,
    bcrypt_cost: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    if storage.find_admin_by_email(&seed.email)?.is_some() {
        return Ok(());
    }
    let admin = Admin {
        id: Uuid::new_v4().to_string(),
        name: "Super Admin".to_string(),
        email: seed.email.clone(),
        password_hash: hash_password(&seed.password, bcrypt_cost)?,
        role: AdminRole::Superadmin,
        department: None,
        created_at: Utc::now(),
    };
    storage.create_admin(&admin)?;
    info!(email = %seed.email, "superadmin created");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for ctrl-c: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutting down...");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::from_env()?;
    let _log_guard = logging::init(&config);
    for key in &config.fallback_secrets {
        warn!("{key} not set, using development fallback");
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!(
        env = if config.production { "production" } else { "development" },
        database = %config.database_path,
        scheduler = %config.python_api_url,
        "Timetable portal starting on {addr}"
    );

    let storage = Storage::open(&config.database_path)?;
    if let Some(seed) = &config.superadmin {
        ensure_superadmin(&storage, seed, config.bcrypt_cost)?;
    }

    let scheduler = Arc::new(PythonScheduler::new(
        &config.python_api_url,
        config.scheduler_timeout,
    )?);
    let mailer: Arc<dyn Mailer> = match &config.mail {
        Some(mail) => Arc::new(HttpMailer::new(mail.clone())?),
        None => {
            warn!("MAIL_API_URL/MAIL_API_KEY not set, OTP mails will only be logged");
            Arc::new(LogMailer)
        }
    };

    let state = AppState::new(storage.clone(), config, scheduler, mailer);
    let app = create_router(state);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    storage.flush().await?;
    Ok(())
}
