use std::net::SocketAddr;

use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use survey_api::config::Settings;
use survey_api::security::hash_password;
use survey_api::state::AppStateInner;

const BOOTSTRAP_ADMIN_NAME: &str = "Administrator";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "survey=debug,survey_api=debug,survey_db=info,tower_http=debug".into()
            }),
        )
        .init();

    let settings = Settings::from_env()?;
    let db = survey_db::Database::open(&settings.db_path)?;

    if let (Some(email), Some(password)) = (&settings.admin_email, &settings.admin_password) {
        let email = email.trim().to_lowercase();
        let password_hash = hash_password(password)?;
        if db.ensure_admin(&email, BOOTSTRAP_ADMIN_NAME, &password_hash)? {
            info!("Bootstrap admin {} created", email);
        }
    } else if settings.admin_email.is_some() {
        warn!("SURVEY_ADMIN_EMAIL is set without SURVEY_ADMIN_PASSWORD; no admin bootstrapped");
    }

    let addr: SocketAddr = format!("{}:{}", settings.host, settings.port).parse()?;
    let state = AppStateInner::new(db, settings);

    let app = survey_api::router(state).layer(TraceLayer::new_for_http());

    info!("Survey server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Survey server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Could not listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
