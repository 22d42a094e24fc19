mod auth;
mod core;
mod email;
mod empresas;
mod files;
mod notifications;
mod tickets;
mod users;

use anyhow::Context;
use axum::Router;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::core::config::AppConfig;
use crate::core::shared::branding::init_branding;
use crate::core::shared::state::AppState;
use crate::core::shared::utils::create_conn;
use crate::email::Mailer;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env();
    init_branding();

    let pool = create_conn(&config.database_url())?;
    {
        let mut conn = pool.get().context("could not get migration connection")?;
        conn.run_pending_migrations(MIGRATIONS)
            .map_err(|e| anyhow::anyhow!("migrations failed: {e}"))?;
    }

    let mailer = Arc::new(Mailer::new(config.smtp.clone()));
    let state = Arc::new(AppState {
        conn: pool,
        config: config.clone(),
        mailer,
    });

    let app = Router::new()
        .merge(auth::configure_auth_routes())
        .merge(empresas::configure_empresas_routes())
        .merge(users::configure_users_routes())
        .merge(tickets::configure_tickets_routes())
        .merge(notifications::configure_notifications_routes())
        .merge(files::configure_files_routes())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("could not bind {addr}"))?;
    info!("helpdesk server listening on {addr}");
    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
