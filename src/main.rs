// src/main.rs

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Json, Router,
};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi;

mod common;
mod config;
mod db;
mod docs;
mod handlers;
mod middleware;
mod models;
mod services;

use crate::config::{AppState, Config};
use crate::docs::ApiDoc;
use crate::middleware::auth::resolve_actor;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .compact()
        .init();

    let config = Config::from_env()?;
    let app_state = AppState::new(&config).await?;

    sqlx::migrate!().run(&app_state.db_pool).await?;
    tracing::info!("✅ Database migrations applied");

    if let Some((email, password)) = &config.admin {
        app_state.auth_service.ensure_superuser(email, password).await?;
    }

    let app = router(app_state);

    let listener = TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("🚀 Server listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

fn router(app_state: AppState) -> Router {
    let auth_routes = Router::new()
        .route("/register", post(handlers::auth::register))
        .route("/login", post(handlers::auth::login))
        .route("/refresh", post(handlers::auth::refresh))
        .route("/logout", post(handlers::auth::logout));

    let user_routes = Router::new()
        .route("/me", get(handlers::auth::get_me))
        .route(
            "/me/profile",
            get(handlers::auth::get_profile).put(handlers::auth::update_profile),
        );

    let organization_routes = Router::new()
        .route(
            "/",
            get(handlers::organizations::list_organizations)
                .post(handlers::organizations::create_organization),
        )
        .route(
            "/{id}",
            get(handlers::organizations::get_organization)
                .put(handlers::organizations::update_organization)
                .delete(handlers::organizations::delete_organization),
        )
        .route(
            "/{id}/fields",
            get(handlers::organizations::list_field_definitions)
                .post(handlers::organizations::create_field_definition),
        )
        .route(
            "/{id}/fields/{field_id}",
            axum::routing::put(handlers::organizations::update_field_definition)
                .delete(handlers::organizations::delete_field_definition),
        );

    let management_routes = Router::new()
        .route(
            "/",
            get(handlers::organizations::list_management)
                .post(handlers::organizations::create_management),
        )
        .route("/{id}", get(handlers::organizations::get_management))
        .route("/{id}/set_status", post(handlers::organizations::set_management_status));

    let membership_routes = Router::new()
        .route(
            "/",
            get(handlers::memberships::list_memberships).post(handlers::memberships::request_join),
        )
        .route("/{id}", get(handlers::memberships::get_membership))
        .route("/{id}/approve", post(handlers::memberships::approve_membership))
        .route("/{id}/reject", post(handlers::memberships::reject_membership))
        .route("/{id}/leave", post(handlers::memberships::leave_membership));

    let service_routes = Router::new()
        .route(
            "/",
            get(handlers::ledger::list_services).post(handlers::ledger::create_service),
        )
        .route(
            "/{id}",
            get(handlers::ledger::get_service)
                .put(handlers::ledger::update_service)
                .delete(handlers::ledger::delete_service),
        );

    let saving_routes = Router::new()
        .route("/", get(handlers::ledger::list_savings).post(handlers::ledger::create_saving))
        .route("/{id}", get(handlers::ledger::get_saving));

    let loan_routes = Router::new()
        .route("/", get(handlers::ledger::list_loans).post(handlers::ledger::create_loan))
        .route("/{id}", get(handlers::ledger::get_loan))
        .route("/{id}/approve", post(handlers::ledger::approve_loan))
        .route("/{id}/reject", post(handlers::ledger::reject_loan))
        .route("/{id}/mark_paid", post(handlers::ledger::mark_loan_paid));

    let insurance_routes = Router::new()
        .route(
            "/",
            get(handlers::ledger::list_insurances).post(handlers::ledger::create_insurance),
        )
        .route("/{id}", get(handlers::ledger::get_insurance));

    let payment_routes = Router::new()
        .route(
            "/providers",
            get(handlers::payments::list_providers).post(handlers::payments::create_provider),
        )
        .route(
            "/providers/{id}",
            get(handlers::payments::get_provider)
                .put(handlers::payments::update_provider)
                .delete(handlers::payments::delete_provider),
        )
        .route(
            "/transactions",
            get(handlers::payments::list_transactions).post(handlers::payments::create_transaction),
        )
        .route("/transactions/{id}", get(handlers::payments::get_transaction))
        .route(
            "/transactions/{id}/mark_success",
            post(handlers::payments::mark_transaction_success),
        )
        .route(
            "/transactions/{id}/mark_failed",
            post(handlers::payments::mark_transaction_failed),
        )
        .route(
            "/callbacks",
            get(handlers::payments::list_callbacks).post(handlers::payments::receive_callback),
        )
        .route("/callbacks/{id}", get(handlers::payments::get_callback))
        .route(
            "/callbacks/{id}/mark_processed",
            post(handlers::payments::mark_callback_processed),
        );

    let api = Router::new()
        .route("/health", get(|| async { "OK" }))
        .nest("/auth", auth_routes)
        .nest("/users", user_routes)
        .nest("/organizations", organization_routes)
        .nest("/management", management_routes)
        .nest("/memberships", membership_routes)
        .nest("/services", service_routes)
        .nest("/savings", saving_routes)
        .nest("/loans", loan_routes)
        .nest("/insurances", insurance_routes)
        .nest("/payments", payment_routes)
        // Every /api request resolves its actor once
        .layer(axum_middleware::from_fn_with_state(app_state.clone(), resolve_actor));

    Router::new()
        .nest("/api", api)
        .route("/api-docs/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .with_state(app_state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, draining connections");
}
