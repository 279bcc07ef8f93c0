use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
};
use tokio::signal;
use tower_cookies::CookieManagerLayer;
use tower_governor::governor::GovernorConfigBuilder;
use tower_http::{
    services::ServeDir,
    trace::{TraceLayer, DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, DefaultOnFailure},
};
use tracing::Level;

pub mod config;
pub mod error;
pub mod events;
pub mod state;
pub mod views;

pub mod crypto {
    pub mod csrf;
}

pub mod models {
    pub mod diary;
    pub mod session;
}

pub mod provider {
    pub mod auth;
    pub mod rows;
}

pub mod services {
    pub mod diary;
    pub mod session;
}

pub mod handlers {
    pub mod auth;
    pub mod entries;
    pub mod profile;
}

pub mod middleware_layer {
    pub mod auth;
    pub mod csrf;
}

pub mod validation {
    pub mod entry;
}

use state::AppState;

/// Assembles the page router around the given state.
///
/// Route groups, outermost middleware last:
/// * public pages resolve the session and render either variant
/// * credential posts additionally pass rate limiting and CSRF
/// * writing pages require a session outright
pub fn build_router(state: AppState) -> Router {
    let auth_governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(5)
            .burst_size(20)
            .use_headers()
            .finish()
            .unwrap(),
    );

    let page_routes = Router::new()
        .route("/", get(handlers::entries::list_entries))
        .route("/diary/{id}", get(handlers::entries::entry_detail))
        .route("/auth/register", get(handlers::auth::register_redirect))
        .route(
            "/auth/reset-password",
            get(handlers::auth::reset_password_page),
        )
        .route("/auth/callback", get(handlers::auth::callback));

    let auth_routes = Router::new()
        .route(
            "/auth/login",
            get(handlers::auth::login_page).post(handlers::auth::login),
        )
        .route("/auth/signup", post(handlers::auth::signup))
        .layer(tower_governor::GovernorLayer::new(auth_governor_conf))
        .route_layer(from_fn(middleware_layer::csrf::verify_csrf));

    let logout_routes = Router::new()
        .route("/auth/logout", post(handlers::auth::logout))
        .route_layer(from_fn(middleware_layer::csrf::verify_csrf));

    let protected_routes = Router::new()
        .route("/profile", get(handlers::profile::profile_page))
        .route(
            "/diary/new",
            get(handlers::entries::new_entry_page).post(handlers::entries::create_entry),
        )
        .route(
            "/diary/edit/{id}",
            get(handlers::entries::edit_entry_page).post(handlers::entries::update_entry),
        )
        .route(
            "/diary/{id}/delete",
            get(handlers::entries::delete_confirm_page).post(handlers::entries::delete_entry),
        )
        .route_layer(from_fn(middleware_layer::csrf::verify_csrf))
        .route_layer(from_fn(middleware_layer::auth::require_session));

    Router::new()
        .merge(page_routes)
        .merge(auth_routes)
        .merge(logout_routes)
        .merge(protected_routes)
        .fallback(handlers::entries::not_found_page)
        .layer(from_fn_with_state(
            state.clone(),
            middleware_layer::auth::resolve_session,
        ))
        .nest_service("/static", ServeDir::new("static"))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default())
                .on_request(DefaultOnRequest::default().level(Level::DEBUG))
                .on_response(DefaultOnResponse::default().level(Level::DEBUG))
                .on_failure(DefaultOnFailure::default().level(Level::ERROR)),
        )
        .layer(CookieManagerLayer::new())
        .layer(DefaultBodyLimit::max(256 * 1024))
        .with_state(state)
}

/// Runs the server on the given listener until Ctrl+C or SIGTERM.
pub async fn serve(listener: tokio::net::TcpListener, state: AppState) -> anyhow::Result<()> {
    let app = build_router(state);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
        tracing::info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
        tracing::info!("Received terminate signal, shutting down");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
