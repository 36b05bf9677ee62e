use axum::{
    middleware,
    response::Json,
    routing::{get, post, put},
    Router,
};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::auth::{api as auth_api, auth_middleware, require_role, AuthState, UserRole};
use crate::middleware::request_logging;

/// Create the API router
pub fn create_router(state: AuthState) -> Router {
    // Public routes
    let public_routes = Router::new()
        .route("/health", get(health_check))
        .route("/api/auth/register", post(auth_api::register))
        .route("/api/auth/login", post(auth_api::login))
        .with_state(state.clone());

    // Any authenticated user
    let protected_routes = Router::new()
        .route(
            "/api/auth/me",
            get(auth_api::get_current_user).put(auth_api::update_current_user),
        )
        .route_layer(middleware::from_fn_with_state(
            state.gate.clone(),
            auth_middleware,
        ))
        .with_state(state.clone());

    // Admin only; the role check runs after authentication
    let admin_routes = Router::new()
        .route("/api/admin/users", get(auth_api::list_users))
        .route(
            "/api/admin/users/:id",
            get(auth_api::get_user).delete(auth_api::delete_user),
        )
        .route("/api/admin/users/:id/role", put(auth_api::update_user_role))
        .route_layer(middleware::from_fn_with_state(UserRole::Admin, require_role))
        .route_layer(middleware::from_fn_with_state(
            state.gate.clone(),
            auth_middleware,
        ))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(admin_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(middleware::from_fn(request_logging))
                .layer(CorsLayer::permissive()),
        )
}

// ===== Route Handlers =====

/// Health check endpoint
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ===== Request/Response Types =====

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}
