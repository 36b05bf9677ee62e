//! Authentication API Endpoints
//! Mission: Provide registration, login, profile and user management endpoints

use crate::auth::{
    error::AuthError,
    extract::ApiJson,
    middleware::{AuthContext, AuthGate},
    models::{
        LoginRequest, LoginResponse, RegisterRequest, UpdateProfileRequest, UpdateRoleRequest,
        UserResponse,
    },
    service::AuthService,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

pub const DEFAULT_PAGE_SIZE: u32 = 50;
pub const MAX_PAGE_SIZE: u32 = 200;

/// Shared auth state
#[derive(Clone)]
pub struct AuthState {
    pub service: Arc<AuthService>,
    pub gate: AuthGate,
}

impl AuthState {
    pub fn new(service: Arc<AuthService>) -> Self {
        let gate = AuthGate::new(service.jwt(), service.store(), service.clock());
        Self { service, gate }
    }
}

/// bcrypt is CPU-bound and SQLite calls block on the connection lock;
/// keep both off the async workers.
async fn run_blocking<T, F>(service: &Arc<AuthService>, f: F) -> Result<T, AuthError>
where
    T: Send + 'static,
    F: FnOnce(&AuthService) -> Result<T, AuthError> + Send + 'static,
{
    let service = service.clone();
    tokio::task::spawn_blocking(move || f(&service))
        .await
        .map_err(|e| AuthError::Internal(format!("worker task failed: {e}")))?
}

/// Register endpoint - POST /api/auth/register
pub async fn register(
    State(state): State<AuthState>,
    ApiJson(payload): ApiJson<RegisterRequest>,
) -> Result<(StatusCode, Json<Value>), AuthError> {
    run_blocking(&state.service, move |svc| svc.register(payload)).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "User registered successfully" })),
    ))
}

/// Login endpoint - POST /api/auth/login
pub async fn login(
    State(state): State<AuthState>,
    ApiJson(payload): ApiJson<LoginRequest>,
) -> Result<Json<LoginResponse>, AuthError> {
    let outcome = run_blocking(&state.service, move |svc| {
        svc.login(&payload.email, &payload.password)
    })
    .await?;

    Ok(Json(LoginResponse {
        user: UserResponse::from_user(&outcome.user),
        token: outcome.token.token,
        expires_at: outcome.token.expires_at,
    }))
}

/// Get current user - GET /api/auth/me
pub async fn get_current_user(ctx: AuthContext) -> Json<UserResponse> {
    Json(UserResponse::from_user(&ctx.user))
}

/// Update own profile - PUT /api/auth/me
pub async fn update_current_user(
    State(state): State<AuthState>,
    ctx: AuthContext,
    ApiJson(payload): ApiJson<UpdateProfileRequest>,
) -> Result<Json<UserResponse>, AuthError> {
    let user = run_blocking(&state.service, move |svc| {
        svc.update_profile(&ctx.user.id, payload)
    })
    .await?;

    Ok(Json(UserResponse::from_user(&user)))
}

#[derive(Debug, Deserialize)]
pub struct ListUsersQuery {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

/// List users - GET /api/admin/users (Admin only)
pub async fn list_users(
    State(state): State<AuthState>,
    Query(params): Query<ListUsersQuery>,
) -> Result<Json<Vec<UserResponse>>, AuthError> {
    let limit = params.limit.unwrap_or(DEFAULT_PAGE_SIZE).min(MAX_PAGE_SIZE);
    let offset = params.offset.unwrap_or(0);

    let users = run_blocking(&state.service, move |svc| svc.list_users(limit, offset)).await?;

    Ok(Json(users.iter().map(UserResponse::from_user).collect()))
}

/// Get user - GET /api/admin/users/:id (Admin only)
pub async fn get_user(
    State(state): State<AuthState>,
    Path(user_id): Path<String>,
) -> Result<Json<UserResponse>, AuthError> {
    let id = parse_user_id(&user_id)?;
    let user = run_blocking(&state.service, move |svc| svc.get_user(&id)).await?;
    Ok(Json(UserResponse::from_user(&user)))
}

/// Change role - PUT /api/admin/users/:id/role (Admin only)
pub async fn update_user_role(
    State(state): State<AuthState>,
    ctx: AuthContext,
    Path(user_id): Path<String>,
    ApiJson(payload): ApiJson<UpdateRoleRequest>,
) -> Result<Json<UserResponse>, AuthError> {
    let id = parse_user_id(&user_id)?;
    let role = payload.role;
    let user = run_blocking(&state.service, move |svc| svc.set_role(&id, role)).await?;

    info!("User {} role set to {} by {}", user.id, user.role, ctx.user.id);

    Ok(Json(UserResponse::from_user(&user)))
}

/// Delete user - DELETE /api/admin/users/:id (Admin only)
pub async fn delete_user(
    State(state): State<AuthState>,
    ctx: AuthContext,
    Path(user_id): Path<String>,
) -> Result<StatusCode, AuthError> {
    let id = parse_user_id(&user_id)?;

    // Don't allow deleting yourself
    if id == ctx.user.id {
        return Err(AuthError::Validation(
            "Cannot delete your own account".to_string(),
        ));
    }

    run_blocking(&state.service, move |svc| svc.delete_user(&id)).await?;

    info!("User {} deleted by {}", id, ctx.user.id);

    Ok(StatusCode::NO_CONTENT)
}

fn parse_user_id(raw: &str) -> Result<Uuid, AuthError> {
    Uuid::parse_str(raw).map_err(|_| AuthError::Validation("Invalid user ID format".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_user_id() {
        let id = Uuid::new_v4();
        assert_eq!(parse_user_id(&id.to_string()).unwrap(), id);
        assert!(matches!(
            parse_user_id("not-a-uuid"),
            Err(AuthError::Validation(_))
        ));
    }
}
