//! Authentication Middleware
//! Mission: Resolve bearer tokens to live users and gate routes by role

use crate::auth::{
    error::AuthError,
    jwt::JwtHandler,
    models::{User, UserRole},
    user_store::{CredentialStore, StoreError},
};
use crate::clock::Clock;
use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::{debug, warn};

/// Identity resolved by [`AuthGate::authenticate`], attached to the request.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user: User,
}

impl AuthContext {
    pub fn role(&self) -> UserRole {
        self.user.role
    }
}

/// Authentication gate: bearer header -> token authority -> live store record
#[derive(Clone)]
pub struct AuthGate {
    jwt: Arc<JwtHandler>,
    store: Arc<dyn CredentialStore>,
    clock: Arc<dyn Clock>,
}

impl AuthGate {
    pub fn new(jwt: Arc<JwtHandler>, store: Arc<dyn CredentialStore>, clock: Arc<dyn Clock>) -> Self {
        Self { jwt, store, clock }
    }

    /// Resolve a raw `Authorization` header value to the current user record.
    pub fn authenticate(&self, header: Option<&str>) -> Result<AuthContext, AuthError> {
        let header = match header {
            Some(h) if !h.is_empty() => h,
            _ => return Err(AuthError::MissingCredential),
        };

        let token = parse_bearer(header)?;

        let subject = self
            .jwt
            .validate(token, self.clock.now())
            .map_err(|kind| {
                debug!(reason = kind.as_str(), "Bearer token rejected");
                AuthError::Unauthenticated
            })?;

        // The token's role claim is not trusted; the stored record is.
        let user = self.store.get_by_id(&subject.subject_id).map_err(|e| match e {
            StoreError::NotFound => {
                debug!(user_id = %subject.subject_id, "Token subject no longer exists");
                AuthError::Unauthenticated
            }
            other => AuthError::from(other),
        })?;

        Ok(AuthContext { user })
    }
}

/// Split `Bearer <token>` into its token part.
fn parse_bearer(header: &str) -> Result<&str, AuthError> {
    let mut parts = header.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) if !token.is_empty() => Ok(token),
        _ => Err(AuthError::MalformedCredential),
    }
}

/// Authorization gate: exact role match, no hierarchy.
pub fn authorize(ctx: &AuthContext, required: UserRole) -> Result<(), AuthError> {
    if ctx.role() == required {
        Ok(())
    } else {
        warn!(
            user_id = %ctx.user.id,
            role = %ctx.role(),
            required = %required,
            "Role check failed"
        );
        Err(AuthError::Forbidden)
    }
}

/// Auth middleware that validates bearer tokens and attaches [`AuthContext`]
pub async fn auth_middleware(
    State(gate): State<AuthGate>,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let header = match req.headers().get(AUTHORIZATION) {
        Some(value) => Some(
            value
                .to_str()
                .map_err(|_| AuthError::MalformedCredential)?
                .to_owned(),
        ),
        None => None,
    };

    // The store lookup blocks on the SQLite connection lock.
    let ctx = tokio::task::spawn_blocking(move || gate.authenticate(header.as_deref()))
        .await
        .map_err(|e| AuthError::Internal(format!("auth task failed: {e}")))??;

    req.extensions_mut().insert(ctx);

    Ok(next.run(req).await)
}

/// Role middleware; must be layered inside [`auth_middleware`]
pub async fn require_role(
    State(required): State<UserRole>,
    req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let ctx = req
        .extensions()
        .get::<AuthContext>()
        .ok_or(AuthError::Unauthenticated)?;

    authorize(ctx, required)?;

    Ok(next.run(req).await)
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .ok_or(AuthError::Unauthenticated)
    }
}
