//! Authentication Module
//! Mission: Password credentials, bearer tokens and role-gated access

pub mod api;
pub mod error;
pub mod extract;
pub mod jwt;
pub mod middleware;
pub mod models;
pub mod password;
pub mod service;
pub mod user_store;

pub use api::AuthState;
pub use error::AuthError;
pub use extract::ApiJson;
pub use jwt::JwtHandler;
pub use middleware::{auth_middleware, authorize, require_role, AuthContext, AuthGate};
pub use models::{User, UserRole};
pub use password::{BcryptHasher, CredentialVerifier};
pub use service::AuthService;
pub use user_store::{CredentialStore, UserStore};
