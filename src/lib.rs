//! Membership Backend Library
//!
//! Registration, login and role-gated access for a small membership API.
//! Exposes the modules used by the `membership` binary and integration tests.

pub mod api;
pub mod auth;
pub mod clock;
pub mod config;
pub mod middleware;

pub use api::create_router;
pub use config::{AuthConfig, Config};
