//! Process Configuration
//!
//! Flags and environment variables are parsed once at startup; the result is
//! immutable and handed to components by construction.

use clap::Parser;
use secrecy::{ExposeSecret, SecretString};
use std::net::SocketAddr;
use thiserror::Error;

/// Minimum signing secret length in bytes (HS256 key size).
pub const MIN_SECRET_LEN: usize = 32;
pub const DEFAULT_TOKEN_TTL_HOURS: i64 = 24;
pub const DEFAULT_ISSUER: &str = "membership-api";
pub const MIN_BCRYPT_COST: u32 = 4;
pub const MAX_BCRYPT_COST: u32 = 31;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("JWT secret must be at least {} bytes", MIN_SECRET_LEN)]
    WeakSecret,
    #[error("token TTL must be a positive number of hours, got {0}")]
    InvalidTtl(i64),
    #[error("bcrypt cost must be between {} and {}, got {0}", MIN_BCRYPT_COST, MAX_BCRYPT_COST)]
    InvalidCost(u32),
    #[error("admin bootstrap needs both ADMIN_EMAIL and ADMIN_PASSWORD")]
    PartialAdmin,
}

#[derive(Parser)]
#[command(name = "membership")]
#[command(about = "Membership backend - registration, login and role-gated access")]
pub struct Args {
    /// Listen address
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:8080")]
    pub bind: SocketAddr,

    /// SQLite database file for user records
    #[arg(long, env = "AUTH_DB_PATH", default_value = "membership.db")]
    pub db_path: String,

    /// HMAC signing secret for bearer tokens
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: String,

    /// Token lifetime in hours
    #[arg(long, env = "JWT_EXPIRATION_HOURS", default_value_t = DEFAULT_TOKEN_TTL_HOURS)]
    pub jwt_expiration_hours: i64,

    /// Issuer label written into and required on every token
    #[arg(long, env = "JWT_ISSUER", default_value = DEFAULT_ISSUER)]
    pub jwt_issuer: String,

    /// bcrypt work factor
    #[arg(long, env = "BCRYPT_COST", default_value_t = bcrypt::DEFAULT_COST)]
    pub bcrypt_cost: u32,

    /// Email of the admin account created on first start
    #[arg(long, env = "ADMIN_EMAIL")]
    pub admin_email: Option<String>,

    /// Password of the admin account created on first start
    #[arg(long, env = "ADMIN_PASSWORD", hide_env_values = true)]
    pub admin_password: Option<String>,
}

/// Security parameters shared by the token authority and password hasher.
#[derive(Debug)]
pub struct AuthConfig {
    pub jwt_secret: SecretString,
    pub token_ttl_hours: i64,
    pub issuer: String,
    pub bcrypt_cost: u32,
}

impl AuthConfig {
    /// Defaults for everything except the secret.
    pub fn new(jwt_secret: impl Into<String>) -> Self {
        Self {
            jwt_secret: SecretString::from(jwt_secret.into()),
            token_ttl_hours: DEFAULT_TOKEN_TTL_HOURS,
            issuer: DEFAULT_ISSUER.to_string(),
            bcrypt_cost: bcrypt::DEFAULT_COST,
        }
    }

    pub fn with_ttl_hours(mut self, hours: i64) -> Self {
        self.token_ttl_hours = hours;
        self
    }

    pub fn with_bcrypt_cost(mut self, cost: u32) -> Self {
        self.bcrypt_cost = cost;
        self
    }

    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = issuer.into();
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jwt_secret.expose_secret().len() < MIN_SECRET_LEN {
            return Err(ConfigError::WeakSecret);
        }
        if self.token_ttl_hours <= 0 {
            return Err(ConfigError::InvalidTtl(self.token_ttl_hours));
        }
        if !(MIN_BCRYPT_COST..=MAX_BCRYPT_COST).contains(&self.bcrypt_cost) {
            return Err(ConfigError::InvalidCost(self.bcrypt_cost));
        }
        Ok(())
    }
}

/// Credentials for the bootstrap admin account.
pub struct AdminSeed {
    pub email: String,
    pub password: SecretString,
}

impl std::fmt::Debug for AdminSeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminSeed")
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

/// Validated runtime configuration.
#[derive(Debug)]
pub struct Config {
    pub bind: SocketAddr,
    pub db_path: String,
    pub auth: AuthConfig,
    pub admin: Option<AdminSeed>,
}

impl Config {
    pub fn from_args(args: Args) -> Result<Self, ConfigError> {
        let auth = AuthConfig {
            jwt_secret: SecretString::from(args.jwt_secret),
            token_ttl_hours: args.jwt_expiration_hours,
            issuer: args.jwt_issuer,
            bcrypt_cost: args.bcrypt_cost,
        };
        auth.validate()?;

        let admin = match (args.admin_email, args.admin_password) {
            (Some(email), Some(password)) => Some(AdminSeed {
                email,
                password: SecretString::from(password),
            }),
            (None, None) => None,
            _ => return Err(ConfigError::PartialAdmin),
        };

        Ok(Self {
            bind: args.bind,
            db_path: args.db_path,
            auth,
            admin,
        })
    }
}
