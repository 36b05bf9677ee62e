//! User Storage
//! Mission: Persist member accounts in SQLite; the only source of truth for who exists

use crate::auth::models::{NewUser, PasswordHash, User, UserRole};
use crate::clock::{Clock, SystemClock};
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("email already registered")]
    DuplicateEmail,
    #[error("user not found")]
    NotFound,
    #[error("stored role {0:?} is not recognised")]
    InvalidRole(String),
    #[error("corrupt row: {0}")]
    Corrupt(String),
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// Storage contract consumed by the auth service and gates.
///
/// Email uniqueness is enforced by the backing store itself, so two racing
/// `create` calls with the same email cannot both succeed.
pub trait CredentialStore: Send + Sync {
    fn create(&self, user: NewUser) -> Result<User, StoreError>;
    fn get_by_id(&self, id: &Uuid) -> Result<User, StoreError>;
    fn get_by_email(&self, email: &str) -> Result<User, StoreError>;
    /// Persists email, name, role and hash; refreshes `updated_at`.
    fn update(&self, user: &User) -> Result<User, StoreError>;
    /// Writes only the given name and/or hash in one statement; role and
    /// email are left as currently stored.
    fn update_profile(
        &self,
        id: &Uuid,
        name: Option<&str>,
        password_hash: Option<&PasswordHash>,
    ) -> Result<User, StoreError>;
    /// Writes only the role in one statement.
    fn set_role(&self, id: &Uuid, role: UserRole) -> Result<User, StoreError>;
    fn delete(&self, id: &Uuid) -> Result<(), StoreError>;
    /// Newest first.
    fn list(&self, limit: u32, offset: u32) -> Result<Vec<User>, StoreError>;
    fn count_by_role(&self, role: UserRole) -> Result<u64, StoreError>;
}

const USER_COLUMNS: &str = "id, email, password_hash, name, role, created_at, updated_at";

/// User storage with SQLite backend
pub struct UserStore {
    conn: Mutex<Connection>,
    clock: Arc<dyn Clock>,
}

impl UserStore {
    /// Open (or create) the database file and initialize schema
    pub fn new(db_path: &str) -> Result<Self, StoreError> {
        Self::with_clock(db_path, Arc::new(SystemClock))
    }

    pub fn with_clock(db_path: &str, clock: Arc<dyn Clock>) -> Result<Self, StoreError> {
        let conn = Connection::open(db_path)?;
        let store = Self {
            conn: Mutex::new(conn),
            clock,
        };
        store.init_db()?;
        debug!("User store opened at {}", db_path);
        Ok(store)
    }

    /// Private in-memory database, mostly for tests
    pub fn open_in_memory(clock: Arc<dyn Clock>) -> Result<Self, StoreError> {
        let store = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
            clock,
        };
        store.init_db()?;
        Ok(store)
    }

    fn init_db(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock();

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT UNIQUE NOT NULL,
                password_hash TEXT NOT NULL CHECK (length(password_hash) > 0),
                name TEXT NOT NULL,
                role TEXT NOT NULL CHECK (role IN ('member', 'admin')),
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_users_created_at ON users(created_at);",
        )?;

        Ok(())
    }

    fn timestamp(&self) -> (DateTime<Utc>, String) {
        let now = self.clock.now();
        (now, now.to_rfc3339_opts(SecondsFormat::Nanos, true))
    }

    fn fetch_one(&self, filter: &str, value: &str) -> Result<User, StoreError> {
        let conn = self.conn.lock();
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {filter} = ?1");

        let raw = conn
            .query_row(&sql, params![value], RawUser::from_row)
            .optional()?;

        raw.ok_or(StoreError::NotFound)?.into_user()
    }
}

impl CredentialStore for UserStore {
    fn create(&self, new_user: NewUser) -> Result<User, StoreError> {
        if new_user.password_hash.is_empty() {
            return Err(StoreError::Corrupt("empty password hash".to_string()));
        }

        let (now, stamp) = self.timestamp();
        let user = User {
            id: Uuid::new_v4(),
            email: new_user.email,
            name: new_user.name,
            password_hash: new_user.password_hash,
            role: new_user.role,
            created_at: now,
            updated_at: now,
        };

        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO users (id, email, password_hash, name, role, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            params![
                user.id.to_string(),
                user.email,
                user.password_hash.as_str(),
                user.name,
                user.role.as_str(),
                stamp,
            ],
        )
        .map_err(map_unique_violation)?;

        info!("Created user {} ({})", user.id, user.role);

        Ok(user)
    }

    fn get_by_id(&self, id: &Uuid) -> Result<User, StoreError> {
        self.fetch_one("id", &id.to_string())
    }

    fn get_by_email(&self, email: &str) -> Result<User, StoreError> {
        self.fetch_one("email", email)
    }

    fn update(&self, user: &User) -> Result<User, StoreError> {
        if user.password_hash.is_empty() {
            return Err(StoreError::Corrupt("empty password hash".to_string()));
        }

        let (now, stamp) = self.timestamp();
        let conn = self.conn.lock();

        let rows_affected = conn
            .execute(
                "UPDATE users
                 SET email = ?1, password_hash = ?2, name = ?3, role = ?4, updated_at = ?5
                 WHERE id = ?6",
                params![
                    user.email,
                    user.password_hash.as_str(),
                    user.name,
                    user.role.as_str(),
                    stamp,
                    user.id.to_string(),
                ],
            )
            .map_err(map_unique_violation)?;

        if rows_affected == 0 {
            return Err(StoreError::NotFound);
        }

        debug!("Updated user {}", user.id);

        Ok(User {
            updated_at: now,
            ..user.clone()
        })
    }

    fn update_profile(
        &self,
        id: &Uuid,
        name: Option<&str>,
        password_hash: Option<&PasswordHash>,
    ) -> Result<User, StoreError> {
        if password_hash.is_some_and(|h| h.is_empty()) {
            return Err(StoreError::Corrupt("empty password hash".to_string()));
        }

        let (_, stamp) = self.timestamp();
        let conn = self.conn.lock();

        let raw = conn
            .query_row(
                &format!(
                    "UPDATE users
                     SET name = COALESCE(?1, name),
                         password_hash = COALESCE(?2, password_hash),
                         updated_at = ?3
                     WHERE id = ?4
                     RETURNING {USER_COLUMNS}"
                ),
                params![
                    name,
                    password_hash.map(PasswordHash::as_str),
                    stamp,
                    id.to_string(),
                ],
                RawUser::from_row,
            )
            .optional()?;

        let user = raw.ok_or(StoreError::NotFound)?.into_user()?;
        debug!("Updated profile of user {}", user.id);
        Ok(user)
    }

    fn set_role(&self, id: &Uuid, role: UserRole) -> Result<User, StoreError> {
        let (_, stamp) = self.timestamp();
        let conn = self.conn.lock();

        let raw = conn
            .query_row(
                &format!(
                    "UPDATE users SET role = ?1, updated_at = ?2
                     WHERE id = ?3
                     RETURNING {USER_COLUMNS}"
                ),
                params![role.as_str(), stamp, id.to_string()],
                RawUser::from_row,
            )
            .optional()?;

        raw.ok_or(StoreError::NotFound)?.into_user()
    }

    fn delete(&self, id: &Uuid) -> Result<(), StoreError> {
        let conn = self.conn.lock();

        let rows_affected = conn.execute("DELETE FROM users WHERE id = ?1", params![id.to_string()])?;

        if rows_affected == 0 {
            return Err(StoreError::NotFound);
        }

        info!("Deleted user {}", id);
        Ok(())
    }

    fn list(&self, limit: u32, offset: u32) -> Result<Vec<User>, StoreError> {
        let conn = self.conn.lock();

        let mut stmt = conn.prepare(&format!(
            "SELECT {USER_COLUMNS} FROM users
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?1 OFFSET ?2"
        ))?;

        let raw = stmt
            .query_map(params![limit, offset], RawUser::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        raw.into_iter().map(RawUser::into_user).collect()
    }

    fn count_by_role(&self, role: UserRole) -> Result<u64, StoreError> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM users WHERE role = ?1",
            params![role.as_str()],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }
}

fn map_unique_violation(err: rusqlite::Error) -> StoreError {
    match &err {
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == ErrorCode::ConstraintViolation
                && e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
        {
            StoreError::DuplicateEmail
        }
        _ => StoreError::Database(err),
    }
}

/// Row as read from SQLite, before domain validation.
struct RawUser {
    id: String,
    email: String,
    password_hash: String,
    name: String,
    role: String,
    created_at: String,
    updated_at: String,
}

impl RawUser {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            email: row.get(1)?,
            password_hash: row.get(2)?,
            name: row.get(3)?,
            role: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }

    fn into_user(self) -> Result<User, StoreError> {
        let role = UserRole::parse(&self.role).ok_or(StoreError::InvalidRole(self.role))?;
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| StoreError::Corrupt(format!("bad user id {:?}: {}", self.id, e)))?;

        Ok(User {
            id,
            email: self.email,
            name: self.name,
            password_hash: PasswordHash::new(self.password_hash),
            role,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("bad timestamp {:?}: {}", raw, e)))
}
