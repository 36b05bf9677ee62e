//! Auth Service
//! Mission: Orchestrate registration and login on top of store, hasher and token authority

use crate::auth::{
    error::AuthError,
    jwt::{IssuedToken, JwtHandler},
    models::{NewUser, PasswordHash, RegisterRequest, UpdateProfileRequest, User, UserRole},
    password::CredentialVerifier,
    user_store::{CredentialStore, StoreError},
};
use crate::clock::Clock;
use crate::config::AdminSeed;
use secrecy::ExposeSecret;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

pub const MIN_PASSWORD_LEN: usize = 8;

/// Verified at login when the email is unknown, so both failure paths pay
/// for one bcrypt comparison.
const DUMMY_PASSWORD: &str = "membership-timing-equalizer";

/// Successful login result
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub user: User,
    pub token: IssuedToken,
}

pub struct AuthService {
    store: Arc<dyn CredentialStore>,
    hasher: Arc<dyn CredentialVerifier>,
    jwt: Arc<JwtHandler>,
    clock: Arc<dyn Clock>,
    dummy_hash: PasswordHash,
}

impl AuthService {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        hasher: Arc<dyn CredentialVerifier>,
        jwt: Arc<JwtHandler>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, AuthError> {
        let dummy_hash = hasher.hash(DUMMY_PASSWORD)?;
        Ok(Self {
            store,
            hasher,
            jwt,
            clock,
            dummy_hash,
        })
    }

    pub fn store(&self) -> Arc<dyn CredentialStore> {
        self.store.clone()
    }

    pub fn jwt(&self) -> Arc<JwtHandler> {
        self.jwt.clone()
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    /// Register a new member. Role is always `member`; no token is issued.
    pub fn register(&self, req: RegisterRequest) -> Result<User, AuthError> {
        let email = req.email.trim().to_string();
        let name = req.name.trim().to_string();
        validate_email(&email)?;
        validate_password(&req.password)?;
        if name.is_empty() {
            return Err(AuthError::Validation("name is required".to_string()));
        }

        let password_hash = self.hasher.hash(&req.password)?;

        // Uniqueness is decided by the store's constraint, not a prior lookup.
        let user = self
            .store
            .create(NewUser {
                email,
                name,
                password_hash,
                role: UserRole::Member,
            })
            .map_err(|e| {
                if matches!(e, StoreError::DuplicateEmail) {
                    info!("Registration rejected: email already registered");
                }
                AuthError::from(e)
            })?;

        info!("Registered user {}", user.id);
        Ok(user)
    }

    /// Check credentials and issue a bearer token
    pub fn login(&self, email: &str, password: &str) -> Result<LoginOutcome, AuthError> {
        let email = email.trim();
        let user = match self.store.get_by_email(email) {
            Ok(user) => user,
            Err(StoreError::NotFound) => {
                let _ = self.hasher.verify(password, &self.dummy_hash);
                warn!("Failed login attempt: {}", email);
                return Err(AuthError::InvalidCredentials);
            }
            Err(e) => return Err(e.into()),
        };

        if !self.hasher.verify(password, &user.password_hash)? {
            warn!("Failed login attempt: {}", email);
            return Err(AuthError::InvalidCredentials);
        }

        let token = self
            .jwt
            .issue(user.id, user.role, self.clock.now())
            .map_err(|e| AuthError::Internal(e.to_string()))?;

        info!("Login successful: {} ({})", user.id, user.role);

        Ok(LoginOutcome { user, token })
    }

    pub fn get_user(&self, id: &Uuid) -> Result<User, AuthError> {
        Ok(self.store.get_by_id(id)?)
    }

    /// Self-service update of name and/or password. Only those columns are
    /// written, so a role change made meanwhile by an admin is kept.
    pub fn update_profile(&self, id: &Uuid, req: UpdateProfileRequest) -> Result<User, AuthError> {
        let name = match req.name {
            Some(name) => {
                let name = name.trim().to_string();
                if name.is_empty() {
                    return Err(AuthError::Validation("name is required".to_string()));
                }
                Some(name)
            }
            None => None,
        };

        let password_hash = match req.password {
            Some(password) => {
                validate_password(&password)?;
                Some(self.hasher.hash(&password)?)
            }
            None => None,
        };

        Ok(self
            .store
            .update_profile(id, name.as_deref(), password_hash.as_ref())?)
    }

    pub fn set_role(&self, id: &Uuid, role: UserRole) -> Result<User, AuthError> {
        let user = self.store.set_role(id, role)?;
        info!("Role of user {} set to {}", user.id, role);
        Ok(user)
    }

    pub fn delete_user(&self, id: &Uuid) -> Result<(), AuthError> {
        Ok(self.store.delete(id)?)
    }

    pub fn list_users(&self, limit: u32, offset: u32) -> Result<Vec<User>, AuthError> {
        Ok(self.store.list(limit, offset)?)
    }

    /// Create the configured admin if the store has none. Returns whether one was created.
    pub fn ensure_admin(&self, seed: &AdminSeed) -> Result<bool, AuthError> {
        if self.store.count_by_role(UserRole::Admin)? > 0 {
            return Ok(false);
        }

        let email = seed.email.trim();
        validate_email(email)?;
        validate_password(seed.password.expose_secret())?;
        let password_hash = self.hasher.hash(seed.password.expose_secret())?;
        let admin = self.store.create(NewUser {
            email: email.to_string(),
            name: "Administrator".to_string(),
            password_hash,
            role: UserRole::Admin,
        })?;

        info!("Bootstrap admin created: {}", admin.email);
        Ok(true)
    }
}

fn validate_email(email: &str) -> Result<(), AuthError> {
    let invalid = || AuthError::Validation("a valid email is required".to_string());

    if email.chars().any(char::is_whitespace) {
        return Err(invalid());
    }
    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    if local.is_empty() || domain.contains('@') {
        return Err(invalid());
    }
    match domain.split_once('.') {
        Some((host, _)) if !host.is_empty() && !domain.ends_with('.') => Ok(()),
        _ => Err(invalid()),
    }
}

fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AuthError::Validation(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::password::{BcryptHasher, HashingFailure};
    use crate::auth::user_store::UserStore;
    use crate::clock::ManualClock;
    use crate::config::AuthConfig;
    use chrono::{TimeZone, Utc};
    use secrecy::SecretString;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const SECRET: &str = "service-test-secret-0123456789abcdef";

    /// Delegates to bcrypt and counts verify calls.
    struct CountingHasher {
        inner: BcryptHasher,
        verifies: AtomicUsize,
    }

    impl CredentialVerifier for CountingHasher {
        fn hash(&self, plaintext: &str) -> Result<PasswordHash, HashingFailure> {
            self.inner.hash(plaintext)
        }

        fn verify(&self, plaintext: &str, hash: &PasswordHash) -> Result<bool, HashingFailure> {
            self.verifies.fetch_add(1, Ordering::SeqCst);
            self.inner.verify(plaintext, hash)
        }
    }

    struct Fixture {
        service: AuthService,
        hasher: Arc<CountingHasher>,
        store: Arc<UserStore>,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap(),
        ));
        let store = Arc::new(UserStore::open_in_memory(clock.clone()).unwrap());
        let hasher = Arc::new(CountingHasher {
            inner: BcryptHasher::new(4),
            verifies: AtomicUsize::new(0),
        });
        let jwt = Arc::new(JwtHandler::new(&AuthConfig::new(SECRET)));
        let service = AuthService::new(store.clone(), hasher.clone(), jwt, clock).unwrap();
        Fixture {
            service,
            hasher,
            store,
        }
    }

    fn register_req(email: &str, password: &str) -> RegisterRequest {
        RegisterRequest {
            email: email.to_string(),
            password: password.to_string(),
            name: "Ann Member".to_string(),
        }
    }

    #[test]
    fn test_register_then_duplicate() {
        let f = fixture();

        let user = f
            .service
            .register(register_req("a@x.com", "longenough1"))
            .unwrap();
        assert_eq!(user.role, UserRole::Member);
        assert_ne!(user.password_hash.as_str(), "longenough1");

        let err = f
            .service
            .register(register_req("a@x.com", "longenough1"))
            .unwrap_err();
        assert!(matches!(err, AuthError::DuplicateEmail));
    }

    #[test]
    fn test_register_validation() {
        let f = fixture();

        for (email, password) in [
            ("not-an-email", "longenough1"),
            ("a@nodot", "longenough1"),
            ("@x.com", "longenough1"),
            ("a b@x.com", "longenough1"),
            ("a@x.com", "short"),
        ] {
            let err = f.service.register(register_req(email, password)).unwrap_err();
            assert!(matches!(err, AuthError::Validation(_)), "{email}/{password}");
        }

        let mut blank_name = register_req("b@x.com", "longenough1");
        blank_name.name = "   ".to_string();
        assert!(matches!(
            f.service.register(blank_name),
            Err(AuthError::Validation(_))
        ));
    }

    #[test]
    fn test_login_success_and_failures() {
        let f = fixture();
        let registered = f
            .service
            .register(register_req("a@x.com", "longenough1"))
            .unwrap();

        let outcome = f.service.login("a@x.com", "longenough1").unwrap();
        assert_eq!(outcome.user.id, registered.id);

        let subject = f
            .service
            .jwt()
            .validate(&outcome.token.token, f.service.clock().now())
            .unwrap();
        assert_eq!(subject.subject_id, registered.id);
        assert_eq!(subject.role, UserRole::Member);

        assert!(matches!(
            f.service.login("a@x.com", "wrongpass"),
            Err(AuthError::InvalidCredentials)
        ));
        assert!(matches!(
            f.service.login("nobody@x.com", "longenough1"),
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_unknown_email_still_runs_verifier() {
        let f = fixture();
        let before = f.hasher.verifies.load(Ordering::SeqCst);

        let _ = f.service.login("ghost@x.com", "whatever123");

        assert_eq!(f.hasher.verifies.load(Ordering::SeqCst), before + 1);
    }

    #[test]
    fn test_update_profile_changes_password() {
        let f = fixture();
        let user = f
            .service
            .register(register_req("p@x.com", "firstpassword"))
            .unwrap();

        let updated = f
            .service
            .update_profile(
                &user.id,
                UpdateProfileRequest {
                    name: Some("New Name".to_string()),
                    password: Some("secondpassword".to_string()),
                },
            )
            .unwrap();
        assert_eq!(updated.name, "New Name");
        assert_eq!(updated.role, UserRole::Member);

        assert!(f.service.login("p@x.com", "firstpassword").is_err());
        assert!(f.service.login("p@x.com", "secondpassword").is_ok());
    }

    #[test]
    fn test_profile_edit_keeps_concurrent_demotion() {
        let f = fixture();
        let user = f
            .service
            .register(register_req("d@x.com", "longenough1"))
            .unwrap();
        f.service.set_role(&user.id, UserRole::Admin).unwrap();

        // What the auth gate attached before the demotion landed.
        let ctx_user = f.store.get_by_id(&user.id).unwrap();
        f.service.set_role(&user.id, UserRole::Member).unwrap();

        let updated = f
            .service
            .update_profile(
                &ctx_user.id,
                UpdateProfileRequest {
                    name: Some("B".to_string()),
                    password: None,
                },
            )
            .unwrap();

        assert_eq!(updated.name, "B");
        assert_eq!(updated.role, UserRole::Member);
        assert_eq!(
            f.store.get_by_id(&user.id).unwrap().role,
            UserRole::Member
        );
    }

    #[test]
    fn test_role_change_keeps_concurrent_password_change() {
        let f = fixture();
        let user = f
            .service
            .register(register_req("c@x.com", "firstpassword"))
            .unwrap();

        f.service
            .update_profile(
                &user.id,
                UpdateProfileRequest {
                    name: None,
                    password: Some("secondpassword".to_string()),
                },
            )
            .unwrap();
        f.service.set_role(&user.id, UserRole::Admin).unwrap();

        assert!(f.service.login("c@x.com", "firstpassword").is_err());
        let outcome = f.service.login("c@x.com", "secondpassword").unwrap();
        assert_eq!(outcome.user.role, UserRole::Admin);
    }

    #[test]
    fn test_concurrent_registration_single_winner() {
        let f = fixture();
        let service = Arc::new(f.service);
        let barrier = Arc::new(std::sync::Barrier::new(4));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let service = service.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    service.register(register_req("same@x.com", "longenough1"))
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(
            results
                .iter()
                .filter(|r| matches!(r, Err(AuthError::DuplicateEmail)))
                .count(),
            3
        );
        assert_eq!(f.store.list(10, 0).unwrap().len(), 1);
    }

    #[test]
    fn test_login_trims_email_like_register() {
        let f = fixture();
        f.service
            .register(register_req(" t@x.com ", "longenough1"))
            .unwrap();

        assert!(f.service.login(" t@x.com", "longenough1").is_ok());
        assert!(f.service.login("t@x.com", "longenough1").is_ok());
    }

    #[test]
    fn test_ensure_admin_enforces_password_length() {
        let f = fixture();
        let seed = AdminSeed {
            email: "root@club.org".to_string(),
            password: SecretString::from("short".to_string()),
        };

        assert!(matches!(
            f.service.ensure_admin(&seed),
            Err(AuthError::Validation(_))
        ));
        assert_eq!(f.store.count_by_role(UserRole::Admin).unwrap(), 0);
    }

    #[test]
    fn test_set_role_and_delete() {
        let f = fixture();
        let user = f
            .service
            .register(register_req("r@x.com", "longenough1"))
            .unwrap();

        let promoted = f.service.set_role(&user.id, UserRole::Admin).unwrap();
        assert_eq!(promoted.role, UserRole::Admin);

        f.service.delete_user(&user.id).unwrap();
        assert!(matches!(
            f.service.get_user(&user.id),
            Err(AuthError::NotFound)
        ));
        assert!(matches!(
            f.service.set_role(&user.id, UserRole::Member),
            Err(AuthError::NotFound)
        ));
    }

    #[test]
    fn test_ensure_admin_only_once() {
        let f = fixture();
        let seed = AdminSeed {
            email: "root@club.org".to_string(),
            password: SecretString::from("bootstrap-pass".to_string()),
        };

        assert!(f.service.ensure_admin(&seed).unwrap());
        assert!(!f.service.ensure_admin(&seed).unwrap());
        assert_eq!(f.store.count_by_role(UserRole::Admin).unwrap(), 1);

        let outcome = f.service.login("root@club.org", "bootstrap-pass").unwrap();
        assert_eq!(outcome.user.role, UserRole::Admin);
    }
}
