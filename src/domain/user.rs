use crate::domain::user::driven_ports::{NewUserRecord, UserInsert};
use crate::domain::user::driving_ports::{LoginError, RegisterError};
use crate::external_connections::ExternalConnectivity;
use anyhow::{Context, anyhow};
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use rand::rngs::OsRng;
use tokio::sync::OnceCell;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(PartialEq, Eq, Debug, Clone)]
pub struct TodoUser {
    pub id: Uuid,
    pub username: String,
    pub email: String,
}

/// Everything needed to register a new account
#[cfg_attr(test, derive(Clone, Debug))]
pub struct CreateUser {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// A user together with the password hash on file for them
pub struct StoredCredentials {
    pub user: TodoUser,
    pub password_hash: String,
}

pub mod driven_ports {
    use super::*;
    use crate::external_connections::ExternalConnectivity;

    /// User data as it should be written to the store. The password is already hashed.
    pub struct NewUserRecord<'a> {
        pub username: &'a str,
        pub email: &'a str,
        pub password_hash: &'a str,
    }

    /// Result of trying to insert a user
    pub enum UserInsert {
        Created(Uuid),
        UsernameTaken,
    }

    pub trait DetectUser {
        async fn username_taken(
            &self,
            username: &str,
            ext_cxn: &mut impl ExternalConnectivity,
        ) -> Result<bool, anyhow::Error>;
    }

    pub trait UserReader {
        async fn get_by_id(
            &self,
            id: Uuid,
            ext_cxn: &mut impl ExternalConnectivity,
        ) -> Result<Option<TodoUser>, anyhow::Error>;

        async fn credentials_by_username(
            &self,
            username: &str,
            ext_cxn: &mut impl ExternalConnectivity,
        ) -> Result<Option<StoredCredentials>, anyhow::Error>;
    }

    pub trait UserWriter {
        async fn create_user(
            &self,
            user: &NewUserRecord<'_>,
            ext_cxn: &mut impl ExternalConnectivity,
        ) -> Result<UserInsert, anyhow::Error>;
    }
}

pub mod driving_ports {
    use super::*;
    use crate::external_connections::ExternalConnectivity;
    use thiserror::Error;

    #[derive(Debug, Error)]
    pub enum RegisterError {
        #[error("A user with the given username is already registered")]
        DuplicateUsername,
        #[error(transparent)]
        StoreUnavailable(#[from] anyhow::Error),
    }

    #[derive(Debug, Error)]
    pub enum LoginError {
        /// Deliberately says nothing about whether the username exists
        #[error("Password or username is incorrect")]
        InvalidCredentials,
        #[error(transparent)]
        StoreUnavailable(#[from] anyhow::Error),
    }


    pub trait UserPort {
        async fn register(
            &self,
            new_user: &CreateUser,
            ext_cxn: &mut impl ExternalConnectivity,
            u_detect: &impl driven_ports::DetectUser,
            u_writer: &impl driven_ports::UserWriter,
        ) -> Result<TodoUser, RegisterError>;

        async fn login(
            &self,
            username: &str,
            password: &str,
            ext_cxn: &mut impl ExternalConnectivity,
            u_reader: &impl driven_ports::UserReader,
        ) -> Result<TodoUser, LoginError>;

        async fn user_by_id(
            &self,
            user_id: Uuid,
            ext_cxn: &mut impl ExternalConnectivity,
            u_reader: &impl driven_ports::UserReader,
        ) -> Result<Option<TodoUser>, anyhow::Error>;
    }
}

/// Handles registration and credential checks. Passwords are hashed with Argon2id.
pub struct UserService {
    hasher: Argon2<'static>,
    unknown_user_hash: OnceCell<String>,
}

/// Checked against [UserService::unknown_user_hash] when the username doesn't exist
const UNKNOWN_USER_PASSWORD: &str = "no-such-user";

impl UserService {
    pub fn new() -> UserService {
        UserService::with_hasher(Argon2::default())
    }

    /// Uses a specific Argon2 configuration instead of the default one
    pub fn with_hasher(hasher: Argon2<'static>) -> UserService {
        UserService {
            hasher,
            unknown_user_hash: OnceCell::new(),
        }
    }

    async fn hash_password(&self, password: &str) -> Result<String, anyhow::Error> {
        let hasher = self.hasher.clone();
        let password = password.to_owned();

        tokio::task::spawn_blocking(move || hash_password_blocking(&hasher, &password))
            .await
            .context("password hashing task did not complete")?
    }

    async fn verify_password(
        &self,
        password: &str,
        password_hash: String,
    ) -> Result<bool, anyhow::Error> {
        let hasher = self.hasher.clone();
        let password = password.to_owned();

        tokio::task::spawn_blocking(move || {
            let parsed_hash = PasswordHash::new(&password_hash)
                .map_err(|err| anyhow!("stored password hash is malformed: {err}"))?;
            Ok(hasher
                .verify_password(password.as_bytes(), &parsed_hash)
                .is_ok())
        })
        .await
        .context("password verification task did not complete")?
    }
}

impl Default for UserService {
    fn default() -> Self {
        Self::new()
    }
}

/// Produces a PHC-formatted hash string with a freshly generated salt embedded in it
fn hash_password_blocking(hasher: &Argon2<'_>, password: &str) -> Result<String, anyhow::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = hasher
        .hash_password(password.as_bytes(), &salt)
        .map_err(|err| anyhow!("failed to hash password: {err}"))?;

    Ok(hash.to_string())
}

impl driving_ports::UserPort for UserService {
    async fn register(
        &self,
        new_user: &CreateUser,
        ext_cxn: &mut impl ExternalConnectivity,
        u_detect: &impl driven_ports::DetectUser,
        u_writer: &impl driven_ports::UserWriter,
    ) -> Result<TodoUser, RegisterError> {
        let username_taken = u_detect
            .username_taken(&new_user.username, &mut *ext_cxn)
            .await
            .context("checking whether the username is taken during registration")?;
        if username_taken {
            return Err(RegisterError::DuplicateUsername);
        }

        let password_hash = self.hash_password(&new_user.password).await?;
        let record = NewUserRecord {
            username: &new_user.username,
            email: &new_user.email,
            password_hash: &password_hash,
        };

        // The username can still get claimed between the check and the insert
        let insert_result = u_writer
            .create_user(&record, &mut *ext_cxn)
            .await
            .context("trying to create user at service level")?;
        match insert_result {
            UserInsert::Created(id) => {
                info!(user_id = %id, "Registered user {}", new_user.username);
                Ok(TodoUser {
                    id,
                    username: new_user.username.clone(),
                    email: new_user.email.clone(),
                })
            }
            UserInsert::UsernameTaken => Err(RegisterError::DuplicateUsername),
        }
    }

    async fn login(
        &self,
        username: &str,
        password: &str,
        ext_cxn: &mut impl ExternalConnectivity,
        u_reader: &impl driven_ports::UserReader,
    ) -> Result<TodoUser, LoginError> {
        let credentials = u_reader
            .credentials_by_username(username, &mut *ext_cxn)
            .await
            .context("looking up credentials during login")?;
        let Some(credentials) = credentials else {
            debug!("Login attempted for unknown user {username}");
            // Unknown usernames pay for a password check too, so timing doesn't reveal them
            let unknown_user_hash = self
                .unknown_user_hash
                .get_or_try_init(|| self.hash_password(UNKNOWN_USER_PASSWORD))
                .await?
                .clone();
            self.verify_password(password, unknown_user_hash).await?;
            return Err(LoginError::InvalidCredentials);
        };

        if self
            .verify_password(password, credentials.password_hash)
            .await?
        {
            Ok(credentials.user)
        } else {
            debug!("Wrong password supplied for user {username}");
            Err(LoginError::InvalidCredentials)
        }
    }

    async fn user_by_id(
        &self,
        user_id: Uuid,
        ext_cxn: &mut impl ExternalConnectivity,
        u_reader: &impl driven_ports::UserReader,
    ) -> Result<Option<TodoUser>, anyhow::Error> {
        u_reader
            .get_by_id(user_id, &mut *ext_cxn)
            .await
            .context("fetching the session's user")
    }
}

#[cfg(test)]
mod user_service_tests {
    use super::test_util::*;
    use super::*;
    use crate::domain::test_util::Connectivity;
    use crate::domain::user::driving_ports::UserPort;
    use crate::external_connections;
    use speculoos::prelude::*;

    mod register {
        use super::*;

        #[tokio::test]
        async fn happy_path() {
            let user_persist = InMemoryUserPersistence::new_locked();
            let mut ext_cxn = external_connections::test_util::FakeExternalConnectivity::new();

            let register_result = fast_user_service()
                .register(
                    &user_create_default(),
                    &mut ext_cxn,
                    &user_persist,
                    &user_persist,
                )
                .await;
            let registered = register_result.expect("Registration should have succeeded");
            assert_eq!("alice", registered.username);
            assert_eq!("a@x.com", registered.email);

            let persistence = user_persist.read().expect("user persist rw lock poisoned");
            assert!(matches!(persistence.users.as_slice(), [
                StoredUser { user, password_hash }
            ] if user.id == registered.id && password_hash.starts_with("$argon2id$")));
        }

        #[tokio::test]
        async fn salts_every_password_hash() {
            let user_persist = InMemoryUserPersistence::new_locked();
            let mut ext_cxn = external_connections::test_util::FakeExternalConnectivity::new();
            let service = fast_user_service();

            for username in ["alice", "bob"] {
                service
                    .register(
                        &CreateUser {
                            username: username.to_owned(),
                            email: format!("{username}@x.com"),
                            password: "same password".to_owned(),
                        },
                        &mut ext_cxn,
                        &user_persist,
                        &user_persist,
                    )
                    .await
                    .expect("registration failed");
            }

            let persistence = user_persist.read().expect("user persist rw lock poisoned");
            assert_ne!(
                persistence.users[0].password_hash,
                persistence.users[1].password_hash
            );
        }

        #[tokio::test]
        async fn rejects_duplicate_username() {
            let user_persist = InMemoryUserPersistence::new_with_users(&[user_create_default()]);
            let original_user = user_persist.read().expect("user persist rw lock poisoned").users[0]
                .user
                .clone();
            let mut ext_cxn = external_connections::test_util::FakeExternalConnectivity::new();

            let register_result = fast_user_service()
                .register(
                    &CreateUser {
                        username: "alice".to_owned(),
                        email: "other@x.com".to_owned(),
                        password: "something else".to_owned(),
                    },
                    &mut ext_cxn,
                    &user_persist,
                    &user_persist,
                )
                .await;
            let Err(RegisterError::DuplicateUsername) = register_result else {
                panic!("Expected a duplicate username error, got {register_result:#?}");
            };

            let persistence = user_persist.read().expect("user persist rw lock poisoned");
            assert_eq!(1, persistence.users.len());
            assert_eq!(original_user, persistence.users[0].user);
        }

        #[tokio::test]
        async fn rejects_username_claimed_during_registration() {
            let user_persist = InMemoryUserPersistence::new_with_users(&[user_create_default()]);
            let mut ext_cxn = external_connections::test_util::FakeExternalConnectivity::new();

            let register_result = fast_user_service()
                .register(
                    &user_create_default(),
                    &mut ext_cxn,
                    &NeverTaken,
                    &user_persist,
                )
                .await;
            assert_that!(register_result)
                .is_err()
                .matches(|err| matches!(err, RegisterError::DuplicateUsername));
        }

        #[tokio::test]
        async fn propagates_port_error() {
            let mut raw_persist = InMemoryUserPersistence::new();
            raw_persist.connectivity = Connectivity::Disconnected;
            let user_persist = RwLock::new(raw_persist);
            let mut ext_cxn = external_connections::test_util::FakeExternalConnectivity::new();

            let register_result = fast_user_service()
                .register(
                    &user_create_default(),
                    &mut ext_cxn,
                    &user_persist,
                    &user_persist,
                )
                .await;
            assert_that!(register_result)
                .is_err()
                .matches(|err| matches!(err, RegisterError::StoreUnavailable(_)));
        }
    }

    mod login {
        use super::*;

        #[tokio::test]
        async fn happy_path() {
            let user_persist = InMemoryUserPersistence::new_with_users(&[user_create_default()]);
            let mut ext_cxn = external_connections::test_util::FakeExternalConnectivity::new();

            let login_result = fast_user_service()
                .login("alice", "pw1", &mut ext_cxn, &user_persist)
                .await;
            assert_that!(login_result)
                .is_ok()
                .matches(|user| user.username == "alice" && user.email == "a@x.com");
        }

        #[tokio::test]
        async fn wrong_password_and_unknown_user_look_the_same() {
            let user_persist = InMemoryUserPersistence::new_with_users(&[user_create_default()]);
            let mut ext_cxn = external_connections::test_util::FakeExternalConnectivity::new();
            let service = fast_user_service();

            let wrong_password = service
                .login("alice", "not-the-password", &mut ext_cxn, &user_persist)
                .await;
            let unknown_user = service
                .login("bob", "pw1", &mut ext_cxn, &user_persist)
                .await;

            let (Err(wrong_password_err), Err(unknown_user_err)) = (wrong_password, unknown_user)
            else {
                panic!("Both logins should have failed");
            };
            assert!(matches!(wrong_password_err, LoginError::InvalidCredentials));
            assert!(matches!(unknown_user_err, LoginError::InvalidCredentials));
            assert_eq!(wrong_password_err.to_string(), unknown_user_err.to_string());
        }

        #[tokio::test]
        async fn unknown_user_still_verifies_a_password() {
            let user_persist = InMemoryUserPersistence::new_locked();
            let mut ext_cxn = external_connections::test_util::FakeExternalConnectivity::new();
            let service = fast_user_service();
            assert!(service.unknown_user_hash.get().is_none());

            let login_result = service
                .login("bob", "no-such-user", &mut ext_cxn, &user_persist)
                .await;

            assert!(matches!(login_result, Err(LoginError::InvalidCredentials)));
            let unknown_user_hash = service
                .unknown_user_hash
                .get()
                .expect("an Argon2 hash should have been prepared for unknown users");
            assert!(unknown_user_hash.starts_with("$argon2"));
        }

        #[tokio::test]
        async fn propagates_port_error() {
            let mut raw_persist = InMemoryUserPersistence::new();
            raw_persist.connectivity = Connectivity::Disconnected;
            let user_persist = RwLock::new(raw_persist);
            let mut ext_cxn = external_connections::test_util::FakeExternalConnectivity::new();

            let login_result = fast_user_service()
                .login("alice", "pw1", &mut ext_cxn, &user_persist)
                .await;
            assert_that!(login_result)
                .is_err()
                .matches(|err| matches!(err, LoginError::StoreUnavailable(_)));
        }

        #[tokio::test]
        async fn malformed_stored_hash_is_a_store_problem() {
            let user_persist = InMemoryUserPersistence::new_locked();
            {
                let mut persistence = user_persist.write().expect("user persist rw lock poisoned");
                persistence.users.push(StoredUser {
                    user: TodoUser {
                        id: Uuid::new_v4(),
                        username: "alice".to_owned(),
                        email: "a@x.com".to_owned(),
                    },
                    password_hash: "not a phc string".to_owned(),
                });
            }
            let mut ext_cxn = external_connections::test_util::FakeExternalConnectivity::new();

            let login_result = fast_user_service()
                .login("alice", "pw1", &mut ext_cxn, &user_persist)
                .await;
            assert_that!(login_result)
                .is_err()
                .matches(|err| matches!(err, LoginError::StoreUnavailable(_)));
        }
    }

    mod user_by_id {
        use super::*;

        #[tokio::test]
        async fn finds_registered_user() {
            let user_persist = InMemoryUserPersistence::new_with_users(&[user_create_default()]);
            let user_id = user_persist.read().expect("user persist rw lock poisoned").users[0]
                .user
                .id;
            let mut ext_cxn = external_connections::test_util::FakeExternalConnectivity::new();

            let lookup = fast_user_service()
                .user_by_id(user_id, &mut ext_cxn, &user_persist)
                .await;
            assert_that!(lookup)
                .is_ok()
                .is_some()
                .matches(|user| user.username == "alice");
        }

        #[tokio::test]
        async fn missing_user_is_none() {
            let user_persist = InMemoryUserPersistence::new_locked();
            let mut ext_cxn = external_connections::test_util::FakeExternalConnectivity::new();

            let lookup = fast_user_service()
                .user_by_id(Uuid::new_v4(), &mut ext_cxn, &user_persist)
                .await;
            assert_that!(lookup).is_ok().is_none();
        }
    }
}
