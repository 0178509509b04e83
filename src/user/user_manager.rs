use std::sync::Arc;

use lazy_static::lazy_static;
use rand::Rng;
use regex::Regex;
use serde::Deserialize;
use tracing::info;

use crate::lifecycle::{now_unix, LifecycleError, LifecycleResult};
use crate::store::{FullStore, NewUser, User};
use crate::user::auth::{AuthToken, AuthTokenValue, PasswordCredentials, Vlog72Hasher};

/// Most users a single discovery query returns.
const DISCOVER_LIMIT: usize = 20;
const MIN_PASSWORD_LEN: usize = 8;
const HANDLE_RETRY_ATTEMPTS: usize = 10;

lazy_static! {
    static ref EMAIL_REGEX: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    static ref HANDLE_STRIP_REGEX: Regex = Regex::new(r"[^a-z0-9]").unwrap();
}

#[derive(Deserialize, Debug, Clone)]
pub struct NewAccount {
    pub email: String,
    pub password: String,
    pub display_name: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
}

/// Accounts, sessions and the follow graph.
pub struct UserManager {
    store: Arc<dyn FullStore>,
}

impl UserManager {
    pub fn new(store: Arc<dyn FullStore>) -> Self {
        Self { store }
    }

    /// Creates an account with a handle derived from the email address.
    ///
    /// The handle is the local part of the email, lowercased and stripped
    /// to `[a-z0-9]`. The insert relies on the UNIQUE constraint to detect
    /// collisions, so two concurrent registrations cannot both win the same
    /// handle; the loser retries with a random 4-digit suffix appended.
    pub fn register(&self, account: &NewAccount) -> LifecycleResult<User> {
        if !EMAIL_REGEX.is_match(&account.email) {
            return Err(LifecycleError::Validation(
                "Invalid email address".to_string(),
            ));
        }
        if account.password.len() < MIN_PASSWORD_LEN {
            return Err(LifecycleError::Validation(format!(
                "Password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }
        if account.display_name.trim().is_empty() {
            return Err(LifecycleError::Validation(
                "Display name cannot be empty".to_string(),
            ));
        }
        if self.store.get_user_by_email(&account.email)?.is_some() {
            return Err(LifecycleError::Validation(
                "Email already registered".to_string(),
            ));
        }

        let base = derive_handle(&account.email);
        let mut new_user = NewUser {
            handle: base.clone(),
            display_name: account.display_name.trim().to_string(),
            email: account.email.clone(),
            avatar_url: account.avatar_url.clone(),
            bio: account.bio.clone(),
        };
        let mut attempts = 0;
        let user_id = loop {
            match self.store.create_user(&new_user) {
                Ok(id) => break id,
                Err(LifecycleError::HandleTaken) => {
                    attempts += 1;
                    if attempts > HANDLE_RETRY_ATTEMPTS {
                        return Err(LifecycleError::Internal(anyhow::anyhow!(
                            "Could not find a free handle for {}",
                            base
                        )));
                    }
                    new_user.handle =
                        format!("{}{:04}", base, rand::rng().random_range(0..10_000));
                }
                Err(other) => return Err(other),
            }
        };

        let hasher = Vlog72Hasher::Argon2;
        let salt = hasher.generate_b64_salt();
        let hash = hasher.hash(account.password.as_bytes(), &salt)?;
        self.store.set_password_credentials(PasswordCredentials {
            user_id,
            salt,
            hash,
            hasher,
            created: now_unix(),
        })?;

        let user = self
            .store
            .get_user_by_id(user_id)?
            .ok_or(LifecycleError::NotFound)?;
        info!("Registered user {} ({})", user.handle, user.id);
        Ok(user)
    }

    /// Verifies an email/password pair and opens a new session.
    ///
    /// Returns Ok(None) on unknown email or wrong password, so callers
    /// cannot distinguish the two.
    pub fn login(&self, email: &str, password: &str) -> LifecycleResult<Option<(User, AuthToken)>> {
        let user = match self.store.get_user_by_email(email)? {
            Some(user) => user,
            None => return Ok(None),
        };
        let credentials = match self.store.get_password_credentials(user.id)? {
            Some(credentials) => credentials,
            None => return Ok(None),
        };
        if !credentials.hasher.verify(password, &credentials.hash)? {
            return Ok(None);
        }

        let token = AuthToken {
            user_id: user.id,
            value: AuthTokenValue::generate(),
            created: now_unix(),
            last_used: None,
        };
        self.store.add_auth_token(token.clone())?;
        Ok(Some((user, token)))
    }

    pub fn logout(&self, token: &AuthTokenValue) -> LifecycleResult<()> {
        self.store.delete_auth_token(token)?;
        Ok(())
    }

    /// Resolves a session token to its user id, bumping `last_used`.
    pub fn resolve_session(&self, token: &AuthTokenValue) -> Option<usize> {
        let auth_token = self.store.get_auth_token(token).ok()??;
        let _ = self.store.touch_auth_token(token, now_unix());
        Some(auth_token.user_id)
    }

    pub fn get_user(&self, user_id: usize) -> LifecycleResult<User> {
        self.store
            .get_user_by_id(user_id)?
            .ok_or(LifecycleError::NotFound)
    }

    pub fn user_by_handle(&self, handle: &str) -> LifecycleResult<User> {
        self.store
            .get_user_by_handle(handle)?
            .ok_or(LifecycleError::NotFound)
    }

    /// A user's profile along with whether the viewer follows them.
    pub fn profile(&self, handle: &str, viewer_id: usize) -> LifecycleResult<(User, bool)> {
        let user = self
            .store
            .get_user_by_handle(handle)?
            .ok_or(LifecycleError::NotFound)?;
        let is_following = if user.id == viewer_id {
            false
        } else {
            self.store.is_following(viewer_id, user.id)?
        };
        Ok((user, is_following))
    }

    /// Recently created users other than the viewer, each annotated with
    /// whether the viewer already follows them.
    pub fn discover(
        &self,
        viewer_id: usize,
        query: Option<&str>,
    ) -> LifecycleResult<Vec<(User, bool)>> {
        let query = query.map(str::trim).filter(|q| !q.is_empty());
        let users = self.store.discover_users(query, viewer_id, DISCOVER_LIMIT)?;
        users
            .into_iter()
            .map(|user| {
                let is_following = self.store.is_following(viewer_id, user.id)?;
                Ok((user, is_following))
            })
            .collect()
    }

    pub fn follow(&self, follower_id: usize, following_id: usize) -> LifecycleResult<()> {
        if follower_id == following_id {
            return Err(LifecycleError::Validation(
                "Cannot follow yourself".to_string(),
            ));
        }
        self.store.follow(follower_id, following_id)
    }

    pub fn unfollow(&self, follower_id: usize, following_id: usize) -> LifecycleResult<()> {
        if follower_id == following_id {
            return Err(LifecycleError::Validation(
                "Cannot unfollow yourself".to_string(),
            ));
        }
        self.store.unfollow(follower_id, following_id)
    }
}

fn derive_handle(email: &str) -> String {
    let local_part = email.split('@').next().unwrap_or_default().to_lowercase();
    let stripped = HANDLE_STRIP_REGEX.replace_all(&local_part, "").to_string();
    if stripped.is_empty() {
        "user".to_string()
    } else {
        stripped
    }
}
