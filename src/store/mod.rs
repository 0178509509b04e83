pub mod models;
pub mod schema;
mod sqlite_store;

pub use models::{CommentView, CounterDrift, NewUser, User, UserBrief, Vlog, VlogUpload, VlogView};
pub use sqlite_store::SqliteStore;

use crate::lifecycle::LifecycleResult;
use crate::user::auth::{AuthToken, AuthTokenValue, PasswordCredentials};
use anyhow::Result;

pub trait AuthCredentialsStore: Send + Sync {
    /// Returns the password credentials for a user.
    /// Returns Ok(None) if the user has no password credentials.
    /// Returns Err if there is a database error.
    fn get_password_credentials(&self, user_id: usize) -> Result<Option<PasswordCredentials>>;

    /// Inserts or replaces the password credentials for a user.
    fn set_password_credentials(&self, credentials: PasswordCredentials) -> Result<()>;
}

pub trait AuthTokenStore: Send + Sync {
    /// Returns an authentication token given its value.
    /// Returns Ok(None) if the token does not exist.
    fn get_auth_token(&self, token: &AuthTokenValue) -> Result<Option<AuthToken>>;

    /// Adds a new auth token.
    fn add_auth_token(&self, token: AuthToken) -> Result<()>;

    /// Deletes an auth token given its value.
    /// Returns Ok(None) if the token does not exist.
    fn delete_auth_token(&self, token: &AuthTokenValue) -> Result<Option<AuthToken>>;

    /// Updates an auth token's last_used timestamp.
    fn touch_auth_token(&self, token: &AuthTokenValue, now: i64) -> Result<()>;
}

pub trait UserStore: Send + Sync {
    /// Creates a new user and returns the user id.
    /// Fails with `Validation` if the handle or email is already taken.
    fn create_user(&self, new_user: &NewUser) -> LifecycleResult<usize>;

    /// Returns a user by id, or Ok(None) if it does not exist.
    fn get_user_by_id(&self, user_id: usize) -> LifecycleResult<Option<User>>;

    /// Returns a user by handle, or Ok(None) if it does not exist.
    fn get_user_by_handle(&self, handle: &str) -> LifecycleResult<Option<User>>;

    /// Returns a user by email, or Ok(None) if it does not exist.
    fn get_user_by_email(&self, email: &str) -> LifecycleResult<Option<User>>;

    /// Returns up to `limit` most recently created users, excluding
    /// `exclude_user_id`, optionally filtered by a case-insensitive
    /// substring match over the handle and display name.
    fn discover_users(
        &self,
        query: Option<&str>,
        exclude_user_id: usize,
        limit: usize,
    ) -> LifecycleResult<Vec<User>>;

    /// Creates a follow edge and bumps both denormalized counters in one
    /// transaction. Fails with `AlreadyFollowing` if the edge exists.
    fn follow(&self, follower_id: usize, following_id: usize) -> LifecycleResult<()>;

    /// Removes a follow edge and decrements both denormalized counters in
    /// one transaction. Fails with `NotFollowing` if the edge is missing.
    fn unfollow(&self, follower_id: usize, following_id: usize) -> LifecycleResult<()>;

    /// Whether `follower_id` currently follows `following_id`.
    fn is_following(&self, follower_id: usize, following_id: usize) -> LifecycleResult<bool>;

    /// Ids of all users that `follower_id` follows.
    fn following_ids(&self, follower_id: usize) -> LifecycleResult<Vec<usize>>;

    /// Recounts user follow counters against the edge table and returns the
    /// rows whose cached counters disagree with the actual edge counts.
    fn follow_counter_drift(&self) -> LifecycleResult<Vec<CounterDrift>>;
}

pub trait VlogStore: Send + Sync {
    /// Inserts a vlog row with `created = now` and
    /// `expires_at = now + 72h`, creating and linking any tags in the same
    /// transaction. Fails with `Validation` if the external id is taken.
    fn create_vlog(&self, user_id: usize, upload: &VlogUpload, now: i64) -> LifecycleResult<Vlog>;

    /// Returns a vlog by id, or Ok(None) if it does not exist.
    fn get_vlog(&self, vlog_id: usize) -> LifecycleResult<Option<Vlog>>;

    /// Active vlogs of one user, newest first.
    fn active_vlogs_for_user(&self, user_id: usize, now: i64) -> LifecycleResult<Vec<Vlog>>;

    /// Expired vlogs of one user, newest first. Callers enforce the
    /// owner-only visibility rule.
    fn expired_vlogs_for_user(&self, user_id: usize, now: i64) -> LifecycleResult<Vec<Vlog>>;

    /// Active vlogs from any of `owner_ids`, newest first, optionally
    /// restricted to a tag name.
    fn feed_vlogs(
        &self,
        owner_ids: &[usize],
        tag: Option<&str>,
        now: i64,
    ) -> LifecycleResult<Vec<Vlog>>;

    /// Creates or removes a like row and adjusts `likes_count` by the
    /// matching delta in the same transaction. The vlog must be active at
    /// `now`. Fails with `ItemExpired`, `AlreadyLiked` or `NotLiked`.
    fn set_liked(
        &self,
        vlog_id: usize,
        user_id: usize,
        liked: bool,
        now: i64,
    ) -> LifecycleResult<()>;

    /// Whether the user has liked the vlog.
    fn has_liked(&self, vlog_id: usize, user_id: usize) -> LifecycleResult<bool>;

    /// Appends a comment with server-assigned `created = now`. The vlog
    /// must be active at `now`; fails with `ItemExpired` otherwise.
    fn add_comment(
        &self,
        vlog_id: usize,
        user_id: usize,
        content: &str,
        now: i64,
    ) -> LifecycleResult<CommentView>;

    /// Comments of a vlog with their authors, newest first.
    fn vlog_comments(&self, vlog_id: usize) -> LifecycleResult<Vec<CommentView>>;

    /// Tag names attached to a vlog.
    fn vlog_tags(&self, vlog_id: usize) -> LifecycleResult<Vec<String>>;

    /// Moves `expires_at` to `now + 72h`. Fails with `NotOwner` if the
    /// requester does not own the vlog, or `NotExpired` if the vlog is
    /// still active at `now`. Likes, comments and tags are untouched.
    fn republish_vlog(&self, vlog_id: usize, requester_id: usize, now: i64)
        -> LifecycleResult<Vlog>;

    /// Number of vlogs expired at `now`. Read-only, used by the sweep job.
    fn count_expired(&self, now: i64) -> LifecycleResult<usize>;

    /// Number of vlogs active at `now`.
    fn count_active(&self, now: i64) -> LifecycleResult<usize>;

    /// Recounts `likes_count` against the like table and returns the vlogs
    /// whose cached counter disagrees with the actual like count.
    fn like_counter_drift(&self) -> LifecycleResult<Vec<CounterDrift>>;
}

/// Combined trait for the single Vlog72 database.
pub trait FullStore: UserStore + VlogStore + AuthTokenStore + AuthCredentialsStore {}

impl<T: UserStore + VlogStore + AuthTokenStore + AuthCredentialsStore> FullStore for T {}
