//! Content lifecycle rules for vlogs.
//!
//! Every visibility decision in the server goes through [`is_active`] and
//! [`can_view`]. Handlers and store queries must compare against the same
//! `now` value so that SQL-side filtering and in-memory checks agree at the
//! boundary of `now`.

use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;

/// How long a vlog stays visible to non-owners after posting.
pub const VLOG_WINDOW_SECS: i64 = 72 * 60 * 60;

/// Current Unix timestamp in whole seconds, the resolution the store uses.
pub fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("System clock is before the Unix epoch")
        .as_secs() as i64
}

/// The expiration timestamp for a vlog created at `created_at`.
pub fn expiry_for(created_at: i64) -> i64 {
    created_at + VLOG_WINDOW_SECS
}

/// A vlog is active strictly before its expiration instant.
///
/// At `now == expires_at` the vlog is already expired.
pub fn is_active(expires_at: i64, now: i64) -> bool {
    now < expires_at
}

/// Whether `viewer_id` may see a vlog owned by `owner_id`.
///
/// Owners always see their own vlogs, expired or not. Everyone else only
/// sees the vlog while it is active; follow status never grants access to
/// expired content.
pub fn can_view(owner_id: usize, viewer_id: usize, expires_at: i64, now: i64) -> bool {
    viewer_id == owner_id || is_active(expires_at, now)
}

/// Domain errors for lifecycle and social operations.
///
/// All variants are recoverable and map to a stable code surfaced to the
/// client; none are fatal to the process.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Not found")]
    NotFound,
    #[error("Not the owner of this content")]
    NotOwner,
    #[error("This vlog has expired")]
    ItemExpired,
    #[error("This vlog has not expired yet")]
    NotExpired,
    #[error("Already liked this vlog")]
    AlreadyLiked,
    #[error("Like not found")]
    NotLiked,
    #[error("Already following this user")]
    AlreadyFollowing,
    #[error("Not following this user")]
    NotFollowing,
    #[error("Handle already taken")]
    HandleTaken,
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl LifecycleError {
    /// Stable machine-readable code for API payloads.
    pub fn code(&self) -> &'static str {
        match self {
            LifecycleError::NotFound => "NOT_FOUND",
            LifecycleError::NotOwner => "NOT_OWNER",
            LifecycleError::ItemExpired => "ITEM_EXPIRED",
            LifecycleError::NotExpired => "NOT_EXPIRED",
            LifecycleError::AlreadyLiked => "ALREADY_LIKED",
            LifecycleError::NotLiked => "NOT_LIKED",
            LifecycleError::AlreadyFollowing => "ALREADY_FOLLOWING",
            LifecycleError::NotFollowing => "NOT_FOLLOWING",
            // Registration retries these internally; the code only shows up
            // if every suffix attempt loses the race too.
            LifecycleError::HandleTaken => "VALIDATION_ERROR",
            LifecycleError::Validation(_) => "VALIDATION_ERROR",
            LifecycleError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<rusqlite::Error> for LifecycleError {
    fn from(err: rusqlite::Error) -> Self {
        LifecycleError::Internal(err.into())
    }
}

/// Shorthand for store and manager operations that surface domain errors.
pub type LifecycleResult<T> = Result<T, LifecycleError>;
