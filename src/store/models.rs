//! Persistent data models for users, vlogs, likes, comments and follows.

use serde::{Deserialize, Serialize};

/// A registered account.
///
/// `followers_count` and `following_count` are denormalized caches of the
/// follow edge table, maintained transactionally alongside it. The counter
/// audit job recounts them from the edge rows to detect drift.
#[derive(Serialize, Debug, Clone)]
pub struct User {
    pub id: usize,
    pub handle: String,
    pub display_name: String,
    pub email: String,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
    pub created: i64,
    pub followers_count: i64,
    pub following_count: i64,
}

impl User {
    pub fn brief(&self) -> UserBrief {
        UserBrief {
            id: self.id,
            handle: self.handle.clone(),
            display_name: self.display_name.clone(),
            avatar_url: self.avatar_url.clone(),
        }
    }
}

/// The public subset of a user embedded in vlog and comment payloads.
#[derive(Serialize, Debug, Clone)]
pub struct UserBrief {
    pub id: usize,
    pub handle: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

/// Fields required to create an account row.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub handle: String,
    pub display_name: String,
    pub email: String,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
}

/// One posted video record with an expiration clock.
///
/// The video itself lives on the external host; `external_id`,
/// `thumbnail_url` and `duration` are stored opaquely at upload time and
/// never change afterwards. `expires_at` is the only mutable timestamp and
/// only the republish path may move it.
#[derive(Serialize, Debug, Clone)]
pub struct Vlog {
    pub id: usize,
    pub user_id: usize,
    pub title: String,
    pub description: Option<String>,
    pub external_id: String,
    pub thumbnail_url: String,
    pub duration: String,
    pub created: i64,
    pub expires_at: i64,
    pub likes_count: i64,
}

/// Fields required to register an uploaded vlog.
#[derive(Deserialize, Debug, Clone)]
pub struct VlogUpload {
    pub title: String,
    pub description: Option<String>,
    pub external_id: String,
    pub thumbnail_url: String,
    pub duration: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// A comment joined with its author, as served to clients.
#[derive(Serialize, Debug, Clone)]
pub struct CommentView {
    pub id: usize,
    pub vlog_id: usize,
    pub content: String,
    pub created: i64,
    pub author: UserBrief,
}

/// A vlog assembled with everything the feed and single-item payloads need.
#[derive(Serialize, Debug, Clone)]
pub struct VlogView {
    #[serde(flatten)]
    pub vlog: Vlog,
    pub author: UserBrief,
    pub has_liked: bool,
    pub comments: Vec<CommentView>,
    pub tags: Vec<String>,
}

/// Counter drift report entry produced by the reconciliation audit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterDrift {
    /// Row the counter lives on (vlog id or user id).
    pub row_id: usize,
    /// Which counter drifted, e.g. "likes_count".
    pub counter: &'static str,
    pub stored: i64,
    pub actual: i64,
}
