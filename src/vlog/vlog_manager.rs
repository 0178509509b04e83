use std::sync::Arc;

use tracing::info;

use crate::lifecycle::{can_view, now_unix, LifecycleError, LifecycleResult};
use crate::store::{CommentView, FullStore, Vlog, VlogUpload, VlogView};

const MAX_COMMENT_LEN: usize = 1000;

/// Vlog posting, visibility, engagement and republishing.
///
/// Every operation resolves `now` once and passes it down to the store, so
/// the expiry comparison a query makes matches the one the handler made.
pub struct VlogManager {
    store: Arc<dyn FullStore>,
}

impl VlogManager {
    pub fn new(store: Arc<dyn FullStore>) -> Self {
        Self { store }
    }

    /// Registers an externally hosted video. The 72 hour window starts now.
    pub fn register_upload(&self, user_id: usize, upload: &VlogUpload) -> LifecycleResult<VlogView> {
        if upload.title.trim().is_empty() {
            return Err(LifecycleError::Validation("Title cannot be empty".to_string()));
        }
        if upload.external_id.trim().is_empty() {
            return Err(LifecycleError::Validation(
                "External video id cannot be empty".to_string(),
            ));
        }
        if upload.thumbnail_url.trim().is_empty() {
            return Err(LifecycleError::Validation(
                "Thumbnail url cannot be empty".to_string(),
            ));
        }

        let mut normalized = upload.clone();
        normalized.tags = normalize_tags(&upload.tags);

        let vlog = self.store.create_vlog(user_id, &normalized, now_unix())?;
        info!("User {} posted vlog {} ({})", user_id, vlog.id, vlog.external_id);
        self.view(vlog, user_id)
    }

    /// A single vlog with author, likes, comments and tags.
    ///
    /// Non-owners get `ItemExpired` once the window has passed; the payload
    /// never reveals whether the id exists beyond that.
    pub fn vlog_view(&self, vlog_id: usize, viewer_id: usize) -> LifecycleResult<VlogView> {
        let vlog = self
            .store
            .get_vlog(vlog_id)?
            .ok_or(LifecycleError::NotFound)?;
        if !can_view(vlog.user_id, viewer_id, vlog.expires_at, now_unix()) {
            return Err(LifecycleError::ItemExpired);
        }
        self.view(vlog, viewer_id)
    }

    /// Active vlogs from followed users plus the viewer's own, newest
    /// first, optionally restricted to one tag.
    pub fn feed(&self, viewer_id: usize, tag: Option<&str>) -> LifecycleResult<Vec<VlogView>> {
        let mut owner_ids = self.store.following_ids(viewer_id)?;
        owner_ids.push(viewer_id);

        let tag = tag.map(|t| t.trim().to_lowercase()).filter(|t| !t.is_empty());
        let vlogs = self
            .store
            .feed_vlogs(&owner_ids, tag.as_deref(), now_unix())?;
        vlogs
            .into_iter()
            .map(|vlog| self.view(vlog, viewer_id))
            .collect()
    }

    /// A user's currently active vlogs, visible to anyone.
    pub fn active_vlogs(&self, handle: &str, viewer_id: usize) -> LifecycleResult<Vec<VlogView>> {
        let user = self
            .store
            .get_user_by_handle(handle)?
            .ok_or(LifecycleError::NotFound)?;
        let vlogs = self.store.active_vlogs_for_user(user.id, now_unix())?;
        vlogs
            .into_iter()
            .map(|vlog| self.view(vlog, viewer_id))
            .collect()
    }

    /// A user's expired vlogs. Only the owner may list them.
    pub fn expired_vlogs(&self, handle: &str, viewer_id: usize) -> LifecycleResult<Vec<VlogView>> {
        let user = self
            .store
            .get_user_by_handle(handle)?
            .ok_or(LifecycleError::NotFound)?;
        if user.id != viewer_id {
            return Err(LifecycleError::NotOwner);
        }
        let vlogs = self.store.expired_vlogs_for_user(user.id, now_unix())?;
        vlogs
            .into_iter()
            .map(|vlog| self.view(vlog, viewer_id))
            .collect()
    }

    /// Adds or removes a like. Fails with `ItemExpired` once the window has
    /// passed.
    pub fn set_liked(&self, vlog_id: usize, viewer_id: usize, liked: bool) -> LifecycleResult<()> {
        self.store.set_liked(vlog_id, viewer_id, liked, now_unix())
    }

    /// Appends a comment to an active vlog.
    pub fn add_comment(
        &self,
        vlog_id: usize,
        viewer_id: usize,
        content: &str,
    ) -> LifecycleResult<CommentView> {
        let content = content.trim();
        if content.is_empty() {
            return Err(LifecycleError::Validation(
                "Comment cannot be empty".to_string(),
            ));
        }
        if content.len() > MAX_COMMENT_LEN {
            return Err(LifecycleError::Validation(format!(
                "Comment cannot exceed {} characters",
                MAX_COMMENT_LEN
            )));
        }
        self.store.add_comment(vlog_id, viewer_id, content, now_unix())
    }

    /// Comments of a vlog the viewer is allowed to see.
    pub fn comments(&self, vlog_id: usize, viewer_id: usize) -> LifecycleResult<Vec<CommentView>> {
        let vlog = self
            .store
            .get_vlog(vlog_id)?
            .ok_or(LifecycleError::NotFound)?;
        if !can_view(vlog.user_id, viewer_id, vlog.expires_at, now_unix()) {
            return Err(LifecycleError::ItemExpired);
        }
        self.store.vlog_comments(vlog_id)
    }

    /// Restarts the 72 hour window on one of the caller's expired vlogs.
    /// Likes, comments and tags survive the republish.
    pub fn republish(&self, vlog_id: usize, viewer_id: usize) -> LifecycleResult<VlogView> {
        let vlog = self.store.republish_vlog(vlog_id, viewer_id, now_unix())?;
        info!("User {} republished vlog {}", viewer_id, vlog.id);
        self.view(vlog, viewer_id)
    }

    fn view(&self, vlog: Vlog, viewer_id: usize) -> LifecycleResult<VlogView> {
        let author = self
            .store
            .get_user_by_id(vlog.user_id)?
            .ok_or(LifecycleError::NotFound)?
            .brief();
        let has_liked = self.store.has_liked(vlog.id, viewer_id)?;
        let comments = self.store.vlog_comments(vlog.id)?;
        let tags = self.store.vlog_tags(vlog.id)?;
        Ok(VlogView {
            vlog,
            author,
            has_liked,
            comments,
            tags,
        })
    }
}

fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut normalized: Vec<String> = Vec::new();
    for tag in tags {
        let tag = tag.trim().to_lowercase();
        if !tag.is_empty() && !normalized.contains(&tag) {
            normalized.push(tag);
        }
    }
    normalized
}
