use std::{
    path::Path,
    sync::{Arc, Mutex},
};

use anyhow::{Context, Result};
use rusqlite::{params, types::Value, Connection, OptionalExtension, Row};

use crate::lifecycle::{is_active, LifecycleError, LifecycleResult, VLOG_WINDOW_SECS};
use crate::sqlite_persistence::open_database;
use crate::store::models::{
    CommentView, CounterDrift, NewUser, User, UserBrief, Vlog, VlogUpload,
};
use crate::store::schema::{
    AUTH_TOKEN_TABLE, COMMENT_TABLE, FOLLOW_TABLE, PASSWORD_CREDENTIALS_TABLE, TAG_TABLE,
    USER_TABLE, VERSIONED_SCHEMAS, VLOG_LIKE_TABLE, VLOG_TABLE, VLOG_TAG_TABLE,
};
use crate::store::{AuthCredentialsStore, AuthTokenStore, UserStore, VlogStore};
use crate::user::auth::{AuthToken, AuthTokenValue, PasswordCredentials, Vlog72Hasher};
use std::str::FromStr;

const USER_COLUMNS: &str =
    "id, handle, display_name, email, avatar_url, bio, created, followers_count, following_count";
const VLOG_COLUMNS: &str = "id, user_id, title, description, external_id, thumbnail_url, \
     duration, created, expires_at, likes_count";

fn row_to_user(row: &Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        handle: row.get(1)?,
        display_name: row.get(2)?,
        email: row.get(3)?,
        avatar_url: row.get(4)?,
        bio: row.get(5)?,
        created: row.get(6)?,
        followers_count: row.get(7)?,
        following_count: row.get(8)?,
    })
}

fn row_to_vlog(row: &Row) -> rusqlite::Result<Vlog> {
    Ok(Vlog {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        external_id: row.get(4)?,
        thumbnail_url: row.get(5)?,
        duration: row.get(6)?,
        created: row.get(7)?,
        expires_at: row.get(8)?,
        likes_count: row.get(9)?,
    })
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn new<T: AsRef<Path>>(db_path: T) -> Result<Self> {
        let conn = open_database(db_path, VERSIONED_SCHEMAS)?;
        Ok(SqliteStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Reads `expires_at` inside an open transaction, or fails with
    /// `NotFound`.
    fn vlog_expiry(tx: &Connection, vlog_id: usize) -> LifecycleResult<i64> {
        tx.query_row(
            &format!("SELECT expires_at FROM {} WHERE id = ?1", VLOG_TABLE.name),
            params![vlog_id],
            |row| row.get(0),
        )
        .optional()?
        .ok_or(LifecycleError::NotFound)
    }

    fn user_exists(conn: &Connection, user_id: usize) -> LifecycleResult<()> {
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {} WHERE id = ?1", USER_TABLE.name),
            params![user_id],
            |row| row.get(0),
        )?;
        if count == 0 {
            return Err(LifecycleError::NotFound);
        }
        Ok(())
    }

    fn comment_view(conn: &Connection, comment_id: usize) -> LifecycleResult<CommentView> {
        conn.query_row(
            &format!(
                "SELECT c.id, c.vlog_id, c.content, c.created, \
                        u.id, u.handle, u.display_name, u.avatar_url \
                 FROM {} c JOIN {} u ON u.id = c.user_id WHERE c.id = ?1",
                COMMENT_TABLE.name, USER_TABLE.name
            ),
            params![comment_id],
            |row| {
                Ok(CommentView {
                    id: row.get(0)?,
                    vlog_id: row.get(1)?,
                    content: row.get(2)?,
                    created: row.get(3)?,
                    author: UserBrief {
                        id: row.get(4)?,
                        handle: row.get(5)?,
                        display_name: row.get(6)?,
                        avatar_url: row.get(7)?,
                    },
                })
            },
        )
        .map_err(Into::into)
    }
}

impl UserStore for SqliteStore {
    fn create_user(&self, new_user: &NewUser) -> LifecycleResult<usize> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            &format!(
                "INSERT INTO {} (handle, display_name, email, avatar_url, bio) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                USER_TABLE.name
            ),
            params![
                new_user.handle,
                new_user.display_name,
                new_user.email,
                new_user.avatar_url,
                new_user.bio
            ],
        )
        .map_err(|err| {
            // The UNIQUE constraints are the arbiter for concurrent inserts;
            // handle conflicts are retriable, email conflicts are not.
            if is_constraint_violation(&err) {
                if err.to_string().contains(&format!("{}.handle", USER_TABLE.name)) {
                    LifecycleError::HandleTaken
                } else {
                    LifecycleError::Validation("Email already registered".to_string())
                }
            } else {
                err.into()
            }
        })?;
        Ok(conn.last_insert_rowid() as usize)
    }

    fn get_user_by_id(&self, user_id: usize) -> LifecycleResult<Option<User>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            &format!(
                "SELECT {} FROM {} WHERE id = ?1",
                USER_COLUMNS, USER_TABLE.name
            ),
            params![user_id],
            row_to_user,
        )
        .optional()
        .map_err(Into::into)
    }

    fn get_user_by_handle(&self, handle: &str) -> LifecycleResult<Option<User>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            &format!(
                "SELECT {} FROM {} WHERE handle = ?1",
                USER_COLUMNS, USER_TABLE.name
            ),
            params![handle],
            row_to_user,
        )
        .optional()
        .map_err(Into::into)
    }

    fn get_user_by_email(&self, email: &str) -> LifecycleResult<Option<User>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            &format!(
                "SELECT {} FROM {} WHERE email = ?1",
                USER_COLUMNS, USER_TABLE.name
            ),
            params![email],
            row_to_user,
        )
        .optional()
        .map_err(Into::into)
    }

    fn discover_users(
        &self,
        query: Option<&str>,
        exclude_user_id: usize,
        limit: usize,
    ) -> LifecycleResult<Vec<User>> {
        let conn = self.conn.lock().unwrap();
        let users = match query {
            Some(q) => {
                let pattern = format!("%{}%", q.to_lowercase());
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM {} \
                     WHERE id != ?1 \
                     AND (LOWER(handle) LIKE ?2 OR LOWER(display_name) LIKE ?2) \
                     ORDER BY created DESC, id DESC LIMIT ?3",
                    USER_COLUMNS, USER_TABLE.name
                ))?;
                let users = stmt
                    .query_map(params![exclude_user_id, pattern, limit], row_to_user)?
                    .collect::<Result<Vec<User>, _>>()?;
                users
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM {} WHERE id != ?1 \
                     ORDER BY created DESC, id DESC LIMIT ?2",
                    USER_COLUMNS, USER_TABLE.name
                ))?;
                let users = stmt
                    .query_map(params![exclude_user_id, limit], row_to_user)?
                    .collect::<Result<Vec<User>, _>>()?;
                users
            }
        };
        Ok(users)
    }

    fn follow(&self, follower_id: usize, following_id: usize) -> LifecycleResult<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        Self::user_exists(&tx, following_id)?;
        tx.execute(
            &format!(
                "INSERT INTO {} (follower_id, following_id) VALUES (?1, ?2)",
                FOLLOW_TABLE.name
            ),
            params![follower_id, following_id],
        )
        .map_err(|err| {
            if is_constraint_violation(&err) {
                LifecycleError::AlreadyFollowing
            } else {
                err.into()
            }
        })?;
        tx.execute(
            &format!(
                "UPDATE {} SET followers_count = followers_count + 1 WHERE id = ?1",
                USER_TABLE.name
            ),
            params![following_id],
        )?;
        tx.execute(
            &format!(
                "UPDATE {} SET following_count = following_count + 1 WHERE id = ?1",
                USER_TABLE.name
            ),
            params![follower_id],
        )?;

        tx.commit()?;
        Ok(())
    }

    fn unfollow(&self, follower_id: usize, following_id: usize) -> LifecycleResult<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        Self::user_exists(&tx, following_id)?;
        let deleted = tx.execute(
            &format!(
                "DELETE FROM {} WHERE follower_id = ?1 AND following_id = ?2",
                FOLLOW_TABLE.name
            ),
            params![follower_id, following_id],
        )?;
        if deleted == 0 {
            return Err(LifecycleError::NotFollowing);
        }
        // MAX keeps a drifted counter from going negative.
        tx.execute(
            &format!(
                "UPDATE {} SET followers_count = MAX(followers_count - 1, 0) WHERE id = ?1",
                USER_TABLE.name
            ),
            params![following_id],
        )?;
        tx.execute(
            &format!(
                "UPDATE {} SET following_count = MAX(following_count - 1, 0) WHERE id = ?1",
                USER_TABLE.name
            ),
            params![follower_id],
        )?;

        tx.commit()?;
        Ok(())
    }

    fn is_following(&self, follower_id: usize, following_id: usize) -> LifecycleResult<bool> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            &format!(
                "SELECT COUNT(*) FROM {} WHERE follower_id = ?1 AND following_id = ?2",
                FOLLOW_TABLE.name
            ),
            params![follower_id, following_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn following_ids(&self, follower_id: usize) -> LifecycleResult<Vec<usize>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT following_id FROM {} WHERE follower_id = ?1",
            FOLLOW_TABLE.name
        ))?;
        let ids = stmt
            .query_map(params![follower_id], |row| row.get(0))?
            .collect::<Result<Vec<usize>, _>>()?;
        Ok(ids)
    }

    fn follow_counter_drift(&self) -> LifecycleResult<Vec<CounterDrift>> {
        let conn = self.conn.lock().unwrap();
        let mut drifts = Vec::new();

        let mut stmt = conn.prepare(&format!(
            "SELECT u.id, u.followers_count, \
                    (SELECT COUNT(*) FROM {follow} f WHERE f.following_id = u.id) \
             FROM {user} u",
            follow = FOLLOW_TABLE.name,
            user = USER_TABLE.name
        ))?;
        let followers = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<usize, usize>(0)?,
                    row.get::<usize, i64>(1)?,
                    row.get::<usize, i64>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        for (row_id, stored, actual) in followers {
            if stored != actual {
                drifts.push(CounterDrift {
                    row_id,
                    counter: "followers_count",
                    stored,
                    actual,
                });
            }
        }

        let mut stmt = conn.prepare(&format!(
            "SELECT u.id, u.following_count, \
                    (SELECT COUNT(*) FROM {follow} f WHERE f.follower_id = u.id) \
             FROM {user} u",
            follow = FOLLOW_TABLE.name,
            user = USER_TABLE.name
        ))?;
        let following = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<usize, usize>(0)?,
                    row.get::<usize, i64>(1)?,
                    row.get::<usize, i64>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        for (row_id, stored, actual) in following {
            if stored != actual {
                drifts.push(CounterDrift {
                    row_id,
                    counter: "following_count",
                    stored,
                    actual,
                });
            }
        }

        Ok(drifts)
    }
}

impl VlogStore for SqliteStore {
    fn create_vlog(&self, user_id: usize, upload: &VlogUpload, now: i64) -> LifecycleResult<Vlog> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let expires_at = now + VLOG_WINDOW_SECS;
        tx.execute(
            &format!(
                "INSERT INTO {} (user_id, title, description, external_id, thumbnail_url, \
                 duration, created, expires_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                VLOG_TABLE.name
            ),
            params![
                user_id,
                upload.title,
                upload.description,
                upload.external_id,
                upload.thumbnail_url,
                upload.duration,
                now,
                expires_at
            ],
        )
        .map_err(|err| {
            if is_constraint_violation(&err) {
                LifecycleError::Validation("External video id already registered".to_string())
            } else {
                err.into()
            }
        })?;
        let vlog_id = tx.last_insert_rowid() as usize;

        for tag in &upload.tags {
            tx.execute(
                &format!("INSERT OR IGNORE INTO {} (name) VALUES (?1)", TAG_TABLE.name),
                params![tag],
            )?;
            let tag_id: usize = tx.query_row(
                &format!("SELECT id FROM {} WHERE name = ?1", TAG_TABLE.name),
                params![tag],
                |row| row.get(0),
            )?;
            tx.execute(
                &format!(
                    "INSERT OR IGNORE INTO {} (vlog_id, tag_id) VALUES (?1, ?2)",
                    VLOG_TAG_TABLE.name
                ),
                params![vlog_id, tag_id],
            )?;
        }

        tx.commit()?;

        Ok(Vlog {
            id: vlog_id,
            user_id,
            title: upload.title.clone(),
            description: upload.description.clone(),
            external_id: upload.external_id.clone(),
            thumbnail_url: upload.thumbnail_url.clone(),
            duration: upload.duration.clone(),
            created: now,
            expires_at,
            likes_count: 0,
        })
    }

    fn get_vlog(&self, vlog_id: usize) -> LifecycleResult<Option<Vlog>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            &format!(
                "SELECT {} FROM {} WHERE id = ?1",
                VLOG_COLUMNS, VLOG_TABLE.name
            ),
            params![vlog_id],
            row_to_vlog,
        )
        .optional()
        .map_err(Into::into)
    }

    fn active_vlogs_for_user(&self, user_id: usize, now: i64) -> LifecycleResult<Vec<Vlog>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM {} WHERE user_id = ?1 AND expires_at > ?2 \
             ORDER BY created DESC, id DESC",
            VLOG_COLUMNS, VLOG_TABLE.name
        ))?;
        let vlogs = stmt
            .query_map(params![user_id, now], row_to_vlog)?
            .collect::<Result<Vec<Vlog>, _>>()?;
        Ok(vlogs)
    }

    fn expired_vlogs_for_user(&self, user_id: usize, now: i64) -> LifecycleResult<Vec<Vlog>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM {} WHERE user_id = ?1 AND expires_at <= ?2 \
             ORDER BY created DESC, id DESC",
            VLOG_COLUMNS, VLOG_TABLE.name
        ))?;
        let vlogs = stmt
            .query_map(params![user_id, now], row_to_vlog)?
            .collect::<Result<Vec<Vlog>, _>>()?;
        Ok(vlogs)
    }

    fn feed_vlogs(
        &self,
        owner_ids: &[usize],
        tag: Option<&str>,
        now: i64,
    ) -> LifecycleResult<Vec<Vlog>> {
        if owner_ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn.lock().unwrap();

        let placeholders = vec!["?"; owner_ids.len()].join(", ");
        let mut sql_params: Vec<Value> = vec![Value::Integer(now)];
        sql_params.extend(owner_ids.iter().map(|id| Value::Integer(*id as i64)));

        let sql = match tag {
            Some(tag) => {
                sql_params.push(Value::Text(tag.to_string()));
                format!(
                    "SELECT v.id, v.user_id, v.title, v.description, v.external_id, \
                            v.thumbnail_url, v.duration, v.created, v.expires_at, v.likes_count \
                     FROM {vlog} v \
                     JOIN {vlog_tag} vt ON vt.vlog_id = v.id \
                     JOIN {tag} t ON t.id = vt.tag_id \
                     WHERE v.expires_at > ? AND v.user_id IN ({placeholders}) AND t.name = ? \
                     ORDER BY v.created DESC, v.id DESC",
                    vlog = VLOG_TABLE.name,
                    vlog_tag = VLOG_TAG_TABLE.name,
                    tag = TAG_TABLE.name,
                )
            }
            None => format!(
                "SELECT {columns} FROM {vlog} \
                 WHERE expires_at > ? AND user_id IN ({placeholders}) \
                 ORDER BY created DESC, id DESC",
                columns = VLOG_COLUMNS,
                vlog = VLOG_TABLE.name,
            ),
        };

        let mut stmt = conn.prepare(&sql)?;
        let vlogs = stmt
            .query_map(rusqlite::params_from_iter(sql_params), row_to_vlog)?
            .collect::<Result<Vec<Vlog>, _>>()?;
        Ok(vlogs)
    }

    fn set_liked(
        &self,
        vlog_id: usize,
        user_id: usize,
        liked: bool,
        now: i64,
    ) -> LifecycleResult<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let expires_at = Self::vlog_expiry(&tx, vlog_id)?;
        if !is_active(expires_at, now) {
            return Err(LifecycleError::ItemExpired);
        }

        if liked {
            tx.execute(
                &format!(
                    "INSERT INTO {} (user_id, vlog_id) VALUES (?1, ?2)",
                    VLOG_LIKE_TABLE.name
                ),
                params![user_id, vlog_id],
            )
            .map_err(|err| {
                if is_constraint_violation(&err) {
                    LifecycleError::AlreadyLiked
                } else {
                    err.into()
                }
            })?;
            tx.execute(
                &format!(
                    "UPDATE {} SET likes_count = likes_count + 1 WHERE id = ?1",
                    VLOG_TABLE.name
                ),
                params![vlog_id],
            )?;
        } else {
            let deleted = tx.execute(
                &format!(
                    "DELETE FROM {} WHERE user_id = ?1 AND vlog_id = ?2",
                    VLOG_LIKE_TABLE.name
                ),
                params![user_id, vlog_id],
            )?;
            if deleted == 0 {
                return Err(LifecycleError::NotLiked);
            }
            tx.execute(
                &format!(
                    "UPDATE {} SET likes_count = MAX(likes_count - 1, 0) WHERE id = ?1",
                    VLOG_TABLE.name
                ),
                params![vlog_id],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    fn has_liked(&self, vlog_id: usize, user_id: usize) -> LifecycleResult<bool> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            &format!(
                "SELECT COUNT(*) FROM {} WHERE user_id = ?1 AND vlog_id = ?2",
                VLOG_LIKE_TABLE.name
            ),
            params![user_id, vlog_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn add_comment(
        &self,
        vlog_id: usize,
        user_id: usize,
        content: &str,
        now: i64,
    ) -> LifecycleResult<CommentView> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let expires_at = Self::vlog_expiry(&tx, vlog_id)?;
        if !is_active(expires_at, now) {
            return Err(LifecycleError::ItemExpired);
        }

        tx.execute(
            &format!(
                "INSERT INTO {} (user_id, vlog_id, content, created) VALUES (?1, ?2, ?3, ?4)",
                COMMENT_TABLE.name
            ),
            params![user_id, vlog_id, content, now],
        )?;
        let comment_id = tx.last_insert_rowid() as usize;
        let view = Self::comment_view(&tx, comment_id)?;

        tx.commit()?;
        Ok(view)
    }

    fn vlog_comments(&self, vlog_id: usize) -> LifecycleResult<Vec<CommentView>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT c.id, c.vlog_id, c.content, c.created, \
                    u.id, u.handle, u.display_name, u.avatar_url \
             FROM {} c JOIN {} u ON u.id = c.user_id \
             WHERE c.vlog_id = ?1 ORDER BY c.created DESC, c.id DESC",
            COMMENT_TABLE.name, USER_TABLE.name
        ))?;
        let comments = stmt
            .query_map(params![vlog_id], |row| {
                Ok(CommentView {
                    id: row.get(0)?,
                    vlog_id: row.get(1)?,
                    content: row.get(2)?,
                    created: row.get(3)?,
                    author: UserBrief {
                        id: row.get(4)?,
                        handle: row.get(5)?,
                        display_name: row.get(6)?,
                        avatar_url: row.get(7)?,
                    },
                })
            })?
            .collect::<Result<Vec<CommentView>, _>>()?;
        Ok(comments)
    }

    fn vlog_tags(&self, vlog_id: usize) -> LifecycleResult<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT t.name FROM {} t JOIN {} vt ON vt.tag_id = t.id \
             WHERE vt.vlog_id = ?1 ORDER BY t.name",
            TAG_TABLE.name, VLOG_TAG_TABLE.name
        ))?;
        let tags = stmt
            .query_map(params![vlog_id], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(tags)
    }

    fn republish_vlog(
        &self,
        vlog_id: usize,
        requester_id: usize,
        now: i64,
    ) -> LifecycleResult<Vlog> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let mut vlog = tx
            .query_row(
                &format!(
                    "SELECT {} FROM {} WHERE id = ?1",
                    VLOG_COLUMNS, VLOG_TABLE.name
                ),
                params![vlog_id],
                row_to_vlog,
            )
            .optional()?
            .ok_or(LifecycleError::NotFound)?;

        if vlog.user_id != requester_id {
            return Err(LifecycleError::NotOwner);
        }
        if is_active(vlog.expires_at, now) {
            return Err(LifecycleError::NotExpired);
        }

        let expires_at = now + VLOG_WINDOW_SECS;
        tx.execute(
            &format!(
                "UPDATE {} SET expires_at = ?1 WHERE id = ?2",
                VLOG_TABLE.name
            ),
            params![expires_at, vlog_id],
        )?;

        tx.commit()?;
        vlog.expires_at = expires_at;
        Ok(vlog)
    }

    fn count_expired(&self, now: i64) -> LifecycleResult<usize> {
        let conn = self.conn.lock().unwrap();
        let count: usize = conn.query_row(
            &format!(
                "SELECT COUNT(*) FROM {} WHERE expires_at <= ?1",
                VLOG_TABLE.name
            ),
            params![now],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn count_active(&self, now: i64) -> LifecycleResult<usize> {
        let conn = self.conn.lock().unwrap();
        let count: usize = conn.query_row(
            &format!(
                "SELECT COUNT(*) FROM {} WHERE expires_at > ?1",
                VLOG_TABLE.name
            ),
            params![now],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn like_counter_drift(&self) -> LifecycleResult<Vec<CounterDrift>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT v.id, v.likes_count, \
                    (SELECT COUNT(*) FROM {like} l WHERE l.vlog_id = v.id) \
             FROM {vlog} v",
            like = VLOG_LIKE_TABLE.name,
            vlog = VLOG_TABLE.name
        ))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<usize, usize>(0)?,
                    row.get::<usize, i64>(1)?,
                    row.get::<usize, i64>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows
            .into_iter()
            .filter(|(_, stored, actual)| stored != actual)
            .map(|(row_id, stored, actual)| CounterDrift {
                row_id,
                counter: "likes_count",
                stored,
                actual,
            })
            .collect())
    }
}

impl AuthTokenStore for SqliteStore {
    fn get_auth_token(&self, token: &AuthTokenValue) -> Result<Option<AuthToken>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            &format!(
                "SELECT user_id, value, created, last_used FROM {} WHERE value = ?1",
                AUTH_TOKEN_TABLE.name
            ),
            params![token.0],
            |row| {
                Ok(AuthToken {
                    user_id: row.get(0)?,
                    value: AuthTokenValue(row.get(1)?),
                    created: row.get(2)?,
                    last_used: row.get(3)?,
                })
            },
        )
        .optional()
        .context("Failed to read auth token")
    }

    fn add_auth_token(&self, token: AuthToken) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            &format!(
                "INSERT INTO {} (user_id, value) VALUES (?1, ?2)",
                AUTH_TOKEN_TABLE.name
            ),
            params![token.user_id, token.value.0],
        )?;
        Ok(())
    }

    fn delete_auth_token(&self, token: &AuthTokenValue) -> Result<Option<AuthToken>> {
        let existing = self.get_auth_token(token)?;
        if existing.is_some() {
            let conn = self.conn.lock().unwrap();
            conn.execute(
                &format!("DELETE FROM {} WHERE value = ?1", AUTH_TOKEN_TABLE.name),
                params![token.0],
            )?;
        }
        Ok(existing)
    }

    fn touch_auth_token(&self, token: &AuthTokenValue, now: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            &format!(
                "UPDATE {} SET last_used = ?1 WHERE value = ?2",
                AUTH_TOKEN_TABLE.name
            ),
            params![now, token.0],
        )?;
        Ok(())
    }
}

impl AuthCredentialsStore for SqliteStore {
    fn get_password_credentials(&self, user_id: usize) -> Result<Option<PasswordCredentials>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            &format!(
                "SELECT user_id, salt, hash, hasher, created FROM {} WHERE user_id = ?1",
                PASSWORD_CREDENTIALS_TABLE.name
            ),
            params![user_id],
            |row| {
                let hasher = Vlog72Hasher::from_str(&row.get::<usize, String>(3)?)
                    .map_err(|_| rusqlite::Error::InvalidQuery)?;
                Ok(PasswordCredentials {
                    user_id: row.get(0)?,
                    salt: row.get(1)?,
                    hash: row.get(2)?,
                    hasher,
                    created: row.get(4)?,
                })
            },
        )
        .optional()
        .context("Failed to read password credentials")
    }

    fn set_password_credentials(&self, credentials: PasswordCredentials) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            &format!(
                "UPDATE {} SET salt = ?1, hash = ?2, hasher = ?3 WHERE user_id = ?4",
                PASSWORD_CREDENTIALS_TABLE.name
            ),
            params![
                credentials.salt,
                credentials.hash,
                credentials.hasher.to_string(),
                credentials.user_id
            ],
        )?;
        if updated == 0 {
            conn.execute(
                &format!(
                    "INSERT INTO {} (user_id, salt, hash, hasher) VALUES (?1, ?2, ?3, ?4)",
                    PASSWORD_CREDENTIALS_TABLE.name
                ),
                params![
                    credentials.user_id,
                    credentials.salt,
                    credentials.hash,
                    credentials.hasher.to_string(),
                ],
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::models::NewUser;

    fn test_store() -> (tempfile::TempDir, SqliteStore) {
        let dir = tempfile::TempDir::new().unwrap();
        let store = SqliteStore::new(dir.path().join("test.db")).unwrap();
        (dir, store)
    }

    fn make_user(store: &SqliteStore, handle: &str) -> usize {
        store
            .create_user(&NewUser {
                handle: handle.to_string(),
                display_name: handle.to_uppercase(),
                email: format!("{handle}@example.com"),
                avatar_url: None,
                bio: None,
            })
            .unwrap()
    }

    fn make_vlog(store: &SqliteStore, user_id: usize, external_id: &str, now: i64) -> Vlog {
        store
            .create_vlog(
                user_id,
                &VlogUpload {
                    title: format!("vlog {external_id}"),
                    description: None,
                    external_id: external_id.to_string(),
                    thumbnail_url: "https://cdn.example.com/thumb.jpg".to_string(),
                    duration: "0:42".to_string(),
                    tags: vec!["travel".to_string()],
                },
                now,
            )
            .unwrap()
    }

    #[test]
    fn vlog_expires_72_hours_after_creation() {
        let (_dir, store) = test_store();
        let user_id = make_user(&store, "alice");
        let now = 1_700_000_000;

        let vlog = make_vlog(&store, user_id, "yt-1", now);

        assert_eq!(vlog.expires_at, now + VLOG_WINDOW_SECS);
        assert_eq!(store.count_active(now).unwrap(), 1);
        assert_eq!(store.count_expired(now + VLOG_WINDOW_SECS).unwrap(), 1);
    }

    #[test]
    fn duplicate_external_id_rejected() {
        let (_dir, store) = test_store();
        let user_id = make_user(&store, "alice");
        let now = 1_700_000_000;
        make_vlog(&store, user_id, "yt-1", now);

        let result = store.create_vlog(
            user_id,
            &VlogUpload {
                title: "again".to_string(),
                description: None,
                external_id: "yt-1".to_string(),
                thumbnail_url: "https://cdn.example.com/thumb.jpg".to_string(),
                duration: "0:10".to_string(),
                tags: vec![],
            },
            now,
        );

        assert!(matches!(result, Err(LifecycleError::Validation(_))));
    }

    #[test]
    fn like_toggle_maintains_counter() {
        let (_dir, store) = test_store();
        let alice = make_user(&store, "alice");
        let bob = make_user(&store, "bob");
        let now = 1_700_000_000;
        let vlog = make_vlog(&store, alice, "yt-1", now);

        store.set_liked(vlog.id, bob, true, now).unwrap();
        assert_eq!(store.get_vlog(vlog.id).unwrap().unwrap().likes_count, 1);
        assert!(store.has_liked(vlog.id, bob).unwrap());

        assert!(matches!(
            store.set_liked(vlog.id, bob, true, now),
            Err(LifecycleError::AlreadyLiked)
        ));
        // Rejected double-like must not bump the counter.
        assert_eq!(store.get_vlog(vlog.id).unwrap().unwrap().likes_count, 1);

        store.set_liked(vlog.id, bob, false, now).unwrap();
        assert_eq!(store.get_vlog(vlog.id).unwrap().unwrap().likes_count, 0);
        assert!(matches!(
            store.set_liked(vlog.id, bob, false, now),
            Err(LifecycleError::NotLiked)
        ));
        assert_eq!(store.get_vlog(vlog.id).unwrap().unwrap().likes_count, 0);
    }

    #[test]
    fn like_rejected_on_expired_vlog() {
        let (_dir, store) = test_store();
        let alice = make_user(&store, "alice");
        let bob = make_user(&store, "bob");
        let now = 1_700_000_000;
        let vlog = make_vlog(&store, alice, "yt-1", now);

        let after_expiry = vlog.expires_at;
        assert!(matches!(
            store.set_liked(vlog.id, bob, true, after_expiry),
            Err(LifecycleError::ItemExpired)
        ));
    }

    #[test]
    fn comment_rejected_on_expired_vlog() {
        let (_dir, store) = test_store();
        let alice = make_user(&store, "alice");
        let bob = make_user(&store, "bob");
        let now = 1_700_000_000;
        let vlog = make_vlog(&store, alice, "yt-1", now);

        let comment = store.add_comment(vlog.id, bob, "nice", now).unwrap();
        assert_eq!(comment.author.handle, "bob");
        assert_eq!(comment.created, now);

        assert!(matches!(
            store.add_comment(vlog.id, bob, "too late", vlog.expires_at),
            Err(LifecycleError::ItemExpired)
        ));
        assert_eq!(store.vlog_comments(vlog.id).unwrap().len(), 1);
    }

    #[test]
    fn follow_round_trip_maintains_counters() {
        let (_dir, store) = test_store();
        let alice = make_user(&store, "alice");
        let bob = make_user(&store, "bob");

        store.follow(alice, bob).unwrap();
        assert!(store.is_following(alice, bob).unwrap());
        assert_eq!(
            store.get_user_by_id(bob).unwrap().unwrap().followers_count,
            1
        );
        assert_eq!(
            store.get_user_by_id(alice).unwrap().unwrap().following_count,
            1
        );

        assert!(matches!(
            store.follow(alice, bob),
            Err(LifecycleError::AlreadyFollowing)
        ));

        store.unfollow(alice, bob).unwrap();
        assert!(!store.is_following(alice, bob).unwrap());
        assert_eq!(
            store.get_user_by_id(bob).unwrap().unwrap().followers_count,
            0
        );
        assert!(matches!(
            store.unfollow(alice, bob),
            Err(LifecycleError::NotFollowing)
        ));
    }

    #[test]
    fn follow_missing_user_is_not_found() {
        let (_dir, store) = test_store();
        let alice = make_user(&store, "alice");

        assert!(matches!(
            store.follow(alice, 999),
            Err(LifecycleError::NotFound)
        ));
    }

    #[test]
    fn feed_filters_by_owner_expiry_and_tag() {
        let (_dir, store) = test_store();
        let alice = make_user(&store, "alice");
        let bob = make_user(&store, "bob");
        let carol = make_user(&store, "carol");
        let now = 1_700_000_000;

        let fresh = make_vlog(&store, alice, "yt-1", now);
        let old = make_vlog(&store, alice, "yt-2", now - VLOG_WINDOW_SECS - 1);
        make_vlog(&store, carol, "yt-3", now);
        store
            .create_vlog(
                bob,
                &VlogUpload {
                    title: "untagged".to_string(),
                    description: None,
                    external_id: "yt-4".to_string(),
                    thumbnail_url: "https://cdn.example.com/thumb.jpg".to_string(),
                    duration: "1:00".to_string(),
                    tags: vec![],
                },
                now,
            )
            .unwrap();

        let feed = store.feed_vlogs(&[alice, bob], None, now).unwrap();
        let ids: Vec<usize> = feed.iter().map(|v| v.id).collect();
        assert!(ids.contains(&fresh.id));
        assert!(!ids.contains(&old.id));
        assert_eq!(feed.len(), 2);

        let tagged = store.feed_vlogs(&[alice, bob], Some("travel"), now).unwrap();
        assert_eq!(tagged.len(), 1);
        assert_eq!(tagged[0].id, fresh.id);
    }

    #[test]
    fn feed_is_newest_first() {
        let (_dir, store) = test_store();
        let alice = make_user(&store, "alice");
        let now = 1_700_000_000;

        let first = make_vlog(&store, alice, "yt-1", now - 100);
        let second = make_vlog(&store, alice, "yt-2", now - 50);
        let third = make_vlog(&store, alice, "yt-3", now);

        let feed = store.feed_vlogs(&[alice], None, now).unwrap();
        let ids: Vec<usize> = feed.iter().map(|v| v.id).collect();
        assert_eq!(ids, vec![third.id, second.id, first.id]);
    }

    #[test]
    fn republish_restarts_the_window_and_keeps_engagement() {
        let (_dir, store) = test_store();
        let alice = make_user(&store, "alice");
        let bob = make_user(&store, "bob");
        let created = 1_700_000_000;
        let vlog = make_vlog(&store, alice, "yt-1", created);

        store.set_liked(vlog.id, bob, true, created).unwrap();
        store.add_comment(vlog.id, bob, "hello", created).unwrap();

        let now = vlog.expires_at + 3600;
        assert!(matches!(
            store.republish_vlog(vlog.id, bob, now),
            Err(LifecycleError::NotOwner)
        ));
        assert!(matches!(
            store.republish_vlog(vlog.id, alice, created + 1),
            Err(LifecycleError::NotExpired)
        ));

        let republished = store.republish_vlog(vlog.id, alice, now).unwrap();
        assert_eq!(republished.expires_at, now + VLOG_WINDOW_SECS);
        assert_eq!(republished.created, created);
        assert_eq!(republished.likes_count, 1);
        assert_eq!(store.vlog_comments(vlog.id).unwrap().len(), 1);
        assert!(store.has_liked(vlog.id, bob).unwrap());
    }

    #[test]
    fn republish_missing_vlog_is_not_found() {
        let (_dir, store) = test_store();
        let alice = make_user(&store, "alice");
        assert!(matches!(
            store.republish_vlog(42, alice, 1_700_000_000),
            Err(LifecycleError::NotFound)
        ));
    }

    #[test]
    fn discover_matches_handle_and_display_name() {
        let (_dir, store) = test_store();
        let alice = make_user(&store, "alice");
        make_user(&store, "bob");
        make_user(&store, "alfred");

        let all = store.discover_users(None, 0, 20).unwrap();
        assert_eq!(all.len(), 3);

        let matched = store.discover_users(Some("AL"), 0, 20).unwrap();
        let handles: Vec<&str> = matched.iter().map(|u| u.handle.as_str()).collect();
        assert_eq!(handles.len(), 2);
        assert!(handles.contains(&"alice"));
        assert!(handles.contains(&"alfred"));

        let without_alice = store.discover_users(Some("AL"), alice, 20).unwrap();
        let handles: Vec<&str> = without_alice.iter().map(|u| u.handle.as_str()).collect();
        assert_eq!(handles, vec!["alfred"]);
    }

    #[test]
    fn create_user_distinguishes_handle_and_email_conflicts() {
        let (_dir, store) = test_store();
        make_user(&store, "alice");

        let same_handle = NewUser {
            handle: "alice".to_string(),
            display_name: "Other Alice".to_string(),
            email: "other@example.com".to_string(),
            avatar_url: None,
            bio: None,
        };
        assert!(matches!(
            store.create_user(&same_handle),
            Err(LifecycleError::HandleTaken)
        ));

        let same_email = NewUser {
            handle: "alice2".to_string(),
            display_name: "Other Alice".to_string(),
            email: "alice@example.com".to_string(),
            avatar_url: None,
            bio: None,
        };
        assert!(matches!(
            store.create_user(&same_email),
            Err(LifecycleError::Validation(_))
        ));
    }

    #[test]
    fn counter_drift_detects_manual_tampering() {
        let (_dir, store) = test_store();
        let alice = make_user(&store, "alice");
        let bob = make_user(&store, "bob");
        let now = 1_700_000_000;
        let vlog = make_vlog(&store, alice, "yt-1", now);
        store.set_liked(vlog.id, bob, true, now).unwrap();
        store.follow(bob, alice).unwrap();

        assert!(store.like_counter_drift().unwrap().is_empty());
        assert!(store.follow_counter_drift().unwrap().is_empty());

        {
            let conn = store.conn.lock().unwrap();
            conn.execute("UPDATE vlog SET likes_count = 5 WHERE id = ?1", [vlog.id])
                .unwrap();
            conn.execute(
                "UPDATE user SET followers_count = 9 WHERE id = ?1",
                [alice],
            )
            .unwrap();
        }

        let like_drift = store.like_counter_drift().unwrap();
        assert_eq!(
            like_drift,
            vec![CounterDrift {
                row_id: vlog.id,
                counter: "likes_count",
                stored: 5,
                actual: 1,
            }]
        );
        let follow_drift = store.follow_counter_drift().unwrap();
        assert_eq!(follow_drift.len(), 1);
        assert_eq!(follow_drift[0].row_id, alice);
    }
}
