//! Forum activity counts attached to users.

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use sqlx::SqlitePool;

use crate::cache::{keys, Cache};
use crate::db::{self, User};

/// Per-user forum activity.
#[async_trait]
pub trait HasForumCounts: Send + Sync {
    /// Number of live posts the user has written.
    async fn forum_post_count(&self, user_id: i64) -> Result<i64>;

    /// Number of live threads the user has started.
    async fn forum_thread_count(&self, user_id: i64) -> Result<i64>;
}

/// Database-backed counts, memoized in the cache.
pub struct CachedForumCounts<'a> {
    pool: &'a SqlitePool,
    cache: &'a Cache,
}

impl<'a> CachedForumCounts<'a> {
    #[must_use]
    pub const fn new(pool: &'a SqlitePool, cache: &'a Cache) -> Self {
        Self { pool, cache }
    }
}

#[async_trait]
impl HasForumCounts for CachedForumCounts<'_> {
    async fn forum_post_count(&self, user_id: i64) -> Result<i64> {
        self.cache
            .get_or_load(&keys::user_post_count(user_id), || {
                db::count_posts_by_poster(self.pool, user_id)
            })
            .await
    }

    async fn forum_thread_count(&self, user_id: i64) -> Result<i64> {
        self.cache
            .get_or_load(&keys::user_thread_count(user_id), || {
                db::count_threads_by_poster(self.pool, user_id)
            })
            .await
    }
}

/// Public view of a user with forum counts.
#[derive(Debug, Clone, Serialize)]
pub struct UserProfile {
    pub id: i64,
    pub username: String,
    pub forum_post_count: i64,
    pub forum_thread_count: i64,
}

pub async fn user_profile<C: HasForumCounts + ?Sized>(counts: &C, user: User) -> Result<UserProfile> {
    Ok(UserProfile {
        forum_post_count: counts.forum_post_count(user.id).await?,
        forum_thread_count: counts.forum_thread_count(user.id).await?,
        id: user.id,
        username: user.username,
    })
}
