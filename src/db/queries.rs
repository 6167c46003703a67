use anyhow::{Context, Result};
use sqlx::SqlitePool;

use super::models::{
    CategoryUpdate, Forum, ForumCategory, ForumPoll, ForumPollAnswer, ForumPollChoice, ForumPost,
    ForumPostEditHistory, ForumThread, ForumThreadNote, ForumUpdate, NewCategory, NewForum,
    NewPost, NewThread, Notification, Page, PollUpdate, ThreadUpdate, User, UserPermission,
};

// ========== Users ==========

/// Get a user by ID.
pub async fn get_user_by_id(pool: &SqlitePool, id: i64) -> Result<Option<User>> {
    sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to fetch user by id")
}

/// Get a user by username (case-insensitive).
pub async fn get_user_by_username(pool: &SqlitePool, username: &str) -> Result<Option<User>> {
    sqlx::query_as("SELECT * FROM users WHERE username = ? COLLATE NOCASE")
        .bind(username)
        .fetch_optional(pool)
        .await
        .context("Failed to fetch user by username")
}

/// Create a user, returning its ID.
pub async fn create_user(pool: &SqlitePool, username: &str) -> Result<i64> {
    let result = sqlx::query("INSERT INTO users (username) VALUES (?)")
        .bind(username)
        .execute(pool)
        .await
        .context("Failed to create user")?;

    Ok(result.last_insert_rowid())
}

/// Return the ID of the named user, creating the account if it is missing.
pub async fn get_or_create_user(pool: &SqlitePool, username: &str) -> Result<i64> {
    if let Some(user) = get_user_by_username(pool, username).await? {
        return Ok(user.id);
    }
    create_user(pool, username).await
}

// ========== Permissions ==========

/// Grant a permission, overriding an earlier revocation.
pub async fn grant_permission(pool: &SqlitePool, user_id: i64, permission: &str) -> Result<()> {
    set_permission(pool, user_id, permission, true).await
}

/// Explicitly revoke a permission. Used to hide single threads.
pub async fn ungrant_permission(pool: &SqlitePool, user_id: i64, permission: &str) -> Result<()> {
    set_permission(pool, user_id, permission, false).await
}

async fn set_permission(
    pool: &SqlitePool,
    user_id: i64,
    permission: &str,
    granted: bool,
) -> Result<()> {
    sqlx::query(
        r"
        INSERT INTO user_permissions (user_id, permission, granted)
        VALUES (?, ?, ?)
        ON CONFLICT(user_id, permission) DO UPDATE SET granted = excluded.granted
        ",
    )
    .bind(user_id)
    .bind(permission)
    .bind(granted)
    .execute(pool)
    .await
    .context("Failed to set user permission")?;
    Ok(())
}

/// Get every permission row of a user, granted and revoked.
pub async fn get_user_permissions(pool: &SqlitePool, user_id: i64) -> Result<Vec<UserPermission>> {
    sqlx::query_as("SELECT * FROM user_permissions WHERE user_id = ?")
        .bind(user_id)
        .fetch_all(pool)
        .await
        .context("Failed to fetch user permissions")
}

// ========== API Tokens ==========

/// Store an API token for a user. Re-registering an existing token is a no-op.
pub async fn create_api_token(pool: &SqlitePool, user_id: i64, token: &str) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO api_tokens (user_id, token) VALUES (?, ?)")
        .bind(user_id)
        .bind(token)
        .execute(pool)
        .await
        .context("Failed to create API token")?;
    Ok(())
}

/// Resolve an API token to its user.
pub async fn get_user_by_token(pool: &SqlitePool, token: &str) -> Result<Option<User>> {
    sqlx::query_as(
        r"
        SELECT u.* FROM users u
        JOIN api_tokens t ON t.user_id = u.id
        WHERE t.token = ?
        ",
    )
    .bind(token)
    .fetch_optional(pool)
    .await
    .context("Failed to fetch user by token")
}

/// Update token last_used_at.
pub async fn touch_api_token(pool: &SqlitePool, token: &str) -> Result<()> {
    sqlx::query("UPDATE api_tokens SET last_used_at = datetime('now') WHERE token = ?")
        .bind(token)
        .execute(pool)
        .await
        .context("Failed to update token last_used")?;
    Ok(())
}

// ========== Notifications ==========

/// Insert a notification, returning its ID.
pub async fn create_notification(
    pool: &SqlitePool,
    user_id: i64,
    kind: &str,
    contents: &str,
) -> Result<i64> {
    let result = sqlx::query("INSERT INTO notifications (user_id, type, contents) VALUES (?, ?, ?)")
        .bind(user_id)
        .bind(kind)
        .bind(contents)
        .execute(pool)
        .await
        .context("Failed to create notification")?;

    Ok(result.last_insert_rowid())
}

/// Get a user's notifications, newest first.
pub async fn get_notifications(
    pool: &SqlitePool,
    user_id: i64,
    kind: Option<&str>,
    include_read: bool,
) -> Result<Vec<Notification>> {
    sqlx::query_as(
        r"
        SELECT * FROM notifications
        WHERE user_id = ?
          AND (? IS NULL OR type = ?)
          AND (? OR read = 0)
        ORDER BY id DESC
        ",
    )
    .bind(user_id)
    .bind(kind)
    .bind(kind)
    .bind(include_read)
    .fetch_all(pool)
    .await
    .context("Failed to fetch notifications")
}

/// Count unread notifications per type.
pub async fn count_unread_notifications(
    pool: &SqlitePool,
    user_id: i64,
) -> Result<Vec<(String, i64)>> {
    sqlx::query_as(
        r"
        SELECT type, COUNT(*) FROM notifications
        WHERE user_id = ? AND read = 0
        GROUP BY type
        ORDER BY type
        ",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
    .context("Failed to count notifications")
}

/// Mark notifications read, returning how many changed.
pub async fn mark_notifications_read(
    pool: &SqlitePool,
    user_id: i64,
    kind: Option<&str>,
) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE notifications SET read = 1 WHERE user_id = ? AND read = 0 AND (? IS NULL OR type = ?)",
    )
    .bind(user_id)
    .bind(kind)
    .bind(kind)
    .execute(pool)
    .await
    .context("Failed to mark notifications read")?;

    Ok(result.rows_affected())
}

// ========== Categories ==========

/// Get all categories ordered by position.
pub async fn get_categories(pool: &SqlitePool, include_dead: bool) -> Result<Vec<ForumCategory>> {
    sqlx::query_as(
        "SELECT * FROM forums_categories WHERE (? OR deleted = 0) ORDER BY position ASC, id ASC",
    )
    .bind(include_dead)
    .fetch_all(pool)
    .await
    .context("Failed to fetch categories")
}

pub async fn get_category(
    pool: &SqlitePool,
    id: i64,
    include_dead: bool,
) -> Result<Option<ForumCategory>> {
    sqlx::query_as("SELECT * FROM forums_categories WHERE id = ? AND (? OR deleted = 0)")
        .bind(id)
        .bind(include_dead)
        .fetch_optional(pool)
        .await
        .context("Failed to fetch category")
}

/// Insert a new category, returning its ID.
pub async fn insert_category(pool: &SqlitePool, category: &NewCategory) -> Result<i64> {
    let result = sqlx::query(
        "INSERT INTO forums_categories (name, description, position) VALUES (?, ?, ?)",
    )
    .bind(&category.name)
    .bind(&category.description)
    .bind(category.position)
    .execute(pool)
    .await
    .context("Failed to insert category")?;

    Ok(result.last_insert_rowid())
}

pub async fn update_category(pool: &SqlitePool, id: i64, update: &CategoryUpdate) -> Result<()> {
    sqlx::query(
        r"
        UPDATE forums_categories
        SET name = COALESCE(?, name),
            description = COALESCE(?, description),
            position = COALESCE(?, position)
        WHERE id = ?
        ",
    )
    .bind(&update.name)
    .bind(&update.description)
    .bind(update.position)
    .bind(id)
    .execute(pool)
    .await
    .context("Failed to update category")?;
    Ok(())
}

/// Soft-delete a category.
pub async fn delete_category(pool: &SqlitePool, id: i64) -> Result<()> {
    sqlx::query("UPDATE forums_categories SET deleted = 1 WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to delete category")?;
    Ok(())
}

// ========== Forums ==========

/// Get the forums of a category ordered by position.
pub async fn get_forums_in_category(
    pool: &SqlitePool,
    category_id: i64,
    include_dead: bool,
) -> Result<Vec<Forum>> {
    sqlx::query_as(
        r"
        SELECT * FROM forums
        WHERE category_id = ? AND (? OR deleted = 0)
        ORDER BY position ASC, id ASC
        ",
    )
    .bind(category_id)
    .bind(include_dead)
    .fetch_all(pool)
    .await
    .context("Failed to fetch forums of category")
}

pub async fn get_forum(pool: &SqlitePool, id: i64, include_dead: bool) -> Result<Option<Forum>> {
    sqlx::query_as("SELECT * FROM forums WHERE id = ? AND (? OR deleted = 0)")
        .bind(id)
        .bind(include_dead)
        .fetch_optional(pool)
        .await
        .context("Failed to fetch forum")
}

/// Insert a new forum, returning its ID.
pub async fn insert_forum(pool: &SqlitePool, forum: &NewForum) -> Result<i64> {
    let result = sqlx::query(
        "INSERT INTO forums (name, description, category_id, position) VALUES (?, ?, ?, ?)",
    )
    .bind(&forum.name)
    .bind(&forum.description)
    .bind(forum.category_id)
    .bind(forum.position)
    .execute(pool)
    .await
    .context("Failed to insert forum")?;

    Ok(result.last_insert_rowid())
}

pub async fn update_forum(pool: &SqlitePool, id: i64, update: &ForumUpdate) -> Result<()> {
    let (set_description, description) = match &update.description {
        Some(value) => (true, value.clone()),
        None => (false, None),
    };

    sqlx::query(
        r"
        UPDATE forums
        SET name = COALESCE(?, name),
            description = CASE WHEN ? THEN ? ELSE description END,
            category_id = COALESCE(?, category_id),
            position = COALESCE(?, position)
        WHERE id = ?
        ",
    )
    .bind(&update.name)
    .bind(set_description)
    .bind(description)
    .bind(update.category_id)
    .bind(update.position)
    .bind(id)
    .execute(pool)
    .await
    .context("Failed to update forum")?;
    Ok(())
}

/// Soft-delete a forum and every thread in it.
pub async fn delete_forum(pool: &SqlitePool, id: i64) -> Result<()> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    sqlx::query("UPDATE forums SET deleted = 1 WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("Failed to delete forum")?;

    sqlx::query("UPDATE forums_threads SET deleted = 1 WHERE forum_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("Failed to delete forum threads")?;

    tx.commit().await.context("Failed to commit forum deletion")?;
    Ok(())
}

/// Get the `(thread_id, poster_id)` pairs of a forum's live threads.
pub async fn get_forum_thread_posters(pool: &SqlitePool, forum_id: i64) -> Result<Vec<(i64, i64)>> {
    sqlx::query_as("SELECT id, poster_id FROM forums_threads WHERE forum_id = ? AND deleted = 0")
        .bind(forum_id)
        .fetch_all(pool)
        .await
        .context("Failed to fetch forum thread posters")
}

/// Count the live forums of a category.
pub async fn count_forums_in_category(pool: &SqlitePool, category_id: i64) -> Result<i64> {
    let row: (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM forums WHERE category_id = ? AND deleted = 0")
            .bind(category_id)
            .fetch_one(pool)
            .await
            .context("Failed to count forums")?;
    Ok(row.0)
}

/// Count the live threads of a forum.
pub async fn count_threads_in_forum(pool: &SqlitePool, forum_id: i64) -> Result<i64> {
    let row: (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM forums_threads WHERE forum_id = ? AND deleted = 0")
            .bind(forum_id)
            .fetch_one(pool)
            .await
            .context("Failed to count threads")?;
    Ok(row.0)
}

/// Get the live thread of a forum with the most recent post.
pub async fn get_last_updated_thread(
    pool: &SqlitePool,
    forum_id: i64,
) -> Result<Option<ForumThread>> {
    sqlx::query_as(
        r"
        SELECT t.* FROM forums_threads t
        LEFT JOIN forums_posts p ON p.thread_id = t.id AND p.deleted = 0
        WHERE t.forum_id = ? AND t.deleted = 0
        GROUP BY t.id
        ORDER BY MAX(p.time) DESC, MAX(p.id) DESC
        LIMIT 1
        ",
    )
    .bind(forum_id)
    .fetch_optional(pool)
    .await
    .context("Failed to fetch last updated thread")
}

// ========== Threads ==========

pub async fn get_thread(
    pool: &SqlitePool,
    id: i64,
    include_dead: bool,
) -> Result<Option<ForumThread>> {
    sqlx::query_as("SELECT * FROM forums_threads WHERE id = ? AND (? OR deleted = 0)")
        .bind(id)
        .bind(include_dead)
        .fetch_optional(pool)
        .await
        .context("Failed to fetch thread")
}

/// Get a page of a forum's threads: sticky first, then most recently updated.
pub async fn get_threads_in_forum(
    pool: &SqlitePool,
    forum_id: i64,
    page: &Page,
) -> Result<Vec<ForumThread>> {
    sqlx::query_as(
        r"
        SELECT t.* FROM forums_threads t
        LEFT JOIN forums_posts p ON p.thread_id = t.id
        WHERE t.forum_id = ? AND (? OR t.deleted = 0)
        GROUP BY t.id
        ORDER BY t.sticky DESC, MAX(p.time) DESC, MAX(p.id) DESC, t.id DESC
        LIMIT ? OFFSET ?
        ",
    )
    .bind(forum_id)
    .bind(page.include_dead)
    .bind(page.limit)
    .bind(page.offset())
    .fetch_all(pool)
    .await
    .context("Failed to fetch threads of forum")
}

/// Get the IDs of every thread in a forum, deleted ones included.
pub async fn get_thread_ids_in_forum(pool: &SqlitePool, forum_id: i64) -> Result<Vec<i64>> {
    sqlx::query_scalar("SELECT id FROM forums_threads WHERE forum_id = ?")
        .bind(forum_id)
        .fetch_all(pool)
        .await
        .context("Failed to fetch thread ids of forum")
}

/// Insert a thread and its opening post atomically, returning `(thread_id, post_id)`.
pub async fn create_thread(pool: &SqlitePool, thread: &NewThread) -> Result<(i64, i64)> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let thread_id = sqlx::query(
        "INSERT INTO forums_threads (topic, forum_id, poster_id) VALUES (?, ?, ?)",
    )
    .bind(&thread.topic)
    .bind(thread.forum_id)
    .bind(thread.poster_id)
    .execute(&mut *tx)
    .await
    .context("Failed to insert thread")?
    .last_insert_rowid();

    let post_id = sqlx::query(
        "INSERT INTO forums_posts (thread_id, poster_id, contents) VALUES (?, ?, ?)",
    )
    .bind(thread_id)
    .bind(thread.poster_id)
    .bind(&thread.contents)
    .execute(&mut *tx)
    .await
    .context("Failed to insert opening post")?
    .last_insert_rowid();

    tx.commit().await.context("Failed to commit thread creation")?;
    Ok((thread_id, post_id))
}

pub async fn update_thread(pool: &SqlitePool, id: i64, update: &ThreadUpdate) -> Result<()> {
    sqlx::query(
        r"
        UPDATE forums_threads
        SET topic = COALESCE(?, topic),
            forum_id = COALESCE(?, forum_id),
            locked = COALESCE(?, locked),
            sticky = COALESCE(?, sticky)
        WHERE id = ?
        ",
    )
    .bind(&update.topic)
    .bind(update.forum_id)
    .bind(update.locked)
    .bind(update.sticky)
    .bind(id)
    .execute(pool)
    .await
    .context("Failed to update thread")?;
    Ok(())
}

/// Soft-delete a thread and every post in it.
pub async fn delete_thread(pool: &SqlitePool, id: i64) -> Result<()> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    sqlx::query("UPDATE forums_threads SET deleted = 1 WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("Failed to delete thread")?;

    sqlx::query("UPDATE forums_posts SET deleted = 1 WHERE thread_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("Failed to delete thread posts")?;

    tx.commit().await.context("Failed to commit thread deletion")?;
    Ok(())
}

/// Get the distinct authors of a thread's live posts.
pub async fn get_thread_poster_ids(pool: &SqlitePool, thread_id: i64) -> Result<Vec<i64>> {
    sqlx::query_scalar(
        "SELECT DISTINCT poster_id FROM forums_posts \
         WHERE thread_id = ? AND deleted = 0 ORDER BY poster_id",
    )
    .bind(thread_id)
    .fetch_all(pool)
    .await
    .context("Failed to fetch thread posters")
}

/// Count the live posts of a thread.
pub async fn count_posts_in_thread(pool: &SqlitePool, thread_id: i64) -> Result<i64> {
    let row: (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM forums_posts WHERE thread_id = ? AND deleted = 0")
            .bind(thread_id)
            .fetch_one(pool)
            .await
            .context("Failed to count posts")?;
    Ok(row.0)
}

/// Get the newest live post of a thread.
pub async fn get_last_post(pool: &SqlitePool, thread_id: i64) -> Result<Option<ForumPost>> {
    sqlx::query_as(
        "SELECT * FROM forums_posts WHERE thread_id = ? AND deleted = 0 ORDER BY id DESC LIMIT 1",
    )
    .bind(thread_id)
    .fetch_optional(pool)
    .await
    .context("Failed to fetch last post")
}

/// Count the live threads started by a user.
pub async fn count_threads_by_poster(pool: &SqlitePool, user_id: i64) -> Result<i64> {
    let row: (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM forums_threads WHERE poster_id = ? AND deleted = 0")
            .bind(user_id)
            .fetch_one(pool)
            .await
            .context("Failed to count threads of user")?;
    Ok(row.0)
}

/// Count the live posts written by a user.
pub async fn count_posts_by_poster(pool: &SqlitePool, user_id: i64) -> Result<i64> {
    let row: (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM forums_posts WHERE poster_id = ? AND deleted = 0")
            .bind(user_id)
            .fetch_one(pool)
            .await
            .context("Failed to count posts of user")?;
    Ok(row.0)
}

// ========== Posts ==========

pub async fn get_post(pool: &SqlitePool, id: i64, include_dead: bool) -> Result<Option<ForumPost>> {
    sqlx::query_as("SELECT * FROM forums_posts WHERE id = ? AND (? OR deleted = 0)")
        .bind(id)
        .bind(include_dead)
        .fetch_optional(pool)
        .await
        .context("Failed to fetch post")
}

/// Get a page of a thread's posts in posting order.
pub async fn get_posts_in_thread(
    pool: &SqlitePool,
    thread_id: i64,
    page: &Page,
) -> Result<Vec<ForumPost>> {
    sqlx::query_as(
        r"
        SELECT * FROM forums_posts
        WHERE thread_id = ? AND (? OR deleted = 0)
        ORDER BY id ASC
        LIMIT ? OFFSET ?
        ",
    )
    .bind(thread_id)
    .bind(page.include_dead)
    .bind(page.limit)
    .bind(page.offset())
    .fetch_all(pool)
    .await
    .context("Failed to fetch posts of thread")
}

/// Insert a new post, returning its ID.
pub async fn insert_post(pool: &SqlitePool, post: &NewPost) -> Result<i64> {
    let result =
        sqlx::query("INSERT INTO forums_posts (thread_id, poster_id, contents) VALUES (?, ?, ?)")
            .bind(post.thread_id)
            .bind(post.poster_id)
            .bind(&post.contents)
            .execute(pool)
            .await
            .context("Failed to insert post")?;

    Ok(result.last_insert_rowid())
}

/// Replace a post's contents, saving the previous revision to the edit history.
///
/// The saved revision is attributed to whoever produced it: the last editor,
/// or the poster if the post was never edited.
pub async fn edit_post_contents(
    pool: &SqlitePool,
    post: &ForumPost,
    contents: &str,
    editor_id: i64,
) -> Result<()> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    sqlx::query("INSERT INTO forums_posts_edit_history (post_id, editor_id, contents) VALUES (?, ?, ?)")
        .bind(post.id)
        .bind(post.edited_user_id.unwrap_or(post.poster_id))
        .bind(&post.contents)
        .execute(&mut *tx)
        .await
        .context("Failed to insert edit history")?;

    sqlx::query(
        r"
        UPDATE forums_posts
        SET contents = ?, edited_user_id = ?, edited_time = datetime('now')
        WHERE id = ?
        ",
    )
    .bind(contents)
    .bind(editor_id)
    .bind(post.id)
    .execute(&mut *tx)
    .await
    .context("Failed to update post contents")?;

    tx.commit().await.context("Failed to commit post edit")?;
    Ok(())
}

pub async fn set_post_sticky(pool: &SqlitePool, id: i64, sticky: bool) -> Result<()> {
    sqlx::query("UPDATE forums_posts SET sticky = ? WHERE id = ?")
        .bind(sticky)
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to update post sticky")?;
    Ok(())
}

/// Soft-delete a post.
pub async fn delete_post(pool: &SqlitePool, id: i64) -> Result<()> {
    sqlx::query("UPDATE forums_posts SET deleted = 1 WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to delete post")?;
    Ok(())
}

/// Get the previous revisions of a post, newest first.
pub async fn get_edit_history(pool: &SqlitePool, post_id: i64) -> Result<Vec<ForumPostEditHistory>> {
    sqlx::query_as("SELECT * FROM forums_posts_edit_history WHERE post_id = ? ORDER BY id DESC")
        .bind(post_id)
        .fetch_all(pool)
        .await
        .context("Failed to fetch edit history")
}

// ========== Last Viewed Posts ==========

pub async fn set_last_viewed_post(
    pool: &SqlitePool,
    user_id: i64,
    thread_id: i64,
    post_id: i64,
) -> Result<()> {
    sqlx::query(
        r"
        INSERT INTO last_viewed_forum_posts (user_id, thread_id, post_id)
        VALUES (?, ?, ?)
        ON CONFLICT(user_id, thread_id) DO UPDATE SET post_id = excluded.post_id
        WHERE excluded.post_id > COALESCE(last_viewed_forum_posts.post_id, 0)
        ",
    )
    .bind(user_id)
    .bind(thread_id)
    .bind(post_id)
    .execute(pool)
    .await
    .context("Failed to set last viewed post")?;
    Ok(())
}

/// Get the last post of a thread the user has seen.
///
/// If the recorded post was deleted since, falls back to the newest live post
/// before it.
pub async fn get_last_viewed_post(
    pool: &SqlitePool,
    user_id: i64,
    thread_id: i64,
) -> Result<Option<ForumPost>> {
    let recorded: Option<i64> = sqlx::query_scalar::<_, Option<i64>>(
        "SELECT post_id FROM last_viewed_forum_posts WHERE user_id = ? AND thread_id = ?",
    )
    .bind(user_id)
    .bind(thread_id)
    .fetch_optional(pool)
    .await
    .context("Failed to fetch last viewed post id")?
    .flatten();

    let Some(post_id) = recorded else {
        return Ok(None);
    };

    sqlx::query_as(
        r"
        SELECT * FROM forums_posts
        WHERE thread_id = ? AND id <= ? AND deleted = 0
        ORDER BY id DESC
        LIMIT 1
        ",
    )
    .bind(thread_id)
    .bind(post_id)
    .fetch_optional(pool)
    .await
    .context("Failed to fetch last viewed post")
}

// ========== Subscriptions ==========

pub async fn forum_subscription_exists(
    pool: &SqlitePool,
    user_id: i64,
    forum_id: i64,
) -> Result<bool> {
    let row: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM forums_forums_subscriptions WHERE user_id = ? AND forum_id = ?",
    )
    .bind(user_id)
    .bind(forum_id)
    .fetch_one(pool)
    .await
    .context("Failed to check forum subscription")?;
    Ok(row.0 > 0)
}

pub async fn insert_forum_subscription(
    pool: &SqlitePool,
    user_id: i64,
    forum_id: i64,
) -> Result<()> {
    sqlx::query("INSERT INTO forums_forums_subscriptions (user_id, forum_id) VALUES (?, ?)")
        .bind(user_id)
        .bind(forum_id)
        .execute(pool)
        .await
        .context("Failed to insert forum subscription")?;
    Ok(())
}

pub async fn delete_forum_subscription(
    pool: &SqlitePool,
    user_id: i64,
    forum_id: i64,
) -> Result<()> {
    sqlx::query("DELETE FROM forums_forums_subscriptions WHERE user_id = ? AND forum_id = ?")
        .bind(user_id)
        .bind(forum_id)
        .execute(pool)
        .await
        .context("Failed to delete forum subscription")?;
    Ok(())
}

/// Get the IDs of the users subscribed to a forum.
pub async fn get_forum_subscriber_ids(pool: &SqlitePool, forum_id: i64) -> Result<Vec<i64>> {
    sqlx::query_scalar(
        "SELECT user_id FROM forums_forums_subscriptions WHERE forum_id = ? ORDER BY user_id",
    )
    .bind(forum_id)
    .fetch_all(pool)
    .await
    .context("Failed to fetch forum subscribers")
}

/// Get the live forums a user is subscribed to.
pub async fn get_subscribed_forums(pool: &SqlitePool, user_id: i64) -> Result<Vec<Forum>> {
    sqlx::query_as(
        r"
        SELECT f.* FROM forums f
        JOIN forums_forums_subscriptions s ON s.forum_id = f.id
        WHERE s.user_id = ? AND f.deleted = 0
        ORDER BY f.id ASC
        ",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
    .context("Failed to fetch subscribed forums")
}

pub async fn thread_subscription_exists(
    pool: &SqlitePool,
    user_id: i64,
    thread_id: i64,
) -> Result<bool> {
    let row: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM forums_threads_subscriptions WHERE user_id = ? AND thread_id = ?",
    )
    .bind(user_id)
    .bind(thread_id)
    .fetch_one(pool)
    .await
    .context("Failed to check thread subscription")?;
    Ok(row.0 > 0)
}

/// Subscribe users to a thread, skipping existing subscriptions.
pub async fn subscribe_users_to_thread(
    pool: &SqlitePool,
    user_ids: &[i64],
    thread_id: i64,
) -> Result<()> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;
    for user_id in user_ids {
        sqlx::query(
            "INSERT OR IGNORE INTO forums_threads_subscriptions (user_id, thread_id) VALUES (?, ?)",
        )
        .bind(user_id)
        .bind(thread_id)
        .execute(&mut *tx)
        .await
        .context("Failed to insert thread subscription")?;
    }
    tx.commit()
        .await
        .context("Failed to commit thread subscriptions")?;
    Ok(())
}

pub async fn delete_thread_subscription(
    pool: &SqlitePool,
    user_id: i64,
    thread_id: i64,
) -> Result<()> {
    sqlx::query("DELETE FROM forums_threads_subscriptions WHERE user_id = ? AND thread_id = ?")
        .bind(user_id)
        .bind(thread_id)
        .execute(pool)
        .await
        .context("Failed to delete thread subscription")?;
    Ok(())
}

/// Get the IDs of the users subscribed to a thread.
pub async fn get_thread_subscriber_ids(pool: &SqlitePool, thread_id: i64) -> Result<Vec<i64>> {
    sqlx::query_scalar(
        "SELECT user_id FROM forums_threads_subscriptions WHERE thread_id = ? ORDER BY user_id",
    )
    .bind(thread_id)
    .fetch_all(pool)
    .await
    .context("Failed to fetch thread subscribers")
}

/// Get the live threads a user is subscribed to.
pub async fn get_subscribed_threads(pool: &SqlitePool, user_id: i64) -> Result<Vec<ForumThread>> {
    sqlx::query_as(
        r"
        SELECT t.* FROM forums_threads t
        JOIN forums_threads_subscriptions s ON s.thread_id = t.id
        WHERE s.user_id = ? AND t.deleted = 0
        ORDER BY t.id ASC
        ",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
    .context("Failed to fetch subscribed threads")
}

/// Get the subscribed threads with posts the user has not viewed yet,
/// most recently active first.
pub async fn get_unread_subscribed_threads(
    pool: &SqlitePool,
    user_id: i64,
) -> Result<Vec<ForumThread>> {
    sqlx::query_as(
        r"
        SELECT t.* FROM forums_threads t
        JOIN forums_threads_subscriptions s ON s.thread_id = t.id
        JOIN forums_posts p ON p.thread_id = t.id AND p.deleted = 0
        LEFT JOIN last_viewed_forum_posts lv ON lv.thread_id = t.id AND lv.user_id = s.user_id
        WHERE s.user_id = ? AND t.deleted = 0
        GROUP BY t.id
        HAVING MAX(p.id) > COALESCE(MAX(lv.post_id), 0)
        ORDER BY MAX(p.id) DESC
        ",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
    .context("Failed to fetch unread subscribed threads")
}

// ========== Thread Notes ==========

pub async fn insert_thread_note(
    pool: &SqlitePool,
    thread_id: i64,
    user_id: i64,
    note: &str,
) -> Result<i64> {
    let result =
        sqlx::query("INSERT INTO forums_threads_notes (thread_id, user_id, note) VALUES (?, ?, ?)")
            .bind(thread_id)
            .bind(user_id)
            .bind(note)
            .execute(pool)
            .await
            .context("Failed to insert thread note")?;

    Ok(result.last_insert_rowid())
}

pub async fn get_thread_note(pool: &SqlitePool, id: i64) -> Result<Option<ForumThreadNote>> {
    sqlx::query_as("SELECT * FROM forums_threads_notes WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to fetch thread note")
}

/// Get a thread's notes, newest first.
pub async fn get_thread_notes(pool: &SqlitePool, thread_id: i64) -> Result<Vec<ForumThreadNote>> {
    sqlx::query_as(
        "SELECT * FROM forums_threads_notes WHERE thread_id = ? ORDER BY time DESC, id DESC",
    )
    .bind(thread_id)
    .fetch_all(pool)
    .await
    .context("Failed to fetch thread notes")
}

// ========== Polls ==========

pub async fn get_poll(pool: &SqlitePool, id: i64) -> Result<Option<ForumPoll>> {
    sqlx::query_as("SELECT * FROM forums_polls WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to fetch poll")
}

pub async fn get_poll_by_thread(pool: &SqlitePool, thread_id: i64) -> Result<Option<ForumPoll>> {
    sqlx::query_as("SELECT * FROM forums_polls WHERE thread_id = ?")
        .bind(thread_id)
        .fetch_optional(pool)
        .await
        .context("Failed to fetch poll of thread")
}

/// Insert a poll and its initial choices, returning the poll ID.
pub async fn insert_poll(
    pool: &SqlitePool,
    thread_id: i64,
    question: &str,
    choices: &[String],
) -> Result<i64> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let poll_id = sqlx::query("INSERT INTO forums_polls (thread_id, question) VALUES (?, ?)")
        .bind(thread_id)
        .bind(question)
        .execute(&mut *tx)
        .await
        .context("Failed to insert poll")?
        .last_insert_rowid();

    for choice in choices {
        sqlx::query("INSERT INTO forums_polls_choices (poll_id, choice) VALUES (?, ?)")
            .bind(poll_id)
            .bind(choice)
            .execute(&mut *tx)
            .await
            .context("Failed to insert poll choice")?;
    }

    tx.commit().await.context("Failed to commit poll creation")?;
    Ok(poll_id)
}

/// Apply a poll edit in one transaction.
///
/// Featuring a poll unfeatures any other. Votes for deleted choices are dropped.
pub async fn update_poll(pool: &SqlitePool, id: i64, update: &PollUpdate) -> Result<()> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    if let Some(featured) = update.featured {
        if featured {
            sqlx::query("UPDATE forums_polls SET featured = 0 WHERE featured = 1 AND id != ?")
                .bind(id)
                .execute(&mut *tx)
                .await
                .context("Failed to unfeature existing poll")?;
        }
        sqlx::query("UPDATE forums_polls SET featured = ? WHERE id = ?")
            .bind(featured)
            .bind(id)
            .execute(&mut *tx)
            .await
            .context("Failed to update poll featured")?;
    }

    if let Some(closed) = update.closed {
        sqlx::query("UPDATE forums_polls SET closed = ? WHERE id = ?")
            .bind(closed)
            .bind(id)
            .execute(&mut *tx)
            .await
            .context("Failed to update poll closed")?;
    }

    for choice_id in &update.delete_choices {
        sqlx::query("DELETE FROM forums_polls_answers WHERE choice_id = ?")
            .bind(choice_id)
            .execute(&mut *tx)
            .await
            .context("Failed to delete poll answers")?;
        sqlx::query("DELETE FROM forums_polls_choices WHERE id = ? AND poll_id = ?")
            .bind(choice_id)
            .bind(id)
            .execute(&mut *tx)
            .await
            .context("Failed to delete poll choice")?;
    }

    for choice in &update.add_choices {
        sqlx::query("INSERT INTO forums_polls_choices (poll_id, choice) VALUES (?, ?)")
            .bind(id)
            .bind(choice)
            .execute(&mut *tx)
            .await
            .context("Failed to insert poll choice")?;
    }

    tx.commit().await.context("Failed to commit poll update")?;
    Ok(())
}

/// Get a poll's choices with their vote tallies.
pub async fn get_poll_choices(pool: &SqlitePool, poll_id: i64) -> Result<Vec<ForumPollChoice>> {
    sqlx::query_as(
        r"
        SELECT c.id, c.poll_id, c.choice, COUNT(a.user_id) AS answers
        FROM forums_polls_choices c
        LEFT JOIN forums_polls_answers a ON a.choice_id = c.id
        WHERE c.poll_id = ?
        GROUP BY c.id
        ORDER BY c.id ASC
        ",
    )
    .bind(poll_id)
    .fetch_all(pool)
    .await
    .context("Failed to fetch poll choices")
}

pub async fn get_poll_choice(pool: &SqlitePool, id: i64) -> Result<Option<ForumPollChoice>> {
    sqlx::query_as(
        r"
        SELECT c.id, c.poll_id, c.choice, COUNT(a.user_id) AS answers
        FROM forums_polls_choices c
        LEFT JOIN forums_polls_answers a ON a.choice_id = c.id
        WHERE c.id = ?
        GROUP BY c.id
        ",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("Failed to fetch poll choice")
}

pub async fn get_poll_answer(
    pool: &SqlitePool,
    poll_id: i64,
    user_id: i64,
) -> Result<Option<ForumPollAnswer>> {
    sqlx::query_as("SELECT * FROM forums_polls_answers WHERE poll_id = ? AND user_id = ?")
        .bind(poll_id)
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .context("Failed to fetch poll answer")
}

pub async fn insert_poll_answer(
    pool: &SqlitePool,
    poll_id: i64,
    user_id: i64,
    choice_id: i64,
) -> Result<()> {
    sqlx::query("INSERT INTO forums_polls_answers (poll_id, user_id, choice_id) VALUES (?, ?, ?)")
        .bind(poll_id)
        .bind(user_id)
        .bind(choice_id)
        .execute(pool)
        .await
        .context("Failed to insert poll answer")?;
    Ok(())
}
