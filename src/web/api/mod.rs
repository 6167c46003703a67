mod categories;
mod forums;
mod notifications;
mod polls;
mod posts;
mod subscriptions;
mod threads;
mod users;

use axum::routing::{get, post, put};
use axum::Router;

use super::views::{self, ViewContext};
use super::{ApiError, AppState};
use crate::auth::Viewer;
use crate::cache::keys;
use crate::db::{self, ForumThread};
use crate::permissions::{ForumPermission, PermissionValidator};

/// Create the router with all API routes.
pub fn router() -> Router<AppState> {
    Router::new()
        // Categories
        .route(
            "/forums/categories",
            get(categories::list_categories).post(categories::create_category),
        )
        .route(
            "/forums/categories/:id",
            put(categories::edit_category).delete(categories::delete_category),
        )
        // Forums
        .route("/forums", post(forums::create_forum))
        .route(
            "/forums/:id",
            get(forums::view_forum)
                .put(forums::edit_forum)
                .delete(forums::delete_forum),
        )
        // Threads
        .route("/forums/threads", post(threads::create_thread))
        .route(
            "/forums/threads/:id",
            get(threads::view_thread)
                .put(threads::edit_thread)
                .delete(threads::delete_thread),
        )
        .route("/forums/threads/:id/notes", post(threads::add_thread_note))
        // Posts
        .route("/forums/posts", post(posts::create_post))
        .route(
            "/forums/posts/:id",
            get(posts::view_post)
                .put(posts::edit_post)
                .delete(posts::delete_post),
        )
        // Polls
        .route("/forums/polls", post(polls::create_poll))
        .route("/forums/polls/:id", get(polls::view_poll).put(polls::edit_poll))
        .route("/forums/polls/choices/:id/vote", post(polls::vote_on_poll))
        // Subscriptions
        .route("/subscriptions/forums", get(subscriptions::view_forum_subscriptions))
        .route("/subscriptions/threads", get(subscriptions::view_thread_subscriptions))
        .route(
            "/subscriptions/forums/:id",
            post(subscriptions::subscribe_forum).delete(subscriptions::unsubscribe_forum),
        )
        .route(
            "/subscriptions/threads/:id",
            post(subscriptions::subscribe_thread).delete(subscriptions::unsubscribe_thread),
        )
        // Notifications
        .route("/notifications", get(notifications::list_notifications))
        .route("/notifications/counts", get(notifications::notification_counts))
        .route("/notifications/read", put(notifications::mark_read))
        // Users
        .route("/users/:id", get(users::view_user))
}

/// Fail with 403 unless the viewer holds `permission`.
fn require(viewer: &Viewer, permission: ForumPermission) -> Result<(), ApiError> {
    if viewer.has(permission) {
        Ok(())
    } else {
        Err(ApiError::Forbidden)
    }
}

/// Load a thread the viewer may see.
async fn accessible_thread(
    ctx: ViewContext<'_>,
    id: i64,
    include_dead: bool,
) -> Result<ForumThread, ApiError> {
    let thread = db::get_thread(ctx.pool, id, include_dead)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("ForumThread {id} does not exist.")))?;
    if !views::thread_accessible(ctx, &thread) {
        return Err(ApiError::Forbidden);
    }
    Ok(thread)
}

async fn thread_subscribers(state: &AppState, thread_id: i64) -> anyhow::Result<Vec<i64>> {
    let pool = state.db.pool();
    state
        .cache
        .get_or_load(&keys::thread_subscribers(thread_id), || {
            db::get_thread_subscriber_ids(pool, thread_id)
        })
        .await
}

async fn forum_subscribers(state: &AppState, forum_id: i64) -> anyhow::Result<Vec<i64>> {
    let pool = state.db.pool();
    state
        .cache
        .get_or_load(&keys::forum_subscribers(forum_id), || {
            db::get_forum_subscriber_ids(pool, forum_id)
        })
        .await
}
