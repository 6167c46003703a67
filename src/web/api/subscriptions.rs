use axum::extract::{Path, Query, State};
use serde::Deserialize;
use tracing::info;

use super::{accessible_thread, require};
use crate::auth::Viewer;
use crate::cache::keys;
use crate::db;
use crate::permissions::ForumPermission;
use crate::web::validate;
use crate::web::views::{self, ForumView, ThreadView, ViewContext};
use crate::web::{ok, ApiError, ApiResult, AppState};

async fn accessible_forum(ctx: ViewContext<'_>, id: i64) -> Result<(), ApiError> {
    if db::get_forum(ctx.pool, id, false).await?.is_none() {
        return Err(ApiError::not_found(format!("Forum {id} does not exist.")));
    }
    if !views::forum_accessible(ctx, id).await? {
        return Err(ApiError::Forbidden);
    }
    Ok(())
}

pub async fn subscribe_thread(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(id): Path<i64>,
) -> ApiResult<String> {
    require(&viewer, ForumPermission::ModifySubscriptions)?;
    let ctx = state.view(&viewer);
    accessible_thread(ctx, id, false).await?;

    if db::thread_subscription_exists(ctx.pool, viewer.id(), id).await? {
        return Err(ApiError::bad_request(format!(
            "You are already subscribed to thread {id}."
        )));
    }
    db::subscribe_users_to_thread(ctx.pool, &[viewer.id()], id).await?;
    state.cache.delete(&keys::thread_subscribers(id));
    info!(thread_id = id, user_id = viewer.id(), "Subscribed to thread");

    ok(format!("Successfully subscribed to thread {id}."))
}

pub async fn unsubscribe_thread(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(id): Path<i64>,
) -> ApiResult<String> {
    require(&viewer, ForumPermission::ModifySubscriptions)?;
    let ctx = state.view(&viewer);
    accessible_thread(ctx, id, false).await?;

    if !db::thread_subscription_exists(ctx.pool, viewer.id(), id).await? {
        return Err(ApiError::bad_request(format!(
            "You are not subscribed to thread {id}."
        )));
    }
    db::delete_thread_subscription(ctx.pool, viewer.id(), id).await?;
    state.cache.delete(&keys::thread_subscribers(id));
    info!(thread_id = id, user_id = viewer.id(), "Unsubscribed from thread");

    ok(format!("Successfully unsubscribed from thread {id}."))
}

pub async fn subscribe_forum(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(id): Path<i64>,
) -> ApiResult<String> {
    require(&viewer, ForumPermission::ModifySubscriptions)?;
    let ctx = state.view(&viewer);
    accessible_forum(ctx, id).await?;

    if db::forum_subscription_exists(ctx.pool, viewer.id(), id).await? {
        return Err(ApiError::bad_request(format!(
            "You are already subscribed to forum {id}."
        )));
    }
    db::insert_forum_subscription(ctx.pool, viewer.id(), id).await?;
    state.cache.delete(&keys::forum_subscribers(id));
    info!(forum_id = id, user_id = viewer.id(), "Subscribed to forum");

    ok(format!("Successfully subscribed to forum {id}."))
}

pub async fn unsubscribe_forum(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(id): Path<i64>,
) -> ApiResult<String> {
    require(&viewer, ForumPermission::ModifySubscriptions)?;
    let ctx = state.view(&viewer);
    accessible_forum(ctx, id).await?;

    if !db::forum_subscription_exists(ctx.pool, viewer.id(), id).await? {
        return Err(ApiError::bad_request(format!(
            "You are not subscribed to forum {id}."
        )));
    }
    db::delete_forum_subscription(ctx.pool, viewer.id(), id).await?;
    state.cache.delete(&keys::forum_subscribers(id));
    info!(forum_id = id, user_id = viewer.id(), "Unsubscribed from forum");

    ok(format!("Successfully unsubscribed from forum {id}."))
}

pub async fn view_forum_subscriptions(
    State(state): State<AppState>,
    viewer: Viewer,
) -> ApiResult<Vec<ForumView>> {
    require(&viewer, ForumPermission::ViewSubscriptions)?;
    let ctx = state.view(&viewer);

    let mut forums = Vec::new();
    for forum in db::get_subscribed_forums(ctx.pool, viewer.id()).await? {
        if views::forum_accessible(ctx, forum.id).await? {
            forums.push(views::forum_view(ctx, forum, None).await?);
        }
    }
    ok(forums)
}

#[derive(Debug, Deserialize)]
pub struct ThreadSubscriptionsQuery {
    /// Only threads with posts the viewer has not seen.
    #[serde(default, deserialize_with = "validate::lenient_bool")]
    unread: bool,
}

pub async fn view_thread_subscriptions(
    State(state): State<AppState>,
    viewer: Viewer,
    Query(query): Query<ThreadSubscriptionsQuery>,
) -> ApiResult<Vec<ThreadView>> {
    require(&viewer, ForumPermission::ViewSubscriptions)?;
    let ctx = state.view(&viewer);

    let subscribed = if query.unread {
        db::get_unread_subscribed_threads(ctx.pool, viewer.id()).await?
    } else {
        db::get_subscribed_threads(ctx.pool, viewer.id()).await?
    };

    let mut threads = Vec::new();
    for thread in subscribed {
        if views::thread_accessible(ctx, &thread) {
            threads.push(views::thread_view(ctx, thread, None).await?);
        }
    }
    ok(threads)
}
