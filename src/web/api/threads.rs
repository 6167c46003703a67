use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use tracing::{info, warn};

use super::{accessible_thread, forum_subscribers, require};
use crate::auth::Viewer;
use crate::cache::keys;
use crate::db::{self, NewThread, Page, ThreadUpdate};
use crate::notifications::{self, PostRef};
use crate::permissions::{ForumPermission, PermissionValidator};
use crate::web::validate::{self, PageQuery, MAX_NOTE_LENGTH, MAX_POST_LENGTH, MAX_TOPIC_LENGTH};
use crate::web::views::{self, NoteView, ThreadView};
use crate::web::{ok, ApiError, ApiResult, AppState};

pub async fn view_thread(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(id): Path<i64>,
    Query(query): Query<PageQuery>,
) -> ApiResult<ThreadView> {
    require(&viewer, ForumPermission::View)?;
    let page = query.to_page(viewer.has(ForumPermission::ModifyPostAdvanced))?;
    let ctx = state.view(&viewer);

    let include_dead = viewer.has(ForumPermission::ModifyThreadAdvanced);
    let thread = accessible_thread(ctx, id, include_dead).await?;
    let view = views::thread_view(ctx, thread, Some(&page)).await?;

    let newest_seen = view
        .posts
        .iter()
        .flatten()
        .filter(|post| post.deleted != Some(true))
        .map(|post| post.id)
        .max();
    if let Some(post_id) = newest_seen {
        db::set_last_viewed_post(ctx.pool, viewer.id(), id, post_id).await?;
    }

    ok(view)
}

#[derive(Debug, Deserialize)]
pub struct CreateThread {
    topic: String,
    forum_id: i64,
    contents: String,
}

pub async fn create_thread(
    State(state): State<AppState>,
    viewer: Viewer,
    Json(body): Json<CreateThread>,
) -> ApiResult<ThreadView> {
    require(&viewer, ForumPermission::CreateThread)?;
    validate::non_empty("topic", &body.topic)?;
    validate::max_length("topic", &body.topic, MAX_TOPIC_LENGTH)?;
    validate::non_empty("contents", &body.contents)?;
    validate::max_length("contents", &body.contents, MAX_POST_LENGTH)?;

    let ctx = state.view(&viewer);
    let forum = db::get_forum(ctx.pool, body.forum_id, false)
        .await?
        .ok_or_else(|| ApiError::bad_request(format!("Invalid Forum id {}.", body.forum_id)))?;
    if !views::forum_accessible(ctx, forum.id).await? {
        return Err(ApiError::Forbidden);
    }

    let (thread_id, post_id) = db::create_thread(
        ctx.pool,
        &NewThread {
            topic: body.topic,
            forum_id: forum.id,
            poster_id: viewer.id(),
            contents: body.contents,
        },
    )
    .await?;

    // Forum subscribers follow every new thread in the forum.
    let subscriber_ids = forum_subscribers(&state, forum.id).await?;
    db::subscribe_users_to_thread(ctx.pool, &subscriber_ids, thread_id).await?;

    state.cache.delete_many([
        keys::forum_thread_count(forum.id),
        keys::user_thread_count(viewer.id()),
        keys::user_post_count(viewer.id()),
        keys::thread_subscribers(thread_id),
    ]);
    info!(thread_id, forum_id = forum.id, poster_id = viewer.id(), "Thread created");

    let post = db::get_post(ctx.pool, post_id, false)
        .await?
        .ok_or_else(|| anyhow::anyhow!("post {post_id} vanished after insert"))?;
    notifications::process_new_post(PostRef::from(&post), &subscriber_ids, &state.db, &state.db)
        .await?;

    let thread = accessible_thread(ctx, thread_id, true).await?;
    ok(views::thread_view(ctx, thread, Some(&Page::default())).await?)
}

#[derive(Debug, Deserialize)]
pub struct EditThread {
    topic: Option<String>,
    forum_id: Option<i64>,
    locked: Option<bool>,
    sticky: Option<bool>,
}

pub async fn edit_thread(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(id): Path<i64>,
    Json(body): Json<EditThread>,
) -> ApiResult<ThreadView> {
    require(&viewer, ForumPermission::ModifyThread)?;
    let ctx = state.view(&viewer);
    let thread = accessible_thread(ctx, id, false).await?;

    let topic = body.topic.filter(|t| !t.is_empty());
    if let Some(topic) = &topic {
        validate::max_length("topic", topic, MAX_TOPIC_LENGTH)?;
    }
    if let Some(forum_id) = body.forum_id {
        if db::get_forum(ctx.pool, forum_id, false).await?.is_none() {
            return Err(ApiError::bad_request(format!("Invalid Forum id {forum_id}.")));
        }
    }

    db::update_thread(
        ctx.pool,
        id,
        &ThreadUpdate {
            topic,
            forum_id: body.forum_id,
            locked: body.locked,
            sticky: body.sticky,
        },
    )
    .await?;

    if let Some(forum_id) = body.forum_id.filter(|&f| f != thread.forum_id) {
        state.cache.delete_many([
            keys::forum_thread_count(thread.forum_id),
            keys::forum_thread_count(forum_id),
        ]);
        info!(thread_id = id, from = thread.forum_id, to = forum_id, "Thread moved");
    }

    let thread = accessible_thread(ctx, id, true).await?;
    ok(views::thread_view(ctx, thread, None).await?)
}

pub async fn delete_thread(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(id): Path<i64>,
) -> ApiResult<String> {
    require(&viewer, ForumPermission::ModifyThreadAdvanced)?;
    let pool = state.db.pool();
    let thread = db::get_thread(pool, id, false)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("ForumThread {id} does not exist.")))?;

    let posters = db::get_thread_poster_ids(pool, id).await?;
    db::delete_thread(pool, id).await?;
    state.cache.delete_many(
        posters
            .iter()
            .map(|&poster_id| keys::user_post_count(poster_id))
            .chain([
                keys::forum_thread_count(thread.forum_id),
                keys::thread_post_count(id),
                keys::user_thread_count(thread.poster_id),
            ]),
    );
    warn!(thread_id = id, deleted_by = viewer.id(), "Thread deleted");

    ok(format!("ForumThread {id} ({}) has been deleted.", thread.topic))
}

#[derive(Debug, Deserialize)]
pub struct AddThreadNote {
    note: String,
}

pub async fn add_thread_note(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(id): Path<i64>,
    Json(body): Json<AddThreadNote>,
) -> ApiResult<NoteView> {
    require(&viewer, ForumPermission::ModifyThread)?;
    validate::non_empty("note", &body.note)?;
    validate::max_length("note", &body.note, MAX_NOTE_LENGTH)?;

    let pool = state.db.pool();
    if db::get_thread(pool, id, false).await?.is_none() {
        return Err(ApiError::bad_request(format!("Invalid ForumThread id {id}.")));
    }

    let note_id = db::insert_thread_note(pool, id, viewer.id(), &body.note).await?;
    let note = db::get_thread_note(pool, note_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("thread note {note_id} vanished after insert"))?;
    ok(views::note_view(state.view(&viewer), note).await?)
}
