use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::{accessible_thread, require, thread_subscribers};
use crate::auth::Viewer;
use crate::cache::keys;
use crate::db::{self, ForumPost, NewPost};
use crate::notifications::{self, PostRef};
use crate::permissions::{ForumPermission, PermissionValidator};
use crate::web::validate::{self, MAX_MERGED_LENGTH, MAX_POST_LENGTH};
use crate::web::views::{self, PostView};
use crate::web::{ok, ApiError, ApiResult, AppState};

async fn load_post(state: &AppState, id: i64, include_dead: bool) -> Result<ForumPost, ApiError> {
    db::get_post(state.db.pool(), id, include_dead)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("ForumPost {id} does not exist.")))
}

pub async fn view_post(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(id): Path<i64>,
) -> ApiResult<PostView> {
    require(&viewer, ForumPermission::View)?;
    let post = load_post(&state, id, viewer.has(ForumPermission::ModifyPostAdvanced)).await?;

    let ctx = state.view(&viewer);
    accessible_thread(ctx, post.thread_id, true).await?;
    ok(views::post_view(ctx, post).await?)
}

#[derive(Debug, Deserialize)]
pub struct CreatePost {
    thread_id: i64,
    contents: String,
}

/// Create a post, or append to the viewer's previous post when it is the
/// newest one in the thread and double posting is not allowed.
pub async fn create_post(
    State(state): State<AppState>,
    viewer: Viewer,
    Json(body): Json<CreatePost>,
) -> ApiResult<PostView> {
    require(&viewer, ForumPermission::CreatePost)?;
    validate::non_empty("contents", &body.contents)?;
    validate::max_length("contents", &body.contents, MAX_POST_LENGTH)?;

    let ctx = state.view(&viewer);
    let thread = accessible_thread(ctx, body.thread_id, false).await?;
    if thread.locked && !viewer.has(ForumPermission::PostInLocked) {
        return Err(ApiError::bad_request("You cannot post in a locked thread."));
    }

    if let Some(last_post) = db::get_last_post(ctx.pool, thread.id).await? {
        if last_post.poster_id == viewer.id() && !viewer.has(ForumPermission::DoublePost) {
            let combined = last_post.contents.chars().count() + body.contents.chars().count();
            if combined > MAX_MERGED_LENGTH {
                return Err(ApiError::bad_request(
                    "Post could not be merged into previous post \
                     (must be <256,000 characters combined).",
                ));
            }
            let merged = format!("{}\n\n\n{}", last_post.contents, body.contents);
            debug!(post_id = last_post.id, "Merging double post into previous post");
            let post = apply_edit(&state, last_post, &merged, viewer.id()).await?;
            return ok(views::post_view(ctx, post).await?);
        }
    }

    let post_id = db::insert_post(
        ctx.pool,
        &NewPost {
            thread_id: thread.id,
            poster_id: viewer.id(),
            contents: body.contents,
        },
    )
    .await?;
    state.cache.delete_many([
        keys::thread_post_count(thread.id),
        keys::user_post_count(viewer.id()),
    ]);
    info!(post_id, thread_id = thread.id, poster_id = viewer.id(), "Post created");

    let post = load_post(&state, post_id, false).await?;
    let subscriber_ids = thread_subscribers(&state, thread.id).await?;
    notifications::process_new_post(PostRef::from(&post), &subscriber_ids, &state.db, &state.db)
        .await?;

    ok(views::post_view(ctx, post).await?)
}

/// Replace a post's contents, notifying users newly quoted or mentioned.
async fn apply_edit(
    state: &AppState,
    post: ForumPost,
    contents: &str,
    editor_id: i64,
) -> Result<ForumPost, ApiError> {
    db::edit_post_contents(state.db.pool(), &post, contents, editor_id).await?;
    let edited = load_post(state, post.id, true).await?;
    notifications::process_edited_post(
        PostRef::from(&edited),
        &post.contents,
        &state.db,
        &state.db,
    )
    .await?;
    Ok(edited)
}

#[derive(Debug, Deserialize)]
pub struct EditPost {
    contents: Option<String>,
    sticky: Option<bool>,
}

pub async fn edit_post(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(id): Path<i64>,
    Json(body): Json<EditPost>,
) -> ApiResult<PostView> {
    require(&viewer, ForumPermission::CreatePost)?;
    let mut post = load_post(&state, id, false).await?;
    let moderator = viewer.has(ForumPermission::ModifyPost);
    if post.poster_id != viewer.id() && !moderator {
        return Err(ApiError::Forbidden);
    }

    let ctx = state.view(&viewer);
    let thread = db::get_thread(ctx.pool, post.thread_id, false)
        .await?
        .ok_or_else(|| ApiError::bad_request(format!("ForumPost {id} does not exist.")))?;
    if !views::thread_accessible(ctx, &thread) {
        return Err(ApiError::Forbidden);
    }
    if thread.locked && !moderator {
        return Err(ApiError::bad_request(
            "You cannot modify posts in a locked thread.",
        ));
    }

    if let Some(contents) = body.contents {
        validate::non_empty("contents", &contents)?;
        validate::max_length("contents", &contents, MAX_POST_LENGTH)?;
        post = apply_edit(&state, post, &contents, viewer.id()).await?;
        info!(post_id = id, editor_id = viewer.id(), "Post edited");
    }

    if let (true, Some(sticky)) = (moderator, body.sticky) {
        db::set_post_sticky(ctx.pool, id, sticky).await?;
        post.sticky = sticky;
    }

    ok(views::post_view(ctx, post).await?)
}

pub async fn delete_post(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(id): Path<i64>,
) -> ApiResult<String> {
    require(&viewer, ForumPermission::ModifyPostAdvanced)?;
    let post = load_post(&state, id, false).await?;

    db::delete_post(state.db.pool(), id).await?;
    state.cache.delete_many([
        keys::thread_post_count(post.thread_id),
        keys::user_post_count(post.poster_id),
    ]);
    warn!(post_id = id, deleted_by = viewer.id(), "Post deleted");

    ok(format!("ForumPost {id} has been deleted."))
}
