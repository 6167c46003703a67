use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use sqlx::SqlitePool;
use tracing::info;

use super::require;
use crate::auth::Viewer;
use crate::cache::keys;
use crate::db::{self, Forum, ForumUpdate, NewForum};
use crate::permissions::{ForumPermission, PermissionValidator};
use crate::web::validate::{self, PageQuery, MAX_DESCRIPTION_LENGTH, MAX_NAME_LENGTH};
use crate::web::views::{self, ForumView};
use crate::web::{ok, ApiError, ApiResult, AppState};

async fn load_forum(pool: &SqlitePool, id: i64, include_dead: bool) -> Result<Forum, ApiError> {
    db::get_forum(pool, id, include_dead)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Forum {id} does not exist.")))
}

async fn check_category(pool: &SqlitePool, category_id: i64) -> Result<(), ApiError> {
    if db::get_category(pool, category_id, false).await?.is_none() {
        return Err(ApiError::bad_request(format!(
            "Invalid ForumCategory id {category_id}."
        )));
    }
    Ok(())
}

pub async fn view_forum(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(id): Path<i64>,
    Query(query): Query<PageQuery>,
) -> ApiResult<ForumView> {
    require(&viewer, ForumPermission::View)?;
    let page = query.to_page(viewer.has(ForumPermission::ModifyThreadAdvanced))?;
    let ctx = state.view(&viewer);

    let forum = load_forum(ctx.pool, id, viewer.has(ForumPermission::ModifyForums)).await?;
    if !views::forum_accessible(ctx, forum.id).await? {
        return Err(ApiError::Forbidden);
    }
    ok(views::forum_view(ctx, forum, Some(&page)).await?)
}

#[derive(Debug, Deserialize)]
pub struct CreateForum {
    name: String,
    category_id: i64,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    position: i64,
}

pub async fn create_forum(
    State(state): State<AppState>,
    viewer: Viewer,
    Json(body): Json<CreateForum>,
) -> ApiResult<ForumView> {
    require(&viewer, ForumPermission::ModifyForums)?;
    validate::non_empty("name", &body.name)?;
    validate::max_length("name", &body.name, MAX_NAME_LENGTH)?;
    if let Some(description) = &body.description {
        validate::max_length("description", description, MAX_DESCRIPTION_LENGTH)?;
    }
    let position = validate::position(body.position)?;

    let ctx = state.view(&viewer);
    check_category(ctx.pool, body.category_id).await?;

    let id = db::insert_forum(
        ctx.pool,
        &NewForum {
            name: body.name,
            description: body.description,
            category_id: body.category_id,
            position,
        },
    )
    .await?;
    info!(forum_id = id, category_id = body.category_id, "Forum created");

    let forum = load_forum(ctx.pool, id, true).await?;
    ok(views::forum_view(ctx, forum, None).await?)
}

#[derive(Debug, Deserialize)]
pub struct EditForum {
    name: Option<String>,
    category_id: Option<i64>,
    #[serde(default, deserialize_with = "validate::double_option")]
    description: Option<Option<String>>,
    position: Option<i64>,
}

pub async fn edit_forum(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(id): Path<i64>,
    Json(body): Json<EditForum>,
) -> ApiResult<ForumView> {
    require(&viewer, ForumPermission::ModifyForums)?;
    let ctx = state.view(&viewer);
    load_forum(ctx.pool, id, false).await?;

    let name = body.name.filter(|n| !n.is_empty());
    if let Some(name) = &name {
        validate::max_length("name", name, MAX_NAME_LENGTH)?;
    }
    if let Some(Some(description)) = &body.description {
        validate::max_length("description", description, MAX_DESCRIPTION_LENGTH)?;
    }
    let position = body.position.map(validate::position).transpose()?;
    if let Some(category_id) = body.category_id {
        check_category(ctx.pool, category_id).await?;
    }

    db::update_forum(
        ctx.pool,
        id,
        &ForumUpdate {
            name,
            description: body.description,
            category_id: body.category_id,
            position,
        },
    )
    .await?;

    let forum = load_forum(ctx.pool, id, true).await?;
    ok(views::forum_view(ctx, forum, None).await?)
}

pub async fn delete_forum(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(id): Path<i64>,
) -> ApiResult<String> {
    require(&viewer, ForumPermission::ModifyForums)?;
    let pool = state.db.pool();
    let forum = load_forum(pool, id, false).await?;

    let threads = db::get_forum_thread_posters(pool, id).await?;
    db::delete_forum(pool, id).await?;
    state.cache.delete_many(
        threads
            .iter()
            .flat_map(|&(thread_id, poster_id)| {
                [
                    keys::thread_post_count(thread_id),
                    keys::user_thread_count(poster_id),
                ]
            })
            .chain([keys::forum_thread_count(id)]),
    );
    info!(forum_id = id, "Forum deleted");

    ok(format!("Forum {id} ({}) has been deleted.", forum.name))
}
