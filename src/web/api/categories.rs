use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use tracing::info;

use super::require;
use crate::auth::Viewer;
use crate::db::{self, CategoryUpdate, NewCategory};
use crate::permissions::{ForumPermission, PermissionValidator};
use crate::web::validate::{self, IncludeDeadQuery, MAX_DESCRIPTION_LENGTH, MAX_NAME_LENGTH};
use crate::web::views::{self, CategoryView};
use crate::web::{ok, ApiError, ApiResult, AppState};

pub async fn list_categories(
    State(state): State<AppState>,
    viewer: Viewer,
    Query(query): Query<IncludeDeadQuery>,
) -> ApiResult<Vec<CategoryView>> {
    require(&viewer, ForumPermission::View)?;
    let include_dead = query.include_dead && viewer.has(ForumPermission::ModifyForums);
    let ctx = state.view(&viewer);

    let mut categories = Vec::new();
    for category in db::get_categories(ctx.pool, include_dead).await? {
        categories.push(views::category_view(ctx, category, include_dead).await?);
    }
    ok(categories)
}

#[derive(Debug, Deserialize)]
pub struct CreateCategory {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    position: i64,
}

pub async fn create_category(
    State(state): State<AppState>,
    viewer: Viewer,
    Json(body): Json<CreateCategory>,
) -> ApiResult<CategoryView> {
    require(&viewer, ForumPermission::ModifyForums)?;
    validate::non_empty("name", &body.name)?;
    validate::max_length("name", &body.name, MAX_NAME_LENGTH)?;
    if let Some(description) = &body.description {
        validate::max_length("description", description, MAX_DESCRIPTION_LENGTH)?;
    }
    let position = validate::position(body.position)?;

    let ctx = state.view(&viewer);
    let id = db::insert_category(
        ctx.pool,
        &NewCategory {
            name: body.name,
            description: body.description,
            position,
        },
    )
    .await?;
    info!(category_id = id, "Forum category created");

    let category = db::get_category(ctx.pool, id, true)
        .await?
        .ok_or_else(|| anyhow::anyhow!("category {id} vanished after insert"))?;
    ok(views::category_view(ctx, category, false).await?)
}

#[derive(Debug, Deserialize)]
pub struct EditCategory {
    name: Option<String>,
    description: Option<String>,
    position: Option<i64>,
}

pub async fn edit_category(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(id): Path<i64>,
    Json(body): Json<EditCategory>,
) -> ApiResult<CategoryView> {
    require(&viewer, ForumPermission::ModifyForums)?;
    let ctx = state.view(&viewer);
    if db::get_category(ctx.pool, id, false).await?.is_none() {
        return Err(ApiError::not_found(format!("ForumCategory {id} does not exist.")));
    }

    // Empty strings leave the field unchanged.
    let name = body.name.filter(|n| !n.is_empty());
    let description = body.description.filter(|d| !d.is_empty());
    if let Some(name) = &name {
        validate::max_length("name", name, MAX_NAME_LENGTH)?;
    }
    if let Some(description) = &description {
        validate::max_length("description", description, MAX_DESCRIPTION_LENGTH)?;
    }
    let position = body.position.map(validate::position).transpose()?;

    db::update_category(
        ctx.pool,
        id,
        &CategoryUpdate {
            name,
            description,
            position,
        },
    )
    .await?;

    let category = db::get_category(ctx.pool, id, true)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("ForumCategory {id} does not exist.")))?;
    ok(views::category_view(ctx, category, false).await?)
}

pub async fn delete_category(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(id): Path<i64>,
) -> ApiResult<String> {
    require(&viewer, ForumPermission::ModifyForums)?;
    let pool = state.db.pool();
    let category = db::get_category(pool, id, false)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("ForumCategory {id} does not exist.")))?;

    if db::count_forums_in_category(pool, id).await? > 0 {
        return Err(ApiError::bad_request(
            "You cannot delete a forum category while it still has forums assigned to it.",
        ));
    }

    db::delete_category(pool, id).await?;
    info!(category_id = id, "Forum category deleted");
    ok(format!("ForumCategory {id} ({}) has been deleted.", category.name))
}
