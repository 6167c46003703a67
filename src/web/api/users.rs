use axum::extract::{Path, State};

use crate::auth::Viewer;
use crate::db;
use crate::users::{user_profile, CachedForumCounts, UserProfile};
use crate::web::{ok, ApiError, ApiResult, AppState};

pub async fn view_user(
    State(state): State<AppState>,
    _viewer: Viewer,
    Path(id): Path<i64>,
) -> ApiResult<UserProfile> {
    let pool = state.db.pool();
    let user = db::get_user_by_id(pool, id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("User {id} does not exist.")))?;

    let counts = CachedForumCounts::new(pool, &state.cache);
    ok(user_profile(&counts, user).await?)
}
