use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use sqlx::SqlitePool;
use tracing::debug;

use crate::db as queries;
use crate::db::User;
use crate::permissions::{PermissionValidator, UserPermissions};
use crate::web::ApiError;

/// The authenticated user making a request, with their permissions loaded.
#[derive(Debug, Clone)]
pub struct Viewer {
    pub user: User,
    pub permissions: UserPermissions,
}

impl Viewer {
    #[must_use]
    pub const fn id(&self) -> i64 {
        self.user.id
    }
}

impl PermissionValidator for Viewer {
    fn has_permission(&self, permission: &str) -> bool {
        self.permissions.has_permission(permission)
    }

    fn is_ungranted(&self, permission: &str) -> bool {
        self.permissions.is_ungranted(permission)
    }

    fn has_any_of(&self, keys: &std::collections::HashSet<String>) -> bool {
        self.permissions.has_any_of(keys)
    }
}

/// Current viewer (if any).
/// Use this extractor when authentication is optional.
#[derive(Debug, Clone)]
pub struct MaybeViewer(pub Option<Viewer>);

#[async_trait]
impl<S> FromRequestParts<S> for MaybeViewer
where
    S: Send + Sync,
    SqlitePool: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let pool = SqlitePool::from_ref(state);

        let Some(token) = request_token(parts) else {
            return Ok(Self(None));
        };

        let Some(user) = queries::get_user_by_token(&pool, token).await? else {
            debug!("Unknown API token presented");
            return Ok(Self(None));
        };

        let permissions =
            UserPermissions::from_rows(queries::get_user_permissions(&pool, user.id).await?);

        if let Err(e) = queries::touch_api_token(&pool, token).await {
            debug!(user_id = user.id, "Failed to record API token use: {e:#}");
        }

        Ok(Self(Some(Viewer { user, permissions })))
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Viewer
where
    S: Send + Sync,
    SqlitePool: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let MaybeViewer(viewer) = MaybeViewer::from_request_parts(parts, state).await?;
        viewer.ok_or(ApiError::Unauthorized)
    }
}

/// Find the API token in the `Authorization` header or the `session` cookie.
fn request_token(parts: &Parts) -> Option<&str> {
    let bearer = parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty());

    bearer.or_else(|| {
        parts
            .headers
            .get(header::COOKIE)
            .and_then(|h| h.to_str().ok())
            .and_then(|cookies| {
                cookies
                    .split(';')
                    .find_map(|cookie| cookie.trim().strip_prefix("session="))
            })
            .filter(|token| !token.is_empty())
    })
}
