use std::collections::BTreeMap;

use axum::extract::{Query, State};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::auth::Viewer;
use crate::db::{self, Notification};
use crate::web::validate::lenient_bool;
use crate::web::{ok, ApiResult, AppState};

#[derive(Debug, Serialize)]
pub struct NotificationView {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: String,
    pub contents: serde_json::Value,
    pub read: bool,
    pub time: String,
}

impl From<Notification> for NotificationView {
    fn from(n: Notification) -> Self {
        // Rows written by other producers may not hold JSON; pass them through as text.
        let contents = serde_json::from_str(&n.contents)
            .unwrap_or_else(|_| serde_json::Value::String(n.contents.clone()));
        Self {
            id: n.id,
            kind: n.kind,
            contents,
            read: n.read,
            time: n.created_at,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct NotificationQuery {
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(default, deserialize_with = "lenient_bool")]
    include_read: bool,
}

pub async fn list_notifications(
    State(state): State<AppState>,
    viewer: Viewer,
    Query(query): Query<NotificationQuery>,
) -> ApiResult<Vec<NotificationView>> {
    let notifications = db::get_notifications(
        state.db.pool(),
        viewer.id(),
        query.kind.as_deref(),
        query.include_read,
    )
    .await?;
    ok(notifications.into_iter().map(NotificationView::from).collect())
}

pub async fn notification_counts(
    State(state): State<AppState>,
    viewer: Viewer,
) -> ApiResult<BTreeMap<String, i64>> {
    let counts = db::count_unread_notifications(state.db.pool(), viewer.id()).await?;
    ok(counts.into_iter().collect())
}

#[derive(Debug, Default, Deserialize)]
pub struct MarkReadQuery {
    #[serde(rename = "type")]
    kind: Option<String>,
}

pub async fn mark_read(
    State(state): State<AppState>,
    viewer: Viewer,
    Query(query): Query<MarkReadQuery>,
) -> ApiResult<String> {
    let changed =
        db::mark_notifications_read(state.db.pool(), viewer.id(), query.kind.as_deref()).await?;
    debug!(user_id = viewer.id(), changed, "Notifications marked read");
    ok(format!("{changed} notifications marked as read."))
}
