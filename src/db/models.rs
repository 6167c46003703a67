use serde::{Deserialize, Serialize};

/// A forum user. Accounts are provisioned outside this service; the forum
/// only reads them for attribution and mention resolution.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub created_at: String,
}

/// A permission row. `granted = false` marks an explicit revocation, used
/// to hide single threads from users who can otherwise see the whole forum.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserPermission {
    pub user_id: i64,
    pub permission: String,
    pub granted: bool,
}

/// A stored notification. `contents` is a JSON document.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Notification {
    pub id: i64,
    pub user_id: i64,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub kind: String,
    pub contents: String,
    pub read: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ForumCategory {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub position: i64,
    pub deleted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Forum {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub category_id: i64,
    pub position: i64,
    pub deleted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ForumThread {
    pub id: i64,
    pub topic: String,
    pub forum_id: i64,
    pub poster_id: i64,
    pub created_time: String,
    pub locked: bool,
    pub sticky: bool,
    pub deleted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ForumPost {
    pub id: i64,
    pub thread_id: i64,
    pub poster_id: i64,
    pub contents: String,
    pub time: String,
    pub sticky: bool,
    pub edited_user_id: Option<i64>,
    pub edited_time: Option<String>,
    pub deleted: bool,
}

/// A previous revision of a post, saved whenever its contents change.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ForumPostEditHistory {
    pub id: i64,
    pub post_id: i64,
    pub editor_id: Option<i64>,
    pub contents: String,
    pub time: String,
}

/// Staff note attached to a thread.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ForumThreadNote {
    pub id: i64,
    pub thread_id: i64,
    pub user_id: i64,
    pub note: String,
    pub time: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ForumPoll {
    pub id: i64,
    pub thread_id: i64,
    pub question: String,
    pub closed: bool,
    pub featured: bool,
}

/// A poll choice with its vote tally.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ForumPollChoice {
    pub id: i64,
    pub poll_id: i64,
    pub choice: String,
    pub answers: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ForumPollAnswer {
    pub poll_id: i64,
    pub user_id: i64,
    pub choice_id: i64,
}

/// Data for inserting a new category.
#[derive(Debug, Clone)]
pub struct NewCategory {
    pub name: String,
    pub description: Option<String>,
    pub position: i64,
}

/// Data for inserting a new forum.
#[derive(Debug, Clone)]
pub struct NewForum {
    pub name: String,
    pub description: Option<String>,
    pub category_id: i64,
    pub position: i64,
}

/// Data for inserting a new thread together with its opening post.
#[derive(Debug, Clone)]
pub struct NewThread {
    pub topic: String,
    pub forum_id: i64,
    pub poster_id: i64,
    pub contents: String,
}

/// Data for inserting a new post.
#[derive(Debug, Clone)]
pub struct NewPost {
    pub thread_id: i64,
    pub poster_id: i64,
    pub contents: String,
}

/// Partial update for a category. `None` leaves the column alone.
#[derive(Debug, Clone, Default)]
pub struct CategoryUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub position: Option<i64>,
}

/// Partial update for a forum. `description: Some(None)` clears it.
#[derive(Debug, Clone, Default)]
pub struct ForumUpdate {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub category_id: Option<i64>,
    pub position: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct ThreadUpdate {
    pub topic: Option<String>,
    pub forum_id: Option<i64>,
    pub locked: Option<bool>,
    pub sticky: Option<bool>,
}

/// Changes applied to a poll by [`update_poll`](super::update_poll).
#[derive(Debug, Clone, Default)]
pub struct PollUpdate {
    pub featured: Option<bool>,
    pub closed: Option<bool>,
    pub add_choices: Vec<String>,
    pub delete_choices: Vec<i64>,
}

/// Ordering and visibility for paginated listings.
#[derive(Debug, Clone, Copy)]
pub struct Page {
    pub page: i64,
    pub limit: i64,
    pub include_dead: bool,
}

impl Page {
    #[must_use]
    pub fn offset(&self) -> i64 {
        (self.page.max(1) - 1) * self.limit
    }
}

impl Default for Page {
    fn default() -> Self {
        Self {
            page: 1,
            limit: 50,
            include_dead: false,
        }
    }
}
