//! JSON views of forum entities.
//!
//! Fields that reveal moderation state (deleted flags, staff notes, edit
//! history) are only filled in when the viewer holds the matching
//! permission, and are omitted from the output otherwise.

use anyhow::Result;
use serde::Serialize;
use sqlx::SqlitePool;

use crate::auth::Viewer;
use crate::cache::{keys, Cache};
use crate::db::{
    self, Forum, ForumCategory, ForumPoll, ForumPost, ForumPostEditHistory, ForumThread,
    ForumThreadNote, Page,
};
use crate::permissions::{can_access_forum, can_access_thread, ForumPermission, PermissionValidator};

/// Everything a view builder needs.
#[derive(Clone, Copy)]
pub struct ViewContext<'a> {
    pub pool: &'a SqlitePool,
    pub cache: &'a Cache,
    pub viewer: &'a Viewer,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserRef {
    pub id: i64,
    pub username: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct IdRef {
    pub id: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryRef {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ThreadRef {
    pub id: i64,
    pub topic: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryView {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub position: i64,
    pub forums: Vec<ForumView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ForumView {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub category: Option<CategoryRef>,
    pub position: i64,
    pub thread_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threads: Option<Vec<ThreadView>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted: Option<bool>,
    pub last_updated_thread: Option<ThreadView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ThreadView {
    pub id: i64,
    pub topic: String,
    pub forum: IdRef,
    pub poster: Option<UserRef>,
    pub locked: bool,
    pub sticky: bool,
    pub created_time: String,
    pub poll: Option<PollView>,
    pub last_post: Option<PostView>,
    pub last_viewed_post: Option<PostView>,
    pub subscribed: bool,
    pub post_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub posts: Option<Vec<PostView>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_notes: Option<Vec<NoteView>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PostView {
    pub id: i64,
    pub thread: Option<ThreadRef>,
    pub poster: Option<UserRef>,
    pub contents: String,
    pub time: String,
    pub edited_time: Option<String>,
    pub sticky: bool,
    pub editor: Option<UserRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edit_history: Option<Vec<EditView>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EditView {
    pub id: i64,
    pub editor: Option<UserRef>,
    pub contents: String,
    pub time: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct NoteView {
    pub id: i64,
    pub note: String,
    pub user: Option<UserRef>,
    pub time: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PollView {
    pub id: i64,
    pub thread: Option<ThreadRef>,
    pub question: String,
    pub closed: bool,
    pub featured: bool,
    pub choices: Vec<ChoiceView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChoiceView {
    pub id: i64,
    pub choice: String,
    pub answers: i64,
}

/// `Some(value)` when the viewer holds `permission`.
fn gated<T>(ctx: ViewContext<'_>, permission: ForumPermission, value: T) -> Option<T> {
    ctx.viewer.has(permission).then_some(value)
}

pub async fn user_ref(pool: &SqlitePool, user_id: i64) -> Result<Option<UserRef>> {
    Ok(db::get_user_by_id(pool, user_id).await?.map(|u| UserRef {
        id: u.id,
        username: u.username,
    }))
}

async fn thread_ref(pool: &SqlitePool, thread_id: i64) -> Result<Option<ThreadRef>> {
    Ok(db::get_thread(pool, thread_id, true).await?.map(|t| ThreadRef {
        id: t.id,
        topic: t.topic,
    }))
}

pub async fn forum_thread_count(ctx: ViewContext<'_>, forum_id: i64) -> Result<i64> {
    ctx.cache
        .get_or_load(&keys::forum_thread_count(forum_id), || {
            db::count_threads_in_forum(ctx.pool, forum_id)
        })
        .await
}

pub async fn thread_post_count(ctx: ViewContext<'_>, thread_id: i64) -> Result<i64> {
    ctx.cache
        .get_or_load(&keys::thread_post_count(thread_id), || {
            db::count_posts_in_thread(ctx.pool, thread_id)
        })
        .await
}

/// Whether the viewer may see a forum.
pub async fn forum_accessible(ctx: ViewContext<'_>, forum_id: i64) -> Result<bool> {
    let thread_ids = db::get_thread_ids_in_forum(ctx.pool, forum_id).await?;
    Ok(can_access_forum(
        ctx.viewer,
        forum_id,
        &thread_ids,
        Some(ForumPermission::ModifyForums),
    ))
}

/// Whether the viewer may see a thread.
#[must_use]
pub fn thread_accessible(ctx: ViewContext<'_>, thread: &ForumThread) -> bool {
    can_access_thread(
        ctx.viewer,
        thread.id,
        thread.forum_id,
        Some(ForumPermission::ModifyThreadAdvanced),
    )
}

// ========== Categories ==========

/// Render a category with the forums the viewer can access.
pub async fn category_view(
    ctx: ViewContext<'_>,
    category: ForumCategory,
    include_dead: bool,
) -> Result<CategoryView> {
    let mut forums = Vec::new();
    for forum in db::get_forums_in_category(ctx.pool, category.id, include_dead).await? {
        if forum_accessible(ctx, forum.id).await? {
            forums.push(forum_view(ctx, forum, None).await?);
        }
    }

    Ok(CategoryView {
        id: category.id,
        name: category.name,
        description: category.description,
        position: category.position,
        forums,
        deleted: gated(ctx, ForumPermission::ModifyForums, category.deleted),
    })
}

// ========== Forums ==========

/// Render a forum. `threads` is the page to embed, if any.
pub async fn forum_view(
    ctx: ViewContext<'_>,
    forum: Forum,
    threads: Option<&Page>,
) -> Result<ForumView> {
    let category = db::get_category(ctx.pool, forum.category_id, true)
        .await?
        .map(|c| CategoryRef {
            id: c.id,
            name: c.name,
        });

    let last_updated_thread = match db::get_last_updated_thread(ctx.pool, forum.id).await? {
        Some(thread) if thread_accessible(ctx, &thread) => {
            Some(thread_view(ctx, thread, None).await?)
        }
        _ => None,
    };

    let threads = match threads {
        Some(page) => {
            let mut views = Vec::new();
            for thread in db::get_threads_in_forum(ctx.pool, forum.id, page).await? {
                if thread_accessible(ctx, &thread) {
                    views.push(thread_view(ctx, thread, None).await?);
                }
            }
            Some(views)
        }
        None => None,
    };

    Ok(ForumView {
        thread_count: forum_thread_count(ctx, forum.id).await?,
        id: forum.id,
        name: forum.name,
        description: forum.description,
        category,
        position: forum.position,
        threads,
        deleted: gated(ctx, ForumPermission::ModifyForums, forum.deleted),
        last_updated_thread,
    })
}

// ========== Threads ==========

/// Render a thread. `posts` is the page to embed, if any.
pub async fn thread_view(
    ctx: ViewContext<'_>,
    thread: ForumThread,
    posts: Option<&Page>,
) -> Result<ThreadView> {
    let poll = match db::get_poll_by_thread(ctx.pool, thread.id).await? {
        Some(poll) => Some(poll_view(ctx, poll).await?),
        None => None,
    };

    let last_post = match db::get_last_post(ctx.pool, thread.id).await? {
        Some(post) => Some(post_view(ctx, post).await?),
        None => None,
    };

    let last_viewed_post =
        match db::get_last_viewed_post(ctx.pool, ctx.viewer.id(), thread.id).await? {
            Some(post) => Some(post_view(ctx, post).await?),
            None => None,
        };

    let posts = match posts {
        Some(page) => {
            let mut views = Vec::new();
            for post in db::get_posts_in_thread(ctx.pool, thread.id, page).await? {
                views.push(post_view(ctx, post).await?);
            }
            Some(views)
        }
        None => None,
    };

    let thread_notes = if ctx.viewer.has(ForumPermission::ModifyThread) {
        let mut notes = Vec::new();
        for note in db::get_thread_notes(ctx.pool, thread.id).await? {
            notes.push(note_view(ctx, note).await?);
        }
        Some(notes)
    } else {
        None
    };

    Ok(ThreadView {
        poster: user_ref(ctx.pool, thread.poster_id).await?,
        subscribed: db::thread_subscription_exists(ctx.pool, ctx.viewer.id(), thread.id).await?,
        post_count: thread_post_count(ctx, thread.id).await?,
        id: thread.id,
        topic: thread.topic,
        forum: IdRef {
            id: thread.forum_id,
        },
        locked: thread.locked,
        sticky: thread.sticky,
        created_time: thread.created_time,
        poll,
        last_post,
        last_viewed_post,
        posts,
        thread_notes,
        deleted: gated(ctx, ForumPermission::ModifyThreadAdvanced, thread.deleted),
    })
}

pub async fn note_view(ctx: ViewContext<'_>, note: ForumThreadNote) -> Result<NoteView> {
    Ok(NoteView {
        user: user_ref(ctx.pool, note.user_id).await?,
        id: note.id,
        note: note.note,
        time: note.time,
    })
}

// ========== Posts ==========

pub async fn post_view(ctx: ViewContext<'_>, post: ForumPost) -> Result<PostView> {
    let editor = match post.edited_user_id {
        Some(id) => user_ref(ctx.pool, id).await?,
        None => None,
    };

    let edit_history = if ctx.viewer.has(ForumPermission::ModifyPostAdvanced) {
        let mut history = Vec::new();
        for edit in db::get_edit_history(ctx.pool, post.id).await? {
            history.push(edit_view(ctx, edit).await?);
        }
        Some(history)
    } else {
        None
    };

    Ok(PostView {
        thread: thread_ref(ctx.pool, post.thread_id).await?,
        poster: user_ref(ctx.pool, post.poster_id).await?,
        id: post.id,
        contents: post.contents,
        time: post.time,
        edited_time: post.edited_time,
        sticky: post.sticky,
        editor,
        deleted: gated(ctx, ForumPermission::ModifyPostAdvanced, post.deleted),
        edit_history,
    })
}

async fn edit_view(ctx: ViewContext<'_>, edit: ForumPostEditHistory) -> Result<EditView> {
    let editor = match edit.editor_id {
        Some(id) => user_ref(ctx.pool, id).await?,
        None => None,
    };
    Ok(EditView {
        id: edit.id,
        editor,
        contents: edit.contents,
        time: edit.time,
    })
}

// ========== Polls ==========

pub async fn poll_view(ctx: ViewContext<'_>, poll: ForumPoll) -> Result<PollView> {
    let choices = db::get_poll_choices(ctx.pool, poll.id)
        .await?
        .into_iter()
        .map(|c| ChoiceView {
            id: c.id,
            choice: c.choice,
            answers: c.answers,
        })
        .collect();

    Ok(PollView {
        thread: thread_ref(ctx.pool, poll.thread_id).await?,
        id: poll.id,
        question: poll.question,
        closed: poll.closed,
        featured: poll.featured,
        choices,
    })
}
