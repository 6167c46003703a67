//! Quote, mention, and subscription notifications for forum posts.
//!
//! Post bodies are BBCode. A post notifies:
//! - every user it quotes with `[quote=username]` at top level,
//! - every user it mentions with `[user]username[/user]` at top level,
//! - every subscriber of its thread (new posts only).
//!
//! Tags inside a `[quote]` block belong to the quoted text, not to the author
//! of the post, so they never notify anyone.

use std::collections::HashSet;
use std::str::FromStr;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::db::{self, Database, ForumPost};

/// Quote open (with optional `=attribution`), quote close, or a mention.
static TAG_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\[quote(?:=([^\]]*))?\]|\[/quote\]|\[user\]([^\[\]\s]+)\[/user\]").unwrap()
});

/// Kinds of notification created by the forum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NotificationType {
    #[serde(rename = "forums_quoted")]
    Quoted,
    #[serde(rename = "forums_mentioned")]
    Mentioned,
    #[serde(rename = "forums_subscription")]
    Subscription,
}

impl NotificationType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Quoted => "forums_quoted",
            Self::Mentioned => "forums_mentioned",
            Self::Subscription => "forums_subscription",
        }
    }
}

impl FromStr for NotificationType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "forums_quoted" => Ok(Self::Quoted),
            "forums_mentioned" => Ok(Self::Mentioned),
            "forums_subscription" => Ok(Self::Subscription),
            other => anyhow::bail!("Unknown notification type: {other}"),
        }
    }
}

/// Payload stored with every post notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostNotice {
    pub thread_id: i64,
    pub post_id: i64,
    pub from: i64,
}

/// The parts of a post the notifiers need.
#[derive(Debug, Clone, Copy)]
pub struct PostRef<'a> {
    pub id: i64,
    pub thread_id: i64,
    pub poster_id: i64,
    pub contents: &'a str,
}

impl<'a> From<&'a ForumPost> for PostRef<'a> {
    fn from(post: &'a ForumPost) -> Self {
        Self {
            id: post.id,
            thread_id: post.thread_id,
            poster_id: post.poster_id,
            contents: &post.contents,
        }
    }
}

impl PostRef<'_> {
    fn notice(&self) -> PostNotice {
        PostNotice {
            thread_id: self.thread_id,
            post_id: self.id,
            from: self.poster_id,
        }
    }
}

/// Resolves usernames to user IDs.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Unknown usernames resolve to `None`, not an error.
    async fn resolve_username(&self, username: &str) -> Result<Option<i64>>;
}

/// Destination for created notifications.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn create(&self, user_id: i64, kind: NotificationType, contents: &PostNotice)
        -> Result<()>;
}

#[async_trait]
impl UserDirectory for Database {
    async fn resolve_username(&self, username: &str) -> Result<Option<i64>> {
        Ok(db::get_user_by_username(self.pool(), username)
            .await?
            .map(|user| user.id))
    }
}

#[async_trait]
impl NotificationSink for Database {
    async fn create(
        &self,
        user_id: i64,
        kind: NotificationType,
        contents: &PostNotice,
    ) -> Result<()> {
        let contents =
            serde_json::to_string(contents).context("Failed to encode notification contents")?;
        db::create_notification(self.pool(), user_id, kind.as_str(), &contents).await?;
        Ok(())
    }
}

// ========== Tag scanning ==========

/// A BBCode tag relevant to notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag<'a> {
    /// `[quote]` or `[quote=name]` / `[quote=name|post]`.
    QuoteOpen(Option<&'a str>),
    QuoteClose,
    /// `[user]name[/user]`.
    Mention(&'a str),
}

/// Iterate over the notification-relevant tags of a post in document order.
pub fn tags(contents: &str) -> impl Iterator<Item = Tag<'_>> {
    TAG_PATTERN.captures_iter(contents).map(|caps| {
        if let Some(name) = caps.get(2) {
            return Tag::Mention(name.as_str());
        }
        if caps[0].starts_with("[/") {
            return Tag::QuoteClose;
        }
        Tag::QuoteOpen(caps.get(1).and_then(|m| attribution(m.as_str())))
    })
}

/// Extract the username from a quote attribution such as `user_two|121`.
fn attribution(raw: &str) -> Option<&str> {
    let name = raw.split('|').next().unwrap_or_default().trim();
    (!name.is_empty()).then_some(name)
}

/// Position relative to quote blocks while scanning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Nesting {
    #[default]
    TopLevel,
    InsideQuote(usize),
}

impl Nesting {
    fn open(self) -> Self {
        match self {
            Self::TopLevel => Self::InsideQuote(1),
            Self::InsideQuote(depth) => Self::InsideQuote(depth + 1),
        }
    }

    /// Stray closing tags at top level are ignored.
    fn close(self) -> Self {
        match self {
            Self::TopLevel | Self::InsideQuote(1) => Self::TopLevel,
            Self::InsideQuote(depth) => Self::InsideQuote(depth - 1),
        }
    }
}

/// Usernames a post quotes and mentions outside of quote blocks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanResult<'a> {
    pub quoted: Vec<&'a str>,
    pub mentioned: Vec<&'a str>,
}

/// Scan a post body once, collecting top-level quote attributions and mentions.
#[must_use]
pub fn scan(contents: &str) -> ScanResult<'_> {
    let mut nesting = Nesting::TopLevel;
    let mut result = ScanResult::default();

    for tag in tags(contents) {
        match tag {
            Tag::QuoteOpen(author) => {
                if let (Nesting::TopLevel, Some(author)) = (nesting, author) {
                    result.quoted.push(author);
                }
                nesting = nesting.open();
            }
            Tag::QuoteClose => nesting = nesting.close(),
            Tag::Mention(name) => {
                if nesting == Nesting::TopLevel {
                    result.mentioned.push(name);
                }
            }
        }
    }

    result
}

// ========== Dispatch ==========

/// Create one notification of `kind` per target user.
///
/// Returns the number of notifications created. Sink failures propagate.
pub async fn dispatch_notifications<S: NotificationSink + ?Sized>(
    post: PostRef<'_>,
    kind: NotificationType,
    user_ids: &[i64],
    sink: &S,
) -> Result<usize> {
    let notice = post.notice();
    for &user_id in user_ids {
        sink.create(user_id, kind, &notice).await?;
    }
    if !user_ids.is_empty() {
        debug!(post_id = post.id, kind = kind.as_str(), count = user_ids.len(), "Dispatched notifications");
    }
    Ok(user_ids.len())
}

/// Resolve usernames to notification targets.
///
/// Unknown names and the post's own author are dropped; each user is
/// targeted once even if named several times.
async fn resolve_targets<D: UserDirectory + ?Sized>(
    post: PostRef<'_>,
    usernames: &[&str],
    directory: &D,
) -> Result<Vec<i64>> {
    let mut seen = HashSet::new();
    let mut targets = Vec::new();
    for username in usernames {
        let Some(user_id) = directory.resolve_username(username).await? else {
            continue;
        };
        if user_id != post.poster_id && seen.insert(user_id) {
            targets.push(user_id);
        }
    }
    Ok(targets)
}

/// Notify users quoted at top level of the post.
pub async fn check_post_contents_for_quotes<D, S>(
    post: PostRef<'_>,
    directory: &D,
    sink: &S,
) -> Result<usize>
where
    D: UserDirectory + ?Sized,
    S: NotificationSink + ?Sized,
{
    let quoted = scan(post.contents).quoted;
    let targets = resolve_targets(post, &quoted, directory).await?;
    dispatch_notifications(post, NotificationType::Quoted, &targets, sink).await
}

/// Notify users mentioned at top level of the post.
pub async fn check_post_contents_for_mentions<D, S>(
    post: PostRef<'_>,
    directory: &D,
    sink: &S,
) -> Result<usize>
where
    D: UserDirectory + ?Sized,
    S: NotificationSink + ?Sized,
{
    let mentioned = scan(post.contents).mentioned;
    let targets = resolve_targets(post, &mentioned, directory).await?;
    dispatch_notifications(post, NotificationType::Mentioned, &targets, sink).await
}

/// Notify the thread's subscribers of a new post, except its author.
pub async fn send_subscription_notices<S: NotificationSink + ?Sized>(
    post: PostRef<'_>,
    subscriber_ids: &[i64],
    sink: &S,
) -> Result<usize> {
    let targets: Vec<i64> = subscriber_ids
        .iter()
        .copied()
        .filter(|&id| id != post.poster_id)
        .collect();
    dispatch_notifications(post, NotificationType::Subscription, &targets, sink).await
}

/// Run every notifier for a freshly created post.
pub async fn process_new_post<D, S>(
    post: PostRef<'_>,
    subscriber_ids: &[i64],
    directory: &D,
    sink: &S,
) -> Result<()>
where
    D: UserDirectory + ?Sized,
    S: NotificationSink + ?Sized,
{
    check_post_contents_for_quotes(post, directory, sink).await?;
    check_post_contents_for_mentions(post, directory, sink).await?;
    send_subscription_notices(post, subscriber_ids, sink).await?;
    Ok(())
}

/// Resolve `current` and drop every user that `previous` already targets.
async fn new_targets<D: UserDirectory + ?Sized>(
    post: PostRef<'_>,
    current: &[&str],
    previous: &[&str],
    directory: &D,
) -> Result<Vec<i64>> {
    let already: HashSet<i64> = resolve_targets(post, previous, directory)
        .await?
        .into_iter()
        .collect();
    Ok(resolve_targets(post, current, directory)
        .await?
        .into_iter()
        .filter(|id| !already.contains(id))
        .collect())
}

/// Rescan an edited post, notifying only users quoted or mentioned by the
/// new contents who were not already quoted or mentioned before the edit.
///
/// A merged double post passes the pre-merge contents as `previous_contents`,
/// so only the appended text can notify.
pub async fn process_edited_post<D, S>(
    post: PostRef<'_>,
    previous_contents: &str,
    directory: &D,
    sink: &S,
) -> Result<()>
where
    D: UserDirectory + ?Sized,
    S: NotificationSink + ?Sized,
{
    let before = scan(previous_contents);
    let after = scan(post.contents);

    let quoted = new_targets(post, &after.quoted, &before.quoted, directory).await?;
    dispatch_notifications(post, NotificationType::Quoted, &quoted, sink).await?;

    let mentioned = new_targets(post, &after.mentioned, &before.mentioned, directory).await?;
    dispatch_notifications(post, NotificationType::Mentioned, &mentioned, sink).await?;
    Ok(())
}
