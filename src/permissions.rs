//! Forum permissions and access rules.
//!
//! Besides the fixed permissions in [`ForumPermission`], access to single
//! forums and threads is granted through per-entity keys
//! (`forums_forums_permission_{id}`, `forums_threads_permission_{id}`).
//! A thread key can also be explicitly revoked, which hides that thread from
//! a user who can otherwise see its forum.

use std::collections::HashSet;
use std::str::FromStr;

use crate::db::UserPermission;

/// Fixed permissions checked by the forum endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ForumPermission {
    View,
    CreatePost,
    ModifyPost,
    ModifyPostAdvanced,
    DoublePost,
    PostInLocked,
    CreateThread,
    ModifyThread,
    ModifyThreadAdvanced,
    ModifySubscriptions,
    ViewSubscriptions,
    ModifyForums,
    ModifyPolls,
    VotePolls,
}

impl ForumPermission {
    pub const ALL: [Self; 14] = [
        Self::View,
        Self::CreatePost,
        Self::ModifyPost,
        Self::ModifyPostAdvanced,
        Self::DoublePost,
        Self::PostInLocked,
        Self::CreateThread,
        Self::ModifyThread,
        Self::ModifyThreadAdvanced,
        Self::ModifySubscriptions,
        Self::ViewSubscriptions,
        Self::ModifyForums,
        Self::ModifyPolls,
        Self::VotePolls,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::View => "forums_view",
            Self::CreatePost => "forums_posts_create",
            Self::ModifyPost => "forums_posts_modify",
            Self::ModifyPostAdvanced => "forums_posts_modify_advanced",
            Self::DoublePost => "forums_posts_double",
            Self::PostInLocked => "forums_posts_in_locked",
            Self::CreateThread => "forums_threads_create",
            Self::ModifyThread => "forums_threads_modify",
            Self::ModifyThreadAdvanced => "forums_threads_modify_advanced",
            Self::ModifySubscriptions => "forums_subscriptions_modify",
            Self::ViewSubscriptions => "forums_view_subscriptions",
            Self::ModifyForums => "forums_forums_modify",
            Self::ModifyPolls => "forums_polls_modify",
            Self::VotePolls => "forums_polls_vote",
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown forum permission: {0}")]
pub struct UnknownPermission(pub String);

impl FromStr for ForumPermission {
    type Err = UnknownPermission;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| UnknownPermission(s.to_string()))
    }
}

/// Access key granting a single forum.
#[must_use]
pub fn forum_permission_key(forum_id: i64) -> String {
    format!("forums_forums_permission_{forum_id}")
}

/// Access key granting a single thread.
#[must_use]
pub fn thread_permission_key(thread_id: i64) -> String {
    format!("forums_threads_permission_{thread_id}")
}

/// Anything that can answer permission questions about a user.
pub trait PermissionValidator {
    /// Whether the permission is granted.
    fn has_permission(&self, permission: &str) -> bool;

    /// Whether the permission was explicitly revoked.
    fn is_ungranted(&self, permission: &str) -> bool;

    fn has(&self, permission: ForumPermission) -> bool {
        self.has_permission(permission.as_str())
    }

    /// Whether any granted permission is in `keys`.
    fn has_any_of(&self, keys: &HashSet<String>) -> bool;
}

/// A user's granted and revoked permission keys.
#[derive(Debug, Clone, Default)]
pub struct UserPermissions {
    granted: HashSet<String>,
    ungranted: HashSet<String>,
}

impl UserPermissions {
    #[must_use]
    pub fn from_rows(rows: Vec<UserPermission>) -> Self {
        let mut permissions = Self::default();
        for row in rows {
            if row.granted {
                permissions.granted.insert(row.permission);
            } else {
                permissions.ungranted.insert(row.permission);
            }
        }
        permissions
    }

    #[must_use]
    pub fn with_granted<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            granted: keys.into_iter().map(Into::into).collect(),
            ungranted: HashSet::new(),
        }
    }

    pub fn ungrant(&mut self, key: impl Into<String>) {
        let key = key.into();
        self.granted.remove(&key);
        self.ungranted.insert(key);
    }
}

impl PermissionValidator for UserPermissions {
    fn has_permission(&self, permission: &str) -> bool {
        self.granted.contains(permission)
    }

    fn is_ungranted(&self, permission: &str) -> bool {
        self.ungranted.contains(permission)
    }

    fn has_any_of(&self, keys: &HashSet<String>) -> bool {
        !self.granted.is_disjoint(keys)
    }
}

/// Whether the validator may see a forum.
///
/// Granted by the forum's access key or the `bypass` permission. Users who
/// can only see some threads of the forum may still see the forum itself.
pub fn can_access_forum<V: PermissionValidator + ?Sized>(
    validator: &V,
    forum_id: i64,
    thread_ids: &[i64],
    bypass: Option<ForumPermission>,
) -> bool {
    if validator.has_permission(&forum_permission_key(forum_id))
        || bypass.is_some_and(|p| validator.has(p))
    {
        return true;
    }

    let thread_keys: HashSet<String> = thread_ids.iter().copied().map(thread_permission_key).collect();
    validator.has_any_of(&thread_keys)
}

/// Whether the validator may see a thread.
///
/// Granted by the thread's access key or the `bypass` permission. Access to
/// the forum grants every thread in it unless the thread key was revoked.
pub fn can_access_thread<V: PermissionValidator + ?Sized>(
    validator: &V,
    thread_id: i64,
    forum_id: i64,
    bypass: Option<ForumPermission>,
) -> bool {
    let thread_key = thread_permission_key(thread_id);
    if validator.has_permission(&thread_key) || bypass.is_some_and(|p| validator.has(p)) {
        return true;
    }

    !validator.is_ungranted(&thread_key)
        && validator.has_permission(&forum_permission_key(forum_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_strings_roundtrip() {
        for permission in ForumPermission::ALL {
            assert_eq!(permission.as_str().parse::<ForumPermission>().unwrap(), permission);
        }
        let err = "forums_nope".parse::<ForumPermission>().unwrap_err();
        assert_eq!(err.to_string(), "Unknown forum permission: forums_nope");
    }

    #[test]
    fn test_from_rows_splits_granted_and_revoked() {
        let rows = vec![
            UserPermission {
                user_id: 1,
                permission: "forums_view".to_string(),
                granted: true,
            },
            UserPermission {
                user_id: 1,
                permission: thread_permission_key(4),
                granted: false,
            },
        ];
        let permissions = UserPermissions::from_rows(rows);
        assert!(permissions.has(ForumPermission::View));
        assert!(permissions.is_ungranted(&thread_permission_key(4)));
        assert!(!permissions.has_permission(&thread_permission_key(4)));
    }

    #[test]
    fn test_forum_access_by_key() {
        let permissions = UserPermissions::with_granted([forum_permission_key(1)]);
        assert!(can_access_forum(&permissions, 1, &[], None));
        assert!(!can_access_forum(&permissions, 2, &[], None));
    }

    #[test]
    fn test_forum_access_by_bypass() {
        let permissions = UserPermissions::with_granted(["forums_forums_modify"]);
        assert!(can_access_forum(&permissions, 2, &[], Some(ForumPermission::ModifyForums)));
        assert!(!can_access_forum(&permissions, 2, &[], None));
    }

    #[test]
    fn test_forum_access_through_one_thread() {
        let permissions = UserPermissions::with_granted([thread_permission_key(7)]);
        assert!(can_access_forum(&permissions, 3, &[6, 7, 8], None));
        assert!(!can_access_forum(&permissions, 3, &[6, 8], None));
    }

    #[test]
    fn test_thread_access_through_forum() {
        let permissions = UserPermissions::with_granted([forum_permission_key(2)]);
        assert!(can_access_thread(&permissions, 5, 2, None));
        assert!(!can_access_thread(&permissions, 5, 3, None));
    }

    #[test]
    fn test_revoked_thread_hidden_despite_forum_access() {
        let mut permissions = UserPermissions::with_granted([forum_permission_key(2)]);
        permissions.ungrant(thread_permission_key(5));
        assert!(!can_access_thread(&permissions, 5, 2, None));
        assert!(can_access_thread(&permissions, 6, 2, None));
    }

    #[test]
    fn test_thread_key_beats_missing_forum_access() {
        let permissions = UserPermissions::with_granted([thread_permission_key(5)]);
        assert!(can_access_thread(&permissions, 5, 9, None));
    }
}
