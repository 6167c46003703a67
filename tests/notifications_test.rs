//! Integration tests for post notifications backed by SQLite.

use pulsar_forums::db::{
    self, create_thread, create_user, get_notifications, get_post, Database, NewPost, NewThread,
};
use pulsar_forums::notifications::{process_edited_post, process_new_post, PostNotice, PostRef};
use tempfile::TempDir;

async fn setup_db() -> (Database, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = temp_dir.path().join("test.sqlite");
    let db = Database::new(&db_path)
        .await
        .expect("Failed to create database");
    (db, temp_dir)
}

struct Fixture {
    db: Database,
    _temp_dir: TempDir,
    users: Vec<i64>,
    thread_id: i64,
}

async fn fixture() -> Fixture {
    let (db, temp_dir) = setup_db().await;
    let mut users = Vec::new();
    for name in ["user_one", "user_two", "user_three", "user_four"] {
        users.push(create_user(db.pool(), name).await.unwrap());
    }

    let category_id = db::insert_category(
        db.pool(),
        &db::NewCategory {
            name: "General".to_string(),
            description: None,
            position: 0,
        },
    )
    .await
    .unwrap();
    let forum_id = db::insert_forum(
        db.pool(),
        &db::NewForum {
            name: "Chat".to_string(),
            description: None,
            category_id,
            position: 0,
        },
    )
    .await
    .unwrap();
    let (thread_id, _) = create_thread(
        db.pool(),
        &NewThread {
            topic: "Quotes".to_string(),
            forum_id,
            poster_id: users[0],
            contents: "opening".to_string(),
        },
    )
    .await
    .unwrap();

    Fixture {
        db,
        _temp_dir: temp_dir,
        users,
        thread_id,
    }
}

async fn post(f: &Fixture, poster_id: i64, contents: &str) -> db::ForumPost {
    let id = db::insert_post(
        f.db.pool(),
        &NewPost {
            thread_id: f.thread_id,
            poster_id,
            contents: contents.to_string(),
        },
    )
    .await
    .unwrap();
    get_post(f.db.pool(), id, false).await.unwrap().unwrap()
}

async fn kinds_for(db: &Database, user_id: i64) -> Vec<String> {
    let mut kinds: Vec<String> = get_notifications(db.pool(), user_id, None, true)
        .await
        .unwrap()
        .into_iter()
        .map(|n| n.kind)
        .collect();
    kinds.sort();
    kinds
}

#[tokio::test]
async fn test_new_post_notifies_quotes_mentions_and_subscribers() {
    let f = fixture().await;
    let [one, two, three, four] = [f.users[0], f.users[1], f.users[2], f.users[3]];

    let created = post(
        &f,
        one,
        "[quote=User_Two|12]hi [user]user_four[/user][/quote] thanks! [user]user_three[/user]",
    )
    .await;
    process_new_post(PostRef::from(&created), &[one, four], &f.db, &f.db)
        .await
        .unwrap();

    assert_eq!(kinds_for(&f.db, two).await, vec!["forums_quoted"]);
    assert_eq!(kinds_for(&f.db, three).await, vec!["forums_mentioned"]);
    // Only a subscription notice; the mention sits inside the quote.
    assert_eq!(kinds_for(&f.db, four).await, vec!["forums_subscription"]);
    // The poster is never notified about their own post.
    assert!(kinds_for(&f.db, one).await.is_empty());

    let stored = get_notifications(f.db.pool(), two, None, false).await.unwrap();
    let notice: PostNotice = serde_json::from_str(&stored[0].contents).unwrap();
    assert_eq!(
        notice,
        PostNotice {
            thread_id: f.thread_id,
            post_id: created.id,
            from: one,
        }
    );
}

#[tokio::test]
async fn test_unknown_usernames_are_skipped() {
    let f = fixture().await;
    let created = post(&f, f.users[0], "[quote=nobody]x[/quote][user]ghost[/user]").await;

    process_new_post(PostRef::from(&created), &[], &f.db, &f.db)
        .await
        .unwrap();

    for user_id in &f.users {
        assert!(kinds_for(&f.db, *user_id).await.is_empty());
    }
}

#[tokio::test]
async fn test_edit_does_not_renotify_existing_targets() {
    let f = fixture().await;
    let [one, two, three, four] = [f.users[0], f.users[1], f.users[2], f.users[3]];

    let created = post(&f, one, "[quote=user_two]hi[/quote] teh [user]user_three[/user]").await;
    process_new_post(PostRef::from(&created), &[four], &f.db, &f.db)
        .await
        .unwrap();

    db::edit_post_contents(
        f.db.pool(),
        &created,
        "[quote=user_two]hi[/quote] the [user]user_three[/user] [user]user_four[/user]",
        one,
    )
    .await
    .unwrap();
    let edited = get_post(f.db.pool(), created.id, false).await.unwrap().unwrap();
    process_edited_post(PostRef::from(&edited), &created.contents, &f.db, &f.db)
        .await
        .unwrap();

    assert_eq!(kinds_for(&f.db, two).await, vec!["forums_quoted"]);
    assert_eq!(kinds_for(&f.db, three).await, vec!["forums_mentioned"]);
    // The new mention notifies; the edit sends no second subscription notice.
    assert_eq!(
        kinds_for(&f.db, four).await,
        vec!["forums_mentioned", "forums_subscription"]
    );
}
