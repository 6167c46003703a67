//! Integration tests for the JSON API.

use std::path::PathBuf;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use pulsar_forums::config::Config;
use pulsar_forums::db::{self, Database};
use pulsar_forums::permissions::{forum_permission_key, thread_permission_key, ForumPermission};
use pulsar_forums::web::{create_app, AppState};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

const ADMIN_TOKEN: &str = "admin-token-0123456789";
const MEMBER_TOKEN: &str = "member-token-0123456789";

struct TestApp {
    app: Router,
    db: Database,
    member_id: i64,
    _temp_dir: TempDir,
}

fn test_config(database_path: PathBuf) -> Config {
    Config {
        database_path,
        database_max_connections: 5,
        database_busy_timeout: Duration::from_secs(10),
        web_host: "127.0.0.1".to_string(),
        web_port: 0,
        cache_ttl: Duration::from_secs(60),
        admin_username: None,
        admin_api_token: None,
    }
}

async fn setup() -> TestApp {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = temp_dir.path().join("test.sqlite");
    let db = Database::new(&db_path)
        .await
        .expect("Failed to create database");
    let pool = db.pool();

    let admin_id = db::create_user(pool, "admin").await.unwrap();
    for permission in ForumPermission::ALL {
        db::grant_permission(pool, admin_id, permission.as_str())
            .await
            .unwrap();
    }
    db::create_api_token(pool, admin_id, ADMIN_TOKEN).await.unwrap();

    let member_id = db::create_user(pool, "member").await.unwrap();
    for permission in [
        ForumPermission::View,
        ForumPermission::CreatePost,
        ForumPermission::CreateThread,
        ForumPermission::ModifySubscriptions,
        ForumPermission::ViewSubscriptions,
        ForumPermission::VotePolls,
    ] {
        db::grant_permission(pool, member_id, permission.as_str())
            .await
            .unwrap();
    }
    db::create_api_token(pool, member_id, MEMBER_TOKEN).await.unwrap();

    let app = create_app(AppState::new(db.clone(), test_config(db_path)));
    TestApp {
        app,
        db,
        member_id,
        _temp_dir: temp_dir,
    }
}

async fn call(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

/// Create a category and forum as the admin and let the member see the forum.
async fn seed_forum(t: &TestApp) -> i64 {
    let (status, category) = call(
        &t.app,
        "POST",
        "/forums/categories",
        Some(ADMIN_TOKEN),
        Some(json!({"name": "General", "position": 1})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let category_id = category["response"]["id"].as_i64().unwrap();

    let (status, forum) = call(
        &t.app,
        "POST",
        "/forums",
        Some(ADMIN_TOKEN),
        Some(json!({"name": "Chat", "category_id": category_id})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let forum_id = forum["response"]["id"].as_i64().unwrap();

    db::grant_permission(t.db.pool(), t.member_id, &forum_permission_key(forum_id))
        .await
        .unwrap();
    forum_id
}

async fn member_thread(t: &TestApp, forum_id: i64) -> Value {
    let (status, thread) = call(
        &t.app,
        "POST",
        "/forums/threads",
        Some(MEMBER_TOKEN),
        Some(json!({"topic": "Hello", "forum_id": forum_id, "contents": "opening"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{thread}");
    thread["response"].clone()
}

#[tokio::test]
async fn test_health_check() {
    let t = setup().await;
    let response = t
        .app
        .clone()
        .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_requests_without_token_are_rejected() {
    let t = setup().await;
    let (status, body) = call(&t.app, "GET", "/forums/categories", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["status"], "failed");

    let (status, _) = call(&t.app, "GET", "/forums/categories", Some("bogus"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_member_cannot_create_categories() {
    let t = setup().await;
    let (status, _) = call(
        &t.app,
        "POST",
        "/forums/categories",
        Some(MEMBER_TOKEN),
        Some(json!({"name": "Nope"})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_forum_visibility_follows_access_keys() {
    let t = setup().await;
    let forum_id = seed_forum(&t).await;

    let (_, other) = call(
        &t.app,
        "POST",
        "/forums",
        Some(ADMIN_TOKEN),
        Some(json!({"name": "Staff", "category_id": 1})),
    )
    .await;
    let staff_id = other["response"]["id"].as_i64().unwrap();

    let (status, body) = call(&t.app, "GET", "/forums/categories", Some(MEMBER_TOKEN), None).await;
    assert_eq!(status, StatusCode::OK);
    let forums = body["response"][0]["forums"].as_array().unwrap();
    assert_eq!(forums.len(), 1);
    assert_eq!(forums[0]["id"].as_i64(), Some(forum_id));
    assert!(forums[0].get("deleted").is_none());

    let (status, _) = call(
        &t.app,
        "GET",
        &format!("/forums/{staff_id}"),
        Some(MEMBER_TOKEN),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = call(&t.app, "GET", "/forums/9999", Some(MEMBER_TOKEN), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["response"], "Forum 9999 does not exist.");
}

#[tokio::test]
async fn test_category_with_forums_cannot_be_deleted() {
    let t = setup().await;
    seed_forum(&t).await;

    let (status, body) = call(
        &t.app,
        "DELETE",
        "/forums/categories/1",
        Some(ADMIN_TOKEN),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["response"],
        "You cannot delete a forum category while it still has forums assigned to it."
    );
}

#[tokio::test]
async fn test_quote_reply_notifies_thread_author() {
    let t = setup().await;
    let forum_id = seed_forum(&t).await;
    let thread = member_thread(&t, forum_id).await;
    let thread_id = thread["id"].as_i64().unwrap();

    let (status, reply) = call(
        &t.app,
        "POST",
        "/forums/posts",
        Some(ADMIN_TOKEN),
        Some(json!({
            "thread_id": thread_id,
            "contents": "[quote=member]opening[/quote] Welcome!"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{reply}");
    let reply_id = reply["response"]["id"].as_i64().unwrap();

    let (status, body) = call(&t.app, "GET", "/notifications", Some(MEMBER_TOKEN), None).await;
    assert_eq!(status, StatusCode::OK);
    let notifications = body["response"].as_array().unwrap();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0]["type"], "forums_quoted");
    assert_eq!(notifications[0]["contents"]["thread_id"].as_i64(), Some(thread_id));
    assert_eq!(notifications[0]["contents"]["post_id"].as_i64(), Some(reply_id));

    let (_, counts) = call(
        &t.app,
        "GET",
        "/notifications/counts",
        Some(MEMBER_TOKEN),
        None,
    )
    .await;
    assert_eq!(counts["response"], json!({"forums_quoted": 1}));

    let (status, body) = call(
        &t.app,
        "PUT",
        "/notifications/read",
        Some(MEMBER_TOKEN),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["response"], "1 notifications marked as read.");

    let (_, body) = call(&t.app, "GET", "/notifications", Some(MEMBER_TOKEN), None).await;
    assert!(body["response"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_double_post_is_merged() {
    let t = setup().await;
    let forum_id = seed_forum(&t).await;
    let thread = member_thread(&t, forum_id).await;
    let thread_id = thread["id"].as_i64().unwrap();
    let opening_id = thread["last_post"]["id"].as_i64().unwrap();

    let (status, body) = call(
        &t.app,
        "POST",
        "/forums/posts",
        Some(MEMBER_TOKEN),
        Some(json!({"thread_id": thread_id, "contents": "more"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["response"]["id"].as_i64(), Some(opening_id));
    assert_eq!(body["response"]["contents"], "opening\n\n\nmore");
    // Edit history is a moderator-only field.
    assert!(body["response"].get("edit_history").is_none());

    let count = db::count_posts_in_thread(t.db.pool(), thread_id).await.unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn test_merged_double_post_only_notifies_for_appended_text() {
    let t = setup().await;
    let forum_id = seed_forum(&t).await;
    let (status, thread) = call(
        &t.app,
        "POST",
        "/forums/threads",
        Some(MEMBER_TOKEN),
        Some(json!({
            "topic": "Rules",
            "forum_id": forum_id,
            "contents": "[quote=admin]be nice[/quote] agreed"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{thread}");
    let thread_id = thread["response"]["id"].as_i64().unwrap();

    for extra in ["also", "[quote=admin]be nice[/quote] still agreed"] {
        let (status, body) = call(
            &t.app,
            "POST",
            "/forums/posts",
            Some(MEMBER_TOKEN),
            Some(json!({"thread_id": thread_id, "contents": extra})),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
    }

    let (_, counts) = call(&t.app, "GET", "/notifications/counts", Some(ADMIN_TOKEN), None).await;
    assert_eq!(counts["response"], json!({"forums_quoted": 1}));
}

#[tokio::test]
async fn test_editing_a_quote_does_not_renotify() {
    let t = setup().await;
    let forum_id = seed_forum(&t).await;
    let thread = member_thread(&t, forum_id).await;
    let thread_id = thread["id"].as_i64().unwrap();

    let (_, reply) = call(
        &t.app,
        "POST",
        "/forums/posts",
        Some(ADMIN_TOKEN),
        Some(json!({"thread_id": thread_id, "contents": "[quote=member]opening[/quote] hi"})),
    )
    .await;
    let reply_id = reply["response"]["id"].as_i64().unwrap();

    let (status, body) = call(
        &t.app,
        "PUT",
        &format!("/forums/posts/{reply_id}"),
        Some(ADMIN_TOKEN),
        Some(json!({"contents": "[quote=member]opening[/quote] Hi!"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let (_, counts) = call(&t.app, "GET", "/notifications/counts", Some(MEMBER_TOKEN), None).await;
    assert_eq!(counts["response"], json!({"forums_quoted": 1}));
}

#[tokio::test]
async fn test_locked_thread_rejects_posts() {
    let t = setup().await;
    let forum_id = seed_forum(&t).await;
    let thread = member_thread(&t, forum_id).await;
    let thread_id = thread["id"].as_i64().unwrap();

    let (status, _) = call(
        &t.app,
        "PUT",
        &format!("/forums/threads/{thread_id}"),
        Some(ADMIN_TOKEN),
        Some(json!({"locked": true})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = call(
        &t.app,
        "POST",
        "/forums/posts",
        Some(MEMBER_TOKEN),
        Some(json!({"thread_id": thread_id, "contents": "let me in"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["response"], "You cannot post in a locked thread.");
}

#[tokio::test]
async fn test_thread_subscription_round_trip() {
    let t = setup().await;
    let forum_id = seed_forum(&t).await;
    let thread = member_thread(&t, forum_id).await;
    let thread_id = thread["id"].as_i64().unwrap();
    let uri = format!("/subscriptions/threads/{thread_id}");

    let (status, body) = call(&t.app, "POST", &uri, Some(MEMBER_TOKEN), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["response"],
        format!("Successfully subscribed to thread {thread_id}.")
    );

    let (status, body) = call(&t.app, "POST", &uri, Some(MEMBER_TOKEN), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["response"],
        format!("You are already subscribed to thread {thread_id}.")
    );

    let (_, body) = call(
        &t.app,
        "GET",
        "/subscriptions/threads",
        Some(MEMBER_TOKEN),
        None,
    )
    .await;
    let threads = body["response"].as_array().unwrap();
    assert_eq!(threads.len(), 1);
    assert_eq!(threads[0]["subscribed"], true);

    // A reply from someone else now raises a subscription notice.
    call(
        &t.app,
        "POST",
        "/forums/posts",
        Some(ADMIN_TOKEN),
        Some(json!({"thread_id": thread_id, "contents": "reply"})),
    )
    .await;
    let (_, body) = call(
        &t.app,
        "GET",
        "/notifications?type=forums_subscription",
        Some(MEMBER_TOKEN),
        None,
    )
    .await;
    assert_eq!(body["response"].as_array().unwrap().len(), 1);

    let (status, _) = call(&t.app, "DELETE", &uri, Some(MEMBER_TOKEN), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = call(&t.app, "DELETE", &uri, Some(MEMBER_TOKEN), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["response"],
        format!("You are not subscribed to thread {thread_id}.")
    );
}

#[tokio::test]
async fn test_poll_voting() {
    let t = setup().await;
    let forum_id = seed_forum(&t).await;
    let thread = member_thread(&t, forum_id).await;
    let thread_id = thread["id"].as_i64().unwrap();

    let (status, poll) = call(
        &t.app,
        "POST",
        "/forums/polls",
        Some(ADMIN_TOKEN),
        Some(json!({"thread_id": thread_id, "question": "Best?", "choices": ["A", "B"]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{poll}");
    let choice_id = poll["response"]["choices"][1]["id"].as_i64().unwrap();
    let vote_uri = format!("/forums/polls/choices/{choice_id}/vote");

    let (status, body) = call(&t.app, "POST", &vote_uri, Some(MEMBER_TOKEN), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["response"],
        format!("You have successfully voted for choice {choice_id}.")
    );

    let (status, body) = call(&t.app, "POST", &vote_uri, Some(MEMBER_TOKEN), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["response"], "You have already voted on this poll.");

    let (status, body) = call(
        &t.app,
        "PUT",
        &format!("/forums/polls/{}", poll["response"]["id"]),
        Some(ADMIN_TOKEN),
        Some(json!({"choices": {"add": ["A"], "delete": [999]}})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["response"],
        "The following poll choices could not be added: A. \
         The following poll choices could not be deleted: 999."
    );
    let (status, body) = call(
        &t.app,
        "PUT",
        &format!("/forums/polls/{}", poll["response"]["id"]),
        Some(ADMIN_TOKEN),
        Some(json!({"featured": true, "choices": {"add": ["C", "C"]}})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["response"], "Poll choice C is listed more than once.");
    // A rejected edit changes nothing.
    let (_, body) = call(
        &t.app,
        "GET",
        &format!("/forums/polls/{}", poll["response"]["id"]),
        Some(MEMBER_TOKEN),
        None,
    )
    .await;
    assert_eq!(body["response"]["choices"].as_array().unwrap().len(), 2);

    // A poll whose thread is gone is hidden.
    call(
        &t.app,
        "DELETE",
        &format!("/forums/threads/{thread_id}"),
        Some(ADMIN_TOKEN),
        None,
    )
    .await;
    let (status, _) = call(&t.app, "POST", &vote_uri, Some(MEMBER_TOKEN), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_user_profile_counts() {
    let t = setup().await;
    let forum_id = seed_forum(&t).await;
    member_thread(&t, forum_id).await;

    let (status, body) = call(
        &t.app,
        "GET",
        &format!("/users/{}", t.member_id),
        Some(ADMIN_TOKEN),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["response"]["username"], "member");
    assert_eq!(body["response"]["forum_thread_count"].as_i64(), Some(1));
    assert_eq!(body["response"]["forum_post_count"].as_i64(), Some(1));
}

#[tokio::test]
async fn test_revoked_thread_is_hidden() {
    let t = setup().await;
    let forum_id = seed_forum(&t).await;
    let thread = member_thread(&t, forum_id).await;
    let thread_id = thread["id"].as_i64().unwrap();

    db::ungrant_permission(
        t.db.pool(),
        t.member_id,
        &thread_permission_key(thread_id),
    )
    .await
    .unwrap();

    let (status, _) = call(
        &t.app,
        "GET",
        &format!("/forums/threads/{thread_id}"),
        Some(MEMBER_TOKEN),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = call(
        &t.app,
        "GET",
        &format!("/forums/{forum_id}"),
        Some(MEMBER_TOKEN),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["response"]["threads"].as_array().unwrap().is_empty());
}

async fn profile_counts(t: &TestApp, user_id: i64) -> (i64, i64) {
    let (status, body) = call(
        &t.app,
        "GET",
        &format!("/users/{user_id}"),
        Some(ADMIN_TOKEN),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    (
        body["response"]["forum_thread_count"].as_i64().unwrap(),
        body["response"]["forum_post_count"].as_i64().unwrap(),
    )
}

#[tokio::test]
async fn test_deleting_a_thread_refreshes_poster_counts() {
    let t = setup().await;
    let admin_id = db::get_user_by_username(t.db.pool(), "admin")
        .await
        .unwrap()
        .unwrap()
        .id;
    let forum_id = seed_forum(&t).await;
    let thread = member_thread(&t, forum_id).await;
    let thread_id = thread["id"].as_i64().unwrap();
    call(
        &t.app,
        "POST",
        "/forums/posts",
        Some(ADMIN_TOKEN),
        Some(json!({"thread_id": thread_id, "contents": "reply"})),
    )
    .await;

    // Load the counts into the cache.
    assert_eq!(profile_counts(&t, t.member_id).await, (1, 1));
    assert_eq!(profile_counts(&t, admin_id).await, (0, 1));

    let (status, _) = call(
        &t.app,
        "DELETE",
        &format!("/forums/threads/{thread_id}"),
        Some(ADMIN_TOKEN),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    assert_eq!(profile_counts(&t, t.member_id).await, (0, 0));
    assert_eq!(profile_counts(&t, admin_id).await, (0, 0));
}

#[tokio::test]
async fn test_deleting_a_forum_refreshes_thread_counts() {
    let t = setup().await;
    let forum_id = seed_forum(&t).await;
    member_thread(&t, forum_id).await;
    assert_eq!(profile_counts(&t, t.member_id).await.0, 1);

    let (status, _) = call(
        &t.app,
        "DELETE",
        &format!("/forums/{forum_id}"),
        Some(ADMIN_TOKEN),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    assert_eq!(profile_counts(&t, t.member_id).await.0, 0);
}

async fn unread_count(app: &Router) -> usize {
    let (status, body) = call(
        app,
        "GET",
        "/subscriptions/threads?unread=1",
        Some(MEMBER_TOKEN),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    body["response"].as_array().unwrap().len()
}

#[tokio::test]
async fn test_unread_thread_subscriptions() {
    let t = setup().await;
    let forum_id = seed_forum(&t).await;
    let thread = member_thread(&t, forum_id).await;
    let thread_id = thread["id"].as_i64().unwrap();
    call(
        &t.app,
        "POST",
        &format!("/subscriptions/threads/{thread_id}"),
        Some(MEMBER_TOKEN),
        None,
    )
    .await;

    // Never opened.
    assert_eq!(unread_count(&t.app).await, 1);

    call(
        &t.app,
        "GET",
        &format!("/forums/threads/{thread_id}"),
        Some(MEMBER_TOKEN),
        None,
    )
    .await;
    assert_eq!(unread_count(&t.app).await, 0);

    call(
        &t.app,
        "POST",
        "/forums/posts",
        Some(ADMIN_TOKEN),
        Some(json!({"thread_id": thread_id, "contents": "new reply"})),
    )
    .await;
    assert_eq!(unread_count(&t.app).await, 1);

    // The plain listing still shows every subscription.
    let (_, body) = call(
        &t.app,
        "GET",
        "/subscriptions/threads",
        Some(MEMBER_TOKEN),
        None,
    )
    .await;
    assert_eq!(body["response"].as_array().unwrap().len(), 1);
}
