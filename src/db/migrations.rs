use anyhow::{Context, Result};
use sqlx::SqlitePool;
use tracing::debug;

/// Run all pending migrations.
pub async fn run(pool: &SqlitePool) -> Result<()> {
    create_migration_table(pool).await?;
    let current_version = get_schema_version(pool).await?;

    if current_version < 1 {
        debug!("Running migration v1");
        run_migration_v1(pool).await?;
        set_schema_version(pool, 1).await?;
    }

    if current_version < 2 {
        debug!("Running migration v2");
        run_migration_v2(pool).await?;
        set_schema_version(pool, 2).await?;
    }

    if current_version < 3 {
        debug!("Running migration v3");
        run_migration_v3(pool).await?;
        set_schema_version(pool, 3).await?;
    }

    Ok(())
}

async fn create_migration_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS _schema_version (
            version INTEGER PRIMARY KEY
        )
        ",
    )
    .execute(pool)
    .await
    .context("Failed to create schema version table")?;

    Ok(())
}

async fn get_schema_version(pool: &SqlitePool) -> Result<i32> {
    let row: Option<(i32,)> = sqlx::query_as("SELECT version FROM _schema_version LIMIT 1")
        .fetch_optional(pool)
        .await
        .context("Failed to get schema version")?;

    Ok(row.map_or(0, |(v,)| v))
}

async fn set_schema_version(pool: &SqlitePool, version: i32) -> Result<()> {
    sqlx::query("DELETE FROM _schema_version")
        .execute(pool)
        .await?;
    sqlx::query("INSERT INTO _schema_version (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await?;
    Ok(())
}

/// Run a list of DDL statements, attaching the statement's label to errors.
async fn execute_all(pool: &SqlitePool, statements: &[(&str, &str)]) -> Result<()> {
    for (label, sql) in statements {
        sqlx::query(sql)
            .execute(pool)
            .await
            .with_context(|| format!("Failed to create {label}"))?;
    }
    Ok(())
}

async fn run_migration_v1(pool: &SqlitePool) -> Result<()> {
    debug!("Running migration v1: users, permissions, tokens, notifications");

    execute_all(
        pool,
        &[
            (
                "users table",
                r"
                CREATE TABLE IF NOT EXISTS users (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    username TEXT NOT NULL UNIQUE COLLATE NOCASE,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                )
                ",
            ),
            (
                "user_permissions table",
                r"
                CREATE TABLE IF NOT EXISTS user_permissions (
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    permission TEXT NOT NULL,
                    granted INTEGER NOT NULL DEFAULT 1,
                    PRIMARY KEY (user_id, permission)
                )
                ",
            ),
            (
                "api_tokens table",
                r"
                CREATE TABLE IF NOT EXISTS api_tokens (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    token TEXT NOT NULL UNIQUE,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    last_used_at TEXT
                )
                ",
            ),
            (
                "notifications table",
                r"
                CREATE TABLE IF NOT EXISTS notifications (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    type TEXT NOT NULL,
                    contents TEXT NOT NULL,
                    read INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                )
                ",
            ),
            (
                "notifications index",
                "CREATE INDEX IF NOT EXISTS idx_notifications_user_type ON notifications(user_id, type, read)",
            ),
        ],
    )
    .await
}

async fn run_migration_v2(pool: &SqlitePool) -> Result<()> {
    debug!("Running migration v2: forum categories, forums, threads, posts");

    execute_all(
        pool,
        &[
            (
                "forums_categories table",
                r"
                CREATE TABLE IF NOT EXISTS forums_categories (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    description TEXT,
                    position INTEGER NOT NULL DEFAULT 0,
                    deleted INTEGER NOT NULL DEFAULT 0
                )
                ",
            ),
            (
                "forums table",
                r"
                CREATE TABLE IF NOT EXISTS forums (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    description TEXT,
                    category_id INTEGER NOT NULL REFERENCES forums_categories(id),
                    position INTEGER NOT NULL DEFAULT 0,
                    deleted INTEGER NOT NULL DEFAULT 0
                )
                ",
            ),
            (
                "forums index",
                "CREATE INDEX IF NOT EXISTS idx_forums_category ON forums(category_id, position)",
            ),
            (
                "forums_threads table",
                r"
                CREATE TABLE IF NOT EXISTS forums_threads (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    topic TEXT NOT NULL,
                    forum_id INTEGER NOT NULL REFERENCES forums(id),
                    poster_id INTEGER NOT NULL REFERENCES users(id),
                    created_time TEXT NOT NULL DEFAULT (datetime('now')),
                    locked INTEGER NOT NULL DEFAULT 0,
                    sticky INTEGER NOT NULL DEFAULT 0,
                    deleted INTEGER NOT NULL DEFAULT 0
                )
                ",
            ),
            (
                "forums_threads indexes",
                "CREATE INDEX IF NOT EXISTS idx_forums_threads_forum ON forums_threads(forum_id, deleted)",
            ),
            (
                "forums_threads topic index",
                "CREATE INDEX IF NOT EXISTS idx_forums_threads_topic ON forums_threads(lower(topic))",
            ),
            (
                "forums_posts table",
                r"
                CREATE TABLE IF NOT EXISTS forums_posts (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    thread_id INTEGER NOT NULL REFERENCES forums_threads(id),
                    poster_id INTEGER NOT NULL REFERENCES users(id),
                    contents TEXT NOT NULL,
                    time TEXT NOT NULL DEFAULT (datetime('now')),
                    sticky INTEGER NOT NULL DEFAULT 0,
                    edited_user_id INTEGER REFERENCES users(id),
                    edited_time TEXT,
                    deleted INTEGER NOT NULL DEFAULT 0
                )
                ",
            ),
            (
                "forums_posts indexes",
                "CREATE INDEX IF NOT EXISTS idx_forums_posts_thread ON forums_posts(thread_id, deleted)",
            ),
            (
                "forums_posts poster index",
                "CREATE INDEX IF NOT EXISTS idx_forums_posts_poster ON forums_posts(poster_id)",
            ),
            (
                "forums_posts_edit_history table",
                r"
                CREATE TABLE IF NOT EXISTS forums_posts_edit_history (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    post_id INTEGER NOT NULL REFERENCES forums_posts(id),
                    editor_id INTEGER REFERENCES users(id),
                    contents TEXT NOT NULL,
                    time TEXT NOT NULL DEFAULT (datetime('now'))
                )
                ",
            ),
            (
                "last_viewed_forum_posts table",
                r"
                CREATE TABLE IF NOT EXISTS last_viewed_forum_posts (
                    user_id INTEGER NOT NULL REFERENCES users(id),
                    thread_id INTEGER NOT NULL REFERENCES forums_threads(id),
                    post_id INTEGER REFERENCES forums_posts(id),
                    PRIMARY KEY (user_id, thread_id)
                )
                ",
            ),
            (
                "forums_forums_subscriptions table",
                r"
                CREATE TABLE IF NOT EXISTS forums_forums_subscriptions (
                    user_id INTEGER NOT NULL REFERENCES users(id),
                    forum_id INTEGER NOT NULL REFERENCES forums(id),
                    PRIMARY KEY (user_id, forum_id)
                )
                ",
            ),
            (
                "forums_threads_subscriptions table",
                r"
                CREATE TABLE IF NOT EXISTS forums_threads_subscriptions (
                    user_id INTEGER NOT NULL REFERENCES users(id),
                    thread_id INTEGER NOT NULL REFERENCES forums_threads(id),
                    PRIMARY KEY (user_id, thread_id)
                )
                ",
            ),
            (
                "forums_threads_notes table",
                r"
                CREATE TABLE IF NOT EXISTS forums_threads_notes (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    thread_id INTEGER NOT NULL REFERENCES forums_threads(id),
                    user_id INTEGER NOT NULL REFERENCES users(id),
                    note TEXT NOT NULL,
                    time TEXT NOT NULL DEFAULT (datetime('now'))
                )
                ",
            ),
        ],
    )
    .await
}

async fn run_migration_v3(pool: &SqlitePool) -> Result<()> {
    debug!("Running migration v3: polls");

    execute_all(
        pool,
        &[
            (
                "forums_polls table",
                r"
                CREATE TABLE IF NOT EXISTS forums_polls (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    thread_id INTEGER NOT NULL UNIQUE REFERENCES forums_threads(id),
                    question TEXT NOT NULL,
                    closed INTEGER NOT NULL DEFAULT 0,
                    featured INTEGER NOT NULL DEFAULT 0
                )
                ",
            ),
            (
                "forums_polls featured index",
                "CREATE UNIQUE INDEX IF NOT EXISTS idx_forums_polls_featured ON forums_polls(featured) WHERE featured = 1",
            ),
            (
                "forums_polls_choices table",
                r"
                CREATE TABLE IF NOT EXISTS forums_polls_choices (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    poll_id INTEGER NOT NULL REFERENCES forums_polls(id),
                    choice TEXT NOT NULL
                )
                ",
            ),
            (
                "forums_polls_answers table",
                r"
                CREATE TABLE IF NOT EXISTS forums_polls_answers (
                    poll_id INTEGER NOT NULL REFERENCES forums_polls(id),
                    user_id INTEGER NOT NULL REFERENCES users(id),
                    choice_id INTEGER NOT NULL REFERENCES forums_polls_choices(id) ON DELETE CASCADE,
                    PRIMARY KEY (poll_id, user_id)
                )
                ",
            ),
        ],
    )
    .await
}
