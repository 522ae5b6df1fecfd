//! Version-tracked database migrations for the libSQL backend.
//!
//! Each migration has a version number and SQL. `run_migrations()` checks
//! the current version and applies only the new ones sequentially.

use libsql::Connection;

use crate::error::DatabaseError;

/// A single migration step.
struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// All migrations in order. Add new versions to the end.
static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "organizer_schema",
        sql: r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                tg_id INTEGER NOT NULL UNIQUE,
                name TEXT,
                last_name TEXT,
                created TEXT NOT NULL DEFAULT (datetime('now')),
                updated TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS tasks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                description TEXT,
                status TEXT NOT NULL DEFAULT 'NEW'
                    CHECK (status IN ('NEW', 'IN_PROGRESS', 'COMPLETED')),
                deadline TEXT,
                is_deleted INTEGER NOT NULL DEFAULT 0,
                created TEXT NOT NULL DEFAULT (datetime('now')),
                updated TEXT NOT NULL DEFAULT (datetime('now'))
            );
            CREATE INDEX IF NOT EXISTS idx_tasks_user ON tasks(user_id);

            CREATE TABLE IF NOT EXISTS subtasks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                task_id INTEGER NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                position INTEGER NOT NULL,
                deadline TEXT,
                is_done INTEGER NOT NULL DEFAULT 0,
                is_deleted INTEGER NOT NULL DEFAULT 0,
                created TEXT NOT NULL DEFAULT (datetime('now')),
                updated TEXT NOT NULL DEFAULT (datetime('now'))
            );
            CREATE INDEX IF NOT EXISTS idx_subtasks_task ON subtasks(task_id);

            CREATE TABLE IF NOT EXISTS events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                description TEXT,
                start_time TEXT,
                end_time TEXT,
                is_confirmed INTEGER NOT NULL DEFAULT 0,
                is_deleted INTEGER NOT NULL DEFAULT 0,
                created TEXT NOT NULL DEFAULT (datetime('now')),
                updated TEXT NOT NULL DEFAULT (datetime('now'))
            );
            CREATE INDEX IF NOT EXISTS idx_events_user ON events(user_id);

            CREATE TABLE IF NOT EXISTS goals (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                description TEXT,
                deadline TEXT,
                is_confirmed INTEGER NOT NULL DEFAULT 0,
                is_deleted INTEGER NOT NULL DEFAULT 0,
                created TEXT NOT NULL DEFAULT (datetime('now')),
                updated TEXT NOT NULL DEFAULT (datetime('now'))
            );
            CREATE INDEX IF NOT EXISTS idx_goals_user ON goals(user_id);

            CREATE TABLE IF NOT EXISTS ideas (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                description TEXT,
                is_confirmed INTEGER NOT NULL DEFAULT 0,
                is_deleted INTEGER NOT NULL DEFAULT 0,
                created TEXT NOT NULL DEFAULT (datetime('now')),
                updated TEXT NOT NULL DEFAULT (datetime('now'))
            );
            CREATE INDEX IF NOT EXISTS idx_ideas_user ON ideas(user_id);

            CREATE TABLE IF NOT EXISTS notes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                description TEXT,
                is_deleted INTEGER NOT NULL DEFAULT 0,
                created TEXT NOT NULL DEFAULT (datetime('now')),
                updated TEXT NOT NULL DEFAULT (datetime('now'))
            );
            CREATE INDEX IF NOT EXISTS idx_notes_user ON notes(user_id);

            CREATE TABLE IF NOT EXISTS tags (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                is_deleted INTEGER NOT NULL DEFAULT 0,
                created TEXT NOT NULL DEFAULT (datetime('now')),
                updated TEXT NOT NULL DEFAULT (datetime('now')),
                UNIQUE (user_id, name)
            );
        "#,
    },
    Migration {
        version: 2,
        name: "entity_links",
        sql: r#"
            CREATE TABLE IF NOT EXISTS task_event (
                task_id INTEGER NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
                event_id INTEGER NOT NULL REFERENCES events(id) ON DELETE CASCADE,
                PRIMARY KEY (task_id, event_id)
            );
            CREATE TABLE IF NOT EXISTS task_goal (
                task_id INTEGER NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
                goal_id INTEGER NOT NULL REFERENCES goals(id) ON DELETE CASCADE,
                PRIMARY KEY (task_id, goal_id)
            );
            CREATE TABLE IF NOT EXISTS task_idea (
                task_id INTEGER NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
                idea_id INTEGER NOT NULL REFERENCES ideas(id) ON DELETE CASCADE,
                PRIMARY KEY (task_id, idea_id)
            );
            CREATE TABLE IF NOT EXISTS task_note (
                task_id INTEGER NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
                note_id INTEGER NOT NULL REFERENCES notes(id) ON DELETE CASCADE,
                PRIMARY KEY (task_id, note_id)
            );
            CREATE TABLE IF NOT EXISTS task_tag (
                task_id INTEGER NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
                tag_id INTEGER NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
                PRIMARY KEY (task_id, tag_id)
            );
            CREATE TABLE IF NOT EXISTS event_goal (
                event_id INTEGER NOT NULL REFERENCES events(id) ON DELETE CASCADE,
                goal_id INTEGER NOT NULL REFERENCES goals(id) ON DELETE CASCADE,
                PRIMARY KEY (event_id, goal_id)
            );
            CREATE TABLE IF NOT EXISTS event_idea (
                event_id INTEGER NOT NULL REFERENCES events(id) ON DELETE CASCADE,
                idea_id INTEGER NOT NULL REFERENCES ideas(id) ON DELETE CASCADE,
                PRIMARY KEY (event_id, idea_id)
            );
            CREATE TABLE IF NOT EXISTS event_note (
                event_id INTEGER NOT NULL REFERENCES events(id) ON DELETE CASCADE,
                note_id INTEGER NOT NULL REFERENCES notes(id) ON DELETE CASCADE,
                PRIMARY KEY (event_id, note_id)
            );
            CREATE TABLE IF NOT EXISTS event_tag (
                event_id INTEGER NOT NULL REFERENCES events(id) ON DELETE CASCADE,
                tag_id INTEGER NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
                PRIMARY KEY (event_id, tag_id)
            );
            CREATE TABLE IF NOT EXISTS goal_idea (
                goal_id INTEGER NOT NULL REFERENCES goals(id) ON DELETE CASCADE,
                idea_id INTEGER NOT NULL REFERENCES ideas(id) ON DELETE CASCADE,
                PRIMARY KEY (goal_id, idea_id)
            );
            CREATE TABLE IF NOT EXISTS goal_note (
                goal_id INTEGER NOT NULL REFERENCES goals(id) ON DELETE CASCADE,
                note_id INTEGER NOT NULL REFERENCES notes(id) ON DELETE CASCADE,
                PRIMARY KEY (goal_id, note_id)
            );
            CREATE TABLE IF NOT EXISTS goal_tag (
                goal_id INTEGER NOT NULL REFERENCES goals(id) ON DELETE CASCADE,
                tag_id INTEGER NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
                PRIMARY KEY (goal_id, tag_id)
            );
            CREATE TABLE IF NOT EXISTS idea_note (
                idea_id INTEGER NOT NULL REFERENCES ideas(id) ON DELETE CASCADE,
                note_id INTEGER NOT NULL REFERENCES notes(id) ON DELETE CASCADE,
                PRIMARY KEY (idea_id, note_id)
            );
            CREATE TABLE IF NOT EXISTS idea_tag (
                idea_id INTEGER NOT NULL REFERENCES ideas(id) ON DELETE CASCADE,
                tag_id INTEGER NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
                PRIMARY KEY (idea_id, tag_id)
            );
            CREATE TABLE IF NOT EXISTS note_tag (
                note_id INTEGER NOT NULL REFERENCES notes(id) ON DELETE CASCADE,
                tag_id INTEGER NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
                PRIMARY KEY (note_id, tag_id)
            );
        "#,
    },
    Migration {
        version: 3,
        name: "live_tag_names",
        // A table-level UNIQUE cannot be dropped in SQLite, so the table is
        // rebuilt. Foreign keys stay off while `tags` is swapped so the
        // link tables keep their rows.
        sql: r#"
            PRAGMA foreign_keys = OFF;

            CREATE TABLE tags_v3 (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                is_deleted INTEGER NOT NULL DEFAULT 0,
                created TEXT NOT NULL DEFAULT (datetime('now')),
                updated TEXT NOT NULL DEFAULT (datetime('now'))
            );
            INSERT INTO tags_v3 (id, user_id, name, is_deleted, created, updated)
                SELECT id, user_id, name, is_deleted, created, updated FROM tags;
            DROP TABLE tags;
            ALTER TABLE tags_v3 RENAME TO tags;

            CREATE INDEX IF NOT EXISTS idx_tags_user ON tags(user_id);
            CREATE UNIQUE INDEX IF NOT EXISTS idx_tags_live_name
                ON tags(user_id, name) WHERE is_deleted = 0;

            PRAGMA foreign_keys = ON;
        "#,
    },
];

/// Run all pending migrations against the given connection.
///
/// Creates the `_migrations` table if it doesn't exist.
pub async fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        (),
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to create _migrations table: {e}")))?;

    let current_version = get_current_version(conn).await?;

    for migration in MIGRATIONS {
        if migration.version > current_version {
            tracing::info!(
                version = migration.version,
                name = migration.name,
                "Applying migration"
            );
            conn.execute_batch(migration.sql).await.map_err(|e| {
                DatabaseError::Migration(format!(
                    "Migration V{} ({}) failed: {e}",
                    migration.version, migration.name
                ))
            })?;
            seed_version(conn, migration.version, migration.name).await?;
        }
    }

    let version = get_current_version(conn).await?;
    tracing::info!(version, "Database migrations complete");
    Ok(())
}

/// Get the highest applied migration version, or 0 if none.
async fn get_current_version(conn: &Connection) -> Result<i64, DatabaseError> {
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM _migrations", ())
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to query migration version: {e}")))?;

    let row = rows
        .next()
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to read migration version: {e}")))?;

    match row {
        Some(row) => row.get::<i64>(0).map_err(|e| {
            DatabaseError::Migration(format!("Failed to parse migration version: {e}"))
        }),
        None => Ok(0),
    }
}

/// Insert a version record into `_migrations`.
async fn seed_version(conn: &Connection, version: i64, name: &str) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT OR IGNORE INTO _migrations (version, name) VALUES (?1, ?2)",
        libsql::params![version, name],
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to record migration V{version}: {e}")))?;
    Ok(())
}
