//! libSQL backend: async `Database` trait implementation.
//!
//! Supports local file and in-memory databases. File databases hand out a
//! fresh connection per session; an in-memory database only exists on its
//! original connection, so sessions share it.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use libsql::{Connection, Database as LibSqlDatabase};
use tracing::{debug, info};

use crate::answers::SchemaRegistry;
use crate::error::DatabaseError;
use crate::organizer::{EntityKind, Link, Subtask, Task, TaskStatus, User};
use crate::store::migrations;
use crate::store::organizer;
use crate::store::traits::{Catalog, Database};

/// libSQL database backend.
pub struct LibSqlBackend {
    db: Arc<LibSqlDatabase>,
    conn: Connection,
    in_memory: bool,
    registry: SchemaRegistry,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
            in_memory: false,
            registry: SchemaRegistry::standard(),
        };
        backend.init_schema().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests and the local CLI).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
            in_memory: true,
            registry: SchemaRegistry::standard(),
        };
        backend.init_schema().await?;
        Ok(backend)
    }

    async fn init_schema(&self) -> Result<(), DatabaseError> {
        enable_foreign_keys(&self.conn).await?;
        migrations::run_migrations(&self.conn).await
    }
}

async fn enable_foreign_keys(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;")
        .await
        .map_err(|e| DatabaseError::Pool(format!("Failed to configure connection: {e}")))?;
    Ok(())
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl Database for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(&self.conn).await
    }

    async fn session(&self) -> Result<Connection, DatabaseError> {
        if self.in_memory {
            return Ok(self.conn.clone());
        }
        let conn = self
            .db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;
        enable_foreign_keys(&conn).await?;
        debug!("Opened database session");
        Ok(conn)
    }

    async fn upsert_user(
        &self,
        tg_id: i64,
        name: Option<&str>,
        last_name: Option<&str>,
    ) -> Result<User, DatabaseError> {
        let user = organizer::upsert_user(&self.conn, tg_id, name, last_name).await?;
        debug!(user_id = user.id, tg_id, "User registered");
        Ok(user)
    }

    async fn get_user_by_tg_id(&self, tg_id: i64) -> Result<Option<User>, DatabaseError> {
        organizer::get_user_by_tg_id(&self.conn, tg_id).await
    }

    async fn list_tasks(&self, owner_id: i64) -> Result<Vec<Task>, DatabaseError> {
        organizer::list_tasks(&self.conn, owner_id).await
    }

    async fn get_task(&self, owner_id: i64, id: i64) -> Result<Option<Task>, DatabaseError> {
        organizer::get_task(&self.conn, owner_id, id).await
    }

    async fn list_subtasks(&self, task_id: i64) -> Result<Vec<Subtask>, DatabaseError> {
        organizer::list_subtasks(&self.conn, task_id).await
    }

    async fn cycle_task_status(
        &self,
        owner_id: i64,
        id: i64,
        forward: bool,
    ) -> Result<TaskStatus, DatabaseError> {
        let task = organizer::get_task(&self.conn, owner_id, id)
            .await?
            .filter(|t| !t.is_deleted)
            .ok_or_else(|| DatabaseError::NotFound {
                entity: "Task".into(),
                id: id.to_string(),
            })?;
        let status = if forward {
            task.status.next()
        } else {
            task.status.prev()
        };
        organizer::set_task_status(&self.conn, id, status).await?;
        debug!(task_id = id, %status, "Task status changed");
        Ok(status)
    }

    async fn link_entities(
        &self,
        owner_id: i64,
        a: (EntityKind, i64),
        b: (EntityKind, i64),
    ) -> Result<(), DatabaseError> {
        for (kind, id) in [a, b] {
            let entry = self.registry.entry(kind);
            if !organizer::owned_row_exists(&self.conn, entry, owner_id, id, true).await? {
                return Err(DatabaseError::NotFound {
                    entity: entry.model.to_string(),
                    id: id.to_string(),
                });
            }
        }
        organizer::link_entities(&self.conn, a, b).await
    }

    async fn list_links(&self, owner_id: i64) -> Result<Vec<Link>, DatabaseError> {
        organizer::list_links(&self.conn, &self.registry, owner_id).await
    }

    async fn catalog(&self, owner_id: i64) -> Result<Catalog, DatabaseError> {
        let mut sections = Vec::new();
        for entry in self.registry.entries() {
            let items = organizer::catalog(&self.conn, entry, owner_id).await?;
            sections.push((entry.kind, items));
        }
        let links = organizer::list_links(&self.conn, &self.registry, owner_id).await?;
        Ok(Catalog { sections, links })
    }
}
