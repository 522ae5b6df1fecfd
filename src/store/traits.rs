//! `Database` trait: the async interface the bot uses for persistence.
//!
//! The validation/execution pipeline works on a raw session (a libSQL
//! connection) because it needs a transaction around a whole batch; every
//! other caller goes through the typed operations below.

use async_trait::async_trait;
use libsql::Connection;

use crate::error::DatabaseError;
use crate::organizer::{CatalogItem, EntityKind, Link, Subtask, Task, TaskStatus, User};

/// Live entities of one owner, grouped by kind, plus their links.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Catalog {
    pub sections: Vec<(EntityKind, Vec<CatalogItem>)>,
    pub links: Vec<Link>,
}

impl Catalog {
    pub fn items(&self, kind: EntityKind) -> &[CatalogItem] {
        self.sections
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, items)| items.as_slice())
            .unwrap_or(&[])
    }
}

/// Backend-agnostic database trait covering users and organizer entities.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    /// A session for one unit of work, with foreign keys enforced.
    async fn session(&self) -> Result<Connection, DatabaseError>;

    // ── Users ───────────────────────────────────────────────────────

    /// Register a chat identity (or refresh its display name).
    async fn upsert_user(
        &self,
        tg_id: i64,
        name: Option<&str>,
        last_name: Option<&str>,
    ) -> Result<User, DatabaseError>;

    async fn get_user_by_tg_id(&self, tg_id: i64) -> Result<Option<User>, DatabaseError>;

    // ── Tasks ───────────────────────────────────────────────────────

    /// Live tasks of the owner, newest first.
    async fn list_tasks(&self, owner_id: i64) -> Result<Vec<Task>, DatabaseError>;

    async fn get_task(&self, owner_id: i64, id: i64) -> Result<Option<Task>, DatabaseError>;

    async fn list_subtasks(&self, task_id: i64) -> Result<Vec<Subtask>, DatabaseError>;

    /// Move a live task one step forward (or back) through the status cycle.
    /// Returns the new status.
    async fn cycle_task_status(
        &self,
        owner_id: i64,
        id: i64,
        forward: bool,
    ) -> Result<TaskStatus, DatabaseError>;

    // ── Links & catalog ─────────────────────────────────────────────

    /// Link two entities of the owner. Linking twice is a no-op.
    async fn link_entities(
        &self,
        owner_id: i64,
        a: (EntityKind, i64),
        b: (EntityKind, i64),
    ) -> Result<(), DatabaseError>;

    async fn list_links(&self, owner_id: i64) -> Result<Vec<Link>, DatabaseError>;

    /// Everything the owner currently has, as shown to the model.
    async fn catalog(&self, owner_id: i64) -> Result<Catalog, DatabaseError>;
}
