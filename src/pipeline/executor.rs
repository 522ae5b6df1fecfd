//! Executor: applies a validated payload inside one transaction.
//!
//! Phases run Add, then Edit, then Delete. Rows that vanished (or changed
//! owner) between validation and execution are skipped silently. Any
//! storage failure rolls the whole batch back.

use libsql::Connection;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::answers::{NewEntry, Response, SchemaRegistry, ToAdd, ToDelete, ToEdit};
use crate::error::{DatabaseError, PipelineError};
use crate::organizer::EntityKind;
use crate::store::organizer::{
    delete_entity, entity_name, insert_entity, owned_row_exists, update_entity,
};

/// One touched row, as reported back to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemDescriptor {
    #[serde(rename = "type")]
    pub model: String,
    pub name: String,
    pub id: i64,
}

/// Everything one execution added, updated and deleted, in phase order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionSummary {
    pub added: Vec<ItemDescriptor>,
    pub updated: Vec<ItemDescriptor>,
    pub deleted: Vec<ItemDescriptor>,
}

impl ExecutionSummary {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }
}

/// Kinds added after tasks and subtasks, in registry order.
const SIMPLE_KINDS: [EntityKind; 5] = [
    EntityKind::Event,
    EntityKind::Goal,
    EntityKind::Idea,
    EntityKind::Note,
    EntityKind::Tag,
];

pub struct Executor<'r> {
    registry: &'r SchemaRegistry,
}

impl<'r> Executor<'r> {
    pub fn new(registry: &'r SchemaRegistry) -> Self {
        Self { registry }
    }

    /// Apply `response` for `owner_id` atomically.
    pub async fn execute(
        &self,
        conn: &Connection,
        response: &Response,
        owner_id: i64,
    ) -> Result<ExecutionSummary, PipelineError> {
        let tx = conn
            .transaction()
            .await
            .map_err(|e| PipelineError::Execution(DatabaseError::from_libsql("begin", e)))?;

        match self.apply(&tx, response, owner_id).await {
            Ok(summary) => {
                tx.commit()
                    .await
                    .map_err(|e| PipelineError::Execution(DatabaseError::from_libsql("commit", e)))?;
                info!(
                    owner_id,
                    added = summary.added.len(),
                    updated = summary.updated.len(),
                    deleted = summary.deleted.len(),
                    "Batch committed"
                );
                Ok(summary)
            }
            Err(e) => {
                warn!(owner_id, error = %e, "Batch failed, rolling back");
                if let Err(rollback) = tx.rollback().await {
                    warn!(error = %rollback, "Rollback failed");
                }
                Err(PipelineError::Execution(e))
            }
        }
    }

    async fn apply(
        &self,
        conn: &Connection,
        response: &Response,
        owner_id: i64,
    ) -> Result<ExecutionSummary, DatabaseError> {
        let mut summary = ExecutionSummary::default();
        if let Some(batch) = &response.to_add {
            self.add_phase(conn, batch, owner_id, &mut summary.added).await?;
        }
        if let Some(batch) = &response.to_edit {
            self.edit_phase(conn, batch, owner_id, &mut summary.updated).await?;
        }
        if let Some(batch) = &response.to_delete {
            self.delete_phase(conn, batch, owner_id, &mut summary.deleted).await?;
        }
        Ok(summary)
    }

    async fn add_phase(
        &self,
        conn: &Connection,
        batch: &ToAdd,
        owner_id: i64,
        added: &mut Vec<ItemDescriptor>,
    ) -> Result<(), DatabaseError> {
        for entry in batch.entries_for(EntityKind::Task) {
            let task_id = self.insert(conn, &entry, owner_id, added).await?;
            if let NewEntry::Task(task) = entry {
                for nested in task.nested_entries(task_id) {
                    self.insert(conn, &nested, owner_id, added).await?;
                }
            }
        }

        let tasks = self.registry.entry(EntityKind::Task);
        for entry in batch.entries_for(EntityKind::Subtask) {
            if let NewEntry::Subtask(subtask) = &entry
                && !owned_row_exists(conn, tasks, owner_id, subtask.task_id, true).await?
            {
                debug!(task_id = subtask.task_id, "Parent task gone, skipping subtask");
                continue;
            }
            self.insert(conn, &entry, owner_id, added).await?;
        }

        for kind in SIMPLE_KINDS {
            for entry in batch.entries_for(kind) {
                self.insert(conn, &entry, owner_id, added).await?;
            }
        }
        Ok(())
    }

    async fn insert(
        &self,
        conn: &Connection,
        entry: &NewEntry<'_>,
        owner_id: i64,
        added: &mut Vec<ItemDescriptor>,
    ) -> Result<i64, DatabaseError> {
        let schema = self.registry.entry(entry.kind());
        let id = insert_entity(conn, schema, owner_id, &entry.fields()).await?;
        added.push(ItemDescriptor {
            model: schema.model.to_string(),
            name: entry.name().to_string(),
            id,
        });
        Ok(id)
    }

    async fn edit_phase(
        &self,
        conn: &Connection,
        batch: &ToEdit,
        owner_id: i64,
        updated: &mut Vec<ItemDescriptor>,
    ) -> Result<(), DatabaseError> {
        for schema in self.registry.entries() {
            for edit in batch.entries_for(schema.kind) {
                let id = edit.id();
                if !owned_row_exists(conn, schema, owner_id, id, false).await? {
                    debug!(kind = %schema.kind, id, "Edit target gone, skipping");
                    continue;
                }
                update_entity(conn, schema, id, &edit.changes()).await?;
                let name = entity_name(conn, schema, id).await?.unwrap_or_default();
                updated.push(ItemDescriptor {
                    model: schema.model.to_string(),
                    name,
                    id,
                });
            }
        }
        Ok(())
    }

    async fn delete_phase(
        &self,
        conn: &Connection,
        batch: &ToDelete,
        owner_id: i64,
        deleted: &mut Vec<ItemDescriptor>,
    ) -> Result<(), DatabaseError> {
        for schema in self.registry.entries().filter(|e| e.deletable) {
            for id in batch.ids_for(schema.kind) {
                if !owned_row_exists(conn, schema, owner_id, id, false).await? {
                    debug!(kind = %schema.kind, id, "Delete target gone, skipping");
                    continue;
                }
                let name = entity_name(conn, schema, id).await?.unwrap_or_default();
                delete_entity(conn, schema, id).await?;
                deleted.push(ItemDescriptor {
                    model: schema.model.to_string(),
                    name,
                    id,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::answers::Answer;
    use crate::organizer::TaskStatus;
    use crate::pipeline::validator::Validator;
    use crate::store::organizer::{catalog, get_task, list_subtasks, owned_row_exists};
    use crate::store::{Database, LibSqlBackend};

    async fn setup() -> (Connection, i64) {
        let db = LibSqlBackend::new_memory().await.unwrap();
        let owner = db.upsert_user(1, Some("Ann"), None).await.unwrap().id;
        (db.session().await.unwrap(), owner)
    }

    fn response(json: &str) -> Response {
        let answer: Answer = serde_json::from_str(json).unwrap();
        answer.response.unwrap()
    }

    async fn run(
        registry: &SchemaRegistry,
        conn: &Connection,
        owner: i64,
        json: &str,
    ) -> Result<ExecutionSummary, PipelineError> {
        Executor::new(registry).execute(conn, &response(json), owner).await
    }

    #[tokio::test]
    async fn buy_milk_creates_task_and_subtask() {
        let registry = SchemaRegistry::standard();
        let (conn, owner) = setup().await;
        let summary = run(
            &registry,
            &conn,
            owner,
            r#"{"result":"SUCCESS","response":{"to_add":{"tasks":[{"name":"Buy milk","subtasks":[{"name":"Go to store","order":1}]}]}}}"#,
        )
        .await
        .unwrap();

        assert_eq!(summary.added.len(), 2);
        assert_eq!(summary.added[0].model, "Task");
        assert_eq!(summary.added[0].name, "Buy milk");
        assert_eq!(summary.added[1].model, "Subtask");
        assert_eq!(summary.added[1].name, "Go to store");
        assert!(summary.updated.is_empty() && summary.deleted.is_empty());

        let task = get_task(&conn, owner, summary.added[0].id).await.unwrap().unwrap();
        assert_eq!(task.user_id, owner);
        let subtasks = list_subtasks(&conn, task.id).await.unwrap();
        assert_eq!(subtasks.len(), 1);
        assert_eq!(subtasks[0].id, summary.added[1].id);
        assert_eq!(subtasks[0].position, 1);
    }

    #[tokio::test]
    async fn reported_ids_are_real() {
        let registry = SchemaRegistry::standard();
        let (conn, owner) = setup().await;
        let summary = run(
            &registry,
            &conn,
            owner,
            r#"{"result":"SUCCESS","response":{"to_add":{"events":[{"name":"Dentist","start_time":"2025-05-02 14:00:00"}],"tags":[{"name":"health"}]}}}"#,
        )
        .await
        .unwrap();

        for item in &summary.added {
            let kind = if item.model == "Event" { EntityKind::Event } else { EntityKind::Tag };
            assert!(
                owned_row_exists(&conn, registry.entry(kind), owner, item.id, true)
                    .await
                    .unwrap()
            );
        }
    }

    #[tokio::test]
    async fn subtask_added_to_task_from_previous_message() {
        let registry = SchemaRegistry::standard();
        let (conn, owner) = setup().await;
        let first = run(
            &registry,
            &conn,
            owner,
            r#"{"result":"SUCCESS","response":{"to_add":{"tasks":[{"name":"Plan trip"}]}}}"#,
        )
        .await
        .unwrap();
        let task_id = first.added[0].id;

        let raw = format!(
            r#"{{"result":"SUCCESS","response":{{"to_add":{{"subtasks":[{{"task_id":{task_id},"name":"Book hotel","order":2}}]}}}}}}"#
        );
        let validation = Validator::new(&registry).validate(&raw, &conn, owner).await.unwrap();
        assert!(validation.is_valid, "{:?}", validation.errors);

        let second = Executor::new(&registry)
            .execute(&conn, validation.payload().unwrap(), owner)
            .await
            .unwrap();
        assert_eq!(second.added[0].model, "Subtask");
        assert_eq!(list_subtasks(&conn, task_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn nested_subtask_ids_from_add_summary_are_editable() {
        let registry = SchemaRegistry::standard();
        let (conn, owner) = setup().await;
        let first = run(
            &registry,
            &conn,
            owner,
            r#"{"result":"SUCCESS","response":{"to_add":{"tasks":[{"name":"Move flat","subtasks":[{"name":"Pack books","order":1},{"name":"Call movers","order":2}]}]}}}"#,
        )
        .await
        .unwrap();
        assert_eq!(first.added.len(), 3);
        let task_id = first.added[0].id;
        let pack = &first.added[1];
        let call = &first.added[2];
        assert_eq!((pack.model.as_str(), call.model.as_str()), ("Subtask", "Subtask"));

        let raw = format!(
            r#"{{"result":"SUCCESS","response":{{"to_edit":{{"subtasks":[{{"id":{},"is_done":true}}]}}}}}}"#,
            call.id
        );
        let validation = Validator::new(&registry).validate(&raw, &conn, owner).await.unwrap();
        assert!(validation.is_valid, "{:?}", validation.errors);
        let second = Executor::new(&registry)
            .execute(&conn, validation.payload().unwrap(), owner)
            .await
            .unwrap();
        assert_eq!(
            second.updated,
            vec![ItemDescriptor { model: "Subtask".into(), name: "Call movers".into(), id: call.id }]
        );

        let subtasks = list_subtasks(&conn, task_id).await.unwrap();
        let done: Vec<(i64, bool)> = subtasks.iter().map(|s| (s.id, s.is_done)).collect();
        assert_eq!(done.len(), 2);
        assert!(done.contains(&(pack.id, false)));
        assert!(done.contains(&(call.id, true)));
    }

    #[tokio::test]
    async fn deleted_tag_name_can_be_added_again() {
        let registry = SchemaRegistry::standard();
        let (conn, owner) = setup().await;
        let added = run(
            &registry,
            &conn,
            owner,
            r#"{"result":"SUCCESS","response":{"to_add":{"tags":[{"name":"work"}]}}}"#,
        )
        .await
        .unwrap();
        let old_id = added.added[0].id;
        run(
            &registry,
            &conn,
            owner,
            &format!(r#"{{"result":"SUCCESS","response":{{"to_delete":{{"tags":[{{"id":{old_id}}}]}}}}}}"#),
        )
        .await
        .unwrap();

        let again = run(
            &registry,
            &conn,
            owner,
            r#"{"result":"SUCCESS","response":{"to_add":{"tags":[{"name":"work"}],"notes":[{"name":"Standup"}]}}}"#,
        )
        .await
        .unwrap();
        assert_eq!(again.added.len(), 2);
        let tags = catalog(&conn, registry.entry(EntityKind::Tag), owner).await.unwrap();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].name, "work");
        assert_ne!(tags[0].id, old_id);
    }

    #[tokio::test]
    async fn partial_edit_leaves_other_fields() {
        let registry = SchemaRegistry::standard();
        let (conn, owner) = setup().await;
        let added = run(
            &registry,
            &conn,
            owner,
            r#"{"result":"SUCCESS","response":{"to_add":{"tasks":[{"name":"Report","description":"Q3 numbers","deadline":"2025-09-30 18:00:00"}]}}}"#,
        )
        .await
        .unwrap();
        let id = added.added[0].id;
        let before = get_task(&conn, owner, id).await.unwrap().unwrap();

        let summary = run(
            &registry,
            &conn,
            owner,
            &format!(
                r#"{{"result":"SUCCESS","response":{{"to_edit":{{"tasks":[{{"id":{id},"status":"COMPLETED","name":null}}]}}}}}}"#
            ),
        )
        .await
        .unwrap();
        assert_eq!(summary.updated[0].name, "Report");

        let after = get_task(&conn, owner, id).await.unwrap().unwrap();
        assert_eq!(after.status, TaskStatus::Completed);
        assert_eq!(after.name, before.name);
        assert_eq!(after.description, before.description);
        assert_eq!(after.deadline, before.deadline);
        assert_eq!(after.user_id, owner);
        assert!(after.updated >= before.updated);
    }

    #[tokio::test]
    async fn edit_reports_new_name() {
        let registry = SchemaRegistry::standard();
        let (conn, owner) = setup().await;
        let added = run(
            &registry,
            &conn,
            owner,
            r#"{"result":"SUCCESS","response":{"to_add":{"notes":[{"name":"Draft"}]}}}"#,
        )
        .await
        .unwrap();
        let id = added.added[0].id;
        let summary = run(
            &registry,
            &conn,
            owner,
            &format!(
                r#"{{"result":"SUCCESS","response":{{"to_edit":{{"notes":[{{"id":{id},"name":"Final"}}]}}}}}}"#
            ),
        )
        .await
        .unwrap();
        assert_eq!(
            summary.updated,
            vec![ItemDescriptor { model: "Note".into(), name: "Final".into(), id }]
        );
    }

    #[tokio::test]
    async fn soft_delete_is_idempotent() {
        let registry = SchemaRegistry::standard();
        let (conn, owner) = setup().await;
        let added = run(
            &registry,
            &conn,
            owner,
            r#"{"result":"SUCCESS","response":{"to_add":{"ideas":[{"name":"Podcast"}]}}}"#,
        )
        .await
        .unwrap();
        let id = added.added[0].id;
        let delete = format!(
            r#"{{"result":"SUCCESS","response":{{"to_delete":{{"ideas":[{{"id":{id}}}]}}}}}}"#
        );

        let first = run(&registry, &conn, owner, &delete).await.unwrap();
        let second = run(&registry, &conn, owner, &delete).await.unwrap();
        assert_eq!(first.deleted.len(), 1);
        assert_eq!(second.deleted.len(), 1);

        let ideas = registry.entry(EntityKind::Idea);
        assert!(owned_row_exists(&conn, ideas, owner, id, false).await.unwrap());
        assert!(!owned_row_exists(&conn, ideas, owner, id, true).await.unwrap());
    }

    #[tokio::test]
    async fn hard_delete_when_kind_has_no_flag() {
        let registry = SchemaRegistry::standard().without_soft_delete(EntityKind::Tag);
        let (conn, owner) = setup().await;
        let added = run(
            &registry,
            &conn,
            owner,
            r#"{"result":"SUCCESS","response":{"to_add":{"tags":[{"name":"temp"}]}}}"#,
        )
        .await
        .unwrap();
        let id = added.added[0].id;
        let summary = run(
            &registry,
            &conn,
            owner,
            &format!(r#"{{"result":"SUCCESS","response":{{"to_delete":{{"tags":[{{"id":{id}}}]}}}}}}"#),
        )
        .await
        .unwrap();
        assert_eq!(summary.deleted[0].name, "temp");
        assert!(
            !owned_row_exists(&conn, registry.entry(EntityKind::Tag), owner, id, false)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn failure_rolls_back_everything() {
        let registry = SchemaRegistry::standard();
        let (conn, owner) = setup().await;
        let err = run(
            &registry,
            &conn,
            owner,
            r#"{"result":"SUCCESS","response":{"to_add":{"tasks":[{"name":"Should vanish"}],"tags":[{"name":"x"},{"name":"y"},{"name":"x"},{"name":"z"}]}}}"#,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, PipelineError::Execution(DatabaseError::Constraint(_))), "{err:?}");

        for kind in [EntityKind::Task, EntityKind::Tag] {
            assert!(catalog(&conn, registry.entry(kind), owner).await.unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn vanished_targets_are_skipped() {
        let registry = SchemaRegistry::standard();
        let (conn, owner) = setup().await;
        let summary = run(
            &registry,
            &conn,
            owner,
            r#"{"result":"SUCCESS","response":{
                "to_add":{"subtasks":[{"task_id":4242,"name":"orphan","order":1}]},
                "to_edit":{"goals":[{"id":4243,"name":"ghost"}]},
                "to_delete":{"events":[{"id":4244}]}
            }}"#,
        )
        .await
        .unwrap();
        assert!(summary.is_empty());
    }

    #[tokio::test]
    async fn phases_run_add_edit_delete() {
        let registry = SchemaRegistry::standard();
        let (conn, owner) = setup().await;
        let seeded = run(
            &registry,
            &conn,
            owner,
            r#"{"result":"SUCCESS","response":{"to_add":{"goals":[{"name":"Read more"}]}}}"#,
        )
        .await
        .unwrap();
        let goal = seeded.added[0].id;

        let summary = run(
            &registry,
            &conn,
            owner,
            &format!(
                r#"{{"result":"SUCCESS","response":{{
                    "to_delete":{{"goals":[{{"id":{goal}}}]}},
                    "to_edit":{{"goals":[{{"id":{goal},"is_confirmed":true}}]}},
                    "to_add":{{"goals":[{{"name":"Read 12 books"}}]}}
                }}}}"#
            ),
        )
        .await
        .unwrap();
        assert_eq!(summary.added[0].name, "Read 12 books");
        assert_eq!(summary.updated[0].id, goal);
        assert_eq!(summary.deleted[0].id, goal);

        let live = catalog(&conn, registry.entry(EntityKind::Goal), owner).await.unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].name, "Read 12 books");
    }

    #[test]
    fn descriptor_serializes_type_key() {
        let item = ItemDescriptor { model: "Task".into(), name: "Buy milk".into(), id: 3 };
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json, serde_json::json!({"type": "Task", "name": "Buy milk", "id": 3}));
    }
}
