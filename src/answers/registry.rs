//! Schema registry: per-kind add/edit schemas and storage metadata.
//!
//! Built once at startup and shared by reference with the validator, the
//! executor and the prompt builder, so all three agree on which kinds exist
//! and what their wire shape looks like.

use std::fmt::Write as _;

use crate::organizer::EntityKind;

/// Wire type of a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Text,
    Integer,
    Bool,
    Timestamp,
    Status,
    /// A list of nested objects (subtasks inside a new task).
    Nested(&'static [FieldSpec]),
}

impl FieldType {
    fn describe(self) -> String {
        match self {
            FieldType::Text => "string".into(),
            FieldType::Integer => "integer".into(),
            FieldType::Bool => "boolean".into(),
            FieldType::Timestamp => "\"YYYY-MM-DD HH:MM:SS\"".into(),
            FieldType::Status => "\"NEW\" | \"IN_PROGRESS\" | \"COMPLETED\"".into(),
            FieldType::Nested(fields) => format!("[{}]", render_object(fields)),
        }
    }
}

/// One field of an add or edit schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub ty: FieldType,
    pub required: bool,
}

const fn req(name: &'static str, ty: FieldType) -> FieldSpec {
    FieldSpec { name, ty, required: true }
}

const fn opt(name: &'static str, ty: FieldType) -> FieldSpec {
    FieldSpec { name, ty, required: false }
}

/// How rows of a kind are tied to their owning user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// Row carries `user_id` directly.
    User,
    /// Row carries `task_id`; ownership comes through the parent task.
    ParentTask,
}

/// Registry entry for one entity kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaEntry {
    pub kind: EntityKind,
    /// Batch key on the wire (`tasks`, `subtasks`, ...).
    pub key: &'static str,
    /// Human-facing model name used in messages and summaries.
    pub model: &'static str,
    pub table: &'static str,
    pub add_schema: &'static [FieldSpec],
    pub edit_schema: &'static [FieldSpec],
    /// Deletion flips `is_deleted` when true, removes the row otherwise.
    pub soft_delete: bool,
    /// Whether the kind appears in the delete batch.
    pub deletable: bool,
    pub ownership: Ownership,
}

const NESTED_SUBTASK: &[FieldSpec] = &[
    req("name", FieldType::Text),
    req("order", FieldType::Integer),
    opt("deadline", FieldType::Timestamp),
];

const TASK_ADD: &[FieldSpec] = &[
    req("name", FieldType::Text),
    opt("description", FieldType::Text),
    opt("status", FieldType::Status),
    opt("deadline", FieldType::Timestamp),
    opt("subtasks", FieldType::Nested(NESTED_SUBTASK)),
];
const TASK_EDIT: &[FieldSpec] = &[
    req("id", FieldType::Integer),
    opt("name", FieldType::Text),
    opt("description", FieldType::Text),
    opt("status", FieldType::Status),
    opt("deadline", FieldType::Timestamp),
];

const SUBTASK_ADD: &[FieldSpec] = &[
    req("task_id", FieldType::Integer),
    req("name", FieldType::Text),
    req("order", FieldType::Integer),
    opt("deadline", FieldType::Timestamp),
];
const SUBTASK_EDIT: &[FieldSpec] = &[
    req("id", FieldType::Integer),
    opt("name", FieldType::Text),
    opt("order", FieldType::Integer),
    opt("deadline", FieldType::Timestamp),
    opt("is_done", FieldType::Bool),
];

const EVENT_ADD: &[FieldSpec] = &[
    req("name", FieldType::Text),
    opt("description", FieldType::Text),
    opt("start_time", FieldType::Timestamp),
    opt("end_time", FieldType::Timestamp),
    opt("is_confirmed", FieldType::Bool),
];
const EVENT_EDIT: &[FieldSpec] = &[
    req("id", FieldType::Integer),
    opt("name", FieldType::Text),
    opt("description", FieldType::Text),
    opt("start_time", FieldType::Timestamp),
    opt("end_time", FieldType::Timestamp),
    opt("is_confirmed", FieldType::Bool),
];

const GOAL_ADD: &[FieldSpec] = &[
    req("name", FieldType::Text),
    opt("description", FieldType::Text),
    opt("deadline", FieldType::Timestamp),
    opt("is_confirmed", FieldType::Bool),
];
const GOAL_EDIT: &[FieldSpec] = &[
    req("id", FieldType::Integer),
    opt("name", FieldType::Text),
    opt("description", FieldType::Text),
    opt("deadline", FieldType::Timestamp),
    opt("is_confirmed", FieldType::Bool),
];

const IDEA_ADD: &[FieldSpec] = &[
    req("name", FieldType::Text),
    opt("description", FieldType::Text),
    opt("is_confirmed", FieldType::Bool),
];
const IDEA_EDIT: &[FieldSpec] = &[
    req("id", FieldType::Integer),
    opt("name", FieldType::Text),
    opt("description", FieldType::Text),
    opt("is_confirmed", FieldType::Bool),
];

const NOTE_ADD: &[FieldSpec] = &[req("name", FieldType::Text), opt("description", FieldType::Text)];
const NOTE_EDIT: &[FieldSpec] = &[
    req("id", FieldType::Integer),
    opt("name", FieldType::Text),
    opt("description", FieldType::Text),
];

const TAG_ADD: &[FieldSpec] = &[req("name", FieldType::Text)];
const TAG_EDIT: &[FieldSpec] = &[req("id", FieldType::Integer), opt("name", FieldType::Text)];

const DELETE_ENTRY: &[FieldSpec] = &[req("id", FieldType::Integer)];

/// Immutable mapping from entity kind to its schemas and storage model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaRegistry {
    entries: Vec<SchemaEntry>,
}

impl SchemaRegistry {
    /// The registry covering all seven kinds, in [`EntityKind::ALL`] order.
    pub fn standard() -> Self {
        let entries = EntityKind::ALL.iter().map(|&kind| standard_entry(kind)).collect();
        Self { entries }
    }

    /// Same registry with hard delete for `kind`, for stores whose table
    /// has no `is_deleted` column.
    pub fn without_soft_delete(mut self, kind: EntityKind) -> Self {
        self.entries[kind.index()].soft_delete = false;
        self
    }

    pub fn entry(&self, kind: EntityKind) -> &SchemaEntry {
        &self.entries[kind.index()]
    }

    /// Entries in fixed kind order.
    pub fn entries(&self) -> impl Iterator<Item = &SchemaEntry> {
        self.entries.iter()
    }

    /// Render the answer template shown to the model.
    pub fn answer_template(&self) -> String {
        let mut out = String::new();
        out.push_str("{\n");
        out.push_str("  \"result\": \"SUCCESS\" | \"ERROR\",\n");
        out.push_str("  \"error\": string | null,\n");
        out.push_str("  \"response\": {\n");

        out.push_str("    \"to_add\": {\n");
        self.render_batch(&mut out, |e| Some(e.add_schema));
        out.push_str("    },\n");

        out.push_str("    \"to_edit\": {\n");
        self.render_batch(&mut out, |e| Some(e.edit_schema));
        out.push_str("    },\n");

        out.push_str("    \"to_delete\": {\n");
        self.render_batch(&mut out, |e| e.deletable.then_some(DELETE_ENTRY));
        out.push_str("    }\n");

        out.push_str("  }\n}");
        out
    }

    fn render_batch(
        &self,
        out: &mut String,
        schema: impl Fn(&SchemaEntry) -> Option<&'static [FieldSpec]>,
    ) {
        let lines: Vec<String> = self
            .entries
            .iter()
            .filter_map(|e| {
                schema(e).map(|fields| format!("      \"{}\": [{}]", e.key, render_object(fields)))
            })
            .collect();
        out.push_str(&lines.join(",\n"));
        out.push('\n');
    }
}

fn standard_entry(kind: EntityKind) -> SchemaEntry {
    let (key, model, table, add_schema, edit_schema) = match kind {
        EntityKind::Task => ("tasks", "Task", "tasks", TASK_ADD, TASK_EDIT),
        EntityKind::Subtask => ("subtasks", "Subtask", "subtasks", SUBTASK_ADD, SUBTASK_EDIT),
        EntityKind::Event => ("events", "Event", "events", EVENT_ADD, EVENT_EDIT),
        EntityKind::Goal => ("goals", "Goal", "goals", GOAL_ADD, GOAL_EDIT),
        EntityKind::Idea => ("ideas", "Idea", "ideas", IDEA_ADD, IDEA_EDIT),
        EntityKind::Note => ("notes", "Note", "notes", NOTE_ADD, NOTE_EDIT),
        EntityKind::Tag => ("tags", "Tag", "tags", TAG_ADD, TAG_EDIT),
    };
    let ownership = match kind {
        EntityKind::Subtask => Ownership::ParentTask,
        _ => Ownership::User,
    };
    SchemaEntry {
        kind,
        key,
        model,
        table,
        add_schema,
        edit_schema,
        soft_delete: true,
        deletable: kind != EntityKind::Subtask,
        ownership,
    }
}

fn render_object(fields: &[FieldSpec]) -> String {
    let mut out = String::from("{");
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        let marker = if field.required { "" } else { "?" };
        let _ = write!(out, "\"{}\"{marker}: {}", field.name, field.ty.describe());
    }
    out.push('}');
    out
}

#[cfg(test)]
mod tests {
    use serde_json::{Map, Value, json};

    use super::*;
    use crate::answers::Answer;

    fn sample(ty: FieldType) -> Value {
        match ty {
            FieldType::Text => json!("sample"),
            FieldType::Integer => json!(1),
            FieldType::Bool => json!(true),
            FieldType::Timestamp => json!("2025-01-01 10:00:00"),
            FieldType::Status => json!("IN_PROGRESS"),
            FieldType::Nested(fields) => json!([sample_object(fields)]),
        }
    }

    fn sample_object(fields: &[FieldSpec]) -> Value {
        let map: Map<String, Value> = fields
            .iter()
            .map(|f| (f.name.to_string(), sample(f.ty)))
            .collect();
        Value::Object(map)
    }

    #[test]
    fn registry_is_exhaustive_and_ordered() {
        let registry = SchemaRegistry::standard();
        let kinds: Vec<_> = registry.entries().map(|e| e.kind).collect();
        assert_eq!(kinds, EntityKind::ALL.to_vec());
        for kind in EntityKind::ALL {
            assert_eq!(registry.entry(kind).kind, kind);
        }
        assert_eq!(registry.entry(EntityKind::Subtask).ownership, Ownership::ParentTask);
        assert!(!registry.entry(EntityKind::Subtask).deletable);
    }

    #[test]
    fn full_add_and_edit_schemas_parse() {
        let registry = SchemaRegistry::standard();
        for entry in registry.entries() {
            let answer = json!({
                "result": "SUCCESS",
                "response": {
                    "to_add": { entry.key: [sample_object(entry.add_schema)] },
                    "to_edit": { entry.key: [sample_object(entry.edit_schema)] },
                }
            });
            let parsed: Result<Answer, _> = serde_json::from_value(answer);
            assert!(parsed.is_ok(), "{} schema drifted: {:?}", entry.key, parsed.err());
        }
    }

    fn parses(key: &str, batch: &str, object: Value) -> bool {
        let answer = json!({
            "result": "SUCCESS",
            "response": { batch: { key: [object] } }
        });
        serde_json::from_value::<Answer>(answer).is_ok()
    }

    #[test]
    fn parser_accepts_no_field_missing_from_template() {
        let registry = SchemaRegistry::standard();
        let mut universe: Vec<&str> = vec!["id", "user_id", "is_deleted", "is_done", "task_id"];
        for entry in registry.entries() {
            for field in entry.add_schema.iter().chain(entry.edit_schema).chain(NESTED_SUBTASK) {
                if !universe.contains(&field.name) {
                    universe.push(field.name);
                }
            }
        }

        for entry in registry.entries() {
            let batches = [("to_add", entry.add_schema), ("to_edit", entry.edit_schema)];
            for (batch, schema) in batches {
                for &extra in universe.iter().filter(|n| !schema.iter().any(|f| f.name == **n)) {
                    let mut object = sample_object(schema);
                    // null is accepted for any known optional field
                    object.as_object_mut().unwrap().insert(extra.to_string(), Value::Null);
                    assert!(
                        !parses(entry.key, batch, object),
                        "{batch}.{} accepts {extra:?}, which the template does not list",
                        entry.key
                    );
                }
            }
        }

        for &extra in universe.iter().filter(|n| !NESTED_SUBTASK.iter().any(|f| f.name == **n)) {
            let mut nested = sample_object(NESTED_SUBTASK);
            nested.as_object_mut().unwrap().insert(extra.to_string(), Value::Null);
            let task = json!({ "name": "t", "subtasks": [nested] });
            assert!(!parses("tasks", "to_add", task), "nested subtask accepts {extra:?}");
        }

        for entry in registry.entries() {
            let object = sample_object(DELETE_ENTRY);
            assert_eq!(parses(entry.key, "to_delete", object), entry.deletable, "{}", entry.key);
        }
    }

    #[test]
    fn required_fields_are_really_required() {
        let registry = SchemaRegistry::standard();
        for entry in registry.entries() {
            for field in entry.add_schema.iter().filter(|f| f.required) {
                let mut object = sample_object(entry.add_schema);
                object.as_object_mut().unwrap().remove(field.name);
                let answer = json!({
                    "result": "SUCCESS",
                    "response": { "to_add": { entry.key: [object] } }
                });
                assert!(
                    serde_json::from_value::<Answer>(answer).is_err(),
                    "{}.{} should be required",
                    entry.key,
                    field.name
                );
            }
        }
    }

    #[test]
    fn template_lists_every_batch_key() {
        let registry = SchemaRegistry::standard();
        let template = registry.answer_template();
        for entry in registry.entries() {
            assert!(template.contains(&format!("\"{}\": [", entry.key)));
        }
        let delete_section = template.split("\"to_delete\"").nth(1).unwrap();
        assert!(!delete_section.contains("\"subtasks\""));
        assert!(template.contains("\"deadline\"?: \"YYYY-MM-DD HH:MM:SS\""));
    }

    #[test]
    fn hard_delete_override_touches_one_kind() {
        let registry = SchemaRegistry::standard().without_soft_delete(EntityKind::Note);
        assert!(!registry.entry(EntityKind::Note).soft_delete);
        assert!(registry.entry(EntityKind::Task).soft_delete);
    }
}
