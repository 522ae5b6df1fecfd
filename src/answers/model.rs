//! Wire schema of the model's answer.
//!
//! Every object rejects unknown keys, so a hallucinated field is a parse
//! failure rather than something silently dropped. Optional fields accept
//! both absence and `null`; the two are indistinguishable after parsing.

use serde::{Deserialize, Serialize};

use crate::organizer::{EntityKind, TaskStatus, WireDateTime};

/// Envelope result code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResultCode {
    Success,
    Error,
}

/// Top-level answer envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Answer {
    pub result: ResultCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Response>,
}

impl Answer {
    /// True when the model declined to act: an ERROR result, or no payload.
    pub fn is_declined(&self) -> bool {
        self.result == ResultCode::Error || self.response.is_none()
    }

    /// The payload to execute, if the model did not decline.
    pub fn payload(&self) -> Option<&Response> {
        if self.is_declined() {
            None
        } else {
            self.response.as_ref()
        }
    }
}

/// The three batches of one answer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Response {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_add: Option<ToAdd>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_edit: Option<ToEdit>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_delete: Option<ToDelete>,
}

impl Response {
    /// True when no batch carries any entry.
    pub fn is_empty(&self) -> bool {
        let adds = self.to_add.as_ref().is_none_or(|b| {
            EntityKind::ALL.iter().all(|k| b.entries_for(*k).is_empty())
        });
        let edits = self.to_edit.as_ref().is_none_or(|b| {
            EntityKind::ALL.iter().all(|k| b.entries_for(*k).is_empty())
        });
        let deletes = self.to_delete.as_ref().is_none_or(|b| {
            EntityKind::ALL.iter().all(|k| b.ids_for(*k).is_empty())
        });
        adds && edits && deletes
    }
}

// ── Add schemas ─────────────────────────────────────────────────────

/// Subtask nested inside a brand-new task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NestedSubtaskAdd {
    pub name: String,
    pub order: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<WireDateTime>,
}

/// Subtask attached to a task that already exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubtaskAdd {
    pub task_id: i64,
    pub name: String,
    pub order: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<WireDateTime>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskAdd {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<WireDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtasks: Option<Vec<NestedSubtaskAdd>>,
}

impl TaskAdd {
    /// Nested subtasks as insertable entries under the freshly created `task_id`.
    pub fn nested_entries(&self, task_id: i64) -> Vec<NewEntry<'_>> {
        self.subtasks
            .iter()
            .flatten()
            .map(|s| {
                NewEntry::Subtask(NewSubtask {
                    task_id,
                    name: &s.name,
                    order: s.order,
                    deadline: s.deadline,
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EventAdd {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<WireDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<WireDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_confirmed: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GoalAdd {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<WireDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_confirmed: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IdeaAdd {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_confirmed: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NoteAdd {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TagAdd {
    pub name: String,
}

/// Add batch, keyed by kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToAdd {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tasks: Option<Vec<TaskAdd>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtasks: Option<Vec<SubtaskAdd>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub events: Option<Vec<EventAdd>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goals: Option<Vec<GoalAdd>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ideas: Option<Vec<IdeaAdd>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<Vec<NoteAdd>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<TagAdd>>,
}

impl ToAdd {
    /// Entries of one kind. Subtasks here are the ones targeting existing tasks.
    pub fn entries_for(&self, kind: EntityKind) -> Vec<NewEntry<'_>> {
        match kind {
            EntityKind::Task => wrap(&self.tasks, NewEntry::Task),
            EntityKind::Subtask => self
                .subtasks
                .iter()
                .flatten()
                .map(|s| {
                    NewEntry::Subtask(NewSubtask {
                        task_id: s.task_id,
                        name: &s.name,
                        order: s.order,
                        deadline: s.deadline,
                    })
                })
                .collect(),
            EntityKind::Event => wrap(&self.events, NewEntry::Event),
            EntityKind::Goal => wrap(&self.goals, NewEntry::Goal),
            EntityKind::Idea => wrap(&self.ideas, NewEntry::Idea),
            EntityKind::Note => wrap(&self.notes, NewEntry::Note),
            EntityKind::Tag => wrap(&self.tags, NewEntry::Tag),
        }
    }
}

// ── Edit schemas ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskEdit {
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<WireDateTime>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubtaskEdit {
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<WireDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_done: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EventEdit {
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<WireDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<WireDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_confirmed: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GoalEdit {
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<WireDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_confirmed: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IdeaEdit {
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_confirmed: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NoteEdit {
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TagEdit {
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Edit batch, keyed by kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToEdit {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tasks: Option<Vec<TaskEdit>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtasks: Option<Vec<SubtaskEdit>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub events: Option<Vec<EventEdit>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goals: Option<Vec<GoalEdit>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ideas: Option<Vec<IdeaEdit>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<Vec<NoteEdit>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<TagEdit>>,
}

impl ToEdit {
    pub fn entries_for(&self, kind: EntityKind) -> Vec<EditEntry<'_>> {
        match kind {
            EntityKind::Task => wrap(&self.tasks, EditEntry::Task),
            EntityKind::Subtask => wrap(&self.subtasks, EditEntry::Subtask),
            EntityKind::Event => wrap(&self.events, EditEntry::Event),
            EntityKind::Goal => wrap(&self.goals, EditEntry::Goal),
            EntityKind::Idea => wrap(&self.ideas, EditEntry::Idea),
            EntityKind::Note => wrap(&self.notes, EditEntry::Note),
            EntityKind::Tag => wrap(&self.tags, EditEntry::Tag),
        }
    }
}

// ── Delete schema ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeleteId {
    pub id: i64,
}

/// Delete batch. Subtasks are not independently deletable here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToDelete {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tasks: Option<Vec<DeleteId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub events: Option<Vec<DeleteId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goals: Option<Vec<DeleteId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ideas: Option<Vec<DeleteId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<Vec<DeleteId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<DeleteId>>,
}

impl ToDelete {
    pub fn ids_for(&self, kind: EntityKind) -> Vec<i64> {
        let list = match kind {
            EntityKind::Task => &self.tasks,
            EntityKind::Subtask => return Vec::new(),
            EntityKind::Event => &self.events,
            EntityKind::Goal => &self.goals,
            EntityKind::Idea => &self.ideas,
            EntityKind::Note => &self.notes,
            EntityKind::Tag => &self.tags,
        };
        list.iter().flatten().map(|d| d.id).collect()
    }
}

// ── Kind dispatch ───────────────────────────────────────────────────

/// A typed column value, independent of the storage driver.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Bool(bool),
    Timestamp(WireDateTime),
}

/// One column assignment produced by an add or edit entry.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldChange {
    pub column: &'static str,
    pub value: FieldValue,
}

/// Collects assignments for the fields that are actually present.
#[derive(Default)]
struct Changes(Vec<FieldChange>);

impl Changes {
    fn push(mut self, column: &'static str, value: Option<FieldValue>) -> Self {
        if let Some(value) = value {
            self.0.push(FieldChange { column, value });
        }
        self
    }

    fn text(self, column: &'static str, value: Option<&String>) -> Self {
        self.push(column, value.map(|v| FieldValue::Text(v.clone())))
    }

    fn int(self, column: &'static str, value: Option<i64>) -> Self {
        self.push(column, value.map(FieldValue::Integer))
    }

    fn flag(self, column: &'static str, value: Option<bool>) -> Self {
        self.push(column, value.map(FieldValue::Bool))
    }

    fn time(self, column: &'static str, value: Option<WireDateTime>) -> Self {
        self.push(column, value.map(FieldValue::Timestamp))
    }

    fn status(self, column: &'static str, value: Option<TaskStatus>) -> Self {
        self.push(column, value.map(|s| FieldValue::Text(s.as_str().to_string())))
    }
}

/// A subtask to insert, whether nested under a new task or targeting an
/// existing one.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSubtask<'a> {
    pub task_id: i64,
    pub name: &'a str,
    pub order: i64,
    pub deadline: Option<WireDateTime>,
}

/// One add-batch entry, tagged by kind.
#[derive(Debug, Clone, PartialEq)]
pub enum NewEntry<'a> {
    Task(&'a TaskAdd),
    Subtask(NewSubtask<'a>),
    Event(&'a EventAdd),
    Goal(&'a GoalAdd),
    Idea(&'a IdeaAdd),
    Note(&'a NoteAdd),
    Tag(&'a TagAdd),
}

impl NewEntry<'_> {
    pub fn kind(&self) -> EntityKind {
        match self {
            NewEntry::Task(_) => EntityKind::Task,
            NewEntry::Subtask(_) => EntityKind::Subtask,
            NewEntry::Event(_) => EntityKind::Event,
            NewEntry::Goal(_) => EntityKind::Goal,
            NewEntry::Idea(_) => EntityKind::Idea,
            NewEntry::Note(_) => EntityKind::Note,
            NewEntry::Tag(_) => EntityKind::Tag,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            NewEntry::Task(t) => &t.name,
            NewEntry::Subtask(s) => s.name,
            NewEntry::Event(e) => &e.name,
            NewEntry::Goal(g) => &g.name,
            NewEntry::Idea(i) => &i.name,
            NewEntry::Note(n) => &n.name,
            NewEntry::Tag(t) => &t.name,
        }
    }

    /// Column assignments for the insert. Ownership columns are not included.
    pub fn fields(&self) -> Vec<FieldChange> {
        let changes = Changes::default().text("name", Some(&self.name().to_string()));
        let changes = match self {
            NewEntry::Task(t) => changes
                .text("description", t.description.as_ref())
                .status("status", t.status)
                .time("deadline", t.deadline),
            NewEntry::Subtask(s) => changes
                .int("task_id", Some(s.task_id))
                .int("position", Some(s.order))
                .time("deadline", s.deadline),
            NewEntry::Event(e) => changes
                .text("description", e.description.as_ref())
                .time("start_time", e.start_time)
                .time("end_time", e.end_time)
                .flag("is_confirmed", e.is_confirmed),
            NewEntry::Goal(g) => changes
                .text("description", g.description.as_ref())
                .time("deadline", g.deadline)
                .flag("is_confirmed", g.is_confirmed),
            NewEntry::Idea(i) => changes
                .text("description", i.description.as_ref())
                .flag("is_confirmed", i.is_confirmed),
            NewEntry::Note(n) => changes.text("description", n.description.as_ref()),
            NewEntry::Tag(_) => changes,
        };
        changes.0
    }
}

/// One edit-batch entry, tagged by kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EditEntry<'a> {
    Task(&'a TaskEdit),
    Subtask(&'a SubtaskEdit),
    Event(&'a EventEdit),
    Goal(&'a GoalEdit),
    Idea(&'a IdeaEdit),
    Note(&'a NoteEdit),
    Tag(&'a TagEdit),
}

impl EditEntry<'_> {
    pub fn kind(&self) -> EntityKind {
        match self {
            EditEntry::Task(_) => EntityKind::Task,
            EditEntry::Subtask(_) => EntityKind::Subtask,
            EditEntry::Event(_) => EntityKind::Event,
            EditEntry::Goal(_) => EntityKind::Goal,
            EditEntry::Idea(_) => EntityKind::Idea,
            EditEntry::Note(_) => EntityKind::Note,
            EditEntry::Tag(_) => EntityKind::Tag,
        }
    }

    pub fn id(&self) -> i64 {
        match self {
            EditEntry::Task(e) => e.id,
            EditEntry::Subtask(e) => e.id,
            EditEntry::Event(e) => e.id,
            EditEntry::Goal(e) => e.id,
            EditEntry::Idea(e) => e.id,
            EditEntry::Note(e) => e.id,
            EditEntry::Tag(e) => e.id,
        }
    }

    /// Assignments for the fields present (non-null) in the entry.
    pub fn changes(&self) -> Vec<FieldChange> {
        let changes = Changes::default();
        let changes = match self {
            EditEntry::Task(e) => changes
                .text("name", e.name.as_ref())
                .text("description", e.description.as_ref())
                .status("status", e.status)
                .time("deadline", e.deadline),
            EditEntry::Subtask(e) => changes
                .text("name", e.name.as_ref())
                .int("position", e.order)
                .time("deadline", e.deadline)
                .flag("is_done", e.is_done),
            EditEntry::Event(e) => changes
                .text("name", e.name.as_ref())
                .text("description", e.description.as_ref())
                .time("start_time", e.start_time)
                .time("end_time", e.end_time)
                .flag("is_confirmed", e.is_confirmed),
            EditEntry::Goal(e) => changes
                .text("name", e.name.as_ref())
                .text("description", e.description.as_ref())
                .time("deadline", e.deadline)
                .flag("is_confirmed", e.is_confirmed),
            EditEntry::Idea(e) => changes
                .text("name", e.name.as_ref())
                .text("description", e.description.as_ref())
                .flag("is_confirmed", e.is_confirmed),
            EditEntry::Note(e) => changes
                .text("name", e.name.as_ref())
                .text("description", e.description.as_ref()),
            EditEntry::Tag(e) => changes.text("name", e.name.as_ref()),
        };
        changes.0
    }
}

fn wrap<'a, T, E>(items: &'a Option<Vec<T>>, tag: fn(&'a T) -> E) -> Vec<E> {
    items.iter().flatten().map(tag).collect()
}
