//! Organizer data model: entity kinds, the task status cycle, stored rows
//! and the timestamp format shared by the LLM and the datastore.

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDateTime, Timelike, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Exact textual timestamp format used on the wire and in storage.
pub const WIRE_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Length of a canonical wire timestamp.
const WIRE_DATETIME_LEN: usize = 19;

/// A timestamp string that is not exactly `YYYY-MM-DD HH:MM:SS`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid timestamp {raw:?}, expected YYYY-MM-DD HH:MM:SS")]
pub struct TimestampError {
    pub raw: String,
}

/// The seven entity kinds the organizer manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Task,
    Subtask,
    Event,
    Goal,
    Idea,
    Note,
    Tag,
}

impl EntityKind {
    /// All kinds, in registry order.
    pub const ALL: [EntityKind; 7] = [
        EntityKind::Task,
        EntityKind::Subtask,
        EntityKind::Event,
        EntityKind::Goal,
        EntityKind::Idea,
        EntityKind::Note,
        EntityKind::Tag,
    ];

    /// Kinds that take part in many-to-many links (everything but subtasks).
    pub const LINKABLE: [EntityKind; 6] = [
        EntityKind::Task,
        EntityKind::Event,
        EntityKind::Goal,
        EntityKind::Idea,
        EntityKind::Note,
        EntityKind::Tag,
    ];

    /// Position of this kind in [`EntityKind::ALL`].
    pub fn index(self) -> usize {
        match self {
            EntityKind::Task => 0,
            EntityKind::Subtask => 1,
            EntityKind::Event => 2,
            EntityKind::Goal => 3,
            EntityKind::Idea => 4,
            EntityKind::Note => 5,
            EntityKind::Tag => 6,
        }
    }

    /// Lowercase singular name ("task"), used for link table and column names.
    pub fn singular(self) -> &'static str {
        match self {
            EntityKind::Task => "task",
            EntityKind::Subtask => "subtask",
            EntityKind::Event => "event",
            EntityKind::Goal => "goal",
            EntityKind::Idea => "idea",
            EntityKind::Note => "note",
            EntityKind::Tag => "tag",
        }
    }

    /// Name of the link table joining two linkable kinds, if they can be linked.
    ///
    /// The table is named after the pair in registry order, so
    /// `link_table(Tag, Task)` and `link_table(Task, Tag)` both give `task_tag`.
    pub fn link_table(a: EntityKind, b: EntityKind) -> Option<String> {
        if a == b || a == EntityKind::Subtask || b == EntityKind::Subtask {
            return None;
        }
        let (first, second) = if a.index() < b.index() { (a, b) } else { (b, a) };
        Some(format!("{}_{}", first.singular(), second.singular()))
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Task => "Task",
            EntityKind::Subtask => "Subtask",
            EntityKind::Event => "Event",
            EntityKind::Goal => "Goal",
            EntityKind::Idea => "Idea",
            EntityKind::Note => "Note",
            EntityKind::Tag => "Tag",
        };
        f.write_str(name)
    }
}

/// Task lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    New,
    InProgress,
    Completed,
}

impl TaskStatus {
    /// Cycle order used by [`TaskStatus::next`] and [`TaskStatus::prev`].
    pub const ORDER: [TaskStatus; 3] = [
        TaskStatus::New,
        TaskStatus::InProgress,
        TaskStatus::Completed,
    ];

    fn position(self) -> usize {
        match self {
            TaskStatus::New => 0,
            TaskStatus::InProgress => 1,
            TaskStatus::Completed => 2,
        }
    }

    pub fn next(self) -> TaskStatus {
        Self::ORDER[(self.position() + 1) % Self::ORDER.len()]
    }

    pub fn prev(self) -> TaskStatus {
        let len = Self::ORDER.len();
        Self::ORDER[(self.position() + len - 1) % len]
    }

    /// Storage/wire representation.
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::New => "NEW",
            TaskStatus::InProgress => "IN_PROGRESS",
            TaskStatus::Completed => "COMPLETED",
        }
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NEW" => Ok(TaskStatus::New),
            "IN_PROGRESS" => Ok(TaskStatus::InProgress),
            "COMPLETED" => Ok(TaskStatus::Completed),
            other => Err(format!("unknown task status: {other}")),
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A timestamp that (de)serializes strictly as `YYYY-MM-DD HH:MM:SS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct WireDateTime(pub NaiveDateTime);

impl WireDateTime {
    /// Parse a canonical timestamp. chrono alone also accepts unpadded
    /// fields, leading whitespace and a signed year, so the input must
    /// re-render to itself.
    pub fn parse(s: &str) -> Result<Self, TimestampError> {
        let invalid = || TimestampError { raw: s.to_string() };
        if s.len() != WIRE_DATETIME_LEN {
            return Err(invalid());
        }
        let parsed = NaiveDateTime::parse_from_str(s, WIRE_DATETIME_FORMAT)
            .map(Self)
            .map_err(|_| invalid())?;
        if parsed.to_string() != s {
            return Err(invalid());
        }
        Ok(parsed)
    }

    /// Current UTC time truncated to whole seconds.
    pub fn now() -> Self {
        let now = Utc::now().naive_utc();
        Self(now.with_nanosecond(0).unwrap_or(now))
    }
}

impl fmt::Display for WireDateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(WIRE_DATETIME_FORMAT))
    }
}

impl Serialize for WireDateTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for WireDateTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        WireDateTime::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// A registered bot user; root owner of every other entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    /// Telegram user id.
    pub tg_id: i64,
    pub name: Option<String>,
    pub last_name: Option<String>,
}

/// A stored task row.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub deadline: Option<WireDateTime>,
    pub is_deleted: bool,
    pub created: WireDateTime,
    pub updated: WireDateTime,
}

/// A stored subtask row.
#[derive(Debug, Clone, PartialEq)]
pub struct Subtask {
    pub id: i64,
    pub task_id: i64,
    pub name: String,
    pub position: i64,
    pub deadline: Option<WireDateTime>,
    pub is_done: bool,
    pub is_deleted: bool,
}

/// One live entity in the catalog shown to the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogItem {
    pub id: i64,
    pub name: String,
    /// Parent task for subtasks.
    pub parent_id: Option<i64>,
}

/// A many-to-many link between two entities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub table: String,
    pub left_id: i64,
    pub right_id: i64,
}
