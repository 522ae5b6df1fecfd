//! Organizer domain types.

pub mod model;

pub use model::{
    CatalogItem, EntityKind, Link, Subtask, Task, TaskStatus, TimestampError, User,
    WireDateTime, WIRE_DATETIME_FORMAT,
};
