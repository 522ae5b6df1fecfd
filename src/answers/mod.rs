//! Model answer schema and the registry describing it per entity kind.

pub mod model;
pub mod registry;

pub use model::{
    Answer, DeleteId, EditEntry, EventAdd, EventEdit, FieldChange, FieldValue, GoalAdd, GoalEdit,
    IdeaAdd, IdeaEdit, NestedSubtaskAdd, NewEntry, NewSubtask, NoteAdd, NoteEdit, Response,
    ResultCode, SubtaskAdd, SubtaskEdit, TagAdd, TagEdit, TaskAdd, TaskEdit, ToAdd, ToDelete,
    ToEdit,
};
pub use registry::{FieldSpec, FieldType, Ownership, SchemaEntry, SchemaRegistry};
