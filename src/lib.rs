//! Voice organizer: turns spoken or typed commands into changes to a
//! personal task/event/goal/idea/note/tag store.

pub mod answers;
pub mod assistant;
pub mod channels;
pub mod config;
pub mod error;
pub mod llm;
pub mod organizer;
pub mod pipeline;
pub mod store;
