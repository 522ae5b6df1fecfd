//! Validator: raw model text to a checked answer.
//!
//! Parsing is strict (unknown keys, bad enums and malformed timestamps all
//! fail). Referential checks run against the live datastore, read-only,
//! and accumulate every failure instead of stopping at the first.

use std::sync::LazyLock;

use libsql::Connection;
use regex::Regex;
use tracing::debug;

use crate::answers::{Answer, Response, SchemaRegistry};
use crate::error::PipelineError;
use crate::organizer::EntityKind;
use crate::store::organizer::owned_row_exists;

static CODE_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^\s*```[A-Za-z0-9_-]*[ \t]*\r?\n?(.*?)\s*```\s*$").unwrap());

/// Outcome of validating one model answer.
#[derive(Debug, Clone, PartialEq)]
pub struct Validation {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub answer: Option<Answer>,
}

impl Validation {
    fn schema_error(detail: impl std::fmt::Display) -> Self {
        Self {
            is_valid: false,
            errors: vec![format!("JSON validation error: {detail}")],
            answer: None,
        }
    }

    /// The payload to execute: present only for a valid, non-declined answer.
    pub fn payload(&self) -> Option<&Response> {
        if !self.is_valid {
            return None;
        }
        self.answer.as_ref().and_then(Answer::payload)
    }

    /// True when the model itself refused to act.
    pub fn is_declined(&self) -> bool {
        self.is_valid && self.answer.as_ref().is_some_and(Answer::is_declined)
    }
}

/// Remove one layer of Markdown code-fence wrapping, if present.
pub fn strip_code_fence(raw: &str) -> &str {
    match CODE_FENCE.captures(raw).and_then(|c| c.get(1)) {
        Some(body) => body.as_str(),
        None => raw.trim(),
    }
}

pub struct Validator<'r> {
    registry: &'r SchemaRegistry,
}

impl<'r> Validator<'r> {
    pub fn new(registry: &'r SchemaRegistry) -> Self {
        Self { registry }
    }

    /// Parse and check `raw` for `owner_id`.
    ///
    /// Returns `Err` only when the datastore itself fails; every problem with
    /// the answer is reported through [`Validation::errors`].
    pub async fn validate(
        &self,
        raw: &str,
        conn: &Connection,
        owner_id: i64,
    ) -> Result<Validation, PipelineError> {
        let answer: Answer = match serde_json::from_str(strip_code_fence(raw)) {
            Ok(answer) => answer,
            Err(e) => {
                debug!(error = %e, "Model answer failed schema validation");
                return Ok(Validation::schema_error(e));
            }
        };

        let Some(response) = answer.payload() else {
            let errors = answer.error.iter().cloned().collect();
            return Ok(Validation {
                is_valid: true,
                errors,
                answer: Some(answer),
            });
        };

        let mut errors = Vec::new();
        self.check_subtask_parents(response, conn, owner_id, &mut errors)
            .await?;
        self.check_edits(response, conn, owner_id, &mut errors).await?;
        self.check_deletes(response, conn, owner_id, &mut errors)
            .await?;

        debug!(owner_id, errors = errors.len(), "Model answer checked");
        Ok(Validation {
            is_valid: errors.is_empty(),
            errors,
            answer: Some(answer),
        })
    }

    async fn check_subtask_parents(
        &self,
        response: &Response,
        conn: &Connection,
        owner_id: i64,
        errors: &mut Vec<String>,
    ) -> Result<(), PipelineError> {
        let Some(batch) = &response.to_add else {
            return Ok(());
        };
        let tasks = self.registry.entry(EntityKind::Task);
        for subtask in batch.subtasks.iter().flatten() {
            if !owned_row_exists(conn, tasks, owner_id, subtask.task_id, true).await? {
                errors.push(format!(
                    "Can't add subtask to non-existent task with id={}",
                    subtask.task_id
                ));
            }
        }
        Ok(())
    }

    async fn check_edits(
        &self,
        response: &Response,
        conn: &Connection,
        owner_id: i64,
        errors: &mut Vec<String>,
    ) -> Result<(), PipelineError> {
        let Some(batch) = &response.to_edit else {
            return Ok(());
        };
        for entry in self.registry.entries() {
            for edit in batch.entries_for(entry.kind) {
                let id = edit.id();
                if !owned_row_exists(conn, entry, owner_id, id, false).await? {
                    errors.push(format!("{} with id={id} does not exist", entry.model));
                }
            }
        }
        Ok(())
    }

    async fn check_deletes(
        &self,
        response: &Response,
        conn: &Connection,
        owner_id: i64,
        errors: &mut Vec<String>,
    ) -> Result<(), PipelineError> {
        let Some(batch) = &response.to_delete else {
            return Ok(());
        };
        for entry in self.registry.entries().filter(|e| e.deletable) {
            for id in batch.ids_for(entry.kind) {
                if !owned_row_exists(conn, entry, owner_id, id, false).await? {
                    errors.push(format!("{} with id={id} does not exist", entry.model));
                }
            }
        }
        Ok(())
    }
}
