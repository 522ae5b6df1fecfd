//! Command pipeline: free-form text to organizer mutations.
//!
//! Every command flows through:
//! 1. `PromptBuilder` renders the owner's catalog and the answer template
//! 2. The LLM answers with a JSON batch of add/edit/delete operations
//! 3. `Validator` parses it strictly and checks every referenced id
//! 4. `Executor` applies a valid batch in one transaction
//!
//! Nothing is written unless validation passed.

pub mod executor;
pub mod prompt;
pub mod summary;
pub mod validator;

pub use executor::{ExecutionSummary, Executor, ItemDescriptor};
pub use prompt::PromptBuilder;
pub use summary::{render_failure, render_reply};
pub use validator::{Validation, Validator};

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::answers::SchemaRegistry;
use crate::error::PipelineError;
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider};
use crate::organizer::WireDateTime;
use crate::store::Database;

/// Low temperature: the answer is structured data, not prose.
const COMMAND_TEMPERATURE: f32 = 0.1;

/// Result of one command: what the validator concluded and, if the batch
/// ran, what it changed.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub validation: Validation,
    pub summary: Option<ExecutionSummary>,
}

impl Outcome {
    pub fn reply(&self) -> String {
        render_reply(&self.validation, self.summary.as_ref())
    }
}

/// Drives one command through prompt, model, validation and execution.
pub struct CommandPipeline {
    registry: Arc<SchemaRegistry>,
    llm: Arc<dyn LlmProvider>,
}

impl CommandPipeline {
    pub fn new(registry: Arc<SchemaRegistry>, llm: Arc<dyn LlmProvider>) -> Self {
        Self { registry, llm }
    }

    pub async fn run(
        &self,
        db: &dyn Database,
        owner_id: i64,
        text: &str,
    ) -> Result<Outcome, PipelineError> {
        let catalog = db.catalog(owner_id).await?;
        let system = PromptBuilder::new(&self.registry).system_prompt(&catalog, WireDateTime::now());

        let request = CompletionRequest::new(vec![ChatMessage::system(system), ChatMessage::user(text)])
            .with_temperature(COMMAND_TEMPERATURE);
        let response = self.llm.complete(request).await?;
        debug!(owner_id, raw = %response.content, "Model answer received");

        let session = db.session().await?;
        let validation = Validator::new(&self.registry)
            .validate(&response.content, &session, owner_id)
            .await?;
        if !validation.is_valid {
            warn!(owner_id, errors = ?validation.errors, "Model answer rejected");
        }

        let summary = match validation.payload() {
            Some(payload) => Some(
                Executor::new(&self.registry)
                    .execute(&session, payload, owner_id)
                    .await?,
            ),
            None => None,
        };

        info!(
            owner_id,
            valid = validation.is_valid,
            declined = validation.is_declined(),
            "Command processed"
        );
        Ok(Outcome { validation, summary })
    }
}
