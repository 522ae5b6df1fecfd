//! User-facing reply for one processed command.

use crate::error::PipelineError;
use crate::pipeline::executor::{ExecutionSummary, ItemDescriptor};
use crate::pipeline::validator::Validation;

fn push_section(out: &mut Vec<String>, title: &str, items: &[ItemDescriptor]) {
    if items.is_empty() {
        return;
    }
    out.push(format!("{title} ({}):", items.len()));
    out.extend(items.iter().map(|i| format!("- {}: {}", i.model, i.name)));
}

/// Render the outcome of validation and (if it ran) execution.
pub fn render_reply(validation: &Validation, summary: Option<&ExecutionSummary>) -> String {
    if !validation.is_valid {
        let mut text = String::from("Could not process the command:");
        for error in &validation.errors {
            text.push('\n');
            text.push_str(error);
        }
        return text;
    }

    if validation.is_declined() {
        return match validation.errors.first() {
            Some(reason) => format!("I could not turn that into changes: {reason}"),
            None => "I could not turn that into changes.".to_string(),
        };
    }

    match summary {
        Some(summary) if !summary.is_empty() => {
            let mut lines = vec!["Done:".to_string()];
            push_section(&mut lines, "Added", &summary.added);
            push_section(&mut lines, "Updated", &summary.updated);
            push_section(&mut lines, "Deleted", &summary.deleted);
            lines.join("\n")
        }
        _ => "Nothing to change.".to_string(),
    }
}

/// Reply for a command that failed outside the model's control.
pub fn render_failure(error: &PipelineError) -> String {
    match error {
        PipelineError::Execution(_) => {
            "Something went wrong while saving your changes. Nothing was changed, please try again."
                .to_string()
        }
        PipelineError::Transcription(_) => {
            "Sorry, I could not recognize that voice message.".to_string()
        }
        PipelineError::UnknownUser(_) => "Please send /start first.".to_string(),
        PipelineError::Llm(_) | PipelineError::Storage(_) => {
            "The assistant is unavailable right now, please try again later.".to_string()
        }
    }
}
