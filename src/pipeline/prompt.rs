//! Prompt builder: catalog of the owner's live entities plus answer rules.

use std::fmt::Write as _;

use crate::answers::{Ownership, SchemaRegistry};
use crate::organizer::{EntityKind, WireDateTime};
use crate::store::Catalog;

pub struct PromptBuilder<'r> {
    registry: &'r SchemaRegistry,
}

impl<'r> PromptBuilder<'r> {
    pub fn new(registry: &'r SchemaRegistry) -> Self {
        Self { registry }
    }

    /// Full system prompt for one command of the catalog's owner.
    pub fn system_prompt(&self, catalog: &Catalog, now: WireDateTime) -> String {
        let mut prompt = String::new();
        prompt.push_str(
            "You are a personal organizer assistant. Turn the user's command into changes \
             to their tasks, subtasks, events, goals, ideas, notes and tags.\n",
        );
        prompt.push_str("Your answer must be strictly valid JSON matching this template:\n");
        prompt.push_str(&self.registry.answer_template());
        prompt.push_str("\n\nExisting objects (use their ids when editing or deleting):\n");
        prompt.push_str(&self.render_catalog(catalog));
        prompt.push_str("\nRules:\n");
        prompt.push_str("- Return only JSON, with no explanations or extra text.\n");
        prompt.push_str("- Structure and types must match the template exactly. Do not add fields.\n");
        prompt.push_str(
            "- Do not set deadline, start_time or end_time unless the user stated them.\n",
        );
        prompt.push_str(
            "- If the command is ambiguous or cannot be expressed with the template, answer with \
             \"result\": \"ERROR\" and explain why in \"error\".\n",
        );
        let _ = writeln!(prompt, "- Current time: {now}");
        prompt.push_str("- Always write dates and times as YYYY-MM-DD HH:MM:SS.\n");
        prompt.push_str("- Start your answer with ```json and end it with ```.\n");
        prompt
    }

    /// Plain-text listing of live entities and links, one section per kind.
    pub fn render_catalog(&self, catalog: &Catalog) -> String {
        let mut out = String::new();
        for entry in self.registry.entries() {
            let singular = entry.kind.singular();
            match entry.ownership {
                Ownership::User => {
                    let _ = writeln!(out, "{}({singular}_id, {singular}_name):", entry.key);
                    for item in catalog.items(entry.kind) {
                        let _ = writeln!(out, "{} {}", item.id, item.name);
                    }
                }
                Ownership::ParentTask => {
                    let _ = writeln!(
                        out,
                        "{}({singular}_id, {singular}_name, task_id):",
                        entry.key
                    );
                    for item in catalog.items(entry.kind) {
                        let parent = item.parent_id.map(|p| p.to_string()).unwrap_or_default();
                        let _ = writeln!(out, "{} {} {parent}", item.id, item.name);
                    }
                }
            }
        }

        for (i, &a) in EntityKind::LINKABLE.iter().enumerate() {
            for &b in &EntityKind::LINKABLE[i + 1..] {
                let Some(table) = EntityKind::link_table(a, b) else {
                    continue;
                };
                let _ = writeln!(out, "{table}({}_id, {}_id):", a.singular(), b.singular());
                for link in catalog.links.iter().filter(|l| l.table == table) {
                    let _ = writeln!(out, "{} {}", link.left_id, link.right_id);
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::organizer::{CatalogItem, Link};

    fn sample_catalog() -> Catalog {
        Catalog {
            sections: vec![
                (
                    EntityKind::Task,
                    vec![CatalogItem { id: 1, name: "Buy milk".into(), parent_id: None }],
                ),
                (
                    EntityKind::Subtask,
                    vec![CatalogItem { id: 7, name: "Go to store".into(), parent_id: Some(1) }],
                ),
                (
                    EntityKind::Tag,
                    vec![CatalogItem { id: 3, name: "errands".into(), parent_id: None }],
                ),
            ],
            links: vec![Link { table: "task_tag".into(), left_id: 1, right_id: 3 }],
        }
    }

    #[test]
    fn catalog_lists_items_and_links() {
        let registry = SchemaRegistry::standard();
        let text = PromptBuilder::new(&registry).render_catalog(&sample_catalog());
        assert!(text.contains("tasks(task_id, task_name):\n1 Buy milk\n"));
        assert!(text.contains("subtasks(subtask_id, subtask_name, task_id):\n7 Go to store 1\n"));
        assert!(text.contains("task_tag(task_id, tag_id):\n1 3\n"));
        assert!(text.contains("events(event_id, event_name):\n"));
        assert!(text.contains("note_tag(note_id, tag_id):\n"));
    }

    #[test]
    fn system_prompt_has_template_time_and_rules() {
        let registry = SchemaRegistry::standard();
        let now = WireDateTime::parse("2025-04-01 08:30:00").unwrap();
        let prompt = PromptBuilder::new(&registry).system_prompt(&sample_catalog(), now);
        assert!(prompt.contains("\"to_add\""));
        assert!(prompt.contains("Current time: 2025-04-01 08:30:00"));
        assert!(prompt.contains("YYYY-MM-DD HH:MM:SS"));
        assert!(prompt.contains("```json"));
        assert!(prompt.contains("\"result\": \"ERROR\""));
    }

    #[test]
    fn prompt_only_offers_operations_the_answer_can_express() {
        let registry = SchemaRegistry::standard();
        let now = WireDateTime::parse("2025-04-01 08:30:00").unwrap();
        let prompt = PromptBuilder::new(&registry).system_prompt(&sample_catalog(), now);
        assert!(prompt.contains("use their ids when editing or deleting"));
        assert!(!prompt.contains("attach"));
        assert!(!prompt.contains("\"links\""));
    }
}
