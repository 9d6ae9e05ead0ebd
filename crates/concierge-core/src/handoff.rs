//! Handoff notices between specialists

use std::collections::HashMap;

use crate::registry::SpecialistRegistry;

pub const DEFAULT_HANDOFF_TEMPLATE: &str = "I'm handing you over from {from} to {to}.";

/// Decides whether a turn needs a transition notice and renders it.
///
/// Notice text depends only on the (previous, selected) pair, so the same
/// pair always yields the same string.
#[derive(Debug, Clone, Default)]
pub struct HandoffEvaluator {
    display_names: HashMap<String, String>,
    templates: HashMap<String, String>,
}

impl HandoffEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use the registry's display names and per-target templates
    pub fn from_registry(registry: &SpecialistRegistry) -> Self {
        let mut evaluator = Self::new();
        for entry in registry.entries() {
            evaluator
                .display_names
                .insert(entry.id.clone(), entry.display_name.clone());
            if let Some(template) = &entry.handoff_template {
                evaluator.templates.insert(entry.id.clone(), template.clone());
            }
        }
        evaluator
    }

    fn display_name<'a>(&'a self, id: &'a str) -> &'a str {
        self.display_names.get(id).map(String::as_str).unwrap_or(id)
    }

    /// Notice for a change of specialist, or `None` at session start and on continuity
    pub fn evaluate(&self, previous: &str, selected: &str) -> Option<String> {
        if previous.is_empty() || previous == selected {
            return None;
        }

        let template = self
            .templates
            .get(selected)
            .map(String::as_str)
            .unwrap_or(DEFAULT_HANDOFF_TEMPLATE);

        Some(
            template
                .replace("{from}", self.display_name(previous))
                .replace("{to}", self.display_name(selected)),
        )
    }
}
