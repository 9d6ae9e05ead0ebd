//! Specialist selection

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::context::ConversationContext;
use crate::handoff::HandoffEvaluator;
use crate::registry::SpecialistRegistry;
use crate::types::{Tag, TagSet, format_tags};

/// Outcome of routing one turn. Computed fresh every turn, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoutingDecision {
    pub selected_specialist: String,
    /// Every tag the classifier matched
    pub matched_tags: TagSet,
    /// Tier that justified the selection; `None` when the default specialist was chosen
    pub primary_tag: Option<Tag>,
    pub handoff_notice: Option<String>,
}

impl RoutingDecision {
    pub fn is_default_route(&self) -> bool {
        self.primary_tag.is_none()
    }
}

/// Picks exactly one specialist per turn.
///
/// Tag match always wins over continuity: the previous specialist is only
/// consulted to decide on a handoff notice.
pub struct Router {
    registry: Arc<SpecialistRegistry>,
    handoff: HandoffEvaluator,
}

impl Router {
    pub fn new(registry: Arc<SpecialistRegistry>) -> Self {
        let handoff = HandoffEvaluator::from_registry(&registry);
        Self { registry, handoff }
    }

    pub fn registry(&self) -> &Arc<SpecialistRegistry> {
        &self.registry
    }

    pub fn route(&self, tags: &[Tag], context: &ConversationContext) -> RoutingDecision {
        let matched_tags: TagSet = tags.iter().copied().collect();

        // Highest tier that some specialist claims; registration order breaks ties
        let claimed = matched_tags
            .iter()
            .find_map(|tag| self.registry.first_claiming(*tag).map(|entry| (*tag, entry)));

        let (primary_tag, selected) = match claimed {
            Some((tag, entry)) => (Some(tag), entry),
            None => {
                if !matched_tags.is_empty() {
                    debug!(
                        "No specialist claims {}, using default",
                        format_tags(&matched_tags)
                    );
                }
                (None, self.registry.default_entry())
            }
        };

        let handoff_notice = self.handoff.evaluate(&context.last_specialist, &selected.id);

        debug!(
            "Routed {} to '{}' (previous: '{}', handoff: {})",
            format_tags(&matched_tags),
            selected.id,
            context.last_specialist,
            handoff_notice.is_some()
        );

        RoutingDecision {
            selected_specialist: selected.id.clone(),
            matched_tags,
            primary_tag,
            handoff_notice,
        }
    }
}
