//! concierge-core: rule-based conversational routing
//!
//! Classifies each user utterance into priority-tiered tags, hands the turn to
//! one registered specialist, announces handoffs, keeps per-session state and
//! turns every specialist failure into a fixed user-facing fallback.

pub mod concierge;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod fallback;
pub mod handoff;
pub mod intent;
pub mod registry;
pub mod router;
pub mod session;
pub mod slots;
pub mod specialists;
pub mod types;

pub use concierge::{Concierge, ConciergeSettings, TurnOutcome, TurnStatus};
pub use context::{ConversationContext, build_specialist_input};
pub use dispatcher::{Dispatcher, DispatcherConfig};
pub use error::{ErrorCategory, FailureRecord, RegistryError};
pub use events::{ChannelSink, EventSink, NullSink, TracingSink, TurnEvent};
pub use fallback::{FallbackConfig, FallbackGenerator, classify_failure};
pub use handoff::HandoffEvaluator;
pub use intent::{IntentClassifier, KeywordSets};
pub use registry::{Specialist, SpecialistEntry, SpecialistRegistry};
pub use router::{Router, RoutingDecision};
pub use session::{InMemorySessionStore, SessionStore};
pub use slots::SlotExtractor;
pub use specialists::{OpenAiCompatSpecialist, ScriptedSpecialist};
pub use types::{Message, Role, Tag, TagSet, Urgency};
