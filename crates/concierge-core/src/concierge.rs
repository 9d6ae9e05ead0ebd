//! The per-turn state machine
//!
//! CLASSIFY -> ROUTE -> [HANDOFF_NOTICE] -> DISPATCH -> {SUCCESS | FAIL -> FALLBACK} -> CONTEXT_UPDATE
//!
//! A turn never returns an error to the caller. Success updates the context
//! once, after the reply is known. The context keeps replies without the
//! handoff notice, so later classification only sees what the specialist said. Failure leaves the context untouched and
//! returns fallback text; the caller decides whether to keep it
//! (see [`Concierge::commit_fallback`]).

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{debug, info};

use crate::context::{ConversationContext, build_specialist_input};
use crate::dispatcher::{Dispatcher, DispatcherConfig};
use crate::error::ErrorCategory;
use crate::events::{EventSink, TracingSink, TurnEvent};
use crate::fallback::{FallbackConfig, FallbackGenerator};
use crate::intent::IntentClassifier;
use crate::registry::SpecialistRegistry;
use crate::router::{Router, RoutingDecision};
use crate::session::{SessionLocks, SessionStore};
use crate::slots::SlotExtractor;
use crate::types::{Tag, Urgency, format_tags};

#[derive(Debug, Clone)]
pub struct ConciergeSettings {
    pub dispatch_timeout: Duration,
    /// Messages of history included in the composed input
    pub history_window: usize,
    pub emergency_number: String,
    /// Whether session turns keep fallback replies in the history
    pub persist_fallback: bool,
}

impl Default for ConciergeSettings {
    fn default() -> Self {
        Self {
            dispatch_timeout: Duration::from_secs(30),
            history_window: 10,
            emergency_number: "1122".to_string(),
            persist_fallback: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnStatus {
    Completed,
    Fallback { category: ErrorCategory },
}

impl std::fmt::Display for TurnStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Fallback { category } => write!(f, "fallback ({})", category),
        }
    }
}

/// Everything a caller learns about one turn
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// Reply for the user, prefixed with the handoff notice when there is one
    pub response_text: String,
    /// Specialist reply or fallback text without the handoff notice
    pub reply_text: String,
    pub decision: RoutingDecision,
    pub status: TurnStatus,
    pub urgency: Urgency,
    pub elapsed: Duration,
}

impl TurnOutcome {
    pub fn is_fallback(&self) -> bool {
        matches!(self.status, TurnStatus::Fallback { .. })
    }
}

fn with_notice(decision: &RoutingDecision, reply: &str) -> String {
    match &decision.handoff_notice {
        Some(notice) => format!("{}\n\n{}", notice, reply),
        None => reply.to_string(),
    }
}

pub struct Concierge {
    classifier: Arc<IntentClassifier>,
    router: Router,
    slots: SlotExtractor,
    dispatcher: Dispatcher,
    fallback: FallbackGenerator,
    sink: Arc<dyn EventSink>,
    settings: ConciergeSettings,
    session_locks: SessionLocks,
}

impl Concierge {
    pub fn new(registry: Arc<SpecialistRegistry>, settings: ConciergeSettings) -> Self {
        let classifier = Arc::new(IntentClassifier::default());
        Self {
            fallback: FallbackGenerator::new(
                Arc::clone(&classifier),
                FallbackConfig {
                    emergency_number: settings.emergency_number.clone(),
                },
            ),
            classifier,
            router: Router::new(registry),
            slots: SlotExtractor::default(),
            dispatcher: Dispatcher::new(DispatcherConfig {
                timeout: settings.dispatch_timeout,
            }),
            sink: Arc::new(TracingSink),
            settings,
            session_locks: SessionLocks::new(),
        }
    }

    pub fn with_classifier(mut self, classifier: IntentClassifier) -> Self {
        let classifier = Arc::new(classifier);
        self.fallback = FallbackGenerator::new(
            Arc::clone(&classifier),
            FallbackConfig {
                emergency_number: self.settings.emergency_number.clone(),
            },
        );
        self.classifier = classifier;
        self
    }

    pub fn with_slot_extractor(mut self, slots: SlotExtractor) -> Self {
        self.slots = slots;
        self
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn registry(&self) -> &Arc<SpecialistRegistry> {
        self.router.registry()
    }

    pub fn classifier(&self) -> &IntentClassifier {
        &self.classifier
    }

    pub fn settings(&self) -> &ConciergeSettings {
        &self.settings
    }

    /// Classify and route without dispatching or touching the context
    pub fn preview(&self, context: &ConversationContext, user_text: &str) -> (Vec<Tag>, RoutingDecision, Urgency) {
        let tags = self
            .classifier
            .classify_turn(user_text, context.last_assistant_text());
        let urgency = self.classifier.assess_urgency(user_text);
        let decision = self.router.route(&tags, context);
        (tags, decision, urgency)
    }

    pub async fn handle_turn(&self, context: &mut ConversationContext, user_text: &str) -> TurnOutcome {
        self.run_turn(context, user_text, None).await
    }

    async fn run_turn(
        &self,
        context: &mut ConversationContext,
        user_text: &str,
        session_id: Option<&str>,
    ) -> TurnOutcome {
        let started = Instant::now();

        let (_, decision, urgency) = self.preview(context, user_text);
        let registry = self.router.registry();
        let entry = registry
            .get(&decision.selected_specialist)
            .unwrap_or_else(|| registry.default_entry());

        let input = build_specialist_input(
            context,
            &decision,
            user_text,
            urgency,
            self.settings.history_window,
        );

        let (reply_text, status) = match self.dispatcher.dispatch(entry, &input).await {
            Ok(reply) => {
                self.slots.extract(user_text, &reply, &mut context.state);
                context.record_turn(user_text, &reply, &entry.id);
                (reply, TurnStatus::Completed)
            }
            Err(failure) => (
                self.fallback.classify_and_fallback(&failure, user_text),
                TurnStatus::Fallback {
                    category: failure.category,
                },
            ),
        };
        let response_text = with_notice(&decision, &reply_text);

        let elapsed = started.elapsed();
        self.sink.record(&TurnEvent {
            session_id: session_id.map(str::to_string),
            specialist: entry.id.clone(),
            matched_tags: decision.matched_tags.iter().copied().collect(),
            handoff: decision.handoff_notice.is_some(),
            urgency,
            failure: match status {
                TurnStatus::Fallback { category } => Some(category),
                TurnStatus::Completed => None,
            },
            input_chars: input.chars().count(),
            output_chars: response_text.chars().count(),
            elapsed_ms: elapsed.as_millis() as u64,
            timestamp: Utc::now(),
        });

        debug!(
            "Turn {} via '{}' {}",
            status,
            entry.id,
            format_tags(&decision.matched_tags)
        );

        TurnOutcome {
            response_text,
            reply_text,
            decision,
            status,
            urgency,
            elapsed,
        }
    }

    /// Keep a fallback reply in the history. The previous specialist stays in
    /// charge since none produced this reply. Returns false for completed turns,
    /// which were already recorded.
    pub fn commit_fallback(
        &self,
        context: &mut ConversationContext,
        user_text: &str,
        outcome: &TurnOutcome,
    ) -> bool {
        if !outcome.is_fallback() {
            return false;
        }
        self.slots.extract(user_text, "", &mut context.state);
        let previous = context.last_specialist.clone();
        context.record_turn(user_text, &outcome.reply_text, &previous);
        true
    }

    /// Run one turn against a stored session. Turns of the same session are
    /// serialized; other sessions are not blocked.
    pub async fn handle_session_turn(
        &self,
        store: &dyn SessionStore,
        session_id: &str,
        user_text: &str,
    ) -> Result<TurnOutcome> {
        let guard = self.session_locks.acquire(session_id).await;

        let loaded = store
            .load(session_id)
            .await
            .with_context(|| format!("Failed to load session {}", session_id))?;
        let Some(mut context) = loaded else {
            drop(guard);
            self.session_locks.forget(session_id).await;
            return Err(anyhow::anyhow!("Unknown session: {}", session_id));
        };

        let outcome = self.run_turn(&mut context, user_text, Some(session_id)).await;

        let changed = match outcome.status {
            TurnStatus::Completed => true,
            TurnStatus::Fallback { .. } if self.settings.persist_fallback => {
                self.commit_fallback(&mut context, user_text, &outcome)
            }
            TurnStatus::Fallback { .. } => false,
        };

        if changed {
            store
                .save(session_id, &context)
                .await
                .with_context(|| format!("Failed to save session {}", session_id))?;
        }

        info!(
            "Session {} turn {} via '{}' in {}ms",
            session_id,
            outcome.status,
            outcome.decision.selected_specialist,
            outcome.elapsed.as_millis()
        );

        Ok(outcome)
    }

    /// Release per-session bookkeeping once the caller has ended a session
    pub async fn end_session(&self, session_id: &str) {
        self.session_locks.forget(session_id).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ChannelSink;
    use crate::registry::test_support::{
        CannedSpecialist, FailingSpecialist, SlowSpecialist, canned, healthcare_registry,
    };
    use crate::registry::{Specialist, SpecialistEntry};
    use crate::session::InMemorySessionStore;
    use tokio::sync::mpsc;

    fn concierge() -> Concierge {
        Concierge::new(Arc::new(healthcare_registry()), ConciergeSettings::default())
    }

    /// Healthcare registry where medical_info and emergency use the given handles
    fn registry_with(info: Arc<dyn Specialist>, emergency: Arc<dyn Specialist>) -> Arc<SpecialistRegistry> {
        Arc::new(
            SpecialistRegistry::builder()
                .register(SpecialistEntry::new("emergency", emergency).with_tags([Tag::Urgent]))
                .register(SpecialistEntry::new("medical_info", info).with_tags([Tag::Information]))
                .register(SpecialistEntry::new("booking", canned("booking")).with_tags([Tag::Transactional]))
                .register(SpecialistEntry::new("general", canned("general")))
                .default_specialist("general")
                .build()
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_end_to_end_information_turn() {
        let mut ctx = ConversationContext::new();
        let outcome = concierge().handle_turn(&mut ctx, "What is hypertension?").await;

        assert_eq!(outcome.status, TurnStatus::Completed);
        assert_eq!(outcome.decision.selected_specialist, "medical_info");
        assert_eq!(
            outcome.decision.matched_tags.iter().copied().collect::<Vec<_>>(),
            vec![Tag::Information]
        );
        assert_eq!(outcome.decision.handoff_notice, None);
        assert_eq!(outcome.response_text, "medical_info reply");

        assert_eq!(ctx.messages.len(), 2);
        assert_eq!(ctx.messages[0].text, "What is hypertension?");
        assert_eq!(ctx.messages[1].text, "medical_info reply");
        assert_eq!(ctx.last_specialist, "medical_info");
    }

    #[tokio::test]
    async fn test_urgent_preempts_booking() {
        let mut ctx = ConversationContext::new();
        ctx.last_specialist = "booking".to_string();

        let outcome = concierge()
            .handle_turn(&mut ctx, "book an appointment, I have severe chest pain")
            .await;
        assert_eq!(outcome.decision.selected_specialist, "emergency");
        assert_eq!(outcome.urgency, Urgency::Emergency);
        assert!(outcome.response_text.starts_with(
            "I'm handing you over from Appointment Booking to Emergency Assistance.\n\n"
        ));
        assert!(outcome.response_text.ends_with("emergency reply"));
        assert_eq!(ctx.last_specialist, "emergency");
    }

    #[tokio::test]
    async fn test_default_route_for_small_talk() {
        let mut ctx = ConversationContext::new();
        let outcome = concierge().handle_turn(&mut ctx, "ok").await;
        assert_eq!(outcome.decision.selected_specialist, "general");
        assert!(outcome.decision.matched_tags.is_empty());
    }

    #[tokio::test]
    async fn test_timeout_leaves_context_untouched() {
        let registry = registry_with(
            Arc::new(SlowSpecialist(Duration::from_secs(5))),
            canned("emergency"),
        );
        let concierge = Concierge::new(
            registry,
            ConciergeSettings {
                dispatch_timeout: Duration::from_millis(20),
                ..Default::default()
            },
        );

        let mut ctx = ConversationContext::new();
        ctx.state.insert("date".to_string(), "Monday".to_string());
        ctx.record_turn("hi", "Hello!", "general");
        let before = ctx.clone();

        let outcome = concierge.handle_turn(&mut ctx, "What is hypertension? Tuesday").await;
        assert_eq!(
            outcome.status,
            TurnStatus::Fallback {
                category: ErrorCategory::Connectivity
            }
        );
        assert_eq!(ctx, before);
        assert!(outcome.response_text.contains("couldn't reach"));
        // handoff notice still leads the fallback
        assert!(outcome.response_text.starts_with("I'm handing you over from general to medical_info."));
    }

    #[tokio::test]
    async fn test_urgent_fallback_keeps_emergency_instruction() {
        let registry = registry_with(
            canned("medical_info"),
            Arc::new(FailingSpecialist("connection refused".to_string())),
        );
        let concierge = Concierge::new(registry, ConciergeSettings::default());

        let mut ctx = ConversationContext::new();
        let outcome = concierge.handle_turn(&mut ctx, "my mother is unconscious").await;

        assert!(outcome.is_fallback());
        assert!(outcome.response_text.contains("call emergency services immediately (1122)"));
        assert!(ctx.messages.is_empty());
    }

    #[tokio::test]
    async fn test_slots_captured_on_success() {
        let mut ctx = ConversationContext::new();
        concierge()
            .handle_turn(&mut ctx, "My name is Ali, book me with Dr. Khan on Monday")
            .await;

        assert_eq!(ctx.slot("name"), Some("Ali"));
        assert_eq!(ctx.slot("specialist"), Some("Dr. Khan"));
        assert_eq!(ctx.slot("date"), Some("Monday"));
        assert_eq!(ctx.last_specialist, "booking");
    }

    #[tokio::test]
    async fn test_confirmation_stays_with_booking() {
        let booking = CannedSpecialist::new("Shall I book Dr. Khan for Monday at 10 AM?");
        let registry = Arc::new(
            SpecialistRegistry::builder()
                .register(SpecialistEntry::new("booking", booking.clone()).with_tags([Tag::Transactional]))
                .register(SpecialistEntry::new("general", canned("general")))
                .default_specialist("general")
                .build()
                .unwrap(),
        );
        let concierge = Concierge::new(registry, ConciergeSettings::default());

        let mut ctx = ConversationContext::new();
        concierge.handle_turn(&mut ctx, "I need an appointment").await;
        let outcome = concierge.handle_turn(&mut ctx, "yes").await;

        assert_eq!(outcome.decision.selected_specialist, "booking");
        assert_eq!(outcome.decision.handoff_notice, None);
        assert_eq!(booking.calls(), 2);
        assert_eq!(ctx.slot("time"), Some("10 AM"));
    }

    #[tokio::test]
    async fn test_commit_fallback() {
        let registry = registry_with(
            Arc::new(FailingSpecialist("HTTP 429 Too Many Requests".to_string())),
            canned("emergency"),
        );
        let concierge = Concierge::new(registry, ConciergeSettings::default());

        let mut ctx = ConversationContext::new();
        ctx.last_specialist = "booking".to_string();
        let outcome = concierge.handle_turn(&mut ctx, "what is a migraine? I'm Sara").await;
        assert!(ctx.messages.is_empty());

        assert!(concierge.commit_fallback(&mut ctx, "what is a migraine? I'm Sara", &outcome));
        assert_eq!(ctx.messages.len(), 2);
        assert!(outcome.response_text.starts_with("I'm handing you over from"));
        assert_eq!(ctx.messages[1].text, outcome.reply_text);
        assert!(!ctx.messages[1].text.contains("handing you over"));
        assert_eq!(ctx.last_specialist, "booking");
        assert_eq!(ctx.slot("name"), Some("Sara"));
    }

    #[tokio::test]
    async fn test_commit_fallback_ignores_completed_turns() {
        let concierge = concierge();
        let mut ctx = ConversationContext::new();
        let outcome = concierge.handle_turn(&mut ctx, "hello").await;
        assert!(!concierge.commit_fallback(&mut ctx, "hello", &outcome));
        assert_eq!(ctx.messages.len(), 2);
    }

    #[tokio::test]
    async fn test_events_are_emitted() {
        let (tx, mut rx) = mpsc::channel(8);
        let concierge = concierge().with_event_sink(Arc::new(ChannelSink::new(tx)));

        let mut ctx = ConversationContext::new();
        concierge.handle_turn(&mut ctx, "What is hypertension?").await;

        let event = rx.recv().await.unwrap();
        assert_eq!(event.specialist, "medical_info");
        assert_eq!(event.matched_tags, vec![Tag::Information]);
        assert_eq!(event.failure, None);
        assert_eq!(event.output_chars, "medical_info reply".len());
        assert!(event.input_chars > 0);
    }

    #[tokio::test]
    async fn test_custom_classifier() {
        let keywords = crate::intent::KeywordSets {
            information: vec!["faq".to_string()],
            ..Default::default()
        };
        let concierge = concierge().with_classifier(IntentClassifier::new(keywords));

        let mut ctx = ConversationContext::new();
        let outcome = concierge.handle_turn(&mut ctx, "faq please").await;
        assert_eq!(outcome.decision.selected_specialist, "medical_info");
    }

    #[tokio::test]
    async fn test_session_turns() {
        let store = InMemorySessionStore::new();
        let concierge = concierge();
        let first = store.create().await;
        let second = store.create().await;

        let (a, b) = tokio::join!(
            concierge.handle_session_turn(&store, &first, "What is hypertension?"),
            concierge.handle_session_turn(&store, &second, "book me for Friday"),
        );
        assert_eq!(a.unwrap().decision.selected_specialist, "medical_info");
        assert_eq!(b.unwrap().decision.selected_specialist, "booking");

        let ctx = store.load(&second).await.unwrap().unwrap();
        assert_eq!(ctx.slot("date"), Some("Friday"));
        assert_eq!(ctx.messages.len(), 2);

        assert!(concierge.handle_session_turn(&store, "missing", "hi").await.is_err());
        assert_eq!(concierge.session_locks.len().await, 2);
        concierge.end_session(&first).await;
        assert_eq!(concierge.session_locks.len().await, 1);
    }

    #[tokio::test]
    async fn test_removed_session_releases_its_lock() {
        let store = InMemorySessionStore::new();
        let concierge = concierge();
        let id = store.create().await;

        concierge.handle_session_turn(&store, &id, "hello").await.unwrap();
        assert_eq!(concierge.session_locks.len().await, 1);

        store.remove(&id).await;
        assert!(concierge.handle_session_turn(&store, &id, "hello again").await.is_err());
        assert_eq!(concierge.session_locks.len().await, 0);
    }

    #[tokio::test]
    async fn test_handoff_notice_is_not_read_as_booking_offer() {
        let concierge = concierge();
        let mut ctx = ConversationContext::new();

        let booked = concierge.handle_turn(&mut ctx, "book me for Friday").await;
        assert_eq!(booked.decision.selected_specialist, "booking");

        let info = concierge.handle_turn(&mut ctx, "What is hypertension?").await;
        assert_eq!(info.decision.selected_specialist, "medical_info");
        assert_eq!(
            info.response_text,
            "I'm handing you over from Appointment Booking to Medical Information.\n\nmedical_info reply"
        );
        assert_eq!(ctx.last_assistant_text(), Some("medical_info reply"));

        let ack = concierge.handle_turn(&mut ctx, "ok").await;
        assert_eq!(ack.decision.selected_specialist, "general");
        assert!(ack.decision.matched_tags.is_empty());
    }

    #[tokio::test]
    async fn test_event_lengths_count_characters() {
        let (tx, mut rx) = mpsc::channel(8);
        let registry = registry_with(
            CannedSpecialist::new("La hipertensión es presión arterial alta."),
            canned("emergency"),
        );
        let concierge = Concierge::new(registry, ConciergeSettings::default())
            .with_event_sink(Arc::new(ChannelSink::new(tx)));

        let mut ctx = ConversationContext::new();
        concierge.handle_turn(&mut ctx, "What is hypertension?").await;

        let event = rx.recv().await.unwrap();
        assert_eq!(event.output_chars, 41);
        assert!(event.output_chars < "La hipertensión es presión arterial alta.".len());
    }

    #[tokio::test]
    async fn test_session_fallback_persistence_setting() {
        let failing: Arc<dyn Specialist> = Arc::new(FailingSpecialist("boom".to_string()));
        let store = InMemorySessionStore::new();

        let keep = Concierge::new(registry_with(failing.clone(), canned("e")), ConciergeSettings::default());
        let id = store.create().await;
        let outcome = keep.handle_session_turn(&store, &id, "What is hypertension?").await.unwrap();
        assert_eq!(outcome.status, TurnStatus::Fallback { category: ErrorCategory::Unknown });
        assert_eq!(store.load(&id).await.unwrap().unwrap().messages.len(), 2);

        let discard = Concierge::new(
            registry_with(failing, canned("e")),
            ConciergeSettings {
                persist_fallback: false,
                ..Default::default()
            },
        );
        let id = store.create().await;
        discard.handle_session_turn(&store, &id, "What is hypertension?").await.unwrap();
        assert!(store.load(&id).await.unwrap().unwrap().messages.is_empty());
    }
}
