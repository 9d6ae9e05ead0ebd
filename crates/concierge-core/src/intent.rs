//! Tiered keyword intent classification
//!
//! Each [`Tag`] has a phrase set; an utterance matches a tag when its lowercased
//! text contains any phrase of that set. Every matching tag is reported, in
//! priority order, and callers act on the highest-priority one. Matching is
//! plain substring containment, so results are deterministic and cheap.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::{Tag, Urgency};

/// Phrase sets used by the classifier. Every field can be overridden from
/// configuration; missing fields fall back to the built-in healthcare vocabulary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KeywordSets {
    #[serde(default = "default_urgent")]
    pub urgent: Vec<String>,
    #[serde(default = "default_symptom")]
    pub symptom: Vec<String>,
    #[serde(default = "default_information")]
    pub information: Vec<String>,
    #[serde(default = "default_transactional", alias = "booking")]
    pub transactional: Vec<String>,
    /// Short replies that accept whatever the assistant just offered
    #[serde(default = "default_confirmations")]
    pub confirmations: Vec<String>,
    #[serde(default = "default_high_severity")]
    pub high_severity: Vec<String>,
    #[serde(default = "default_low_severity")]
    pub low_severity: Vec<String>,
}

fn phrases(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn default_urgent() -> Vec<String> {
    phrases(&[
        "chest pain",
        "difficulty breathing",
        "can't breathe",
        "cannot breathe",
        "not breathing",
        "severe pain",
        "emergency",
        "unconscious",
        "passed out",
        "stroke",
        "heart attack",
        "bleeding",
        "overdose",
        "choking",
    ])
}

fn default_symptom() -> Vec<String> {
    phrases(&[
        // cardiology
        "chest",
        "heart",
        "palpitation",
        "blood pressure",
        "shortness of breath",
        // neurology
        "headache",
        "migraine",
        "dizziness",
        "dizzy",
        "numbness",
        "tingling",
        "seizure",
        // dermatology
        "skin",
        "rash",
        "acne",
        "allergy",
        "itching",
        "itchy",
        // orthopedics
        "bone",
        "joint",
        "fracture",
        "arthritis",
        "back pain",
        // general complaints
        "pain",
        "ache",
        "fever",
        "cough",
        "nausea",
        "vomit",
        "sore throat",
        "symptom",
        "feel sick",
        "feeling sick",
        "hurts",
    ])
}

fn default_information() -> Vec<String> {
    phrases(&[
        "what is",
        "what are",
        "what's",
        "tell me about",
        "explain",
        "information about",
        "info on",
        "how does",
        "how do",
        "meaning of",
        "define",
        "causes of",
        "treatment for",
        "side effects",
        "learn about",
    ])
}

fn default_transactional() -> Vec<String> {
    phrases(&[
        "book",
        "schedule",
        "reserve",
        "appointment",
        "reschedule",
        "cancel my",
        "availability",
        "available slot",
    ])
}

fn default_confirmations() -> Vec<String> {
    phrases(&[
        "yes",
        "yes please",
        "yeah",
        "yep",
        "ok",
        "okay",
        "sure",
        "please do",
        "go ahead",
        "sounds good",
        "that works",
        "confirm",
        "alright",
        "fine",
    ])
}

fn default_high_severity() -> Vec<String> {
    phrases(&["severe", "worst", "unbearable", "extreme", "intense"])
}

fn default_low_severity() -> Vec<String> {
    phrases(&["mild", "slight", "minor", "a little", "a bit"])
}

impl Default for KeywordSets {
    fn default() -> Self {
        Self {
            urgent: default_urgent(),
            symptom: default_symptom(),
            information: default_information(),
            transactional: default_transactional(),
            confirmations: default_confirmations(),
            high_severity: default_high_severity(),
            low_severity: default_low_severity(),
        }
    }
}

impl KeywordSets {
    pub fn for_tag(&self, tag: Tag) -> &[String] {
        match tag {
            Tag::Urgent => &self.urgent,
            Tag::Symptom => &self.symptom,
            Tag::Information => &self.information,
            Tag::Transactional => &self.transactional,
        }
    }
}

/// Deterministic tiered classifier
#[derive(Debug, Clone)]
pub struct IntentClassifier {
    tiers: Vec<(Tag, Vec<String>)>,
    confirmations: Vec<String>,
    high_severity: Vec<String>,
    low_severity: Vec<String>,
}

impl Default for IntentClassifier {
    fn default() -> Self {
        Self::new(KeywordSets::default())
    }
}

fn normalize_all(list: &[String]) -> Vec<String> {
    list.iter()
        .map(|p| p.trim().to_lowercase())
        .filter(|p| !p.is_empty())
        .collect()
}

/// Lowercase, trim, and drop trailing punctuation
fn normalize_reply(text: &str) -> String {
    text.trim()
        .trim_end_matches(|c: char| c.is_ascii_punctuation())
        .trim()
        .to_lowercase()
}

impl IntentClassifier {
    pub fn new(keywords: KeywordSets) -> Self {
        let tiers = Tag::ALL
            .iter()
            .map(|tag| (*tag, normalize_all(keywords.for_tag(*tag))))
            .collect();

        Self {
            tiers,
            confirmations: normalize_all(&keywords.confirmations),
            high_severity: normalize_all(&keywords.high_severity),
            low_severity: normalize_all(&keywords.low_severity),
        }
    }

    /// All matching tags, highest priority first. Empty means "general".
    pub fn classify(&self, utterance: &str) -> Vec<Tag> {
        let lower = utterance.to_lowercase();
        let tags: Vec<Tag> = self
            .tiers
            .iter()
            .filter(|(_, phrases)| phrases.iter().any(|p| lower.contains(p.as_str())))
            .map(|(tag, _)| *tag)
            .collect();

        debug!("Classified {:?} as {:?}", utterance, tags);
        tags
    }

    /// Highest-priority matching tag
    pub fn primary(&self, utterance: &str) -> Option<Tag> {
        self.classify(utterance).into_iter().next()
    }

    /// Classify an utterance in light of the assistant's previous output.
    ///
    /// Identical to [`classify`](Self::classify) unless the utterance matches
    /// nothing and is a bare confirmation ("yes", "ok", ...). A confirmation
    /// of a booking offer keeps the transactional tag so the turn stays with
    /// the booking specialist.
    pub fn classify_turn(&self, utterance: &str, last_assistant: Option<&str>) -> Vec<Tag> {
        let tags = self.classify(utterance);
        if !tags.is_empty() || !self.is_confirmation(utterance) {
            return tags;
        }

        let Some(previous) = last_assistant else {
            return tags;
        };

        let lower = previous.to_lowercase();
        let offered_booking = self
            .tiers
            .iter()
            .filter(|(tag, _)| *tag == Tag::Transactional)
            .any(|(_, phrases)| phrases.iter().any(|p| lower.contains(p.as_str())));

        if offered_booking {
            debug!("Confirmation {:?} carries over the transactional tag", utterance);
            vec![Tag::Transactional]
        } else {
            tags
        }
    }

    /// Whether the text is a short acceptance such as "yes" or "sounds good"
    pub fn is_confirmation(&self, text: &str) -> bool {
        let normalized = normalize_reply(text);
        if normalized.is_empty() || normalized.split_whitespace().count() > 4 {
            return false;
        }
        self.confirmations.iter().any(|c| *c == normalized)
    }

    pub fn is_urgent(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        self.tiers
            .iter()
            .filter(|(tag, _)| *tag == Tag::Urgent)
            .any(|(_, phrases)| phrases.iter().any(|p| lower.contains(p.as_str())))
    }

    /// Grade how pressing the complaint sounds: emergency phrases first, then
    /// high and low severity words, medium otherwise.
    pub fn assess_urgency(&self, text: &str) -> Urgency {
        if self.is_urgent(text) {
            return Urgency::Emergency;
        }

        let lower = text.to_lowercase();
        if self.high_severity.iter().any(|w| lower.contains(w.as_str())) {
            Urgency::High
        } else if self.low_severity.iter().any(|w| lower.contains(w.as_str())) {
            Urgency::Low
        } else {
            Urgency::Medium
        }
    }
}
