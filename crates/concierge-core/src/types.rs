//! Shared types for concierge-core

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who produced a message
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

/// One entry of a conversation history
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Capability tag a specialist can claim and an utterance can match.
///
/// Declaration order is the priority tier: `Urgent` outranks `Symptom`, which
/// outranks `Information`, which outranks `Transactional`. The derived `Ord`
/// follows that order, so a [`TagSet`] always iterates highest tier first.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Tag {
    Urgent,
    Symptom,
    Information,
    #[serde(alias = "booking")]
    Transactional,
}

impl Tag {
    /// All tags, highest priority first
    pub const ALL: [Tag; 4] = [
        Tag::Urgent,
        Tag::Symptom,
        Tag::Information,
        Tag::Transactional,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Urgent => "urgent",
            Self::Symptom => "symptom",
            Self::Information => "information",
            Self::Transactional => "transactional",
        }
    }

    /// Parse a tag name as written in configuration (`booking` is an alias of `transactional`)
    pub fn from_string(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "urgent" => Some(Self::Urgent),
            "symptom" => Some(Self::Symptom),
            "information" => Some(Self::Information),
            "transactional" | "booking" => Some(Self::Transactional),
            _ => None,
        }
    }
}

impl std::fmt::Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered set of tags; iteration order is priority order
pub type TagSet = BTreeSet<Tag>;

/// Render a tag set as `{a, b}` for logs and prompts
pub fn format_tags<'a>(tags: impl IntoIterator<Item = &'a Tag>) -> String {
    let names: Vec<&str> = tags.into_iter().map(|t| t.as_str()).collect();
    format!("{{{}}}", names.join(", "))
}

/// How pressing the reported complaint sounds
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Low,
    #[default]
    Medium,
    High,
    Emergency,
}

impl std::fmt::Display for Urgency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Emergency => write!(f, "emergency"),
        }
    }
}
