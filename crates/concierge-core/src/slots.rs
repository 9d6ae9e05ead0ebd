//! Best-effort slot extraction
//!
//! Each slot has an independent detector: a keyword or shape anchor followed by
//! a bounded token capture. Detectors run on the user's text first and the
//! assistant's reply second. A detected value overwrites the stored one; a
//! missed detection never clears it.
//!
//! Captures can be wrong ("on time", a capitalized word after "I am"). Values
//! are hints for the specialists, not validated records.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

pub const SLOT_NAME: &str = "name";
pub const SLOT_SPECIALIST: &str = "specialist";
pub const SLOT_DATE: &str = "date";
pub const SLOT_TIME: &str = "time";
pub const SLOT_EMAIL: &str = "email";

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("slot pattern is a valid literal regex")
}

/// "my name is", "call me": any-case first token, then up to two capitalized tokens
static NAME_ANCHORED: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"(?i:name is|call me|name:)\s+([A-Za-z][A-Za-z'\-]*(?:\s+[A-Z][A-Za-z'\-]*){0,2})")
});

/// "I am", "I'm", "this is": only capitalized tokens count as a name
static NAME_INTRO: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"\b(?:[Ii] am|[Ii]'m|[Tt]his is)\s+([A-Z][a-z'\-]+(?:\s+[A-Z][a-z'\-]+){0,2})")
});

static DR_TITLE: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"\b(?i:dr)\.?\s+([A-Za-z][A-Za-z'\-]+(?:\s+[A-Z][A-Za-z'\-]+)?)")
});

static DOCTOR_TITLE: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"\b(?i:doctor)\s+([A-Z][A-Za-z'\-]+(?:\s+[A-Z][A-Za-z'\-]+)?)")
});

static DATE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        compile(r"\b(\d{4}-\d{2}-\d{2})\b"),
        compile(r"\b(\d{1,2}/\d{1,2}(?:/\d{2,4})?)\b"),
        compile(
            r"(?i)\b(\d{1,2}(?:st|nd|rd|th)?\s+(?:of\s+)?(?:jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*|(?:jan|feb|mar|apr|jun|jul|aug|sep|oct|nov|dec)[a-z]*\s+\d{1,2}(?:st|nd|rd|th)?)\b",
        ),
        compile(
            r"(?i)\b((?:next\s+|this\s+)?(?:monday|tuesday|wednesday|thursday|friday|saturday|sunday)|day after tomorrow|tomorrow|today)\b",
        ),
        compile(r"(?i)\bon\s+(?:the\s+)?(\d{1,2}(?:st|nd|rd|th))\b"),
    ]
});

static TIME_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        compile(r"(?i)\b(\d{1,2}:\d{2}(?:\s*[ap]\.?m\b)?)"),
        compile(r"(?i)\b(\d{1,2}\s*[ap]\.?m)\b"),
        compile(r"(?i)\b(noon|midday|midnight)\b"),
        compile(r"(?i)\b(?:in the|this|tomorrow)\s+(morning|afternoon|evening)\b"),
        compile(r"(?i)\bat\s+(\d{1,2}(?::\d{2})?)\b"),
    ]
});

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"\b([A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,})\b")
});

/// Words that end a captured proper name
const NAME_STOPWORDS: &[&str] = &[
    "dr", "doctor", "on", "at", "today", "tomorrow", "monday", "tuesday", "wednesday", "thursday",
    "friday", "saturday", "sunday", "please", "and",
];

/// Words kept lowercase when normalizing a date
const DATE_LOWERCASE: &[&str] = &["next", "this", "of", "day", "after", "today", "tomorrow"];

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Capitalize tokens, drop a possessive suffix, stop at the first stopword
fn clean_name(raw: &str) -> Option<String> {
    let mut tokens = Vec::new();
    for token in raw.split_whitespace() {
        if NAME_STOPWORDS.contains(&token.to_lowercase().as_str()) {
            break;
        }
        let token = token.strip_suffix("'s").unwrap_or(token);
        tokens.push(capitalize(token));
    }
    if tokens.is_empty() {
        None
    } else {
        Some(tokens.join(" "))
    }
}

fn first_capture(pattern: &Regex, text: &str) -> Option<String> {
    pattern
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
}

fn detect_name(text: &str) -> Option<String> {
    first_capture(&NAME_ANCHORED, text)
        .or_else(|| first_capture(&NAME_INTRO, text))
        .and_then(|raw| clean_name(&raw))
}

fn detect_specialist(text: &str) -> Option<String> {
    first_capture(&DR_TITLE, text)
        .or_else(|| first_capture(&DOCTOR_TITLE, text))
        .and_then(|raw| clean_name(&raw))
        .map(|name| format!("Dr. {}", name))
}

fn detect_date(text: &str) -> Option<String> {
    let raw = DATE_PATTERNS.iter().find_map(|p| first_capture(p, text))?;
    let words: Vec<String> = raw
        .split_whitespace()
        .map(|w| {
            let lower = w.to_lowercase();
            if DATE_LOWERCASE.contains(&lower.as_str()) || !lower.chars().all(char::is_alphabetic) {
                lower
            } else {
                capitalize(&lower)
            }
        })
        .collect();
    Some(words.join(" "))
}

fn detect_time(text: &str) -> Option<String> {
    let raw = TIME_PATTERNS.iter().find_map(|p| first_capture(p, text))?;
    let compact = raw.replace('.', "").to_uppercase();
    for suffix in ["AM", "PM"] {
        if let Some(clock) = compact.strip_suffix(suffix) {
            return Some(format!("{} {}", clock.trim(), suffix));
        }
    }
    Some(compact.to_lowercase())
}

fn detect_email(text: &str) -> Option<String> {
    first_capture(&EMAIL, text).map(|e| e.to_lowercase())
}

/// One slot and the detector that fills it
#[derive(Debug, Clone, Copy)]
pub struct SlotRule {
    pub slot: &'static str,
    detect: fn(&str) -> Option<String>,
}

impl SlotRule {
    pub fn new(slot: &'static str, detect: fn(&str) -> Option<String>) -> Self {
        Self { slot, detect }
    }

    pub fn detect(&self, text: &str) -> Option<String> {
        (self.detect)(text).filter(|v| !v.trim().is_empty())
    }
}

#[derive(Debug, Clone)]
pub struct SlotExtractor {
    rules: Vec<SlotRule>,
}

impl Default for SlotExtractor {
    fn default() -> Self {
        Self::new(vec![
            SlotRule::new(SLOT_NAME, detect_name),
            SlotRule::new(SLOT_SPECIALIST, detect_specialist),
            SlotRule::new(SLOT_DATE, detect_date),
            SlotRule::new(SLOT_TIME, detect_time),
            SlotRule::new(SLOT_EMAIL, detect_email),
        ])
    }
}

impl SlotExtractor {
    pub fn new(rules: Vec<SlotRule>) -> Self {
        Self { rules }
    }

    pub fn with_rule(mut self, rule: SlotRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn slots(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.slot).collect()
    }

    /// Update `state` from one user/assistant exchange
    pub fn extract(&self, user_text: &str, assistant_text: &str, state: &mut BTreeMap<String, String>) {
        for rule in &self.rules {
            let Some(value) = rule.detect(user_text).or_else(|| rule.detect(assistant_text)) else {
                continue;
            };

            if state.get(rule.slot) != Some(&value) {
                debug!("Captured slot {} = {:?}", rule.slot, value);
            }
            state.insert(rule.slot.to_string(), value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(user: &str, assistant: &str) -> BTreeMap<String, String> {
        let mut state = BTreeMap::new();
        SlotExtractor::default().extract(user, assistant, &mut state);
        state
    }

    #[test]
    fn test_name_slot() {
        assert_eq!(extract("My name is Ali Khan", "")["name"], "Ali Khan");
        assert_eq!(extract("my name is sara", "")["name"], "Sara");
        assert_eq!(extract("I'm Fatima and I need help", "")["name"], "Fatima");
        assert!(!extract("I am feeling dizzy", "").contains_key("name"));
        assert!(!extract("This is Dr. Khan's office", "").contains_key("name"));
    }

    #[test]
    fn test_specialist_slot() {
        assert_eq!(
            extract("I want to see Dr. Ahmed Khan on Monday", "")["specialist"],
            "Dr. Ahmed Khan"
        );
        assert_eq!(extract("book me with dr khan", "")["specialist"], "Dr. Khan");
        assert_eq!(extract("is Doctor Sana Malik free", "")["specialist"], "Dr. Sana Malik");
        assert_eq!(extract("This is Dr. Khan's office", "")["specialist"], "Dr. Khan");
        assert!(!extract("I need a doctor appointment", "").contains_key("specialist"));
    }

    #[test]
    fn test_date_slot() {
        assert_eq!(extract("can we do 2025-03-14?", "")["date"], "2025-03-14");
        assert_eq!(extract("how about 14/03", "")["date"], "14/03");
        assert_eq!(extract("the 5th of march works", "")["date"], "5th of March");
        assert_eq!(extract("next monday please", "")["date"], "next Monday");
        assert_eq!(extract("tomorrow morning", "")["date"], "tomorrow");
        assert_eq!(extract("on the 12th if possible", "")["date"], "12th");
    }

    #[test]
    fn test_time_slot() {
        assert_eq!(extract("at 10:30 a.m. please", "")["time"], "10:30 AM");
        assert_eq!(extract("3pm works", "")["time"], "3 PM");
        assert_eq!(extract("around noon", "")["time"], "noon");
        assert_eq!(extract("tomorrow morning", "")["time"], "morning");
        assert_eq!(extract("at 4 if you can", "")["time"], "4");
        assert!(!extract("good morning", "").contains_key("time"));
    }

    #[test]
    fn test_email_slot() {
        let state = extract("reach me at Ali.Khan@Example.com", "");
        assert_eq!(state["email"], "ali.khan@example.com");
        assert!(!state.contains_key("time"));
    }

    #[test]
    fn test_failed_detection_never_erases() {
        let mut state = BTreeMap::new();
        state.insert("date".to_string(), "Monday".to_string());
        SlotExtractor::default().extract("thanks for the help", "You're welcome", &mut state);
        assert_eq!(state["date"], "Monday");
    }

    #[test]
    fn test_new_value_overwrites() {
        let mut state = BTreeMap::new();
        state.insert("date".to_string(), "Monday".to_string());
        SlotExtractor::default().extract("actually make it Tuesday", "", &mut state);
        assert_eq!(state["date"], "Tuesday");
    }

    #[test]
    fn test_user_text_wins_over_assistant() {
        let state = extract("Friday please", "Monday is available");
        assert_eq!(state["date"], "Friday");
    }

    #[test]
    fn test_assistant_text_fills_gaps() {
        let state = extract(
            "yes",
            "I've booked you with Dr. Ahmed Khan on Monday at 10 AM.",
        );
        assert_eq!(state["specialist"], "Dr. Ahmed Khan");
        assert_eq!(state["date"], "Monday");
        assert_eq!(state["time"], "10 AM");
    }

    #[test]
    fn test_custom_rule() {
        fn detect_phone(text: &str) -> Option<String> {
            text.split_whitespace()
                .find(|w| w.len() >= 10 && w.chars().all(|c| c.is_ascii_digit()))
                .map(str::to_string)
        }

        let extractor = SlotExtractor::default().with_rule(SlotRule::new("phone", detect_phone));
        assert!(extractor.slots().contains(&"phone"));

        let mut state = BTreeMap::new();
        extractor.extract("call 03001234567", "", &mut state);
        assert_eq!(state["phone"], "03001234567");
    }
}
