//! Specialist registry
//!
//! Maps each specialist identifier to its capability tags and invocation handle.
//! Built once at startup and shared read-only as `Arc<SpecialistRegistry>`.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::RegistryError;
use crate::types::{Tag, TagSet, format_tags};

/// A responder the router can hand a turn to.
///
/// Every specialist has the same shape: composed input in, reply text out.
/// Differences between specialists live in registry metadata only.
#[async_trait]
pub trait Specialist: Send + Sync {
    async fn invoke(&self, composed_input: &str) -> Result<String>;
}

/// Registry metadata plus the handle used to invoke a specialist
#[derive(Clone)]
pub struct SpecialistEntry {
    pub id: String,
    /// Human-readable name used in handoff notices
    pub display_name: String,
    pub capability_tags: TagSet,
    /// Notice shown when a conversation is handed to this specialist.
    /// `{from}` and `{to}` are replaced with display names.
    pub handoff_template: Option<String>,
    pub handle: Arc<dyn Specialist>,
}

impl SpecialistEntry {
    pub fn new(id: impl Into<String>, handle: Arc<dyn Specialist>) -> Self {
        let id = id.into();
        Self {
            display_name: id.clone(),
            id,
            capability_tags: TagSet::new(),
            handoff_template: None,
            handle,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    pub fn with_tags(mut self, tags: impl IntoIterator<Item = Tag>) -> Self {
        self.capability_tags.extend(tags);
        self
    }

    pub fn with_handoff_template(mut self, template: impl Into<String>) -> Self {
        self.handoff_template = Some(template.into());
        self
    }

    pub fn claims(&self, tag: Tag) -> bool {
        self.capability_tags.contains(&tag)
    }
}

impl std::fmt::Debug for SpecialistEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpecialistEntry")
            .field("id", &self.id)
            .field("display_name", &self.display_name)
            .field("capability_tags", &self.capability_tags)
            .field("handoff_template", &self.handoff_template)
            .field("handle", &"<dyn Specialist>")
            .finish()
    }
}

/// Read-only specialist table; registration order is the tie-break priority
#[derive(Debug)]
pub struct SpecialistRegistry {
    entries: Vec<SpecialistEntry>,
    default_index: usize,
}

impl SpecialistRegistry {
    pub fn builder() -> SpecialistRegistryBuilder {
        SpecialistRegistryBuilder::default()
    }

    pub fn get(&self, id: &str) -> Option<&SpecialistEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    /// The general specialist used when no tag is claimed
    pub fn default_entry(&self) -> &SpecialistEntry {
        &self.entries[self.default_index]
    }

    /// First specialist in registration order that claims `tag`
    pub fn first_claiming(&self, tag: Tag) -> Option<&SpecialistEntry> {
        self.entries.iter().find(|e| e.claims(tag))
    }

    pub fn entries(&self) -> &[SpecialistEntry] {
        &self.entries
    }

    pub fn ids(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.id.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct SpecialistRegistryBuilder {
    entries: Vec<SpecialistEntry>,
    default_id: Option<String>,
}

impl SpecialistRegistryBuilder {
    pub fn register(mut self, entry: SpecialistEntry) -> Self {
        debug!(
            "Registering specialist: {} {}",
            entry.id,
            format_tags(&entry.capability_tags)
        );
        self.entries.push(entry);
        self
    }

    pub fn default_specialist(mut self, id: impl Into<String>) -> Self {
        self.default_id = Some(id.into());
        self
    }

    pub fn build(self) -> std::result::Result<SpecialistRegistry, RegistryError> {
        if self.entries.is_empty() {
            return Err(RegistryError::Empty);
        }

        let mut seen = HashSet::new();
        for entry in &self.entries {
            if entry.id.trim().is_empty() {
                return Err(RegistryError::EmptyId);
            }
            if !seen.insert(entry.id.as_str()) {
                return Err(RegistryError::DuplicateId(entry.id.clone()));
            }
        }

        let default_id = self.default_id.ok_or(RegistryError::NoDefault)?;
        let default_index = self
            .entries
            .iter()
            .position(|e| e.id == default_id)
            .ok_or(RegistryError::UnknownDefault(default_id))?;

        info!(
            "Specialist registry built with {} specialists (default: {})",
            self.entries.len(),
            self.entries[default_index].id
        );

        Ok(SpecialistRegistry {
            entries: self.entries,
            default_index,
        })
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn test_registry_lookup() {
        let registry = healthcare_registry();
        assert_eq!(registry.len(), 5);
        assert!(!registry.is_empty());
        assert_eq!(registry.default_entry().id, "general");
        assert_eq!(registry.get("booking").unwrap().display_name, "Appointment Booking");
        assert!(registry.get("billing").is_none());
        assert_eq!(
            registry.ids(),
            vec!["emergency", "symptoms", "medical_info", "booking", "general"]
        );
    }

    #[test]
    fn test_first_claiming_uses_registration_order() {
        let registry = SpecialistRegistry::builder()
            .register(SpecialistEntry::new("triage", canned("triage")).with_tags([Tag::Urgent, Tag::Symptom]))
            .register(SpecialistEntry::new("symptoms", canned("symptoms")).with_tags([Tag::Symptom]))
            .register(SpecialistEntry::new("general", canned("general")))
            .default_specialist("general")
            .build()
            .unwrap();

        assert_eq!(registry.first_claiming(Tag::Symptom).unwrap().id, "triage");
        assert_eq!(registry.first_claiming(Tag::Urgent).unwrap().id, "triage");
        assert!(registry.first_claiming(Tag::Transactional).is_none());
    }

    #[test]
    fn test_build_rejects_empty() {
        let err = SpecialistRegistry::builder().build().unwrap_err();
        assert_eq!(err, RegistryError::Empty);
    }

    #[test]
    fn test_build_rejects_duplicate_id() {
        let err = SpecialistRegistry::builder()
            .register(SpecialistEntry::new("general", canned("a")))
            .register(SpecialistEntry::new("general", canned("b")))
            .default_specialist("general")
            .build()
            .unwrap_err();
        assert_eq!(err, RegistryError::DuplicateId("general".to_string()));
    }

    #[test]
    fn test_build_requires_known_default() {
        let err = SpecialistRegistry::builder()
            .register(SpecialistEntry::new("general", canned("a")))
            .build()
            .unwrap_err();
        assert_eq!(err, RegistryError::NoDefault);

        let err = SpecialistRegistry::builder()
            .register(SpecialistEntry::new("general", canned("a")))
            .default_specialist("fallback")
            .build()
            .unwrap_err();
        assert_eq!(err, RegistryError::UnknownDefault("fallback".to_string()));
    }

    #[test]
    fn test_build_rejects_blank_id() {
        let err = SpecialistRegistry::builder()
            .register(SpecialistEntry::new("  ", canned("a")))
            .default_specialist("  ")
            .build()
            .unwrap_err();
        assert_eq!(err, RegistryError::EmptyId);
    }

    #[test]
    fn test_entry_debug_hides_handle() {
        let entry = SpecialistEntry::new("general", canned("general"));
        let debug = format!("{:?}", entry);
        assert!(debug.contains("general"));
        assert!(debug.contains("<dyn Specialist>"));
    }

    #[tokio::test]
    async fn test_invoke_through_entry() {
        let stub = CannedSpecialist::new("hello there");
        let entry = SpecialistEntry::new("general", stub.clone());
        let reply = entry.handle.invoke("hi").await.unwrap();
        assert_eq!(reply, "hello there");
        assert_eq!(stub.calls(), 1);
    }
}
