use anyhow::{Context, Result, anyhow};
use concierge_core::specialists::{OpenAiCompatSpecialist, ScriptedSpecialist};
use concierge_core::{ConciergeSettings, KeywordSets, Specialist, SpecialistEntry, SpecialistRegistry, Tag};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Built-in configuration, also written by `concierge init`
pub const DEFAULT_CONFIG: &str = include_str!("../../../config/default.toml");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConciergeConfig {
    #[serde(default)]
    pub router: RouterConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub keywords: KeywordSets,
    #[serde(default)]
    pub specialists: Vec<SpecialistConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    #[serde(default = "default_specialist_id")]
    pub default_specialist: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_history_window")]
    pub history_window: usize,
    #[serde(default = "default_emergency_number")]
    pub emergency_number: String,
    #[serde(default = "default_persist_fallback_replies")]
    pub persist_fallback_replies: bool,
}

fn default_specialist_id() -> String {
    "general".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_history_window() -> usize {
    10
}

fn default_emergency_number() -> String {
    "1122".to_string()
}

fn default_persist_fallback_replies() -> bool {
    true
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            default_specialist: default_specialist_id(),
            timeout_secs: default_timeout_secs(),
            history_window: default_history_window(),
            emergency_number: default_emergency_number(),
            persist_fallback_replies: default_persist_fallback_replies(),
        }
    }
}

/// OpenAI-compatible endpoint shared by every `llm` specialist
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &mask_secret(&self.api_key))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

fn default_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta/openai".to_string()
}

fn default_model() -> String {
    "gemini-2.0-flash".to_string()
}

fn default_max_tokens() -> u32 {
    1024
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_base_url(),
            model: default_model(),
            max_tokens: default_max_tokens(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SpecialistKind {
    /// Answered by the configured chat completion endpoint
    #[default]
    Llm,
    /// Fixed reply, no network
    Scripted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecialistConfig {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub kind: SpecialistKind,
    /// System instructions for `llm` specialists
    #[serde(default)]
    pub instructions: String,
    /// Reply for `scripted` specialists; `{emergency_number}` is substituted
    #[serde(default)]
    pub reply: Option<String>,
    #[serde(default)]
    pub handoff_message: Option<String>,
}

/// Mask a secret for Debug output and `concierge config`.
/// Shows the first 3 and last 4 chars of keys longer than 7 chars.
pub fn mask_secret(s: &str) -> String {
    if s.is_empty() {
        return "(empty)".to_string();
    }
    let chars: Vec<char> = s.chars().collect();
    if chars.len() > 7 {
        let prefix: String = chars[..3].iter().collect();
        let suffix: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", prefix, suffix)
    } else {
        "***".to_string()
    }
}

pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".concierge")
}

pub fn default_config_path() -> PathBuf {
    config_dir().join("config.toml")
}

impl ConciergeConfig {
    /// Load from `custom_path`, or from `~/.concierge/config.toml`. When no
    /// custom path is given and the default file does not exist, the built-in
    /// configuration is used.
    pub fn load(custom_path: &Option<PathBuf>) -> Result<Self> {
        let path = match custom_path {
            Some(path) => path.clone(),
            None => {
                let path = default_config_path();
                if !path.exists() {
                    info!(
                        "No config at {}, using built-in defaults (run `concierge init` to customize)",
                        path.display()
                    );
                    return Self::parse(DEFAULT_CONFIG, "built-in config");
                }
                path
            }
        };

        check_permissions(&path)?;

        let content = std::fs::read_to_string(&path).with_context(|| {
            format!(
                "Failed to read config at {}. Run `concierge init` first.",
                path.display()
            )
        })?;

        let config = Self::parse(&content, &path.display().to_string())?;

        if !config.provider.api_key.is_empty() && !content.contains("${") {
            warn!(
                "API key is hardcoded in config file. For security, use environment variables: api_key = \"${{GEMINI_API_KEY}}\""
            );
        }

        Ok(config)
    }

    /// Expand allowed `${VAR}` references, parse and validate
    pub fn parse(content: &str, origin: &str) -> Result<Self> {
        let expanded = expand_env_vars(content);
        let config: Self = toml::from_str(&expanded)
            .with_context(|| format!("Failed to parse config at {}", origin))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.specialists.is_empty() {
            return Err(anyhow!("Config defines no [[specialists]]"));
        }
        for sc in &self.specialists {
            if sc.kind == SpecialistKind::Scripted && sc.reply.is_none() {
                return Err(anyhow!(
                    "Scripted specialist '{}' needs a `reply`",
                    sc.id
                ));
            }
        }
        Ok(())
    }

    pub fn settings(&self) -> ConciergeSettings {
        ConciergeSettings {
            dispatch_timeout: Duration::from_secs(self.router.timeout_secs),
            history_window: self.router.history_window,
            emergency_number: self.router.emergency_number.clone(),
            persist_fallback: self.router.persist_fallback_replies,
        }
    }

    /// Build the specialist handles and the registry, in config order
    pub fn build_registry(&self) -> Result<SpecialistRegistry> {
        let uses_llm = self
            .specialists
            .iter()
            .any(|s| s.kind == SpecialistKind::Llm);
        if uses_llm && self.provider.api_key.is_empty() {
            warn!("provider.api_key is empty; llm specialists will answer with fallbacks");
        }

        let mut builder = SpecialistRegistry::builder();
        for sc in &self.specialists {
            let handle: Arc<dyn Specialist> = match sc.kind {
                SpecialistKind::Llm => Arc::new(
                    OpenAiCompatSpecialist::new(
                        self.provider.api_key.clone(),
                        self.provider.base_url.clone(),
                        self.provider.model.clone(),
                        self.provider.max_tokens,
                        sc.instructions.clone(),
                    )
                    .with_context(|| format!("Failed to create specialist '{}'", sc.id))?,
                ),
                SpecialistKind::Scripted => Arc::new(
                    ScriptedSpecialist::new(sc.reply.clone().unwrap_or_default())
                        .with_emergency_number(&self.router.emergency_number),
                ),
            };

            let mut entry = SpecialistEntry::new(sc.id.clone(), handle).with_tags(sc.tags.iter().copied());
            if let Some(name) = &sc.name {
                entry = entry.with_display_name(name.clone());
            }
            if let Some(template) = &sc.handoff_message {
                entry = entry.with_handoff_template(template.clone());
            }
            builder = builder.register(entry);
        }

        builder
            .default_specialist(self.router.default_specialist.clone())
            .build()
            .context("Invalid [[specialists]] configuration")
    }

    /// Copy with secrets masked, for display
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        copy.provider.api_key = mask_secret(&self.provider.api_key);
        copy
    }
}

/// Refuse config files readable by group or other (Unix only); they may hold keys
fn check_permissions(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Ok(metadata) = std::fs::metadata(path) {
            let mode = metadata.permissions().mode();
            if mode & 0o077 != 0 {
                return Err(anyhow!(
                    "Config file {:?} has overly permissive permissions ({:o}). \
                     It may contain secrets. Fix with: chmod 600 {:?}",
                    path,
                    mode & 0o777,
                    path
                ));
            }
        }
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}

/// Environment variables that may be expanded in config files
const ALLOWED_ENV_VARS: &[&str] = &[
    "GEMINI_API_KEY",
    "OPENAI_API_KEY",
    "CONCIERGE_API_KEY",
    "CONCIERGE_BASE_URL",
    "EMERGENCY_NUMBER",
    "HOME",
    "USER",
];

fn expand_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    let mut pos = 0;
    while pos < result.len() {
        let Some(start) = result[pos..].find("${") else {
            break;
        };
        let abs_start = pos + start;
        let Some(end) = result[abs_start..].find('}') else {
            break;
        };
        let var_name = result[abs_start + 2..abs_start + end].to_string();

        if !ALLOWED_ENV_VARS.contains(&var_name.as_str()) {
            warn!(
                "Skipping expansion of unrecognized env var '{}' in config (not in allowlist)",
                var_name
            );
            pos = abs_start + end + 1;
            continue;
        }

        let value = std::env::var(&var_name).unwrap_or_default();
        result = format!(
            "{}{}{}",
            &result[..abs_start],
            value,
            &result[abs_start + end + 1..]
        );
        pos = abs_start + value.len();
    }
    result
}
