//! Concrete specialist handles

pub mod openai_compat;
pub mod scripted;

pub use openai_compat::OpenAiCompatSpecialist;
pub use scripted::{EMERGENCY_GUIDANCE, ScriptedSpecialist};
