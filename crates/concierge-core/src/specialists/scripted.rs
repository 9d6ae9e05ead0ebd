//! Fixed-reply specialist
//!
//! Answers without any backend, so it keeps working when the model endpoint
//! is down. Used for emergency guidance.

use anyhow::Result;
use async_trait::async_trait;

use crate::registry::Specialist;

pub const EMERGENCY_GUIDANCE: &str = "This could be a medical emergency. Please call emergency services immediately ({emergency_number}) or go to the nearest emergency room. Do not wait for an appointment. If someone is with you, ask them to stay with you until help arrives.";

#[derive(Debug, Clone)]
pub struct ScriptedSpecialist {
    reply: String,
}

impl ScriptedSpecialist {
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
        }
    }

    /// Emergency guidance naming the given number
    pub fn emergency(emergency_number: &str) -> Self {
        Self::new(EMERGENCY_GUIDANCE).with_emergency_number(emergency_number)
    }

    /// Replace `{emergency_number}` in the reply
    pub fn with_emergency_number(mut self, number: &str) -> Self {
        self.reply = self.reply.replace("{emergency_number}", number);
        self
    }

    pub fn reply(&self) -> &str {
        &self.reply
    }
}

#[async_trait]
impl Specialist for ScriptedSpecialist {
    async fn invoke(&self, _composed_input: &str) -> Result<String> {
        Ok(self.reply.clone())
    }
}
