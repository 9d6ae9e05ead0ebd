//! Specialist invocation under a timeout

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::task::AbortOnDropHandle;
use tracing::{debug, warn};

use crate::error::{ErrorCategory, FailureRecord};
use crate::registry::SpecialistEntry;

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
        }
    }
}

/// Calls a specialist exactly once and turns every way that call can go
/// wrong into a [`FailureRecord`].
#[derive(Debug, Clone, Default)]
pub struct Dispatcher {
    config: DispatcherConfig,
}

impl Dispatcher {
    pub fn new(config: DispatcherConfig) -> Self {
        Self { config }
    }

    pub fn timeout(&self) -> Duration {
        self.config.timeout
    }

    pub async fn dispatch(
        &self,
        entry: &SpecialistEntry,
        composed_input: &str,
    ) -> Result<String, FailureRecord> {
        self.dispatch_with_timeout(entry, composed_input, self.config.timeout)
            .await
    }

    /// Run the invocation on its own task. The task is aborted on timeout and
    /// when this future is dropped, so nothing is left running either way.
    pub async fn dispatch_with_timeout(
        &self,
        entry: &SpecialistEntry,
        composed_input: &str,
        timeout: Duration,
    ) -> Result<String, FailureRecord> {
        let handle = Arc::clone(&entry.handle);
        let input = composed_input.to_string();
        let started = Instant::now();

        let mut task = AbortOnDropHandle::new(tokio::spawn(async move { handle.invoke(&input).await }));
        let result = tokio::time::timeout(timeout, &mut task).await;

        match result {
            Ok(Ok(Ok(reply))) => {
                if reply.trim().is_empty() {
                    warn!("Specialist '{}' returned an empty reply", entry.id);
                    return Err(FailureRecord::new(
                        ErrorCategory::Processing,
                        format!("specialist '{}' returned an empty reply", entry.id),
                    ));
                }
                debug!(
                    "Specialist '{}' replied in {}ms ({} chars)",
                    entry.id,
                    started.elapsed().as_millis(),
                    reply.chars().count()
                );
                Ok(reply)
            }
            Ok(Ok(Err(e))) => {
                let record = FailureRecord::from_raw(format!("{:#}", e));
                warn!("Specialist '{}' failed: {}", entry.id, record);
                Err(record)
            }
            Ok(Err(join_error)) => {
                warn!("Specialist '{}' panicked: {}", entry.id, join_error);
                Err(FailureRecord::new(
                    ErrorCategory::Unknown,
                    format!("specialist '{}' panicked: {}", entry.id, join_error),
                ))
            }
            Err(_) => {
                task.abort();
                warn!(
                    "Specialist '{}' timed out after {}ms",
                    entry.id,
                    timeout.as_millis()
                );
                Err(FailureRecord::new(
                    ErrorCategory::Connectivity,
                    format!(
                        "specialist '{}' timed out after {}ms",
                        entry.id,
                        timeout.as_millis()
                    ),
                ))
            }
        }
    }
}
