//! Cron-driven run scheduling
//!
//! Each enabled schedule definition gets its own task that sleeps until the
//! next cron fire time and then executes one run through the [`RunHandler`].
//! Definitions are validated up front; a single bad cron expression fails
//! startup rather than silently dropping the schedule.
//!
//! Classic 5-field crontab expressions are accepted and normalized by
//! prepending a seconds field of `0`.
//!
//! [`Scheduler::stop`] signals every task and then waits for them, so an
//! in-flight run always finishes before shutdown completes.

use async_trait::async_trait;
use chrono::Utc;
use cron::Schedule;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::models::{RunOutcome, ScheduleDefinition};
use crate::orchestrator::RunContext;

/// Scheduler startup errors.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// A definition carries an unparseable cron expression
    #[error("invalid cron '{expression}' in schedule '{id}': {reason}")]
    InvalidCron {
        id: String,
        expression: String,
        reason: String,
    },

    /// No definition is enabled; the caller should fall back to a single
    /// immediate run
    #[error("no enabled schedule definitions")]
    NothingToSchedule,
}

/// Executes one run for a triggered schedule.
#[async_trait]
pub trait RunHandler: Send + Sync {
    async fn execute(&self, ctx: RunContext) -> RunOutcome;
}

/// Drives schedule definitions against a [`RunHandler`].
pub struct Scheduler {
    handler: Arc<dyn RunHandler>,
    definitions: Vec<ScheduleDefinition>,
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl Scheduler {
    pub fn new(handler: Arc<dyn RunHandler>, definitions: Vec<ScheduleDefinition>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            handler,
            definitions,
            shutdown,
            handles: Vec::new(),
        }
    }

    /// Validate every enabled definition and spawn its timer task.
    pub fn start(&mut self) -> Result<(), SchedulerError> {
        let enabled: Vec<&ScheduleDefinition> =
            self.definitions.iter().filter(|d| d.enabled).collect();
        if enabled.is_empty() {
            return Err(SchedulerError::NothingToSchedule);
        }

        // parse everything before spawning anything
        let mut parsed = Vec::with_capacity(enabled.len());
        for definition in enabled {
            parsed.push((definition.clone(), parse_cron(definition)?));
        }

        for (definition, schedule) in parsed {
            tracing::info!(
                schedule = %definition.id,
                cron = %definition.cron,
                "Schedule armed"
            );
            let handler = Arc::clone(&self.handler);
            let mut shutdown = self.shutdown.subscribe();

            self.handles.push(tokio::spawn(async move {
                loop {
                    let Some(next) = schedule.upcoming(Utc).next() else {
                        tracing::warn!(schedule = %definition.id, "No future fire times; schedule retired");
                        break;
                    };
                    let delay = (next - Utc::now())
                        .to_std()
                        .unwrap_or(Duration::ZERO);
                    tracing::debug!(
                        schedule = %definition.id,
                        fire_at = %next,
                        "Sleeping until next fire"
                    );

                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {
                            let ctx = RunContext::from_schedule(&definition);
                            let outcome = handler.execute(ctx).await;
                            if !outcome.is_success() {
                                tracing::error!(
                                    schedule = %definition.id,
                                    error = outcome.error.as_deref().unwrap_or("unknown"),
                                    "Scheduled run failed"
                                );
                            }
                        }
                        _ = shutdown.changed() => break,
                    }
                }
            }));
        }

        Ok(())
    }

    /// Signal shutdown and wait for every schedule task to finish.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        for handle in self.handles {
            let _ = handle.await;
        }
        tracing::info!("Scheduler stopped");
    }
}

/// Parse a definition's cron expression, accepting the 5-field form.
fn parse_cron(definition: &ScheduleDefinition) -> Result<Schedule, SchedulerError> {
    let normalized = normalize_cron(&definition.cron);
    Schedule::from_str(&normalized).map_err(|e| SchedulerError::InvalidCron {
        id: definition.id.clone(),
        expression: definition.cron.clone(),
        reason: e.to_string(),
    })
}

/// Prepend a `0` seconds field to classic 5-field crontab expressions.
fn normalize_cron(expression: &str) -> String {
    let trimmed = expression.trim();
    if trimmed.split_whitespace().count() == 5 {
        format!("0 {trimmed}")
    } else {
        trimmed.to_string()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn definition(id: &str, cron: &str, enabled: bool) -> ScheduleDefinition {
        ScheduleDefinition {
            id: id.to_string(),
            module: None,
            cron: cron.to_string(),
            prompt_key: "daily".to_string(),
            generator: "openai".to_string(),
            enabled,
        }
    }

    #[test]
    fn test_normalize_cron_five_fields() {
        assert_eq!(normalize_cron("0 9 * * *"), "0 0 9 * * *");
        assert_eq!(normalize_cron("  */5 * * * 1-5 "), "0 */5 * * * 1-5");
    }

    #[test]
    fn test_normalize_cron_six_fields_untouched() {
        assert_eq!(normalize_cron("30 0 9 * * *"), "30 0 9 * * *");
    }

    #[test]
    fn test_parse_cron_accepts_both_forms() {
        assert!(parse_cron(&definition("a", "0 9 * * *", true)).is_ok());
        assert!(parse_cron(&definition("b", "0 0 9 * * *", true)).is_ok());
    }

    #[test]
    fn test_parse_cron_rejects_garbage() {
        let err = parse_cron(&definition("bad", "not a cron", true)).unwrap_err();
        let SchedulerError::InvalidCron { id, expression, .. } = err else {
            panic!("expected InvalidCron");
        };
        assert_eq!(id, "bad");
        assert_eq!(expression, "not a cron");
    }

    #[test]
    fn test_start_with_no_enabled_definitions() {
        struct NoopHandler;

        #[async_trait]
        impl RunHandler for NoopHandler {
            async fn execute(&self, ctx: RunContext) -> RunOutcome {
                RunOutcome::skipped(ctx.schedule_id)
            }
        }

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        runtime.block_on(async {
            let mut scheduler = Scheduler::new(
                Arc::new(NoopHandler),
                vec![definition("off", "0 9 * * *", false)],
            );
            assert!(matches!(
                scheduler.start(),
                Err(SchedulerError::NothingToSchedule)
            ));
        });
    }

    #[test]
    fn test_start_fails_on_bad_cron_before_spawning() {
        struct NoopHandler;

        #[async_trait]
        impl RunHandler for NoopHandler {
            async fn execute(&self, ctx: RunContext) -> RunOutcome {
                RunOutcome::skipped(ctx.schedule_id)
            }
        }

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        runtime.block_on(async {
            let mut scheduler = Scheduler::new(
                Arc::new(NoopHandler),
                vec![
                    definition("good", "0 9 * * *", true),
                    definition("bad", "nope", true),
                ],
            );
            assert!(matches!(
                scheduler.start(),
                Err(SchedulerError::InvalidCron { .. })
            ));
            assert!(scheduler.handles.is_empty());
        });
    }
}
