//! Integration tests for the cron scheduler
//!
//! These tests verify that enabled definitions fire their handler, that
//! disabled definitions are ignored, and that shutdown waits for in-flight
//! runs instead of aborting them.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use smmaker::models::{RunOutcome, ScheduleDefinition};
use smmaker::orchestrator::RunContext;
use smmaker::scheduler::{RunHandler, Scheduler, SchedulerError};

/// Handler counting executions and recording the contexts it saw.
struct CountingHandler {
    executions: AtomicUsize,
    contexts: Mutex<Vec<RunContext>>,
    run_duration: Duration,
}

impl CountingHandler {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            executions: AtomicUsize::new(0),
            contexts: Mutex::new(Vec::new()),
            run_duration: Duration::ZERO,
        })
    }

    fn slow(run_duration: Duration) -> Arc<Self> {
        Arc::new(Self {
            executions: AtomicUsize::new(0),
            contexts: Mutex::new(Vec::new()),
            run_duration,
        })
    }
}

#[async_trait]
impl RunHandler for CountingHandler {
    async fn execute(&self, ctx: RunContext) -> RunOutcome {
        if !self.run_duration.is_zero() {
            tokio::time::sleep(self.run_duration).await;
        }
        self.executions.fetch_add(1, Ordering::SeqCst);
        let schedule_id = ctx.schedule_id.clone();
        self.contexts.lock().unwrap().push(ctx);
        RunOutcome::skipped(schedule_id)
    }
}

fn definition(id: &str, cron: &str, enabled: bool) -> ScheduleDefinition {
    ScheduleDefinition {
        id: id.to_string(),
        module: Some("vk".to_string()),
        cron: cron.to_string(),
        prompt_key: "daily".to_string(),
        generator: "openai".to_string(),
        enabled,
    }
}

#[tokio::test]
async fn test_every_second_schedule_fires() {
    let handler = CountingHandler::new();
    let mut scheduler = Scheduler::new(
        handler.clone(),
        vec![definition("tick", "* * * * * *", true)],
    );
    scheduler.start().unwrap();

    tokio::time::sleep(Duration::from_millis(2500)).await;
    scheduler.stop().await;

    let executions = handler.executions.load(Ordering::SeqCst);
    assert!(
        (1..=3).contains(&executions),
        "expected 1-3 fires in 2.5s, got {executions}"
    );

    let contexts = handler.contexts.lock().unwrap();
    assert!(contexts.iter().all(|c| c.schedule_id == "tick"));
    assert!(contexts.iter().all(|c| c.module.as_deref() == Some("vk")));
}

#[tokio::test]
async fn test_disabled_definitions_never_fire() {
    let handler = CountingHandler::new();
    let mut scheduler = Scheduler::new(
        handler.clone(),
        vec![
            definition("on", "* * * * * *", true),
            definition("off", "* * * * * *", false),
        ],
    );
    scheduler.start().unwrap();

    tokio::time::sleep(Duration::from_millis(1500)).await;
    scheduler.stop().await;

    let contexts = handler.contexts.lock().unwrap();
    assert!(!contexts.is_empty());
    assert!(contexts.iter().all(|c| c.schedule_id == "on"));
}

#[tokio::test]
async fn test_all_disabled_reports_nothing_to_schedule() {
    let handler = CountingHandler::new();
    let mut scheduler = Scheduler::new(
        handler.clone(),
        vec![definition("off", "0 9 * * *", false)],
    );

    assert!(matches!(
        scheduler.start(),
        Err(SchedulerError::NothingToSchedule)
    ));
    assert_eq!(handler.executions.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_stop_waits_for_an_in_flight_run() {
    let handler = CountingHandler::slow(Duration::from_millis(400));
    let mut scheduler = Scheduler::new(
        handler.clone(),
        vec![definition("slow", "* * * * * *", true)],
    );
    scheduler.start().unwrap();

    // let the first fire happen and get into its sleep
    tokio::time::sleep(Duration::from_millis(1200)).await;
    scheduler.stop().await;

    // stop() returned only after the in-flight execution finished
    assert!(handler.executions.load(Ordering::SeqCst) >= 1);
}

#[tokio::test]
async fn test_five_field_cron_is_accepted_at_startup() {
    let handler = CountingHandler::new();
    let mut scheduler = Scheduler::new(
        handler,
        vec![definition("classic", "30 9 * * 1-5", true)],
    );
    scheduler.start().unwrap();
    scheduler.stop().await;
}
