//! Integration tests for TaskStack
//!
//! These tests verify end-to-end behavior of the orchestrator, the event
//! pipeline, and the state store working together.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use eyre::Result;
use tempfile::TempDir;
use tokio::sync::Mutex;

use taskstack::events::{EventBus, EventLogger, TaskEvent, read_task_events};
use taskstack::stack::{PrepareHook, TaskStack};
use taskstack::task::{Task, TaskDriver, TaskOptions};
use taskstack::{HistoryItem, StateStore, TaskUsage};

// =============================================================================
// Stack + Store Tests
// =============================================================================

#[tokio::test]
async fn test_subtask_round_trip_through_store() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let store = Arc::new(Mutex::new(
        StateStore::open(temp_dir.path(), "/workspace/demo").expect("Failed to open store"),
    ));
    let bus = Arc::new(EventBus::with_default_capacity());
    let mut stack = TaskStack::new(Arc::clone(&bus), Arc::clone(&store));

    // Root task, then a nested subtask
    let root = stack
        .create_task(Some("refactor the parser".to_string()), None, TaskOptions::default())
        .await
        .expect("root creation");
    let sub = stack
        .create_task(
            Some("extract the lexer".to_string()),
            Some(&root),
            TaskOptions::default(),
        )
        .await
        .expect("subtask creation");

    assert_eq!(stack.stack_size(), 2);
    assert_eq!(sub.root_task_id, root.task_id);

    // Both creations landed in persisted history
    let history = store.lock().await.get_task_history().expect("history read");
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].parent_task_id.as_deref(), Some(root.task_id.as_str()));

    // Unwind and verify the parent is current again
    stack.finish_subtask("lexer extracted").await.expect("finish");
    assert_eq!(stack.stack_size(), 1);
    assert!(stack.is_active(&root.task_id));

    // A fresh store over the same directory sees the same history
    drop(stack);
    let reopened = StateStore::open(temp_dir.path(), "/workspace/demo").expect("reopen");
    assert_eq!(reopened.get_task_history().expect("history").len(), 2);
}

#[tokio::test]
async fn test_recent_tasks_reflect_created_tasks() {
    let store = Arc::new(Mutex::new(StateStore::in_memory("/workspace/demo")));
    let bus = Arc::new(EventBus::with_default_capacity());
    let mut stack = TaskStack::new(bus, Arc::clone(&store));

    for i in 0..3 {
        stack
            .create_task(Some(format!("task {i}")), None, TaskOptions::default())
            .await
            .expect("creation");
        stack.clear_all().await;
    }

    let recent = store.lock().await.get_recent_tasks().expect("recent");
    assert_eq!(recent.len(), 3);
}

#[tokio::test]
async fn test_resume_from_history_is_new_instance() {
    let store = Arc::new(Mutex::new(StateStore::in_memory("/ws")));
    let bus = Arc::new(EventBus::with_default_capacity());
    let mut stack = TaskStack::new(bus, Arc::clone(&store));

    let original = stack
        .create_task(Some("long-running study".to_string()), None, TaskOptions::default())
        .await
        .expect("creation");
    let original_instance = original.instance_id.clone();
    stack.clear_all().await;

    let item = store.lock().await.get_task_history().expect("history")[0].clone();
    let resumed = stack
        .create_task_from_history(&item, TaskOptions::default())
        .await
        .expect("resume");

    assert_eq!(resumed.task_id, original.task_id);
    assert_ne!(resumed.instance_id, original_instance);
    assert!(stack.is_active(&resumed.task_id));
}

// =============================================================================
// Event Pipeline Tests
// =============================================================================

#[tokio::test]
async fn test_lifecycle_events_reach_subscribers() {
    let store = Arc::new(Mutex::new(StateStore::in_memory("/ws")));
    let bus = Arc::new(EventBus::with_default_capacity());
    let mut rx = bus.subscribe();
    let mut stack = TaskStack::new(Arc::clone(&bus), store);

    let task = stack
        .create_task(Some("observable".to_string()), None, TaskOptions::default())
        .await
        .expect("creation");

    let started = rx.recv().await.expect("started");
    assert!(matches!(started, TaskEvent::Started { ref task_id } if *task_id == task.task_id));
    let focused = rx.recv().await.expect("focused");
    assert!(matches!(focused, TaskEvent::Focused { ref task_id } if *task_id == task.task_id));

    stack.pop().await;
    let unfocused = rx.recv().await.expect("unfocused");
    assert_eq!(unfocused.event_type(), "Unfocused");
    let aborted = rx.recv().await.expect("aborted");
    assert_eq!(aborted.event_type(), "Aborted");
}

#[tokio::test]
async fn test_events_persist_to_jsonl_log() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let log_dir = temp_dir.path().join("tasks");

    let store = Arc::new(Mutex::new(StateStore::in_memory("/ws")));
    let bus = Arc::new(EventBus::with_default_capacity());
    let logger = EventLogger::new(&log_dir);
    let logger_handle = tokio::spawn(logger.run(Arc::clone(&bus)));
    // Let the logger subscribe before any event is emitted
    tokio::task::yield_now().await;

    let mut stack = TaskStack::new(Arc::clone(&bus), store);
    let task = stack
        .create_task(Some("logged".to_string()), None, TaskOptions::default())
        .await
        .expect("creation");
    let task_id = task.task_id.clone();
    task.complete(TaskUsage {
        tokens_in: 120,
        tokens_out: 64,
        total_cost: 0.0042,
    });
    drop(task);
    stack.clear_all().await;

    // Closing the bus ends the logger loop
    drop(stack);
    drop(bus);
    tokio::time::timeout(Duration::from_secs(5), logger_handle)
        .await
        .expect("logger should stop when the bus closes")
        .expect("logger task panicked");

    let entries = read_task_events(&log_dir, &task_id).expect("read log");
    let types: Vec<&str> = entries.iter().map(|e| e.event.event_type()).collect();
    assert!(types.contains(&"Started"));
    assert!(types.contains(&"Completed"));
}

// =============================================================================
// Hook + Driver Tests
// =============================================================================

struct CountingPrepare {
    calls: AtomicUsize,
}

#[async_trait]
impl PrepareHook for CountingPrepare {
    async fn perform_preparation_tasks(&self, _task: &Task) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct EchoDriver {
    received: std::sync::Mutex<Vec<String>>,
}

#[async_trait]
impl TaskDriver for EchoDriver {
    fn supports_resume(&self) -> bool {
        true
    }

    async fn resume_with_message(&self, last_message: &str) -> Result<()> {
        self.received.lock().unwrap().push(last_message.to_string());
        Ok(())
    }
}

#[tokio::test]
async fn test_prepare_hook_runs_per_creation() {
    let store = Arc::new(Mutex::new(StateStore::in_memory("/ws")));
    let bus = Arc::new(EventBus::with_default_capacity());
    let prepare = Arc::new(CountingPrepare { calls: AtomicUsize::new(0) });
    let mut stack = TaskStack::new(bus, store).with_prepare_hook(Arc::clone(&prepare) as _);

    stack
        .create_task(Some("a".to_string()), None, TaskOptions::default())
        .await
        .expect("creation");
    let item = HistoryItem::new("from-history", "b", "/ws");
    stack
        .create_task_from_history(&item, TaskOptions::default())
        .await
        .expect("resume");

    assert_eq!(prepare.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_parent_receives_subtask_output() {
    let store = Arc::new(Mutex::new(StateStore::in_memory("/ws")));
    let bus = Arc::new(EventBus::with_default_capacity());
    let mut stack = TaskStack::new(bus, store);

    let driver = Arc::new(EchoDriver { received: std::sync::Mutex::new(Vec::new()) });
    let parent = stack
        .create_task(
            Some("parent".to_string()),
            None,
            TaskOptions {
                driver: Arc::clone(&driver) as Arc<dyn TaskDriver>,
                images: Vec::new(),
            },
        )
        .await
        .expect("parent");
    stack
        .create_task(Some("child".to_string()), Some(&parent), TaskOptions::default())
        .await
        .expect("child");

    stack.finish_subtask("summary: 3 files changed").await.expect("finish");
    assert_eq!(
        driver.received.lock().unwrap().as_slice(),
        ["summary: 3 files changed"]
    );
}
