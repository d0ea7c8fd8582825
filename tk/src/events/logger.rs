//! Event logger - persists lifecycle events to JSONL files
//!
//! Subscribes to the bus and appends every event to a per-task JSONL file.
//! This persisted trail is what makes resumed tasks auditable: a task id can
//! be replayed across any number of instances.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, error, warn};

use super::bus::EventBus;
use super::types::{EventLogEntry, TaskEvent};

/// Event logger that writes events to JSONL files
///
/// Events are written to `{log_dir}/{task-id}/events.jsonl`
pub struct EventLogger {
    /// Base directory for task logs
    log_dir: PathBuf,
    /// Open file writers per task
    writers: HashMap<String, BufWriter<File>>,
}

impl EventLogger {
    /// Create a new event logger rooted at the given directory
    pub fn new(log_dir: impl AsRef<Path>) -> Self {
        let log_dir = log_dir.as_ref().to_path_buf();
        debug!(?log_dir, "EventLogger::new: creating logger");
        Self {
            log_dir,
            writers: HashMap::new(),
        }
    }

    /// Create a logger with the default directory (~/.taskstack/tasks)
    pub fn with_default_path() -> eyre::Result<Self> {
        let home = dirs::home_dir().ok_or_else(|| eyre::eyre!("Could not determine home directory"))?;
        let log_dir = home.join(".taskstack").join("tasks");
        fs::create_dir_all(&log_dir)?;
        Ok(Self::new(log_dir))
    }

    /// Write an event to its task's log file
    pub fn write_event(&mut self, event: &TaskEvent) -> eyre::Result<()> {
        let task_id = event.task_id();
        debug!(%task_id, event_type = event.event_type(), "EventLogger::write_event");

        let writer = if let Some(w) = self.writers.get_mut(task_id) {
            w
        } else {
            let task_dir = self.log_dir.join(task_id);
            fs::create_dir_all(&task_dir)?;

            let log_path = task_dir.join("events.jsonl");
            debug!(?log_path, "EventLogger: creating new log file");

            let file = OpenOptions::new().create(true).append(true).open(&log_path)?;
            self.writers.insert(task_id.to_string(), BufWriter::new(file));
            self.writers.get_mut(task_id).expect("writer just inserted")
        };

        let entry = EventLogEntry::new(event.clone());
        let json = serde_json::to_string(&entry)?;
        writeln!(writer, "{}", json)?;
        writer.flush()?;

        Ok(())
    }

    /// Close the writer for a task (when its lifecycle ends)
    pub fn close_task(&mut self, task_id: &str) {
        debug!(%task_id, "EventLogger::close_task");
        if let Some(mut writer) = self.writers.remove(task_id) {
            let _ = writer.flush();
        }
    }

    /// Run the logger, consuming events from the bus until the bus closes
    ///
    /// Meant to be spawned as a background task.
    pub async fn run(mut self, event_bus: Arc<EventBus>) {
        debug!("EventLogger::run: starting event logger");
        let mut rx = event_bus.subscribe();
        // Holding the bus alive here would keep the channel open forever
        drop(event_bus);

        loop {
            match rx.recv().await {
                Ok(event) => {
                    let task_id = event.task_id().to_string();
                    let is_terminal = event.is_terminal();

                    if let Err(e) = self.write_event(&event) {
                        error!(%task_id, error = %e, "EventLogger: failed to write event");
                    }

                    if is_terminal {
                        self.close_task(&task_id);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(missed = n, "EventLogger: lagged behind, missed events");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("EventLogger: channel closed, shutting down");
                    break;
                }
            }
        }

        for (task_id, mut writer) in self.writers.drain() {
            debug!(%task_id, "EventLogger: flushing writer on shutdown");
            let _ = writer.flush();
        }
    }
}

/// Read events from a task's log file
pub fn read_task_events(log_dir: impl AsRef<Path>, task_id: &str) -> eyre::Result<Vec<EventLogEntry>> {
    let log_path = log_dir.as_ref().join(task_id).join("events.jsonl");
    debug!(?log_path, "read_task_events: reading log file");

    if !log_path.exists() {
        return Ok(Vec::new());
    }

    let content = fs::read_to_string(&log_path)?;
    let mut entries = Vec::new();

    for line in content.lines() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<EventLogEntry>(line) {
            Ok(entry) => entries.push(entry),
            Err(e) => {
                warn!(line, error = %e, "read_task_events: failed to parse line");
            }
        }
    }

    debug!(count = entries.len(), "read_task_events: loaded entries");
    Ok(entries)
}

/// Spawn the event logger as a background task
pub fn spawn_event_logger(event_bus: Arc<EventBus>) -> eyre::Result<tokio::task::JoinHandle<()>> {
    let logger = EventLogger::with_default_path()?;
    Ok(tokio::spawn(async move {
        logger.run(event_bus).await;
    }))
}
