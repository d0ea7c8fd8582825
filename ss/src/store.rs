//! Core StateStore implementation
//!
//! One store instance is bound to one workspace. It owns the backend and the
//! recent-tasks cache; nothing else mutates either. Cache invalidation is
//! conservative: any write reaching the history key clears the cache, bulk
//! writes clear everything.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{debug, info, warn};

use crate::backend::{FileBackend, MemoryBackend, StateBackend};
use crate::error::{StoreError, StoreResult};
use crate::history::HistoryItem;
use crate::migrate::MIGRATIONS;
use crate::now_ms;

/// Global-state key holding the full task history sequence
pub const TASK_HISTORY_KEY: &str = "taskHistory";

/// Global-state key holding the active provider configuration name
pub const API_CONFIG_NAME_KEY: &str = "currentApiConfigName";

/// Current state schema version, stamped into exports
pub const STATE_VERSION: u32 = 3;

/// Recent-tasks cache never holds more than this many ids
const RECENT_TASKS_CAP: usize = 100;

/// Recency window applied to large histories
const RECENT_WINDOW_MS: i64 = 7 * 24 * 60 * 60 * 1000;

/// Typed settings snapshot handed to task construction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSettings {
    /// Open editor tabs included in task context, 1..=100
    pub max_open_tabs_context: u32,
    /// Workspace files included in task context, 1..=1000
    pub max_workspace_files: u32,
    /// Active provider configuration name
    pub current_api_config_name: String,
}

impl Default for TaskSettings {
    fn default() -> Self {
        Self {
            max_open_tabs_context: 20,
            max_workspace_files: 200,
            current_api_config_name: "default".to_string(),
        }
    }
}

/// Non-mutating integrity check result
#[derive(Debug, Clone, PartialEq)]
pub struct StateValidation {
    /// True iff no violations were found
    pub is_valid: bool,
    /// Every violation found, not just the first
    pub errors: Vec<String>,
}

/// Outcome of a cloud sync attempt
#[derive(Debug, Clone, PartialEq)]
pub struct SyncReport {
    /// False on validation failure or any error
    pub success: bool,
    /// Number of remote changes applied; `Some(0)` for the stub
    pub changes: Option<u64>,
}

/// Snapshot metadata attached to exports
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportMetadata {
    /// Schema version of the exported state
    pub version: u32,
    /// Export time, epoch millis
    pub timestamp: i64,
    /// Workspace the store was bound to
    pub workspace: String,
}

/// A full exported state snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateBackup {
    /// The complete key-value state
    pub state: Map<String, Value>,
    /// Snapshot metadata
    pub metadata: ExportMetadata,
}

/// Cache introspection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Whether the recent-tasks cache currently holds a computed sequence
    pub recent_tasks_cached: bool,
}

/// Aggregate state introspection
#[derive(Debug, Clone, PartialEq)]
pub struct StateMetrics {
    /// Number of history items persisted
    pub task_history_count: usize,
    /// Serialized byte length of the full state object
    pub state_size: usize,
    /// Recent-tasks cache hit rate, 0.0 when never read
    pub cache_hit_rate: f64,
    /// Max timestamp across history items with a known timestamp
    pub last_modified: Option<i64>,
}

/// Workspace-scoped typed facade over a persistence backend
pub struct StateStore {
    backend: Box<dyn StateBackend>,
    workspace: String,
    /// Derived most-recent-first history ids; `None` until first read after
    /// any invalidating write
    recent_tasks: Option<Vec<String>>,
    cache_hits: u64,
    cache_misses: u64,
}

impl StateStore {
    /// Create a store over the given backend, bound to one workspace
    pub fn new(backend: Box<dyn StateBackend>, workspace: impl Into<String>) -> Self {
        let workspace = workspace.into();
        debug!(%workspace, "StateStore::new: called");
        Self {
            backend,
            workspace,
            recent_tasks: None,
            cache_hits: 0,
            cache_misses: 0,
        }
    }

    /// Create a store over an in-memory backend
    pub fn in_memory(workspace: impl Into<String>) -> Self {
        Self::new(Box::new(MemoryBackend::new()), workspace)
    }

    /// Open a store over a file backend rooted at the given directory
    pub fn open(dir: impl AsRef<std::path::Path>, workspace: impl Into<String>) -> StoreResult<Self> {
        let backend = FileBackend::open(dir)?;
        Ok(Self::new(Box::new(backend), workspace))
    }

    /// The workspace this store is bound to
    pub fn workspace(&self) -> &str {
        &self.workspace
    }

    // === Global state ===

    /// Typed passthrough read
    pub fn get_global_state(&self, key: &str) -> StoreResult<Option<Value>> {
        debug!(%key, "get_global_state: called");
        self.backend.get(key)
    }

    /// Typed passthrough write
    ///
    /// Writing the history key clears the recent-tasks cache.
    pub fn update_global_state(&mut self, key: &str, value: Value) -> StoreResult<()> {
        debug!(%key, "update_global_state: called");
        self.backend.set(key, value)?;
        if key == TASK_HISTORY_KEY {
            debug!("update_global_state: history write, clearing recent-tasks cache");
            self.recent_tasks = None;
        }
        Ok(())
    }

    // === Task history ===

    /// The full persisted history, empty if never written
    pub fn get_task_history(&self) -> StoreResult<Vec<HistoryItem>> {
        debug!("get_task_history: called");
        match self.backend.get(TASK_HISTORY_KEY)? {
            Some(value) => Ok(serde_json::from_value(value)?),
            None => Ok(Vec::new()),
        }
    }

    /// Replace-by-id or append, returning the full updated sequence
    pub fn update_task_history(&mut self, item: HistoryItem) -> StoreResult<Vec<HistoryItem>> {
        debug!(item_id = %item.id, "update_task_history: called");
        let mut history = self.get_task_history()?;

        if let Some(existing) = history.iter_mut().find(|h| h.id == item.id) {
            debug!(item_id = %item.id, "update_task_history: replacing existing item");
            *existing = item;
        } else {
            debug!(item_id = %item.id, "update_task_history: appending new item");
            history.push(item);
        }

        self.update_global_state(TASK_HISTORY_KEY, serde_json::to_value(&history)?)?;
        Ok(history)
    }

    /// Write an empty history sequence
    pub fn reset_task_history(&mut self) -> StoreResult<()> {
        debug!("reset_task_history: called");
        self.update_global_state(TASK_HISTORY_KEY, json!([]))
    }

    // === Recent-tasks cache ===

    /// Most-recent-first history ids for this store's workspace, cached
    ///
    /// Large filtered sets (>= 100 items) keep only the last 7 days; smaller
    /// sets are capped at 100 entries.
    pub fn get_recent_tasks(&mut self) -> StoreResult<Vec<String>> {
        debug!("get_recent_tasks: called");
        if let Some(cached) = &self.recent_tasks {
            debug!(count = cached.len(), "get_recent_tasks: cache hit");
            self.cache_hits += 1;
            return Ok(cached.clone());
        }
        self.cache_misses += 1;

        let history = self.get_task_history()?;
        let mut filtered: Vec<&HistoryItem> = history
            .iter()
            .filter(|h| h.ts > 0 && !h.task.is_empty() && h.workspace == self.workspace)
            .collect();

        if filtered.is_empty() {
            debug!("get_recent_tasks: no matching history, caching empty");
            self.recent_tasks = Some(Vec::new());
            return Ok(Vec::new());
        }

        filtered.sort_by(|a, b| b.ts.cmp(&a.ts));

        let ids: Vec<String> = if filtered.len() >= RECENT_TASKS_CAP {
            let cutoff = now_ms() - RECENT_WINDOW_MS;
            filtered
                .iter()
                .filter(|h| h.ts >= cutoff)
                .map(|h| h.id.clone())
                .collect()
        } else {
            filtered
                .iter()
                .take(RECENT_TASKS_CAP)
                .map(|h| h.id.clone())
                .collect()
        };

        debug!(count = ids.len(), "get_recent_tasks: computed and cached");
        self.recent_tasks = Some(ids.clone());
        Ok(ids)
    }

    /// Drop every derived cache
    pub fn clear_cache(&mut self) {
        debug!("clear_cache: called");
        self.recent_tasks = None;
    }

    /// Cache introspection
    pub fn cache_stats(&self) -> CacheStats {
        CacheStats {
            recent_tasks_cached: self.recent_tasks.is_some(),
        }
    }

    // === Settings facade ===

    /// Generic settings write
    pub fn set_value(&mut self, key: &str, value: Value) -> StoreResult<()> {
        debug!(%key, "set_value: called");
        self.update_global_state(key, value)
    }

    /// Generic settings read
    pub fn get_value(&self, key: &str) -> StoreResult<Option<Value>> {
        debug!(%key, "get_value: called");
        self.backend.get(key)
    }

    /// The full key-value state as one object
    pub fn get_values(&self) -> StoreResult<Map<String, Value>> {
        debug!("get_values: called");
        let mut values = Map::new();
        for key in self.backend.keys()? {
            if let Some(value) = self.backend.get(&key)? {
                values.insert(key, value);
            }
        }
        Ok(values)
    }

    /// Bulk write; assumed to possibly touch history, so all caches clear
    pub fn set_values(&mut self, values: Map<String, Value>) -> StoreResult<()> {
        debug!(count = values.len(), "set_values: called");
        for (key, value) in values {
            self.backend.set(&key, value)?;
        }
        self.clear_cache();
        Ok(())
    }

    /// Typed settings snapshot for task construction, defaults applied
    pub fn task_settings(&self) -> StoreResult<TaskSettings> {
        debug!("task_settings: called");
        let defaults = TaskSettings::default();
        Ok(TaskSettings {
            max_open_tabs_context: self
                .get_value("maxOpenTabsContext")?
                .and_then(|v| v.as_u64())
                .map(|v| v as u32)
                .unwrap_or(defaults.max_open_tabs_context),
            max_workspace_files: self
                .get_value("maxWorkspaceFiles")?
                .and_then(|v| v.as_u64())
                .map(|v| v as u32)
                .unwrap_or(defaults.max_workspace_files),
            current_api_config_name: self
                .get_value(API_CONFIG_NAME_KEY)?
                .and_then(|v| v.as_str().map(String::from))
                .unwrap_or(defaults.current_api_config_name),
        })
    }

    // === Validation & sync ===

    /// Non-mutating integrity check; collects all violations
    pub fn validate_state(&self) -> StoreResult<StateValidation> {
        debug!("validate_state: called");
        let mut errors = Vec::new();

        for item in self.get_task_history()? {
            if item.id.is_empty() {
                errors.push("history item missing id".to_string());
            }
            if item.ts <= 0 {
                errors.push(format!("history item {} missing ts", item.id));
            }
        }

        if let Some(v) = self.get_value("maxOpenTabsContext")?.and_then(|v| v.as_i64())
            && !(1..=100).contains(&v)
        {
            errors.push(format!("maxOpenTabsContext out of range: {}", v));
        }
        if let Some(v) = self.get_value("maxWorkspaceFiles")?.and_then(|v| v.as_i64())
            && !(1..=1000).contains(&v)
        {
            errors.push(format!("maxWorkspaceFiles out of range: {}", v));
        }

        debug!(error_count = errors.len(), "validate_state: complete");
        Ok(StateValidation {
            is_valid: errors.is_empty(),
            errors,
        })
    }

    /// Stubbed cloud sync: validates, then reports success with zero changes
    ///
    /// Never returns an error; failures collapse into `success: false`.
    pub fn sync_with_cloud(&self) -> SyncReport {
        debug!("sync_with_cloud: called");
        match self.validate_state() {
            Ok(validation) if validation.is_valid => {
                info!("sync_with_cloud: state valid, no remote changes");
                SyncReport {
                    success: true,
                    changes: Some(0),
                }
            }
            Ok(validation) => {
                warn!(errors = ?validation.errors, "sync_with_cloud: validation failed");
                SyncReport {
                    success: false,
                    changes: None,
                }
            }
            Err(e) => {
                warn!(error = %e, "sync_with_cloud: error during validation");
                SyncReport {
                    success: false,
                    changes: None,
                }
            }
        }
    }

    // === Migration ===

    /// Apply known upgrade steps from `from` toward `to`
    ///
    /// Unknown version pairs are a no-op returning `true`; any step failure
    /// is logged and returns `false`.
    pub fn migrate_state(&mut self, from: u32, to: u32) -> bool {
        debug!(from, to, "migrate_state: called");
        let mut current = from;

        for migration in MIGRATIONS {
            if migration.from == current && migration.to <= to {
                debug!(name = migration.name, "migrate_state: applying step");
                if let Err(e) = (migration.apply)(self) {
                    warn!(name = migration.name, error = %e, "migrate_state: step failed");
                    return false;
                }
                info!(name = migration.name, from = migration.from, to = migration.to, "Applied migration");
                current = migration.to;
            }
        }

        debug!(reached = current, "migrate_state: complete");
        true
    }

    // === Export / import / reset ===

    /// Non-mutating snapshot of the full state plus metadata
    pub fn export_state(&self) -> StoreResult<StateBackup> {
        debug!("export_state: called");
        Ok(StateBackup {
            state: self.get_values()?,
            metadata: ExportMetadata {
                version: STATE_VERSION,
                timestamp: now_ms(),
                workspace: self.workspace.clone(),
            },
        })
    }

    /// Merge a backup over the current state
    ///
    /// The active configuration name falls back to the current value when the
    /// backup omits it. Malformed input or any error yields `false`.
    pub fn import_state(&mut self, backup: Value) -> bool {
        debug!("import_state: called");
        match self.try_import(backup) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "import_state: rejected");
                false
            }
        }
    }

    fn try_import(&mut self, backup: Value) -> StoreResult<()> {
        let backup: StateBackup = serde_json::from_value(backup)
            .map_err(|e| StoreError::InvalidBackup(e.to_string()))?;

        let mut incoming = backup.state;
        if !incoming.contains_key(API_CONFIG_NAME_KEY)
            && let Some(current) = self.get_value(API_CONFIG_NAME_KEY)?
        {
            debug!("try_import: backup omits config name, keeping current");
            incoming.insert(API_CONFIG_NAME_KEY.to_string(), current);
        }

        self.set_values(incoming)?;
        info!(version = backup.metadata.version, "Imported state backup");
        Ok(())
    }

    /// Full wipe via the backend; errors propagate
    pub fn reset_state(&mut self) -> StoreResult<()> {
        debug!("reset_state: called");
        self.backend.clear()?;
        self.clear_cache();
        info!("State reset");
        Ok(())
    }

    // === Metrics ===

    /// Aggregate introspection over history, size, and cache behavior
    pub fn state_metrics(&self) -> StoreResult<StateMetrics> {
        debug!("state_metrics: called");
        let history = self.get_task_history()?;
        let state_size = serde_json::to_string(&Value::Object(self.get_values()?))?.len();
        let reads = self.cache_hits + self.cache_misses;
        let cache_hit_rate = if reads == 0 {
            0.0
        } else {
            self.cache_hits as f64 / reads as f64
        };
        let last_modified = history.iter().filter(|h| h.ts > 0).map(|h| h.ts).max();

        Ok(StateMetrics {
            task_history_count: history.len(),
            state_size,
            cache_hit_rate,
            last_modified,
        })
    }
}
