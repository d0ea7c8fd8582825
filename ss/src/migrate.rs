//! Versioned state migrations
//!
//! Each upgrade step is one table entry so new migrations are additive.
//! Steps are keyed by exact (from, to) version pairs and applied in chain
//! order by [`StateStore::migrate_state`](crate::store::StateStore::migrate_state).

use serde_json::json;
use tracing::debug;

use crate::error::StoreResult;
use crate::store::StateStore;

/// A single explicitly-versioned upgrade step
pub struct Migration {
    /// Version this step upgrades from
    pub from: u32,
    /// Version this step upgrades to
    pub to: u32,
    /// Short name for logs
    pub name: &'static str,
    /// The upgrade itself
    pub apply: fn(&mut StateStore) -> StoreResult<()>,
}

/// Known upgrade steps, in chain order
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        from: 1,
        to: 2,
        name: "backfill-max-open-tabs-context",
        apply: backfill_max_open_tabs_context,
    },
    Migration {
        from: 2,
        to: 3,
        name: "backfill-max-workspace-files",
        apply: backfill_max_workspace_files,
    },
];

/// v2 introduced `maxOpenTabsContext`; older states get the default
fn backfill_max_open_tabs_context(store: &mut StateStore) -> StoreResult<()> {
    debug!("backfill_max_open_tabs_context: called");
    if store.get_value("maxOpenTabsContext")?.is_none() {
        store.set_value("maxOpenTabsContext", json!(20))?;
    }
    Ok(())
}

/// v3 introduced `maxWorkspaceFiles`; older states get the default
fn backfill_max_workspace_files(store: &mut StateStore) -> StoreResult<()> {
    debug!("backfill_max_workspace_files: called");
    if store.get_value("maxWorkspaceFiles")?.is_none() {
        store.set_value("maxWorkspaceFiles", json!(200))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_form_a_chain() {
        for pair in MIGRATIONS.windows(2) {
            assert_eq!(pair[0].to, pair[1].from, "migration table must chain without gaps");
        }
    }

    #[test]
    fn test_backfill_preserves_existing_value() {
        let mut store = StateStore::in_memory("/ws");
        store.set_value("maxOpenTabsContext", json!(5)).unwrap();

        backfill_max_open_tabs_context(&mut store).unwrap();

        assert_eq!(store.get_value("maxOpenTabsContext").unwrap(), Some(json!(5)));
    }

    #[test]
    fn test_backfill_fills_missing_value() {
        let mut store = StateStore::in_memory("/ws");

        backfill_max_workspace_files(&mut store).unwrap();

        assert_eq!(store.get_value("maxWorkspaceFiles").unwrap(), Some(json!(200)));
    }
}
