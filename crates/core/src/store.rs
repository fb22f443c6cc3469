//! Tracked-window state store.
//!
//! The store maps window ids to the metadata needed to restore a window
//! to its pre-hide location: the workspace it occupied before moving to
//! the scratchpad, whether it was floating, and its floating geometry.
//!
//! The `hidden` flag is the hide/restore bookkeeping: while it is set,
//! ordinary move/floating events must not touch the captured fields,
//! because the scratchpad forces windows floating and the WM emits
//! spurious geometry events during the move. Capture happens once per
//! hide cycle; restore clears the flag and ordinary events keep the
//! record fresh again until the next hide.
//!
//! State is persisted as versioned JSON with an atomic temp-file-and-
//! rename write, and loaded tolerantly: a missing, corrupt, or
//! version-mismatched file yields an empty store and a warning, never a
//! startup failure.

use crate::{atomic_write_json, Rect, WindowId};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, warn};

/// Current schema version of the persisted window map.
///
/// 1.0 captured floating state after the scratchpad move, which forced
/// every window floating on restore; 1.1 captures before the first move.
pub const STATE_VERSION: &str = "1.1";

/// Errors from persisting the store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to write state file: {0}")]
    Io(#[from] std::io::Error),
}

/// Per-window persisted record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedWindowState {
    pub window_id: WindowId,
    pub project_name: String,
    pub app_name: String,
    /// Workspace the window occupied before being hidden — not its
    /// current (possibly scratchpad) location.
    pub tracked_workspace: i32,
    /// Floating flag captured before the first scratchpad move.
    pub floating: bool,
    /// Floating geometry, when the window was floating at capture time.
    #[serde(default)]
    pub geometry: Option<Rect>,
    /// True while the window sits in the scratchpad because of a hide we
    /// issued.
    #[serde(default)]
    pub hidden: bool,
    /// Unix timestamp of the last event that touched this record.
    pub last_seen: u64,
}

/// On-disk layout: `{"version":"1.1","windows":{"<id>":{...}}}`.
#[derive(Debug, Serialize, Deserialize)]
struct StoreFile {
    version: String,
    windows: HashMap<String, TrackedWindowState>,
}

/// In-memory window map with persistence.
#[derive(Debug, Default)]
pub struct WindowStore {
    windows: HashMap<WindowId, TrackedWindowState>,
}

impl WindowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a window record.
    pub fn upsert(&mut self, state: TrackedWindowState) {
        self.windows.insert(state.window_id, state);
    }

    pub fn get(&self, id: WindowId) -> Option<&TrackedWindowState> {
        self.windows.get(&id)
    }

    pub fn remove(&mut self, id: WindowId) -> Option<TrackedWindowState> {
        self.windows.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrackedWindowState> {
        self.windows.values()
    }

    /// All records owned by `project`.
    pub fn all_for_project(&self, project: &str) -> Vec<&TrackedWindowState> {
        let mut entries: Vec<_> = self
            .windows
            .values()
            .filter(|w| w.project_name == project)
            .collect();
        entries.sort_by_key(|w| w.window_id);
        entries
    }

    /// Number of windows currently hidden via the filter engine.
    pub fn hidden_count(&self) -> usize {
        self.windows.values().filter(|w| w.hidden).count()
    }

    /// Record an ordinary workspace move. Ignored while the window is
    /// hidden, so scratchpad mechanics cannot corrupt the capture.
    pub fn note_move(&mut self, id: WindowId, workspace: i32, now: u64) {
        if let Some(entry) = self.windows.get_mut(&id) {
            if !entry.hidden {
                entry.tracked_workspace = workspace;
                entry.last_seen = now;
            }
        }
    }

    /// Record an ordinary floating change. Ignored while hidden.
    pub fn note_floating(&mut self, id: WindowId, floating: bool, geometry: Option<Rect>, now: u64) {
        if let Some(entry) = self.windows.get_mut(&id) {
            if !entry.hidden {
                entry.floating = floating;
                entry.geometry = if floating { geometry } else { None };
                entry.last_seen = now;
            }
        }
    }

    /// Flag a window as scratchpad-resident after a successful hide move.
    pub fn mark_hidden(&mut self, id: WindowId, now: u64) {
        if let Some(entry) = self.windows.get_mut(&id) {
            entry.hidden = true;
            entry.last_seen = now;
        }
    }

    /// Clear the hidden flag after a successful restore. The record
    /// becomes live again: `workspace` is where the window actually
    /// landed, and subsequent move events update it normally.
    pub fn mark_restored(&mut self, id: WindowId, workspace: i32, now: u64) {
        if let Some(entry) = self.windows.get_mut(&id) {
            entry.hidden = false;
            entry.tracked_workspace = workspace;
            entry.last_seen = now;
        }
    }

    /// Drop entries for windows no longer present in the live tree.
    /// Returns the number of stale entries removed.
    pub fn reconcile(&mut self, live: &HashSet<WindowId>) -> usize {
        let before = self.windows.len();
        self.windows.retain(|id, _| live.contains(id));
        let removed = before - self.windows.len();
        if removed > 0 {
            debug!("reconcile dropped {} stale window entries", removed);
        }
        removed
    }

    /// Load the store from disk. Missing or unreadable state yields an
    /// empty store; this must never block startup.
    pub fn load(path: &Path) -> Self {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("no state file at {:?}, starting empty", path);
                return Self::new();
            }
            Err(e) => {
                warn!("failed to read state file {:?}: {}, starting empty", path, e);
                return Self::new();
            }
        };

        let file: StoreFile = match serde_json::from_str(&text) {
            Ok(file) => file,
            Err(e) => {
                warn!("corrupt state file {:?}: {}, starting empty", path, e);
                return Self::new();
            }
        };

        if file.version != STATE_VERSION {
            warn!(
                "state file {:?} has schema version {} (expected {}), starting empty",
                path, file.version, STATE_VERSION
            );
            return Self::new();
        }

        let windows = file
            .windows
            .into_values()
            .map(|w| (w.window_id, w))
            .collect();
        Self { windows }
    }

    /// Persist the store atomically.
    pub fn persist(&self, path: &Path) -> Result<(), StoreError> {
        let file = StoreFile {
            version: STATE_VERSION.to_string(),
            windows: self
                .windows
                .values()
                .map(|w| (w.window_id.to_string(), w.clone()))
                .collect(),
        };
        atomic_write_json(path, &file)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: WindowId, project: &str, workspace: i32) -> TrackedWindowState {
        TrackedWindowState {
            window_id: id,
            project_name: project.to_string(),
            app_name: "app".to_string(),
            tracked_workspace: workspace,
            floating: false,
            geometry: None,
            hidden: false,
            last_seen: 0,
        }
    }

    #[test]
    fn upsert_get_remove() {
        let mut store = WindowStore::new();
        store.upsert(entry(1, "alpha", 2));
        assert_eq!(store.get(1).unwrap().tracked_workspace, 2);
        assert!(store.get(2).is_none());
        assert!(store.remove(1).is_some());
        assert!(store.is_empty());
    }

    #[test]
    fn all_for_project_filters_and_sorts() {
        let mut store = WindowStore::new();
        store.upsert(entry(3, "alpha", 1));
        store.upsert(entry(1, "alpha", 2));
        store.upsert(entry(2, "beta", 1));

        let alpha: Vec<_> = store.all_for_project("alpha").iter().map(|w| w.window_id).collect();
        assert_eq!(alpha, vec![1, 3]);
        assert_eq!(store.all_for_project("gamma").len(), 0);
    }

    #[test]
    fn moves_ignored_while_hidden() {
        let mut store = WindowStore::new();
        store.upsert(entry(1, "alpha", 2));
        store.mark_hidden(1, 10);

        // Scratchpad-induced move and floating events must not corrupt
        // the captured truth.
        store.note_move(1, 7, 11);
        store.note_floating(1, true, Some(Rect::new(0, 0, 10, 10)), 11);

        let w = store.get(1).unwrap();
        assert_eq!(w.tracked_workspace, 2);
        assert!(!w.floating);
        assert!(w.geometry.is_none());

        store.mark_restored(1, 2, 12);
        store.note_move(1, 7, 13);
        assert_eq!(store.get(1).unwrap().tracked_workspace, 7);
    }

    #[test]
    fn floating_disable_clears_geometry() {
        let mut store = WindowStore::new();
        let mut e = entry(1, "alpha", 2);
        e.floating = true;
        e.geometry = Some(Rect::new(5, 5, 100, 100));
        store.upsert(e);

        store.note_floating(1, false, None, 1);
        let w = store.get(1).unwrap();
        assert!(!w.floating);
        assert!(w.geometry.is_none());
    }

    #[test]
    fn reconcile_drops_stale_entries() {
        let mut store = WindowStore::new();
        store.upsert(entry(1, "alpha", 1));
        store.upsert(entry(2, "alpha", 2));
        store.upsert(entry(3, "beta", 3));

        let live: HashSet<WindowId> = [1, 3].into_iter().collect();
        assert_eq!(store.reconcile(&live), 1);
        assert_eq!(store.len(), 2);
        assert!(store.get(2).is_none());
    }

    #[test]
    fn persist_and_load_roundtrip() {
        let dir = std::env::temp_dir().join("i3pm-store-roundtrip-test");
        let _ = std::fs::remove_dir_all(&dir);
        let path = dir.join("window-state.json");

        let mut store = WindowStore::new();
        let mut e = entry(42, "alpha", 3);
        e.floating = true;
        e.geometry = Some(Rect::new(100, 100, 800, 600));
        e.hidden = true;
        store.upsert(e.clone());
        store.persist(&path).unwrap();

        let loaded = WindowStore::load(&path);
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.get(42), Some(&e));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn load_tolerates_missing_and_corrupt_files() {
        let dir = std::env::temp_dir().join("i3pm-store-tolerant-test");
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();

        assert!(WindowStore::load(&dir.join("absent.json")).is_empty());

        let corrupt = dir.join("corrupt.json");
        std::fs::write(&corrupt, "{not json").unwrap();
        assert!(WindowStore::load(&corrupt).is_empty());

        let old_version = dir.join("old.json");
        std::fs::write(&old_version, r#"{"version":"1.0","windows":{}}"#).unwrap();
        assert!(WindowStore::load(&old_version).is_empty());

        let _ = std::fs::remove_dir_all(&dir);
    }
}
