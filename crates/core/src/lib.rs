//! i3pm Core Engine
//!
//! Window-manager-agnostic engine for project-scoped window management:
//! - Ownership tags derived from launch environment (`ownership`)
//! - Tracked-window state with capture/restore bookkeeping (`store`)
//! - Pending-launch correlation for new windows (`launch`)
//! - Hide/restore command planning (`filter`)
//! - Project definitions and the active-project pointer (`project`)
//!
//! This crate performs no window-manager I/O. The filter engine plans
//! batched WM commands from tree snapshots; executing them is the
//! daemon's job.

pub mod filter;
pub mod launch;
pub mod ownership;
pub mod project;
pub mod store;

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Unique identifier for a window.
/// This is the window manager's container id, stable for the window's lifetime.
pub type WindowId = i64;

/// A rectangle in screen coordinates (pixels).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    /// Create a new rectangle.
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }
}

/// Serialize `value` as pretty JSON and write it to `path` atomically.
///
/// The data is written to a sibling temp file first and renamed over the
/// target, so readers never observe a partial write.
pub(crate) fn atomic_write_json<T: Serialize>(path: &Path, value: &T) -> std::io::Result<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}
