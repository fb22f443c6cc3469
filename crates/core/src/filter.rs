//! Window filter engine: hide/restore planning.
//!
//! The engine works on `WindowView` snapshots extracted from a
//! just-fetched WM tree and plans two things: the batched WM command to
//! issue (one round trip for the whole window set, executed sequentially
//! by the WM) and the store mutations to apply for the windows whose
//! sub-commands succeed.
//!
//! Capture ordering is the load-bearing part. Moving a window to the
//! scratchpad forces it floating at the WM level, so workspace, floating
//! flag, and geometry must be captured *before* the first move, and a
//! repeat hide without an intervening restore must not refresh the
//! capture — at that point the window's live state is scratchpad
//! residue, not ground truth.

use crate::ownership::WindowOwnership;
use crate::store::{TrackedWindowState, WindowStore};
use crate::{Rect, WindowId};

/// Snapshot of one window, as extracted from the WM tree.
#[derive(Debug, Clone)]
pub struct WindowView {
    pub id: WindowId,
    /// Resolved ownership, if any signal (store, mark, environment)
    /// produced one.
    pub ownership: Option<WindowOwnership>,
    /// Workspace number the window currently sits on. `None` for
    /// scratchpad-resident windows.
    pub workspace: Option<i32>,
    pub floating: bool,
    pub geometry: Rect,
    pub in_scratchpad: bool,
}

/// One window's slice of a batched command.
#[derive(Debug, Clone)]
pub struct PlannedMove {
    pub window_id: WindowId,
    /// Criteria command for this window, e.g.
    /// `[con_id=7] move scratchpad`.
    pub command: String,
    /// Number of per-command results the WM reply will contain for this
    /// window (comma-chained commands each produce one).
    pub subcommands: usize,
}

/// Join per-window commands into one batched WM command.
///
/// A single semicolon-joined command string keeps the whole operation to
/// one IPC round trip, and the WM processes the list sequentially, which
/// keeps ordering deterministic.
pub fn batched_command(moves: &[PlannedMove]) -> Option<String> {
    if moves.is_empty() {
        return None;
    }
    Some(
        moves
            .iter()
            .map(|m| m.command.as_str())
            .collect::<Vec<_>>()
            .join("; "),
    )
}

/// Result of planning a hide.
#[derive(Debug, Default)]
pub struct HidePlan {
    pub moves: Vec<PlannedMove>,
    /// Fresh captures to upsert for windows whose move succeeds. Windows
    /// already hidden keep their existing record and do not appear here.
    pub captures: Vec<TrackedWindowState>,
}

impl HidePlan {
    pub fn capture_for(&self, id: WindowId) -> Option<&TrackedWindowState> {
        self.captures.iter().find(|c| c.window_id == id)
    }
}

/// One window's restore target.
#[derive(Debug, Clone, PartialEq)]
pub struct Restoration {
    pub window_id: WindowId,
    pub workspace: i32,
    pub floating: bool,
    pub geometry: Option<Rect>,
    /// True when the tracked workspace was unreachable and the window was
    /// sent to the fallback workspace instead.
    pub fallback: bool,
}

/// Result of planning a restore. `moves` and `restorations` are parallel.
#[derive(Debug, Default)]
pub struct RestorePlan {
    pub moves: Vec<PlannedMove>,
    pub restorations: Vec<Restoration>,
}

/// Plan hiding all scoped windows of `project`.
///
/// Windows already in the scratchpad are left alone: their capture is the
/// authoritative record and their live state is not. Global-scope windows
/// are never selected, whatever the project.
pub fn plan_hide(
    project: &str,
    views: &[WindowView],
    store: &WindowStore,
    now: u64,
) -> HidePlan {
    let mut plan = HidePlan::default();

    let mut selected: Vec<&WindowView> = views
        .iter()
        .filter(|v| {
            !v.in_scratchpad
                && v.ownership
                    .as_ref()
                    .is_some_and(|o| o.is_hidden_by(project))
        })
        .collect();
    selected.sort_by_key(|v| v.id);

    for view in selected {
        let Some(ownership) = view.ownership.as_ref() else {
            continue;
        };
        plan.moves.push(PlannedMove {
            window_id: view.id,
            command: format!("[con_id={}] move scratchpad", view.id),
            subcommands: 1,
        });

        let already_captured = store.get(view.id).is_some_and(|s| s.hidden);
        if !already_captured {
            plan.captures.push(TrackedWindowState {
                window_id: view.id,
                project_name: project.to_string(),
                app_name: ownership.app.clone(),
                tracked_workspace: view.workspace.unwrap_or(1),
                floating: view.floating,
                geometry: view.floating.then_some(view.geometry),
                hidden: true,
                last_seen: now,
            });
        }
    }

    plan
}

/// Plan restoring all hidden windows of `project`.
///
/// `workspace_ok` reports whether a tracked workspace is still reachable
/// (its output connected). Unreachable targets fall back to
/// `fallback_workspace` with the fallback flag set — a window is never
/// dropped, even when its capture is missing entirely.
pub fn plan_restore(
    project: &str,
    views: &[WindowView],
    store: &WindowStore,
    workspace_ok: &dyn Fn(i32) -> bool,
    fallback_workspace: i32,
) -> RestorePlan {
    let mut plan = RestorePlan::default();

    let mut selected: Vec<&WindowView> = views
        .iter()
        .filter(|v| {
            v.in_scratchpad
                && v.ownership
                    .as_ref()
                    .is_some_and(|o| o.is_hidden_by(project))
        })
        .collect();
    selected.sort_by_key(|v| v.id);

    for view in selected {
        let (workspace, floating, geometry, fallback) = match store.get(view.id) {
            Some(s) if workspace_ok(s.tracked_workspace) => {
                (s.tracked_workspace, s.floating, s.geometry, false)
            }
            Some(s) => (fallback_workspace, s.floating, s.geometry, true),
            // No capture at all (state lost across a crash): the window
            // still gets a home.
            None => (fallback_workspace, false, None, true),
        };

        let mut command = format!(
            "[con_id={}] move container to workspace number {}",
            view.id, workspace
        );
        let mut subcommands = 1;
        if floating {
            command.push_str(", floating enable");
            subcommands += 1;
            if let Some(rect) = geometry {
                command.push_str(&format!(
                    ", resize set {} px {} px, move position {} px {} px",
                    rect.width, rect.height, rect.x, rect.y
                ));
                subcommands += 2;
            }
        } else {
            command.push_str(", floating disable");
            subcommands += 1;
        }

        plan.moves.push(PlannedMove {
            window_id: view.id,
            command,
            subcommands,
        });
        plan.restorations.push(Restoration {
            window_id: view.id,
            workspace,
            floating,
            geometry,
            fallback,
        });
    }

    plan
}

/// Per-window outcome after executing a batched command.
#[derive(Debug, Clone, PartialEq)]
pub struct MoveOutcome {
    pub window_id: WindowId,
    pub success: bool,
    pub error: Option<String>,
}

/// Fold the WM's flat per-sub-command results back into per-window
/// outcomes. A window succeeds only if every one of its sub-commands
/// did; a missing result (truncated reply) counts as failure.
pub fn map_outcomes(
    moves: &[PlannedMove],
    results: &[(bool, Option<String>)],
) -> Vec<MoveOutcome> {
    let mut outcomes = Vec::with_capacity(moves.len());
    let mut cursor = 0;

    for planned in moves {
        let slice_end = (cursor + planned.subcommands).min(results.len());
        let slice = &results[cursor..slice_end];

        let (success, error) = if slice.len() < planned.subcommands {
            (false, Some("no result from window manager".to_string()))
        } else {
            match slice.iter().find(|(ok, _)| !ok) {
                Some((_, err)) => (
                    false,
                    Some(err.clone().unwrap_or_else(|| "command failed".to_string())),
                ),
                None => (true, None),
            }
        };

        outcomes.push(MoveOutcome {
            window_id: planned.window_id,
            success,
            error,
        });
        cursor += planned.subcommands;
    }

    outcomes
}
