//! Pending-launch registry.
//!
//! Window-manager events do not say *why* a window was created. When two
//! instances of the same application start back to back, the only
//! reliable way to attribute each window to its launch is
//! pre-registration: the launch wrapper tells the daemon "I am about to
//! exec app X for project P on workspace W" before the window exists,
//! and the registry matches the next window of that class against the
//! pending entries using class equality, temporal proximity, and the
//! workspace hint.
//!
//! Entries expire after a bounded window so a launch whose window never
//! appears (the app crashed) cannot leak memory or mis-claim a much
//! later window.

use crate::ownership::WindowOwnership;
use std::time::{Duration, Instant};
use tracing::debug;

/// Default time-to-live for a pending launch.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5);

/// A registered launch whose window has not yet appeared.
#[derive(Debug, Clone)]
pub struct PendingLaunch {
    /// Unique per launch attempt (app name + timestamp by convention).
    pub app_id: String,
    /// Window class the resulting window is expected to carry.
    pub expected_class: String,
    /// Ownership the resulting window inherits.
    pub ownership: WindowOwnership,
    /// Workspace the launcher intended the window for, if known.
    pub workspace: Option<i32>,
    pub requested_at: Instant,
}

/// How certain a correlation is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd)]
pub enum Confidence {
    /// Several candidates, none agreed on the workspace hint; matched by
    /// registration order (earliest wins).
    Low,
    /// Several candidates, disambiguated by workspace hint.
    Medium,
    /// Exactly one candidate of the right class within the window.
    High,
}

/// A consumed correlation result.
#[derive(Debug, Clone)]
pub struct LaunchMatch {
    pub launch: PendingLaunch,
    pub confidence: Confidence,
}

/// Short-lived table of pending launches.
#[derive(Debug)]
pub struct LaunchRegistry {
    pending: Vec<PendingLaunch>,
    ttl: Duration,
}

impl Default for LaunchRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl LaunchRegistry {
    pub fn new(ttl: Duration) -> Self {
        Self {
            pending: Vec::new(),
            ttl,
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Insert a pending launch.
    pub fn register(&mut self, launch: PendingLaunch) {
        debug!(
            app_id = %launch.app_id,
            class = %launch.expected_class,
            "registered pending launch"
        );
        self.pending.push(launch);
    }

    /// Match a newly observed window against the pending launches.
    ///
    /// Candidates are entries whose expected class equals the window's
    /// class and whose age is within the TTL. One candidate matches with
    /// high confidence. With several, the ones agreeing on the workspace
    /// hint are preferred (most recent first); when none agree, the
    /// earliest registration wins. The matched entry is consumed.
    pub fn correlate(
        &mut self,
        window_class: &str,
        window_workspace: Option<i32>,
        now: Instant,
    ) -> Option<LaunchMatch> {
        let candidates: Vec<usize> = self
            .pending
            .iter()
            .enumerate()
            .filter(|(_, p)| {
                p.expected_class == window_class
                    && now.duration_since(p.requested_at) < self.ttl
            })
            .map(|(i, _)| i)
            .collect();

        let (index, confidence) = match candidates.len() {
            0 => return None,
            1 => (candidates[0], Confidence::High),
            _ => {
                let hinted: Vec<usize> = candidates
                    .iter()
                    .copied()
                    .filter(|&i| {
                        window_workspace.is_some()
                            && self.pending[i].workspace == window_workspace
                    })
                    .collect();

                if let Some(&best) = hinted
                    .iter()
                    .max_by_key(|&&i| self.pending[i].requested_at)
                {
                    (best, Confidence::Medium)
                } else {
                    // Deterministic tie-break: earliest registration wins.
                    let mut earliest = candidates[0];
                    for &i in &candidates[1..] {
                        if self.pending[i].requested_at < self.pending[earliest].requested_at {
                            earliest = i;
                        }
                    }
                    (earliest, Confidence::Low)
                }
            }
        };

        let launch = self.pending.remove(index);
        debug!(
            app_id = %launch.app_id,
            confidence = ?confidence,
            "correlated window to pending launch"
        );
        Some(LaunchMatch { launch, confidence })
    }

    /// Drop entries older than the TTL. Returns how many were removed.
    pub fn expire(&mut self, now: Instant) -> usize {
        let before = self.pending.len();
        let ttl = self.ttl;
        self.pending
            .retain(|p| now.duration_since(p.requested_at) < ttl);
        let removed = before - self.pending.len();
        if removed > 0 {
            debug!("expired {} pending launches", removed);
        }
        removed
    }
}
