//! Clock-injected poll state machine.
//!
//! `Idle -> Scheduled -> Scanning -> Scheduled ...`, with every transition
//! taking `now` from the caller so the logic can be driven by a real or a
//! paused tokio clock. The actor in [`super`] owns one of these and only
//! translates timer expiries and signals into calls on it.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::debug;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// The three poll cadences.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollIntervals {
    /// Visible, with at least one dirty worktree.
    pub active_dirty: Duration,
    /// Visible, everything committed.
    pub active_clean: Duration,
    /// Not visible to the user.
    pub hidden: Duration,
}

impl Default for PollIntervals {
    fn default() -> Self {
        Self {
            active_dirty: Duration::from_secs(30),
            active_clean: Duration::from_secs(60),
            hidden: Duration::from_secs(300),
        }
    }
}

impl PollIntervals {
    /// Hidden wins over dirty, dirty over clean.
    pub fn select(&self, visibility: Visibility, has_dirty_worktree: bool) -> Duration {
        match (visibility, has_dirty_worktree) {
            (Visibility::Hidden, _) => self.hidden,
            (Visibility::Visible, true) => self.active_dirty,
            (Visibility::Visible, false) => self.active_clean,
        }
    }
}

/// Whether the dashboard is currently in front of the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Visible,
    Hidden,
}

/// Signals owned by the surrounding application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerInputs {
    pub enabled: bool,
    pub local_path: Option<String>,
    pub is_editing_edge: bool,
    pub has_dirty_worktree: bool,
    pub visibility: Visibility,
}

impl Default for SchedulerInputs {
    fn default() -> Self {
        Self {
            enabled: true,
            local_path: None,
            is_editing_edge: false,
            has_dirty_worktree: false,
            visibility: Visibility::Visible,
        }
    }
}

/// A change to one of the [`SchedulerInputs`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerSignal {
    SetEnabled(bool),
    SetLocalPath(Option<String>),
    SetEditingEdge(bool),
    SetDirtyWorktree(bool),
    SetVisibility(Visibility),
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Scheduler lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    /// No timer armed.
    Idle,
    /// A timer is armed for `next_scan_time`.
    Scheduled,
    /// The scan trigger is being invoked.
    Scanning,
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Scheduled => write!(f, "scheduled"),
            Self::Scanning => write!(f, "scanning"),
        }
    }
}

/// Observable scheduler state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerStatus {
    pub state: SchedulerState,
    /// Interval the current inputs select.
    pub interval: Duration,
    pub last_scan_time: Option<Instant>,
    pub next_scan_time: Option<Instant>,
    pub is_scanning: bool,
    pub scans_triggered: u64,
}

/// The poll state machine.
#[derive(Debug, Clone)]
pub struct PollState {
    intervals: PollIntervals,
    inputs: SchedulerInputs,
    state: SchedulerState,
    deadline: Option<Instant>,
    last_scan_time: Option<Instant>,
    created_at: Instant,
    scans_triggered: u64,
}

impl PollState {
    /// A new machine in `Idle`; nothing is armed until [`schedule`](Self::schedule).
    pub fn new(intervals: PollIntervals, inputs: SchedulerInputs, now: Instant) -> Self {
        Self {
            intervals,
            inputs,
            state: SchedulerState::Idle,
            deadline: None,
            last_scan_time: None,
            created_at: now,
            scans_triggered: 0,
        }
    }

    pub fn inputs(&self) -> &SchedulerInputs {
        &self.inputs
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// When the armed timer expires, if one is armed.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn current_interval(&self) -> Duration {
        self.intervals
            .select(self.inputs.visibility, self.inputs.has_dirty_worktree)
    }

    /// Path to scan if scanning is currently allowed at all.
    fn scannable_path(&self) -> Option<&str> {
        if !self.inputs.enabled || self.inputs.is_editing_edge {
            return None;
        }
        self.inputs.local_path.as_deref().filter(|p| !p.is_empty())
    }

    /// Cancel any armed timer and arm a fresh one if scanning is allowed.
    pub fn schedule(&mut self, now: Instant) {
        self.deadline = None;
        if self.scannable_path().is_none() {
            self.state = SchedulerState::Idle;
            debug!(
                enabled = self.inputs.enabled,
                editing = self.inputs.is_editing_edge,
                has_path = self.inputs.local_path.is_some(),
                "poll timer not armed"
            );
            return;
        }

        let interval = self.current_interval();
        self.deadline = Some(now + interval);
        self.state = SchedulerState::Scheduled;
        debug!(interval_secs = interval.as_secs(), "poll timer armed");
    }

    /// Clear any armed timer and return to `Idle`. Safe to call repeatedly.
    pub fn cancel(&mut self) {
        self.deadline = None;
        self.state = SchedulerState::Idle;
    }

    /// The armed timer expired. Returns the path to scan, or `None` when the
    /// fire was suppressed (the machine has already re-scheduled itself).
    pub fn on_timer(&mut self, now: Instant) -> Option<String> {
        self.deadline = None;
        match self.scannable_path().map(str::to_owned) {
            Some(path) => {
                self.begin_scan(now);
                Some(path)
            }
            None => {
                debug!("poll tick suppressed");
                self.schedule(now);
                None
            }
        }
    }

    /// Apply an input change. Returns a path when an immediate catch-up scan
    /// is due; otherwise the machine has re-scheduled itself. Setting an
    /// input to its current value is a no-op.
    pub fn apply(&mut self, signal: SchedulerSignal, now: Instant) -> Option<String> {
        let inputs = &mut self.inputs;
        let changed = match signal {
            SchedulerSignal::SetEnabled(v) => replace(&mut inputs.enabled, v),
            SchedulerSignal::SetLocalPath(v) => replace(&mut inputs.local_path, v),
            SchedulerSignal::SetEditingEdge(v) => replace(&mut inputs.is_editing_edge, v),
            SchedulerSignal::SetDirtyWorktree(v) => replace(&mut inputs.has_dirty_worktree, v),
            SchedulerSignal::SetVisibility(v) => {
                let changed = replace(&mut inputs.visibility, v);
                if changed && v == Visibility::Visible {
                    return self.on_visible(now);
                }
                changed
            }
        };

        if changed {
            self.schedule(now);
        }
        None
    }

    fn on_visible(&mut self, now: Instant) -> Option<String> {
        let since = self.last_scan_time.unwrap_or(self.created_at);
        let interval = self.current_interval();
        let elapsed = now.saturating_duration_since(since);

        if elapsed >= interval {
            if let Some(path) = self.scannable_path().map(str::to_owned) {
                debug!(elapsed_secs = elapsed.as_secs(), "catch-up scan after becoming visible");
                self.deadline = None;
                self.begin_scan(now);
                return Some(path);
            }
        }

        self.schedule(now);
        None
    }

    fn begin_scan(&mut self, now: Instant) {
        self.state = SchedulerState::Scanning;
        self.last_scan_time = Some(now);
        self.scans_triggered += 1;
    }

    /// The trigger has been invoked; arm the next timer without waiting for
    /// the scan itself.
    pub fn scan_dispatched(&mut self, now: Instant) {
        self.schedule(now);
    }

    pub fn status(&self) -> SchedulerStatus {
        SchedulerStatus {
            state: self.state,
            interval: self.current_interval(),
            last_scan_time: self.last_scan_time,
            next_scan_time: self.deadline,
            is_scanning: self.state == SchedulerState::Scanning,
            scans_triggered: self.scans_triggered,
        }
    }
}

fn replace<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        return false;
    }
    *slot = value;
    true
}
