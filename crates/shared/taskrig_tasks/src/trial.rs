//! Shared pieces of every trial state machine: outcomes, the state trait and
//! the onset timeline.

use std::fmt::Debug;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Result of one tick. At most one terminal outcome is produced per tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrialOutcome {
    /// No terminal event this tick.
    Continue,
    Hit,
    Miss,
    Fail,
    EarlyHold,
    EarlyRelease,
    End,
}

impl TrialOutcome {
    pub const TERMINAL: [TrialOutcome; 6] = [
        TrialOutcome::Hit,
        TrialOutcome::Miss,
        TrialOutcome::Fail,
        TrialOutcome::EarlyHold,
        TrialOutcome::EarlyRelease,
        TrialOutcome::End,
    ];

    pub fn is_terminal(self) -> bool {
        self != TrialOutcome::Continue
    }

    pub fn name(self) -> &'static str {
        match self {
            TrialOutcome::Continue => "continue",
            TrialOutcome::Hit => "hit",
            TrialOutcome::Miss => "miss",
            TrialOutcome::Fail => "fail",
            TrialOutcome::EarlyHold => "early_hold",
            TrialOutcome::EarlyRelease => "early_release",
            TrialOutcome::End => "end",
        }
    }
}

impl std::fmt::Display for TrialOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A task's finite state set together with its transition table.
pub trait TaskState: Copy + Eq + Debug + 'static {
    /// Every state, in a fixed order; `index` is the position in this slice.
    const ALL: &'static [Self];
    const INITIAL: Self;

    fn index(self) -> usize;
    fn name(self) -> &'static str;
    /// States reachable from `self` in one transition.
    fn successors(self) -> &'static [Self];
}

/// Current state plus the onset of the most recent entry into every state.
#[derive(Debug, Clone)]
pub struct Timeline<S: TaskState> {
    current: S,
    onsets: Vec<Option<Duration>>,
    transitions: u64,
}

impl<S: TaskState> Timeline<S> {
    /// Start in `S::INITIAL` at `now`.
    pub fn start(now: Duration) -> Self {
        let mut onsets = vec![None; S::ALL.len()];
        onsets[S::INITIAL.index()] = Some(now);
        Self {
            current: S::INITIAL,
            onsets,
            transitions: 0,
        }
    }

    pub fn current(&self) -> S {
        self.current
    }

    pub fn transitions(&self) -> u64 {
        self.transitions
    }

    pub fn onset(&self, state: S) -> Option<Duration> {
        self.onsets[state.index()]
    }

    /// Time since `state` was last entered.
    ///
    /// # Panics
    /// If `state` has never been entered; a task only asks about states on
    /// the path that led to the current one.
    pub fn since(&self, state: S, now: Duration) -> Duration {
        match self.onset(state) {
            Some(at) => now.saturating_sub(at),
            None => panic!("{} has no onset yet", state.name()),
        }
    }

    /// Time spent in the current state.
    pub fn in_state(&self, now: Duration) -> Duration {
        self.since(self.current, now)
    }

    /// Record a transition into `next`.
    ///
    /// # Panics
    /// If `next` is not a successor of the current state.
    pub fn enter(&mut self, next: S, now: Duration) {
        assert!(
            self.current.successors().contains(&next),
            "illegal transition {} -> {}",
            self.current.name(),
            next.name()
        );
        self.onsets[next.index()] = Some(now);
        self.current = next;
        self.transitions += 1;
    }
}
