//! Vision-to-motion training task.
//!
//! The subject pushes a joystick axis away from rest while a visual target
//! is shown, holds it, and releases it within a reaction window after the
//! target changes. Stages shape the behavior:
//!
//! - stage 1: any axis movement starts a forced hold; early releases are rewarded
//! - stage 2: movement must wait for the target; early releases still rewarded
//! - stage 3: only a release inside the reaction window is rewarded

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::policy::{PolicyRow, Reinforcement, Reinforcer, StagePolicy};
use crate::rng::{Prng, RandomSource};
use crate::stats::TrialStats;
use crate::time::{Clock, MonotonicClock};
use crate::timing::{ms, DurationDist};
use crate::trial::{TaskState, Timeline, TrialOutcome};

/// Sensors and stimuli the task drives.
pub trait AxisTaskIo: Reinforcer {
    /// Axis at rest.
    fn axis_zero(&mut self) -> bool;
    fn target_on(&mut self);
    fn target_off(&mut self);
    fn change_target(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AxisState {
    PreInterval,
    TargetOn,
    ForcedHold,
    TargetChange,
    ReactionWindow,
    PostInterval,
}

impl TaskState for AxisState {
    const ALL: &'static [Self] = &[
        AxisState::PreInterval,
        AxisState::TargetOn,
        AxisState::ForcedHold,
        AxisState::TargetChange,
        AxisState::ReactionWindow,
        AxisState::PostInterval,
    ];
    const INITIAL: Self = AxisState::PreInterval;

    fn index(self) -> usize {
        self as usize
    }

    fn name(self) -> &'static str {
        match self {
            AxisState::PreInterval => "pre_interval",
            AxisState::TargetOn => "target_on",
            AxisState::ForcedHold => "forced_hold",
            AxisState::TargetChange => "target_change",
            AxisState::ReactionWindow => "reaction_window",
            AxisState::PostInterval => "post_interval",
        }
    }

    fn successors(self) -> &'static [Self] {
        use AxisState::*;
        match self {
            PreInterval => &[PreInterval, TargetOn, ForcedHold],
            TargetOn => &[ForcedHold, PreInterval],
            ForcedHold => &[TargetChange, PostInterval],
            TargetChange => &[ReactionWindow, PostInterval],
            ReactionWindow => &[PostInterval],
            PostInterval => &[PreInterval],
        }
    }
}

/// Reinforcement per terminal outcome and stage (columns are stages 1, 2, 3).
pub static POLICY: StagePolicy<TrialOutcome> = {
    use Reinforcement::{None, Punish, Reward};
    StagePolicy::new(&[
        PolicyRow {
            key: TrialOutcome::Fail,
            by_stage: &[Punish, Punish, Punish],
        },
        PolicyRow {
            key: TrialOutcome::EarlyHold,
            by_stage: &[Reward, Reward, Punish],
        },
        PolicyRow {
            key: TrialOutcome::EarlyRelease,
            by_stage: &[Reward, Reward, None],
        },
        PolicyRow {
            key: TrialOutcome::Hit,
            by_stage: &[Reward],
        },
        PolicyRow {
            key: TrialOutcome::Miss,
            by_stage: &[Punish, Punish, Punish],
        },
    ])
};

fn default_pre_interval() -> DurationDist {
    DurationDist::uniform(1000.0, 2000.0)
}

fn default_forced_hold() -> DurationDist {
    DurationDist::uniform(500.0, 1000.0)
}

fn default_post_interval() -> DurationDist {
    DurationDist::fixed(1000.0)
}

fn default_wait_for_axis_ms() -> f64 {
    5000.0
}

fn default_min_release_ms() -> f64 {
    100.0
}

fn default_max_release_ms() -> f64 {
    1000.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisTaskTiming {
    #[serde(default = "default_pre_interval")]
    pub pre_interval: DurationDist,
    #[serde(default = "default_forced_hold")]
    pub forced_hold: DurationDist,
    #[serde(default = "default_post_interval")]
    pub post_interval: DurationDist,
    /// Target on without axis movement for this long is a failed trial.
    #[serde(default = "default_wait_for_axis_ms")]
    pub wait_for_axis_ms: f64,
    /// Reaction times are measured from the target change.
    #[serde(default = "default_min_release_ms")]
    pub min_release_ms: f64,
    #[serde(default = "default_max_release_ms")]
    pub max_release_ms: f64,
}

impl Default for AxisTaskTiming {
    fn default() -> Self {
        Self {
            pre_interval: default_pre_interval(),
            forced_hold: default_forced_hold(),
            post_interval: default_post_interval(),
            wait_for_axis_ms: default_wait_for_axis_ms(),
            min_release_ms: default_min_release_ms(),
            max_release_ms: default_max_release_ms(),
        }
    }
}

#[derive(Debug)]
pub struct VisionToMotion<C: Clock = MonotonicClock, R: RandomSource = Prng> {
    pub stage: u32,
    pub timing: AxisTaskTiming,
    pub stats: TrialStats,
    timeline: Timeline<AxisState>,
    clock: C,
    rng: R,
    pre_interval: Duration,
    forced_hold: Duration,
    post_interval: Duration,
}

impl<C: Clock, R: RandomSource> VisionToMotion<C, R> {
    pub fn new(timing: AxisTaskTiming, stage: u32, clock: C, mut rng: R) -> Self {
        let timeline = Timeline::start(clock.now());
        // The initial state's entry action is a draw and needs no collaborator.
        let pre_interval = timing.pre_interval.draw(&mut rng);
        Self {
            stage,
            timing,
            stats: TrialStats::new(),
            timeline,
            clock,
            rng,
            pre_interval,
            forced_hold: Duration::ZERO,
            post_interval: Duration::ZERO,
        }
    }

    pub fn state(&self) -> AxisState {
        self.timeline.current()
    }

    pub fn timeline(&self) -> &Timeline<AxisState> {
        &self.timeline
    }

    /// Evaluate the current state once.
    pub fn tick<I: AxisTaskIo>(&mut self, io: &mut I) -> TrialOutcome {
        let now = self.clock.now();
        let outcome = self.evaluate(now, io);
        if outcome.is_terminal() {
            self.stats.record(outcome);
            info!(task = "vision_to_motion", stage = self.stage, %outcome, trials = self.stats.trials, "trial finished");
        }
        outcome
    }

    fn evaluate<I: AxisTaskIo>(&mut self, now: Duration, io: &mut I) -> TrialOutcome {
        use AxisState::*;

        let in_state = self.timeline.in_state(now);
        match self.state() {
            PreInterval => {
                if !io.axis_zero() {
                    // Stage 1 accepts movement without the target; later
                    // stages restart the interval instead.
                    let next = if self.stage <= 1 { ForcedHold } else { PreInterval };
                    self.enter(next, now, io);
                } else if in_state >= self.pre_interval {
                    self.enter(TargetOn, now, io);
                }
            }
            TargetOn => {
                if !io.axis_zero() {
                    self.enter(ForcedHold, now, io);
                } else if in_state >= ms(self.timing.wait_for_axis_ms) {
                    io.target_off();
                    return self.finish(TrialOutcome::Fail, PreInterval, now, io);
                }
            }
            ForcedHold => {
                if io.axis_zero() {
                    io.target_off();
                    return self.finish(TrialOutcome::EarlyHold, PostInterval, now, io);
                } else if in_state >= self.forced_hold {
                    self.enter(TargetChange, now, io);
                }
            }
            TargetChange => {
                if io.axis_zero() {
                    io.target_off();
                    return self.finish(TrialOutcome::EarlyRelease, PostInterval, now, io);
                } else if self.reaction_time(now) >= ms(self.timing.min_release_ms) {
                    self.enter(ReactionWindow, now, io);
                }
            }
            ReactionWindow => {
                if io.axis_zero() {
                    io.target_off();
                    return self.finish(TrialOutcome::Hit, PostInterval, now, io);
                } else if self.reaction_time(now) >= ms(self.timing.max_release_ms) {
                    io.target_off();
                    return self.finish(TrialOutcome::Miss, PostInterval, now, io);
                }
            }
            PostInterval => {
                if in_state >= self.post_interval {
                    self.enter(PreInterval, now, io);
                }
            }
        }
        TrialOutcome::Continue
    }

    /// Time since the target changed.
    ///
    /// # Panics
    ///
    /// If the target has not changed yet this session.
    pub fn reaction_time(&self, now: Duration) -> Duration {
        self.timeline.since(AxisState::TargetChange, now)
    }

    fn finish<I: AxisTaskIo>(
        &mut self,
        outcome: TrialOutcome,
        next: AxisState,
        now: Duration,
        io: &mut I,
    ) -> TrialOutcome {
        io.deliver(POLICY.lookup(outcome, self.stage));
        self.enter(next, now, io);
        outcome
    }

    /// Every transition goes through here; only `next`'s entry action runs.
    fn enter<I: AxisTaskIo>(&mut self, next: AxisState, now: Duration, io: &mut I) {
        debug!(from = self.state().name(), to = next.name(), "enter");
        self.timeline.enter(next, now);
        match next {
            AxisState::PreInterval => {
                self.pre_interval = self.timing.pre_interval.draw(&mut self.rng);
            }
            AxisState::TargetOn => io.target_on(),
            AxisState::ForcedHold => {
                self.forced_hold = self.timing.forced_hold.draw(&mut self.rng);
            }
            AxisState::TargetChange => io.change_target(),
            AxisState::ReactionWindow => {}
            AxisState::PostInterval => {
                self.post_interval = self.timing.post_interval.draw(&mut self.rng);
            }
        }
    }
}
