//! Visual foraging task.
//!
//! After an inter-trial interval a fixation target appears. Holding gaze on
//! it brings up an array of figures; holding gaze on a reward figure ends the
//! trial with a hit, on a punish figure with a miss. Gaze may wander between
//! figures until the array times out.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::policy::{PolicyRow, Reinforcement, Reinforcer, StagePolicy};
use crate::rng::{Prng, RandomSource};
use crate::stats::TrialStats;
use crate::time::{Clock, MonotonicClock};
use crate::timing::{ms, DurationDist};
use crate::trial::{TaskState, Timeline, TrialOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Figure {
    Reward,
    Punish,
    Neutral,
}

pub trait ForagingIo: Reinforcer {
    fn gaze_on_fix_target(&mut self) -> bool;
    /// The array figure under the gaze, if any.
    fn fixated_figure(&mut self) -> Option<Figure>;
    fn fix_target_on(&mut self);
    fn fix_target_off(&mut self);
    fn fig_array_on(&mut self);
    fn fig_array_off(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ForagingState {
    PreInterval,
    FixTargetOn,
    FixAcquired,
    FigArrayOn,
    FigFixAcquired,
    FigFixLost,
    PostInterval,
}

impl TaskState for ForagingState {
    const ALL: &'static [Self] = &[
        ForagingState::PreInterval,
        ForagingState::FixTargetOn,
        ForagingState::FixAcquired,
        ForagingState::FigArrayOn,
        ForagingState::FigFixAcquired,
        ForagingState::FigFixLost,
        ForagingState::PostInterval,
    ];
    const INITIAL: Self = ForagingState::PreInterval;

    fn index(self) -> usize {
        self as usize
    }

    fn name(self) -> &'static str {
        match self {
            ForagingState::PreInterval => "pre_interval",
            ForagingState::FixTargetOn => "fix_target_on",
            ForagingState::FixAcquired => "fix_acquired",
            ForagingState::FigArrayOn => "fig_array_on",
            ForagingState::FigFixAcquired => "fig_fix_acquired",
            ForagingState::FigFixLost => "fig_fix_lost",
            ForagingState::PostInterval => "post_interval",
        }
    }

    fn successors(self) -> &'static [Self] {
        use ForagingState::*;
        match self {
            PreInterval => &[FixTargetOn],
            FixTargetOn => &[FixAcquired, PreInterval],
            FixAcquired => &[FigArrayOn, PostInterval],
            FigArrayOn => &[FigFixAcquired, PostInterval],
            FigFixAcquired => &[FigFixLost, PostInterval, PreInterval],
            FigFixLost => &[FigFixAcquired, PreInterval],
            PostInterval => &[PreInterval],
        }
    }
}

/// Foraging reinforcement does not depend on stage.
pub static POLICY: StagePolicy<TrialOutcome> = {
    use Reinforcement::{None, Punish, Reward};
    StagePolicy::new(&[
        PolicyRow {
            key: TrialOutcome::Fail,
            by_stage: &[Punish],
        },
        PolicyRow {
            key: TrialOutcome::EarlyHold,
            by_stage: &[Punish],
        },
        PolicyRow {
            key: TrialOutcome::Hit,
            by_stage: &[Reward],
        },
        PolicyRow {
            key: TrialOutcome::Miss,
            by_stage: &[Punish],
        },
        PolicyRow {
            key: TrialOutcome::End,
            by_stage: &[None],
        },
    ])
};

fn default_pre_interval() -> DurationDist {
    DurationDist::uniform(1000.0, 2000.0)
}

fn default_fix_hold() -> DurationDist {
    DurationDist::uniform(300.0, 600.0)
}

fn default_fig_array() -> DurationDist {
    DurationDist::fixed(5000.0)
}

fn default_fig_fix() -> DurationDist {
    DurationDist::fixed(300.0)
}

fn default_post_interval() -> DurationDist {
    DurationDist::fixed(1000.0)
}

fn default_wait_for_fix_ms() -> f64 {
    3000.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForagingTiming {
    #[serde(default = "default_pre_interval")]
    pub pre_interval: DurationDist,
    /// Required fixation on the fix target before the array appears.
    #[serde(default = "default_fix_hold")]
    pub fix_hold: DurationDist,
    /// Array lifetime, counted from array onset.
    #[serde(default = "default_fig_array")]
    pub fig_array: DurationDist,
    /// Required fixation on one figure to choose it.
    #[serde(default = "default_fig_fix")]
    pub fig_fix: DurationDist,
    #[serde(default = "default_post_interval")]
    pub post_interval: DurationDist,
    #[serde(default = "default_wait_for_fix_ms")]
    pub wait_for_fix_ms: f64,
}

impl Default for ForagingTiming {
    fn default() -> Self {
        Self {
            pre_interval: default_pre_interval(),
            fix_hold: default_fix_hold(),
            fig_array: default_fig_array(),
            fig_fix: default_fig_fix(),
            post_interval: default_post_interval(),
            wait_for_fix_ms: default_wait_for_fix_ms(),
        }
    }
}

#[derive(Debug)]
pub struct VisualForaging<C: Clock = MonotonicClock, R: RandomSource = Prng> {
    pub stage: u32,
    pub timing: ForagingTiming,
    pub stats: TrialStats,
    timeline: Timeline<ForagingState>,
    clock: C,
    rng: R,
    pre_interval: Duration,
    fix_hold: Duration,
    fig_array: Duration,
    fig_fix: Duration,
    post_interval: Duration,
}

impl<C: Clock, R: RandomSource> VisualForaging<C, R> {
    pub fn new(timing: ForagingTiming, stage: u32, clock: C, mut rng: R) -> Self {
        let timeline = Timeline::start(clock.now());
        let pre_interval = timing.pre_interval.draw(&mut rng);
        Self {
            stage,
            timing,
            stats: TrialStats::new(),
            timeline,
            clock,
            rng,
            pre_interval,
            fix_hold: Duration::ZERO,
            fig_array: Duration::ZERO,
            fig_fix: Duration::ZERO,
            post_interval: Duration::ZERO,
        }
    }

    pub fn state(&self) -> ForagingState {
        self.timeline.current()
    }

    pub fn timeline(&self) -> &Timeline<ForagingState> {
        &self.timeline
    }

    pub fn tick<I: ForagingIo>(&mut self, io: &mut I) -> TrialOutcome {
        let now = self.clock.now();
        let outcome = self.evaluate(now, io);
        if outcome.is_terminal() {
            self.stats.record(outcome);
            info!(task = "visual_foraging", %outcome, trials = self.stats.trials, "trial finished");
        }
        outcome
    }

    fn evaluate<I: ForagingIo>(&mut self, now: Duration, io: &mut I) -> TrialOutcome {
        use ForagingState::*;

        let in_state = self.timeline.in_state(now);
        match self.state() {
            PreInterval => {
                if in_state >= self.pre_interval {
                    self.enter(FixTargetOn, now, io);
                }
            }
            FixTargetOn => {
                if io.gaze_on_fix_target() {
                    self.enter(FixAcquired, now, io);
                } else if in_state >= ms(self.timing.wait_for_fix_ms) {
                    io.fix_target_off();
                    return self.finish(TrialOutcome::Fail, PreInterval, now, io);
                }
            }
            FixAcquired => {
                if !io.gaze_on_fix_target() {
                    io.fix_target_off();
                    return self.finish(TrialOutcome::EarlyHold, PostInterval, now, io);
                } else if in_state >= self.fix_hold {
                    io.fix_target_off();
                    self.enter(FigArrayOn, now, io);
                }
            }
            FigArrayOn => {
                if self.array_time(now) >= self.fig_array {
                    io.fig_array_off();
                    return self.finish(TrialOutcome::Miss, PostInterval, now, io);
                } else if io.fixated_figure().is_some() {
                    self.enter(FigFixAcquired, now, io);
                }
            }
            FigFixAcquired => match io.fixated_figure() {
                _ if self.array_time(now) >= self.fig_array => {
                    io.fig_array_off();
                    return self.finish(TrialOutcome::End, PreInterval, now, io);
                }
                None => self.enter(FigFixLost, now, io),
                Some(figure) if in_state >= self.fig_fix => {
                    let outcome = match figure {
                        Figure::Reward => TrialOutcome::Hit,
                        Figure::Punish => TrialOutcome::Miss,
                        // Keep waiting for the gaze to move to a scored figure.
                        Figure::Neutral => return TrialOutcome::Continue,
                    };
                    io.fig_array_off();
                    return self.finish(outcome, PostInterval, now, io);
                }
                Some(_) => {}
            },
            FigFixLost => {
                if self.array_time(now) >= self.fig_array {
                    io.fig_array_off();
                    return self.finish(TrialOutcome::End, PreInterval, now, io);
                } else if io.fixated_figure().is_some() {
                    self.enter(FigFixAcquired, now, io);
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

    fn array_time(&self, now: Duration) -> Duration {
        self.timeline.since(ForagingState::FigArrayOn, now)
    }

    fn finish<I: ForagingIo>(
        &mut self,
        outcome: TrialOutcome,
        next: ForagingState,
        now: Duration,
        io: &mut I,
    ) -> TrialOutcome {
        io.deliver(POLICY.lookup(outcome, self.stage));
        self.enter(next, now, io);
        outcome
    }

    fn enter<I: ForagingIo>(&mut self, next: ForagingState, now: Duration, io: &mut I) {
        debug!(from = self.state().name(), to = next.name(), "enter");
        self.timeline.enter(next, now);
        match next {
            ForagingState::PreInterval => {
                self.pre_interval = self.timing.pre_interval.draw(&mut self.rng);
            }
            ForagingState::FixTargetOn => io.fix_target_on(),
            ForagingState::FixAcquired => {
                self.fix_hold = self.timing.fix_hold.draw(&mut self.rng);
            }
            ForagingState::FigArrayOn => {
                self.fig_array = self.timing.fig_array.draw(&mut self.rng);
                io.fig_array_on();
            }
            ForagingState::FigFixAcquired => {
                self.fig_fix = self.timing.fig_fix.draw(&mut self.rng);
            }
            ForagingState::FigFixLost => {}
            ForagingState::PostInterval => {
                self.post_interval = self.timing.post_interval.draw(&mut self.rng);
            }
        }
    }
}
