//! Trial state machines for closed-loop behavioral tasks.
//!
//! A task is ticked once per host loop iteration. Each tick evaluates only
//! the current state, may move to exactly one new state (running that
//! state's entry action), and reports a [`TrialOutcome`].
//!
//! Sensors, stimuli and reinforcement are collaborator calls behind the
//! [`AxisTaskIo`](vision_to_motion::AxisTaskIo) and
//! [`ForagingIo`](foraging::ForagingIo) traits. Time and randomness are
//! injected through [`Clock`](time::Clock) and [`RandomSource`](rng::RandomSource).

pub mod foraging;
pub mod policy;
pub mod rng;
pub mod stats;
pub mod time;
pub mod timing;
pub mod trial;
pub mod vision_to_motion;

// Reinforcement over a serial GPIO board.
// Kept behind the optional `rig` feature so the state machines build without hardware crates.
#[cfg(feature = "rig")]
pub mod rig_io;

pub use policy::{Reinforcement, Reinforcer, StagePolicy};
pub use stats::TrialStats;
pub use trial::{TaskState, Timeline, TrialOutcome};
