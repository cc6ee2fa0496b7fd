//! Stage Policy Table.
//!
//! A fixed per-task table mapping (decision point, stage) to a reinforcement.
//! The stage itself belongs to whoever drives stage progression; the table
//! only reads it.

use std::fmt::Debug;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reinforcement {
    None,
    Reward,
    Punish,
}

/// Delivers reinforcement to the subject.
pub trait Reinforcer {
    fn reward(&mut self);
    fn punish(&mut self);

    fn deliver(&mut self, r: Reinforcement) {
        match r {
            Reinforcement::None => {}
            Reinforcement::Reward => self.reward(),
            Reinforcement::Punish => self.punish(),
        }
    }
}

/// One decision point and its reinforcement per stage; column 0 is stage 1.
#[derive(Debug)]
pub struct PolicyRow<K: 'static> {
    pub key: K,
    pub by_stage: &'static [Reinforcement],
}

#[derive(Debug)]
pub struct StagePolicy<K: 'static> {
    rows: &'static [PolicyRow<K>],
}

impl<K: Copy + PartialEq + Debug> StagePolicy<K> {
    pub const fn new(rows: &'static [PolicyRow<K>]) -> Self {
        Self { rows }
    }

    /// Reinforcement for `key` at `stage`.
    ///
    /// Stages are 1-based. Stage 0 reads as stage 1 and stages past the last
    /// column reuse the last column.
    ///
    /// # Panics
    /// If `key` has no row. Every decision point a task reaches must be in
    /// its table.
    pub fn lookup(&self, key: K, stage: u32) -> Reinforcement {
        let Some(row) = self.rows.iter().find(|r| r.key == key) else {
            panic!("no policy row for {key:?}");
        };
        let column = (stage.max(1) as usize - 1).min(row.by_stage.len().saturating_sub(1));
        row.by_stage.get(column).copied().unwrap_or(Reinforcement::None)
    }

    /// Number of stages the widest row distinguishes.
    pub fn stages(&self) -> usize {
        self.rows.iter().map(|r| r.by_stage.len()).max().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use Reinforcement::*;

    static TABLE: StagePolicy<u8> = StagePolicy::new(&[
        PolicyRow {
            key: 1,
            by_stage: &[Reward, Reward, Punish],
        },
        PolicyRow {
            key: 2,
            by_stage: &[Punish],
        },
    ]);

    #[test]
    fn lookup_by_stage() {
        assert_eq!(TABLE.lookup(1, 1), Reward);
        assert_eq!(TABLE.lookup(1, 2), Reward);
        assert_eq!(TABLE.lookup(1, 3), Punish);
        assert_eq!(TABLE.lookup(2, 3), Punish);
        assert_eq!(TABLE.stages(), 3);
    }

    #[test]
    fn out_of_range_stages_clamp() {
        assert_eq!(TABLE.lookup(1, 0), Reward);
        assert_eq!(TABLE.lookup(1, 9), Punish);
    }

    #[test]
    #[should_panic(expected = "no policy row")]
    fn missing_row_panics() {
        TABLE.lookup(7, 1);
    }

    #[derive(Default)]
    struct Tally {
        rewards: u32,
        punishments: u32,
    }

    impl Reinforcer for Tally {
        fn reward(&mut self) {
            self.rewards += 1;
        }
        fn punish(&mut self) {
            self.punishments += 1;
        }
    }

    #[test]
    fn deliver_dispatches() {
        let mut t = Tally::default();
        t.deliver(Reward);
        t.deliver(None);
        t.deliver(Punish);
        assert_eq!((t.rewards, t.punishments), (1, 1));
    }
}
