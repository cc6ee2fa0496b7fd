use serde::{Deserialize, Serialize};

use crate::trial::TrialOutcome;

const RECENT_WINDOW: usize = 200;

/// Running outcome counts for one session, read by whoever decides stage
/// progression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialStats {
    pub trials: u32,
    pub hits: u32,
    pub misses: u32,
    pub fails: u32,
    pub early_holds: u32,
    pub early_releases: u32,
    pub ends: u32,
    /// Hit or not, newest last.
    pub recent: Vec<bool>,
}

impl TrialStats {
    pub fn new() -> Self {
        Self {
            trials: 0,
            hits: 0,
            misses: 0,
            fails: 0,
            early_holds: 0,
            early_releases: 0,
            ends: 0,
            recent: Vec::with_capacity(RECENT_WINDOW),
        }
    }

    /// `Continue` is not a trial and is ignored.
    pub fn record(&mut self, outcome: TrialOutcome) {
        let counter = match outcome {
            TrialOutcome::Continue => return,
            TrialOutcome::Hit => &mut self.hits,
            TrialOutcome::Miss => &mut self.misses,
            TrialOutcome::Fail => &mut self.fails,
            TrialOutcome::EarlyHold => &mut self.early_holds,
            TrialOutcome::EarlyRelease => &mut self.early_releases,
            TrialOutcome::End => &mut self.ends,
        };
        *counter += 1;

        self.recent.push(outcome == TrialOutcome::Hit);
        if self.recent.len() > RECENT_WINDOW {
            self.recent.remove(0);
        }
        self.trials += 1;
    }

    pub fn count(&self, outcome: TrialOutcome) -> u32 {
        match outcome {
            TrialOutcome::Continue => 0,
            TrialOutcome::Hit => self.hits,
            TrialOutcome::Miss => self.misses,
            TrialOutcome::Fail => self.fails,
            TrialOutcome::EarlyHold => self.early_holds,
            TrialOutcome::EarlyRelease => self.early_releases,
            TrialOutcome::End => self.ends,
        }
    }

    pub fn hit_rate(&self) -> f32 {
        if self.trials == 0 {
            0.0
        } else {
            self.hits as f32 / self.trials as f32
        }
    }

    pub fn recent_rate(&self) -> f32 {
        if self.recent.is_empty() {
            return 0.0;
        }
        let hits = self.recent.iter().filter(|&&x| x).count();
        hits as f32 / self.recent.len() as f32
    }

    pub fn last_100_rate(&self) -> f32 {
        if self.recent.len() < 10 {
            return self.recent_rate();
        }
        let start = self.recent.len().saturating_sub(100);
        let slice = &self.recent[start..];
        let hits = slice.iter().filter(|&&x| x).count();
        hits as f32 / slice.len() as f32
    }
}

impl Default for TrialStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn continue_is_not_counted() {
        let mut s = TrialStats::new();
        s.record(TrialOutcome::Continue);
        assert_eq!(s.trials, 0);
        assert_eq!(s.hit_rate(), 0.0);
    }

    #[test]
    fn counts_and_rates() {
        let mut s = TrialStats::new();
        for _ in 0..3 {
            s.record(TrialOutcome::Hit);
        }
        s.record(TrialOutcome::Miss);
        s.record(TrialOutcome::EarlyHold);

        assert_eq!(s.trials, 5);
        assert_eq!(s.count(TrialOutcome::Hit), 3);
        assert_eq!(s.count(TrialOutcome::EarlyHold), 1);
        assert!((s.hit_rate() - 0.6).abs() < 1e-6);
        assert!((s.recent_rate() - 0.6).abs() < 1e-6);
    }

    #[test]
    fn last_100_uses_newest_trials() {
        let mut s = TrialStats::new();
        for _ in 0..150 {
            s.record(TrialOutcome::Miss);
        }
        for _ in 0..100 {
            s.record(TrialOutcome::Hit);
        }
        assert_eq!(s.recent.len(), 200);
        assert_eq!(s.last_100_rate(), 1.0);
        assert!((s.recent_rate() - 0.5).abs() < 1e-6);
    }
}
