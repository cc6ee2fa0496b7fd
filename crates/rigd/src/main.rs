//! Taskrig Daemon - closed-loop behavioral task runner
//!
//! Drives one trial state machine at a fixed tick rate, with reinforcement
//! going out over a serial GPIO board and lasers held at a fixed setpoint.
//!
//! Config location (overridable with `--config`):
//! - Linux: ~/.local/share/taskrig/rig.json
//! - Windows: %APPDATA%\taskrig\rig.json
//! - MacOS: ~/Library/Application Support/taskrig/rig.json

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use taskrig_tasks::foraging::VisualForaging;
use taskrig_tasks::rng::Prng;
use taskrig_tasks::time::MonotonicClock;
use taskrig_tasks::vision_to_motion::VisionToMotion;
use taskrig_tasks::{TrialOutcome, TrialStats};
use tokio::time::{self, MissedTickBehavior};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod config;
mod paths;
mod rig;
mod subject;

use config::{RigConfig, RigdError, TaskKind};
use paths::AppPaths;
use rig::Rig;

const USAGE: &str = "usage: rigd [--config <path>] [--simulate] [--ticks <n>]";

#[derive(Debug, Default, PartialEq)]
struct Args {
    config: Option<PathBuf>,
    simulate: bool,
    ticks: Option<u64>,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Args, RigdError> {
    let mut out = Args::default();
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let path = args
                    .next()
                    .ok_or_else(|| RigdError::Usage(format!("--config needs a path\n{USAGE}")))?;
                out.config = Some(PathBuf::from(path));
            }
            "--simulate" => out.simulate = true,
            "--ticks" => {
                let n = args
                    .next()
                    .and_then(|n| n.parse().ok())
                    .ok_or_else(|| RigdError::Usage(format!("--ticks needs a count\n{USAGE}")))?;
                out.ticks = Some(n);
            }
            other => return Err(RigdError::Usage(format!("unknown argument {other}\n{USAGE}"))),
        }
    }
    Ok(out)
}

#[derive(Debug)]
enum ActiveTask {
    VisionToMotion(VisionToMotion<MonotonicClock, Prng>),
    VisualForaging(VisualForaging<MonotonicClock, Prng>),
}

impl ActiveTask {
    fn new(cfg: &RigConfig, clock: MonotonicClock, seed: u64) -> Self {
        let rng = Prng::new(seed);
        match cfg.task {
            TaskKind::VisionToMotion => ActiveTask::VisionToMotion(VisionToMotion::new(
                cfg.axis_timing.clone(),
                cfg.stage,
                clock,
                rng,
            )),
            TaskKind::VisualForaging => ActiveTask::VisualForaging(VisualForaging::new(
                cfg.foraging_timing.clone(),
                cfg.stage,
                clock,
                rng,
            )),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ActiveTask::VisionToMotion(_) => "vision_to_motion",
            ActiveTask::VisualForaging(_) => "visual_foraging",
        }
    }

    fn tick(&mut self, rig: &mut Rig) -> TrialOutcome {
        match self {
            ActiveTask::VisionToMotion(t) => t.tick(rig),
            ActiveTask::VisualForaging(t) => t.tick(rig),
        }
    }

    fn stats(&self) -> &TrialStats {
        match self {
            ActiveTask::VisionToMotion(t) => &t.stats,
            ActiveTask::VisualForaging(t) => &t.stats,
        }
    }
}

fn seed_from_clock() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(1)
}

fn print_summary(task: &ActiveTask, rig: &Rig, ticks: u64) {
    let s = task.stats();
    println!(
        "task={} ticks={} trials={} hit={} miss={} fail={} early_hold={} early_release={} end={}",
        task.kind(),
        ticks,
        s.trials,
        s.hits,
        s.misses,
        s.fails,
        s.early_holds,
        s.early_releases,
        s.ends,
    );
    println!(
        "hit_rate={:.1}% recent={:.1}% last100={:.1}% rewards={} punishments={}",
        s.hit_rate() * 100.0,
        s.recent_rate() * 100.0,
        s.last_100_rate() * 100.0,
        rig.rewards(),
        rig.punishments(),
    );
}

async fn run() -> Result<(), RigdError> {
    let args = parse_args(std::env::args().skip(1))?;

    let cfg = match &args.config {
        Some(path) => RigConfig::load(path)?,
        None => {
            let paths = AppPaths::new()?;
            info!(data_dir = %paths.data_dir().display(), "using default config location");
            RigConfig::load_or_default(&paths.config_file())?
        }
    };

    let seed = cfg.seed.unwrap_or_else(seed_from_clock);
    let clock = MonotonicClock::new();
    let mut rig = Rig::open(&cfg, args.simulate, clock, seed)?;
    let mut task = ActiveTask::new(&cfg, clock, seed);
    info!(task = task.kind(), stage = cfg.stage, tick_hz = cfg.tick_hz, seed, simulate = args.simulate, "session started");

    let mut interval = time::interval(Duration::from_secs_f64(1.0 / cfg.tick_hz));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut ticks: u64 = 0;
    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = &mut ctrl_c => {
                info!("Ctrl-C: stopping");
                break;
            }
        }

        task.tick(&mut rig);
        ticks += 1;
        if args.ticks.is_some_and(|n| ticks >= n) {
            break;
        }
    }

    rig.shutdown();
    print_summary(&task, &rig, ticks);
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════
// Main
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // Initialize logging; RUST_LOG overrides the default level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Result<Args, RigdError> {
        parse_args(list.iter().map(|s| s.to_string()))
    }

    #[test]
    fn parses_flags() {
        let a = args(&["--simulate", "--ticks", "100", "--config", "rig.json"]).unwrap();
        assert_eq!(
            a,
            Args {
                config: Some(PathBuf::from("rig.json")),
                simulate: true,
                ticks: Some(100),
            }
        );
        assert_eq!(args(&[]).unwrap(), Args::default());
    }

    #[test]
    fn rejects_bad_flags() {
        assert!(matches!(args(&["--ticks"]), Err(RigdError::Usage(_))));
        assert!(matches!(args(&["--ticks", "many"]), Err(RigdError::Usage(_))));
        assert!(matches!(args(&["--fast"]), Err(RigdError::Usage(_))));
    }

    #[test]
    fn simulated_session_runs_trials() {
        let mut cfg = RigConfig::default();
        cfg.task = TaskKind::VisualForaging;
        cfg.foraging_timing.pre_interval = taskrig_tasks::timing::DurationDist::fixed(0.0);
        cfg.foraging_timing.post_interval = taskrig_tasks::timing::DurationDist::fixed(0.0);
        let clock = MonotonicClock::new();
        let mut rig = Rig::open(&cfg, true, clock, 3).unwrap();
        let mut task = ActiveTask::new(&cfg, clock, 3);

        let start = std::time::Instant::now();
        while task.stats().trials < 2 && start.elapsed() < Duration::from_secs(30) {
            task.tick(&mut rig);
            std::thread::sleep(Duration::from_millis(1));
        }
        assert!(task.stats().trials >= 2);
    }
}
