//! Simulated subject and simulated boards.
//!
//! The subject reacts to the stimuli the task turns on with random but
//! plausible latencies, so a session can run end to end without an animal.
//! The boards are loopback ports answering the way the real controllers do.

use std::time::Duration;

use taskrig::config::{HardwareConfig, LaserKind};
use taskrig::loopback::LoopbackPorts;
use taskrig_tasks::foraging::Figure;
use taskrig_tasks::rng::{Prng, RandomSource};
use taskrig_tasks::time::Clock;

fn after(now: Duration, rng: &mut Prng, min_ms: f64, max_ms: f64) -> Duration {
    now + Duration::from_secs_f64(rng.gen_range_f64(min_ms, max_ms) / 1e3)
}

fn chance(rng: &mut Prng, p: f64) -> bool {
    rng.next_f64_01() < p
}

#[derive(Debug, Clone, Copy)]
struct Look {
    figure: Figure,
    from: Duration,
    until: Duration,
}

#[derive(Debug)]
pub struct SimSubject<C: Clock> {
    clock: C,
    rng: Prng,

    axis_pushed: bool,
    push_at: Option<Duration>,
    release_at: Option<Duration>,

    on_fix_target: bool,
    fix_at: Option<Duration>,
    fix_break_at: Option<Duration>,

    array_lit: bool,
    look: Option<Look>,
}

impl<C: Clock> SimSubject<C> {
    pub fn new(clock: C, seed: u64) -> Self {
        Self {
            clock,
            rng: Prng::new(seed),
            axis_pushed: false,
            push_at: None,
            release_at: None,
            on_fix_target: false,
            fix_at: None,
            fix_break_at: None,
            array_lit: false,
            look: None,
        }
    }

    // ── Axis ─────────────────────────────────────────────────────────────

    pub fn axis_zero(&mut self) -> bool {
        let now = self.clock.now();
        if self.push_at.is_some_and(|at| now >= at) {
            self.push_at = None;
            self.axis_pushed = true;
            // Some pushes are let go before the target changes.
            if chance(&mut self.rng, 0.1) {
                self.release_at = Some(after(now, &mut self.rng, 100.0, 600.0));
            }
        }
        if self.release_at.is_some_and(|at| now >= at) {
            self.release_at = None;
            self.axis_pushed = false;
        }
        !self.axis_pushed
    }

    pub fn target_on(&mut self) {
        let now = self.clock.now();
        self.push_at = chance(&mut self.rng, 0.9).then(|| after(now, &mut self.rng, 150.0, 900.0));
    }

    pub fn target_off(&mut self) {
        self.axis_pushed = false;
        self.push_at = None;
        self.release_at = None;
    }

    pub fn change_target(&mut self) {
        let now = self.clock.now();
        let release = after(now, &mut self.rng, 100.0, 800.0);
        self.release_at = Some(self.release_at.map_or(release, |r| r.min(release)));
    }

    // ── Gaze ─────────────────────────────────────────────────────────────

    pub fn gaze_on_fix_target(&mut self) -> bool {
        let now = self.clock.now();
        if self.fix_at.is_some_and(|at| now >= at) {
            self.fix_at = None;
            self.on_fix_target = true;
        }
        if self.on_fix_target && self.fix_break_at.is_some_and(|at| now >= at) {
            self.fix_break_at = None;
            self.on_fix_target = false;
        }
        self.on_fix_target
    }

    pub fn fix_target_on(&mut self) {
        let now = self.clock.now();
        self.fix_at = chance(&mut self.rng, 0.85).then(|| after(now, &mut self.rng, 100.0, 600.0));
        self.fix_break_at = match self.fix_at {
            Some(at) if chance(&mut self.rng, 0.15) => Some(after(at, &mut self.rng, 50.0, 400.0)),
            _ => None,
        };
    }

    pub fn fix_target_off(&mut self) {
        self.on_fix_target = false;
        self.fix_at = None;
        self.fix_break_at = None;
    }

    pub fn fixated_figure(&mut self) -> Option<Figure> {
        if !self.array_lit {
            return None;
        }
        let now = self.clock.now();
        let look = match self.look {
            Some(look) if now < look.until => look,
            // Saccade to another figure.
            Some(look) => self.next_look(look.until),
            None => return None,
        };
        (now >= look.from).then_some(look.figure)
    }

    fn next_look(&mut self, now: Duration) -> Look {
        let figure = match self.rng.next_f64_01() {
            u if u < 0.6 => Figure::Reward,
            u if u < 0.85 => Figure::Punish,
            _ => Figure::Neutral,
        };
        let from = after(now, &mut self.rng, 50.0, 300.0);
        let until = after(from, &mut self.rng, 150.0, 700.0);
        let look = Look {
            figure,
            from,
            until,
        };
        self.look = Some(look);
        look
    }

    pub fn fig_array_on(&mut self) {
        self.array_lit = true;
        let now = self.clock.now();
        self.next_look(now);
    }

    pub fn fig_array_off(&mut self) {
        self.array_lit = false;
        self.look = None;
    }
}

// ─────────────────────────────────────────────────────────────────────────
// Simulated boards
// ─────────────────────────────────────────────────────────────────────────

/// Loopback ports emulating every device in `hw`.
pub fn simulated_ports(hw: &HardwareConfig) -> LoopbackPorts {
    let ports = LoopbackPorts::new();
    for laser in &hw.lasers {
        match laser.kind {
            LaserKind::Omicron => attach_omicron(&ports, &laser.port),
            LaserKind::Cobolt => attach_cobolt(&ports, &laser.port, laser.max_power),
        }
    }
    if let Some(gpio) = &hw.gpio {
        attach_gpio(&ports, &gpio.port, gpio.channels);
    }
    ports
}

fn attach_omicron(ports: &LoopbackPorts, name: &str) {
    let mut setpoint = String::from("000");
    ports.attach_with_latency(name, Duration::from_millis(2), move |line| {
        let cmd = std::str::from_utf8(line).ok()?.strip_prefix('?')?;
        let reply = match cmd {
            "GLP" => format!("!GLP{setpoint}\r"),
            "LOn" | "LOf" => format!("!{cmd}>\r"),
            _ => {
                if let Some(hex) = cmd.strip_prefix("SLP") {
                    setpoint = hex.to_string();
                }
                return None;
            }
        };
        Some(reply.into_bytes())
    });
}

fn attach_cobolt(ports: &LoopbackPorts, name: &str, max_power: f32) {
    let mut watts = 0.0f32;
    let mut auto_start = false;
    ports.attach(name, move |line| {
        let cmd = std::str::from_utf8(line).ok()?;
        let reply = match cmd {
            "p?" => format!("p?\r\n{watts}\r\n"),
            "@cobas?" => format!("{}\r\n", u8::from(auto_start)),
            "l1" | "l0" => "OK\r\n".to_string(),
            _ => {
                if let Some(w) = cmd.strip_prefix("p ").and_then(|w| w.parse::<f32>().ok()) {
                    watts = w.clamp(0.0, max_power);
                } else if let Some(flag) = cmd.strip_prefix("@cobas ") {
                    auto_start = flag == "1";
                }
                return None;
            }
        };
        Some(reply.into_bytes())
    });
}

fn attach_gpio(ports: &LoopbackPorts, name: &str, channels: usize) {
    let mut levels: u64 = 0;
    let digits = channels / 4;
    ports.attach(name, move |line| {
        let cmd = std::str::from_utf8(line).ok()?;
        let words: Vec<&str> = cmd.split_whitespace().collect();
        let value = match words.as_slice() {
            ["ver"] => "00000001".to_string(),
            ["gpio", "readall"] => format!("{levels:0digits$x}"),
            ["gpio", "read", ch] => {
                let ch: u32 = ch.parse().ok()?;
                (levels.checked_shr(ch).unwrap_or(0) & 1).to_string()
            }
            ["adc", "read", _] => "0000".to_string(),
            ["gpio", verb @ ("set" | "clear"), ch] => {
                let bit = 1u64 << ch.parse::<u32>().ok()?.min(63);
                if *verb == "set" {
                    levels |= bit;
                } else {
                    levels &= !bit;
                }
                return None;
            }
            _ => return None,
        };
        Some(format!("{cmd}\n\r{value}\n\r>").into_bytes())
    });
}
