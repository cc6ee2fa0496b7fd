//! Reinforcement delivered as timed pulses on a serial GPIO board.
//!
//! The reward line typically gates a juice valve and the punish line a tone
//! or air puff. A pulse blocks the tick for its width.

use std::time::Duration;

use taskrig::config::GpioConfig;
use taskrig::gpio::SerialGpio;
use tracing::{info, warn};

use crate::policy::Reinforcer;

#[derive(Debug)]
pub struct GpioReinforcer {
    gpio: SerialGpio,
    reward_channel: Option<u32>,
    punish_channel: Option<u32>,
    pulse: Duration,
    pub rewards: u32,
    pub punishments: u32,
}

impl GpioReinforcer {
    pub fn new(gpio: SerialGpio, cfg: &GpioConfig) -> Self {
        Self {
            gpio,
            reward_channel: cfg.reward_channel,
            punish_channel: cfg.punish_channel,
            pulse: cfg.pulse(),
            rewards: 0,
            punishments: 0,
        }
    }

    pub fn gpio_mut(&mut self) -> &mut SerialGpio {
        &mut self.gpio
    }

    fn fire(&mut self, what: &'static str, channel: Option<u32>) {
        let Some(channel) = channel else {
            info!(what, "no line configured; logged only");
            return;
        };
        if self.gpio.pulse(channel, self.pulse) {
            info!(what, channel, pulse_ms = self.pulse.as_secs_f64() * 1e3, "pulse");
        } else {
            warn!(what, channel, port = %self.gpio.port_name(), "pulse not delivered");
        }
    }
}

impl Reinforcer for GpioReinforcer {
    fn reward(&mut self) {
        self.rewards += 1;
        self.fire("reward", self.reward_channel);
    }

    fn punish(&mut self) {
        self.punishments += 1;
        self.fire("punish", self.punish_channel);
    }
}
