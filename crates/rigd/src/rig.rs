//! Devices and collaborators for one session.

use std::sync::Arc;

use taskrig::channel::PortOpener;
use taskrig::gpio::SerialGpio;
use taskrig::laser::Laser;
use taskrig_tasks::foraging::{Figure, ForagingIo};
use taskrig_tasks::rig_io::GpioReinforcer;
use taskrig_tasks::time::MonotonicClock;
use taskrig_tasks::vision_to_motion::AxisTaskIo;
use taskrig_tasks::Reinforcer;
use tracing::{debug, info, warn};

use crate::config::{RigConfig, RigdError};
use crate::subject::{simulated_ports, SimSubject};

#[derive(Debug)]
pub struct Rig {
    pub lasers: Vec<Laser>,
    reinforcer: Option<GpioReinforcer>,
    subject: SimSubject<MonotonicClock>,
    /// Reinforcement with no GPIO board to deliver it.
    pub logged_rewards: u32,
    pub logged_punishments: u32,
}

fn port_opener(simulate: bool, cfg: &RigConfig) -> Arc<dyn PortOpener> {
    if simulate {
        return Arc::new(simulated_ports(&cfg.hardware));
    }
    #[cfg(feature = "serial")]
    {
        Arc::new(taskrig::serial::SystemPorts)
    }
    #[cfg(not(feature = "serial"))]
    {
        warn!("built without the serial backend; devices will read as absent");
        Arc::new(taskrig::loopback::LoopbackPorts::new())
    }
}

impl Rig {
    pub fn open(
        cfg: &RigConfig,
        simulate: bool,
        clock: MonotonicClock,
        seed: u64,
    ) -> Result<Self, RigdError> {
        let ports = port_opener(simulate, cfg);

        let mut lasers = Vec::with_capacity(cfg.hardware.lasers.len());
        for laser_cfg in &cfg.hardware.lasers {
            let mut laser = Laser::open(laser_cfg, Arc::clone(&ports))?;
            if !laser.laser_on() {
                warn!(port = laser.port_name(), kind = laser.kind().name(), "laser did not acknowledge on");
            }
            if let Some(ratio) = cfg.laser_power_ratio {
                laser.set_power_ratio(ratio);
            }
            let power_ratio = laser.power_ratio();
            info!(port = laser.port_name(), kind = laser.kind().name(), ?power_ratio, "laser ready");
            lasers.push(laser);
        }

        let reinforcer = match &cfg.hardware.gpio {
            Some(gpio_cfg) => {
                let mut gpio = SerialGpio::open(gpio_cfg, Arc::clone(&ports))?;
                match gpio.version() {
                    Some(v) => info!(port = gpio.port_name(), version = v, "gpio ready"),
                    None => warn!(port = gpio.port_name(), "gpio board did not answer"),
                }
                Some(GpioReinforcer::new(gpio, gpio_cfg))
            }
            None => None,
        };

        Ok(Self {
            lasers,
            reinforcer,
            subject: SimSubject::new(clock, seed ^ 0x5EED),
            logged_rewards: 0,
            logged_punishments: 0,
        })
    }

    /// Switch lasers off and release every port.
    pub fn shutdown(&mut self) {
        for laser in &mut self.lasers {
            if !laser.laser_off() {
                warn!(port = laser.port_name(), "laser did not acknowledge off");
            }
            laser.close();
        }
        if let Some(r) = &mut self.reinforcer {
            r.gpio_mut().close();
        }
    }

    pub fn rewards(&self) -> u32 {
        self.logged_rewards + self.reinforcer.as_ref().map_or(0, |r| r.rewards)
    }

    pub fn punishments(&self) -> u32 {
        self.logged_punishments + self.reinforcer.as_ref().map_or(0, |r| r.punishments)
    }
}

impl Reinforcer for Rig {
    fn reward(&mut self) {
        match &mut self.reinforcer {
            Some(r) => r.reward(),
            None => {
                self.logged_rewards += 1;
                info!("reward");
            }
        }
    }

    fn punish(&mut self) {
        match &mut self.reinforcer {
            Some(r) => r.punish(),
            None => {
                self.logged_punishments += 1;
                info!("punish");
            }
        }
    }
}

impl AxisTaskIo for Rig {
    fn axis_zero(&mut self) -> bool {
        self.subject.axis_zero()
    }

    fn target_on(&mut self) {
        debug!("target on");
        self.subject.target_on();
    }

    fn target_off(&mut self) {
        debug!("target off");
        self.subject.target_off();
    }

    fn change_target(&mut self) {
        debug!("target change");
        self.subject.change_target();
    }
}

impl ForagingIo for Rig {
    fn gaze_on_fix_target(&mut self) -> bool {
        self.subject.gaze_on_fix_target()
    }

    fn fixated_figure(&mut self) -> Option<Figure> {
        self.subject.fixated_figure()
    }

    fn fix_target_on(&mut self) {
        debug!("fix target on");
        self.subject.fix_target_on();
    }

    fn fix_target_off(&mut self) {
        debug!("fix target off");
        self.subject.fix_target_off();
    }

    fn fig_array_on(&mut self) {
        debug!("figure array on");
        self.subject.fig_array_on();
    }

    fn fig_array_off(&mut self) {
        debug!("figure array off");
        self.subject.fig_array_off();
    }
}
