//! Serial GPIO board.
//!
//! Commands are space separated tokens (`gpio read 3`, `adc read 0`). The board
//! echoes each command on its own line and prints the value on the next.
//! Multi-channel values travel as hex, one digit per four channels.

use std::sync::Arc;
use std::time::Duration;

use crate::channel::{ByteChannel, PortOpener};
use crate::config::GpioConfig;
use crate::error::ChannelError;
use crate::poller::TimeoutPoller;
use crate::protocol::{
    decode_bool, decode_hex_int, decode_int, decode_low_byte, encode_hex_mask, CommandPort,
    Dialect,
};

#[derive(Debug)]
pub struct SerialGpio {
    port: CommandPort,
    channels: usize,
    poller: TimeoutPoller,
}

impl SerialGpio {
    pub fn open(cfg: &GpioConfig, ports: Arc<dyn PortOpener>) -> Result<Self, ChannelError> {
        let channel = ByteChannel::new(&cfg.port, cfg.serial_settings(), ports)?;
        Ok(Self {
            port: CommandPort::new(channel, Dialect::ECHO_LINE, cfg.budget()),
            channels: cfg.channels,
            poller: TimeoutPoller::new(),
        })
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn port_name(&self) -> &str {
        self.port.channel().name()
    }

    /// Firmware version.
    pub fn version(&mut self) -> Option<i64> {
        self.port.query("ver", decode_int)
    }

    pub fn adc(&mut self, channel: u32) -> Option<i64> {
        self.port.query(&format!("adc read {channel}"), decode_int)
    }

    pub fn read(&mut self, channel: u32) -> Option<bool> {
        self.port.query(&format!("gpio read {channel}"), decode_bool)
    }

    pub fn write(&mut self, channel: u32, value: bool) -> bool {
        let verb = if value { "set" } else { "clear" };
        self.port.send(&format!("gpio {verb} {channel}"))
    }

    /// Drive `channel` high for `width`, then low. Blocks for the pulse width.
    pub fn pulse(&mut self, channel: u32, width: Duration) -> bool {
        if !self.write(channel, true) {
            return false;
        }
        self.poller.spin_for(width);
        self.write(channel, false)
    }

    /// Bit set means the channel is an input.
    pub fn set_io_dir(&mut self, bits: u64) -> bool {
        let mask = encode_hex_mask(bits, self.channels);
        self.port.send(&format!("gpio iodir {mask}"))
    }

    /// Bit set means `write_all` / `read_all` touch the channel.
    pub fn set_io_mask(&mut self, bits: u64) -> bool {
        let mask = encode_hex_mask(bits, self.channels);
        self.port.send(&format!("gpio iomask {mask}"))
    }

    pub fn read_all(&mut self) -> Option<u64> {
        self.port.query("gpio readall", decode_hex_int)
    }

    /// Channels 0-7 only, from the last two hex digits of `gpio readall`.
    pub fn read_0_7(&mut self) -> Option<u8> {
        self.port.query("gpio readall", decode_low_byte)
    }

    pub fn write_all(&mut self, bits: u64) -> bool {
        let mask = encode_hex_mask(bits, self.channels);
        self.port.send(&format!("gpio writeall {mask}"))
    }

    pub fn close(&mut self) {
        self.port.channel_mut().close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loopback::LoopbackPorts;

    /// Echo each command, then answer on the next line like the board does.
    fn board(name: &str, readall: &'static str) -> LoopbackPorts {
        let ports = LoopbackPorts::new();
        ports.attach(name, move |line| {
            let text = std::str::from_utf8(line).ok()?;
            let value = match text {
                "ver" => "00000008",
                "gpio readall" => readall,
                "gpio read 2" => "1",
                "gpio read 3" => "0",
                "adc read 1" => "0512",
                _ => return None,
            };
            Some(format!("{text}\n\r{value}\n\r>").into_bytes())
        });
        ports
    }

    #[test]
    fn read_0_7_decodes_low_byte() {
        let ports = board("gpio-low", "1A");
        let cfg = GpioConfig::new("gpio-low").with_channels(8).with_timeout_ms(50.0);
        let mut gpio = SerialGpio::open(&cfg, Arc::new(ports)).unwrap();

        assert_eq!(gpio.read_0_7(), Some(26));
        assert_eq!(gpio.read_all(), Some(26));
    }

    #[test]
    fn scalar_queries() {
        let ports = board("gpio-scalar", "0000001A");
        let cfg = GpioConfig::new("gpio-scalar").with_timeout_ms(50.0);
        let mut gpio = SerialGpio::open(&cfg, Arc::new(ports)).unwrap();

        assert_eq!(gpio.version(), Some(8));
        assert_eq!(gpio.read(2), Some(true));
        assert_eq!(gpio.read(3), Some(false));
        assert_eq!(gpio.adc(1), Some(512));
        assert_eq!(gpio.read(9), None);
    }

    #[test]
    fn writes_use_padded_hex_masks() {
        let ports = LoopbackPorts::new();
        ports.attach_silent("gpio-writes");
        let cfg = GpioConfig::new("gpio-writes");
        let mut gpio = SerialGpio::open(&cfg, Arc::new(ports.clone())).unwrap();

        assert!(gpio.set_io_dir(0xF0));
        assert!(gpio.set_io_mask(0xFF));
        assert!(gpio.write_all(0x1));
        assert!(gpio.write(4, true));
        assert!(gpio.write(4, false));

        assert_eq!(
            ports.written_lines("gpio-writes"),
            vec![
                "gpio iodir 000000f0",
                "gpio iomask 000000ff",
                "gpio writeall 00000001",
                "gpio set 4",
                "gpio clear 4",
            ]
        );
    }

    #[test]
    fn pulse_sets_then_clears() {
        let ports = LoopbackPorts::new();
        ports.attach_silent("gpio-pulse");
        let cfg = GpioConfig::new("gpio-pulse");
        let mut gpio = SerialGpio::open(&cfg, Arc::new(ports.clone())).unwrap();

        assert!(gpio.pulse(0, Duration::from_millis(1)));
        assert_eq!(ports.written_lines("gpio-pulse"), vec!["gpio set 0", "gpio clear 0"]);
    }

    #[test]
    fn absent_board_is_a_no_op() {
        let ports = LoopbackPorts::new();
        let cfg = GpioConfig::new("gpio-absent");
        let mut gpio = SerialGpio::open(&cfg, Arc::new(ports)).unwrap();

        assert!(!gpio.write(0, true));
        assert!(!gpio.pulse(0, Duration::from_millis(1)));
        assert_eq!(gpio.read_all(), None);
    }
}
