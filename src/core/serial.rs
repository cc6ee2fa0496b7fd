//! Native serial backend.

use std::io::{self, Read, Write};
use std::time::Duration;

use tracing::warn;

use crate::channel::{FlowControl, Parity, PortOpener, SerialSettings, StopBits, Transport};
use crate::error::ChannelError;

/// Ports enumerated by the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemPorts;

impl SystemPorts {
    pub fn new() -> Self {
        Self
    }
}

fn data_bits(bits: u8) -> serialport::DataBits {
    match bits {
        5 => serialport::DataBits::Five,
        6 => serialport::DataBits::Six,
        7 => serialport::DataBits::Seven,
        _ => serialport::DataBits::Eight,
    }
}

impl PortOpener for SystemPorts {
    fn port_exists(&self, name: &str) -> bool {
        match serialport::available_ports() {
            Ok(ports) => ports.iter().any(|p| p.port_name == name),
            Err(e) => {
                warn!(port = name, error = %e, "failed to enumerate serial ports");
                false
            }
        }
    }

    fn open(
        &self,
        name: &str,
        settings: &SerialSettings,
    ) -> Result<Box<dyn Transport>, ChannelError> {
        let parity = match settings.parity {
            Parity::None => serialport::Parity::None,
            Parity::Odd => serialport::Parity::Odd,
            Parity::Even => serialport::Parity::Even,
        };
        let stop_bits = match settings.stop_bits {
            StopBits::One => serialport::StopBits::One,
            StopBits::Two => serialport::StopBits::Two,
        };
        let flow_control = match settings.flow_control {
            FlowControl::None => serialport::FlowControl::None,
            FlowControl::Software => serialport::FlowControl::Software,
            FlowControl::Hardware => serialport::FlowControl::Hardware,
        };

        let port = serialport::new(name, settings.baud_rate)
            .parity(parity)
            .data_bits(data_bits(settings.data_bits))
            .stop_bits(stop_bits)
            .flow_control(flow_control)
            .timeout(Duration::from_millis(settings.write_timeout_ms))
            .open()
            .map_err(|e| ChannelError::OpenFailed {
                port: name.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Box::new(SerialTransport { port }))
    }
}

struct SerialTransport {
    port: Box<dyn serialport::SerialPort>,
}

impl Transport for SerialTransport {
    fn read_available(&mut self, buf: &mut Vec<u8>) -> io::Result<usize> {
        let pending = self.port.bytes_to_read().map_err(io::Error::from)? as usize;
        if pending == 0 {
            return Ok(0);
        }
        let start = buf.len();
        buf.resize(start + pending, 0);
        let got = match self.port.read(&mut buf[start..]) {
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::TimedOut => 0,
            Err(e) => {
                buf.truncate(start);
                return Err(e);
            }
        };
        buf.truncate(start + got);
        Ok(got)
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.port.write_all(data)?;
        self.port.flush()
    }

    fn clear_input(&mut self) -> io::Result<()> {
        self.port
            .clear(serialport::ClearBuffer::Input)
            .map_err(io::Error::from)
    }

    fn clear_output(&mut self) -> io::Result<()> {
        self.port
            .clear(serialport::ClearBuffer::Output)
            .map_err(io::Error::from)
    }
}
