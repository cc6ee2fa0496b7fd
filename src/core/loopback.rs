//! In-memory ports for running drivers without hardware.
//!
//! Each attached port has a responder that sees every complete line the host
//! writes and may queue reply bytes, optionally after a fixed latency.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use hashbrown::HashMap;

use crate::channel::{PortOpener, SerialSettings, Transport};
use crate::error::ChannelError;

type Responder = Box<dyn FnMut(&[u8]) -> Option<Vec<u8>> + Send>;

struct LoopbackPort {
    responder: Option<Responder>,
    latency: Duration,
    written: Vec<u8>,
    pending_line: Vec<u8>,
    inbound: VecDeque<(Instant, Vec<u8>)>,
    open: bool,
}

impl LoopbackPort {
    fn new(responder: Option<Responder>, latency: Duration) -> Self {
        Self {
            responder,
            latency,
            written: Vec::new(),
            pending_line: Vec::new(),
            inbound: VecDeque::new(),
            open: false,
        }
    }
}

#[derive(Clone, Default)]
pub struct LoopbackPorts {
    inner: Arc<Mutex<HashMap<String, LoopbackPort>>>,
}

impl std::fmt::Debug for LoopbackPorts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self.lock().keys().cloned().collect();
        f.debug_struct("LoopbackPorts").field("ports", &names).finish()
    }
}

impl LoopbackPorts {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, LoopbackPort>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Attach a port whose replies are available as soon as a line is written.
    pub fn attach<F>(&self, name: &str, responder: F)
    where
        F: FnMut(&[u8]) -> Option<Vec<u8>> + Send + 'static,
    {
        self.attach_with_latency(name, Duration::ZERO, responder);
    }

    /// Attach a port whose replies become readable `latency` after the request.
    pub fn attach_with_latency<F>(&self, name: &str, latency: Duration, responder: F)
    where
        F: FnMut(&[u8]) -> Option<Vec<u8>> + Send + 'static,
    {
        self.lock().insert(
            name.to_string(),
            LoopbackPort::new(Some(Box::new(responder)), latency),
        );
    }

    /// Attach a port that accepts writes and never replies.
    pub fn attach_silent(&self, name: &str) {
        self.lock()
            .insert(name.to_string(), LoopbackPort::new(None, Duration::ZERO));
    }

    /// Remove a port, as if its cable were pulled.
    pub fn detach(&self, name: &str) {
        self.lock().remove(name);
    }

    /// Queue unsolicited bytes for the host to read.
    pub fn inject(&self, name: &str, bytes: &[u8]) {
        if let Some(port) = self.lock().get_mut(name) {
            port.inbound.push_back((Instant::now(), bytes.to_vec()));
        }
    }

    /// Everything the host has written to `name` so far.
    pub fn written(&self, name: &str) -> Vec<u8> {
        self.lock()
            .get(name)
            .map(|p| p.written.clone())
            .unwrap_or_default()
    }

    /// Lines the host has written, split on `\r`.
    pub fn written_lines(&self, name: &str) -> Vec<String> {
        String::from_utf8_lossy(&self.written(name))
            .split('\r')
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn is_open(&self, name: &str) -> bool {
        self.lock().get(name).is_some_and(|p| p.open)
    }
}

impl PortOpener for LoopbackPorts {
    fn port_exists(&self, name: &str) -> bool {
        self.lock().contains_key(name)
    }

    fn open(
        &self,
        name: &str,
        settings: &SerialSettings,
    ) -> Result<Box<dyn Transport>, ChannelError> {
        let mut ports = self.lock();
        let port = ports.get_mut(name).ok_or_else(|| ChannelError::OpenFailed {
            port: name.to_string(),
            reason: "no such loopback port".to_string(),
        })?;
        port.open = true;
        Ok(Box::new(LoopbackTransport {
            name: name.to_string(),
            newline: settings.newline_bytes().to_vec(),
            ports: self.clone(),
        }))
    }
}

struct LoopbackTransport {
    name: String,
    newline: Vec<u8>,
    ports: LoopbackPorts,
}

impl LoopbackTransport {
    fn with_port<T>(&self, f: impl FnOnce(&mut LoopbackPort) -> T) -> io::Result<T> {
        let mut ports = self.ports.lock();
        match ports.get_mut(&self.name) {
            Some(port) => Ok(f(port)),
            None => Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "loopback port detached",
            )),
        }
    }
}

impl Transport for LoopbackTransport {
    fn read_available(&mut self, buf: &mut Vec<u8>) -> io::Result<usize> {
        self.with_port(|port| {
            let now = Instant::now();
            let mut n = 0;
            while port.inbound.front().is_some_and(|(ready, _)| *ready <= now) {
                if let Some((_, bytes)) = port.inbound.pop_front() {
                    n += bytes.len();
                    buf.extend_from_slice(&bytes);
                }
            }
            n
        })
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        let newline = self.newline.clone();
        let lines = self.with_port(|port| {
            port.written.extend_from_slice(data);
            let mut lines = Vec::new();
            for &b in data {
                port.pending_line.push(b);
                if !newline.is_empty() && port.pending_line.ends_with(&newline) {
                    let len = port.pending_line.len() - newline.len();
                    lines.push(port.pending_line.drain(..).take(len).collect::<Vec<u8>>());
                }
            }
            lines
        })?;
        if lines.is_empty() {
            return Ok(());
        }

        // The responder runs unlocked so it may call back into the ports.
        let Some(mut responder) = self.with_port(|port| port.responder.take())? else {
            return Ok(());
        };
        let replies: Vec<Vec<u8>> = lines
            .iter()
            .filter_map(|line| responder(line.as_slice()))
            .collect();
        self.with_port(|port| {
            // A port re-attached meanwhile keeps its own responder.
            port.responder.get_or_insert(responder);
            let ready = Instant::now() + port.latency;
            port.inbound.extend(replies.into_iter().map(|reply| (ready, reply)));
        })
    }

    /// Replies still in flight are not affected.
    fn clear_input(&mut self) -> io::Result<()> {
        self.with_port(|port| {
            let now = Instant::now();
            port.inbound.retain(|(ready, _)| *ready > now);
        })
    }

    fn clear_output(&mut self) -> io::Result<()> {
        self.with_port(|port| port.pending_line.clear())
    }
}

impl Drop for LoopbackTransport {
    fn drop(&mut self) {
        let _ = self.with_port(|port| port.open = false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn responder_sees_complete_lines_only() {
        let ports = LoopbackPorts::new();
        ports.attach("lb-lines", |line| {
            let mut reply = b"got:".to_vec();
            reply.extend_from_slice(line);
            reply.push(b'\r');
            Some(reply)
        });
        let mut t = ports.open("lb-lines", &SerialSettings::default()).unwrap();

        t.write_all(b"ab").unwrap();
        let mut buf = Vec::new();
        assert_eq!(t.read_available(&mut buf).unwrap(), 0);

        t.write_all(b"c\r").unwrap();
        t.read_available(&mut buf).unwrap();
        assert_eq!(buf, b"got:abc\r");
    }

    #[test]
    fn latency_delays_replies() {
        let ports = LoopbackPorts::new();
        ports.attach_with_latency("lb-latency", Duration::from_millis(20), |_| {
            Some(b"ok\r".to_vec())
        });
        let mut t = ports.open("lb-latency", &SerialSettings::default()).unwrap();
        t.write_all(b"x\r").unwrap();

        let mut buf = Vec::new();
        t.read_available(&mut buf).unwrap();
        assert!(buf.is_empty());

        std::thread::sleep(Duration::from_millis(30));
        t.read_available(&mut buf).unwrap();
        assert_eq!(buf, b"ok\r");
    }

    #[test]
    fn responder_may_call_back_into_ports() {
        let ports = LoopbackPorts::new();
        let handle = ports.clone();
        ports.attach("lb-reentrant", move |_| Some(handle.written("lb-reentrant")));
        let mut t = ports.open("lb-reentrant", &SerialSettings::default()).unwrap();

        t.write_all(b"x\r").unwrap();
        let mut buf = Vec::new();
        t.read_available(&mut buf).unwrap();
        assert_eq!(buf, b"x\r");
    }

    #[test]
    fn detached_port_reports_io_error() {
        let ports = LoopbackPorts::new();
        ports.attach_silent("lb-detach");
        let mut t = ports.open("lb-detach", &SerialSettings::default()).unwrap();
        ports.detach("lb-detach");
        assert!(t.write_all(b"x\r").is_err());
    }
}
