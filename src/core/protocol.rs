//! Device Command Protocol.
//!
//! A request is written as one line; the reply is located in the channel
//! accumulator by finding the echoed command and slicing the payload up to the
//! next line break. The accumulator is cleared after every exchange, whether
//! it matched or timed out.
//!
//! Timeouts and unparseable payloads are expected with slow or absent
//! hardware. Both come back as `None` and are logged, never raised.

use std::time::Duration;

use tracing::{debug, warn};

use crate::channel::ByteChannel;
use crate::error::ChannelError;
use crate::poller::TimeoutPoller;

/// Which echo to anchor on when the accumulator holds more than one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Occurrence {
    First,
    Last,
}

/// Where the payload sits relative to the echo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyLayout {
    /// `<echo><payload>\r` on one line.
    Inline,
    /// `<echo>\r\n<payload>\r`: the echo is its own line.
    NextLine,
    /// `<payload>\r` with no echo at all.
    Bare,
}

/// Framing conventions of one device family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dialect {
    /// Prepended to every request, e.g. `?` for query/reply lasers.
    pub request_prefix: &'static str,
    /// Prepended to the command when searching for its echo, e.g. `!`.
    pub echo_prefix: &'static str,
    pub occurrence: Occurrence,
    pub layout: ReplyLayout,
    pub terminator: u8,
}

impl Dialect {
    /// `?CMD` answered by `!CMD<payload>\r`. The newest echo wins.
    pub const QUERY_REPLY: Dialect = Dialect {
        request_prefix: "?",
        echo_prefix: "!",
        occurrence: Occurrence::Last,
        layout: ReplyLayout::Inline,
        terminator: b'\r',
    };

    /// `cmd` echoed back on its own line, payload on the next.
    pub const ECHO_LINE: Dialect = Dialect {
        request_prefix: "",
        echo_prefix: "",
        occurrence: Occurrence::First,
        layout: ReplyLayout::NextLine,
        terminator: b'\r',
    };
}

fn is_break(b: u8, terminator: u8) -> bool {
    b == terminator || b == b'\n' || b == b'\r'
}

fn trim(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |i| i + 1);
    &bytes[start..end]
}

fn occurrences<'a>(
    haystack: &'a [u8],
    needle: &'a [u8],
) -> impl DoubleEndedIterator<Item = usize> + 'a {
    haystack
        .windows(needle.len().max(1))
        .enumerate()
        .filter(move |(_, w)| *w == needle)
        .map(|(i, _)| i)
}

fn payload_from(received: &[u8], start: usize, terminator: u8) -> Option<&[u8]> {
    let rest = received.get(start..)?;
    let end = rest.iter().position(|&b| is_break(b, terminator))?;
    Some(trim(&rest[..end]))
}

fn skip_breaks(received: &[u8], mut at: usize, terminator: u8) -> usize {
    while at < received.len() && is_break(received[at], terminator) {
        at += 1;
    }
    at
}

/// Locate a complete reply to `echo` in `received` and return its payload.
///
/// Returns `None` while the reply is still incomplete.
pub fn extract_reply<'a>(
    received: &'a [u8],
    echo: &[u8],
    occurrence: Occurrence,
    layout: ReplyLayout,
    terminator: u8,
) -> Option<&'a [u8]> {
    if layout == ReplyLayout::Bare || echo.is_empty() {
        let start = skip_breaks(received, 0, terminator);
        return payload_from(received, start, terminator);
    }

    // An echo line must end right after the command, otherwise `gpio read 1`
    // would anchor inside `gpio read 12`. A trailing echo may still be growing.
    let is_echo = |at: &usize| match layout {
        ReplyLayout::Inline => true,
        _ => received
            .get(at + echo.len())
            .map_or(true, |&b| is_break(b, terminator)),
    };
    // Only the anchored echo counts. An older complete reply never stands in
    // for the anchored one while it is still arriving.
    let anchor = match occurrence {
        Occurrence::First => occurrences(received, echo).find(is_echo),
        Occurrence::Last => occurrences(received, echo).rev().find(is_echo),
    }?;

    let after = anchor + echo.len();
    match layout {
        ReplyLayout::Inline => payload_from(received, after, terminator),
        _ => payload_from(received, skip_breaks(received, after, terminator), terminator),
    }
}

// ─────────────────────────────────────────────────────────────────────────
// Payload codecs
// ─────────────────────────────────────────────────────────────────────────

/// Largest value representable by `digits` hex digits, e.g. 3 → 0xFFF.
fn hex_full_scale(digits: usize) -> Option<u64> {
    match digits {
        0 => None,
        1..=15 => Some((1u64 << (4 * digits)) - 1),
        _ => Some(u64::MAX),
    }
}

/// Hex payload as a fraction of the full scale implied by its width.
pub fn decode_hex_ratio(payload: &str) -> Option<f32> {
    let payload = payload.trim();
    let value = u64::from_str_radix(payload, 16).ok()?;
    let full = hex_full_scale(payload.len())?;
    Some((value as f64 / full as f64) as f32)
}

/// Ratio in `[0, 1]` as `digits` lowercase hex digits; out of range is `None`.
pub fn encode_hex_ratio(ratio: f32, digits: usize) -> Option<String> {
    if !(0.0..=1.0).contains(&ratio) {
        return None;
    }
    let full = hex_full_scale(digits)?;
    let value = (ratio as f64 * full as f64).round() as u64;
    Some(format!("{:0width$x}", value, width = digits))
}

pub fn decode_float(payload: &str) -> Option<f32> {
    payload.trim().parse::<f32>().ok().filter(|v| v.is_finite())
}

pub fn decode_int(payload: &str) -> Option<i64> {
    payload.trim().parse::<i64>().ok()
}

pub fn decode_hex_int(payload: &str) -> Option<u64> {
    u64::from_str_radix(payload.trim(), 16).ok()
}

/// `"0"` is false, any other integer is true.
pub fn decode_bool(payload: &str) -> Option<bool> {
    decode_int(payload).map(|v| v != 0)
}

/// The lowest byte of a hex payload (its last two digits).
pub fn decode_low_byte(payload: &str) -> Option<u8> {
    let payload = payload.trim();
    let tail = payload.get(payload.len().checked_sub(2)?..)?;
    u8::from_str_radix(tail, 16).ok()
}

/// Bit mask as hex, zero padded to one digit per four channels.
pub fn encode_hex_mask(bits: u64, channels: usize) -> String {
    format!("{:0width$x}", bits, width = channels / 4)
}

// ─────────────────────────────────────────────────────────────────────────
// Command port
// ─────────────────────────────────────────────────────────────────────────

/// A channel plus the conventions and budget needed to talk to one device.
#[derive(Debug)]
pub struct CommandPort {
    channel: ByteChannel,
    poller: TimeoutPoller,
    dialect: Dialect,
    budget: Duration,
}

impl CommandPort {
    pub fn new(channel: ByteChannel, dialect: Dialect, budget: Duration) -> Self {
        Self {
            channel,
            poller: TimeoutPoller::new(),
            dialect,
            budget,
        }
    }

    pub fn channel(&self) -> &ByteChannel {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut ByteChannel {
        &mut self.channel
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    pub fn set_budget(&mut self, budget: Duration) {
        self.budget = budget;
    }

    /// Write one prefixed request line without waiting for a reply.
    /// Returns false when nothing was written.
    pub fn send(&mut self, command: &str) -> bool {
        let line = format!("{}{}", self.dialect.request_prefix, command);
        match self.channel.write_line(&line) {
            Ok(written) => written,
            Err(e) => {
                warn!(port = %self.channel.name(), command, error = %e, "send failed");
                false
            }
        }
    }

    /// Round trip with the dialect's default layout and the port budget.
    pub fn exchange(&mut self, command: &str) -> Option<String> {
        self.exchange_with(command, self.dialect.layout, self.budget)
    }

    pub fn exchange_with(
        &mut self,
        command: &str,
        layout: ReplyLayout,
        budget: Duration,
    ) -> Option<String> {
        // Anything already buffered answers an earlier request.
        self.reset_input();
        if !self.send(command) {
            debug!(port = %self.channel.name(), command, "exchange skipped; nothing written");
            self.reset_input();
            return None;
        }

        let echo = format!("{}{}", self.dialect.echo_prefix, command).into_bytes();
        let Dialect {
            occurrence,
            terminator,
            ..
        } = self.dialect;

        let outcome = self.poller.poll(
            |channel: &mut ByteChannel| -> Option<Result<Vec<u8>, ChannelError>> {
                match channel.read() {
                    Ok(received) => extract_reply(received, &echo, occurrence, layout, terminator)
                        .map(|p| Ok(p.to_vec())),
                    Err(e) => Some(Err(e)),
                }
            },
            &mut self.channel,
            budget,
        );
        self.reset_input();

        let elapsed_ms = outcome.elapsed_ms();
        match outcome.result {
            Some(Ok(bytes)) => match String::from_utf8(bytes) {
                Ok(payload) => {
                    debug!(port = %self.channel.name(), command, elapsed_ms, %payload, "reply");
                    Some(payload)
                }
                Err(_) => {
                    warn!(port = %self.channel.name(), command, "reply is not valid text");
                    None
                }
            },
            Some(Err(e)) => {
                warn!(port = %self.channel.name(), command, error = %e, "exchange failed");
                None
            }
            None => {
                warn!(port = %self.channel.name(), command, elapsed_ms, "timeout");
                None
            }
        }
    }

    /// Exchange and decode; a payload that fails to decode is logged and dropped.
    pub fn query<T>(&mut self, command: &str, decode: impl FnOnce(&str) -> Option<T>) -> Option<T> {
        self.query_with(command, self.dialect.layout, decode)
    }

    pub fn query_with<T>(
        &mut self,
        command: &str,
        layout: ReplyLayout,
        decode: impl FnOnce(&str) -> Option<T>,
    ) -> Option<T> {
        let payload = self.exchange_with(command, layout, self.budget)?;
        let value = decode(&payload);
        if value.is_none() {
            warn!(port = %self.channel.name(), command, %payload, "malformed reply");
        }
        value
    }

    fn reset_input(&mut self) {
        if let Err(e) = self.channel.clear_input() {
            warn!(port = %self.channel.name(), error = %e, "failed to clear input");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::SerialSettings;
    use crate::loopback::LoopbackPorts;
    use std::sync::Arc;

    fn port(ports: &LoopbackPorts, name: &str, dialect: Dialect, budget_ms: u64) -> CommandPort {
        let ch = ByteChannel::new(name, SerialSettings::default(), Arc::new(ports.clone())).unwrap();
        CommandPort::new(ch, dialect, Duration::from_millis(budget_ms))
    }

    #[test]
    fn inline_reply_uses_last_echo() {
        let buf = b"!GLP7ff\r!GLP800\r";
        let p = extract_reply(buf, b"!GLP", Occurrence::Last, ReplyLayout::Inline, b'\r');
        assert_eq!(p, Some(&b"800"[..]));
    }

    #[test]
    fn inline_reply_waits_for_terminator() {
        let p = extract_reply(b"!GLP8", b"!GLP", Occurrence::Last, ReplyLayout::Inline, b'\r');
        assert_eq!(p, None);
    }

    #[test]
    fn inline_reply_waits_for_newest_echo() {
        let buf = b"!GLP123\r!GLP8";
        let p = extract_reply(buf, b"!GLP", Occurrence::Last, ReplyLayout::Inline, b'\r');
        assert_eq!(p, None);
    }

    #[test]
    fn next_line_reply_waits_for_first_echo() {
        let buf = b"p?\r\n0.0";
        let p = extract_reply(buf, b"p?", Occurrence::First, ReplyLayout::NextLine, b'\r');
        assert_eq!(p, None);
        let buf = b"p?\r\n0.0";
        let grown = [&buf[..], b"5\r\np?\r\n0.1\r\n"].concat();
        let p = extract_reply(&grown, b"p?", Occurrence::First, ReplyLayout::NextLine, b'\r');
        assert_eq!(p, Some(&b"0.05"[..]));
    }

    #[test]
    fn next_line_reply_skips_echo_line() {
        let buf = b"gpio readall\n\r1A\n\r>";
        let p = extract_reply(buf, b"gpio readall", Occurrence::First, ReplyLayout::NextLine, b'\r');
        assert_eq!(p, Some(&b"1A"[..]));
    }

    #[test]
    fn next_line_reply_ignores_longer_command_echo() {
        let buf = b"gpio read 12\r\n1\r\ngpio read 1\r\n0\r\n";
        let p = extract_reply(buf, b"gpio read 1", Occurrence::First, ReplyLayout::NextLine, b'\r');
        assert_eq!(p, Some(&b"0"[..]));
    }

    #[test]
    fn next_line_reply_incomplete_until_payload_line_ends() {
        let p = extract_reply(b"p?\r\n0.0", b"p?", Occurrence::First, ReplyLayout::NextLine, b'\r');
        assert_eq!(p, None);
    }

    #[test]
    fn bare_reply_is_first_line() {
        let p = extract_reply(b"\r\n1\r\n", b"@cobas?", Occurrence::First, ReplyLayout::Bare, b'\r');
        assert_eq!(p, Some(&b"1"[..]));
    }

    #[test]
    fn hex_ratio_codec() {
        assert_eq!(encode_hex_ratio(0.0, 3).as_deref(), Some("000"));
        assert_eq!(encode_hex_ratio(1.0, 3).as_deref(), Some("fff"));
        assert_eq!(encode_hex_ratio(1.5, 3), None);
        assert_eq!(encode_hex_ratio(-0.1, 3), None);
        assert_eq!(decode_hex_ratio("FFF"), Some(1.0));
        assert_eq!(decode_hex_ratio("0"), Some(0.0));
        assert_eq!(decode_hex_ratio("zz"), None);

        for i in 0..=100 {
            let r = i as f32 / 100.0;
            let back = decode_hex_ratio(&encode_hex_ratio(r, 3).unwrap()).unwrap();
            assert!((back - r).abs() <= 1.0 / 4095.0, "ratio {r} came back as {back}");
        }
    }

    #[test]
    fn scalar_codecs() {
        assert_eq!(decode_float(" 0.05 "), Some(0.05));
        assert_eq!(decode_float("abc"), None);
        assert_eq!(decode_bool("1"), Some(true));
        assert_eq!(decode_bool("0"), Some(false));
        assert_eq!(decode_bool("x"), None);
        assert_eq!(decode_low_byte("1A"), Some(26));
        assert_eq!(decode_low_byte("00FF001A"), Some(26));
        assert_eq!(decode_low_byte("A"), None);
        assert_eq!(decode_hex_int("00FF001A"), Some(0x00FF_001A));
        assert_eq!(encode_hex_mask(0x1A, 32), "0000001a");
        assert_eq!(encode_hex_mask(0x3, 8), "03");
    }

    #[test]
    fn exchange_clears_accumulator_after_success() {
        let ports = LoopbackPorts::new();
        ports.attach("proto-ok", |line| (line == b"?GLP").then(|| b"!GLP800\r".to_vec()));
        let mut cp = port(&ports, "proto-ok", Dialect::QUERY_REPLY, 50);

        assert_eq!(cp.exchange("GLP").as_deref(), Some("800"));
        assert!(cp.channel().received().is_empty());
    }

    #[test]
    fn exchange_timeout_clears_accumulator() {
        let ports = LoopbackPorts::new();
        ports.attach("proto-timeout", |_| Some(b"garbage".to_vec()));
        let mut cp = port(&ports, "proto-timeout", Dialect::QUERY_REPLY, 5);

        assert_eq!(cp.exchange("GLP"), None);
        assert!(cp.channel().received().is_empty());
    }

    #[test]
    fn exchange_isolates_newest_reply() {
        let ports = LoopbackPorts::new();
        ports.attach("proto-stale", |line| (line == b"?GLP").then(|| b"!GLP800\r".to_vec()));
        let mut cp = port(&ports, "proto-stale", Dialect::QUERY_REPLY, 50);

        cp.channel_mut().open().unwrap();
        ports.inject("proto-stale", b"!GLP123\r");
        assert_eq!(cp.exchange("GLP").as_deref(), Some("800"));
    }

    #[test]
    fn exchange_on_absent_port_returns_immediately() {
        let ports = LoopbackPorts::new();
        let mut cp = port(&ports, "proto-absent", Dialect::QUERY_REPLY, 2_000);

        let start = std::time::Instant::now();
        assert_eq!(cp.exchange("GLP"), None);
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn query_rejects_malformed_payload() {
        let ports = LoopbackPorts::new();
        ports.attach("proto-malformed", |_| Some(b"p?\r\nnan-ish\r\n".to_vec()));
        let mut cp = port(&ports, "proto-malformed", Dialect::ECHO_LINE, 20);

        assert_eq!(cp.query("p?", decode_float), None);
        assert!(cp.channel().received().is_empty());
    }
}
