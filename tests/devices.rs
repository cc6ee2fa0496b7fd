//! Drivers against scripted loopback ports.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use taskrig::channel::is_port_owned;
use taskrig::prelude::*;

fn omicron_with_latency(name: &str, latency: Duration) -> LoopbackPorts {
    let ports = LoopbackPorts::new();
    ports.attach_with_latency(name, latency, |line| match line {
        b"?GLP" => Some(b"!GLP800\r".to_vec()),
        b"?LOn" => Some(b"!LOn>\r".to_vec()),
        _ => None,
    });
    ports
}

#[test]
fn reply_within_budget_reports_early() {
    let ports = omicron_with_latency("it-fast", Duration::from_millis(5));
    let cfg = LaserConfig::omicron("it-fast").with_timeout_ms(150.0);
    let mut laser = Laser::open(&cfg, Arc::new(ports)).unwrap();

    let start = Instant::now();
    let ratio = laser.power_ratio().unwrap();
    let spent = start.elapsed();

    assert!((ratio - 0x800 as f32 / 0xFFF as f32).abs() < 1e-6);
    assert!(spent >= Duration::from_millis(5));
    assert!(spent < Duration::from_millis(100));
}

#[test]
fn reply_after_budget_is_a_timeout() {
    let ports = omicron_with_latency("it-slow", Duration::from_millis(40));
    let cfg = LaserConfig::omicron("it-slow").with_timeout_ms(5.0);
    let mut laser = Laser::open(&cfg, Arc::new(ports)).unwrap();

    let start = Instant::now();
    assert_eq!(laser.power_ratio(), None);
    assert!(start.elapsed() < Duration::from_millis(35));
}

#[test]
fn late_reply_does_not_leak_into_next_exchange() {
    // The reply to the first query lands after that exchange gave up. The
    // next exchange reads it along with its own reply and must discard it.
    let ports = omicron_with_latency("it-stale", Duration::from_millis(10));
    let channel = ByteChannel::new(
        "it-stale",
        SerialSettings::with_baud(500_000),
        Arc::new(ports),
    )
    .unwrap();
    let mut port = CommandPort::new(channel, Dialect::QUERY_REPLY, Duration::from_millis(2));

    assert_eq!(port.exchange("GLP"), None);
    std::thread::sleep(Duration::from_millis(15));

    let ack = port.exchange_with("LOn", ReplyLayout::Inline, Duration::from_millis(100));
    assert_eq!(ack.as_deref(), Some(">"));
    assert!(port.channel().received().is_empty());

    assert_eq!(port.exchange("GLP"), None);
}

#[test]
fn late_reply_is_not_taken_for_the_same_query_repeated() {
    let ports = LoopbackPorts::new();
    let mut replies = vec![b"!GLP222\r".to_vec(), b"!GLP111\r".to_vec()];
    ports.attach_with_latency("it-repeat", Duration::from_millis(10), move |line| {
        (line == b"?GLP").then(|| replies.pop()).flatten()
    });
    let channel = ByteChannel::new(
        "it-repeat",
        SerialSettings::with_baud(500_000),
        Arc::new(ports),
    )
    .unwrap();
    let mut port = CommandPort::new(channel, Dialect::QUERY_REPLY, Duration::from_millis(2));

    assert_eq!(port.exchange("GLP"), None);
    std::thread::sleep(Duration::from_millis(15));

    let reply = port.exchange_with("GLP", ReplyLayout::Inline, Duration::from_millis(100));
    assert_eq!(reply.as_deref(), Some("222"));
}

#[test]
fn gpio_and_laser_share_a_loopback_without_crosstalk() {
    let ports = LoopbackPorts::new();
    ports.attach("it-las", |line| (line == b"?GLP").then(|| b"!GLP000\r".to_vec()));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&seen);
    ports.attach("it-gpio", move |line| {
        log.lock().unwrap().push(String::from_utf8_lossy(line).into_owned());
        None
    });
    let opener: Arc<dyn PortOpener> = Arc::new(ports);

    let mut laser = Laser::open(&LaserConfig::omicron("it-las"), Arc::clone(&opener)).unwrap();
    let mut gpio = SerialGpio::open(&GpioConfig::new("it-gpio"), opener).unwrap();

    assert_eq!(laser.power_ratio(), Some(0.0));
    assert!(gpio.write(3, true));
    assert_eq!(*seen.lock().unwrap(), vec!["gpio set 3".to_string()]);
}

#[test]
fn dropping_a_driver_releases_its_port() {
    let ports = LoopbackPorts::new();
    ports.attach_silent("it-release");
    let opener: Arc<dyn PortOpener> = Arc::new(ports);

    let laser = Laser::open(&LaserConfig::cobolt("it-release"), Arc::clone(&opener)).unwrap();
    assert!(is_port_owned("it-release"));
    assert!(matches!(
        SerialGpio::open(&GpioConfig::new("it-release"), Arc::clone(&opener)),
        Err(ChannelError::PortInUse(_))
    ));

    drop(laser);
    assert!(!is_port_owned("it-release"));
    assert!(SerialGpio::open(&GpioConfig::new("it-release"), opener).is_ok());
}

#[test]
fn unplugged_port_recovers_after_reattach() {
    let ports = LoopbackPorts::new();
    ports.attach("it-replug", |line| (line == b"?GLP").then(|| b"!GLPfff\r".to_vec()));
    let cfg = LaserConfig::omicron("it-replug").with_timeout_ms(20.0);
    let mut laser = Laser::open(&cfg, Arc::new(ports.clone())).unwrap();
    assert_eq!(laser.power_ratio(), Some(1.0));

    ports.detach("it-replug");
    assert_eq!(laser.power_ratio(), None);
    assert!(!laser.set_power_ratio(0.5));

    ports.attach("it-replug", |line| (line == b"?GLP").then(|| b"!GLP000\r".to_vec()));
    assert_eq!(laser.power_ratio(), Some(0.0));
}
