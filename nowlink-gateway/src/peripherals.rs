// NowLink Gateway - Radio to MQTT forwarding
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Sensors and indicators attached to the gateway itself
//!
//! A motion sensor publishes its state changes as retained `"ON"`/`"OFF"`
//! on `<base>/<name>/state`, the same topic shape nodes use. A status
//! indicator mirrors broker connectivity. On a Linux host both are usually
//! sysfs GPIO `value` files, see [`ValueFileSource`] and
//! [`ValueFileIndicator`].

use crate::broker::{Broker, Topics};
use std::fs;
use std::io;
use std::path::PathBuf;

/// Payload for an active motion sensor
pub const MOTION_ON: &str = "ON";

/// Payload for an idle motion sensor
pub const MOTION_OFF: &str = "OFF";

/// Boolean event source
pub trait MotionSource {
    /// Return the new level if it changed since the last poll
    fn poll(&mut self) -> Option<bool>;
}

/// Binary output
pub trait Indicator {
    /// Drive the output
    fn set(&mut self, on: bool) -> io::Result<()>;
}

/// Publishes motion state changes
pub struct MotionSensor<S: MotionSource> {
    name: String,
    topic: String,
    source: S,
    pending: Option<bool>,
    published: Option<bool>,
}

impl<S: MotionSource> MotionSensor<S> {
    /// Create a sensor called `name`
    pub fn new(name: &str, topics: &Topics, source: S) -> Self {
        Self {
            name: name.to_string(),
            topic: topics.device_state(name),
            source,
            pending: None,
            published: None,
        }
    }

    /// Sensor name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Last state the broker accepted
    pub fn published_state(&self) -> Option<bool> {
        self.published
    }

    /// Poll the source and publish a pending change
    ///
    /// A change that could not be published is kept and retried on the next
    /// tick; a newer change replaces it.
    pub fn tick<B: Broker + ?Sized>(&mut self, broker: &mut B, connected: bool) {
        if let Some(level) = self.source.poll() {
            tracing::debug!(sensor = %self.name, level, "motion edge");
            self.pending = Some(level);
        }

        let Some(level) = self.pending else {
            return;
        };
        if !connected {
            return;
        }

        let payload = if level { MOTION_ON } else { MOTION_OFF };
        match broker.publish(&self.topic, payload.as_bytes(), true) {
            Ok(()) => {
                tracing::info!(sensor = %self.name, state = payload, "motion state published");
                self.published = Some(level);
                self.pending = None;
            }
            Err(e) => {
                tracing::warn!(sensor = %self.name, error = %e, "failed to publish motion state");
            }
        }
    }
}

/// Drives an indicator from connectivity, writing only on change
pub struct StatusIndicator<I: Indicator> {
    output: I,
    lit: Option<bool>,
}

impl<I: Indicator> StatusIndicator<I> {
    /// Wrap an output; its state is unknown until the first update
    pub fn new(output: I) -> Self {
        Self { output, lit: None }
    }

    /// Current level, if it has been driven
    pub fn is_lit(&self) -> Option<bool> {
        self.lit
    }

    /// Reflect `connected` on the output
    pub fn update(&mut self, connected: bool) {
        if self.lit == Some(connected) {
            return;
        }
        match self.output.set(connected) {
            Ok(()) => self.lit = Some(connected),
            Err(e) => tracing::warn!(error = %e, "failed to drive status indicator"),
        }
    }
}

/// Motion source reading a `0`/`1` value file
#[derive(Debug)]
pub struct ValueFileSource {
    path: PathBuf,
    last: Option<bool>,
    read_failed: bool,
}

impl ValueFileSource {
    /// Watch the file at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            last: None,
            read_failed: false,
        }
    }

    fn read_level(&self) -> io::Result<bool> {
        let text = fs::read_to_string(&self.path)?;
        match text.trim() {
            "0" => Ok(false),
            "1" => Ok(true),
            other => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unexpected level '{}'", other),
            )),
        }
    }
}

impl MotionSource for ValueFileSource {
    fn poll(&mut self) -> Option<bool> {
        match self.read_level() {
            Ok(level) => {
                self.read_failed = false;
                if self.last == Some(level) {
                    return None;
                }
                self.last = Some(level);
                Some(level)
            }
            Err(e) => {
                // Log the first failure of a run only
                if !self.read_failed {
                    tracing::warn!(path = %self.path.display(), error = %e, "motion source unreadable");
                    self.read_failed = true;
                }
                None
            }
        }
    }
}

/// Indicator writing `1`/`0` to a value file
#[derive(Debug)]
pub struct ValueFileIndicator {
    path: PathBuf,
}

impl ValueFileIndicator {
    /// Drive the file at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Indicator for ValueFileIndicator {
    fn set(&mut self, on: bool) -> io::Result<()> {
        fs::write(&self.path, if on { "1" } else { "0" })
    }
}

impl<S: MotionSource + ?Sized> MotionSource for Box<S> {
    fn poll(&mut self) -> Option<bool> {
        (**self).poll()
    }
}

impl<I: Indicator + ?Sized> Indicator for Box<I> {
    fn set(&mut self, on: bool) -> io::Result<()> {
        (**self).set(on)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{LastWill, ScriptedBroker, SessionConfig};
    use std::collections::VecDeque;

    struct Edges(VecDeque<Option<bool>>);

    impl MotionSource for Edges {
        fn poll(&mut self) -> Option<bool> {
            self.0.pop_front().flatten()
        }
    }

    #[derive(Default)]
    struct Recorder(Vec<bool>);

    impl Indicator for Recorder {
        fn set(&mut self, on: bool) -> io::Result<()> {
            self.0.push(on);
            Ok(())
        }
    }

    fn connected_broker() -> ScriptedBroker {
        let mut broker = ScriptedBroker::new();
        broker
            .connect(&SessionConfig {
                client_id: "gw".to_string(),
                will: LastWill {
                    topic: "home/gw/LWT".to_string(),
                    payload: "offline".to_string(),
                    retain: true,
                },
            })
            .unwrap();
        broker
    }

    #[test]
    fn test_motion_edges_published_retained() {
        let topics = Topics::new("home", "gw");
        let edges = Edges(vec![Some(true), None, Some(false)].into());
        let mut sensor = MotionSensor::new("family_room_motion", &topics, edges);
        let mut broker = connected_broker();

        for _ in 0..3 {
            sensor.tick(&mut broker, true);
        }
        let published = broker.published_on("home/family_room_motion/state");
        let payloads: Vec<&str> = published.iter().map(|p| p.payload.as_str()).collect();
        assert_eq!(payloads, vec!["ON", "OFF"]);
        assert!(published.iter().all(|p| p.retain));
        assert_eq!(sensor.published_state(), Some(false));
    }

    #[test]
    fn test_motion_held_while_offline() {
        let topics = Topics::new("home", "gw");
        let edges = Edges(vec![Some(true), None].into());
        let mut sensor = MotionSensor::new("pir", &topics, edges);
        let mut broker = connected_broker();

        sensor.tick(&mut broker, false);
        assert_eq!(broker.publish_attempts(), 0);
        sensor.tick(&mut broker, true);
        assert_eq!(broker.published_on("home/pir/state")[0].payload, "ON");
    }

    #[test]
    fn test_indicator_writes_on_change_only() {
        let mut indicator = StatusIndicator::new(Recorder::default());
        for connected in [false, false, true, true, true, false] {
            indicator.update(connected);
        }
        assert_eq!(indicator.output.0, vec![false, true, false]);
        assert_eq!(indicator.is_lit(), Some(false));
    }

    #[test]
    fn test_value_file_source_reports_edges() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("value");
        let mut source = ValueFileSource::new(&path);

        assert_eq!(source.poll(), None);
        fs::write(&path, "0\n").unwrap();
        assert_eq!(source.poll(), Some(false));
        assert_eq!(source.poll(), None);
        fs::write(&path, "1\n").unwrap();
        assert_eq!(source.poll(), Some(true));
        fs::write(&path, "x").unwrap();
        assert_eq!(source.poll(), None);
    }

    #[test]
    fn test_value_file_indicator() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("led");
        let mut led = ValueFileIndicator::new(&path);
        led.set(true).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "1");
        led.set(false).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "0");
    }
}
