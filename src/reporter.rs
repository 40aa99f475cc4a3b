//! # Reporter
//!
//! Periodic producer. Each tick decides which frames the node should send and
//! encodes them through the session, which enforces the send policy.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::ReportConfig;
use crate::error::Result;
use crate::protocol::encoder::*;
use crate::protocol::frame::{Command, FaultNotice, Report, FAULT_CODE_SENSOR};
use crate::sensor::{Sensor, SensorReading};
use crate::session::Session;

/// Tick multiples at which each kind of frame is attempted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportSchedule {
    pub register_every: u64,
    pub heartbeat_every: u64,
    pub report_every: u64,
}

impl Default for ReportSchedule {
    fn default() -> Self {
        Self {
            register_every: 3,
            heartbeat_every: 10,
            report_every: 3,
        }
    }
}

impl ReportSchedule {
    /// Copy of this schedule with every multiple at least 1
    fn clamped(self) -> Self {
        if self.register_every == 0 || self.heartbeat_every == 0 || self.report_every == 0 {
            warn!("Tick multiple of 0 in {:?}, using 1", self);
        }
        Self {
            register_every: self.register_every.max(1),
            heartbeat_every: self.heartbeat_every.max(1),
            report_every: self.report_every.max(1),
        }
    }
}

impl From<&ReportConfig> for ReportSchedule {
    fn from(config: &ReportConfig) -> Self {
        Self {
            register_every: config.register_every_ticks,
            heartbeat_every: config.heartbeat_every_ticks,
            report_every: config.report_every_ticks,
        }
    }
}

/// Periodic frame producer
pub struct Reporter {
    session: Arc<Session>,
    clock: Box<dyn Clock>,
    sensor: Box<dyn Sensor>,
    schedule: ReportSchedule,
    tick: u64,
    last_reading: Option<SensorReading>,
}

impl Reporter {
    /// Create a reporter; a zero tick multiple is treated as 1
    pub fn new(
        session: Arc<Session>,
        clock: Box<dyn Clock>,
        sensor: Box<dyn Sensor>,
        schedule: ReportSchedule,
    ) -> Self {
        Self {
            session,
            clock,
            sensor,
            schedule: schedule.clamped(),
            tick: 0,
            last_reading: None,
        }
    }

    /// Most recent sensor sample, taken whether or not it was reported
    pub fn last_reading(&self) -> Option<SensorReading> {
        self.last_reading
    }

    /// Number of ticks processed so far
    pub fn ticks(&self) -> u64 {
        self.tick
    }

    fn now_ms(&self) -> u64 {
        let now = self.clock.now_ms();
        if now == 0 {
            warn!("Time not synced yet, sending timestamp 0");
        }
        now
    }

    /// Advance one tick and return the encoded frames to transmit, in order
    ///
    /// Frames the session does not currently permit are skipped silently.
    pub fn on_tick(&mut self) -> Result<Vec<Vec<u8>>> {
        self.tick += 1;
        let mut frames = Vec::new();

        if self.tick % self.schedule.register_every == 0
            && self.session.may_send(Command::RegistrationRequest)
        {
            let payload = encode_timestamp_payload(self.now_ms());
            if let Some(frame) = self.session.encode_if_permitted(Command::RegistrationRequest, &payload)? {
                info!("Registration request sent");
                frames.push(frame);
            }
        }

        if self.tick % self.schedule.heartbeat_every == 0 && self.session.may_send(Command::Heartbeat) {
            let payload = encode_timestamp_payload(self.now_ms());
            if let Some(frame) = self.session.encode_if_permitted(Command::Heartbeat, &payload)? {
                debug!("Heartbeat sent");
                frames.push(frame);
            }
        }

        if self.tick % self.schedule.report_every == 0 {
            let reading = self.sensor.read();
            self.last_reading = Some(reading);

            if self.session.may_send(Command::DataReport) {
                self.push_report(&reading, &mut frames)?;
            }
        }

        Ok(frames)
    }

    fn push_report(&mut self, reading: &SensorReading, frames: &mut Vec<Vec<u8>>) -> Result<()> {
        let timestamp_ms = self.now_ms();

        if reading.is_fault() {
            let payload = encode_fault_payload(&FaultNotice {
                code: FAULT_CODE_SENSOR,
                timestamp_ms,
            });
            if let Some(frame) = self.session.encode_if_permitted(Command::Fault, &payload)? {
                warn!("Sensor fault reported: {:?}", reading);
                frames.push(frame);
            }
        }

        let payload = encode_report_payload(&Report {
            temperature: reading.temperature,
            humidity: reading.humidity,
            light: reading.light,
            timestamp_ms,
        });
        if let Some(frame) = self.session.encode_if_permitted(Command::DataReport, &payload)? {
            debug!(
                "Report sent: {:.1}C {:.1}% light={}",
                reading.temperature, reading.humidity, reading.light
            );
            frames.push(frame);
        }

        Ok(())
    }
}
