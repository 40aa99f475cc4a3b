//! # Node Wiring
//!
//! Connects the pieces into a running telemetry node:
//! - the link driver task (connection, framing, reconnect)
//! - the inbound consumer task (decode, session, callbacks)
//! - the producer loop (reporter ticks, outbound queue)
//!
//! The session is shared by reference count between the consumer and the
//! producer; all of its state changes go through its own lock.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval_at, Instant};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::Config;
use crate::events::{dispatch, EventHandler};
use crate::link::{Connector, LinkDriver, LinkEvent, LinkHandle};
use crate::protocol::decoder::decode_frame;
use crate::reporter::{ReportSchedule, Reporter};
use crate::sensor::Sensor;
use crate::session::{Session, SessionEvent};

/// Number of frames between status log messages
const LOG_INTERVAL_FRAMES: u64 = 100;

/// Decode one raw inbound buffer and apply it to the session
///
/// Rejected buffers are logged and reported through `on_decode_error`; they
/// never affect session state.
pub fn process_inbound(session: &Session, handler: &dyn EventHandler, raw: &[u8]) -> Option<SessionEvent> {
    match decode_frame(raw) {
        Ok(frame) => {
            let event = session.handle_frame(&frame);
            dispatch(handler, &event, &frame);
            Some(event)
        }
        Err(e) => {
            warn!("Dropping inbound frame ({} bytes): {}", raw.len(), e);
            handler.on_decode_error(&e);
            None
        }
    }
}

/// Apply one link event to the session
pub fn apply_link_event(session: &Session, handler: &dyn EventHandler, event: LinkEvent) -> Option<SessionEvent> {
    match event {
        LinkEvent::Connected => {
            session.link_connected();
            None
        }
        LinkEvent::Disconnected => {
            session.link_disconnected();
            None
        }
        LinkEvent::Data(raw) => process_inbound(session, handler, &raw),
    }
}

/// A configured node, ready to run
pub struct Node {
    session: Arc<Session>,
    handler: Arc<dyn EventHandler>,
    reporter: Reporter,
    connector: Box<dyn Connector>,
    tick_interval: Duration,
    reconnect_interval: Duration,
    outbound_queue: usize,
}

impl Node {
    /// Build a node from configuration and its collaborators
    pub fn new(
        config: &Config,
        connector: Box<dyn Connector>,
        clock: Box<dyn Clock>,
        sensor: Box<dyn Sensor>,
        handler: Arc<dyn EventHandler>,
    ) -> Self {
        let session = Arc::new(Session::new(config.device.id));
        let reporter = Reporter::new(
            Arc::clone(&session),
            clock,
            sensor,
            ReportSchedule::from(&config.report),
        );

        Self {
            session,
            handler,
            reporter,
            connector,
            tick_interval: Duration::from_millis(config.report.tick_interval_ms),
            reconnect_interval: Duration::from_millis(config.link.reconnect_interval_ms),
            outbound_queue: config.link.outbound_queue,
        }
    }

    /// Shared session, for inspection
    pub fn session(&self) -> Arc<Session> {
        Arc::clone(&self.session)
    }

    /// Run until `shutdown` completes
    ///
    /// # Returns
    ///
    /// Number of frames handed to the link driver
    pub async fn run<F>(self, shutdown: F) -> u64
    where
        F: Future<Output = ()>,
    {
        let Self {
            session,
            handler,
            mut reporter,
            connector,
            tick_interval,
            reconnect_interval,
            outbound_queue,
        } = self;

        info!(
            "Node 0x{:08X} starting, link {}",
            session.device_id(),
            connector.describe()
        );

        let (driver, link, mut events) = LinkDriver::new(connector, reconnect_interval, outbound_queue);
        let driver_task = tokio::spawn(driver.run());

        let consumer_task = tokio::spawn({
            let session = Arc::clone(&session);
            let handler = Arc::clone(&handler);
            async move {
                while let Some(event) = events.recv().await {
                    apply_link_event(&session, handler.as_ref(), event);
                }
            }
        });

        // First tick one full interval after start
        let mut ticker = interval_at(Instant::now() + tick_interval, tick_interval);
        tokio::pin!(shutdown);

        let mut sent: u64 = 0;
        let mut last_log_count: u64 = 0;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    sent += produce(&mut reporter, &link);

                    if sent - last_log_count >= LOG_INTERVAL_FRAMES {
                        info!("Sent {} frames", sent);
                        last_log_count = sent;
                    }
                }

                _ = &mut shutdown => {
                    info!("Shutdown requested, stopping node...");
                    break;
                }
            }
        }

        driver_task.abort();
        consumer_task.abort();

        info!("Total frames sent: {}", sent);
        sent
    }
}

fn produce(reporter: &mut Reporter, link: &LinkHandle) -> u64 {
    let frames = match reporter.on_tick() {
        Ok(frames) => frames,
        Err(e) => {
            warn!("Tick {} failed: {}", reporter.ticks(), e);
            return 0;
        }
    };

    let mut queued = 0;
    for frame in frames {
        if link.send(frame) {
            queued += 1;
        }
    }
    if queued > 0 {
        debug!("Tick {}: queued {} frame(s)", reporter.ticks(), queued);
    }
    queued
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::MockEventHandler;
    use crate::protocol::decoder::DecodeError;
    use crate::protocol::encoder::encode_frame;
    use crate::protocol::frame::Command;
    use mockall::predicate::eq;

    const DEVICE_ID: u32 = 0x0102_0304;

    fn raw(command: Command, payload: &[u8]) -> Vec<u8> {
        encode_frame(command, 0, DEVICE_ID, payload).unwrap()
    }

    #[test]
    fn test_control_reaches_handler_only_when_registered() {
        let session = Session::new(DEVICE_ID);
        let mut handler = MockEventHandler::new();
        handler.expect_on_registration().with(eq(true)).times(1).return_const(());
        handler.expect_on_control().with(eq(true)).times(1).return_const(());

        apply_link_event(&session, &handler, LinkEvent::Connected);

        let denied = process_inbound(&session, &handler, &raw(Command::Control, &[1]));
        assert_eq!(denied, Some(SessionEvent::ControlDenied));

        let registered = process_inbound(&session, &handler, &raw(Command::RegistrationAnswer, &[1]));
        assert_eq!(registered, Some(SessionEvent::Registered));

        let control = process_inbound(&session, &handler, &raw(Command::Control, &[1]));
        assert_eq!(control, Some(SessionEvent::Control { on: true }));
    }

    #[test]
    fn test_decode_error_reported_and_state_untouched() {
        let session = Session::new(DEVICE_ID);
        session.link_connected();
        let before = session.snapshot();

        let mut handler = MockEventHandler::new();
        handler
            .expect_on_decode_error()
            .withf(|e| matches!(e, DecodeError::ChecksumMismatch { .. }))
            .times(1)
            .return_const(());
        handler.expect_on_registration().times(0);

        let mut frame = raw(Command::RegistrationAnswer, &[1]);
        frame[11] ^= 0xFF;

        assert_eq!(process_inbound(&session, &handler, &frame), None);
        assert_eq!(session.snapshot(), before);
    }

    #[test]
    fn test_unknown_command_reaches_handler() {
        let session = Session::new(DEVICE_ID);
        session.link_connected();
        let before = session.snapshot();

        let mut handler = MockEventHandler::new();
        handler.expect_on_unknown_command().with(eq(0x42)).times(1).return_const(());

        let event = process_inbound(&session, &handler, &raw(Command::Unknown(0x42), &[7, 7]));
        assert_eq!(event, Some(SessionEvent::UnknownCommand(0x42)));
        assert_eq!(session.snapshot(), before);
    }

    #[test]
    fn test_disconnect_event_resets_registration() {
        let session = Session::new(DEVICE_ID);
        let mut handler = MockEventHandler::new();
        handler.expect_on_registration().return_const(());
        handler.expect_on_control().times(0);

        apply_link_event(&session, &handler, LinkEvent::Connected);
        apply_link_event(&session, &handler, LinkEvent::Data(raw(Command::RegistrationAnswer, &[1])));
        assert!(session.snapshot().is_registered());

        apply_link_event(&session, &handler, LinkEvent::Disconnected);
        assert!(!session.snapshot().is_registered());
        assert!(!session.snapshot().is_connected());

        // Reconnected but not yet re-registered: control still denied
        apply_link_event(&session, &handler, LinkEvent::Connected);
        let event = apply_link_event(&session, &handler, LinkEvent::Data(raw(Command::Control, &[1])));
        assert_eq!(event, Some(SessionEvent::ControlDenied));
    }

    #[test]
    fn test_produce_counts_queued_frames() {
        let session = Arc::new(Session::new(DEVICE_ID));
        session.link_connected();

        let mut clock = crate::clock::MockClock::new();
        clock.expect_now_ms().return_const(1_700_000_000_000u64);
        let mut reporter = Reporter::new(
            Arc::clone(&session),
            Box::new(clock),
            Box::new(crate::sensor::FixedSensor::new(23.5, 55.0, 1200)),
            ReportSchedule::default(),
        );

        let (connector, _peers) = crate::link::mocks::DuplexConnector::with_peers(0);
        let (_driver, link, _events) = LinkDriver::new(Box::new(connector), Duration::from_millis(10), 8);

        assert_eq!(produce(&mut reporter, &link), 0);
        assert_eq!(produce(&mut reporter, &link), 0);
        assert_eq!(produce(&mut reporter, &link), 1);
    }
}
