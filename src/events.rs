//! # Event Callbacks
//!
//! Callbacks the node exposes to the application: the control (actuator)
//! command and diagnostic notifications.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{info, warn};

use crate::protocol::decoder::DecodeError;
use crate::protocol::frame::Frame;
use crate::session::SessionEvent;

/// Application-side receiver of session events
///
/// Only `on_control` is required; diagnostics default to no-ops.
#[cfg_attr(test, mockall::automock)]
pub trait EventHandler: Send + Sync {
    /// Collector switched the actuator on or off
    fn on_control(&self, on: bool);

    fn on_registration(&self, _accepted: bool) {}

    fn on_heartbeat_ack(&self, _sequence: u8) {}

    fn on_report_ack(&self, _sequence: u8) {}

    fn on_fault(&self, _code: u8) {}

    /// A well-formed frame carried a command byte this node does not know
    fn on_unknown_command(&self, _command: u8) {}

    /// An inbound buffer was rejected by the decoder
    fn on_decode_error(&self, _error: &DecodeError) {}
}

/// Route a session event to the matching callback
pub fn dispatch(handler: &dyn EventHandler, event: &SessionEvent, frame: &Frame) {
    match *event {
        SessionEvent::Registered => handler.on_registration(true),
        SessionEvent::RegistrationRejected => handler.on_registration(false),
        SessionEvent::Control { on } => handler.on_control(on),
        SessionEvent::HeartbeatAck => handler.on_heartbeat_ack(frame.sequence),
        SessionEvent::ReportAck => handler.on_report_ack(frame.sequence),
        SessionEvent::Fault { code } => handler.on_fault(code),
        SessionEvent::UnknownCommand(command) => handler.on_unknown_command(command),
        SessionEvent::RegistrationIgnored
        | SessionEvent::ControlDenied
        | SessionEvent::Unexpected(_)
        | SessionEvent::MalformedPayload(_) => {}
    }
}

/// Default handler: drives a single on/off actuator and logs diagnostics
#[derive(Debug, Default)]
pub struct ActuatorHandler {
    on: AtomicBool,
}

impl ActuatorHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current actuator state
    pub fn is_on(&self) -> bool {
        self.on.load(Ordering::SeqCst)
    }
}

impl EventHandler for ActuatorHandler {
    fn on_control(&self, on: bool) {
        self.on.store(on, Ordering::SeqCst);
        info!("Actuator switched {}", if on { "on" } else { "off" });
    }

    fn on_registration(&self, accepted: bool) {
        info!("Registration {}", if accepted { "accepted" } else { "rejected" });
    }

    fn on_heartbeat_ack(&self, sequence: u8) {
        info!("Heartbeat response received (seq {})", sequence);
    }

    fn on_report_ack(&self, sequence: u8) {
        info!("Report acknowledged (seq {})", sequence);
    }

    fn on_fault(&self, code: u8) {
        warn!("Fault notification from collector: 0x{:02X}", code);
    }

    fn on_unknown_command(&self, command: u8) {
        warn!("Unknown command from collector: 0x{:02X}", command);
    }

    fn on_decode_error(&self, error: &DecodeError) {
        warn!("Discarded inbound frame: {}", error);
    }
}
