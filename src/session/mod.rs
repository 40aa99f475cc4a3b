//! # Session State Machine
//!
//! Tracks link connectivity and registration for one device link, owns the
//! outbound sequence counter, and decides what each inbound frame means.
//!
//! All state lives in one mutex-guarded record so that a transition is never
//! observed half-applied: a reader can not see `Connected` together with a
//! registration left over from before a disconnect.
//!
//! ```text
//!                LinkConnected                 answer(status != 0)
//!  Disconnected ---------------> Connected  -----------------------> Connected
//!  Unregistered <--------------- Unregistered <--------------------- Registered
//!                LinkDisconnected              answer(status == 0)
//!        ^                                                              |
//!        +----------------------- LinkDisconnected ---------------------+
//! ```

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::protocol::decoder::decode_status_payload;
use crate::protocol::encoder::encode_frame;
use crate::protocol::frame::{Command, Frame};

/// Transport connectivity as reported by the link driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connected,
}

/// Registration status on the current connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationState {
    Unregistered,
    Registered,
}

/// Consistent copy of the session state at one instant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub link: LinkState,
    pub registration: RegistrationState,
    /// Sequence number the next outbound frame will carry
    pub next_sequence: u8,
}

impl SessionSnapshot {
    pub fn is_connected(&self) -> bool {
        self.link == LinkState::Connected
    }

    pub fn is_registered(&self) -> bool {
        self.registration == RegistrationState::Registered
    }

    /// Whether a frame with `command` may be sent in this state
    ///
    /// - registration request: connected and unregistered
    /// - heartbeat, fault, data report: connected and registered
    /// - anything else is collector-originated and never sent by a node
    pub fn may_send(&self, command: Command) -> bool {
        match command {
            Command::RegistrationRequest => self.is_connected() && !self.is_registered(),
            Command::Heartbeat | Command::Fault | Command::DataReport => {
                self.is_connected() && self.is_registered()
            }
            _ => false,
        }
    }
}

/// Outcome of feeding one decoded frame to the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Registration accepted; session is now registered
    Registered,
    /// Registration refused; session is unregistered
    RegistrationRejected,
    /// Positive answer arrived while disconnected; ignored
    RegistrationIgnored,
    /// Control command accepted from the collector
    Control { on: bool },
    /// Control command refused because the session is not registered
    ControlDenied,
    /// Heartbeat response
    HeartbeatAck,
    /// Data report acknowledgement
    ReportAck,
    /// Fault notification from the peer
    Fault { code: u8 },
    /// Known command a collector is not expected to send
    Unexpected(Command),
    /// Command byte outside the known set
    UnknownCommand(u8),
    /// Payload too short for its command; no state change
    MalformedPayload(Command),
}

#[derive(Debug)]
struct SessionInner {
    link: LinkState,
    registration: RegistrationState,
    sequence: u8,
}

/// Session state for one device link
///
/// Shared between the periodic producer and the inbound consumer, typically
/// behind an `Arc`.
#[derive(Debug)]
pub struct Session {
    device_id: u32,
    inner: Mutex<SessionInner>,
}

impl Session {
    /// Create a disconnected, unregistered session
    pub fn new(device_id: u32) -> Self {
        Self {
            device_id,
            inner: Mutex::new(SessionInner {
                link: LinkState::Disconnected,
                registration: RegistrationState::Unregistered,
                sequence: 0,
            }),
        }
    }

    pub fn device_id(&self) -> u32 {
        self.device_id
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let inner = self.inner.lock();
        SessionSnapshot {
            link: inner.link,
            registration: inner.registration,
            next_sequence: inner.sequence,
        }
    }

    /// Whether a frame with `command` may be sent right now
    pub fn may_send(&self, command: Command) -> bool {
        self.snapshot().may_send(command)
    }

    /// Link driver reported the connection up
    pub fn link_connected(&self) {
        let mut inner = self.inner.lock();
        inner.link = LinkState::Connected;
        info!("Link connected (registration: {:?})", inner.registration);
    }

    /// Link driver reported the connection down; registration is reset
    pub fn link_disconnected(&self) {
        let mut inner = self.inner.lock();
        inner.link = LinkState::Disconnected;
        inner.registration = RegistrationState::Unregistered;
        info!("Link disconnected, registration reset");
    }

    /// Apply one decoded inbound frame
    ///
    /// Only registration answers change state. Control frames are surfaced
    /// only while registered.
    pub fn handle_frame(&self, frame: &Frame) -> SessionEvent {
        debug!(
            "Received: cmd={} seq={} dev_id=0x{:08X} payload_len={}",
            frame.command,
            frame.sequence,
            frame.device_id,
            frame.payload.len()
        );

        match frame.command {
            Command::RegistrationAnswer => self.apply_registration_answer(frame),
            Command::Control => {
                if self.snapshot().registration != RegistrationState::Registered {
                    warn!("Control command ignored: device not registered");
                    return SessionEvent::ControlDenied;
                }
                match decode_status_payload(frame.command, &frame.payload) {
                    Ok(on) => SessionEvent::Control { on },
                    Err(e) => {
                        warn!("Dropping control frame: {}", e);
                        SessionEvent::MalformedPayload(frame.command)
                    }
                }
            }
            Command::HeartbeatResponse => SessionEvent::HeartbeatAck,
            Command::ReportAck => SessionEvent::ReportAck,
            Command::Fault => match frame.payload.first() {
                Some(&code) => SessionEvent::Fault { code },
                None => SessionEvent::MalformedPayload(frame.command),
            },
            Command::Heartbeat | Command::RegistrationRequest | Command::DataReport => {
                debug!("Unexpected {} frame from collector", frame.command);
                SessionEvent::Unexpected(frame.command)
            }
            Command::Unknown(byte) => {
                debug!("Unknown command 0x{:02X}", byte);
                SessionEvent::UnknownCommand(byte)
            }
        }
    }

    fn apply_registration_answer(&self, frame: &Frame) -> SessionEvent {
        let accepted = match decode_status_payload(frame.command, &frame.payload) {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("Dropping registration answer: {}", e);
                return SessionEvent::MalformedPayload(frame.command);
            }
        };

        let mut inner = self.inner.lock();
        if !accepted {
            inner.registration = RegistrationState::Unregistered;
            info!("Registration failed");
            return SessionEvent::RegistrationRejected;
        }

        if inner.link != LinkState::Connected {
            warn!("Registration answer ignored: link is down");
            return SessionEvent::RegistrationIgnored;
        }

        inner.registration = RegistrationState::Registered;
        info!("Registration successful");
        SessionEvent::Registered
    }

    /// Encode a frame, consuming the next sequence number
    ///
    /// Does not consult the send policy. The sequence is only advanced when
    /// encoding succeeds.
    pub fn encode(&self, command: Command, payload: &[u8]) -> Result<Vec<u8>> {
        let mut inner = self.inner.lock();
        self.encode_locked(&mut inner, command, payload)
    }

    /// Check the send policy and encode in one step
    ///
    /// Returns `Ok(None)` when the current state does not permit `command`;
    /// the caller silently skips the send.
    pub fn encode_if_permitted(&self, command: Command, payload: &[u8]) -> Result<Option<Vec<u8>>> {
        let mut inner = self.inner.lock();
        let snapshot = SessionSnapshot {
            link: inner.link,
            registration: inner.registration,
            next_sequence: inner.sequence,
        };
        if !snapshot.may_send(command) {
            return Ok(None);
        }
        self.encode_locked(&mut inner, command, payload).map(Some)
    }

    fn encode_locked(&self, inner: &mut SessionInner, command: Command, payload: &[u8]) -> Result<Vec<u8>> {
        let frame = encode_frame(command, inner.sequence, self.device_id, payload)?;
        inner.sequence = inner.sequence.wrapping_add(1);
        debug!("Sent packet: cmd={} len={}", command, frame.len());
        Ok(frame)
    }
}
