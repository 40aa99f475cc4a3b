//! # Telemetry Link Library
//!
//! Device side of a binary telemetry protocol for sensor nodes.
//!
//! A node registers with a remote collector, reports temperature, humidity
//! and light readings on a fixed schedule, keeps the link alive with
//! heartbeats, raises sensor faults and obeys on/off control commands once
//! registered. Frames are CRC-16/Modbus protected and carried over TCP or a
//! serial port.

pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod link;
pub mod node;
pub mod protocol;
pub mod reporter;
pub mod sensor;
pub mod session;
