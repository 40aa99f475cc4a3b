//! # Link Driver
//!
//! Owns the duplex connection to the collector.
//!
//! This module handles:
//! - Connecting through a pluggable `Connector` (TCP or serial)
//! - Delimiting frames on the byte stream and forwarding them as events
//! - Transmitting queued outbound frames
//! - Reporting connect/disconnect and reconnecting after a fixed interval

pub mod serial;
pub mod tcp;

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

use crate::config::{LinkConfig, TransportKind};
use crate::error::Result;
use crate::protocol::frame::{FRAME_CRC_SIZE, FRAME_HEADER_SIZE, FRAME_MAGIC, PAYLOAD_LEN_OFFSET};

pub use serial::SerialConnector;
pub use tcp::TcpConnector;

/// Boxed read half of a connection
pub type LinkReader = Box<dyn AsyncRead + Send + Unpin>;

/// Boxed write half of a connection
pub type LinkWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// An open connection split into independent halves
pub struct LinkIo {
    pub reader: LinkReader,
    pub writer: LinkWriter,
}

/// Notifications delivered to the inbound consumer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    Connected,
    Disconnected,
    /// One raw frame as read from the wire, not yet validated
    Data(Vec<u8>),
}

/// Opens connections to the collector
#[async_trait]
pub trait Connector: Send {
    async fn connect(&mut self) -> Result<LinkIo>;

    /// Human-readable endpoint for logs
    fn describe(&self) -> String;
}

/// Build the connector selected by the configuration
pub fn connector_from_config(config: &LinkConfig) -> Box<dyn Connector> {
    match config.transport {
        TransportKind::Tcp => Box::new(TcpConnector::new(
            config.address.clone(),
            Duration::from_millis(config.connect_timeout_ms),
        )),
        TransportKind::Serial => Box::new(SerialConnector::new(
            config.serial_ports.clone(),
            config.baud_rate,
        )),
    }
}

/// Read one frame from a byte stream
///
/// Skips ahead to the next `55 AA` magic, then reads the rest of the fixed
/// header and `payload_len + 2` more bytes. Bytes before the magic are
/// discarded, so a corrupt header costs at most the bytes up to the next
/// frame start. Everything after the magic goes to the decoder as-is.
///
/// # Returns
///
/// * `Ok(Some(frame))` - One complete frame buffer
/// * `Ok(None)` - Stream closed before a frame started
/// * `Err(_)` - I/O error, or stream closed mid-frame
pub async fn read_frame<R: AsyncRead + Unpin + ?Sized>(reader: &mut R) -> io::Result<Option<Vec<u8>>> {
    if !sync_to_magic(reader).await? {
        return Ok(None);
    }

    let mut frame = vec![0u8; FRAME_HEADER_SIZE];
    frame[..2].copy_from_slice(&FRAME_MAGIC.to_le_bytes());
    reader.read_exact(&mut frame[2..]).await?;

    let declared = u16::from_le_bytes([frame[PAYLOAD_LEN_OFFSET], frame[PAYLOAD_LEN_OFFSET + 1]]) as usize;
    frame.resize(FRAME_HEADER_SIZE + declared + FRAME_CRC_SIZE, 0);
    reader.read_exact(&mut frame[FRAME_HEADER_SIZE..]).await?;

    Ok(Some(frame))
}

/// Consume bytes up to and including the next frame magic
///
/// Returns false if the stream ends first.
async fn sync_to_magic<R: AsyncRead + Unpin + ?Sized>(reader: &mut R) -> io::Result<bool> {
    let [low, high] = FRAME_MAGIC.to_le_bytes();
    let mut previous: Option<u8> = None;
    let mut consumed: usize = 0;

    loop {
        let mut byte = [0u8; 1];
        if reader.read(&mut byte).await? == 0 {
            if consumed > 0 {
                warn!("Stream closed after {} bytes without a frame start", consumed);
            }
            return Ok(false);
        }
        consumed += 1;

        if previous == Some(low) && byte[0] == high {
            if consumed > 2 {
                warn!("Skipped {} bytes to resync on frame magic", consumed - 2);
            }
            return Ok(true);
        }
        previous = Some(byte[0]);
    }
}

async fn write_frame<W: AsyncWrite + Unpin + ?Sized>(writer: &mut W, frame: &[u8]) -> io::Result<()> {
    writer.write_all(frame).await?;
    writer.flush().await
}

/// Sending side handed to the producer
#[derive(Debug, Clone)]
pub struct LinkHandle {
    outbound: mpsc::Sender<Vec<u8>>,
}

impl LinkHandle {
    /// Queue a frame for transmission without waiting
    ///
    /// Returns false if the frame was dropped (queue full or driver gone).
    pub fn send(&self, frame: Vec<u8>) -> bool {
        match self.outbound.try_send(frame) {
            Ok(()) => true,
            Err(TrySendError::Full(frame)) => {
                warn!("Outbound queue full, dropping {} byte frame", frame.len());
                false
            }
            Err(TrySendError::Closed(_)) => {
                warn!("Link driver stopped, dropping frame");
                false
            }
        }
    }
}

enum PumpExit {
    /// Connection lost; reconnect
    Dropped(String),
    /// Node side went away; stop the driver
    Shutdown,
}

/// Connection owner: connect, pump frames both ways, reconnect on loss
pub struct LinkDriver {
    connector: Box<dyn Connector>,
    reconnect_interval: Duration,
    events: mpsc::Sender<LinkEvent>,
    outbound: mpsc::Receiver<Vec<u8>>,
}

impl LinkDriver {
    /// Create a driver plus the handle and event stream the node uses
    pub fn new(
        connector: Box<dyn Connector>,
        reconnect_interval: Duration,
        queue: usize,
    ) -> (Self, LinkHandle, mpsc::Receiver<LinkEvent>) {
        let (outbound_tx, outbound_rx) = mpsc::channel(queue);
        let (events_tx, events_rx) = mpsc::channel(queue);

        let driver = Self {
            connector,
            reconnect_interval,
            events: events_tx,
            outbound: outbound_rx,
        };
        (driver, LinkHandle { outbound: outbound_tx }, events_rx)
    }

    /// Run until the node drops its handle or event receiver
    pub async fn run(mut self) {
        loop {
            if self.events.is_closed() {
                return;
            }

            match self.connector.connect().await {
                Ok(io) => {
                    info!("Link up: {}", self.connector.describe());
                    if self.events.send(LinkEvent::Connected).await.is_err() {
                        return;
                    }

                    match self.pump(io).await {
                        PumpExit::Shutdown => return,
                        PumpExit::Dropped(reason) => warn!("Link down: {}", reason),
                    }

                    if self.events.send(LinkEvent::Disconnected).await.is_err() {
                        return;
                    }
                }
                Err(e) => warn!("Failed to connect to {}: {}", self.connector.describe(), e),
            }

            if !self.wait_reconnect().await {
                return;
            }
        }
    }

    async fn pump(&mut self, io: LinkIo) -> PumpExit {
        let LinkIo { reader, mut writer } = io;
        let mut reader_task = tokio::spawn(forward_inbound(reader, self.events.clone()));

        let exit = loop {
            tokio::select! {
                result = &mut reader_task => {
                    break match result {
                        Ok(exit) => exit,
                        Err(e) => PumpExit::Dropped(format!("reader task failed: {}", e)),
                    };
                }
                frame = self.outbound.recv() => match frame {
                    Some(frame) => {
                        if let Err(e) = write_frame(&mut writer, &frame).await {
                            break PumpExit::Dropped(format!("write failed: {}", e));
                        }
                        debug!("Transmitted {} byte frame", frame.len());
                    }
                    None => break PumpExit::Shutdown,
                },
            }
        };

        reader_task.abort();
        exit
    }

    /// Sleep out the reconnect interval, discarding frames queued meanwhile
    async fn wait_reconnect(&mut self) -> bool {
        let sleep = tokio::time::sleep(self.reconnect_interval);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = &mut sleep => return true,
                frame = self.outbound.recv() => match frame {
                    Some(frame) => debug!("Link down, dropping {} byte frame", frame.len()),
                    None => return false,
                },
            }
        }
    }
}

async fn forward_inbound(reader: LinkReader, events: mpsc::Sender<LinkEvent>) -> PumpExit {
    let mut reader = BufReader::new(reader);
    loop {
        match read_frame(&mut reader).await {
            Ok(Some(frame)) => {
                if events.send(LinkEvent::Data(frame)).await.is_err() {
                    return PumpExit::Shutdown;
                }
            }
            Ok(None) => return PumpExit::Dropped("closed by peer".to_string()),
            Err(e) => return PumpExit::Dropped(format!("read failed: {}", e)),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::mocks::DuplexConnector;
    use super::*;
    use crate::protocol::decoder::decode_frame;
    use crate::protocol::encoder::encode_frame;
    use crate::protocol::frame::Command;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use tokio::time::timeout;
    use tokio_test::assert_ok;

    const WAIT: Duration = Duration::from_secs(2);

    async fn next_event(events: &mut mpsc::Receiver<LinkEvent>) -> LinkEvent {
        assert_ok!(timeout(WAIT, events.recv()).await).expect("event stream closed")
    }

    #[tokio::test]
    async fn test_read_frame_delimits_by_declared_length() {
        let first = encode_frame(Command::ReportAck, 1, 7, &[]).unwrap();
        let second = encode_frame(Command::Control, 2, 7, &[1]).unwrap();
        let stream: Vec<u8> = first.iter().chain(second.iter()).copied().collect();

        let mut reader = stream.as_slice();
        assert_eq!(read_frame(&mut reader).await.unwrap(), Some(first));
        assert_eq!(read_frame(&mut reader).await.unwrap(), Some(second));
        assert_eq!(read_frame(&mut reader).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_read_frame_skips_corrupt_header() {
        // Bad magic, declares a 40-byte payload that would swallow what follows
        let junk = [0xDE, 0xAD, 0x12, 0x04, 0x00, 0x01, 0x02, 0x03, 0x04, 40, 0x00];
        let answers: Vec<Vec<u8>> = (0..3u8)
            .map(|seq| encode_frame(Command::RegistrationAnswer, seq, 7, &[1]).unwrap())
            .collect();

        let mut stream = junk.to_vec();
        for answer in &answers {
            stream.extend_from_slice(answer);
        }

        let mut reader = stream.as_slice();
        for answer in &answers {
            let frame = read_frame(&mut reader).await.unwrap().unwrap();
            assert_eq!(&frame, answer);
            assert!(decode_frame(&frame).is_ok());
        }
        assert_eq!(read_frame(&mut reader).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_read_frame_resyncs_on_repeated_low_byte() {
        let frame = encode_frame(Command::Control, 4, 7, &[1]).unwrap();
        let mut stream = vec![0x55, 0x55];
        stream.extend_from_slice(&frame);

        let mut reader = stream.as_slice();
        assert_eq!(read_frame(&mut reader).await.unwrap(), Some(frame));
    }

    #[tokio::test]
    async fn test_read_frame_junk_only_is_end_of_stream() {
        let mut reader: &[u8] = &[0x01, 0x55, 0x02, 0xAA];
        assert_eq!(read_frame(&mut reader).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_read_frame_truncated_is_error() {
        let frame = encode_frame(Command::DataReport, 1, 7, &[0u8; 20]).unwrap();
        let mut reader = &frame[..frame.len() - 3];
        let err = read_frame(&mut reader).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[tokio::test]
    async fn test_driver_forwards_both_ways() {
        let (connector, mut peers) = DuplexConnector::with_peers(1);
        let mut collector = peers.remove(0);
        let (driver, handle, mut events) =
            LinkDriver::new(Box::new(connector), Duration::from_millis(10), 8);
        let task = tokio::spawn(driver.run());

        assert_eq!(next_event(&mut events).await, LinkEvent::Connected);

        let inbound = encode_frame(Command::HeartbeatResponse, 5, 7, &[]).unwrap();
        collector.write_all(&inbound).await.unwrap();
        assert_eq!(next_event(&mut events).await, LinkEvent::Data(inbound));

        let outbound = encode_frame(Command::Heartbeat, 0, 7, &[0u8; 8]).unwrap();
        assert!(handle.send(outbound.clone()));
        let received = assert_ok!(timeout(WAIT, read_frame(&mut collector)).await).unwrap();
        assert_eq!(received, Some(outbound));

        task.abort();
    }

    #[tokio::test]
    async fn test_driver_reports_disconnect_and_reconnects() {
        let (connector, mut peers) = DuplexConnector::with_peers(2);
        let attempts = Arc::clone(&connector.attempts);
        let (driver, _handle, mut events) =
            LinkDriver::new(Box::new(connector), Duration::from_millis(10), 8);
        let task = tokio::spawn(driver.run());

        assert_eq!(next_event(&mut events).await, LinkEvent::Connected);
        drop(peers.remove(0));
        assert_eq!(next_event(&mut events).await, LinkEvent::Disconnected);
        assert_eq!(next_event(&mut events).await, LinkEvent::Connected);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);

        task.abort();
    }

    #[tokio::test]
    async fn test_driver_stops_when_handle_dropped() {
        let (connector, _peers) = DuplexConnector::with_peers(1);
        let (driver, handle, mut events) =
            LinkDriver::new(Box::new(connector), Duration::from_millis(10), 8);
        let task = tokio::spawn(driver.run());

        assert_eq!(next_event(&mut events).await, LinkEvent::Connected);
        drop(handle);
        assert_ok!(timeout(WAIT, task).await).unwrap();
    }

    #[test]
    fn test_handle_reports_full_queue() {
        let (connector, _peers) = DuplexConnector::with_peers(0);
        let (_driver, handle, _events) = LinkDriver::new(Box::new(connector), Duration::from_millis(10), 1);

        assert!(handle.send(vec![1]));
        assert!(!handle.send(vec![2]));
    }
}
