//! Full node against an in-memory collector.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio::sync::oneshot;
use tokio::time::timeout;

use telemetry_link::clock::Clock;
use telemetry_link::config::Config;
use telemetry_link::error::{Result, TelemetryError};
use telemetry_link::events::{ActuatorHandler, EventHandler};
use telemetry_link::link::{read_frame, Connector, LinkIo};
use telemetry_link::node::Node;
use telemetry_link::protocol::decoder::decode_report_payload;
use telemetry_link::protocol::{decode_frame, encode_frame, Command, Frame};
use telemetry_link::sensor::FixedSensor;

const DEVICE_ID: u32 = 0x0A0B_0C0D;
const COLLECTOR_ID: u32 = 0x0000_CAFE;
const NOW_MS: u64 = 1_700_000_000_000;

struct PipeConnector {
    streams: VecDeque<DuplexStream>,
}

impl PipeConnector {
    fn with_peers(connections: usize) -> (Self, Vec<DuplexStream>) {
        let (streams, peers): (VecDeque<_>, Vec<_>) = (0..connections).map(|_| tokio::io::duplex(64 * 1024)).unzip();
        (Self { streams }, peers)
    }
}

#[async_trait]
impl Connector for PipeConnector {
    async fn connect(&mut self) -> Result<LinkIo> {
        let stream = self
            .streams
            .pop_front()
            .ok_or_else(|| TelemetryError::Link("connection refused".to_string()))?;
        let (reader, writer) = tokio::io::split(stream);
        Ok(LinkIo {
            reader: Box::new(reader),
            writer: Box::new(writer),
        })
    }

    fn describe(&self) -> String {
        "pipe://collector".to_string()
    }
}

struct FrozenClock;

impl Clock for FrozenClock {
    fn now_ms(&self) -> u64 {
        NOW_MS
    }
}

fn test_config() -> Config {
    Config::from_toml(&format!(
        r#"
[device]
id = {}

[link]
reconnect_interval_ms = 10

[report]
tick_interval_ms = 5
"#,
        DEVICE_ID
    ))
    .unwrap()
}

fn node(connector: PipeConnector, handler: Arc<ActuatorHandler>) -> Node {
    let handler: Arc<dyn EventHandler> = handler;
    Node::new(
        &test_config(),
        Box::new(connector),
        Box::new(FrozenClock),
        Box::new(FixedSensor::new(23.5, 55.0, 1200)),
        handler,
    )
}

async fn next_frame(collector: &mut DuplexStream) -> Frame {
    let raw = timeout(Duration::from_secs(5), read_frame(collector))
        .await
        .expect("timed out waiting for a frame")
        .unwrap()
        .expect("node closed the link");
    decode_frame(&raw).unwrap()
}

async fn reply(collector: &mut DuplexStream, command: Command, payload: &[u8]) {
    let frame = encode_frame(command, 0, COLLECTOR_ID, payload).unwrap();
    collector.write_all(&frame).await.unwrap();
}

/// Read frames until one with `command` arrives, answering heartbeats
async fn wait_for(collector: &mut DuplexStream, command: Command) -> Frame {
    loop {
        let frame = next_frame(collector).await;
        if frame.command == command {
            return frame;
        }
        if frame.command == Command::Heartbeat {
            reply(collector, Command::HeartbeatResponse, &[]).await;
        }
    }
}

#[tokio::test]
async fn test_register_report_and_control() {
    let (connector, mut peers) = PipeConnector::with_peers(1);
    let mut collector = peers.remove(0);
    let actuator = Arc::new(ActuatorHandler::new());
    let node = node(connector, Arc::clone(&actuator));
    let session = node.session();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();

    let collector_side = async {
        let request = wait_for(&mut collector, Command::RegistrationRequest).await;
        assert_eq!(request.device_id, DEVICE_ID);
        assert_eq!(request.payload.len(), 8);
        reply(&mut collector, Command::RegistrationAnswer, &[1]).await;

        let report = wait_for(&mut collector, Command::DataReport).await;
        let values = decode_report_payload(&report.payload).unwrap();
        assert_eq!(values.temperature, 23.5);
        assert_eq!(values.humidity, 55.0);
        assert_eq!(values.light, 1200);
        assert_eq!(values.timestamp_ms, NOW_MS);
        assert!(report.sequence > request.sequence);

        reply(&mut collector, Command::ReportAck, &[]).await;
        reply(&mut collector, Command::Control, &[1]).await;

        timeout(Duration::from_secs(5), async {
            while !actuator.is_on() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("actuator never switched on");

        assert!(session.snapshot().is_registered());
        let _ = stop_tx.send(());
    };

    let (sent, ()) = tokio::join!(
        node.run(async {
            let _ = stop_rx.await;
        }),
        collector_side
    );
    assert!(sent >= 2);
}

#[tokio::test]
async fn test_corrupted_answer_is_ignored() {
    let (connector, mut peers) = PipeConnector::with_peers(1);
    let mut collector = peers.remove(0);
    let actuator = Arc::new(ActuatorHandler::new());
    let node = node(connector, Arc::clone(&actuator));
    let session = node.session();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();

    let collector_side = async {
        wait_for(&mut collector, Command::RegistrationRequest).await;

        let mut corrupted = encode_frame(Command::RegistrationAnswer, 0, COLLECTOR_ID, &[1]).unwrap();
        let last = corrupted.len() - 1;
        corrupted[last] ^= 0x5A;
        collector.write_all(&corrupted).await.unwrap();

        // Control before registration must not reach the actuator
        reply(&mut collector, Command::Control, &[1]).await;

        // Still unregistered, so the node asks again
        wait_for(&mut collector, Command::RegistrationRequest).await;
        assert!(!session.snapshot().is_registered());
        assert!(!actuator.is_on());

        reply(&mut collector, Command::RegistrationAnswer, &[1]).await;
        wait_for(&mut collector, Command::DataReport).await;
        assert!(session.snapshot().is_registered());
        let _ = stop_tx.send(());
    };

    tokio::join!(
        node.run(async {
            let _ = stop_rx.await;
        }),
        collector_side
    );
}

#[tokio::test]
async fn test_reregisters_after_reconnect() {
    let (connector, mut peers) = PipeConnector::with_peers(2);
    let mut second = peers.pop().unwrap();
    let mut first = peers.pop().unwrap();
    let actuator = Arc::new(ActuatorHandler::new());
    let node = node(connector, Arc::clone(&actuator));
    let session = node.session();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();

    let collector_side = async {
        wait_for(&mut first, Command::RegistrationRequest).await;
        reply(&mut first, Command::RegistrationAnswer, &[1]).await;
        wait_for(&mut first, Command::DataReport).await;
        drop(first);

        // New connection starts unregistered
        wait_for(&mut second, Command::RegistrationRequest).await;
        reply(&mut second, Command::RegistrationAnswer, &[1]).await;
        reply(&mut second, Command::Control, &[1]).await;

        timeout(Duration::from_secs(5), async {
            while !actuator.is_on() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("actuator never switched on");

        assert!(session.snapshot().is_connected());
        let _ = stop_tx.send(());
    };

    tokio::join!(
        node.run(async {
            let _ = stop_rx.await;
        }),
        collector_side
    );
}
