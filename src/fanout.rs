//! Output fanout: MQTT, UART, and in-memory History sinks, each behind a
//! bounded queue on its own task so a slow or failed sink never blocks the
//! pipeline (§4.G, §5).

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use kanal::{bounded_async, AsyncReceiver, AsyncSender};
use log::{error, info, warn};
use rumqttc::{AsyncClient, ConnectionError, Event, MqttOptions, Outgoing, Packet, QoS};
use tokio::io::AsyncWriteExt;
use tokio_serial::SerialPortBuilderExt;

use crate::model::TrackRecord;

const SINK_QUEUE_DEPTH: usize = 256;

/// Per-sink dropped-record counters, surfaced for diagnostics (§7).
#[derive(Debug, Default)]
pub struct FanoutCounters {
    /// Records dropped by the MQTT sink on transient publish failure.
    pub mqtt_dropped: AtomicU64,
    /// Records dropped by the UART sink on timeout/would-block.
    pub uart_dropped: AtomicU64,
}

/// A handle the lifecycle controller holds to enqueue records onto each
/// enabled sink, and to drain/shut them down.
pub struct Fanout {
    mqtt_tx: Option<AsyncSender<TrackRecord>>,
    uart_tx: Option<AsyncSender<TrackRecord>>,
    history_tx: AsyncSender<TrackRecord>,
    history_handle: tokio::task::JoinHandle<Vec<TrackRecord>>,
    counters: Arc<FanoutCounters>,
}

impl Fanout {
    /// Enqueues one record onto every enabled sink. Never blocks: a full
    /// queue causes the record to be dropped for that sink (backpressure is
    /// drop, not stall, per §4.G/§9).
    pub async fn publish(&self, record: TrackRecord) {
        if let Some(tx) = &self.mqtt_tx {
            match tx.try_send(record.clone()) {
                Ok(true) => {}
                Ok(false) | Err(_) => {
                    self.counters.mqtt_dropped.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
        if let Some(tx) = &self.uart_tx {
            match tx.try_send(record.clone()) {
                Ok(true) => {}
                Ok(false) | Err(_) => {
                    self.counters.uart_dropped.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
        let _ = self.history_tx.send(record).await;
    }

    /// Shared dropped-record counters.
    pub fn counters(&self) -> Arc<FanoutCounters> {
        self.counters.clone()
    }

    /// Closes the sink queues, waits out a short grace period for sinks to
    /// drain, then collects History and returns it for the shutdown dump
    /// (§4.H, §5).
    pub async fn shutdown(self) -> Vec<TrackRecord> {
        drop(self.mqtt_tx);
        drop(self.uart_tx);
        self.history_tx.close();
        tokio::time::sleep(Duration::from_millis(500)).await;
        self.history_handle.await.unwrap_or_default()
    }
}

/// MQTT sink configuration (§6.2, §6.4).
#[derive(Debug, Clone)]
pub struct MqttConfig {
    pub broker: String,
    pub port: u16,
    pub topic: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// UART sink configuration (§6.4).
#[derive(Debug, Clone)]
pub struct UartConfig {
    pub serial_port: String,
    pub baud_rate: u32,
}

/// Builds the fanout, starting one task per enabled sink.
///
/// A fatal MQTT auth/connect failure at startup causes this function to
/// return `Err`, which the caller must treat as fatal (`exit(1)`, §4.G/§7).
pub async fn start(
    mqtt: Option<MqttConfig>,
    uart: Option<UartConfig>,
) -> Result<Fanout, io::Error> {
    let counters = Arc::new(FanoutCounters::default());

    let mqtt_tx = match mqtt {
        Some(cfg) => Some(spawn_mqtt_sink(cfg, counters.clone()).await?),
        None => None,
    };

    let uart_tx = match uart {
        Some(cfg) => Some(spawn_uart_sink(cfg, counters.clone())?),
        None => None,
    };

    let (history_tx, history_rx) = bounded_async::<TrackRecord>(SINK_QUEUE_DEPTH);
    let history_handle = tokio::spawn(history_task(history_rx));

    Ok(Fanout {
        mqtt_tx,
        uart_tx,
        history_tx,
        history_handle,
        counters,
    })
}

async fn spawn_mqtt_sink(
    cfg: MqttConfig,
    counters: Arc<FanoutCounters>,
) -> Result<AsyncSender<TrackRecord>, io::Error> {
    let mut options = MqttOptions::new("radarsentry", cfg.broker.clone(), cfg.port);
    options.set_keep_alive(Duration::from_secs(30));
    if let (Some(user), Some(pass)) = (&cfg.username, &cfg.password) {
        options.set_credentials(user.clone(), pass.clone());
    }

    let (client, mut eventloop) = AsyncClient::new(options, SINK_QUEUE_DEPTH);

    // Drive the connection once, synchronously, so an auth failure at
    // startup is fatal per §4.G rather than silently retried forever.
    match tokio::time::timeout(Duration::from_secs(5), eventloop.poll()).await {
        Ok(Ok(Event::Incoming(Packet::ConnAck(ack)))) => {
            if !ack.session_present && ack.code != rumqttc::ConnectReturnCode::Success {
                return Err(io::Error::new(io::ErrorKind::PermissionDenied, "mqtt auth failure"));
            }
        }
        Ok(Ok(_)) => {}
        Ok(Err(ConnectionError::Io(err))) => return Err(err),
        Ok(Err(err)) => return Err(io::Error::new(io::ErrorKind::Other, err.to_string())),
        Err(_elapsed) => return Err(io::Error::new(io::ErrorKind::TimedOut, "mqtt connect timeout")),
    }

    let (tx, rx) = bounded_async::<TrackRecord>(SINK_QUEUE_DEPTH);

    tokio::spawn(mqtt_eventloop_task(eventloop));
    tokio::spawn(mqtt_publish_task(client, cfg.topic, rx, counters));

    Ok(tx)
}

async fn mqtt_eventloop_task(mut eventloop: rumqttc::EventLoop) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Outgoing(Outgoing::Disconnect)) => break,
            Ok(_) => {}
            Err(err) => {
                warn!("mqtt connection dropped, auto-reconnecting: {}", err);
            }
        }
    }
}

async fn mqtt_publish_task(
    client: AsyncClient,
    topic: String,
    rx: AsyncReceiver<TrackRecord>,
    counters: Arc<FanoutCounters>,
) {
    while let Ok(record) = rx.recv().await {
        let payload = match serde_json::to_vec(&record) {
            Ok(bytes) => bytes,
            Err(err) => {
                error!("failed to serialize track record: {}", err);
                counters.mqtt_dropped.fetch_add(1, Ordering::Relaxed);
                continue;
            }
        };
        if client.publish(&topic, QoS::AtMostOnce, false, payload).await.is_err() {
            counters.mqtt_dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
    let _ = client.disconnect().await;
}

fn spawn_uart_sink(cfg: UartConfig, counters: Arc<FanoutCounters>) -> Result<AsyncSender<TrackRecord>, io::Error> {
    let port = tokio_serial::new(&cfg.serial_port, cfg.baud_rate)
        .timeout(Duration::from_secs(1))
        .open_native_async()?;

    let (tx, rx) = bounded_async::<TrackRecord>(SINK_QUEUE_DEPTH);
    tokio::spawn(uart_task(port, rx, counters));
    Ok(tx)
}

async fn uart_task(mut port: tokio_serial::SerialStream, rx: AsyncReceiver<TrackRecord>, counters: Arc<FanoutCounters>) {
    while let Ok(record) = rx.recv().await {
        let mut line = match serde_json::to_vec(&record) {
            Ok(bytes) => bytes,
            Err(err) => {
                error!("failed to serialize track record: {}", err);
                counters.uart_dropped.fetch_add(1, Ordering::Relaxed);
                continue;
            }
        };
        line.push(b'\n');

        match tokio::time::timeout(Duration::from_secs(1), port.write_all(&line)).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) | Err(_) => {
                counters.uart_dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

async fn history_task(rx: AsyncReceiver<TrackRecord>) -> Vec<TrackRecord> {
    let mut history = Vec::new();
    while let Ok(record) = rx.recv().await {
        history.push(record);
    }
    history
}

/// Serializes `history` as a pretty-printed JSON array to `path` (§4.G,
/// §6.5).
pub fn flush_history(history: &[TrackRecord], path: &str) -> io::Result<()> {
    let json = serde_json::to_string_pretty(history)?;
    std::fs::write(path, json)?;
    info!("wrote {} records to {}", history.len(), path);
    Ok(())
}
