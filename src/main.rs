// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::atomic::Ordering;

use chrono::Utc;
use clap::Parser;
use log::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt as _, Layer as _, Registry};

use radarsentry::args::Config;
use radarsentry::classify::{classify_gated, Classifier, RuleBasedClassifier};
use radarsentry::fanout::{self, Fanout, MqttConfig, UartConfig};
use radarsentry::filter::{filter_target, GateConfig};
use radarsentry::geo;
use radarsentry::model::{Detection, TrackRecord};
use radarsentry::net::FrameReader;
use radarsentry::tracker::{Tracker, TrackerConfig};
use radarsentry::wire::{self, FrameLossTracker};

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::parse();

    if let Err(err) = config.validate() {
        eprintln!("invalid configuration: {}", err);
        return ExitCode::FAILURE;
    }

    let stdout_log = tracing_subscriber::fmt::layer().with_filter(config.rust_log);
    let subscriber = Registry::default().with(stdout_log);
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
    if let Err(err) = tracing_log::LogTracer::init() {
        eprintln!("failed to bridge log to tracing: {}", err);
        return ExitCode::FAILURE;
    }

    let mqtt = config.send_mqtt.then(|| MqttConfig {
        broker: config.mqtt_broker.clone(),
        port: config.mqtt_port,
        topic: config.mqtt_channel.clone(),
        username: config.mqtt_username.clone(),
        password: config.mqtt_password.clone(),
    });
    let uart = config.send_uart.then(|| UartConfig {
        serial_port: config.serial_port.clone(),
        baud_rate: config.baud_rate,
    });

    let fanout = match fanout::start(mqtt, uart).await {
        Ok(fanout) => fanout,
        Err(err) => {
            error!("fatal sink startup failure: {}", err);
            return ExitCode::FAILURE;
        }
    };

    let bind_addr: SocketAddr = match format!("{}:{}", config.local_ip, config.local_port).parse() {
        Ok(addr) => addr,
        Err(err) => {
            error!("invalid local bind address: {}", err);
            return ExitCode::FAILURE;
        }
    };
    let reader = match FrameReader::bind(bind_addr).await {
        Ok(reader) => reader,
        Err(err) => {
            error!("failed to bind {}: {}", bind_addr, err);
            return ExitCode::FAILURE;
        }
    };
    info!("listening for radar frames on {}", bind_addr);

    let result = run(&config, reader, &fanout).await;
    if let Err(err) = result {
        error!("pipeline loop exited: {}", err);
    }

    let history = fanout.shutdown().await;
    if let Err(err) = fanout::flush_history(&history, &config.output_file) {
        error!("failed to flush history to {}: {}", config.output_file, err);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

/// Reads and processes frames until a shutdown signal arrives.
async fn run(config: &Config, reader: FrameReader, fanout: &Fanout) -> std::io::Result<()> {
    let gate_cfg = GateConfig {
        signal_strength_threshold: config.signal_strength_threshold,
        min_signal_strength: config.min_signal_strength,
        max_signal_strength: config.max_signal_strength,
        max_range_m: config.max_range,
        max_azimuth_deg: config.max_azimuth,
        velocity_gate: config.velocity_gate(),
    };
    let tracker_cfg = TrackerConfig {
        max_distance_m: config.range_threshold,
        miss_limit: config.max_missed_frames,
        max_azimuth_deg: config.max_azimuth as f64,
        anchor_lat_deg: config.radar_lat,
        anchor_lon_deg: config.radar_long,
        ..TrackerConfig::default()
    };

    let classifier = RuleBasedClassifier::default();
    let mut tracker = Tracker::new();
    let mut loss_tracker = FrameLossTracker::new();
    let mut crc_failures: u64 = 0;
    let counters = fanout.counters();

    let mut shutdown = std::pin::pin!(shutdown_signal());

    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => {
                info!(
                    "shutdown requested, crc failures={}, mqtt dropped={}, uart dropped={}",
                    crc_failures,
                    counters.mqtt_dropped.load(Ordering::Relaxed),
                    counters.uart_dropped.load(Ordering::Relaxed)
                );
                return Ok(());
            }
            header = reader.read_header() => {
                let header = match header? {
                    Some(header) if !header.is_empty() => header,
                    _ => continue,
                };

                match process_frame(&reader, &header, config, &gate_cfg, &classifier, &mut tracker, &tracker_cfg, &mut loss_tracker, fanout).await {
                    Ok(()) => {}
                    Err(wire::Error::BadCrc { expected, computed }) => {
                        crc_failures += 1;
                        warn!("frame checksum mismatch: expected {:#x}, computed {:#x}", expected, computed);
                    }
                    Err(err) => warn!("dropping frame: {}", err),
                }
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn process_frame(
    reader: &FrameReader,
    header_bytes: &[u8],
    config: &Config,
    gate_cfg: &GateConfig,
    classifier: &impl Classifier,
    tracker: &mut Tracker,
    tracker_cfg: &TrackerConfig,
    loss_tracker: &mut FrameLossTracker,
    fanout: &Fanout,
) -> Result<(), wire::Error> {
    // A header is always followed by exactly one data-packet datagram,
    // regardless of what `data_packets_expected` declares (see wire::decode_frame).
    let packet = reader.read_data_packet().await?;
    if packet.is_empty() {
        return Ok(());
    }

    let frame = wire::decode_frame(header_bytes, &packet)?;

    if loss_tracker.observe(frame.frame_id) {
        warn!("frame loss detected before frame {}", frame.frame_id);
    }

    let now = Utc::now();
    let mut detections = Vec::new();

    for target in frame.targets.iter().take(frame.targets_reported as usize) {
        let Some(filtered) = filter_target(target, gate_cfg) else {
            continue;
        };

        let projection = geo::project(
            filtered.range_m as f64,
            filtered.azimuth_deg,
            config.radar_lat,
            config.radar_long,
        );

        let label = classify_gated(
            classifier,
            filtered.range_m,
            filtered.velocity_signed,
            filtered.azimuth_deg as f32,
        );

        detections.push(Detection {
            frame_id: frame.frame_id,
            timestamp_utc: now,
            signal_strength_db: filtered.signal_strength_db,
            range_m: filtered.range_m,
            azimuth_deg: filtered.azimuth_deg,
            speed_m_s: filtered.speed_m_s,
            velocity_signed: filtered.velocity_signed,
            direction: filtered.direction,
            x_m: projection.x_m,
            y_m: projection.y_m,
            latitude_deg: projection.latitude_deg,
            longitude_deg: projection.longitude_deg,
            classification_label: label,
        });
    }

    let confirmed = tracker.step(now, tracker_cfg, &detections);
    for track in &confirmed {
        let record = TrackRecord::from_track(track, &config.radar_id, &config.area_id, config.max_azimuth as f64);
        fanout.publish(record).await;
    }

    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {}
        Err(err) => error!("failed to install ctrl-c handler: {}", err),
    }
}
