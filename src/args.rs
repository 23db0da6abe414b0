use std::fmt;

use clap::Parser;
use tracing::level_filters::LevelFilter;

use crate::filter::VelocityGate;

/// Config validation error.
#[derive(Debug)]
pub enum Error {
    /// Both `DETECT_ONLY_STATIC` and `DETECT_ONLY_MOVING` were set.
    ConflictingVelocityGate,
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::ConflictingVelocityGate => {
                write!(f, "DETECT_ONLY_STATIC and DETECT_ONLY_MOVING are mutually exclusive")
            }
        }
    }
}

/// Runtime configuration, immutable after startup and shared read-only
/// across the pipeline (§3, §6.4).
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// UDP bind address for the radar's target stream.
    #[arg(long, env, default_value = "192.168.252.2")]
    pub local_ip: String,

    /// UDP bind port for the radar's target stream.
    #[arg(long, env, default_value = "2050")]
    pub local_port: u16,

    /// Radar anchor latitude, degrees.
    #[arg(long, env, default_value = "0.0")]
    pub radar_lat: f64,

    /// Radar anchor longitude, degrees.
    #[arg(long, env, default_value = "0.0")]
    pub radar_long: f64,

    /// Tag attached to every outbound record.
    #[arg(long, env, default_value = "radar-1")]
    pub radar_id: String,

    /// Tag attached to every outbound record.
    #[arg(long, env, default_value = "area-1")]
    pub area_id: String,

    /// Hard range gate, meters.
    #[arg(long, env, default_value = "150.0")]
    pub max_range: f32,

    /// Hard azimuth magnitude gate, degrees.
    #[arg(long, env, default_value = "75.0")]
    pub max_azimuth: f32,

    /// Single-sided signal-strength gate, dB.
    #[arg(long, env, default_value = "18.0")]
    pub signal_strength_threshold: f32,

    /// Alternate bracket gate lower bound; requires `max_signal_strength`
    /// to also be set to take effect (§9 Open Questions).
    #[arg(long, env)]
    pub min_signal_strength: Option<f32>,

    /// Alternate bracket gate upper bound.
    #[arg(long, env)]
    pub max_signal_strength: Option<f32>,

    /// Drop all but stationary targets.
    #[arg(long, env, default_value = "false")]
    pub detect_only_static: bool,

    /// Drop all but moving targets.
    #[arg(long, env, default_value = "false")]
    pub detect_only_moving: bool,

    /// Tracker position gating distance, meters.
    #[arg(long, env, default_value = "2.0")]
    pub range_threshold: f64,

    /// Retained for configuration-table parity (§6.4); the shipped tracker
    /// gates on position distance rather than azimuth directly.
    #[arg(long, env, default_value = "5.0")]
    pub azimuth_threshold: f64,

    /// Consecutive misses before a track dies.
    #[arg(long, env, default_value = "4")]
    pub max_missed_frames: u32,

    /// Enable the MQTT sink.
    #[arg(long, env, default_value = "false")]
    pub send_mqtt: bool,

    /// Enable the UART sink.
    #[arg(long, env, default_value = "false")]
    pub send_uart: bool,

    /// MQTT broker hostname.
    #[arg(long, env, default_value = "localhost")]
    pub mqtt_broker: String,

    /// MQTT broker port.
    #[arg(long, env, default_value = "1883")]
    pub mqtt_port: u16,

    /// MQTT topic for outbound track records.
    #[arg(long, env, default_value = "radar/tracks")]
    pub mqtt_channel: String,

    /// MQTT username, if the broker requires authentication.
    #[arg(long, env)]
    pub mqtt_username: Option<String>,

    /// MQTT password, if the broker requires authentication.
    #[arg(long, env)]
    pub mqtt_password: Option<String>,

    /// Serial device path for the UART sink.
    #[arg(long, env, default_value = "/dev/ttyUSB0")]
    pub serial_port: String,

    /// Serial baud rate for the UART sink.
    #[arg(long, env, default_value = "115200")]
    pub baud_rate: u32,

    /// Path History is flushed to on shutdown.
    #[arg(long, env, default_value = "history.json")]
    pub output_file: String,

    /// Application log level.
    #[arg(long, env, default_value = "info")]
    pub rust_log: LevelFilter,
}

impl Config {
    /// Validates cross-field invariants that `clap` cannot express.
    pub fn validate(&self) -> Result<(), Error> {
        if self.detect_only_static && self.detect_only_moving {
            return Err(Error::ConflictingVelocityGate);
        }
        Ok(())
    }

    /// Resolves the configured velocity gate.
    pub fn velocity_gate(&self) -> VelocityGate {
        if self.detect_only_moving {
            VelocityGate::MovingOnly
        } else if self.detect_only_static {
            VelocityGate::StaticOnly
        } else {
            VelocityGate::Any
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflicting_velocity_gate_rejected() {
        let mut cfg = Config::parse_from(["radarsentry"]);
        cfg.detect_only_static = true;
        cfg.detect_only_moving = true;
        assert!(cfg.validate().is_err());
    }
}
