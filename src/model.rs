//! Shared data model: the post-filter `Detection` and persistent `Track`
//! records that flow between components C, D, E, F and G.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};

use crate::classify::Label;
use crate::filter::{AngleFilter, Direction};

/// A filtered, smoothed, projected, classified target — the unit of work
/// the tracker consumes each frame.
#[derive(Debug, Clone, Copy)]
pub struct Detection {
    /// Frame the detection was produced from.
    pub frame_id: u16,
    /// Wall-clock time the frame was processed.
    pub timestamp_utc: DateTime<Utc>,
    /// Signal strength, dB.
    pub signal_strength_db: f32,
    /// Range, meters.
    pub range_m: f32,
    /// Smoothed azimuth, degrees.
    pub azimuth_deg: f64,
    /// Kalman-smoothed absolute speed, m/s.
    pub speed_m_s: f64,
    /// Raw signed velocity, m/s.
    pub velocity_signed: f32,
    /// Direction derived from the sign of the raw velocity.
    pub direction: Direction,
    /// East-component Cartesian offset, meters.
    pub x_m: f64,
    /// North-component Cartesian offset, meters.
    pub y_m: f64,
    /// Projected latitude, degrees.
    pub latitude_deg: f64,
    /// Projected longitude, degrees.
    pub longitude_deg: f64,
    /// Gateway-normalized classification label.
    pub classification_label: Label,
}

/// Track lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackStatus {
    /// Not yet promoted; not eligible for emission.
    Tentative,
    /// Promoted; eligible for emission each frame it is updated.
    Confirmed,
}

/// Ring buffer of a track's most recent detections (`N = 16`, §3).
pub const TRACK_HISTORY_LEN: usize = 16;

/// A persistent multi-frame identity with its own Kalman state and
/// quality. Owned exclusively by the tracker; all outbound views are value
/// copies (§3).
#[derive(Debug, Clone)]
pub struct Track {
    /// Stable identifier, never reused within a process lifetime.
    pub track_id: u64,
    /// 6-state Kalman filter: `(x, y, vx, vy, ax, ay)`.
    pub kalman: crate::tracker::kalman::TrackKalman,
    /// Lifecycle state.
    pub status: TrackStatus,
    /// Frame the track was first observed.
    pub first_seen: u16,
    /// Frame the track was last matched.
    pub last_seen: u16,
    /// Wall-clock time of the last match, for `max_age_sec` death.
    pub last_seen_at: DateTime<Utc>,
    /// Number of updates (matched frames) since birth.
    pub age: u32,
    /// Consecutive unmatched frames.
    pub consecutive_misses: u32,
    /// Per-label vote histogram for classification voting.
    pub classification_votes: HashMap<Label, u32>,
    /// Order votes were cast in, for most-recent-vote tie-breaking.
    pub vote_order: Vec<Label>,
    /// Argmax of `classification_votes` once `age >= 3`.
    pub confirmed_label: Option<Label>,
    /// Quality score in `[0, 1]`.
    pub confidence: f32,
    /// Most recent detections associated with this track.
    pub history: VecDeque<Detection>,
    /// Last matched detection's signal strength, used for adaptive `R`.
    pub last_signal_strength_db: f32,
    /// Per-track wrap-safe azimuth smoother, persisted across frames.
    pub azimuth_filter: AngleFilter,
}

impl Track {
    /// Creates a new Tentative track from an unmatched detection.
    pub fn new(track_id: u64, detection: &Detection) -> Self {
        let mut history = VecDeque::with_capacity(TRACK_HISTORY_LEN);
        history.push_back(*detection);
        let mut azimuth_filter = AngleFilter::default_window();
        azimuth_filter.filter(detection.azimuth_deg);
        let mut track = Track {
            track_id,
            kalman: crate::tracker::kalman::TrackKalman::new(detection.x_m, detection.y_m),
            status: TrackStatus::Tentative,
            first_seen: detection.frame_id,
            last_seen: detection.frame_id,
            last_seen_at: detection.timestamp_utc,
            age: 1,
            consecutive_misses: 0,
            classification_votes: HashMap::new(),
            vote_order: Vec::new(),
            confirmed_label: None,
            confidence: 0.0,
            history,
            last_signal_strength_db: detection.signal_strength_db,
            azimuth_filter,
        };
        track.vote(detection.classification_label);
        track
    }

    /// Pushes `detection` into the bounded history ring.
    pub fn push_history(&mut self, detection: Detection) {
        if self.history.len() == TRACK_HISTORY_LEN {
            self.history.pop_front();
        }
        self.history.push_back(detection);
    }

    /// Casts a classification vote; after 3 updates `confirmed_label`
    /// becomes the argmax, ties broken by most recent vote.
    pub fn vote(&mut self, label: Label) {
        *self.classification_votes.entry(label).or_insert(0) += 1;
        self.vote_order.push(label);
        if self.age >= 3 {
            let max_count = self.classification_votes.values().copied().max().unwrap_or(0);
            self.confirmed_label = self
                .vote_order
                .iter()
                .rev()
                .find(|l| self.classification_votes.get(l).copied().unwrap_or(0) == max_count)
                .copied();
        }
    }

    /// Back-transforms the Kalman state into polar form for emission:
    /// `(range, azimuth, speed, velocity_signed)`. `velocity_signed` is the
    /// negative of the range's rate of change, so a closing target (range
    /// shrinking) reads positive, matching [`Direction::Incoming`].
    pub fn polar(&self, max_azimuth_deg: f64) -> (f64, f64, f64, f64) {
        let pos = self.kalman.position();
        let vel = self.kalman.velocity();
        let range = (pos.x * pos.x + pos.y * pos.y).sqrt();
        let azimuth = pos.y.atan2(pos.x).to_degrees().clamp(-max_azimuth_deg, max_azimuth_deg);
        let speed = (vel.x * vel.x + vel.y * vel.y).sqrt();
        let velocity_signed = if range > 1e-6 {
            -(vel.x * pos.x + vel.y * pos.y) / range
        } else {
            0.0
        };
        (range, azimuth, speed, velocity_signed)
    }
}

/// The canonical outbound track record (§6.3), rounded per spec: 2 decimals
/// except lat/lon (6) and confidence (3).
#[derive(Debug, Clone, serde::Serialize)]
pub struct TrackRecord {
    pub radar_id: String,
    pub area_id: String,
    pub frame_id: u16,
    pub timestamp: DateTime<Utc>,
    pub signal_strength: f64,
    pub range: f64,
    pub speed: f64,
    pub velocity: f64,
    pub direction: Direction,
    pub classification: Label,
    pub latitude: f64,
    pub longitude: f64,
    pub x: f64,
    pub y: f64,
    pub azimuth_angle: f64,
    pub track_id: u64,
    pub confidence: f64,
    pub age: u32,
    pub consecutive_misses: u32,
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

impl TrackRecord {
    /// Builds a record from a track and its most recent detection, applying
    /// the schema's rounding rules.
    pub fn from_track(track: &Track, radar_id: &str, area_id: &str, max_azimuth_deg: f64) -> Self {
        let detection = track.history.back().expect("track always has history");
        let (range, azimuth, speed, velocity_signed) = track.polar(max_azimuth_deg);
        let pos = track.kalman.position();
        TrackRecord {
            radar_id: radar_id.to_string(),
            area_id: area_id.to_string(),
            frame_id: track.last_seen,
            timestamp: detection.timestamp_utc,
            signal_strength: round_to(detection.signal_strength_db as f64, 2),
            range: round_to(range, 2),
            speed: round_to(speed, 2),
            velocity: round_to(velocity_signed, 2),
            direction: detection.direction,
            classification: track.confirmed_label.unwrap_or(Label::Unknown),
            latitude: round_to(detection.latitude_deg, 6),
            longitude: round_to(detection.longitude_deg, 6),
            x: round_to(pos.x, 2),
            y: round_to(pos.y, 2),
            azimuth_angle: round_to(azimuth, 2),
            track_id: track.track_id,
            confidence: round_to(track.confidence as f64, 3),
            age: track.age,
            consecutive_misses: track.consecutive_misses,
        }
    }
}
