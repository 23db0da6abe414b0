//! Multi-target tracker: predict, associate, update, quality-score, and
//! birth/death over the tracker's owned set of [`Track`]s.

pub mod kalman;

use chrono::{DateTime, Utc};
use lapjv::{lapjv, Matrix};
use nalgebra::Vector2;

use crate::classify::Label;
use crate::geo;
use crate::model::{Detection, Track, TrackStatus};

const INVALID_MATCH: f32 = 1_000_000.0;
const CLASSIFICATION_BONUS: f32 = 0.2;
const MAX_ACCELERATION_M_S2: f64 = 20.0;

/// Tuning knobs for association, gating, and lifecycle (§4.F, §6.4).
#[derive(Debug, Clone, Copy)]
pub struct TrackerConfig {
    /// Position gating distance, meters (default range 1.0-3.0).
    pub max_distance_m: f64,
    /// Updates required, plus `confidence >= 0.3`, to promote to Confirmed.
    pub hit_threshold: u32,
    /// Consecutive misses before death.
    pub miss_limit: u32,
    /// Wallclock seconds since last match before death.
    pub max_age_sec: i64,
    /// Hard cap on live tracks; lowest-quality tracks are dropped first.
    pub max_tracks: usize,
    /// Resolve association with the Hungarian algorithm; if false, use the
    /// greedy fallback (§4.F allows either).
    pub use_hungarian: bool,
    /// Azimuth clamp applied when back-transforming Kalman state (§4.F
    /// output, matches the detection filter's gate).
    pub max_azimuth_deg: f64,
    /// Radar anchor latitude, degrees, for re-projecting a matched
    /// detection's position after per-track azimuth smoothing.
    pub anchor_lat_deg: f64,
    /// Radar anchor longitude, degrees.
    pub anchor_lon_deg: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        TrackerConfig {
            max_distance_m: 2.0,
            hit_threshold: 3,
            miss_limit: 4,
            max_age_sec: 3,
            max_tracks: 50,
            use_hungarian: true,
            max_azimuth_deg: 75.0,
            anchor_lat_deg: 0.0,
            anchor_lon_deg: 0.0,
        }
    }
}

/// Owns the full set of live tracks and advances them one frame at a time.
#[derive(Debug, Default)]
pub struct Tracker {
    tracks: Vec<Track>,
    next_track_id: u64,
}

impl Tracker {
    /// Creates an empty tracker.
    pub fn new() -> Self {
        Tracker {
            tracks: Vec::new(),
            next_track_id: 1,
        }
    }

    /// Read-only view of all live tracks (Tentative and Confirmed).
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    fn physical_plausibility_ok(track: &Track, displacement: f64) -> bool {
        let speed = track.kalman.velocity().norm();
        let dt = kalman::DT;
        let max_dist = (speed * dt + 0.5 * MAX_ACCELERATION_M_S2 * dt * dt) * 2.0;
        displacement <= max_dist
    }

    fn cost(track: &Track, detection: &Detection, cfg: &TrackerConfig) -> f32 {
        let (mean, cov) = track.kalman.projected_position();
        let measurement = Vector2::new(detection.x_m, detection.y_m);
        let distance = kalman::gating_distance(&mean, &cov, &measurement).sqrt();

        if distance > cfg.max_distance_m {
            return INVALID_MATCH;
        }
        if !Self::physical_plausibility_ok(track, distance) {
            return INVALID_MATCH;
        }

        let mut cost = distance as f32;
        if track.confirmed_label == Some(detection.classification_label) {
            cost -= CLASSIFICATION_BONUS;
        }
        cost
    }

    fn build_cost_matrix(tracks: &[Track], detections: &[Detection], cfg: &TrackerConfig) -> Matrix<f32> {
        let dims = tracks.len().max(detections.len());
        Matrix::from_shape_fn((dims, dims), |(t, d)| {
            if t < tracks.len() && d < detections.len() {
                Self::cost(&tracks[t], &detections[d], cfg)
            } else {
                0.0
            }
        })
    }

    /// Hungarian association: returns, for each track index, the matched
    /// detection index, or `None` if unmatched or gated out.
    fn associate_hungarian(tracks: &[Track], detections: &[Detection], cfg: &TrackerConfig) -> Vec<Option<usize>> {
        let mut result = vec![None; tracks.len()];
        if tracks.is_empty() || detections.is_empty() {
            return result;
        }
        let costs = Self::build_cost_matrix(tracks, detections, cfg);
        let assignment = match lapjv(&costs) {
            Ok(a) => a,
            Err(_) => return result,
        };
        for (t, &d) in assignment.0.iter().enumerate() {
            if t < tracks.len() && d < detections.len() && costs[(t, d)] < INVALID_MATCH {
                result[t] = Some(d);
            }
        }
        result
    }

    /// Greedy association fallback: tracks sorted by confidence descending,
    /// each claims its lowest-cost still-free detection.
    fn associate_greedy(tracks: &[Track], detections: &[Detection], cfg: &TrackerConfig) -> Vec<Option<usize>> {
        let mut result = vec![None; tracks.len()];
        let mut order: Vec<usize> = (0..tracks.len()).collect();
        order.sort_by(|&a, &b| tracks[b].confidence.partial_cmp(&tracks[a].confidence).unwrap());

        let mut taken = vec![false; detections.len()];
        for t in order {
            let mut best: Option<(usize, f32)> = None;
            for (d, detection) in detections.iter().enumerate() {
                if taken[d] {
                    continue;
                }
                let c = Self::cost(&tracks[t], detection, cfg);
                if c >= INVALID_MATCH {
                    continue;
                }
                if best.is_none_or_lower(c) {
                    best = Some((d, c));
                }
            }
            if let Some((d, _)) = best {
                taken[d] = true;
                result[t] = Some(d);
            }
        }
        result
    }

    fn quality(track: &Track, matched: &Detection, predicted_position: Vector2<f64>) -> f32 {
        let measured = Vector2::new(matched.x_m, matched.y_m);
        let pos_err = (measured - predicted_position).norm();
        let pos_consistency = (1.0 - pos_err / 2.0).max(0.0);

        let predicted_speed = track.kalman.velocity().norm();
        let vel_err = (matched.speed_m_s - predicted_speed).abs();
        let vel_consistency = (1.0 - vel_err / 5.0).max(0.0);

        let signal = matched.signal_strength_db as f64 / 100.0;
        let age_factor = (track.age as f64 / 10.0).min(1.0);
        let miss_factor = (1.0 - track.consecutive_misses as f64 / 5.0).max(0.1);

        (0.3 * pos_consistency + 0.3 * vel_consistency + 0.2 * signal + 0.1 * age_factor + 0.1 * miss_factor) as f32
    }

    /// Advances the tracker by one frame: predict all tracks, associate
    /// against `detections`, update matched tracks, age out unmatched
    /// tracks, birth new tracks from unmatched detections, enforce the hard
    /// cap, and return the Confirmed tracks eligible for emission.
    pub fn step(&mut self, now: DateTime<Utc>, cfg: &TrackerConfig, detections: &[Detection]) -> Vec<Track> {
        for track in &mut self.tracks {
            track.kalman.predict();
        }

        let matches = if cfg.use_hungarian {
            Self::associate_hungarian(&self.tracks, detections, cfg)
        } else {
            Self::associate_greedy(&self.tracks, detections, cfg)
        };

        let mut detection_matched = vec![false; detections.len()];
        for (t, matched_d) in matches.into_iter().enumerate() {
            match matched_d {
                Some(d) => {
                    detection_matched[d] = true;
                    let predicted_position = self.tracks[t].kalman.position();

                    // Re-smooth azimuth through this track's own persistent
                    // filter (window survives across frames, unlike a
                    // per-frame scratch filter) and re-project position from
                    // the smoothed value before it feeds the Kalman update.
                    let mut detection = detections[d];
                    let smoothed_azimuth = self.tracks[t].azimuth_filter.filter(detection.azimuth_deg);
                    let projection = geo::project(
                        detection.range_m as f64,
                        smoothed_azimuth,
                        cfg.anchor_lat_deg,
                        cfg.anchor_lon_deg,
                    );
                    detection.azimuth_deg = smoothed_azimuth;
                    detection.x_m = projection.x_m;
                    detection.y_m = projection.y_m;
                    detection.latitude_deg = projection.latitude_deg;
                    detection.longitude_deg = projection.longitude_deg;

                    let r = kalman::adaptive_measurement_noise(detection.signal_strength_db);
                    self.tracks[t]
                        .kalman
                        .update(Vector2::new(detection.x_m, detection.y_m), r);

                    self.tracks[t].age += 1;
                    self.tracks[t].consecutive_misses = 0;
                    self.tracks[t].last_seen = detection.frame_id;
                    self.tracks[t].last_seen_at = detection.timestamp_utc;
                    self.tracks[t].last_signal_strength_db = detection.signal_strength_db;
                    self.tracks[t].push_history(detection);
                    self.tracks[t].vote(detection.classification_label);

                    let quality = Self::quality(&self.tracks[t], &detection, predicted_position);
                    self.tracks[t].confidence = quality;

                    if self.tracks[t].status == TrackStatus::Tentative
                        && self.tracks[t].age >= cfg.hit_threshold
                        && self.tracks[t].confidence >= 0.3
                    {
                        self.tracks[t].status = TrackStatus::Confirmed;
                    }
                }
                None => {
                    self.tracks[t].consecutive_misses += 1;
                }
            }
        }

        for (d, detection) in detections.iter().enumerate() {
            if !detection_matched[d] {
                let track = Track::new(self.next_track_id, detection);
                self.next_track_id += 1;
                self.tracks.push(track);
            }
        }

        self.tracks.retain(|t| {
            let stale = (now - t.last_seen_at).num_seconds() > cfg.max_age_sec;
            let low_confidence = t.confidence < 0.2 && t.age > 5;
            !(t.consecutive_misses >= cfg.miss_limit || stale || low_confidence)
        });

        if self.tracks.len() > cfg.max_tracks {
            self.tracks
                .sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap());
            self.tracks.truncate(cfg.max_tracks);
        }

        self.tracks
            .iter()
            .filter(|t| t.status == TrackStatus::Confirmed)
            .cloned()
            .collect()
    }
}

trait BetterMatch {
    fn is_none_or_lower(&self, candidate: f32) -> bool;
}

impl BetterMatch for Option<(usize, f32)> {
    fn is_none_or_lower(&self, candidate: f32) -> bool {
        match self {
            None => true,
            Some((_, best)) => candidate < *best,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::Direction;

    fn detection(frame_id: u16, x: f64, y: f64) -> Detection {
        Detection {
            frame_id,
            timestamp_utc: Utc::now(),
            signal_strength_db: 30.0,
            range_m: (x * x + y * y).sqrt() as f32,
            azimuth_deg: y.atan2(x).to_degrees(),
            speed_m_s: 5.0,
            velocity_signed: 5.0,
            direction: Direction::Incoming,
            x_m: x,
            y_m: y,
            latitude_deg: 45.0,
            longitude_deg: -93.0,
            classification_label: Label::Vehicle,
        }
    }

    #[test]
    fn track_confirms_after_hit_threshold() {
        let mut tracker = Tracker::new();
        let cfg = TrackerConfig::default();
        let now = Utc::now();

        for frame in 0..4u16 {
            let d = detection(frame, 50.0 + frame as f64 * 0.5, 0.0);
            tracker.step(now, &cfg, &[d]);
        }

        assert_eq!(tracker.tracks().len(), 1);
        assert_eq!(tracker.tracks()[0].status, TrackStatus::Confirmed);
    }

    #[test]
    fn unmatched_track_dies_after_miss_limit() {
        let mut tracker = Tracker::new();
        let cfg = TrackerConfig::default();
        let now = Utc::now();

        for frame in 0..4u16 {
            tracker.step(now, &cfg, &[detection(frame, 50.0, 0.0)]);
        }
        let dead_id = tracker.tracks()[0].track_id;

        for _ in 0..(cfg.miss_limit + 1) {
            tracker.step(now, &cfg, &[]);
        }

        assert!(tracker.tracks().iter().all(|t| t.track_id != dead_id));
    }

    #[test]
    fn hard_cap_keeps_highest_quality_tracks() {
        let mut tracker = Tracker::new();
        let mut cfg = TrackerConfig::default();
        cfg.max_tracks = 5;
        let now = Utc::now();

        let detections: Vec<Detection> = (0..10).map(|i| detection(0, 10.0 * i as f64, 0.0)).collect();
        tracker.step(now, &cfg, &detections);

        assert!(tracker.tracks().len() <= 5);
    }

    #[test]
    fn no_two_live_tracks_share_an_id() {
        let mut tracker = Tracker::new();
        let cfg = TrackerConfig::default();
        let now = Utc::now();
        let detections: Vec<Detection> = (0..5).map(|i| detection(0, 20.0 * i as f64, 0.0)).collect();
        tracker.step(now, &cfg, &detections);

        let mut ids: Vec<u64> = tracker.tracks().iter().map(|t| t.track_id).collect();
        ids.sort_unstable();
        let before = ids.len();
        ids.dedup();
        assert_eq!(before, ids.len());
    }
}
