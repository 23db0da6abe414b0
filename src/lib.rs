// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! RadarSentry
//!
//! Reads the iSYS-5021 FMCW radar's UDP target stream, gates and smooths
//! each detection, projects it into a geodetic fix, classifies it, and
//! tracks it across frames with a multi-target Kalman tracker before
//! fanning the resulting track records out to MQTT, UART, and an in-memory
//! history log.

#![warn(missing_docs)]

/// Runtime configuration and CLI/env argument parsing.
pub mod args;

/// Classifier gateway: a narrow capability interface to an external
/// object-class predictor, with label normalization.
pub mod classify;

/// Output fanout: MQTT, UART, and in-memory History sinks.
pub mod fanout;

/// Per-frame detection filter: gating and smoothing.
pub mod filter;

/// Flat-Earth geodetic projection.
pub mod geo;

/// Shared data model: `Detection`, `Track`, `TrackRecord`.
pub mod model;

/// UDP frame reader.
pub mod net;

/// Multi-target tracker: association, Kalman update, lifecycle.
pub mod tracker;

/// Binary frame layout: header/data-packet decoding and frame-loss tracking.
pub mod wire;
