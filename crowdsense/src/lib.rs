// THEORY:
// This file is the main entry point for the `crowdsense` library crate. It exposes
// the alerting engine that sits behind an object detector: per-frame detections go
// in, debounced alert events and a render state come out.
//
// The primary goal is to export the `FrameProcessor` (one stream, synchronous) and
// the `StreamHub` (many streams, one tokio task each) as the high-level interface.
// The stateful building blocks live in `core_modules` and are public so a caller can
// compose them differently, but most consumers only need `pipeline`.

pub mod config;
pub mod core_modules;
pub mod error;
pub mod pipeline;
pub mod stream_hub;
