//! spotdiff-export: Pure output serializers (sans-IO)
//!
//! Turns detection results into the formats consumers read: spot JSON,
//! the aggregated per-stage JSON, a Dart table snippet for the game
//! client, and annotated debug images. Nothing here touches the
//! filesystem.

pub mod annotate;
pub mod dart;
pub mod json;

pub use annotate::{annotate, overlay_mask, render_mask};
pub use dart::{DartMetadata, to_dart};
pub use json::{spots_to_json, stage_results_from_json, stage_results_to_json};
