//! Pipeline diagnostics: timing, counts, and other metrics for each stage.
//!
//! These diagnostics are permanent instrumentation intended for
//! threshold tuning. [`detect_with_diagnostics`] runs the staged
//! pipeline and records what each stage did alongside its result.
//!
//! Time is read through the [`Clock`] trait so this crate stays free of
//! platform timing concerns; the CLI supplies a `std::time::Instant`
//! clock and tests supply a fake one.
//!
//! Durations are serialized as fractional seconds (`f64`) for JSON
//! compatibility, since `std::time::Duration` does not implement serde
//! traits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::mask::{ChannelCounts, count_on};
use crate::pipeline::{Pipeline, STAGE_NAMES};
use crate::profile::ParameterProfile;
use crate::types::{ImagePair, PipelineError, StagedResult};

/// Source of monotonic timestamps.
pub trait Clock {
    /// Opaque timestamp type.
    type Instant;

    /// The current instant.
    fn now(&self) -> Self::Instant;

    /// Time elapsed since `since`.
    fn elapsed(&self, since: &Self::Instant) -> Duration;
}

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom("duration seconds must be finite and non-negative")
        })
    }
}

/// Diagnostics collected from a single pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDiagnostics {
    /// Per-stage diagnostics in execution order.
    pub stages: Vec<StageDiagnostics>,
    /// Total wall-clock duration of the run (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
    /// Summary counts across all stages.
    pub summary: PipelineSummary,
}

/// Diagnostics for a single pipeline stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDiagnostics {
    /// Stage name, one of [`STAGE_NAMES`].
    pub name: String,
    /// Wall-clock duration of this stage (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Stage-specific metrics.
    pub metrics: StageMetrics,
}

/// Stage-specific metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StageMetrics {
    Smooth {
        /// Effective (odd) kernel size.
        kernel_size: u32,
        /// Gaussian sigma derived from the kernel size.
        sigma: f32,
    },
    Difference {
        /// Pixels switched on by each channel.
        channels: ChannelCounts,
        /// Pixels on in the union.
        on_pixels: u64,
        /// Total pixel count, for density.
        total_pixels: u64,
    },
    Clean {
        /// On pixels before morphology.
        on_before: u64,
        /// On pixels after morphology.
        on_after: u64,
    },
    Extract {
        /// Regions that survived the size filters.
        region_count: usize,
        /// Summed filled area of those regions.
        total_area: u64,
    },
    Consolidate {
        /// Strategy used, as its debug name.
        strategy: String,
        /// Boxes going in.
        input_boxes: usize,
        /// Boxes coming out.
        output_boxes: usize,
    },
    Normalize {
        /// Spots produced.
        spot_count: usize,
    },
}

/// High-level summary counts for the entire run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSummary {
    pub image_width: u32,
    pub image_height: u32,
    pub pixel_count: u64,
    pub region_count: usize,
    pub spot_count: usize,
}

impl PipelineDiagnostics {
    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Pipeline Diagnostics Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Image: {}x{} ({} pixels)",
            self.summary.image_width, self.summary.image_height, self.summary.pixel_count,
        ));
        lines.push(format!(
            "Total duration: {:.3}ms",
            duration_ms(self.total_duration),
        ));
        lines.push(String::new());

        lines.push(format!(
            "{:<16} {:>10} {:>10}  {}",
            "Stage", "Duration", "% Total", "Details"
        ));
        lines.push("-".repeat(80));

        let total_ms = duration_ms(self.total_duration);
        for stage in &self.stages {
            let ms = duration_ms(stage.duration);
            let pct = if total_ms > 0.0 {
                ms / total_ms * 100.0
            } else {
                0.0
            };
            let details = format_metrics(&stage.metrics);
            lines.push(format!("{:<16} {ms:>8.3}ms {pct:>9.1}%  {details}", stage.name));
        }

        lines.push(String::new());
        lines.push(format!(
            "Regions: {}  |  Spots: {}",
            self.summary.region_count, self.summary.spot_count,
        ));

        lines.join("\n")
    }
}

/// Convert a `Duration` to milliseconds as `f64`.
fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Format stage metrics into a compact detail string.
fn format_metrics(metrics: &StageMetrics) -> String {
    match metrics {
        StageMetrics::Smooth { kernel_size, sigma } => {
            format!("kernel={kernel_size} sigma={sigma:.2}")
        }
        StageMetrics::Difference {
            channels,
            on_pixels,
            total_pixels,
        } => {
            #[allow(clippy::cast_precision_loss)]
            let density = if *total_pixels > 0 {
                *on_pixels as f64 / *total_pixels as f64 * 100.0
            } else {
                0.0
            };
            format!(
                "on={on_pixels} ({density:.2}%) luma={} hue={} sat={} lab={}",
                channels.luma, channels.hue, channels.saturation, channels.perceptual,
            )
        }
        StageMetrics::Clean {
            on_before,
            on_after,
        } => format!("{on_before}->{on_after} px"),
        StageMetrics::Extract {
            region_count,
            total_area,
        } => format!("{region_count} regions, {total_area} px"),
        StageMetrics::Consolidate {
            strategy,
            input_boxes,
            output_boxes,
        } => format!("{strategy} {input_boxes}->{output_boxes} boxes"),
        StageMetrics::Normalize { spot_count } => format!("{spot_count} spots"),
    }
}

/// Run the staged pipeline, timing each stage with `clock`.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidConfig`] if the profile is invalid.
pub fn detect_with_diagnostics<C: Clock>(
    pair: ImagePair,
    profile: ParameterProfile,
    clock: &C,
) -> Result<(StagedResult, PipelineDiagnostics), PipelineError> {
    let total_start = clock.now();
    let dims = pair.dimensions();
    let kernel_size = crate::blur::effective_kernel_size(profile.blur_kernel_size);
    let strategy = format!("{:?}", profile.consolidation);

    let pending = Pipeline::new(pair, profile)?;
    let mut stages = Vec::with_capacity(STAGE_NAMES.len());
    let mut record = |index: usize, start: C::Instant, metrics: StageMetrics| {
        stages.push(StageDiagnostics {
            name: STAGE_NAMES[index].to_string(),
            duration: clock.elapsed(&start),
            metrics,
        });
    };

    let start = clock.now();
    let smoothed = pending.smooth();
    record(
        0,
        start,
        StageMetrics::Smooth {
            kernel_size,
            sigma: if kernel_size > 1 {
                crate::blur::sigma_for_kernel(kernel_size)
            } else {
                0.0
            },
        },
    );

    let start = clock.now();
    let differenced = smoothed.difference();
    let on_before = count_on(differenced.raw_mask());
    record(
        1,
        start,
        StageMetrics::Difference {
            channels: differenced.channel_counts(),
            on_pixels: on_before,
            total_pixels: dims.pixel_count(),
        },
    );

    let start = clock.now();
    let cleaned = differenced.clean();
    record(
        2,
        start,
        StageMetrics::Clean {
            on_before,
            on_after: count_on(cleaned.mask()),
        },
    );

    let start = clock.now();
    let extracted = cleaned.extract();
    let region_count = extracted.regions().len();
    record(
        3,
        start,
        StageMetrics::Extract {
            region_count,
            total_area: extracted.regions().iter().map(|r| r.area).sum(),
        },
    );

    let start = clock.now();
    let consolidated = extracted.consolidate();
    record(
        4,
        start,
        StageMetrics::Consolidate {
            strategy,
            input_boxes: region_count,
            output_boxes: consolidated.boxes().len(),
        },
    );

    let start = clock.now();
    let normalized = consolidated.normalize();
    let spot_count = normalized.spots().len();
    record(5, start, StageMetrics::Normalize { spot_count });

    let diagnostics = PipelineDiagnostics {
        stages,
        total_duration: clock.elapsed(&total_start),
        summary: PipelineSummary {
            image_width: dims.width,
            image_height: dims.height,
            pixel_count: dims.pixel_count(),
            region_count,
            spot_count,
        },
    };
    Ok((normalized.into_result(), diagnostics))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::cell::Cell;

    use super::*;

    /// Clock that advances one millisecond per reading.
    struct TickClock(Cell<u64>);

    impl Clock for TickClock {
        type Instant = u64;

        fn now(&self) -> u64 {
            let t = self.0.get() + 1;
            self.0.set(t);
            t
        }

        fn elapsed(&self, since: &u64) -> Duration {
            Duration::from_millis(self.now() - since)
        }
    }

    fn pair() -> ImagePair {
        let original = image::RgbImage::from_pixel(60, 60, image::Rgb([255, 255, 255]));
        let mut altered = original.clone();
        for y in 10..30 {
            for x in 10..30 {
                altered.put_pixel(x, y, image::Rgb([255, 0, 0]));
            }
        }
        ImagePair::reconciled(original, altered)
    }

    #[test]
    fn duration_ms_converts_correctly() {
        let ms = duration_ms(Duration::from_millis(1234));
        assert!((ms - 1234.0).abs() < 0.01);
    }

    #[test]
    fn records_every_stage_in_order() {
        let clock = TickClock(Cell::new(0));
        let (staged, diag) =
            detect_with_diagnostics(pair(), ParameterProfile::default(), &clock).unwrap();

        let names: Vec<&str> = diag.stages.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, STAGE_NAMES);
        assert_eq!(diag.summary.spot_count, staged.spots.len());
        assert_eq!(diag.summary.pixel_count, 3600);
        assert!(diag.stages.iter().all(|s| s.duration > Duration::ZERO));
        assert!(diag.total_duration > Duration::ZERO);
    }

    #[test]
    fn invalid_profile_surfaces_error() {
        let clock = TickClock(Cell::new(0));
        let profile = ParameterProfile {
            channels: crate::profile::SignalChannels::NONE,
            ..ParameterProfile::default()
        };
        assert!(detect_with_diagnostics(pair(), profile, &clock).is_err());
    }

    #[test]
    fn report_mentions_stages_and_counts() {
        let clock = TickClock(Cell::new(0));
        let (_, diag) =
            detect_with_diagnostics(pair(), ParameterProfile::default(), &clock).unwrap();
        let report = diag.report();
        assert!(report.contains("Pipeline Diagnostics Report"));
        assert!(report.contains("consolidate"));
        assert!(report.contains("PruneThenMerge"));
        assert!(report.contains("Spots: 1"));
    }

    #[test]
    fn diagnostics_serialize_durations_as_seconds() {
        let clock = TickClock(Cell::new(0));
        let (_, diag) =
            detect_with_diagnostics(pair(), ParameterProfile::default(), &clock).unwrap();
        let json = serde_json::to_value(&diag).unwrap();
        assert!(json["total_duration"].is_f64());
        let back: PipelineDiagnostics = serde_json::from_value(json).unwrap();
        assert_eq!(back.stages.len(), STAGE_NAMES.len());
    }
}
