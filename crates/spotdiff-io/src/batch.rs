//! Batch processing of an asset directory.
//!
//! Stage images follow the `<level>-<stage>.png` / `<level>-<stage>-wrong.png`
//! naming. Pairs are discovered, sorted naturally (`1-2` before `1-10`),
//! processed in parallel, and folded into a [`StageResults`] map. A pair
//! that fails is logged and reported; the rest of the batch continues.

use std::path::{Path, PathBuf};

use rayon::prelude::*;
use spotdiff_pipeline::{ParameterProfile, PipelineError, Spot, StageResults, detect_pair};

use crate::error::{InputError, OutputError};
use crate::input::load_pair;
use crate::output::{OutputOptions, write_stage_outputs};

/// File stem suffix marking the altered image of a pair.
pub const ALTERED_SUFFIX: &str = "-wrong";

/// One discovered stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagePair {
    /// Stage id, the original's file stem.
    pub stage: String,
    pub original: PathBuf,
    pub altered: PathBuf,
}

/// Where and what to write while processing a batch.
#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    /// Per-stage outputs go here. `None` keeps results in memory only.
    pub output_dir: Option<PathBuf>,
    pub outputs: OutputOptions,
}

/// A stage that could not be processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchFailure {
    pub stage: String,
    pub error: String,
}

/// Outcome of [`run_batch`].
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    /// Spots per successfully processed stage.
    pub results: StageResults,
    /// Stages that failed, in discovery order.
    pub failures: Vec<BatchFailure>,
}

impl BatchReport {
    /// Whether every stage succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Total spots across all stages.
    #[must_use]
    pub fn spot_count(&self) -> usize {
        self.results.values().map(Vec::len).sum()
    }
}

#[derive(Debug, thiserror::Error)]
enum PairError {
    #[error(transparent)]
    Input(#[from] InputError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error(transparent)]
    Output(#[from] OutputError),
}

/// Parse a leading run of ASCII digits.
fn leading_number(s: &str) -> Option<(u64, &str)> {
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    if end == 0 {
        return None;
    }
    Some((s[..end].parse().ok()?, &s[end..]))
}

/// Sort key for `<level>-<stage>` ids. Ids that do not start with that
/// pattern sort first as `(0, 0)`.
#[must_use]
pub fn natural_key(stage: &str) -> (u64, u64) {
    leading_number(stage)
        .and_then(|(level, rest)| {
            let (index, _) = leading_number(rest.strip_prefix('-')?)?;
            Some((level, index))
        })
        .unwrap_or((0, 0))
}

/// Find every `<stage>.png` in `dir` that has a `<stage>-wrong.png`
/// sibling, sorted by [`natural_key`] then by name.
///
/// Originals without an altered counterpart are skipped with a warning.
///
/// # Errors
///
/// Returns [`InputError::NotFound`] if `dir` does not exist, or
/// [`InputError::Read`] if it cannot be listed.
pub fn discover_pairs(dir: &Path) -> Result<Vec<StagePair>, InputError> {
    let read_err = |source: std::io::Error| match source.kind() {
        std::io::ErrorKind::NotFound => InputError::NotFound(dir.to_path_buf()),
        _ => InputError::Read {
            path: dir.to_path_buf(),
            source,
        },
    };

    let mut pairs = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(read_err)? {
        let path = entry.map_err(read_err)?.path();
        let is_png = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("png"));
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if !is_png || !path.is_file() || stem.contains(ALTERED_SUFFIX) {
            continue;
        }

        let altered = dir.join(format!("{stem}{ALTERED_SUFFIX}.png"));
        if altered.is_file() {
            pairs.push(StagePair {
                stage: stem.to_owned(),
                original: path.clone(),
                altered,
            });
        } else {
            tracing::warn!(stage = stem, "no altered image, skipping");
        }
    }

    pairs.sort_by(|a, b| {
        natural_key(&a.stage)
            .cmp(&natural_key(&b.stage))
            .then_with(|| a.stage.cmp(&b.stage))
    });
    Ok(pairs)
}

fn process_pair(
    pair: &StagePair,
    profile: &ParameterProfile,
    options: &BatchOptions,
) -> Result<Vec<Spot>, PairError> {
    let images = load_pair(&pair.original, &pair.altered)?;
    let staged = detect_pair(images, profile)?;
    if let Some(dir) = &options.output_dir {
        write_stage_outputs(dir, &pair.stage, &staged, profile, options.outputs)?;
    }
    Ok(staged.spots)
}

/// Run every pair through the pipeline in parallel.
///
/// The profile is validated once up front; nothing is read before that.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidConfig`] if `profile` is invalid.
/// Per-pair failures do not abort the batch; they are collected in
/// [`BatchReport::failures`].
pub fn run_batch(
    pairs: &[StagePair],
    profile: &ParameterProfile,
    options: &BatchOptions,
) -> Result<BatchReport, PipelineError> {
    profile.validate()?;

    let outcomes: Vec<_> = pairs
        .par_iter()
        .map(|pair| process_pair(pair, profile, options))
        .collect();

    let mut report = BatchReport::default();
    for (pair, outcome) in pairs.iter().zip(outcomes) {
        match outcome {
            Ok(spots) => {
                tracing::info!(stage = %pair.stage, spots = spots.len(), "processed stage");
                report.results.insert(pair.stage.clone(), spots);
            }
            Err(err) => {
                tracing::error!(stage = %pair.stage, error = %err, "skipping stage");
                report.failures.push(BatchFailure {
                    stage: pair.stage.clone(),
                    error: err.to_string(),
                });
            }
        }
    }
    Ok(report)
}
