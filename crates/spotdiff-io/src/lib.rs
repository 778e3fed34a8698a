//! spotdiff-io: Filesystem I/O and batch processing.
//!
//! Reads image pairs from disk, discovers `<stage>.png` /
//! `<stage>-wrong.png` pairs in an asset directory, runs them through
//! the pipeline in parallel, and writes JSON, Dart, and PNG outputs.

pub mod batch;
pub mod error;
pub mod input;
pub mod output;

pub use batch::{BatchFailure, BatchOptions, BatchReport, StagePair, discover_pairs, run_batch};
pub use error::{InputError, OutputError};
pub use input::{load_pair, read_image_bytes};
pub use output::{
    OutputKind, OutputOptions, read_all_results, update_all_results, write_all_results, write_dart,
    write_stage_outputs, write_steps,
};
