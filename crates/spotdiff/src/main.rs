//! spotdiff: find the differences between puzzle image pairs.
//!
//! Runs the detection pipeline on a single original/altered pair or on a
//! whole asset directory, and writes per-stage spot JSON, the aggregated
//! `all_spots.json`, optional debug and mask images, and optionally a
//! Dart table for the game client. A single pair updates its own entry
//! in an existing `all_spots.json` and leaves the other stages alone.
//!
//! # Usage
//!
//! ```text
//! spotdiff -o 1-2.png -d 1-2-wrong.png -s high --debug
//! spotdiff -a assets/stages --output spot_results --dart
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::{ArgGroup, Args, Parser, ValueEnum};
use spotdiff_export::DartMetadata;
use spotdiff_io::output::DART_FILE;
use spotdiff_io::{
    BatchOptions, InputError, OutputError, OutputOptions, discover_pairs, load_pair, run_batch,
    update_all_results, write_all_results, write_dart, write_stage_outputs,
};
use spotdiff_pipeline::diagnostics::{Clock, detect_with_diagnostics};
use spotdiff_pipeline::{
    ConsolidationStrategy, IgnoreRegion, ParameterProfile, PipelineError, ProfileOverrides,
    Sensitivity, SignalChannels, StageResults, StructuringElement, detect_pair,
};
use tracing_subscriber::EnvFilter;

/// Find the differences between two near-identical images.
///
/// Detected regions are written as spots with pixel boxes and
/// resolution-independent centers and radii.
#[derive(Parser)]
#[command(name = "spotdiff", version)]
#[command(group(ArgGroup::new("input").required(true).args(["original", "all"])))]
struct Cli {
    /// Original (reference) image.
    #[arg(long, short = 'o', requires = "altered")]
    original: Option<PathBuf>,

    /// Altered image containing the differences.
    #[arg(long, short = 'd', visible_alias = "diff", requires = "original")]
    altered: Option<PathBuf>,

    /// Process every `<stage>.png` / `<stage>-wrong.png` pair in a directory.
    #[arg(long, short = 'a', value_name = "DIR", conflicts_with_all = ["original", "altered"])]
    all: Option<PathBuf>,

    /// Sensitivity preset the overrides are applied on top of.
    #[arg(
        long,
        short = 's',
        visible_alias = "sensitivity",
        value_enum,
        default_value_t = Preset::Medium
    )]
    preset: Preset,

    #[command(flatten)]
    tuning: TuningArgs,

    /// Full parameter profile as a JSON string.
    ///
    /// When provided, `--preset` and all tuning flags are ignored. Missing
    /// fields take their default values.
    #[arg(long)]
    profile_json: Option<String>,

    /// Output directory.
    #[arg(long, short = 'O', default_value = "spot_results")]
    output: PathBuf,

    /// Also write `<stage>_debug.png` with boxes, ids and centers drawn,
    /// and every intermediate mask under `<stage>_steps/`.
    #[arg(long)]
    debug: bool,

    /// Also write `<stage>_mask.png` with the cleaned difference mask.
    #[arg(long)]
    mask: bool,

    /// Print per-stage timing and counts (single pair only).
    #[arg(long, conflicts_with = "all")]
    diagnostics: bool,

    /// Print diagnostics as JSON instead of a text report.
    #[arg(long, requires = "diagnostics")]
    json: bool,

    /// Also write a Dart table of all spots to `spot_data.dart`.
    #[arg(long)]
    dart: bool,

    /// Print the resolved profile as JSON before processing.
    #[arg(long)]
    show_profile: bool,

    /// More log output (-v debug, -vv trace). `RUST_LOG` takes precedence.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors.
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

/// Per-field profile overrides. Unset flags keep the preset's value.
#[derive(Args, Default)]
struct TuningArgs {
    /// Gaussian blur kernel size (coerced to odd; 0 or 1 disables blur).
    #[arg(long, short = 'b')]
    blur_kernel: Option<i32>,

    /// Signal channels to combine.
    #[arg(long, value_enum, value_delimiter = ',')]
    channels: Option<Vec<Channel>>,

    /// Luma difference threshold (0-255).
    #[arg(long, short = 't', visible_alias = "threshold")]
    luma_threshold: Option<u8>,

    /// Hue distance threshold in degrees.
    #[arg(long)]
    hue_threshold: Option<u8>,

    /// Saturation difference threshold (0-255).
    #[arg(long)]
    saturation_threshold: Option<u8>,

    /// Perceptual (L*a*b*) difference threshold.
    #[arg(long)]
    perceptual_threshold: Option<u8>,

    /// Structuring element shape for morphology.
    #[arg(long, value_enum)]
    element: Option<Element>,

    /// Morphology kernel size.
    #[arg(long)]
    morph_kernel: Option<i32>,

    /// Opening iterations.
    #[arg(long)]
    open_iterations: Option<u32>,

    /// Closing iterations.
    #[arg(long)]
    close_iterations: Option<u32>,

    /// Extra erosion after closing to split touching regions (0 disables).
    #[arg(long)]
    separation_erode: Option<i32>,

    /// Minimum region area in pixels.
    #[arg(long, short = 'm')]
    min_area: Option<u64>,

    /// Minimum box width and height in pixels.
    #[arg(long)]
    min_box_side: Option<u32>,

    /// Maximum box width as a fraction of the image width.
    #[arg(long)]
    max_width_fraction: Option<f64>,

    /// Boxes closer than this many pixels are merged.
    #[arg(long, visible_alias = "merge")]
    merge_distance: Option<u32>,

    /// Merge/prune ordering.
    #[arg(long, value_enum)]
    consolidation: Option<Consolidation>,

    /// Padding added around each final box.
    #[arg(long)]
    padding: Option<u32>,

    /// Ignore region size as a fraction of width and height.
    #[arg(long, conflicts_with = "no_ignore")]
    ignore_fraction: Option<f64>,

    /// Disable the bottom-right ignore region.
    #[arg(long)]
    no_ignore: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum Preset {
    Low,
    Medium,
    High,
    VeryHigh,
}

impl From<Preset> for Sensitivity {
    fn from(preset: Preset) -> Self {
        match preset {
            Preset::Low => Self::Low,
            Preset::Medium => Self::Medium,
            Preset::High => Self::High,
            Preset::VeryHigh => Self::VeryHigh,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Channel {
    Luma,
    Hue,
    Saturation,
    Perceptual,
}

#[derive(Clone, Copy, ValueEnum)]
enum Element {
    Ellipse,
    Square,
}

#[derive(Clone, Copy, ValueEnum)]
enum Consolidation {
    MergeOnly,
    PruneThenMerge,
    MergeThenPrune,
    PruneOnly,
}

impl TuningArgs {
    fn overrides(&self) -> ProfileOverrides {
        let channels = self.channels.as_ref().map(|list| SignalChannels {
            luma: list.contains(&Channel::Luma),
            hue: list.contains(&Channel::Hue),
            saturation: list.contains(&Channel::Saturation),
            perceptual: list.contains(&Channel::Perceptual),
        });
        let ignore_region = if self.no_ignore {
            Some(IgnoreRegion::DISABLED)
        } else {
            self.ignore_fraction.map(|f| IgnoreRegion {
                width_fraction: f,
                height_fraction: f,
            })
        };

        ProfileOverrides {
            blur_kernel_size: self.blur_kernel,
            channels,
            luma_threshold: self.luma_threshold,
            hue_threshold: self.hue_threshold,
            saturation_threshold: self.saturation_threshold,
            perceptual_threshold: self.perceptual_threshold,
            structuring_element: self.element.map(|e| match e {
                Element::Ellipse => StructuringElement::Ellipse,
                Element::Square => StructuringElement::Square,
            }),
            morph_kernel_size: self.morph_kernel,
            open_iterations: self.open_iterations,
            close_iterations: self.close_iterations,
            separation_erode_size: self.separation_erode,
            min_area: self.min_area,
            min_box_side: self.min_box_side,
            max_width_fraction: self.max_width_fraction,
            merge_distance: self.merge_distance,
            consolidation: self.consolidation.map(|c| match c {
                Consolidation::MergeOnly => ConsolidationStrategy::MergeOnly,
                Consolidation::PruneThenMerge => ConsolidationStrategy::PruneThenMerge,
                Consolidation::MergeThenPrune => ConsolidationStrategy::MergeThenPrune,
                Consolidation::PruneOnly => ConsolidationStrategy::PruneOnly,
            }),
            padding: self.padding,
            ignore_region,
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("error parsing --profile-json: {0}")]
    ProfileJson(serde_json::Error),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error(transparent)]
    Input(#[from] InputError),
    #[error(transparent)]
    Output(#[from] OutputError),
    #[error("failed to serialize diagnostics: {0}")]
    Diagnostics(serde_json::Error),
}

/// Resolve the profile from `--profile-json`, or the preset plus
/// overrides, and validate it.
fn profile_from_cli(cli: &Cli) -> Result<ParameterProfile, CliError> {
    let profile = match &cli.profile_json {
        Some(json) => serde_json::from_str(json).map_err(CliError::ProfileJson)?,
        None => ParameterProfile::preset(cli.preset.into()).with_overrides(&cli.tuning.overrides()),
    };
    profile.validate()?;
    Ok(profile)
}

fn init_logging(verbose: u8, quiet: bool) {
    let default_level = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "info",
        (false, 1) => "debug",
        (false, _) => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn stage_name(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("stage")
        .to_owned()
}

fn write_dart_table(cli: &Cli, results: &StageResults, source: &Path) -> Result<(), CliError> {
    let path = cli.output.join(DART_FILE);
    let source = source.display().to_string();
    let metadata = DartMetadata {
        source: Some(&source),
        description: None,
    };
    write_dart(&path, results, &metadata)?;
    tracing::info!(path = %path.display(), "wrote Dart table");
    Ok(())
}

fn run_single(
    cli: &Cli,
    original: &Path,
    altered: &Path,
    profile: ParameterProfile,
) -> Result<ExitCode, CliError> {
    let pair = load_pair(original, altered)?;
    let stage = stage_name(original);

    let staged = if cli.diagnostics {
        let (staged, diagnostics) = detect_with_diagnostics(pair, profile.clone(), &StdClock)?;
        if cli.json {
            let json =
                serde_json::to_string_pretty(&diagnostics).map_err(CliError::Diagnostics)?;
            println!("{json}");
        } else {
            println!("{}", diagnostics.report());
        }
        staged
    } else {
        detect_pair(pair, &profile)?
    };

    let options = OutputOptions {
        debug: cli.debug,
        mask: cli.mask,
    };
    let written = write_stage_outputs(&cli.output, &stage, &staged, &profile, options)?;
    tracing::info!(
        stage = %stage,
        spots = staged.spots.len(),
        files = written.len(),
        output = %cli.output.display(),
        "done"
    );

    let results = update_all_results(&cli.output, &stage, staged.spots)?;
    if cli.dart {
        write_dart_table(cli, &results, original)?;
    }
    Ok(ExitCode::SUCCESS)
}

fn run_all(cli: &Cli, dir: &Path, profile: &ParameterProfile) -> Result<ExitCode, CliError> {
    let pairs = discover_pairs(dir)?;
    if pairs.is_empty() {
        tracing::warn!(dir = %dir.display(), "no image pairs found");
        return Ok(ExitCode::SUCCESS);
    }
    tracing::info!(pairs = pairs.len(), "processing batch");

    let options = BatchOptions {
        output_dir: Some(cli.output.clone()),
        outputs: OutputOptions {
            debug: cli.debug,
            mask: cli.mask,
        },
    };
    let report = run_batch(&pairs, profile, &options)?;

    let path = write_all_results(&cli.output, &report.results)?;
    if cli.dart {
        write_dart_table(cli, &report.results, dir)?;
    }
    tracing::info!(
        stages = report.results.len(),
        failed = report.failures.len(),
        spots = report.spot_count(),
        path = %path.display(),
        "batch complete"
    );

    if report.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        for failure in &report.failures {
            eprintln!("{}: {}", failure.stage, failure.error);
        }
        Ok(ExitCode::FAILURE)
    }
}

fn run(cli: &Cli) -> Result<ExitCode, CliError> {
    let profile = profile_from_cli(cli)?;
    if cli.show_profile {
        match serde_json::to_string_pretty(&profile) {
            Ok(json) => println!("{json}"),
            Err(e) => tracing::warn!(error = %e, "could not print profile"),
        }
    }

    match (&cli.original, &cli.altered, &cli.all) {
        (Some(original), Some(altered), _) => run_single(cli, original, altered, profile),
        (_, _, Some(dir)) => run_all(cli, dir, &profile),
        // clap's argument group rules out the remaining combinations.
        _ => Ok(ExitCode::FAILURE),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    match run(&cli) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

/// [`Clock`] implementation backed by [`std::time::Instant`].
struct StdClock;

impl Clock for StdClock {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn elapsed(&self, since: &Instant) -> Duration {
        since.elapsed()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("spotdiff").chain(args.iter().copied()))
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn requires_an_input() {
        assert!(parse(&[]).is_err());
        assert!(parse(&["--original", "a.png"]).is_err());
        assert!(parse(&["--all", "dir", "--original", "a.png", "--altered", "b.png"]).is_err());
        assert!(parse(&["--all", "dir", "--diagnostics"]).is_err());
    }

    #[test]
    fn preset_and_overrides() {
        let cli = parse(&[
            "-o",
            "a.png",
            "-d",
            "b.png",
            "-s",
            "very-high",
            "-m",
            "42",
            "--channels",
            "luma,hue",
            "--no-ignore",
        ])
        .unwrap();
        let profile = profile_from_cli(&cli).unwrap();
        let base = ParameterProfile::preset(Sensitivity::VeryHigh);
        assert_eq!(profile.min_area, 42);
        assert_eq!(profile.merge_distance, base.merge_distance);
        assert!(profile.channels.luma && profile.channels.hue);
        assert!(!profile.channels.saturation && !profile.channels.perceptual);
        assert_eq!(profile.ignore_region, IgnoreRegion::DISABLED);
    }

    #[test]
    fn short_flags() {
        let cli = parse(&["-a", "assets", "-t", "12", "-b", "3", "--merge", "7"]).unwrap();
        assert_eq!(cli.all.as_deref(), Some(Path::new("assets")));
        let profile = profile_from_cli(&cli).unwrap();
        assert_eq!(profile.luma_threshold, 12);
        assert_eq!(profile.blur_kernel_size, 3);
        assert_eq!(profile.merge_distance, 7);

        let cli = parse(&["-o", "a.png", "--diff", "b.png"]).unwrap();
        assert_eq!(cli.altered.as_deref(), Some(Path::new("b.png")));
        assert!(parse(&["-a", "dir", "-o", "a.png", "-d", "b.png"]).is_err());
    }

    #[test]
    fn no_flags_is_the_preset() {
        let cli = parse(&["--all", "dir", "--preset", "low"]).unwrap();
        assert!(cli.tuning.overrides().is_empty());
        assert_eq!(
            profile_from_cli(&cli).unwrap(),
            ParameterProfile::preset(Sensitivity::Low)
        );
    }

    #[test]
    fn profile_json_wins() {
        let cli = parse(&[
            "--all",
            "dir",
            "--min-area",
            "5",
            "--profile-json",
            r#"{"min_area": 999}"#,
        ])
        .unwrap();
        let profile = profile_from_cli(&cli).unwrap();
        assert_eq!(profile.min_area, 999);
    }

    #[test]
    fn invalid_profiles_are_rejected() {
        let bad_json = parse(&["--all", "d", "--profile-json", "{nope"]).unwrap();
        assert!(matches!(
            profile_from_cli(&bad_json),
            Err(CliError::ProfileJson(_))
        ));

        let bad_value = parse(&["--all", "d", "--max-width-fraction", "1.5"]).unwrap();
        assert!(matches!(
            profile_from_cli(&bad_value),
            Err(CliError::Pipeline(PipelineError::InvalidConfig(_)))
        ));
    }

    #[test]
    fn stage_name_is_file_stem() {
        assert_eq!(stage_name(Path::new("assets/3-4.png")), "3-4");
    }
}
