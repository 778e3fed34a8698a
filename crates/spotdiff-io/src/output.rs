//! Writing results to disk.
//!
//! Images are encoded to PNG in memory first, then written in one call,
//! so an encode failure never leaves a truncated file behind.

use std::path::{Path, PathBuf};

use image::ImageEncoder;
use spotdiff_export::{
    DartMetadata, annotate, overlay_mask, render_mask, spots_to_json, stage_results_from_json,
    stage_results_to_json, to_dart,
};
use spotdiff_pipeline::{GrayImage, ParameterProfile, RgbImage, Spot, StageResults, StagedResult};

use crate::error::OutputError;

/// File name of the aggregated results document.
pub const ALL_SPOTS_FILE: &str = "all_spots.json";

/// File name of the Dart table snippet.
pub const DART_FILE: &str = "spot_data.dart";

/// Per-stage artifact kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    /// `<stage>.json`: the stage's spots.
    Json,
    /// `<stage>_debug.png`: annotated original.
    Debug,
    /// `<stage>_mask.png`: the cleaned difference mask.
    Mask,
    /// `<stage>_steps/`: intermediate masks, written with `Debug`.
    Steps,
}

impl OutputKind {
    #[must_use]
    pub fn file_name(self, stage: &str) -> String {
        match self {
            Self::Json => format!("{stage}.json"),
            Self::Debug => format!("{stage}_debug.png"),
            Self::Mask => format!("{stage}_mask.png"),
            Self::Steps => format!("{stage}_steps"),
        }
    }
}

/// Union of the channel masks, before morphology.
pub const COMBINED_STEP_FILE: &str = "combined_before_morph.png";

/// Cleaned mask the regions are extracted from.
pub const FINAL_STEP_FILE: &str = "final_mask.png";

/// Original image with the cleaned mask tinted over it.
pub const OVERLAY_STEP_FILE: &str = "mask_overlay.png";

/// File name of one channel's mask inside the steps directory.
#[must_use]
pub fn channel_step_file(channel: &str) -> String {
    format!("{channel}_mask.png")
}

/// Which optional per-stage artifacts to write alongside the JSON.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutputOptions {
    /// Annotated image plus the `<stage>_steps/` directory.
    pub debug: bool,
    pub mask: bool,
}

/// Create `dir` and its parents.
///
/// # Errors
///
/// Returns [`OutputError::Write`] if the directory cannot be created.
pub fn ensure_dir(dir: &Path) -> Result<(), OutputError> {
    std::fs::create_dir_all(dir).map_err(|source| OutputError::Write {
        path: dir.to_path_buf(),
        source,
    })
}

/// Write a text file.
///
/// # Errors
///
/// Returns [`OutputError::Write`] on I/O failure.
pub fn write_text(path: &Path, contents: &str) -> Result<(), OutputError> {
    std::fs::write(path, contents).map_err(|source| OutputError::Write {
        path: path.to_path_buf(),
        source,
    })
}

fn write_png(
    path: &Path,
    raw: &[u8],
    (width, height): (u32, u32),
    color: image::ExtendedColorType,
) -> Result<(), OutputError> {
    let mut png_bytes = Vec::new();
    let encoder = image::codecs::png::PngEncoder::new(&mut png_bytes);
    encoder
        .write_image(raw, width, height, color)
        .map_err(|source| OutputError::Encode {
            path: path.to_path_buf(),
            source,
        })?;
    std::fs::write(path, png_bytes).map_err(|source| OutputError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// Encode an RGB image as PNG and write it.
///
/// # Errors
///
/// Returns [`OutputError::Encode`] or [`OutputError::Write`].
pub fn write_rgb_png(path: &Path, image: &RgbImage) -> Result<(), OutputError> {
    write_png(
        path,
        image.as_raw(),
        image.dimensions(),
        image::ExtendedColorType::Rgb8,
    )
}

/// Encode a grayscale image as PNG and write it.
///
/// # Errors
///
/// Returns [`OutputError::Encode`] or [`OutputError::Write`].
pub fn write_gray_png(path: &Path, image: &GrayImage) -> Result<(), OutputError> {
    write_png(
        path,
        image.as_raw(),
        image.dimensions(),
        image::ExtendedColorType::L8,
    )
}

/// Write every intermediate mask of `staged` into `dir`.
///
/// One file per enabled channel, then the combined mask, the cleaned
/// mask and an overlay of the cleaned mask on the original.
///
/// # Errors
///
/// Returns the first [`OutputError`] encountered.
pub fn write_steps(dir: &Path, staged: &StagedResult) -> Result<Vec<PathBuf>, OutputError> {
    ensure_dir(dir)?;
    let mut written = Vec::new();

    for (channel, mask) in staged.channel_masks.iter() {
        let path = dir.join(channel_step_file(channel));
        write_gray_png(&path, &render_mask(mask))?;
        written.push(path);
    }
    for (name, mask) in [
        (COMBINED_STEP_FILE, &staged.raw_mask),
        (FINAL_STEP_FILE, &staged.mask),
    ] {
        let path = dir.join(name);
        write_gray_png(&path, &render_mask(mask))?;
        written.push(path);
    }
    let path = dir.join(OVERLAY_STEP_FILE);
    write_rgb_png(&path, &overlay_mask(staged.pair.original(), &staged.mask))?;
    written.push(path);

    Ok(written)
}

/// Write `<stage>.json` and, if requested, the debug and mask images for
/// one detection into `dir`. Returns the paths written.
///
/// # Errors
///
/// Returns the first [`OutputError`] encountered.
pub fn write_stage_outputs(
    dir: &Path,
    stage: &str,
    staged: &StagedResult,
    profile: &ParameterProfile,
    options: OutputOptions,
) -> Result<Vec<PathBuf>, OutputError> {
    ensure_dir(dir)?;
    let mut written = Vec::new();

    let json_path = dir.join(OutputKind::Json.file_name(stage));
    write_text(&json_path, &spots_to_json(&staged.spots)?)?;
    written.push(json_path);

    if options.debug {
        let path = dir.join(OutputKind::Debug.file_name(stage));
        let ignore = profile.ignore_region.rect(staged.dimensions);
        write_rgb_png(&path, &annotate(staged.pair.original(), &staged.spots, ignore))?;
        written.push(path);
        written.extend(write_steps(&dir.join(OutputKind::Steps.file_name(stage)), staged)?);
    }

    if options.mask {
        let path = dir.join(OutputKind::Mask.file_name(stage));
        write_gray_png(&path, &render_mask(&staged.mask))?;
        written.push(path);
    }

    tracing::debug!(stage, files = written.len(), "wrote stage outputs");
    Ok(written)
}

/// Write the aggregated results to `<dir>/all_spots.json`.
///
/// # Errors
///
/// Returns [`OutputError::Serialize`] or [`OutputError::Write`].
pub fn write_all_results(dir: &Path, results: &StageResults) -> Result<PathBuf, OutputError> {
    ensure_dir(dir)?;
    let path = dir.join(ALL_SPOTS_FILE);
    write_text(&path, &stage_results_to_json(results)?)?;
    Ok(path)
}

/// Read `<dir>/all_spots.json`, or an empty map if it does not exist.
///
/// # Errors
///
/// Returns [`OutputError::Read`] if the file exists but cannot be read,
/// or [`OutputError::Parse`] if it is not a stage results document.
pub fn read_all_results(dir: &Path) -> Result<StageResults, OutputError> {
    let path = dir.join(ALL_SPOTS_FILE);
    let json = match std::fs::read_to_string(&path) {
        Ok(json) => json,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(StageResults::new()),
        Err(source) => return Err(OutputError::Read { path, source }),
    };
    stage_results_from_json(&json).map_err(|source| OutputError::Parse { path, source })
}

/// Replace one stage in `<dir>/all_spots.json`, keeping every other
/// stage already recorded there. Returns the merged results.
///
/// # Errors
///
/// Returns the [`read_all_results`] or [`write_all_results`] error.
pub fn update_all_results(
    dir: &Path,
    stage: &str,
    spots: Vec<Spot>,
) -> Result<StageResults, OutputError> {
    let mut results = read_all_results(dir)?;
    results.insert(stage.to_owned(), spots);
    write_all_results(dir, &results)?;
    Ok(results)
}

/// Write the Dart table for `results` to `path`.
///
/// # Errors
///
/// Returns [`OutputError::Write`] on I/O failure.
pub fn write_dart(
    path: &Path,
    results: &StageResults,
    metadata: &DartMetadata<'_>,
) -> Result<(), OutputError> {
    write_text(path, &to_dart(results, metadata))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use spotdiff_pipeline::{ImagePair, detect_pair};

    fn staged() -> StagedResult {
        let original = RgbImage::from_pixel(80, 60, image::Rgb([120, 120, 120]));
        let mut altered = original.clone();
        for y in 10..30 {
            for x in 10..30 {
                altered.put_pixel(x, y, image::Rgb([0, 0, 0]));
            }
        }
        detect_pair(
            ImagePair::reconciled(original, altered),
            &ParameterProfile::default(),
        )
        .unwrap()
    }

    #[test]
    fn file_names() {
        assert_eq!(OutputKind::Json.file_name("1-2"), "1-2.json");
        assert_eq!(OutputKind::Debug.file_name("1-2"), "1-2_debug.png");
        assert_eq!(OutputKind::Mask.file_name("1-2"), "1-2_mask.png");
        assert_eq!(OutputKind::Steps.file_name("1-2"), "1-2_steps");
    }

    #[test]
    fn json_only_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("nested/out");
        let written = write_stage_outputs(
            &out,
            "1-1",
            &staged(),
            &ParameterProfile::default(),
            OutputOptions::default(),
        )
        .unwrap();
        assert_eq!(written, vec![out.join("1-1.json")]);
        let json = std::fs::read_to_string(&written[0]).unwrap();
        assert!(json.contains("\"id\": 1"));
    }

    #[test]
    fn debug_and_mask_images_decode() {
        let dir = tempfile::tempdir().unwrap();
        let options = OutputOptions {
            debug: true,
            mask: true,
        };
        let written = write_stage_outputs(
            dir.path(),
            "2-3",
            &staged(),
            &ParameterProfile::default(),
            options,
        )
        .unwrap();
        // json, debug, four channels, combined, final, overlay, mask
        assert_eq!(written.len(), 10);
        let debug = image::open(dir.path().join("2-3_debug.png")).unwrap();
        assert_eq!((debug.width(), debug.height()), (80, 60));
        let mask = image::open(dir.path().join("2-3_mask.png")).unwrap();
        assert_eq!(mask.color(), image::ColorType::L8);
    }

    #[test]
    fn debug_writes_every_intermediate_mask() {
        let dir = tempfile::tempdir().unwrap();
        let staged = staged();
        let options = OutputOptions {
            debug: true,
            mask: false,
        };
        write_stage_outputs(
            dir.path(),
            "1-4",
            &staged,
            &ParameterProfile::default(),
            options,
        )
        .unwrap();

        let steps = dir.path().join("1-4_steps");
        for channel in ["luma", "hue", "saturation", "perceptual"] {
            assert!(steps.join(channel_step_file(channel)).is_file(), "{channel}");
        }
        let combined = image::open(steps.join(COMBINED_STEP_FILE)).unwrap().into_luma8();
        assert_eq!(combined, render_mask(&staged.raw_mask));
        assert!(steps.join(FINAL_STEP_FILE).is_file());
        let overlay = image::open(steps.join(OVERLAY_STEP_FILE)).unwrap().into_rgb8();
        assert_ne!(&overlay, staged.pair.original());
    }

    #[test]
    fn disabled_channels_have_no_step_file() {
        let dir = tempfile::tempdir().unwrap();
        let original = RgbImage::from_pixel(40, 40, image::Rgb([120, 120, 120]));
        let mut altered = original.clone();
        for y in 5..20 {
            for x in 5..20 {
                altered.put_pixel(x, y, image::Rgb([0, 0, 0]));
            }
        }
        let profile = ParameterProfile {
            channels: spotdiff_pipeline::SignalChannels {
                luma: true,
                ..spotdiff_pipeline::SignalChannels::NONE
            },
            ..ParameterProfile::default()
        };
        let staged = detect_pair(ImagePair::reconciled(original, altered), &profile).unwrap();
        let written = write_steps(dir.path(), &staged).unwrap();
        assert_eq!(written.len(), 4);
        assert!(dir.path().join(channel_step_file("luma")).is_file());
        assert!(!dir.path().join(channel_step_file("hue")).exists());
    }

    #[test]
    fn update_keeps_other_stages() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_all_results(dir.path()).unwrap().is_empty());

        update_all_results(dir.path(), "1-1", staged().spots).unwrap();
        let merged = update_all_results(dir.path(), "1-2", Vec::new()).unwrap();
        assert_eq!(merged.keys().collect::<Vec<_>>(), vec!["1-1", "1-2"]);

        let reread = read_all_results(dir.path()).unwrap();
        assert_eq!(reread["1-1"].len(), 1);
        assert!(reread["1-2"].is_empty());

        let replaced = update_all_results(dir.path(), "1-1", Vec::new()).unwrap();
        assert!(replaced["1-1"].is_empty());
    }

    #[test]
    fn corrupt_results_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(ALL_SPOTS_FILE), "[1, 2").unwrap();
        assert!(matches!(
            update_all_results(dir.path(), "1-1", Vec::new()),
            Err(OutputError::Parse { .. })
        ));
    }

    #[test]
    fn write_into_a_file_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "x").unwrap();
        let err = write_all_results(&blocker.join("sub"), &StageResults::new()).unwrap_err();
        assert!(matches!(err, OutputError::Write { .. }));
    }

    #[test]
    fn aggregated_results_and_dart() {
        let dir = tempfile::tempdir().unwrap();
        let mut results = StageResults::new();
        results.insert("1-1".to_owned(), staged().spots);
        let path = write_all_results(dir.path(), &results).unwrap();
        assert_eq!(path.file_name().unwrap(), ALL_SPOTS_FILE);

        let dart_path = dir.path().join(DART_FILE);
        write_dart(&dart_path, &results, &DartMetadata::default()).unwrap();
        let dart = std::fs::read_to_string(dart_path).unwrap();
        assert!(dart.contains("'1-1': ["));
    }
}
