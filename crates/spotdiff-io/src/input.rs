//! Reading image pairs from disk.

use std::io::ErrorKind;
use std::path::Path;

use spotdiff_pipeline::load::decode_rgb;
use spotdiff_pipeline::{ImagePair, RgbImage};

use crate::error::InputError;

/// Read a file's bytes, distinguishing a missing file from other failures.
///
/// # Errors
///
/// Returns [`InputError::NotFound`] if `path` does not exist, or
/// [`InputError::Read`] for any other I/O failure.
pub fn read_image_bytes(path: &Path) -> Result<Vec<u8>, InputError> {
    std::fs::read(path).map_err(|source| match source.kind() {
        ErrorKind::NotFound => InputError::NotFound(path.to_path_buf()),
        _ => InputError::Read {
            path: path.to_path_buf(),
            source,
        },
    })
}

/// Read and decode one image to 8-bit RGB.
///
/// # Errors
///
/// See [`read_image_bytes`]; additionally [`InputError::Decode`] if the
/// bytes are empty or not a supported image format.
pub fn load_image(path: &Path) -> Result<RgbImage, InputError> {
    let bytes = read_image_bytes(path)?;
    let image = decode_rgb(&bytes).map_err(|source| InputError::Decode {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::debug!(
        path = %path.display(),
        width = image.width(),
        height = image.height(),
        "loaded image"
    );
    Ok(image)
}

/// Load an original/altered pair, resampling the altered image to the
/// original's size if they differ.
///
/// # Errors
///
/// See [`load_image`].
pub fn load_pair(original: &Path, altered: &Path) -> Result<ImagePair, InputError> {
    Ok(ImagePair::reconciled(
        load_image(original)?,
        load_image(altered)?,
    ))
}
