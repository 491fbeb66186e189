//! Packs downloaded page images into one combined CBZ document per chapter.

use std::fs::{self, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};

use zip::write::SimpleFileOptions;

use crate::{Error, Result};

/// Writes the decodable images from `image_paths` into a CBZ at `out_path`,
/// preserving input order via zero-padded entry names.
///
/// A file that does not decode as an image is logged and left out; the
/// archive only fails when nothing decodes at all.
pub fn write_cbz(image_paths: &[PathBuf], out_path: &Path) -> Result<()> {
    if let Some(parent) = out_path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }

    let out_file = OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .open(out_path)?;
    let mut archive = zip::ZipWriter::new(out_file);

    // Page bytes are already-compressed raster formats; store them as-is.
    let options = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Stored)
        .unix_permissions(0o644);

    let mut pages_written = 0usize;
    for (index, path) in image_paths.iter().enumerate() {
        let bytes = fs::read(path)?;
        if let Err(err) = image::load_from_memory(&bytes) {
            tracing::warn!(path = %path.display(), %err, "page does not decode as an image; excluded");
            continue;
        }

        archive.start_file(entry_name(index, path), options)?;
        archive.write_all(&bytes)?;
        pages_written += 1;
    }
    archive.finish()?;

    if pages_written == 0 {
        // Don't leave an empty artifact behind.
        let _ = fs::remove_file(out_path);
        return Err(Error::NoPagesDecoded);
    }

    tracing::info!(pages = pages_written, out = %out_path.display(), "wrote chapter archive");
    Ok(())
}

fn entry_name(index: usize, path: &Path) -> String {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("jpg");
    format!("{:04}.{extension}", index + 1)
}
