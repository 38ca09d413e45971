//! Header-only image metadata extraction and format conversion.
//!
//! [`probe_path`] and [`probe_bytes`] read just enough of an image to learn
//! its dimensions and container format. [`transcode`] fully decodes and
//! re-encodes and is only used when the stored representation must differ
//! from the file's native format.

use std::io::{BufRead, Cursor, Seek};
use std::path::{Path, PathBuf};

use image::imageops::FilterType;
use image::{DynamicImage, ImageError, ImageFormat, ImageReader};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Formats this build can both probe and produce.
pub const OUTPUT_FORMATS: &[ImageFormat] = &[ImageFormat::Png, ImageFormat::Jpeg, ImageFormat::WebP];

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Structural metadata read from an image header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageMetadata {
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
}

impl ImageMetadata {
    /// Short lowercase name of the container format (e.g. `"png"`, `"jpg"`).
    pub fn format_name(&self) -> &'static str {
        format_name(self.format)
    }
}

/// Why an image could not be probed or converted.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    /// The input is unreadable, empty, truncated, or otherwise corrupt.
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    /// The input is in a format this build does not handle.
    #[error("Unsupported image format: {0}")]
    UnsupportedFormat(String),
}

impl From<ImageError> for ProbeError {
    fn from(err: ImageError) -> Self {
        match err {
            ImageError::Unsupported(e) => Self::UnsupportedFormat(e.to_string()),
            other => Self::InvalidImage(other.to_string()),
        }
    }
}

/// Short lowercase name for `format`, taken from its primary extension.
pub fn format_name(format: ImageFormat) -> &'static str {
    format.extensions_str().first().copied().unwrap_or("unknown")
}

/// Parse a configured output format name (`png`, `jpg`/`jpeg`, `webp`).
///
/// Returns `None` for anything this build cannot encode.
pub fn parse_output_format(name: &str) -> Option<ImageFormat> {
    ImageFormat::from_extension(name.trim().to_ascii_lowercase())
        .filter(|f| OUTPUT_FORMATS.contains(f))
}

// ---------------------------------------------------------------------------
// Probe
// ---------------------------------------------------------------------------

/// Probe an image file on disk.
///
/// The format is guessed from the content signature first and from the file
/// extension as a fallback. This is blocking I/O; see [`probe_file`] for the
/// async wrapper.
pub fn probe_path(path: &Path) -> Result<ImageMetadata, ProbeError> {
    let reader = ImageReader::open(path)
        .map_err(|e| ProbeError::InvalidImage(format!("{}: {e}", path.display())))?;
    let reader = reader
        .with_guessed_format()
        .map_err(|e| ProbeError::InvalidImage(format!("{}: {e}", path.display())))?;

    if reader.format().is_none() {
        let len = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        return Err(unknown_format(len == 0, &path.display().to_string()));
    }
    read_header(reader)
}

/// Probe an in-memory image.
///
/// `hint` is used only when the content signature is not recognised.
pub fn probe_bytes(bytes: &[u8], hint: Option<ImageFormat>) -> Result<ImageMetadata, ProbeError> {
    let mut reader = ImageReader::new(Cursor::new(bytes));
    if let Some(format) = hint {
        reader.set_format(format);
    }
    let reader = reader
        .with_guessed_format()
        .map_err(|e| ProbeError::InvalidImage(e.to_string()))?;

    if reader.format().is_none() {
        return Err(unknown_format(bytes.is_empty(), "buffer"));
    }
    read_header(reader)
}

/// Async wrapper around [`probe_path`] that runs on the blocking pool.
pub async fn probe_file(path: PathBuf) -> Result<ImageMetadata, ProbeError> {
    tokio::task::spawn_blocking(move || probe_path(&path))
        .await
        .map_err(|e| ProbeError::InvalidImage(format!("probe task failed: {e}")))?
}

fn read_header<R: BufRead + Seek>(reader: ImageReader<R>) -> Result<ImageMetadata, ProbeError> {
    let Some(format) = reader.format() else {
        return Err(ProbeError::UnsupportedFormat("unknown".into()));
    };
    let (width, height) = reader.into_dimensions()?;
    if width == 0 || height == 0 {
        return Err(ProbeError::InvalidImage(format!(
            "zero-sized {} image ({width}x{height})",
            format_name(format)
        )));
    }
    Ok(ImageMetadata {
        width,
        height,
        format,
    })
}

fn unknown_format(empty: bool, what: &str) -> ProbeError {
    if empty {
        ProbeError::InvalidImage(format!("{what}: empty input"))
    } else {
        ProbeError::UnsupportedFormat(format!("{what}: unrecognised format"))
    }
}

// ---------------------------------------------------------------------------
// Transcode
// ---------------------------------------------------------------------------

/// Decode `bytes`, optionally shrink so neither edge exceeds `max_edge`, and
/// encode as `target`.
///
/// Aspect ratio is preserved. Images already within `max_edge` are never
/// enlarged.
pub fn transcode(
    bytes: &[u8],
    target: ImageFormat,
    max_edge: Option<u32>,
) -> Result<Vec<u8>, ProbeError> {
    if !OUTPUT_FORMATS.contains(&target) {
        return Err(ProbeError::UnsupportedFormat(format!(
            "cannot encode {}",
            format_name(target)
        )));
    }
    if bytes.is_empty() {
        return Err(ProbeError::InvalidImage("empty input".into()));
    }

    let mut img = image::load_from_memory(bytes)?;
    if let Some(max) = max_edge {
        if img.width() > max || img.height() > max {
            img = img.resize(max, max, FilterType::Lanczos3);
        }
    }

    // JPEG has no alpha channel; the WebP encoder only takes 8-bit RGBA/RGB.
    let img = match target {
        ImageFormat::Jpeg => DynamicImage::ImageRgb8(img.to_rgb8()),
        ImageFormat::WebP => DynamicImage::ImageRgba8(img.to_rgba8()),
        _ => img,
    };

    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, target)?;
    Ok(out.into_inner())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use image::{Rgb, RgbImage};

    use super::*;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb([200, 10, 10]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    // -- probe_bytes ---------------------------------------------------------

    #[test]
    fn probe_png_buffer() {
        let meta = probe_bytes(&png_bytes(7, 3), None).unwrap();
        assert_eq!(meta.width, 7);
        assert_eq!(meta.height, 3);
        assert_eq!(meta.format, ImageFormat::Png);
        assert_eq!(meta.format_name(), "png");
    }

    #[test]
    fn empty_buffer_is_invalid() {
        assert_matches!(probe_bytes(&[], None), Err(ProbeError::InvalidImage(_)));
    }

    #[test]
    fn empty_buffer_with_hint_is_invalid() {
        assert_matches!(
            probe_bytes(&[], Some(ImageFormat::Png)),
            Err(ProbeError::InvalidImage(_))
        );
    }

    #[test]
    fn unknown_signature_is_unsupported() {
        let text = b"this is definitely not an image, just some plain text";
        assert_matches!(probe_bytes(text, None), Err(ProbeError::UnsupportedFormat(_)));
    }

    #[test]
    fn truncated_png_is_invalid() {
        let bytes = png_bytes(4, 4);
        assert_matches!(
            probe_bytes(&bytes[..12], None),
            Err(ProbeError::InvalidImage(_))
        );
    }

    #[test]
    fn gif_is_unsupported_in_this_build() {
        // Minimal GIF89a header; the gif decoder is not compiled in.
        let gif = b"GIF89a\x01\x00\x01\x00\x00\x00\x00;";
        assert_matches!(probe_bytes(gif, None), Err(ProbeError::UnsupportedFormat(_)));
    }

    // -- probe_path ----------------------------------------------------------

    #[test]
    fn probe_png_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.png");
        std::fs::write(&path, png_bytes(5, 9)).unwrap();
        let meta = probe_path(&path).unwrap();
        assert_eq!((meta.width, meta.height), (5, 9));
    }

    #[test]
    fn png_content_with_wrong_extension_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.jpg");
        std::fs::write(&path, png_bytes(2, 2)).unwrap();
        assert_eq!(probe_path(&path).unwrap().format, ImageFormat::Png);
    }

    #[test]
    fn zero_byte_png_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corrupt.png");
        std::fs::write(&path, b"").unwrap();
        assert_matches!(probe_path(&path), Err(ProbeError::InvalidImage(_)));
    }

    #[test]
    fn zero_byte_unknown_extension_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob.bin");
        std::fs::write(&path, b"").unwrap();
        assert_matches!(probe_path(&path), Err(ProbeError::InvalidImage(_)));
    }

    #[test]
    fn text_with_unknown_extension_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, b"hello there, this is text").unwrap();
        assert_matches!(probe_path(&path), Err(ProbeError::UnsupportedFormat(_)));
    }

    #[test]
    fn missing_file_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        assert_matches!(
            probe_path(&dir.path().join("gone.png")),
            Err(ProbeError::InvalidImage(_))
        );
    }

    #[tokio::test]
    async fn probe_file_runs_off_thread() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.png");
        std::fs::write(&path, png_bytes(3, 3)).unwrap();
        let meta = probe_file(path).await.unwrap();
        assert_eq!(meta.width, 3);
    }

    // -- transcode -----------------------------------------------------------

    #[test]
    fn transcode_png_to_jpeg() {
        let out = transcode(&png_bytes(10, 6), ImageFormat::Jpeg, None).unwrap();
        let meta = probe_bytes(&out, None).unwrap();
        assert_eq!(meta.format, ImageFormat::Jpeg);
        assert_eq!((meta.width, meta.height), (10, 6));
    }

    #[test]
    fn transcode_shrinks_to_max_edge() {
        let out = transcode(&png_bytes(40, 20), ImageFormat::Png, Some(10)).unwrap();
        let meta = probe_bytes(&out, None).unwrap();
        assert_eq!((meta.width, meta.height), (10, 5));
    }

    #[test]
    fn transcode_never_enlarges() {
        let out = transcode(&png_bytes(4, 2), ImageFormat::WebP, Some(100)).unwrap();
        let meta = probe_bytes(&out, None).unwrap();
        assert_eq!(meta.format, ImageFormat::WebP);
        assert_eq!((meta.width, meta.height), (4, 2));
    }

    #[test]
    fn transcode_rejects_garbage() {
        assert_matches!(
            transcode(b"garbage", ImageFormat::Png, None),
            Err(ProbeError::InvalidImage(_)) | Err(ProbeError::UnsupportedFormat(_))
        );
    }

    #[test]
    fn transcode_rejects_unencodable_target() {
        assert_matches!(
            transcode(&png_bytes(2, 2), ImageFormat::Gif, None),
            Err(ProbeError::UnsupportedFormat(_))
        );
    }

    // -- parse_output_format -------------------------------------------------

    #[test]
    fn parse_known_output_formats() {
        assert_eq!(parse_output_format("png"), Some(ImageFormat::Png));
        assert_eq!(parse_output_format("JPEG"), Some(ImageFormat::Jpeg));
        assert_eq!(parse_output_format("jpg"), Some(ImageFormat::Jpeg));
        assert_eq!(parse_output_format(" webp "), Some(ImageFormat::WebP));
    }

    #[test]
    fn parse_rejects_unencodable_formats() {
        assert_eq!(parse_output_format("gif"), None);
        assert_eq!(parse_output_format("psd"), None);
    }
}
