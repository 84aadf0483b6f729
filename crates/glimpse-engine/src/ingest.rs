use std::fs;
use std::path::Path;

use anyhow::Context;
use image::codecs::jpeg::JpegEncoder;
use image::{ImageFormat, RgbImage};
use sha2::{Digest, Sha256};

use crate::error::IngestError;

/// Upload ceiling: 10 MiB. Uploads at or above it are rejected before decode.
pub const MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

const ACCEPTED_FORMATS: &[ImageFormat] = &[
    ImageFormat::Png,
    ImageFormat::Jpeg,
    ImageFormat::Gif,
    ImageFormat::Bmp,
    ImageFormat::WebP,
];

const UPLOAD_JPEG_QUALITY: u8 = 90;

/// A decoded upload, normalized to 8-bit RGB.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestedImage {
    pixels: RgbImage,
    format: ImageFormat,
    byte_len: u64,
    fingerprint: String,
}

impl IngestedImage {
    pub fn pixels(&self) -> &RgbImage {
        &self.pixels
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    /// Encoding the upload arrived in.
    pub fn source_format(&self) -> ImageFormat {
        self.format
    }

    pub fn byte_len(&self) -> u64 {
        self.byte_len
    }

    /// Hex sha256 of the uploaded bytes.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn info_line(&self) -> String {
        format!(
            "Image Info: {}x{} pixels, {:.1} KB",
            self.width(),
            self.height(),
            self.byte_len as f64 / 1024.0
        )
    }

    /// Re-encodes the normalized pixels as JPEG for transports that want bytes.
    pub fn to_jpeg_bytes(&self) -> anyhow::Result<Vec<u8>> {
        let mut out = Vec::new();
        JpegEncoder::new_with_quality(&mut out, UPLOAD_JPEG_QUALITY)
            .encode_image(&self.pixels)
            .context("failed to encode image as JPEG")?;
        Ok(out)
    }
}

pub fn ingest(raw_bytes: &[u8], declared_size_bytes: u64) -> Result<IngestedImage, IngestError> {
    let size = declared_size_bytes.max(raw_bytes.len() as u64);
    check_size(size)?;

    let format = image::guess_format(raw_bytes)
        .map_err(|err| IngestError::DecodeError(err.to_string()))?;
    if !ACCEPTED_FORMATS.contains(&format) {
        return Err(IngestError::DecodeError(format!(
            "unsupported image encoding {}; expected PNG, JPEG, GIF, BMP or WEBP",
            format_label(format)
        )));
    }

    let decoded = image::load_from_memory_with_format(raw_bytes, format)
        .map_err(|err| IngestError::DecodeError(err.to_string()))?;
    let pixels = decoded.into_rgb8();

    tracing::debug!(
        format = format_label(format),
        width = pixels.width(),
        height = pixels.height(),
        bytes = size,
        "image ingested"
    );

    Ok(IngestedImage {
        pixels,
        format,
        byte_len: size,
        fingerprint: hex::encode(Sha256::digest(raw_bytes)),
    })
}

/// Reads an upload from disk. The file length is the declared size, checked
/// before the file is read.
pub fn ingest_path(path: &Path) -> Result<IngestedImage, IngestError> {
    let metadata = fs::metadata(path).map_err(|err| {
        IngestError::DecodeError(format!("failed reading {}: {err}", path.display()))
    })?;
    check_size(metadata.len())?;
    let bytes = fs::read(path).map_err(|err| {
        IngestError::DecodeError(format!("failed reading {}: {err}", path.display()))
    })?;
    ingest(&bytes, metadata.len())
}

fn check_size(size: u64) -> Result<(), IngestError> {
    if size >= MAX_UPLOAD_BYTES {
        return Err(IngestError::SizeExceeded {
            size,
            limit: MAX_UPLOAD_BYTES,
        });
    }
    Ok(())
}

pub fn format_label(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Png => "png",
        ImageFormat::Jpeg => "jpeg",
        ImageFormat::Gif => "gif",
        ImageFormat::Bmp => "bmp",
        ImageFormat::WebP => "webp",
        ImageFormat::Tiff => "tiff",
        _ => "other",
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use image::{DynamicImage, GrayImage, Luma, Rgb, Rgba, RgbaImage};

    use super::*;

    fn encode(image: DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut buffer = Cursor::new(Vec::new());
        image.write_to(&mut buffer, format).unwrap();
        buffer.into_inner()
    }

    fn red_jpeg_2x2() -> Vec<u8> {
        encode(
            DynamicImage::ImageRgb8(RgbImage::from_pixel(2, 2, Rgb([255, 0, 0]))),
            ImageFormat::Jpeg,
        )
    }

    #[test]
    fn red_jpeg_ingests_with_source_dimensions() {
        let bytes = red_jpeg_2x2();
        let image = ingest(&bytes, bytes.len() as u64).unwrap();
        assert_eq!(image.dimensions(), (2, 2));
        assert_eq!(image.source_format(), ImageFormat::Jpeg);
        let pixel = image.pixels().get_pixel(0, 0);
        assert!(pixel[0] > 200 && pixel[1] < 60 && pixel[2] < 60);
    }

    #[test]
    fn supported_encodings_keep_dimensions() {
        let source = DynamicImage::ImageRgb8(RgbImage::from_pixel(7, 3, Rgb([1, 2, 3])));
        for format in [
            ImageFormat::Png,
            ImageFormat::Jpeg,
            ImageFormat::Gif,
            ImageFormat::Bmp,
            ImageFormat::WebP,
        ] {
            let bytes = encode(source.clone(), format);
            let image = ingest(&bytes, bytes.len() as u64).unwrap();
            assert_eq!(image.dimensions(), (7, 3), "format {format:?}");
            assert_eq!(image.source_format(), format);
        }
    }

    #[test]
    fn declared_size_just_below_ceiling_is_accepted() {
        let source = DynamicImage::ImageRgb8(RgbImage::from_pixel(5, 4, Rgb([9, 9, 9])));
        for format in [ImageFormat::Gif, ImageFormat::WebP, ImageFormat::Png] {
            let bytes = encode(source.clone(), format);
            let image = ingest(&bytes, MAX_UPLOAD_BYTES - 1).unwrap();
            assert_eq!(image.dimensions(), (5, 4), "format {format:?}");
            assert_eq!(image.byte_len(), MAX_UPLOAD_BYTES - 1);
        }
    }

    #[test]
    fn alpha_is_dropped_without_touching_color() {
        let rgba = RgbaImage::from_pixel(3, 2, Rgba([10, 20, 30, 128]));
        let bytes = encode(DynamicImage::ImageRgba8(rgba), ImageFormat::Png);
        let image = ingest(&bytes, bytes.len() as u64).unwrap();
        assert_eq!(image.dimensions(), (3, 2));
        assert_eq!(*image.pixels().get_pixel(2, 1), Rgb([10, 20, 30]));
    }

    #[test]
    fn grayscale_is_projected_to_three_channels() {
        let gray = GrayImage::from_pixel(4, 4, Luma([77]));
        let bytes = encode(DynamicImage::ImageLuma8(gray), ImageFormat::Png);
        let image = ingest(&bytes, bytes.len() as u64).unwrap();
        assert_eq!(*image.pixels().get_pixel(0, 0), Rgb([77, 77, 77]));
    }

    #[test]
    fn declared_size_at_ceiling_is_rejected_before_decode() {
        let err = ingest(b"definitely not an image", MAX_UPLOAD_BYTES).unwrap_err();
        match err {
            IngestError::SizeExceeded { size, limit } => {
                assert_eq!(size, MAX_UPLOAD_BYTES);
                assert_eq!(limit, 10 * 1024 * 1024);
            }
            other => panic!("expected SizeExceeded, got {other:?}"),
        }
    }

    #[test]
    fn actual_length_counts_even_if_declared_smaller() {
        let bytes = vec![0u8; MAX_UPLOAD_BYTES as usize + 1];
        assert!(matches!(
            ingest(&bytes, 10),
            Err(IngestError::SizeExceeded { .. })
        ));
    }

    #[test]
    fn garbage_bytes_are_decode_errors() {
        let err = ingest(b"invalid image data", 18).unwrap_err();
        assert!(matches!(err, IngestError::DecodeError(_)));
    }

    #[test]
    fn truncated_png_is_decode_error() {
        let bytes = encode(
            DynamicImage::ImageRgb8(RgbImage::new(16, 16)),
            ImageFormat::Png,
        );
        let truncated = &bytes[..bytes.len() / 2];
        assert!(matches!(
            ingest(truncated, truncated.len() as u64),
            Err(IngestError::DecodeError(_))
        ));
    }

    #[test]
    fn unsupported_encoding_is_rejected() {
        let bytes = encode(
            DynamicImage::ImageRgb8(RgbImage::new(2, 2)),
            ImageFormat::Tiff,
        );
        let err = ingest(&bytes, bytes.len() as u64).unwrap_err();
        match err {
            IngestError::DecodeError(message) => assert!(message.contains("tiff")),
            other => panic!("expected DecodeError, got {other:?}"),
        }
    }

    #[test]
    fn info_line_reports_pixels_and_kilobytes() {
        let bytes = red_jpeg_2x2();
        let image = ingest(&bytes, 2048).unwrap();
        assert_eq!(image.info_line(), "Image Info: 2x2 pixels, 2.0 KB");
        assert_eq!(image.fingerprint().len(), 64);
    }

    #[test]
    fn jpeg_reencode_round_trips_dimensions() -> anyhow::Result<()> {
        let bytes = red_jpeg_2x2();
        let image = ingest(&bytes, bytes.len() as u64)?;
        let jpeg = image.to_jpeg_bytes()?;
        let reloaded = image::load_from_memory_with_format(&jpeg, ImageFormat::Jpeg)?;
        assert_eq!((reloaded.width(), reloaded.height()), (2, 2));
        Ok(())
    }

    #[test]
    fn ingest_path_reads_file() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("red.jpg");
        fs::write(&path, red_jpeg_2x2())?;
        let image = ingest_path(&path)?;
        assert_eq!(image.dimensions(), (2, 2));
        Ok(())
    }

    #[test]
    fn ingest_path_missing_file_is_decode_error() {
        let err = ingest_path(Path::new("/nonexistent/glimpse/missing.png")).unwrap_err();
        assert!(matches!(err, IngestError::DecodeError(_)));
    }
}
