//! Output format selection for re-encoded images
//!
//! Sources that typically carry transparency keep a lossless container;
//! photographic sources are re-encoded as JPEG.

use crate::error::{MigrateError, Result};
use image::ImageFormat;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Supported output image formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// JPEG format with lossy compression
    Jpeg,
    /// PNG format with lossless compression
    Png,
    /// WebP format (the encoder is lossless only)
    WebP,
}

impl OutputFormat {
    /// Convert to the image crate's ImageFormat
    pub fn to_image_format(&self) -> ImageFormat {
        match self {
            OutputFormat::Jpeg => ImageFormat::Jpeg,
            OutputFormat::Png => ImageFormat::Png,
            OutputFormat::WebP => ImageFormat::WebP,
        }
    }

    /// Whether re-encoding quality has any effect on size
    pub fn is_lossy(&self) -> bool {
        matches!(self, OutputFormat::Jpeg)
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OutputFormat::Jpeg => "JPEG",
            OutputFormat::Png => "PNG",
            OutputFormat::WebP => "WebP",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for OutputFormat {
    type Err = MigrateError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(OutputFormat::Jpeg),
            "png" => Ok(OutputFormat::Png),
            "webp" => Ok(OutputFormat::WebP),
            _ => Err(MigrateError::UnsupportedFormat(s.to_string())),
        }
    }
}

/// Pick the output format for a decoded image.
///
/// An explicit request always wins. Otherwise PNG and GIF sources become
/// PNG, WebP sources with an alpha channel stay WebP, and everything else is
/// re-encoded as JPEG.
pub fn select_output_format(
    source: ImageFormat,
    has_alpha: bool,
    requested: Option<OutputFormat>,
) -> OutputFormat {
    if let Some(format) = requested {
        return format;
    }

    match source {
        ImageFormat::Png | ImageFormat::Gif => OutputFormat::Png,
        ImageFormat::WebP if has_alpha => OutputFormat::WebP,
        _ => OutputFormat::Jpeg,
    }
}

/// File extension for a stored object of the given format
pub fn extension_for(format: Option<ImageFormat>) -> Option<&'static str> {
    format.and_then(|f| f.extensions_str().first().copied())
}

/// MIME type used when uploading an object of the given format
pub fn content_type_for(format: Option<ImageFormat>) -> &'static str {
    format
        .map(|f| f.to_mime_type())
        .unwrap_or("application/octet-stream")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_format_from_str() {
        assert_eq!(OutputFormat::from_str("jpeg").unwrap(), OutputFormat::Jpeg);
        assert_eq!(OutputFormat::from_str("jpg").unwrap(), OutputFormat::Jpeg);
        assert_eq!(OutputFormat::from_str("PNG").unwrap(), OutputFormat::Png);
        assert_eq!(OutputFormat::from_str("webp").unwrap(), OutputFormat::WebP);

        assert!(OutputFormat::from_str("heic").is_err());
    }

    #[test]
    fn test_select_output_format_keeps_transparency_formats() {
        assert_eq!(
            select_output_format(ImageFormat::Png, false, None),
            OutputFormat::Png
        );
        assert_eq!(
            select_output_format(ImageFormat::Gif, true, None),
            OutputFormat::Png
        );
        assert_eq!(
            select_output_format(ImageFormat::WebP, true, None),
            OutputFormat::WebP
        );
    }

    #[test]
    fn test_select_output_format_prefers_jpeg_for_photos() {
        assert_eq!(
            select_output_format(ImageFormat::Jpeg, false, None),
            OutputFormat::Jpeg
        );
        assert_eq!(
            select_output_format(ImageFormat::Bmp, false, None),
            OutputFormat::Jpeg
        );
        assert_eq!(
            select_output_format(ImageFormat::WebP, false, None),
            OutputFormat::Jpeg
        );
    }

    #[test]
    fn test_select_output_format_with_override() {
        assert_eq!(
            select_output_format(ImageFormat::Png, true, Some(OutputFormat::Jpeg)),
            OutputFormat::Jpeg
        );
    }

    #[test]
    fn test_content_type_and_extension() {
        assert_eq!(content_type_for(Some(ImageFormat::Jpeg)), "image/jpeg");
        assert_eq!(content_type_for(None), "application/octet-stream");
        assert_eq!(extension_for(Some(ImageFormat::Png)), Some("png"));
        assert_eq!(extension_for(Some(ImageFormat::Jpeg)), Some("jpg"));
        assert_eq!(extension_for(Some(ImageFormat::WebP)), Some("webp"));
        assert_eq!(extension_for(None), None);
    }

    #[test]
    fn test_output_format_display() {
        assert_eq!(format!("{}", OutputFormat::Jpeg), "JPEG");
        assert_eq!(format!("{}", OutputFormat::Png), "PNG");
        assert_eq!(format!("{}", OutputFormat::WebP), "WebP");
    }
}
