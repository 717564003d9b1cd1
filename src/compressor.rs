use crate::constants::{
    AGGRESSIVE_ITERATIONS, AGGRESSIVE_MAX_DIMENSION, AGGRESSIVE_MAX_SIZE, AGGRESSIVE_QUALITY,
    AGGRESSIVE_THRESHOLD_BYTES, ALREADY_OPTIMAL_RATIO, CONSERVATIVE_ITERATIONS,
    CONSERVATIVE_MAX_DIMENSION, CONSERVATIVE_MAX_SIZE, CONSERVATIVE_QUALITY,
    CONSERVATIVE_THRESHOLD_BYTES, DEFAULT_ITERATIONS, DEFAULT_MAX_DIMENSION, DEFAULT_MAX_SIZE,
    DEFAULT_QUALITY, LIBDEFLATER_HIGH_LEVEL, LIBDEFLATER_LOW_LEVEL, LOSSLESS_SHRINK_FACTOR,
    MAX_IMAGE_DIMENSION, MIN_LOSSY_QUALITY, OXIPNG_PRESET, QUALITY_STEP, ZOPFLI_ITERATIONS,
};
use crate::error::{MigrateError, Result};
use crate::formats::{select_output_format, OutputFormat};
use crate::utils::{calculate_compression_ratio, create_progress_spinner, format_file_size};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::webp::WebPEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat};
use oxipng::{Deflaters, Options};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::num::NonZeroU8;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, warn};

/// Named compression targets, chosen by input size unless pinned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Preset {
    Aggressive,
    Default,
    Conservative,
}

impl Preset {
    /// Picks the preset for an input of `len` bytes.
    pub fn for_input_size(len: u64) -> Self {
        if len > AGGRESSIVE_THRESHOLD_BYTES {
            Preset::Aggressive
        } else if len < CONSERVATIVE_THRESHOLD_BYTES {
            Preset::Conservative
        } else {
            Preset::Default
        }
    }

    pub fn target(&self) -> CompressionTarget {
        let (max_size_bytes, max_dimension_px, initial_quality, max_iterations) = match self {
            Preset::Aggressive => (
                AGGRESSIVE_MAX_SIZE,
                AGGRESSIVE_MAX_DIMENSION,
                AGGRESSIVE_QUALITY,
                AGGRESSIVE_ITERATIONS,
            ),
            Preset::Default => (
                DEFAULT_MAX_SIZE,
                DEFAULT_MAX_DIMENSION,
                DEFAULT_QUALITY,
                DEFAULT_ITERATIONS,
            ),
            Preset::Conservative => (
                CONSERVATIVE_MAX_SIZE,
                CONSERVATIVE_MAX_DIMENSION,
                CONSERVATIVE_QUALITY,
                CONSERVATIVE_ITERATIONS,
            ),
        };

        CompressionTarget {
            max_size_bytes,
            max_dimension_px,
            initial_quality,
            max_iterations,
            output_format: None,
        }
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Preset::Aggressive => "aggressive",
            Preset::Default => "default",
            Preset::Conservative => "conservative",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for Preset {
    type Err = MigrateError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "aggressive" => Ok(Preset::Aggressive),
            "default" => Ok(Preset::Default),
            "conservative" => Ok(Preset::Conservative),
            _ => Err(MigrateError::InvalidTarget(format!("unknown preset '{}'", s))),
        }
    }
}

/// Size and quality bounds for a single compression call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressionTarget {
    pub max_size_bytes: u64,
    pub max_dimension_px: u32,
    /// Starting encoder quality in `0.0..=1.0`.
    pub initial_quality: f32,
    pub max_iterations: u32,
    /// `None` selects the format from the source image.
    pub output_format: Option<OutputFormat>,
}

impl CompressionTarget {
    pub fn new(
        max_size_bytes: u64,
        max_dimension_px: u32,
        initial_quality: f32,
        max_iterations: u32,
        output_format: Option<OutputFormat>,
    ) -> Result<Self> {
        if !(0.0..=1.0).contains(&initial_quality) {
            return Err(MigrateError::InvalidQuality(initial_quality));
        }
        if max_size_bytes == 0 || max_dimension_px == 0 {
            return Err(MigrateError::InvalidTarget(
                "size and dimension bounds must be positive".to_string(),
            ));
        }
        if max_iterations == 0 {
            return Err(MigrateError::InvalidTarget(
                "at least one iteration is required".to_string(),
            ));
        }

        Ok(Self {
            max_size_bytes,
            max_dimension_px,
            initial_quality,
            max_iterations,
            output_format,
        })
    }

    pub fn for_input_size(len: u64) -> Self {
        Preset::for_input_size(len).target()
    }

    fn initial_quality_percent(&self) -> u8 {
        (self.initial_quality * 100.0).round().clamp(1.0, 100.0) as u8
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompressionOutcome {
    Compressed,
    /// Nothing meaningfully smaller was produced.
    AlreadyOptimal,
    /// Compression failed internally; the input bytes were passed through.
    Degraded(String),
}

#[derive(Debug, Clone)]
pub struct CompressionResult {
    pub bytes: Vec<u8>,
    pub format: Option<ImageFormat>,
    pub size_bytes: u64,
    pub original_size_bytes: u64,
    pub quality: Option<u8>,
    pub iterations: u32,
    pub dimensions: Option<(u32, u32)>,
    pub outcome: CompressionOutcome,
}

impl CompressionResult {
    pub fn savings_bytes(&self) -> u64 {
        self.original_size_bytes.saturating_sub(self.size_bytes)
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self.outcome, CompressionOutcome::Degraded(_))
    }

    fn passthrough(bytes: &[u8], outcome: CompressionOutcome) -> Self {
        let size = bytes.len() as u64;
        Self {
            bytes: bytes.to_vec(),
            format: image::guess_format(bytes).ok(),
            size_bytes: size,
            original_size_bytes: size,
            quality: None,
            iterations: 0,
            dimensions: None,
            outcome,
        }
    }
}

struct Encoded {
    bytes: Vec<u8>,
    format: ImageFormat,
    quality: Option<u8>,
    iterations: u32,
    dimensions: (u32, u32),
}

/// Compresses an in-memory image towards `target`.
///
/// Only an empty buffer is an error. Decode or encode failures, including
/// panics inside a codec, return the input unchanged with a `Degraded`
/// outcome. The returned size never exceeds the input size.
pub fn compress(bytes: &[u8], target: &CompressionTarget) -> Result<CompressionResult> {
    if bytes.is_empty() {
        return Err(MigrateError::InvalidInput("empty image buffer".to_string()));
    }

    let original_size = bytes.len() as u64;
    let attempt = panic::catch_unwind(AssertUnwindSafe(|| encode_best(bytes, target)));

    let encoded = match attempt {
        Ok(Ok(encoded)) => encoded,
        Ok(Err(e)) => {
            warn!(error = %e, size = original_size, "compression failed, keeping original bytes");
            return Ok(CompressionResult::passthrough(
                bytes,
                CompressionOutcome::Degraded(e.to_string()),
            ));
        }
        Err(_) => {
            warn!(size = original_size, "image codec panicked, keeping original bytes");
            return Ok(CompressionResult::passthrough(
                bytes,
                CompressionOutcome::Degraded("image codec panicked".to_string()),
            ));
        }
    };

    let compressed_size = encoded.bytes.len() as u64;
    if compressed_size >= original_size {
        debug!(
            original = original_size,
            encoded = compressed_size,
            "re-encoding did not shrink the image"
        );
        return Ok(CompressionResult::passthrough(
            bytes,
            CompressionOutcome::AlreadyOptimal,
        ));
    }

    let outcome =
        if compressed_size as f64 >= original_size as f64 * ALREADY_OPTIMAL_RATIO {
            CompressionOutcome::AlreadyOptimal
        } else {
            CompressionOutcome::Compressed
        };

    Ok(CompressionResult {
        bytes: encoded.bytes,
        format: Some(encoded.format),
        size_bytes: compressed_size,
        original_size_bytes: original_size,
        quality: encoded.quality,
        iterations: encoded.iterations,
        dimensions: Some(encoded.dimensions),
        outcome,
    })
}

fn encode_best(bytes: &[u8], target: &CompressionTarget) -> Result<Encoded> {
    let source = image::guess_format(bytes)?;
    let mut img = image::load_from_memory_with_format(bytes, source)?;

    let (width, height) = img.dimensions();
    if width > MAX_IMAGE_DIMENSION || height > MAX_IMAGE_DIMENSION {
        return Err(MigrateError::InvalidDimensions(
            width,
            height,
            MAX_IMAGE_DIMENSION,
        ));
    }

    downscale_to_fit(&mut img, target.max_dimension_px);

    let format = select_output_format(source, img.color().has_alpha(), target.output_format);
    debug!(?source, output = %format, "selected output format");

    if format.is_lossy() {
        encode_lossy(&img, target)
    } else {
        encode_lossless(img, format, target)
    }
}

/// Shrinks `img` so its longest side is at most `max_dimension`.
pub fn downscale_to_fit(img: &mut DynamicImage, max_dimension: u32) {
    let (width, height) = img.dimensions();
    if width.max(height) > max_dimension {
        *img = img.resize(max_dimension, max_dimension, FilterType::Lanczos3);
        debug!(
            from = ?(width, height),
            to = ?img.dimensions(),
            "downscaled image"
        );
    }
}

fn encode_lossy(img: &DynamicImage, target: &CompressionTarget) -> Result<Encoded> {
    let mut quality = target.initial_quality_percent();
    let mut best: Option<Encoded> = None;

    for iteration in 1..=target.max_iterations {
        let bytes = encode_jpeg(img, quality)?;
        let size = bytes.len() as u64;
        debug!(iteration, quality, size, "jpeg pass");

        if best.as_ref().map_or(true, |b| bytes.len() < b.bytes.len()) {
            best = Some(Encoded {
                bytes,
                format: ImageFormat::Jpeg,
                quality: Some(quality),
                iterations: iteration,
                dimensions: img.dimensions(),
            });
        }
        if let Some(b) = best.as_mut() {
            b.iterations = iteration;
        }

        if size <= target.max_size_bytes || quality <= MIN_LOSSY_QUALITY {
            break;
        }
        quality = quality.saturating_sub(QUALITY_STEP).max(MIN_LOSSY_QUALITY);
    }

    best.ok_or_else(|| MigrateError::InvalidTarget("no encoding pass ran".to_string()))
}

fn encode_lossless(
    mut img: DynamicImage,
    format: OutputFormat,
    target: &CompressionTarget,
) -> Result<Encoded> {
    let quality = target.initial_quality_percent();
    let mut iteration = 1;

    loop {
        let bytes = match format {
            OutputFormat::WebP => encode_webp(&img)?,
            _ => encode_png(&img, quality)?,
        };
        let size = bytes.len() as u64;
        debug!(iteration, size, dimensions = ?img.dimensions(), "lossless pass");

        let (width, height) = img.dimensions();
        let next = (
            ((width as f32) * LOSSLESS_SHRINK_FACTOR).round().max(1.0) as u32,
            ((height as f32) * LOSSLESS_SHRINK_FACTOR).round().max(1.0) as u32,
        );
        let exhausted = iteration >= target.max_iterations || next == (width, height);

        if size <= target.max_size_bytes || exhausted {
            return Ok(Encoded {
                bytes,
                format: format.to_image_format(),
                quality: None,
                iterations: iteration,
                dimensions: (width, height),
            });
        }

        img = img.resize_exact(next.0, next.1, FilterType::Lanczos3);
        iteration += 1;
    }
}

/// Encodes `img` as a JPEG at `quality` (1-100).
pub fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
    rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut buf, quality))?;
    Ok(buf)
}

fn encode_png(img: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
    let mut raw = Vec::new();
    to_8bit(img).write_with_encoder(PngEncoder::new(&mut raw))?;

    let mut options = Options::from_preset(OXIPNG_PRESET);
    options.deflate = deflater_for_quality(quality);

    oxipng::optimize_from_memory(&raw, &options)
        .map_err(|e| MigrateError::PngOptimization(e.to_string()))
}

fn encode_webp(img: &DynamicImage) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    to_8bit(img).write_with_encoder(WebPEncoder::new_lossless(&mut buf))?;
    Ok(buf)
}

fn to_8bit(img: &DynamicImage) -> DynamicImage {
    if img.color().has_alpha() {
        DynamicImage::ImageRgba8(img.to_rgba8())
    } else {
        DynamicImage::ImageRgb8(img.to_rgb8())
    }
}

fn deflater_for_quality(quality: u8) -> Deflaters {
    if quality >= 90 {
        if let Some(iterations) = NonZeroU8::new(ZOPFLI_ITERATIONS) {
            return Deflaters::Zopfli { iterations };
        }
    }
    if quality >= 70 {
        Deflaters::Libdeflater {
            compression: LIBDEFLATER_HIGH_LEVEL,
        }
    } else {
        Deflaters::Libdeflater {
            compression: LIBDEFLATER_LOW_LEVEL,
        }
    }
}

/// Compresses a local file and writes the result to `output`.
///
/// Uses the size-selected preset unless `preset` is given.
pub fn compress_file(
    input: &Path,
    output: &Path,
    preset: Option<Preset>,
    format: Option<OutputFormat>,
) -> Result<CompressionResult> {
    println!("🗜️  Compressing image: {:?}", input);
    println!("📁 Output: {:?}", output);

    let pb = create_progress_spinner("Loading image...");
    let bytes = fs::read(input)?;
    let original_size = bytes.len() as u64;
    let preset = preset.unwrap_or_else(|| Preset::for_input_size(original_size));
    pb.set_message(format!("Compressing with {} preset...", preset));

    let target = CompressionTarget {
        output_format: format,
        ..preset.target()
    };
    let result = compress(&bytes, &target)?;

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(output, &result.bytes)?;
    pb.finish_with_message("✅ Compression complete");

    println!(
        "📊 Original size: {} ({})",
        original_size,
        format_file_size(original_size)
    );
    println!(
        "📈 Compressed size: {} ({})",
        result.size_bytes,
        format_file_size(result.size_bytes)
    );
    println!(
        "🎯 Compression ratio: {:.1}%",
        calculate_compression_ratio(original_size, result.size_bytes)
    );

    match &result.outcome {
        CompressionOutcome::Compressed => {
            println!("✅ Saved {}", format_file_size(result.savings_bytes()))
        }
        CompressionOutcome::AlreadyOptimal => println!("⚠️  Image was already close to optimal"),
        CompressionOutcome::Degraded(reason) => {
            println!("⚠️  Could not compress, original kept: {}", reason)
        }
    }

    Ok(result)
}
