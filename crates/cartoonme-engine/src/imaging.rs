use std::io::Cursor;

use anyhow::{bail, Context, Result};
use cartoonme_contracts::params::OutputFormat;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat};

/// JPEG upload produced from a source photo.
#[derive(Debug, Clone)]
pub struct PreparedImage {
    pub jpeg: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub source_width: u32,
    pub source_height: u32,
}

impl PreparedImage {
    pub fn was_resized(&self) -> bool {
        self.width != self.source_width || self.height != self.source_height
    }

    pub fn pixel_count(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage> {
    if bytes.is_empty() {
        bail!("image data is empty");
    }
    image::load_from_memory(bytes).context("failed decoding image data")
}

/// Largest size with the same aspect ratio whose pixel count stays within `max_pixels`.
///
/// Dimensions already within the ceiling come back unchanged.
pub fn fit_dimensions(width: u32, height: u32, max_pixels: u64) -> Result<(u32, u32)> {
    if width == 0 || height == 0 {
        bail!("image has zero width or height ({width}x{height})");
    }
    let current = u64::from(width) * u64::from(height);
    if current <= max_pixels {
        return Ok((width, height));
    }

    let aspect = f64::from(width) / f64::from(height);
    let mut new_height = (max_pixels as f64 / aspect).sqrt().floor() as u64;
    let mut new_width = (new_height as f64 * aspect).floor() as u64;
    // sqrt can land one step high; walk down until the ceiling holds.
    while new_height > 0 && new_width * new_height > max_pixels {
        new_height -= 1;
        new_width = (new_height as f64 * aspect).floor() as u64;
    }
    if new_width == 0 || new_height == 0 {
        bail!("cannot fit {width}x{height} into {max_pixels} pixels without a zero dimension");
    }
    Ok((new_width as u32, new_height as u32))
}

pub fn resize_to_fit(image: DynamicImage, max_pixels: u64) -> Result<DynamicImage> {
    let (width, height) = image.dimensions();
    let (new_width, new_height) = fit_dimensions(width, height, max_pixels)?;
    if (new_width, new_height) == (width, height) {
        return Ok(image);
    }
    Ok(image.resize_exact(new_width, new_height, FilterType::Triangle))
}

pub fn encode_jpeg(image: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
    let rgb = image.to_rgb8();
    let mut bytes = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut bytes, quality.clamp(1, 100));
    encoder
        .encode_image(&rgb)
        .context("failed to encode image as JPEG")?;
    Ok(bytes)
}

pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .context("failed to encode image as PNG")?;
    Ok(bytes)
}

pub fn encode_as(image: &DynamicImage, format: OutputFormat, jpeg_quality: u8) -> Result<Vec<u8>> {
    match format {
        OutputFormat::Png => encode_png(image),
        OutputFormat::Jpeg => encode_jpeg(image, jpeg_quality),
    }
}

/// Resizes a decoded photo under the pixel ceiling and encodes the upload.
pub fn prepare_image(image: &DynamicImage, max_pixels: u64, quality: u8) -> Result<PreparedImage> {
    let (source_width, source_height) = image.dimensions();
    let resized = resize_to_fit(image.clone(), max_pixels)?;
    let (width, height) = resized.dimensions();
    let jpeg = encode_jpeg(&resized, quality)?;
    Ok(PreparedImage {
        jpeg,
        width,
        height,
        source_width,
        source_height,
    })
}

pub fn prepare_upload(bytes: &[u8], max_pixels: u64, quality: u8) -> Result<PreparedImage> {
    let image = decode_image(bytes)?;
    prepare_image(&image, max_pixels, quality)
}

/// MIME type sniffed from the leading bytes of an encoded image.
pub fn sniff_mime_type(bytes: &[u8]) -> Option<&'static str> {
    image::guess_format(bytes)
        .ok()
        .map(|format| format.to_mime_type())
}
