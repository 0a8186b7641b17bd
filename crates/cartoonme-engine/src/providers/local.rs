use anyhow::Result;
use cartoonme_contracts::events::EventWriter;
use cartoonme_contracts::params::normalize_theme_key;
use image::{DynamicImage, Rgb, RgbImage};
use serde_json::json;

use super::{ImageBytes, StylizeRequest, Stylizer};
use crate::imaging::{decode_image, encode_as};
use crate::util::map_object;

const POSTERIZE_LEVELS: u32 = 6;
const EDGE_THRESHOLD: i32 = 48;
const INK: Rgb<u8> = Rgb([24, 20, 20]);

/// On-device filter used when no remote back end is wanted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LocalEffect {
    /// Posterized color with dark outlines `line_width` pixels thick.
    Comic { line_width: u32 },
    Saturate { factor: f32 },
}

pub fn local_effect_for_theme(theme: &str) -> LocalEffect {
    match normalize_theme_key(theme).as_str() {
        "classic cartoon" => LocalEffect::Comic { line_width: 2 },
        "anime style" => LocalEffect::Saturate { factor: 1.5 },
        _ => LocalEffect::Comic { line_width: 1 },
    }
}

pub fn apply_local_effect(image: &DynamicImage, effect: LocalEffect) -> RgbImage {
    let rgb = image.to_rgb8();
    match effect {
        LocalEffect::Comic { line_width } => comic(&rgb, line_width.max(1)),
        LocalEffect::Saturate { factor } => saturate(&rgb, factor),
    }
}

fn luma(pixel: &Rgb<u8>) -> i32 {
    let [r, g, b] = pixel.0;
    (299 * i32::from(r) + 587 * i32::from(g) + 114 * i32::from(b)) / 1000
}

fn posterize(channel: u8) -> u8 {
    let steps = POSTERIZE_LEVELS - 1;
    let level = (u32::from(channel) * steps + 127) / 255;
    (level * 255 / steps) as u8
}

fn edge_mask(rgb: &RgbImage) -> Vec<bool> {
    let (width, height) = rgb.dimensions();
    let lum: Vec<i32> = rgb.pixels().map(luma).collect();
    let at = |x: u32, y: u32| lum[(y * width + x) as usize];
    let mut mask = vec![false; lum.len()];
    for y in 0..height {
        for x in 0..width {
            let dx = at((x + 1).min(width - 1), y) - at(x.saturating_sub(1), y);
            let dy = at(x, (y + 1).min(height - 1)) - at(x, y.saturating_sub(1));
            mask[(y * width + x) as usize] = dx.abs() + dy.abs() > EDGE_THRESHOLD;
        }
    }
    mask
}

fn comic(rgb: &RgbImage, line_width: u32) -> RgbImage {
    let (width, height) = rgb.dimensions();
    let edges = edge_mask(rgb);
    let radius = line_width - 1;
    let mut out = RgbImage::new(width, height);
    for (x, y, pixel) in rgb.enumerate_pixels() {
        let x_range = x.saturating_sub(radius)..=(x + radius).min(width - 1);
        let on_edge = (y.saturating_sub(radius)..=(y + radius).min(height - 1)).any(|ny| {
            x_range
                .clone()
                .any(|nx| edges[(ny * width + nx) as usize])
        });
        let value = if on_edge {
            INK
        } else {
            Rgb(pixel.0.map(posterize))
        };
        out.put_pixel(x, y, value);
    }
    out
}

fn saturate(rgb: &RgbImage, factor: f32) -> RgbImage {
    let mut out = rgb.clone();
    for pixel in out.pixels_mut() {
        let gray = luma(pixel) as f32;
        *pixel = Rgb(pixel
            .0
            .map(|channel| (gray + (f32::from(channel) - gray) * factor).clamp(0.0, 255.0) as u8));
    }
    out
}

/// Offline comic filter from the app's first release. It ignores the prompt
/// and control strength and only keys off the theme name.
pub struct LocalStylizer {
    jpeg_quality: u8,
}

impl LocalStylizer {
    pub fn new(jpeg_quality: u8) -> Self {
        Self { jpeg_quality }
    }
}

impl Stylizer for LocalStylizer {
    fn name(&self) -> &str {
        "local"
    }

    fn stylize(&self, request: &StylizeRequest, events: &EventWriter) -> Result<ImageBytes> {
        let effect = local_effect_for_theme(&request.theme);
        let _ = events.emit(
            "stylize_request",
            map_object(json!({
                "endpoint": "local",
                "theme": request.theme,
                "effect": format!("{effect:?}"),
                "output_format": request.params.output_format.as_str(),
            })),
        );
        let source = decode_image(&request.image.jpeg)?;
        let styled = DynamicImage::ImageRgb8(apply_local_effect(&source, effect));
        let format = request.params.output_format;
        Ok(ImageBytes {
            bytes: encode_as(&styled, format, self.jpeg_quality)?,
            mime_type: Some(format.mime_type().to_string()),
        })
    }
}
