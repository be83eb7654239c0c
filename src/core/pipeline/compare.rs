//! Pixel comparison of before/after screenshots.
//!
//! Colour distance is measured in YIQ space with a per-pixel threshold on a 0..1 scale.
//! Pixels that look like anti-aliasing (a local brightness extreme with flat
//! neighbours in both images) are painted yellow in the diff and not counted.

use crate::core::error::AppError;
use crate::core::pipeline::render::BodyDimensions;
use crate::core::types::ErrorCategory;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::{ImageFormat, Rgba, RgbaImage};
use std::io::Cursor;

pub const DEFAULT_THRESHOLD: f64 = 0.1;

/// Mismatch percentage at or under which a comparison passes.
pub const DEFAULT_PASS_RATIO: f64 = 5.0;

/// Largest possible YIQ distance between two colours.
const MAX_YIQ_DELTA: f64 = 35215.0;

const DIFF_COLOR: [u8; 3] = [255, 0, 0];
const AA_COLOR: [u8; 3] = [255, 255, 0];
const FADE_ALPHA: f64 = 0.1;

#[derive(Debug, thiserror::Error)]
pub enum ComparisonError {
    #[error("could not decode image: {0}")]
    Decode(String),
    #[error("could not encode image: {0}")]
    Encode(String),
    #[error("image sizes do not match: {before:?} vs {after:?}")]
    DimensionMismatch { before: (u32, u32), after: (u32, u32) },
    #[error("threshold must be within [0, 1], got {0}")]
    InvalidThreshold(f64),
}

impl From<ComparisonError> for AppError {
    fn from(e: ComparisonError) -> Self {
        AppError::new(ErrorCategory::ComparisonError, e.to_string()).with_code("AMP-CMP-001")
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompareOptions {
    pub threshold: f64,
    /// Count anti-aliased pixels as mismatches.
    pub include_aa: bool,
}

impl Default for CompareOptions {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            include_aa: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Comparison {
    pub mismatched: u64,
    pub width: u32,
    pub height: u32,
    pub diff: RgbaImage,
}

impl Comparison {
    /// `mismatched / (width * height)`, in [0, 1].
    pub fn ratio(&self) -> f64 {
        let total = u64::from(self.width) * u64::from(self.height);
        if total == 0 {
            return 0.0;
        }
        self.mismatched as f64 / total as f64
    }

    pub fn percent(&self) -> f64 {
        self.ratio() * 100.0
    }

    pub fn passes(&self, pass_ratio: f64) -> bool {
        self.percent() <= pass_ratio
    }
}

pub fn decode_png(bytes: &[u8]) -> Result<RgbaImage, ComparisonError> {
    image::load_from_memory(bytes)
        .map(|decoded| decoded.to_rgba8())
        .map_err(|err| ComparisonError::Decode(err.to_string()))
}

pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, ComparisonError> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .map_err(|err| ComparisonError::Encode(err.to_string()))?;
    Ok(bytes)
}

/// Compare two PNG-encoded screenshots.
pub fn compare_png(
    before: &[u8],
    after: &[u8],
    options: CompareOptions,
) -> Result<Comparison, ComparisonError> {
    compare(&decode_png(before)?, &decode_png(after)?, options)
}

pub fn compare(
    before: &RgbaImage,
    after: &RgbaImage,
    options: CompareOptions,
) -> Result<Comparison, ComparisonError> {
    if !(0.0..=1.0).contains(&options.threshold) {
        return Err(ComparisonError::InvalidThreshold(options.threshold));
    }
    if before.dimensions() != after.dimensions() {
        return Err(ComparisonError::DimensionMismatch {
            before: before.dimensions(),
            after: after.dimensions(),
        });
    }

    let (width, height) = before.dimensions();
    let max_delta = MAX_YIQ_DELTA * options.threshold * options.threshold;
    let mut diff = RgbaImage::new(width, height);
    let mut mismatched = 0;

    for y in 0..height {
        for x in 0..width {
            let a = before.get_pixel(x, y);
            let b = after.get_pixel(x, y);
            let delta = color_delta(a, b, false);
            if delta.abs() > max_delta {
                let anti_aliased = !options.include_aa
                    && (anti_aliased(before, after, x, y) || anti_aliased(after, before, x, y));
                if anti_aliased {
                    diff.put_pixel(x, y, solid(AA_COLOR));
                } else {
                    diff.put_pixel(x, y, solid(DIFF_COLOR));
                    mismatched += 1;
                }
            } else {
                diff.put_pixel(x, y, faded(a));
            }
        }
    }

    Ok(Comparison {
        mismatched,
        width,
        height,
        diff,
    })
}

/// Page showing `screenshot` as a background sized to the original body, used to bring a
/// converted screenshot to the original page's dimensions before comparing.
pub fn replacement_page(screenshot: &[u8], body: BodyDimensions) -> String {
    format!(
        concat!(
            "<!DOCTYPE html><html><head>",
            "<meta name=\"viewport\" content=\"width=device-width,minimum-scale=1,initial-scale=1\">",
            "</head><body style=\"padding:0;margin:0;\">",
            "<div style=\"padding:0;margin:0;max-height:{h}px;height:{h}px;width:{w}px;",
            "background:url(data:image/png;base64,{data}) no-repeat;background-size:contain;\"></div>",
            "</body></html>"
        ),
        h = body.height,
        w = body.width,
        data = STANDARD.encode(screenshot),
    )
}

fn solid(rgb: [u8; 3]) -> Rgba<u8> {
    Rgba([rgb[0], rgb[1], rgb[2], 255])
}

fn faded(pixel: &Rgba<u8>) -> Rgba<u8> {
    let [r, g, b, a] = pixel.0;
    let luma = rgb_to_y(f64::from(r), f64::from(g), f64::from(b));
    let value = blend(luma, FADE_ALPHA * f64::from(a) / 255.0).clamp(0.0, 255.0) as u8;
    Rgba([value, value, value, 255])
}

fn blend(channel: f64, alpha: f64) -> f64 {
    255.0 + (channel - 255.0) * alpha
}

fn rgb_to_y(r: f64, g: f64, b: f64) -> f64 {
    r * 0.298_895_31 + g * 0.586_622_47 + b * 0.114_482_23
}

fn rgb_to_i(r: f64, g: f64, b: f64) -> f64 {
    r * 0.595_977_99 - g * 0.274_176_10 - b * 0.321_801_89
}

fn rgb_to_q(r: f64, g: f64, b: f64) -> f64 {
    r * 0.211_470_17 - g * 0.522_617_11 + b * 0.311_146_94
}

fn blended(pixel: &Rgba<u8>) -> (f64, f64, f64) {
    let [r, g, b, a] = pixel.0;
    let (r, g, b) = (f64::from(r), f64::from(g), f64::from(b));
    if a == 255 {
        return (r, g, b);
    }
    let alpha = f64::from(a) / 255.0;
    (blend(r, alpha), blend(g, alpha), blend(b, alpha))
}

/// Signed YIQ distance; negative when the first pixel is brighter.
fn color_delta(a: &Rgba<u8>, b: &Rgba<u8>, luma_only: bool) -> f64 {
    if a == b {
        return 0.0;
    }
    let (r1, g1, b1) = blended(a);
    let (r2, g2, b2) = blended(b);
    let y1 = rgb_to_y(r1, g1, b1);
    let y2 = rgb_to_y(r2, g2, b2);
    let y = y1 - y2;
    if luma_only {
        return y;
    }
    let i = rgb_to_i(r1, g1, b1) - rgb_to_i(r2, g2, b2);
    let q = rgb_to_q(r1, g1, b1) - rgb_to_q(r2, g2, b2);
    let delta = 0.5053 * y * y + 0.299 * i * i + 0.1957 * q * q;
    if y1 > y2 {
        -delta
    } else {
        delta
    }
}

fn neighbourhood(image: &RgbaImage, x: u32, y: u32) -> (u32, u32, u32, u32) {
    let (width, height) = image.dimensions();
    (
        x.saturating_sub(1),
        y.saturating_sub(1),
        (x + 1).min(width - 1),
        (y + 1).min(height - 1),
    )
}

fn anti_aliased(image: &RgbaImage, other: &RgbaImage, x: u32, y: u32) -> bool {
    let (x0, y0, x2, y2) = neighbourhood(image, x, y);
    let center = image.get_pixel(x, y);
    let mut zeroes = u32::from(x == x0 || x == x2 || y == y0 || y == y2);
    let mut min = 0.0;
    let mut max = 0.0;
    let mut darkest = (0, 0);
    let mut brightest = (0, 0);

    for nx in x0..=x2 {
        for ny in y0..=y2 {
            if nx == x && ny == y {
                continue;
            }
            let delta = color_delta(center, image.get_pixel(nx, ny), true);
            if delta == 0.0 {
                zeroes += 1;
                if zeroes > 2 {
                    return false;
                }
            } else if delta < min {
                min = delta;
                darkest = (nx, ny);
            } else if delta > max {
                max = delta;
                brightest = (nx, ny);
            }
        }
    }

    if min == 0.0 || max == 0.0 {
        return false;
    }
    (has_many_siblings(image, darkest) && has_many_siblings(other, darkest))
        || (has_many_siblings(image, brightest) && has_many_siblings(other, brightest))
}

fn has_many_siblings(image: &RgbaImage, (x, y): (u32, u32)) -> bool {
    let (x0, y0, x2, y2) = neighbourhood(image, x, y);
    let center = image.get_pixel(x, y);
    let mut zeroes = u32::from(x == x0 || x == x2 || y == y0 || y == y2);
    for nx in x0..=x2 {
        for ny in y0..=y2 {
            if nx == x && ny == y {
                continue;
            }
            if image.get_pixel(nx, ny) == center {
                zeroes += 1;
                if zeroes > 2 {
                    return true;
                }
            }
        }
    }
    false
}
