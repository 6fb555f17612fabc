use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, Luma};
use thiserror::Error;

/// Contrast limit for CLAHE, relative to a flat histogram.
const CLAHE_CLIP_LIMIT: f32 = 3.0;
/// CLAHE tiles per axis.
const CLAHE_TILE_GRID: u32 = 8;

const BILATERAL_DIAMETER: u32 = 9;
const BILATERAL_SIGMA_COLOR: f32 = 75.0;
const BILATERAL_SIGMA_SPACE: f32 = 75.0;

/// Neighborhood size of the Gaussian-weighted local mean (odd).
const THRESHOLD_BLOCK_SIZE: u32 = 11;
/// Subtracted from the local mean before comparing.
const THRESHOLD_OFFSET: i32 = 2;

/// Small screenshot glyphs recognize better after supersampling.
const UPSCALE_FACTOR: u32 = 3;

#[derive(Debug, Error)]
pub enum PreprocessError {
    #[error("image has no pixels ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },
}

/// Full enhancement chain for screenshot text.
///
/// grayscale → CLAHE → bilateral denoise → adaptive Gaussian threshold → 3x cubic upscale.
/// Deterministic; the only failure is an image without pixels.
pub fn enhance_for_ocr(img: &DynamicImage) -> Result<GrayImage, PreprocessError> {
    ensure_not_empty(img)?;

    let gray = to_grayscale(img);
    let contrast = apply_clahe(&gray, CLAHE_CLIP_LIMIT, CLAHE_TILE_GRID);
    let denoised = bilateral_filter(
        &contrast,
        BILATERAL_DIAMETER,
        BILATERAL_SIGMA_COLOR,
        BILATERAL_SIGMA_SPACE,
    );
    let binary = adaptive_threshold_gaussian(&denoised, THRESHOLD_BLOCK_SIZE, THRESHOLD_OFFSET);

    Ok(upscale(&binary, UPSCALE_FACTOR))
}

/// Plain global binarization of the raw image, used when the enhanced
/// passes find nothing.
///
/// Pixels brighter than `threshold` become white, everything else black.
pub fn threshold_global(img: &DynamicImage, threshold: u8) -> Result<GrayImage, PreprocessError> {
    ensure_not_empty(img)?;

    let mut gray = to_grayscale(img);
    for pixel in gray.pixels_mut() {
        pixel[0] = if pixel[0] > threshold { 255 } else { 0 };
    }
    Ok(gray)
}

fn ensure_not_empty(img: &DynamicImage) -> Result<(), PreprocessError> {
    let (width, height) = (img.width(), img.height());
    if width == 0 || height == 0 {
        return Err(PreprocessError::EmptyImage { width, height });
    }
    Ok(())
}

/// Converts any color mode to 8-bit luminance with ITU-R BT.601 weights.
pub fn to_grayscale(img: &DynamicImage) -> GrayImage {
    let rgb = img.to_rgb8();
    let (w, h) = rgb.dimensions();
    let mut gray = GrayImage::new(w, h);

    for (x, y, p) in rgb.enumerate_pixels() {
        let luma = 0.299 * p[0] as f32 + 0.587 * p[1] as f32 + 0.114 * p[2] as f32;
        gray.put_pixel(x, y, Luma([luma.round().clamp(0.0, 255.0) as u8]));
    }

    gray
}

/// Maps an out-of-range index back into `0..len` by mirroring around the
/// edge pixels (`gfedcb|abcdefgh|gfedcba`).
fn reflect_101(i: i64, len: u32) -> u32 {
    let len = len as i64;
    if len <= 1 {
        return 0;
    }
    let period = 2 * (len - 1);
    let mut i = i.rem_euclid(period);
    if i >= len {
        i = period - i;
    }
    i as u32
}

/// Contrast-limited adaptive histogram equalization.
///
/// The image is split into `grid`×`grid` tiles (mirrored at the edges when
/// the size is not a multiple of the grid). Each tile gets an equalization
/// table built from a histogram clipped at `clip_limit` times the flat bin
/// height, with the excess spread over all bins. Pixels are bilinearly
/// interpolated between the tables of the four nearest tile centers.
pub fn apply_clahe(img: &GrayImage, clip_limit: f32, grid: u32) -> GrayImage {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 || grid == 0 {
        return img.clone();
    }

    let tiles = grid as usize;
    let tile_w = w.div_ceil(grid);
    let tile_h = h.div_ceil(grid);
    let area = (tile_w * tile_h) as usize;

    let clip = if clip_limit > 0.0 {
        ((clip_limit * area as f32 / 256.0) as usize).max(1)
    } else {
        usize::MAX
    };
    let lut_scale = 255.0 / area as f32;

    let mut luts = vec![[0u8; 256]; tiles * tiles];

    for ty in 0..tiles {
        for tx in 0..tiles {
            let mut hist = [0usize; 256];
            let x0 = tx as i64 * tile_w as i64;
            let y0 = ty as i64 * tile_h as i64;
            for dy in 0..tile_h as i64 {
                let sy = reflect_101(y0 + dy, h);
                for dx in 0..tile_w as i64 {
                    let sx = reflect_101(x0 + dx, w);
                    hist[img.get_pixel(sx, sy)[0] as usize] += 1;
                }
            }

            clip_histogram(&mut hist, clip);

            let lut = &mut luts[ty * tiles + tx];
            let mut sum = 0usize;
            for (value, count) in hist.iter().enumerate() {
                sum += count;
                lut[value] = (sum as f32 * lut_scale).round().clamp(0.0, 255.0) as u8;
            }
        }
    }

    let inv_tw = 1.0 / tile_w as f32;
    let inv_th = 1.0 / tile_h as f32;
    let mut output = GrayImage::new(w, h);

    for (x, y, pixel) in img.enumerate_pixels() {
        let v = pixel[0] as usize;

        let txf = x as f32 * inv_tw - 0.5;
        let tx1 = txf.floor() as i64;
        let xa = txf - tx1 as f32;
        let tx2 = (tx1 + 1).min(tiles as i64 - 1) as usize;
        let tx1 = tx1.max(0) as usize;

        let tyf = y as f32 * inv_th - 0.5;
        let ty1 = tyf.floor() as i64;
        let ya = tyf - ty1 as f32;
        let ty2 = (ty1 + 1).min(tiles as i64 - 1) as usize;
        let ty1 = ty1.max(0) as usize;

        let top = luts[ty1 * tiles + tx1][v] as f32 * (1.0 - xa)
            + luts[ty1 * tiles + tx2][v] as f32 * xa;
        let bottom = luts[ty2 * tiles + tx1][v] as f32 * (1.0 - xa)
            + luts[ty2 * tiles + tx2][v] as f32 * xa;
        let value = top * (1.0 - ya) + bottom * ya;

        output.put_pixel(x, y, Luma([value.round().clamp(0.0, 255.0) as u8]));
    }

    output
}

/// Caps every bin at `clip` and redistributes the excess: an equal share to
/// all bins, then the remainder one count at a time with a fixed stride.
fn clip_histogram(hist: &mut [usize; 256], clip: usize) {
    let mut clipped = 0usize;
    for bin in hist.iter_mut() {
        if *bin > clip {
            clipped += *bin - clip;
            *bin = clip;
        }
    }

    let batch = clipped / 256;
    let mut residual = clipped - batch * 256;
    for bin in hist.iter_mut() {
        *bin += batch;
    }

    if residual > 0 {
        let step = (256 / residual).max(1);
        let mut i = 0;
        while i < 256 && residual > 0 {
            hist[i] += 1;
            i += step;
            residual -= 1;
        }
    }
}

/// Edge-preserving smoothing.
///
/// Each output pixel is the average of a circular neighborhood of
/// `diameter`, weighted by spatial distance and by intensity difference, so
/// flat areas are smoothed while strong glyph edges are kept.
pub fn bilateral_filter(
    img: &GrayImage,
    diameter: u32,
    sigma_color: f32,
    sigma_space: f32,
) -> GrayImage {
    let (w, h) = img.dimensions();
    let radius = (diameter / 2) as i64;

    let space_coeff = -0.5 / (sigma_space * sigma_space);
    let color_coeff = -0.5 / (sigma_color * sigma_color);

    let mut offsets: Vec<(i64, i64, f32)> = Vec::new();
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            let dist_sq = (dx * dx + dy * dy) as f32;
            if dist_sq.sqrt() > radius as f32 {
                continue;
            }
            offsets.push((dx, dy, (dist_sq * space_coeff).exp()));
        }
    }

    let mut color_weights = [0f32; 256];
    for (diff, weight) in color_weights.iter_mut().enumerate() {
        *weight = ((diff * diff) as f32 * color_coeff).exp();
    }

    let mut output = GrayImage::new(w, h);

    for (x, y, pixel) in img.enumerate_pixels() {
        let center = pixel[0] as i32;
        let mut sum = 0f32;
        let mut weight_sum = 0f32;

        for &(dx, dy, space_weight) in &offsets {
            let nx = reflect_101(x as i64 + dx, w);
            let ny = reflect_101(y as i64 + dy, h);
            let value = img.get_pixel(nx, ny)[0] as i32;
            let weight = space_weight * color_weights[(value - center).unsigned_abs() as usize];
            sum += value as f32 * weight;
            weight_sum += weight;
        }

        let value = if weight_sum > 0.0 {
            (sum / weight_sum).round().clamp(0.0, 255.0) as u8
        } else {
            center as u8
        };
        output.put_pixel(x, y, Luma([value]));
    }

    output
}

/// Binarizes against a Gaussian-weighted local mean.
///
/// A pixel becomes white when it is brighter than `mean - offset` of its
/// `block_size` neighborhood, black otherwise. Uneven backgrounds across a
/// screenshot therefore do not swallow the text.
pub fn adaptive_threshold_gaussian(img: &GrayImage, block_size: u32, offset: i32) -> GrayImage {
    let (w, h) = img.dimensions();
    let kernel = gaussian_kernel(block_size);
    let half = (kernel.len() / 2) as i64;

    // Separable blur, edges replicated
    let clamp = |i: i64, len: u32| i.clamp(0, len as i64 - 1) as u32;

    let mut horizontal = vec![0f32; (w * h) as usize];
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0f32;
            for (k, weight) in kernel.iter().enumerate() {
                let sx = clamp(x as i64 + k as i64 - half, w);
                acc += img.get_pixel(sx, y)[0] as f32 * weight;
            }
            horizontal[(y * w + x) as usize] = acc;
        }
    }

    let mut output = GrayImage::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0f32;
            for (k, weight) in kernel.iter().enumerate() {
                let sy = clamp(y as i64 + k as i64 - half, h);
                acc += horizontal[(sy * w + x) as usize] * weight;
            }
            let mean = acc.round().clamp(0.0, 255.0) as i32;
            let src = img.get_pixel(x, y)[0] as i32;
            let value = if src - mean > -offset { 255 } else { 0 };
            output.put_pixel(x, y, Luma([value]));
        }
    }

    output
}

/// Normalized 1-D Gaussian with the sigma OpenCV derives from the size.
fn gaussian_kernel(size: u32) -> Vec<f32> {
    let size = size.max(1) | 1;
    let sigma = 0.3 * ((size as f32 - 1.0) * 0.5 - 1.0) + 0.8;
    let half = (size / 2) as i32;
    let scale = -0.5 / (sigma * sigma);

    let raw: Vec<f32> = (-half..=half)
        .map(|i| ((i * i) as f32 * scale).exp())
        .collect();
    let total: f32 = raw.iter().sum();
    raw.into_iter().map(|v| v / total).collect()
}

/// Enlarges by an integer factor with cubic interpolation.
pub fn upscale(img: &GrayImage, factor: u32) -> GrayImage {
    let (w, h) = img.dimensions();
    image::imageops::resize(img, w * factor, h * factor, FilterType::CatmullRom)
}
