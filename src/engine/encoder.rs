// src/engine/encoder.rs
//
// Encoder operations: alpha flattening onto white, JPEG via mozjpeg.

use crate::engine::common::{run_with_panic_policy, EngineResult};
use crate::engine::MAX_DIMENSION;
use crate::error::ConverterError;
use image::{DynamicImage, RgbImage};
use mozjpeg::{ColorSpace, Compress, ScanMode};
use rayon::prelude::*;
use std::borrow::Cow;

/// Below this many pixels the rayon split costs more than it saves.
const PARALLEL_FLATTEN_MIN_PIXELS: usize = 256 * 256;

/// Quality (0-100) to mozjpeg smoothing factor. Heavier smoothing at low quality hides
/// blocking; at 90+ it only blurs.
fn smoothing_for_quality(quality: u8) -> u8 {
    match quality {
        90..=u8::MAX => 0,
        70..=89 => 5,
        60..=69 => 10,
        _ => 18,
    }
}

/// Composite onto an opaque white background. JPEG has no alpha channel, and a
/// transparent pixel must come out white rather than whatever color it hides.
pub fn flatten_onto_white(img: &DynamicImage) -> Cow<'_, RgbImage> {
    if !img.color().has_alpha() {
        return match img {
            DynamicImage::ImageRgb8(rgb) => Cow::Borrowed(rgb),
            other => Cow::Owned(other.to_rgb8()),
        };
    }

    let rgba = img.to_rgba8();
    let (w, h) = rgba.dimensions();
    let src = rgba.as_raw();
    let mut out = vec![0u8; w as usize * h as usize * 3];

    let blend = |(dst, px): (&mut [u8], &[u8])| {
        let alpha = px[3] as u32;
        let inv = 255 - alpha;
        for c in 0..3 {
            dst[c] = ((px[c] as u32 * alpha + 255 * inv + 127) / 255) as u8;
        }
    };

    if (w as usize * h as usize) >= PARALLEL_FLATTEN_MIN_PIXELS {
        out.par_chunks_exact_mut(3)
            .zip(src.par_chunks_exact(4))
            .with_min_len(4096)
            .for_each(blend);
    } else {
        out.chunks_exact_mut(3).zip(src.chunks_exact(4)).for_each(blend);
    }

    // Buffer length is w * h * 3 by construction
    Cow::Owned(RgbImage::from_raw(w, h, out).unwrap_or_else(|| RgbImage::new(w, h)))
}

/// Encode an RGB image to progressive JPEG using mozjpeg.
pub fn encode_jpeg(rgb: &RgbImage, quality: u8) -> EngineResult<Vec<u8>> {
    run_with_panic_policy("encode:jpeg", || {
        let quality = quality.min(100);
        let (w, h) = rgb.dimensions();
        let pixels: &[u8] = rgb.as_raw();

        if w == 0 || h == 0 {
            return Err(ConverterError::encode_failed(
                "jpeg",
                "width or height is zero",
            ));
        }

        if w > MAX_DIMENSION || h > MAX_DIMENSION {
            return Err(ConverterError::dimension_exceeds_limit(
                w.max(h),
                MAX_DIMENSION,
            ));
        }

        let expected_len = (w as usize) * (h as usize) * 3;
        if pixels.len() != expected_len {
            return Err(ConverterError::encode_failed(
                "jpeg",
                format!(
                    "pixel buffer length {} does not match {}x{}",
                    pixels.len(),
                    w,
                    h
                ),
            ));
        }

        let mut comp = Compress::new(ColorSpace::JCS_RGB);
        comp.set_size(w as usize, h as usize);
        comp.set_color_space(ColorSpace::JCS_YCbCr);
        comp.set_quality(quality as f32);
        comp.set_chroma_sampling_pixel_sizes((2, 2), (2, 2));
        comp.set_progressive_mode();
        comp.set_optimize_coding(true);
        comp.set_optimize_scans(true);
        comp.set_scan_optimization_mode(ScanMode::AllComponentsTogether);
        comp.set_smoothing_factor(smoothing_for_quality(quality));

        let estimated_size = (w as usize * h as usize * 3 / 10).max(4096);
        let mut output = Vec::with_capacity(estimated_size);

        {
            let mut writer = comp.start_compress(&mut output).map_err(|e| {
                ConverterError::encode_failed(
                    "jpeg",
                    format!("mozjpeg: failed to start compress: {e:?}"),
                )
            })?;

            let stride = w as usize * 3;
            for row in pixels.chunks(stride) {
                writer.write_scanlines(row).map_err(|e| {
                    ConverterError::encode_failed(
                        "jpeg",
                        format!("mozjpeg: failed to write scanlines: {e:?}"),
                    )
                })?;
            }

            writer.finish().map_err(|e| {
                ConverterError::encode_failed("jpeg", format!("mozjpeg: failed to finish: {e:?}"))
            })?;
        }

        Ok(output)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, ImageFormat, Rgb, Rgba, RgbaImage};

    #[test]
    fn flatten_transparent_pixels_become_white() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(2, 2, Rgba([0, 0, 0, 0])));
        let flat = flatten_onto_white(&img);
        assert_eq!(flat.get_pixel(0, 0).0, [255, 255, 255]);
    }

    #[test]
    fn flatten_opaque_pixels_are_unchanged() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(2, 2, Rgba([12, 34, 56, 255])));
        let flat = flatten_onto_white(&img);
        assert_eq!(flat.get_pixel(1, 1).0, [12, 34, 56]);
    }

    #[test]
    fn flatten_half_alpha_blends_toward_white() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(1, 1, Rgba([0, 0, 0, 128])));
        let flat = flatten_onto_white(&img);
        let [r, g, b] = flat.get_pixel(0, 0).0;
        assert_eq!(r, g);
        assert_eq!(g, b);
        assert!((126..=128).contains(&r), "got {r}");
    }

    #[test]
    fn flatten_rgb_input_is_borrowed() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(2, 2, Rgb([1, 2, 3])));
        assert!(matches!(flatten_onto_white(&img), Cow::Borrowed(_)));
    }

    #[test]
    fn flatten_large_image_uses_parallel_path_consistently() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_fn(300, 300, |x, _| {
            Rgba([200, 100, 50, (x % 256) as u8])
        }));
        let flat = flatten_onto_white(&img);
        assert_eq!(flat.dimensions(), (300, 300));
        assert_eq!(flat.get_pixel(0, 10).0, [255, 255, 255]);
        assert_eq!(flat.get_pixel(255, 10).0, [200, 100, 50]);
    }

    #[test]
    fn encode_jpeg_produces_decodable_output() {
        let rgb = RgbImage::from_fn(16, 8, |x, y| Rgb([(x * 10) as u8, (y * 20) as u8, 128]));
        let jpeg = encode_jpeg(&rgb, 92).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        let decoded = image::load_from_memory_with_format(&jpeg, ImageFormat::Jpeg).unwrap();
        assert_eq!(decoded.dimensions(), (16, 8));
    }

    #[test]
    fn encode_jpeg_rejects_empty_image() {
        let rgb = RgbImage::new(0, 0);
        assert!(matches!(
            encode_jpeg(&rgb, 75),
            Err(ConverterError::EncodeFailed { .. })
        ));
    }

    #[test]
    fn lower_quality_is_not_larger() {
        let rgb = RgbImage::from_fn(64, 64, |x, y| {
            Rgb([(x * 4) as u8, (y * 4) as u8, ((x ^ y) * 4) as u8])
        });
        let best = encode_jpeg(&rgb, 92).unwrap();
        let optimized = encode_jpeg(&rgb, 75).unwrap();
        assert!(optimized.len() <= best.len());
    }
}
