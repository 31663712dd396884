//! In-memory image representation and the pixel operations the pipeline
//! needs. Two storage types are carried explicitly: 8-bit sources stay
//! `U8`, while 16-bit and float sources are normalized to `F32` in [0, 1]
//! so inversion and channel math stay depth-correct.

use std::path::Path;

use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageBuffer, Luma, LumaA, Pixel, Rgb, Rgba};
use tracing::debug;

use crate::error::ImageError;
use crate::rules::ResizeMode;

#[derive(Debug, Clone, PartialEq)]
pub enum PixelData {
    U8(Vec<u8>),
    F32(Vec<f32>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MapImage {
    pub width: u32,
    pub height: u32,
    pub channels: u8,
    pub data: PixelData,
}

impl MapImage {
    pub fn new_u8(width: u32, height: u32, channels: u8, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            channels,
            data: PixelData::U8(data),
        }
    }

    /// Uniformly filled 8-bit image, used for merge channel fallbacks.
    pub fn filled_u8(width: u32, height: u32, channels: u8, value: u8) -> Self {
        Self::new_u8(
            width,
            height,
            channels,
            vec![value; (width * height) as usize * channels as usize],
        )
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Inverts every channel, depth-correct: `255 - x` for 8-bit data,
    /// `1.0 - x` for float data. Involutive.
    pub fn invert(&mut self) {
        match &mut self.data {
            PixelData::U8(data) => {
                for x in data.iter_mut() {
                    *x = 255 - *x;
                }
            }
            PixelData::F32(data) => {
                for x in data.iter_mut() {
                    *x = 1.0 - *x;
                }
            }
        }
    }

    /// Inverts a single channel. No-op when the index is out of range.
    pub fn invert_channel(&mut self, channel: usize) {
        let stride = self.channels as usize;
        if channel >= stride {
            return;
        }
        match &mut self.data {
            PixelData::U8(data) => {
                for px in data.chunks_exact_mut(stride) {
                    px[channel] = 255 - px[channel];
                }
            }
            PixelData::F32(data) => {
                for px in data.chunks_exact_mut(stride) {
                    px[channel] = 1.0 - px[channel];
                }
            }
        }
    }

    /// Swaps the red and blue channels in place. No-op below 3 channels.
    pub fn swap_red_blue(&mut self) {
        let stride = self.channels as usize;
        if stride < 3 {
            return;
        }
        match &mut self.data {
            PixelData::U8(data) => {
                for px in data.chunks_exact_mut(stride) {
                    px.swap(0, 2);
                }
            }
            PixelData::F32(data) => {
                for px in data.chunks_exact_mut(stride) {
                    px.swap(0, 2);
                }
            }
        }
    }

    /// Copies one channel out as a single-channel image. Returns `None`
    /// when the index is out of range.
    pub fn extract_channel(&self, channel: usize) -> Option<MapImage> {
        let stride = self.channels as usize;
        if channel >= stride {
            return None;
        }
        let data = match &self.data {
            PixelData::U8(data) => PixelData::U8(
                data.chunks_exact(stride).map(|px| px[channel]).collect(),
            ),
            PixelData::F32(data) => PixelData::F32(
                data.chunks_exact(stride).map(|px| px[channel]).collect(),
            ),
        };
        Some(MapImage {
            width: self.width,
            height: self.height,
            channels: 1,
            data,
        })
    }

    /// Reads channel `channel` of pixel `index` as an 8-bit value,
    /// quantizing float data.
    pub fn channel_value_u8(&self, index: usize, channel: usize) -> u8 {
        let stride = self.channels as usize;
        let offset = index * stride + channel;
        match &self.data {
            PixelData::U8(data) => data.get(offset).copied().unwrap_or(0),
            PixelData::F32(data) => data
                .get(offset)
                .map(|v| (v.clamp(0.0, 1.0) * 255.0).round() as u8)
                .unwrap_or(0),
        }
    }
}

pub fn load_image(path: &Path) -> Result<MapImage, ImageError> {
    let dynamic = image::open(path).map_err(|e| ImageError::Load {
        path: path.to_path_buf(),
        source: e,
    })?;

    let img = match dynamic {
        DynamicImage::ImageLuma8(buf) => {
            let (w, h) = buf.dimensions();
            MapImage::new_u8(w, h, 1, buf.into_raw())
        }
        DynamicImage::ImageLumaA8(buf) => {
            let (w, h) = buf.dimensions();
            MapImage::new_u8(w, h, 2, buf.into_raw())
        }
        DynamicImage::ImageRgb8(buf) => {
            let (w, h) = buf.dimensions();
            MapImage::new_u8(w, h, 3, buf.into_raw())
        }
        DynamicImage::ImageRgba8(buf) => {
            let (w, h) = buf.dimensions();
            MapImage::new_u8(w, h, 4, buf.into_raw())
        }
        DynamicImage::ImageLuma16(buf) => {
            let (w, h) = buf.dimensions();
            MapImage {
                width: w,
                height: h,
                channels: 1,
                data: PixelData::F32(normalize_u16(buf.into_raw())),
            }
        }
        DynamicImage::ImageLumaA16(buf) => {
            let (w, h) = buf.dimensions();
            MapImage {
                width: w,
                height: h,
                channels: 2,
                data: PixelData::F32(normalize_u16(buf.into_raw())),
            }
        }
        DynamicImage::ImageRgb16(buf) => {
            let (w, h) = buf.dimensions();
            MapImage {
                width: w,
                height: h,
                channels: 3,
                data: PixelData::F32(normalize_u16(buf.into_raw())),
            }
        }
        DynamicImage::ImageRgba16(buf) => {
            let (w, h) = buf.dimensions();
            MapImage {
                width: w,
                height: h,
                channels: 4,
                data: PixelData::F32(normalize_u16(buf.into_raw())),
            }
        }
        DynamicImage::ImageRgb32F(buf) => {
            let (w, h) = buf.dimensions();
            MapImage {
                width: w,
                height: h,
                channels: 3,
                data: PixelData::F32(buf.into_raw()),
            }
        }
        DynamicImage::ImageRgba32F(buf) => {
            let (w, h) = buf.dimensions();
            MapImage {
                width: w,
                height: h,
                channels: 4,
                data: PixelData::F32(buf.into_raw()),
            }
        }
        other => {
            let buf = other.to_rgba8();
            let (w, h) = buf.dimensions();
            MapImage::new_u8(w, h, 4, buf.into_raw())
        }
    };

    debug!(
        path = %path.display(),
        width = img.width,
        height = img.height,
        channels = img.channels,
        "loaded image"
    );
    Ok(img)
}

fn normalize_u16(data: Vec<u16>) -> Vec<f32> {
    data.into_iter().map(|v| v as f32 / u16::MAX as f32).collect()
}

/// Writes the image to `path`, creating parent directories. 8-bit data
/// uses the format implied by the extension (PNG, JPEG, TIFF); float data
/// requires an `.exr` extension.
pub fn save_image(path: &Path, img: &MapImage) -> Result<(), ImageError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ImageError::CreateDirectory {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }

    let save_err = |e: image::ImageError| ImageError::Save {
        path: path.to_path_buf(),
        source: e,
    };

    match &img.data {
        PixelData::U8(data) => {
            let dynamic = match img.channels {
                1 => buffer_from_raw::<Luma<u8>>(img.width, img.height, data.clone())
                    .map(DynamicImage::ImageLuma8),
                2 => buffer_from_raw::<LumaA<u8>>(img.width, img.height, data.clone())
                    .map(DynamicImage::ImageLumaA8),
                3 => buffer_from_raw::<Rgb<u8>>(img.width, img.height, data.clone())
                    .map(DynamicImage::ImageRgb8),
                4 => buffer_from_raw::<Rgba<u8>>(img.width, img.height, data.clone())
                    .map(DynamicImage::ImageRgba8),
                _ => None,
            };
            let dynamic = dynamic.ok_or_else(|| ImageError::UnsupportedLayout {
                path: path.to_path_buf(),
                reason: format!(
                    "{} channels with {} bytes of pixel data",
                    img.channels,
                    data.len()
                ),
            })?;
            dynamic.save(path).map_err(save_err)?;
        }
        PixelData::F32(data) => {
            let is_exr = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.eq_ignore_ascii_case("exr"))
                .unwrap_or(false);
            if !is_exr {
                return Err(ImageError::FloatFormat {
                    extension: path
                        .extension()
                        .and_then(|e| e.to_str())
                        .unwrap_or("")
                        .to_string(),
                });
            }
            // EXR stores RGB or RGBA; narrower layouts are widened.
            let dynamic = match img.channels {
                1 => {
                    let widened: Vec<f32> =
                        data.iter().flat_map(|v| [*v, *v, *v]).collect();
                    buffer_from_raw::<Rgb<f32>>(img.width, img.height, widened)
                        .map(DynamicImage::ImageRgb32F)
                }
                2 => {
                    let widened: Vec<f32> = data
                        .chunks_exact(2)
                        .flat_map(|px| [px[0], px[0], px[0], px[1]])
                        .collect();
                    buffer_from_raw::<Rgba<f32>>(img.width, img.height, widened)
                        .map(DynamicImage::ImageRgba32F)
                }
                3 => buffer_from_raw::<Rgb<f32>>(img.width, img.height, data.clone())
                    .map(DynamicImage::ImageRgb32F),
                4 => buffer_from_raw::<Rgba<f32>>(img.width, img.height, data.clone())
                    .map(DynamicImage::ImageRgba32F),
                _ => None,
            };
            let dynamic = dynamic.ok_or_else(|| ImageError::UnsupportedLayout {
                path: path.to_path_buf(),
                reason: format!(
                    "{} channels with {} float samples",
                    img.channels,
                    data.len()
                ),
            })?;
            dynamic.save(path).map_err(save_err)?;
        }
    }

    debug!(path = %path.display(), "saved image");
    Ok(())
}

fn buffer_from_raw<P>(
    width: u32,
    height: u32,
    data: Vec<P::Subpixel>,
) -> Option<ImageBuffer<P, Vec<P::Subpixel>>>
where
    P: Pixel,
{
    ImageBuffer::from_raw(width, height, data)
}

/// Resamples to `width` x `height`, preserving channel count and storage
/// type. Returns the input unchanged when the pixel buffer is inconsistent.
pub fn resize_image(img: &MapImage, width: u32, height: u32) -> MapImage {
    if (width, height) == img.dimensions() {
        return img.clone();
    }

    let filter = FilterType::Lanczos3;
    let resized = match &img.data {
        PixelData::U8(data) => match img.channels {
            1 => resize_plane::<Luma<u8>>(img, data.clone(), width, height, filter).map(PixelData::U8),
            2 => resize_plane::<LumaA<u8>>(img, data.clone(), width, height, filter).map(PixelData::U8),
            3 => resize_plane::<Rgb<u8>>(img, data.clone(), width, height, filter).map(PixelData::U8),
            4 => resize_plane::<Rgba<u8>>(img, data.clone(), width, height, filter).map(PixelData::U8),
            _ => None,
        },
        PixelData::F32(data) => match img.channels {
            1 => resize_plane::<Luma<f32>>(img, data.clone(), width, height, filter).map(PixelData::F32),
            2 => resize_plane::<LumaA<f32>>(img, data.clone(), width, height, filter).map(PixelData::F32),
            3 => resize_plane::<Rgb<f32>>(img, data.clone(), width, height, filter).map(PixelData::F32),
            4 => resize_plane::<Rgba<f32>>(img, data.clone(), width, height, filter).map(PixelData::F32),
            _ => None,
        },
    };

    match resized {
        Some(data) => MapImage {
            width,
            height,
            channels: img.channels,
            data,
        },
        None => img.clone(),
    }
}

fn resize_plane<P>(
    img: &MapImage,
    data: Vec<P::Subpixel>,
    width: u32,
    height: u32,
    filter: FilterType,
) -> Option<Vec<P::Subpixel>>
where
    P: Pixel + 'static,
    P::Subpixel: 'static,
{
    let buf: ImageBuffer<P, Vec<P::Subpixel>> =
        ImageBuffer::from_raw(img.width, img.height, data)?;
    Some(imageops::resize(&buf, width, height, filter).into_raw())
}

/// Computes the dimensions a map should be resized to.
///
/// `Fit` scales uniformly so the image fits inside the target box;
/// `Stretch` takes the target exactly. With `ensure_pot` each axis is
/// rounded to the nearest power of two. Without `allow_upscale` the
/// result never exceeds the source on either axis.
pub fn calculate_target_dimensions(
    original: (u32, u32),
    target: (u32, u32),
    mode: ResizeMode,
    ensure_pot: bool,
    allow_upscale: bool,
) -> (u32, u32) {
    let (ow, oh) = original;
    let (tw, th) = target;
    if ow == 0 || oh == 0 || tw == 0 || th == 0 {
        return original;
    }

    let (mut w, mut h) = match mode {
        ResizeMode::Stretch => (tw, th),
        ResizeMode::Fit => {
            let scale = (tw as f64 / ow as f64).min(th as f64 / oh as f64);
            (
                ((ow as f64 * scale).round() as u32).max(1),
                ((oh as f64 * scale).round() as u32).max(1),
            )
        }
    };

    if !allow_upscale {
        w = w.min(ow);
        h = h.min(oh);
    }

    if ensure_pot {
        w = nearest_power_of_two(w);
        h = nearest_power_of_two(h);
        if !allow_upscale {
            while w > ow && w > 1 {
                w /= 2;
            }
            while h > oh && h > 1 {
                h /= 2;
            }
        }
    }

    (w, h)
}

fn nearest_power_of_two(value: u32) -> u32 {
    if value <= 1 {
        return 1;
    }
    let lower = 1u32 << (31 - value.leading_zeros());
    let upper = lower.saturating_mul(2);
    if value - lower <= upper - value {
        lower
    } else {
        upper
    }
}

/// Human-readable resolution label used in paths and metadata: "1K", "2K"
/// and so on for square power-of-two sizes, otherwise "WxH".
pub fn resolution_key(width: u32, height: u32) -> String {
    if width == height && width >= 1024 && width.is_power_of_two() {
        format!("{}K", width / 1024)
    } else {
        format!("{}x{}", width, height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_invert_u8_involutive() {
        let mut img = MapImage::new_u8(2, 1, 1, vec![0, 200]);
        img.invert();
        assert_eq!(img.data, PixelData::U8(vec![255, 55]));
        img.invert();
        assert_eq!(img.data, PixelData::U8(vec![0, 200]));
    }

    #[test]
    fn test_invert_f32() {
        let mut img = MapImage {
            width: 2,
            height: 1,
            channels: 1,
            data: PixelData::F32(vec![0.25, 1.0]),
        };
        img.invert();
        assert_eq!(img.data, PixelData::F32(vec![0.75, 0.0]));
    }

    #[test]
    fn test_invert_single_channel() {
        let mut img = MapImage::new_u8(1, 1, 3, vec![10, 20, 30]);
        img.invert_channel(1);
        assert_eq!(img.data, PixelData::U8(vec![10, 235, 30]));
    }

    #[test]
    fn test_invert_channel_out_of_range_is_noop() {
        let mut img = MapImage::new_u8(1, 1, 1, vec![10]);
        img.invert_channel(2);
        assert_eq!(img.data, PixelData::U8(vec![10]));
    }

    #[test]
    fn test_swap_red_blue() {
        let mut img = MapImage::new_u8(2, 1, 3, vec![1, 2, 3, 4, 5, 6]);
        img.swap_red_blue();
        assert_eq!(img.data, PixelData::U8(vec![3, 2, 1, 6, 5, 4]));
    }

    #[test]
    fn test_swap_red_blue_grayscale_noop() {
        let mut img = MapImage::new_u8(2, 1, 1, vec![1, 2]);
        img.swap_red_blue();
        assert_eq!(img.data, PixelData::U8(vec![1, 2]));
    }

    #[test]
    fn test_extract_channel() {
        let img = MapImage::new_u8(2, 1, 4, vec![1, 2, 3, 4, 5, 6, 7, 8]);
        let alpha = img.extract_channel(3).unwrap();
        assert_eq!(alpha.channels, 1);
        assert_eq!(alpha.data, PixelData::U8(vec![4, 8]));
        assert!(img.extract_channel(4).is_none());
    }

    #[test]
    fn test_resize_dimensions_and_channels() {
        let img = MapImage::filled_u8(8, 8, 3, 100);
        let resized = resize_image(&img, 4, 4);
        assert_eq!(resized.dimensions(), (4, 4));
        assert_eq!(resized.channels, 3);
        match resized.data {
            PixelData::U8(data) => assert_eq!(data.len(), 4 * 4 * 3),
            _ => panic!("expected u8 data"),
        }
    }

    #[test]
    fn test_resize_same_dimensions_is_identity() {
        let img = MapImage::filled_u8(8, 8, 1, 42);
        assert_eq!(resize_image(&img, 8, 8), img);
    }

    #[test]
    fn test_target_dimensions_fit() {
        let dims = calculate_target_dimensions((4096, 2048), (1024, 1024), ResizeMode::Fit, false, false);
        assert_eq!(dims, (1024, 512));
    }

    #[test]
    fn test_target_dimensions_stretch() {
        let dims =
            calculate_target_dimensions((4096, 2048), (1024, 1024), ResizeMode::Stretch, false, false);
        assert_eq!(dims, (1024, 1024));
    }

    #[test]
    fn test_target_dimensions_no_upscale() {
        let dims = calculate_target_dimensions((512, 512), (2048, 2048), ResizeMode::Fit, false, false);
        assert_eq!(dims, (512, 512));
    }

    #[test]
    fn test_target_dimensions_upscale_allowed() {
        let dims = calculate_target_dimensions((512, 512), (2048, 2048), ResizeMode::Fit, false, true);
        assert_eq!(dims, (2048, 2048));
    }

    #[test]
    fn test_target_dimensions_pot_rounding() {
        let dims = calculate_target_dimensions((4000, 4000), (900, 900), ResizeMode::Stretch, true, false);
        assert_eq!(dims, (1024, 1024));
        // POT rounding must not upscale past the source when disallowed
        let clamped =
            calculate_target_dimensions((900, 900), (900, 900), ResizeMode::Stretch, true, false);
        assert_eq!(clamped, (512, 512));
    }

    #[test]
    fn test_nearest_power_of_two() {
        assert_eq!(nearest_power_of_two(1), 1);
        assert_eq!(nearest_power_of_two(3), 4);
        assert_eq!(nearest_power_of_two(5), 4);
        assert_eq!(nearest_power_of_two(7), 8);
        assert_eq!(nearest_power_of_two(1024), 1024);
    }

    #[test]
    fn test_resolution_key() {
        assert_eq!(resolution_key(1024, 1024), "1K");
        assert_eq!(resolution_key(2048, 2048), "2K");
        assert_eq!(resolution_key(4096, 4096), "4K");
        assert_eq!(resolution_key(512, 512), "512x512");
        assert_eq!(resolution_key(2048, 1024), "2048x1024");
    }

    #[test]
    fn test_save_and_load_png() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/out.png");
        let img = MapImage::new_u8(2, 2, 3, vec![
            255, 0, 0, 0, 255, 0, //
            0, 0, 255, 128, 128, 128,
        ]);
        save_image(&path, &img).unwrap();

        let loaded = load_image(&path).unwrap();
        assert_eq!(loaded, img);
    }

    #[test]
    fn test_save_float_requires_exr() {
        let dir = TempDir::new().unwrap();
        let img = MapImage {
            width: 1,
            height: 1,
            channels: 3,
            data: PixelData::F32(vec![0.1, 0.2, 0.3]),
        };
        let result = save_image(&dir.path().join("out.png"), &img);
        assert!(matches!(result, Err(ImageError::FloatFormat { .. })));
    }

    #[test]
    fn test_load_missing_file_errors() {
        let dir = TempDir::new().unwrap();
        assert!(load_image(&dir.path().join("missing.png")).is_err());
    }
}
