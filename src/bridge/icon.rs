//! App icon rasterisation for `getInstalledApps`.

use std::io::Cursor;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use thiserror::Error;

use crate::host::AppIcon;

/// Prefix of every encoded icon.
pub const PNG_DATA_URL_PREFIX: &str = "data:image/png;base64,";

/// Side length used for drawables without an intrinsic size.
pub const DEFAULT_ICON_PX: u32 = 96;

/// Errors raised while rasterising an icon.
#[derive(Debug, Error)]
pub enum IconError {
    /// Pixel buffer does not match the stated size.
    #[error("bitmap is {width}x{height} but holds {len} bytes")]
    BadBitmap { width: u32, height: u32, len: usize },

    /// Decoding or encoding failed.
    #[error(transparent)]
    Image(#[from] image::ImageError),
}

/// Rasterises `icon` to PNG and wraps it in a data URL.
pub fn icon_data_url(icon: &AppIcon) -> Result<String, IconError> {
    let png = encode_png(rasterise(icon)?)?;
    Ok(format!("{}{}", PNG_DATA_URL_PREFIX, STANDARD.encode(png)))
}

fn rasterise(icon: &AppIcon) -> Result<DynamicImage, IconError> {
    match icon {
        AppIcon::Bitmap {
            width,
            height,
            rgba,
        } => RgbaImage::from_raw(*width, *height, rgba.clone())
            .map(DynamicImage::ImageRgba8)
            .ok_or(IconError::BadBitmap {
                width: *width,
                height: *height,
                len: rgba.len(),
            }),
        AppIcon::Encoded(bytes) => Ok(image::load_from_memory(bytes)?),
        AppIcon::Vector {
            intrinsic_width,
            intrinsic_height,
            color,
        } => {
            let side = |v: i32| u32::try_from(v).ok().filter(|v| *v > 0).unwrap_or(DEFAULT_ICON_PX);
            Ok(DynamicImage::ImageRgba8(RgbaImage::from_pixel(
                side(*intrinsic_width),
                side(*intrinsic_height),
                Rgba(*color),
            )))
        }
    }
}

fn encode_png(image: DynamicImage) -> Result<Vec<u8>, IconError> {
    let mut out = Vec::new();
    image.write_to(&mut Cursor::new(&mut out), ImageFormat::Png)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(url: &str) -> DynamicImage {
        let payload = url.strip_prefix(PNG_DATA_URL_PREFIX).unwrap();
        let bytes = STANDARD.decode(payload).unwrap();
        image::load_from_memory_with_format(&bytes, ImageFormat::Png).unwrap()
    }

    #[test]
    fn test_sizeless_vector_uses_default_size() {
        let url = icon_data_url(&AppIcon::generic()).unwrap();
        let image = decode(&url);
        assert_eq!((image.width(), image.height()), (96, 96));
    }

    #[test]
    fn test_vector_keeps_intrinsic_size() {
        let icon = AppIcon::Vector {
            intrinsic_width: 48,
            intrinsic_height: 32,
            color: [255, 0, 0, 255],
        };
        let image = decode(&icon_data_url(&icon).unwrap()).to_rgba8();
        assert_eq!(image.dimensions(), (48, 32));
        assert_eq!(image.get_pixel(0, 0), &Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn test_bitmap_round_trips_pixels() {
        let icon = AppIcon::Bitmap {
            width: 2,
            height: 1,
            rgba: vec![1, 2, 3, 255, 4, 5, 6, 255],
        };
        let image = decode(&icon_data_url(&icon).unwrap()).to_rgba8();
        assert_eq!(image.get_pixel(1, 0), &Rgba([4, 5, 6, 255]));
    }

    #[test]
    fn test_encoded_png_is_reencoded() {
        let mut png = Vec::new();
        DynamicImage::ImageRgba8(RgbaImage::new(4, 4))
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .unwrap();
        let url = icon_data_url(&AppIcon::Encoded(png)).unwrap();
        assert_eq!(decode(&url).width(), 4);
    }

    #[test]
    fn test_bad_inputs_fail() {
        let short = AppIcon::Bitmap {
            width: 4,
            height: 4,
            rgba: vec![0; 3],
        };
        assert!(matches!(
            icon_data_url(&short),
            Err(IconError::BadBitmap { len: 3, .. })
        ));
        assert!(icon_data_url(&AppIcon::Encoded(b"not an image".to_vec())).is_err());
    }
}
