use anyhow::{anyhow, Result};
use image::RgbImage;

/// Pixel layouts a V4L2 device may hand back.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PixelFormat {
    Rgb24,
    Nv12,
}

impl PixelFormat {
    pub(crate) fn from_fourcc(fourcc: &[u8; 4]) -> Option<Self> {
        match fourcc {
            b"RGB3" => Some(PixelFormat::Rgb24),
            b"NV12" => Some(PixelFormat::Nv12),
            _ => None,
        }
    }
}

/// Convert a raw capture buffer into an RGB image.
pub(crate) fn to_rgb_image(
    pixels: &[u8],
    width: u32,
    height: u32,
    format: PixelFormat,
) -> Result<RgbImage> {
    let rgb = match format {
        PixelFormat::Rgb24 => {
            let expected = (width as usize)
                .checked_mul(height as usize)
                .and_then(|n| n.checked_mul(3))
                .ok_or_else(|| anyhow!("RGB frame dimensions overflow"))?;
            // Drivers may pad the final buffer; only the leading frame matters.
            if pixels.len() < expected {
                return Err(anyhow!(
                    "RGB frame too short: expected {} bytes, got {}",
                    expected,
                    pixels.len()
                ));
            }
            pixels[..expected].to_vec()
        }
        PixelFormat::Nv12 => nv12_to_rgb(pixels, width, height)?,
    };
    RgbImage::from_raw(width, height, rgb)
        .ok_or_else(|| anyhow!("frame buffer does not match {}x{}", width, height))
}

fn nv12_to_rgb(pixels: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let (w, h) = (width as usize, height as usize);
    let luma_len = w
        .checked_mul(h)
        .ok_or_else(|| anyhow!("NV12 frame dimensions overflow"))?;
    let expected = luma_len + luma_len / 2;
    if pixels.len() < expected {
        return Err(anyhow!(
            "NV12 frame too short: expected {} bytes, got {}",
            expected,
            pixels.len()
        ));
    }

    let mut rgb = Vec::with_capacity(luma_len * 3);
    for row in 0..h {
        for col in 0..w {
            let luma = pixels[row * w + col] as f32;
            let chroma = luma_len + (row / 2) * w + (col / 2) * 2;
            let u = pixels[chroma] as f32 - 128.0;
            let v = pixels[chroma + 1] as f32 - 128.0;

            rgb.push(to_u8(luma + 1.402 * v));
            rgb.push(to_u8(luma - 0.344_136 * u - 0.714_136 * v));
            rgb.push(to_u8(luma + 1.772 * u));
        }
    }
    Ok(rgb)
}

fn to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neutral_nv12_is_gray() -> Result<()> {
        let nv12 = [vec![128u8; 4], vec![128u8; 2]].concat();
        let image = to_rgb_image(&nv12, 2, 2, PixelFormat::Nv12)?;
        assert!(image.pixels().all(|p| p.0 == [128, 128, 128]));
        Ok(())
    }

    #[test]
    fn rgb_ignores_trailing_padding_but_rejects_short_buffers() -> Result<()> {
        let mut raw = vec![7u8; 12];
        raw.extend_from_slice(&[0, 0]);
        assert_eq!(to_rgb_image(&raw, 2, 2, PixelFormat::Rgb24)?.dimensions(), (2, 2));
        assert!(to_rgb_image(&raw[..10], 2, 2, PixelFormat::Rgb24).is_err());
        Ok(())
    }

    #[test]
    fn fourcc_mapping() {
        assert_eq!(PixelFormat::from_fourcc(b"RGB3"), Some(PixelFormat::Rgb24));
        assert_eq!(PixelFormat::from_fourcc(b"NV12"), Some(PixelFormat::Nv12));
        assert_eq!(PixelFormat::from_fourcc(b"YUYV"), None);
    }
}
