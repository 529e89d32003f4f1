//! QR codec: render text to a PNG and read text back out of an image.

use std::io::Cursor;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use image::{DynamicImage, GrayImage, ImageFormat, Luma};
use qrcode::{Color, EcLevel, QrCode};

/// Largest pixels-per-module a codec accepts.
pub const MAX_MODULE_SIZE: u32 = 100;
/// Largest quiet zone, in modules.
pub const MAX_BORDER: u32 = 16;
/// Longest side of a rendered image, in pixels.
pub const MAX_IMAGE_SIDE: u32 = 4096;

#[derive(Debug, thiserror::Error)]
pub enum QrError {
    #[error("data does not fit in a QR code: {0}")]
    Encode(String),
    #[error("QR image would be {side}px wide, limit is {max}px")]
    TooLarge { side: u64, max: u32 },
    #[error("image error: {0}")]
    Image(String),
    #[error("invalid base64: {0}")]
    Base64(String),
    #[error("no QR code found in image")]
    NotFound,
    #[error("QR code could not be read: {0}")]
    Decode(String),
}

impl From<image::ImageError> for QrError {
    fn from(e: image::ImageError) -> Self {
        QrError::Image(e.to_string())
    }
}

impl From<base64::DecodeError> for QrError {
    fn from(e: base64::DecodeError) -> Self {
        QrError::Base64(e.to_string())
    }
}

/// Something that can turn a payload into a printable QR image.
pub trait QrRenderer: Send + Sync {
    fn render_png(&self, data: &str) -> Result<Vec<u8>, QrError>;

    fn render_base64(&self, data: &str) -> Result<String, QrError> {
        self.render_png(data).map(|png| STANDARD.encode(png))
    }
}

/// Black-on-white PNG renderer with low error correction, growing the
/// symbol version to fit the payload.
#[derive(Clone, Copy, Debug)]
pub struct QrCodec {
    module_size: u32,
    border: u32,
}

impl Default for QrCodec {
    fn default() -> Self {
        Self {
            module_size: 10,
            border: 4,
        }
    }
}

impl QrCodec {
    /// Module size is clamped to `1..=MAX_MODULE_SIZE`, border to `MAX_BORDER`.
    pub fn new(module_size: u32, border: u32) -> Self {
        Self {
            module_size: module_size.clamp(1, MAX_MODULE_SIZE),
            border: border.min(MAX_BORDER),
        }
    }

    /// Same border, different pixels per module.
    pub fn with_module_size(self, module_size: u32) -> Self {
        Self::new(module_size, self.border)
    }

    pub fn module_size(&self) -> u32 {
        self.module_size
    }

    pub fn border(&self) -> u32 {
        self.border
    }

    /// Pixel side of the image for a symbol `modules` wide.
    fn side_for(&self, modules: u32) -> Result<u32, QrError> {
        let side = (u64::from(modules) + 2 * u64::from(self.border)) * u64::from(self.module_size);
        if side > u64::from(MAX_IMAGE_SIDE) {
            return Err(QrError::TooLarge {
                side,
                max: MAX_IMAGE_SIDE,
            });
        }
        Ok(side as u32)
    }

    fn rasterize(&self, code: &QrCode) -> Result<GrayImage, QrError> {
        let width = code.width();
        let colors = code.to_colors();
        let modules = u32::try_from(width).unwrap_or(u32::MAX);
        let side = self.side_for(modules)?;
        let (module, border) = (self.module_size, self.border);

        Ok(GrayImage::from_fn(side, side, |px, py| {
            let mx = (px / module).checked_sub(border);
            let my = (py / module).checked_sub(border);
            let dark = match (mx, my) {
                (Some(x), Some(y)) if x < modules && y < modules => {
                    colors[y as usize * width + x as usize] == Color::Dark
                }
                _ => false,
            };
            if dark {
                Luma([0])
            } else {
                Luma([255])
            }
        }))
    }
}

impl QrRenderer for QrCodec {
    fn render_png(&self, data: &str) -> Result<Vec<u8>, QrError> {
        let code = QrCode::with_error_correction_level(data.as_bytes(), EcLevel::L)
            .map_err(|e| QrError::Encode(e.to_string()))?;
        let img = self.rasterize(&code)?;

        let mut png = Vec::new();
        DynamicImage::ImageLuma8(img).write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
        tracing::trace!(bytes = png.len(), version = ?code.version(), "rendered QR code");
        Ok(png)
    }
}

/// Extract the text of the first QR code found in an encoded image
/// (any format the `image` crate was built with).
pub fn decode_image(bytes: &[u8]) -> Result<String, QrError> {
    let gray = image::load_from_memory(bytes)?.to_luma8();
    let (w, h) = (gray.width() as usize, gray.height() as usize);
    let mut prepared = rqrr::PreparedImage::prepare_from_greyscale(w, h, |x, y| {
        gray.get_pixel(x as u32, y as u32).0[0]
    });

    let grids = prepared.detect_grids();
    let grid = grids.first().ok_or(QrError::NotFound)?;
    let (_meta, content) = grid.decode().map_err(|e| QrError::Decode(e.to_string()))?;
    Ok(content)
}

/// File extension matching the encoded image, `"png"` when unrecognised.
pub fn image_extension(bytes: &[u8]) -> &'static str {
    match image::guess_format(bytes) {
        Ok(ImageFormat::Jpeg) => "jpg",
        _ => "png",
    }
}

/// Decode a base64 image, accepting a `data:image/...;base64,` prefix.
pub fn decode_base64_payload(data: &str) -> Result<Vec<u8>, QrError> {
    let raw = match data.split_once(',') {
        Some((_, rest)) => rest,
        None => data,
    };
    Ok(STANDARD.decode(raw.trim())?)
}
