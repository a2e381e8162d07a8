use arkbeam::{BeamError, SymbolDecoder, SymbolEncoder};
use base64::{engine::general_purpose, Engine};
use image::{GrayImage, Luma};
use qrcode::{Color, EcLevel, QrCode};

/// Characters a version 40 symbol holds in byte mode at the lowest error
/// correction level.
const MAX_SYMBOL_CHARS: usize = 2953;

/// Frame bytes that still fit one symbol once base64-encoded.
pub const MAX_FRAME_BYTES: usize = MAX_SYMBOL_CHARS / 4 * 3;

/// Modules of blank margin around a symbol.
const QUIET_ZONE: u32 = 4;

/// QR codes carrying base64 text, since scanners hand back text rather
/// than raw bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct QrSymbolCodec;

impl SymbolEncoder for QrSymbolCodec {
    type Symbol = QrCode;

    fn encode_symbol(&self, bytes: &[u8]) -> arkbeam::Result<QrCode> {
        let text = general_purpose::STANDARD.encode(bytes);
        QrCode::with_error_correction_level(text.as_bytes(), EcLevel::L)
            .map_err(|e| BeamError::Symbol(e.to_string()))
    }
}

impl SymbolDecoder for QrSymbolCodec {
    type Image = GrayImage;

    fn decode_symbol(&self, image: &GrayImage) -> Option<Vec<u8>> {
        let mut prepared = rqrr::PreparedImage::prepare_from_greyscale(
            image.width() as usize,
            image.height() as usize,
            |x, y| image.get_pixel(x as u32, y as u32)[0],
        );

        prepared.detect_grids().into_iter().find_map(|grid| {
            let (_, content) = grid
                .decode()
                .map_err(|e| log::trace!("Unreadable grid: {}", e))
                .ok()?;
            match general_purpose::STANDARD.decode(content.trim()) {
                Ok(bytes) => Some(bytes),
                Err(_) => {
                    log::debug!("Ignoring a QR code that is not ours");
                    None
                }
            }
        })
    }
}

/// Draw a symbol centred on a white canvas, scaled to the largest whole
/// module size that fits.
pub fn rasterize(code: &QrCode, width: u32, height: u32) -> GrayImage {
    let modules = code.width() as u32;
    let span = modules + 2 * QUIET_ZONE;
    let scale = (width.min(height) / span).max(1);

    let canvas_w = width.max(span * scale);
    let canvas_h = height.max(span * scale);
    let offset_x = (canvas_w - span * scale) / 2 + QUIET_ZONE * scale;
    let offset_y = (canvas_h - span * scale) / 2 + QUIET_ZONE * scale;

    let mut canvas = GrayImage::from_pixel(canvas_w, canvas_h, Luma([255]));
    for (i, color) in code.to_colors().into_iter().enumerate() {
        if color != Color::Dark {
            continue;
        }
        let (mx, my) = (i as u32 % modules, i as u32 / modules);
        for dy in 0..scale {
            for dx in 0..scale {
                canvas.put_pixel(
                    offset_x + mx * scale + dx,
                    offset_y + my * scale + dy,
                    Luma([0]),
                );
            }
        }
    }
    canvas
}
