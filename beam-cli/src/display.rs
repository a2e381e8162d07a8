use std::io::{Cursor, Write};
use std::path::PathBuf;
use std::str::FromStr;

use arkbeam::storage::write_replace;
use arkbeam::{BeamError, SymbolDisplay};
use image::ImageFormat;
use qrcode::{render::unicode, QrCode};

use crate::qr::rasterize;
use crate::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl FromStr for Resolution {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || AppError::InvalidResolution(s.to_owned());
        let (w, h) = s
            .trim()
            .split_once(['x', 'X'])
            .ok_or_else(invalid)?;
        let width: u32 = w.parse().map_err(|_| invalid())?;
        let height: u32 = h.parse().map_err(|_| invalid())?;
        if width == 0 || height == 0 {
            return Err(invalid());
        }
        Ok(Self { width, height })
    }
}

/// Draws symbols as unicode blocks straight into the terminal.
pub struct TerminalDisplay<W> {
    out: W,
}

impl<W: Write> TerminalDisplay<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }
}

impl<W: Write> SymbolDisplay for TerminalDisplay<W> {
    type Symbol = QrCode;

    fn present(&mut self, symbol: &QrCode, caption: &str) -> arkbeam::Result<()> {
        let image = symbol
            .render::<unicode::Dense1x2>()
            .dark_color(unicode::Dense1x2::Light)
            .light_color(unicode::Dense1x2::Dark)
            .build();

        // Clear the screen and home the cursor so symbols replace each other.
        write!(self.out, "\x1b[2J\x1b[H{}\n{}\n", image, caption)?;
        self.out.flush()?;
        Ok(())
    }
}

/// Keeps the current symbol in a PNG file for an external full-screen
/// viewer to show.
pub struct PngDisplay {
    path: PathBuf,
    resolution: Resolution,
}

impl PngDisplay {
    pub fn new(path: PathBuf, resolution: Resolution) -> Self {
        Self { path, resolution }
    }
}

impl SymbolDisplay for PngDisplay {
    type Symbol = QrCode;

    fn present(&mut self, symbol: &QrCode, _caption: &str) -> arkbeam::Result<()> {
        let image = rasterize(symbol, self.resolution.width, self.resolution.height);
        let mut png = Cursor::new(Vec::new());
        image
            .write_to(&mut png, ImageFormat::Png)
            .map_err(|e| BeamError::Symbol(e.to_string()))?;
        write_replace(&self.path, png.get_ref())
    }
}
