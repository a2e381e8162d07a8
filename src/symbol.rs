//! Capabilities the protocol needs from the outside world.
//!
//! The core never draws or scans anything itself: turning frame bytes into a
//! visible symbol, showing it, sampling the camera or screen and reading a
//! symbol back are all supplied by the caller.

use crate::errors::Result;

/// Turns the bytes of one encoded frame into a renderable symbol.
pub trait SymbolEncoder {
    type Symbol;

    fn encode_symbol(&self, bytes: &[u8]) -> Result<Self::Symbol>;
}

/// Reads the bytes of a frame back out of a captured image.
///
/// Returns `None` when the image holds no readable symbol.
pub trait SymbolDecoder {
    type Image;

    fn decode_symbol(&self, image: &Self::Image) -> Option<Vec<u8>>;
}

/// Puts a symbol in front of the receiver's camera.
pub trait SymbolDisplay {
    type Symbol;

    fn present(&mut self, symbol: &Self::Symbol, caption: &str) -> Result<()>;
}

/// Yields captured images. `Ok(None)` means nothing new right now.
pub trait ImageSource {
    type Image;

    fn sample(&mut self) -> Result<Option<Self::Image>>;
}
