use base64::Engine;
use image::RgbImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("frame payload is empty")]
    Empty,
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("undecodable image: {0}")]
    Image(#[from] image::ImageError),
}

/// One decoded input frame.
#[derive(Debug, Clone)]
pub struct FrameSample {
    /// Position of the frame within the request.
    pub index: usize,
    /// 8-bit RGB pixel grid.
    pub pixels: RgbImage,
}

impl FrameSample {
    pub fn new(index: usize, pixels: RgbImage) -> Self {
        Self { index, pixels }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }
}

/// Decode one request frame: optional data-URI header, base64, then any
/// container format the `image` crate recognises.
pub fn decode_frame(index: usize, encoded: &str) -> Result<FrameSample, DecodeError> {
    let payload = strip_data_uri(encoded).trim();
    if payload.is_empty() {
        return Err(DecodeError::Empty);
    }

    let bytes = base64::engine::general_purpose::STANDARD.decode(payload)?;
    let pixels = image::load_from_memory(&bytes)?.to_rgb8();
    if pixels.width() == 0 || pixels.height() == 0 {
        return Err(DecodeError::Empty);
    }

    Ok(FrameSample::new(index, pixels))
}

/// `data:image/jpeg;base64,AAAA` -> `AAAA`. Plain payloads are returned as-is.
fn strip_data_uri(encoded: &str) -> &str {
    match encoded.rfind(',') {
        Some(pos) => &encoded[pos + 1..],
        None => encoded,
    }
}
