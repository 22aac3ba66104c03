use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::RgbImage;
use std::io::Cursor;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("Empty image payload")]
    Empty,
    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("Error reading image: {0}")]
    Io(#[from] std::io::Error),
    #[error("Error decoding image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("Malformed frame: {width}x{height} with {len} bytes of pixel data")]
    Malformed { width: u32, height: u32, len: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOrder {
    Rgb,
    Bgr,
}

/// An 8-bit, three channel image owned for the duration of one prediction.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    width: u32,
    height: u32,
    order: ChannelOrder,
    data: Vec<u8>,
}

impl Frame {
    /// Wraps raw interleaved pixels. The buffer is not checked here, a
    /// malformed buffer surfaces when the frame is converted for extraction.
    pub fn from_raw(width: u32, height: u32, order: ChannelOrder, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            order,
            data,
        }
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, FrameError> {
        if bytes.is_empty() {
            return Err(FrameError::Empty);
        }

        let image = image::ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()?
            .decode()?
            .to_rgb8();

        let (width, height) = image.dimensions();
        Ok(Self::from_raw(width, height, ChannelOrder::Rgb, image.into_raw()))
    }

    /// Decodes a base64 payload, with or without a `data:image/...;base64,` prefix.
    pub fn from_base64(payload: &str) -> Result<Self, FrameError> {
        let encoded = match payload.split_once(',') {
            Some((_, data)) => data,
            None => payload,
        };
        let encoded: String = encoded.split_whitespace().collect();
        if encoded.is_empty() {
            return Err(FrameError::Empty);
        }

        let bytes = STANDARD.decode(encoded)?;
        Self::decode(&bytes)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn to_rgb(&self) -> Result<RgbImage, FrameError> {
        let malformed = || FrameError::Malformed {
            width: self.width,
            height: self.height,
            len: self.data.len(),
        };

        if self.width == 0 || self.height == 0 {
            return Err(malformed());
        }

        let mut data = self.data.clone();
        if self.order == ChannelOrder::Bgr {
            for pixel in data.chunks_exact_mut(3) {
                pixel.swap(0, 2);
            }
        }

        RgbImage::from_raw(self.width, self.height, data).ok_or_else(malformed)
    }
}
