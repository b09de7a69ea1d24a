//! Texture resources and the pixel codec collaborator
//!
//! Image data is kept in its encoded GX form. Converting to or from RGBA is
//! delegated to a [`TextureCodec`] supplied by the caller.

use serde::{Deserialize, Serialize};

use crate::traits::{ParseError, ParseResult};

/// GX texture formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum TextureFormat {
    I4 = 0,
    I8 = 1,
    IA4 = 2,
    IA8 = 3,
    RGB565 = 4,
    RGB5A3 = 5,
    RGBA8 = 6,
    C4 = 8,
    C8 = 9,
    C14X2 = 10,
    CMPR = 14,
}

impl TextureFormat {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::I4),
            1 => Some(Self::I8),
            2 => Some(Self::IA4),
            3 => Some(Self::IA8),
            4 => Some(Self::RGB565),
            5 => Some(Self::RGB5A3),
            6 => Some(Self::RGBA8),
            8 => Some(Self::C4),
            9 => Some(Self::C8),
            10 => Some(Self::C14X2),
            14 => Some(Self::CMPR),
            _ => None,
        }
    }

    /// Block width, block height, bits per pixel
    fn block(self) -> (usize, usize, usize) {
        match self {
            Self::I4 | Self::C4 | Self::CMPR => (8, 8, 4),
            Self::I8 | Self::IA4 | Self::C8 => (8, 4, 8),
            Self::IA8 | Self::RGB565 | Self::RGB5A3 | Self::C14X2 => (4, 4, 16),
            Self::RGBA8 => (4, 4, 32),
        }
    }

    pub fn is_paletted(self) -> bool {
        matches!(self, Self::C4 | Self::C8 | Self::C14X2)
    }

    /// Encoded byte length of `images` mip levels starting at `width` x `height`
    pub fn encoded_size(self, width: u16, height: u16, images: u8) -> usize {
        let (bw, bh, bpp) = self.block();
        (0..images.max(1) as u32)
            .map(|level| {
                let w = ((width as usize) >> level).max(1);
                let h = ((height as usize) >> level).max(1);
                w.div_ceil(bw) * bw * h.div_ceil(bh) * bh * bpp / 8
            })
            .sum()
    }
}

/// Pixel codec collaborator
pub trait TextureCodec {
    /// Decode one image level to tightly packed RGBA8
    fn decode(&self, data: &[u8], format: TextureFormat, width: u16, height: u16) -> ParseResult<Vec<u8>>;

    /// Encode tightly packed RGBA8 into `format`
    fn encode(&self, rgba: &[u8], format: TextureFormat, width: u16, height: u16) -> ParseResult<Vec<u8>>;
}

/// Texture image stored in the container
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Texture {
    pub name: String,
    pub format: TextureFormat,
    pub width: u16,
    pub height: u16,
    /// Mip levels, base image included
    pub image_count: u8,
    pub min_lod: f32,
    pub max_lod: f32,
    #[serde(skip)]
    pub data: Vec<u8>,
}

impl Texture {
    /// Wrap already-encoded data, checking its length
    pub fn new(
        name: impl Into<String>,
        format: TextureFormat,
        width: u16,
        height: u16,
        image_count: u8,
        data: Vec<u8>,
    ) -> ParseResult<Self> {
        let expected = format.encoded_size(width, height, image_count);
        if data.len() != expected {
            return Err(ParseError::invalid(format!(
                "{format:?} {width}x{height} with {image_count} image(s) needs {expected} bytes, got {}",
                data.len()
            )));
        }
        Ok(Self {
            name: name.into(),
            format,
            width,
            height,
            image_count: image_count.max(1),
            min_lod: 0.0,
            max_lod: (image_count.max(1) - 1) as f32,
            data,
        })
    }

    /// Encode a single-level texture from RGBA8 pixels
    pub fn from_rgba(
        codec: &dyn TextureCodec,
        name: impl Into<String>,
        rgba: &[u8],
        format: TextureFormat,
        width: u16,
        height: u16,
    ) -> ParseResult<Self> {
        if rgba.len() != width as usize * height as usize * 4 {
            return Err(ParseError::invalid(format!(
                "{} RGBA bytes do not describe a {width}x{height} image",
                rgba.len()
            )));
        }
        let data = codec.encode(rgba, format, width, height)?;
        Self::new(name, format, width, height, 1, data)
    }

    /// Decode the base image to RGBA8
    pub fn decode_rgba(&self, codec: &dyn TextureCodec) -> ParseResult<Vec<u8>> {
        let base = self.format.encoded_size(self.width, self.height, 1);
        let data = self.data.get(..base).ok_or(ParseError::OutOfBounds {
            offset: 0,
            requested: base,
            available: self.data.len(),
        })?;
        codec.decode(data, self.format, self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Stores RGBA8 verbatim, for exercising the call sites
    struct PassThrough;

    impl TextureCodec for PassThrough {
        fn decode(&self, data: &[u8], format: TextureFormat, _w: u16, _h: u16) -> ParseResult<Vec<u8>> {
            assert_eq!(format, TextureFormat::RGBA8);
            Ok(data.to_vec())
        }

        fn encode(&self, rgba: &[u8], _format: TextureFormat, _w: u16, _h: u16) -> ParseResult<Vec<u8>> {
            Ok(rgba.to_vec())
        }
    }

    #[test]
    fn test_encoded_sizes() {
        assert_eq!(TextureFormat::CMPR.encoded_size(64, 64, 1), 2048);
        assert_eq!(TextureFormat::I4.encoded_size(4, 4, 1), 32);
        assert_eq!(TextureFormat::RGBA8.encoded_size(8, 8, 2), 256 + 64);
        assert_eq!(TextureFormat::RGB5A3.encoded_size(16, 8, 3), 256 + 64 + 32);
    }

    #[test]
    fn test_codec_call_sites() {
        let rgba: Vec<u8> = (0..64).collect();
        let texture = Texture::from_rgba(&PassThrough, "tex", &rgba, TextureFormat::RGBA8, 4, 4).unwrap();

        assert_eq!(texture.data.len(), 64);
        assert_eq!(texture.decode_rgba(&PassThrough).unwrap(), rgba);
    }

    #[test]
    fn test_wrong_length_rejected() {
        assert!(Texture::new("t", TextureFormat::I8, 8, 4, 1, vec![0; 31]).is_err());
        assert!(Texture::from_rgba(&PassThrough, "t", &[0; 3], TextureFormat::RGBA8, 1, 1).is_err());
    }
}
