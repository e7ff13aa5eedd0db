//! LC-3 object image format.
//!
//! An image is a flat big-endian binary:
//! - bytes 0-1: origin, the address the first word is loaded at
//! - every following byte pair: one 16-bit word, loaded at consecutive
//!   addresses from the origin

use std::path::Path;
use thiserror::Error;

/// A parsed program image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    /// Load address of the first word.
    pub origin: u16,
    /// The program words.
    pub words: Vec<u16>,
}

impl Image {
    /// Create an image from an origin and words.
    pub fn new(origin: u16, words: Vec<u16>) -> Self {
        Self { origin, words }
    }

    /// Parse an image from raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ImageError> {
        let (header, body) = match bytes {
            [hi, lo, rest @ ..] => ([*hi, *lo], rest),
            _ => return Err(ImageError::MissingOrigin { len: bytes.len() }),
        };

        if body.len() % 2 != 0 {
            return Err(ImageError::TruncatedWord { len: bytes.len() });
        }

        let words = body
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();

        Ok(Self {
            origin: u16::from_be_bytes(header),
            words,
        })
    }

    /// Serialize back to the on-disk format.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(2 + self.words.len() * 2);
        bytes.extend_from_slice(&self.origin.to_be_bytes());
        for word in &self.words {
            bytes.extend_from_slice(&word.to_be_bytes());
        }
        bytes
    }

    /// Get the number of words.
    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Address of the last loaded word (wrapping), or `None` for an empty
    /// image.
    pub fn end(&self) -> Option<u16> {
        let last = self.words.len().checked_sub(1)?;
        // Truncation is the wrap: word N lands at origin + N mod 2^16.
        Some(self.origin.wrapping_add(last as u16))
    }
}

/// Load an image file from disk.
pub fn load_image<P: AsRef<Path>>(path: P) -> Result<Image, ImageError> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|source| ImageError::Io {
        path: path.display().to_string(),
        source,
    })?;
    Image::from_bytes(&bytes)
}

/// Save an image file to disk.
pub fn save_image<P: AsRef<Path>>(path: P, image: &Image) -> Result<(), ImageError> {
    let path = path.as_ref();
    std::fs::write(path, image.to_bytes()).map_err(|source| ImageError::Io {
        path: path.display().to_string(),
        source,
    })
}

/// Errors that can occur while reading an image.
#[derive(Debug, Error)]
pub enum ImageError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("image is {len} bytes, too short to hold an origin")]
    MissingOrigin { len: usize },

    #[error("image is {len} bytes; the last word is missing a byte")]
    TruncatedWord { len: usize },
}
