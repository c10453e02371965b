//! Upload validation

use image::ImageReader;
use std::io::Cursor;

/// Result of checking an upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageCheck {
    Valid,
    Invalid(String),
}

impl ImageCheck {
    pub fn is_valid(&self) -> bool {
        matches!(self, ImageCheck::Valid)
    }
}

/// Check that `raw` decodes as a raster image in one of the compiled-in formats.
///
/// The format is sniffed from the bytes, not taken from the filename. No size
/// or dimension limits apply.
pub fn validate(raw: &[u8]) -> ImageCheck {
    let reader = match ImageReader::new(Cursor::new(raw)).with_guessed_format() {
        Ok(reader) => reader,
        Err(e) => return ImageCheck::Invalid(e.to_string()),
    };

    if reader.format().is_none() {
        return ImageCheck::Invalid("unrecognized image format".to_string());
    }

    match reader.decode() {
        Ok(_) => ImageCheck::Valid,
        Err(e) => ImageCheck::Invalid(e.to_string()),
    }
}
