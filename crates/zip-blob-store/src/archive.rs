//! Single-entry ZIP archive codec

use crate::error::ArchiveError;
use std::io::{Cursor, Read, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// The entry read back out of an archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnpackedEntry {
    pub name: String,
    pub data: Vec<u8>,
}

/// Pack `payload` into a deflate-compressed ZIP holding one entry named `entry_name`
pub fn pack(entry_name: &str, payload: &[u8]) -> Result<Vec<u8>, ArchiveError> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    writer
        .start_file(entry_name, options)
        .map_err(|e| ArchiveError::Pack(e.to_string()))?;
    writer
        .write_all(payload)
        .map_err(|e| ArchiveError::Pack(e.to_string()))?;

    let cursor = writer
        .finish()
        .map_err(|e| ArchiveError::Pack(e.to_string()))?;
    Ok(cursor.into_inner())
}

/// Read the first entry of an archive.
///
/// "First" is the central directory order, not sorted by name. Any further
/// entries are ignored.
pub fn unpack(archive: &[u8]) -> Result<UnpackedEntry, ArchiveError> {
    let mut zip = ZipArchive::new(Cursor::new(archive))?;
    if zip.is_empty() {
        return Err(ArchiveError::Empty);
    }

    let mut entry = zip.by_index(0)?;
    let name = entry.name().to_string();
    let mut data = Vec::with_capacity(entry.size() as usize);
    entry
        .read_to_end(&mut data)
        .map_err(|e| ArchiveError::Corrupt(e.to_string()))?;

    Ok(UnpackedEntry { name, data })
}
