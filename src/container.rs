//! Zip container codec
//!
//! Reads an archive into an ordered list of [`ArchiveEntry`] values and writes
//! such a list back, carrying each entry's timestamp, compression method,
//! host system and external attributes through unchanged.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek, SeekFrom, Write};
use std::path::Path;

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

use crate::config::ContainerLimits;
use crate::error::ContainerError;

/// Zip method code for stored entries
pub const METHOD_STORED: u16 = 0;
/// Zip method code for deflated entries
pub const METHOD_DEFLATED: u16 = 8;

/// Host system byte of entries made on MS-DOS or Windows
pub const HOST_DOS: u8 = 0;
/// Host system byte of entries made on Unix
pub const HOST_UNIX: u8 = 3;

const CENTRAL_HEADER_SIGNATURE: [u8; 4] = [0x50, 0x4b, 0x01, 0x02];
const CENTRAL_HEADER_FIXED_LEN: usize = 42;
const HOST_SYSTEM_OFFSET: usize = 5;
const EXTERNAL_ATTRIBUTES_OFFSET: usize = 38;

/// Per-entry metadata preserved across a round trip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMetadata {
    /// DOS timestamp as `[year, month, day, hour, minute, second]`
    pub timestamp: Option<[u16; 6]>,
    /// Zip compression method code
    pub compression_method: u16,
    /// Raw external attributes from the central directory
    pub external_attributes: u32,
    /// High byte of "version made by"; tells how to read `external_attributes`
    #[serde(default = "default_host_system")]
    pub host_system: u8,
}

fn default_host_system() -> u8 {
    HOST_UNIX
}

impl Default for EntryMetadata {
    fn default() -> Self {
        Self {
            timestamp: None,
            compression_method: METHOD_DEFLATED,
            external_attributes: 0,
            host_system: HOST_UNIX,
        }
    }
}

impl EntryMetadata {
    /// Unix mode recorded for the entry, if it was made on Unix
    pub fn unix_mode(&self) -> Option<u32> {
        if self.host_system != HOST_UNIX {
            return None;
        }
        match self.external_attributes >> 16 {
            0 => None,
            mode => Some(mode),
        }
    }

    fn options(&self, name: &str) -> SimpleFileOptions {
        let mut options = SimpleFileOptions::default().compression_method(compression_from_code(
            name,
            self.compression_method,
        ));
        if let Some(time) = self.timestamp.and_then(date_time_from_parts) {
            options = options.last_modified_time(time);
        }
        if let Some(mode) = self.unix_mode() {
            options = options.unix_permissions(mode);
        }
        options
    }
}

/// One named file inside the container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Entry name, unique within the archive
    pub name: String,
    /// Uncompressed bytes
    pub data: Vec<u8>,
    /// Metadata to reproduce on write
    pub metadata: EntryMetadata,
}

impl ArchiveEntry {
    pub fn new(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
            metadata: EntryMetadata::default(),
        }
    }

    /// Attach explicit metadata
    pub fn with_metadata(mut self, metadata: EntryMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Directory entries carry no data and end in `/`
    pub fn is_dir(&self) -> bool {
        self.name.ends_with('/')
    }
}

/// Read every entry of the archive at `path` in physical order
pub fn open(path: &Path) -> Result<Vec<ArchiveEntry>, ContainerError> {
    open_with_limits(path, ContainerLimits::default())
}

/// Like [`open`] with explicit size limits
pub fn open_with_limits(
    path: &Path,
    limits: ContainerLimits,
) -> Result<Vec<ArchiveEntry>, ContainerError> {
    let file = File::open(path)?;
    read_from(BufReader::new(file), limits)
}

/// Read every entry from any seekable reader
pub fn read_from<R: Read + Seek>(
    reader: R,
    limits: ContainerLimits,
) -> Result<Vec<ArchiveEntry>, ContainerError> {
    let mut archive = ZipArchive::new(reader)?;
    let mut entries = Vec::with_capacity(archive.len());
    let mut central_headers = Vec::with_capacity(archive.len());
    let mut total: u64 = 0;

    for i in 0..archive.len() {
        let mut zip_file = archive.by_index(i)?;
        let name = zip_file.name().to_string();

        if zip_file.encrypted() {
            return Err(ContainerError::Encrypted { name });
        }

        let size = zip_file.size();
        if size > limits.max_entry_bytes {
            return Err(ContainerError::EntryTooLarge {
                name,
                size,
                max: limits.max_entry_bytes,
            });
        }

        // Declared sizes can lie; bound the actual inflate as well.
        let mut data = Vec::with_capacity(usize::try_from(size).unwrap_or(0));
        (&mut zip_file)
            .take(limits.max_entry_bytes + 1)
            .read_to_end(&mut data)?;
        let actual = data.len() as u64;
        if actual > limits.max_entry_bytes {
            return Err(ContainerError::EntryTooLarge {
                name,
                size: actual,
                max: limits.max_entry_bytes,
            });
        }
        total += actual;
        if total > limits.max_total_bytes {
            return Err(ContainerError::ArchiveTooLarge {
                max: limits.max_total_bytes,
            });
        }

        let metadata = EntryMetadata {
            timestamp: zip_file.last_modified().map(|t| {
                [
                    t.year(),
                    u16::from(t.month()),
                    u16::from(t.day()),
                    u16::from(t.hour()),
                    u16::from(t.minute()),
                    u16::from(t.second()),
                ]
            }),
            compression_method: code_from_compression(&name, zip_file.compression()),
            // Filled in from the central directory below
            external_attributes: 0,
            host_system: HOST_UNIX,
        };
        central_headers.push(zip_file.central_header_start());

        entries.push(ArchiveEntry {
            name,
            data,
            metadata,
        });
    }

    let mut reader = archive.into_inner();
    for (entry, offset) in entries.iter_mut().zip(central_headers) {
        let (host_system, external_attributes) = read_central_attributes(&mut reader, offset)?;
        entry.metadata.host_system = host_system;
        entry.metadata.external_attributes = external_attributes;
    }

    debug!("read {} entries ({} bytes inflated)", entries.len(), total);
    Ok(entries)
}

/// Host system and external attributes of the central header at `offset`
fn read_central_attributes<R: Read + Seek>(
    reader: &mut R,
    offset: u64,
) -> Result<(u8, u32), ContainerError> {
    let mut header = [0u8; CENTRAL_HEADER_FIXED_LEN];
    reader.seek(SeekFrom::Start(offset))?;
    reader.read_exact(&mut header)?;
    if header[..4] != CENTRAL_HEADER_SIGNATURE {
        return Err(bad_central_header(offset));
    }
    let attributes = u32::from_le_bytes([
        header[EXTERNAL_ATTRIBUTES_OFFSET],
        header[EXTERNAL_ATTRIBUTES_OFFSET + 1],
        header[EXTERNAL_ATTRIBUTES_OFFSET + 2],
        header[EXTERNAL_ATTRIBUTES_OFFSET + 3],
    ]);
    Ok((header[HOST_SYSTEM_OFFSET], attributes))
}

/// Overwrite the host system and external attributes of one central header
fn patch_central_attributes(
    archive: &mut [u8],
    offset: u64,
    metadata: &EntryMetadata,
) -> Result<(), ContainerError> {
    let start = usize::try_from(offset).map_err(|_| bad_central_header(offset))?;
    let header = archive
        .get_mut(start..start + CENTRAL_HEADER_FIXED_LEN)
        .filter(|h| h[..4] == CENTRAL_HEADER_SIGNATURE)
        .ok_or_else(|| bad_central_header(offset))?;
    header[HOST_SYSTEM_OFFSET] = metadata.host_system;
    header[EXTERNAL_ATTRIBUTES_OFFSET..EXTERNAL_ATTRIBUTES_OFFSET + 4]
        .copy_from_slice(&metadata.external_attributes.to_le_bytes());
    Ok(())
}

fn bad_central_header(offset: u64) -> ContainerError {
    ContainerError::Zip(ZipError::InvalidArchive(
        format!("no central directory header at offset {offset}").into(),
    ))
}

/// Write `entries` to `path` in the given order
///
/// The archive is assembled in a temporary file next to `path` and renamed
/// into place, so a failure never leaves a truncated archive behind.
pub fn save(entries: &[ArchiveEntry], path: &Path) -> Result<(), ContainerError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let temp = tempfile::NamedTempFile::new_in(dir)?;
    let file = write_to(entries, temp.reopen()?)?;
    file.sync_all()?;
    temp.persist(path).map_err(|e| ContainerError::Io(e.error))?;
    debug!("wrote {} entries to {}", entries.len(), path.display());
    Ok(())
}

/// Write `entries` to any writer and hand the writer back
pub fn write_to<W: Write>(entries: &[ArchiveEntry], mut writer: W) -> Result<W, ContainerError> {
    let archive = to_bytes(entries)?;
    writer.write_all(&archive)?;
    Ok(writer)
}

/// Serialize entries into an in-memory archive
///
/// The zip writer always stamps entries as Unix-made, so the recorded host
/// system and external attributes are patched into the central directory
/// once it is written.
pub fn to_bytes(entries: &[ArchiveEntry]) -> Result<Vec<u8>, ContainerError> {
    let mut seen = HashSet::with_capacity(entries.len());
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));

    for entry in entries {
        if !seen.insert(entry.name.as_str()) {
            return Err(ContainerError::DuplicateEntry(entry.name.clone()));
        }
        let options = entry.metadata.options(&entry.name);
        if entry.is_dir() {
            zip.add_directory(entry.name.as_str(), options)?;
        } else {
            zip.start_file(entry.name.as_str(), options)?;
            zip.write_all(&entry.data)?;
        }
    }

    let mut archive = zip.finish()?.into_inner();

    let mut offsets = Vec::with_capacity(entries.len());
    {
        let mut written = ZipArchive::new(Cursor::new(archive.as_slice()))?;
        for entry in entries {
            let index = written
                .index_for_name(&entry.name)
                .ok_or(ZipError::FileNotFound)?;
            offsets.push(written.by_index_raw(index)?.central_header_start());
        }
    }
    for (entry, offset) in entries.iter().zip(offsets) {
        patch_central_attributes(&mut archive, offset, &entry.metadata)?;
    }
    Ok(archive)
}

fn code_from_compression(name: &str, method: CompressionMethod) -> u16 {
    match method {
        CompressionMethod::Stored => METHOD_STORED,
        CompressionMethod::Deflated => METHOD_DEFLATED,
        other => {
            warn!("{name}: compression method {other:?} will be rewritten as deflate");
            METHOD_DEFLATED
        }
    }
}

fn compression_from_code(name: &str, code: u16) -> CompressionMethod {
    match code {
        METHOD_STORED => CompressionMethod::Stored,
        METHOD_DEFLATED => CompressionMethod::Deflated,
        other => {
            warn!("{name}: unsupported compression method {other}, writing deflate");
            CompressionMethod::Deflated
        }
    }
}

fn date_time_from_parts(parts: [u16; 6]) -> Option<DateTime> {
    let [year, month, day, hour, minute, second] = parts;
    DateTime::from_date_and_time(
        year,
        u8::try_from(month).ok()?,
        u8::try_from(day).ok()?,
        u8::try_from(hour).ok()?,
        u8::try_from(minute).ok()?,
        u8::try_from(second).ok()?,
    )
    .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample_entries() -> Vec<ArchiveEntry> {
        vec![
            ArchiveEntry::new("[Content_Types].xml", "<Types/>").with_metadata(EntryMetadata {
                timestamp: Some([2021, 6, 15, 10, 30, 42]),
                compression_method: METHOD_DEFLATED,
                external_attributes: 0,
                host_system: HOST_UNIX,
            }),
            ArchiveEntry::new("word/", Vec::new()),
            ArchiveEntry::new("word/media/image1.png", vec![0x89, b'P', b'N', b'G', 0, 0xFF])
                .with_metadata(EntryMetadata {
                    timestamp: Some([2020, 1, 1, 0, 0, 0]),
                    compression_method: METHOD_STORED,
                    external_attributes: 0o100644 << 16,
                    host_system: HOST_UNIX,
                }),
        ]
    }

    #[test]
    fn test_roundtrip_preserves_order_and_bytes() {
        let entries = sample_entries();
        let bytes = to_bytes(&entries).unwrap();
        let read = read_from(Cursor::new(bytes), ContainerLimits::default()).unwrap();

        let names: Vec<_> = read.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["[Content_Types].xml", "word/", "word/media/image1.png"]
        );
        assert_eq!(read[0].data, b"<Types/>");
        assert_eq!(read[2].data, vec![0x89, b'P', b'N', b'G', 0, 0xFF]);
    }

    #[test]
    fn test_roundtrip_preserves_metadata() {
        let entries = sample_entries();
        let bytes = to_bytes(&entries).unwrap();
        let read = read_from(Cursor::new(bytes), ContainerLimits::default()).unwrap();

        assert_eq!(read[0].metadata.timestamp, Some([2021, 6, 15, 10, 30, 42]));
        assert_eq!(read[0].metadata.compression_method, METHOD_DEFLATED);
        assert_eq!(read[2].metadata.compression_method, METHOD_STORED);
        assert_eq!(read[2].metadata.unix_mode(), Some(0o100644));
        assert_eq!(read[0].metadata.external_attributes, 0);
        assert_eq!(read[0].metadata.unix_mode(), None);
    }

    /// Stored entries `(name, data, crc32, host, external attributes)` laid
    /// out the way Word and Python's zipfile write them
    fn foreign_archive(files: &[(&str, &[u8], u32, u8, u32)]) -> Vec<u8> {
        let date: u16 = (44 << 9) | (5 << 5) | 1;
        let mut out = Vec::new();
        let mut central = Vec::new();
        for &(name, data, crc, host, attributes) in files {
            let offset = out.len() as u32;
            let size = data.len() as u32;
            out.extend_from_slice(&0x0403_4b50u32.to_le_bytes());
            for field in [20u16, 0, 0, 0, date] {
                out.extend_from_slice(&field.to_le_bytes());
            }
            for field in [crc, size, size] {
                out.extend_from_slice(&field.to_le_bytes());
            }
            out.extend_from_slice(&(name.len() as u16).to_le_bytes());
            out.extend_from_slice(&0u16.to_le_bytes());
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(data);

            central.extend_from_slice(&0x0201_4b50u32.to_le_bytes());
            for field in [(u16::from(host) << 8) | 20, 20, 0, 0, 0, date] {
                central.extend_from_slice(&field.to_le_bytes());
            }
            for field in [crc, size, size] {
                central.extend_from_slice(&field.to_le_bytes());
            }
            for field in [name.len() as u16, 0, 0, 0, 0] {
                central.extend_from_slice(&field.to_le_bytes());
            }
            central.extend_from_slice(&attributes.to_le_bytes());
            central.extend_from_slice(&offset.to_le_bytes());
            central.extend_from_slice(name.as_bytes());
        }
        let central_start = out.len() as u32;
        let central_len = central.len() as u32;
        out.extend_from_slice(&central);
        out.extend_from_slice(&0x0605_4b50u32.to_le_bytes());
        for field in [0u16, 0, files.len() as u16, files.len() as u16] {
            out.extend_from_slice(&field.to_le_bytes());
        }
        out.extend_from_slice(&central_len.to_le_bytes());
        out.extend_from_slice(&central_start.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out
    }

    #[test]
    fn test_dos_attributes_survive_roundtrip() {
        let original = foreign_archive(&[
            ("word/document.xml", &b"<w:document/>"[..], 0x0d86_5add, HOST_DOS, 0x20),
            ("docProps/app.xml", &b"<Properties/>"[..], 0xb692_fe88, HOST_DOS, 0o600 << 16),
        ]);
        let read = read_from(Cursor::new(original), ContainerLimits::default()).unwrap();
        assert_eq!(read[0].data, b"<w:document/>");
        assert_eq!(read[0].metadata.host_system, HOST_DOS);
        assert_eq!(read[0].metadata.external_attributes, 0x20);
        assert_eq!(read[1].metadata.external_attributes, 0x0180_0000);
        assert_eq!(read[0].metadata.unix_mode(), None);
        assert_eq!(read[0].metadata.timestamp, Some([2024, 5, 1, 0, 0, 0]));

        let rewritten = to_bytes(&read).unwrap();
        let reread = read_from(Cursor::new(rewritten), ContainerLimits::default()).unwrap();
        assert_eq!(reread, read);
    }

    #[test]
    fn test_missing_host_system_defaults_to_unix() {
        let metadata: EntryMetadata = serde_json::from_str(
            r#"{"timestamp": null, "compression_method": 8, "external_attributes": 2175008768}"#,
        )
        .unwrap();
        assert_eq!(metadata.host_system, HOST_UNIX);
        assert_eq!(metadata.unix_mode(), Some(0o100644));
    }

    #[test]
    fn test_write_to_hands_back_writer() {
        let out = write_to(&sample_entries(), Vec::new()).unwrap();
        let read = read_from(Cursor::new(out), ContainerLimits::default()).unwrap();
        assert_eq!(read.len(), 3);
        assert_eq!(read[2].metadata.unix_mode(), Some(0o100644));
    }

    #[test]
    fn test_directory_entry_survives() {
        let bytes = to_bytes(&sample_entries()).unwrap();
        let read = read_from(Cursor::new(bytes), ContainerLimits::default()).unwrap();
        assert!(read[1].is_dir());
        assert!(read[1].data.is_empty());
    }

    #[test]
    fn test_corrupt_archive_is_container_error() {
        let result = read_from(Cursor::new(b"not a zip at all".to_vec()), ContainerLimits::default());
        assert!(matches!(result, Err(ContainerError::Zip(_))));
    }

    #[test]
    fn test_entry_limit() {
        let entries = vec![ArchiveEntry::new("big.bin", vec![7u8; 64])];
        let bytes = to_bytes(&entries).unwrap();
        let limits = ContainerLimits {
            max_entry_bytes: 16,
            max_total_bytes: 1024,
        };
        let result = read_from(Cursor::new(bytes), limits);
        assert!(matches!(result, Err(ContainerError::EntryTooLarge { .. })));
    }

    #[test]
    fn test_total_limit() {
        let entries = vec![
            ArchiveEntry::new("a.bin", vec![1u8; 40]),
            ArchiveEntry::new("b.bin", vec![2u8; 40]),
        ];
        let bytes = to_bytes(&entries).unwrap();
        let limits = ContainerLimits {
            max_entry_bytes: 64,
            max_total_bytes: 64,
        };
        let result = read_from(Cursor::new(bytes), limits);
        assert!(matches!(result, Err(ContainerError::ArchiveTooLarge { max: 64 })));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let entries = vec![ArchiveEntry::new("a.xml", "1"), ArchiveEntry::new("a.xml", "2")];
        let result = to_bytes(&entries);
        assert!(matches!(result, Err(ContainerError::DuplicateEntry(name)) if name == "a.xml"));
    }

    #[test]
    fn test_save_and_open_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.docx");
        save(&sample_entries(), &path).unwrap();

        let read = open(&path).unwrap();
        assert_eq!(read.len(), 3);
        // No stray temporary files next to the output
        let count = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_open_missing_file() {
        let result = open(Path::new("/nonexistent/input.docx"));
        assert!(matches!(result, Err(ContainerError::Io(_))));
    }

    #[test]
    fn test_invalid_timestamp_falls_back() {
        assert!(date_time_from_parts([1970, 1, 1, 0, 0, 0]).is_none());
        assert!(date_time_from_parts([2024, 13, 1, 0, 0, 0]).is_none());
        assert!(date_time_from_parts([2024, 2, 29, 23, 59, 58]).is_some());
    }
}
