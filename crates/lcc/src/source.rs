//! Byte-range access to the backing files.
//!
//! Callers compute a [`ByteRange`] from the metadata and fetch exactly that
//! span; how the bytes arrive (local file, mmap, HTTP range request) is the
//! source's business.

use crate::error::{LccError, Result};
use crate::meta::ByteRange;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

pub trait ByteSource {
    /// Returns exactly `range.length` bytes starting at `range.offset`.
    fn fetch(&self, range: ByteRange) -> Result<Vec<u8>>;

    /// Total size, when known.
    fn size(&self) -> Option<u64>;
}

/// Reads ranges with a seek + read per request.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        // Fail at open time rather than on the first fetch.
        std::fs::metadata(&path)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ByteSource for FileSource {
    fn fetch(&self, range: ByteRange) -> Result<Vec<u8>> {
        let mut file = File::open(&self.path)?;
        let size = file.metadata()?.len();
        let truncated = || LccError::Truncated {
            needed: range.end().unwrap_or(u64::MAX),
            available: size,
        };
        match range.end() {
            Some(end) if end <= size => {}
            _ => return Err(truncated()),
        }

        let length = usize::try_from(range.length).map_err(|_| truncated())?;

        file.seek(SeekFrom::Start(range.offset))?;
        let mut buf = vec![0u8; length];
        file.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn size(&self) -> Option<u64> {
        std::fs::metadata(&self.path).ok().map(|m| m.len())
    }
}

/// Serves ranges out of a read-only memory map.
#[cfg(feature = "mmap")]
pub struct MmapSource {
    map: memmap2::Mmap,
}

#[cfg(feature = "mmap")]
impl MmapSource {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        // Safety: the map is read-only; the scene files are not rewritten
        // while a viewer holds them open.
        let map = unsafe { memmap2::MmapOptions::new().map(&file)? };
        Ok(Self { map })
    }
}

#[cfg(feature = "mmap")]
impl ByteSource for MmapSource {
    fn fetch(&self, range: ByteRange) -> Result<Vec<u8>> {
        let available = self.map.len() as u64;
        let truncated = || LccError::Truncated {
            needed: range.end().unwrap_or(u64::MAX),
            available,
        };
        let end = range.end().ok_or_else(truncated)?;
        let start = usize::try_from(range.offset).map_err(|_| truncated())?;
        let end = usize::try_from(end).map_err(|_| truncated())?;
        self.map
            .get(start..end)
            .map(|s| s.to_vec())
            .ok_or_else(truncated)
    }

    fn size(&self) -> Option<u64> {
        Some(self.map.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_file(name: &str, bytes: &[u8]) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("lcc-source-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn fetches_exact_span() {
        let bytes: Vec<u8> = (0..=255).collect();
        let src = FileSource::open(temp_file("span.bin", &bytes)).unwrap();
        let got = src.fetch(ByteRange { offset: 10, length: 5 }).unwrap();
        assert_eq!(got, vec![10, 11, 12, 13, 14]);
        assert_eq!(src.size(), Some(256));
    }

    #[test]
    fn span_past_end_is_truncated() {
        let src = FileSource::open(temp_file("short.bin", &[0u8; 16])).unwrap();
        match src.fetch(ByteRange { offset: 8, length: 16 }) {
            Err(LccError::Truncated { needed: 24, available: 16 }) => {}
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn overflowing_span_is_truncated() {
        let src = FileSource::open(temp_file("overflow.bin", &[0u8; 16])).unwrap();
        match src.fetch(ByteRange { offset: u64::MAX, length: 2 }) {
            Err(LccError::Truncated { needed: u64::MAX, available: 16 }) => {}
            other => panic!("unexpected {other:?}"),
        }
    }

    #[cfg(feature = "mmap")]
    #[test]
    fn mmap_fetches_exact_span() {
        let bytes: Vec<u8> = (0..=255).collect();
        let src = MmapSource::open(temp_file("mmap-span.bin", &bytes)).unwrap();
        assert_eq!(src.fetch(ByteRange { offset: 10, length: 3 }).unwrap(), vec![10, 11, 12]);
        assert_eq!(src.size(), Some(256));
    }

    #[cfg(feature = "mmap")]
    #[test]
    fn mmap_span_past_end_is_truncated() {
        let src = MmapSource::open(temp_file("mmap-short.bin", &[0u8; 16])).unwrap();
        match src.fetch(ByteRange { offset: 8, length: 16 }) {
            Err(LccError::Truncated { needed: 24, available: 16 }) => {}
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            src.fetch(ByteRange { offset: u64::MAX, length: 2 }),
            Err(LccError::Truncated { .. })
        ));
    }

    #[test]
    fn missing_file_fails_at_open() {
        assert!(matches!(
            FileSource::open("/definitely/not/here.bin"),
            Err(LccError::Io(_))
        ));
    }
}
