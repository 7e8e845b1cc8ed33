//! Memory-Mapped Image untuk encoded buffer
//!
//! Pengganti partisi flash: encoded buffer di-append ke file mapping lalu
//! di-decode langsung dari mapping, di address mana pun OS menaruhnya.
//! Bisa karena encoded buffer hanya berisi self-relative offset.
//!
//! Layout:
//! ┌─────────────────────────────────────────────────────┐
//! │ ImageHeader (64 bytes)                              │
//! ├─────────────────────────────────────────────────────┤
//! │ Entry 0: [len: u64][bytes][pad to 8]                │
//! ├─────────────────────────────────────────────────────┤
//! │ Entry 1: ...                                        │
//! └─────────────────────────────────────────────────────┘

use memmap2::{MmapMut, MmapOptions};
use std::fs::OpenOptions;
use std::mem;
use std::path::Path;

use crate::error::{Error, Result};

#[repr(C, align(64))]
struct ImageHeader {
    magic: u64,
    version: u32,
    _reserved: u32,
    capacity: u64,
    write_pos: u64,
}

const MAGIC: u64 = 0x4345_5249_414C_5F49; // "CERIAL_I"
const VERSION: u32 = 1;
const HEADER_SIZE: usize = mem::size_of::<ImageHeader>();
const LEN_PREFIX: usize = mem::size_of::<u64>();

#[inline(always)]
const fn pad8(n: usize) -> usize {
    (n + 7) & !7
}

/// Append-only store di atas file mapping
pub struct Image {
    mmap: MmapMut,
    capacity: usize,
}

impl Image {
    /// Open or create an image with `capacity` bytes of entry space.
    ///
    /// An existing file with a matching header keeps its entries; anything
    /// else is reinitialized empty.
    pub fn open<P: AsRef<Path>>(path: P, capacity: usize) -> Result<Self> {
        let total_size = HEADER_SIZE + pad8(capacity);

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.as_ref())?;

        if file.metadata()?.len() < total_size as u64 {
            file.set_len(total_size as u64)?;
        }

        // SAFETY: file is open read/write and at least total_size long
        let mmap = unsafe { MmapOptions::new().len(total_size).map_mut(&file)? };
        let mut image = Self {
            mmap,
            capacity: pad8(capacity),
        };

        let header = image.header_mut();
        if header.magic != MAGIC
            || header.version != VERSION
            || header.capacity != image_capacity(capacity)
            || header.write_pos > header.capacity
        {
            tracing::debug!(path = %path.as_ref().display(), capacity, "initializing image");
            header.magic = MAGIC;
            header.version = VERSION;
            header._reserved = 0;
            header.capacity = image_capacity(capacity);
            header.write_pos = 0;
        }

        Ok(image)
    }

    #[inline(always)]
    fn header(&self) -> &ImageHeader {
        // SAFETY: mappings are page aligned and at least HEADER_SIZE long
        unsafe { &*(self.mmap.as_ptr() as *const ImageHeader) }
    }

    #[inline(always)]
    fn header_mut(&mut self) -> &mut ImageHeader {
        // SAFETY: as in `header`, and &mut self gives exclusive access
        unsafe { &mut *(self.mmap.as_mut_ptr() as *mut ImageHeader) }
    }

    #[inline(always)]
    fn data(&self) -> &[u8] {
        &self.mmap[HEADER_SIZE..HEADER_SIZE + self.len()]
    }

    /// Append `bytes` sebagai satu entry, return offset entry.
    pub fn append(&mut self, bytes: &[u8]) -> Result<usize> {
        let needed = LEN_PREFIX + pad8(bytes.len());
        let available = self.available();
        if needed > available {
            return Err(Error::ImageFull { needed, available });
        }

        let offset = self.len();
        let start = HEADER_SIZE + offset;
        let body = start + LEN_PREFIX;

        self.mmap[start..body].copy_from_slice(&(bytes.len() as u64).to_ne_bytes());
        self.mmap[body..body + bytes.len()].copy_from_slice(bytes);
        self.mmap[body + bytes.len()..start + needed].fill(0);

        self.header_mut().write_pos = (offset + needed) as u64;
        tracing::debug!(offset, len = bytes.len(), "appended image entry");

        Ok(offset)
    }

    /// Entry stored at `offset`, borrowed from the mapping
    pub fn get(&self, offset: usize) -> Option<&[u8]> {
        let data = self.data();
        let prefix = data.get(offset..offset.checked_add(LEN_PREFIX)?)?;

        let mut len = [0u8; LEN_PREFIX];
        len.copy_from_slice(prefix);
        let len = usize::try_from(u64::from_ne_bytes(len)).ok()?;

        let body = offset + LEN_PREFIX;
        data.get(body..body.checked_add(len)?)
    }

    /// All entries in append order, with their offsets
    pub fn entries(&self) -> Entries<'_> {
        Entries {
            image: self,
            offset: 0,
        }
    }

    /// Hapus semua entry
    pub fn clear(&mut self) {
        self.header_mut().write_pos = 0;
    }

    pub fn flush(&self) -> Result<()> {
        self.mmap.flush()?;
        Ok(())
    }

    /// Byte yang terpakai oleh entry
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.header().write_pos as usize
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline(always)]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline(always)]
    pub fn available(&self) -> usize {
        self.capacity - self.len()
    }
}

#[inline(always)]
fn image_capacity(capacity: usize) -> u64 {
    pad8(capacity) as u64
}

/// Iterator over `(offset, bytes)` entries
pub struct Entries<'a> {
    image: &'a Image,
    offset: usize,
}

impl<'a> Iterator for Entries<'a> {
    type Item = (usize, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        let offset = self.offset;
        let entry = self.image.get(offset)?;
        self.offset = offset + LEN_PREFIX + pad8(entry.len());
        Some((offset, entry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_size() {
        assert_eq!(HEADER_SIZE, 64);
    }

    #[test]
    fn test_append_get() {
        let dir = tempfile::tempdir().unwrap();
        let mut image = Image::open(dir.path().join("image.bin"), 4096).unwrap();

        let first = image.append(b"Hello, image!").unwrap();
        let second = image.append(b"x").unwrap();

        assert_eq!(first, 0);
        assert_eq!(second, LEN_PREFIX + 16);
        assert_eq!(image.get(first).unwrap(), b"Hello, image!");
        assert_eq!(image.get(second).unwrap(), b"x");
        assert!(image.get(image.len()).is_none());

        let all: Vec<_> = image.entries().map(|(_, e)| e.to_vec()).collect();
        assert_eq!(all, vec![b"Hello, image!".to_vec(), b"x".to_vec()]);
    }

    #[test]
    fn test_full() {
        let dir = tempfile::tempdir().unwrap();
        let mut image = Image::open(dir.path().join("image.bin"), 32).unwrap();

        image.append(&[1u8; 16]).unwrap();
        let err = image.append(&[2u8; 16]).unwrap_err();
        assert!(matches!(
            err,
            Error::ImageFull {
                needed: 24,
                available: 8
            }
        ));

        image.clear();
        assert!(image.is_empty());
        image.append(&[2u8; 16]).unwrap();
    }

    #[test]
    fn test_persistence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("image.bin");

        {
            let mut image = Image::open(&path, 4096).unwrap();
            image.append(b"Persistent data").unwrap();
            image.flush().unwrap();
        }

        {
            let image = Image::open(&path, 4096).unwrap();
            assert_eq!(image.get(0).unwrap(), b"Persistent data");
        }

        // a different capacity starts over
        let image = Image::open(&path, 8192).unwrap();
        assert!(image.is_empty());
    }
}
