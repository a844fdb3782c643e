use crate::page::{Page, PAGE_SIZE};
use crate::store::PageStore;
use crate::{Result, StorageError};
use bytes::{Buf, BufMut, BytesMut};
use log::{debug, warn};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Magic number to identify heap files
const FILE_MAGIC: [u8; 4] = *b"HEAP";

const FILE_VERSION: u32 = 1;

/// Bytes of the header frame that carry data; the rest of the frame is zero.
const HEADER_SIZE: usize = 64;

/// The checksum covers every header byte before it.
const HEADER_CHECKSUM_OFFSET: usize = 44;

const PAGE_CHECKSUM_SIZE: usize = 4;

/// Settings for a [`PageFile`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageFileOptions {
    /// Store a CRC32 after every data page and verify it on read. Fixed
    /// when the file is created; `open_with` uses the value in the header.
    pub checksums: bool,
    /// `fsync` after every page write.
    pub sync_on_write: bool,
}

impl Default for PageFileOptions {
    fn default() -> Self {
        Self {
            checksums: true,
            sync_on_write: false,
        }
    }
}

impl PageFileOptions {
    pub fn checksums(mut self, enabled: bool) -> Self {
        self.checksums = enabled;
        self
    }

    pub fn sync_on_write(mut self, enabled: bool) -> Self {
        self.sync_on_write = enabled;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileHeader {
    magic: [u8; 4],        // "HEAP"
    version: u32,          // File format version
    header_size: u32,      // Meaningful header bytes (64)
    page_size: u32,        // Page size (4096)
    page_count: u64,       // Data pages in file
    checksum_flag: u32,    // 0 = off, 1 = CRC32 after each data page
    created_at: u64,       // Creation timestamp
    last_modified: u64,    // Last modification timestamp
    header_checksum: u32,  // CRC32 of bytes 0..44
}

impl FileHeader {
    fn new(checksums: bool) -> Self {
        let now = unix_now();

        Self {
            magic: FILE_MAGIC,
            version: FILE_VERSION,
            header_size: HEADER_SIZE as u32,
            page_size: PAGE_SIZE as u32,
            page_count: 0,
            checksum_flag: checksums as u32,
            created_at: now,
            last_modified: now,
            header_checksum: 0,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.magic != FILE_MAGIC {
            return Err(invalid("wrong magic number"));
        }

        if self.version > FILE_VERSION {
            return Err(invalid(format!("unsupported file version {}", self.version)));
        }

        if self.header_size as usize != HEADER_SIZE {
            return Err(invalid(format!("unexpected header size {}", self.header_size)));
        }

        if self.page_size as usize != PAGE_SIZE {
            return Err(invalid(format!(
                "page size {} does not match {}",
                self.page_size, PAGE_SIZE
            )));
        }

        Ok(())
    }

    fn checksums(&self) -> bool {
        self.checksum_flag != 0
    }

    /// Encodes the header, filling in its checksum.
    fn encode(&mut self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(HEADER_SIZE);

        buf.put_slice(&self.magic);
        buf.put_u32_le(self.version);
        buf.put_u32_le(self.header_size);
        buf.put_u32_le(self.page_size);
        buf.put_u64_le(self.page_count);
        buf.put_u32_le(self.checksum_flag);
        buf.put_u64_le(self.created_at);
        buf.put_u64_le(self.last_modified);

        self.header_checksum = crc32fast::hash(&buf[..HEADER_CHECKSUM_OFFSET]);
        buf.put_u32_le(self.header_checksum);
        buf.resize(HEADER_SIZE, 0);

        buf
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(invalid("truncated file header"));
        }

        let expected = crc32fast::hash(&bytes[..HEADER_CHECKSUM_OFFSET]);

        let mut buf = bytes;
        let mut magic = [0u8; 4];
        buf.copy_to_slice(&mut magic);

        let header = Self {
            magic,
            version: buf.get_u32_le(),
            header_size: buf.get_u32_le(),
            page_size: buf.get_u32_le(),
            page_count: buf.get_u64_le(),
            checksum_flag: buf.get_u32_le(),
            created_at: buf.get_u64_le(),
            last_modified: buf.get_u64_le(),
            header_checksum: buf.get_u32_le(),
        };

        header.validate()?;

        if header.header_checksum != expected {
            return Err(invalid("file header checksum mismatch"));
        }

        Ok(header)
    }
}

/// A [`PageStore`] kept in a single file on disk.
///
/// The file starts with one `PAGE_SIZE` header frame. Data page `i` follows
/// at `PAGE_SIZE + i * frame_len`, where a frame is the page plus its CRC32
/// when checksums are on.
pub struct PageFile {
    file: Mutex<File>,
    header: FileHeader,
    sync_on_write: bool,
}

impl PageFile {
    pub fn create_new(path: &Path) -> Result<Self> {
        Self::create_with(path, PageFileOptions::default())
    }

    /// Creates a file at `path`. Fails if it already exists.
    pub fn create_with(path: &Path, options: PageFileOptions) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;

        let mut page_file = Self {
            file: Mutex::new(file),
            header: FileHeader::new(options.checksums),
            sync_on_write: options.sync_on_write,
        };

        page_file.write_header()?;
        debug!(
            "created page file {} (checksums: {})",
            path.display(),
            options.checksums
        );

        Ok(page_file)
    }

    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with(path, PageFileOptions::default())
    }

    pub fn open_with(path: &Path, options: PageFileOptions) -> Result<Self> {
        let mut file = OpenOptions::new().read(true).write(true).open(path)?;

        let header = Self::read_header(&mut file).map_err(|e| {
            warn!("rejected page file {}: {}", path.display(), e);
            e
        })?;
        debug!(
            "opened page file {} with {} pages",
            path.display(),
            header.page_count
        );

        Ok(Self {
            file: Mutex::new(file),
            header,
            sync_on_write: options.sync_on_write,
        })
    }

    pub fn checksums(&self) -> bool {
        self.header.checksums()
    }

    pub fn sync(&mut self) -> Result<()> {
        self.file.get_mut().sync_all()?;
        Ok(())
    }

    fn frame_len(&self) -> u64 {
        let checksum = if self.checksums() { PAGE_CHECKSUM_SIZE } else { 0 };
        (PAGE_SIZE + checksum) as u64
    }

    fn page_offset(&self, index: usize) -> u64 {
        PAGE_SIZE as u64 + index as u64 * self.frame_len()
    }

    fn write_header(&mut self) -> Result<()> {
        // Pad the header to a full frame so data pages start aligned
        let mut frame = [0u8; PAGE_SIZE];
        frame[..HEADER_SIZE].copy_from_slice(&self.header.encode());

        let file = self.file.get_mut();
        file.seek(SeekFrom::Start(0))?;
        file.write_all(&frame)?;

        Ok(())
    }

    fn read_header(file: &mut File) -> Result<FileHeader> {
        file.seek(SeekFrom::Start(0))?;

        let mut buffer = [0u8; HEADER_SIZE];
        file.read_exact(&mut buffer)?;

        FileHeader::decode(&buffer)
    }
}

impl PageStore for PageFile {
    fn page_count(&self) -> usize {
        self.header.page_count as usize
    }

    fn read_page(&self, index: usize, page: &mut Page) -> Result<()> {
        if index >= self.page_count() {
            return Err(StorageError::PageOutOfRange {
                page: index,
                page_count: self.page_count(),
            });
        }

        let offset = self.page_offset(index);
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(page.as_bytes_mut())?;

        if self.checksums() {
            let mut stored = [0u8; PAGE_CHECKSUM_SIZE];
            file.read_exact(&mut stored)?;
            if u32::from_le_bytes(stored) != page.checksum() {
                warn!("checksum mismatch reading page {}", index);
                return Err(StorageError::ChecksumMismatch(index));
            }
        }

        Ok(())
    }

    fn write_page(&mut self, index: usize, page: &Page) -> Result<()> {
        let page_count = self.page_count();
        if index > page_count {
            return Err(StorageError::PageOutOfRange {
                page: index,
                page_count,
            });
        }

        let offset = self.page_offset(index);
        let checksums = self.checksums();
        let file = self.file.get_mut();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(page.as_bytes())?;
        if checksums {
            file.write_all(&page.checksum().to_le_bytes())?;
        }

        // Update header if this extends the file
        if index == page_count {
            self.header.page_count += 1;
            self.header.last_modified = unix_now();
            self.write_header()?;
            debug!("appended page {}", index);
        }

        if self.sync_on_write {
            self.sync()?;
        }

        Ok(())
    }
}

fn invalid(reason: impl Into<String>) -> StorageError {
    StorageError::InvalidFile(reason.into())
}

fn unix_now() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};

    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
