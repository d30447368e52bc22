//! Append-only byte arena made of fixed-size pages.
//!
//! Addresses are byte offsets from the start of the arena; a value may span
//! a page boundary. Pages are allocated lazily and capped at `max_pages`.
//! [`PagedMemory::truncate`] resets the append position in O(1) and keeps the
//! pages for reuse; [`PagedMemory::release`] frees them.

use colq_error::{ColqError, Result};

#[derive(Debug)]
pub struct PagedMemory {
    pages: Vec<Box<[u8]>>,
    page_size: usize,
    max_pages: usize,
    append_offset: u64,
}

impl PagedMemory {
    pub fn try_new(page_size: usize, max_pages: usize) -> Result<Self> {
        if page_size == 0 || max_pages == 0 {
            return Err(ColqError::invalid_config(format!(
                "paged memory needs a positive page size and page count, got {page_size}x{max_pages}"
            )));
        }
        Ok(Self {
            pages: Vec::new(),
            page_size,
            max_pages,
            append_offset: 0,
        })
    }

    /// Append `bytes`, returning the offset they were written at.
    pub fn append(&mut self, bytes: &[u8]) -> Result<u64> {
        let offset = self.append_offset;
        let end = offset + bytes.len() as u64;
        self.ensure_capacity(end)?;
        self.append_offset = end;
        self.write_at(offset, bytes)?;
        Ok(offset)
    }

    /// Overwrite previously appended bytes.
    pub fn write_at(&mut self, offset: u64, bytes: &[u8]) -> Result<()> {
        self.check_range(offset, bytes.len())?;
        let mut pos = offset as usize;
        let mut src = bytes;
        while !src.is_empty() {
            let page = pos / self.page_size;
            let within = pos % self.page_size;
            let n = src.len().min(self.page_size - within);
            self.pages[page][within..within + n].copy_from_slice(&src[..n]);
            src = &src[n..];
            pos += n;
        }
        Ok(())
    }

    /// Fill `buf` from previously appended bytes at `offset`.
    pub fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.check_range(offset, buf.len())?;
        let mut pos = offset as usize;
        let mut filled = 0;
        while filled < buf.len() {
            let page = pos / self.page_size;
            let within = pos % self.page_size;
            let n = (buf.len() - filled).min(self.page_size - within);
            buf[filled..filled + n].copy_from_slice(&self.pages[page][within..within + n]);
            filled += n;
            pos += n;
        }
        Ok(())
    }

    pub fn read_u64(&self, offset: u64) -> Result<u64> {
        let mut raw = [0_u8; 8];
        self.read_at(offset, &mut raw)?;
        Ok(u64::from_le_bytes(raw))
    }

    pub fn write_u64(&mut self, offset: u64, value: u64) -> Result<()> {
        self.write_at(offset, &value.to_le_bytes())
    }

    /// Forget all appended bytes; keep the pages.
    pub fn truncate(&mut self) {
        self.append_offset = 0;
    }

    /// Forget all appended bytes and free the pages.
    pub fn release(&mut self) {
        self.pages = Vec::new();
        self.append_offset = 0;
    }

    /// Bytes appended since the last truncate.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.append_offset
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.append_offset == 0
    }

    /// Pages currently holding appended bytes.
    #[must_use]
    pub fn pages_in_use(&self) -> usize {
        self.append_offset.div_ceil(self.page_size as u64) as usize
    }

    /// Pages allocated, including ones kept after a truncate.
    #[must_use]
    pub fn allocated_pages(&self) -> usize {
        self.pages.len()
    }

    #[must_use]
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    #[must_use]
    pub fn max_pages(&self) -> usize {
        self.max_pages
    }

    fn ensure_capacity(&mut self, end: u64) -> Result<()> {
        let needed = end.div_ceil(self.page_size as u64);
        if needed > self.max_pages as u64 {
            return Err(ColqError::LimitExceeded {
                resource: "hash join chain pages",
                limit: self.max_pages,
            });
        }
        while (self.pages.len() as u64) < needed {
            self.pages.push(vec![0_u8; self.page_size].into_boxed_slice());
        }
        Ok(())
    }

    fn check_range(&self, offset: u64, len: usize) -> Result<()> {
        match offset.checked_add(len as u64) {
            Some(end) if end <= self.append_offset => Ok(()),
            _ => Err(ColqError::internal(format!(
                "paged memory access [{offset}, +{len}) past end {}",
                self.append_offset
            ))),
        }
    }
}
