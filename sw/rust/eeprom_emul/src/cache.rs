use anyhow::Result;
use flash_core::Flash;

use crate::addr::{RowBase, RowLayout};
use crate::commit::flush_row;

/// Single-row write-back cache.
///
/// `dirty` implies `tag.is_some()`. While a row is resident `buffer` is its
/// authoritative value: equal to the array when clean, ahead of it when dirty.
pub(crate) struct RowCache {
    buffer: Vec<u8>,
    tag: Option<RowBase>,
    dirty: bool,
}

impl RowCache {
    pub fn new(layout: &RowLayout) -> Self {
        RowCache { buffer: vec![0xFF; layout.row_size() as usize], tag: None, dirty: false }
    }

    pub fn tag(&self) -> Option<RowBase> { self.tag }

    pub fn is_dirty(&self) -> bool { self.dirty }

    /// Make `row` the resident row, writing back the current one first if it is dirty.
    pub fn ensure_resident<F: Flash>(&mut self, flash: &mut F, layout: &RowLayout, row: RowBase) -> Result<()> {
        if self.tag == Some(row) {
            log::trace!("row 0x{:08X} hit", row.addr());
            return Ok(());
        }
        if let Some(old) = self.tag {
            log::debug!("evict row 0x{:08X} (dirty={})", old.addr(), self.dirty);
        }
        self.commit(flash, layout)?;

        self.tag = None;
        flash.read(row.addr(), &mut self.buffer)?;
        self.tag = Some(row);
        log::debug!("fetched row 0x{:08X}", row.addr());
        Ok(())
    }

    /// Write the resident row back if dirty. A driver error leaves the row dirty.
    pub fn commit<F: Flash>(&mut self, flash: &mut F, layout: &RowLayout) -> Result<()> {
        debug_assert!(!self.dirty || self.tag.is_some(), "dirty cache without a resident row");
        if let (true, Some(row)) = (self.dirty, self.tag) {
            flush_row(flash, layout, row, &self.buffer)?;
            self.dirty = false;
        }
        Ok(())
    }

    pub fn bytes(&self, off: usize, len: usize) -> &[u8] {
        &self.buffer[off..off + len]
    }

    /// Mutable view into the resident image; marks the row dirty.
    pub fn bytes_mut(&mut self, off: usize, len: usize) -> &mut [u8] {
        debug_assert!(self.tag.is_some());
        self.dirty = true;
        &mut self.buffer[off..off + len]
    }
}
