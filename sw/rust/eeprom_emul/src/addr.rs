//! Address arithmetic for row/page granular flash.
//!
//! Row and page bases are only produced here, so every base address the cache
//! or the commit sequence sees is aligned by construction.

use anyhow::{anyhow, Result};
use flash_core::FlashGeometry;

/// Absolute byte address in the NVM address space.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct FlashAddress(pub u32);

/// Base address of a row (the erase unit).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct RowBase(u32);

/// Base address of a page (the program unit).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct PageBase(u32);

impl RowBase {
    pub fn addr(self) -> u32 { self.0 }
}

impl PageBase {
    pub fn addr(self) -> u32 { self.0 }
}

impl FlashAddress {
    pub fn offset(self, n: usize) -> FlashAddress {
        FlashAddress(self.0.wrapping_add(n as u32))
    }
}

/// Validated row/page sizes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RowLayout {
    row_size: u32,
    page_size: u32,
}

impl RowLayout {
    pub fn new(row_size: u32, page_size: u32) -> Result<Self> {
        if !page_size.is_power_of_two() || !row_size.is_power_of_two() || row_size < page_size {
            return Err(anyhow!("invalid geometry: row {} page {}", row_size, page_size));
        }
        Ok(RowLayout { row_size, page_size })
    }

    pub fn from_geometry(geom: &FlashGeometry) -> Result<Self> {
        Self::new(geom.row_size, geom.page_size)
    }

    pub fn row_size(&self) -> u32 { self.row_size }

    pub fn page_size(&self) -> u32 { self.page_size }

    fn mask(&self) -> u32 { self.row_size - 1 }

    pub fn row_base(&self, a: FlashAddress) -> RowBase {
        RowBase(a.0 & !self.mask())
    }

    pub fn offset_in_row(&self, a: FlashAddress) -> usize {
        (a.0 & self.mask()) as usize
    }

    pub fn remaining_in_row(&self, a: FlashAddress) -> usize {
        self.row_size as usize - self.offset_in_row(a)
    }

    /// Checked conversion of an address the caller claims is a row base.
    pub fn row_at(&self, addr: u32) -> Option<RowBase> {
        (addr & self.mask() == 0).then_some(RowBase(addr))
    }

    /// Page bases of `row` in ascending address order.
    pub fn pages(&self, row: RowBase) -> impl Iterator<Item = PageBase> {
        let step = self.page_size;
        (0..self.row_size / step).map(move |i| PageBase(row.0 + i * step))
    }
}
