//! EEPROM emulation on row-erase, page-program flash.
//!
//! One row at a time is mirrored in RAM. Reads and writes go to that image;
//! switching to another row, or calling [`Eeprom::commit`], erases the
//! resident row and programs it back page by page. Writes that have not been
//! committed are lost on reset or power loss, so callers that need durability
//! must commit explicitly.
//!
//! An [`Eeprom`] is single-owner: every operation takes `&mut self`. Firmware
//! that also touches it from interrupt context should go through
//! [`shared::SharedEeprom`].

use anyhow::{anyhow, Result};
use flash_core::Flash;

pub mod addr;
mod cache;
mod commit;
pub mod shared;
mod span;
mod value;

use addr::{FlashAddress, RowLayout};
use cache::RowCache;

pub struct Eeprom<F: Flash> {
    flash: F,
    layout: RowLayout,
    base: u32,
    size: u32, // emulated region size (bytes)
    cache: RowCache,
}

impl<F: Flash> Eeprom<F> {
    /// Emulate EEPROM over `[base, base + size)` of `flash`. The region must
    /// cover whole rows.
    pub fn new(flash: F, base: u32, size: u32) -> Result<Self> {
        let geom = flash.geometry();
        let layout = RowLayout::from_geometry(&geom)?;
        let end = base as u64 + size as u64;
        if size == 0
            || layout.row_at(base).is_none()
            || size % layout.row_size() != 0
            || end > geom.mem_size as u64
        {
            return Err(anyhow!("invalid region: base 0x{:08X} size {}", base, size));
        }
        log::debug!(
            "eeprom at 0x{:08X}, {} bytes, row {} page {}",
            base, size, layout.row_size(), layout.page_size()
        );
        Ok(Eeprom { flash, layout, base, size, cache: RowCache::new(&layout) })
    }

    /// Erase and program the resident row if it holds uncommitted writes.
    /// Issues no hardware command when there is nothing to commit.
    pub fn commit(&mut self) -> Result<()> {
        self.cache.commit(&mut self.flash, &self.layout)
    }

    pub fn needs_commit(&self) -> bool {
        self.cache.is_dirty()
    }

    /// Base address of the row currently mirrored in RAM.
    pub fn resident_row(&self) -> Option<u32> {
        self.cache.tag().map(|r| r.addr())
    }

    pub fn base(&self) -> u32 { self.base }

    pub fn size(&self) -> u32 { self.size }

    pub fn row_size(&self) -> u32 { self.layout.row_size() }

    pub fn page_size(&self) -> u32 { self.layout.page_size() }

    pub fn flash(&self) -> &F { &self.flash }

    /// Give back the driver. Uncommitted writes are dropped.
    pub fn into_flash(self) -> F { self.flash }

    fn check_span(&self, addr: FlashAddress, len: usize) {
        debug_assert!(
            addr.0 >= self.base && addr.0 as u64 + len as u64 <= self.base as u64 + self.size as u64,
            "access 0x{:08X}+{} outside eeprom region",
            addr.0,
            len
        );
    }
}

#[cfg(feature = "mock")]
pub mod mock {
    use super::*;
    use flash_mock::MockFlash;
    use std::path::Path;

    fn mock_geometry(base: u32, size: u32, page_size: u32, pages_per_row: u32) -> Result<(u32, u32)> {
        let mem_size = base
            .checked_add(size)
            .ok_or_else(|| anyhow!("invalid region: base 0x{:08X} size {}", base, size))?;
        let row_size = page_size
            .checked_mul(pages_per_row)
            .ok_or_else(|| anyhow!("invalid geometry: page {} x {}", page_size, pages_per_row))?;
        Ok((mem_size, row_size))
    }

    /// Fresh erased mock holding exactly the emulated region.
    pub fn new_mock(base: u32, size: u32, page_size: u32, pages_per_row: u32) -> Result<Eeprom<MockFlash>> {
        let (mem_size, row_size) = mock_geometry(base, size, page_size, pages_per_row)?;
        let flash = MockFlash::new(mem_size, page_size, row_size);
        Eeprom::new(flash, base, size)
    }

    /// Mock backed by an image file; see [`MockFlash::load`].
    pub fn open_image(path: &Path, base: u32, size: u32, page_size: u32, pages_per_row: u32) -> Result<Eeprom<MockFlash>> {
        let (mem_size, row_size) = mock_geometry(base, size, page_size, pages_per_row)?;
        let flash = MockFlash::load(path, mem_size, page_size, row_size)?;
        Eeprom::new(flash, base, size)
    }
}

#[cfg(feature = "samd")]
pub mod samd {
    use super::*;
    use flash_ll::Nvmctrl;

    pub fn new_with_driver(drv: Nvmctrl, base: u32, size: u32) -> Result<Eeprom<Nvmctrl>> {
        Eeprom::new(drv, base, size)
    }
}
