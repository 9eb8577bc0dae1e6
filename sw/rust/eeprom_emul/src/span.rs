use anyhow::Result;
use flash_core::Flash;

use crate::addr::FlashAddress;
use crate::Eeprom;

impl<F: Flash> Eeprom<F> {
    /// Write `data` at `addr`, crossing row boundaries as needed.
    ///
    /// Each row is updated in the cache; moving on to the next row commits the
    /// previous one, so a multi-row write is not atomic.
    pub fn write(&mut self, addr: u32, data: &[u8]) -> Result<()> {
        let mut at = FlashAddress(addr);
        self.check_span(at, data.len());
        let mut rest = data;
        while !rest.is_empty() {
            let row = self.layout.row_base(at);
            let off = self.layout.offset_in_row(at);
            let n = rest.len().min(self.layout.remaining_in_row(at));
            self.cache.ensure_resident(&mut self.flash, &self.layout, row)?;
            self.cache.bytes_mut(off, n).copy_from_slice(&rest[..n]);
            rest = &rest[n..];
            at = at.offset(n);
        }
        Ok(())
    }

    /// Fill `out` from `addr`. Sees uncommitted writes.
    pub fn read(&mut self, addr: u32, out: &mut [u8]) -> Result<()> {
        let mut at = FlashAddress(addr);
        self.check_span(at, out.len());
        let mut done = 0;
        while done < out.len() {
            let row = self.layout.row_base(at);
            let off = self.layout.offset_in_row(at);
            let n = (out.len() - done).min(self.layout.remaining_in_row(at));
            self.cache.ensure_resident(&mut self.flash, &self.layout, row)?;
            out[done..done + n].copy_from_slice(self.cache.bytes(off, n));
            done += n;
            at = at.offset(n);
        }
        Ok(())
    }

    pub fn write_byte(&mut self, addr: u32, byte: u8) -> Result<()> {
        self.write(addr, &[byte])
    }

    pub fn read_byte(&mut self, addr: u32) -> Result<u8> {
        let mut b = [0u8; 1];
        self.read(addr, &mut b)?;
        Ok(b[0])
    }
}
