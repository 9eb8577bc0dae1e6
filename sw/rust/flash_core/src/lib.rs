use anyhow::Result;

/// Physical layout of an NVM array.
///
/// `row_size` is the erase unit and `page_size` the program unit. A row is a
/// whole number of pages.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FlashGeometry {
    pub mem_size: u32,
    pub page_size: u32,
    pub row_size: u32,
}

impl FlashGeometry {
    pub fn pages_per_row(&self) -> u32 {
        self.row_size / self.page_size
    }
}

/// NVM controller as seen by the EEPROM emulation.
///
/// `row_erase` and `program` only issue a command. The caller polls `ready`
/// before issuing the next one; the controller holds one outstanding command.
pub trait Flash {
    fn geometry(&self) -> FlashGeometry;

    /// Memory-mapped read of the current array contents.
    fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<()>;

    /// Program exactly one page starting at `addr` from the erased state.
    fn program(&mut self, addr: u32, data: &[u8]) -> Result<()>;

    /// Erase the row starting at `addr`.
    fn row_erase(&mut self, addr: u32) -> Result<()>;

    fn ready(&mut self) -> bool { true }
}

impl<F: Flash + ?Sized> Flash for &mut F {
    fn geometry(&self) -> FlashGeometry { (**self).geometry() }
    fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<()> { (**self).read(addr, buf) }
    fn program(&mut self, addr: u32, data: &[u8]) -> Result<()> { (**self).program(addr, data) }
    fn row_erase(&mut self, addr: u32) -> Result<()> { (**self).row_erase(addr) }
    fn ready(&mut self) -> bool { (**self).ready() }
}
