use anyhow::Result;
use bytemuck::Pod;
use flash_core::Flash;

use crate::Eeprom;

/// Typed access. Values are stored in their in-memory layout, so an image is
/// only portable between targets of the same endianness.
impl<F: Flash> Eeprom<F> {
    pub fn write_value<T: Pod>(&mut self, addr: u32, value: &T) -> Result<()> {
        self.write(addr, bytemuck::bytes_of(value))
    }

    pub fn read_value<T: Pod>(&mut self, addr: u32) -> Result<T> {
        let mut value = <T as bytemuck::Zeroable>::zeroed();
        self.read(addr, bytemuck::bytes_of_mut(&mut value))?;
        Ok(value)
    }

    pub fn write_slice<T: Pod>(&mut self, addr: u32, values: &[T]) -> Result<()> {
        self.write(addr, bytemuck::cast_slice(values))
    }

    pub fn read_slice<T: Pod>(&mut self, addr: u32, out: &mut [T]) -> Result<()> {
        self.read(addr, bytemuck::cast_slice_mut(out))
    }
}
