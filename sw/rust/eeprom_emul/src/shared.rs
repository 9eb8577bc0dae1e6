//! Access from more than one execution context.
//!
//! The cache has no locking of its own. `SharedEeprom` runs each operation
//! inside a critical section, which on a single-core target masks interrupts
//! for the duration of the call, including any erase/program busy-waits.

use core::cell::RefCell;

use anyhow::Result;
use critical_section::Mutex;
use flash_core::Flash;

use crate::Eeprom;

pub struct SharedEeprom<F: Flash> {
    inner: Mutex<RefCell<Eeprom<F>>>,
}

impl<F: Flash> SharedEeprom<F> {
    pub const fn new(eeprom: Eeprom<F>) -> Self {
        SharedEeprom { inner: Mutex::new(RefCell::new(eeprom)) }
    }

    /// Run `f` with exclusive access. Calling back into the same
    /// `SharedEeprom` from inside `f` panics.
    pub fn with<R>(&self, f: impl FnOnce(&mut Eeprom<F>) -> R) -> R {
        critical_section::with(|cs| {
            let mut ee = self.inner.borrow_ref_mut(cs);
            f(&mut *ee)
        })
    }

    pub fn write(&self, addr: u32, data: &[u8]) -> Result<()> {
        self.with(|ee| ee.write(addr, data))
    }

    pub fn read(&self, addr: u32, out: &mut [u8]) -> Result<()> {
        self.with(|ee| ee.read(addr, out))
    }

    pub fn commit(&self) -> Result<()> {
        self.with(|ee| ee.commit())
    }

    pub fn needs_commit(&self) -> bool {
        self.with(|ee| ee.needs_commit())
    }

    pub fn into_inner(self) -> Eeprom<F> {
        self.inner.into_inner().into_inner()
    }
}
