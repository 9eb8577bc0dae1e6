//! Driver for the SAM D NVM controller (NVMCTRL).
//!
//! The array is memory mapped: reads are plain loads, and a page is
//! programmed by storing it into the mapped range (which fills the page
//! buffer) and then issuing the write-page command. `ADDR` takes a 16-bit
//! word address.

use anyhow::Result;
use core::ptr::{addr_of, addr_of_mut};
use flash_core::{Flash, FlashGeometry};

pub const NVMCTRL_BASE: usize = 0x4100_4000;

const CTRLA_CMDEX_KEY: u16 = 0xA5 << 8;
pub const CMD_ER: u16 = 0x02;
pub const CMD_WP: u16 = 0x04;

const CTRLB_MANW: u32 = 1 << 7;
pub const INTFLAG_READY: u8 = 1 << 0;

const PAGES_PER_ROW: u32 = 4;

#[repr(C)]
pub struct RegisterBlock {
    pub ctrla: u16,
    _reserved0: u16,
    pub ctrlb: u32,
    pub param: u32,
    pub intenclr: u8,
    _reserved1: [u8; 3],
    pub intenset: u8,
    _reserved2: [u8; 3],
    pub intflag: u8,
    _reserved3: [u8; 3],
    pub status: u16,
    _reserved4: u16,
    pub addr: u32,
}

impl RegisterBlock {
    /// Power-on register values; used as the backing store for a controller
    /// that is not real hardware.
    pub fn reset_value(param: u32) -> Self {
        RegisterBlock {
            ctrla: 0,
            _reserved0: 0,
            ctrlb: 0,
            param,
            intenclr: 0,
            _reserved1: [0; 3],
            intenset: 0,
            _reserved2: [0; 3],
            intflag: INTFLAG_READY,
            _reserved3: [0; 3],
            status: 0,
            _reserved4: 0,
            addr: 0,
        }
    }
}

/// Geometry encoded in `PARAM`: NVMP is the page count, PSZ the page size as `8 << PSZ`.
pub fn geometry_from_param(param: u32) -> FlashGeometry {
    let pages = param & 0xFFFF;
    let page_size = 8u32 << ((param >> 16) & 0x7);
    FlashGeometry { mem_size: pages * page_size, page_size, row_size: page_size * PAGES_PER_ROW }
}

pub struct Nvmctrl {
    regs: *mut RegisterBlock,
    array: *mut u8,
    geom: FlashGeometry,
}

impl Nvmctrl {
    /// # Safety
    /// `regs` must point at the NVMCTRL register block (normally
    /// [`NVMCTRL_BASE`]) and `array` at the 4-byte aligned start of the flash
    /// mapping, both valid for the lifetime of the driver, with no other code
    /// touching the controller.
    pub unsafe fn new(regs: *mut RegisterBlock, array: *mut u8) -> Self {
        let param = core::ptr::read_volatile(addr_of!((*regs).param));
        let geom = geometry_from_param(param);
        // Manual write: the page buffer is only committed by CMD_WP.
        let ctrlb = core::ptr::read_volatile(addr_of!((*regs).ctrlb));
        core::ptr::write_volatile(addr_of_mut!((*regs).ctrlb), ctrlb | CTRLB_MANW);
        log::debug!("nvmctrl: {} pages of {} bytes", geom.mem_size / geom.page_size, geom.page_size);
        Nvmctrl { regs, array, geom }
    }

    fn command(&mut self, addr: u32, cmd: u16) {
        unsafe {
            core::ptr::write_volatile(addr_of_mut!((*self.regs).addr), addr / 2);
            core::ptr::write_volatile(addr_of_mut!((*self.regs).ctrla), CTRLA_CMDEX_KEY | cmd);
        }
    }
}

impl Flash for Nvmctrl {
    fn geometry(&self) -> FlashGeometry { self.geom }

    fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<()> {
        debug_assert!(addr as u64 + buf.len() as u64 <= self.geom.mem_size as u64);
        for (i, b) in buf.iter_mut().enumerate() {
            *b = unsafe { core::ptr::read_volatile(self.array.add(addr as usize + i)) };
        }
        Ok(())
    }

    fn program(&mut self, addr: u32, data: &[u8]) -> Result<()> {
        debug_assert_eq!(data.len(), self.geom.page_size as usize);
        debug_assert!(addr as u64 + data.len() as u64 <= self.geom.mem_size as u64);
        // Page buffer takes 32-bit stores only.
        let dst = unsafe { self.array.add(addr as usize) } as *mut u32;
        for (i, word) in data.chunks_exact(4).enumerate() {
            let w = u32::from_le_bytes([word[0], word[1], word[2], word[3]]);
            unsafe { core::ptr::write_volatile(dst.add(i), w) };
        }
        self.command(addr, CMD_WP);
        Ok(())
    }

    fn row_erase(&mut self, addr: u32) -> Result<()> {
        self.command(addr, CMD_ER);
        Ok(())
    }

    fn ready(&mut self) -> bool {
        unsafe { core::ptr::read_volatile(addr_of!((*self.regs).intflag)) & INTFLAG_READY != 0 }
    }
}
