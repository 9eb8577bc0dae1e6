use flash_core::Flash;
use flash_ll::{geometry_from_param, Nvmctrl, RegisterBlock, CMD_ER, CMD_WP};

// SAMD21x18: 4096 pages of 64 bytes.
const PARAM_SAMD21X18: u32 = (3 << 16) | 4096;

struct FakeChip {
    regs: *mut RegisterBlock,
    array: Vec<u32>,
}

impl FakeChip {
    fn new(words: usize) -> Self {
        FakeChip {
            regs: Box::into_raw(Box::new(RegisterBlock::reset_value(PARAM_SAMD21X18))),
            array: vec![0xFFFF_FFFF; words],
        }
    }

    fn driver(&mut self) -> Nvmctrl {
        unsafe { Nvmctrl::new(self.regs, self.array.as_mut_ptr() as *mut u8) }
    }

    fn regs(&self) -> &RegisterBlock {
        unsafe { &*self.regs }
    }
}

impl Drop for FakeChip {
    fn drop(&mut self) {
        unsafe { drop(Box::from_raw(self.regs)) };
    }
}

#[test]
fn geometry_decoded_from_param() {
    let g = geometry_from_param(PARAM_SAMD21X18);
    assert_eq!(g.page_size, 64);
    assert_eq!(g.row_size, 256);
    assert_eq!(g.mem_size, 256 * 1024);
}

#[test]
fn init_selects_manual_write() {
    let mut chip = FakeChip::new(256);
    let drv = chip.driver();
    assert_eq!(drv.geometry().pages_per_row(), 4);
    assert_ne!(chip.regs().ctrlb & (1 << 7), 0);
}

#[test]
fn erase_uses_halfword_address() {
    let mut chip = FakeChip::new(256);
    let mut drv = chip.driver();
    drv.row_erase(0x100).unwrap();
    assert!(drv.ready());
    assert_eq!(chip.regs().addr, 0x80);
    assert_eq!(chip.regs().ctrla, 0xA500 | CMD_ER);
}

#[test]
fn program_fills_page_buffer_then_writes_page() {
    let mut chip = FakeChip::new(256);
    let mut drv = chip.driver();
    let page: Vec<u8> = (0..64).collect();
    drv.program(0x40, &page).unwrap();
    assert_eq!(chip.regs().addr, 0x20);
    assert_eq!(chip.regs().ctrla, 0xA500 | CMD_WP);

    let mut out = [0u8; 64];
    drv.read(0x40, &mut out).unwrap();
    assert_eq!(&out[..], &page[..]);
    assert_eq!(chip.array[16], u32::from_le_bytes([0, 1, 2, 3]));
    assert_eq!(chip.array[15], 0xFFFF_FFFF);
}

#[cfg(debug_assertions)]
#[test]
#[should_panic]
fn read_past_array_end_asserts() {
    let mut chip = FakeChip::new(256);
    let mut drv = chip.driver();
    let mut buf = [0u8; 4];
    let _ = drv.read(256 * 1024 - 2, &mut buf);
}
