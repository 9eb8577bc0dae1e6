use anyhow::Result;
use flash_core::Flash;

use crate::addr::{RowBase, RowLayout};

/// Spin until the controller accepts a new command. There is no timeout: a
/// controller that never becomes ready hangs the caller.
pub(crate) fn wait_ready<F: Flash>(flash: &mut F) {
    while !flash.ready() {
        core::hint::spin_loop();
    }
}

/// Erase `row` and program `image` into it one page at a time, lowest page first.
pub(crate) fn flush_row<F: Flash>(flash: &mut F, layout: &RowLayout, row: RowBase, image: &[u8]) -> Result<()> {
    debug_assert_eq!(image.len(), layout.row_size() as usize);
    log::debug!("commit row 0x{:08X}", row.addr());

    flash.row_erase(row.addr())?;
    wait_ready(flash);

    let page_len = layout.page_size() as usize;
    for (page, data) in layout.pages(row).zip(image.chunks_exact(page_len)) {
        log::trace!("program page 0x{:08X}", page.addr());
        flash.program(page.addr(), data)?;
        wait_ready(flash);
    }
    Ok(())
}
