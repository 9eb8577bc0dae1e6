use anyhow::{bail, Context, Result};
use flash_core::{Flash, FlashGeometry};
use std::fs;
use std::path::Path;

/// A command accepted by the controller, in issue order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlashOp {
    Erase(u32),
    Program(u32),
}

/// RAM-backed NVM controller.
///
/// Erased bytes read as 0xFF and programming can only clear bits. After each
/// command the controller reports busy for a configurable number of `ready`
/// polls, and rejects any command issued before it is ready again.
pub struct MockFlash {
    geom: FlashGeometry,
    mem: Vec<u8>,
    ops: Vec<FlashOp>,
    busy: u32,
    erase_busy_ticks: u32,
    prog_busy_ticks: u32,
}

impl MockFlash {
    pub fn new(mem_size: u32, page_size: u32, row_size: u32) -> Self {
        let geom = FlashGeometry { mem_size, page_size, row_size };
        Self {
            geom,
            mem: vec![0xFF; mem_size as usize],
            ops: Vec::new(),
            busy: 0,
            erase_busy_ticks: 0,
            prog_busy_ticks: 0,
        }
    }

    /// Report busy for `erase` polls after an erase and `prog` polls after a program.
    pub fn with_busy_ticks(mut self, erase: u32, prog: u32) -> Self {
        self.erase_busy_ticks = erase;
        self.prog_busy_ticks = prog;
        self
    }

    /// Load the array from an image file. A missing file yields an erased array.
    pub fn load(path: &Path, mem_size: u32, page_size: u32, row_size: u32) -> Result<Self> {
        let mut flash = Self::new(mem_size, page_size, row_size);
        if !path.exists() {
            log::debug!("no image at {}, starting erased", path.display());
            return Ok(flash);
        }
        let bytes = fs::read(path).with_context(|| format!("reading image {}", path.display()))?;
        if bytes.len() > flash.mem.len() {
            bail!("image {} is {} bytes, larger than the {} byte array", path.display(), bytes.len(), flash.mem.len());
        }
        flash.mem[..bytes.len()].copy_from_slice(&bytes);
        log::debug!("loaded {} bytes from {}", bytes.len(), path.display());
        Ok(flash)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, &self.mem).with_context(|| format!("writing image {}", path.display()))
    }

    pub fn ops(&self) -> &[FlashOp] { &self.ops }

    pub fn clear_ops(&mut self) { self.ops.clear(); }

    pub fn erase_count(&self) -> usize {
        self.ops.iter().filter(|op| matches!(op, FlashOp::Erase(_))).count()
    }

    pub fn program_count(&self) -> usize {
        self.ops.iter().filter(|op| matches!(op, FlashOp::Program(_))).count()
    }

    /// Raw array contents, bypassing the command interface.
    pub fn contents(&self) -> &[u8] { &self.mem }

    fn check_idle(&self, what: &str) -> Result<()> {
        if self.busy > 0 {
            bail!("{} issued while controller busy", what);
        }
        Ok(())
    }
}

impl Flash for MockFlash {
    fn geometry(&self) -> FlashGeometry { self.geom }

    fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<()> {
        let end = addr as usize + buf.len();
        if end > self.mem.len() { bail!("oob"); }
        buf.copy_from_slice(&self.mem[addr as usize..end]);
        Ok(())
    }

    fn program(&mut self, addr: u32, data: &[u8]) -> Result<()> {
        self.check_idle("program")?;
        if addr % self.geom.page_size != 0 { bail!("program at 0x{:08X} not page aligned", addr); }
        if data.len() != self.geom.page_size as usize { bail!("program of {} bytes is not one page", data.len()); }
        let a = addr as usize;
        let end = a + data.len();
        if end > self.mem.len() { bail!("oob"); }
        for (cell, &b) in self.mem[a..end].iter_mut().zip(data) { *cell &= b; }
        self.ops.push(FlashOp::Program(addr));
        self.busy = self.prog_busy_ticks;
        Ok(())
    }

    fn row_erase(&mut self, addr: u32) -> Result<()> {
        self.check_idle("erase")?;
        if addr % self.geom.row_size != 0 { bail!("erase at 0x{:08X} not row aligned", addr); }
        let base = addr as usize;
        let end = base + self.geom.row_size as usize;
        if end > self.mem.len() { bail!("oob"); }
        for b in &mut self.mem[base..end] { *b = 0xFF; }
        self.ops.push(FlashOp::Erase(addr));
        self.busy = self.erase_busy_ticks;
        Ok(())
    }

    fn ready(&mut self) -> bool {
        if self.busy == 0 { return true; }
        self.busy -= 1;
        false
    }
}
