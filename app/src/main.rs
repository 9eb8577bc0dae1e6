use anyhow::{anyhow, bail, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use eeprom_emul::mock::{new_mock, open_image};
use eeprom_emul::Eeprom;
use flash_mock::MockFlash;
use std::io::{self, Write};
use std::path::PathBuf;

const DEFAULT_PAGE_SIZE: u32 = 256;
const DEFAULT_PAGES_PER_ROW: u32 = 4;
const DEFAULT_EEPROM_SIZE: u32 = 4096;
const DEFAULT_BASE: u32 = 0;

// Fixed layout for demo, offsets into the region
const BOOT_COUNTER_ADDR: u32 = 0x0000; // u32
const KV_NAME_ADDR: u32 = 0x0010; // 32 bytes
const KV_NAME_LEN: usize = 32;
const KV_BAUD_ADDR: u32 = 0x0030; // u32
const KV_MODE_ADDR: u32 = 0x0034; // u8

#[derive(Parser, Debug)]
#[command(name = "eeprom_demo", version, about = "Row-cached EEPROM emulation over mock flash", disable_help_subcommand = true)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,

    /// Region base address inside flash (row aligned)
    #[arg(long, default_value_t = DEFAULT_BASE)]
    base: u32,
    /// Region size in bytes (whole rows)
    #[arg(long, default_value_t = DEFAULT_EEPROM_SIZE)]
    size: u32,
    /// Flash page size (bytes)
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
    page_size: u32,
    /// Pages per erase row
    #[arg(long, default_value_t = DEFAULT_PAGES_PER_ROW)]
    pages_per_row: u32,
    /// Flash image file kept between runs
    #[arg(long)]
    image: Option<PathBuf>,
    /// Leave pending writes uncommitted on exit
    #[arg(long)]
    no_commit: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print geometry and layout
    Info,
    /// Fill the whole region with 0xFF
    Format,
    /// Read bytes at offset
    Read { addr: u32, len: u32 },
    /// Write bytes at offset
    Write(WriteArgs),
    /// Dump a region in hex
    Dump { offset: Option<u32>, len: Option<u32> },
    /// Boot counter (optionally increment)
    Boot { #[arg(long)] inc: bool },
    /// Simple fixed-offset key/value ops
    Kv { #[command(subcommand)] cmd: KvCmd },
    /// Show the cache state
    Status,
    /// Interactive shell
    Repl,
}

#[derive(Args, Debug)]
struct WriteArgs {
    addr: u32,
    #[arg(long, conflicts_with = "str")] hex: Option<String>,
    #[arg(long, conflicts_with = "hex")] str: Option<String>,
}

#[derive(Subcommand, Debug)]
enum KvCmd {
    Get { key: KvKey },
    Set { key: KvKey, value: String },
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum KvKey { Name, Baud, Mode }

type Demo = Eeprom<MockFlash>;

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    run_cli(cli)
}

fn open(cli: &Cli) -> Result<Demo> {
    match &cli.image {
        Some(path) => open_image(path, cli.base, cli.size, cli.page_size, cli.pages_per_row),
        None => new_mock(cli.base, cli.size, cli.page_size, cli.pages_per_row),
    }
}

fn finish(ee: &mut Demo, cli: &Cli) -> Result<()> {
    if cli.no_commit {
        if ee.needs_commit() { log::warn!("leaving row 0x{:08X} uncommitted", ee.resident_row().unwrap_or(0)); }
        return Ok(());
    }
    ee.commit()?;
    if let Some(path) = &cli.image {
        ee.flash().save(path)?;
        log::info!("saved image {}", path.display());
    }
    Ok(())
}

fn run_cli(cli: Cli) -> Result<()> {
    let mut ee = open(&cli)?;
    match &cli.cmd {
        Command::Info => print_info(&ee),
        Command::Format => {
            format(&mut ee)?;
            println!("Formatted EEPROM ({} bytes, row {}).", ee.size(), ee.row_size());
        }
        Command::Read { addr, len } => {
            let mut buf = vec![0u8; *len as usize];
            ee.read(region_addr(&ee, *addr, buf.len())?, &mut buf)?;
            println!("{}", hex::encode(buf));
        }
        Command::Write(w) => {
            let data = if let Some(h) = &w.hex { decode_hex(h)? } else if let Some(s) = &w.str { s.clone().into_bytes() } else { bail!("Provide --hex or --str"); };
            ee.write(region_addr(&ee, w.addr, data.len())?, &data)?;
            println!("Wrote {} bytes at 0x{:04X}", data.len(), w.addr);
        }
        Command::Dump { offset, len } => {
            let off = offset.unwrap_or(0);
            let ln = len.unwrap_or(ee.size().saturating_sub(off));
            dump(&mut ee, off, ln)?;
        }
        Command::Boot { inc } => boot(&mut ee, *inc)?,
        Command::Kv { cmd } => match cmd {
            KvCmd::Get { key } => kv_get(&mut ee, *key)?,
            KvCmd::Set { key, value } => kv_set(&mut ee, *key, value)?,
        },
        Command::Status => print_status(&ee),
        Command::Repl => repl(&mut ee)?,
    }
    finish(&mut ee, &cli)
}

/// Absolute address of `len` bytes at region offset `off`.
fn region_addr(ee: &Demo, off: u32, len: usize) -> Result<u32> {
    if off as u64 + len as u64 > ee.size() as u64 {
        bail!("out of range: 0x{:04X}+{} exceeds {} byte region", off, len, ee.size());
    }
    Ok(ee.base() + off)
}

fn print_info(ee: &Demo) {
    println!("Geometry:");
    println!("- base:        0x{:08X}", ee.base());
    println!("- eeprom_size: {}", ee.size());
    println!("- row_size:    {}", ee.row_size());
    println!("- page_size:   {}", ee.page_size());
    println!("Layout:");
    println!("- boot_count @ 0x{:04X} (u32)", BOOT_COUNTER_ADDR);
    println!("- name       @ 0x{:04X} ({}B)", KV_NAME_ADDR, KV_NAME_LEN);
    println!("- baud       @ 0x{:04X} (u32)", KV_BAUD_ADDR);
    println!("- mode       @ 0x{:04X} (u8)", KV_MODE_ADDR);
}

fn print_status(ee: &Demo) {
    match ee.resident_row() {
        Some(row) => println!("resident row: 0x{:08X}", row),
        None => println!("resident row: none"),
    }
    println!("needs_commit: {}", ee.needs_commit());
    println!("erases: {}, page programs: {}", ee.flash().erase_count(), ee.flash().program_count());
}

fn format(ee: &mut Demo) -> Result<()> {
    let blank = vec![0xFFu8; ee.size() as usize];
    ee.write(ee.base(), &blank)
}

fn dump(ee: &mut Demo, off: u32, len: u32) -> Result<()> {
    let mut buf = vec![0u8; len as usize];
    ee.read(region_addr(ee, off, buf.len())?, &mut buf)?;
    hexdump(off as usize, &buf);
    Ok(())
}

fn boot(ee: &mut Demo, inc: bool) -> Result<()> {
    let at = region_addr(ee, BOOT_COUNTER_ADDR, 4)?;
    let mut cnt: u32 = ee.read_value(at)?;
    // erased cells read as all ones
    if cnt == u32::MAX { cnt = 0; }
    println!("boot_count={}", cnt);
    if inc {
        cnt = cnt.wrapping_add(1);
        ee.write_value(at, &cnt)?;
        println!("incremented -> {}", cnt);
    }
    Ok(())
}

fn kv_get(ee: &mut Demo, key: KvKey) -> Result<()> {
    match key {
        KvKey::Name => {
            let mut buf = vec![0u8; KV_NAME_LEN];
            ee.read(region_addr(ee, KV_NAME_ADDR, KV_NAME_LEN)?, &mut buf)?;
            let end = buf.iter().position(|&b| b == 0 || b == 0xFF).unwrap_or(buf.len());
            let s = String::from_utf8_lossy(&buf[..end]).to_string();
            println!("name={}", s);
        }
        KvKey::Baud => {
            let v: u32 = ee.read_value(region_addr(ee, KV_BAUD_ADDR, 4)?)?;
            println!("baud={}", v);
        }
        KvKey::Mode => {
            println!("mode={}", ee.read_byte(region_addr(ee, KV_MODE_ADDR, 1)?)?);
        }
    }
    Ok(())
}

fn kv_set(ee: &mut Demo, key: KvKey, value: &str) -> Result<()> {
    match key {
        KvKey::Name => {
            let mut buf = [0u8; KV_NAME_LEN];
            let bytes = value.as_bytes();
            if bytes.len() > KV_NAME_LEN { bail!("name too long (max {} bytes)", KV_NAME_LEN); }
            buf[..bytes.len()].copy_from_slice(bytes);
            ee.write(region_addr(ee, KV_NAME_ADDR, KV_NAME_LEN)?, &buf)?;
        }
        KvKey::Baud => {
            let v: u32 = value.parse().map_err(|_| anyhow!("invalid u32"))?;
            ee.write_value(region_addr(ee, KV_BAUD_ADDR, 4)?, &v)?;
        }
        KvKey::Mode => {
            let v: u8 = value.parse().map_err(|_| anyhow!("invalid u8"))?;
            ee.write_byte(region_addr(ee, KV_MODE_ADDR, 1)?, v)?;
        }
    }
    println!("ok");
    Ok(())
}

fn repl(ee: &mut Demo) -> Result<()> {
    let mut rl = rustyline::DefaultEditor::new()?;
    println!("EEPROM REPL. Type 'help' or 'quit'.");
    loop {
        let line = match rl.readline("eeprom> ") {
            Ok(s) => s,
            Err(_) => break,
        };
        let line = line.trim();
        if line.is_empty() { continue; }
        rl.add_history_entry(line).ok();
        match handle_repl_line(ee, line) {
            Ok(Control::Continue) => {}
            Ok(Control::Quit) => break,
            Err(e) => eprintln!("error: {}", e),
        }
        io::stdout().flush().ok();
    }
    Ok(())
}

#[derive(Debug, PartialEq)]
enum Control { Continue, Quit }

fn handle_repl_line(ee: &mut Demo, line: &str) -> Result<Control> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.is_empty() { return Ok(Control::Continue); }
    match parts[0] {
        "help" => {
            println!("commands: info, status, format, read <addr> <len>, write <addr> --hex <bytes>|--str <text>, dump [off] [len], boot [--inc], kv get <name|baud|mode>, kv set <...>, commit, quit");
        }
        "quit" | "exit" => return Ok(Control::Quit),
        "info" => print_info(ee),
        "status" => print_status(ee),
        "commit" => {
            let pending = ee.needs_commit();
            ee.commit()?;
            println!("{}", if pending { "committed" } else { "nothing to commit" });
        }
        "format" => {
            format(ee)?;
            println!("formatted (pending commit)");
        }
        "read" => {
            if parts.len() < 3 { bail!("usage: read <addr> <len>"); }
            let addr = parse_u32(parts[1])?; let len = parse_u32(parts[2])?;
            let mut buf = vec![0u8; len as usize];
            ee.read(region_addr(ee, addr, buf.len())?, &mut buf)?;
            println!("{}", hex::encode(buf));
        }
        "write" => {
            if parts.len() < 3 { bail!("usage: write <addr> (--hex <bytes> | --str <text>)"); }
            let addr = parse_u32(parts[1])?;
            let mut data: Option<Vec<u8>> = None;
            let mut i = 2;
            while i < parts.len() {
                match parts[i] {
                    "--hex" => { i+=1; if i>=parts.len() { bail!("missing hex"); } data = Some(decode_hex(parts[i])?); },
                    "--str" => { i+=1; if i>=parts.len() { bail!("missing str"); } data = Some(parts[i].as_bytes().to_vec()); },
                    _ => bail!("unknown flag {}", parts[i]),
                }
                i+=1;
            }
            let data = data.ok_or_else(|| anyhow!("provide --hex or --str"))?;
            ee.write(region_addr(ee, addr, data.len())?, &data)?;
            println!("ok");
        }
        "dump" => {
            let off = parts.get(1).map(|s| parse_u32(s)).transpose()?.unwrap_or(0);
            let len = parts.get(2).map(|s| parse_u32(s)).transpose()?.unwrap_or(ee.size().saturating_sub(off));
            dump(ee, off, len)?;
        }
        "boot" => boot(ee, parts.iter().any(|s| *s == "--inc"))?,
        "kv" => {
            if parts.len() < 3 { bail!("usage: kv <get|set> ..."); }
            match parts[1] {
                "get" => kv_get(ee, parse_key(parts.get(2).copied())?)?,
                "set" => {
                    if parts.len() < 4 { bail!("usage: kv set <key> <value>"); }
                    kv_set(ee, parse_key(parts.get(2).copied())?, parts[3])?;
                }
                c => bail!("unknown kv cmd {}", c),
            }
        }
        other => bail!("unknown command {}", other),
    }
    Ok(Control::Continue)
}

fn parse_key(name: Option<&str>) -> Result<KvKey> { match name {
    Some("name") => Ok(KvKey::Name),
    Some("baud") => Ok(KvKey::Baud),
    Some("mode") => Ok(KvKey::Mode),
    _ => bail!("unknown key (name|baud|mode)"),
} }

fn parse_u32(s: &str) -> Result<u32> {
    if let Some(rest) = s.strip_prefix("0x") { u32::from_str_radix(rest, 16).map_err(|_| anyhow!("invalid u32")) }
    else { s.parse::<u32>().map_err(|_| anyhow!("invalid u32")) }
}

fn decode_hex(s: &str) -> Result<Vec<u8>> {
    let s = s.trim();
    let s = s.strip_prefix("0x").unwrap_or(s);
    let s = s.replace(' ', "").replace('_', "");
    if s.len() % 2 != 0 { bail!("hex must have even length"); }
    hex::decode(s).map_err(|e| anyhow!("{}", e))
}

fn hexdump(start: usize, data: &[u8]) {
    let mut off = 0usize;
    while off < data.len() {
        let line = &data[off..data.len().min(off + 16)];
        print!("{:08X}: ", start + off);
        for i in 0..16 { if i < line.len() { print!("{:02X} ", line[i]); } else { print!("   "); } }
        print!(" | ");
        for &b in line { let c = if (0x20..=0x7E).contains(&b) { b as char } else { '.' }; print!("{}", c); }
        println!();
        off += 16;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn demo() -> Demo { new_mock(0, 4096, 256, 4).unwrap() }

    #[test]
    fn parses_hex_and_decimal() {
        assert_eq!(parse_u32("0x10").unwrap(), 16);
        assert_eq!(parse_u32("42").unwrap(), 42);
        assert!(parse_u32("zz").is_err());
        assert_eq!(decode_hex("0xDE AD_be").unwrap(), vec![0xDE, 0xAD, 0xBE]);
        assert!(decode_hex("abc").is_err());
    }

    #[test]
    fn repl_write_then_commit() {
        let mut ee = demo();
        assert_eq!(handle_repl_line(&mut ee, "write 0x3FE --hex 01020304").unwrap(), Control::Continue);
        assert!(ee.needs_commit());
        handle_repl_line(&mut ee, "commit").unwrap();
        assert!(!ee.needs_commit());
        assert_eq!(&ee.flash().contents()[0x3FE..0x402], &[1, 2, 3, 4]);
        assert_eq!(handle_repl_line(&mut ee, "quit").unwrap(), Control::Quit);
        assert!(handle_repl_line(&mut ee, "bogus").is_err());
    }

    #[test]
    fn out_of_range_offsets_are_errors() {
        let mut ee = demo();
        assert!(handle_repl_line(&mut ee, "read 5000 4").is_err());
        assert!(handle_repl_line(&mut ee, "read 4094 4").is_err());
        assert!(handle_repl_line(&mut ee, "read 0xFFFFFFFF 1").is_err());
        assert!(handle_repl_line(&mut ee, "write 4095 --hex 0102").is_err());
        assert!(handle_repl_line(&mut ee, "dump 4090 16").is_err());
        assert!(!ee.needs_commit());
        assert_eq!(handle_repl_line(&mut ee, "read 4092 4").unwrap(), Control::Continue);
        assert!(region_addr(&ee, 4096, 0).is_ok());
    }

    #[test]
    fn fixed_layout_checked_against_small_region() {
        // 8 byte pages: one 32 byte row, too small for the kv fields
        let mut ee = new_mock(0, 32, 8, 4).unwrap();
        assert!(kv_get(&mut ee, KvKey::Mode).is_err());
        assert!(kv_set(&mut ee, KvKey::Baud, "9600").is_err());
        boot(&mut ee, true).unwrap();
    }

    #[test]
    fn oversized_offset_from_cli_is_an_error() {
        let cli = Cli::parse_from(["eeprom_demo", "read", "4096", "1"]);
        assert!(run_cli(cli).is_err());
    }

    #[test]
    fn boot_counter_starts_at_zero_on_erased_flash() {
        let mut ee = demo();
        boot(&mut ee, true).unwrap();
        boot(&mut ee, true).unwrap();
        assert_eq!(ee.read_value::<u32>(BOOT_COUNTER_ADDR).unwrap(), 2);
    }

    #[test]
    fn kv_values_roundtrip() {
        let mut ee = demo();
        kv_set(&mut ee, KvKey::Baud, "115200").unwrap();
        kv_set(&mut ee, KvKey::Name, "probe").unwrap();
        assert!(kv_set(&mut ee, KvKey::Mode, "300").is_err());
        assert_eq!(ee.read_value::<u32>(KV_BAUD_ADDR).unwrap(), 115200);
        let mut name = [0u8; 5];
        ee.read(KV_NAME_ADDR, &mut name).unwrap();
        assert_eq!(&name, b"probe");
    }

    #[test]
    fn image_survives_runs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("demo.bin");
        let args = ["eeprom_demo", "--image", path.to_str().unwrap(), "boot", "--inc"];
        run_cli(Cli::parse_from(args)).unwrap();
        run_cli(Cli::parse_from(args)).unwrap();
        let cli = Cli::parse_from(["eeprom_demo", "--image", path.to_str().unwrap(), "status"]);
        let mut ee = open(&cli).unwrap();
        assert_eq!(ee.read_value::<u32>(BOOT_COUNTER_ADDR).unwrap(), 2);
    }
}
