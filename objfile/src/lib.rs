//! Renders an assembled code map into one of the output container formats
//! the reference toolchain supports: Intel HEX, Idiot/4, ELF/OS, raw
//! binary, or a no-op writer for callers that only want the listing/symbol
//! output.
//!
//! None of these formats know anything about assembly; they only see a
//! sparse `start address -> bytes` map (the engine's `code_map`) and an
//! optional entry point.

use byteorder::WriteBytesExt;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use util::Endian;

/// Sparse, non-overlapping blob map: `start address -> bytes`, the same
/// shape as `engine::AssembleOutcome::code_map`. `objfile` doesn't depend
/// on `engine` directly; it only needs this shape.
pub type CodeMap = std::collections::BTreeMap<u16, Vec<u8>>;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum OutputFormat {
    IntelHex,
    Idiot4,
    ElfOs,
    Binary,
    None,
}

impl OutputFormat {
    pub fn parse(name: &str) -> Option<OutputFormat> {
        match name.to_ascii_lowercase().as_str() {
            "hex" | "intelhex" => Some(OutputFormat::IntelHex),
            "idiot4" => Some(OutputFormat::Idiot4),
            "elfos" => Some(OutputFormat::ElfOs),
            "bin" | "binary" => Some(OutputFormat::Binary),
            "none" => Some(OutputFormat::None),
            _ => None,
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = util::ParseEnumError;

    fn from_str(s: &str) -> Result<OutputFormat, util::ParseEnumError> {
        OutputFormat::parse(s).ok_or_else(|| util::ParseEnumError {
            value: s.to_string(),
            enum_name: "OutputFormat",
        })
    }
}

/// Dispatches to the writer for `format`.
pub fn write<W: Write>(
    format: OutputFormat,
    out: &mut W,
    code: &CodeMap,
    entry: Option<u16>,
) -> io::Result<()> {
    match format {
        OutputFormat::IntelHex => write_intel_hex(out, code, entry),
        OutputFormat::Idiot4 => write_idiot4(out, code),
        OutputFormat::ElfOs => write_elfos(out, code, entry),
        OutputFormat::Binary => write_binary(out, code),
        OutputFormat::None => write_none(out, code),
    }
}

pub fn write_to_file<P: AsRef<Path>>(
    path: P,
    format: OutputFormat,
    code: &CodeMap,
    entry: Option<u16>,
) -> io::Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    write(format, &mut out, code, entry)
}

/// One Intel HEX record: `:LLAAAATT<data>CC`. The checksum is the
/// two's-complement of the sum of every byte in the record (length,
/// address, type, data).
fn hex_record<W: Write>(out: &mut W, address: u16, record_type: u8, data: &[u8]) -> io::Result<()> {
    let mut sum: u32 = data.len() as u32 + (address >> 8) as u32 + (address & 0xFF) as u32 + record_type as u32;
    for &b in data {
        sum += b as u32;
    }
    let checksum = 0x100u32.wrapping_sub(sum & 0xFF) & 0xFF;
    write!(out, ":{:02X}{:04X}{:02X}", data.len(), address, record_type)?;
    for &b in data {
        write!(out, "{:02X}", b)?;
    }
    writeln!(out, "{:02X}", checksum)
}

/// One data record per 16-byte chunk of each non-empty blob, an optional
/// pair of start-address records (type 3 and type 5, both carrying the
/// same big-endian entry point) when an entry point was set, and a
/// trailing end-of-file record.
pub fn write_intel_hex<W: Write>(out: &mut W, code: &CodeMap, entry: Option<u16>) -> io::Result<()> {
    for (&start, bytes) in code {
        if bytes.is_empty() {
            continue;
        }
        for (i, chunk) in bytes.chunks(16).enumerate() {
            let addr = start.wrapping_add((i * 16) as u16);
            hex_record(out, addr, 0x00, chunk)?;
        }
    }
    if let Some(entry) = entry {
        let payload = [0u8, 0u8, (entry >> 8) as u8, (entry & 0xFF) as u8];
        hex_record(out, 0, 0x03, &payload)?;
        hex_record(out, 0, 0x05, &payload)?;
    }
    writeln!(out, ":00000001FF")
}

/// Idiot/4 monitor load format: `!M{address:04X} {hex bytes...}` per
/// 16-byte chunk of each non-empty blob. No checksum, no start record —
/// the Idiot/4 monitor has no notion of an entry point.
pub fn write_idiot4<W: Write>(out: &mut W, code: &CodeMap) -> io::Result<()> {
    for (&start, bytes) in code {
        if bytes.is_empty() {
            continue;
        }
        for (i, chunk) in bytes.chunks(16).enumerate() {
            let addr = start.wrapping_add((i * 16) as u16);
            write!(out, "!M{:04X}", addr)?;
            for &b in chunk {
                write!(out, " {:02X}", b)?;
            }
            writeln!(out)?;
        }
    }
    Ok(())
}

/// Flattens every non-empty blob into one contiguous buffer running from
/// the lowest populated address to the highest, zero-filling any gaps
/// between blobs. Returns `None` if the code map has no non-empty blobs.
fn contiguous_dump(code: &CodeMap) -> Option<(u16, Vec<u8>)> {
    let mut load_address = None;
    let mut end_address: u32 = 0;
    for (&addr, bytes) in code {
        if bytes.is_empty() {
            continue;
        }
        if load_address.is_none() {
            load_address = Some(addr);
        }
        let end = addr as u32 + bytes.len() as u32;
        if end > end_address {
            end_address = end;
        }
    }
    let load_address = load_address?;
    let mut buffer = vec![0u8; (end_address - load_address as u32) as usize];
    for (&addr, bytes) in code {
        if bytes.is_empty() {
            continue;
        }
        let offset = (addr - load_address) as usize;
        buffer[offset..offset + bytes.len()].copy_from_slice(bytes);
    }
    Some((load_address, buffer))
}

/// Raw contiguous dump, zero-padded, ignoring any entry point.
pub fn write_binary<W: Write>(out: &mut W, code: &CodeMap) -> io::Result<()> {
    if let Some((_, buffer)) = contiguous_dump(code) {
        out.write_all(&buffer)?;
    }
    Ok(())
}

/// A 6-byte big-endian header (load address, size, exec address) followed
/// by the same contiguous zero-padded dump `write_binary` produces.
pub fn write_elfos<W: Write>(out: &mut W, code: &CodeMap, entry: Option<u16>) -> io::Result<()> {
    let (load_address, buffer) = contiguous_dump(code).unwrap_or((0, Vec::new()));
    out.write_u16::<Endian>(load_address)?;
    out.write_u16::<Endian>(buffer.len() as u16)?;
    out.write_u16::<Endian>(entry.unwrap_or(0))?;
    out.write_all(&buffer)
}

/// No-op writer, for callers that only want the listing/symbol table.
pub fn write_none<W: Write>(_out: &mut W, _code: &CodeMap) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample_code() -> CodeMap {
        let mut code = CodeMap::new();
        code.insert(0x0000, vec![0xF8, 0x55]);
        code.insert(0x0010, vec![0xC4]);
        code
    }

    #[test]
    fn intel_hex_first_data_record_matches_known_checksum() {
        let code = sample_code();
        let mut buf = Vec::new();
        write_intel_hex(&mut buf, &code, None).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let first_line = text.lines().next().unwrap();
        assert_eq!(first_line, ":02000000F855B1");
    }

    #[test]
    fn intel_hex_emits_start_records_and_terminator() {
        let code = sample_code();
        let mut buf = Vec::new();
        write_intel_hex(&mut buf, &code, Some(0x0010)).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[lines.len() - 3], ":0400000300000010E9");
        assert_eq!(lines[lines.len() - 2], ":0400000500000010E7");
        assert_eq!(lines[lines.len() - 1], ":00000001FF");
    }

    #[test]
    fn idiot4_has_no_checksum_or_start_record() {
        let code = sample_code();
        let mut buf = Vec::new();
        write_idiot4(&mut buf, &code).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text, "!M0000 F8 55\n!M0010 C4\n");
    }

    #[test]
    fn binary_zero_pads_gap_between_blobs() {
        let code = sample_code();
        let mut buf = Vec::new();
        write_binary(&mut buf, &code).unwrap();
        let mut expected = vec![0xF8, 0x55];
        expected.extend(std::iter::repeat(0u8).take(0x10 - 2));
        expected.push(0xC4);
        assert_eq!(buf, expected);
    }

    #[test]
    fn elfos_header_carries_load_size_and_entry() {
        let code = sample_code();
        let mut buf = Vec::new();
        write_elfos(&mut buf, &code, Some(0x0010)).unwrap();
        assert_eq!(&buf[0..2], &[0x00, 0x00]);
        assert_eq!(&buf[2..4], &[0x00, 0x11]);
        assert_eq!(&buf[4..6], &[0x00, 0x10]);
        assert_eq!(buf.len(), 6 + 0x11);
    }

    #[test]
    fn none_writer_produces_no_output() {
        let code = sample_code();
        let mut buf = Vec::new();
        write_none(&mut buf, &code).unwrap();
        assert!(buf.is_empty());
    }

    #[test]
    fn empty_code_map_produces_empty_binary() {
        let code = CodeMap::new();
        let mut buf = Vec::new();
        write_binary(&mut buf, &code).unwrap();
        assert!(buf.is_empty());
    }

    #[test]
    fn format_parses_cli_names_case_insensitively() {
        assert_eq!(OutputFormat::parse("HEX"), Some(OutputFormat::IntelHex));
        assert_eq!(OutputFormat::parse("Bin"), Some(OutputFormat::Binary));
        assert_eq!(OutputFormat::parse("nope"), None);
    }
}
