//! Binary and Motorola S-record serialization of stored address ranges.

use std::io::{self, Write};

/// Writes `rom[start..start+length]` as raw bytes. When an entry address
/// was requested the big-endian start address is prepended as a simple
/// load header.
pub fn write_bin<W: Write>(
    mut target: W,
    rom: &[u8],
    start: u16,
    length: u32,
    entry: Option<u16>,
) -> io::Result<()> {
    if entry.is_some() {
        target.write_all(&[(start >> 8) as u8, (start & 0xFF) as u8])?;
    }
    let s = usize::from(start);
    target.write_all(&rom[s..s + length as usize])
}

/// Writes `rom[start..start+length]` as S-records: an S0 header, S1 data
/// records of at most 32 payload bytes, an S5 record count, and an S9
/// termination record when an entry address was given.
pub fn write_srec<W: Write>(
    mut target: W,
    rom: &[u8],
    start: u16,
    length: u32,
    entry: Option<u16>,
) -> io::Result<()> {
    record(&mut target, '0', 0, b"Bit Shift Assembler")?;

    let mut addr = usize::from(start);
    let end = addr + length as usize;
    let mut records: u16 = 0;
    while addr < end {
        let n = (end - addr).min(32);
        record(&mut target, '1', addr as u16, &rom[addr..addr + n])?;
        addr += n;
        records += 1;
    }

    record(&mut target, '5', records, &[])?;
    if let Some(entry) = entry {
        record(&mut target, '9', entry, &[])?;
    }
    Ok(())
}

/// One S-record line. The count covers the address and checksum bytes;
/// the checksum is the one's complement of the low byte of the sum over
/// count, address and data.
fn record<W: Write>(target: &mut W, kind: char, addr: u16, data: &[u8]) -> io::Result<()> {
    let count = data.len() as u8 + 3;
    let mut sum = u32::from(count) + u32::from(addr >> 8) + u32::from(addr & 0xFF);
    write!(target, "S{kind}{count:02X}{addr:04X}")?;
    for &b in data {
        sum += u32::from(b);
        write!(target, "{b:02X}")?;
    }
    write!(target, "{:02X}\r\n", !(sum as u8))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checksum_ok(line: &str) {
        let bytes: Vec<u8> = (2..line.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&line[i..i + 2], 16).unwrap())
            .collect();
        let sum: u32 = bytes.iter().map(|&b| u32::from(b)).sum();
        assert_eq!(sum % 256, 0xFF, "bad checksum in {line}");
    }

    #[test]
    fn srec_layout() {
        let mut rom = vec![0u8; 0x10000];
        rom[0x100..0x104].copy_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);
        let mut out = Vec::new();
        write_srec(&mut out, &rom, 0x100, 4, None).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.split("\r\n").filter(|l| !l.is_empty()).collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("S016"));
        assert!(lines[1].starts_with("S1070100DEADBEEF"));
        assert!(lines[2].starts_with("S5030001"));
        for line in lines {
            checksum_ok(line);
        }
    }

    #[test]
    fn srec_splits_at_32_bytes(){
        let rom = vec![0x11u8; 0x10000];
        let mut out = Vec::new();
        write_srec(&mut out, &rom, 0x200, 40, Some(0x200)).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.split("\r\n").filter(|l| !l.is_empty()).collect();
        // S0, two S1 records (32 + 8), S5, S9
        assert_eq!(lines.len(), 5);
        assert!(lines[1].starts_with("S1230200"));
        assert!(lines[2].starts_with("S10B0220"));
        assert!(lines[3].starts_with("S5030002"));
        assert!(lines[4].starts_with("S9030200"));
        for line in lines {
            checksum_ok(line);
        }
    }

    #[test]
    fn bin_header_only_with_entry() {
        let mut rom = vec![0u8; 0x10000];
        rom[0x4000] = 0x12;
        rom[0x4001] = 0x34;
        let mut out = Vec::new();
        write_bin(&mut out, &rom, 0x4000, 2, None).unwrap();
        assert_eq!(out, vec![0x12, 0x34]);
        let mut out = Vec::new();
        write_bin(&mut out, &rom, 0x4000, 2, Some(0x4000)).unwrap();
        assert_eq!(out, vec![0x40, 0x00, 0x12, 0x34]);
    }
}
