//! Indexed-mode post-byte encoding.
//!
//! Returns the post-byte and its extension bytes; the caller prepends the
//! opcode. `pre_len` is the number of bytes emitted before the post-byte
//! (opcode, plus the immediate byte of the `OIM` family), which the
//! PC-relative forms need to compute the full instruction length.

use super::sdisp;
use crate::asm::Assembler;
use crate::consts::{index_reg_bits, Cpu, Pass};
use crate::error::AsmError;
use crate::expr::{split_once_top, Force};

impl Assembler {
    pub(crate) fn encode_indexed(
        &mut self,
        text: &str,
        pre_len: usize,
    ) -> Result<Vec<u8>, AsmError> {
        let t = text.trim();
        let (inner, indirect) = if t.starts_with('[') && t.ends_with(']') {
            (t[1..t.len() - 1].trim(), true)
        } else {
            (t, false)
        };
        let ind: u8 = if indirect { 0x10 } else { 0 };
        let (left, right) =
            split_once_top(inner).ok_or(AsmError::Expected("indexed operand"))?;
        let left = left.trim();
        let (dec, rname, inc) = regspec(right)?;
        let rupper = rname.to_ascii_uppercase();

        if rupper == "PCR" || rupper == "PC" {
            if dec != 0 || inc != 0 || left.is_empty() {
                return Err(AsmError::IllegalForm("PC-relative operand".to_string()));
            }
            return self.pc_relative(left, ind, pre_len);
        }

        if rupper == "W" {
            if self.cpu == Cpu::Mc6809 {
                return Err(AsmError::Needs6309("W indexing".to_string()));
            }
            if left.is_empty() {
                let base: u8 = match (dec, inc) {
                    (0, 0) => 0x8F,
                    (0, 2) => 0xCF,
                    (2, 0) => 0xEF,
                    _ => {
                        return Err(AsmError::IllegalForm(
                            "W auto increment form".to_string(),
                        ))
                    }
                };
                return Ok(vec![base + u8::from(indirect)]);
            }
            if dec != 0 || inc != 0 {
                return Err(AsmError::IllegalForm("offset with auto increment".to_string()));
            }
            let addr = self.require_value(left)?;
            let pb: u8 = if indirect { 0xB0 } else { 0xAF };
            return Ok(vec![pb, (addr >> 8) as u8, (addr & 0xFF) as u8]);
        }

        let base = index_reg_bits(&rupper).ok_or(AsmError::Expected("index register"))?;

        if left.is_empty() {
            let suffix: u8 = match (dec, inc) {
                (0, 1) => 0x00,
                (0, 2) => 0x01,
                (1, 0) => 0x02,
                (2, 0) => 0x03,
                (0, 0) => 0x04,
                _ => return Err(AsmError::IllegalForm("auto increment/decrement".to_string())),
            };
            return Ok(vec![0x80 | base | ind | suffix]);
        }
        if dec != 0 || inc != 0 {
            return Err(AsmError::IllegalForm("offset with auto increment".to_string()));
        }

        // accumulator offsets carry no extension bytes
        let acc: Option<u8> = match left.to_ascii_uppercase().as_str() {
            "A" => Some(0x06),
            "B" => Some(0x05),
            "D" => Some(0x0B),
            "E" => Some(0x07),
            "F" => Some(0x0A),
            "W" => Some(0x0E),
            _ => None,
        };
        if let Some(suffix) = acc {
            if matches!(suffix, 0x07 | 0x0A | 0x0E) && self.cpu == Cpu::Mc6809 {
                return Err(AsmError::Needs6309(format!("{left} accumulator offset")));
            }
            return Ok(vec![0x80 | base | ind | suffix]);
        }

        // constant offset: 5-bit, 8-bit or 16-bit
        let (v, force) = self.eval_address_str(left)?;
        if self.pass == Pass::Two && !v.defined() {
            return Err(AsmError::Undefined(left.to_string()));
        }
        let x = v.or_zero();
        let ext = match self.pass {
            Pass::Two => {
                let slot = usize::from(self.rom.len_at(self.cur_pc()?));
                if slot > pre_len + 1 {
                    slot - pre_len - 1
                } else if slot == pre_len + 1 {
                    0
                } else {
                    offset_width(v.get(), force, indirect)
                }
            }
            Pass::One => offset_width(v.get(), force, indirect),
        };
        match ext {
            0 => {
                if self.pass == Pass::Two && !(-16..=15).contains(&x) {
                    return Err(AsmError::Range("5-bit offset"));
                }
                Ok(vec![base | (x & 0x1F) as u8])
            }
            1 => {
                if self.pass == Pass::Two && !(-128..=127).contains(&x) {
                    return Err(AsmError::Range("8-bit offset"));
                }
                Ok(vec![0x88 | base | ind, (x & 0xFF) as u8])
            }
            _ => Ok(vec![0x89 | base | ind, ((x >> 8) & 0xFF) as u8, (x & 0xFF) as u8]),
        }
    }

    /// `offset,PCR`: the displacement is relative to the address after
    /// the full instruction, so its own width feeds into the math.
    fn pc_relative(&mut self, left: &str, ind: u8, pre_len: usize) -> Result<Vec<u8>, AsmError> {
        let (v, force) = self.eval_address_str(left)?;
        if self.pass == Pass::Two && !v.defined() {
            return Err(AsmError::Undefined(left.to_string()));
        }
        let pc = i32::from(self.cur_pc()?);
        let short_base = pc + pre_len as i32 + 2;
        let size = match self.pass {
            Pass::Two => {
                let slot = usize::from(self.rom.len_at(pc as u16));
                if slot > pre_len + 1 {
                    slot - pre_len - 1
                } else {
                    pcr_width(v.get(), force, short_base)
                }
            }
            Pass::One => pcr_width(v.get(), force, short_base),
        };
        if size == 1 {
            let d = sdisp(v.or_zero(), short_base);
            if self.pass == Pass::Two && !(-128..=127).contains(&d) {
                return Err(AsmError::Range("PC-relative displacement"));
            }
            Ok(vec![0x8C | ind, (d & 0xFF) as u8])
        } else {
            let d = sdisp(v.or_zero(), pc + pre_len as i32 + 3);
            Ok(vec![0x8D | ind, ((d >> 8) & 0xFF) as u8, (d & 0xFF) as u8])
        }
    }
}

fn offset_width(v: Option<i32>, force: Force, indirect: bool) -> usize {
    match force {
        Force::Direct => 1,
        Force::Extended => 2,
        Force::None => match v {
            None => 2,
            Some(x) if !indirect && (-16..=15).contains(&x) => 0,
            Some(x) if (-128..=127).contains(&x) => 1,
            Some(_) => 2,
        },
    }
}

// An unresolved forward target defaults to the short form; a far target
// needs an explicit `>`. Pass 2 raises a range error if the default was
// wrong.
fn pcr_width(v: Option<i32>, force: Force, short_base: i32) -> usize {
    match force {
        Force::Direct => 1,
        Force::Extended => 2,
        Force::None => match v {
            None => 1,
            Some(t) if (-128..=127).contains(&sdisp(t, short_base)) => 1,
            Some(_) => 2,
        },
    }
}

/// Splits an index-register token into leading decrements, the register
/// name and trailing increments. Mixing the two is an error.
fn regspec(token: &str) -> Result<(usize, &str, usize), AsmError> {
    let t = token.trim();
    let bytes = t.as_bytes();
    let mut start = 0;
    let mut end = bytes.len();
    while start < end && bytes[start] == b'-' {
        start += 1;
    }
    while end > start && bytes[end - 1] == b'+' {
        end -= 1;
    }
    let dec = start;
    let inc = bytes.len() - end;
    if dec > 0 && inc > 0 {
        return Err(AsmError::IllegalForm("mixed increment and decrement".to_string()));
    }
    if dec > 2 || inc > 2 {
        return Err(AsmError::IllegalForm("more than two increments".to_string()));
    }
    if start == end {
        return Err(AsmError::Expected("index register"));
    }
    Ok((dec, &t[start..end], inc))
}
