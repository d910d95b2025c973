//! Pseudo-op handlers.

use std::fs;

use crate::asm::{Assembler, Frame};
use crate::consts::{Cpu, Pass};
use crate::error::AsmError;
use crate::expr::{split_args, unescape, Value};
use crate::mac::{MacroStyle, Recorder};
use crate::rom::{Store, StoreFormat};

impl Assembler {
    /// Executes one pseudo-op. Conditional directives never reach this
    /// point; the pass driver handles them even while skipping.
    pub(crate) fn directive(
        &mut self,
        label: Option<&str>,
        kw: &str,
        operand: &str,
    ) -> Result<(), AsmError> {
        match kw {
            "ORG" => {
                let v = self.eval_required(operand)?;
                self.pc = Some((v & 0xFFFF) as u16);
                self.list_pc = self.pc;
                Ok(())
            }
            "SETDP" => {
                let v = self.eval_required(operand)? & 0xFFFF;
                self.dp = if v > 255 { (v >> 8) as u8 } else { v as u8 };
                Ok(())
            }
            "=" | "EQU" => self.define_constant(label, operand, true),
            "SET" => self.define_constant(label, operand, false),
            "ENUM" => {
                let name = label.ok_or(AsmError::Expected("label"))?;
                self.guard_reserved(name)?;
                let v = if operand.trim().is_empty() {
                    Value::new(self.enum_counter.wrapping_add(1))
                } else {
                    self.eval_value(operand)?
                };
                if let Some(x) = v.get() {
                    self.enum_counter = x;
                }
                self.symbols.define_const(name, v, true, self.pass, self.line_no)?;
                Ok(())
            }
            "BSS" => {
                let n = self.eval_required(operand)?;
                if !(0..=0x10000).contains(&n) {
                    return Err(AsmError::Range("BSS size"));
                }
                if let Some(name) = label {
                    self.guard_reserved(name)?;
                    let idx = self.symbols.define_const(
                        name,
                        Value::new(i32::from(self.bss)),
                        true,
                        self.pass,
                        self.line_no,
                    )?;
                    self.symbols.set_size(idx, n as u16);
                }
                self.bss = self.bss.wrapping_add(n as u16);
                Ok(())
            }
            "BYTE" | "FCB" => self.data_bytes(operand),
            "WORD" | "FDB" => self.data_words(operand, 2),
            "LONG" => self.data_words(operand, 4),
            "REAL" => self.data_reals(operand),
            "BITS" => self.data_bits(operand),
            "FILL" => self.data_fill(operand),
            "C5TO3" => self.data_c5to3(operand),
            "CMAP" => {
                self.cmap = self.eval_required(operand)?;
                Ok(())
            }
            "RMB" => {
                let n = self.eval_required(operand)?;
                if !(0..=0x10000).contains(&n) {
                    return Err(AsmError::Range("RMB size"));
                }
                self.advance(n as usize)
            }
            "ALIGN" => {
                let n = self.eval_required(operand)?;
                if n <= 0 {
                    return Err(AsmError::Range("alignment"));
                }
                let pc = i32::from(self.cur_pc()?);
                let rem = pc % n;
                if rem != 0 {
                    self.advance((n - rem) as usize)?;
                } else {
                    self.list_pc = self.pc;
                }
                Ok(())
            }
            "INCLUDE" => self.include(operand),
            "STORE" => self.store_request(operand),
            "LOAD" => self.load_file(operand),
            "LIST" => {
                self.listing.enabled = operand.trim() != "-";
                Ok(())
            }
            "CASE" => {
                self.symbols.set_fold(operand.trim() == "-");
                Ok(())
            }
            "CPU" => {
                let name = operand.trim_start_matches('=').trim();
                self.cpu = Cpu::from_name(name).ok_or(AsmError::Expected("6809 or 6309"))?;
                Ok(())
            }
            "END" => {
                self.ended = true;
                Ok(())
            }
            "MODULE" | "SUBROUTINE" => {
                let name = label
                    .map(str::to_string)
                    .or_else(|| {
                        let t = operand.trim();
                        (!t.is_empty()).then(|| t.to_string())
                    })
                    .ok_or(AsmError::Expected("module name"))?;
                self.symbols.set_scope(&name);
                self.module_start = self.pc;
                Ok(())
            }
            "ENDMOD" | "ENDSUB" => {
                self.symbols.set_scope("");
                self.module_start = None;
                Ok(())
            }
            "SIZE" => {
                if self.pass == Pass::Two {
                    if let (Some(pc), Some(start)) = (self.pc, self.module_start) {
                        let scope = self.symbols.scope().to_string();
                        self.listing
                            .note(&format!("module {scope}: {} bytes", pc.wrapping_sub(start)));
                    }
                }
                Ok(())
            }
            "TTL" | "INTERN" | "EXTERN" => Ok(()),
            "MACRO" => self.begin_macro(label, operand),
            "ENDM" => Err(AsmError::Structural("ENDM without MACRO".to_string())),
            "ERROR" => Err(AsmError::User(operand.to_string())),
            _ => Err(AsmError::UnknownMnemonic(kw.to_string())),
        }
    }

    fn define_constant(
        &mut self,
        label: Option<&str>,
        operand: &str,
        locked: bool,
    ) -> Result<(), AsmError> {
        let name = label.ok_or(AsmError::Expected("label"))?;
        self.guard_reserved(name)?;
        let (v, _) = self.eval_operand_str(operand)?;
        self.symbols.define_const(name, v, locked, self.pass, self.line_no)?;
        Ok(())
    }

    fn data_bytes(&mut self, operand: &str) -> Result<(), AsmError> {
        let mut out = Vec::new();
        for item in split_args(operand) {
            let t = item.trim();
            if t.starts_with('"') {
                for b in string_bytes(t)? {
                    out.push(((i32::from(b) + self.cmap) & 0xFF) as u8);
                }
            } else {
                let (v, _) = self.eval_operand_str(t)?;
                if self.pass == Pass::Two && !v.defined() {
                    return Err(AsmError::Undefined(t.to_string()));
                }
                out.push((v.or_zero() & 0xFF) as u8);
            }
        }
        self.emit_data(&out)
    }

    fn data_words(&mut self, operand: &str, width: usize) -> Result<(), AsmError> {
        let mut out = Vec::new();
        for item in split_args(operand) {
            let t = item.trim();
            let (v, _) = self.eval_operand_str(t)?;
            if self.pass == Pass::Two && !v.defined() {
                return Err(AsmError::Undefined(t.to_string()));
            }
            let x = v.or_zero();
            if width == 2 {
                out.extend([(x >> 8) as u8, (x & 0xFF) as u8]);
            } else {
                out.extend((x as u32).to_be_bytes());
            }
        }
        self.emit_data(&out)
    }

    /// `REAL` emits IEEE 754 single precision, big-endian. Items that do
    /// not parse as a float literal are evaluated as integer expressions.
    fn data_reals(&mut self, operand: &str) -> Result<(), AsmError> {
        let mut out = Vec::new();
        for item in split_args(operand) {
            let t = item.trim();
            let f: f32 = match t.parse::<f32>() {
                Ok(f) => f,
                Err(_) => {
                    let (v, _) = self.eval_operand_str(t)?;
                    if self.pass == Pass::Two && !v.defined() {
                        return Err(AsmError::Undefined(t.to_string()));
                    }
                    v.or_zero() as f32
                }
            };
            out.extend(f.to_be_bytes());
        }
        self.emit_data(&out)
    }

    /// `BITS` packs a `.`/`*`/`0`/`1` stream MSB first, zero-padding the
    /// final byte.
    fn data_bits(&mut self, operand: &str) -> Result<(), AsmError> {
        let mut out = Vec::new();
        let mut acc: u8 = 0;
        let mut n = 0;
        for c in operand.chars() {
            match c {
                '.' | '0' => {
                    acc <<= 1;
                    n += 1;
                }
                '*' | '1' => {
                    acc = (acc << 1) | 1;
                    n += 1;
                }
                ' ' | '\t' => continue,
                _ => return Err(AsmError::Lexical(c)),
            }
            if n == 8 {
                out.push(acc);
                acc = 0;
                n = 0;
            }
        }
        if n > 0 {
            out.push(acc << (8 - n));
        }
        self.emit_data(&out)
    }

    /// `FILL count (value)`; the value defaults to zero. The count must
    /// be known in pass 1, because it fixes the layout.
    fn data_fill(&mut self, operand: &str) -> Result<(), AsmError> {
        let t = operand.trim();
        let (count_text, value_text) = match t.find('(') {
            Some(open) => {
                let close = t.rfind(')').ok_or(AsmError::Expected("closing parenthesis"))?;
                (&t[..open], Some(&t[open + 1..close]))
            }
            None => (t, None),
        };
        let count = self.eval_required(count_text)?;
        if !(0..=0x10000).contains(&count) {
            return Err(AsmError::Range("fill count"));
        }
        let value = match value_text {
            Some(vt) => {
                let (v, _) = self.eval_operand_str(vt)?;
                if self.pass == Pass::Two && !v.defined() {
                    return Err(AsmError::Undefined(vt.trim().to_string()));
                }
                (v.or_zero() & 0xFF) as u8
            }
            None => 0,
        };
        self.emit_data(&vec![value; count as usize])
    }

    /// `C5TO3 "ccccc"`: five characters (space, A–Z) packed radix-27 into
    /// a 24-bit big-endian value.
    fn data_c5to3(&mut self, operand: &str) -> Result<(), AsmError> {
        let chars = string_bytes(operand.trim())?;
        if chars.len() != 5 {
            return Err(AsmError::Expected("five-character string"));
        }
        let mut v: u32 = 0;
        for b in chars {
            let d = match b {
                b' ' => 0,
                b'A'..=b'Z' => u32::from(b - b'A') + 1,
                b'a'..=b'z' => u32::from(b - b'a') + 1,
                _ => return Err(AsmError::Lexical(b as char)),
            };
            v = v * 27 + d;
        }
        self.emit_data(&v.to_be_bytes()[1..])
    }

    fn include(&mut self, operand: &str) -> Result<(), AsmError> {
        let path = quoted_path(operand)?;
        if self.frames.len() >= 100 {
            return Err(AsmError::Structural("includes nested deeper than 100".to_string()));
        }
        let text = fs::read_to_string(&path)
            .map_err(|e| AsmError::Open { path: path.clone(), source: e })?;
        self.frames.push(Frame::new(path, &text));
        Ok(())
    }

    /// `STORE start,len,"file"[,fmt[,entry]]`. Requests are collected in
    /// pass 2 and executed after it completes without errors.
    fn store_request(&mut self, operand: &str) -> Result<(), AsmError> {
        if self.pass == Pass::One {
            return Ok(());
        }
        let args = split_args(operand);
        if args.len() < 3 || args.len() > 5 {
            return Err(AsmError::Expected("start, length and file name"));
        }
        let start = self.require_value(args[0])? as u16;
        let length = self.eval_required(args[1])?;
        if !(1..=0x10000).contains(&length) || i64::from(start) + i64::from(length) > 0x10000 {
            return Err(AsmError::Range("store range"));
        }
        let path = quoted_path(args[2])?;
        let format = match args.get(3) {
            Some(f) => StoreFormat::from_name(f.trim().to_ascii_uppercase().as_str())
                .ok_or(AsmError::Expected("BIN, S19 or SREC"))?,
            None => StoreFormat::Bin,
        };
        let entry = match args.get(4) {
            Some(e) => Some(self.require_value(e)? as u16),
            None => None,
        };
        log::debug!("store {path}: ${start:04X}+{length}");
        self.stores.push(Store {
            start,
            length: length as u32,
            path,
            format,
            entry,
            line: self.line_no,
        });
        Ok(())
    }

    /// `LOAD [addr,] "file"`: reads a file into the image. Without an
    /// address the bytes land at the program counter and advance it.
    fn load_file(&mut self, operand: &str) -> Result<(), AsmError> {
        let args = split_args(operand);
        let (addr_text, path_text) = match args.len() {
            1 => (None, args[0]),
            2 => (Some(args[0]), args[1]),
            _ => return Err(AsmError::Expected("[address,] \"file\"")),
        };
        let path = quoted_path(path_text)?;
        let data =
            fs::read(&path).map_err(|e| AsmError::Open { path: path.clone(), source: e })?;
        if data.len() > 0x10000 {
            return Err(AsmError::Range("load size"));
        }
        match addr_text {
            Some(a) => {
                let addr = self.eval_required(a)? as u16;
                if self.pass == Pass::Two {
                    for (i, &b) in data.iter().enumerate() {
                        self.rom.write(addr.wrapping_add(i as u16), b)?;
                    }
                }
                self.list_pc = Some(addr);
            }
            None => {
                let pc = self.cur_pc()?;
                if self.pass == Pass::Two {
                    for (i, &b) in data.iter().enumerate() {
                        self.rom.write(pc.wrapping_add(i as u16), b)?;
                    }
                }
                self.advance(data.len())?;
            }
        }
        Ok(())
    }

    /// Starts recording a macro definition, or arranges for the body to
    /// be skipped in pass 2, where the table already holds it.
    pub(crate) fn begin_macro(
        &mut self,
        label: Option<&str>,
        operand: &str,
    ) -> Result<(), AsmError> {
        let (name, params, style) = match label {
            Some(l) => (l.to_string(), parse_params(operand), MacroStyle::Suffix),
            None => {
                let t = operand.trim();
                if t.is_empty() {
                    return Err(AsmError::Expected("macro name"));
                }
                if let Some(open) = t.find('(') {
                    let close = t.rfind(')').ok_or(AsmError::Expected("closing parenthesis"))?;
                    (
                        t[..open].trim().to_string(),
                        parse_params(&t[open + 1..close]),
                        MacroStyle::Paren,
                    )
                } else {
                    match t.split_once(|c: char| c.is_whitespace()) {
                        Some((n, rest)) => {
                            (n.to_string(), parse_params(rest), MacroStyle::Prefix)
                        }
                        None => (t.to_string(), Vec::new(), MacroStyle::Prefix),
                    }
                }
            }
        };
        if self.pass == Pass::Two {
            self.macro_skip = true;
            return Ok(());
        }
        self.recording = Some(Recorder::new(&name, params, style, self.line_no)?);
        Ok(())
    }
}

fn parse_params(text: &str) -> Vec<String> {
    split_args(text)
        .iter()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

fn quoted_path(text: &str) -> Result<String, AsmError> {
    let t = text.trim();
    t.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .map(str::to_string)
        .ok_or(AsmError::Expected("quoted file name"))
}

/// Decodes a quoted string with escapes into its bytes.
fn string_bytes(text: &str) -> Result<Vec<u8>, AsmError> {
    let t = text.trim();
    let bytes = t.as_bytes();
    if bytes.first() != Some(&b'"') {
        return Err(AsmError::Expected("string"));
    }
    let mut out = Vec::new();
    let mut i = 1;
    loop {
        match bytes.get(i) {
            None => return Err(AsmError::UnterminatedString),
            Some(b'"') => {
                i += 1;
                break;
            }
            Some(b'\\') => {
                let e = bytes.get(i + 1).ok_or(AsmError::UnterminatedString)?;
                out.push(unescape(*e));
                i += 2;
            }
            Some(&b) => {
                out.push(b);
                i += 1;
            }
        }
    }
    if !t[i..].trim().is_empty() {
        return Err(AsmError::Trailing);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoted_paths() {
        assert_eq!(quoted_path(" \"out.bin\" ").unwrap(), "out.bin");
        assert!(quoted_path("out.bin").is_err());
    }

    #[test]
    fn string_escapes() {
        assert_eq!(string_bytes("\"AB\\n\"").unwrap(), vec![0x41, 0x42, 0x0A]);
        assert!(string_bytes("\"open").is_err());
        assert!(string_bytes("\"x\" y").is_err());
    }
}
