//! Mnemonic and addressing-mode selection, opcode emission.
//!
//! The encoder decides the addressing mode from the operand shape and the
//! mnemonic's table entry, then hands the finished byte sequence to the
//! emitter, which enforces the pass-1 length lock. Size decisions taken
//! in pass 1 (direct vs. extended, 8- vs. 16-bit offsets, short vs. long
//! branches) are replayed in pass 2 from the recorded instruction length.

mod indexed;

use crate::asm::Assembler;
use crate::consts::{
    imm_size, long_branch, opcode_len, rel_is_long, short_branch, Cpu, IReg, Op, Pass, StackReg,
    IREGS, MNEMONICS,
};
use crate::error::AsmError;
use crate::expr::{split_once_top, Force, Value};
use flagset::FlagSet;
use num_traits::ToPrimitive;

/// Opcode table value to its emitted bytes (prefix first).
pub(crate) fn opcode_bytes(code: u16) -> Vec<u8> {
    if code > 0xFF {
        vec![(code >> 8) as u8, (code & 0xFF) as u8]
    } else {
        vec![code as u8]
    }
}

/// 16-bit wrapped displacement from `base` to `target`, sign-extended.
pub(crate) fn sdisp(target: i32, base: i32) -> i32 {
    let d = (target - base) & 0xFFFF;
    if d >= 0x8000 {
        d - 0x10000
    } else {
        d
    }
}

fn fits_i8(d: i32) -> bool {
    (-128..=127).contains(&d)
}

impl Assembler {
    /// Assembles one instruction line.
    pub(crate) fn encode(&mut self, mnemonic: &str, operand: &str) -> Result<(), AsmError> {
        let upper = mnemonic.to_ascii_uppercase();
        let Some(op) = MNEMONICS.get(upper.as_str()) else {
            return Err(AsmError::UnknownMnemonic(mnemonic.to_string()));
        };
        if op.cpu == Cpu::Hd6309 && self.cpu == Cpu::Mc6809 {
            return Err(AsmError::Needs6309(upper));
        }
        let operand = operand.trim();

        if operand.is_empty() {
            let code = op.inh.ok_or(AsmError::Expected("operand"))?;
            return self.emit_insn(&opcode_bytes(code));
        }
        if let Some(code) = op.reg {
            return self.encode_register(&upper, code, operand);
        }
        if let Some(code) = op.rel {
            return self.encode_relative(code, operand);
        }
        if matches!(upper.as_str(), "OIM" | "AIM" | "EIM" | "TIM") {
            return self.encode_imm_mem(&upper, op, operand);
        }
        if let Some(rest) = operand.strip_prefix('#') {
            return self.encode_immediate(&upper, op, rest);
        }
        if operand.starts_with('[')
            && operand.ends_with(']')
            && split_once_top(&operand[1..operand.len() - 1]).is_none()
        {
            // indirect without an index register: 16-bit indirect extended
            let code = op.idx.ok_or_else(|| AsmError::IllegalForm(upper.clone()))?;
            let v = self.require_value(&operand[1..operand.len() - 1])?;
            let mut bytes = opcode_bytes(code);
            bytes.extend([0x9F, (v >> 8) as u8, (v & 0xFF) as u8]);
            return self.emit_insn(&bytes);
        }
        if operand.starts_with('[') || split_once_top(operand).is_some() {
            let code = op.idx.ok_or_else(|| AsmError::IllegalForm(upper.clone()))?;
            let tail = self.encode_indexed(operand, opcode_len(code))?;
            let mut bytes = opcode_bytes(code);
            bytes.extend(tail);
            return self.emit_insn(&bytes);
        }
        self.encode_mem(&upper, op, operand, None)
    }

    /// Evaluates an expression that must be known by pass 2 and returns
    /// it masked to 16 bits.
    pub(crate) fn require_value(&mut self, text: &str) -> Result<i32, AsmError> {
        let v = self.eval_value(text)?;
        if self.pass == Pass::Two && !v.defined() {
            return Err(AsmError::Undefined(text.trim().to_string()));
        }
        Ok(v.or_zero() & 0xFFFF)
    }

    fn encode_immediate(&mut self, upper: &str, op: &Op, rest: &str) -> Result<(), AsmError> {
        let code = op.imm.ok_or_else(|| AsmError::IllegalForm(upper.to_string()))?;
        let size = imm_size(upper);
        let (v, _) = self.eval_operand_str(rest)?;
        if self.pass == Pass::Two {
            if !v.defined() {
                return Err(AsmError::Undefined(rest.trim().to_string()));
            }
            let x = v.or_zero();
            let ok = match size {
                1 => (-128..=255).contains(&x),
                2 => (-32768..=65535).contains(&x),
                _ => true,
            };
            if !ok {
                return Err(AsmError::Range("immediate value"));
            }
        }
        let x = v.or_zero();
        let mut bytes = opcode_bytes(code);
        match size {
            1 => bytes.push((x & 0xFF) as u8),
            2 => bytes.extend([(x >> 8) as u8, (x & 0xFF) as u8]),
            _ => bytes.extend((x as u32).to_be_bytes()),
        }
        self.emit_insn(&bytes)
    }

    /// Short and long branches, including the optimizer interplay: pass 1
    /// promotes overflowing or unresolved short branches to the long
    /// variant, pass 2 shrinks long slots whose displacement fits eight
    /// bits and lets the emitter pad the difference with NOPs.
    fn encode_relative(&mut self, code: u16, operand: &str) -> Result<(), AsmError> {
        let pc = i32::from(self.cur_pc()?);
        let target = self.branch_target(operand)?;
        let long = rel_is_long(code);
        let pre = opcode_len(code);

        if self.pass == Pass::One {
            let len = if long {
                pre + 2
            } else if self.opts.optimize {
                let promoted = long_branch(code).map_or(pre + 2, |l| opcode_len(l) + 2);
                match target.get() {
                    Some(t) if fits_i8(sdisp(t, pc + pre as i32 + 1)) => pre + 1,
                    _ => promoted,
                }
            } else {
                pre + 1
            };
            return self.emit_insn(&vec![0; len]);
        }

        let t = target
            .get()
            .ok_or_else(|| AsmError::Undefined(operand.trim().to_string()))?;
        let slot = usize::from(self.rom.len_at(pc as u16));

        if long {
            if self.opts.optimize {
                if let Some(short) = short_branch(code) {
                    let d = sdisp(t, pc + 2);
                    if fits_i8(d) {
                        log::debug!("long branch at ${pc:04X} shrunk to short form");
                        return self.emit_insn(&[short as u8, d as u8]);
                    }
                }
            }
            let total = pre + 2;
            let d = sdisp(t, pc + total as i32);
            let mut bytes = opcode_bytes(code);
            bytes.extend([(d >> 8) as u8, (d & 0xFF) as u8]);
            return self.emit_insn(&bytes);
        }

        let short_len = pre + 1;
        if slot <= short_len {
            let d = sdisp(t, pc + short_len as i32);
            if !fits_i8(d) {
                return Err(AsmError::Range("branch displacement"));
            }
            let mut bytes = opcode_bytes(code);
            bytes.push(d as u8);
            return self.emit_insn(&bytes);
        }

        // pass 1 locked the long form
        let lcode = long_branch(code).unwrap_or(code);
        let d8 = sdisp(t, pc + short_len as i32);
        if self.opts.optimize && fits_i8(d8) {
            let mut bytes = opcode_bytes(code);
            bytes.push(d8 as u8);
            return self.emit_insn(&bytes);
        }
        let llen = opcode_len(lcode) + 2;
        let d = sdisp(t, pc + llen as i32);
        let mut bytes = opcode_bytes(lcode);
        bytes.extend([(d >> 8) as u8, (d & 0xFF) as u8]);
        self.emit_insn(&bytes)
    }

    /// Resolves a branch operand: runs of `-`/`+` name anonymous labels,
    /// anything else is an expression.
    fn branch_target(&mut self, operand: &str) -> Result<Value, AsmError> {
        let t = operand.trim();
        if !t.is_empty() && t.bytes().all(|b| b == b'-') {
            let v = self.locals.backward(t.len());
            if !v.defined() {
                return Err(AsmError::Undefined(t.to_string()));
            }
            return Ok(v);
        }
        if !t.is_empty() && t.bytes().all(|b| b == b'+') {
            let v = self.locals.forward(t.len(), self.cur_pc()?);
            if self.pass == Pass::Two && !v.defined() {
                return Err(AsmError::Undefined(t.to_string()));
            }
            return Ok(v);
        }
        self.eval_value(t)
    }

    /// `OIM`/`AIM`/`EIM`/`TIM`: `#value, address` with the address part
    /// selecting direct, indexed or extended normally.
    fn encode_imm_mem(&mut self, upper: &str, op: &Op, operand: &str) -> Result<(), AsmError> {
        let (vpart, apart) =
            split_once_top(operand).ok_or(AsmError::Expected("#value,address"))?;
        let vtext = vpart.trim().strip_prefix('#').ok_or(AsmError::Expected("#value"))?;
        let (v, _) = self.eval_operand_str(vtext)?;
        if self.pass == Pass::Two {
            let x = v.get().ok_or_else(|| AsmError::Undefined(vtext.trim().to_string()))?;
            if !(-128..=255).contains(&x) {
                return Err(AsmError::Range("immediate value"));
            }
        }
        let imm = (v.or_zero() & 0xFF) as u8;
        let a = apart.trim();

        if a.starts_with('[') && a.ends_with(']') && split_once_top(&a[1..a.len() - 1]).is_none()
        {
            let code = op.idx.ok_or_else(|| AsmError::IllegalForm(upper.to_string()))?;
            let addr = self.require_value(&a[1..a.len() - 1])?;
            let mut bytes = opcode_bytes(code);
            bytes.push(imm);
            bytes.extend([0x9F, (addr >> 8) as u8, (addr & 0xFF) as u8]);
            return self.emit_insn(&bytes);
        }
        if a.starts_with('[') || split_once_top(a).is_some() {
            let code = op.idx.ok_or_else(|| AsmError::IllegalForm(upper.to_string()))?;
            let tail = self.encode_indexed(a, opcode_len(code) + 1)?;
            let mut bytes = opcode_bytes(code);
            bytes.push(imm);
            bytes.extend(tail);
            return self.emit_insn(&bytes);
        }
        self.encode_mem(upper, op, a, Some(imm))
    }

    /// Direct or extended addressing, with the optimizer's JMP/JSR
    /// shortening applied to extended jumps in pass 2.
    fn encode_mem(
        &mut self,
        upper: &str,
        op: &Op,
        operand: &str,
        imm: Option<u8>,
    ) -> Result<(), AsmError> {
        let (v, force) = self.eval_address_str(operand)?;
        if self.pass == Pass::Two && !v.defined() {
            return Err(AsmError::Undefined(operand.trim().to_string()));
        }
        if op.dir.is_none() && op.ext.is_none() {
            return Err(AsmError::IllegalForm(upper.to_string()));
        }
        let direct = self.choose_direct(op, v, force, imm.is_some())?;
        let x = v.or_zero() & 0xFFFF;

        if direct {
            let code = op.dir.ok_or_else(|| AsmError::IllegalForm(upper.to_string()))?;
            let mut bytes = opcode_bytes(code);
            bytes.extend(imm);
            bytes.push((x & 0xFF) as u8);
            return self.emit_insn(&bytes);
        }

        let code = op.ext.ok_or_else(|| AsmError::IllegalForm(upper.to_string()))?;
        if self.pass == Pass::Two && self.opts.optimize && imm.is_none() {
            let pc = i32::from(self.cur_pc()?);
            if upper == "JMP" {
                let d = sdisp(x, pc + 2);
                if (-128..=-1).contains(&d) {
                    log::debug!("JMP at ${pc:04X} rewritten as BRA");
                    return self.emit_insn(&[0x20, d as u8]);
                }
            } else if upper == "JSR" {
                let d = sdisp(x, pc + 2);
                if fits_i8(d) {
                    self.hints.push(format!(
                        "JSR ${x:04X} at ${pc:04X} is in BSR range (saves one byte)"
                    ));
                }
            }
        }
        let mut bytes = opcode_bytes(code);
        bytes.extend(imm);
        bytes.extend([(x >> 8) as u8, (x & 0xFF) as u8]);
        self.emit_insn(&bytes)
    }

    /// Direct-page selection: forced by `<`/`>`, otherwise by comparing
    /// the address's high byte with the assumed DP. In pass 2 the length
    /// recorded in pass 1 wins.
    fn choose_direct(
        &mut self,
        op: &Op,
        v: Value,
        force: Force,
        has_imm: bool,
    ) -> Result<bool, AsmError> {
        let (Some(dir), Some(_)) = (op.dir, op.ext) else {
            return Ok(op.dir.is_some());
        };
        let pre = opcode_len(dir) + usize::from(has_imm);
        if self.pass == Pass::Two {
            let slot = usize::from(self.rom.len_at(self.cur_pc()?));
            if slot == pre + 1 {
                return Ok(true);
            }
            if slot == pre + 2 {
                return Ok(false);
            }
        }
        Ok(match force {
            Force::Direct => true,
            Force::Extended => false,
            Force::None => v
                .get()
                .is_some_and(|x| ((x >> 8) & 0xFF) as u8 == self.dp),
        })
    }

    fn encode_register(&mut self, upper: &str, code: u16, operand: &str) -> Result<(), AsmError> {
        match upper {
            "PSHS" | "PULS" | "PSHU" | "PULU" => {
                let mask = stack_mask(operand)?;
                let mut bytes = opcode_bytes(code);
                bytes.push(mask);
                self.emit_insn(&bytes)
            }
            "TFM" => self.encode_tfm(operand),
            "BAND" | "BIAND" | "BOR" | "BIOR" | "BEOR" | "BIEOR" | "LDBT" | "STBT" => {
                self.encode_bit_transfer(code, operand)
            }
            _ => self.encode_pair(code, operand),
        }
    }

    /// `EXG`/`TFR` and the 6309 register-register arithmetic. Pairing an
    /// 8-bit with a 16-bit register is an error unless one side is the
    /// zero pseudo-register.
    fn encode_pair(&mut self, code: u16, operand: &str) -> Result<(), AsmError> {
        let (l, r) = split_once_top(operand).ok_or(AsmError::Expected("register pair"))?;
        let a = ireg(l)?;
        let b = ireg(r)?;
        if self.cpu == Cpu::Mc6809 && (a.needs_6309() || b.needs_6309()) {
            return Err(AsmError::Needs6309(format!("register {}", operand.trim())));
        }
        if a.is_byte() != b.is_byte() && a != IReg::Zero && b != IReg::Zero {
            return Err(AsmError::IllegalForm(format!(
                "8-bit and 16-bit registers mixed in {}",
                operand.trim()
            )));
        }
        let pb = (a.to_u8().unwrap() << 4) | b.to_u8().unwrap();
        let mut bytes = opcode_bytes(code);
        bytes.push(pb);
        self.emit_insn(&bytes)
    }

    /// `TFM R±,R±`: the increment/decrement pattern picks one of four
    /// opcodes.
    fn encode_tfm(&mut self, operand: &str) -> Result<(), AsmError> {
        let (l, r) = split_once_top(operand).ok_or(AsmError::Expected("two registers"))?;
        let (a, amod) = tfm_side(l)?;
        let (b, bmod) = tfm_side(r)?;
        let offset: u16 = match (amod, bmod) {
            (1, 1) => 0,
            (-1, -1) => 1,
            (1, 0) => 2,
            (0, 1) => 3,
            _ => {
                return Err(AsmError::IllegalForm(format!(
                    "TFM increment pattern {}",
                    operand.trim()
                )))
            }
        };
        let pb = (a.to_u8().unwrap() << 4) | b.to_u8().unwrap();
        let mut bytes = opcode_bytes(0x1138 + offset);
        bytes.push(pb);
        self.emit_insn(&bytes)
    }

    /// Register-bit transfers: `R.srcbit, address.dstbit` with a
    /// direct-page address byte.
    fn encode_bit_transfer(&mut self, code: u16, operand: &str) -> Result<(), AsmError> {
        let (l, r) = split_once_top(operand).ok_or(AsmError::Expected("register.bit, address.bit"))?;
        let (rname, sbit) = l.trim().rsplit_once('.').ok_or(AsmError::Expected("register.bit"))?;
        let reg_bits: u8 = match rname.trim().to_ascii_uppercase().as_str() {
            "CC" => 0x00,
            "A" => 0x40,
            "B" => 0x80,
            _ => return Err(AsmError::Expected("CC, A or B")),
        };
        let sbit = parse_bit(sbit)?;
        let (addr_text, dbit) =
            r.trim().rsplit_once('.').ok_or(AsmError::Expected("address.bit"))?;
        let dbit = parse_bit(dbit)?;
        let addr = self.require_value(addr_text)?;
        let mut bytes = opcode_bytes(code);
        bytes.push(reg_bits | (sbit << 3) | dbit);
        bytes.push((addr & 0xFF) as u8);
        self.emit_insn(&bytes)
    }
}

fn ireg(token: &str) -> Result<IReg, AsmError> {
    IREGS
        .get(token.trim().to_ascii_uppercase().as_str())
        .copied()
        .ok_or(AsmError::Expected("register"))
}

fn tfm_side(token: &str) -> Result<(IReg, i8), AsmError> {
    let t = token.trim();
    let (name, modifier) = if let Some(base) = t.strip_suffix('+') {
        (base, 1)
    } else if let Some(base) = t.strip_suffix('-') {
        (base, -1)
    } else {
        (t, 0)
    };
    let reg = ireg(name)?;
    if reg.to_u8().unwrap() > 4 {
        return Err(AsmError::IllegalForm(format!("TFM register {name}")));
    }
    Ok((reg, modifier))
}

fn parse_bit(text: &str) -> Result<u8, AsmError> {
    text.trim()
        .parse::<u8>()
        .ok()
        .filter(|b| *b < 8)
        .ok_or(AsmError::Expected("bit number 0-7"))
}

/// Parses a `PSHS`-style register list into its post-byte mask. `DP` is
/// matched as a whole token, so it can never be read as `D`.
fn stack_mask(operand: &str) -> Result<u8, AsmError> {
    let mut mask = FlagSet::<StackReg>::default();
    for token in operand.split(',') {
        match token.trim().to_ascii_uppercase().as_str() {
            "CC" => mask |= StackReg::Cc,
            "A" => mask |= StackReg::A,
            "B" => mask |= StackReg::B,
            "D" => mask |= StackReg::A | StackReg::B,
            "DP" => mask |= StackReg::Dp,
            "X" => mask |= StackReg::X,
            "Y" => mask |= StackReg::Y,
            "S" | "U" => mask |= StackReg::Su,
            "PC" => mask |= StackReg::Pc,
            "ALL" => mask = FlagSet::full(),
            _ => return Err(AsmError::Expected("stack register")),
        }
    }
    Ok(mask.bits())
}
