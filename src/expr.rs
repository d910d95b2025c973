//! Operand scanning and integer expression evaluation.
//!
//! Expressions produce a [`Value`]: a 16-bit quantity that may still be
//! unresolved in pass 1. Arithmetic on an unresolved value stays
//! unresolved, which is what lets forward references flow through pass 1
//! without fixup records.

use crate::consts::Pass;
use crate::error::AsmError;
use crate::symbol::SymbolTable;

/// An expression result. Unresolved values absorb every operation applied
/// to them; division by zero is unresolved as well, so dead pass-1 code
/// cannot abort the assembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Value(Option<i32>);

impl Value {
    /// The unresolved value.
    pub const UNDEF: Value = Value(None);

    /// Wraps a known value.
    pub const fn new(v: i32) -> Value {
        Value(Some(v))
    }

    /// True when the value is known.
    pub fn defined(&self) -> bool {
        self.0.is_some()
    }

    /// The inner value, if known.
    pub fn get(&self) -> Option<i32> {
        self.0
    }

    /// The inner value, or zero when unresolved. Pass 1 uses this for
    /// placeholder emission; pass 2 never reads placeholders.
    pub fn or_zero(&self) -> i32 {
        self.0.unwrap_or(0)
    }

    /// Applies `f` to a known value.
    pub fn map(self, f: impl FnOnce(i32) -> i32) -> Value {
        Value(self.0.map(f))
    }

    fn zip(a: Value, b: Value, f: impl FnOnce(i32, i32) -> Option<i32>) -> Value {
        match (a.0, b.0) {
            (Some(x), Some(y)) => Value(f(x, y)),
            _ => Value::UNDEF,
        }
    }
}

/// Addressing-size override set by a leading `<` or `>` on an operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Force {
    /// No override.
    #[default]
    None,
    /// `<` — one-byte operand (direct page, 8-bit offset).
    Direct,
    /// `>` — two-byte operand (extended, 16-bit offset).
    Extended,
}

/// Everything the evaluator needs from the assembler state.
pub struct Eval<'a> {
    /// Symbol table; lookups of unknown names create forward references.
    pub symbols: &'a mut SymbolTable,
    /// Current program counter for `*`.
    pub pc: Option<u16>,
    /// Current pass.
    pub pass: Pass,
    /// Current source line, recorded on symbol references.
    pub line: u32,
}

/// A byte cursor over operand text.
pub struct Scanner<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Scanner<'a> {
    /// Creates a scanner over `text`.
    pub fn new(text: &'a str) -> Scanner<'a> {
        Scanner { bytes: text.as_bytes(), pos: 0 }
    }

    /// Current byte offset.
    pub fn pos(&self) -> usize {
        self.pos
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_at(&self, ahead: usize) -> Option<u8> {
        self.bytes.get(self.pos + ahead).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek();
        if b.is_some() {
            self.pos += 1;
        }
        b
    }

    fn eat(&mut self, b: u8) -> bool {
        if self.peek() == Some(b) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Skips blanks and tabs.
    pub fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(b' ') | Some(b'\t')) {
            self.pos += 1;
        }
    }

    /// True once every byte has been consumed.
    pub fn at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_' || b == b'.'
}

fn is_ident(b: u8) -> bool {
    is_ident_start(b) || b.is_ascii_digit()
}

/// Decodes the character following a backslash in a string or character
/// literal. Unknown escapes yield the character itself.
pub(crate) fn unescape(c: u8) -> u8 {
    match c {
        b'r' => 0x0D,
        b'n' => 0x0A,
        b't' => 0x09,
        b'a' => 0x07,
        b'e' => 0x1B,
        b'b' => 0x08,
        b's' => b' ',
        b'0' => 0x00,
        other => other,
    }
}

/// Splits `text` at top-level commas, honoring parentheses, brackets and
/// both quote kinds. An empty input yields no fields.
pub fn split_args(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    if text.trim().is_empty() {
        return out;
    }
    let mut depth = 0i32;
    let mut in_str = false;
    let mut in_chr = false;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        match c {
            '"' if !in_chr => in_str = !in_str,
            '\'' if !in_str => in_chr = !in_chr,
            '(' | '[' if !in_str && !in_chr => depth += 1,
            ')' | ']' if !in_str && !in_chr => depth -= 1,
            ',' if !in_str && !in_chr && depth == 0 => {
                out.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    out.push(&text[start..]);
    out
}

/// Splits `text` at the first top-level comma.
pub fn split_once_top(text: &str) -> Option<(&str, &str)> {
    let mut depth = 0i32;
    let mut in_str = false;
    let mut in_chr = false;
    for (i, c) in text.char_indices() {
        match c {
            '"' if !in_chr => in_str = !in_str,
            '\'' if !in_str => in_chr = !in_chr,
            '(' | '[' if !in_str && !in_chr => depth += 1,
            ')' | ']' if !in_str && !in_chr => depth -= 1,
            ',' if !in_str && !in_chr && depth == 0 => {
                return Some((&text[..i], &text[i + 1..]));
            }
            _ => {}
        }
    }
    None
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinOp {
    Mul,
    Div,
    Add,
    Sub,
    Shl,
    Shr,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Xor,
    Or,
    AndL,
    OrL,
}

/// Peeks the next binary operator without consuming it. Returns the
/// operator, its precedence and its width in bytes.
fn peek_op(sc: &Scanner<'_>) -> Option<(BinOp, u8, usize)> {
    let a = sc.peek()?;
    let b = sc.peek_at(1);
    match (a, b) {
        (b'<', Some(b'<')) => Some((BinOp::Shl, 9, 2)),
        (b'>', Some(b'>')) => Some((BinOp::Shr, 9, 2)),
        (b'<', Some(b'=')) => Some((BinOp::Le, 8, 2)),
        (b'>', Some(b'=')) => Some((BinOp::Ge, 8, 2)),
        (b'=', Some(b'=')) => Some((BinOp::Eq, 7, 2)),
        (b'!', Some(b'=')) => Some((BinOp::Ne, 7, 2)),
        (b'&', Some(b'&')) => Some((BinOp::AndL, 3, 2)),
        (b'|', Some(b'|')) => Some((BinOp::OrL, 2, 2)),
        (b'*', _) => Some((BinOp::Mul, 11, 1)),
        (b'/', _) => Some((BinOp::Div, 11, 1)),
        (b'+', _) => Some((BinOp::Add, 10, 1)),
        (b'-', _) => Some((BinOp::Sub, 10, 1)),
        (b'<', _) => Some((BinOp::Lt, 8, 1)),
        (b'>', _) => Some((BinOp::Gt, 8, 1)),
        (b'&', _) => Some((BinOp::And, 6, 1)),
        (b'^', _) => Some((BinOp::Xor, 5, 1)),
        (b'|', _) => Some((BinOp::Or, 4, 1)),
        _ => None,
    }
}

fn apply(op: BinOp, a: Value, b: Value) -> Value {
    Value::zip(a, b, |x, y| match op {
        BinOp::Mul => Some(x.wrapping_mul(y)),
        BinOp::Div => {
            if y == 0 {
                None
            } else {
                Some(x.wrapping_div(y))
            }
        }
        BinOp::Add => Some(x.wrapping_add(y)),
        BinOp::Sub => Some(x.wrapping_sub(y)),
        BinOp::Shl => Some(x.wrapping_shl(y as u32)),
        BinOp::Shr => Some(x.wrapping_shr(y as u32)),
        BinOp::Lt => Some(i32::from(x < y)),
        BinOp::Le => Some(i32::from(x <= y)),
        BinOp::Gt => Some(i32::from(x > y)),
        BinOp::Ge => Some(i32::from(x >= y)),
        BinOp::Eq => Some(i32::from(x == y)),
        BinOp::Ne => Some(i32::from(x != y)),
        BinOp::And => Some(x & y),
        BinOp::Xor => Some(x ^ y),
        BinOp::Or => Some(x | y),
        BinOp::AndL => Some(i32::from(x != 0 && y != 0)),
        BinOp::OrL => Some(i32::from(x != 0 || y != 0)),
    })
}

/// Evaluates a full expression starting at the scanner position.
pub fn eval_expr(ev: &mut Eval<'_>, sc: &mut Scanner<'_>) -> Result<Value, AsmError> {
    binary(ev, sc, 2)
}

fn binary(ev: &mut Eval<'_>, sc: &mut Scanner<'_>, min_prec: u8) -> Result<Value, AsmError> {
    let mut lhs = primary(ev, sc)?;
    loop {
        sc.skip_ws();
        let Some((op, prec, width)) = peek_op(sc) else {
            break;
        };
        if prec < min_prec {
            break;
        }
        sc.pos += width;
        let rhs = binary(ev, sc, prec + 1)?;
        lhs = apply(op, lhs, rhs);
    }
    Ok(lhs)
}

fn primary(ev: &mut Eval<'_>, sc: &mut Scanner<'_>) -> Result<Value, AsmError> {
    sc.skip_ws();
    match sc.peek() {
        None => Err(AsmError::Expected("operand")),
        Some(b'(') => grouped(ev, sc, b')'),
        Some(b'[') => grouped(ev, sc, b']'),
        Some(b'-') => {
            sc.bump();
            Ok(primary(ev, sc)?.map(i32::wrapping_neg))
        }
        Some(b'+') => {
            sc.bump();
            primary(ev, sc)
        }
        Some(b'!') => {
            sc.bump();
            Ok(primary(ev, sc)?.map(|x| i32::from(x == 0)))
        }
        Some(b'~') => {
            sc.bump();
            Ok(primary(ev, sc)?.map(|x| !x))
        }
        Some(b'*') => {
            sc.bump();
            Ok(ev.pc.map_or(Value::UNDEF, |p| Value::new(i32::from(p))))
        }
        Some(b'$') => {
            sc.bump();
            hex_literal(sc)
        }
        Some(b'%') => {
            sc.bump();
            bin_literal(sc)
        }
        Some(b'\'') => {
            sc.bump();
            char_literal(sc)
        }
        Some(b'"') => {
            sc.bump();
            string_literal(sc)
        }
        Some(b'?') => {
            sc.bump();
            let name = identifier(sc)?;
            Ok(ev.symbols.size_query(&name, ev.line, ev.pass))
        }
        Some(b) if b.is_ascii_digit() => number(sc),
        Some(b) if is_ident_start(b) => {
            let name = identifier(sc)?;
            Ok(ev.symbols.reference(&name, ev.line, ev.pass))
        }
        Some(b) => Err(AsmError::Lexical(b as char)),
    }
}

fn grouped(ev: &mut Eval<'_>, sc: &mut Scanner<'_>, close: u8) -> Result<Value, AsmError> {
    sc.bump();
    let v = binary(ev, sc, 2)?;
    sc.skip_ws();
    if !sc.eat(close) {
        return Err(AsmError::Expected("closing bracket"));
    }
    Ok(v)
}

fn identifier(sc: &mut Scanner<'_>) -> Result<String, AsmError> {
    let start = sc.pos;
    if !sc.peek().is_some_and(is_ident_start) {
        return Err(AsmError::Expected("identifier"));
    }
    while sc.peek().is_some_and(is_ident) {
        sc.pos += 1;
    }
    Ok(String::from_utf8_lossy(&sc.bytes[start..sc.pos]).into_owned())
}

fn hex_literal(sc: &mut Scanner<'_>) -> Result<Value, AsmError> {
    let mut v: i64 = 0;
    let mut digits = 0;
    while let Some(b) = sc.peek() {
        let Some(d) = (b as char).to_digit(16) else {
            break;
        };
        v = (v << 4) | i64::from(d);
        digits += 1;
        sc.pos += 1;
    }
    if digits == 0 {
        return Err(AsmError::Expected("hex digits"));
    }
    Ok(Value::new(v as i32))
}

/// `%` binary literal: `.` counts as 0, `*` and `1` as 1, blanks between
/// bit groups are skipped.
fn bin_literal(sc: &mut Scanner<'_>) -> Result<Value, AsmError> {
    let mut v: i64 = 0;
    let mut digits = 0;
    loop {
        match sc.peek() {
            Some(b'.') | Some(b'0') => {
                v <<= 1;
                digits += 1;
                sc.pos += 1;
            }
            Some(b'*') | Some(b'1') => {
                v = (v << 1) | 1;
                digits += 1;
                sc.pos += 1;
            }
            Some(b' ') if matches!(sc.peek_at(1), Some(b'.' | b'*' | b'0' | b'1')) => {
                sc.pos += 1;
            }
            _ => break,
        }
    }
    if digits == 0 {
        return Err(AsmError::Expected("binary digits"));
    }
    Ok(Value::new(v as i32))
}

fn char_literal(sc: &mut Scanner<'_>) -> Result<Value, AsmError> {
    let b = match sc.bump() {
        None => return Err(AsmError::UnterminatedString),
        Some(b'\\') => {
            let e = sc.bump().ok_or(AsmError::UnterminatedString)?;
            unescape(e)
        }
        Some(b) => b,
    };
    // the closing quote is optional
    sc.eat(b'\'');
    Ok(Value::new(i32::from(b)))
}

/// `"…"` packs up to four characters big-endian.
fn string_literal(sc: &mut Scanner<'_>) -> Result<Value, AsmError> {
    let mut v: i64 = 0;
    let mut count = 0;
    loop {
        match sc.bump() {
            None => return Err(AsmError::UnterminatedString),
            Some(b'"') => break,
            Some(b) => {
                let b = if b == b'\\' {
                    unescape(sc.bump().ok_or(AsmError::UnterminatedString)?)
                } else {
                    b
                };
                if count == 4 {
                    return Err(AsmError::Range("string literal"));
                }
                v = (v << 8) | i64::from(b);
                count += 1;
            }
        }
    }
    Ok(Value::new(v as i32))
}

/// Decimal, or hexadecimal with a trailing `H` (at most five digits).
fn number(sc: &mut Scanner<'_>) -> Result<Value, AsmError> {
    let start = sc.pos;
    while sc.peek().is_some_and(|b| b.is_ascii_hexdigit()) {
        sc.pos += 1;
    }
    let run = &sc.bytes[start..sc.pos];
    if matches!(sc.peek(), Some(b'H') | Some(b'h')) {
        sc.pos += 1;
        if run.len() > 5 {
            return Err(AsmError::Range("hex literal"));
        }
        let mut v: i64 = 0;
        for &b in run {
            v = (v << 4) | i64::from((b as char).to_digit(16).unwrap());
        }
        return Ok(Value::new(v as i32));
    }
    let mut v: i64 = 0;
    for &b in run {
        if !b.is_ascii_digit() {
            return Err(AsmError::Lexical(b as char));
        }
        v = v.wrapping_mul(10).wrapping_add(i64::from(b - b'0'));
    }
    Ok(Value::new(v as i32))
}

fn eval_prefixed(
    ev: &mut Eval<'_>,
    sc: &mut Scanner<'_>,
    mask: bool,
) -> Result<(Value, Force), AsmError> {
    sc.skip_ws();
    let force = if sc.eat(b'<') {
        Force::Direct
    } else if sc.eat(b'>') {
        Force::Extended
    } else {
        Force::None
    };
    let v = eval_expr(ev, sc)?;
    let v = if mask && force == Force::Direct { v.map(|x| x & 0xFF) } else { v };
    Ok((v, force))
}

fn eval_full(
    ev: &mut Eval<'_>,
    text: &str,
    mask: bool,
) -> Result<(Value, Force), AsmError> {
    let mut sc = Scanner::new(text);
    let out = eval_prefixed(ev, &mut sc, mask)?;
    sc.skip_ws();
    if !sc.at_end() {
        return Err(AsmError::Trailing);
    }
    Ok(out)
}

/// Evaluates a complete data or immediate operand; trailing text is an
/// error. A `<` prefix reduces the value to its low byte.
pub fn eval_operand(ev: &mut Eval<'_>, text: &str) -> Result<(Value, Force), AsmError> {
    eval_full(ev, text, true)
}

/// Evaluates a complete address operand. The `<`/`>` prefixes only set
/// the size override; the value itself is kept intact so displacement
/// arithmetic still sees the full address.
pub fn eval_address(ev: &mut Eval<'_>, text: &str) -> Result<(Value, Force), AsmError> {
    eval_full(ev, text, false)
}
