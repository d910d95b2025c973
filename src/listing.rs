//! The listing formatter and the symbol cross-reference.

use std::fmt::Write as _;

use crate::error::Diagnostic;
use crate::mac::MacroTable;
use crate::symbol::SymbolTable;

/// Bytes shown per listing row before a continuation row is started.
const BYTES_PER_ROW: usize = 6;

/// Accumulates the pass-2 listing. `LIST -` suppresses source rows but
/// never error reports.
#[derive(Debug)]
pub struct Listing {
    text: String,
    /// Source rows are emitted only while enabled.
    pub enabled: bool,
    /// Prefix rows with the source line number.
    pub numbers: bool,
}

impl Listing {
    /// Creates an empty listing.
    pub fn new(numbers: bool) -> Listing {
        Listing { text: String::new(), enabled: true, numbers }
    }

    /// Appends one source row: optional line number, program counter,
    /// emitted bytes and the echoed source text. Long data runs continue
    /// on byte-only rows.
    pub fn push_line(&mut self, number: u32, pc: Option<u16>, bytes: &[u8], source: &str) {
        if !self.enabled {
            return;
        }
        let head = bytes.get(..BYTES_PER_ROW.min(bytes.len())).unwrap_or(&[]);
        self.row(Some(number), pc, head, Some(source));
        let mut offset = BYTES_PER_ROW;
        while offset < bytes.len() {
            let chunk = &bytes[offset..(offset + BYTES_PER_ROW).min(bytes.len())];
            let addr = pc.map(|p| p.wrapping_add(offset as u16));
            self.row(None, addr, chunk, None);
            offset += BYTES_PER_ROW;
        }
    }

    fn row(&mut self, number: Option<u32>, pc: Option<u16>, bytes: &[u8], source: Option<&str>) {
        if self.numbers {
            match number {
                Some(n) => {
                    let _ = write!(self.text, "{n:5} ");
                }
                None => self.text.push_str("      "),
            }
        }
        match pc {
            Some(p) => {
                let _ = write!(self.text, "{p:04X} ");
            }
            None => self.text.push_str("     "),
        }
        let mut field = String::new();
        for b in bytes {
            let _ = write!(field, "{b:02X} ");
        }
        let _ = write!(self.text, "{field:<width$}", width = BYTES_PER_ROW * 3);
        if let Some(source) = source {
            self.text.push_str(source);
        }
        self.text.push('\n');
    }

    /// Appends an annotation row, used for NOP fill counts and `SIZE`.
    pub fn note(&mut self, message: &str) {
        if self.enabled {
            let _ = writeln!(self.text, "{:<width$}; {message}", "", width = BYTES_PER_ROW * 3 + 5);
        }
    }

    /// Appends an error report. Errors appear even while `LIST -` is
    /// active.
    pub fn error(&mut self, diagnostic: &Diagnostic) {
        let _ = writeln!(self.text, "{diagnostic}");
    }

    /// Appends the symbol cross-reference: every symbol with its value
    /// and referencing line numbers, `D` marking the definition.
    pub fn cross_reference(&mut self, symbols: &SymbolTable) {
        let _ = writeln!(self.text, "\nSymbol            Value  References");
        for sym in symbols.iter() {
            let value = match sym.value.get() {
                Some(v) => format!("{:04X}", v as u16),
                None => "????".to_string(),
            };
            let refs = sym
                .refs
                .iter()
                .map(|r| {
                    if r.def {
                        format!("{}D", r.line)
                    } else {
                        r.line.to_string()
                    }
                })
                .collect::<Vec<_>>()
                .join(", ");
            let _ = writeln!(self.text, "{:<17} {value}   {refs}", sym.name);
        }
    }

    /// The listing text so far.
    pub fn text(&self) -> &str {
        &self.text
    }
}

/// The `Debug.lst` dump: the symbol table and the recorded macros.
pub fn debug_dump(symbols: &SymbolTable, macros: &MacroTable) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Symbols");
    for sym in symbols.iter() {
        let value = match sym.value.get() {
            Some(v) => format!("{:04X}", v as u16),
            None => "????".to_string(),
        };
        let size = sym.size.map_or(String::new(), |s| format!("  size {s}"));
        let locked = if sym.locked { "  locked" } else { "" };
        let _ = writeln!(out, "  {:<17} {value}{size}{locked}", sym.name);
    }
    let _ = writeln!(out, "\nMacros");
    for mac in macros.iter() {
        let _ = writeln!(out, "  {} ({} parameters, {} lines)", mac.name, mac.params, mac.body.len());
    }
    out
}
