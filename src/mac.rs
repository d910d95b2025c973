//! Recording and expansion of local macros.
//!
//! Macro bodies are stored with every parameter occurrence replaced by a
//! sentinel character followed by the parameter index, so expansion is a
//! single substitution sweep per line.

use crate::error::AsmError;

/// Marks a parameter slot in a stored macro body. U+0080 cannot appear in
/// ASCII source text.
pub const SENTINEL: char = '\u{80}';

/// Macro table capacity.
pub const MAX_MACROS: usize = 200;
/// Parameters per macro.
pub const MAX_PARAMS: usize = 10;
/// Expansion nesting limit.
pub const MAX_DEPTH: usize = 32;

/// How the macro was written down, kept for listing layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacroStyle {
    /// `name MACRO [args]`
    Suffix,
    /// `MACRO name [args]`
    Prefix,
    /// `name(a,b,…)`
    Paren,
}

/// A recorded macro.
#[derive(Debug)]
pub struct Macro {
    /// Macro name as written.
    pub name: String,
    /// Number of parameters.
    pub params: usize,
    /// Body lines with parameters tokenized.
    pub body: Vec<String>,
    /// Definition style.
    pub style: MacroStyle,
    /// Source line of the definition header. Pass 2 uses it to tell the
    /// definition of a paren-style macro apart from a call.
    pub def_line: u32,
}

/// Collects body lines between a macro header and `ENDM`.
#[derive(Debug)]
pub struct Recorder {
    name: String,
    params: Vec<String>,
    body: Vec<String>,
    style: MacroStyle,
    def_line: u32,
}

impl Recorder {
    /// Starts recording a macro.
    pub fn new(
        name: &str,
        params: Vec<String>,
        style: MacroStyle,
        def_line: u32,
    ) -> Result<Recorder, AsmError> {
        if params.len() > MAX_PARAMS {
            return Err(AsmError::Structural(format!(
                "macro {name} has more than {MAX_PARAMS} parameters"
            )));
        }
        Ok(Recorder { name: name.to_string(), params, body: Vec::new(), style, def_line })
    }

    /// Adds one body line, tokenizing parameter occurrences.
    pub fn push(&mut self, line: &str) {
        self.body.push(encode(line, &self.params));
    }

    fn into_macro(self) -> Macro {
        Macro {
            name: self.name,
            params: self.params.len(),
            body: self.body,
            style: self.style,
            def_line: self.def_line,
        }
    }
}

/// Replaces identifiers matching a parameter name with SENTINEL + index.
/// Text inside string and character literals is left alone.
fn encode(line: &str, params: &[String]) -> String {
    let mut out = String::with_capacity(line.len());
    let bytes = line.as_bytes();
    let mut i = 0;
    let mut in_str = false;
    let mut in_chr = false;
    while i < bytes.len() {
        let b = bytes[i];
        match b {
            b'"' if !in_chr => {
                in_str = !in_str;
                out.push('"');
                i += 1;
            }
            b'\'' if !in_str => {
                in_chr = !in_chr;
                out.push('\'');
                i += 1;
            }
            _ if !in_str
                && !in_chr
                && (b.is_ascii_alphabetic() || b == b'_' || b == b'.') =>
            {
                let start = i;
                while i < bytes.len()
                    && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_' || bytes[i] == b'.')
                {
                    i += 1;
                }
                let ident = &line[start..i];
                match params.iter().position(|p| p == ident) {
                    Some(n) => {
                        out.push(SENTINEL);
                        out.push((b'0' + n as u8) as char);
                    }
                    None => out.push_str(ident),
                }
            }
            _ => {
                out.push(b as char);
                i += 1;
            }
        }
    }
    out
}

/// The macro table.
#[derive(Debug, Default)]
pub struct MacroTable {
    macros: Vec<Macro>,
}

impl MacroTable {
    /// Finds a macro by name.
    pub fn find(&self, name: &str) -> Option<&Macro> {
        self.macros.iter().find(|m| m.name == name)
    }

    /// Finishes a recording. Duplicate names and a full table are errors.
    pub fn add(&mut self, recorder: Recorder) -> Result<(), AsmError> {
        if self.find(&recorder.name).is_some() {
            return Err(AsmError::Duplicate(recorder.name));
        }
        if self.macros.len() >= MAX_MACROS {
            return Err(AsmError::Structural(format!("more than {MAX_MACROS} macros")));
        }
        self.macros.push(recorder.into_macro());
        Ok(())
    }

    /// All recorded macros.
    pub fn iter(&self) -> impl Iterator<Item = &Macro> {
        self.macros.iter()
    }
}

/// One active macro expansion; its lines are consumed before any further
/// source input.
#[derive(Debug)]
pub struct Expansion {
    lines: Vec<String>,
    next: usize,
}

impl Expansion {
    /// Instantiates a macro body with the call's arguments.
    pub fn new(mac: &Macro, args: &[&str]) -> Result<Expansion, AsmError> {
        if args.len() != mac.params {
            return Err(AsmError::Expected("matching macro argument count"));
        }
        let lines = mac.body.iter().map(|line| substitute(line, args)).collect();
        Ok(Expansion { lines, next: 0 })
    }

    /// The next expanded line, if any.
    pub fn next_line(&mut self) -> Option<String> {
        let line = self.lines.get(self.next).cloned();
        self.next += 1;
        line
    }
}

fn substitute(line: &str, args: &[&str]) -> String {
    let mut out = String::with_capacity(line.len());
    let mut chars = line.chars();
    while let Some(c) = chars.next() {
        if c == SENTINEL {
            if let Some(d) = chars.next() {
                let n = (d as u8 - b'0') as usize;
                out.push_str(args.get(n).copied().unwrap_or(""));
            }
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, params: &[&str], body: &[&str]) -> MacroTable {
        let mut rec = Recorder::new(
            name,
            params.iter().map(|p| p.to_string()).collect(),
            MacroStyle::Prefix,
            0,
        )
        .unwrap();
        for line in body {
            rec.push(line);
        }
        let mut table = MacroTable::default();
        table.add(rec).unwrap();
        table
    }

    #[test]
    fn parameters_substitute() {
        let table = record("INC2", &["x"], &["    INC x", "    INC x"]);
        let mac = table.find("INC2").unwrap();
        let mut exp = Expansion::new(mac, &["$20"]).unwrap();
        assert_eq!(exp.next_line().unwrap(), "    INC $20");
        assert_eq!(exp.next_line().unwrap(), "    INC $20");
        assert!(exp.next_line().is_none());
    }

    #[test]
    fn whole_identifiers_only() {
        let table = record("M", &["x"], &["    LDA x+xx"]);
        let mac = table.find("M").unwrap();
        let mut exp = Expansion::new(mac, &["1"]).unwrap();
        assert_eq!(exp.next_line().unwrap(), "    LDA 1+xx");
    }

    #[test]
    fn strings_left_alone() {
        let table = record("M", &["x"], &["    BYTE \"x\", x"]);
        let mac = table.find("M").unwrap();
        let mut exp = Expansion::new(mac, &["7"]).unwrap();
        assert_eq!(exp.next_line().unwrap(), "    BYTE \"x\", 7");
    }

    #[test]
    fn argument_count_enforced() {
        let table = record("M", &["a", "b"], &["    BYTE a,b"]);
        let mac = table.find("M").unwrap();
        assert!(Expansion::new(mac, &["1"]).is_err());
        assert!(Expansion::new(mac, &["1", "2"]).is_ok());
    }

    #[test]
    fn duplicates_rejected() {
        let mut table = record("M", &[], &[]);
        let rec = Recorder::new("M", Vec::new(), MacroStyle::Suffix, 0).unwrap();
        assert!(table.add(rec).is_err());
    }
}
