//! The symbol table, module scoping and anonymous numeric labels.

use crate::consts::Pass;
use crate::error::AsmError;
use crate::expr::Value;

/// A single reference to a symbol, kept for the cross-reference listing.
#[derive(Debug, Clone, Copy)]
pub struct Reference {
    /// Source line of the reference.
    pub line: u32,
    /// True for the defining reference.
    pub def: bool,
}

/// One symbol table entry.
#[derive(Debug)]
pub struct Symbol {
    /// Canonical name (scope-expanded, case-folded when folding is on).
    pub name: String,
    /// Current value; [`Value::UNDEF`] until resolved.
    pub value: Value,
    /// Object length in bytes of the data defined under this label,
    /// queried by `?name`.
    pub size: Option<u16>,
    /// Locked symbols cannot be redefined.
    pub locked: bool,
    /// Defined on the command line; source redefinitions are ignored.
    pub cli: bool,
    /// Reference list, filled during pass 2.
    pub refs: Vec<Reference>,
}

/// The symbol table. Names are canonicalized on every access: a leading
/// `.` is expanded with the current module scope, and case is folded when
/// insensitive matching is enabled.
#[derive(Debug, Default)]
pub struct SymbolTable {
    symbols: Vec<Symbol>,
    fold: bool,
    scope: String,
    recording: bool,
}

impl SymbolTable {
    /// Creates an empty table.
    pub fn new(fold: bool) -> SymbolTable {
        SymbolTable { symbols: Vec::new(), fold, scope: String::new(), recording: false }
    }

    /// Switches case folding. Affects lookups from this point on.
    pub fn set_fold(&mut self, fold: bool) {
        self.fold = fold;
    }

    /// Sets the module scope used to expand leading-`.` names. An empty
    /// scope leaves local names bare.
    pub fn set_scope(&mut self, scope: &str) {
        self.scope = scope.to_string();
    }

    /// The active module scope.
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Enables reference recording; only pass 2 records, so the
    /// cross-reference is not duplicated.
    pub fn set_recording(&mut self, on: bool) {
        self.recording = on;
    }

    fn canon(&self, name: &str) -> String {
        let full = if name.starts_with('.') && !self.scope.is_empty() {
            format!("{}{}", self.scope, name)
        } else {
            name.to_string()
        };
        if self.fold {
            full.to_ascii_uppercase()
        } else {
            full
        }
    }

    /// Finds a symbol by source spelling.
    pub fn find(&self, name: &str) -> Option<usize> {
        let canon = self.canon(name);
        self.symbols.iter().position(|s| s.name == canon)
    }

    fn index_or_insert(&mut self, name: &str) -> usize {
        let canon = self.canon(name);
        match self.symbols.iter().position(|s| s.name == canon) {
            Some(i) => i,
            None => {
                self.symbols.push(Symbol {
                    name: canon,
                    value: Value::UNDEF,
                    size: None,
                    locked: false,
                    cli: false,
                    refs: Vec::new(),
                });
                self.symbols.len() - 1
            }
        }
    }

    fn record(&mut self, index: usize, line: u32, def: bool) {
        if self.recording {
            self.symbols[index].refs.push(Reference { line, def });
        }
    }

    /// Looks a symbol up for an expression, creating an unresolved
    /// placeholder for a forward reference.
    pub fn reference(&mut self, name: &str, line: u32, _pass: Pass) -> Value {
        let i = self.index_or_insert(name);
        self.record(i, line, false);
        self.symbols[i].value
    }

    /// Looks a symbol's value up without creating it or recording a
    /// reference. Used by `ifdef`/`ifndef`.
    pub fn probe(&self, name: &str) -> Value {
        self.find(name).map_or(Value::UNDEF, |i| self.symbols[i].value)
    }

    /// The `?name` object-length query.
    pub fn size_query(&mut self, name: &str, line: u32, _pass: Pass) -> Value {
        let i = self.index_or_insert(name);
        self.record(i, line, false);
        self.symbols[i].size.map_or(Value::UNDEF, |s| Value::new(i32::from(s)))
    }

    /// Binds a label to the current program counter. In pass 2 the
    /// existing value is verified instead, which is what surfaces phase
    /// errors.
    pub fn define_label(
        &mut self,
        name: &str,
        pc: u16,
        pass: Pass,
        line: u32,
    ) -> Result<usize, AsmError> {
        let i = self.index_or_insert(name);
        let sym = &mut self.symbols[i];
        match pass {
            Pass::One => {
                if sym.cli {
                    return Ok(i);
                }
                if sym.locked && sym.value.defined() {
                    return Err(AsmError::Duplicate(sym.name.clone()));
                }
                sym.value = Value::new(i32::from(pc));
                sym.locked = true;
            }
            Pass::Two => {
                if !sym.cli {
                    match sym.value.get() {
                        Some(v) if v as u16 != pc => {
                            return Err(AsmError::Phase(format!(
                                "{} moved from ${:04X} to ${:04X}",
                                sym.name, v as u16, pc
                            )));
                        }
                        Some(_) => {}
                        None => sym.value = Value::new(i32::from(pc)),
                    }
                }
                self.record(i, line, true);
            }
        }
        Ok(i)
    }

    /// Defines a constant (`=`/`EQU`/`ENUM`, locked) or a variable
    /// (`SET`, reassignable). Source redefinitions of command-line
    /// symbols are ignored.
    pub fn define_const(
        &mut self,
        name: &str,
        value: Value,
        locked: bool,
        pass: Pass,
        line: u32,
    ) -> Result<usize, AsmError> {
        let i = self.index_or_insert(name);
        let sym = &mut self.symbols[i];
        match pass {
            Pass::One => {
                if sym.cli {
                    return Ok(i);
                }
                if sym.locked {
                    return Err(AsmError::Duplicate(sym.name.clone()));
                }
                sym.value = value;
                sym.locked = locked;
            }
            Pass::Two => {
                if !sym.cli && value.defined() {
                    sym.value = value;
                }
                self.record(i, line, true);
            }
        }
        Ok(i)
    }

    /// Defines a locked symbol from the command line.
    pub fn define_cli(&mut self, name: &str, value: i32) {
        let i = self.index_or_insert(name);
        let sym = &mut self.symbols[i];
        sym.value = Value::new(value);
        sym.locked = true;
        sym.cli = true;
    }

    /// Records the object length of the data defined under a label.
    pub fn set_size(&mut self, index: usize, size: u16) {
        self.symbols[index].size = Some(size);
    }

    /// The value of a symbol by index.
    pub fn value(&self, index: usize) -> Value {
        self.symbols[index].value
    }

    /// All entries, in definition order.
    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.iter()
    }

    /// Names that were referenced but never received a value.
    pub fn unresolved(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.iter().filter(|s| !s.value.defined() && !s.refs.is_empty())
    }
}

/// Maximum depth of `-`/`+` anonymous labels.
pub const LOCAL_DEPTH: usize = 10;

/// Anonymous numeric labels. Backward lookups resolve against the most
/// recently seen label of the requested depth; forward lookups search the
/// ordered per-depth address lists collected in pass 1.
#[derive(Debug, Default)]
pub struct LocalLabels {
    back: [Option<u16>; LOCAL_DEPTH],
    fwd: [Vec<u16>; LOCAL_DEPTH],
}

impl LocalLabels {
    /// Clears the per-pass backward state. The forward lists survive into
    /// pass 2; they are only filled during pass 1.
    pub fn reset(&mut self) {
        self.back = [None; LOCAL_DEPTH];
    }

    /// Drops everything, including the pass-1 forward lists.
    pub fn clear(&mut self) {
        self.reset();
        for list in &mut self.fwd {
            list.clear();
        }
    }

    /// Records an anonymous label of the given depth at `pc`.
    pub fn define(&mut self, depth: usize, pc: u16, pass: Pass) -> Result<(), AsmError> {
        if depth == 0 || depth > LOCAL_DEPTH {
            return Err(AsmError::Structural(format!(
                "anonymous label depth {depth} exceeds {LOCAL_DEPTH}"
            )));
        }
        self.back[depth - 1] = Some(pc);
        if pass == Pass::One {
            self.fwd[depth - 1].push(pc);
        }
        Ok(())
    }

    /// Nearest preceding anonymous label of the given depth.
    pub fn backward(&self, depth: usize) -> Value {
        if depth == 0 || depth > LOCAL_DEPTH {
            return Value::UNDEF;
        }
        self.back[depth - 1].map_or(Value::UNDEF, |p| Value::new(i32::from(p)))
    }

    /// Nearest following anonymous label of the given depth. Unresolved
    /// during pass 1, when the lists are still being built.
    pub fn forward(&self, depth: usize, pc: u16) -> Value {
        if depth == 0 || depth > LOCAL_DEPTH {
            return Value::UNDEF;
        }
        self.fwd[depth - 1]
            .iter()
            .find(|&&a| a > pc)
            .map_or(Value::UNDEF, |&a| Value::new(i32::from(a)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_reference_resolves() {
        let mut t = SymbolTable::new(false);
        assert_eq!(t.reference("later", 1, Pass::One), Value::UNDEF);
        t.define_label("later", 0x2000, Pass::One, 2).unwrap();
        assert_eq!(t.reference("later", 3, Pass::One), Value::new(0x2000));
    }

    #[test]
    fn duplicate_label_rejected() {
        let mut t = SymbolTable::new(false);
        t.define_label("twice", 0x100, Pass::One, 1).unwrap();
        assert!(t.define_label("twice", 0x200, Pass::One, 2).is_err());
    }

    #[test]
    fn label_phase_mismatch() {
        let mut t = SymbolTable::new(false);
        t.define_label("l", 0x100, Pass::One, 1).unwrap();
        assert!(t.define_label("l", 0x101, Pass::Two, 1).is_err());
        assert!(t.define_label("l", 0x100, Pass::Two, 1).is_ok());
    }

    #[test]
    fn set_reassigns() {
        let mut t = SymbolTable::new(false);
        t.define_const("v", Value::new(1), false, Pass::One, 1).unwrap();
        t.define_const("v", Value::new(2), false, Pass::One, 2).unwrap();
        assert_eq!(t.probe("v"), Value::new(2));
    }

    #[test]
    fn cli_definition_wins() {
        let mut t = SymbolTable::new(false);
        t.define_cli("speed", 42);
        t.define_const("speed", Value::new(1), true, Pass::One, 1).unwrap();
        assert_eq!(t.probe("speed"), Value::new(42));
    }

    #[test]
    fn scope_rewrites_local_names() {
        let mut t = SymbolTable::new(false);
        t.set_scope("MOD");
        t.define_label(".loop", 0x10, Pass::One, 1).unwrap();
        assert_eq!(t.probe(".loop"), Value::new(0x10));
        t.set_scope("OTHER");
        assert_eq!(t.probe(".loop"), Value::UNDEF);
        assert_eq!(t.probe("MOD.loop"), Value::new(0x10));
        // without a scope the name stays bare
        t.set_scope("");
        t.define_label(".bare", 0x20, Pass::One, 2).unwrap();
        assert_eq!(t.probe(".bare"), Value::new(0x20));
    }

    #[test]
    fn case_folding() {
        let mut t = SymbolTable::new(true);
        t.define_label("Start", 0x30, Pass::One, 1).unwrap();
        assert_eq!(t.probe("START"), Value::new(0x30));
        assert_eq!(t.probe("start"), Value::new(0x30));
    }

    #[test]
    fn local_numeric_labels() {
        let mut l = LocalLabels::default();
        l.define(1, 0x100, Pass::One).unwrap();
        l.define(2, 0x104, Pass::One).unwrap();
        l.define(1, 0x110, Pass::One).unwrap();
        assert_eq!(l.backward(1), Value::new(0x110));
        assert_eq!(l.backward(2), Value::new(0x104));
        // forward search skips addresses at or before the reference point
        assert_eq!(l.forward(1, 0x100), Value::new(0x110));
        assert_eq!(l.forward(1, 0x110), Value::UNDEF);
        // pass 1 has not seen the tail of the list yet
        let mut p1 = LocalLabels::default();
        assert_eq!(p1.forward(1, 0), Value::UNDEF);
        p1.define(1, 8, Pass::One).unwrap();
        assert_eq!(p1.forward(1, 0), Value::new(8));
    }
}
