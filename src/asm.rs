//! The assembler state and the two-pass driver.
//!
//! All of the mutable state — image, symbols, macros, the conditional and
//! include stacks, the pass counters — lives in one [`Assembler`] value
//! that the line handlers borrow. Pass 1 fixes symbol values and
//! instruction lengths; pass 2 replays the source against those lengths,
//! emits bytes and the listing, and finally executes the collected
//! `STORE` requests.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use crate::consts::{Cpu, Pass, MNEMONICS, PSEUDO_OPS};
use crate::error::{AsmError, Diagnostic};
use crate::expr::{eval_address, eval_operand, split_args, Eval, Force, Value};
use crate::listing::{debug_dump, Listing};
use crate::mac::{Expansion, MacroStyle, MacroTable, Recorder, MAX_DEPTH};
use crate::output::{write_bin, write_srec};
use crate::rom::{Rom, Store, StoreFormat};
use crate::symbol::{LocalLabels, SymbolTable};

/// Opcode used to pad shrunken instruction slots.
const NOP: u8 = 0x12;

/// Assembly options, mirroring the command-line flags.
#[derive(Debug, Clone)]
pub struct Options {
    /// Write a `Debug.lst` dump after assembly.
    pub debug: bool,
    /// Symbols defined on the command line; these are locked and win over
    /// source definitions.
    pub defines: Vec<(String, i32)>,
    /// Fold symbol names case-insensitively.
    pub fold_case: bool,
    /// Preset value for the 64K image.
    pub preset: u8,
    /// Motorola-style operands: the operand field ends at the first blank.
    pub motorola: bool,
    /// Prefix listing rows with line numbers.
    pub line_numbers: bool,
    /// Enable the peephole branch/jump optimizer.
    pub optimize: bool,
    /// Collect a preprocessed copy of the source.
    pub preprocess: bool,
    /// Suppress banner and summary output (command-line concern).
    pub quiet: bool,
    /// Strip listing address and byte columns from the source.
    pub strip_dump: bool,
    /// Abort pass 2 once this many errors have been reported.
    pub error_cap: u32,
}

impl Default for Options {
    fn default() -> Options {
        Options {
            debug: false,
            defines: Vec::new(),
            fold_case: false,
            preset: 0,
            motorola: false,
            line_numbers: false,
            optimize: false,
            preprocess: false,
            quiet: false,
            strip_dump: false,
            error_cap: 10,
        }
    }
}

/// What `assemble` produced.
#[derive(Debug)]
pub struct Summary {
    /// Total errors reported.
    pub errors: u32,
    /// Source lines read (macro expansions not counted).
    pub lines: u32,
    /// Bytes written into the image.
    pub bytes_written: usize,
    /// Output files produced. Empty unless pass 2 finished without
    /// errors.
    pub stores: Vec<StoreOutcome>,
}

/// One executed `STORE` request.
#[derive(Debug)]
pub struct StoreOutcome {
    /// Path written.
    pub path: String,
    /// Stored range length in bytes.
    pub bytes: u32,
    /// Output format.
    pub format: StoreFormat,
}

/// An input frame: the main source or an include file.
#[derive(Debug, Clone)]
pub(crate) struct Frame {
    pub(crate) name: String,
    lines: Vec<String>,
    next: usize,
}

impl Frame {
    pub(crate) fn new(name: String, text: &str) -> Frame {
        Frame { name, lines: text.lines().map(str::to_string).collect(), next: 0 }
    }
}

/// One conditional-assembly level.
#[derive(Debug, Clone, Copy)]
struct Cond {
    taken: bool,
    parent_skip: bool,
    in_else: bool,
}

impl Cond {
    fn skipping(self) -> bool {
        self.parent_skip || (self.taken == self.in_else)
    }
}

/// The assembler. One instance assembles one program.
#[derive(Debug)]
pub struct Assembler {
    pub(crate) opts: Options,
    pub(crate) symbols: SymbolTable,
    pub(crate) locals: LocalLabels,
    pub(crate) macros: MacroTable,
    pub(crate) rom: Rom,
    pub(crate) stores: Vec<Store>,
    pub(crate) frames: Vec<Frame>,
    expansions: Vec<Expansion>,
    conds: Vec<Cond>,
    pub(crate) recording: Option<Recorder>,
    pub(crate) macro_skip: bool,
    pub(crate) pass: Pass,
    pub(crate) pc: Option<u16>,
    pub(crate) bss: u16,
    pub(crate) dp: u8,
    pub(crate) cpu: Cpu,
    pub(crate) enum_counter: i32,
    pub(crate) cmap: i32,
    pub(crate) module_start: Option<u16>,
    pub(crate) ended: bool,
    errors: u32,
    pub(crate) listing: Listing,
    pub(crate) list_bytes: Vec<u8>,
    pub(crate) list_pc: Option<u16>,
    pub(crate) nop_fill: usize,
    pub(crate) line_no: u32,
    pub(crate) hints: Vec<String>,
    pp: String,
    suppress_pp: bool,
    err_col: usize,
    main_name: String,
    main_text: String,
}

impl Assembler {
    /// Creates an assembler with the given options.
    pub fn new(options: Options) -> Assembler {
        let rom = Rom::new(options.preset);
        let symbols = SymbolTable::new(options.fold_case);
        let listing = Listing::new(options.line_numbers);
        Assembler {
            symbols,
            locals: LocalLabels::default(),
            macros: MacroTable::default(),
            rom,
            stores: Vec::new(),
            frames: Vec::new(),
            expansions: Vec::new(),
            conds: Vec::new(),
            recording: None,
            macro_skip: false,
            pass: Pass::One,
            pc: None,
            bss: 0,
            dp: 0,
            cpu: Cpu::Hd6309,
            enum_counter: -1,
            cmap: 0,
            module_start: None,
            ended: false,
            errors: 0,
            listing,
            list_bytes: Vec::new(),
            list_pc: None,
            nop_fill: 0,
            line_no: 0,
            hints: Vec::new(),
            pp: String::new(),
            suppress_pp: false,
            err_col: 0,
            main_name: String::new(),
            main_text: String::new(),
            opts: options,
        }
    }

    /// Assembles a source file and writes the listing and the requested
    /// auxiliary files next to it. A missing extension defaults to
    /// `.as9`.
    pub fn assemble_file(&mut self, source: &str) -> Result<Summary, AsmError> {
        let mut path = PathBuf::from(source);
        if path.extension().is_none() {
            path.set_extension("as9");
        }
        let text = fs::read_to_string(&path)
            .map_err(|e| AsmError::Open { path: path.display().to_string(), source: e })?;
        let name = path.display().to_string();
        let summary = self.assemble_source(&name, &text)?;

        fs::write(path.with_extension("lst"), self.listing.text())?;
        if self.opts.optimize {
            let mut hints = self.hints.join("\n");
            if !hints.is_empty() {
                hints.push('\n');
            }
            fs::write(path.with_extension("opt"), hints)?;
        }
        if self.opts.preprocess {
            fs::write(path.with_extension("pp"), &self.pp)?;
        }
        if self.opts.debug {
            fs::write("Debug.lst", debug_dump(&self.symbols, &self.macros))?;
        }
        Ok(summary)
    }

    /// Assembles in-memory source text. The listing, image and hint
    /// collections stay accessible on the assembler afterwards; only
    /// `STORE` targets touch the file system.
    pub fn assemble_source(&mut self, name: &str, text: &str) -> Result<Summary, AsmError> {
        self.main_name = name.to_string();
        self.main_text = text.to_string();
        for (n, v) in self.opts.defines.clone() {
            self.symbols.define_cli(&n, v);
        }

        log::debug!("pass 1");
        let aborted = self.run_pass(Pass::One);
        if !aborted {
            log::debug!("pass 2");
            self.run_pass(Pass::Two);
        }

        for name in self.symbols.unresolved().map(|s| s.name.clone()).collect::<Vec<_>>() {
            println!("unresolved symbol {name}");
        }
        self.listing.cross_reference(&self.symbols);

        let stores = if self.errors == 0 { self.execute_stores() } else { Vec::new() };
        Ok(Summary {
            errors: self.errors,
            lines: self.line_no,
            bytes_written: self.rom.written_count(),
            stores,
        })
    }

    /// Runs one pass over the source. Returns true when the pass was
    /// aborted by a fatal error or the error cap.
    fn run_pass(&mut self, pass: Pass) -> bool {
        self.pass = pass;
        self.pc = None;
        self.bss = 0;
        self.dp = 0;
        self.cpu = Cpu::Hd6309;
        self.enum_counter = -1;
        self.cmap = 0;
        self.module_start = None;
        self.ended = false;
        self.conds.clear();
        self.expansions.clear();
        self.recording = None;
        self.macro_skip = false;
        self.line_no = 0;
        self.symbols.set_scope("");
        self.symbols.set_fold(self.opts.fold_case);
        self.symbols.set_recording(pass == Pass::Two);
        self.locals.reset();
        self.listing.enabled = true;
        self.frames = vec![Frame::new(self.main_name.clone(), &self.main_text.clone())];

        while !self.ended {
            let Some(line) = self.next_line() else {
                break;
            };
            if let Err(e) = self.process_line(&line) {
                if e.is_fatal() {
                    self.report(e, &line);
                    return true;
                }
                if self.pass == Pass::Two {
                    self.report(e, &line);
                    if self.errors >= self.opts.error_cap {
                        println!("too many errors, giving up");
                        return true;
                    }
                }
            }
        }
        if self.recording.is_some() {
            self.report(AsmError::Structural("missing ENDM".to_string()), "");
            return true;
        }
        if pass == Pass::One && !self.conds.is_empty() {
            self.report(AsmError::Structural("unbalanced conditional".to_string()), "");
            return true;
        }
        false
    }

    /// The next input line: expansion frames first, then the innermost
    /// include, then the main source. Only real source lines advance the
    /// line counter, so listings show macro call sites.
    fn next_line(&mut self) -> Option<String> {
        loop {
            if let Some(expansion) = self.expansions.last_mut() {
                match expansion.next_line() {
                    Some(line) => return Some(line),
                    None => {
                        self.expansions.pop();
                        continue;
                    }
                }
            }
            let frame = self.frames.last_mut()?;
            if frame.next < frame.lines.len() {
                let line = frame.lines[frame.next].clone();
                frame.next += 1;
                self.line_no += 1;
                return Some(line);
            }
            if self.frames.len() == 1 {
                return None;
            }
            self.frames.pop();
        }
    }

    fn process_line(&mut self, raw: &str) -> Result<(), AsmError> {
        self.list_bytes.clear();
        self.list_pc = None;
        self.nop_fill = 0;
        self.err_col = 0;
        self.suppress_pp = false;

        let stripped;
        let line: &str = if self.opts.strip_dump {
            stripped = strip_listing_columns(raw);
            &stripped
        } else {
            raw
        };

        if self.recording.is_some() {
            if first_token_is(line, "ENDM") {
                let recorder = self.recording.take().expect("recording checked above");
                self.macros.add(recorder)?;
            } else if let Some(recorder) = self.recording.as_mut() {
                recorder.push(line);
            }
            self.suppress_pp = true;
            self.echo(raw);
            return Ok(());
        }
        if self.macro_skip {
            if first_token_is(line, "ENDM") {
                self.macro_skip = false;
            }
            self.suppress_pp = true;
            self.echo(raw);
            return Ok(());
        }

        if line.trim().is_empty() {
            self.echo(raw);
            return Ok(());
        }
        let first = line.as_bytes()[0];
        if first == b';' || (first == b'*' && !line[1..].trim_start().starts_with('=')) {
            self.echo(raw);
            return Ok(());
        }

        let code = strip_comment(line);
        let trimmed = code.trim_end();
        if trimmed.trim().is_empty() {
            self.echo(raw);
            return Ok(());
        }

        // '* = expr' sets the PC, '& = expr' the BSS counter
        if matches!(trimmed.as_bytes()[0], b'*' | b'&') {
            if let Some(rest) = trimmed[1..].trim_start().strip_prefix('=') {
                if !self.skipping() {
                    let v = self.eval_required(rest)? & 0xFFFF;
                    if trimmed.as_bytes()[0] == b'*' {
                        self.pc = Some(v as u16);
                        self.list_pc = self.pc;
                    } else {
                        self.bss = v as u16;
                    }
                }
                self.echo(raw);
                return Ok(());
            }
        }

        // label field
        let mut label: Option<String> = None;
        let mut local_depth: Option<usize> = None;
        let mut rest: &str = trimmed;
        let bytes = trimmed.as_bytes();
        if !bytes[0].is_ascii_whitespace() {
            let sign = bytes[0];
            if sign == b'-' || sign == b'+' {
                let n = bytes.iter().take_while(|&&b| b == sign).count();
                if bytes.get(n).is_none_or(|b| b.is_ascii_whitespace()) {
                    local_depth = Some(n);
                    rest = &trimmed[n..];
                } else {
                    return Err(AsmError::Lexical(sign as char));
                }
            } else if sign.is_ascii_alphabetic() || sign == b'_' || sign == b'.' {
                let mut n = 1;
                while bytes
                    .get(n)
                    .is_some_and(|&b| b.is_ascii_alphanumeric() || b == b'_' || b == b'.')
                {
                    n += 1;
                }
                if bytes.get(n) == Some(&b'(') {
                    // paren-style macro definition (or call) in column 1
                    if self.skipping() {
                        self.echo(raw);
                        return Ok(());
                    }
                    return self.paren_macro(&trimmed[..n].to_string(), &trimmed[n..], raw);
                }
                let upper = trimmed[..n].to_ascii_uppercase();
                if PSEUDO_OPS.contains(upper.as_str())
                    || MNEMONICS.contains_key(upper.as_str())
                    || self.macros.find(&trimmed[..n]).is_some()
                {
                    // a pseudo-op, mnemonic or macro call may start in column 1
                    rest = trimmed;
                } else {
                    label = Some(trimmed[..n].to_string());
                    rest = trimmed[n..].strip_prefix(':').unwrap_or(&trimmed[n..]);
                }
            } else {
                return Err(AsmError::Lexical(sign as char));
            }
        }
        let rest = rest.trim_start();

        // mnemonic and operand fields; '(' right after the mnemonic is a
        // paren-style macro call
        let (mnemonic, operand_text) = if let Some(eq_rest) = rest.strip_prefix('=') {
            ("=", eq_rest)
        } else {
            let idx = rest
                .find(|c: char| c.is_whitespace() || c == '(')
                .unwrap_or(rest.len());
            (&rest[..idx], &rest[idx..])
        };
        let mut operand = operand_text.trim();
        if self.opts.motorola {
            operand = operand.split(char::is_whitespace).next().unwrap_or("");
        }
        self.err_col = offset_in(line, mnemonic);

        // conditional directives run even inside a skipped branch
        let kw = mnemonic.trim_start_matches('#').to_ascii_uppercase();
        if matches!(kw.as_str(), "IF" | "IFDEF" | "IFNDEF" | "ELSE" | "ENDIF") {
            self.conditional(&kw, operand)?;
            self.echo(raw);
            return Ok(());
        }
        if self.skipping() {
            self.echo(raw);
            return Ok(());
        }

        // bind the label, unless the statement does that itself
        let binds_label =
            matches!(kw.as_str(), "=" | "EQU" | "SET" | "ENUM" | "BSS" | "MACRO");
        let mut label_index: Option<usize> = None;
        if let Some(depth) = local_depth {
            let pc = self.cur_pc()?;
            self.locals.define(depth, pc, self.pass)?;
            self.list_pc = Some(pc);
        } else if let Some(name) = label.as_deref() {
            if !binds_label {
                self.guard_reserved(name)?;
                let pc = self.cur_pc()?;
                label_index = Some(self.symbols.define_label(name, pc, self.pass, self.line_no)?);
                self.list_pc = Some(pc);
            }
        }

        if mnemonic.is_empty() {
            self.echo(raw);
            return Ok(());
        }

        let pc_before = self.pc;
        if kw == "=" || PSEUDO_OPS.contains(kw.as_str()) {
            self.directive(label.as_deref(), &kw, operand)?;
            if let (Some(index), Some(before), Some(after)) = (label_index, pc_before, self.pc) {
                if matches!(
                    kw.as_str(),
                    "BYTE"
                        | "FCB"
                        | "WORD"
                        | "FDB"
                        | "LONG"
                        | "REAL"
                        | "BITS"
                        | "FILL"
                        | "C5TO3"
                        | "RMB"
                        | "LOAD"
                ) {
                    self.symbols.set_size(index, after.wrapping_sub(before));
                }
            }
        } else if self.macros.find(mnemonic).is_some() {
            self.call_macro(mnemonic, operand)?;
            self.suppress_pp = true;
        } else {
            if !operand.is_empty() {
                self.err_col = offset_in(line, operand);
            }
            self.encode(mnemonic, operand)?;
        }

        self.echo(raw);
        Ok(())
    }

    /// A `name(args)` line in column 1: the first sighting in pass 1
    /// starts a definition; pass 2 skips the recorded definition; any
    /// other sighting is a call.
    fn paren_macro(&mut self, name: &str, parens: &str, raw: &str) -> Result<(), AsmError> {
        let close = parens.rfind(')').ok_or(AsmError::Expected("closing parenthesis"))?;
        let args_text = parens[1..close].to_string();
        let known = self.macros.find(name).map(|m| m.def_line);
        match known {
            None => {
                self.begin_macro(None, &format!("{name}({args_text})"))?;
                self.suppress_pp = true;
            }
            Some(def_line) if self.pass == Pass::Two && def_line == self.line_no => {
                self.macro_skip = true;
                self.suppress_pp = true;
            }
            Some(_) => {
                self.call_macro(name, &args_text)?;
                self.suppress_pp = true;
            }
        }
        self.echo(raw);
        Ok(())
    }

    /// Expands a macro call; the expansion's lines are read before any
    /// further source input.
    fn call_macro(&mut self, name: &str, operand: &str) -> Result<(), AsmError> {
        if self.expansions.len() >= MAX_DEPTH {
            return Err(AsmError::Structural(format!(
                "macros nested deeper than {MAX_DEPTH}"
            )));
        }
        let mac = self
            .macros
            .find(name)
            .ok_or_else(|| AsmError::UnknownMnemonic(name.to_string()))?;
        let mut text = operand.trim();
        if mac.style == MacroStyle::Paren {
            if let Some(inner) =
                text.strip_prefix('(').and_then(|t| t.strip_suffix(')'))
            {
                text = inner;
            }
        }
        let args: Vec<&str> = split_args(text).into_iter().map(str::trim).collect();
        let expansion = Expansion::new(mac, &args)?;
        self.expansions.push(expansion);
        Ok(())
    }

    /// Handles `if`/`ifdef`/`ifndef`/`else`/`endif`.
    fn conditional(&mut self, kw: &str, operand: &str) -> Result<(), AsmError> {
        match kw {
            "ELSE" => {
                let cond = self
                    .conds
                    .last_mut()
                    .ok_or_else(|| AsmError::Structural("ELSE without IF".to_string()))?;
                if cond.in_else {
                    return Err(AsmError::Structural("duplicate ELSE".to_string()));
                }
                cond.in_else = true;
            }
            "ENDIF" => {
                self.conds
                    .pop()
                    .ok_or_else(|| AsmError::Structural("ENDIF without IF".to_string()))?;
            }
            _ => {
                if self.conds.len() >= 10 {
                    return Err(AsmError::Structural(
                        "conditionals nested deeper than 10".to_string(),
                    ));
                }
                let parent_skip = self.skipping();
                let taken = if parent_skip {
                    false
                } else {
                    // conditions probe symbols without recording references
                    self.symbols.set_recording(false);
                    let result = self.eval_value(operand);
                    self.symbols.set_recording(self.pass == Pass::Two);
                    let v = result?;
                    match kw {
                        "IF" => v.get().is_some_and(|x| x != 0),
                        "IFDEF" => v.defined(),
                        _ => !v.defined(),
                    }
                };
                self.conds.push(Cond { taken, parent_skip, in_else: false });
            }
        }
        Ok(())
    }

    fn skipping(&self) -> bool {
        self.conds.last().is_some_and(|c| c.skipping())
    }

    /// Reports an error against the current source position, to stdout
    /// and into the listing.
    fn report(&mut self, error: AsmError, line: &str) {
        let (file, line_no) = self
            .frames
            .last()
            .map(|f| (f.name.clone(), f.next as u32))
            .unwrap_or_default();
        let diagnostic = Diagnostic {
            file,
            line: line_no,
            text: line.to_string(),
            col: self.err_col,
            error,
        };
        println!("{diagnostic}");
        self.listing.error(&diagnostic);
        self.errors += 1;
    }

    /// Finishes one listed line.
    fn echo(&mut self, raw: &str) {
        if self.pass != Pass::Two {
            return;
        }
        let bytes = std::mem::take(&mut self.list_bytes);
        self.listing.push_line(self.line_no, self.list_pc, &bytes, raw);
        self.list_bytes = bytes;
        if self.nop_fill > 0 {
            self.listing.note(&format!("{} NOP fill byte(s) inserted", self.nop_fill));
        }
        if self.opts.preprocess && !self.suppress_pp {
            self.pp.push_str(raw);
            self.pp.push('\n');
        }
    }

    /// The program counter, which is undefined until the first `ORG`.
    pub(crate) fn cur_pc(&self) -> Result<u16, AsmError> {
        self.pc.ok_or(AsmError::PcUndefined)
    }

    /// Advances the PC, noting the row address for the listing.
    pub(crate) fn advance(&mut self, len: usize) -> Result<(), AsmError> {
        let pc = self.cur_pc()?;
        if self.list_pc.is_none() {
            self.list_pc = Some(pc);
        }
        self.pc = Some(pc.wrapping_add(len as u16));
        Ok(())
    }

    /// Emits plain data bytes.
    pub(crate) fn emit_data(&mut self, bytes: &[u8]) -> Result<(), AsmError> {
        let pc = self.cur_pc()?;
        if self.pass == Pass::Two {
            for (i, &b) in bytes.iter().enumerate() {
                self.rom.write(pc.wrapping_add(i as u16), b)?;
            }
            self.list_bytes.extend_from_slice(bytes);
        }
        self.advance(bytes.len())
    }

    /// Emits one instruction. Pass 1 records its length; pass 2 verifies
    /// the slot and pads a shrunken instruction with NOPs so following
    /// addresses keep their pass-1 values.
    pub(crate) fn emit_insn(&mut self, bytes: &[u8]) -> Result<(), AsmError> {
        let pc = self.cur_pc()?;
        match self.pass {
            Pass::One => {
                self.rom.lock_len(pc, bytes.len() as u8);
                self.advance(bytes.len())
            }
            Pass::Two => {
                let recorded = usize::from(self.rom.len_at(pc));
                let slot = if recorded == 0 { bytes.len() } else { recorded };
                if bytes.len() > slot {
                    return Err(AsmError::Phase(format!(
                        "instruction at ${pc:04X} grew from {slot} to {} bytes",
                        bytes.len()
                    )));
                }
                for (i, &b) in bytes.iter().enumerate() {
                    self.rom.write(pc.wrapping_add(i as u16), b)?;
                }
                for i in bytes.len()..slot {
                    self.rom.write(pc.wrapping_add(i as u16), NOP)?;
                }
                self.list_bytes.extend_from_slice(bytes);
                self.list_bytes.extend(std::iter::repeat_n(NOP, slot - bytes.len()));
                self.nop_fill = slot - bytes.len();
                self.advance(slot)
            }
        }
    }

    pub(crate) fn eval_operand_str(&mut self, text: &str) -> Result<(Value, Force), AsmError> {
        let mut ev = Eval {
            symbols: &mut self.symbols,
            pc: self.pc,
            pass: self.pass,
            line: self.line_no,
        };
        eval_operand(&mut ev, text)
    }

    pub(crate) fn eval_address_str(&mut self, text: &str) -> Result<(Value, Force), AsmError> {
        let mut ev = Eval {
            symbols: &mut self.symbols,
            pc: self.pc,
            pass: self.pass,
            line: self.line_no,
        };
        eval_address(&mut ev, text)
    }

    pub(crate) fn eval_value(&mut self, text: &str) -> Result<Value, AsmError> {
        Ok(self.eval_operand_str(text)?.0)
    }

    /// Evaluates an expression that must be resolvable in both passes,
    /// such as an `ORG` address or a `FILL` count.
    pub(crate) fn eval_required(&mut self, text: &str) -> Result<i32, AsmError> {
        self.eval_value(text)?
            .get()
            .ok_or_else(|| AsmError::Undefined(text.trim().to_string()))
    }

    /// A label spelled like a mnemonic or pseudo-op would shadow it, so
    /// both tables veto label names.
    pub(crate) fn guard_reserved(&self, name: &str) -> Result<(), AsmError> {
        let upper = name.to_ascii_uppercase();
        if MNEMONICS.contains_key(upper.as_str()) || PSEUDO_OPS.contains(upper.as_str()) {
            return Err(AsmError::Reserved(name.to_string()));
        }
        Ok(())
    }

    fn execute_stores(&mut self) -> Vec<StoreOutcome> {
        let stores = std::mem::take(&mut self.stores);
        let mut outcomes = Vec::new();
        for store in &stores {
            let result = File::create(&store.path).and_then(|f| {
                let mut w = BufWriter::new(f);
                match store.format {
                    StoreFormat::Bin => {
                        write_bin(&mut w, self.rom.bytes(), store.start, store.length, store.entry)?
                    }
                    StoreFormat::Srec => {
                        write_srec(&mut w, self.rom.bytes(), store.start, store.length, store.entry)?
                    }
                }
                w.flush()
            });
            match result {
                Ok(()) => {
                    log::info!("stored {} bytes to {}", store.length, store.path);
                    outcomes.push(StoreOutcome {
                        path: store.path.clone(),
                        bytes: store.length,
                        format: store.format,
                    });
                }
                Err(e) => {
                    self.report(AsmError::Open { path: store.path.clone(), source: e }, "")
                }
            }
        }
        outcomes
    }

    /// The assembled 64K image.
    pub fn image(&self) -> &[u8] {
        self.rom.bytes()
    }

    /// The listing text produced by pass 2.
    pub fn listing_text(&self) -> &str {
        self.listing.text()
    }

    /// Errors reported so far.
    pub fn errors(&self) -> u32 {
        self.errors
    }

    /// Optimizer hints collected during pass 2.
    pub fn hints(&self) -> &[String] {
        &self.hints
    }

    /// The preprocessed source, when collection was enabled.
    pub fn preprocessed(&self) -> &str {
        &self.pp
    }

    /// The `Debug.lst` content.
    pub fn debug_dump(&self) -> String {
        debug_dump(&self.symbols, &self.macros)
    }
}

/// Cuts a `;` comment off a line, honoring string and character
/// literals.
fn strip_comment(line: &str) -> &str {
    let mut in_str = false;
    let mut in_chr = false;
    for (i, c) in line.char_indices() {
        match c {
            '"' if !in_chr => in_str = !in_str,
            '\'' if !in_str => in_chr = !in_chr,
            ';' if !in_str && !in_chr => return &line[..i],
            _ => {}
        }
    }
    line
}

/// True when the first token of the line is `token` (case-insensitive).
fn first_token_is(line: &str, token: &str) -> bool {
    line.split_whitespace()
        .next()
        .is_some_and(|t| t.eq_ignore_ascii_case(token))
}

/// Removes the address and byte columns of a previously produced listing
/// line, so listings can be re-assembled. A line counts as a listing line
/// when it starts with a four-digit hex address followed by a blank,
/// optionally preceded by a line number.
fn strip_listing_columns(line: &str) -> String {
    let mut rest = line;
    let bytes = line.as_bytes();
    let mut i = 0;
    while i < bytes.len() && bytes[i] == b' ' {
        i += 1;
    }
    let digits_start = i;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    if i > digits_start && bytes.get(i) == Some(&b' ') {
        rest = &line[i + 1..];
    }
    let rb = rest.as_bytes();
    if rb.len() >= 5 && rb[..4].iter().all(u8::is_ascii_hexdigit) && rb[4] == b' ' {
        let cut = (5 + 18).min(rest.len());
        rest[cut..].to_string()
    } else {
        line.to_string()
    }
}

fn offset_in(line: &str, token: &str) -> usize {
    let l = line.as_ptr() as usize;
    let t = token.as_ptr() as usize;
    if t >= l && t <= l + line.len() {
        t - l
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comment_stripping() {
        assert_eq!(strip_comment("  LDA #1 ; load"), "  LDA #1 ");
        assert_eq!(strip_comment("  BYTE \";\", 2"), "  BYTE \";\", 2");
        assert_eq!(strip_comment("  LDA #';'"), "  LDA #';'");
    }

    #[test]
    fn listing_columns_stripped() {
        assert_eq!(
            strip_listing_columns("1000 8E 12 34           LDX #$1234"),
            "LDX #$1234"
        );
        assert_eq!(strip_listing_columns("    LDX #$1234"), "    LDX #$1234");
    }
}
