//! Error categories and source-line diagnostics.

use std::fmt;
use std::io;

use thiserror::Error;

/// Represents an error raised while assembling.
///
/// The categories mirror the reporting groups of the assembler: lexical,
/// syntax, undefined symbols, phase errors, range errors, overwrites,
/// illegal instruction forms, duplicate definitions and structural limits.
#[derive(Debug, Error)]
pub enum AsmError {
    /// A numeric or character literal contained an illegal character.
    #[error("illegal character {0:?} in literal")]
    Lexical(char),
    /// A string literal was not closed before the end of the line.
    #[error("unterminated string")]
    UnterminatedString,
    /// The parser expected something that was not there.
    #[error("expected {0}")]
    Expected(&'static str),
    /// Extra text followed a complete operand.
    #[error("trailing text after operand")]
    Trailing,
    /// A symbol was still unresolved in pass 2.
    #[error("undefined symbol {0}")]
    Undefined(String),
    /// A value or length changed between pass 1 and pass 2.
    #[error("phase error: {0}")]
    Phase(String),
    /// A value does not fit the field it is emitted into.
    #[error("{0} out of range")]
    Range(&'static str),
    /// Two producers wrote different values to the same ROM byte.
    #[error("byte at ${0:04X} already written with a different value")]
    Overwrite(u16),
    /// The mnemonic does not support the selected addressing mode.
    #[error("{0} does not support this operand form")]
    IllegalForm(String),
    /// A 6309-only form was used while targeting the 6809.
    #[error("{0} requires a 6309 target")]
    Needs6309(String),
    /// The mnemonic field is neither an instruction, a pseudo-op nor a macro.
    #[error("unknown mnemonic {0}")]
    UnknownMnemonic(String),
    /// A locked symbol or an existing macro was defined again.
    #[error("duplicate definition of {0}")]
    Duplicate(String),
    /// A label collides with a mnemonic or pseudo-op keyword.
    #[error("{0} is a reserved word")]
    Reserved(String),
    /// Code or data was emitted before the program counter was set.
    #[error("program counter is undefined (missing ORG?)")]
    PcUndefined,
    /// A table or stack limit was exceeded, or nesting is unbalanced.
    #[error("{0}")]
    Structural(String),
    /// An `#error` directive fired inside a taken branch.
    #[error("{0}")]
    User(String),
    /// A source, include or load file could not be opened.
    #[error("cannot open {path}")]
    Open {
        /// The path as written in the source or on the command line.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// An I/O error on an output file.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl AsmError {
    /// Errors that terminate assembly immediately instead of being counted
    /// against the error budget.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AsmError::Overwrite(_)
                | AsmError::Duplicate(_)
                | AsmError::Reserved(_)
                | AsmError::Structural(_)
                | AsmError::User(_)
                | AsmError::Open { .. }
                | AsmError::Io(_)
        )
    }
}

/// An error bound to the source position it was raised at.
///
/// Rendered as the file and line number, the offending line, and a caret
/// pointing at the field that failed.
#[derive(Debug)]
pub struct Diagnostic {
    /// Name of the file the line came from.
    pub file: String,
    /// 1-based line number within that file.
    pub line: u32,
    /// The source line as read.
    pub text: String,
    /// Byte offset of the failing field within the line.
    pub col: usize,
    /// The underlying error.
    pub error: AsmError,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}({}): {}", self.file, self.line, self.error)?;
        writeln!(f, "  {}", self.text)?;
        write!(f, "  {}^", " ".repeat(self.col.min(self.text.len())))
    }
}
