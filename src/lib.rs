//! bs9 is a two-pass cross-assembler for the Motorola 6809 and the
//! Hitachi 6309.
//!
//! Pass 1 resolves symbols and fixes every instruction's length; pass 2
//! emits bytes into a 64K image, produces a listing with a symbol
//! cross-reference, and writes the binary or S-record ranges the source
//! requested with `STORE`. See `bs9-cli` for the command-line front end.
//!
//! # Examples
//!
//! ```
//! let mut asm = bs9::Assembler::new(bs9::Options::default());
//! let summary = asm
//!     .assemble_source("demo.as9", "    ORG $1000\n    LDX #$1234\n    RTS\n")
//!     .unwrap();
//! assert_eq!(summary.errors, 0);
//! assert_eq!(&asm.image()[0x1000..0x1004], &[0x8E, 0x12, 0x34, 0x39]);
//! ```

#![warn(missing_docs)]

pub mod asm;
pub mod consts;
mod directive;
mod encoder;
pub mod error;
pub mod expr;
pub mod listing;
pub mod mac;
pub mod output;
pub mod rom;
pub mod symbol;

#[doc(inline)]
pub use asm::{Assembler, Options, StoreOutcome, Summary};
pub use consts::{Cpu, Pass};
pub use error::{AsmError, Diagnostic};
pub use expr::{Force, Value};
pub use rom::{Store, StoreFormat};
