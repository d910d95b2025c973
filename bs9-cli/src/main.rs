use bs9::{expr, symbol::SymbolTable, Assembler, Options, Pass, StoreFormat, Summary};
use clap::Parser;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, ContentArrangement, Table};

/// Two-pass cross assembler for the Motorola 6809 and Hitachi 6309.
#[derive(Parser)]
#[command(name = "bs9", version)]
struct Args {
    /// Write a debug dump to Debug.lst
    #[arg(short = 'd')]
    debug: bool,

    /// Define a locked symbol (NAME=EXPR); may be repeated
    #[arg(short = 'D', value_name = "NAME=EXPR")]
    define: Vec<String>,

    /// Fold symbol names case-insensitively
    #[arg(short = 'i')]
    ignore_case: bool,

    /// Preset every byte of the 64K image
    #[arg(short = 'l', value_name = "N", default_value_t = 0)]
    preset: u8,

    /// Motorola-style operands: the operand field ends at the first blank
    #[arg(short = 'm')]
    motorola: bool,

    /// Prefix listing lines with line numbers
    #[arg(short = 'n')]
    numbers: bool,

    /// Enable the peephole optimizer and write hints to <source>.opt
    #[arg(short = 'o')]
    optimize: bool,

    /// Write a preprocessed copy of the source to <source>.pp
    #[arg(short = 'p')]
    preprocess: bool,

    /// Suppress the banner and the summary
    #[arg(short = 'q')]
    quiet: bool,

    /// Strip listing address and byte columns from the source
    #[arg(short = 'x')]
    strip: bool,

    /// Source file; .as9 is appended when no extension is given
    source: String,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    if !args.quiet {
        println!("bs9 cross assembler for the 6809/6309\n");
    }

    let mut defines = Vec::new();
    for define in &args.define {
        match parse_define(define) {
            Some(pair) => defines.push(pair),
            None => {
                eprintln!("invalid definition {define:?}, expected NAME=EXPR");
                std::process::exit(1);
            }
        }
    }

    let options = Options {
        debug: args.debug,
        defines,
        fold_case: args.ignore_case,
        preset: args.preset,
        motorola: args.motorola,
        line_numbers: args.numbers,
        optimize: args.optimize,
        preprocess: args.preprocess,
        quiet: args.quiet,
        strip_dump: args.strip,
        ..Options::default()
    };

    let mut asm = Assembler::new(options);
    let summary = match asm.assemble_file(&args.source) {
        Ok(summary) => summary,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    if !args.quiet {
        print_summary(&summary);
    }
    std::process::exit(summary.errors.min(255) as i32);
}

/// `NAME=EXPR` with the expression evaluated by the assembler's own
/// evaluator against an empty symbol table.
fn parse_define(text: &str) -> Option<(String, i32)> {
    let (name, expr_text) = text.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    let mut symbols = SymbolTable::new(false);
    let mut ev = expr::Eval { symbols: &mut symbols, pc: None, pass: Pass::One, line: 0 };
    let (value, _) = expr::eval_operand(&mut ev, expr_text).ok()?;
    Some((name.to_string(), value.get()?))
}

fn print_summary(summary: &Summary) {
    if !summary.stores.is_empty() {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(vec!["Output", "Format", "Bytes"]);
        for store in &summary.stores {
            let format = match store.format {
                StoreFormat::Bin => "BIN",
                StoreFormat::Srec => "S19",
            };
            table.add_row(vec![store.path.clone(), format.to_string(), store.bytes.to_string()]);
        }
        println!("{table}");
    }
    println!(
        "{} source lines, {} bytes emitted, {} error(s)",
        summary.lines, summary.bytes_written, summary.errors
    );
}
