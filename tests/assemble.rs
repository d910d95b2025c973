use bs9::{Assembler, Options, Summary};

fn assemble(source: &str) -> Assembler {
    let mut asm = Assembler::new(Options::default());
    let summary = asm.assemble_source("test.as9", source).unwrap();
    assert_eq!(summary.errors, 0, "unexpected errors:\n{}", asm.listing_text());
    asm
}

fn assemble_with(options: Options, source: &str) -> (Assembler, Summary) {
    let mut asm = Assembler::new(options);
    let summary = asm.assemble_source("test.as9", source).unwrap();
    (asm, summary)
}

fn optimized() -> Options {
    Options { optimize: true, ..Options::default() }
}

#[test]
fn inherent() {
    let asm = assemble("    ORG $1000\n    RTS\nnext NOP\n");
    assert_eq!(asm.image()[0x1000], 0x39);
    // the PC advanced by exactly one byte
    assert_eq!(asm.image()[0x1001], 0x12);
}

#[test]
fn immediate_16bit() {
    let asm = assemble("    ORG $1000\n    LDX #$1234\n");
    assert_eq!(&asm.image()[0x1000..0x1003], &[0x8E, 0x12, 0x34]);
}

#[test]
fn immediate_sizes() {
    let asm = assemble(
        "    ORG 0\n    LDA #$FF\n    ANDCC #$FE\n    CWAI #$EF\n    SUBW #$1234\n    LDQ #$12345678\n",
    );
    assert_eq!(
        &asm.image()[0..13],
        &[0x86, 0xFF, 0x1C, 0xFE, 0x3C, 0xEF, 0x10, 0x80, 0x12, 0x34, 0xCD, 0x12, 0x34]
    );
    assert_eq!(&asm.image()[13..15], &[0x56, 0x78]);
}

#[test]
fn short_branch_forward() {
    let asm = assemble("    ORG $1000\n    BNE skip\n    NOP\nskip RTS\n");
    assert_eq!(&asm.image()[0x1000..0x1004], &[0x26, 0x01, 0x12, 0x39]);
}

#[test]
fn branch_promotion_with_optimizer() {
    let src = "    ORG $0\n    BRA far\n    FILL 200\nfar RTS\n";
    let (asm, _) = assemble_with(optimized(), src);
    // pass 1 locked three bytes; the displacement does not fit eight bits
    assert_eq!(&asm.image()[0..3], &[0x16, 0x00, 0xC8]);
    assert_eq!(asm.image()[0xCB], 0x39);
}

#[test]
fn branch_shrink_pads_with_nop() {
    let src = "    ORG $0\n    BRA near\n    NOP\nnear RTS\n";
    let (asm, summary) = assemble_with(optimized(), src);
    assert_eq!(summary.errors, 0);
    // the promoted three-byte slot holds a short branch plus one NOP
    assert_eq!(&asm.image()[0..5], &[0x20, 0x02, 0x12, 0x12, 0x39]);
    assert!(asm.listing_text().contains("NOP fill"));
}

#[test]
fn branch_out_of_range_without_optimizer() {
    let mut asm = Assembler::new(Options::default());
    let summary = asm
        .assemble_source("test.as9", "    ORG $0\n    BRA far\n    FILL 200\nfar RTS\n")
        .unwrap();
    assert!(summary.errors > 0);
    assert!(summary.stores.is_empty());
}

#[test]
fn long_branch_backward() {
    let asm = assemble("    ORG 0\nstart NOP\n    LBRA start\n");
    assert_eq!(&asm.image()[1..4], &[0x16, 0xFF, 0xFC]);
}

#[test]
fn indexed_five_bit_offset() {
    let asm = assemble("    ORG 0\n    LDA 5,X\n");
    assert_eq!(&asm.image()[0..2], &[0xA6, 0x05]);
}

#[test]
fn indexed_forms() {
    let asm = assemble(concat!(
        "    ORG 0\n",
        "    LDA ,X\n",      // A6 84
        "    LDA ,X+\n",     // A6 80
        "    LDA ,X++\n",    // A6 81
        "    LDA ,--Y\n",    // A6 A3
        "    LDA A,X\n",     // A6 86
        "    LDA D,Y\n",     // A6 AB
        "    LDA E,X\n",     // A6 87
        "    LDA [,X]\n",    // A6 94
        "    LDA -5,X\n",    // A6 1B
        "    LDA 100,X\n",   // A6 88 64
        "    LDA $1000,X\n", // A6 89 10 00
        "    LDA [$1234]\n", // A6 9F 12 34
        "    LDW ,W\n",      // 10 A6 8F
        "    LDD [,W]\n",    // EC 90
    ));
    let expected: &[u8] = &[
        0xA6, 0x84, 0xA6, 0x80, 0xA6, 0x81, 0xA6, 0xA3, 0xA6, 0x86, 0xA6, 0xAB, 0xA6, 0x87,
        0xA6, 0x94, 0xA6, 0x1B, 0xA6, 0x88, 0x64, 0xA6, 0x89, 0x10, 0x00, 0xA6, 0x9F, 0x12,
        0x34, 0x10, 0xA6, 0x8F, 0xEC, 0x90,
    ];
    assert_eq!(&asm.image()[0..expected.len()], expected);
}

#[test]
fn indirect_pc_relative_forward() {
    let asm = assemble("    ORG $2000\n    LDA [dest,PCR]\n    FILL 10\ndest RTS\n");
    assert_eq!(&asm.image()[0x2000..0x2003], &[0xA6, 0x9C, 0x0A]);
    assert_eq!(asm.image()[0x200D], 0x39);
}

#[test]
fn macro_expansion() {
    let src = "MACRO INC2(x)\n    INC x\n    INC x\nENDM\n    ORG $0\n    INC2 ($20)\n";
    let asm = assemble(src);
    assert_eq!(&asm.image()[0..4], &[0x0C, 0x20, 0x0C, 0x20]);
}

#[test]
fn macro_suffix_style_and_nesting() {
    let src = concat!(
        "EMIT MACRO v\n",
        "    BYTE v\n",
        "ENDM\n",
        "PAIR MACRO a,b\n",
        "    EMIT a\n",
        "    EMIT b\n",
        "ENDM\n",
        "    ORG 0\n",
        "    PAIR 1,2\n",
        "    PAIR 3,4\n",
    );
    let asm = assemble(src);
    assert_eq!(&asm.image()[0..4], &[1, 2, 3, 4]);
}

#[test]
fn direct_page_selection() {
    let asm = assemble(concat!(
        "    ORG 0\n",
        "    SETDP $12\n",
        "    LDA $1234\n",  // direct: high byte matches DP
        "    LDA $3456\n",  // extended
        "    LDA <$3456\n", // forced direct
        "    LDA >$1234\n", // forced extended
    ));
    let expected: &[u8] = &[0x96, 0x34, 0xB6, 0x34, 0x56, 0x96, 0x56, 0xB6, 0x12, 0x34];
    assert_eq!(&asm.image()[0..expected.len()], expected);
}

#[test]
fn setdp_uses_high_byte_of_wide_values() {
    let asm = assemble("    ORG 0\n    SETDP $1200\n    LDA $1234\n");
    assert_eq!(&asm.image()[0..2], &[0x96, 0x34]);
}

#[test]
fn register_forms() {
    let asm = assemble(concat!(
        "    ORG 0\n",
        "    PSHS A,B,X\n",     // 34 16
        "    PULS ALL\n",       // 35 FF
        "    PSHS D,DP\n",      // 34 0E
        "    TFR A,B\n",        // 1F 89
        "    EXG X,Y\n",        // 1E 12
        "    ADDR X,Y\n",       // 10 30 12
        "    TFM X+,Y+\n",      // 11 38 12
        "    TFM U-,S-\n",      // 11 39 34
        "    BAND A.5,$40.1\n", // 11 30 69 40
    ));
    let expected: &[u8] = &[
        0x34, 0x16, 0x35, 0xFF, 0x34, 0x0E, 0x1F, 0x89, 0x1E, 0x12, 0x10, 0x30, 0x12, 0x11,
        0x38, 0x12, 0x11, 0x39, 0x34, 0x11, 0x30, 0x69, 0x40,
    ];
    assert_eq!(&asm.image()[0..expected.len()], expected);
}

#[test]
fn register_width_mixing_is_an_error() {
    let mut asm = Assembler::new(Options::default());
    let summary = asm.assemble_source("test.as9", "    ORG 0\n    TFR A,X\n").unwrap();
    assert!(summary.errors > 0);
}

#[test]
fn immediate_to_memory() {
    let asm = assemble(concat!(
        "    ORG 0\n",
        "    OIM #$55,$10\n",   // 01 55 10 (direct)
        "    AIM #$0F,5,X\n",   // 62 0F 05 (indexed)
        "    TIM #1,$2000\n",   // 7B 01 20 00 (extended)
    ));
    let expected: &[u8] = &[0x01, 0x55, 0x10, 0x62, 0x0F, 0x05, 0x7B, 0x01, 0x20, 0x00];
    assert_eq!(&asm.image()[0..expected.len()], expected);
}

#[test]
fn cpu_6809_rejects_6309_forms() {
    let mut asm = Assembler::new(Options::default());
    let summary = asm
        .assemble_source("test.as9", "    CPU = 6809\n    ORG 0\n    ADDW #1\n")
        .unwrap();
    assert!(summary.errors > 0);
}

#[test]
fn local_numeric_labels() {
    let asm = assemble("    ORG $0\n-   NOP\n    BNE -\n    BEQ +\n+   RTS\n");
    assert_eq!(&asm.image()[0..6], &[0x12, 0x26, 0xFD, 0x27, 0x00, 0x39]);
}

#[test]
fn conditional_assembly() {
    let asm = assemble(concat!(
        "FLAG = 1\n",
        "    ORG 0\n",
        "    if FLAG\n",
        "    BYTE 1\n",
        "    else\n",
        "    BYTE 2\n",
        "    endif\n",
        "    ifndef MISSING\n",
        "    BYTE 3\n",
        "    endif\n",
        "    ifdef MISSING\n",
        "    BYTE 4\n",
        "    endif\n",
    ));
    assert_eq!(&asm.image()[0..2], &[1, 3]);
    assert!(!asm.image()[..16].contains(&2));
}

#[test]
fn hash_error_in_dead_branch_is_ignored() {
    let asm = assemble("    if 0\n    #error never reached\n    endif\n");
    assert_eq!(asm.errors(), 0);
}

#[test]
fn hash_error_in_taken_branch_aborts() {
    let mut asm = Assembler::new(Options::default());
    let summary = asm
        .assemble_source("test.as9", "    if 1\n    #error boom\n    endif\n")
        .unwrap();
    assert!(summary.errors > 0);
}

#[test]
fn unbalanced_conditional_is_fatal() {
    let mut asm = Assembler::new(Options::default());
    let summary = asm.assemble_source("test.as9", "    if 1\n    NOP\n").unwrap();
    assert!(summary.errors > 0);
}

#[test]
fn constants_variables_and_enums() {
    let asm = assemble(concat!(
        "A1 EQU 5\n",
        "V SET 1\n",
        "V SET V+1\n",
        "E0 ENUM\n",
        "E1 ENUM\n",
        "E9 ENUM 9\n",
        "EA ENUM\n",
        "    ORG 0\n",
        "    BYTE A1, V, E0, E1, E9, EA\n",
    ));
    assert_eq!(&asm.image()[0..6], &[5, 2, 0, 1, 9, 10]);
}

#[test]
fn object_length_query() {
    let asm = assemble("    ORG 0\ntbl BYTE 1,2,3\n    BYTE ?tbl\n");
    assert_eq!(&asm.image()[0..4], &[1, 2, 3, 3]);
}

#[test]
fn strings_and_character_map() {
    let asm = assemble("    ORG 0\n    BYTE \"AB\",0\n    CMAP 1\n    BYTE \"AB\"\n");
    assert_eq!(&asm.image()[0..5], &[0x41, 0x42, 0x00, 0x42, 0x43]);
}

#[test]
fn data_directives() {
    let asm = assemble(concat!(
        "    ORG 0\n",
        "    WORD $1234,$5678\n",
        "    LONG $DEADBEEF\n",
        "    FILL 3 ($AA)\n",
        "    BITS ....****\n",
        "    C5TO3 \"HELLO\"\n",
    ));
    let expected: &[u8] = &[
        0x12, 0x34, 0x56, 0x78, 0xDE, 0xAD, 0xBE, 0xEF, 0xAA, 0xAA, 0xAA, 0x0F, 0x42, 0x83,
        0x76,
    ];
    assert_eq!(&asm.image()[0..expected.len()], expected);
}

#[test]
fn real_emits_ieee_single() {
    let asm = assemble("    ORG 0\n    REAL 1.0, -2.5\n");
    assert_eq!(
        &asm.image()[0..8],
        &[0x3F, 0x80, 0x00, 0x00, 0xC0, 0x20, 0x00, 0x00]
    );
}

#[test]
fn motorola_operands_end_at_blank() {
    let options = Options { motorola: true, ..Options::default() };
    let (asm, summary) =
        assemble_with(options, "    ORG 0\n    LDA #1 trailing words\n");
    assert_eq!(summary.errors, 0);
    assert_eq!(&asm.image()[0..2], &[0x86, 0x01]);
}

#[test]
fn align_and_reserve() {
    let asm = assemble("    ORG $1001\n    ALIGN 16\nlbl RTS\n    ORG $100\na RMB 4\nb RTS\n");
    assert_eq!(asm.image()[0x1010], 0x39);
    assert_eq!(asm.image()[0x104], 0x39);
}

#[test]
fn bss_counter_is_separate_from_pc() {
    let asm = assemble(concat!(
        "& = $2000\n",
        "buf BSS 10\n",
        "buf2 BSS 2\n",
        "    ORG 0\n",
        "    LDX #buf2\n",
        "    BYTE ?buf\n",
    ));
    assert_eq!(&asm.image()[0..4], &[0x8E, 0x20, 0x0A, 10]);
}

#[test]
fn star_assignment_sets_pc() {
    let asm = assemble("* = $1234\nhere RTS\n");
    assert_eq!(asm.image()[0x1234], 0x39);
}

#[test]
fn column_one_star_is_a_comment() {
    let asm = assemble("* just a comment\n    ORG 0\n    RTS\n");
    assert_eq!(asm.image()[0], 0x39);
}

#[test]
fn duplicate_label_is_fatal() {
    let mut asm = Assembler::new(Options::default());
    let summary =
        asm.assemble_source("test.as9", "    ORG 0\nx RTS\nx RTS\n").unwrap();
    assert!(summary.errors > 0);
}

#[test]
fn reserved_word_labels_rejected() {
    let mut asm = Assembler::new(Options::default());
    let summary = asm.assemble_source("test.as9", "ORG EQU 1\n").unwrap();
    assert!(summary.errors > 0);
}

#[test]
fn overwrite_detection() {
    let mut asm = Assembler::new(Options::default());
    let summary = asm
        .assemble_source("test.as9", "    ORG 0\n    BYTE 1\n    ORG 0\n    BYTE 2\n")
        .unwrap();
    assert!(summary.errors > 0);
}

#[test]
fn rewriting_the_same_value_is_not_an_overwrite() {
    let asm = assemble("    ORG 0\n    BYTE 9\n    ORG 0\n    BYTE 9\n");
    assert_eq!(asm.image()[0], 9);
}

#[test]
fn command_line_definitions_win() {
    let options = Options {
        defines: vec![("SPEED".to_string(), 42)],
        ..Options::default()
    };
    let (asm, summary) = assemble_with(options, "SPEED = 1\n    ORG 0\n    BYTE SPEED\n");
    assert_eq!(summary.errors, 0);
    assert_eq!(asm.image()[0], 42);
}

#[test]
fn case_folding_option() {
    let options = Options { fold_case: true, ..Options::default() };
    let (asm, summary) =
        assemble_with(options, "    ORG 0\nStart NOP\n    LBRA START\n");
    assert_eq!(summary.errors, 0);
    assert_eq!(&asm.image()[1..4], &[0x16, 0xFF, 0xFC]);
}

#[test]
fn module_scope_for_local_labels() {
    let asm = assemble(concat!(
        "    ORG 0\n",
        "ModA MODULE\n",
        ".go NOP\n",
        "    LBRA .go\n",
        "    ENDMOD\n",
        "ModB MODULE\n",
        ".go NOP\n",
        "    LBRA .go\n",
        "    ENDMOD\n",
    ));
    // each module branches to its own .go
    assert_eq!(&asm.image()[1..4], &[0x16, 0xFF, 0xFC]);
    assert_eq!(&asm.image()[5..8], &[0x16, 0xFF, 0xFC]);
}

#[test]
fn jmp_rewritten_as_bra_backwards() {
    let (asm, summary) =
        assemble_with(optimized(), "    ORG $1000\nback NOP\n    JMP back\n");
    assert_eq!(summary.errors, 0);
    assert_eq!(&asm.image()[0x1001..0x1004], &[0x20, 0xFD, 0x12]);
}

#[test]
fn jsr_in_bsr_range_is_only_hinted() {
    let (asm, summary) =
        assemble_with(optimized(), "    ORG $1000\nsub RTS\n    JSR sub\n");
    assert_eq!(summary.errors, 0);
    // the JSR itself is kept
    assert_eq!(&asm.image()[0x1001..0x1004], &[0xBD, 0x10, 0x00]);
    assert_eq!(asm.hints().len(), 1);
}

#[test]
fn assembly_is_deterministic() {
    let src = concat!(
        "    ORG $100\n",
        "loop LDA 5,X\n",
        "    BNE loop\n",
        "    LDX #table\n",
        "table WORD loop, table\n",
    );
    let a = assemble(src);
    let b = assemble(src);
    assert_eq!(a.image(), b.image());
}

#[test]
fn listing_carries_cross_reference() {
    let asm = assemble("    ORG $1000\nstart NOP\n    LBRA start\n");
    let listing = asm.listing_text();
    assert!(listing.contains("Symbol"));
    assert!(listing.contains("start"));
    assert!(listing.contains("1000"));
}

#[test]
fn undefined_symbol_reported_in_pass_two() {
    let mut asm = Assembler::new(Options::default());
    let summary = asm.assemble_source("test.as9", "    ORG 0\n    LDX #nowhere\n").unwrap();
    assert_eq!(summary.errors, 1);
}

#[test]
fn preprocessed_source_expands_macros() {
    let options = Options { preprocess: true, ..Options::default() };
    let src = "MACRO TWICE(x)\n    INC x\n    INC x\nENDM\n    ORG 0\n    TWICE ($20)\n";
    let (asm, summary) = assemble_with(options, src);
    assert_eq!(summary.errors, 0);
    let pp = asm.preprocessed();
    assert!(pp.contains("INC $20"));
    assert!(!pp.contains("TWICE ($20)"));
}
