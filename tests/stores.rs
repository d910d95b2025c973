use std::fs;
use std::path::PathBuf;

use bs9::{Assembler, Options};

fn temp_path(name: &str) -> PathBuf {
    let mut path = std::env::temp_dir();
    path.push(format!("bs9-test-{}-{name}", std::process::id()));
    path
}

#[test]
fn srec_store_round_trip() {
    let out = temp_path("round.s19");
    let src = format!(
        "    ORG $0100\n    BYTE $DE,$AD,$BE,$EF\n    STORE $0100,4,\"{}\",S19\n",
        out.display()
    );
    let mut asm = Assembler::new(Options::default());
    let summary = asm.assemble_source("test.as9", &src).unwrap();
    assert_eq!(summary.errors, 0);
    assert_eq!(summary.stores.len(), 1);

    let text = fs::read_to_string(&out).unwrap();
    let lines: Vec<&str> = text.split("\r\n").filter(|l| !l.is_empty()).collect();
    assert!(lines[0].starts_with("S0"));
    assert_eq!(lines[1], "S1070100DEADBEEFBF");
    assert!(lines[2].starts_with("S5030001"));
    assert_eq!(lines.len(), 3, "no S9 without an entry address");

    for line in &lines {
        let bytes: Vec<u8> = (2..line.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&line[i..i + 2], 16).unwrap())
            .collect();
        let sum: u32 = bytes.iter().map(|&b| u32::from(b)).sum();
        assert_eq!(sum % 256, 0xFF, "bad checksum in {line}");
    }
    fs::remove_file(&out).unwrap();
}

#[test]
fn srec_store_with_entry_gets_s9() {
    let out = temp_path("entry.s19");
    let src = format!(
        "    ORG $0200\n    RTS\n    STORE $0200,1,\"{}\",SREC,$0200\n",
        out.display()
    );
    let mut asm = Assembler::new(Options::default());
    assert_eq!(asm.assemble_source("test.as9", &src).unwrap().errors, 0);
    let text = fs::read_to_string(&out).unwrap();
    assert!(text.contains("S9030200FA"));
    fs::remove_file(&out).unwrap();
}

#[test]
fn bin_store_header_only_with_entry() {
    let plain = temp_path("plain.bin");
    let headed = temp_path("headed.bin");
    let src = format!(
        concat!(
            "    ORG $4000\n",
            "    BYTE $12,$34\n",
            "    STORE $4000,2,\"{}\"\n",
            "    STORE $4000,2,\"{}\",BIN,$4000\n",
        ),
        plain.display(),
        headed.display()
    );
    let mut asm = Assembler::new(Options::default());
    assert_eq!(asm.assemble_source("test.as9", &src).unwrap().errors, 0);
    assert_eq!(fs::read(&plain).unwrap(), vec![0x12, 0x34]);
    assert_eq!(fs::read(&headed).unwrap(), vec![0x40, 0x00, 0x12, 0x34]);
    fs::remove_file(&plain).unwrap();
    fs::remove_file(&headed).unwrap();
}

#[test]
fn stores_suppressed_on_errors() {
    let out = temp_path("suppressed.bin");
    let src = format!(
        "    ORG 0\n    LDX #missing\n    STORE $0000,1,\"{}\"\n",
        out.display()
    );
    let mut asm = Assembler::new(Options::default());
    let summary = asm.assemble_source("test.as9", &src).unwrap();
    assert!(summary.errors > 0);
    assert!(summary.stores.is_empty());
    assert!(!out.exists());
}

#[test]
fn include_files() {
    let inc = temp_path("part.as9");
    fs::write(&inc, "    BYTE 1,2,3\n").unwrap();
    let src = format!("    ORG 0\n    INCLUDE \"{}\"\n    BYTE 4\n", inc.display());
    let mut asm = Assembler::new(Options::default());
    let summary = asm.assemble_source("test.as9", &src).unwrap();
    assert_eq!(summary.errors, 0);
    assert_eq!(&asm.image()[0..4], &[1, 2, 3, 4]);
    fs::remove_file(&inc).unwrap();
}

#[test]
fn missing_include_is_fatal() {
    let mut asm = Assembler::new(Options::default());
    let summary = asm
        .assemble_source("test.as9", "    ORG 0\n    INCLUDE \"no-such-file.as9\"\n")
        .unwrap();
    assert!(summary.errors > 0);
}

#[test]
fn load_at_pc_advances() {
    let bin = temp_path("blob.bin");
    fs::write(&bin, [0xAA, 0xBB]).unwrap();
    let src = format!("    ORG $0300\n    LOAD \"{}\"\nafter RTS\n", bin.display());
    let mut asm = Assembler::new(Options::default());
    let summary = asm.assemble_source("test.as9", &src).unwrap();
    assert_eq!(summary.errors, 0);
    assert_eq!(&asm.image()[0x300..0x303], &[0xAA, 0xBB, 0x39]);
    fs::remove_file(&bin).unwrap();
}

#[test]
fn load_at_address_keeps_pc() {
    let bin = temp_path("blob2.bin");
    fs::write(&bin, [0xCC]).unwrap();
    let src = format!(
        "    ORG $0400\n    LOAD $0500, \"{}\"\nhere RTS\n",
        bin.display()
    );
    let mut asm = Assembler::new(Options::default());
    let summary = asm.assemble_source("test.as9", &src).unwrap();
    assert_eq!(summary.errors, 0);
    assert_eq!(asm.image()[0x500], 0xCC);
    assert_eq!(asm.image()[0x400], 0x39);
    fs::remove_file(&bin).unwrap();
}
