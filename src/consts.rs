//! CPU model tables: the mnemonic map, the pseudo-op keyword set and the
//! register encodings shared by the encoder.

use flagset::flags;
use num_derive::{FromPrimitive, ToPrimitive};
use phf::{phf_map, phf_set};

/// Target processor. The 6309 accepts the whole table; the 6809 rejects
/// entries tagged [`Cpu::Hd6309`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cpu {
    /// Motorola 6809 base instruction set.
    Mc6809,
    /// Hitachi 6309 extensions.
    Hd6309,
}

impl Cpu {
    /// Parses the argument of the `CPU` directive.
    pub fn from_name(name: &str) -> Option<Cpu> {
        match name {
            "6809" => Some(Cpu::Mc6809),
            "6309" => Some(Cpu::Hd6309),
            _ => None,
        }
    }
}

/// Which of the two assembly passes is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    /// Collects symbols, macros and instruction lengths.
    One,
    /// Emits bytes and the listing.
    Two,
}

/// Per-mnemonic opcodes by addressing class. `None` marks an unsupported
/// mode. Values above 0xFF carry the 0x10/0x11 prefix in their high byte.
#[derive(Debug, Clone, Copy)]
pub struct Op {
    /// Inherent (no operand).
    pub inh: Option<u16>,
    /// Immediate.
    pub imm: Option<u16>,
    /// Direct page.
    pub dir: Option<u16>,
    /// Indexed (any post-byte sub-mode).
    pub idx: Option<u16>,
    /// Extended.
    pub ext: Option<u16>,
    /// Relative branch.
    pub rel: Option<u16>,
    /// Register forms: stack lists, register pairs, TFM, bit transfers.
    pub reg: Option<u16>,
    /// CPU the mnemonic first appeared on.
    pub cpu: Cpu,
}

const fn opt(code: i32) -> Option<u16> {
    if code < 0 {
        None
    } else {
        Some(code as u16)
    }
}

const fn inh(code: u16, cpu: Cpu) -> Op {
    Op { inh: Some(code), imm: None, dir: None, idx: None, ext: None, rel: None, reg: None, cpu }
}

const fn mem(imm: i32, dir: i32, idx: i32, ext: i32, cpu: Cpu) -> Op {
    Op {
        inh: None,
        imm: opt(imm),
        dir: opt(dir),
        idx: opt(idx),
        ext: opt(ext),
        rel: None,
        reg: None,
        cpu,
    }
}

const fn immo(code: u16, cpu: Cpu) -> Op {
    Op { inh: None, imm: Some(code), dir: None, idx: None, ext: None, rel: None, reg: None, cpu }
}

const fn idxo(code: u16, cpu: Cpu) -> Op {
    Op { inh: None, imm: None, dir: None, idx: Some(code), ext: None, rel: None, reg: None, cpu }
}

const fn rel(code: u16, cpu: Cpu) -> Op {
    Op { inh: None, imm: None, dir: None, idx: None, ext: None, rel: Some(code), reg: None, cpu }
}

const fn reg(code: u16, cpu: Cpu) -> Op {
    Op { inh: None, imm: None, dir: None, idx: None, ext: None, rel: None, reg: Some(code), cpu }
}

use Cpu::Hd6309 as H;
use Cpu::Mc6809 as M;

/// The mnemonic table. Keys are upper-case.
pub static MNEMONICS: phf::Map<&'static str, Op> = phf_map! {
    // 6809 inherent
    "ABX"   => inh(0x3A, M),
    "ASLA"  => inh(0x48, M),
    "ASLB"  => inh(0x58, M),
    "ASRA"  => inh(0x47, M),
    "ASRB"  => inh(0x57, M),
    "CLRA"  => inh(0x4F, M),
    "CLRB"  => inh(0x5F, M),
    "COMA"  => inh(0x43, M),
    "COMB"  => inh(0x53, M),
    "DAA"   => inh(0x19, M),
    "DECA"  => inh(0x4A, M),
    "DECB"  => inh(0x5A, M),
    "INCA"  => inh(0x4C, M),
    "INCB"  => inh(0x5C, M),
    "LSLA"  => inh(0x48, M),
    "LSLB"  => inh(0x58, M),
    "LSRA"  => inh(0x44, M),
    "LSRB"  => inh(0x54, M),
    "MUL"   => inh(0x3D, M),
    "NEGA"  => inh(0x40, M),
    "NEGB"  => inh(0x50, M),
    "NOP"   => inh(0x12, M),
    "ROLA"  => inh(0x49, M),
    "ROLB"  => inh(0x59, M),
    "RORA"  => inh(0x46, M),
    "RORB"  => inh(0x56, M),
    "RTI"   => inh(0x3B, M),
    "RTS"   => inh(0x39, M),
    "SEX"   => inh(0x1D, M),
    "SWI"   => inh(0x3F, M),
    "SWI2"  => inh(0x103F, M),
    "SWI3"  => inh(0x113F, M),
    "SYNC"  => inh(0x13, M),
    "TSTA"  => inh(0x4D, M),
    "TSTB"  => inh(0x5D, M),

    // 6809 memory read-modify-write
    "ASL"   => mem(-1, 0x08, 0x68, 0x78, M),
    "ASR"   => mem(-1, 0x07, 0x67, 0x77, M),
    "CLR"   => mem(-1, 0x0F, 0x6F, 0x7F, M),
    "COM"   => mem(-1, 0x03, 0x63, 0x73, M),
    "DEC"   => mem(-1, 0x0A, 0x6A, 0x7A, M),
    "INC"   => mem(-1, 0x0C, 0x6C, 0x7C, M),
    "JMP"   => mem(-1, 0x0E, 0x6E, 0x7E, M),
    "JSR"   => mem(-1, 0x9D, 0xAD, 0xBD, M),
    "LSL"   => mem(-1, 0x08, 0x68, 0x78, M),
    "LSR"   => mem(-1, 0x04, 0x64, 0x74, M),
    "NEG"   => mem(-1, 0x00, 0x60, 0x70, M),
    "ROL"   => mem(-1, 0x09, 0x69, 0x79, M),
    "ROR"   => mem(-1, 0x06, 0x66, 0x76, M),
    "TST"   => mem(-1, 0x0D, 0x6D, 0x7D, M),

    // 6809 accumulator and register memory ops
    "ADCA"  => mem(0x89, 0x99, 0xA9, 0xB9, M),
    "ADCB"  => mem(0xC9, 0xD9, 0xE9, 0xF9, M),
    "ADDA"  => mem(0x8B, 0x9B, 0xAB, 0xBB, M),
    "ADDB"  => mem(0xCB, 0xDB, 0xEB, 0xFB, M),
    "ADDD"  => mem(0xC3, 0xD3, 0xE3, 0xF3, M),
    "ANDA"  => mem(0x84, 0x94, 0xA4, 0xB4, M),
    "ANDB"  => mem(0xC4, 0xD4, 0xE4, 0xF4, M),
    "BITA"  => mem(0x85, 0x95, 0xA5, 0xB5, M),
    "BITB"  => mem(0xC5, 0xD5, 0xE5, 0xF5, M),
    "CMPA"  => mem(0x81, 0x91, 0xA1, 0xB1, M),
    "CMPB"  => mem(0xC1, 0xD1, 0xE1, 0xF1, M),
    "CMPD"  => mem(0x1083, 0x1093, 0x10A3, 0x10B3, M),
    "CMPS"  => mem(0x118C, 0x119C, 0x11AC, 0x11BC, M),
    "CMPU"  => mem(0x1183, 0x1193, 0x11A3, 0x11B3, M),
    "CMPX"  => mem(0x8C, 0x9C, 0xAC, 0xBC, M),
    "CMPY"  => mem(0x108C, 0x109C, 0x10AC, 0x10BC, M),
    "EORA"  => mem(0x88, 0x98, 0xA8, 0xB8, M),
    "EORB"  => mem(0xC8, 0xD8, 0xE8, 0xF8, M),
    "LDA"   => mem(0x86, 0x96, 0xA6, 0xB6, M),
    "LDB"   => mem(0xC6, 0xD6, 0xE6, 0xF6, M),
    "LDD"   => mem(0xCC, 0xDC, 0xEC, 0xFC, M),
    "LDS"   => mem(0x10CE, 0x10DE, 0x10EE, 0x10FE, M),
    "LDU"   => mem(0xCE, 0xDE, 0xEE, 0xFE, M),
    "LDX"   => mem(0x8E, 0x9E, 0xAE, 0xBE, M),
    "LDY"   => mem(0x108E, 0x109E, 0x10AE, 0x10BE, M),
    "ORA"   => mem(0x8A, 0x9A, 0xAA, 0xBA, M),
    "ORB"   => mem(0xCA, 0xDA, 0xEA, 0xFA, M),
    "SBCA"  => mem(0x82, 0x92, 0xA2, 0xB2, M),
    "SBCB"  => mem(0xC2, 0xD2, 0xE2, 0xF2, M),
    "STA"   => mem(-1, 0x97, 0xA7, 0xB7, M),
    "STB"   => mem(-1, 0xD7, 0xE7, 0xF7, M),
    "STD"   => mem(-1, 0xDD, 0xED, 0xFD, M),
    "STS"   => mem(-1, 0x10DF, 0x10EF, 0x10FF, M),
    "STU"   => mem(-1, 0xDF, 0xEF, 0xFF, M),
    "STX"   => mem(-1, 0x9F, 0xAF, 0xBF, M),
    "STY"   => mem(-1, 0x109F, 0x10AF, 0x10BF, M),
    "SUBA"  => mem(0x80, 0x90, 0xA0, 0xB0, M),
    "SUBB"  => mem(0xC0, 0xD0, 0xE0, 0xF0, M),
    "SUBD"  => mem(0x83, 0x93, 0xA3, 0xB3, M),

    "LEAS"  => idxo(0x32, M),
    "LEAU"  => idxo(0x33, M),
    "LEAX"  => idxo(0x30, M),
    "LEAY"  => idxo(0x31, M),

    "ANDCC" => immo(0x1C, M),
    "CWAI"  => immo(0x3C, M),
    "ORCC"  => immo(0x1A, M),

    "EXG"   => reg(0x1E, M),
    "PSHS"  => reg(0x34, M),
    "PSHU"  => reg(0x36, M),
    "PULS"  => reg(0x35, M),
    "PULU"  => reg(0x37, M),
    "TFR"   => reg(0x1F, M),

    // 6809 short branches
    "BCC"   => rel(0x24, M),
    "BCS"   => rel(0x25, M),
    "BEQ"   => rel(0x27, M),
    "BGE"   => rel(0x2C, M),
    "BGT"   => rel(0x2E, M),
    "BHI"   => rel(0x22, M),
    "BHS"   => rel(0x24, M),
    "BLE"   => rel(0x2F, M),
    "BLO"   => rel(0x25, M),
    "BLS"   => rel(0x23, M),
    "BLT"   => rel(0x2D, M),
    "BMI"   => rel(0x2B, M),
    "BNE"   => rel(0x26, M),
    "BPL"   => rel(0x2A, M),
    "BRA"   => rel(0x20, M),
    "BRN"   => rel(0x21, M),
    "BSR"   => rel(0x8D, M),
    "BVC"   => rel(0x28, M),
    "BVS"   => rel(0x29, M),

    // 6809 long branches
    "LBCC"  => rel(0x1024, M),
    "LBCS"  => rel(0x1025, M),
    "LBEQ"  => rel(0x1027, M),
    "LBGE"  => rel(0x102C, M),
    "LBGT"  => rel(0x102E, M),
    "LBHI"  => rel(0x1022, M),
    "LBHS"  => rel(0x1024, M),
    "LBLE"  => rel(0x102F, M),
    "LBLO"  => rel(0x1025, M),
    "LBLS"  => rel(0x1023, M),
    "LBLT"  => rel(0x102D, M),
    "LBMI"  => rel(0x102B, M),
    "LBNE"  => rel(0x1026, M),
    "LBPL"  => rel(0x102A, M),
    "LBRA"  => rel(0x16, M),
    "LBRN"  => rel(0x1021, M),
    "LBSR"  => rel(0x17, M),
    "LBVC"  => rel(0x1028, M),
    "LBVS"  => rel(0x1029, M),

    // 6309 inherent
    "ASLD"  => inh(0x1048, H),
    "ASRD"  => inh(0x1047, H),
    "CLRD"  => inh(0x104F, H),
    "CLRE"  => inh(0x114F, H),
    "CLRF"  => inh(0x115F, H),
    "CLRW"  => inh(0x105F, H),
    "COMD"  => inh(0x1043, H),
    "COME"  => inh(0x1143, H),
    "COMF"  => inh(0x1153, H),
    "COMW"  => inh(0x1053, H),
    "DECD"  => inh(0x104A, H),
    "DECE"  => inh(0x114A, H),
    "DECF"  => inh(0x115A, H),
    "DECW"  => inh(0x105A, H),
    "INCD"  => inh(0x104C, H),
    "INCE"  => inh(0x114C, H),
    "INCF"  => inh(0x115C, H),
    "INCW"  => inh(0x105C, H),
    "LSLD"  => inh(0x1048, H),
    "LSRD"  => inh(0x1044, H),
    "LSRW"  => inh(0x1054, H),
    "NEGD"  => inh(0x1040, H),
    "PSHSW" => inh(0x1038, H),
    "PSHUW" => inh(0x103A, H),
    "PULSW" => inh(0x1039, H),
    "PULUW" => inh(0x103B, H),
    "ROLD"  => inh(0x1049, H),
    "ROLW"  => inh(0x1059, H),
    "RORD"  => inh(0x1046, H),
    "RORW"  => inh(0x1056, H),
    "SEXW"  => inh(0x14, H),
    "TSTD"  => inh(0x104D, H),
    "TSTE"  => inh(0x114D, H),
    "TSTF"  => inh(0x115D, H),
    "TSTW"  => inh(0x105D, H),

    // 6309 memory ops
    "ADCD"  => mem(0x1089, 0x1099, 0x10A9, 0x10B9, H),
    "ADDE"  => mem(0x118B, 0x119B, 0x11AB, 0x11BB, H),
    "ADDF"  => mem(0x11CB, 0x11DB, 0x11EB, 0x11FB, H),
    "ADDW"  => mem(0x108B, 0x109B, 0x10AB, 0x10BB, H),
    "ANDD"  => mem(0x1084, 0x1094, 0x10A4, 0x10B4, H),
    "BITD"  => mem(0x1085, 0x1095, 0x10A5, 0x10B5, H),
    "CMPE"  => mem(0x1181, 0x1191, 0x11A1, 0x11B1, H),
    "CMPF"  => mem(0x11C1, 0x11D1, 0x11E1, 0x11F1, H),
    "CMPW"  => mem(0x1081, 0x1091, 0x10A1, 0x10B1, H),
    "DIVD"  => mem(0x118D, 0x119D, 0x11AD, 0x11BD, H),
    "DIVQ"  => mem(0x118E, 0x119E, 0x11AE, 0x11BE, H),
    "EORD"  => mem(0x1088, 0x1098, 0x10A8, 0x10B8, H),
    "LDE"   => mem(0x1186, 0x1196, 0x11A6, 0x11B6, H),
    "LDF"   => mem(0x11C6, 0x11D6, 0x11E6, 0x11F6, H),
    "LDQ"   => mem(0xCD, 0x10DC, 0x10EC, 0x10FC, H),
    "LDW"   => mem(0x1086, 0x1096, 0x10A6, 0x10B6, H),
    "MULD"  => mem(0x118F, 0x119F, 0x11AF, 0x11BF, H),
    "ORD"   => mem(0x108A, 0x109A, 0x10AA, 0x10BA, H),
    "SBCD"  => mem(0x1082, 0x1092, 0x10A2, 0x10B2, H),
    "STE"   => mem(-1, 0x1197, 0x11A7, 0x11B7, H),
    "STF"   => mem(-1, 0x11D7, 0x11E7, 0x11F7, H),
    "STQ"   => mem(-1, 0x10DD, 0x10ED, 0x10FD, H),
    "STW"   => mem(-1, 0x1097, 0x10A7, 0x10B7, H),
    "SUBE"  => mem(0x1180, 0x1190, 0x11A0, 0x11B0, H),
    "SUBF"  => mem(0x11C0, 0x11D0, 0x11E0, 0x11F0, H),
    "SUBW"  => mem(0x1080, 0x1090, 0x10A0, 0x10B0, H),

    // 6309 immediate-to-memory
    "AIM"   => mem(-1, 0x02, 0x62, 0x72, H),
    "EIM"   => mem(-1, 0x05, 0x65, 0x75, H),
    "OIM"   => mem(-1, 0x01, 0x61, 0x71, H),
    "TIM"   => mem(-1, 0x0B, 0x6B, 0x7B, H),

    "BITMD" => immo(0x113C, H),
    "LDMD"  => immo(0x113D, H),

    // 6309 register forms
    "ADCR"  => reg(0x1031, H),
    "ADDR"  => reg(0x1030, H),
    "ANDR"  => reg(0x1034, H),
    "CMPR"  => reg(0x1037, H),
    "EORR"  => reg(0x1036, H),
    "ORR"   => reg(0x1035, H),
    "SBCR"  => reg(0x1033, H),
    "SUBR"  => reg(0x1032, H),
    "TFM"   => reg(0x1138, H),

    // 6309 register-bit transfers
    "BAND"  => reg(0x1130, H),
    "BIAND" => reg(0x1131, H),
    "BOR"   => reg(0x1132, H),
    "BIOR"  => reg(0x1133, H),
    "BEOR"  => reg(0x1134, H),
    "BIEOR" => reg(0x1135, H),
    "LDBT"  => reg(0x1136, H),
    "STBT"  => reg(0x1137, H),
};

/// The pseudo-op keyword set, upper-case. Shared by the directive
/// dispatcher and the reserved-word guard.
pub static PSEUDO_OPS: phf::Set<&'static str> = phf_set! {
    "ALIGN", "BITS", "BSS", "BYTE", "C5TO3", "CASE", "CMAP", "CPU",
    "ELSE", "END", "ENDIF", "ENDM", "ENDMOD", "ENDSUB", "ENUM", "EQU",
    "ERROR", "EXTERN", "FCB", "FDB", "FILL", "IF", "IFDEF", "IFNDEF",
    "INCLUDE", "INTERN", "LIST", "LOAD", "LONG", "MACRO", "MODULE",
    "ORG", "REAL", "RMB", "SET", "SETDP", "SIZE", "STORE", "SUBROUTINE",
    "TTL", "WORD",
};

/// Inter-register nibble codes for `EXG`/`TFR`, the 6309
/// register-register arithmetic and `TFM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive)]
pub enum IReg {
    /// A:B pair.
    D = 0,
    /// Index register X.
    X = 1,
    /// Index register Y.
    Y = 2,
    /// User stack pointer.
    U = 3,
    /// System stack pointer.
    S = 4,
    /// Program counter.
    Pc = 5,
    /// E:F pair (6309).
    W = 6,
    /// Transfer value register (6309).
    V = 7,
    /// Accumulator A.
    A = 8,
    /// Accumulator B.
    B = 9,
    /// Condition codes.
    Cc = 10,
    /// Direct page register.
    Dp = 11,
    /// The zero pseudo-register (6309); exempt from width pairing.
    Zero = 13,
    /// Accumulator E (6309).
    E = 14,
    /// Accumulator F (6309).
    F = 15,
}

impl IReg {
    /// True for the 8-bit registers. Mixing widths in a register pair is
    /// an error, except for [`IReg::Zero`].
    pub fn is_byte(self) -> bool {
        matches!(self, IReg::A | IReg::B | IReg::Cc | IReg::Dp | IReg::E | IReg::F)
    }

    /// True for registers that only exist on the 6309.
    pub fn needs_6309(self) -> bool {
        matches!(self, IReg::W | IReg::V | IReg::Zero | IReg::E | IReg::F)
    }
}

/// Register-name lookup for the inter-register nibble codes.
pub static IREGS: phf::Map<&'static str, IReg> = phf_map! {
    "D" => IReg::D,
    "X" => IReg::X,
    "Y" => IReg::Y,
    "U" => IReg::U,
    "S" => IReg::S,
    "PC" => IReg::Pc,
    "W" => IReg::W,
    "V" => IReg::V,
    "A" => IReg::A,
    "B" => IReg::B,
    "CC" => IReg::Cc,
    "DP" => IReg::Dp,
    "0" => IReg::Zero,
    "E" => IReg::E,
    "F" => IReg::F,
};

flags! {
    /// Stack-register bits for the `PSHS`/`PULS`/`PSHU`/`PULU` post-byte.
    /// `Su` stands for whichever of S/U is not the stack the instruction
    /// operates on.
    pub enum StackReg: u8 {
        /// Condition codes.
        Cc = 0x01,
        /// Accumulator A.
        A = 0x02,
        /// Accumulator B.
        B = 0x04,
        /// Direct page register.
        Dp = 0x08,
        /// Index register X.
        X = 0x10,
        /// Index register Y.
        Y = 0x20,
        /// The other stack pointer.
        Su = 0x40,
        /// Program counter.
        Pc = 0x80,
    }
}

/// Post-byte bits selecting the index register in indexed addressing.
pub fn index_reg_bits(name: &str) -> Option<u8> {
    match name {
        "X" => Some(0x00),
        "Y" => Some(0x20),
        "U" => Some(0x40),
        "S" => Some(0x60),
        _ => None,
    }
}

/// Number of opcode bytes for a table value (prefixed opcodes take two).
pub fn opcode_len(code: u16) -> usize {
    if code > 0xFF {
        2
    } else {
        1
    }
}

/// Whether a relative opcode takes a 16-bit displacement.
pub fn rel_is_long(code: u16) -> bool {
    code > 0xFF || code == 0x16 || code == 0x17
}

/// The long variant of a short branch opcode.
pub fn long_branch(code: u16) -> Option<u16> {
    match code {
        0x20 => Some(0x16),
        0x8D => Some(0x17),
        0x21..=0x2F => Some(0x1000 | code),
        _ => None,
    }
}

/// The short variant of a long branch opcode. `LBSR` has no safe short
/// rewrite and is excluded.
pub fn short_branch(code: u16) -> Option<u16> {
    match code {
        0x16 => Some(0x20),
        0x1021..=0x102F => Some(code & 0xFF),
        _ => None,
    }
}

/// Immediate operand size in bytes, derived from the register half of the
/// mnemonic's final letter. `LDMD`, `CWAI` and `BITMD` are one byte
/// regardless.
pub fn imm_size(mnemonic: &str) -> usize {
    match mnemonic {
        "LDMD" | "CWAI" | "BITMD" => 1,
        _ => match mnemonic.as_bytes()[mnemonic.len() - 1] {
            b'A' | b'B' | b'C' | b'E' | b'F' => 1,
            b'Q' => 4,
            _ => 2,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_lookup() {
        assert_eq!(MNEMONICS.get("RTS").unwrap().inh, Some(0x39));
        assert_eq!(MNEMONICS.get("LDX").unwrap().imm, Some(0x8E));
        assert_eq!(MNEMONICS.get("LBNE").unwrap().rel, Some(0x1026));
        assert_eq!(MNEMONICS.get("CMPU").unwrap().ext, Some(0x11B3));
        assert!(MNEMONICS.get("STA").unwrap().imm.is_none());
        assert_eq!(MNEMONICS.get("ADDW").unwrap().cpu, Cpu::Hd6309);
    }

    #[test]
    fn immediate_sizes() {
        assert_eq!(imm_size("LDA"), 1);
        assert_eq!(imm_size("ANDCC"), 1);
        assert_eq!(imm_size("LDX"), 2);
        assert_eq!(imm_size("SUBW"), 2);
        assert_eq!(imm_size("LDQ"), 4);
        assert_eq!(imm_size("CWAI"), 1);
        assert_eq!(imm_size("LDMD"), 1);
    }

    #[test]
    fn branch_variants() {
        assert_eq!(long_branch(0x20), Some(0x16));
        assert_eq!(long_branch(0x26), Some(0x1026));
        assert_eq!(short_branch(0x1026), Some(0x26));
        assert_eq!(short_branch(0x16), Some(0x20));
        assert_eq!(short_branch(0x17), None);
        assert!(rel_is_long(0x16));
        assert!(!rel_is_long(0x26));
    }
}
