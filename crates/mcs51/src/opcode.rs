//! The fixed 256-entry opcode map of the base 8051 instruction set.
//!
//! Every opcode byte maps to a [`Mnemonic`] and the total encoded length of
//! the instruction (opcode plus operand bytes). Operand interpretation is
//! left to [`crate::Instruction::operands`], which derives it from the opcode
//! bit patterns.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mnemonic {
    Acall,
    Add,
    Addc,
    Ajmp,
    Anl,
    Cjne,
    Clr,
    Cpl,
    Da,
    Dec,
    Div,
    Djnz,
    Inc,
    Jb,
    Jbc,
    Jc,
    Jmp,
    Jnb,
    Jnc,
    Jnz,
    Jz,
    Lcall,
    Ljmp,
    Mov,
    Movc,
    Movx,
    Mul,
    Nop,
    Orl,
    Pop,
    Push,
    Ret,
    Reti,
    Rl,
    Rlc,
    Rr,
    Rrc,
    Setb,
    Sjmp,
    Subb,
    Swap,
    Xch,
    Xchd,
    Xrl,
    /// Opcode `0xA5`, undefined on the base part.
    Unknown,
}

impl Mnemonic {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Acall => "ACALL",
            Self::Add => "ADD",
            Self::Addc => "ADDC",
            Self::Ajmp => "AJMP",
            Self::Anl => "ANL",
            Self::Cjne => "CJNE",
            Self::Clr => "CLR",
            Self::Cpl => "CPL",
            Self::Da => "DA",
            Self::Dec => "DEC",
            Self::Div => "DIV",
            Self::Djnz => "DJNZ",
            Self::Inc => "INC",
            Self::Jb => "JB",
            Self::Jbc => "JBC",
            Self::Jc => "JC",
            Self::Jmp => "JMP",
            Self::Jnb => "JNB",
            Self::Jnc => "JNC",
            Self::Jnz => "JNZ",
            Self::Jz => "JZ",
            Self::Lcall => "LCALL",
            Self::Ljmp => "LJMP",
            Self::Mov => "MOV",
            Self::Movc => "MOVC",
            Self::Movx => "MOVX",
            Self::Mul => "MUL",
            Self::Nop => "NOP",
            Self::Orl => "ORL",
            Self::Pop => "POP",
            Self::Push => "PUSH",
            Self::Ret => "RET",
            Self::Reti => "RETI",
            Self::Rl => "RL",
            Self::Rlc => "RLC",
            Self::Rr => "RR",
            Self::Rrc => "RRC",
            Self::Setb => "SETB",
            Self::Sjmp => "SJMP",
            Self::Subb => "SUBB",
            Self::Swap => "SWAP",
            Self::Xch => "XCH",
            Self::Xchd => "XCHD",
            Self::Xrl => "XRL",
            Self::Unknown => "???",
        }
    }
}

impl fmt::Display for Mnemonic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shape of a single opcode: what it is and how many bytes it occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpInfo {
    pub mnemonic: Mnemonic,
    pub len: u8,
}

macro_rules! opcode_table {
    ($($mnemonic:ident $len:literal),* $(,)?) => {
        [$(OpInfo { mnemonic: Mnemonic::$mnemonic, len: $len }),*]
    };
}

/// Indexed by opcode byte. One row per high nibble.
#[rustfmt::skip]
pub static OPCODES: [OpInfo; 256] = opcode_table![
    Nop 1,  Ajmp 2,  Ljmp 3,  Rr 1,    Inc 1,  Inc 2,  Inc 1,  Inc 1,  Inc 1,  Inc 1,  Inc 1,  Inc 1,  Inc 1,  Inc 1,  Inc 1,  Inc 1,
    Jbc 3,  Acall 2, Lcall 3, Rrc 1,   Dec 1,  Dec 2,  Dec 1,  Dec 1,  Dec 1,  Dec 1,  Dec 1,  Dec 1,  Dec 1,  Dec 1,  Dec 1,  Dec 1,
    Jb 3,   Ajmp 2,  Ret 1,   Rl 1,    Add 2,  Add 2,  Add 1,  Add 1,  Add 1,  Add 1,  Add 1,  Add 1,  Add 1,  Add 1,  Add 1,  Add 1,
    Jnb 3,  Acall 2, Reti 1,  Rlc 1,   Addc 2, Addc 2, Addc 1, Addc 1, Addc 1, Addc 1, Addc 1, Addc 1, Addc 1, Addc 1, Addc 1, Addc 1,
    Jc 2,   Ajmp 2,  Orl 2,   Orl 3,   Orl 2,  Orl 2,  Orl 1,  Orl 1,  Orl 1,  Orl 1,  Orl 1,  Orl 1,  Orl 1,  Orl 1,  Orl 1,  Orl 1,
    Jnc 2,  Acall 2, Anl 2,   Anl 3,   Anl 2,  Anl 2,  Anl 1,  Anl 1,  Anl 1,  Anl 1,  Anl 1,  Anl 1,  Anl 1,  Anl 1,  Anl 1,  Anl 1,
    Jz 2,   Ajmp 2,  Xrl 2,   Xrl 3,   Xrl 2,  Xrl 2,  Xrl 1,  Xrl 1,  Xrl 1,  Xrl 1,  Xrl 1,  Xrl 1,  Xrl 1,  Xrl 1,  Xrl 1,  Xrl 1,
    Jnz 2,  Acall 2, Orl 2,   Jmp 1,   Mov 2,  Mov 3,  Mov 2,  Mov 2,  Mov 2,  Mov 2,  Mov 2,  Mov 2,  Mov 2,  Mov 2,  Mov 2,  Mov 2,
    Sjmp 2, Ajmp 2,  Anl 2,   Movc 1,  Div 1,  Mov 3,  Mov 2,  Mov 2,  Mov 2,  Mov 2,  Mov 2,  Mov 2,  Mov 2,  Mov 2,  Mov 2,  Mov 2,
    Mov 3,  Acall 2, Mov 2,   Movc 1,  Subb 2, Subb 2, Subb 1, Subb 1, Subb 1, Subb 1, Subb 1, Subb 1, Subb 1, Subb 1, Subb 1, Subb 1,
    Orl 2,  Ajmp 2,  Mov 2,   Inc 1,   Mul 1,  Unknown 1, Mov 2, Mov 2, Mov 2, Mov 2,  Mov 2,  Mov 2,  Mov 2,  Mov 2,  Mov 2,  Mov 2,
    Anl 2,  Acall 2, Cpl 2,   Cpl 1,   Cjne 3, Cjne 3, Cjne 3, Cjne 3, Cjne 3, Cjne 3, Cjne 3, Cjne 3, Cjne 3, Cjne 3, Cjne 3, Cjne 3,
    Push 2, Ajmp 2,  Clr 2,   Clr 1,   Swap 1, Xch 2,  Xch 1,  Xch 1,  Xch 1,  Xch 1,  Xch 1,  Xch 1,  Xch 1,  Xch 1,  Xch 1,  Xch 1,
    Pop 2,  Acall 2, Setb 2,  Setb 1,  Da 1,   Djnz 3, Xchd 1, Xchd 1, Djnz 2, Djnz 2, Djnz 2, Djnz 2, Djnz 2, Djnz 2, Djnz 2, Djnz 2,
    Movx 1, Ajmp 2,  Movx 1,  Movx 1,  Clr 1,  Mov 2,  Mov 1,  Mov 1,  Mov 1,  Mov 1,  Mov 1,  Mov 1,  Mov 1,  Mov 1,  Mov 1,  Mov 1,
    Movx 1, Acall 2, Movx 1,  Movx 1,  Cpl 1,  Mov 2,  Mov 1,  Mov 1,  Mov 1,  Mov 1,  Mov 1,  Mov 1,  Mov 1,  Mov 1,  Mov 1,  Mov 1,
];

const _: () = {
    let mut i = 0;
    while i < OPCODES.len() {
        let len = OPCODES[i].len;
        assert!(len >= 1 && len <= 3, "instruction length out of range");
        i += 1;
    }
};

/// Look up the mnemonic and encoded length of an opcode byte.
#[inline(always)]
pub fn lookup(opcode: u8) -> OpInfo {
    OPCODES[opcode as usize]
}
