use std::fmt;
use std::ops::Deref;

use crate::error::{Error, Result, Space};
use crate::memory::ReadOnlyMemoryMapper;
use crate::opcode::{self, Mnemonic, OpInfo};
use crate::sfr::sfr_name;

/// A resolved instruction operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    /// The accumulator, implied by the opcode.
    A,
    /// The `A`/`B` pair used by `MUL` and `DIV`.
    AB,
    /// The carry flag as a bit operand.
    C,
    Dptr,
    /// `Rn` in the active bank.
    Reg(u8),
    /// `@R0`/`@R1` into internal RAM.
    Indirect(u8),
    /// Internal RAM below `0x80`, SFR space above.
    Direct(u8),
    Immediate(u8),
    Immediate16(u16),
    Bit(u8),
    /// Complemented bit source, `/bit`.
    NotBit(u8),
    /// `@DPTR` into external data memory.
    XdataDptr,
    /// `@R0`/`@R1` into external data memory.
    XdataIndirect(u8),
    /// `@A+DPTR`, in code memory or as a jump target.
    CodeDptr,
    /// `@A+PC` in code memory, relative to the following instruction.
    CodePc,
    /// A jump or call target with relative, page and long forms already
    /// resolved against the address of the following instruction.
    Target(u16),
}

/// Up to three operands, destination first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operands {
    items: [Operand; 3],
    len: usize,
}

impl Operands {
    fn new(operands: &[Operand]) -> Self {
        let mut items = [Operand::A; 3];
        items[..operands.len()].copy_from_slice(operands);
        Self {
            items,
            len: operands.len(),
        }
    }
}

impl Deref for Operands {
    type Target = [Operand];
    fn deref(&self) -> &[Operand] {
        &self.items[..self.len]
    }
}

/// One decoded instruction: where it was fetched from and its raw bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    addr: u16,
    bytes: [u8; 3],
    info: OpInfo,
}

/// Read one instruction from code memory at `offset`.
pub fn fetch(code: &impl ReadOnlyMemoryMapper, offset: u16) -> Result<Instruction> {
    let mut bytes = [0; 3];
    read_exact(code, &mut bytes[..1], offset as u64)?;
    let info = opcode::lookup(bytes[0]);
    let len = info.len as usize;
    if len > 1 {
        // Operands wrap around the 16-bit code space like the PC does.
        let start = offset.wrapping_add(1);
        let operands = &mut bytes[1..len];
        let before_wrap = (0x10000 - start as usize).min(operands.len());
        let (head, wrapped) = operands.split_at_mut(before_wrap);
        read_exact(code, head, start as u64)?;
        if !wrapped.is_empty() {
            read_exact(code, wrapped, 0)?;
        }
    }
    Ok(Instruction {
        addr: offset,
        bytes,
        info,
    })
}

pub(crate) fn read_exact(
    code: &impl ReadOnlyMemoryMapper,
    buf: &mut [u8],
    offset: u64,
) -> Result<()> {
    let len = buf.len();
    let fault = |source| Error::MemoryFault {
        space: Space::Code,
        addr: offset,
        len,
        source,
    };
    match code.read_at(buf, offset) {
        Ok(n) if n == len => Ok(()),
        Ok(_) => Err(fault(None)),
        Err(e) => Err(fault(Some(e))),
    }
}

impl Instruction {
    /// Build an instruction from raw bytes, as if fetched from `addr`.
    /// Returns `None` if `bytes` is shorter than the opcode's encoding.
    pub fn from_bytes(addr: u16, bytes: &[u8]) -> Option<Self> {
        let info = opcode::lookup(*bytes.first()?);
        let mut raw = [0; 3];
        raw[..info.len as usize].copy_from_slice(bytes.get(..info.len as usize)?);
        Some(Self {
            addr,
            bytes: raw,
            info,
        })
    }

    pub fn addr(&self) -> u16 {
        self.addr
    }

    pub fn opcode(&self) -> u8 {
        self.bytes[0]
    }

    pub fn mnemonic(&self) -> Mnemonic {
        self.info.mnemonic
    }

    pub fn len(&self) -> u8 {
        self.info.len
    }

    /// The full encoding, opcode included.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes[..self.info.len as usize]
    }

    /// The operand bytes following the opcode.
    pub fn operand_bytes(&self) -> &[u8] {
        &self.bytes[1..self.info.len as usize]
    }

    /// Address of the instruction that follows this one.
    pub fn next_pc(&self) -> u16 {
        self.addr.wrapping_add(self.info.len as u16)
    }

    /// The operand selected by the low nibble in the regular arithmetic
    /// columns: `#data`, `direct`, `@Ri`, `Rn`.
    fn column_operand(&self) -> Operand {
        let op = self.opcode();
        match op & 0x0F {
            0x04 => Operand::Immediate(self.bytes[1]),
            0x05 => Operand::Direct(self.bytes[1]),
            0x06 | 0x07 => Operand::Indirect(op & 0x01),
            _ => Operand::Reg(op & 0x07),
        }
    }

    fn relative(&self, displacement: u8) -> Operand {
        Operand::Target(self.next_pc().wrapping_add(displacement as i8 as u16))
    }

    /// Decode the operands from the opcode bit patterns.
    pub fn operands(&self) -> Operands {
        use Operand::*;

        let op = self.opcode();
        let [_, b1, b2] = self.bytes;
        let ops = |list: &[Operand]| Operands::new(list);

        match self.mnemonic() {
            Mnemonic::Nop | Mnemonic::Ret | Mnemonic::Reti | Mnemonic::Unknown => ops(&[]),
            Mnemonic::Ajmp | Mnemonic::Acall => {
                let offset = ((op as u16 & 0xE0) << 3) | b1 as u16;
                ops(&[Target((self.next_pc() & 0xF800) | offset)])
            }
            Mnemonic::Ljmp | Mnemonic::Lcall => ops(&[Target(u16::from_be_bytes([b1, b2]))]),
            Mnemonic::Sjmp | Mnemonic::Jc | Mnemonic::Jnc | Mnemonic::Jz | Mnemonic::Jnz => {
                ops(&[self.relative(b1)])
            }
            Mnemonic::Jb | Mnemonic::Jnb | Mnemonic::Jbc => ops(&[Bit(b1), self.relative(b2)]),
            Mnemonic::Jmp => ops(&[CodeDptr]),
            Mnemonic::Rl
            | Mnemonic::Rlc
            | Mnemonic::Rr
            | Mnemonic::Rrc
            | Mnemonic::Swap
            | Mnemonic::Da => ops(&[A]),
            Mnemonic::Mul | Mnemonic::Div => ops(&[AB]),
            Mnemonic::Inc | Mnemonic::Dec => match op {
                0xA3 => ops(&[Dptr]),
                0x04 | 0x14 => ops(&[A]),
                _ => ops(&[self.column_operand()]),
            },
            Mnemonic::Add | Mnemonic::Addc | Mnemonic::Subb | Mnemonic::Xch => {
                ops(&[A, self.column_operand()])
            }
            Mnemonic::Xchd => ops(&[A, Indirect(op & 0x01)]),
            Mnemonic::Anl | Mnemonic::Orl | Mnemonic::Xrl => match op {
                0x72 | 0x82 => ops(&[C, Bit(b1)]),
                0xA0 | 0xB0 => ops(&[C, NotBit(b1)]),
                _ if op & 0x0F == 0x02 => ops(&[Direct(b1), A]),
                _ if op & 0x0F == 0x03 => ops(&[Direct(b1), Immediate(b2)]),
                _ => ops(&[A, self.column_operand()]),
            },
            Mnemonic::Cjne => match op & 0x0F {
                0x04 => ops(&[A, Immediate(b1), self.relative(b2)]),
                0x05 => ops(&[A, Direct(b1), self.relative(b2)]),
                0x06 | 0x07 => ops(&[Indirect(op & 0x01), Immediate(b1), self.relative(b2)]),
                _ => ops(&[Reg(op & 0x07), Immediate(b1), self.relative(b2)]),
            },
            Mnemonic::Djnz => match op {
                0xD5 => ops(&[Direct(b1), self.relative(b2)]),
                _ => ops(&[Reg(op & 0x07), self.relative(b1)]),
            },
            Mnemonic::Clr | Mnemonic::Setb | Mnemonic::Cpl => match op & 0x0F {
                0x04 => ops(&[A]),
                0x03 => ops(&[C]),
                _ => ops(&[Bit(b1)]),
            },
            Mnemonic::Push | Mnemonic::Pop => ops(&[Direct(b1)]),
            Mnemonic::Movc => match op {
                0x83 => ops(&[A, CodePc]),
                _ => ops(&[A, CodeDptr]),
            },
            Mnemonic::Movx => match op {
                0xE0 => ops(&[A, XdataDptr]),
                0xE2 | 0xE3 => ops(&[A, XdataIndirect(op & 0x01)]),
                0xF0 => ops(&[XdataDptr, A]),
                _ => ops(&[XdataIndirect(op & 0x01), A]),
            },
            Mnemonic::Mov => match op {
                0x74 => ops(&[A, Immediate(b1)]),
                0x75 => ops(&[Direct(b1), Immediate(b2)]),
                0x76 | 0x77 => ops(&[Indirect(op & 0x01), Immediate(b1)]),
                0x78..=0x7F => ops(&[Reg(op & 0x07), Immediate(b1)]),
                // Source is encoded before destination.
                0x85 => ops(&[Direct(b2), Direct(b1)]),
                0x86 | 0x87 => ops(&[Direct(b1), Indirect(op & 0x01)]),
                0x88..=0x8F => ops(&[Direct(b1), Reg(op & 0x07)]),
                0x90 => ops(&[Dptr, Immediate16(u16::from_be_bytes([b1, b2]))]),
                0x92 => ops(&[Bit(b1), C]),
                0xA2 => ops(&[C, Bit(b1)]),
                0xA6 | 0xA7 => ops(&[Indirect(op & 0x01), Direct(b1)]),
                0xA8..=0xAF => ops(&[Reg(op & 0x07), Direct(b1)]),
                0xF5 => ops(&[Direct(b1), A]),
                0xF6 | 0xF7 => ops(&[Indirect(op & 0x01), A]),
                0xF8..=0xFF => ops(&[Reg(op & 0x07), A]),
                _ => ops(&[A, self.column_operand()]),
            },
        }
    }
}

fn fmt_bit(f: &mut fmt::Formatter<'_>, bit: u8) -> fmt::Result {
    if bit < 0x80 {
        write!(f, "{:02X}H.{}", 0x20 + (bit >> 3), bit & 0x07)
    } else {
        match sfr_name(bit & 0xF8) {
            Some(name) => write!(f, "{name}.{}", bit & 0x07),
            None => write!(f, "{:02X}H.{}", bit & 0xF8, bit & 0x07),
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::A => write!(f, "A"),
            Self::AB => write!(f, "AB"),
            Self::C => write!(f, "C"),
            Self::Dptr => write!(f, "DPTR"),
            Self::Reg(n) => write!(f, "R{n}"),
            Self::Indirect(i) | Self::XdataIndirect(i) => write!(f, "@R{i}"),
            Self::Direct(addr) if addr >= 0x80 => match sfr_name(addr) {
                Some(name) => f.write_str(name),
                None => write!(f, "{addr:02X}H"),
            },
            Self::Direct(addr) => write!(f, "{addr:02X}H"),
            Self::Immediate(value) => write!(f, "#{value:02X}H"),
            Self::Immediate16(value) => write!(f, "#{value:04X}H"),
            Self::Bit(bit) => fmt_bit(f, bit),
            Self::NotBit(bit) => {
                f.write_str("/")?;
                fmt_bit(f, bit)
            }
            Self::XdataDptr => write!(f, "@DPTR"),
            Self::CodeDptr => write!(f, "@A+DPTR"),
            Self::CodePc => write!(f, "@A+PC"),
            Self::Target(addr) => write!(f, "{addr:04X}H"),
        }
    }
}

impl fmt::Display for Instruction {
    /// Assembly text. The alternate form (`{:#}`) prefixes the address and
    /// raw bytes.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            let bytes = self
                .bytes()
                .iter()
                .map(|b| format!("{b:02X}"))
                .collect::<Vec<_>>()
                .join(" ");
            write!(f, "{:04X}: {bytes:9} ", self.addr)?;
        }
        write!(f, "{}", self.mnemonic())?;
        for (i, operand) in self.operands().iter().enumerate() {
            f.write_str(if i == 0 { " " } else { "," })?;
            write!(f, "{operand}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Rom;

    fn disasm(addr: u16, bytes: &[u8]) -> String {
        Instruction::from_bytes(addr, bytes).unwrap().to_string()
    }

    #[test]
    fn fetch_reads_operands() {
        let rom = Rom::new(vec![0x00, 0x12, 0x12, 0x34]);
        let insn = fetch(&rom, 1).unwrap();
        assert_eq!(insn.mnemonic(), Mnemonic::Lcall);
        assert_eq!(insn.len(), 3);
        assert_eq!(insn.bytes(), &[0x12, 0x12, 0x34]);
        assert_eq!(insn.operand_bytes(), &[0x12, 0x34]);
        assert_eq!(insn.next_pc(), 4);
    }

    #[test]
    fn fetch_faults_on_short_operands() {
        let rom = Rom::new(vec![0x02, 0x12]);
        assert!(matches!(
            fetch(&rom, 0),
            Err(Error::MemoryFault {
                space: Space::Code,
                addr: 1,
                len: 2,
                source: None
            })
        ));
        assert!(matches!(
            fetch(&rom, 2),
            Err(Error::MemoryFault { addr: 2, len: 1, .. })
        ));
    }

    #[test]
    fn fetch_wraps_at_the_top_of_code_space() {
        let mut image = vec![0; 0x10000];
        image[0xFFFF] = 0x74;
        image[0x0000] = 0x55;
        let insn = fetch(&Rom::new(image.clone()), 0xFFFF).unwrap();
        assert_eq!(insn.bytes(), &[0x74, 0x55]);
        assert_eq!(insn.next_pc(), 0x0001);

        image[0xFFFE] = 0x02;
        image[0xFFFF] = 0x12;
        image[0x0000] = 0x34;
        let insn = fetch(&Rom::new(image), 0xFFFE).unwrap();
        assert_eq!(insn.operands()[0], Operand::Target(0x1234));
    }

    #[test]
    fn fetch_surfaces_io_errors() {
        struct Broken;
        impl ReadOnlyMemoryMapper for Broken {
            fn read_at(&self, _buf: &mut [u8], _offset: u64) -> std::io::Result<usize> {
                Err(std::io::Error::other("bus error"))
            }
            fn size(&self) -> u64 {
                0x10000
            }
        }
        assert!(matches!(
            fetch(&Broken, 0),
            Err(Error::MemoryFault {
                source: Some(_),
                ..
            })
        ));
    }

    #[test]
    fn page_absolute_targets() {
        let insn = Instruction::from_bytes(0x07FE, &[0x01, 0x00]).unwrap();
        assert_eq!(insn.operands()[0], Operand::Target(0x0800));
        // ACALL with all eleven offset bits set.
        let insn = Instruction::from_bytes(0x1234, &[0xF1, 0xFF]).unwrap();
        assert_eq!(insn.operands()[0], Operand::Target(0x17FF));
    }

    #[test]
    fn relative_targets() {
        let insn = Instruction::from_bytes(0x0100, &[0x80, 0xFE]).unwrap();
        assert_eq!(insn.operands()[0], Operand::Target(0x0100));
        let insn = Instruction::from_bytes(0x0100, &[0xB4, 0x10, 0x05]).unwrap();
        assert_eq!(
            &insn.operands()[..],
            &[
                Operand::A,
                Operand::Immediate(0x10),
                Operand::Target(0x0108)
            ]
        );
    }

    #[test]
    fn mov_direct_direct_operand_order() {
        let insn = Instruction::from_bytes(0, &[0x85, 0x30, 0x40]).unwrap();
        assert_eq!(
            &insn.operands()[..],
            &[Operand::Direct(0x40), Operand::Direct(0x30)]
        );
    }

    #[test]
    fn disassembly() {
        assert_eq!(disasm(0, &[0x24, 0x01]), "ADD A,#01H");
        assert_eq!(disasm(0, &[0x2F]), "ADD A,R7");
        assert_eq!(disasm(0, &[0x36]), "ADDC A,@R0");
        assert_eq!(disasm(0, &[0xF5, 0x90]), "MOV P1,A");
        assert_eq!(disasm(0, &[0x75, 0x30, 0xAA]), "MOV 30H,#AAH");
        assert_eq!(disasm(0x0100, &[0x80, 0x00]), "SJMP 0102H");
        assert_eq!(disasm(0, &[0x90, 0x12, 0x34]), "MOV DPTR,#1234H");
        assert_eq!(disasm(0, &[0xD2, 0xD7]), "SETB PSW.7");
        assert_eq!(disasm(0, &[0xB0, 0x01]), "ANL C,/20H.1");
        assert_eq!(disasm(0, &[0x93]), "MOVC A,@A+DPTR");
        assert_eq!(disasm(0, &[0xE2]), "MOVX A,@R0");
        assert_eq!(disasm(0, &[0xA4]), "MUL AB");
        assert_eq!(disasm(0, &[0x22]), "RET");
        assert_eq!(disasm(0, &[0xA5]), "???");
        assert_eq!(
            format!("{:#}", Instruction::from_bytes(0x10, &[0x12, 0x01, 0x00]).unwrap()),
            "0010: 12 01 00  LCALL 0100H"
        );
    }
}
