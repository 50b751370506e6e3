//! Per-instruction semantics.
//!
//! [`execute`] runs one decoded instruction against a [`Context`]. Operand
//! resolution goes through [`Context::read`]/[`Context::write`], so each
//! handler only describes what the instruction computes.

use crate::cpu::Ports;
use crate::error::{Error, Result, Space};
use crate::instruction::{Instruction, Operand, read_exact};
use crate::memory::{MemoryMapper, ReadOnlyMemoryMapper};
use crate::opcode::Mnemonic;
use crate::regs::RegisterFile;
use crate::sfr::*;

/// How the program counter moves after an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    /// Fall through to the following instruction.
    Next,
    Jump(u16),
}

pub(crate) struct Context<'a, X: MemoryMapper, C: ReadOnlyMemoryMapper> {
    pub regs: &'a mut RegisterFile,
    pub ports: &'a mut Ports,
    pub xdata: &'a mut X,
    pub code: &'a C,
    pub insn: &'a Instruction,
}

impl<X: MemoryMapper, C: ReadOnlyMemoryMapper> Context<'_, X, C> {
    fn invalid(&self) -> Error {
        Error::UnknownOpcode {
            opcode: self.insn.opcode(),
            pc: self.insn.addr(),
        }
    }

    fn read_direct(&mut self, addr: u8) -> u8 {
        match addr {
            SFR_A => self.regs.a,
            SFR_B => self.regs.b,
            SFR_PSW => self.regs.psw,
            SFR_SP => self.regs.sp,
            SFR_DPL => self.regs.dpl(),
            SFR_DPH => self.regs.dph(),
            _ => match self.ports.read(addr) {
                Some(value) => value,
                None => self.regs.internal_ram[addr as usize],
            },
        }
    }

    fn write_direct(&mut self, addr: u8, value: u8) {
        match addr {
            SFR_A => self.regs.a = value,
            SFR_B => self.regs.b = value,
            SFR_PSW => self.regs.psw = value,
            SFR_SP => self.regs.sp = value,
            SFR_DPL => self.regs.dpl_set(value),
            SFR_DPH => self.regs.dph_set(value),
            _ => {
                if !self.ports.write(addr, value) {
                    self.regs.internal_ram[addr as usize] = value;
                }
            }
        }
    }

    /// Bit addresses 0x00-0x7F live in internal RAM 0x20-0x2F, 0x80-0xFF in
    /// the bit-addressable SFRs (0x80, 0x88, ... 0xF8).
    fn bit_location(bit: u8) -> (u8, u8) {
        let mask = 1 << (bit & 0x07);
        if bit < 0x80 {
            (0x20 + (bit >> 3), mask)
        } else {
            (bit & 0xF8, mask)
        }
    }

    fn read_bit(&mut self, bit: u8) -> bool {
        let (addr, mask) = Self::bit_location(bit);
        self.read_direct(addr) & mask != 0
    }

    fn write_bit(&mut self, bit: u8, value: bool) {
        let (addr, mask) = Self::bit_location(bit);
        let byte = self.read_direct(addr);
        self.write_direct(addr, if value { byte | mask } else { byte & !mask });
    }

    fn read_code(&self, addr: u16) -> Result<u8> {
        let mut buf = [0; 1];
        read_exact(self.code, &mut buf, addr as u64)?;
        Ok(buf[0])
    }

    fn read_xdata(&self, addr: u16) -> Result<u8> {
        let mut buf = [0; 1];
        match self.xdata.read_at(&mut buf, addr as u64) {
            Ok(1) => Ok(buf[0]),
            Ok(_) => Err(xdata_fault(addr, None)),
            Err(e) => Err(xdata_fault(addr, Some(e))),
        }
    }

    fn write_xdata(&mut self, addr: u16, value: u8) -> Result<()> {
        match self.xdata.write_at(&[value], addr as u64) {
            Ok(1) => Ok(()),
            Ok(_) => Err(xdata_fault(addr, None)),
            Err(e) => Err(xdata_fault(addr, Some(e))),
        }
    }

    fn read(&mut self, operand: Operand) -> Result<u8> {
        Ok(match operand {
            Operand::A => self.regs.a,
            Operand::Reg(n) => self.regs.r(n),
            Operand::Indirect(i) => self.regs.internal_ram[self.regs.indirect_address(i) as usize],
            Operand::Direct(addr) => self.read_direct(addr),
            Operand::Immediate(value) => value,
            Operand::XdataDptr => self.read_xdata(self.regs.dptr)?,
            Operand::XdataIndirect(i) => self.read_xdata(self.regs.indirect_address(i) as u16)?,
            Operand::CodeDptr => self.read_code(self.regs.dptr.wrapping_add(self.regs.a as u16))?,
            Operand::CodePc => {
                self.read_code(self.insn.next_pc().wrapping_add(self.regs.a as u16))?
            }
            _ => return Err(self.invalid()),
        })
    }

    fn write(&mut self, operand: Operand, value: u8) -> Result<()> {
        match operand {
            Operand::A => self.regs.a = value,
            Operand::Reg(n) => self.regs.r_set(n, value),
            Operand::Indirect(i) => {
                let addr = self.regs.indirect_address(i);
                self.regs.internal_ram[addr as usize] = value;
            }
            Operand::Direct(addr) => self.write_direct(addr, value),
            Operand::XdataDptr => self.write_xdata(self.regs.dptr, value)?,
            Operand::XdataIndirect(i) => {
                self.write_xdata(self.regs.indirect_address(i) as u16, value)?
            }
            _ => return Err(self.invalid()),
        }
        Ok(())
    }

    fn read_flag(&mut self, operand: Operand) -> Result<bool> {
        match operand {
            Operand::C => Ok(self.regs.psw(PSW_C)),
            Operand::Bit(bit) => Ok(self.read_bit(bit)),
            Operand::NotBit(bit) => Ok(!self.read_bit(bit)),
            _ => Err(self.invalid()),
        }
    }

    fn write_flag(&mut self, operand: Operand, value: bool) -> Result<()> {
        match operand {
            Operand::C => self.regs.psw_set(PSW_C, value),
            Operand::Bit(bit) => self.write_bit(bit, value),
            _ => return Err(self.invalid()),
        }
        Ok(())
    }

    fn set_arith_flags(&mut self, (c, ov, ac): (bool, bool, bool)) {
        self.regs.psw_set(PSW_C, c);
        self.regs.psw_set(PSW_OV, ov);
        self.regs.psw_set(PSW_AC, ac);
    }
}

fn xdata_fault(addr: u16, source: Option<std::io::Error>) -> Error {
    Error::MemoryFault {
        space: Space::Data,
        addr: addr as u64,
        len: 1,
        source,
    }
}

fn branch(taken: bool, target: u16) -> Flow {
    if taken { Flow::Jump(target) } else { Flow::Next }
}

/// Execute `insn`. The caller advances the program counter for
/// [`Flow::Next`].
pub(crate) fn execute<M: MemoryMapper, R: ReadOnlyMemoryMapper>(
    ctx: &mut Context<'_, M, R>,
) -> Result<Flow> {
    use Operand::*;

    let insn = ctx.insn;
    let operands = insn.operands();

    let flow = match (insn.mnemonic(), &operands[..]) {
        (Mnemonic::Unknown, _) => return Err(ctx.invalid()),
        (Mnemonic::Nop, []) => Flow::Next,

        // Control transfer
        (Mnemonic::Ajmp | Mnemonic::Ljmp | Mnemonic::Sjmp, &[Target(target)]) => {
            Flow::Jump(target)
        }
        (Mnemonic::Acall | Mnemonic::Lcall, &[Target(target)]) => {
            ctx.regs.push_word(insn.next_pc())?;
            Flow::Jump(target)
        }
        // No interrupt controller is modelled, so RETI has nothing to restore.
        (Mnemonic::Ret | Mnemonic::Reti, []) => Flow::Jump(ctx.regs.pop_word()?),
        (Mnemonic::Jmp, [CodeDptr]) => {
            Flow::Jump(ctx.regs.dptr.wrapping_add(ctx.regs.a as u16))
        }
        (Mnemonic::Jc, &[Target(target)]) => branch(ctx.regs.psw(PSW_C), target),
        (Mnemonic::Jnc, &[Target(target)]) => branch(!ctx.regs.psw(PSW_C), target),
        (Mnemonic::Jz, &[Target(target)]) => branch(ctx.regs.a == 0, target),
        (Mnemonic::Jnz, &[Target(target)]) => branch(ctx.regs.a != 0, target),
        (Mnemonic::Jb, &[Bit(bit), Target(target)]) => branch(ctx.read_bit(bit), target),
        (Mnemonic::Jnb, &[Bit(bit), Target(target)]) => branch(!ctx.read_bit(bit), target),
        (Mnemonic::Jbc, &[Bit(bit), Target(target)]) => {
            let set = ctx.read_bit(bit);
            if set {
                ctx.write_bit(bit, false);
            }
            branch(set, target)
        }
        (Mnemonic::Cjne, &[left, right, Target(target)]) => {
            let left = ctx.read(left)?;
            let right = ctx.read(right)?;
            ctx.regs.psw_set(PSW_C, left < right);
            branch(left != right, target)
        }
        (Mnemonic::Djnz, &[dst, Target(target)]) => {
            let value = ctx.read(dst)?.wrapping_sub(1);
            ctx.write(dst, value)?;
            branch(value != 0, target)
        }

        // Arithmetic
        (Mnemonic::Add | Mnemonic::Addc, &[A, src]) => {
            let carry = insn.mnemonic() == Mnemonic::Addc && ctx.regs.psw(PSW_C);
            let value = ctx.read(src)?;
            let (result, flags) = add_with_carry(ctx.regs.a, value, carry);
            ctx.regs.a = result;
            ctx.set_arith_flags(flags);
            Flow::Next
        }
        (Mnemonic::Subb, &[A, src]) => {
            let value = ctx.read(src)?;
            let (result, flags) = sub_with_borrow(ctx.regs.a, value, ctx.regs.psw(PSW_C));
            ctx.regs.a = result;
            ctx.set_arith_flags(flags);
            Flow::Next
        }
        (Mnemonic::Inc, [Dptr]) => {
            ctx.regs.dptr = ctx.regs.dptr.wrapping_add(1);
            Flow::Next
        }
        (Mnemonic::Inc | Mnemonic::Dec, &[dst]) => {
            let value = ctx.read(dst)?;
            let value = if insn.mnemonic() == Mnemonic::Inc {
                value.wrapping_add(1)
            } else {
                value.wrapping_sub(1)
            };
            ctx.write(dst, value)?;
            Flow::Next
        }
        (Mnemonic::Mul, [AB]) => {
            let product = ctx.regs.a as u16 * ctx.regs.b as u16;
            let [hi, lo] = product.to_be_bytes();
            ctx.regs.a = lo;
            ctx.regs.b = hi;
            ctx.regs.psw_set(PSW_C, false);
            ctx.regs.psw_set(PSW_OV, product > 0xFF);
            Flow::Next
        }
        (Mnemonic::Div, [AB]) => {
            // Division by zero leaves A and B untouched.
            let (a, b) = (ctx.regs.a, ctx.regs.b);
            if let (Some(quotient), Some(remainder)) = (a.checked_div(b), a.checked_rem(b)) {
                ctx.regs.a = quotient;
                ctx.regs.b = remainder;
            }
            ctx.regs.psw_set(PSW_C, false);
            ctx.regs.psw_set(PSW_OV, b == 0);
            Flow::Next
        }
        (Mnemonic::Da, [A]) => {
            let (a, c) = decimal_adjust(ctx.regs.a, ctx.regs.psw(PSW_C), ctx.regs.psw(PSW_AC));
            ctx.regs.a = a;
            ctx.regs.psw_set(PSW_C, c);
            Flow::Next
        }

        // Logic
        (Mnemonic::Anl, &[C, src]) => {
            let value = ctx.regs.psw(PSW_C) & ctx.read_flag(src)?;
            ctx.regs.psw_set(PSW_C, value);
            Flow::Next
        }
        (Mnemonic::Orl, &[C, src]) => {
            let value = ctx.regs.psw(PSW_C) | ctx.read_flag(src)?;
            ctx.regs.psw_set(PSW_C, value);
            Flow::Next
        }
        (Mnemonic::Anl | Mnemonic::Orl | Mnemonic::Xrl, &[dst, src]) => {
            let right = ctx.read(src)?;
            let left = ctx.read(dst)?;
            let value = match insn.mnemonic() {
                Mnemonic::Anl => left & right,
                Mnemonic::Orl => left | right,
                _ => left ^ right,
            };
            ctx.write(dst, value)?;
            Flow::Next
        }
        (Mnemonic::Clr, [A]) => {
            ctx.regs.a = 0;
            Flow::Next
        }
        (Mnemonic::Cpl, [A]) => {
            ctx.regs.a = !ctx.regs.a;
            Flow::Next
        }
        (Mnemonic::Clr | Mnemonic::Setb, &[bit]) => {
            ctx.write_flag(bit, insn.mnemonic() == Mnemonic::Setb)?;
            Flow::Next
        }
        (Mnemonic::Cpl, &[bit]) => {
            let value = ctx.read_flag(bit)?;
            ctx.write_flag(bit, !value)?;
            Flow::Next
        }
        (Mnemonic::Rl, [A]) => {
            ctx.regs.a = ctx.regs.a.rotate_left(1);
            Flow::Next
        }
        (Mnemonic::Rr, [A]) => {
            ctx.regs.a = ctx.regs.a.rotate_right(1);
            Flow::Next
        }
        (Mnemonic::Rlc, [A]) => {
            let a = ctx.regs.a;
            ctx.regs.a = (a << 1) | ctx.regs.psw(PSW_C) as u8;
            ctx.regs.psw_set(PSW_C, a & 0x80 != 0);
            Flow::Next
        }
        (Mnemonic::Rrc, [A]) => {
            let a = ctx.regs.a;
            ctx.regs.a = (a >> 1) | (ctx.regs.psw(PSW_C) as u8) << 7;
            ctx.regs.psw_set(PSW_C, a & 0x01 != 0);
            Flow::Next
        }
        (Mnemonic::Swap, [A]) => {
            ctx.regs.a = ctx.regs.a.rotate_left(4);
            Flow::Next
        }

        // Data transfer
        (Mnemonic::Mov, &[Dptr, Immediate16(value)]) => {
            ctx.regs.dptr = value;
            Flow::Next
        }
        (Mnemonic::Mov, &[C, Bit(bit)]) => {
            let value = ctx.read_bit(bit);
            ctx.regs.psw_set(PSW_C, value);
            Flow::Next
        }
        (Mnemonic::Mov, &[Bit(bit), C]) => {
            let carry = ctx.regs.psw(PSW_C);
            ctx.write_bit(bit, carry);
            Flow::Next
        }
        (Mnemonic::Mov | Mnemonic::Movc | Mnemonic::Movx, &[dst, src]) => {
            let value = ctx.read(src)?;
            ctx.write(dst, value)?;
            Flow::Next
        }
        (Mnemonic::Push, &[Direct(addr)]) => {
            let value = ctx.read_direct(addr);
            ctx.regs.push_byte(value)?;
            Flow::Next
        }
        (Mnemonic::Pop, &[Direct(addr)]) => {
            let value = ctx.regs.pop_byte()?;
            ctx.write_direct(addr, value);
            Flow::Next
        }
        (Mnemonic::Xch, &[A, src]) => {
            let (a, value) = (ctx.regs.a, ctx.read(src)?);
            ctx.write(src, a)?;
            ctx.regs.a = value;
            Flow::Next
        }
        (Mnemonic::Xchd, &[A, Indirect(i)]) => {
            let addr = ctx.regs.indirect_address(i) as usize;
            let (a, m) = (ctx.regs.a, ctx.regs.internal_ram[addr]);
            ctx.regs.a = (a & 0xF0) | (m & 0x0F);
            ctx.regs.internal_ram[addr] = (m & 0xF0) | (a & 0x0F);
            Flow::Next
        }

        _ => return Err(ctx.invalid()),
    };
    Ok(flow)
}

/// Returns the 8-bit sum and `(C, OV, AC)`.
#[inline(always)]
pub fn add_with_carry(a: u8, b: u8, carry: bool) -> (u8, (bool, bool, bool)) {
    let c = carry as u8;
    let sum = a as u16 + b as u16 + c as u16;
    let ac = (a & 0x0F) + (b & 0x0F) + c > 0x0F;
    let c6 = (a & 0x7F) + (b & 0x7F) + c > 0x7F;
    let c7 = sum > 0xFF;
    (sum as u8, (c7, c6 ^ c7, ac))
}

/// Returns the 8-bit difference and `(C, OV, AC)`, each flag being a borrow.
#[inline(always)]
pub fn sub_with_borrow(a: u8, b: u8, borrow: bool) -> (u8, (bool, bool, bool)) {
    let c = borrow as u8;
    let diff = a as i16 - b as i16 - c as i16;
    let ac = (a & 0x0F) < (b & 0x0F) + c;
    let b6 = (a & 0x7F) < (b & 0x7F) + c;
    let b7 = diff < 0;
    (diff as u8, (b7, b6 ^ b7, ac))
}

/// `DA A`: adjust the accumulator to packed BCD after an addition. Carry is
/// set if the result exceeds 99 and is never cleared.
#[inline(always)]
pub fn decimal_adjust(a: u8, carry: bool, aux_carry: bool) -> (u8, bool) {
    let mut value = a as u16;
    if value & 0x0F > 0x09 || aux_carry {
        value += 0x06;
    }
    if value & 0x1F0 > 0x090 || carry {
        value += 0x60;
    }
    (value as u8, carry || value > 0xFF)
}
