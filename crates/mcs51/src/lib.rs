//! Instruction decode and execution core for the 8051 (MCS-51).
//!
//! The [`Cpu`] owns the register file and internal RAM. Code memory and
//! external data memory are borrowed for each [`Cpu::step`].

mod cpu;
mod error;
mod exec;
pub mod ihex;
mod instruction;
pub mod memory;
mod opcode;
mod regs;
pub mod sfr;

pub use cpu::{Config, Cpu};
pub use error::{Error, Result, Space};
pub use exec::{add_with_carry, decimal_adjust, sub_with_borrow};
pub use ihex::HexImage;
pub use instruction::{Instruction, Operand, Operands, fetch};
pub use memory::{MemoryMapper, Ram, ReadOnlyMemoryMapper, Rom};
pub use opcode::{Mnemonic, OPCODES, OpInfo, lookup};
pub use regs::RegisterFile;
