use std::fmt;
use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// The address space a [`Error::MemoryFault`] happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Space {
    Code,
    Data,
}

impl fmt::Display for Space {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Code => write!(f, "code"),
            Self::Data => write!(f, "xdata"),
        }
    }
}

/// Errors surfaced by [`crate::Cpu::step`].
#[derive(Debug, Error)]
pub enum Error {
    #[error("unknown opcode {opcode:#04X} at {pc:#06X}")]
    UnknownOpcode { opcode: u8, pc: u16 },
    #[error("{space} memory fault accessing {len} byte(s) at {addr:#06X}")]
    MemoryFault {
        space: Space,
        addr: u64,
        len: usize,
        #[source]
        source: Option<io::Error>,
    },
    #[error("stack overflow (SP={sp:#04X})")]
    StackOverflow { sp: u8 },
    #[error("stack underflow (SP={sp:#04X})")]
    StackUnderflow { sp: u8 },
}
