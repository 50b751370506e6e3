use std::collections::BTreeMap;
use std::fmt;
use std::ops::RangeInclusive;

use tracing::{debug, trace, warn};

use crate::error::Result;
use crate::exec::{self, Context, Flow};
use crate::instruction::{self, Instruction};
use crate::memory::{MemoryMapper, ReadOnlyMemoryMapper};
use crate::regs::RegisterFile;
use crate::sfr::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Direct addresses routed to port callbacks when one is registered.
    pub sfr_window: RangeInclusive<u8>,
    /// Stack pointer value after reset.
    pub reset_sp: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sfr_window: SFR_BASE..=0xFF,
            reset_sp: 0x07,
        }
    }
}

type InputCallback = Box<dyn FnMut() -> u8>;
type OutputCallback = Box<dyn FnMut(u8)>;

/// Per-address port callbacks for the SFR window.
///
/// The core SFRs (`A`, `B`, `PSW`, `SP`, `DPL`, `DPH`) never reach here.
pub(crate) struct Ports {
    window: RangeInclusive<u8>,
    inputs: BTreeMap<u8, InputCallback>,
    outputs: BTreeMap<u8, OutputCallback>,
}

impl Ports {
    fn new(window: RangeInclusive<u8>) -> Self {
        Self {
            window,
            inputs: BTreeMap::new(),
            outputs: BTreeMap::new(),
        }
    }

    /// Whether a callback registered at `addr` can ever be reached.
    pub(crate) fn routes(&self, addr: u8) -> bool {
        self.window.contains(&addr)
            && !matches!(addr, SFR_A | SFR_B | SFR_PSW | SFR_SP | SFR_DPL | SFR_DPH)
    }

    /// Returns `None` if no input callback covers `addr`.
    pub(crate) fn read(&mut self, addr: u8) -> Option<u8> {
        if !self.window.contains(&addr) {
            return None;
        }
        let value = self.inputs.get_mut(&addr).map(|input| input())?;
        debug!("port read {addr:02X} -> {value:02X}");
        Some(value)
    }

    /// Returns `false` if no output callback covers `addr`.
    pub(crate) fn write(&mut self, addr: u8, value: u8) -> bool {
        if !self.window.contains(&addr) {
            return false;
        }
        match self.outputs.get_mut(&addr) {
            Some(output) => {
                debug!("port write {addr:02X} <- {value:02X}");
                output(value);
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for Ports {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ports")
            .field("window", &self.window)
            .field("inputs", &self.inputs.keys().collect::<Vec<_>>())
            .field("outputs", &self.outputs.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// The CPU driver: owns the register file and the port callbacks, and
/// borrows external data and code memory for the duration of each step.
///
/// A step either completes or leaves the register file as it was before the
/// step. Side effects outside the register file that happened before the
/// failure (port callbacks, external memory writes) are not rolled back.
#[derive(Debug)]
pub struct Cpu {
    pub regs: RegisterFile,
    ports: Ports,
    config: Config,
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

impl Cpu {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        Self {
            regs: RegisterFile::new(config.reset_sp),
            ports: Ports::new(config.sfr_window.clone()),
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Return the register file to its reset state. Callbacks are kept.
    pub fn reset(&mut self) {
        self.regs = RegisterFile::new(self.config.reset_sp);
    }

    /// Route writes of the direct address `addr` to `output`.
    ///
    /// Addresses outside [`Config::sfr_window`] and the core SFRs (`A`, `B`,
    /// `PSW`, `SP`, `DPL`, `DPH`) never reach the callback.
    pub fn set_output_callback(&mut self, addr: u8, output: impl FnMut(u8) + 'static) {
        self.check_routable(addr);
        self.ports.outputs.insert(addr, Box::new(output));
    }

    /// Route reads of the direct address `addr` to `input`.
    ///
    /// Addresses outside [`Config::sfr_window`] and the core SFRs never reach
    /// the callback.
    pub fn set_input_callback(&mut self, addr: u8, input: impl FnMut() -> u8 + 'static) {
        self.check_routable(addr);
        self.ports.inputs.insert(addr, Box::new(input));
    }

    fn check_routable(&self, addr: u8) {
        if !self.ports.routes(addr) {
            warn!("callback for {addr:02X} will never be called");
        }
    }

    pub fn pc(&self) -> u16 {
        self.regs.pc
    }

    pub fn decode_pc(&self, code: &impl ReadOnlyMemoryMapper) -> Result<Instruction> {
        instruction::fetch(code, self.regs.pc)
    }

    /// Fetch, decode and execute one instruction.
    pub fn step(
        &mut self,
        xdata: &mut impl MemoryMapper,
        code: &impl ReadOnlyMemoryMapper,
    ) -> Result<Instruction> {
        let insn = instruction::fetch(code, self.regs.pc).inspect_err(|e| {
            warn!("fetch failed at {:04X}: {e}", self.regs.pc);
        })?;
        trace!("{insn:#}");

        let mut staged = self.regs.clone();
        let flow = exec::execute(&mut Context {
            regs: &mut staged,
            ports: &mut self.ports,
            xdata,
            code,
            insn: &insn,
        })
        .inspect_err(|e| warn!("{insn:#} faulted: {e}"))?;

        staged.pc = match flow {
            Flow::Next => insn.next_pc(),
            Flow::Jump(target) => target,
        };
        staged.update_parity();
        self.regs = staged;
        Ok(insn)
    }
}
