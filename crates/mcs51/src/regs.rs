use crate::error::{Error, Result};
use crate::sfr::*;

/// The mutable CPU state: internal RAM (including the four register banks),
/// the core SFRs and the program counter.
///
/// The stack grows upwards through `internal_ram` and `sp` always points at
/// the most recently pushed byte. Pushes that would carry `sp` past `0xFF`
/// and pops that would borrow below `0x00` fail instead of wrapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterFile {
    pub internal_ram: [u8; 256],
    pub sp: u8,
    pub dptr: u16,
    pub psw: u8,
    pub a: u8,
    pub b: u8,
    pub pc: u16,
}

impl Default for RegisterFile {
    fn default() -> Self {
        Self::new(0x07)
    }
}

impl RegisterFile {
    pub fn new(reset_sp: u8) -> Self {
        Self {
            internal_ram: [0; 256],
            sp: reset_sp,
            dptr: 0,
            psw: 0,
            a: 0,
            b: 0,
            pc: 0,
        }
    }

    pub fn psw(&self, flag: u8) -> bool {
        self.psw & (1 << flag) != 0
    }

    pub fn psw_set(&mut self, flag: u8, value: bool) {
        if value {
            self.psw |= 1 << flag;
        } else {
            self.psw &= !(1 << flag);
        }
    }

    /// Recompute the parity flag from the accumulator.
    pub fn update_parity(&mut self) {
        self.psw_set(PSW_P, self.a.count_ones() % 2 == 1);
    }

    /// Base address of the register bank selected by `RS1:RS0`.
    pub fn bank_base(&self) -> u8 {
        ((self.psw >> PSW_RS0) & 0x03) * 8
    }

    /// Internal RAM address of `Rn` in the active bank.
    pub fn register_address(&self, n: u8) -> u8 {
        debug_assert!(n < 8);
        self.bank_base() + (n & 0x07)
    }

    pub fn r(&self, n: u8) -> u8 {
        self.internal_ram[self.register_address(n) as usize]
    }

    pub fn r_set(&mut self, n: u8, value: u8) {
        self.internal_ram[self.register_address(n) as usize] = value;
    }

    /// The address `@R0`/`@R1` points at: the contents of that register.
    pub fn indirect_address(&self, i: u8) -> u8 {
        self.r(i & 0x01)
    }

    pub fn dpl(&self) -> u8 {
        self.dptr as u8
    }

    pub fn dph(&self) -> u8 {
        (self.dptr >> 8) as u8
    }

    pub fn dpl_set(&mut self, value: u8) {
        self.dptr = (self.dptr & 0xFF00) | value as u16;
    }

    pub fn dph_set(&mut self, value: u8) {
        self.dptr = (self.dptr & 0x00FF) | (value as u16) << 8;
    }

    pub fn push_byte(&mut self, value: u8) -> Result<()> {
        let sp = self
            .sp
            .checked_add(1)
            .ok_or(Error::StackOverflow { sp: self.sp })?;
        self.sp = sp;
        self.internal_ram[sp as usize] = value;
        Ok(())
    }

    pub fn pop_byte(&mut self) -> Result<u8> {
        let sp = self
            .sp
            .checked_sub(1)
            .ok_or(Error::StackUnderflow { sp: self.sp })?;
        let value = self.internal_ram[self.sp as usize];
        self.sp = sp;
        Ok(value)
    }

    /// Push a return address: low byte first, then high byte.
    pub fn push_word(&mut self, value: u16) -> Result<()> {
        let sp = self
            .sp
            .checked_add(2)
            .ok_or(Error::StackOverflow { sp: self.sp })?;
        let [hi, lo] = value.to_be_bytes();
        self.internal_ram[sp as usize - 1] = lo;
        self.internal_ram[sp as usize] = hi;
        self.sp = sp;
        Ok(())
    }

    /// Inverse of [`RegisterFile::push_word`].
    pub fn pop_word(&mut self) -> Result<u16> {
        let sp = self
            .sp
            .checked_sub(2)
            .ok_or(Error::StackUnderflow { sp: self.sp })?;
        let hi = self.internal_ram[self.sp as usize];
        let lo = self.internal_ram[self.sp as usize - 1];
        self.sp = sp;
        Ok(u16::from_be_bytes([hi, lo]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn push_pop_byte(value in any::<u8>(), sp in 0u8..0xFF) {
            let mut regs = RegisterFile::new(sp);
            regs.push_byte(value).unwrap();
            prop_assert_eq!(regs.sp, sp + 1);
            prop_assert_eq!(regs.pop_byte().unwrap(), value);
            prop_assert_eq!(regs.sp, sp);
        }

        #[test]
        fn push_pop_word(value in any::<u16>(), sp in 0u8..0xFE) {
            let mut regs = RegisterFile::new(sp);
            regs.push_word(value).unwrap();
            prop_assert_eq!(regs.pop_word().unwrap(), value);
            prop_assert_eq!(regs.sp, sp);
        }

        #[test]
        fn register_address_stays_in_bank(psw in any::<u8>(), n in 0u8..8) {
            let mut regs = RegisterFile::default();
            regs.psw = psw;
            let base = regs.bank_base();
            prop_assert!(base % 8 == 0 && base <= 24);
            prop_assert_eq!(regs.register_address(n), base + n);
        }
    }

    #[test]
    fn word_byte_order() {
        let mut regs = RegisterFile::new(0x07);
        regs.push_word(0x0103).unwrap();
        assert_eq!(regs.sp, 0x09);
        assert_eq!(regs.internal_ram[0x08], 0x03);
        assert_eq!(regs.internal_ram[0x09], 0x01);
        assert_eq!(regs.pop_byte().unwrap(), 0x01);
        assert_eq!(regs.pop_byte().unwrap(), 0x03);
    }

    #[test]
    fn registers_within_a_bank_are_distinct() {
        let mut regs = RegisterFile::default();
        regs.psw_set(PSW_RS0, true);
        regs.psw_set(PSW_RS1, true);
        assert_eq!(regs.register_address(0), 24);
        assert_eq!(regs.register_address(7), 31);
        assert_ne!(regs.register_address(0), regs.register_address(7));

        regs.r_set(7, 0x55);
        assert_eq!(regs.internal_ram[31], 0x55);
        assert_eq!(regs.r(0), 0);
    }

    #[test]
    fn indirect_goes_through_the_active_bank() {
        let mut regs = RegisterFile::default();
        regs.psw_set(PSW_RS0, true);
        regs.internal_ram[8 + 1] = 0x40;
        assert_eq!(regs.indirect_address(1), 0x40);
        assert_eq!(regs.indirect_address(0), 0);
    }

    #[test]
    fn stack_bounds() {
        let mut regs = RegisterFile::new(0xFF);
        assert!(matches!(
            regs.push_byte(1),
            Err(Error::StackOverflow { sp: 0xFF })
        ));
        let mut regs = RegisterFile::new(0xFE);
        assert!(matches!(regs.push_word(1), Err(Error::StackOverflow { .. })));
        assert_eq!(regs, RegisterFile::new(0xFE));

        let mut regs = RegisterFile::new(0x00);
        assert!(matches!(
            regs.pop_byte(),
            Err(Error::StackUnderflow { sp: 0 })
        ));
        let mut regs = RegisterFile::new(0x01);
        assert!(matches!(regs.pop_word(), Err(Error::StackUnderflow { .. })));
        assert_eq!(regs.sp, 0x01);
    }

    #[test]
    fn parity() {
        let mut regs = RegisterFile::default();
        regs.a = 0b0000_0111;
        regs.update_parity();
        assert!(regs.psw(PSW_P));
        regs.a = 0b1000_0001;
        regs.update_parity();
        assert!(!regs.psw(PSW_P));
    }

    #[test]
    fn dptr_halves() {
        let mut regs = RegisterFile::default();
        regs.dph_set(0x12);
        regs.dpl_set(0x34);
        assert_eq!(regs.dptr, 0x1234);
        assert_eq!((regs.dph(), regs.dpl()), (0x12, 0x34));
    }
}
