//! SFR (special-function register) addresses and PSW flag bits.

/// First address of the conventional SFR window.
pub const SFR_BASE: u8 = 0x80;

/// Port 0 latch
pub const SFR_P0: u8 = 0x80;
/// Stack pointer, aliases [`crate::RegisterFile::sp`]
pub const SFR_SP: u8 = 0x81;
/// Data pointer low byte
pub const SFR_DPL: u8 = 0x82;
/// Data pointer high byte
pub const SFR_DPH: u8 = 0x83;
pub const SFR_PCON: u8 = 0x87;
pub const SFR_TCON: u8 = 0x88;
pub const SFR_TMOD: u8 = 0x89;
pub const SFR_TL0: u8 = 0x8A;
pub const SFR_TL1: u8 = 0x8B;
pub const SFR_TH0: u8 = 0x8C;
pub const SFR_TH1: u8 = 0x8D;
/// Port 1 latch
pub const SFR_P1: u8 = 0x90;
pub const SFR_SCON: u8 = 0x98;
pub const SFR_SBUF: u8 = 0x99;
/// Port 2 latch
pub const SFR_P2: u8 = 0xA0;
pub const SFR_IE: u8 = 0xA8;
/// Port 3 latch
pub const SFR_P3: u8 = 0xB0;
pub const SFR_IP: u8 = 0xB8;
pub const SFR_T2CON: u8 = 0xC8;
pub const SFR_T2MOD: u8 = 0xC9;
pub const SFR_RCAP2L: u8 = 0xCA;
pub const SFR_RCAP2H: u8 = 0xCB;
pub const SFR_TL2: u8 = 0xCC;
pub const SFR_TH2: u8 = 0xCD;
/// Program status word
pub const SFR_PSW: u8 = 0xD0;
/// Accumulator
pub const SFR_A: u8 = 0xE0;
/// B register, second operand of `MUL`/`DIV`
pub const SFR_B: u8 = 0xF0;

/// Carry flag: carry/borrow out of bit 7
pub const PSW_C: u8 = 0x07;
/// Auxiliary carry flag: carry/borrow out of bit 3
pub const PSW_AC: u8 = 0x06;
/// General purpose flag 0
pub const PSW_F0: u8 = 0x05;
/// Register bank select, high bit
pub const PSW_RS1: u8 = 0x04;
/// Register bank select, low bit
pub const PSW_RS0: u8 = 0x03;
/// Signed overflow flag
pub const PSW_OV: u8 = 0x02;
/// General-purpose user flag. Intel documents PSW.1 as user-definable on
/// the 8051 proper and reserved only on some derivatives.
pub const PSW_UD: u8 = 0x01;
/// Odd parity of the accumulator
pub const PSW_P: u8 = 0x00;

/// Returns the assembler name of a well-known SFR address.
pub fn sfr_name(addr: u8) -> Option<&'static str> {
    Some(match addr {
        SFR_P0 => "P0",
        SFR_SP => "SP",
        SFR_DPL => "DPL",
        SFR_DPH => "DPH",
        SFR_PCON => "PCON",
        SFR_TCON => "TCON",
        SFR_TMOD => "TMOD",
        SFR_TL0 => "TL0",
        SFR_TL1 => "TL1",
        SFR_TH0 => "TH0",
        SFR_TH1 => "TH1",
        SFR_P1 => "P1",
        SFR_SCON => "SCON",
        SFR_SBUF => "SBUF",
        SFR_P2 => "P2",
        SFR_IE => "IE",
        SFR_P3 => "P3",
        SFR_IP => "IP",
        SFR_T2CON => "T2CON",
        SFR_T2MOD => "T2MOD",
        SFR_RCAP2L => "RCAP2L",
        SFR_RCAP2H => "RCAP2H",
        SFR_TL2 => "TL2",
        SFR_TH2 => "TH2",
        SFR_PSW => "PSW",
        SFR_A => "ACC",
        SFR_B => "B",
        _ => return None,
    })
}
