//! Small hand-assembled programs run to completion.

use mcs51::sfr::*;
use mcs51::{Cpu, Error, HexImage, Ram, ReadOnlyMemoryMapper, Rom, fetch};

/// Step until the program parks itself on a jump to its own address.
fn run_to_halt(cpu: &mut Cpu, xdata: &mut Ram, code: &impl ReadOnlyMemoryMapper) -> usize {
    for count in 1..=10_000 {
        let insn = cpu.step(xdata, code).unwrap();
        if cpu.pc() == insn.addr() {
            return count;
        }
    }
    panic!("program did not halt");
}

fn run(program: &[u8]) -> (Cpu, Ram) {
    let mut cpu = Cpu::new();
    let mut xdata = Ram::default();
    run_to_halt(&mut cpu, &mut xdata, &Rom::new(program.to_vec()));
    (cpu, xdata)
}

#[test]
fn djnz_sum_loop() {
    let (cpu, _) = run(&[
        0x78, 0x05, // MOV R0,#05H
        0xE4, // CLR A
        0x28, // ADD A,R0
        0xD8, 0xFD, // DJNZ R0,0003H
        0x80, 0xFE, // SJMP $
    ]);
    assert_eq!(cpu.regs.a, 15);
    assert_eq!(cpu.regs.r(0), 0);
    assert!(!cpu.regs.psw(PSW_P));
}

#[test]
fn cjne_counts_up() {
    let (cpu, _) = run(&[
        0x79, 0x00, // MOV R1,#00H
        0x09, // INC R1
        0xB9, 0x03, 0xFC, // CJNE R1,#03H,0002H
        0x80, 0xFE, // SJMP $
    ]);
    assert_eq!(cpu.regs.r(1), 3);
    assert!(!cpu.regs.psw(PSW_C));
}

#[test]
fn subroutine_call() {
    let mut program = vec![0; 0x13];
    program[..9].copy_from_slice(&[
        0x74, 0x21, // MOV A,#21H
        0x12, 0x00, 0x10, // LCALL 0010H
        0xF5, 0x30, // MOV 30H,A
        0x80, 0xFE, // SJMP $
    ]);
    program[0x10..].copy_from_slice(&[
        0x25, 0xE0, // ADD A,ACC
        0x22, // RET
    ]);
    let (cpu, _) = run(&program);
    assert_eq!(cpu.regs.internal_ram[0x30], 0x42);
    assert_eq!(cpu.regs.sp, 0x07);
    assert_eq!(cpu.pc(), 0x0007);
}

#[test]
fn movc_table_lookups() {
    let mut program = vec![0; 0x24];
    program[..0x0C].copy_from_slice(&[
        0x90, 0x00, 0x20, // MOV DPTR,#0020H
        0x74, 0x02, // MOV A,#02H
        0x93, // MOVC A,@A+DPTR
        0xF8, // MOV R0,A
        0x74, 0x01, // MOV A,#01H
        0x83, // MOVC A,@A+PC
        0x80, 0xFE, // SJMP $
    ]);
    program[0x20..].copy_from_slice(&[0x10, 0x20, 0x30, 0x40]);
    let (cpu, _) = run(&program);
    assert_eq!(cpu.regs.r(0), 0x30);
    // @A+PC with A=1 lands on the SJMP offset byte.
    assert_eq!(cpu.regs.a, 0xFE);
}

#[test]
fn external_data_round_trip() {
    let (cpu, xdata) = run(&[
        0x90, 0x12, 0x34, // MOV DPTR,#1234H
        0x74, 0x99, // MOV A,#99H
        0xF0, // MOVX @DPTR,A
        0xE4, // CLR A
        0xE0, // MOVX A,@DPTR
        0x78, 0x40, // MOV R0,#40H
        0xF2, // MOVX @R0,A
        0x80, 0xFE, // SJMP $
    ]);
    assert_eq!(cpu.regs.a, 0x99);
    assert_eq!(xdata.as_slice()[0x1234], 0x99);
    assert_eq!(xdata.as_slice()[0x0040], 0x99);
}

#[test]
fn bcd_addition() {
    let (cpu, _) = run(&[
        0x74, 0x49, // MOV A,#49H
        0x24, 0x38, // ADD A,#38H
        0xD4, // DA A
        0x80, 0xFE, // SJMP $
    ]);
    assert_eq!(cpu.regs.a, 0x87);
    assert!(!cpu.regs.psw(PSW_C));
}

#[test]
fn push_and_pop_through_sfrs() {
    let (cpu, _) = run(&[
        0x74, 0x5A, // MOV A,#5AH
        0xC0, 0xE0, // PUSH ACC
        0xE4, // CLR A
        0xD0, 0xF0, // POP B
        0x80, 0xFE, // SJMP $
    ]);
    assert_eq!(cpu.regs.a, 0x00);
    assert_eq!(cpu.regs.b, 0x5A);
    assert_eq!(cpu.regs.sp, 0x07);
}

#[test]
fn bit_manipulation() {
    let (cpu, _) = run(&[
        0xD2, 0x00, // SETB 20H.0
        0xD2, 0x0F, // SETB 21H.7
        0xA2, 0x0F, // MOV C,21H.7
        0x82, 0x01, // ANL C,20H.1
        0x92, 0x10, // MOV 22H.0,C
        0xB3, // CPL C
        0x80, 0xFE, // SJMP $
    ]);
    assert_eq!(cpu.regs.internal_ram[0x20], 0x01);
    assert_eq!(cpu.regs.internal_ram[0x21], 0x80);
    assert_eq!(cpu.regs.internal_ram[0x22], 0x00);
    assert!(cpu.regs.psw(PSW_C));
}

#[test]
fn hex_loaded_program() {
    let image: HexImage = ":080000007805E428D8FD80FE1C\n:00000001FF\n".parse().unwrap();
    let mut cpu = Cpu::new();
    let count = run_to_halt(&mut cpu, &mut Ram::default(), &image);
    assert_eq!(cpu.regs.a, 15);
    // MOV, CLR, 5 x (ADD, DJNZ), SJMP
    assert_eq!(count, 13);
}

#[test]
fn running_off_the_end_faults() {
    let mut cpu = Cpu::new();
    let code = Rom::new(vec![0x00, 0x00]);
    let mut xdata = Ram::default();
    cpu.step(&mut xdata, &code).unwrap();
    cpu.step(&mut xdata, &code).unwrap();
    assert!(matches!(
        cpu.step(&mut xdata, &code),
        Err(Error::MemoryFault { addr: 2, .. })
    ));
    assert_eq!(cpu.pc(), 2);
}

#[test]
fn disassembly_listing() {
    let code = Rom::new(vec![
        0x78, 0x05, 0xE4, 0x28, 0xD8, 0xFD, 0xF5, 0x90, 0x24, 0x01, 0x80, 0xF4,
    ]);
    let mut listing = vec![];
    let mut pc = 0;
    while (pc as u64) < code.size() {
        let insn = fetch(&code, pc).unwrap();
        listing.push(insn.to_string());
        pc = insn.next_pc();
    }
    assert_eq!(
        listing,
        [
            "MOV R0,#05H",
            "CLR A",
            "ADD A,R0",
            "DJNZ R0,0003H",
            "MOV P1,A",
            "ADD A,#01H",
            "SJMP 0000H",
        ]
    );
}
