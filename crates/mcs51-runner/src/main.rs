use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::EnvFilter;

use mcs51::sfr::*;
use mcs51::{Cpu, HexImage, Ram, ReadOnlyMemoryMapper, Rom};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    /// Intel HEX for `.hex`/`.ihx`, raw binary otherwise
    Auto,
    Bin,
    Hex,
}

#[derive(Parser)]
#[command(version, about)]
struct Args {
    /// Program image to load at address 0
    #[arg(value_name = "ROM_FILE")]
    rom_file: PathBuf,

    /// Image format
    #[arg(short, long, value_enum, default_value_t = Format::Auto)]
    format: Format,

    /// Maximum number of instructions to execute
    #[arg(short, long, default_value = "1000")]
    max_instructions: u64,

    /// Log every executed instruction
    #[arg(short, long)]
    trace: bool,

    /// Size of external data memory in bytes
    #[arg(long, default_value = "65536")]
    xdata_size: usize,
}

enum Image {
    Bin(Rom),
    Hex(HexImage),
}

impl ReadOnlyMemoryMapper for Image {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        match self {
            Image::Bin(rom) => rom.read_at(buf, offset),
            Image::Hex(hex) => hex.read_at(buf, offset),
        }
    }

    fn size(&self) -> u64 {
        match self {
            Image::Bin(rom) => rom.size(),
            Image::Hex(hex) => hex.size(),
        }
    }
}

fn load(path: &Path, format: Format) -> Result<Image> {
    let format = match format {
        Format::Auto => match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("hex") || ext.eq_ignore_ascii_case("ihx") => {
                Format::Hex
            }
            _ => Format::Bin,
        },
        other => other,
    };
    let contents =
        fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    Ok(match format {
        Format::Hex => Image::Hex(
            HexImage::parse(contents.as_slice())
                .with_context(|| format!("failed to parse {}", path.display()))?,
        ),
        _ => Image::Bin(Rom::new(contents)),
    })
}

fn print_registers(cpu: &Cpu) {
    let regs = &cpu.regs;
    println!(
        "  PC={:04X}  A={:02X}  B={:02X}  DPTR={:04X}  SP={:02X}  C={} OV={} AC={} P={}",
        regs.pc,
        regs.a,
        regs.b,
        regs.dptr,
        regs.sp,
        regs.psw(PSW_C) as u8,
        regs.psw(PSW_OV) as u8,
        regs.psw(PSW_AC) as u8,
        regs.psw(PSW_P) as u8,
    );
    print!("  ");
    for i in 0..8 {
        print!("R{}={:02X} ", i, regs.r(i));
    }
    println!();
}

pub fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.trace {
        LevelFilter::TRACE
    } else {
        LevelFilter::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(default_level.into())
                .from_env_lossy(),
        )
        .with_target(false)
        .init();

    let code = load(&args.rom_file, args.format)?;
    let mut xdata = Ram::new(args.xdata_size);

    let mut cpu = Cpu::new();
    for (name, port) in [("P0", SFR_P0), ("P1", SFR_P1), ("P2", SFR_P2), ("P3", SFR_P3)] {
        cpu.set_output_callback(port, move |value| info!("{name} <- {value:02X}"));
    }

    let mut instruction_count = 0;
    let result = loop {
        if instruction_count >= args.max_instructions {
            break Ok(());
        }
        match cpu.step(&mut xdata, &code) {
            Ok(insn) => {
                instruction_count += 1;
                if cpu.pc() == insn.addr() {
                    info!("self-jump at {:04X}", insn.addr());
                    break Ok(());
                }
            }
            Err(e) => break Err(e),
        }
    };

    println!(
        "CPU halted at 0x{:04X} after {} instructions",
        cpu.pc(),
        instruction_count
    );
    print_registers(&cpu);

    result.with_context(|| format!("execution stopped at 0x{:04X}", cpu.pc()))
}
