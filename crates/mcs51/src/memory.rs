//! Memory contracts the core borrows during a step, and two stock
//! implementations.

use std::io;

/// A fixed-size, random-access, read-only memory. Used for code memory.
///
/// `read_at` returns the number of bytes copied into `buf`; anything short of
/// `buf.len()` is treated as a fault by the core.
pub trait ReadOnlyMemoryMapper {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize>;
    fn size(&self) -> u64;
}

/// A fixed-size, random-access, read-write memory. Used for external data
/// memory (`MOVX`).
pub trait MemoryMapper: ReadOnlyMemoryMapper {
    fn write_at(&mut self, buf: &[u8], offset: u64) -> io::Result<usize>;
}

fn copy_out(bytes: &[u8], buf: &mut [u8], offset: u64) -> usize {
    let Ok(start) = usize::try_from(offset) else {
        return 0;
    };
    let Some(src) = bytes.get(start..) else {
        return 0;
    };
    let n = src.len().min(buf.len());
    buf[..n].copy_from_slice(&src[..n]);
    n
}

/// Zero-filled read-write memory.
pub struct Ram {
    ram: Vec<u8>,
}

impl Ram {
    pub fn new(size: usize) -> Self {
        Self { ram: vec![0; size] }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.ram
    }
}

impl Default for Ram {
    /// The full 64KiB external data space.
    fn default() -> Self {
        Self::new(0x10000)
    }
}

impl ReadOnlyMemoryMapper for Ram {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        Ok(copy_out(&self.ram, buf, offset))
    }
    fn size(&self) -> u64 {
        self.ram.len() as u64
    }
}

impl MemoryMapper for Ram {
    fn write_at(&mut self, buf: &[u8], offset: u64) -> io::Result<usize> {
        let Ok(start) = usize::try_from(offset) else {
            return Ok(0);
        };
        let Some(dst) = self.ram.get_mut(start..) else {
            return Ok(0);
        };
        let n = dst.len().min(buf.len());
        dst[..n].copy_from_slice(&buf[..n]);
        Ok(n)
    }
}

/// An owned program image.
pub struct Rom {
    rom: Vec<u8>,
}

impl Rom {
    pub fn new(contents: Vec<u8>) -> Self {
        Self { rom: contents }
    }
}

impl ReadOnlyMemoryMapper for Rom {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        Ok(copy_out(&self.rom, buf, offset))
    }
    fn size(&self) -> u64 {
        self.rom.len() as u64
    }
}
