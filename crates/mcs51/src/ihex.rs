//! Intel HEX program images.
//!
//! A parsed [`HexImage`] is a sorted list of non-overlapping segments. As a
//! [`ReadOnlyMemoryMapper`] it looks like a flat image that ends at the
//! highest specified byte, with gaps filled by a pad byte.

use std::io::{self, BufRead};
use std::str::FromStr;

use thiserror::Error;

use crate::memory::ReadOnlyMemoryMapper;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("record of insufficient length")]
    InsufficientLength,
    #[error("line not prefixed with start code ':'")]
    NoStartCode,
    #[error("invalid hex digits")]
    InvalidDigits,
    #[error("checksum invalid")]
    Checksum,
    #[error("record length field disagrees with data ({expected} != {actual})")]
    LengthMismatch { expected: usize, actual: usize },
    #[error("unrecognized record type {0:#04X}")]
    UnknownType(u8),
    #[error("incorrect data field length for record type")]
    IncorrectDataLength,
    #[error("encountered EOF on line other than the last")]
    UnexpectedEof,
}

#[derive(Debug, Error)]
pub enum HexError {
    #[error("parse error on line {line}: {kind}")]
    Parse { line: usize, kind: RecordError },
    #[error("failed to locate EOF record")]
    NoEof,
    #[error("segment overlap detected at {0:#X}")]
    SegmentOverlap(u32),
    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecordType {
    Data,
    Eof,
    ExtendedSegment,
    StartSegment,
    ExtendedLinear,
    StartLinear,
}

impl TryFrom<u8> for RecordType {
    type Error = RecordError;
    fn try_from(value: u8) -> Result<Self, RecordError> {
        Ok(match value {
            0 => Self::Data,
            1 => Self::Eof,
            2 => Self::ExtendedSegment,
            3 => Self::StartSegment,
            4 => Self::ExtendedLinear,
            5 => Self::StartLinear,
            other => return Err(RecordError::UnknownType(other)),
        })
    }
}

struct Record {
    kind: RecordType,
    address: u16,
    data: Vec<u8>,
}

impl Record {
    fn parse(line: &str) -> Result<Self, RecordError> {
        let line = line.as_bytes();
        if line.len() < 11 {
            return Err(RecordError::InsufficientLength);
        }
        if line[0] != b':' {
            return Err(RecordError::NoStartCode);
        }
        let digits = &line[1..];
        if digits.len() % 2 != 0 {
            return Err(RecordError::InvalidDigits);
        }
        let bytes = digits
            .chunks(2)
            .map(|pair| {
                std::str::from_utf8(pair)
                    .ok()
                    .and_then(|s| u8::from_str_radix(s, 16).ok())
                    .ok_or(RecordError::InvalidDigits)
            })
            .collect::<Result<Vec<u8>, _>>()?;

        if bytes.iter().fold(0u8, |sum, b| sum.wrapping_add(*b)) != 0 {
            return Err(RecordError::Checksum);
        }

        let count = bytes[0] as usize;
        let data = &bytes[4..bytes.len() - 1];
        if data.len() != count {
            return Err(RecordError::LengthMismatch {
                expected: count,
                actual: data.len(),
            });
        }

        Ok(Self {
            kind: RecordType::try_from(bytes[3])?,
            address: u16::from_be_bytes([bytes[1], bytes[2]]),
            data: data.to_vec(),
        })
    }

    fn word(&self) -> Result<u16, RecordError> {
        match *self.data.as_slice() {
            [hi, lo] => Ok(u16::from_be_bytes([hi, lo])),
            _ => Err(RecordError::IncorrectDataLength),
        }
    }

    fn dword(&self) -> Result<[u8; 4], RecordError> {
        <[u8; 4]>::try_from(&self.data[..]).map_err(|_| RecordError::IncorrectDataLength)
    }
}

/// A contiguous block of specified memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub offset: u32,
    pub data: Vec<u8>,
}

impl Segment {
    fn end(&self) -> u64 {
        self.offset as u64 + self.data.len() as u64
    }
}

#[derive(Debug, Clone, Default)]
pub struct HexImage {
    segments: Vec<Segment>,
    /// x86 `CS:IP` from a start segment record, if any.
    pub start_segment: Option<(u16, u16)>,
    /// `EIP` from a start linear record, if any.
    pub start_linear: Option<u32>,
    pad: u8,
}

impl HexImage {
    pub fn parse(reader: impl BufRead) -> Result<Self, HexError> {
        let mut records = vec![];
        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            let record = Record::parse(&line).map_err(|kind| HexError::Parse {
                line: index + 1,
                kind,
            })?;
            records.push(record);
        }

        match records.last() {
            Some(last) if last.kind == RecordType::Eof => {}
            _ => return Err(HexError::NoEof),
        }
        records.pop();

        let mut image = Self {
            pad: 0xFF,
            ..Default::default()
        };
        let mut base = 0u32;
        for (index, record) in records.iter().enumerate() {
            let at = |kind| HexError::Parse {
                line: index + 1,
                kind,
            };
            match record.kind {
                RecordType::Data if record.data.is_empty() => {}
                RecordType::Data => image.segments.push(Segment {
                    offset: base.wrapping_add(record.address as u32),
                    data: record.data.clone(),
                }),
                RecordType::Eof => return Err(at(RecordError::UnexpectedEof)),
                RecordType::ExtendedSegment => base = (record.word().map_err(at)? as u32) << 4,
                RecordType::ExtendedLinear => base = (record.word().map_err(at)? as u32) << 16,
                RecordType::StartSegment => {
                    let [cs_hi, cs_lo, ip_hi, ip_lo] = record.dword().map_err(at)?;
                    image.start_segment = Some((
                        u16::from_be_bytes([cs_hi, cs_lo]),
                        u16::from_be_bytes([ip_hi, ip_lo]),
                    ));
                }
                RecordType::StartLinear => {
                    image.start_linear = Some(u32::from_be_bytes(record.dword().map_err(at)?));
                }
            }
        }

        image.segments.sort_by_key(|segment| segment.offset);
        for pair in image.segments.windows(2) {
            if (pair[1].offset as u64) < pair[0].end() {
                return Err(HexError::SegmentOverlap(pair[1].offset));
            }
        }
        Ok(image)
    }

    /// Set the byte reported for unspecified addresses. Defaults to `0xFF`,
    /// the erased state of EPROM/flash.
    pub fn with_pad(mut self, pad: u8) -> Self {
        self.pad = pad;
        self
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Segments overlapping `offset..offset + len`, in offset order.
    pub fn segments_in(&self, offset: u64, len: u64) -> impl Iterator<Item = &Segment> {
        self.segments
            .iter()
            .filter(move |s| offset < s.end() && offset.saturating_add(len) > s.offset as u64)
    }

    pub fn byte(&self, addr: u64) -> u8 {
        self.segments_in(addr, 1)
            .next()
            .map(|s| s.data[(addr - s.offset as u64) as usize])
            .unwrap_or(self.pad)
    }

    /// Fill `dst` with the image contents starting at `offset`, padding gaps.
    pub fn retrieve(&self, offset: u64, dst: &mut [u8]) {
        dst.fill(self.pad);
        for segment in self.segments_in(offset, dst.len() as u64) {
            let start = segment.offset as u64;
            let from = offset.max(start);
            let to = (offset + dst.len() as u64).min(segment.end());
            let src = &segment.data[(from - start) as usize..(to - start) as usize];
            dst[(from - offset) as usize..(to - offset) as usize].copy_from_slice(src);
        }
    }
}

impl FromStr for HexImage {
    type Err = HexError;
    fn from_str(s: &str) -> Result<Self, HexError> {
        Self::parse(s.as_bytes())
    }
}

impl ReadOnlyMemoryMapper for HexImage {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        let size = self.size();
        if offset >= size {
            return Ok(0);
        }
        let n = (buf.len() as u64).min(size - offset) as usize;
        self.retrieve(offset, &mut buf[..n]);
        Ok(n)
    }

    fn size(&self) -> u64 {
        self.segments.last().map(Segment::end).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_file_is_an_error() {
        assert!(matches!("".parse::<HexImage>(), Err(HexError::NoEof)));
    }

    #[test]
    fn just_eof() {
        let image: HexImage = ":00000001FF\n".parse().unwrap();
        assert!(image.segments().is_empty());
        assert_eq!(image.size(), 0);
    }

    #[test]
    fn trailing_blank_line_is_an_error() {
        assert!(matches!(
            ":00000001FF\n\n".parse::<HexImage>(),
            Err(HexError::Parse {
                line: 2,
                kind: RecordError::InsufficientLength
            })
        ));
    }

    #[test]
    fn data_records() {
        let text = ":0300000002000CEF\n:02000C0074007E\n:00000001FF\n";
        let image: HexImage = text.parse().unwrap();
        assert_eq!(image.segments().len(), 2);
        assert_eq!(image.size(), 0x0E);
        assert_eq!(image.byte(0), 0x02);
        assert_eq!(image.byte(0x0C), 0x74);
        assert_eq!(image.byte(0x05), 0xFF);

        let mut buf = [0u8; 8];
        assert_eq!(image.read_at(&mut buf, 0x0A).unwrap(), 4);
        assert_eq!(&buf[..4], &[0xFF, 0xFF, 0x74, 0x00]);
    }

    #[test]
    fn bad_checksum() {
        assert!(matches!(
            ":0300000002000CEE\n:00000001FF\n".parse::<HexImage>(),
            Err(HexError::Parse {
                line: 1,
                kind: RecordError::Checksum
            })
        ));
    }

    #[test]
    fn missing_start_code() {
        assert!(matches!(
            "00000001FF00\n".parse::<HexImage>(),
            Err(HexError::Parse {
                kind: RecordError::NoStartCode,
                ..
            })
        ));
    }

    #[test]
    fn eof_must_be_last() {
        assert!(matches!(
            ":00000001FF\n:00000001FF\n".parse::<HexImage>(),
            Err(HexError::Parse {
                line: 1,
                kind: RecordError::UnexpectedEof
            })
        ));
    }

    #[test]
    fn overlapping_segments() {
        let text = ":020000000102FB\n:020001000304F6\n:00000001FF\n";
        assert!(matches!(
            text.parse::<HexImage>(),
            Err(HexError::SegmentOverlap(1))
        ));
    }

    #[test]
    fn empty_data_record_is_not_a_segment() {
        let text = ":020000000102FB\n:00000100FF\n:00000001FF\n";
        let image: HexImage = text.parse().unwrap();
        assert_eq!(
            image.segments(),
            &[Segment {
                offset: 0,
                data: vec![0x01, 0x02]
            }]
        );
    }

    #[test]
    fn extended_linear_address() {
        let text = ":020000040001F9\n:0100000055AA\n:00000001FF\n";
        let image: HexImage = text.parse().unwrap();
        assert_eq!(image.segments()[0].offset, 0x10000);
        assert_eq!(image.byte(0x10000), 0x55);
    }

    #[test]
    fn pad_byte() {
        let text = ":0100020055A8\n:00000001FF\n";
        let image = text.parse::<HexImage>().unwrap().with_pad(0x00);
        let mut buf = [0xEE; 3];
        image.retrieve(0, &mut buf);
        assert_eq!(buf, [0x00, 0x00, 0x55]);
    }
}
