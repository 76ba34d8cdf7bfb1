//! GDSII stream records.
//!
//! A stream is a flat sequence of records:
//! ```text
//! [length:2][record_type:1][data_type:1][data:length-4]
//! ```
//! `length` includes the 4-byte header and is always even. Integers are
//! big-endian two's complement; reals use the IBM excess-64 hexadecimal
//! floating-point format.

use crate::gds::GdsError;

pub const HEADER: u8 = 0x00;
pub const BGNLIB: u8 = 0x01;
pub const LIBNAME: u8 = 0x02;
pub const UNITS: u8 = 0x03;
pub const ENDLIB: u8 = 0x04;
pub const BGNSTR: u8 = 0x05;
pub const STRNAME: u8 = 0x06;
pub const ENDSTR: u8 = 0x07;
pub const BOUNDARY: u8 = 0x08;
pub const PATH: u8 = 0x09;
pub const SREF: u8 = 0x0A;
pub const AREF: u8 = 0x0B;
pub const TEXT: u8 = 0x0C;
pub const LAYER: u8 = 0x0D;
pub const DATATYPE: u8 = 0x0E;
pub const WIDTH: u8 = 0x0F;
pub const XY: u8 = 0x10;
pub const ENDEL: u8 = 0x11;
pub const SNAME: u8 = 0x12;
pub const COLROW: u8 = 0x13;
pub const NODE: u8 = 0x15;
pub const TEXTTYPE: u8 = 0x16;
pub const STRING: u8 = 0x19;
pub const STRANS: u8 = 0x1A;
pub const MAG: u8 = 0x1B;
pub const ANGLE: u8 = 0x1C;
pub const PATHTYPE: u8 = 0x21;
pub const PROPATTR: u8 = 0x2B;
pub const PROPVALUE: u8 = 0x2C;
pub const BOX: u8 = 0x2D;
pub const BOXTYPE: u8 = 0x2E;

/// Data type codes in the record header.
pub mod data {
    pub const NONE: u8 = 0x00;
    pub const BITARRAY: u8 = 0x01;
    pub const INT2: u8 = 0x02;
    pub const INT4: u8 = 0x03;
    pub const REAL8: u8 = 0x05;
    pub const ASCII: u8 = 0x06;
}

/// STRANS bit: reflect about the x axis before rotation.
pub const STRANS_REFLECT: u16 = 0x8000;

/// One record borrowed from the input buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Record<'a> {
    /// Byte offset of the record header in the stream.
    pub offset: usize,
    pub kind: u8,
    pub data_type: u8,
    pub data: &'a [u8],
}

impl<'a> Record<'a> {
    fn bad(&self, message: impl Into<String>) -> GdsError {
        GdsError::BadData {
            offset: self.offset,
            message: message.into(),
        }
    }

    pub fn int2s(&self) -> impl Iterator<Item = i16> + 'a {
        self.data.chunks_exact(2).map(|c| i16::from_be_bytes([c[0], c[1]]))
    }

    pub fn int4s(&self) -> impl Iterator<Item = i32> + 'a {
        self.data
            .chunks_exact(4)
            .map(|c| i32::from_be_bytes([c[0], c[1], c[2], c[3]]))
    }

    pub fn int2(&self) -> Result<i16, GdsError> {
        self.int2s().next().ok_or_else(|| self.bad("expected a 2-byte integer"))
    }

    pub fn int4(&self) -> Result<i32, GdsError> {
        self.int4s().next().ok_or_else(|| self.bad("expected a 4-byte integer"))
    }

    pub fn bits(&self) -> Result<u16, GdsError> {
        self.int2().map(|v| v as u16)
    }

    pub fn real8s(&self) -> impl Iterator<Item = f64> + 'a {
        self.data.chunks_exact(8).map(|c| {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(c);
            real8_to_f64(raw)
        })
    }

    pub fn real8(&self) -> Result<f64, GdsError> {
        self.real8s().next().ok_or_else(|| self.bad("expected an 8-byte real"))
    }

    /// ASCII payload with trailing NUL padding removed.
    pub fn ascii(&self) -> Result<String, GdsError> {
        let end = self.data.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
        std::str::from_utf8(&self.data[..end])
            .map(str::to_string)
            .map_err(|_| self.bad("string is not valid UTF-8"))
    }

    /// A non-negative 2-byte integer such as a layer or datatype number.
    pub fn u16(&self) -> Result<u16, GdsError> {
        let v = self.int2()?;
        u16::try_from(v).map_err(|_| self.bad(format!("expected a non-negative number, got {v}")))
    }
}

/// Iterates records until ENDLIB or end of input.
pub struct RecordReader<'a> {
    bytes: &'a [u8],
    pos: usize,
    done: bool,
}

impl<'a> RecordReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            pos: 0,
            done: false,
        }
    }
}

impl<'a> Iterator for RecordReader<'a> {
    type Item = Result<Record<'a>, GdsError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.pos >= self.bytes.len() {
            return None;
        }
        let offset = self.pos;
        let rest = &self.bytes[offset..];
        if rest.len() < 4 {
            self.done = true;
            return Some(Err(GdsError::Truncated { offset }));
        }
        let len = usize::from(u16::from_be_bytes([rest[0], rest[1]]));
        if len < 4 || len % 2 != 0 {
            self.done = true;
            return Some(Err(GdsError::BadRecordLength { offset, length: len }));
        }
        if rest.len() < len {
            self.done = true;
            return Some(Err(GdsError::Truncated { offset }));
        }
        let record = Record {
            offset,
            kind: rest[2],
            data_type: rest[3],
            data: &rest[4..len],
        };
        self.pos += len;
        if record.kind == ENDLIB {
            // Anything after ENDLIB is block padding.
            self.done = true;
        }
        Some(Ok(record))
    }
}

/// Decodes an excess-64 base-16 real.
pub fn real8_to_f64(raw: [u8; 8]) -> f64 {
    let sign = if raw[0] & 0x80 != 0 { -1.0 } else { 1.0 };
    let exponent = i32::from(raw[0] & 0x7f) - 64;
    let mut mantissa = 0u64;
    for b in &raw[1..] {
        mantissa = (mantissa << 8) | u64::from(*b);
    }
    sign * (mantissa as f64 / (1u64 << 56) as f64) * 16f64.powi(exponent)
}

/// Encodes a real in excess-64 base-16 form.
pub fn f64_to_real8(value: f64) -> [u8; 8] {
    if value == 0.0 || !value.is_finite() {
        return [0; 8];
    }
    let sign = if value < 0.0 { 0x80u8 } else { 0 };
    let mut v = value.abs();
    let mut exponent = 64i32;
    while v >= 1.0 {
        v /= 16.0;
        exponent += 1;
    }
    while v < 1.0 / 16.0 {
        v *= 16.0;
        exponent -= 1;
    }
    let mantissa = (v * (1u64 << 56) as f64).round() as u64;
    let mut out = [0u8; 8];
    out[0] = sign | (exponent.clamp(0, 127) as u8);
    out[1..].copy_from_slice(&mantissa.to_be_bytes()[1..]);
    out
}

// ── Tests ─────────────────────────────────────────────────────────────────────
