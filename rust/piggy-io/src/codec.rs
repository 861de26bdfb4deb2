//! Stateless little-endian encodings over [`ByteSink`] / [`ByteSource`].
//!
//! Families:
//! - fixed-width integers (`fixed16/32/64`),
//! - unsigned varints (`vint` for 32 bits, `vlong` for 64 bits): 7 payload bits per byte,
//!   high bit set on every byte but the last,
//! - zigzag varints (`zint`, `zlong`) for signed values,
//! - Z-float / Z-double: one header byte that either inlines a small integer, flags a
//!   raw IEEE-754 pattern, or carries the top 8 bits of a positive value,
//! - T-long: millisecond timestamps with the largest of day/hour/second factored out,
//! - length-prefixed UTF-8 strings.
//!
//! Decoders are hardened: a varint longer than its width allows fails with an
//! `Encoding` error instead of silently wrapping.

use piggy_common::{Result, error::Error};

use crate::{ByteSink, ByteSource};

pub const SECOND: i64 = 1000;
pub const HOUR: i64 = 60 * 60 * SECOND;
pub const DAY: i64 = 24 * HOUR;

pub const SECOND_ENCODING: u8 = 0x40;
pub const HOUR_ENCODING: u8 = 0x80;
pub const DAY_ENCODING: u8 = 0xC0;

const TLONG_CONTINUATION: u8 = 0x20;
const TLONG_INLINE_MASK: u8 = 0x1F;

const ZFLOAT_RAW: u8 = 0xFF;
const ZDOUBLE_FLOAT: u8 = 0xFE;
const ZFLOAT_MAX_INLINE: i32 = 0x7D;
const ZDOUBLE_MAX_INLINE: i32 = 0x7C;

const NEGATIVE_ZERO_FLOAT: u32 = 0x8000_0000;
const NEGATIVE_ZERO_DOUBLE: u64 = 0x8000_0000_0000_0000;

pub const MAX_VINT_LEN: usize = 5;
pub const MAX_VLONG_LEN: usize = 10;

#[inline]
pub fn zigzag_encode_i32(i: i32) -> u32 {
    ((i << 1) ^ (i >> 31)) as u32
}

#[inline]
pub fn zigzag_decode_i32(u: u32) -> i32 {
    ((u >> 1) as i32) ^ -((u & 1) as i32)
}

#[inline]
pub fn zigzag_encode_i64(l: i64) -> u64 {
    ((l << 1) ^ (l >> 63)) as u64
}

#[inline]
pub fn zigzag_decode_i64(u: u64) -> i64 {
    ((u >> 1) as i64) ^ -((u & 1) as i64)
}

pub fn write_fixed16<S: ByteSink + ?Sized>(sink: &mut S, value: u16) -> Result<()> {
    sink.write_bytes(&value.to_le_bytes())
}

pub fn write_fixed32<S: ByteSink + ?Sized>(sink: &mut S, value: u32) -> Result<()> {
    sink.write_bytes(&value.to_le_bytes())
}

pub fn write_fixed64<S: ByteSink + ?Sized>(sink: &mut S, value: u64) -> Result<()> {
    sink.write_bytes(&value.to_le_bytes())
}

pub fn read_fixed16<S: ByteSource + ?Sized>(source: &mut S) -> Result<u16> {
    let mut buf = [0u8; 2];
    source.read_bytes(&mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

pub fn read_fixed32<S: ByteSource + ?Sized>(source: &mut S) -> Result<u32> {
    let mut buf = [0u8; 4];
    source.read_bytes(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

pub fn read_fixed64<S: ByteSource + ?Sized>(source: &mut S) -> Result<u64> {
    let mut buf = [0u8; 8];
    source.read_bytes(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

/// Writes a 32-bit unsigned varint (1 to 5 bytes).
pub fn write_vint<S: ByteSink + ?Sized>(sink: &mut S, value: u32) -> Result<()> {
    write_vlong(sink, value as u64)
}

/// Writes a 64-bit unsigned varint (1 to 10 bytes).
pub fn write_vlong<S: ByteSink + ?Sized>(sink: &mut S, mut value: u64) -> Result<()> {
    let mut buf = [0u8; MAX_VLONG_LEN];
    let mut len = 0;
    while value & !0x7F != 0 {
        buf[len] = ((value & 0x7F) | 0x80) as u8;
        value >>= 7;
        len += 1;
    }
    buf[len] = value as u8;
    sink.write_bytes(&buf[..len + 1])
}

/// Reads a 32-bit unsigned varint.
///
/// Fails if the encoding needs more than 5 bytes or the 5th byte carries more than the
/// 4 remaining payload bits.
pub fn read_vint<S: ByteSource + ?Sized>(source: &mut S) -> Result<u32> {
    let mut value = 0u32;
    for i in 0..MAX_VINT_LEN {
        let b = source.read_byte()?;
        let shift = 7 * i;
        if i == MAX_VINT_LEN - 1 && b & 0xF0 != 0 {
            return Err(Error::encoding("vint", "too many bits"));
        }
        value |= ((b & 0x7F) as u32) << shift;
        if b & 0x80 == 0 {
            return Ok(value);
        }
    }
    Err(Error::encoding("vint", "too many bytes"))
}

/// Reads a 64-bit unsigned varint.
///
/// Fails if the encoding needs more than 10 bytes or the 10th byte is anything but 0 or 1.
pub fn read_vlong<S: ByteSource + ?Sized>(source: &mut S) -> Result<u64> {
    let mut value = 0u64;
    for i in 0..MAX_VLONG_LEN {
        let b = source.read_byte()?;
        let shift = 7 * i;
        if i == MAX_VLONG_LEN - 1 && b & 0xFE != 0 {
            return Err(Error::encoding("vlong", "more than 64 bits"));
        }
        value |= ((b & 0x7F) as u64) << shift;
        if b & 0x80 == 0 {
            return Ok(value);
        }
    }
    Err(Error::encoding("vlong", "too many bytes"))
}

pub fn write_zint<S: ByteSink + ?Sized>(sink: &mut S, value: i32) -> Result<()> {
    write_vint(sink, zigzag_encode_i32(value))
}

pub fn read_zint<S: ByteSource + ?Sized>(source: &mut S) -> Result<i32> {
    Ok(zigzag_decode_i32(read_vint(source)?))
}

pub fn write_zlong<S: ByteSink + ?Sized>(sink: &mut S, value: i64) -> Result<()> {
    write_vlong(sink, zigzag_encode_i64(value))
}

pub fn read_zlong<S: ByteSource + ?Sized>(source: &mut S) -> Result<i64> {
    Ok(zigzag_decode_i64(read_vlong(source)?))
}

/// Writes a float in 1 to 5 bytes.
///
/// Integral values in `[-1, 125]` (except `-0.0`) take a single byte, other positive
/// values take 4 bytes and everything else takes 5.
pub fn write_zfloat<S: ByteSink + ?Sized>(sink: &mut S, f: f32) -> Result<()> {
    let int_val = f as i32;
    let bits = f.to_bits();
    if f == int_val as f32 && (-1..=ZFLOAT_MAX_INLINE).contains(&int_val) && bits != NEGATIVE_ZERO_FLOAT
    {
        sink.write_byte(0x80 | (1 + int_val) as u8)
    } else if bits >> 31 == 0 {
        sink.write_byte((bits >> 24) as u8)?;
        write_fixed16(sink, (bits >> 8) as u16)?;
        sink.write_byte(bits as u8)
    } else {
        sink.write_byte(ZFLOAT_RAW)?;
        write_fixed32(sink, bits)
    }
}

pub fn read_zfloat<S: ByteSource + ?Sized>(source: &mut S) -> Result<f32> {
    let header = source.read_byte()?;
    if header == ZFLOAT_RAW {
        Ok(f32::from_bits(read_fixed32(source)?))
    } else if header & 0x80 != 0 {
        Ok(((header & 0x7F) as i32 - 1) as f32)
    } else {
        let bits = ((header as u32) << 24)
            | ((read_fixed16(source)? as u32) << 8)
            | source.read_byte()? as u32;
        Ok(f32::from_bits(bits))
    }
}

/// Writes a double in 1 to 9 bytes.
///
/// Integral values in `[-1, 124]` (except `-0.0`) take a single byte, values exactly
/// representable as `f32` take 5 bytes, other positive values take 8 and everything
/// else takes 9.
pub fn write_zdouble<S: ByteSink + ?Sized>(sink: &mut S, d: f64) -> Result<()> {
    let int_val = d as i32;
    let bits = d.to_bits();
    if d == int_val as f64
        && (-1..=ZDOUBLE_MAX_INLINE).contains(&int_val)
        && bits != NEGATIVE_ZERO_DOUBLE
    {
        sink.write_byte(0x80 | (int_val + 1) as u8)
    } else if d == (d as f32) as f64 {
        sink.write_byte(ZDOUBLE_FLOAT)?;
        write_fixed32(sink, (d as f32).to_bits())
    } else if bits >> 63 == 0 {
        sink.write_byte((bits >> 56) as u8)?;
        write_fixed32(sink, (bits >> 24) as u32)?;
        write_fixed16(sink, (bits >> 8) as u16)?;
        sink.write_byte(bits as u8)
    } else {
        sink.write_byte(ZFLOAT_RAW)?;
        write_fixed64(sink, bits)
    }
}

pub fn read_zdouble<S: ByteSource + ?Sized>(source: &mut S) -> Result<f64> {
    let header = source.read_byte()?;
    if header == ZFLOAT_RAW {
        Ok(f64::from_bits(read_fixed64(source)?))
    } else if header == ZDOUBLE_FLOAT {
        Ok(f32::from_bits(read_fixed32(source)?) as f64)
    } else if header & 0x80 != 0 {
        Ok(((header & 0x7F) as i32 - 1) as f64)
    } else {
        let bits = ((header as u64) << 56)
            | ((read_fixed32(source)? as u64) << 24)
            | ((read_fixed16(source)? as u64) << 8)
            | source.read_byte()? as u64;
        Ok(f64::from_bits(bits))
    }
}

/// Writes a millisecond timestamp.
///
/// Header layout: bits 6-7 hold the unit (`00` raw, `01` second, `10` hour, `11` day),
/// bit 5 is the continuation flag and bits 0-4 hold the low bits of the zigzag value.
/// The remaining zigzag bits, if any, follow as a vlong.
pub fn write_tlong<S: ByteSink + ?Sized>(sink: &mut S, mut value: i64) -> Result<()> {
    let mut header = if value % SECOND != 0 {
        0
    } else if value % DAY == 0 {
        value /= DAY;
        DAY_ENCODING
    } else if value % HOUR == 0 {
        value /= HOUR;
        HOUR_ENCODING
    } else {
        value /= SECOND;
        SECOND_ENCODING
    };

    let zigzag = zigzag_encode_i64(value);
    header |= (zigzag as u8) & TLONG_INLINE_MASK;
    let upper_bits = zigzag >> 5;
    if upper_bits != 0 {
        header |= TLONG_CONTINUATION;
    }
    sink.write_byte(header)?;
    if upper_bits != 0 {
        write_vlong(sink, upper_bits)?;
    }
    Ok(())
}

pub fn read_tlong<S: ByteSource + ?Sized>(source: &mut S) -> Result<i64> {
    let header = source.read_byte()?;
    let mut bits = (header & TLONG_INLINE_MASK) as u64;
    if header & TLONG_CONTINUATION != 0 {
        let upper_bits = read_vlong(source)?;
        if upper_bits >> 59 != 0 {
            return Err(Error::encoding("tlong", "too many bits"));
        }
        bits |= upper_bits << 5;
    }
    let value = zigzag_decode_i64(bits);
    let unit = match header & DAY_ENCODING {
        SECOND_ENCODING => SECOND,
        HOUR_ENCODING => HOUR,
        DAY_ENCODING => DAY,
        _ => return Ok(value),
    };
    value
        .checked_mul(unit)
        .ok_or_else(|| Error::encoding("tlong", "scaled value overflows"))
}

/// Writes the UTF-8 byte length as a vint, followed by the raw bytes.
pub fn write_string<S: ByteSink + ?Sized>(sink: &mut S, s: &str) -> Result<()> {
    let len = u32::try_from(s.len())
        .map_err(|_| Error::invalid_arg("s", "string longer than u32::MAX bytes"))?;
    write_vint(sink, len)?;
    sink.write_bytes(s.as_bytes())
}

pub fn read_string<S: ByteSource + ?Sized>(source: &mut S) -> Result<String> {
    let bytes = read_length_prefixed(source)?;
    String::from_utf8(bytes).map_err(|e| Error::encoding("string", e.to_string()))
}

/// Writes a vint length followed by the raw bytes.
pub fn write_length_prefixed<S: ByteSink + ?Sized>(sink: &mut S, bytes: &[u8]) -> Result<()> {
    let len = u32::try_from(bytes.len())
        .map_err(|_| Error::invalid_arg("bytes", "longer than u32::MAX bytes"))?;
    write_vint(sink, len)?;
    sink.write_bytes(bytes)
}

pub fn read_length_prefixed<S: ByteSource + ?Sized>(source: &mut S) -> Result<Vec<u8>> {
    let len = read_vint(source)? as usize;
    let mut bytes = vec![0u8; len];
    source.read_bytes(&mut bytes)?;
    Ok(bytes)
}
