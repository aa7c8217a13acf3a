//! Little-endian fixed-width integers, 7-bit varints and length-prefixed
//! UTF-8 strings over blocking `Read`/`Write`.

use std::io::Read;
use std::io::Write;

use crate::constants::MAX_STRING_LENGTH;
use crate::CodecError;

pub fn write_u8<W: Write + ?Sized>(
    w: &mut W,
    value: u8,
) -> Result<(), CodecError> {
    w.write_all(&[value])?;
    Ok(())
}

pub fn read_u8<R: Read + ?Sized>(r: &mut R) -> Result<u8, CodecError> {
    let mut buf = [0u8; 1];
    r.read_exact(&mut buf)?;
    Ok(buf[0])
}

pub fn write_bool<W: Write + ?Sized>(
    w: &mut W,
    value: bool,
) -> Result<(), CodecError> {
    write_u8(w, value as u8)
}

pub fn read_bool<R: Read + ?Sized>(r: &mut R) -> Result<bool, CodecError> {
    match read_u8(r)? {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(CodecError::InvalidLength {
            field: "boolean",
            length: u64::from(other),
        }),
    }
}

pub fn write_i32<W: Write + ?Sized>(
    w: &mut W,
    value: i32,
) -> Result<(), CodecError> {
    w.write_all(&value.to_le_bytes())?;
    Ok(())
}

pub fn read_i32<R: Read + ?Sized>(r: &mut R) -> Result<i32, CodecError> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(i32::from_le_bytes(buf))
}

pub fn write_i64<W: Write + ?Sized>(
    w: &mut W,
    value: i64,
) -> Result<(), CodecError> {
    w.write_all(&value.to_le_bytes())?;
    Ok(())
}

pub fn read_i64<R: Read + ?Sized>(r: &mut R) -> Result<i64, CodecError> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(i64::from_le_bytes(buf))
}

pub fn write_varint<W: Write + ?Sized>(
    w: &mut W,
    mut value: u64,
) -> Result<(), CodecError> {
    let mut buf = [0u8; 10];
    let mut len = 0;
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            buf[len] = byte;
            len += 1;
            break;
        }
        buf[len] = byte | 0x80;
        len += 1;
    }
    w.write_all(&buf[..len])?;
    Ok(())
}

pub fn read_varint<R: Read + ?Sized>(r: &mut R) -> Result<u64, CodecError> {
    let mut value: u64 = 0;
    for shift in (0..64).step_by(7) {
        let byte = read_u8(r)?;
        value |= u64::from(byte & 0x7F) << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
    }
    Err(CodecError::InvalidLength {
        field: "varint",
        length: value,
    })
}

pub fn write_string<W: Write + ?Sized>(
    w: &mut W,
    value: &str,
) -> Result<(), CodecError> {
    write_varint(w, value.len() as u64)?;
    w.write_all(value.as_bytes())?;
    Ok(())
}

pub fn read_string<R: Read + ?Sized>(
    r: &mut R,
    field: &'static str,
) -> Result<String, CodecError> {
    let length = read_varint(r)?;
    if length > MAX_STRING_LENGTH {
        return Err(CodecError::InvalidLength { field, length });
    }
    let mut buf = vec![0u8; length as usize];
    r.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|_| CodecError::InvalidUtf8(field))
}

pub fn write_nullable_string<W: Write + ?Sized>(
    w: &mut W,
    value: Option<&str>,
) -> Result<(), CodecError> {
    match value {
        Some(v) => {
            write_bool(w, true)?;
            write_string(w, v)
        }
        None => write_bool(w, false),
    }
}

pub fn read_nullable_string<R: Read + ?Sized>(
    r: &mut R,
    field: &'static str,
) -> Result<Option<String>, CodecError> {
    if read_bool(r)? {
        read_string(r, field).map(Some)
    } else {
        Ok(None)
    }
}

/// Reads a 16-byte identifier stored in mixed-endian GUID order and formats
/// it as `xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx`.
pub fn read_guid<R: Read + ?Sized>(r: &mut R) -> Result<String, CodecError> {
    let mut b = [0u8; 16];
    r.read_exact(&mut b)?;
    let d1 = u32::from_le_bytes([b[0], b[1], b[2], b[3]]);
    let d2 = u16::from_le_bytes([b[4], b[5]]);
    let d3 = u16::from_le_bytes([b[6], b[7]]);
    Ok(format!(
        "{d1:08x}-{d2:04x}-{d3:04x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
        b[8], b[9], b[10], b[11], b[12], b[13], b[14], b[15]
    ))
}

/// Inverse of [`read_guid`]; used to produce legacy streams.
pub fn write_guid<W: Write + ?Sized>(
    w: &mut W,
    value: &str,
) -> Result<(), CodecError> {
    let hex: String = value.chars().filter(|c| *c != '-').collect();
    if hex.len() != 32 || !hex.is_ascii() {
        return Err(CodecError::InvalidRecord("source id is not a 16-byte identifier"));
    }
    let mut raw = [0u8; 16];
    for (i, slot) in raw.iter_mut().enumerate() {
        *slot = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16)
            .map_err(|_| CodecError::InvalidRecord("source id is not a 16-byte identifier"))?;
    }
    raw[0..4].reverse();
    raw[4..6].reverse();
    raw[6..8].reverse();
    w.write_all(&raw)?;
    Ok(())
}
