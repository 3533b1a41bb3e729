// Echograph Engine — Binary Codec Helpers
//
// Little-endian primitive readers/writers shared by the store and the
// content table. The on-disk formats are not self-describing beyond their
// headers, so every read distinguishes truncation from ordinary I/O failure.

use std::io::{Read, Write};

use crate::atoms::error::{EngineError, EngineResult};

// ── Reads ──────────────────────────────────────────────────────────────────

/// Fill `buf` exactly, turning a short read into a format error naming the
/// field that was being read.
fn read_exact_or_truncated<R: Read>(r: &mut R, buf: &mut [u8], what: &str) -> EngineResult<()> {
    r.read_exact(buf).map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            EngineError::format(format!("truncated file while reading {what}"))
        } else {
            EngineError::Io(e)
        }
    })
}

pub(crate) fn read_i32<R: Read>(r: &mut R, what: &str) -> EngineResult<i32> {
    let mut buf = [0u8; 4];
    read_exact_or_truncated(r, &mut buf, what)?;
    Ok(i32::from_le_bytes(buf))
}

pub(crate) fn read_u32<R: Read>(r: &mut R, what: &str) -> EngineResult<u32> {
    let mut buf = [0u8; 4];
    read_exact_or_truncated(r, &mut buf, what)?;
    Ok(u32::from_le_bytes(buf))
}

/// Read a header count field and validate it is non-negative.
pub(crate) fn read_count<R: Read>(r: &mut R, what: &str) -> EngineResult<usize> {
    let raw = read_i32(r, what)?;
    if raw < 0 {
        return Err(EngineError::format(format!("negative {what}: {raw}")));
    }
    Ok(raw as usize)
}

/// Read `len` f32 values into a vector.
pub(crate) fn read_f32_vec<R: Read>(r: &mut R, len: usize, what: &str) -> EngineResult<Vec<f32>> {
    let mut bytes = vec![0u8; len.checked_mul(4).ok_or_else(|| {
        EngineError::format(format!("{what} length overflows: {len}"))
    })?];
    read_exact_or_truncated(r, &mut bytes, what)?;
    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

/// Read a length-prefixed UTF-8 string (i32 byte length, then the bytes).
pub(crate) fn read_string<R: Read>(r: &mut R, what: &str) -> EngineResult<String> {
    let len = read_count(r, what)?;
    let mut bytes = vec![0u8; len];
    read_exact_or_truncated(r, &mut bytes, what)?;
    String::from_utf8(bytes)
        .map_err(|_| EngineError::format(format!("invalid UTF-8 in {what}")))
}

// ── Writes ─────────────────────────────────────────────────────────────────

pub(crate) fn write_i32<W: Write>(w: &mut W, value: i32) -> EngineResult<()> {
    w.write_all(&value.to_le_bytes())?;
    Ok(())
}

pub(crate) fn write_u32<W: Write>(w: &mut W, value: u32) -> EngineResult<()> {
    w.write_all(&value.to_le_bytes())?;
    Ok(())
}

pub(crate) fn write_f32_slice<W: Write>(w: &mut W, values: &[f32]) -> EngineResult<()> {
    for v in values {
        w.write_all(&v.to_le_bytes())?;
    }
    Ok(())
}

/// Write a length-prefixed UTF-8 string.
pub(crate) fn write_string<W: Write>(w: &mut W, value: &str) -> EngineResult<()> {
    write_i32(w, value.len() as i32)?;
    w.write_all(value.as_bytes())?;
    Ok(())
}
