//! Framed, versioned binary encoding for catalog snapshots.
//!
//! Layout rules, applied uniformly to every record:
//! - a record opens with the `RECORD_BEGIN` marker and a u16 format
//!   version, and closes with `RECORD_END`;
//! - fields added in later format versions are gated on that version at
//!   read time (`if version >= N { read } else { default }`), so every
//!   snapshot ever written stays loadable;
//! - lists are framed with a u32 element count followed by its bitwise
//!   complement, and each element is preceded by `ELEMENT_MARK`;
//! - all integers are little-endian; strings are u32 length + UTF-8 bytes.
//!
//! A version newer than the reader supports is a fatal
//! [`CatalogError::FormatVersion`]; any marker or complement mismatch is a
//! fatal [`CatalogError::Corrupt`].

use crate::error::{CatalogError, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

pub const RECORD_BEGIN: u8 = 0xA5;
pub const RECORD_END: u8 = 0x5A;
pub const ELEMENT_MARK: u8 = 0xE7;

/// Upper bound for decoded strings and byte blobs. Anything larger is
/// treated as corruption rather than an allocation request.
const MAX_BLOB_LEN: u32 = 16 * 1024 * 1024;

pub struct FrameWriter<W: Write> {
    out: W,
}

impl<W: Write> FrameWriter<W> {
    pub fn new(out: W) -> Self {
        FrameWriter { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    pub fn begin_record(&mut self, version: u16) -> Result<()> {
        self.out.write_u8(RECORD_BEGIN)?;
        self.out.write_u16::<LittleEndian>(version)?;
        Ok(())
    }

    pub fn end_record(&mut self) -> Result<()> {
        self.out.write_u8(RECORD_END)?;
        Ok(())
    }

    pub fn begin_list(&mut self, count: u32) -> Result<()> {
        self.out.write_u32::<LittleEndian>(count)?;
        self.out.write_u32::<LittleEndian>(!count)?;
        Ok(())
    }

    pub fn element(&mut self) -> Result<()> {
        self.out.write_u8(ELEMENT_MARK)?;
        Ok(())
    }

    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.out.write_u8(value)?;
        Ok(())
    }

    pub fn write_u16(&mut self, value: u16) -> Result<()> {
        self.out.write_u16::<LittleEndian>(value)?;
        Ok(())
    }

    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        self.out.write_u32::<LittleEndian>(value)?;
        Ok(())
    }

    pub fn write_u64(&mut self, value: u64) -> Result<()> {
        self.out.write_u64::<LittleEndian>(value)?;
        Ok(())
    }

    pub fn write_i64(&mut self, value: i64) -> Result<()> {
        self.out.write_i64::<LittleEndian>(value)?;
        Ok(())
    }

    pub fn write_bool(&mut self, value: bool) -> Result<()> {
        self.out.write_u8(value as u8)?;
        Ok(())
    }

    pub fn write_str(&mut self, value: &str) -> Result<()> {
        self.out.write_u32::<LittleEndian>(value.len() as u32)?;
        self.out.write_all(value.as_bytes())?;
        Ok(())
    }

    pub fn write_bytes(&mut self, value: &[u8]) -> Result<()> {
        self.out.write_all(value)?;
        Ok(())
    }
}

pub struct FrameReader<R: Read> {
    input: R,
}

fn decode_err(err: std::io::Error) -> CatalogError {
    if err.kind() == std::io::ErrorKind::UnexpectedEof {
        CatalogError::Corrupt("unexpected end of snapshot".to_string())
    } else {
        CatalogError::Io(err)
    }
}

impl<R: Read> FrameReader<R> {
    pub fn new(input: R) -> Self {
        FrameReader { input }
    }

    /// Consume a record header and return its format version.
    ///
    /// `supported` is the newest version this build can decode; anything
    /// above it fails with [`CatalogError::FormatVersion`].
    pub fn begin_record(&mut self, supported: u16) -> Result<u16> {
        let marker = self.input.read_u8().map_err(decode_err)?;
        if marker != RECORD_BEGIN {
            return Err(CatalogError::Corrupt(format!(
                "expected record start marker, found {:#04x}",
                marker
            )));
        }
        let version = self.input.read_u16::<LittleEndian>().map_err(decode_err)?;
        if version > supported {
            return Err(CatalogError::FormatVersion {
                found: version,
                supported,
            });
        }
        Ok(version)
    }

    pub fn end_record(&mut self) -> Result<()> {
        let marker = self.input.read_u8().map_err(decode_err)?;
        if marker != RECORD_END {
            return Err(CatalogError::Corrupt(format!(
                "expected record end marker, found {:#04x}",
                marker
            )));
        }
        Ok(())
    }

    /// Consume a list header, verifying the count against its complement.
    pub fn begin_list(&mut self) -> Result<u32> {
        let count = self.input.read_u32::<LittleEndian>().map_err(decode_err)?;
        let complement = self.input.read_u32::<LittleEndian>().map_err(decode_err)?;
        if complement != !count {
            return Err(CatalogError::Corrupt(format!(
                "list count {} does not match its complement",
                count
            )));
        }
        Ok(count)
    }

    pub fn element(&mut self) -> Result<()> {
        let marker = self.input.read_u8().map_err(decode_err)?;
        if marker != ELEMENT_MARK {
            return Err(CatalogError::Corrupt(format!(
                "expected element marker, found {:#04x}",
                marker
            )));
        }
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        self.input.read_u8().map_err(decode_err)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        self.input.read_u16::<LittleEndian>().map_err(decode_err)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        self.input.read_u32::<LittleEndian>().map_err(decode_err)
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        self.input.read_u64::<LittleEndian>().map_err(decode_err)
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        self.input.read_i64::<LittleEndian>().map_err(decode_err)
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.input.read_u8().map_err(decode_err)? != 0)
    }

    pub fn read_str(&mut self) -> Result<String> {
        let len = self.input.read_u32::<LittleEndian>().map_err(decode_err)?;
        if len > MAX_BLOB_LEN {
            return Err(CatalogError::Corrupt(format!(
                "string length {} exceeds sanity limit",
                len
            )));
        }
        let mut buf = vec![0u8; len as usize];
        self.input.read_exact(&mut buf).map_err(decode_err)?;
        String::from_utf8(buf)
            .map_err(|_| CatalogError::Corrupt("string is not valid UTF-8".to_string()))
    }

    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        self.input.read_exact(buf).map_err(decode_err)
    }
}
