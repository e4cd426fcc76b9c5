//! Position-tracking byte cursors for the binary chart format.
//!
//! All multi-byte fields are little-endian. Strings are NUL-terminated and
//! variable length, so the reader scans for the terminator instead of
//! consuming a fixed-size field.

use crate::error::{Error, Result};

pub(crate) struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn set_position(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(Error::InvalidChart(format!(
                "seek to {pos} exceeds document length {}",
                self.data.len()
            )));
        }
        self.pos = pos;
        Ok(())
    }

    pub fn skip(&mut self, count: usize) -> Result<()> {
        self.set_position(self.pos + count)
    }

    fn take(&mut self, count: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(count).ok_or_else(|| {
            Error::InvalidChart(format!("offset overflow at position {}", self.pos))
        })?;
        if end > self.data.len() {
            return Err(Error::InvalidChart(format!(
                "read of {count} bytes at offset {} exceeds document length {}",
                self.pos,
                self.data.len()
            )));
        }
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let bytes = self.take(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        let bytes = self.take(4)?;
        Ok(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        let bytes = self.take(4)?;
        Ok(f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Reads a NUL-terminated UTF-8 string and advances past the terminator.
    pub fn read_cstr(&mut self) -> Result<String> {
        let rest = &self.data[self.pos..];
        let len = rest.iter().position(|&b| b == 0).ok_or_else(|| {
            Error::InvalidChart(format!("unterminated string at offset {}", self.pos))
        })?;
        let text = std::str::from_utf8(&rest[..len])
            .map_err(|e| Error::Encoding(format!("string at offset {}: {e}", self.pos)))?
            .to_string();
        self.pos += len + 1;
        Ok(text)
    }
}

#[derive(Default)]
pub(crate) struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn position(&self) -> usize {
        self.buf.len()
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }

    pub fn write_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_i32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_f32(&mut self, value: f32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_cstr(&mut self, value: &str) -> Result<()> {
        if value.as_bytes().contains(&0) {
            return Err(Error::InvalidChart(
                "string field contains a NUL byte".to_string(),
            ));
        }
        self.buf.extend_from_slice(value.as_bytes());
        self.buf.push(0);
        Ok(())
    }

    pub fn fill_zero(&mut self, count: usize) {
        self.buf.resize(self.buf.len() + count, 0);
    }

    /// Overwrites a previously reserved u32 slot, for address tables written
    /// after their targets.
    pub fn patch_u32(&mut self, offset: usize, value: u32) -> Result<()> {
        let end = offset + 4;
        if end > self.buf.len() {
            return Err(Error::InvalidChart(format!(
                "patch at offset {offset} exceeds document length {}",
                self.buf.len()
            )));
        }
        self.buf[offset..end].copy_from_slice(&value.to_le_bytes());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_reads() {
        let data = [0x78, 0x56, 0x34, 0x12, 0x00, 0x00, 0x80, 0x3f];
        let mut reader = ByteReader::new(&data);
        assert_eq!(reader.read_u32().unwrap(), 0x1234_5678);
        assert_eq!(reader.read_f32().unwrap(), 1.0);
        assert_eq!(reader.position(), 8);
    }

    #[test]
    fn test_cstr_round_trip() {
        let mut writer = ByteWriter::new();
        writer.write_cstr("abc").unwrap();
        writer.write_u32(7);
        let bytes = writer.into_inner();
        let mut reader = ByteReader::new(&bytes);
        assert_eq!(reader.read_cstr().unwrap(), "abc");
        assert_eq!(reader.read_u32().unwrap(), 7);
    }

    #[test]
    fn test_cstr_rejects_nul() {
        let mut writer = ByteWriter::new();
        assert!(writer.write_cstr("a\0b").is_err());
    }

    #[test]
    fn test_truncated_read_errors() {
        let data = [0x01, 0x02];
        let mut reader = ByteReader::new(&data);
        assert!(reader.read_u32().is_err());
    }

    #[test]
    fn test_unterminated_cstr_errors() {
        let data = [b'a', b'b'];
        let mut reader = ByteReader::new(&data);
        assert!(reader.read_cstr().is_err());
    }

    #[test]
    fn test_patch_u32() {
        let mut writer = ByteWriter::new();
        writer.fill_zero(4);
        writer.write_u32(9);
        writer.patch_u32(0, 0xdead).unwrap();
        let bytes = writer.into_inner();
        let mut reader = ByteReader::new(&bytes);
        assert_eq!(reader.read_u32().unwrap(), 0xdead);
        assert_eq!(reader.read_u32().unwrap(), 9);
    }
}
