//! Structured binary I/O for index files.
//!
//! [`StructWriter`] streams little-endian integers, variable-length integers
//! and length-prefixed byte strings into a [`StorageOutput`] while keeping a
//! running CRC-32 of everything written. [`ByteReader`] decodes the same
//! primitives from an in-memory slice with bounds checks that report
//! truncation as corruption.

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};

use crate::error::{QuiverError, Result};
use crate::storage::StorageOutput;
use crate::util::varint;

/// A structured file writer for binary data.
pub struct StructWriter<W: StorageOutput> {
    writer: W,
    hasher: crc32fast::Hasher,
    position: u64,
}

impl<W: StorageOutput> StructWriter<W> {
    /// Create a new structured file writer.
    pub fn new(writer: W) -> Self {
        StructWriter {
            writer,
            hasher: crc32fast::Hasher::new(),
            position: 0,
        }
    }

    /// Write a u8 value.
    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.writer.write_u8(value)?;
        self.update(&[value]);
        Ok(())
    }

    /// Write a u32 value (little-endian).
    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        self.writer.write_u32::<LittleEndian>(value)?;
        self.update(&value.to_le_bytes());
        Ok(())
    }

    /// Write a u64 value (little-endian).
    pub fn write_u64(&mut self, value: u64) -> Result<()> {
        self.writer.write_u64::<LittleEndian>(value)?;
        self.update(&value.to_le_bytes());
        Ok(())
    }

    /// Write a variable-length integer.
    pub fn write_varint(&mut self, value: u64) -> Result<()> {
        let encoded = varint::encode_u64(value);
        self.write_raw(&encoded)
    }

    /// Write a string with length prefix.
    pub fn write_string(&mut self, value: &str) -> Result<()> {
        self.write_bytes(value.as_bytes())
    }

    /// Write raw bytes with length prefix.
    pub fn write_bytes(&mut self, value: &[u8]) -> Result<()> {
        self.write_varint(value.len() as u64)?;
        self.write_raw(value)
    }

    /// Write raw bytes without length prefix.
    pub fn write_raw(&mut self, value: &[u8]) -> Result<()> {
        self.writer.write_all(value)?;
        self.update(value);
        Ok(())
    }

    /// Get current file position.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// CRC-32 of every byte written so far.
    pub fn checksum(&self) -> u32 {
        self.hasher.clone().finalize()
    }

    fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
        self.position += data.len() as u64;
    }

    /// Flush, sync and close the underlying output.
    pub fn close(mut self) -> Result<()> {
        self.writer.flush_and_sync()?;
        self.writer.close()?;
        Ok(())
    }
}

/// A bounds-checked cursor over an in-memory byte slice.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
    resource: &'a str,
}

impl<'a> ByteReader<'a> {
    /// Create a reader over `data`. `resource` names the file in errors.
    pub fn new(data: &'a [u8], resource: &'a str) -> Self {
        ByteReader {
            data,
            pos: 0,
            resource,
        }
    }

    /// Create a reader positioned at `pos`.
    pub fn at(data: &'a [u8], pos: usize, resource: &'a str) -> Result<Self> {
        let mut reader = Self::new(data, resource);
        reader.seek(pos)?;
        Ok(reader)
    }

    fn truncated(&self, wanted: usize) -> QuiverError {
        QuiverError::corruption(
            self.resource,
            format!(
                "read past EOF: wanted {wanted} bytes at offset {} of {}",
                self.pos,
                self.data.len()
            ),
        )
    }

    /// Read exactly `len` bytes without copying.
    pub fn read_slice(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| self.truncated(len))?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    /// Read a u8 value.
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_slice(1)?[0])
    }

    /// Read a u32 value (little-endian).
    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(LittleEndian::read_u32(self.read_slice(4)?))
    }

    /// Read a u64 value (little-endian).
    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(LittleEndian::read_u64(self.read_slice(8)?))
    }

    /// Read a variable-length integer.
    pub fn read_varint(&mut self) -> Result<u64> {
        let (value, len) = varint::decode_u64(&self.data[self.pos..])
            .map_err(|e| QuiverError::corruption(self.resource, e.to_string()))?;
        self.pos += len;
        Ok(value)
    }

    /// Read a variable-length integer that must fit in 32 bits.
    pub fn read_varint_u32(&mut self) -> Result<u32> {
        let value = self.read_varint()?;
        u32::try_from(value).map_err(|_| {
            QuiverError::corruption(self.resource, format!("value {value} exceeds 32 bits"))
        })
    }

    /// Read a variable-length integer used as a length or count.
    pub fn read_len(&mut self) -> Result<usize> {
        let value = self.read_varint()?;
        usize::try_from(value)
            .ok()
            .filter(|&n| n <= self.data.len())
            .ok_or_else(|| {
                QuiverError::corruption(self.resource, format!("implausible length {value}"))
            })
    }

    /// Read bytes with length prefix.
    pub fn read_bytes(&mut self) -> Result<&'a [u8]> {
        let len = self.read_len()?;
        self.read_slice(len)
    }

    /// Read a string with length prefix.
    pub fn read_string(&mut self) -> Result<String> {
        let bytes = self.read_bytes()?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| QuiverError::corruption(self.resource, format!("Invalid UTF-8: {e}")))
    }

    /// Move to an absolute offset.
    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(QuiverError::corruption(
                self.resource,
                format!("seek to {pos} beyond length {}", self.data.len()),
            ));
        }
        self.pos = pos;
        Ok(())
    }

    /// Skip `len` bytes.
    pub fn skip(&mut self, len: usize) -> Result<()> {
        self.read_slice(len).map(|_| ())
    }

    /// Current offset.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left to read.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Whether every byte has been consumed.
    pub fn is_eof(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// The underlying slice.
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// The resource name used in error messages.
    pub fn resource(&self) -> &'a str {
        self.resource
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Storage;
    use crate::storage::memory::MemoryStorage;

    #[test]
    fn test_write_then_read_primitives() {
        let storage = MemoryStorage::default();
        let output = storage.create_output("test.bin").unwrap();
        let mut writer = StructWriter::new(output);

        writer.write_u8(42).unwrap();
        writer.write_u32(0xDEAD_BEEF).unwrap();
        writer.write_u64(u64::MAX - 1).unwrap();
        writer.write_varint(300).unwrap();
        writer.write_string("quiver").unwrap();
        writer.write_bytes(&[1, 2, 3]).unwrap();
        assert_eq!(writer.position(), 1 + 4 + 8 + 2 + 7 + 4);
        writer.close().unwrap();

        let data = storage.get_file("test.bin").unwrap();
        let mut reader = ByteReader::new(&data, "test.bin");
        assert_eq!(reader.read_u8().unwrap(), 42);
        assert_eq!(reader.read_u32().unwrap(), 0xDEAD_BEEF);
        assert_eq!(reader.read_u64().unwrap(), u64::MAX - 1);
        assert_eq!(reader.read_varint().unwrap(), 300);
        assert_eq!(reader.read_string().unwrap(), "quiver");
        assert_eq!(reader.read_bytes().unwrap(), &[1, 2, 3]);
        assert!(reader.is_eof());
    }

    #[test]
    fn test_checksum_covers_all_bytes() {
        let storage = MemoryStorage::default();
        let mut writer = StructWriter::new(storage.create_output("c.bin").unwrap());
        writer.write_raw(b"hello ").unwrap();
        writer.write_raw(b"world").unwrap();
        assert_eq!(writer.checksum(), crc32fast::hash(b"hello world"));
    }

    #[test]
    fn test_truncated_reads_are_corruption() {
        let data = [1u8, 2, 3];
        let mut reader = ByteReader::new(&data, "short.bin");
        assert!(reader.read_u32().unwrap_err().is_corruption());
        assert_eq!(reader.position(), 0);
        assert!(reader.seek(4).is_err());
        reader.seek(3).unwrap();
        assert!(reader.read_u8().is_err());

        let mut reader = ByteReader::new(&[0xFF, 0x01], "len.bin");
        assert!(reader.read_bytes().is_err());
    }
}
