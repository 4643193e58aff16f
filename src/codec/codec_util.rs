//! Versioned headers and checksummed footers shared by every index file.
//!
//! Layout (little-endian):
//!
//! ```text
//! header: u32 CODEC_MAGIC | vint len + codec name (ASCII, < 128 bytes) | u32 version
//! footer: u32 FOOTER_MAGIC | u32 algorithm id (0) | u64 crc32 of all preceding bytes
//! ```

use log::trace;

use crate::error::{QuiverError, Result};
use crate::storage::StorageOutput;
use crate::storage::structured::{ByteReader, StructWriter};

/// Magic number that starts every file.
pub const CODEC_MAGIC: u32 = 0x3fd7_6c17;

/// Magic number that starts every footer.
pub const FOOTER_MAGIC: u32 = !CODEC_MAGIC;

/// Length in bytes of a footer.
pub const FOOTER_LENGTH: usize = 16;

/// Length in bytes of a header written for `codec`.
pub fn header_length(codec: &str) -> usize {
    9 + codec.len()
}

/// Write a codec header.
pub fn write_header<W: StorageOutput>(
    out: &mut StructWriter<W>,
    codec: &str,
    version: u32,
) -> Result<()> {
    if !codec.is_ascii() || codec.len() >= 128 {
        return Err(QuiverError::invalid_operation(format!(
            "codec must be simple ASCII, less than 128 characters in length [got {codec}]"
        )));
    }
    out.write_u32(CODEC_MAGIC)?;
    out.write_string(codec)?;
    out.write_u32(version)?;
    Ok(())
}

/// Validate a codec header and return its version.
pub fn check_header(
    input: &mut ByteReader<'_>,
    codec: &str,
    min_version: u32,
    max_version: u32,
) -> Result<u32> {
    let magic = input.read_u32()?;
    if magic != CODEC_MAGIC {
        return Err(QuiverError::corruption(
            input.resource(),
            format!("codec header mismatch: actual header={magic:#x} vs expected header={CODEC_MAGIC:#x}"),
        ));
    }
    let actual = input.read_string()?;
    if actual != codec {
        return Err(QuiverError::corruption(
            input.resource(),
            format!("codec mismatch: actual codec={actual} vs expected codec={codec}"),
        ));
    }
    let version = input.read_u32()?;
    if version < min_version || version > max_version {
        return Err(QuiverError::UnsupportedVersion {
            codec: codec.to_string(),
            version,
            min: min_version,
            max: max_version,
        });
    }
    Ok(version)
}

/// Write a footer whose checksum covers everything written before it.
pub fn write_footer<W: StorageOutput>(out: &mut StructWriter<W>) -> Result<()> {
    out.write_u32(FOOTER_MAGIC)?;
    out.write_u32(0)?;
    let checksum = out.checksum();
    out.write_u64(checksum as u64)?;
    Ok(())
}

/// Validate the footer at the end of `data` and return the stored checksum.
pub fn check_footer(data: &[u8], resource: &str) -> Result<u32> {
    if data.len() < FOOTER_LENGTH {
        return Err(QuiverError::corruption(
            resource,
            format!(
                "misplaced codec footer (file truncated?): length={}, expected at least {FOOTER_LENGTH}",
                data.len()
            ),
        ));
    }
    let footer_start = data.len() - FOOTER_LENGTH;
    let mut footer = ByteReader::at(data, footer_start, resource)?;
    let magic = footer.read_u32()?;
    if magic != FOOTER_MAGIC {
        return Err(QuiverError::corruption(
            resource,
            format!("codec footer mismatch: actual footer={magic:#x} vs expected footer={FOOTER_MAGIC:#x}"),
        ));
    }
    let algorithm = footer.read_u32()?;
    if algorithm != 0 {
        return Err(QuiverError::corruption(
            resource,
            format!("codec footer mismatch: unknown algorithmID: {algorithm}"),
        ));
    }
    let expected = footer.read_u64()?;
    let actual = crc32fast::hash(&data[..data.len() - 8]) as u64;
    if expected != actual {
        return Err(QuiverError::corruption(
            resource,
            format!("checksum failed: expected={expected:x} actual={actual:x}"),
        ));
    }
    trace!("verified footer of {resource}: crc32={actual:x}");
    Ok(actual as u32)
}

/// Check footer and header of a whole file.
///
/// Returns the format version and a reader over the body, positioned after
/// the header and bounded before the footer.
pub fn open_checked<'a>(
    data: &'a [u8],
    resource: &'a str,
    codec: &str,
    min_version: u32,
    max_version: u32,
) -> Result<(u32, ByteReader<'a>)> {
    check_footer(data, resource)?;
    let body = &data[..data.len() - FOOTER_LENGTH];
    let mut reader = ByteReader::new(body, resource);
    let version = check_header(&mut reader, codec, min_version, max_version)?;
    Ok((version, reader))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Storage;
    use crate::storage::memory::MemoryStorage;

    fn write_file(storage: &MemoryStorage, codec: &str, version: u32, body: &[u8]) {
        let mut out = StructWriter::new(storage.create_output("f").unwrap());
        write_header(&mut out, codec, version).unwrap();
        assert_eq!(out.position() as usize, header_length(codec));
        out.write_raw(body).unwrap();
        write_footer(&mut out).unwrap();
        out.close().unwrap();
    }

    #[test]
    fn test_header_footer_round_trip() {
        let storage = MemoryStorage::default();
        write_file(&storage, "QuiverTest", 2, b"payload");
        let data = storage.get_file("f").unwrap();
        assert_eq!(data.len(), header_length("QuiverTest") + 7 + FOOTER_LENGTH);

        let (version, mut body) = open_checked(&data, "f", "QuiverTest", 1, 3).unwrap();
        assert_eq!(version, 2);
        assert_eq!(body.read_slice(7).unwrap(), b"payload");
        assert!(body.is_eof());
    }

    #[test]
    fn test_flipped_byte_fails_checksum() {
        let storage = MemoryStorage::default();
        write_file(&storage, "QuiverTest", 1, b"payload");
        let mut data = storage.get_file("f").unwrap().to_vec();
        let idx = header_length("QuiverTest") + 2;
        data[idx] ^= 0x40;
        let err = open_checked(&data, "f", "QuiverTest", 1, 1).unwrap_err();
        assert!(err.is_corruption());
        assert!(err.to_string().contains("checksum failed"));
    }

    #[test]
    fn test_wrong_codec_and_version() {
        let storage = MemoryStorage::default();
        write_file(&storage, "QuiverTest", 5, b"");
        let data = storage.get_file("f").unwrap();

        let err = open_checked(&data, "f", "Other", 1, 5).unwrap_err();
        assert!(err.to_string().contains("codec mismatch"));

        match open_checked(&data, "f", "QuiverTest", 1, 4).unwrap_err() {
            QuiverError::UnsupportedVersion { version, max, .. } => {
                assert_eq!(version, 5);
                assert_eq!(max, 4);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_truncated_file() {
        assert!(check_footer(&[0u8; 10], "tiny").unwrap_err().is_corruption());
    }

    #[test]
    fn test_rejects_non_ascii_codec() {
        let storage = MemoryStorage::default();
        let mut out = StructWriter::new(storage.create_output("g").unwrap());
        assert!(write_header(&mut out, "códec", 1).is_err());
    }
}
