//! Frame-of-reference bit packing for fixed-size blocks of integers.
//!
//! A block of [`BLOCK_SIZE`] values is stored with a single bit width `b`:
//! value `i` occupies bits `i*b .. i*b+b` of a little-endian stream of 32-bit
//! words, with the low bits in the current word and any remaining high bits
//! in the next one. A block whose values are all equal is stored with `b = 0`
//! and a single integer.
//!
//! On disk a block is `[b: u8]` followed by `b * BLOCK_SIZE / 32` words, or by
//! one `u32` when `b = 0`.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{QuiverError, Result};
use crate::storage::structured::ByteReader;

/// Number of values per packed block.
pub const BLOCK_SIZE: usize = 128;

/// Widest supported bit width.
pub const MAX_BITS: u32 = 32;

/// Words needed to hold a packed block at the widest width.
pub const MAX_ENCODED_WORDS: usize = BLOCK_SIZE * MAX_BITS as usize / 32;

#[inline]
const fn mask(bits: u32) -> u32 {
    if bits >= 32 { u32::MAX } else { (1u32 << bits) - 1 }
}

/// Bit width required to store `block`.
///
/// Returns 0 when every value is equal, otherwise the smallest width that
/// holds every value.
pub fn num_bits(block: &[u32]) -> u32 {
    let Some(&first) = block.first() else {
        return 0;
    };
    if block.iter().all(|&v| v == first) {
        return 0;
    }
    let mut bits = 1;
    for &value in block {
        while value & !mask(bits) != 0 {
            bits += 1;
        }
    }
    bits
}

/// Encoded size in bytes of a block packed with `bits` per value.
pub fn encoded_size(bits: u32) -> usize {
    if bits == 0 {
        4
    } else {
        bits as usize * BLOCK_SIZE / 8
    }
}

/// Number of 32-bit words a block packed with `bits` occupies.
pub fn encoded_words(bits: u32) -> usize {
    encoded_size(bits) / 4
}

fn check_block_len(len: usize) -> Result<()> {
    if len != BLOCK_SIZE {
        return Err(QuiverError::invalid_operation(format!(
            "block must hold exactly {BLOCK_SIZE} values, got {len}"
        )));
    }
    Ok(())
}

/// Pack `block` at `bits` per value into `packed`.
///
/// Returns the number of words written. Fails when a value does not fit in
/// `bits` or when `bits` is 0 and the values are not all equal.
pub fn compress(block: &[u32], bits: u32, packed: &mut [u32]) -> Result<usize> {
    check_block_len(block.len())?;
    if bits > MAX_BITS {
        return Err(QuiverError::invalid_operation(format!(
            "unsupported bit width {bits}"
        )));
    }
    let words = encoded_words(bits);
    if packed.len() < words {
        return Err(QuiverError::invalid_operation(format!(
            "packed buffer holds {} words, need {words}",
            packed.len()
        )));
    }

    if bits == 0 {
        let value = block[0];
        if block.iter().any(|&v| v != value) {
            return Err(QuiverError::invalid_operation(
                "bit width 0 requires all values to be equal",
            ));
        }
        packed[0] = value;
        return Ok(1);
    }

    let packed = &mut packed[..words];
    packed.fill(0);
    let value_mask = mask(bits);
    for (i, &value) in block.iter().enumerate() {
        if value & !value_mask != 0 {
            return Err(QuiverError::invalid_operation(format!(
                "value {value} at index {i} exceeds {bits} bits"
            )));
        }
        let bit = i * bits as usize;
        let word = bit >> 5;
        let shift = (bit & 31) as u32;
        packed[word] |= value << shift;
        if shift + bits > 32 {
            packed[word + 1] |= value >> (32 - shift);
        }
    }
    Ok(words)
}

#[inline(always)]
fn unpack<const BITS: u32>(packed: &[u32], out: &mut [u32]) {
    let value_mask = mask(BITS);
    for (i, slot) in out.iter_mut().enumerate().take(BLOCK_SIZE) {
        let bit = i * BITS as usize;
        let word = bit >> 5;
        let shift = (bit & 31) as u32;
        let mut value = packed[word] >> shift;
        if shift + BITS > 32 {
            value |= packed[word + 1] << (32 - shift);
        }
        *slot = value & value_mask;
    }
}

macro_rules! unpack_dispatch {
    ($bits:expr, $packed:expr, $out:expr; $($width:literal)+) => {
        match $bits {
            $($width => unpack::<$width>($packed, $out),)+
            other => {
                return Err(QuiverError::invalid_operation(format!(
                    "unsupported bit width {other}"
                )))
            }
        }
    };
}

/// Unpack a block packed at `bits` per value into `out`.
pub fn decompress(bits: u32, packed: &[u32], out: &mut [u32]) -> Result<()> {
    check_block_len(out.len())?;
    if packed.len() < encoded_words(bits) {
        return Err(QuiverError::invalid_operation(format!(
            "packed buffer holds {} words, need {}",
            packed.len(),
            encoded_words(bits)
        )));
    }
    if bits == 0 {
        out.fill(packed[0]);
        return Ok(());
    }
    unpack_dispatch!(bits, packed, out;
        1 2 3 4 5 6 7 8 9 10 11 12 13 14 15 16
        17 18 19 20 21 22 23 24 25 26 27 28 29 30 31 32);
    Ok(())
}

/// Width-agnostic unpack loop. Slower than [`decompress`] but used as the
/// reference for it.
pub fn decompress_generic(bits: u32, packed: &[u32], out: &mut [u32]) {
    if bits == 0 {
        out.fill(packed[0]);
        return;
    }
    for (i, slot) in out.iter_mut().enumerate() {
        let mut value = 0u32;
        for b in 0..bits as usize {
            let bit = i * bits as usize + b;
            if (packed[bit >> 5] >> (bit & 31)) & 1 == 1 {
                value |= 1 << b;
            }
        }
        *slot = value;
    }
}

/// Append one self-describing block to `buf`.
pub fn write_block(
    block: &[u32],
    scratch: &mut [u32; MAX_ENCODED_WORDS],
    buf: &mut Vec<u8>,
) -> Result<()> {
    let bits = num_bits(block);
    let words = compress(block, bits, scratch)?;
    buf.push(bits as u8);
    let start = buf.len();
    buf.resize(start + words * 4, 0);
    LittleEndian::write_u32_into(&scratch[..words], &mut buf[start..]);
    Ok(())
}

/// Read one block written by [`write_block`].
pub fn read_block(
    input: &mut ByteReader<'_>,
    scratch: &mut [u32; MAX_ENCODED_WORDS],
    out: &mut [u32],
) -> Result<()> {
    let bits = input.read_u8()? as u32;
    if bits > MAX_BITS {
        return Err(QuiverError::corruption(
            input.resource(),
            format!("invalid bit width {bits}"),
        ));
    }
    let words = encoded_words(bits);
    let bytes = input.read_slice(words * 4)?;
    LittleEndian::read_u32_into(bytes, &mut scratch[..words]);
    decompress(bits, &scratch[..words], out)
}

/// Skip one block written by [`write_block`].
pub fn skip_block(input: &mut ByteReader<'_>) -> Result<()> {
    let bits = input.read_u8()? as u32;
    if bits > MAX_BITS {
        return Err(QuiverError::corruption(
            input.resource(),
            format!("invalid bit width {bits}"),
        ));
    }
    input.skip(encoded_size(bits))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng, rngs::StdRng};

    fn random_block(rng: &mut StdRng, bits: u32) -> Vec<u32> {
        (0..BLOCK_SIZE)
            .map(|_| rng.random::<u32>() & mask(bits))
            .collect()
    }

    #[test]
    fn test_num_bits() {
        assert_eq!(num_bits(&[7; BLOCK_SIZE]), 0);
        let mut block = vec![0u32; BLOCK_SIZE];
        block[3] = 1;
        assert_eq!(num_bits(&block), 1);
        block[9] = 255;
        assert_eq!(num_bits(&block), 8);
        block[10] = 256;
        assert_eq!(num_bits(&block), 9);
        block[11] = u32::MAX;
        assert_eq!(num_bits(&block), 32);
    }

    #[test]
    fn test_encoded_size() {
        assert_eq!(encoded_size(0), 4);
        assert_eq!(encoded_size(1), 16);
        assert_eq!(encoded_size(7), 112);
        assert_eq!(encoded_size(32), 512);
    }

    #[test]
    fn test_every_width_matches_generic_unpack() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let mut packed = [0u32; MAX_ENCODED_WORDS];
        for bits in 1..=MAX_BITS {
            for _ in 0..4 {
                let mut block = random_block(&mut rng, bits);
                // force the width to be exactly `bits`
                block[rng.random_range(1..BLOCK_SIZE)] = mask(bits);
                block[0] = 0;
                assert_eq!(num_bits(&block), bits);

                let words = compress(&block, bits, &mut packed).unwrap();
                assert_eq!(words * 4, encoded_size(bits));

                let mut fast = [0u32; BLOCK_SIZE];
                let mut slow = [0u32; BLOCK_SIZE];
                decompress(bits, &packed[..words], &mut fast).unwrap();
                decompress_generic(bits, &packed[..words], &mut slow);
                assert_eq!(&fast[..], &block[..], "bits={bits}");
                assert_eq!(fast, slow, "bits={bits}");
            }
        }
    }

    #[test]
    fn test_degenerate_block() {
        let block = [42u32; BLOCK_SIZE];
        let mut scratch = [0u32; MAX_ENCODED_WORDS];
        let mut buf = Vec::new();
        write_block(&block, &mut scratch, &mut buf).unwrap();
        assert_eq!(buf.len(), 1 + encoded_size(0));
        assert_eq!(buf[0], 0);

        let mut out = [0u32; BLOCK_SIZE];
        let mut reader = ByteReader::new(&buf, "block");
        read_block(&mut reader, &mut scratch, &mut out).unwrap();
        assert!(out.iter().all(|&v| v == 42));
        assert!(reader.is_eof());
    }

    #[test]
    fn test_value_exceeding_width_is_rejected() {
        let mut block = vec![1u32; BLOCK_SIZE];
        block[5] = 16;
        let mut packed = [0u32; MAX_ENCODED_WORDS];
        assert!(matches!(
            compress(&block, 4, &mut packed),
            Err(QuiverError::InvalidOperation(_))
        ));
        assert!(compress(&block, 0, &mut packed).is_err());
        assert!(compress(&block[..10], 5, &mut packed).is_err());
    }

    #[test]
    fn test_straddling_values_land_in_next_word() {
        // 5-bit values: index 6 starts at bit 30 and spills 3 bits into word 1
        let mut block = vec![0u32; BLOCK_SIZE];
        block[6] = 0b11111;
        let mut packed = [0u32; MAX_ENCODED_WORDS];
        compress(&block, 5, &mut packed).unwrap();
        assert_eq!(packed[0], 0b11 << 30);
        assert_eq!(packed[1], 0b111);
    }

    #[test]
    fn test_skip_block() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut scratch = [0u32; MAX_ENCODED_WORDS];
        let mut buf = Vec::new();
        let first = random_block(&mut rng, 11);
        let second = random_block(&mut rng, 3);
        write_block(&first, &mut scratch, &mut buf).unwrap();
        write_block(&second, &mut scratch, &mut buf).unwrap();

        let mut reader = ByteReader::new(&buf, "blocks");
        skip_block(&mut reader).unwrap();
        let mut out = [0u32; BLOCK_SIZE];
        read_block(&mut reader, &mut scratch, &mut out).unwrap();
        assert_eq!(&out[..], &second[..]);
    }
}
