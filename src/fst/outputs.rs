//! Output algebras for transducers.
//!
//! An output type must form a monoid with a "common prefix" operation so the
//! builder can push shared output toward the root:
//! `a == common(a, b).concat(a.subtract(common(a, b)))`.

use std::fmt::Debug;
use std::hash::Hash;

use crate::error::Result;
use crate::storage::structured::ByteReader;
use crate::util::varint;

/// Values attached to FST keys.
pub trait Output: Clone + Debug + PartialEq + Eq + Hash + Send + Sync + 'static {
    /// The identity element.
    fn zero() -> Self;

    fn is_zero(&self) -> bool;

    /// The largest output that prefixes both `self` and `other`.
    fn common(&self, other: &Self) -> Self;

    /// Remove `prefix` (which must prefix `self`) from the front of `self`.
    fn subtract(&self, prefix: &Self) -> Self;

    /// Append `suffix` to `self`.
    fn concat(&self, suffix: &Self) -> Self;

    fn encode(&self, buf: &mut Vec<u8>);

    fn decode(reader: &mut ByteReader<'_>) -> Result<Self>;
}

/// Non-negative integers under addition; the common prefix is the minimum.
impl Output for u64 {
    fn zero() -> Self {
        0
    }

    fn is_zero(&self) -> bool {
        *self == 0
    }

    fn common(&self, other: &Self) -> Self {
        (*self).min(*other)
    }

    fn subtract(&self, prefix: &Self) -> Self {
        debug_assert!(*prefix <= *self);
        self - prefix
    }

    fn concat(&self, suffix: &Self) -> Self {
        self + suffix
    }

    fn encode(&self, buf: &mut Vec<u8>) {
        varint::push_u64(buf, *self);
    }

    fn decode(reader: &mut ByteReader<'_>) -> Result<Self> {
        reader.read_varint()
    }
}

/// Byte strings under concatenation; the common prefix is the longest shared
/// prefix.
impl Output for Vec<u8> {
    fn zero() -> Self {
        Vec::new()
    }

    fn is_zero(&self) -> bool {
        self.is_empty()
    }

    fn common(&self, other: &Self) -> Self {
        let len = self
            .iter()
            .zip(other.iter())
            .take_while(|(a, b)| a == b)
            .count();
        self[..len].to_vec()
    }

    fn subtract(&self, prefix: &Self) -> Self {
        debug_assert!(self.starts_with(prefix));
        self[prefix.len()..].to_vec()
    }

    fn concat(&self, suffix: &Self) -> Self {
        let mut out = Vec::with_capacity(self.len() + suffix.len());
        out.extend_from_slice(self);
        out.extend_from_slice(suffix);
        out
    }

    fn encode(&self, buf: &mut Vec<u8>) {
        varint::push_u64(buf, self.len() as u64);
        buf.extend_from_slice(self);
    }

    fn decode(reader: &mut ByteReader<'_>) -> Result<Self> {
        Ok(reader.read_bytes()?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check_law<O: Output>(a: O, b: O) {
        let c = a.common(&b);
        assert_eq!(c.concat(&a.subtract(&c)), a);
        assert_eq!(c.concat(&b.subtract(&c)), b);
    }

    #[test]
    fn test_int_outputs() {
        assert_eq!(7u64.common(&3), 3);
        assert_eq!(7u64.subtract(&3), 4);
        assert_eq!(3u64.concat(&4), 7);
        check_law(10u64, 42);
    }

    #[test]
    fn test_byte_outputs() {
        let a = b"abcd".to_vec();
        let b = b"abxy".to_vec();
        assert_eq!(a.common(&b), b"ab".to_vec());
        assert_eq!(a.subtract(&b"ab".to_vec()), b"cd".to_vec());
        check_law(a, b);
        check_law(Vec::new(), b"z".to_vec());
    }

    #[test]
    fn test_encode_decode() {
        let mut buf = Vec::new();
        300u64.encode(&mut buf);
        b"xyz".to_vec().encode(&mut buf);
        let mut reader = ByteReader::new(&buf, "outputs");
        assert_eq!(u64::decode(&mut reader).unwrap(), 300);
        assert_eq!(Vec::<u8>::decode(&mut reader).unwrap(), b"xyz".to_vec());
        assert!(reader.is_eof());
    }
}
