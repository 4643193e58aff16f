//! Conversion of code point automata to UTF-8 byte automata.
//!
//! Each code point range is split by encoded length, and each same-length
//! piece becomes a small byte trie: the lead bytes of the two endpoints get
//! their own paths, and any lead bytes between them are followed by
//! unrestricted continuation bytes.

use crate::automaton::{Automaton, MAX_CODE_POINT};

const CONTINUATION_MIN: u8 = 0x80;
const CONTINUATION_MAX: u8 = 0xBF;

/// Largest code point of each encoded length.
const LENGTH_BOUNDS: [u32; 4] = [0x7F, 0x7FF, 0xFFFF, MAX_CODE_POINT];

/// UTF-8 encoding of `cp`. Surrogates are encoded like any other 3-byte code
/// point so that every label of a code point automaton has an image.
pub fn encode(cp: u32, buf: &mut [u8; 4]) -> usize {
    if cp < 0x80 {
        buf[0] = cp as u8;
        1
    } else if cp < 0x800 {
        buf[0] = 0xC0 | (cp >> 6) as u8;
        buf[1] = 0x80 | (cp & 0x3F) as u8;
        2
    } else if cp < 0x10000 {
        buf[0] = 0xE0 | (cp >> 12) as u8;
        buf[1] = 0x80 | ((cp >> 6) & 0x3F) as u8;
        buf[2] = 0x80 | (cp & 0x3F) as u8;
        3
    } else {
        buf[0] = 0xF0 | (cp >> 18) as u8;
        buf[1] = 0x80 | ((cp >> 12) & 0x3F) as u8;
        buf[2] = 0x80 | ((cp >> 6) & 0x3F) as u8;
        buf[3] = 0x80 | (cp & 0x3F) as u8;
        4
    }
}

/// Byte automaton accepting the UTF-8 encodings of the strings `a` accepts.
///
/// States of `a` keep their ids; intermediate states are appended. The
/// result is generally not deterministic even when `a` is.
pub fn to_utf8(a: &Automaton) -> Automaton {
    let mut utf8 = Automaton::new();
    for s in 0..a.num_states() {
        let u = utf8.create_state();
        utf8.set_accept(u, a.is_accept(s));
    }
    let mut lo_buf = [0u8; 4];
    let mut hi_buf = [0u8; 4];
    for s in 0..a.num_states() {
        for t in a.transitions(s) {
            let mut lo = t.min;
            for &bound in &LENGTH_BOUNDS {
                if lo > t.max {
                    break;
                }
                if lo > bound {
                    continue;
                }
                let hi = t.max.min(bound);
                let n = encode(lo, &mut lo_buf);
                encode(hi, &mut hi_buf);
                add_sequences(&mut utf8, s, t.dest, &lo_buf[..n], &hi_buf[..n]);
                lo = hi + 1;
            }
        }
    }
    utf8.finish();
    utf8
}

/// Add paths `from -> to` for every byte string between `lo` and `hi`
/// (inclusive, equal length) whose non-lead bytes are continuation bytes.
fn add_sequences(utf8: &mut Automaton, from: usize, to: usize, lo: &[u8], hi: &[u8]) {
    let (lead_lo, lead_hi) = (lo[0] as u32, hi[0] as u32);
    if lo.len() == 1 {
        utf8.add_transition(from, to, lead_lo, lead_hi);
        return;
    }
    if lead_lo == lead_hi {
        let mid = utf8.create_state();
        utf8.add_transition(from, mid, lead_lo, lead_lo);
        add_sequences(utf8, mid, to, &lo[1..], &hi[1..]);
        return;
    }

    let rest = lo.len() - 1;
    let lo_is_min = lo[1..].iter().all(|&b| b == CONTINUATION_MIN);
    let hi_is_max = hi[1..].iter().all(|&b| b == CONTINUATION_MAX);

    if !lo_is_min {
        let mid = utf8.create_state();
        utf8.add_transition(from, mid, lead_lo, lead_lo);
        add_sequences(utf8, mid, to, &lo[1..], &[CONTINUATION_MAX; 3][..rest]);
    }
    let middle_lo = if lo_is_min { lead_lo } else { lead_lo + 1 };
    let middle_hi = if hi_is_max { lead_hi } else { lead_hi - 1 };
    if middle_lo <= middle_hi {
        let mid = utf8.create_state();
        utf8.add_transition(from, mid, middle_lo, middle_hi);
        any_continuations(utf8, mid, to, rest);
    }
    if !hi_is_max {
        let mid = utf8.create_state();
        utf8.add_transition(from, mid, lead_hi, lead_hi);
        add_sequences(utf8, mid, to, &[CONTINUATION_MIN; 3][..rest], &hi[1..]);
    }
}

fn any_continuations(utf8: &mut Automaton, from: usize, to: usize, count: usize) {
    let mut state = from;
    for i in 0..count {
        let next = if i + 1 == count {
            to
        } else {
            utf8.create_state()
        };
        utf8.add_transition(
            state,
            next,
            CONTINUATION_MIN as u32,
            CONTINUATION_MAX as u32,
        );
        state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automaton::basic;
    use crate::automaton::operations::{determinize, run_bytes};
    use rand::{Rng, SeedableRng, rngs::StdRng};

    #[test]
    fn test_encode_matches_std() {
        for cp in [0x24u32, 0x7F, 0x80, 0x7FF, 0x800, 0xFFFF, 0x10000, 0x10FFFF] {
            let c = char::from_u32(cp).unwrap();
            let mut expected = [0u8; 4];
            let expected = c.encode_utf8(&mut expected).as_bytes().to_vec();
            let mut buf = [0u8; 4];
            let n = encode(cp, &mut buf);
            assert_eq!(&buf[..n], &expected[..]);
        }
    }

    #[test]
    fn test_string_converts() {
        let a = to_utf8(&basic::string("héllo€𝄞"));
        assert!(run_bytes(&a, "héllo€𝄞".as_bytes()));
        assert!(!run_bytes(&a, "hello€𝄞".as_bytes()));
    }

    #[test]
    fn test_random_ranges_agree_with_code_points() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..50 {
            let x = rng.random_range(0..=MAX_CODE_POINT);
            let y = rng.random_range(0..=MAX_CODE_POINT);
            let (min, max) = (x.min(y), x.max(y));
            let a = determinize(&to_utf8(&basic::char_range(min, max)), 100_000).unwrap();
            for _ in 0..200 {
                let cp = rng.random_range(0..=MAX_CODE_POINT);
                let Some(c) = char::from_u32(cp) else {
                    continue;
                };
                let mut buf = [0u8; 4];
                let bytes = c.encode_utf8(&mut buf).as_bytes();
                assert_eq!(
                    run_bytes(&a, bytes),
                    (min..=max).contains(&cp),
                    "range {min:#x}..={max:#x} cp {cp:#x}"
                );
            }
            for cp in [min, max] {
                if let Some(c) = char::from_u32(cp) {
                    let mut buf = [0u8; 4];
                    assert!(run_bytes(&a, c.encode_utf8(&mut buf).as_bytes()));
                }
            }
        }
    }

    #[test]
    fn test_any_char_rejects_invalid_bytes() {
        let a = determinize(&to_utf8(&basic::any_char()), 10_000).unwrap();
        assert!(run_bytes(&a, "ÿ".as_bytes()));
        assert!(!run_bytes(&a, &[0xFF]));
        assert!(!run_bytes(&a, &[0xC3]));
        assert!(!run_bytes(&a, &[0x80]));
    }
}
