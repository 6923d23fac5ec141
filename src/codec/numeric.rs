//! Order-preserving encoding of `f64`.
//!
//! A double is mapped onto a `u64` whose unsigned order equals the numeric
//! order of the doubles (negative values below positive ones, `-0.0` just
//! below `0.0`), then written as 16 lowercase hex digits. NaN keeps its
//! bits: a NaN with the sign bit set lands below `-inf`, any other above
//! `+inf`. Range queries are bounded by the infinities to exclude them.
//! Fixed width makes lexicographic term order equal to numeric order, so
//! numeric ranges become plain term ranges.

use crate::error::{NodexError, Result};

/// Width of an encoded number.
pub const ENCODED_LEN: usize = 16;

const SIGN_BIT: u64 = 1 << 63;

/// Map a double onto an unsigned integer with the same ordering.
pub fn sortable_bits(value: f64) -> u64 {
    let bits = value.to_bits();
    if bits & SIGN_BIT == 0 {
        bits ^ SIGN_BIT
    } else {
        !bits
    }
}

/// Inverse of [`sortable_bits`]. Bit-exact, NaN payloads included.
pub fn from_sortable_bits(sortable: u64) -> f64 {
    let bits = if sortable & SIGN_BIT != 0 {
        sortable ^ SIGN_BIT
    } else {
        !sortable
    };
    f64::from_bits(bits)
}

pub fn encode(value: f64) -> String {
    format!("{:016x}", sortable_bits(value))
}

pub fn decode(text: &str) -> Result<f64> {
    if text.len() != ENCODED_LEN {
        return Err(NodexError::corrupt(format!(
            "encoded number {text:?} is not {ENCODED_LEN} digits"
        )));
    }
    let sortable = u64::from_str_radix(text, 16)
        .map_err(|e| NodexError::corrupt(format!("encoded number {text:?}: {e}")))?;
    Ok(from_sortable_bits(sortable))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn test_order_is_preserved() {
        let values = [
            f64::NEG_INFINITY,
            -1e300,
            -22.5,
            -1.0,
            -f64::MIN_POSITIVE,
            -0.0,
            0.0,
            f64::MIN_POSITIVE,
            1.0,
            10.0,
            1e300,
            f64::INFINITY,
            f64::NAN,
        ];
        for pair in values.windows(2) {
            assert!(
                encode(pair[0]) < encode(pair[1]),
                "{} should sort before {}",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn test_random_order_and_round_trip() {
        let mut rng = rand::rng();
        for _ in 0..1000 {
            let a = f64::from_bits(rng.random::<u64>());
            let b = f64::from_bits(rng.random::<u64>());
            assert_eq!(decode(&encode(a)).unwrap().to_bits(), a.to_bits());
            if !a.is_nan() && !b.is_nan() && a < b {
                assert!(encode(a) < encode(b));
            }
        }
    }

    #[test]
    fn test_signed_zero_is_distinct() {
        assert_ne!(encode(0.0), encode(-0.0));
        assert!(decode(&encode(-0.0)).unwrap().is_sign_negative());
    }

    #[test]
    fn test_malformed_input_is_corrupt() {
        assert!(decode("abc").is_err());
        assert!(decode("zzzzzzzzzzzzzzzz").is_err());
    }
}
