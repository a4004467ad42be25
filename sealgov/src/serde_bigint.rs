//! Serde helpers for big integers.
//!
//! Paillier values routinely exceed what a JSON number can carry, so they are written as
//! decimal strings. Small values are also accepted as plain JSON numbers on input.

use num_bigint::BigUint;
use serde::de::{self, Deserializer, Visitor};
use serde::Serializer;
use std::fmt;
use std::str::FromStr;

// a single-purpose module for use in `#[serde(with)]`
pub mod decimal {
    use super::*;

    pub fn serialize<S>(value: &BigUint, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_str_radix(10))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<BigUint, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(DecimalVisitor)
    }
}

struct DecimalVisitor;

impl<'de> Visitor<'de> for DecimalVisitor {
    type Value = BigUint;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a non-negative integer or a decimal string")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<BigUint, E> {
        Ok(BigUint::from(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<BigUint, E> {
        if v < 0 {
            return Err(E::custom("negative integer"));
        }
        Ok(BigUint::from(v as u64))
    }

    // JSON numbers past u64 arrive as floats and have already lost their low digits
    fn visit_f64<E: de::Error>(self, _v: f64) -> Result<BigUint, E> {
        Err(E::custom(format!(
            "integers above {} must be sent as decimal strings",
            u64::MAX
        )))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<BigUint, E> {
        let v = v.trim();
        if v.is_empty() || !v.bytes().all(|b| b.is_ascii_digit()) {
            return Err(E::custom("expected decimal digits"));
        }
        BigUint::from_str(v).map_err(E::custom)
    }
}
