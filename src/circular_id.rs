use std::fmt;
use std::cmp::Ordering;

use num_bigint::BigUint;

use serde::{
    ser::{Serialize, Serializer, SerializeSeq},
    de::{self, Deserialize, Deserializer, SeqAccess, Visitor},
};

use crate::error::{ChordError, Result};

/// A point on a ring of `2^bit_count` identifiers.
///
/// Arithmetic wraps modulo `2^bit_count`. There is no `Ord`:
/// identifiers are only ordered relative to some base, see
/// [Id::compare_position].
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct Id{
    bit_count: usize,
    value: BigUint,
}

fn modulus(bit_count: usize) -> BigUint {
    BigUint::from(1u8) << bit_count
}

/// Keeps the low `bit_count` bits of `value`.
fn truncate(bit_count: usize, value: BigUint) -> BigUint {
    if value.bits() <= bit_count as u64 {
        return value;
    }
    let mut digits = value.to_u32_digits();
    digits.truncate((bit_count + 31) / 32);
    let spare = bit_count % 32;
    if spare != 0 {
        if let Some(top) = digits.last_mut() {
            *top &= (1u32 << spare) - 1;
        }
    }
    BigUint::new(digits)
}

impl Id{
    /// Widest ring an id may live on.
    pub const MAX_BIT_COUNT: usize = u16::MAX as usize;

    /// Builds an id from big-endian bytes. Bits above `bit_count` are
    /// dropped, missing bits are zero.
    pub fn new(bit_count: usize, bytes: &[u8]) -> Result<Id>{
        Self::from_biguint(bit_count, BigUint::from_bytes_be(bytes))
    }

    pub fn from_biguint(bit_count: usize, value: BigUint) -> Result<Id>{
        if bit_count == 0 || bit_count > Self::MAX_BIT_COUNT {
            return Err(ChordError::InvalidBitCount);
        }
        Ok(Id{bit_count, value: truncate(bit_count, value)})
    }

    pub fn from_u64(bit_count: usize, value: u64) -> Result<Id>{
        Self::from_biguint(bit_count, BigUint::from(value))
    }

    pub fn zero(bit_count: usize) -> Result<Id>{
        Self::from_biguint(bit_count, BigUint::default())
    }

    /// `2^exponent` on a ring of `bit_count` bits.
    pub fn power_of_two(bit_count: usize, exponent: usize) -> Result<Id>{
        if exponent >= bit_count {
            return Err(ChordError::IndexOutOfRange{index: exponent, len: bit_count});
        }
        Self::from_biguint(bit_count, BigUint::from(1u8) << exponent)
    }

    pub fn bit_count(&self) -> usize {
        self.bit_count
    }

    pub fn value(&self) -> &BigUint {
        &self.value
    }

    /// Big-endian bytes, always `ceil(bit_count / 8)` long.
    pub fn to_bytes(&self) -> Vec<u8> {
        let len = (self.bit_count + 7) / 8;
        let raw = self.value.to_bytes_be();
        let mut out = vec![0u8; len.saturating_sub(raw.len())];
        out.extend_from_slice(&raw[raw.len().saturating_sub(len)..]);
        out
    }

    pub fn ensure_same_ring(&self, other: &Id) -> Result<()>{
        if self.bit_count != other.bit_count {
            return Err(ChordError::BitCountMismatch{expected: self.bit_count, found: other.bit_count});
        }
        Ok(())
    }

    fn assert_same_ring(&self, other: &Id){
        if let Err(e) = self.ensure_same_ring(other) {
            panic!("identifiers from different rings combined: {}", e);
        }
    }

    pub fn try_add(&self, other: &Id) -> Result<Id>{
        self.ensure_same_ring(other)?;
        let value = (&self.value + &other.value) % modulus(self.bit_count);
        Ok(Id{bit_count: self.bit_count, value})
    }

    pub fn try_subtract(&self, other: &Id) -> Result<Id>{
        self.ensure_same_ring(other)?;
        let m = modulus(self.bit_count);
        let value = (&self.value + &m - &other.value) % m;
        Ok(Id{bit_count: self.bit_count, value})
    }

    /// # Panics
    /// If the two ids have different bit counts.
    pub fn add(&self, other: &Id) -> Id{
        match self.try_add(other) {
            Ok(id) => id,
            Err(e) => panic!("{}", e),
        }
    }

    /// # Panics
    /// If the two ids have different bit counts.
    pub fn subtract(&self, other: &Id) -> Id{
        match self.try_subtract(other) {
            Ok(id) => id,
            Err(e) => panic!("{}", e),
        }
    }

    /// `self + 2^exponent`, wrapping. Exponents at or past `bit_count`
    /// contribute nothing.
    pub fn add_power_of_two(&self, exponent: usize) -> Id{
        let m = modulus(self.bit_count);
        let value = (&self.value + (BigUint::from(1u8) << exponent)) % m;
        Id{bit_count: self.bit_count, value}
    }

    /// Clockwise distance from `base` to this id.
    pub fn position(&self, base: &Id) -> BigUint {
        self.subtract(base).value
    }

    /// Compares `self` and `other` by their clockwise distance from `base`.
    pub fn compare_position(&self, base: &Id, other: &Id) -> Ordering {
        self.position(base).cmp(&other.position(base))
    }

    /// Tests membership of the circular interval that starts at `lower`
    /// and runs clockwise to `upper`.
    ///
    /// When `lower == upper` the interval is empty if both ends are
    /// exclusive and the single point otherwise.
    pub fn is_within(&self, lower: &Id, lower_inclusive: bool, upper: &Id, upper_inclusive: bool) -> bool {
        self.assert_same_ring(lower);
        self.assert_same_ring(upper);
        if lower == upper {
            return (lower_inclusive || upper_inclusive) && self == lower;
        }
        self.is_within_relative(lower, lower, lower_inclusive, upper, upper_inclusive)
    }

    /// Same as [Id::is_within] but positions are measured from an explicit
    /// `base`. An interval whose `lower` lies after its `upper` is empty.
    pub fn is_within_relative(&self, base: &Id, lower: &Id, lower_inclusive: bool, upper: &Id, upper_inclusive: bool) -> bool {
        let pos = self.position(base);
        let low = lower.position(base);
        let high = upper.position(base);

        let above = if lower_inclusive { pos >= low } else { pos > low };
        let below = if upper_inclusive { pos <= high } else { pos < high };
        above && below
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl Serialize for Id {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let v = self.value.to_u32_digits();
        let mut seq = serializer.serialize_seq(Some(v.len() + 1))?;
        seq.serialize_element(&(self.bit_count as u64))?;
        for e in v {
            seq.serialize_element(&(e as u64))?;
        }
        seq.end()
    }
}


struct IdVisitor;

impl<'de> Visitor<'de> for IdVisitor {
    type Value = Id;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a bit count followed by the u32 digits of an id")
    }

    fn visit_seq<S>(self, mut seq: S) -> std::result::Result<Self::Value, S::Error>
        where
            S: SeqAccess<'de>
        {
            let bit_count: u64 = match seq.next_element()? {
                Some(bit_count) => bit_count,
                None => return Err(de::Error::invalid_length(0, &self)),
            };
            let bit_count = match usize::try_from(bit_count) {
                Ok(bit_count) if bit_count <= Id::MAX_BIT_COUNT => bit_count,
                _ => return Err(de::Error::custom(format!("bit count {} too large", bit_count))),
            };
            let mut digits = Vec::new();
            while let Some(element) = seq.next_element::<u64>()? {
                match u32::try_from(element) {
                    Ok(digit) => digits.push(digit),
                    Err(_) => return Err(de::Error::custom("id digit does not fit in 32 bits")),
                }
            }
            Id::from_biguint(bit_count, BigUint::new(digits)).map_err(de::Error::custom)
    }
}

impl<'de> Deserialize<'de> for Id {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Id, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_seq(IdVisitor)
    }
}
