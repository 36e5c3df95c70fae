use std::convert::TryFrom;

use super::error::{Error, Result};

/// Positive integer.
pub type Positive = std::num::NonZeroU32;
/// Non-negative integer.
pub type NonNegative = u32;
/// Number of bits of a value or port.
pub type BitWidth = u32;

/// Minimum number of bits needed to hold `value` in binary.
///
/// Non-negative values are treated as unsigned; negative values keep exactly
/// one leading one (two's complement sign bit). Zero takes one bit.
pub fn min_bit_width(value: i64) -> BitWidth {
    if value >= 0 {
        (64 - value.leading_zeros()).max(1)
    } else {
        64 - value.leading_ones() + 1
    }
}

pub fn u32_to_i32(u: u32) -> Result<i32> {
    i32::try_from(u).map_err(|err| Error::InvalidArgument(err.to_string()))
}

pub fn i32_to_u32(i: i32) -> Result<u32> {
    u32::try_from(i).map_err(|err| Error::InvalidArgument(err.to_string()))
}

pub fn usize_to_u32(u: usize) -> Result<u32> {
    u32::try_from(u).map_err(|err| Error::InvalidArgument(err.to_string()))
}

pub fn i64_to_u32(i: i64) -> Result<u32> {
    u32::try_from(i).map_err(|err| Error::InvalidArgument(err.to_string()))
}

pub fn positive(u: u32) -> Result<Positive> {
    Positive::new(u).ok_or_else(|| Error::InvalidArgument(format!("{} is not positive", u)))
}
