//! Register codec
//!
//! Maps raw 16-bit register words to typed fields. Bit `i` of a block lives in
//! word `i / 16` at position `i % 16`, least significant bit first. Multi-bit
//! fields are stored low bit first; signed fields use sign-magnitude with the
//! sign in the highest bit of the field.
//!
//! All accessors are total: a bit outside the buffer reads as `false` and a
//! write to it is ignored. Setters return `true` when the stored bits changed,
//! which callers fold into their own dirty tracking.

mod blocks;
mod types;

pub(crate) use blocks::field;

pub use blocks::{
    Capability, CapabilityBlock, ErrorBlock, HoldingBlock, RegisterBlock, StatusBlock,
    SystemStatus, MAX_UNITS,
};
pub use types::{FanDirection, FanSpeed, Mode, ParseEnumError, RegisterKind};

/// Read one bit
pub fn bit_get(words: &[u16], bit: usize) -> bool {
    words
        .get(bit / 16)
        .is_some_and(|word| word & (1 << (bit % 16)) != 0)
}

/// Write one bit, returning whether the stored value changed
pub fn bit_set(words: &mut [u16], bit: usize, value: bool) -> bool {
    let Some(word) = words.get_mut(bit / 16) else {
        return false;
    };
    let mask = 1u16 << (bit % 16);
    if (*word & mask != 0) == value {
        return false;
    }
    if value {
        *word |= mask;
    } else {
        *word &= !mask;
    }
    true
}

/// Read an unsigned field of `length` bits starting at `start`
pub fn uint_get(words: &[u16], start: usize, length: u8) -> u32 {
    (0..usize::from(length.min(32)))
        .filter(|&i| bit_get(words, start + i))
        .fold(0, |acc, i| acc | (1 << i))
}

/// Write an unsigned field; bits above `length` are discarded
pub fn uint_set(words: &mut [u16], start: usize, length: u8, value: u32) -> bool {
    let mut changed = false;
    for i in 0..usize::from(length.min(32)) {
        changed |= bit_set(words, start + i, value & (1 << i) != 0);
    }
    changed
}

/// Read a sign-magnitude field. Fields shorter than two bits read as zero.
#[allow(clippy::cast_possible_wrap)]
pub fn sint_get(words: &[u16], start: usize, length: u8) -> i32 {
    if length < 2 {
        return 0;
    }
    let magnitude = uint_get(words, start, length - 1) as i32;
    if bit_get(words, start + usize::from(length) - 1) {
        -magnitude
    } else {
        magnitude
    }
}

/// Write a sign-magnitude field. Fields shorter than two bits are left untouched.
pub fn sint_set(words: &mut [u16], start: usize, length: u8, value: i32) -> bool {
    if length < 2 {
        return false;
    }
    let magnitude = uint_set(words, start, length - 1, value.unsigned_abs());
    let sign = bit_set(words, start + usize::from(length) - 1, value < 0);
    magnitude | sign
}

/// Read a temperature stored as a signed tenth-of-a-degree field
#[allow(clippy::cast_precision_loss)]
pub fn temperature_get(words: &[u16], start: usize, length: u8) -> f32 {
    sint_get(words, start, length) as f32 / 10.0
}

/// Write a temperature, rounding to the nearest tenth (half away from zero)
pub fn temperature_set(words: &mut [u16], start: usize, length: u8, celsius: f32) -> bool {
    sint_set(words, start, length, tenths(celsius))
}

#[allow(clippy::cast_possible_truncation)]
fn tenths(celsius: f32) -> i32 {
    (celsius * 10.0).round() as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bit_roundtrip_across_words() {
        let mut words = [0u16; 3];
        for bit in [0, 7, 15, 16, 31, 47] {
            assert!(!bit_get(&words, bit));
            assert!(bit_set(&mut words, bit, true));
            assert!(bit_get(&words, bit));
        }
        assert_eq!(words, [0x8081, 0x8001, 0x8000]);
    }

    #[test]
    fn test_bit_set_reports_change_only() {
        let mut words = [0u16; 1];
        assert!(!bit_set(&mut words, 3, false));
        assert!(bit_set(&mut words, 3, true));
        assert!(!bit_set(&mut words, 3, true));
        assert!(bit_set(&mut words, 3, false));
    }

    #[test]
    fn test_out_of_range_is_noop() {
        let mut words = [0xFFFFu16; 2];
        assert!(!bit_get(&words, 32));
        assert!(!bit_set(&mut words, 40, false));
        assert_eq!(words, [0xFFFF, 0xFFFF]);
        // A field straddling the end keeps its in-range bits only
        assert_eq!(uint_get(&words, 30, 4), 0b0011);
    }

    #[test]
    fn test_uint_field() {
        let mut words = [0u16; 2];
        assert!(uint_set(&mut words, 12, 8, 0xA5));
        assert_eq!(uint_get(&words, 12, 8), 0xA5);
        assert_eq!(words, [0x5000, 0x000A]);
        // Excess bits are dropped
        uint_set(&mut words, 0, 3, 0xFF);
        assert_eq!(uint_get(&words, 0, 3), 7);
        assert!(!uint_set(&mut words, 0, 3, 7));
    }

    #[test]
    fn test_sign_magnitude() {
        let mut words = [0u16; 1];
        for v in [0, 1, 42, 127] {
            sint_set(&mut words, 0, 8, v);
            assert_eq!(sint_get(&words, 0, 8), v);
            sint_set(&mut words, 0, 8, -v);
            assert_eq!(sint_get(&words, 0, 8), -v);
        }
        sint_set(&mut words, 0, 8, -5);
        // Sign in bit 7, magnitude in bits 0..7, not two's complement
        assert_eq!(words[0], 0x0085);
    }

    #[test]
    fn test_short_signed_field_is_noop() {
        let mut words = [0xFFFFu16; 1];
        assert_eq!(sint_get(&words, 0, 1), 0);
        assert_eq!(sint_get(&words, 0, 0), 0);
        assert!(!sint_set(&mut words, 0, 1, -1));
        assert_eq!(words[0], 0xFFFF);
    }

    #[test]
    fn test_temperature_rounding() {
        let mut words = [0u16; 3];
        temperature_set(&mut words, 32, 16, 23.5);
        assert_eq!(temperature_get(&words, 32, 16), 23.5);
        temperature_set(&mut words, 32, 16, 23.46);
        assert_eq!(sint_get(&words, 32, 16), 235);
        temperature_set(&mut words, 32, 16, -0.25);
        assert_eq!(sint_get(&words, 32, 16), -3);
        assert_eq!(temperature_get(&words, 32, 16), -0.3);
    }
}
