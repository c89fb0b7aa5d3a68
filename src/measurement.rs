//! Temperature value encoding.
//!
//! Readings travel as a Health Thermometer Temperature Measurement: one flags
//! byte followed by an IEEE-11073 32-bit FLOAT (24-bit two's complement
//! mantissa, 8-bit signed base-10 exponent), little-endian.

/// Flags byte: Celsius, no time stamp, no temperature type.
pub const HTM_FLAGS_CELSIUS: u8 = 0x00;

/// Size of an encoded temperature measurement.
pub const TEMPERATURE_PAYLOAD_LEN: usize = 5;

/// Exponent used for outgoing readings (milli-degrees).
const READING_EXPONENT: i8 = -3;

/// Largest magnitude that is still a number. Mantissas 0x7FFFFE..=0x800002
/// encode +INF, NaN, NRes, a reserved value and -INF.
const MANTISSA_MAX: i32 = 0x7F_FFFD;

/// Pack a mantissa/exponent pair into an 11073 FLOAT.
pub fn encode_float(mantissa: i32, exponent: i8) -> u32 {
    (mantissa as u32 & 0x00FF_FFFF) | ((exponent as u8 as u32) << 24)
}

/// Split an 11073 FLOAT into a sign-extended mantissa and its exponent.
pub fn decode_float(raw: u32) -> (i32, i8) {
    let mantissa = ((raw << 8) as i32) >> 8;
    let exponent = (raw >> 24) as u8 as i8;
    (mantissa, exponent)
}

/// Encode integral degrees Celsius as a Temperature Measurement value.
pub fn encode_temperature(celsius: i32) -> [u8; TEMPERATURE_PAYLOAD_LEN] {
    let mantissa = celsius.saturating_mul(1000).clamp(-MANTISSA_MAX, MANTISSA_MAX);
    let float = encode_float(mantissa, READING_EXPONENT);

    let mut out = [0u8; TEMPERATURE_PAYLOAD_LEN];
    out[0] = HTM_FLAGS_CELSIUS;
    out[1..].copy_from_slice(&float.to_le_bytes());
    out
}

/// Decode a Temperature Measurement value back to integral degrees Celsius.
///
/// Returns `None` for short values or exponents outside what an `i32` can hold.
pub fn decode_temperature(value: &[u8]) -> Option<i32> {
    if value.len() < TEMPERATURE_PAYLOAD_LEN {
        return None;
    }
    let raw = u32::from_le_bytes([value[1], value[2], value[3], value[4]]);
    let (mantissa, exponent) = decode_float(raw);

    let scale = 10i32.checked_pow(exponent.unsigned_abs() as u32)?;
    if exponent < 0 {
        Some(mantissa / scale)
    } else {
        mantissa.checked_mul(scale)
    }
}

/// Convert a raw Si7021 temperature code to integral degrees Celsius.
///
/// `175.72 * code / 65536 - 46.85`, computed in hundredths and truncated
/// toward zero.
pub fn si7021_celsius(code: u16) -> i32 {
    let hundredths = ((17572u32 * code as u32) >> 16) as i32 - 4685;
    hundredths / 100
}

/// Encode a button level for the button state characteristic.
pub fn encode_button(pressed: bool) -> [u8; 1] {
    [pressed as u8]
}

/// Decode a button state value.
pub fn decode_button(value: &[u8]) -> Option<bool> {
    value.first().map(|b| *b != 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temperature_roundtrip_23c() {
        let encoded = encode_temperature(23);
        assert_eq!(decode_temperature(&encoded), Some(23));
    }

    #[test]
    fn temperature_layout_is_flags_then_le_float() {
        // 23000 = 0x0059D8, exponent -3 = 0xFD
        assert_eq!(encode_temperature(23), [0x00, 0xD8, 0x59, 0x00, 0xFD]);
    }

    #[test]
    fn negative_temperature_roundtrip() {
        let encoded = encode_temperature(-12);
        // -12000 as 24-bit two's complement = 0xFFD120
        assert_eq!(&encoded[1..4], &[0x20, 0xD1, 0xFF]);
        assert_eq!(decode_temperature(&encoded), Some(-12));
    }

    #[test]
    fn float_sign_extension() {
        let raw = encode_float(-1, 0);
        assert_eq!(raw, 0x00FF_FFFF);
        assert_eq!(decode_float(raw), (-1, 0));

        let raw = encode_float(MANTISSA_MAX, -2);
        assert_eq!(decode_float(raw), (MANTISSA_MAX, -2));
    }

    #[test]
    fn decode_positive_exponent() {
        let raw = encode_float(4, 1).to_le_bytes();
        let value = [HTM_FLAGS_CELSIUS, raw[0], raw[1], raw[2], raw[3]];
        assert_eq!(decode_temperature(&value), Some(40));
    }

    #[test]
    fn decode_rejects_short_values() {
        assert_eq!(decode_temperature(&[]), None);
        assert_eq!(decode_temperature(&[0, 1, 2, 3]), None);
    }

    #[test]
    fn out_of_range_readings_saturate() {
        let encoded = encode_temperature(100_000);
        let raw = u32::from_le_bytes([encoded[1], encoded[2], encoded[3], encoded[4]]);
        assert_eq!(decode_float(raw), (0x7F_FFFD, -3));
    }

    #[test]
    fn saturated_readings_avoid_special_codes() {
        for celsius in [i32::MAX, i32::MIN, 9_000, -9_000] {
            let encoded = encode_temperature(celsius);
            let raw = u32::from_le_bytes([encoded[1], encoded[2], encoded[3], encoded[4]]);
            let mantissa_bits = raw & 0x00FF_FFFF;
            // NaN, NRes, +INF, -INF and the reserved code.
            assert!(!matches!(mantissa_bits, 0x7F_FFFE..=0x80_0002), "{celsius}: {mantissa_bits:#x}");
        }
        assert_eq!(decode_temperature(&encode_temperature(-100_000)), Some(-8388));
    }

    #[test]
    fn si7021_conversion() {
        // Datasheet endpoints and a room-temperature code.
        assert_eq!(si7021_celsius(0), -46);
        assert_eq!(si7021_celsius(0xFFFF), 128);
        // 0x6680 -> 175.72 * 26240 / 65536 - 46.85 = 23.50
        assert_eq!(si7021_celsius(0x6680), 23);
    }

    #[test]
    fn button_encoding() {
        assert_eq!(encode_button(true), [1]);
        assert_eq!(encode_button(false), [0]);
        assert_eq!(decode_button(&[1]), Some(true));
        assert_eq!(decode_button(&[0]), Some(false));
        assert_eq!(decode_button(&[]), None);
    }
}
