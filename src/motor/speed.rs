// L91 jog speed encoding
//
// Normalized speed in [-1.0, 1.0] maps onto a 16-bit wire value.
// Positive speeds count up from 0x8000 and negative speeds count down from
// 0x7FFF, so the two branches do not meet at zero. The motors expect exactly
// this layout.

/// Wire value for a stopped motor
pub const SPEED_NEUTRAL: u16 = 0x7FFF;

/// First wire value of the positive branch
pub const SPEED_POSITIVE_BASE: u16 = 0x8000;

/// Wire counts per unit of normalized speed
pub const SPEED_SCALE: f32 = 3283.0;

/// Encode a normalized speed into the 16-bit jog value.
///
/// Out-of-range speeds are clamped to [-1.0, 1.0]; NaN is treated as a stop.
pub fn encode(speed: f32) -> u16 {
    let speed = if speed.is_nan() {
        0.0
    } else {
        speed.clamp(-1.0, 1.0)
    };

    let counts = (speed * SPEED_SCALE).round() as i32;
    let raw = if speed == 0.0 {
        SPEED_NEUTRAL as i32
    } else if speed > 0.0 {
        SPEED_POSITIVE_BASE as i32 + counts
    } else {
        SPEED_NEUTRAL as i32 + counts
    };

    raw.clamp(0, u16::MAX as i32) as u16
}

/// Decode a 16-bit jog value back to a normalized speed (approximate inverse of [`encode`])
pub fn decode(raw: u16) -> f32 {
    let counts = if raw >= SPEED_POSITIVE_BASE {
        (raw - SPEED_POSITIVE_BASE) as f32
    } else {
        -((SPEED_NEUTRAL - raw) as f32)
    };
    (counts / SPEED_SCALE).clamp(-1.0, 1.0)
}

/// Split a jog value into (high, low) bytes, big-endian as sent on the wire
pub fn to_wire_bytes(raw: u16) -> [u8; 2] {
    raw.to_be_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESOLUTION: f32 = 1.0 / SPEED_SCALE;

    #[test]
    fn test_zero_is_neutral() {
        assert_eq!(encode(0.0), 0x7FFF);
        assert_eq!(encode(-0.0), 0x7FFF);
        assert_eq!(decode(0x7FFF), 0.0);
    }

    #[test]
    fn test_known_values() {
        // 0.05 * 3283 = 164.15 -> 164
        assert_eq!(encode(0.05), 0x8000 + 164);
        assert_eq!(encode(1.0), 0x8000 + 3283);
        assert_eq!(encode(-1.0), 0x7FFF - 3283);
        assert_eq!(encode(0.5), 0x8000 + 1642);
    }

    #[test]
    fn test_out_of_range_is_clamped() {
        assert_eq!(encode(2.5), encode(1.0));
        assert_eq!(encode(-7.0), encode(-1.0));
        assert_eq!(encode(f32::INFINITY), encode(1.0));
        assert_eq!(encode(f32::NEG_INFINITY), encode(-1.0));
        assert_eq!(encode(f32::NAN), SPEED_NEUTRAL);
    }

    #[test]
    fn test_decode_is_within_resolution() {
        let mut s = -1.0_f32;
        while s <= 1.0 {
            let back = decode(encode(s));
            assert!(
                (back - s).abs() <= RESOLUTION,
                "speed {} decoded as {}",
                s,
                back
            );
            s += 0.001;
        }
    }

    #[test]
    fn test_branches_are_monotonic() {
        let steps = 2000;
        let mut prev = encode(1.0 / steps as f32);
        for i in 2..=steps {
            let cur = encode(i as f32 / steps as f32);
            assert!(cur >= prev, "positive branch decreased at step {}", i);
            prev = cur;
        }

        let mut prev = encode(-1.0);
        for i in (1..steps).rev() {
            let cur = encode(-(i as f32) / steps as f32);
            assert!(cur >= prev, "negative branch decreased at step {}", i);
            prev = cur;
        }
    }

    #[test]
    fn test_discontinuity_at_zero() {
        let eps = 1e-5;
        assert_eq!(encode(-eps), 0x7FFF);
        assert_eq!(encode(eps), 0x8000);
        assert_eq!(encode(eps) - encode(-eps), 1);
        assert_eq!(encode(0.0), encode(-eps));
    }

    #[test]
    fn test_wire_bytes_are_big_endian() {
        assert_eq!(to_wire_bytes(0x80A4), [0x80, 0xA4]);
        assert_eq!(to_wire_bytes(SPEED_NEUTRAL), [0x7F, 0xFF]);
    }
}
