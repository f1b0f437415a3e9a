//! Gillham (Mode A/C) code conversions.
//!
//! Identities are kept in "hex-octal" form: each octal digit A, B, C, D of
//! the squawk sits in its own nibble, so squawk 7700 is `0x7700`. The
//! altitude fields of Mode S replies interleave the same pulse bits, so both
//! are first reshuffled into that form and then run through one Mode A to
//! Mode C conversion.
//!
//! ```plain
//! ID13 bit: 12 11 10  9  8  7  6  5  4  3  2  1  0
//! pulse:    C1 A1 C2 A2 C4 A4  X B1 D1 B2 D2 B4 D4
//! ```

/// Reorder a 13-bit identity/altitude field into hex-octal form.
///
/// The X/M bit (bit 6) is dropped.
pub fn id13_to_hex_octal(id13: u32) -> u16 {
    // (field bit, hex-octal bit)
    const MAP: [(u32, u16); 12] = [
        (0x1000, 0x0010), // C1
        (0x0800, 0x1000), // A1
        (0x0400, 0x0020), // C2
        (0x0200, 0x2000), // A2
        (0x0100, 0x0040), // C4
        (0x0080, 0x4000), // A4
        (0x0020, 0x0100), // B1
        (0x0010, 0x0001), // D1 (Q in altitude fields)
        (0x0008, 0x0200), // B2
        (0x0004, 0x0002), // D2
        (0x0002, 0x0400), // B4
        (0x0001, 0x0004), // D4
    ];

    MAP.iter()
        .filter(|(field, _)| id13 & field != 0)
        .fold(0, |acc, (_, out)| acc | out)
}

/// Convert a hex-octal Mode A code to a Mode C altitude in 100 ft units.
///
/// Returns `None` for codes that cannot be a Gillham altitude: D1 set, any
/// bit outside the twelve pulse positions, no C pulse, or an illegal C digit.
pub fn mode_a_to_mode_c(mode_a: u16) -> Option<i32> {
    if mode_a & 0x8889 != 0 || mode_a & 0x00F0 == 0 {
        return None;
    }

    let mut one_hundreds: i32 = 0;
    if mode_a & 0x0010 != 0 {
        one_hundreds ^= 0x007; // C1
    }
    if mode_a & 0x0020 != 0 {
        one_hundreds ^= 0x003; // C2
    }
    if mode_a & 0x0040 != 0 {
        one_hundreds ^= 0x001; // C4
    }
    // 7 and 5 swap places in the C sequence
    if one_hundreds & 5 == 5 {
        one_hundreds ^= 2;
    }
    if one_hundreds > 5 {
        return None;
    }

    let mut five_hundreds: i32 = 0;
    for (bit, mask) in [
        (0x0002, 0x0FF), // D2
        (0x0004, 0x07F), // D4
        (0x1000, 0x03F), // A1
        (0x2000, 0x01F), // A2
        (0x4000, 0x00F), // A4
        (0x0100, 0x007), // B1
        (0x0200, 0x003), // B2
        (0x0400, 0x001), // B4
    ] {
        if mode_a & bit != 0 {
            five_hundreds ^= mask;
        }
    }

    // odd 500 ft bands count the 100 ft steps backwards
    if five_hundreds & 1 != 0 {
        one_hundreds = 6 - one_hundreds;
    }

    Some(five_hundreds * 5 + one_hundreds - 13)
}

/// Altitude in feet from the 13-bit AC field of DF0/4/16/20.
pub fn decode_ac13(ac13: u32) -> Option<i32> {
    if ac13 == 0 || ac13 & 0x0040 != 0 {
        // absent, or metric (M bit), which nobody transmits
        return None;
    }
    if ac13 & 0x0010 != 0 {
        // Q bit: 25 ft steps, M and Q removed
        let n = ((ac13 & 0x1F80) >> 2) | ((ac13 & 0x0020) >> 1) | (ac13 & 0x000F);
        return Some(n as i32 * 25 - 1000);
    }
    let mode_c = mode_a_to_mode_c(id13_to_hex_octal(ac13))?;
    (mode_c >= -12).then_some(100 * mode_c)
}

/// Altitude in feet from the 12-bit AC field of an airborne position.
pub fn decode_ac12(ac12: u32) -> Option<i32> {
    if ac12 == 0 {
        return None;
    }
    if ac12 & 0x0010 != 0 {
        let n = ((ac12 & 0x0FE0) >> 1) | (ac12 & 0x000F);
        return Some(n as i32 * 25 - 1000);
    }
    // re-insert the missing M bit as zero and treat as AC13
    decode_ac13(((ac12 & 0x0FC0) << 1) | (ac12 & 0x003F))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id13_squawks() {
        // A1 alone -> 1000
        assert_eq!(id13_to_hex_octal(0x0800), 0x1000);
        // every pulse set -> 7777
        assert_eq!(id13_to_hex_octal(0x1FBF), 0x7777);
        // X bit ignored
        assert_eq!(id13_to_hex_octal(0x0040), 0x0000);
        // squawk 5502: A4 A1, B4 B1, D2
        assert_eq!(id13_to_hex_octal(0x0800 | 0x0080 | 0x0020 | 0x0002 | 0x0004), 0x5502);
    }

    #[test]
    fn test_mode_c_lowest_band() {
        assert_eq!(mode_a_to_mode_c(0x0040), Some(-12)); // C4
        assert_eq!(mode_a_to_mode_c(0x0020), Some(-10)); // C2
        assert_eq!(mode_a_to_mode_c(0x0010), Some(-8)); // C1
    }

    #[test]
    fn test_mode_c_odd_band_reverses() {
        // B4 moves to the next 500 ft band, C4 then counts from the top
        assert_eq!(mode_a_to_mode_c(0x0440), Some(-3));
    }

    #[test]
    fn test_mode_c_invalid() {
        assert_eq!(mode_a_to_mode_c(0x0000), None);
        assert_eq!(mode_a_to_mode_c(0x1200), None); // no C pulse
        assert_eq!(mode_a_to_mode_c(0x0041), None); // D1
        assert_eq!(mode_a_to_mode_c(0x0070), None); // C1 C2 C4 decodes to an illegal 7
    }

    #[test]
    fn test_ac12_q_bit() {
        // 8D40621D58C382D690C8AC2863A7: AC12 = 0xC38
        assert_eq!(decode_ac12(0xC38), Some(38000));
        assert_eq!(decode_ac12(0), None);
    }

    #[test]
    fn test_ac13_q_bit() {
        // same 38000 ft encoded with an M bit slot: insert a zero at bit 6
        let ac12 = 0xC38u32;
        let ac13 = ((ac12 & 0x0FC0) << 1) | (ac12 & 0x003F);
        assert_eq!(decode_ac13(ac13), Some(38000));
    }

    #[test]
    fn test_ac13_metric_rejected() {
        assert_eq!(decode_ac13(0x0040 | 0x0010), None);
    }

    #[test]
    fn test_ac13_gillham() {
        // C4 alone in AC13 layout is bit 8
        assert_eq!(decode_ac13(0x0100), Some(-1200));
    }
}
