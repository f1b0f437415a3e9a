//! Mode A/C replies.
//!
//! Beast receivers deliver these as two bytes already in hex-octal form:
//!
//! ```plain
//! bit:   f e d c  b a 9 8  7 6 5 4  3 2 1 0
//!        0 A A A  0 B B B  I C C C  0 D D D
//! ```
//!
//! `I` is the IDENT (SPI) pulse. Mode A and Mode C replies are
//! indistinguishable on the wire; a code that happens to be a legal Gillham
//! altitude also gets an altitude.

use crate::gillham::mode_a_to_mode_c;
use crate::types::{
    Altitude, AltitudeSource, ModesMessage, DF_MODE_AC, MODEAC_MSG_BYTES, NON_ICAO_ADDRESS,
};

const IDENT_BIT: u16 = 0x0080;
const SQUAWK_MASK: u16 = 0x7777;

/// Build a message from a Mode A/C payload.
pub fn decode_mode_ac(payload: [u8; MODEAC_MSG_BYTES]) -> ModesMessage {
    let code = u16::from_be_bytes(payload);
    let spi = code & IDENT_BIT != 0;

    let altitude = if spi {
        None
    } else {
        mode_a_to_mode_c(code)
            .filter(|&c| c >= -12)
            .map(|c| Altitude {
                feet: 100 * c,
                source: AltitudeSource::Baro,
            })
    };

    ModesMessage {
        df: DF_MODE_AC,
        // pseudo-address from the identity, IDENT stripped
        addr: (code & 0xFF7F) as u32 | NON_ICAO_ADDRESS,
        raw: payload.to_vec(),
        squawk: Some(code & SQUAWK_MASK),
        spi: Some(spi),
        altitude,
        ..Default::default()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
