//! Mode S message decoding.
//!
//! Validates a 56- or 112-bit payload against its CRC, recovers the address,
//! and decodes the fields downstream consumers care about:
//! - DF0/16:  altitude, vertical status
//! - DF4/20:  altitude, flight status
//! - DF5/21:  identity (squawk), flight status
//! - DF11:    all-call reply (address only)
//! - DF17/18: extended squitter: identification, surface/airborne position,
//!   velocity, emergency squawk

use thiserror::Error;

use crate::crc::{self, BitFix};
use crate::gillham::{decode_ac12, decode_ac13, id13_to_hex_octal};
use crate::icao_filter::AddressFilter;
use crate::mode_ac;
use crate::types::*;

/// Why a payload was rejected. Rejections are counted, never fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("address recovered from parity was not seen recently")]
    UnknownIcao,
    #[error("CRC check failed")]
    BadCrc,
    #[error("payload length does not match downlink format {0}")]
    Malformed(u8),
}

/// CRC handling for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrcPolicy {
    /// Reject messages whose parity does not check out.
    pub check: bool,
    pub fix: BitFix,
}

impl Default for CrcPolicy {
    fn default() -> Self {
        CrcPolicy {
            check: true,
            fix: BitFix::Off,
        }
    }
}

/// Turns raw payloads into messages. The dispatcher only talks to this.
pub trait ModesDecoder {
    /// Decode a 7- or 14-byte Mode S payload.
    ///
    /// `now` is the reception time in Unix seconds, used to age the
    /// address filter.
    fn decode_modes(
        &self,
        payload: &[u8],
        policy: CrcPolicy,
        filter: &mut dyn AddressFilter,
        now: f64,
    ) -> std::result::Result<ModesMessage, DecodeError>;

    /// Decode a 2-byte Mode A/C payload. Never fails.
    fn decode_mode_ac(&self, payload: [u8; MODEAC_MSG_BYTES]) -> ModesMessage;
}

/// Stateless decoder for 1090 MHz downlink formats.
#[derive(Debug, Default, Clone, Copy)]
pub struct ModeSDecoder;

impl ModesDecoder for ModeSDecoder {
    fn decode_modes(
        &self,
        payload: &[u8],
        policy: CrcPolicy,
        filter: &mut dyn AddressFilter,
        now: f64,
    ) -> std::result::Result<ModesMessage, DecodeError> {
        let first = *payload.first().ok_or(DecodeError::Malformed(0))?;
        let df = downlink_format(first);
        if payload.len() != message_len(df) {
            return Err(DecodeError::Malformed(df));
        }

        let mut raw = payload.to_vec();
        let (addr, corrected_bits) = match df {
            11 | 17 | 18 => {
                let corrected = check_explicit(&mut raw, df, policy)?;
                let addr = addr_from_bytes(&raw[1..4]);
                // a DF11 with a non-zero IID answered someone else's interrogation
                let trusted = df != 11 || crc::crc24(&raw) == 0;
                if corrected.is_some() && trusted {
                    filter.insert(addr, now);
                }
                (addr, corrected.unwrap_or(0))
            }
            0 | 4 | 5 | 16 | 20 | 21 | 24 => {
                let addr = crc::crc24(&raw);
                if !filter.test(addr, now) {
                    return Err(DecodeError::UnknownIcao);
                }
                (addr, 0)
            }
            _ => return Err(DecodeError::BadCrc),
        };

        let mut mm = ModesMessage {
            df,
            addr,
            corrected_bits,
            ..Default::default()
        };
        decode_fields(&mut mm, &raw);
        mm.raw = raw;
        Ok(mm)
    }

    fn decode_mode_ac(&self, payload: [u8; MODEAC_MSG_BYTES]) -> ModesMessage {
        mode_ac::decode_mode_ac(payload)
    }
}

/// DF from the first byte; everything from 24 up is DF24.
fn downlink_format(first: u8) -> u8 {
    let df = first >> 3;
    if df >= 24 {
        24
    } else {
        df
    }
}

/// Long formats have the top DF bit set.
pub fn message_len(df: u8) -> usize {
    if df & 0x10 != 0 {
        MODES_LONG_MSG_BYTES
    } else {
        MODES_SHORT_MSG_BYTES
    }
}

/// CRC check for formats carrying the address in the clear.
///
/// `Ok(Some(n))` means the parity checked out after flipping `n` bits,
/// `Ok(None)` means it did not but checking is disabled.
fn check_explicit(
    raw: &mut [u8],
    df: u8,
    policy: CrcPolicy,
) -> std::result::Result<Option<u8>, DecodeError> {
    let residual = crc::crc24(raw);
    // DF11 may carry an interrogator code in the low 7 bits
    let clean = if df == 11 {
        residual & !0x7F == 0
    } else {
        residual == 0
    };
    if clean {
        return Ok(Some(0));
    }
    // a damaged DF11 can't be told apart from a reply to another interrogator
    if df != 11 {
        if let Some(bits) = crc::fix_errors(raw, policy.fix) {
            return Ok(Some(bits));
        }
    }
    if policy.check {
        Err(DecodeError::BadCrc)
    } else {
        Ok(None)
    }
}

// ---------------------------------------------------------------------------
// Field decoding
// ---------------------------------------------------------------------------

fn decode_fields(mm: &mut ModesMessage, raw: &[u8]) {
    match mm.df {
        0 | 16 => {
            mm.airground = if raw[0] & 0x04 != 0 {
                AirGround::Ground
            } else {
                AirGround::Airborne
            };
            mm.altitude = ac13_field(raw).map(baro);
        }
        4 | 20 => {
            flight_status(mm, raw[0] & 0x07);
            mm.altitude = ac13_field(raw).map(baro);
        }
        5 | 21 => {
            flight_status(mm, raw[0] & 0x07);
            mm.squawk = Some(id13_to_hex_octal(id13_field(raw)));
        }
        11 => capability(mm, raw[0] & 0x07),
        17 | 18 => {
            if mm.df == 17 {
                capability(mm, raw[0] & 0x07);
            }
            decode_extended_squitter(mm, &raw[4..11]);
        }
        _ => {}
    }
}

fn baro(feet: i32) -> Altitude {
    Altitude {
        feet,
        source: AltitudeSource::Baro,
    }
}

fn ac13_field(raw: &[u8]) -> Option<i32> {
    decode_ac13(id13_field(raw))
}

fn id13_field(raw: &[u8]) -> u32 {
    ((raw[2] as u32 & 0x1F) << 8) | raw[3] as u32
}

/// FS field of DF4/5/20/21.
fn flight_status(mm: &mut ModesMessage, fs: u8) {
    let (alert, spi, airground) = match fs {
        0 => (false, false, AirGround::Airborne),
        1 => (false, false, AirGround::Ground),
        2 => (true, false, AirGround::Airborne),
        3 => (true, false, AirGround::Ground),
        4 => (true, true, AirGround::Uncertain),
        5 => (false, true, AirGround::Uncertain),
        _ => (false, false, AirGround::Invalid),
    };
    mm.alert = Some(alert);
    mm.spi = Some(spi);
    mm.airground = airground;
}

/// CA field of DF11/17.
fn capability(mm: &mut ModesMessage, ca: u8) {
    mm.airground = match ca {
        4 => AirGround::Ground,
        5 => AirGround::Airborne,
        0 | 6 | 7 => AirGround::Uncertain,
        _ => AirGround::Invalid,
    };
}

fn decode_extended_squitter(mm: &mut ModesMessage, me: &[u8]) {
    let metype = me[0] >> 3;
    let mesub = me[0] & 0x07;
    mm.metype = Some(metype);
    mm.mesub = Some(mesub);

    match metype {
        1..=4 => mm.callsign = Some(decode_callsign(me)),
        5..=8 => {
            mm.airground = AirGround::Ground;
            mm.cpr = Some(cpr_fields(me, true));
        }
        9..=18 | 20..=22 => {
            let ac12 = ((me[1] as u32) << 4) | (me[2] as u32 >> 4);
            let source = if metype >= 20 {
                AltitudeSource::Gnss
            } else {
                AltitudeSource::Baro
            };
            mm.altitude = decode_ac12(ac12).map(|feet| Altitude { feet, source });
            mm.cpr = Some(cpr_fields(me, false));
        }
        19 => decode_velocity(mm, me, mesub),
        28 if mesub == 1 => {
            let id13 = ((me[1] as u32 & 0x1F) << 8) | me[2] as u32;
            if id13 != 0 {
                mm.squawk = Some(id13_to_hex_octal(id13));
            }
        }
        _ => {}
    }
}

/// Eight 6-bit characters packed into ME bits 8-55.
fn decode_callsign(me: &[u8]) -> String {
    let mut buf = [0u8; 8];
    buf[2..8].copy_from_slice(&me[1..7]);
    let bits = u64::from_be_bytes(buf);
    (0..8)
        .map(|i| CALLSIGN_CHARSET[((bits >> (42 - 6 * i)) & 0x3F) as usize] as char)
        .collect()
}

fn cpr_fields(me: &[u8], surface: bool) -> CprFields {
    CprFields {
        odd: me[2] & 0x04 != 0,
        lat: ((me[2] as u32 & 0x03) << 15) | ((me[3] as u32) << 7) | (me[4] as u32 >> 1),
        lon: ((me[4] as u32 & 0x01) << 16) | ((me[5] as u32) << 8) | me[6] as u32,
        surface,
    }
}

/// TC19: airborne velocity over ground (subtypes 1/2) or airspeed (3/4).
fn decode_velocity(mm: &mut ModesMessage, me: &[u8], subtype: u8) {
    let supersonic = subtype == 2 || subtype == 4;
    let scale = if supersonic { 4 } else { 1 };

    match subtype {
        1 | 2 => {
            let ew_raw = ((me[1] as i32 & 0x03) << 8) | me[2] as i32;
            let ns_raw = ((me[3] as i32 & 0x7F) << 3) | (me[4] as i32 >> 5);
            if ew_raw != 0 && ns_raw != 0 {
                let mut ew = (ew_raw - 1) * scale;
                let mut ns = (ns_raw - 1) * scale;
                if me[1] & 0x04 != 0 {
                    ew = -ew;
                }
                if me[3] & 0x80 != 0 {
                    ns = -ns;
                }
                let (ew, ns) = (ew as f64, ns as f64);
                let knots = (ew * ew + ns * ns).sqrt().round() as u32;
                let degrees = ew.atan2(ns).to_degrees().rem_euclid(360.0) as u32;
                mm.speed = Some(Speed {
                    knots,
                    source: SpeedSource::Ground,
                });
                mm.heading = Some(Heading {
                    degrees,
                    source: HeadingSource::True,
                });
            }
        }
        3 | 4 => {
            if me[1] & 0x04 != 0 {
                let raw = ((me[1] as u32 & 0x03) << 8) | me[2] as u32;
                mm.heading = Some(Heading {
                    degrees: raw * 360 / 1024,
                    source: HeadingSource::Magnetic,
                });
            }
            let airspeed = ((me[3] as u32 & 0x7F) << 3) | (me[4] as u32 >> 5);
            if airspeed != 0 {
                mm.speed = Some(Speed {
                    knots: (airspeed - 1) * scale as u32,
                    source: if me[3] & 0x80 != 0 {
                        SpeedSource::Tas
                    } else {
                        SpeedSource::Ias
                    },
                });
            }
        }
        _ => return,
    }

    let vr = ((me[4] as i32 & 0x07) << 6) | (me[5] as i32 >> 2);
    if vr != 0 {
        let rate = (vr - 1) * 64;
        mm.vert_rate = Some(if me[4] & 0x08 != 0 { -rate } else { rate });
    }

    let delta = me[6] as i32 & 0x7F;
    if delta != 0 {
        let feet = (delta - 1) * 25;
        mm.gnss_delta = Some(if me[6] & 0x80 != 0 { -feet } else { feet });
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
