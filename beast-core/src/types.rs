//! Shared types, error enum, and the decoded message record for beast-core.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

/// Errors produced by beast-core outside the per-frame decode path.
#[derive(Debug, Error)]
pub enum BeastError {
    #[error("invalid ICAO address: {0:?}")]
    InvalidIcao(String),
    #[error("invalid base time: {0}")]
    InvalidTime(String),
}

pub type Result<T> = std::result::Result<T, BeastError>;

// ---------------------------------------------------------------------------
// Message sizes
// ---------------------------------------------------------------------------

pub const MODEAC_MSG_BYTES: usize = 2;
pub const MODES_SHORT_MSG_BYTES: usize = 7;
pub const MODES_LONG_MSG_BYTES: usize = 14;

/// Pseudo downlink format assigned to Mode A/C replies.
pub const DF_MODE_AC: u8 = 32;

// ---------------------------------------------------------------------------
// Address helpers
// ---------------------------------------------------------------------------

/// Set on addresses that are not real ICAO addresses (Mode A/C replies).
pub const NON_ICAO_ADDRESS: u32 = 1 << 24;

/// 24-bit ICAO address, plus `NON_ICAO_ADDRESS` when synthesized.
pub type Addr = u32;

/// Format an address as 6 uppercase hex digits.
pub fn icao_to_string(addr: Addr) -> String {
    format!("{:06X}", addr & 0xFFFFFF)
}

/// Parse a hex ICAO address (1 to 6 digits, optional `0x` prefix).
pub fn parse_icao(hex: &str) -> Result<Addr> {
    let trimmed = hex.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    if digits.is_empty() || digits.len() > 6 {
        return Err(BeastError::InvalidIcao(hex.to_string()));
    }
    u32::from_str_radix(digits, 16).map_err(|_| BeastError::InvalidIcao(hex.to_string()))
}

/// Address from bytes 1-3 of a Mode S message.
pub fn addr_from_bytes(b: &[u8]) -> Addr {
    ((b[0] as u32) << 16) | ((b[1] as u32) << 8) | b[2] as u32
}

// ---------------------------------------------------------------------------
// Hex utilities
// ---------------------------------------------------------------------------

/// Decode a hex string into bytes. Case-insensitive, must be even length.
pub fn hex_decode(hex: &str) -> Option<Vec<u8>> {
    let hex = hex.trim();
    if hex.len() % 2 != 0 {
        return None;
    }
    hex.as_bytes()
        .chunks(2)
        .map(|pair| Some((hex_digit(pair[0])? << 4) | hex_digit(pair[1])?))
        .collect()
}

/// Encode bytes as uppercase hex string.
pub fn hex_encode(data: &[u8]) -> String {
    data.iter().map(|b| format!("{b:02X}")).collect()
}

fn hex_digit(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// ADS-B callsign character set
// ---------------------------------------------------------------------------

/// ADS-B character set for callsign encoding (6 bits per character).
pub const CALLSIGN_CHARSET: &[u8; 64] =
    b"#ABCDEFGHIJKLMNOPQRSTUVWXYZ##### ###############0123456789######";

// ---------------------------------------------------------------------------
// Decoded message record
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AltitudeSource {
    Baro,
    Gnss,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Altitude {
    pub feet: i32,
    pub source: AltitudeSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SpeedSource {
    Ground,
    Ias,
    Tas,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Speed {
    pub knots: u32,
    pub source: SpeedSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HeadingSource {
    True,
    Magnetic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Heading {
    pub degrees: u32,
    pub source: HeadingSource,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum AirGround {
    #[default]
    Invalid,
    Ground,
    Airborne,
    Uncertain,
}

/// Raw CPR-encoded position as carried by an extended squitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CprFields {
    pub lat: u32,
    pub lon: u32,
    pub odd: bool,
    pub surface: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Position {
    pub lat: f64,
    pub lon: f64,
}

/// Everything known about one accepted message.
///
/// Filled in stages: the decoder sets the wire-level fields, the dispatcher
/// attaches reception time and signal, and the tracker resolves position and
/// the aircraft's GNSS/baro delta.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ModesMessage {
    /// Downlink format, or `DF_MODE_AC` for Mode A/C.
    pub df: u8,
    pub addr: Addr,
    /// Payload after any CRC correction.
    pub raw: Vec<u8>,
    pub corrected_bits: u8,

    /// Raw 48-bit receiver clock.
    pub ticks: u64,
    /// Absolute reception time reconstructed from `ticks`.
    pub time: DateTime<Utc>,
    /// Signal power in [0, 1].
    pub signal_level: f64,

    /// Extended squitter type code and subtype (DF17/18 only).
    pub metype: Option<u8>,
    pub mesub: Option<u8>,

    pub altitude: Option<Altitude>,
    /// GNSS minus baro altitude carried by this message (TC19).
    pub gnss_delta: Option<i32>,
    /// Latest GNSS minus baro altitude known for the aircraft.
    pub track_gnss_delta: Option<i32>,
    pub speed: Option<Speed>,
    pub heading: Option<Heading>,
    pub vert_rate: Option<i32>,
    /// Identity as four octal digits packed in nibbles (7700 -> 0x7700).
    pub squawk: Option<u16>,
    pub callsign: Option<String>,
    pub alert: Option<bool>,
    pub spi: Option<bool>,
    pub airground: AirGround,

    pub cpr: Option<CprFields>,
    pub position: Option<Position>,
}

impl ModesMessage {
    pub fn is_extended_squitter(&self) -> bool {
        matches!(self.df, 17 | 18)
    }

    pub fn is_icao(&self) -> bool {
        self.addr & NON_ICAO_ADDRESS == 0
    }

    /// Reception time in fractional Unix seconds, as used by the caches.
    pub fn time_secs(&self) -> f64 {
        self.time.timestamp() as f64 + self.time.timestamp_subsec_nanos() as f64 * 1e-9
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
