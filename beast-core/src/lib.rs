//! beast-core: Beast binary framing, receiver clock reconstruction, and
//! Mode S / Mode A-C decoding.
//!
//! No I/O. This crate is everything `beast-blackbox` needs to turn a byte
//! window into decoded, timestamped messages; the reading, routing and output
//! formatting live in the binary.

pub mod beast;
pub mod clock;
pub mod cpr;
pub mod crc;
pub mod gillham;
pub mod icao_filter;
pub mod mode_ac;
pub mod modes;
pub mod tracker;
pub mod types;

// Re-export commonly used types at crate root
pub use beast::{
    destuff, extract_frame, find_first_tick, DecodedFields, ExtractedFrame, Extraction, FrameKind,
};
pub use clock::ClockModel;
pub use crc::BitFix;
pub use icao_filter::{AddressFilter, IcaoFilter};
pub use modes::{CrcPolicy, DecodeError, ModeSDecoder, ModesDecoder};
pub use tracker::{TrackSink, Tracker, DEFAULT_MAX_RANGE};
pub use types::*;
