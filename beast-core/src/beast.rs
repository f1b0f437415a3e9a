//! Beast binary frame extraction and de-stuffing.
//!
//! A frame on the wire is `0x1A <type> <6 timestamp bytes> <signal> <payload>`,
//! where any `0x1A` inside the body is doubled. Handling is split in two
//! passes:
//!
//! 1. [`extract_frame`] walks the window keeping stuffing intact. It tells
//!    the caller exactly how many physical bytes the frame occupies, and the
//!    bytes it returns are a bit-identical slice of the input.
//! 2. [`destuff`] walks those bytes again, dropping each duplicated escape,
//!    and splits the logical bytes into clock, signal and payload.
//!
//! Format reference: <https://wiki.jetvision.de/wiki/Mode-S_Beast:Data_Output_Formats>

use crate::types::{MODEAC_MSG_BYTES, MODES_LONG_MSG_BYTES, MODES_SHORT_MSG_BYTES};

/// Sync marker, and the escape byte inside frame bodies.
pub const ESCAPE: u8 = 0x1A;

/// Sync marker + type byte + 6 timestamp bytes + signal byte.
const HEADER_LEN: usize = 9;

const TIMESTAMP_LEN: usize = 6;

/// Shortest complete frame (Mode A/C without stuffing).
pub const MIN_FRAME_LEN: usize = HEADER_LEN + MODEAC_MSG_BYTES;

/// Longest possible frame: every body byte of a long frame stuffed.
pub const MAX_FRAME_LEN: usize = 2 + 2 * (HEADER_LEN - 2 + MODES_LONG_MSG_BYTES);

// ---------------------------------------------------------------------------
// Frame kinds
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    /// `'1'`: Mode A/C, 2-byte payload.
    ModeAc,
    /// `'2'`: Mode S short, 7-byte payload.
    ModeSShort,
    /// `'3'`: Mode S long, 14-byte payload.
    ModeSLong,
}

impl FrameKind {
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            b'1' => Some(FrameKind::ModeAc),
            b'2' => Some(FrameKind::ModeSShort),
            b'3' => Some(FrameKind::ModeSLong),
            _ => None,
        }
    }

    pub fn tag(self) -> u8 {
        match self {
            FrameKind::ModeAc => b'1',
            FrameKind::ModeSShort => b'2',
            FrameKind::ModeSLong => b'3',
        }
    }

    pub fn payload_len(self) -> usize {
        match self {
            FrameKind::ModeAc => MODEAC_MSG_BYTES,
            FrameKind::ModeSShort => MODES_SHORT_MSG_BYTES,
            FrameKind::ModeSLong => MODES_LONG_MSG_BYTES,
        }
    }

    /// Frame length without any stuffing.
    pub fn logical_len(self) -> usize {
        HEADER_LEN + self.payload_len()
    }
}

// ---------------------------------------------------------------------------
// Pass 1: extraction
// ---------------------------------------------------------------------------

/// One complete frame, exactly as it appeared on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedFrame {
    kind: FrameKind,
    bytes: Vec<u8>,
}

impl ExtractedFrame {
    pub fn kind(&self) -> FrameKind {
        self.kind
    }

    /// Sync marker through last body byte, stuffing included.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Number of window bytes this frame consumed.
    pub fn physical_len(&self) -> usize {
        self.bytes.len()
    }

    /// Number of duplicated escape bytes inside the frame.
    pub fn stuffed_count(&self) -> usize {
        self.bytes.len() - self.kind.logical_len()
    }

    /// Second pass over the same bytes.
    pub fn fields(&self) -> Option<DecodedFields> {
        destuff(&self.bytes)
    }
}

/// Outcome of scanning the start of a window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    /// A whole frame starts at byte 0.
    Frame(ExtractedFrame),
    /// Byte 0 does not start a frame; skip one byte and retry.
    NotAFrame,
    /// Looks like a frame but the window ends first; read more and retry.
    Incomplete,
}

/// Try to extract one frame starting at `window[0]`.
///
/// `window` must hold only bytes actually available; its length is the hard
/// read limit. Stuffing is preserved in the returned bytes and each
/// duplicated escape extends the physical bound by one.
pub fn extract_frame(window: &[u8]) -> Extraction {
    if window.len() < MIN_FRAME_LEN {
        return Extraction::Incomplete;
    }
    if window[0] != ESCAPE {
        return Extraction::NotAFrame;
    }
    let Some(kind) = FrameKind::from_tag(window[1]) else {
        return Extraction::NotAFrame;
    };

    let mut end = kind.logical_len();
    if end > window.len() {
        return Extraction::Incomplete;
    }

    let mut pos = 2;
    while pos < end {
        let byte = window[pos];
        pos += 1;
        if byte == ESCAPE {
            // the duplicate rides along but does not count as logical data
            end += 1;
            if end > window.len() {
                return Extraction::Incomplete;
            }
            pos += 1;
        }
    }

    Extraction::Frame(ExtractedFrame {
        kind,
        bytes: window[..end].to_vec(),
    })
}

// ---------------------------------------------------------------------------
// Pass 2: de-stuffing
// ---------------------------------------------------------------------------

/// Logical content of a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFields {
    pub kind: FrameKind,
    /// 48-bit receiver clock, big-endian on the wire.
    pub ticks: u64,
    /// Raw signal byte.
    pub signal: u8,
    pub payload: Vec<u8>,
}

impl DecodedFields {
    /// Signal power in [0, 1]: the squared normalized amplitude.
    pub fn signal_power(&self) -> f64 {
        let amplitude = self.signal as f64 / 255.0;
        amplitude * amplitude
    }
}

/// Re-walk stuffing-intact frame bytes and split out the fields.
///
/// Every escape byte's follower is skipped. Returns `None` if `bytes` does not
/// start with a sync marker and known type, or runs out early.
pub fn destuff(bytes: &[u8]) -> Option<DecodedFields> {
    if bytes.len() < 2 || bytes[0] != ESCAPE {
        return None;
    }
    let kind = FrameKind::from_tag(bytes[1])?;
    let wanted = kind.logical_len() - 2;

    let mut logical = Vec::with_capacity(wanted);
    let mut body = bytes[2..].iter();
    while logical.len() < wanted {
        let &byte = body.next()?;
        logical.push(byte);
        if byte == ESCAPE {
            body.next();
        }
    }

    let ticks = logical[..TIMESTAMP_LEN]
        .iter()
        .fold(0u64, |acc, &b| (acc << 8) | b as u64);

    Some(DecodedFields {
        kind,
        ticks,
        signal: logical[TIMESTAMP_LEN],
        payload: logical[TIMESTAMP_LEN + 1..].to_vec(),
    })
}

/// Clock value of the first frame in `window` with a non-zero counter.
///
/// Scans byte by byte past anything that is not a complete frame.
pub fn find_first_tick(window: &[u8]) -> Option<u64> {
    (0..window.len()).find_map(|start| match extract_frame(&window[start..]) {
        Extraction::Frame(frame) => frame.fields().map(|f| f.ticks).filter(|&t| t != 0),
        _ => None,
    })
}

/// Build wire bytes for a frame, stuffing every escape in the body.
///
/// Inverse of [`destuff`]; used to produce synthetic streams.
pub fn encode_frame(kind: FrameKind, ticks: u64, signal: u8, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(MAX_FRAME_LEN);
    out.push(ESCAPE);
    out.push(kind.tag());

    let clock = ticks.to_be_bytes();
    let body = clock[2..]
        .iter()
        .chain(std::iter::once(&signal))
        .chain(payload.iter());
    for &byte in body {
        out.push(byte);
        if byte == ESCAPE {
            out.push(ESCAPE);
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
