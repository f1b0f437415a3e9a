//! Per-aircraft state needed to finish decoding individual messages.
//!
//! A single message can't carry everything: positions need an even/odd CPR
//! pair (or a previous position), and GNSS altitude only converts to baro
//! with the delta reported in an earlier velocity message. The tracker keeps
//! just enough per address to resolve both and writes the results back into
//! the message.

use std::collections::HashMap;

use crate::cpr::{self, CprFrame};
use crate::types::{Addr, ModesMessage, Position};

/// Aircraft dropped after this many seconds of silence.
pub const TRACK_TIMEOUT: f64 = 300.0;

/// Oldest position still trusted as a local CPR reference, in seconds.
const REFERENCE_MAX_AGE: f64 = 60.0;

/// Positions further than this from the receiver are discarded (450 NM).
pub const DEFAULT_MAX_RANGE: f64 = 1852.0 * 450.0;

/// Half an airborne latitude zone (3 degrees), in metres. A receiver can
/// only stand in as an airborne local reference if nothing it hears can be
/// further away than this.
const AIRBORNE_HALF_ZONE: f64 = 1852.0 * 180.0;

/// Hook run for every accepted message, and once per frame for housekeeping.
pub trait TrackSink {
    /// Fold `msg` into track state and annotate it with what the track knows.
    fn update(&mut self, msg: &mut ModesMessage);
    /// Housekeeping; `now` is the current reception time in Unix seconds.
    fn periodic_update(&mut self, now: f64);
}

#[derive(Debug, Clone, Default)]
pub struct AircraftState {
    pub last_seen: f64,
    pub messages: u64,
    pub even: Option<CprFrame>,
    pub odd: Option<CprFrame>,
    pub position: Option<Position>,
    pub position_time: f64,
    pub gnss_delta: Option<i32>,
}

#[derive(Debug)]
pub struct Tracker {
    aircraft: HashMap<Addr, AircraftState>,
    receiver: Option<Position>,
    /// Metres.
    max_range: f64,
    pub position_decodes: u64,
    /// Decoded positions dropped for being out of range.
    pub range_rejects: u64,
}

impl Default for Tracker {
    fn default() -> Self {
        Tracker {
            aircraft: HashMap::new(),
            receiver: None,
            max_range: DEFAULT_MAX_RANGE,
            position_decodes: 0,
            range_rejects: 0,
        }
    }
}

impl Tracker {
    pub fn new() -> Self {
        Tracker::default()
    }

    /// Known receiver location: a local CPR reference of last resort, and
    /// the centre of the range check.
    pub fn with_receiver(mut self, receiver: Option<Position>) -> Self {
        self.receiver = receiver;
        self
    }

    /// Maximum plausible range from the receiver, in metres.
    pub fn with_max_range(mut self, metres: f64) -> Self {
        self.max_range = metres;
        self
    }

    pub fn get(&self, addr: Addr) -> Option<&AircraftState> {
        self.aircraft.get(&addr)
    }

    pub fn len(&self) -> usize {
        self.aircraft.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aircraft.is_empty()
    }
}

impl TrackSink for Tracker {
    fn update(&mut self, msg: &mut ModesMessage) {
        if !msg.is_icao() {
            return;
        }
        let now = msg.time_secs();
        let (receiver, max_range) = (self.receiver, self.max_range);
        let ac = self.aircraft.entry(msg.addr).or_default();
        ac.last_seen = now;
        ac.messages += 1;

        if msg.gnss_delta.is_some() {
            ac.gnss_delta = msg.gnss_delta;
        }
        msg.track_gnss_delta = ac.gnss_delta;

        let Some(fields) = msg.cpr else {
            return;
        };
        let frame = CprFrame { fields, time: now };
        if fields.odd {
            ac.odd = Some(frame);
        } else {
            ac.even = Some(frame);
        }

        let Some(pos) = resolve_position(ac, &frame, receiver, max_range) else {
            return;
        };
        if receiver.is_some_and(|rx| cpr::distance_m(rx, pos) > max_range) {
            self.range_rejects += 1;
            return;
        }
        ac.position = Some(pos);
        ac.position_time = now;
        msg.position = Some(pos);
        self.position_decodes += 1;
    }

    fn periodic_update(&mut self, now: f64) {
        self.aircraft
            .retain(|_, ac| now - ac.last_seen <= TRACK_TIMEOUT);
    }
}

/// Global decode from a fresh pair, else local decode against the last
/// position if it is recent enough to still be within half a zone, else
/// local decode against the receiver.
fn resolve_position(
    ac: &AircraftState,
    latest: &CprFrame,
    receiver: Option<Position>,
    max_range: f64,
) -> Option<Position> {
    let surface = latest.fields.surface;
    if !surface {
        if let (Some(even), Some(odd)) = (&ac.even, &ac.odd) {
            if let Some(pos) = cpr::global_decode(even, odd) {
                return Some(pos);
            }
        }
    }
    let reference = match ac.position {
        Some(pos) if latest.time - ac.position_time <= REFERENCE_MAX_AGE => pos,
        _ if surface || max_range <= AIRBORNE_HALF_ZONE => receiver?,
        _ => return None,
    };
    cpr::local_decode(&latest.fields, reference)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
