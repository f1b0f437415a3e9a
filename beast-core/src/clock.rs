//! Reconstruct absolute reception time from the 48-bit receiver clock.
//!
//! Three clock models, chosen once per run:
//! - `None`: ignore the counter, stamp with wall-clock time.
//! - `HardwareEpoch`: GPS-disciplined receivers put seconds-of-day in the
//!   upper 18 bits and nanoseconds in the lower 30.
//! - `SoftwareRelative`: a free-running 12 MHz counter, anchored to a base
//!   time at the first frame of the stream.

use chrono::{DateTime, Local, NaiveTime, TimeZone, Utc};

/// Counter rate for free-running receivers.
pub const TICKS_PER_MICROSECOND: u64 = 12;

const TICK_MASK: u64 = 0xFFFF_FFFF_FFFF;
const SECONDS_SHIFT: u32 = 30;
const NANOS_MASK: u64 = 0x3FFF_FFFF;

const NANOS_PER_SECOND: i64 = 1_000_000_000;
const MICROS_PER_SECOND: u64 = 1_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockModel {
    None,
    HardwareEpoch {
        /// Start of the capture day.
        midnight: DateTime<Utc>,
    },
    SoftwareRelative {
        base: DateTime<Utc>,
        /// Counter value of the first frame; anchored before the main pass.
        first_tick: u64,
    },
}

impl ClockModel {
    /// Hardware model anchored at midnight of `base`'s calendar day, in the
    /// local zone if `local` is set, else UTC.
    pub fn hardware_epoch(base: DateTime<Utc>, local: bool) -> Self {
        let midnight = if local {
            let day = base.with_timezone(&Local).date_naive();
            Local
                .from_local_datetime(&day.and_time(NaiveTime::MIN))
                .earliest()
                .map(|t| t.with_timezone(&Utc))
                .unwrap_or_else(|| day.and_time(NaiveTime::MIN).and_utc())
        } else {
            base.date_naive().and_time(NaiveTime::MIN).and_utc()
        };
        ClockModel::HardwareEpoch { midnight }
    }

    /// Software model with no anchor yet.
    pub fn software_relative(base: DateTime<Utc>) -> Self {
        ClockModel::SoftwareRelative {
            base,
            first_tick: 0,
        }
    }

    pub fn needs_anchor(&self) -> bool {
        matches!(self, ClockModel::SoftwareRelative { .. })
    }

    /// Set the first-seen tick. No effect on other models.
    pub fn anchor(&mut self, tick: u64) {
        if let ClockModel::SoftwareRelative { first_tick, .. } = self {
            *first_tick = tick & TICK_MASK;
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ClockModel::None => "none",
            ClockModel::HardwareEpoch { .. } => "hardware-epoch",
            ClockModel::SoftwareRelative { .. } => "software-relative",
        }
    }

    /// Absolute time for a raw counter value.
    pub fn reconstruct(&self, ticks: u64) -> DateTime<Utc> {
        match *self {
            ClockModel::None => Utc::now(),
            ClockModel::HardwareEpoch { midnight } => {
                let secs = midnight.timestamp() + (ticks >> SECONDS_SHIFT) as i64;
                let nanos = midnight.timestamp_subsec_nanos() as i64 + (ticks & NANOS_MASK) as i64;
                to_datetime(secs, nanos)
            }
            ClockModel::SoftwareRelative { base, first_tick } => {
                let elapsed = ticks.wrapping_sub(first_tick) & TICK_MASK;
                let micros = elapsed / TICKS_PER_MICROSECOND;
                let secs = base.timestamp() + (micros / MICROS_PER_SECOND) as i64;
                let nanos = base.timestamp_subsec_nanos() as i64
                    + 1000 * (micros % MICROS_PER_SECOND) as i64;
                to_datetime(secs, nanos)
            }
        }
    }
}

/// Carry whole seconds out of (or borrow into) the nanosecond field so that
/// `0 <= nanos < 1e9`.
pub fn normalize(secs: i64, nanos: i64) -> (i64, u32) {
    let carry = nanos.div_euclid(NANOS_PER_SECOND);
    (secs + carry, nanos.rem_euclid(NANOS_PER_SECOND) as u32)
}

/// Out-of-range instants collapse to the Unix epoch.
fn to_datetime(secs: i64, nanos: i64) -> DateTime<Utc> {
    let (secs, nanos) = normalize(secs, nanos);
    DateTime::from_timestamp(secs, nanos).unwrap_or_default()
}

/// Parse `--init-time-unix` style values: seconds with optional fraction.
pub fn parse_unix_time(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    let (whole, frac) = value.split_once('.').unwrap_or((value, ""));
    if whole.is_empty() || !whole.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if !frac.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let secs: i64 = whole.parse().ok()?;
    let nanos = format!("{:0<9}", &frac[..frac.len().min(9)]).parse::<u32>().ok()?;
    DateTime::from_timestamp(secs, nanos)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
