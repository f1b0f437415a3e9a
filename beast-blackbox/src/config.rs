//! Command-line options and the validated run configuration built from them.
//!
//! Every option can also come from a `BEAST_*` environment variable.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Parser, ValueEnum};

use beast_core::clock::{self, ClockModel};
use beast_core::{parse_icao, Addr, BitFix, CrcPolicy, Position};

use crate::error::{Result, RunError};

#[derive(Debug, Parser)]
#[command(
    name = "beast-blackbox",
    version,
    about = "Decode, filter and extract messages from a captured Beast binary stream"
)]
pub struct Cli {
    /// Beast binary capture to read
    #[arg(long, env = "BEAST_FILENAME")]
    pub filename: PathBuf,

    /// Copy matching frames, byte for byte, into this file
    #[arg(long, env = "BEAST_EXTRACT")]
    pub extract: Option<PathBuf>,

    /// Write the filtered aircraft's track as KML (needs --filter-icao)
    #[arg(long, env = "BEAST_EXPORT_KML")]
    pub export_kml: Option<PathBuf>,

    /// Only output messages from this ICAO address (hex)
    #[arg(long, env = "BEAST_FILTER_ICAO")]
    pub filter_icao: Option<String>,

    /// Stop after this many frames (0 = no limit)
    #[arg(long, default_value_t = 0, env = "BEAST_MAX_MESSAGES")]
    pub max_messages: u64,

    /// How to turn the receiver clock into wall-clock time
    #[arg(long, value_enum, default_value_t = MlatTime::None, env = "BEAST_MLAT_TIME")]
    pub mlat_time: MlatTime,

    /// Base time in Unix seconds (fractions allowed) for the receiver clock
    #[arg(long, env = "BEAST_INIT_TIME_UNIX")]
    pub init_time_unix: Option<String>,

    /// Render times in the local zone instead of UTC
    #[arg(long, env = "BEAST_LOCALTIME")]
    pub localtime: bool,

    /// Decode Mode A/C frames
    #[arg(long, env = "BEAST_MODEAC")]
    pub modeac: bool,

    /// Accept messages with a bad CRC
    #[arg(long, env = "BEAST_NO_CRC_CHECK")]
    pub no_crc_check: bool,

    /// Repair single-bit CRC errors
    #[arg(long, conflicts_with_all = ["no_fix", "aggressive"])]
    pub fix: bool,

    /// Never repair CRC errors (default)
    #[arg(long, conflicts_with_all = ["fix", "aggressive"])]
    pub no_fix: bool,

    /// Repair up to two bit errors in long messages
    #[arg(long, conflicts_with_all = ["fix", "no_fix"])]
    pub aggressive: bool,

    /// Report altitudes as GNSS height where known
    #[arg(long, env = "BEAST_GNSS")]
    pub gnss: bool,

    /// Print SBS (BaseStation) lines on stdout
    #[arg(long, env = "BEAST_SBS_OUTPUT")]
    pub sbs_output: bool,

    /// Log progress every 4095 frames
    #[arg(long, env = "BEAST_SHOW_PROGRESS")]
    pub show_progress: bool,

    /// Suppress SBS output
    #[arg(long, env = "BEAST_QUIET")]
    pub quiet: bool,

    /// List every ICAO address in the file instead of decoding
    #[arg(long, env = "BEAST_FIND_ICAO")]
    pub find_icao: bool,

    /// Receiver latitude in decimal degrees (with --lon)
    #[arg(long, env = "BEAST_LAT", allow_negative_numbers = true)]
    pub lat: Option<f64>,

    /// Receiver longitude in decimal degrees (with --lat)
    #[arg(long, env = "BEAST_LON", allow_negative_numbers = true)]
    pub lon: Option<f64>,

    /// Drop positions further than this from the receiver, in nautical miles
    #[arg(long, default_value_t = 450.0, env = "BEAST_MAX_RANGE", allow_negative_numbers = true)]
    pub max_range: f64,
}

/// Metres per nautical mile.
const NM: f64 = 1852.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MlatTime {
    /// Ignore the receiver clock, stamp with the current time
    None,
    /// GPS receivers: seconds-of-day and nanoseconds in the counter
    Beast,
    /// Free-running 12 MHz counter relative to the first frame
    Dump1090,
}

/// What to decode and what to let through.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterConfig {
    pub icao: Option<Addr>,
    /// Stop after this many processed frames.
    pub max_messages: Option<u64>,
    pub mode_ac: bool,
    pub crc: CrcPolicy,
    pub gnss: bool,
    pub show_progress: bool,
    pub quiet: bool,
    pub sbs_output: bool,
    pub local_time: bool,
    pub find_icao: bool,
}

impl FilterConfig {
    /// True if `addr` passes the address filter.
    pub fn matches(&self, addr: Addr) -> bool {
        self.icao.map_or(true, |icao| icao == addr)
    }

    pub fn sbs_enabled(&self) -> bool {
        self.sbs_output && !self.quiet
    }
}

/// Everything a run needs, fixed before the first byte is read.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub input: PathBuf,
    pub extract: Option<PathBuf>,
    pub kml: Option<PathBuf>,
    pub filter: FilterConfig,
    pub clock: ClockModel,
    pub receiver: Option<Position>,
    /// Metres.
    pub max_range: f64,
}

impl Cli {
    /// Validate options into a `RunConfig`. `now` seeds the hardware clock's
    /// capture day when no base time was given.
    pub fn into_config(self, now: DateTime<Utc>) -> Result<RunConfig> {
        let icao = self.filter_icao.as_deref().map(parse_icao).transpose()?;
        if self.export_kml.is_some() && icao.is_none() {
            return Err(RunError::Config(
                "--export-kml requires --filter-icao".to_string(),
            ));
        }

        let base = match self.init_time_unix.as_deref() {
            Some(text) => Some(clock::parse_unix_time(text).ok_or_else(|| {
                RunError::Config(format!("--init-time-unix: invalid time {text:?}"))
            })?),
            None => None,
        };

        let clock = match self.mlat_time {
            MlatTime::None => ClockModel::None,
            MlatTime::Beast => ClockModel::hardware_epoch(base.unwrap_or(now), self.localtime),
            MlatTime::Dump1090 => ClockModel::software_relative(base.unwrap_or_default()),
        };

        let receiver = match (self.lat, self.lon) {
            (None, None) => None,
            (Some(lat), Some(lon)) => {
                if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
                    return Err(RunError::Config(format!(
                        "receiver position {lat},{lon} out of range"
                    )));
                }
                Some(Position { lat, lon })
            }
            _ => {
                return Err(RunError::Config(
                    "--lat and --lon must be given together".to_string(),
                ))
            }
        };
        if !(self.max_range.is_finite() && self.max_range > 0.0) {
            return Err(RunError::Config(format!(
                "--max-range: invalid range {}",
                self.max_range
            )));
        }

        let fix = if self.aggressive {
            BitFix::Aggressive
        } else if self.fix {
            BitFix::Single
        } else {
            BitFix::Off
        };

        Ok(RunConfig {
            input: self.filename,
            extract: self.extract,
            kml: self.export_kml,
            filter: FilterConfig {
                icao,
                max_messages: (self.max_messages > 0).then_some(self.max_messages),
                mode_ac: self.modeac,
                crc: CrcPolicy {
                    check: !self.no_crc_check,
                    fix,
                },
                gnss: self.gnss,
                show_progress: self.show_progress,
                quiet: self.quiet,
                sbs_output: self.sbs_output,
                local_time: self.localtime,
                find_icao: self.find_icao,
            },
            clock,
            receiver,
            max_range: self.max_range * NM,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
