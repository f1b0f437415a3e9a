//! Per-frame handling: de-stuff, timestamp, decode, count, route.
//!
//! The dispatcher owns every piece of mutable run state (ICAO filter, track
//! state, counters, catalog) and the output sinks. Rejected messages are
//! counted here and go nowhere else.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use tracing::{debug, trace};

use beast_core::{
    icao_to_string, AddressFilter, Addr, ClockModel, DecodeError, ExtractedFrame, FrameKind,
    IcaoFilter, ModeSDecoder, ModesDecoder, ModesMessage, TrackSink, Tracker, DF_MODE_AC,
    MODEAC_MSG_BYTES,
};

use crate::config::FilterConfig;
use crate::error::Result;
use crate::output::OutputRouter;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunCounters {
    /// Complete frames pulled out of the stream.
    pub processed: u64,
    /// Frames that decoded into a message.
    pub accepted: u64,
    /// Frames copied to the extraction file.
    pub extracted: u64,
    pub bad_crc: u64,
    pub unknown_icao: u64,
}

impl RunCounters {
    /// End-of-run report, one line each.
    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines = vec![
            format!("Total processed {} messages", self.processed),
            format!("Decoded {} messages", self.accepted),
        ];
        if self.extracted > 0 {
            lines.push(format!("Extracted {} messages", self.extracted));
        }
        if self.bad_crc > 0 {
            lines.push(format!("{} messages with bad CRC", self.bad_crc));
        }
        if self.unknown_icao > 0 {
            lines.push(format!("{} messages with unknown ICAO", self.unknown_icao));
        }
        lines
    }
}

pub struct Dispatcher<D = ModeSDecoder, F = IcaoFilter, T = Tracker> {
    decoder: D,
    filter: F,
    tracker: T,
    config: FilterConfig,
    clock: ClockModel,
    output: OutputRouter,
    counters: RunCounters,
    catalog: BTreeSet<Addr>,
    /// Reception time of the latest frame, Unix seconds.
    now: f64,
}

impl Dispatcher {
    pub fn new(config: FilterConfig, clock: ClockModel, output: OutputRouter) -> Self {
        Dispatcher::with_parts(
            ModeSDecoder,
            IcaoFilter::default(),
            Tracker::new(),
            config,
            clock,
            output,
        )
    }

    pub fn with_tracker(mut self, tracker: Tracker) -> Self {
        self.tracker = tracker;
        self
    }
}

impl<D: ModesDecoder, F: AddressFilter, T: TrackSink> Dispatcher<D, F, T> {
    pub fn with_parts(
        decoder: D,
        filter: F,
        tracker: T,
        config: FilterConfig,
        clock: ClockModel,
        output: OutputRouter,
    ) -> Self {
        Dispatcher {
            decoder,
            filter,
            tracker,
            config,
            clock,
            output,
            counters: RunCounters::default(),
            catalog: BTreeSet::new(),
            now: 0.0,
        }
    }

    pub fn clock(&self) -> &ClockModel {
        &self.clock
    }

    pub fn anchor_clock(&mut self, tick: u64) {
        self.clock.anchor(tick);
        debug!(tick, clock = self.clock.name(), "receiver clock anchored");
    }

    pub fn counters(&self) -> &RunCounters {
        &self.counters
    }

    /// Cache housekeeping, run before every extraction attempt.
    pub fn before_frame(&mut self) {
        self.filter.expire(self.now);
        self.tracker.periodic_update(self.now);
    }

    /// Handle one extracted frame. Only output failures are errors.
    pub fn dispatch(&mut self, frame: &ExtractedFrame) -> Result<()> {
        self.counters.processed += 1;

        let Some(fields) = frame.fields() else {
            self.reject(DecodeError::Malformed(0));
            return Ok(());
        };
        let time = self.clock.reconstruct(fields.ticks);
        self.now = unix_secs(time);

        let decoded = match fields.kind {
            FrameKind::ModeAc => {
                if !self.config.mode_ac {
                    return Ok(());
                }
                <[u8; MODEAC_MSG_BYTES]>::try_from(fields.payload.as_slice())
                    .map(|code| self.decoder.decode_mode_ac(code))
                    .map_err(|_| DecodeError::Malformed(DF_MODE_AC))
            }
            FrameKind::ModeSShort | FrameKind::ModeSLong => self.decoder.decode_modes(
                &fields.payload,
                self.config.crc,
                &mut self.filter,
                self.now,
            ),
        };
        let mut mm = match decoded {
            Ok(mm) => mm,
            Err(err) => {
                self.reject(err);
                return Ok(());
            }
        };
        mm.ticks = fields.ticks;
        mm.time = time;
        mm.signal_level = fields.signal_power();
        self.counters.accepted += 1;

        if self.config.find_icao {
            if mm.is_icao() && self.catalog.insert(mm.addr) {
                debug!(icao = %icao_to_string(mm.addr), "new address");
            }
            return Ok(());
        }
        self.route(frame, mm)
    }

    fn route(&mut self, frame: &ExtractedFrame, mut mm: ModesMessage) -> Result<()> {
        if !self.config.matches(mm.addr) {
            return Ok(());
        }
        if self.output.extract(frame.as_bytes())? {
            self.counters.extracted += 1;
        }
        self.tracker.update(&mut mm);
        self.output.sbs(&mm, &self.config)?;
        if self.config.icao == Some(mm.addr) {
            self.output.kml(&mm)?;
        }
        Ok(())
    }

    fn reject(&mut self, err: DecodeError) {
        match err {
            DecodeError::UnknownIcao => self.counters.unknown_icao += 1,
            DecodeError::BadCrc | DecodeError::Malformed(_) => self.counters.bad_crc += 1,
        }
        debug!(frame = self.counters.processed, error = %err, "message rejected");
    }

    /// Close the outputs and hand back the counters and the address catalog.
    pub fn finish(self) -> Result<(RunCounters, BTreeSet<Addr>)> {
        trace!(kml_points = self.output.kml_points(), "closing outputs");
        self.output.finish()?;
        Ok((self.counters, self.catalog))
    }
}

fn unix_secs(time: DateTime<Utc>) -> f64 {
    time.timestamp() as f64 + time.timestamp_subsec_nanos() as f64 * 1e-9
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RunError;
    use crate::output::tests::{FullDisk, SharedBuf};
    use beast_core::beast::encode_frame;
    use beast_core::{extract_frame, hex_decode, Extraction};

    const DF17_IDENT: &str = "8D4840D6202CC371C32CE0576098";

    fn frame(kind: FrameKind, payload: &[u8]) -> ExtractedFrame {
        match extract_frame(&encode_frame(kind, 0x1234, 0x80, payload)) {
            Extraction::Frame(frame) => frame,
            other => panic!("expected a frame, got {other:?}"),
        }
    }

    fn ident() -> ExtractedFrame {
        frame(FrameKind::ModeSLong, &hex_decode(DF17_IDENT).unwrap())
    }

    fn dispatcher(config: FilterConfig) -> (Dispatcher, SharedBuf) {
        let buf = SharedBuf::default();
        let output = OutputRouter::new().with_extract(Box::new(buf.clone()));
        (Dispatcher::new(config, ClockModel::None, output), buf)
    }

    #[test]
    fn test_accepted_frame_extracted() {
        let (mut d, buf) = dispatcher(FilterConfig::default());
        let f = ident();
        d.dispatch(&f).unwrap();
        let (counters, _) = d.finish().unwrap();
        assert_eq!(counters.processed, 1);
        assert_eq!(counters.accepted, 1);
        assert_eq!(counters.extracted, 1);
        assert_eq!(buf.contents(), f.as_bytes());
    }

    #[test]
    fn test_filter_mismatch_not_extracted() {
        let (mut d, buf) = dispatcher(FilterConfig {
            icao: Some(0x40621D),
            ..Default::default()
        });
        d.dispatch(&ident()).unwrap();
        let (counters, _) = d.finish().unwrap();
        assert_eq!(counters.accepted, 1);
        assert_eq!(counters.extracted, 0);
        assert!(buf.contents().is_empty());
    }

    #[test]
    fn test_bad_crc_counted() {
        let mut payload = hex_decode(DF17_IDENT).unwrap();
        payload[6] ^= 0x10;
        let (mut d, _) = dispatcher(FilterConfig::default());
        d.dispatch(&frame(FrameKind::ModeSLong, &payload)).unwrap();
        assert_eq!(d.counters().bad_crc, 1);
        assert_eq!(d.counters().accepted, 0);
    }

    #[test]
    fn test_unknown_icao_counted() {
        let (mut d, _) = dispatcher(FilterConfig::default());
        d.dispatch(&frame(
            FrameKind::ModeSShort,
            &[0x20, 0x00, 0x18, 0x38, 0x12, 0x34, 0x56],
        ))
        .unwrap();
        assert_eq!(d.counters().unknown_icao, 1);
        assert_eq!(d.counters().summary_lines().len(), 3);
    }

    #[test]
    fn test_mode_ac_needs_flag() {
        let (mut d, _) = dispatcher(FilterConfig::default());
        d.dispatch(&frame(FrameKind::ModeAc, &[0x77, 0x00])).unwrap();
        assert_eq!(d.counters().processed, 1);
        assert_eq!(d.counters().accepted, 0);

        let (mut d, buf) = dispatcher(FilterConfig {
            mode_ac: true,
            ..Default::default()
        });
        d.dispatch(&frame(FrameKind::ModeAc, &[0x77, 0x00])).unwrap();
        let (counters, _) = d.finish().unwrap();
        assert_eq!(counters.accepted, 1);
        assert_eq!(counters.extracted, 1);
        assert_eq!(buf.contents().len(), 11);
    }

    #[test]
    fn test_find_icao_catalog_only() {
        let (mut d, buf) = dispatcher(FilterConfig {
            find_icao: true,
            ..Default::default()
        });
        d.dispatch(&ident()).unwrap();
        d.dispatch(&ident()).unwrap();
        let (counters, catalog) = d.finish().unwrap();
        assert_eq!(counters.accepted, 2);
        assert_eq!(counters.extracted, 0);
        assert_eq!(catalog.into_iter().collect::<Vec<_>>(), vec![0x4840D6]);
        assert!(buf.contents().is_empty());
    }

    #[test]
    fn test_sbs_line_routed() {
        let sbs = SharedBuf::default();
        let config = FilterConfig {
            sbs_output: true,
            ..Default::default()
        };
        let output = OutputRouter::new().with_sbs(Box::new(sbs.clone()));
        let mut d = Dispatcher::new(config, ClockModel::None, output);
        d.dispatch(&ident()).unwrap();
        d.finish().unwrap();

        let text = sbs.text();
        assert!(text.starts_with("MSG,1,1,1,4840D6,1,"), "{text}");
        assert!(text.contains(",KLM1023 ,"), "{text}");
    }

    #[test]
    fn test_extract_failure_stops_routing() {
        let sbs = SharedBuf::default();
        let config = FilterConfig {
            sbs_output: true,
            ..Default::default()
        };
        let output = OutputRouter::new()
            .with_extract(Box::new(FullDisk))
            .with_sbs(Box::new(sbs.clone()));
        let mut d = Dispatcher::new(config, ClockModel::None, output);
        let err = d.dispatch(&ident()).unwrap_err();
        assert!(matches!(err, RunError::ExtractWrite(_)), "{err}");
        assert_eq!(d.counters().accepted, 1);
        assert_eq!(d.counters().extracted, 0);
        d.finish().unwrap();
        assert!(sbs.contents().is_empty());
    }

    /// Knows every address.
    struct OpenFilter;

    impl AddressFilter for OpenFilter {
        fn test(&mut self, _addr: Addr, _now: f64) -> bool {
            true
        }
        fn insert(&mut self, _addr: Addr, _now: f64) {}
        fn expire(&mut self, _now: f64) {}
    }

    #[derive(Default)]
    struct CountingTracker {
        updates: Vec<Addr>,
        housekeeping: u32,
    }

    impl TrackSink for CountingTracker {
        fn update(&mut self, msg: &mut ModesMessage) {
            self.updates.push(msg.addr);
        }
        fn periodic_update(&mut self, _now: f64) {
            self.housekeeping += 1;
        }
    }

    #[test]
    fn test_substituted_filter_and_tracker() {
        let mut d = Dispatcher::with_parts(
            ModeSDecoder,
            OpenFilter,
            CountingTracker::default(),
            FilterConfig::default(),
            ClockModel::None,
            OutputRouter::new(),
        );
        let residual = frame(
            FrameKind::ModeSShort,
            &[0x20, 0x00, 0x18, 0x38, 0x12, 0x34, 0x56],
        );
        d.before_frame();
        d.dispatch(&residual).unwrap();
        d.before_frame();
        d.dispatch(&ident()).unwrap();

        assert_eq!(d.counters().accepted, 2);
        assert_eq!(d.counters().unknown_icao, 0);
        assert_eq!(d.tracker.housekeeping, 2);
        assert_eq!(d.tracker.updates.len(), 2);
        assert_eq!(d.tracker.updates[1], 0x4840D6);
    }

    #[test]
    fn test_summary_lines() {
        let counters = RunCounters {
            processed: 10,
            accepted: 7,
            extracted: 0,
            bad_crc: 3,
            unknown_icao: 0,
        };
        assert_eq!(
            counters.summary_lines(),
            vec![
                "Total processed 10 messages",
                "Decoded 7 messages",
                "3 messages with bad CRC",
            ]
        );
    }
}
