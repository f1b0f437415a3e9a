//! Chunked, resynchronizing pass over a Beast byte stream.
//!
//! The reader fills a fixed-size window, extracts every complete frame from
//! it, and carries the unconsumed tail (at most one partial frame) over to
//! the front of the window before the next read. Frame boundaries therefore
//! never depend on how the underlying reader splits its data.

use std::io::{self, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info, trace};

use beast_core::beast::MAX_FRAME_LEN;
use beast_core::{extract_frame, find_first_tick, AddressFilter, Extraction, ModesDecoder, TrackSink};

use crate::dispatch::Dispatcher;
use crate::error::Result;

/// Default window size.
pub const CHUNK_SIZE: usize = 4096;

/// Frames between progress reports.
pub const PROGRESS_INTERVAL: u64 = 0xFFF;

/// Cooperative stop flag, checked once per chunk and once per frame.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    EndOfInput,
    MaxMessages,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadSummary {
    pub stop: StopReason,
    /// Stream offset just past the last byte consumed.
    pub consumed: u64,
    /// Runs of bytes skipped while looking for a frame.
    pub resyncs: u64,
    /// Bytes left over at end of input that never formed a frame.
    pub trailing: usize,
}

pub struct StreamReader<R> {
    input: R,
    chunk_size: usize,
    total_len: Option<u64>,
    show_progress: bool,
    max_messages: Option<u64>,
    cancel: CancelToken,
}

impl<R: Read> StreamReader<R> {
    pub fn new(input: R) -> Self {
        StreamReader {
            input,
            chunk_size: CHUNK_SIZE,
            total_len: None,
            show_progress: false,
            max_messages: None,
            cancel: CancelToken::new(),
        }
    }

    /// Window size; never smaller than two maximal frames.
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.max(2 * MAX_FRAME_LEN);
        self
    }

    /// Input size, for percent-complete in progress reports.
    pub fn with_total_len(mut self, len: Option<u64>) -> Self {
        self.total_len = len;
        self
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn with_max_messages(mut self, max: Option<u64>) -> Self {
        self.max_messages = max;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Read to the end (or a stop condition), handing every frame to
    /// `dispatcher`.
    pub fn run<D, F, T>(&mut self, dispatcher: &mut Dispatcher<D, F, T>) -> Result<ReadSummary>
    where
        D: ModesDecoder,
        F: AddressFilter,
        T: TrackSink,
    {
        let mut buf = vec![0u8; self.chunk_size];
        let mut carried = 0usize;
        let mut offset = 0u64;
        let mut resyncs = 0u64;
        let mut anchored = !dispatcher.clock().needs_anchor();
        let mut skipping = false;

        let stop = |reason, consumed, resyncs, trailing| ReadSummary {
            stop: reason,
            consumed,
            resyncs,
            trailing,
        };

        loop {
            if self.cancel.is_cancelled() {
                return Ok(stop(StopReason::Cancelled, offset, resyncs, carried));
            }

            let n = fill(&mut self.input, &mut buf[carried..])?;
            if n == 0 {
                if carried > 0 {
                    debug!(bytes = carried, offset, "trailing bytes without a complete frame");
                }
                return Ok(stop(StopReason::EndOfInput, offset, resyncs, carried));
            }
            let len = carried + n;

            if !anchored {
                anchored = true;
                if let Some(tick) = find_first_tick(&buf[..len]) {
                    dispatcher.anchor_clock(tick);
                }
            }

            let mut cursor = 0usize;
            while cursor < len {
                match extract_frame(&buf[cursor..len]) {
                    Extraction::Frame(frame) => {
                        skipping = false;
                        dispatcher.before_frame();
                        dispatcher.dispatch(&frame)?;
                        cursor += frame.physical_len();

                        let processed = dispatcher.counters().processed;
                        let position = offset + cursor as u64;
                        if self.show_progress && processed % PROGRESS_INTERVAL == 0 {
                            self.report_progress(position, processed);
                        }
                        if self.max_messages == Some(processed) {
                            return Ok(stop(StopReason::MaxMessages, position, resyncs, 0));
                        }
                        if self.cancel.is_cancelled() {
                            return Ok(stop(StopReason::Cancelled, position, resyncs, 0));
                        }
                    }
                    Extraction::NotAFrame => {
                        if len - cursor == 1 {
                            break;
                        }
                        if !skipping {
                            skipping = true;
                            resyncs += 1;
                            trace!(offset = offset + cursor as u64, "resynchronizing");
                        }
                        cursor += 1;
                    }
                    Extraction::Incomplete => break,
                }
            }

            buf.copy_within(cursor..len, 0);
            carried = len - cursor;
            offset += cursor as u64;
        }
    }

    fn report_progress(&self, position: u64, processed: u64) {
        let offset = format!("0x{position:X}");
        match self.total_len.filter(|&total| total > 0) {
            Some(total) => {
                let percent = format!("{:.2}", position as f64 * 100.0 / total as f64);
                info!(offset = %offset, percent = %percent, frame = processed, "progress");
            }
            None => info!(offset = %offset, frame = processed, "progress"),
        }
    }
}

/// Read until `buf` is full or the input is exhausted.
fn fill<R: Read>(input: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match input.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FilterConfig;
    use crate::error::RunError;
    use crate::output::tests::{FullDisk, SharedBuf};
    use crate::output::OutputRouter;
    use beast_core::beast::{encode_frame, ESCAPE};
    use beast_core::{hex_decode, ClockModel, FrameKind, IcaoFilter, ModeSDecoder, ModesMessage};
    use std::io::Cursor;

    const DF17_IDENT: &str = "8D4840D6202CC371C32CE0576098";
    const DF17_EVEN: &str = "8D40621D58C382D690C8AC2863A7";
    const DF17_ODD: &str = "8D40621D58C386435CC412692AD6";

    /// Hands out at most `step` bytes per read call.
    struct Trickle<R> {
        inner: R,
        step: usize,
    }

    impl<R: Read> Read for Trickle<R> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = buf.len().min(self.step);
            self.inner.read(&mut buf[..n])
        }
    }

    fn long(hex: &str, ticks: u64) -> Vec<u8> {
        encode_frame(FrameKind::ModeSLong, ticks, 0x40, &hex_decode(hex).unwrap())
    }

    /// Several frames with stuffing, garbage and a stray escape mixed in.
    fn sample_stream() -> Vec<u8> {
        let mut stream = vec![0x00, 0xFF];
        stream.extend(long(DF17_IDENT, 0x1A1A_0000_0001));
        stream.extend([ESCAPE, b'9', 0x42]);
        stream.extend(long(DF17_EVEN, 0x0000_1A00_0002));
        stream.extend(encode_frame(FrameKind::ModeAc, 0x1A, 0x1A, &[0x1A, 0x00]));
        stream.extend(long(DF17_ODD, 0x0000_0000_0003));
        stream
    }

    /// Eight variations on the sample, so windows split frames, stuffed
    /// bytes and resync runs at many different offsets.
    fn long_stream() -> Vec<u8> {
        let mut stream = Vec::new();
        for i in 0..8u64 {
            stream.extend(vec![0x00; i as usize % 3 + 1]);
            stream.extend(long(DF17_IDENT, 0x1A1A_0000_0000 + i));
            stream.extend([ESCAPE, b'9', 0x42]);
            stream.extend(long(DF17_EVEN, 0x1A00_0000 | i << 8));
            stream.extend(encode_frame(FrameKind::ModeAc, 0x1A + i, 0x1A, &[0x1A, 0x00]));
            stream.extend(long(DF17_ODD, i * 0x1A1A));
        }
        stream
    }

    fn run_with(input: impl Read, chunk: usize) -> (ReadSummary, crate::dispatch::RunCounters, Vec<u8>) {
        let extract = SharedBuf::default();
        let output = OutputRouter::new().with_extract(Box::new(extract.clone()));
        let mut dispatcher = Dispatcher::new(FilterConfig::default(), ClockModel::None, output);
        let summary = StreamReader::new(input)
            .with_chunk_size(chunk)
            .run(&mut dispatcher)
            .unwrap();
        let (counters, _) = dispatcher.finish().unwrap();
        (summary, counters, extract.contents())
    }

    #[test]
    fn test_reads_whole_stream() {
        let stream = sample_stream();
        let (summary, counters, extracted) = run_with(Cursor::new(stream.clone()), CHUNK_SIZE);
        assert_eq!(summary.stop, StopReason::EndOfInput);
        assert_eq!(summary.consumed, stream.len() as u64);
        assert_eq!(summary.trailing, 0);
        assert_eq!(summary.resyncs, 2);
        assert_eq!(counters.processed, 4);
        // the Mode A/C frame is ignored without --modeac
        assert_eq!(counters.accepted, 3);
        assert_eq!(counters.extracted, 3);

        let mut expected = long(DF17_IDENT, 0x1A1A_0000_0001);
        expected.extend(long(DF17_EVEN, 0x0000_1A00_0002));
        expected.extend(long(DF17_ODD, 0x0000_0000_0003));
        assert_eq!(extracted, expected);
    }

    #[test]
    fn test_chunk_boundaries_do_not_matter() {
        let stream = long_stream();
        let reference = run_with(Cursor::new(stream.clone()), CHUNK_SIZE);
        assert_eq!(reference.0.resyncs, 16);
        assert_eq!(reference.1.processed, 32);
        assert_eq!(reference.1.extracted, 24);
        assert!(stream.len() > 400);

        for chunk in 2 * MAX_FRAME_LEN..=400 {
            for step in [1, 3, 7, 64] {
                let input = Trickle {
                    inner: Cursor::new(stream.clone()),
                    step,
                };
                let got = run_with(input, chunk);
                assert_eq!(got.1, reference.1, "chunk {chunk} step {step}");
                assert_eq!(got.2, reference.2, "chunk {chunk} step {step}");
                assert_eq!(got.0.consumed, reference.0.consumed);
                assert_eq!(got.0.resyncs, reference.0.resyncs, "chunk {chunk} step {step}");
            }
        }
    }

    #[test]
    fn test_truncated_frame_is_clean_eof() {
        let frame = long(DF17_IDENT, 5);
        let (summary, counters, extracted) = run_with(Cursor::new(frame[..15].to_vec()), CHUNK_SIZE);
        assert_eq!(summary.stop, StopReason::EndOfInput);
        assert_eq!(summary.trailing, 15);
        assert_eq!(counters.processed, 0);
        assert!(extracted.is_empty());
    }

    #[test]
    fn test_empty_input() {
        let (summary, counters, _) = run_with(Cursor::new(Vec::new()), CHUNK_SIZE);
        assert_eq!(summary.stop, StopReason::EndOfInput);
        assert_eq!(summary.consumed, 0);
        assert_eq!(counters, crate::dispatch::RunCounters::default());
    }

    #[test]
    fn test_single_corrupt_byte_resyncs_once() {
        let mut stream = vec![0x55];
        stream.extend(long(DF17_IDENT, 5));
        let (summary, counters, _) = run_with(Cursor::new(stream), CHUNK_SIZE);
        assert_eq!(summary.resyncs, 1);
        assert_eq!(counters.processed, 1);
        assert_eq!(counters.accepted, 1);
    }

    #[test]
    fn test_max_messages_stops_early() {
        let stream = sample_stream();
        let output = OutputRouter::new();
        let mut dispatcher = Dispatcher::new(FilterConfig::default(), ClockModel::None, output);
        let summary = StreamReader::new(Cursor::new(stream))
            .with_max_messages(Some(2))
            .run(&mut dispatcher)
            .unwrap();
        assert_eq!(summary.stop, StopReason::MaxMessages);
        assert_eq!(dispatcher.counters().processed, 2);
    }

    #[test]
    fn test_cancelled_before_start() {
        let cancel = CancelToken::new();
        let mut dispatcher =
            Dispatcher::new(FilterConfig::default(), ClockModel::None, OutputRouter::new());
        cancel.clone().cancel();
        let summary = StreamReader::new(Cursor::new(sample_stream()))
            .with_cancel(cancel)
            .run(&mut dispatcher)
            .unwrap();
        assert_eq!(summary.stop, StopReason::Cancelled);
        assert_eq!(dispatcher.counters().processed, 0);
    }

    /// Cancels the run from inside the first update.
    struct CancelOnUpdate(CancelToken);

    impl TrackSink for CancelOnUpdate {
        fn update(&mut self, _msg: &mut ModesMessage) {
            self.0.cancel();
        }
        fn periodic_update(&mut self, _now: f64) {}
    }

    #[test]
    fn test_cancelled_between_frames() {
        let first = long(DF17_IDENT, 1);
        let mut stream = first.clone();
        stream.extend(long(DF17_EVEN, 2));
        stream.extend(long(DF17_ODD, 3));

        let cancel = CancelToken::new();
        let extract = SharedBuf::default();
        let output = OutputRouter::new().with_extract(Box::new(extract.clone()));
        let mut dispatcher = Dispatcher::with_parts(
            ModeSDecoder,
            IcaoFilter::default(),
            CancelOnUpdate(cancel.clone()),
            FilterConfig::default(),
            ClockModel::None,
            output,
        );
        let summary = StreamReader::new(Cursor::new(stream))
            .with_cancel(cancel)
            .run(&mut dispatcher)
            .unwrap();
        assert_eq!(summary.stop, StopReason::Cancelled);
        assert_eq!(summary.consumed, first.len() as u64);
        assert_eq!(dispatcher.counters().processed, 1);
        dispatcher.finish().unwrap();
        assert_eq!(extract.contents(), first);
    }

    #[test]
    fn test_extract_failure_ends_run() {
        let output = OutputRouter::new().with_extract(Box::new(FullDisk));
        let mut dispatcher = Dispatcher::new(FilterConfig::default(), ClockModel::None, output);
        let err = StreamReader::new(Cursor::new(sample_stream()))
            .run(&mut dispatcher)
            .unwrap_err();
        assert!(matches!(err, RunError::ExtractWrite(_)), "{err}");
        assert_eq!(dispatcher.counters().processed, 1);
    }

    #[test]
    fn test_relative_clock_anchored_on_first_frame() {
        let base = chrono::DateTime::from_timestamp(1_500_000_000, 0).unwrap();
        let mut stream = vec![0x00];
        stream.extend(long(DF17_IDENT, 1_000));
        stream.extend(long(DF17_IDENT, 1_000 + 12_000_000));

        let sbs = SharedBuf::default();
        let config = FilterConfig {
            sbs_output: true,
            ..Default::default()
        };
        let output = OutputRouter::new().with_sbs(Box::new(sbs.clone()));
        let mut dispatcher = Dispatcher::new(config, ClockModel::software_relative(base), output);
        StreamReader::new(Cursor::new(stream))
            .run(&mut dispatcher)
            .unwrap();
        assert_eq!(
            dispatcher.clock(),
            &ClockModel::SoftwareRelative {
                base,
                first_tick: 1_000
            }
        );
        dispatcher.finish().unwrap();

        let text = sbs.text();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains(",2017/07/14,02:40:00.000,"), "{}", lines[0]);
        assert!(lines[1].contains(",2017/07/14,02:40:01.000,"), "{}", lines[1]);
    }
}
