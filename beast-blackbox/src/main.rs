//! beast-blackbox: offline decoder for recorded Beast binary streams.
//!
//! Reads a capture file once, front to back, and can:
//! - copy the frames of one aircraft (or all) into a new Beast file
//! - print SBS (BaseStation) lines for decoded messages
//! - reconstruct a single aircraft's flight as KML
//! - list every ICAO address in the capture

use std::collections::BTreeSet;
use std::fs::File;
use std::io::{self, Write};
use std::process::ExitCode;

use chrono::Utc;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use beast_core::{icao_to_string, Addr, Tracker};

mod config;
mod dispatch;
mod error;
mod kml;
mod output;
mod reader;
mod sbs;

use config::{Cli, RunConfig};
use dispatch::{Dispatcher, RunCounters};
use error::{Result, RunError};
use output::{OutputRouter, Sink};
use reader::{CancelToken, ReadSummary, StopReason, StreamReader};

struct RunReport {
    read: ReadSummary,
    counters: RunCounters,
    catalog: BTreeSet<Addr>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match cli.into_config(Utc::now()) {
        Ok(config) => config,
        Err(e) => {
            error!("{e}");
            return ExitCode::from(2);
        }
    };

    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || handler_token.cancel()) {
        warn!("cannot install Ctrl-C handler: {e}");
    }

    let report = match run(&config, &cancel, Box::new(io::stdout())) {
        Ok(report) => report,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let mut stdout = io::stdout().lock();
    if let Err(e) = write_report(&mut stdout, &report, config.filter.find_icao) {
        error!("{}", RunError::Output(e));
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

/// Open everything, make one pass over the input, close everything.
fn run(config: &RunConfig, cancel: &CancelToken, stdout: Sink) -> Result<RunReport> {
    let input = File::open(&config.input).map_err(|source| RunError::OpenInput {
        path: config.input.clone(),
        source,
    })?;
    let total_len = input.metadata().ok().map(|m| m.len());

    let mut output = OutputRouter::new();
    if let Some(path) = &config.extract {
        let file = File::create(path).map_err(|source| RunError::OpenExtract {
            path: path.clone(),
            source,
        })?;
        output = output.with_extract(Box::new(file));
    }
    if let (Some(path), Some(icao)) = (&config.kml, config.filter.icao) {
        let file = File::create(path).map_err(|source| RunError::OpenKml {
            path: path.clone(),
            source,
        })?;
        output = output.with_kml(Box::new(file), icao)?;
    }
    if config.filter.sbs_enabled() && !config.filter.find_icao {
        output = output.with_sbs(stdout);
    }

    let filter = config
        .filter
        .icao
        .map(icao_to_string)
        .unwrap_or_else(|| "none".to_string());
    info!(
        input = %config.input.display(),
        bytes = total_len.unwrap_or(0),
        clock = config.clock.name(),
        filter = %filter,
        "decoding"
    );

    let tracker = Tracker::new()
        .with_receiver(config.receiver)
        .with_max_range(config.max_range);
    let mut dispatcher =
        Dispatcher::new(config.filter.clone(), config.clock, output).with_tracker(tracker);
    let read = StreamReader::new(input)
        .with_total_len(total_len)
        .with_progress(config.filter.show_progress)
        .with_max_messages(config.filter.max_messages)
        .with_cancel(cancel.clone())
        .run(&mut dispatcher)?;
    let (counters, catalog) = dispatcher.finish()?;

    match read.stop {
        StopReason::EndOfInput => info!(bytes = read.consumed, resyncs = read.resyncs, "end of input"),
        StopReason::MaxMessages => info!(frames = counters.processed, "message limit reached"),
        StopReason::Cancelled => warn!(bytes = read.consumed, "interrupted"),
    }

    Ok(RunReport {
        read,
        counters,
        catalog,
    })
}

fn write_report(out: &mut impl Write, report: &RunReport, find_icao: bool) -> io::Result<()> {
    if find_icao {
        for &addr in &report.catalog {
            writeln!(out, "{}", icao_to_string(addr))?;
        }
        writeln!(out, "Found {} ICAO addresses", report.catalog.len())?;
    }
    for line in report.counters.summary_lines() {
        writeln!(out, "{line}")?;
    }
    if report.read.trailing > 0 {
        writeln!(out, "{} trailing bytes ignored", report.read.trailing)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
