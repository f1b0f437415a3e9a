//! Where accepted messages go: the extraction file, SBS text, and KML.
//!
//! Write failures on the extraction or KML file end the run; nothing is
//! retried. Extraction writes go straight to the sink so a failure is
//! reported on the frame that caused it.

use std::io::{BufWriter, Write};

use chrono::Local;

use beast_core::ModesMessage;

use crate::config::FilterConfig;
use crate::error::{Result, RunError};
use crate::kml::KmlWriter;
use crate::sbs;

pub type Sink = Box<dyn Write>;

#[derive(Default)]
pub struct OutputRouter {
    extract: Option<Sink>,
    sbs: Option<BufWriter<Sink>>,
    kml: Option<KmlWriter<BufWriter<Sink>>>,
}

impl OutputRouter {
    pub fn new() -> Self {
        OutputRouter::default()
    }

    /// Copy accepted frames, stuffing intact, to `out`.
    pub fn with_extract(mut self, out: Sink) -> Self {
        self.extract = Some(out);
        self
    }

    pub fn with_sbs(mut self, out: Sink) -> Self {
        self.sbs = Some(BufWriter::new(out));
        self
    }

    /// Start a KML document for `icao` on `out`.
    pub fn with_kml(mut self, out: Sink, icao: beast_core::Addr) -> Result<Self> {
        let kml = KmlWriter::new(BufWriter::new(out), icao).map_err(RunError::KmlWrite)?;
        self.kml = Some(kml);
        Ok(self)
    }

    /// Append one frame to the extraction file. Returns whether it was
    /// written (false when no file is configured).
    pub fn extract(&mut self, frame: &[u8]) -> Result<bool> {
        let Some(out) = self.extract.as_mut() else {
            return Ok(false);
        };
        out.write_all(frame).map_err(RunError::ExtractWrite)?;
        Ok(true)
    }

    pub fn sbs(&mut self, mm: &ModesMessage, filter: &FilterConfig) -> Result<()> {
        let Some(out) = self.sbs.as_mut() else {
            return Ok(());
        };
        if let Some(line) = sbs::format_sbs(mm, filter, Local::now()) {
            out.write_all(line.as_bytes()).map_err(RunError::Output)?;
        }
        Ok(())
    }

    pub fn kml(&mut self, mm: &ModesMessage) -> Result<()> {
        if let Some(kml) = self.kml.as_mut() {
            kml.write_position(mm).map_err(RunError::KmlWrite)?;
        }
        Ok(())
    }

    pub fn kml_points(&self) -> u64 {
        self.kml.as_ref().map_or(0, |k| k.points())
    }

    /// Flush everything and close the KML document.
    pub fn finish(self) -> Result<()> {
        if let Some(mut out) = self.extract {
            out.flush().map_err(RunError::ExtractWrite)?;
        }
        if let Some(mut out) = self.sbs {
            out.flush().map_err(RunError::Output)?;
        }
        if let Some(kml) = self.kml {
            kml.finish().map_err(RunError::KmlWrite)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
